// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! System halt. Every condition the kernel treats as fatal ends here.

use core::fmt;

/// Why the system stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltReason {
    /// A user environment invoked the panic syscall.
    UserPanic,
    /// `ipc_recv` named a destination at or above UTOP.
    RecvAboveUtop,
    /// A user access touched an unmapped page.
    UnmappedAccess,
    /// A store to a read-only page with no usable fault handler.
    UnhandledWriteFault,
    /// Kernel state no longer satisfies its own invariants.
    Corrupted,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Logs the reason and stops the system. Never returns.
#[cold]
pub fn halt(reason: HaltReason, detail: fmt::Arguments<'_>) -> ! {
    log_error!(target: "halt", "{}: {}", reason, detail);
    panic!("cinder halted: {}: {}", reason, detail);
}
