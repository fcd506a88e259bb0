// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Shared ABI definitions between the CINDER kernel and its user runtime
//! OWNERS: @runtime
//! PUBLIC API: EnvId, EnvStatus, Errno, Perm, layout::*, mmio::*, SYSCALL_* numbers, Trap port
//! DEPENDS_ON: bitflags, static_assertions
//! INVARIANTS: Syscall numbers start at SYSCALL_BASE and never get reordered;
//!             Perm bit values and errno codes are wire-stable; EnvId 0 always means "caller"

pub mod errno;
pub mod layout;
pub mod mmio;
pub mod perm;
pub mod port;

use core::fmt;

pub use errno::Errno;
pub use perm::Perm;
pub use port::{EnvView, FaultUpcall, Mapping, Trap};

/// Environment identifier: `generation * capacity + slot`.
///
/// The raw value 0 never names a live environment and is reserved for "the caller".
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnvId(u32);

impl EnvId {
    /// Reserved identifier that resolves to the calling environment.
    pub const SELF: Self = Self(0);

    /// Builds an identifier from its raw register encoding.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw register encoding.
    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Returns true for the caller alias.
    #[inline]
    pub const fn is_self(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Scheduling status of an environment slot.
///
/// Discriminants are the values `set_env_status` accepts in a1.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvStatus {
    /// Slot is unused and may be reclaimed.
    Free = 0,
    /// Eligible for dispatch.
    Runnable = 1,
    /// Allocated but not eligible for dispatch.
    NotRunnable = 2,
}

impl EnvStatus {
    /// Decodes a raw status word; `None` for anything outside the three known values.
    pub const fn from_raw(raw: usize) -> Option<Self> {
        match raw {
            0 => Some(Self::Free),
            1 => Some(Self::Runnable),
            2 => Some(Self::NotRunnable),
            _ => None,
        }
    }
}

/// First syscall number. Entry points are numbered consecutively from here.
pub const SYSCALL_BASE: usize = 9527;
/// Writes one byte to the console.
pub const SYSCALL_PUTCHAR: usize = SYSCALL_BASE;
/// Returns the caller's id.
pub const SYSCALL_GETENVID: usize = SYSCALL_BASE + 1;
/// Gives up the processor.
pub const SYSCALL_YIELD: usize = SYSCALL_BASE + 2;
/// Destroys the caller or one of its children.
pub const SYSCALL_ENV_DESTROY: usize = SYSCALL_BASE + 3;
/// Registers the write-fault upcall of an environment.
pub const SYSCALL_SET_PGFAULT_HANDLER: usize = SYSCALL_BASE + 4;
/// Maps a fresh zero page.
pub const SYSCALL_MEM_ALLOC: usize = SYSCALL_BASE + 5;
/// Shares a page between two address spaces.
pub const SYSCALL_MEM_MAP: usize = SYSCALL_BASE + 6;
/// Removes a mapping.
pub const SYSCALL_MEM_UNMAP: usize = SYSCALL_BASE + 7;
/// Allocates a child environment sharing the caller's trap frame.
pub const SYSCALL_ENV_ALLOC: usize = SYSCALL_BASE + 8;
/// Changes an environment's scheduling status.
pub const SYSCALL_SET_ENV_STATUS: usize = SYSCALL_BASE + 9;
/// Reserved trap-frame override; validates the target and does nothing else.
pub const SYSCALL_SET_TRAPFRAME: usize = SYSCALL_BASE + 10;
/// Halts the system.
pub const SYSCALL_PANIC: usize = SYSCALL_BASE + 11;
/// One-shot IPC send attempt.
pub const SYSCALL_IPC_TRY_SEND: usize = SYSCALL_BASE + 12;
/// Blocks until an IPC message arrives.
pub const SYSCALL_IPC_RECV: usize = SYSCALL_BASE + 13;
/// Reads one byte of console input (0 when none is pending).
pub const SYSCALL_CGETC: usize = SYSCALL_BASE + 14;
/// Copies user bytes into a device window.
pub const SYSCALL_WRITE_DEV: usize = SYSCALL_BASE + 15;
/// Copies device bytes into user memory.
pub const SYSCALL_READ_DEV: usize = SYSCALL_BASE + 16;
/// One past the last assigned syscall number.
pub const SYSCALL_END: usize = SYSCALL_BASE + 17;
