// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall dispatcher and error handling
//! OWNERS: @kernel-team
//! PUBLIC API: SyscallTable, Args, Error, Handler, SysResult
//! DEPENDS_ON: env, mm, device, syscall::api
//! INVARIANTS: Table window is [SYSCALL_BASE, SYSCALL_END); decode/check/execute discipline;
//!             every error maps to exactly one Errno

pub mod api;

use core::fmt;

use cinder_abi::{Errno, SYSCALL_BASE, SYSCALL_END};

use crate::device::DeviceError;
use crate::env::EnvError;
use crate::mm::MmError;

const TABLE_LEN: usize = SYSCALL_END - SYSCALL_BASE;

/// Result type used by syscall handlers.
pub type SysResult<T> = Result<T, Error>;

/// Syscall arguments passed in registers a0-a4.
#[derive(Default, Clone, Copy, Debug)]
pub struct Args {
    regs: [usize; 5],
}

impl Args {
    /// Creates a new argument pack from the provided registers.
    pub const fn new(regs: [usize; 5]) -> Self {
        Self { regs }
    }

    /// Returns the raw register at `index`.
    pub fn get(&self, index: usize) -> usize {
        self.regs[index]
    }
}

/// Error returned by the dispatcher and handler stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Syscall number not present in the dispatch table.
    InvalidSyscall,
    /// Env lookup or allocation failed.
    Env(EnvError),
    /// Memory operation failed.
    Mm(MmError),
    /// Device access rejected.
    Device(DeviceError),
    /// Malformed argument.
    InvalidArgs,
    /// IPC target is not receiving.
    IpcNotRecv,
    /// The caller gave up the processor (or no longer exists); its a0 is already final.
    Reschedule,
}

impl Error {
    /// Wire error code for this failure.
    pub fn errno(self) -> Errno {
        match self {
            Error::InvalidSyscall => Errno::NoSys,
            Error::Env(EnvError::NoFreeEnv) => Errno::NoFreeEnv,
            Error::Env(EnvError::BadEnv) => Errno::BadEnv,
            Error::Env(EnvError::NoMem) | Error::Mm(MmError::NoMem) => Errno::NoMem,
            Error::Mm(_) | Error::Device(_) | Error::InvalidArgs => Errno::Inval,
            Error::IpcNotRecv => Errno::IpcNotRecv,
            Error::Reschedule => Errno::Unspecified,
        }
    }
}

impl From<EnvError> for Error {
    fn from(value: EnvError) -> Self {
        Self::Env(value)
    }
}

impl From<MmError> for Error {
    fn from(value: MmError) -> Self {
        Self::Mm(value)
    }
}

impl From<DeviceError> for Error {
    fn from(value: DeviceError) -> Self {
        Self::Device(value)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Type alias for a syscall handler.
pub type Handler = fn(&mut api::Context<'_>, &Args) -> SysResult<usize>;

/// Dispatch table storing handlers by syscall number.
pub struct SyscallTable {
    handlers: [Option<Handler>; TABLE_LEN],
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SyscallTable {
    /// Creates an empty dispatch table.
    pub const fn new() -> Self {
        const NONE: Option<Handler> = None;
        Self { handlers: [NONE; TABLE_LEN] }
    }

    /// Registers a handler; numbers outside the table window are ignored.
    pub fn register(&mut self, number: usize, handler: Handler) {
        if let Some(slot) = number.checked_sub(SYSCALL_BASE).and_then(|i| self.handlers.get_mut(i)) {
            *slot = Some(handler);
        }
    }

    /// Executes the handler referenced by `number`.
    #[must_use]
    pub fn dispatch(
        &self,
        number: usize,
        ctx: &mut api::Context<'_>,
        args: &Args,
    ) -> SysResult<usize> {
        number
            .checked_sub(SYSCALL_BASE)
            .and_then(|i| self.handlers.get(i))
            .and_then(|entry| *entry)
            .ok_or(Error::InvalidSyscall)
            .and_then(|handler| handler(ctx, args))
    }
}
