// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The machine seen from user mode.
//!
//! Userland code never touches kernel state directly: it issues `ecall`s, loads and stores
//! through its own page table, and reads the kernel's read-only windows (`UVPT`, `UENVS`).
//! [`Trap`] is that surface. The kernel implements it for whichever environment is current.

use crate::{EnvId, EnvStatus, Perm};

/// A present mapping as seen through the read-only page-table window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    /// Physical frame number backing the page.
    pub frame: usize,
    /// Permission bits of the entry.
    pub perm: Perm,
}

/// Snapshot of one env-table slot as seen through the read-only env window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvView {
    /// Identifier currently held by the slot.
    pub id: EnvId,
    /// Creator of the environment; [`EnvId::SELF`] for boot environments.
    pub parent: EnvId,
    /// Scheduling status.
    pub status: EnvStatus,
    /// Scheduling quantum.
    pub priority: u32,
    /// Waiting in `ipc_recv`.
    pub ipc_recving: bool,
    /// Sender of the last delivered message.
    pub ipc_from: EnvId,
    /// Value of the last delivered message.
    pub ipc_value: usize,
    /// Permission of the page transferred with the last message (empty if none).
    pub ipc_perm: Perm,
    /// Number of times the environment was dispatched.
    pub runs: u64,
}

/// A store hit a mapped page that does not allow writes and the environment has a handler.
///
/// User mode is expected to run the handler at `entry` on the exception stack and then retry
/// the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultUpcall {
    /// Faulting virtual address.
    pub va: usize,
    /// Registered handler entry point.
    pub entry: usize,
    /// Top of the registered exception stack.
    pub stack_top: usize,
}

/// User-mode view of the processor.
pub trait Trap {
    /// Executes `ecall` with `number` in a7 and `args` in a0..a4; returns a0 afterwards.
    ///
    /// Calls that deschedule the caller (`yield`, `ipc_recv`, self-destroy) return once the
    /// processor has moved on; the caller's saved a0 is what it will observe when resumed.
    fn syscall(&mut self, number: usize, args: [usize; 5]) -> isize;

    /// Reads user memory of the current environment. Unmapped pages are fatal.
    fn load(&mut self, va: usize, buf: &mut [u8]);

    /// Writes user memory of the current environment.
    fn store(&mut self, va: usize, data: &[u8]) -> Result<(), FaultUpcall>;

    /// Reads the entry mapping `va` in the current address space.
    fn mapping(&self, va: usize) -> Option<Mapping>;

    /// Whether the directory slot covering `va` holds a user page table.
    fn table_present(&self, va: usize) -> bool;

    /// Reads an env-table slot; [`EnvId::SELF`] reads the caller's own slot.
    fn env(&self, id: EnvId) -> Option<EnvView>;
}
