// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Environment table with generation-tagged identifiers
//! OWNERS: @kernel-team
//! PUBLIC API: Env, EnvTable (alloc/free/resolve/get), EnvError, Resolve, IpcState, FaultHandler
//! DEPENDS_ON: mm::{FramePool, PageDirectory}, trap::TrapFrame
//! INVARIANTS: id = generation * capacity + slot, never 0; a slot's generation changes on every
//!             alloc and free so stale ids stop resolving; Free slots own no address space

extern crate alloc;

mod loader;

#[cfg(test)]
mod tests_prop;

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::fmt;

use cinder_abi::{EnvStatus, EnvView, Perm};

use crate::mm::{FramePool, MmError, PageDirectory};
use crate::trap::TrapFrame;
use crate::types::EnvId;

pub use loader::{load_image, Image, LoadError, Segment};

/// Errors surfaced by env-table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvError {
    /// Every slot is in use.
    NoFreeEnv,
    /// Id is stale, names a Free slot, or the caller lacks authority over it.
    BadEnv,
    /// No frame left for the address-space root.
    NoMem,
}

impl From<MmError> for EnvError {
    fn from(_: MmError) -> Self {
        Self::NoMem
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which slots a lookup accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolve {
    /// Only allocated environments.
    Live,
    /// Also slots marked Free whose generation still matches.
    IncludeFree,
}

/// Registered write-fault upcall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultHandler {
    pub entry: usize,
    pub stack_top: usize,
}

/// Rendezvous IPC state of one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpcState {
    /// Blocked in `ipc_recv`.
    pub recving: bool,
    /// Where a transferred page lands (0 = no page wanted).
    pub dstva: usize,
    pub from: EnvId,
    pub value: usize,
    pub perm: Perm,
}

/// One environment slot.
pub struct Env {
    id: EnvId,
    generation: u32,
    parent: EnvId,
    status: EnvStatus,
    priority: u32,
    space: Option<PageDirectory>,
    frame: TrapFrame,
    fault_handler: Option<FaultHandler>,
    ipc: IpcState,
    runs: u64,
}

impl Env {
    fn vacant() -> Self {
        Self {
            id: EnvId::SELF,
            generation: 0,
            parent: EnvId::SELF,
            status: EnvStatus::Free,
            priority: 0,
            space: None,
            frame: TrapFrame::default(),
            fault_handler: None,
            ipc: IpcState::default(),
            runs: 0,
        }
    }

    pub fn id(&self) -> EnvId {
        self.id
    }

    pub fn parent(&self) -> EnvId {
        self.parent
    }

    pub fn status(&self) -> EnvStatus {
        self.status
    }

    pub fn set_status(&mut self, status: EnvStatus) {
        self.status = status;
    }

    pub fn is_runnable(&self) -> bool {
        self.status == EnvStatus::Runnable
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    pub fn space(&self) -> Option<&PageDirectory> {
        self.space.as_ref()
    }

    pub fn space_mut(&mut self) -> Option<&mut PageDirectory> {
        self.space.as_mut()
    }

    pub fn frame(&self) -> &TrapFrame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut TrapFrame {
        &mut self.frame
    }

    pub fn fault_handler(&self) -> Option<FaultHandler> {
        self.fault_handler
    }

    pub fn set_fault_handler(&mut self, handler: FaultHandler) {
        self.fault_handler = Some(handler);
    }

    pub fn ipc(&self) -> &IpcState {
        &self.ipc
    }

    pub fn ipc_mut(&mut self) -> &mut IpcState {
        &mut self.ipc
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub(crate) fn note_dispatch(&mut self) {
        self.runs += 1;
    }

    /// Read-only snapshot exposed through the env window.
    pub fn view(&self) -> EnvView {
        EnvView {
            id: self.id,
            parent: self.parent,
            status: self.status,
            priority: self.priority,
            ipc_recving: self.ipc.recving,
            ipc_from: self.ipc.from,
            ipc_value: self.ipc.value,
            ipc_perm: self.ipc.perm,
            runs: self.runs,
        }
    }
}

/// Fixed-capacity environment table.
pub struct EnvTable {
    envs: Vec<Env>,
    // slot indices, reused oldest-first
    free: VecDeque<usize>,
}

impl EnvTable {
    pub fn new(capacity: usize) -> Self {
        let mut envs = Vec::with_capacity(capacity);
        envs.resize_with(capacity, Env::vacant);
        Self { envs, free: (0..capacity).collect() }
    }

    pub fn capacity(&self) -> usize {
        self.envs.len()
    }

    /// Number of allocated slots.
    pub fn live_count(&self) -> usize {
        self.capacity() - self.free.len()
    }

    fn compose(&self, generation: u32, slot: usize) -> Option<EnvId> {
        let raw = (generation as u64) * (self.capacity() as u64) + slot as u64;
        u32::try_from(raw).ok().map(EnvId::from_raw)
    }

    // wraps to 1 once the id no longer fits in 32 bits
    fn bump_generation(&mut self, slot: usize) {
        let next = self.envs[slot].generation.wrapping_add(1);
        let next = match self.compose(next, slot) {
            Some(_) if next != 0 => next,
            _ => 1,
        };
        self.envs[slot].generation = next;
    }

    /// Allocates a slot for a child of `parent` with a fresh address-space root.
    ///
    /// The new environment is NotRunnable with cleared IPC and fault-handler state.
    pub fn alloc(&mut self, parent: EnvId, frames: &mut FramePool) -> Result<EnvId, EnvError> {
        let slot = *self.free.front().ok_or(EnvError::NoFreeEnv)?;
        let space = PageDirectory::new(frames)?;
        self.free.pop_front();
        self.bump_generation(slot);
        let generation = self.envs[slot].generation;
        let Some(id) = self.compose(generation, slot) else {
            space.release(frames);
            self.free.push_front(slot);
            return Err(EnvError::NoFreeEnv);
        };
        let env = &mut self.envs[slot];
        *env = Env {
            id,
            generation,
            parent,
            status: EnvStatus::NotRunnable,
            space: Some(space),
            ..Env::vacant()
        };
        log_debug!(target: "env", "alloc {} (parent {})", id, parent);
        Ok(id)
    }

    /// Releases every mapping and the root of `id`, marks the slot Free and retires the id.
    pub fn free(&mut self, id: EnvId, frames: &mut FramePool) -> Result<(), EnvError> {
        let slot = self.slot_of(id).ok_or(EnvError::BadEnv)?;
        let env = &mut self.envs[slot];
        if let Some(space) = env.space.take() {
            space.release(frames);
        }
        env.status = EnvStatus::Free;
        env.fault_handler = None;
        env.ipc = IpcState::default();
        self.bump_generation(slot);
        self.free.push_back(slot);
        log_debug!(target: "env", "free {}", id);
        Ok(())
    }

    // slot whose current generation matches `id`, any status
    fn slot_of(&self, id: EnvId) -> Option<usize> {
        if id.is_self() {
            return None;
        }
        let slot = id.as_raw() as usize % self.capacity();
        let env = &self.envs[slot];
        (env.id == id && self.compose(env.generation, slot) == Some(id)).then_some(slot)
    }

    /// Resolves `id` on behalf of `caller`; 0 names the caller.
    ///
    /// With `check_perm` the target must be the caller itself or one of its children.
    pub fn resolve(&self, id: EnvId, caller: EnvId, check_perm: bool) -> Result<EnvId, EnvError> {
        self.resolve_with(id, caller, check_perm, Resolve::Live)
    }

    pub fn resolve_with(
        &self,
        id: EnvId,
        caller: EnvId,
        check_perm: bool,
        mode: Resolve,
    ) -> Result<EnvId, EnvError> {
        let id = if id.is_self() { caller } else { id };
        let env = self.get(id).ok_or(EnvError::BadEnv)?;
        if mode == Resolve::Live && env.status == EnvStatus::Free {
            return Err(EnvError::BadEnv);
        }
        if check_perm && env.id != caller && env.parent != caller {
            return Err(EnvError::BadEnv);
        }
        Ok(env.id)
    }

    /// Environment currently holding `id` (status not checked).
    pub fn get(&self, id: EnvId) -> Option<&Env> {
        self.slot_of(id).map(|slot| &self.envs[slot])
    }

    pub fn get_mut(&mut self, id: EnvId) -> Option<&mut Env> {
        self.slot_of(id).map(|slot| &mut self.envs[slot])
    }
}
