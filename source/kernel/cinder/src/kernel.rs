// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel state owner, dispatch loop step and the user-mode port
//! OWNERS: @kernel-team
//! PUBLIC API: Kernel (new/create_env/schedule/current/...), Dispatch, CreateError, impl Trap
//! DEPENDS_ON: env, sched, syscall, trap, mm, device
//! INVARIANTS: At most one current environment; the current environment is always Runnable
//!             when dispatched; every user access goes through the current page directory

extern crate alloc;

use core::fmt;
use core::marker::PhantomData;

use cinder_abi::layout::{PAGE_SIZE, USTACKTOP};
use cinder_abi::{EnvStatus, EnvView, FaultUpcall, Mapping, Perm, Trap};

use crate::config::{ConfigError, KernelConfig};
use crate::device::DeviceBus;
use crate::env::{load_image, Env, EnvError, EnvTable, Image, LoadError, Resolve};
use crate::log;
use crate::mm::{uaccess, FramePool, MmError, PageDirectory};
use crate::panic::{halt, HaltReason};
use crate::sched::Scheduler;
use crate::syscall::{api, SyscallTable};
use crate::trap::{self, EcallOutcome, REG_A0, REG_A7};
use crate::types::{EnvId, VirtAddr};

/// Simulated time that passes per dispatch, in microseconds.
const DISPATCH_TICK_US: u64 = 10_000;

/// Result of one scheduling decision.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// `EnvId` now owns the processor.
    Run(EnvId),
    /// Nothing is runnable; the processor waits.
    Idle,
}

/// Errors surfaced while creating a boot environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateError {
    Env(EnvError),
    Load(LoadError),
}

impl From<EnvError> for CreateError {
    fn from(value: EnvError) -> Self {
        Self::Env(value)
    }
}

impl From<LoadError> for CreateError {
    fn from(value: LoadError) -> Self {
        Self::Load(value)
    }
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Sole owner of all kernel state.
pub struct Kernel {
    envs: EnvTable,
    scheduler: Scheduler,
    frames: FramePool,
    devices: DeviceBus,
    syscalls: SyscallTable,
    current: Option<EnvId>,
    _not_send_sync: PhantomData<*mut ()>,
}
static_assertions::assert_not_impl_any!(Kernel: Send, Sync);

impl Kernel {
    /// Sizes every table from `config` and installs the syscall handlers.
    pub fn new(config: KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        log::set_max_level(config.log_level);
        let mut syscalls = SyscallTable::new();
        api::install_handlers(&mut syscalls);
        log_info!(
            target: "boot",
            "cinder: {} env slots, {} frames, {} disk(s)",
            config.env_capacity,
            config.frame_count,
            config.disks.len()
        );
        Ok(Self {
            envs: EnvTable::new(config.env_capacity),
            scheduler: Scheduler::new(),
            frames: FramePool::new(config.frame_count),
            devices: DeviceBus::new(&config.disks),
            syscalls,
            current: None,
            _not_send_sync: PhantomData,
        })
    }

    /// Creates a Runnable boot environment from `image` with one stack page below USTACKTOP.
    pub fn create_env(&mut self, image: &Image<'_>, priority: u32) -> Result<EnvId, CreateError> {
        let id = self.envs.alloc(EnvId::SELF, &mut self.frames)?;
        if let Err(err) = self.populate(id, image) {
            let _ = self.envs.free(id, &mut self.frames);
            return Err(err);
        }
        if let Some(env) = self.envs.get_mut(id) {
            env.set_priority(priority);
            env.set_status(EnvStatus::Runnable);
        }
        self.scheduler.enqueue(id);
        log_info!(target: "env", "created {} entry {:#x} pri {}", id, image.entry, priority);
        Ok(id)
    }

    fn populate(&mut self, id: EnvId, image: &Image<'_>) -> Result<(), CreateError> {
        let env = self.envs.get_mut(id).ok_or(EnvError::BadEnv)?;
        let space = env.space_mut().ok_or(EnvError::BadEnv)?;
        load_image(space, &mut self.frames, image)?;
        let stack = self.frames.alloc().map_err(LoadError::from)?;
        if let Err(err) = space.insert(
            &mut self.frames,
            VirtAddr::new(USTACKTOP - PAGE_SIZE),
            stack,
            Perm::VALID | Perm::WRITABLE,
        ) {
            self.frames.release_if_unused(stack);
            return Err(LoadError::from(err).into());
        }
        *env.frame_mut() = trap::TrapFrame::user(image.entry, USTACKTOP);
        Ok(())
    }

    /// Runs the scheduler and makes its pick current.
    pub fn schedule(&mut self) -> Dispatch {
        self.current = self.scheduler.select(&self.envs);
        let Some(id) = self.current else {
            log_debug!(target: "sched", "idle");
            return Dispatch::Idle;
        };
        if let Some(env) = self.envs.get_mut(id) {
            env.note_dispatch();
        }
        self.devices.advance_clock(DISPATCH_TICK_US);
        Dispatch::Run(id)
    }

    pub fn current(&self) -> Option<EnvId> {
        self.current
    }

    pub fn env(&self, id: EnvId) -> Option<&Env> {
        self.envs.get(id)
    }

    pub fn envs(&self) -> &EnvTable {
        &self.envs
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn frames(&self) -> &FramePool {
        &self.frames
    }

    pub fn devices(&mut self) -> &mut DeviceBus {
        &mut self.devices
    }

    /// Saved a0 of `id`, as that environment will observe it when resumed.
    pub fn saved_ret(&self, id: EnvId) -> Option<usize> {
        self.envs.get(id).map(|e| e.frame().x[REG_A0])
    }

    fn current_or_halt(&self) -> EnvId {
        match self.current {
            Some(id) => id,
            None => halt(HaltReason::Corrupted, format_args!("user access with no current env")),
        }
    }

    fn current_space(&self) -> (EnvId, &PageDirectory) {
        let id = self.current_or_halt();
        match self.envs.get(id).and_then(|e| e.space()) {
            Some(space) => (id, space),
            None => halt(HaltReason::Corrupted, format_args!("current env {} has no space", id)),
        }
    }
}

impl Trap for Kernel {
    fn syscall(&mut self, number: usize, args: [usize; 5]) -> isize {
        let caller = self.current_or_halt();
        if let Some(env) = self.envs.get_mut(caller) {
            let frame = env.frame_mut();
            frame.x[REG_A0..REG_A0 + 5].copy_from_slice(&args);
            frame.x[REG_A7] = number;
        }
        let outcome = {
            let mut ctx = api::Context::new(
                &mut self.envs,
                &mut self.scheduler,
                &mut self.frames,
                &mut self.devices,
                caller,
            );
            trap::handle_ecall(&self.syscalls, &mut ctx)
        };
        let ret = self.saved_ret(caller).unwrap_or(0) as isize;
        if outcome == EcallOutcome::Reschedule {
            self.current = None;
            if self.schedule() == Dispatch::Idle {
                log_debug!(target: "sched", "[{}] gave up the cpu, nothing runnable", caller);
            }
        }
        ret
    }

    fn load(&mut self, va: usize, buf: &mut [u8]) {
        let (id, space) = self.current_space();
        if let Err(err) = uaccess::copy_from_user(space, &self.frames, va, buf) {
            halt(HaltReason::UnmappedAccess, format_args!("env {} load {:#x}: {}", id, va, err));
        }
    }

    fn store(&mut self, va: usize, data: &[u8]) -> Result<(), FaultUpcall> {
        let (id, space) = self.current_space();
        match uaccess::check_user(space, va, data.len(), true) {
            Ok(()) => {}
            Err(MmError::PermissionDenied) => {
                // first page that refuses the store
                let fault_va = (0..data.len())
                    .map(|i| va + i)
                    .find(|at| {
                        space.lookup(VirtAddr::new(*at).page()).is_some_and(|p| !p.perm.is_writable())
                    })
                    .unwrap_or(va);
                return Err(trap::deliver_write_fault(&mut self.envs, id, VirtAddr::new(fault_va)));
            }
            Err(err) => {
                halt(HaltReason::UnmappedAccess, format_args!("env {} store {:#x}: {}", id, va, err))
            }
        }
        let space = self.envs.get(id).and_then(|e| e.space());
        match space.map(|space| uaccess::copy_to_user(space, &mut self.frames, va, data)) {
            Some(Ok(())) => Ok(()),
            _ => halt(HaltReason::Corrupted, format_args!("store to {:#x} vanished", va)),
        }
    }

    fn mapping(&self, va: usize) -> Option<Mapping> {
        let (_, space) = self.current_space();
        space
            .lookup(VirtAddr::new(va).page())
            .map(|pte| Mapping { frame: pte.frame.as_index(), perm: pte.perm })
    }

    fn table_present(&self, va: usize) -> bool {
        let (_, space) = self.current_space();
        space.has_table(VirtAddr::new(va))
    }

    fn env(&self, id: EnvId) -> Option<EnvView> {
        let caller = self.current_or_halt();
        let id = self.envs.resolve_with(id, caller, false, Resolve::IncludeFree).ok()?;
        self.envs.get(id).map(Env::view)
    }
}
