// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Trap frames, the ecall entry path and write-fault delivery.

extern crate alloc;

use alloc::vec::Vec;

use bitflags::bitflags;
use spin::Mutex;

use cinder_abi::layout::PAGE_SIZE;
use cinder_abi::{FaultUpcall, Perm};

use crate::env::EnvTable;
use crate::panic::{halt, HaltReason};
use crate::syscall::{api, Args, Error as SysError, SyscallTable};
use crate::types::{EnvId, VirtAddr};

/// Register index of a0 (first argument, return value).
pub const REG_A0: usize = 10;
/// Register index of a7 (syscall number).
pub const REG_A7: usize = 17;
/// Register index of sp.
pub const REG_SP: usize = 2;

/// scause: environment call from U-mode.
pub const CAUSE_ECALL_U: usize = 8;
/// scause: store page fault.
pub const CAUSE_STORE_PAGE_FAULT: usize = 15;

bitflags! {
    /// Supervisor status bits the kernel sets up for user frames.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Sstatus: usize {
        const SIE = 1 << 1;
        const SPIE = 1 << 5;
        /// Previous privilege was supervisor; cleared for user frames.
        const SPP = 1 << 8;
        const SUM = 1 << 18;
    }
}

/// Saved register state of an environment.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub x: [usize; 32],
    pub sepc: usize,
    pub sstatus: usize,
    pub scause: usize,
    pub stval: usize,
}

impl TrapFrame {
    /// Frame that enters user mode at `entry` with the given stack.
    pub fn user(entry: usize, sp: usize) -> Self {
        let mut frame = Self { sepc: entry, sstatus: Sstatus::SPIE.bits(), ..Self::default() };
        frame.x[REG_SP] = sp;
        frame
    }

    #[inline]
    pub fn a(&self, n: usize) -> usize {
        self.x[REG_A0 + n]
    }

    #[inline]
    pub fn set_ret(&mut self, value: usize) {
        self.x[REG_A0] = value;
    }

    pub fn status_bits(&self) -> Sstatus {
        Sstatus::from_bits_truncate(self.sstatus)
    }
}

/// One entry of the trap history ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrapRecord {
    pub env: EnvId,
    pub scause: usize,
    pub sepc: usize,
    pub stval: usize,
}

const TRAP_RING_LEN: usize = 64;
static TRAP_RING: Mutex<Vec<TrapRecord>> = Mutex::new(Vec::new());

fn record(env: EnvId, frame: &TrapFrame) {
    let mut ring = TRAP_RING.lock();
    if ring.len() == TRAP_RING_LEN {
        ring.remove(0);
    }
    ring.push(TrapRecord { env, scause: frame.scause, sepc: frame.sepc, stval: frame.stval });
}

/// Most recent traps of `env`, oldest first.
pub fn recent_traps(env: EnvId) -> Vec<TrapRecord> {
    TRAP_RING.lock().iter().filter(|r| r.env == env).copied().collect()
}

/// What the trap exit path must do after an ecall.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EcallOutcome {
    /// Return to the caller with a0 set.
    Resume,
    /// The caller gave up the processor; pick the next environment.
    Reschedule,
}

/// Handles `ecall` for `ctx.caller`: a7 selects the handler, a0..a4 carry arguments.
///
/// `sepc` is advanced past the ecall before dispatch, so a frame copied by the handler
/// (env_alloc) already points at the next instruction.
pub fn handle_ecall(table: &SyscallTable, ctx: &mut api::Context<'_>) -> EcallOutcome {
    let caller = ctx.caller;
    let (number, args) = {
        let Some(env) = ctx.envs.get_mut(caller) else {
            halt(HaltReason::Corrupted, format_args!("ecall from dead env {}", caller));
        };
        let frame = env.frame_mut();
        frame.scause = CAUSE_ECALL_U;
        frame.stval = 0;
        record(caller, frame);
        frame.sepc = frame.sepc.wrapping_add(4);
        let args = Args::new([frame.a(0), frame.a(1), frame.a(2), frame.a(3), frame.a(4)]);
        (frame.x[REG_A7], args)
    };

    let ret = match table.dispatch(number, ctx, &args) {
        Ok(value) => value,
        Err(SysError::Reschedule) => return EcallOutcome::Reschedule,
        Err(err) => {
            log_debug!(target: "syscall", "env {} call {} -> {}", caller, number, err);
            err.errno().to_ret() as usize
        }
    };
    if let Some(env) = ctx.envs.get_mut(caller) {
        env.frame_mut().set_ret(ret);
    }
    EcallOutcome::Resume
}

/// Classifies a store by `id` to `va` that missed write permission.
///
/// Halts unless the environment registered a handler whose exception stack page is mapped
/// writable; otherwise returns the upcall user mode must run before retrying.
pub fn deliver_write_fault(envs: &mut EnvTable, id: EnvId, va: VirtAddr) -> FaultUpcall {
    let Some(env) = envs.get_mut(id) else {
        halt(HaltReason::Corrupted, format_args!("fault from dead env {}", id));
    };
    let frame = env.frame_mut();
    frame.scause = CAUSE_STORE_PAGE_FAULT;
    frame.stval = va.raw();
    record(id, frame);

    let Some(handler) = env.fault_handler() else {
        halt(
            HaltReason::UnhandledWriteFault,
            format_args!("env {} wrote {} without a fault handler", id, va),
        );
    };
    let stack_ok = handler.stack_top >= PAGE_SIZE
        && env
            .space()
            .and_then(|space| space.lookup(VirtAddr::new(handler.stack_top - PAGE_SIZE)))
            .is_some_and(|pte| pte.perm.contains(Perm::WRITABLE));
    if !stack_ok {
        halt(
            HaltReason::UnhandledWriteFault,
            format_args!("env {} exception stack {:#x} not writable", id, handler.stack_top),
        );
    }
    log_trace!(target: "trap", "env {} write fault at {} -> {:#x}", id, va, handler.entry);
    FaultUpcall { va: va.raw(), entry: handler.entry, stack_top: handler.stack_top }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_frames_start_in_user_mode() {
        let frame = TrapFrame::user(0x40_0000, 0x7f3f_e000);
        assert_eq!(frame.sepc, 0x40_0000);
        assert_eq!(frame.x[REG_SP], 0x7f3f_e000);
        assert!(!frame.status_bits().contains(Sstatus::SPP));
        assert!(frame.status_bits().contains(Sstatus::SPIE));
    }
}
