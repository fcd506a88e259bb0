// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall handlers exposed to the dispatcher
//! OWNERS: @kernel-team
//! PUBLIC API: install_handlers(table), Context
//! DEPENDS_ON: env::EnvTable, sched::Scheduler, mm::{FramePool, uaccess}, device::DeviceBus
//! INVARIANTS: Decode→Check→Execute; user addresses < UTOP; a failed call leaves no partial
//!             state behind; only the caller or its parent may destroy/alloc-into/unmap an env

extern crate alloc;

use alloc::string::String;

use cinder_abi::layout::UTOP;
use cinder_abi::{mmio, EnvStatus, Perm};
use cinder_abi::{
    SYSCALL_CGETC, SYSCALL_ENV_ALLOC, SYSCALL_ENV_DESTROY, SYSCALL_GETENVID, SYSCALL_IPC_RECV,
    SYSCALL_IPC_TRY_SEND, SYSCALL_MEM_ALLOC, SYSCALL_MEM_MAP, SYSCALL_MEM_UNMAP, SYSCALL_PANIC,
    SYSCALL_PUTCHAR, SYSCALL_READ_DEV, SYSCALL_SET_ENV_STATUS, SYSCALL_SET_PGFAULT_HANDLER,
    SYSCALL_SET_TRAPFRAME, SYSCALL_WRITE_DEV, SYSCALL_YIELD,
};

use super::{Args, Error, SysResult, SyscallTable};
use crate::device::{DeviceBus, DeviceError};
use crate::env::{EnvError, EnvTable, FaultHandler};
use crate::mm::{uaccess, FramePool, MmError, PageDirectory};
use crate::panic::{halt, HaltReason};
use crate::sched::Scheduler;
use crate::types::{EnvId, VirtAddr};

/// Longest message `panic` copies out of user memory.
const PANIC_MSG_MAX: usize = 256;

// Typed decoders for Decode→Check→Execute

#[inline]
fn user_va(raw: usize) -> Result<VirtAddr, Error> {
    VirtAddr::user(raw).ok_or(Error::InvalidArgs)
}

#[derive(Copy, Clone)]
struct MemAllocArgs {
    env: EnvId,
    va: VirtAddr,
    perm: Perm,
}

impl MemAllocArgs {
    #[inline]
    fn decode(args: &Args) -> Result<Self, Error> {
        Ok(Self {
            env: EnvId::from_raw(args.get(0) as u32),
            va: user_va(args.get(1))?,
            perm: Perm::from_raw(args.get(2)),
        })
    }

    #[inline]
    fn check(&self) -> Result<(), Error> {
        if !self.perm.is_valid() || self.perm.is_copy_on_write() {
            return Err(Error::InvalidArgs);
        }
        Ok(())
    }
}

#[derive(Copy, Clone)]
struct MemMapArgs {
    src_env: EnvId,
    src_va: VirtAddr,
    dst_env: EnvId,
    dst_va: VirtAddr,
    perm: Perm,
}

impl MemMapArgs {
    #[inline]
    fn decode(args: &Args) -> Result<Self, Error> {
        Ok(Self {
            src_env: EnvId::from_raw(args.get(0) as u32),
            src_va: user_va(args.get(1))?,
            dst_env: EnvId::from_raw(args.get(2) as u32),
            dst_va: user_va(args.get(3))?,
            perm: Perm::from_raw(args.get(4)),
        })
    }

    #[inline]
    fn check(&self) -> Result<(), Error> {
        if !self.perm.is_valid() {
            return Err(Error::InvalidArgs);
        }
        // a live mapping is never both COW and writable
        if self.perm.is_copy_on_write() && self.perm.is_writable() {
            return Err(Error::InvalidArgs);
        }
        Ok(())
    }
}

#[derive(Copy, Clone)]
struct TrySendArgs {
    target: EnvId,
    value: usize,
    src_va: Option<VirtAddr>,
    perm: Perm,
}

impl TrySendArgs {
    #[inline]
    fn decode(args: &Args) -> Result<Self, Error> {
        let src_raw = args.get(2);
        let src_va = if src_raw == 0 { None } else { Some(user_va(src_raw)?) };
        Ok(Self {
            target: EnvId::from_raw(args.get(0) as u32),
            value: args.get(1),
            src_va,
            perm: Perm::from_raw(args.get(3)),
        })
    }

    #[inline]
    fn check(&self) -> Result<(), Error> {
        if self.src_va.is_some() && !self.perm.is_valid() {
            return Err(Error::InvalidArgs);
        }
        Ok(())
    }
}

#[derive(Copy, Clone)]
struct DevIoArgs {
    va: usize,
    dev: usize,
    len: usize,
}

impl DevIoArgs {
    #[inline]
    fn decode(args: &Args) -> Result<Self, Error> {
        Ok(Self { va: args.get(0), dev: args.get(1), len: args.get(2) })
    }

    #[inline]
    fn check(&self) -> Result<(), Error> {
        mmio::window_for(self.dev, self.len).ok_or(DeviceError::OutsideWindow)?;
        Ok(())
    }
}

/// Execution context handed to every handler: the kernel subsystems plus the calling env.
pub struct Context<'a> {
    pub envs: &'a mut EnvTable,
    pub scheduler: &'a mut Scheduler,
    pub frames: &'a mut FramePool,
    pub devices: &'a mut DeviceBus,
    pub caller: EnvId,
}

impl<'a> Context<'a> {
    /// Creates a new context for `caller`.
    pub fn new(
        envs: &'a mut EnvTable,
        scheduler: &'a mut Scheduler,
        frames: &'a mut FramePool,
        devices: &'a mut DeviceBus,
        caller: EnvId,
    ) -> Self {
        Self { envs, scheduler, frames, devices, caller }
    }

    fn space(&self, id: EnvId) -> Result<&PageDirectory, Error> {
        self.envs.get(id).and_then(|e| e.space()).ok_or(Error::Env(EnvError::BadEnv))
    }

    /// Destroys `id`: releases its memory, drops it from the scheduler, retires the id.
    fn destroy(&mut self, id: EnvId) -> Result<(), Error> {
        self.scheduler.remove(id);
        self.envs.free(id, self.frames)?;
        Ok(())
    }

    /// Shares the page at `src_va` of `src` with `dst` at `dst_va`.
    ///
    /// An absent source clears the destination. Granting write access to a page the source
    /// cannot write is rejected before anything changes.
    fn share_page(
        &mut self,
        src: EnvId,
        src_va: VirtAddr,
        dst: EnvId,
        dst_va: VirtAddr,
        perm: Perm,
    ) -> Result<(), Error> {
        let Some(pte) = self.space(src)?.lookup(src_va.page()) else {
            if let Some(space) = self.envs.get_mut(dst).and_then(|e| e.space_mut()) {
                space.remove(self.frames, dst_va.page());
            }
            return Ok(());
        };
        if perm.is_writable() && !pte.perm.is_writable() {
            return Err(Error::InvalidArgs);
        }
        let space = self
            .envs
            .get_mut(dst)
            .and_then(|e| e.space_mut())
            .ok_or(Error::Env(EnvError::BadEnv))?;
        space.insert(self.frames, dst_va.page(), pte.frame, perm)?;
        Ok(())
    }
}

/// Registers the default set of syscall handlers.
pub fn install_handlers(table: &mut SyscallTable) {
    table.register(SYSCALL_PUTCHAR, sys_putchar);
    table.register(SYSCALL_GETENVID, sys_getenvid);
    table.register(SYSCALL_YIELD, sys_yield);
    table.register(SYSCALL_ENV_DESTROY, sys_env_destroy);
    table.register(SYSCALL_SET_PGFAULT_HANDLER, sys_set_pgfault_handler);
    table.register(SYSCALL_MEM_ALLOC, sys_mem_alloc);
    table.register(SYSCALL_MEM_MAP, sys_mem_map);
    table.register(SYSCALL_MEM_UNMAP, sys_mem_unmap);
    table.register(SYSCALL_ENV_ALLOC, sys_env_alloc);
    table.register(SYSCALL_SET_ENV_STATUS, sys_set_env_status);
    table.register(SYSCALL_SET_TRAPFRAME, sys_set_trapframe);
    table.register(SYSCALL_PANIC, sys_panic);
    table.register(SYSCALL_IPC_TRY_SEND, sys_ipc_try_send);
    table.register(SYSCALL_IPC_RECV, sys_ipc_recv);
    table.register(SYSCALL_CGETC, sys_cgetc);
    table.register(SYSCALL_WRITE_DEV, sys_write_dev);
    table.register(SYSCALL_READ_DEV, sys_read_dev);
}

fn sys_putchar(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    ctx.devices.console.putc(args.get(0) as u8);
    Ok(0)
}

fn sys_getenvid(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    Ok(ctx.caller.as_raw() as usize)
}

fn sys_yield(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    if let Some(env) = ctx.envs.get_mut(ctx.caller) {
        env.frame_mut().set_ret(0);
    }
    Err(Error::Reschedule)
}

fn sys_env_destroy(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let target = ctx.envs.resolve(EnvId::from_raw(args.get(0) as u32), ctx.caller, true)?;
    log_info!(target: "env", "[{}] destroying {}", ctx.caller, target);
    ctx.destroy(target)?;
    if target == ctx.caller {
        return Err(Error::Reschedule);
    }
    Ok(0)
}

fn sys_set_pgfault_handler(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let target = ctx.envs.resolve(EnvId::from_raw(args.get(0) as u32), ctx.caller, false)?;
    let handler = FaultHandler { entry: args.get(1), stack_top: args.get(2) };
    if let Some(env) = ctx.envs.get_mut(target) {
        env.set_fault_handler(handler);
    }
    Ok(0)
}

fn sys_mem_alloc(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let typed = MemAllocArgs::decode(args)?;
    typed.check()?;
    let target = ctx.envs.resolve(typed.env, ctx.caller, true)?;

    let frame = ctx.frames.alloc()?;
    let Some(space) = ctx.envs.get_mut(target).and_then(|e| e.space_mut()) else {
        ctx.frames.release_if_unused(frame);
        return Err(EnvError::BadEnv.into());
    };
    if let Err(err) = space.insert(ctx.frames, typed.va.page(), frame, typed.perm) {
        ctx.frames.release_if_unused(frame);
        return Err(err.into());
    }
    Ok(0)
}

fn sys_mem_map(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let typed = MemMapArgs::decode(args)?;
    typed.check()?;
    let src = ctx.envs.resolve(typed.src_env, ctx.caller, false)?;
    let dst = ctx.envs.resolve(typed.dst_env, ctx.caller, false)?;
    ctx.share_page(src, typed.src_va, dst, typed.dst_va, typed.perm)?;
    Ok(0)
}

fn sys_mem_unmap(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let va = user_va(args.get(1))?;
    let target = ctx.envs.resolve(EnvId::from_raw(args.get(0) as u32), ctx.caller, true)?;
    if let Some(space) = ctx.envs.get_mut(target).and_then(|e| e.space_mut()) {
        space.remove(ctx.frames, va.page());
    }
    Ok(0)
}

fn sys_env_alloc(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    let parent = ctx.caller;
    let (frame, priority) = {
        let env = ctx.envs.get(parent).ok_or(Error::Env(EnvError::BadEnv))?;
        (*env.frame(), env.priority())
    };
    let child = ctx.envs.alloc(parent, ctx.frames)?;
    if let Some(env) = ctx.envs.get_mut(child) {
        // resumes right after the ecall, observing 0
        *env.frame_mut() = frame;
        env.frame_mut().set_ret(0);
        env.set_priority(priority);
    }
    ctx.scheduler.enqueue(child);
    log_debug!(target: "env", "[{}] alloc child {}", parent, child);
    Ok(child.as_raw() as usize)
}

fn sys_set_env_status(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let status = EnvStatus::from_raw(args.get(1)).ok_or(Error::InvalidArgs)?;
    let target = ctx.envs.resolve(EnvId::from_raw(args.get(0) as u32), ctx.caller, false)?;
    if status == EnvStatus::Free {
        log_warn!(target: "env", "[{}] marks {} Free without destroying it", ctx.caller, target);
    }
    if let Some(env) = ctx.envs.get_mut(target) {
        env.set_status(status);
    }
    Ok(0)
}

fn sys_set_trapframe(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    ctx.envs.resolve(EnvId::from_raw(args.get(0) as u32), ctx.caller, true)?;
    Ok(0)
}

fn sys_panic(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let mut msg = String::new();
    if let Ok(space) = ctx.space(ctx.caller) {
        let mut byte = [0u8; 1];
        for i in 0..PANIC_MSG_MAX {
            let at = args.get(0).wrapping_add(i);
            if uaccess::copy_from_user(space, ctx.frames, at, &mut byte).is_err() || byte[0] == 0 {
                break;
            }
            msg.push(byte[0] as char);
        }
    }
    halt(HaltReason::UserPanic, format_args!("env {}: {}", ctx.caller, msg));
}

fn sys_ipc_try_send(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let typed = TrySendArgs::decode(args)?;
    typed.check()?;
    let target = ctx.envs.resolve(typed.target, ctx.caller, false)?;
    let dstva = match ctx.envs.get(target) {
        Some(env) if env.ipc().recving => env.ipc().dstva,
        _ => return Err(Error::IpcNotRecv),
    };

    if let Some(src_va) = typed.src_va {
        ctx.share_page(ctx.caller, src_va, target, VirtAddr::new(dstva), typed.perm)?;
    }

    if let Some(env) = ctx.envs.get_mut(target) {
        let ipc = env.ipc_mut();
        ipc.recving = false;
        ipc.from = ctx.caller;
        ipc.value = typed.value;
        ipc.perm = typed.perm;
        env.set_status(EnvStatus::Runnable);
    }
    Ok(0)
}

fn sys_ipc_recv(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let dstva = args.get(0);
    if dstva >= UTOP {
        halt(HaltReason::RecvAboveUtop, format_args!("env {} dstva {:#x}", ctx.caller, dstva));
    }
    if let Some(env) = ctx.envs.get_mut(ctx.caller) {
        let ipc = env.ipc_mut();
        ipc.recving = true;
        ipc.dstva = dstva;
        env.set_status(EnvStatus::NotRunnable);
        env.frame_mut().set_ret(0);
    }
    Err(Error::Reschedule)
}

fn sys_cgetc(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    Ok(ctx.devices.console.getc() as usize)
}

fn sys_write_dev(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let typed = DevIoArgs::decode(args)?;
    typed.check()?;
    let mut data = alloc::vec![0u8; typed.len];
    uaccess::copy_from_user(ctx.space(ctx.caller)?, ctx.frames, typed.va, &mut data)?;
    ctx.devices.write(typed.dev, &data)?;
    Ok(0)
}

fn sys_read_dev(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let typed = DevIoArgs::decode(args)?;
    typed.check()?;
    uaccess::check_user(ctx.space(ctx.caller)?, typed.va, typed.len, true)?;
    let mut data = alloc::vec![0u8; typed.len];
    ctx.devices.read(typed.dev, &mut data)?;
    let space = ctx.envs.get(ctx.caller).and_then(|e| e.space()).ok_or(MmError::NotMapped)?;
    uaccess::copy_to_user(space, ctx.frames, typed.va, &data)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_abi::layout::{PAGE_SIZE, UTOP};
    use cinder_abi::Errno;

    const RW: usize = Perm::VALID.bits() | Perm::WRITABLE.bits();
    const RO: usize = Perm::VALID.bits();

    struct Rig {
        envs: EnvTable,
        scheduler: Scheduler,
        frames: FramePool,
        devices: DeviceBus,
        table: SyscallTable,
    }

    impl Rig {
        fn new() -> Self {
            let mut table = SyscallTable::new();
            install_handlers(&mut table);
            Self {
                envs: EnvTable::new(8),
                scheduler: Scheduler::new(),
                frames: FramePool::new(64),
                devices: DeviceBus::new(&[4]),
                table,
            }
        }

        fn spawn(&mut self, parent: EnvId) -> EnvId {
            let id = self.envs.alloc(parent, &mut self.frames).unwrap();
            let env = self.envs.get_mut(id).unwrap();
            env.set_status(EnvStatus::Runnable);
            env.set_priority(1);
            self.scheduler.enqueue(id);
            id
        }

        fn call(&mut self, caller: EnvId, number: usize, regs: [usize; 5]) -> Result<usize, Errno> {
            let mut ctx = Context::new(
                &mut self.envs,
                &mut self.scheduler,
                &mut self.frames,
                &mut self.devices,
                caller,
            );
            self.table.dispatch(number, &mut ctx, &Args::new(regs)).map_err(Error::errno)
        }

        fn pte(&self, env: EnvId, va: usize) -> Option<crate::mm::Pte> {
            self.envs.get(env)?.space()?.lookup(VirtAddr::new(va))
        }
    }

    #[test]
    fn getenvid_returns_caller() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        assert_eq!(rig.call(a, SYSCALL_GETENVID, [0; 5]), Ok(a.as_raw() as usize));
    }

    #[test]
    fn unknown_number_is_nosys() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        assert_eq!(rig.call(a, 0, [0; 5]), Err(Errno::NoSys));
        assert_eq!(rig.call(a, cinder_abi::SYSCALL_END, [0; 5]), Err(Errno::NoSys));
    }

    #[test]
    fn mem_alloc_validates_permissions() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let cow = Perm::VALID.bits() | Perm::COW.bits();
        assert_eq!(rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, 0, 0, 0]), Err(Errno::Inval));
        assert_eq!(rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, cow, 0, 0]), Err(Errno::Inval));
        assert_eq!(rig.call(a, SYSCALL_MEM_ALLOC, [0, UTOP, RW, 0, 0]), Err(Errno::Inval));
        assert!(rig.pte(a, 0x1000).is_none());
        assert_eq!(rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RW, 0, 0]), Ok(0));
        let pte = rig.pte(a, 0x1000).unwrap();
        assert!(pte.perm.is_writable());
        assert_eq!(rig.frames.refcount(pte.frame), 1);
    }

    #[test]
    fn mem_alloc_replaces_existing_page() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RW, 0, 0]).unwrap();
        let first = rig.pte(a, 0x1000).unwrap().frame;
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RW, 0, 0]).unwrap();
        assert_ne!(rig.pte(a, 0x1000).unwrap().frame, first);
        assert_eq!(rig.frames.refcount(first), 0);
    }

    #[test]
    fn mem_alloc_requires_authority() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let b = rig.spawn(EnvId::SELF);
        let child = rig.spawn(a);
        let b_raw = b.as_raw() as usize;
        let child_raw = child.as_raw() as usize;
        assert_eq!(rig.call(a, SYSCALL_MEM_ALLOC, [b_raw, 0x1000, RW, 0, 0]), Err(Errno::BadEnv));
        assert_eq!(rig.call(a, SYSCALL_MEM_ALLOC, [child_raw, 0x1000, RW, 0, 0]), Ok(0));
    }

    #[test]
    fn mem_map_shares_and_refuses_escalation() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let b = rig.spawn(EnvId::SELF);
        let b_raw = b.as_raw() as usize;
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RO, 0, 0]).unwrap();

        assert_eq!(rig.call(a, SYSCALL_MEM_MAP, [0, 0x1000, b_raw, 0x5000, RW]), Err(Errno::Inval));
        assert!(rig.pte(b, 0x5000).is_none());
        assert!(!rig.pte(a, 0x1000).unwrap().perm.is_writable());

        assert_eq!(rig.call(a, SYSCALL_MEM_MAP, [0, 0x1000, b_raw, 0x5000, RO]), Ok(0));
        let shared = rig.pte(a, 0x1000).unwrap().frame;
        assert_eq!(rig.pte(b, 0x5000).unwrap().frame, shared);
        assert_eq!(rig.frames.refcount(shared), 2);
    }

    #[test]
    fn mem_map_refuses_writable_cow() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let cow_rw = RW | Perm::COW.bits();
        let cow_ro = RO | Perm::COW.bits();
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RW, 0, 0]).unwrap();
        assert_eq!(rig.call(a, SYSCALL_MEM_MAP, [0, 0x1000, 0, 0x2000, cow_rw]), Err(Errno::Inval));
        assert!(rig.pte(a, 0x2000).is_none());
        assert_eq!(rig.call(a, SYSCALL_MEM_MAP, [0, 0x1000, 0, 0x2000, cow_ro]), Ok(0));
        let perm = rig.pte(a, 0x2000).unwrap().perm;
        assert!(perm.is_copy_on_write() && !perm.is_writable());
    }

    #[test]
    fn mem_map_from_absent_source_clears_destination() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x2000, RW, 0, 0]).unwrap();
        assert_eq!(rig.call(a, SYSCALL_MEM_MAP, [0, 0x9000, 0, 0x2000, RW]), Ok(0));
        assert!(rig.pte(a, 0x2000).is_none());
    }

    #[test]
    fn mem_unmap_is_idempotent() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x3000, RW, 0, 0]).unwrap();
        let free_before = rig.frames.free_count();
        assert_eq!(rig.call(a, SYSCALL_MEM_UNMAP, [0, 0x3000, 0, 0, 0]), Ok(0));
        assert_eq!(rig.frames.free_count(), free_before + 1);
        assert_eq!(rig.call(a, SYSCALL_MEM_UNMAP, [0, 0x3000, 0, 0, 0]), Ok(0));
    }

    #[test]
    fn env_alloc_copies_frame_and_returns_zero_to_child() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        {
            let env = rig.envs.get_mut(a).unwrap();
            env.set_priority(5);
            env.frame_mut().sepc = 0x40_0104;
            env.frame_mut().x[8] = 0xfeed;
        }
        let child = EnvId::from_raw(rig.call(a, SYSCALL_ENV_ALLOC, [0; 5]).unwrap() as u32);
        assert!(!child.is_self());
        let env = rig.envs.get(child).unwrap();
        assert_eq!(env.parent(), a);
        assert_eq!(env.status(), EnvStatus::NotRunnable);
        assert_eq!(env.priority(), 5);
        assert_eq!(env.frame().sepc, 0x40_0104);
        assert_eq!(env.frame().x[8], 0xfeed);
        assert_eq!(env.frame().a(0), 0);
        assert!(rig.scheduler.contains(child));
    }

    #[test]
    fn set_env_status_validates_value() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        assert_eq!(rig.call(a, SYSCALL_SET_ENV_STATUS, [0, 7, 0, 0, 0]), Err(Errno::Inval));
        assert_eq!(rig.call(a, SYSCALL_SET_ENV_STATUS, [0, 2, 0, 0, 0]), Ok(0));
        assert_eq!(rig.envs.get(a).unwrap().status(), EnvStatus::NotRunnable);
        assert!(rig.scheduler.contains(a));
    }

    #[test]
    fn destroy_needs_authority_and_retires_id() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let b = rig.spawn(EnvId::SELF);
        let child = rig.spawn(a);
        let b_raw = b.as_raw() as usize;
        let child_raw = child.as_raw() as usize;
        assert_eq!(rig.call(a, SYSCALL_ENV_DESTROY, [b_raw, 0, 0, 0, 0]), Err(Errno::BadEnv));
        assert_eq!(rig.call(a, SYSCALL_ENV_DESTROY, [child_raw, 0, 0, 0, 0]), Ok(0));
        assert!(!rig.scheduler.contains(child));
        assert_eq!(rig.call(a, SYSCALL_ENV_DESTROY, [child_raw, 0, 0, 0, 0]), Err(Errno::BadEnv));
        assert_eq!(rig.call(a, SYSCALL_ENV_DESTROY, [0; 5]), Err(Errno::Unspecified));
        assert!(rig.envs.get(a).is_none());
    }

    #[test]
    fn send_to_non_receiver_changes_nothing() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let b = rig.spawn(EnvId::SELF);
        let b_raw = b.as_raw() as usize;
        assert_eq!(rig.call(a, SYSCALL_IPC_TRY_SEND, [b_raw, 9, 0, 0, 0]), Err(Errno::IpcNotRecv));
        assert_eq!(rig.envs.get(b).unwrap().status(), EnvStatus::Runnable);
        assert_eq!(rig.envs.get(b).unwrap().ipc().value, 0);
    }

    #[test]
    fn send_delivers_once_and_transfers_page() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let b = rig.spawn(EnvId::SELF);
        let b_raw = b.as_raw() as usize;
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RW, 0, 0]).unwrap();
        assert_eq!(rig.call(b, SYSCALL_IPC_RECV, [0x8000, 0, 0, 0, 0]), Err(Errno::Unspecified));
        assert_eq!(rig.envs.get(b).unwrap().status(), EnvStatus::NotRunnable);

        assert_eq!(rig.call(a, SYSCALL_IPC_TRY_SEND, [b_raw, 42, 0x1000, RO, 0]), Ok(0));
        let env = rig.envs.get(b).unwrap();
        assert_eq!(env.status(), EnvStatus::Runnable);
        assert_eq!((env.ipc().from, env.ipc().value, env.ipc().perm), (a, 42, Perm::VALID));
        assert!(!env.ipc().recving);
        assert_eq!(rig.pte(b, 0x8000).unwrap().frame, rig.pte(a, 0x1000).unwrap().frame);

        assert_eq!(rig.call(a, SYSCALL_IPC_TRY_SEND, [b_raw, 43, 0, 0, 0]), Err(Errno::IpcNotRecv));
    }

    #[test]
    fn send_records_perm_without_page() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let b = rig.spawn(EnvId::SELF);
        let b_raw = b.as_raw() as usize;
        let _ = rig.call(b, SYSCALL_IPC_RECV, [0x8000, 0, 0, 0, 0]);
        assert_eq!(rig.call(a, SYSCALL_IPC_TRY_SEND, [b_raw, 5, 0, RW, 0]), Ok(0));
        let env = rig.envs.get(b).unwrap();
        assert_eq!((env.ipc().from, env.ipc().value), (a, 5));
        assert_eq!(env.ipc().perm.bits(), RW);
        assert!(rig.pte(b, 0x8000).is_none());
    }

    #[test]
    fn failed_page_transfer_keeps_receiver_waiting() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let b = rig.spawn(EnvId::SELF);
        let b_raw = b.as_raw() as usize;
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RO, 0, 0]).unwrap();
        let _ = rig.call(b, SYSCALL_IPC_RECV, [0x8000, 0, 0, 0, 0]);
        assert_eq!(rig.call(a, SYSCALL_IPC_TRY_SEND, [b_raw, 1, 0x1000, RW, 0]), Err(Errno::Inval));
        assert!(rig.envs.get(b).unwrap().ipc().recving);
        assert_eq!(rig.envs.get(b).unwrap().status(), EnvStatus::NotRunnable);
    }

    #[test]
    #[should_panic(expected = "RecvAboveUtop")]
    fn recv_above_utop_halts() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        let _ = rig.call(a, SYSCALL_IPC_RECV, [UTOP, 0, 0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "UserPanic")]
    fn panic_syscall_halts_with_message() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RW, 0, 0]).unwrap();
        let frame = rig.pte(a, 0x1000).unwrap().frame;
        rig.frames.bytes_mut(frame)[..5].copy_from_slice(b"boom\0");
        let _ = rig.call(a, SYSCALL_PANIC, [0x1000, 0, 0, 0, 0]);
    }

    #[test]
    fn write_dev_checks_window_and_buffer() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RW, 0, 0]).unwrap();
        assert_eq!(
            rig.call(a, SYSCALL_WRITE_DEV, [0x1000, 0x1300_4300, 0x10, 0, 0]),
            Err(Errno::Inval)
        );
        assert_eq!(
            rig.call(a, SYSCALL_WRITE_DEV, [0x7000, 0x1000_0000, 1, 0, 0]),
            Err(Errno::Inval)
        );
        let frame = rig.pte(a, 0x1000).unwrap().frame;
        rig.frames.bytes_mut(frame)[..3].copy_from_slice(b"ok\n");
        assert_eq!(rig.call(a, SYSCALL_WRITE_DEV, [0x1000, 0x1000_0000, 3, 0, 0]), Ok(0));
        assert_eq!(rig.devices.console.take_output(), b"ok\n");
    }

    #[test]
    fn read_dev_needs_writable_buffer() {
        let mut rig = Rig::new();
        let a = rig.spawn(EnvId::SELF);
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x1000, RO, 0, 0]).unwrap();
        rig.call(a, SYSCALL_MEM_ALLOC, [0, 0x2000, RW, 0, 0]).unwrap();
        rig.devices.console.push_input(b"q");
        assert_eq!(rig.call(a, SYSCALL_READ_DEV, [0x1000, 0x1000_0000, 1, 0, 0]), Err(Errno::Inval));
        assert_eq!(rig.call(a, SYSCALL_READ_DEV, [0x2000 + PAGE_SIZE - 1, 0x1000_0000, 1, 0, 0]), Ok(0));
        let frame = rig.pte(a, 0x2000).unwrap().frame;
        assert_eq!(rig.frames.bytes(frame)[PAGE_SIZE - 1], b'q');
    }
}
