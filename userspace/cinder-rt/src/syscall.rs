// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed syscall wrappers. Negative returns decode to [`Errno`].

use core::fmt::{self, Write};

use cinder_abi::layout::{PAGE_SIZE, PFTEMP};
use cinder_abi::{
    EnvId, EnvStatus, Errno, Perm, Trap, SYSCALL_CGETC, SYSCALL_ENV_ALLOC, SYSCALL_ENV_DESTROY,
    SYSCALL_GETENVID, SYSCALL_IPC_RECV, SYSCALL_IPC_TRY_SEND, SYSCALL_MEM_ALLOC, SYSCALL_MEM_MAP,
    SYSCALL_MEM_UNMAP, SYSCALL_PANIC, SYSCALL_PUTCHAR, SYSCALL_READ_DEV, SYSCALL_SET_ENV_STATUS,
    SYSCALL_SET_PGFAULT_HANDLER, SYSCALL_SET_TRAPFRAME, SYSCALL_WRITE_DEV, SYSCALL_YIELD,
};

/// Longest panic message handed to the kernel, NUL included.
const PANIC_MSG_MAX: usize = 256;

#[inline]
fn call<T: Trap>(port: &mut T, number: usize, args: [usize; 5]) -> Result<usize, Errno> {
    Errno::from_ret(port.syscall(number, args))
}

#[inline]
fn id(env: EnvId) -> usize {
    env.as_raw() as usize
}

/// Writes one byte to the console.
pub fn putchar<T: Trap>(port: &mut T, byte: u8) {
    let _ = call(port, SYSCALL_PUTCHAR, [byte as usize, 0, 0, 0, 0]);
}

/// Writes `text` to the console byte by byte.
pub fn print<T: Trap>(port: &mut T, text: &str) {
    for byte in text.bytes() {
        putchar(port, byte);
    }
}

/// Identifier of the calling environment.
pub fn getenvid<T: Trap>(port: &mut T) -> EnvId {
    let raw = port.syscall(SYSCALL_GETENVID, [0; 5]);
    EnvId::from_raw(raw as u32)
}

/// Gives up the processor. Returns once the kernel has switched away.
pub fn yield_now<T: Trap>(port: &mut T) {
    let _ = call(port, SYSCALL_YIELD, [0; 5]);
}

/// Destroys `env` (the caller or one of its children).
pub fn env_destroy<T: Trap>(port: &mut T, env: EnvId) -> Result<(), Errno> {
    call(port, SYSCALL_ENV_DESTROY, [id(env), 0, 0, 0, 0]).map(drop)
}

/// Registers `entry` as `env`'s write-fault handler running on the stack ending at `xstacktop`.
pub fn set_pgfault_handler<T: Trap>(
    port: &mut T,
    env: EnvId,
    entry: usize,
    xstacktop: usize,
) -> Result<(), Errno> {
    call(port, SYSCALL_SET_PGFAULT_HANDLER, [id(env), entry, xstacktop, 0, 0]).map(drop)
}

/// Maps a fresh zeroed page at `va` in `env`.
pub fn mem_alloc<T: Trap>(port: &mut T, env: EnvId, va: usize, perm: Perm) -> Result<(), Errno> {
    call(port, SYSCALL_MEM_ALLOC, [id(env), va, perm.bits(), 0, 0]).map(drop)
}

/// Shares the page at `src_va` of `src` with `dst` at `dst_va`.
pub fn mem_map<T: Trap>(
    port: &mut T,
    src: EnvId,
    src_va: usize,
    dst: EnvId,
    dst_va: usize,
    perm: Perm,
) -> Result<(), Errno> {
    call(port, SYSCALL_MEM_MAP, [id(src), src_va, id(dst), dst_va, perm.bits()]).map(drop)
}

/// Removes the mapping at `va` in `env`.
pub fn mem_unmap<T: Trap>(port: &mut T, env: EnvId, va: usize) -> Result<(), Errno> {
    call(port, SYSCALL_MEM_UNMAP, [id(env), va, 0, 0, 0]).map(drop)
}

/// Creates a child with a copy of the caller's registers.
///
/// Returns the raw a0: the child id in the parent, 0 once the child runs.
pub fn env_alloc<T: Trap>(port: &mut T) -> Result<usize, Errno> {
    call(port, SYSCALL_ENV_ALLOC, [0; 5])
}

/// Changes the scheduling status of `env`.
pub fn set_env_status<T: Trap>(port: &mut T, env: EnvId, status: EnvStatus) -> Result<(), Errno> {
    call(port, SYSCALL_SET_ENV_STATUS, [id(env), status as usize, 0, 0, 0]).map(drop)
}

/// Replaces `env`'s saved registers with the frame at `tf_va`.
pub fn set_trapframe<T: Trap>(port: &mut T, env: EnvId, tf_va: usize) -> Result<(), Errno> {
    call(port, SYSCALL_SET_TRAPFRAME, [id(env), tf_va, 0, 0, 0]).map(drop)
}

/// Sends `value` (and the page at `src_va` when non-zero) to `env` if it is receiving.
pub fn ipc_try_send<T: Trap>(
    port: &mut T,
    env: EnvId,
    value: usize,
    src_va: usize,
    perm: Perm,
) -> Result<(), Errno> {
    call(port, SYSCALL_IPC_TRY_SEND, [id(env), value, src_va, perm.bits(), 0]).map(drop)
}

/// Blocks until a message arrives; a transferred page lands at `dst_va`.
pub fn ipc_recv<T: Trap>(port: &mut T, dst_va: usize) -> Result<(), Errno> {
    call(port, SYSCALL_IPC_RECV, [dst_va, 0, 0, 0, 0]).map(drop)
}

/// Next console input byte, 0 when none is pending.
pub fn cgetc<T: Trap>(port: &mut T) -> u8 {
    port.syscall(SYSCALL_CGETC, [0; 5]) as u8
}

/// Copies `len` bytes from user memory at `va` to device address `dev`.
pub fn write_dev<T: Trap>(port: &mut T, va: usize, dev: usize, len: usize) -> Result<(), Errno> {
    call(port, SYSCALL_WRITE_DEV, [va, dev, len, 0, 0]).map(drop)
}

/// Copies `len` bytes from device address `dev` into user memory at `va`.
pub fn read_dev<T: Trap>(port: &mut T, va: usize, dev: usize, len: usize) -> Result<(), Errno> {
    call(port, SYSCALL_READ_DEV, [va, dev, len, 0, 0]).map(drop)
}

struct MsgBuf {
    bytes: [u8; PANIC_MSG_MAX],
    len: usize,
}

impl Write for MsgBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // keep one byte for the terminating NUL
        let room = PANIC_MSG_MAX - 1 - self.len;
        let take = s.len().min(room);
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Stops the whole system with a message.
///
/// The message is staged on the fault scratch page so the kernel can read it from user memory.
pub fn user_panic<T: Trap>(port: &mut T, args: fmt::Arguments<'_>) -> ! {
    let mut msg = MsgBuf { bytes: [0; PANIC_MSG_MAX], len: 0 };
    let _ = msg.write_fmt(args);
    let staged = mem_alloc(port, EnvId::SELF, PFTEMP, Perm::VALID | Perm::WRITABLE).is_ok()
        && port.store(PFTEMP, &msg.bytes[..msg.len + 1]).is_ok();
    let va = if staged { PFTEMP } else { 0 };
    port.syscall(SYSCALL_PANIC, [va, 0, 0, 0, 0]);
    unreachable!("panic syscall returned");
}

static_assertions::const_assert!(PANIC_MSG_MAX <= PAGE_SIZE);
