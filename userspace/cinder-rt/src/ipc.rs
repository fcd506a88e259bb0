// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous IPC helpers.
//!
//! Both directions involve a context switch, so each is split at the switch: [`send`] makes one
//! attempt and yields when the target is not waiting; [`recv_begin`] blocks and
//! [`recv_finish`] reads the delivered message once the receiver runs again.

use cinder_abi::{EnvId, Errno, Perm, Trap};

use crate::syscall::{self, user_panic};

/// Result of one send attempt.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The target received the message and is Runnable again.
    Delivered,
    /// The target was not receiving; the caller yielded and should retry when it runs again.
    Pending,
}

/// A delivered message as recorded in the receiver's env slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Received {
    /// Sending environment.
    pub from: EnvId,
    /// 32-bit payload.
    pub value: usize,
    /// Permission the sender passed along with the message.
    pub perm: Perm,
}

/// Tries once to send `value` (and the page at `src_va`, if non-zero) to `to`.
///
/// Errors other than "not receiving" are fatal.
pub fn send<T: Trap>(port: &mut T, to: EnvId, value: usize, src_va: usize, perm: Perm) -> SendOutcome {
    match syscall::ipc_try_send(port, to, value, src_va, perm) {
        Ok(()) => SendOutcome::Delivered,
        Err(Errno::IpcNotRecv) => {
            syscall::yield_now(port);
            SendOutcome::Pending
        }
        Err(err) => user_panic(port, format_args!("ipc_send to {}: {}", to, err)),
    }
}

/// Starts waiting for a message; a page, if sent, is mapped at `dst_va`.
pub fn recv_begin<T: Trap>(port: &mut T, dst_va: usize) {
    if let Err(err) = syscall::ipc_recv(port, dst_va) {
        user_panic(port, format_args!("ipc_recv: {}", err));
    }
}

/// Reads the message delivered since [`recv_begin`].
pub fn recv_finish<T: Trap>(port: &mut T) -> Received {
    match port.env(EnvId::SELF) {
        Some(me) => Received { from: me.ipc_from, value: me.ipc_value, perm: me.ipc_perm },
        None => user_panic(port, format_args!("own env slot unreadable")),
    }
}
