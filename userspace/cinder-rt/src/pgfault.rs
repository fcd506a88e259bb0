// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: User-mode write-fault handling
//! OWNERS: @runtime
//! PUBLIC API: set_pgfault_handler(entry), store(va, data), handle_cow_fault(va), COW_FAULT_ENTRY
//! DEPENDS_ON: syscall, cinder_abi::layout
//! INVARIANTS: The exception stack page is mapped writable before a handler is registered;
//!             the COW handler only ever replaces pages marked COW

use core::mem::size_of;

use cinder_abi::layout::{page_base, PAGE_SIZE, PFTEMP, UTEXT, UXSTACKTOP};
use cinder_abi::{EnvId, FaultUpcall, Perm, Trap};

use crate::syscall::{self, user_panic};

/// Entry address registered for the copy-on-write handler.
pub const COW_FAULT_ENTRY: usize = UTEXT;

/// Exception stack page of every environment that handles faults.
pub const XSTACK_PAGE: usize = UXSTACKTOP - PAGE_SIZE;

const RW: Perm = Perm::VALID.union(Perm::WRITABLE);

/// Registers `entry` as the caller's write-fault handler.
///
/// The exception stack page is allocated the first time; later calls only swap the entry.
pub fn set_pgfault_handler<T: Trap>(port: &mut T, entry: usize) -> Result<(), cinder_abi::Errno> {
    let stack_ready = port.mapping(XSTACK_PAGE).is_some_and(|m| m.perm.is_writable());
    if !stack_ready {
        syscall::mem_alloc(port, EnvId::SELF, XSTACK_PAGE, RW)?;
    }
    syscall::set_pgfault_handler(port, EnvId::SELF, entry, UXSTACKTOP)
}

/// Stores `data` at `va`, running the fault handler and retrying whenever the kernel
/// reports a write fault.
///
/// A fault the handler does not resolve is fatal.
pub fn store<T: Trap>(port: &mut T, va: usize, data: &[u8]) {
    let mut last_fault = None;
    loop {
        match port.store(va, data) {
            Ok(()) => return,
            Err(upcall) => {
                if last_fault == Some(page_base(upcall.va)) {
                    user_panic(port, format_args!("fault at {:#x} not resolved", upcall.va));
                }
                last_fault = Some(page_base(upcall.va));
                deliver(port, upcall);
            }
        }
    }
}

// Runs the handler named by `upcall` on the exception stack.
fn deliver<T: Trap>(port: &mut T, upcall: FaultUpcall) {
    // fault record at the top of the exception stack
    let slot = upcall.stack_top - size_of::<usize>();
    if port.store(slot, &upcall.va.to_le_bytes()).is_err() {
        user_panic(port, format_args!("exception stack at {:#x} not writable", slot));
    }
    match upcall.entry {
        COW_FAULT_ENTRY => handle_cow_fault(port, upcall.va),
        other => user_panic(port, format_args!("no handler at entry {:#x}", other)),
    }
}

/// Gives the caller a private writable copy of the COW page containing `va`.
pub fn handle_cow_fault<T: Trap>(port: &mut T, va: usize) {
    let page = page_base(va);
    let perm = match port.mapping(page) {
        Some(m) if m.perm.is_copy_on_write() => m.perm,
        _ => user_panic(port, format_args!("write fault at {:#x} on a non-COW page", va)),
    };
    if let Err(err) = syscall::mem_alloc(port, EnvId::SELF, PFTEMP, RW) {
        user_panic(port, format_args!("cow {:#x}: scratch alloc: {}", va, err));
    }
    let mut buf = [0u8; PAGE_SIZE];
    port.load(page, &mut buf);
    if port.store(PFTEMP, &buf).is_err() {
        user_panic(port, format_args!("cow {:#x}: scratch page not writable", va));
    }
    let private = (perm - Perm::COW) | Perm::WRITABLE;
    if let Err(err) = syscall::mem_map(port, EnvId::SELF, PFTEMP, EnvId::SELF, page, private) {
        user_panic(port, format_args!("cow {:#x}: remap: {}", va, err));
    }
    if let Err(err) = syscall::mem_unmap(port, EnvId::SELF, PFTEMP) {
        user_panic(port, format_args!("cow {:#x}: unmap scratch: {}", va, err));
    }
}
