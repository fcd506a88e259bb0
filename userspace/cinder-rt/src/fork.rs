// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Copy-on-write fork built from kernel primitives
//! OWNERS: @runtime
//! PUBLIC API: fork(port), resume(port, a0), ForkReturn
//! DEPENDS_ON: syscall, pgfault
//! INVARIANTS: Writable private pages end up COW in both parent and child; shared-library pages
//!             stay shared; the child is made Runnable only after its memory and handler are set
//!
//! `env_alloc` returns twice: the child id in the parent right away, and 0 in the child once the
//! kernel first dispatches it. The two observers are the two [`ForkReturn`] variants; whoever
//! drives the child calls [`resume`] with the a0 it observes.

use cinder_abi::layout::{pdx, PAGE_SIZE, PDSHIFT, USTACKTOP, UXSTACKTOP};
use cinder_abi::{EnvId, EnvStatus, Errno, Mapping, Perm, Trap};

use crate::pgfault::{self, COW_FAULT_ENTRY, XSTACK_PAGE};
use crate::syscall;

/// Which side of a fork the caller is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkReturn {
    /// The caller is the parent; the value is the new child.
    Parent(EnvId),
    /// The caller is the child; the value is its own id.
    Child(EnvId),
}

/// Forks the caller. Returns in the parent with the child already Runnable.
pub fn fork<T: Trap>(port: &mut T) -> Result<ForkReturn, Errno> {
    pgfault::set_pgfault_handler(port, COW_FAULT_ENTRY)?;
    let a0 = syscall::env_alloc(port)?;
    let child = match resume(port, a0) {
        ForkReturn::Parent(child) => child,
        child @ ForkReturn::Child(_) => return Ok(child),
    };

    let mut va = 0;
    while va < USTACKTOP {
        if !port.table_present(va) {
            va = (pdx(va) + 1) << PDSHIFT;
            continue;
        }
        if let Some(mapping) = port.mapping(va) {
            duppage(port, child, va, mapping)?;
        }
        va += PAGE_SIZE;
    }

    syscall::mem_alloc(port, child, XSTACK_PAGE, Perm::VALID | Perm::WRITABLE)?;
    syscall::set_pgfault_handler(port, child, COW_FAULT_ENTRY, UXSTACKTOP)?;
    syscall::set_env_status(port, child, EnvStatus::Runnable)?;
    Ok(ForkReturn::Parent(child))
}

/// Continues after `env_alloc` returned `a0`.
///
/// A zero a0 means the caller is the freshly started child; it looks up its own id again since
/// anything computed before the fork describes the parent.
pub fn resume<T: Trap>(port: &mut T, a0: usize) -> ForkReturn {
    if a0 == 0 {
        ForkReturn::Child(syscall::getenvid(port))
    } else {
        ForkReturn::Parent(EnvId::from_raw(a0 as u32))
    }
}

// Shares one page with the child, turning private writable pages into COW on both sides.
fn duppage<T: Trap>(port: &mut T, child: EnvId, va: usize, mapping: Mapping) -> Result<(), Errno> {
    let perm = mapping.perm;
    if perm.is_writable() && !perm.is_shared_library() && !perm.is_copy_on_write() {
        let cow = (perm - Perm::WRITABLE) | Perm::COW;
        // map the child before downgrading our own copy
        syscall::mem_map(port, EnvId::SELF, va, child, va, cow)?;
        syscall::mem_map(port, EnvId::SELF, va, EnvId::SELF, va, cow)?;
    } else {
        syscall::mem_map(port, EnvId::SELF, va, child, va, perm)?;
    }
    Ok(())
}
