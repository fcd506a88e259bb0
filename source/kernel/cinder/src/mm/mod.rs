// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Physical frames and two-level user page tables
//! OWNERS: @kernel-mm-team
//! PUBLIC API: FramePool, PageDirectory, Pte, MmError, PAGE_SIZE, uaccess::{copy_from_user, copy_to_user}
//! DEPENDS_ON: cinder_abi::{layout, Perm}
//! INVARIANTS: A frame is back on the free list exactly when its refcount drops to zero;
//!             refcounts never go negative; kernel directory entries are shared, never freed

mod frame;
mod page_table;
pub mod uaccess;

#[cfg(test)]
mod tests;

use core::fmt;

pub use cinder_abi::layout::PAGE_SIZE;
pub use frame::FramePool;
pub use page_table::{PageDirectory, Pte};

/// Error returned by memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// No free frame left.
    NoMem,
    /// Address lies outside user memory.
    OutOfRange,
    /// No mapping at the address.
    NotMapped,
    /// Mapping does not allow the access.
    PermissionDenied,
}

impl fmt::Display for MmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
