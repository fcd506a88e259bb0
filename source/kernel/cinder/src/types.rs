// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Kernel newtypes for addresses and identifiers
//! OWNERS: @kernel-team
//! PUBLIC API: EnvId, VirtAddr, FrameNumber
//! INVARIANTS: VirtAddr::user only yields addresses below UTOP

use core::fmt;

use cinder_abi::layout::{page_base, PAGE_SIZE, UTOP};

pub use cinder_abi::EnvId;

/// Virtual address inside some environment's address space.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Wraps any address (kernel-internal use).
    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Accepts only user-accessible addresses (`< UTOP`).
    #[inline]
    pub const fn user(raw: usize) -> Option<Self> {
        if raw < UTOP {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Base address of the containing page.
    #[inline]
    pub const fn page(self) -> Self {
        Self(page_base(self.0))
    }

    /// Offset inside the containing page.
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }

    #[inline]
    pub fn checked_add(self, len: usize) -> Option<Self> {
        self.0.checked_add(len).map(Self)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Physical frame number.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameNumber(usize);

impl FrameNumber {
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_addresses_stop_at_utop() {
        assert!(VirtAddr::user(UTOP - 1).is_some());
        assert!(VirtAddr::user(UTOP).is_none());
        let va = VirtAddr::new(0x40_1234);
        assert_eq!(va.page().raw(), 0x40_1000);
        assert_eq!(va.page_offset(), 0x234);
    }
}
