// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! User address-space layout.
//!
//! ```text
//!  UVPT   0x7fc0_0000  read-only page-table window (kernel owned)
//!  UPAGES 0x7f80_0000  read-only frame descriptors (kernel owned)
//!  UENVS  0x7f40_0000  read-only env table window (kernel owned)
//!  UTOP = UXSTACKTOP   ------------------------------------------
//!         0x7f3f_f000  exception stack page
//!         0x7f3f_e000  fault-handler scratch page (never duplicated by fork)
//!  USTACKTOP           ------------------------------------------
//!         ...          normal user stack grows down
//!  UTEXT  0x0040_0000  program text
//! ```

use static_assertions::const_assert;

/// Bytes per page.
pub const PAGE_SIZE: usize = 4096;
/// Shift from a virtual address to its page number.
pub const PGSHIFT: usize = 12;
/// Shift from a virtual address to its page-directory index.
pub const PDSHIFT: usize = 22;
/// Entries in a page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Top of user-owned virtual memory; every user-supplied address must lie below.
pub const UTOP: usize = 0x7f40_0000;
/// Read-only env table window.
pub const UENVS: usize = UTOP;
/// Read-only frame-descriptor window.
pub const UPAGES: usize = 0x7f80_0000;
/// Read-only page-table window.
pub const UVPT: usize = 0x7fc0_0000;
/// First address reserved to the kernel.
pub const ULIM: usize = 0x8000_0000;
/// Top of the exception stack used for fault upcalls.
pub const UXSTACKTOP: usize = UTOP;
/// Top of the normal user stack.
pub const USTACKTOP: usize = UTOP - 2 * PAGE_SIZE;
/// Start of program text.
pub const UTEXT: usize = 0x0040_0000;

/// Page the fault handler uses to stage the private copy.
pub const PFTEMP: usize = UXSTACKTOP - 2 * PAGE_SIZE;

const_assert!(UTOP % PAGE_SIZE == 0);
const_assert!(USTACKTOP < UXSTACKTOP);
const_assert!(PFTEMP >= USTACKTOP);
const_assert!(UENVS < UPAGES && UPAGES < UVPT && UVPT < ULIM);

/// Rounds `va` down to its page base.
#[inline]
pub const fn page_base(va: usize) -> usize {
    va & !(PAGE_SIZE - 1)
}

/// Page-directory index of `va`.
#[inline]
pub const fn pdx(va: usize) -> usize {
    (va >> PDSHIFT) & (ENTRIES_PER_TABLE - 1)
}

/// Page-table index of `va`.
#[inline]
pub const fn ptx(va: usize) -> usize {
    (va >> PGSHIFT) & (ENTRIES_PER_TABLE - 1)
}

/// Rebuilds a virtual address from directory and table indices.
#[inline]
pub const fn va_from(pdx: usize, ptx: usize) -> usize {
    (pdx << PDSHIFT) | (ptx << PGSHIFT)
}
