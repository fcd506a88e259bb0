// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Unit tests for frame refcounts and page-directory bookkeeping
//! OWNERS: @kernel-mm-team
//! NOTE: Tests only; verify free-list/refcount coupling, insert/replace/remove, release

use cinder_abi::layout::{pdx, UTOP};
use cinder_abi::Perm;
use proptest::prelude::*;

use super::{FramePool, MmError, PageDirectory};
use crate::types::VirtAddr;

const RW: Perm = Perm::VALID.union(Perm::WRITABLE);

#[test]
fn fresh_frames_are_zeroed_and_unreferenced() {
    let mut pool = FramePool::new(2);
    let f = pool.alloc().unwrap();
    pool.bytes_mut(f)[0] = 0xaa;
    pool.incref(f);
    assert!(pool.decref(f));
    let again = pool.alloc().unwrap();
    let other = pool.alloc().unwrap();
    assert!(again == f || other == f);
    assert!(pool.bytes(f).iter().all(|b| *b == 0));
    assert_eq!(pool.refcount(f), 0);
}

#[test]
fn exhaustion_reports_no_mem() {
    let mut pool = FramePool::new(1);
    let f = pool.alloc().unwrap();
    assert_eq!(pool.alloc(), Err(MmError::NoMem));
    pool.release_if_unused(f);
    assert_eq!(pool.free_count(), 1);
}

#[test]
fn directory_charges_root_and_tables() {
    let mut pool = FramePool::new(8);
    let mut dir = PageDirectory::new(&mut pool).unwrap();
    assert_eq!(pool.free_count(), 7);
    assert_eq!(dir.kernel_entries(), 1024 - pdx(UTOP));

    let page = pool.alloc().unwrap();
    dir.insert(&mut pool, VirtAddr::new(0x40_0000), page, RW).unwrap();
    // root + table + page
    assert_eq!(pool.free_count(), 5);
    assert_eq!(pool.refcount(page), 1);

    dir.release(&mut pool);
    assert_eq!(pool.free_count(), 8);
}

#[test]
fn reinsert_same_frame_only_changes_perm() {
    let mut pool = FramePool::new(4);
    let mut dir = PageDirectory::new(&mut pool).unwrap();
    let page = pool.alloc().unwrap();
    let va = VirtAddr::new(0x1000);
    dir.insert(&mut pool, va, page, RW).unwrap();
    dir.insert(&mut pool, va, page, Perm::VALID | Perm::COW).unwrap();
    assert_eq!(pool.refcount(page), 1);
    assert_eq!(dir.lookup(va).unwrap().perm, Perm::VALID | Perm::COW);
}

#[test]
fn replacing_a_mapping_drops_the_old_frame() {
    let mut pool = FramePool::new(4);
    let mut dir = PageDirectory::new(&mut pool).unwrap();
    let first = pool.alloc().unwrap();
    let va = VirtAddr::new(0x2000);
    dir.insert(&mut pool, va, first, RW).unwrap();
    let second = pool.alloc().unwrap();
    dir.insert(&mut pool, va, second, RW).unwrap();
    assert_eq!(pool.refcount(first), 0);
    assert_eq!(pool.refcount(second), 1);
    assert_eq!(dir.remove(&mut pool, va).map(|pte| pte.frame), Some(second));
    assert_eq!(dir.remove(&mut pool, va), None);
}

#[test]
fn kernel_range_is_not_mappable() {
    let mut pool = FramePool::new(4);
    let mut dir = PageDirectory::new(&mut pool).unwrap();
    let page = pool.alloc().unwrap();
    assert_eq!(dir.insert(&mut pool, VirtAddr::new(UTOP), page, RW), Err(MmError::OutOfRange));
    assert!(dir.lookup(VirtAddr::new(UTOP)).is_none());
}

#[test]
fn mappings_walk_in_address_order() {
    let mut pool = FramePool::new(8);
    let mut dir = PageDirectory::new(&mut pool).unwrap();
    for va in [0x80_0000usize, 0x1000, 0x40_3000] {
        let page = pool.alloc().unwrap();
        dir.insert(&mut pool, VirtAddr::new(va), page, RW).unwrap();
    }
    let vas: Vec<usize> = dir.mappings().map(|(va, _)| va.raw()).collect();
    assert_eq!(vas, vec![0x1000, 0x40_3000, 0x80_0000]);
}

proptest! {
    // A frame shared by N directories is freed exactly when the last one lets go.
    #[test]
    fn shared_frame_freed_with_last_reference(holders in 1usize..6, order in proptest::collection::vec(any::<u8>(), 6)) {
        let mut pool = FramePool::new(32);
        let page = pool.alloc().unwrap();
        let mut dirs: Vec<PageDirectory> = (0..holders)
            .map(|_| PageDirectory::new(&mut pool).unwrap())
            .collect();
        for dir in dirs.iter_mut() {
            dir.insert(&mut pool, VirtAddr::new(0x5000), page, Perm::VALID).unwrap();
        }
        prop_assert_eq!(pool.refcount(page) as usize, holders);

        let mut remaining = holders;
        while !dirs.is_empty() {
            let pick = order[remaining - 1] as usize % dirs.len();
            let mut dir = dirs.swap_remove(pick);
            let freed_before = pool.free_count();
            dir.remove(&mut pool, VirtAddr::new(0x5000));
            remaining -= 1;
            prop_assert_eq!(pool.refcount(page) as usize, remaining);
            let page_freed = pool.free_count() == freed_before + 1;
            prop_assert_eq!(page_freed, remaining == 0);
            dir.release(&mut pool);
        }
        prop_assert_eq!(pool.free_count(), 32);
    }
}
