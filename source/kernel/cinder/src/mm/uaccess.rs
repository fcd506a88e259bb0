// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Kernel copies to and from user memory through an environment's page directory.

use cinder_abi::layout::{PAGE_SIZE, UTOP};

use super::{FramePool, MmError, PageDirectory};
use crate::types::VirtAddr;

// Yields (page va, offset in page, byte range in the caller buffer) for `[va, va + len)`.
fn chunks(va: usize, len: usize) -> impl Iterator<Item = (VirtAddr, usize, core::ops::Range<usize>)> {
    let mut done = 0;
    core::iter::from_fn(move || {
        if done >= len {
            return None;
        }
        let at = VirtAddr::new(va + done);
        let take = (PAGE_SIZE - at.page_offset()).min(len - done);
        let item = (at.page(), at.page_offset(), done..done + take);
        done += take;
        Some(item)
    })
}

fn check_range(va: usize, len: usize) -> Result<(), MmError> {
    match va.checked_add(len) {
        Some(end) if end <= UTOP => Ok(()),
        _ => Err(MmError::OutOfRange),
    }
}

/// Verifies every page of `[va, va + len)` is mapped (and writable when `write` is set).
pub fn check_user(space: &PageDirectory, va: usize, len: usize, write: bool) -> Result<(), MmError> {
    check_range(va, len)?;
    for (page, _, _) in chunks(va, len) {
        let pte = space.lookup(page).ok_or(MmError::NotMapped)?;
        if write && !pte.perm.is_writable() {
            return Err(MmError::PermissionDenied);
        }
    }
    Ok(())
}

/// Copies `buf.len()` bytes of user memory at `va` into `buf`.
pub fn copy_from_user(
    space: &PageDirectory,
    frames: &FramePool,
    va: usize,
    buf: &mut [u8],
) -> Result<(), MmError> {
    check_user(space, va, buf.len(), false)?;
    for (page, offset, range) in chunks(va, buf.len()) {
        let pte = space.lookup(page).ok_or(MmError::NotMapped)?;
        let len = range.len();
        buf[range].copy_from_slice(&frames.bytes(pte.frame)[offset..offset + len]);
    }
    Ok(())
}

/// Copies `data` into user memory at `va`. Nothing is written unless every page is writable.
pub fn copy_to_user(
    space: &PageDirectory,
    frames: &mut FramePool,
    va: usize,
    data: &[u8],
) -> Result<(), MmError> {
    check_user(space, va, data.len(), true)?;
    for (page, offset, range) in chunks(va, data.len()) {
        let pte = space.lookup(page).ok_or(MmError::NotMapped)?;
        let len = range.len();
        frames.bytes_mut(pte.frame)[offset..offset + len].copy_from_slice(&data[range]);
    }
    Ok(())
}
