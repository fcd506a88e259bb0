// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Boot image loader for the first environments
//! OWNERS: @kernel-team
//! PUBLIC API: Image, Segment, load_image(space, frames, image)
//! INVARIANTS: Segments stay below USTACKTOP; overlapping segments share pages

use cinder_abi::layout::{page_base, PAGE_SIZE, USTACKTOP};
use cinder_abi::Perm;

use crate::mm::{FramePool, MmError, PageDirectory};
use crate::types::VirtAddr;

/// One loadable region of a boot image.
#[derive(Clone, Copy, Debug)]
pub struct Segment<'a> {
    pub va: usize,
    /// Size in memory; bytes past `data.len()` are zero.
    pub mem_len: usize,
    pub perm: Perm,
    pub data: &'a [u8],
}

/// Pre-split program image handed to [`crate::Kernel::create_env`].
#[derive(Clone, Copy, Debug)]
pub struct Image<'a> {
    pub entry: usize,
    pub segments: &'a [Segment<'a>],
}

impl Image<'static> {
    /// Image with no code; useful when the environment is driven entirely from outside.
    pub const fn empty(entry: usize) -> Self {
        Self { entry, segments: &[] }
    }
}

/// Errors surfaced while loading an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// Segment bounds overflowed or reached the stack area.
    SegmentOutOfRange,
    /// File bytes exceed the in-memory size.
    Truncated,
    /// Frame pool ran out.
    NoMem,
}

impl From<MmError> for LoadError {
    fn from(value: MmError) -> Self {
        match value {
            MmError::NoMem => Self::NoMem,
            _ => Self::SegmentOutOfRange,
        }
    }
}

/// Maps every segment of `image` into `space` and copies its bytes.
pub fn load_image(
    space: &mut PageDirectory,
    frames: &mut FramePool,
    image: &Image<'_>,
) -> Result<(), LoadError> {
    for seg in image.segments {
        if seg.data.len() > seg.mem_len {
            return Err(LoadError::Truncated);
        }
        let end = seg.va.checked_add(seg.mem_len).ok_or(LoadError::SegmentOutOfRange)?;
        if end > USTACKTOP {
            return Err(LoadError::SegmentOutOfRange);
        }
        let mut page = page_base(seg.va);
        while page < end {
            let va = VirtAddr::new(page);
            let frame = match space.lookup(va) {
                Some(pte) => pte.frame,
                None => {
                    let frame = frames.alloc()?;
                    if let Err(err) = space.insert(frames, va, frame, seg.perm) {
                        frames.release_if_unused(frame);
                        return Err(err.into());
                    }
                    frame
                }
            };
            // copy the part of the file image that falls in this page
            let lo = seg.va.max(page);
            let hi = (seg.va + seg.data.len()).min(page + PAGE_SIZE);
            if lo < hi {
                let src = &seg.data[lo - seg.va..hi - seg.va];
                frames.bytes_mut(frame)[lo - page..hi - page].copy_from_slice(src);
            }
            page += PAGE_SIZE;
        }
    }
    Ok(())
}
