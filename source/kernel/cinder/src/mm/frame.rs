// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reference-counted physical frame pool.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use super::{MmError, PAGE_SIZE};
use crate::panic::{halt, HaltReason};
use crate::types::FrameNumber;

#[derive(Default)]
struct Frame {
    refs: u32,
    in_use: bool,
    // materialised on first allocation
    data: Option<Box<[u8]>>,
}

/// Fixed pool of page frames with per-frame reference counts.
///
/// A freshly allocated frame starts with a count of zero; whoever installs it takes the first
/// reference. A frame that is never referenced goes back through [`FramePool::release_if_unused`].
pub struct FramePool {
    frames: Vec<Frame>,
    free: VecDeque<FrameNumber>,
}

impl FramePool {
    /// Creates a pool of `count` frames, all free.
    pub fn new(count: usize) -> Self {
        let mut frames = Vec::with_capacity(count);
        frames.resize_with(count, Frame::default);
        Self { frames, free: (0..count).map(FrameNumber::from_index).collect() }
    }

    /// Takes a zero-filled frame off the free list.
    pub fn alloc(&mut self) -> Result<FrameNumber, MmError> {
        let number = self.free.pop_front().ok_or(MmError::NoMem)?;
        let frame = &mut self.frames[number.as_index()];
        match frame.data.as_mut() {
            Some(bytes) => bytes.fill(0),
            None => frame.data = Some(vec![0u8; PAGE_SIZE].into_boxed_slice()),
        }
        frame.in_use = true;
        frame.refs = 0;
        Ok(number)
    }

    /// Adds one reference.
    pub fn incref(&mut self, number: FrameNumber) {
        let frame = self.frame_mut(number);
        if !frame.in_use {
            halt(HaltReason::Corrupted, format_args!("incref on free {}", number));
        }
        frame.refs += 1;
    }

    /// Drops one reference; returns true when the frame went back to the free list.
    pub fn decref(&mut self, number: FrameNumber) -> bool {
        let frame = self.frame_mut(number);
        if frame.refs == 0 {
            halt(HaltReason::Corrupted, format_args!("decref below zero on {}", number));
        }
        frame.refs -= 1;
        if frame.refs == 0 {
            frame.in_use = false;
            self.free.push_back(number);
            return true;
        }
        false
    }

    /// Returns a just-allocated frame nobody ended up referencing.
    pub fn release_if_unused(&mut self, number: FrameNumber) {
        let frame = self.frame_mut(number);
        if frame.in_use && frame.refs == 0 {
            frame.in_use = false;
            self.free.push_back(number);
        }
    }

    pub fn refcount(&self, number: FrameNumber) -> u32 {
        self.frames.get(number.as_index()).map_or(0, |f| f.refs)
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Contents of an allocated frame.
    pub fn bytes(&self, number: FrameNumber) -> &[u8] {
        match self.frames.get(number.as_index()).and_then(|f| f.data.as_deref()) {
            Some(bytes) => bytes,
            None => halt(HaltReason::Corrupted, format_args!("read of unbacked {}", number)),
        }
    }

    /// Mutable contents of an allocated frame.
    pub fn bytes_mut(&mut self, number: FrameNumber) -> &mut [u8] {
        match self.frames.get_mut(number.as_index()).and_then(|f| f.data.as_deref_mut()) {
            Some(bytes) => bytes,
            None => halt(HaltReason::Corrupted, format_args!("write of unbacked {}", number)),
        }
    }

    fn frame_mut(&mut self, number: FrameNumber) -> &mut Frame {
        match self.frames.get_mut(number.as_index()) {
            Some(frame) => frame,
            None => halt(HaltReason::Corrupted, format_args!("{} out of range", number)),
        }
    }
}
