// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Two-level page directory backing one environment's address space.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use cinder_abi::layout::{pdx, ptx, va_from, ENTRIES_PER_TABLE, UTOP};
use cinder_abi::Perm;

use super::{FramePool, MmError};
use crate::types::{FrameNumber, VirtAddr};

/// Leaf entry: backing frame plus permission bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pte {
    pub frame: FrameNumber,
    pub perm: Perm,
}

enum Pde {
    Empty,
    /// Shared kernel mapping copied from the boot directory; not owned.
    Kernel,
    Table { frame: FrameNumber, entries: Box<[Option<Pte>]> },
}

/// Address-space root. Directory and table pages are charged to the frame pool.
pub struct PageDirectory {
    root: FrameNumber,
    pdes: Vec<Pde>,
}

const USER_PDES: usize = pdx(UTOP);

impl PageDirectory {
    /// Allocates a root whose entries above UTOP mirror the kernel's own.
    pub fn new(frames: &mut FramePool) -> Result<Self, MmError> {
        let root = frames.alloc()?;
        frames.incref(root);
        let mut pdes = Vec::with_capacity(ENTRIES_PER_TABLE);
        pdes.resize_with(USER_PDES, || Pde::Empty);
        pdes.resize_with(ENTRIES_PER_TABLE, || Pde::Kernel);
        Ok(Self { root, pdes })
    }

    pub fn root(&self) -> FrameNumber {
        self.root
    }

    /// Number of directory slots carrying kernel mappings.
    pub fn kernel_entries(&self) -> usize {
        self.pdes.iter().filter(|pde| matches!(pde, Pde::Kernel)).count()
    }

    /// Looks up the leaf entry for `va`; kernel-owned ranges report `None`.
    pub fn lookup(&self, va: VirtAddr) -> Option<Pte> {
        match self.pdes.get(pdx(va.raw()))? {
            Pde::Table { entries, .. } => entries[ptx(va.raw())],
            _ => None,
        }
    }

    /// Whether a user table covers `va`.
    pub fn has_table(&self, va: VirtAddr) -> bool {
        matches!(self.pdes.get(pdx(va.raw())), Some(Pde::Table { .. }))
    }

    /// Installs `frame` at `va`, replacing whatever was there.
    ///
    /// Re-inserting the frame that is already mapped only updates the permission bits.
    pub fn insert(
        &mut self,
        frames: &mut FramePool,
        va: VirtAddr,
        frame: FrameNumber,
        perm: Perm,
    ) -> Result<(), MmError> {
        if va.raw() >= UTOP {
            return Err(MmError::OutOfRange);
        }
        let entries = self.table_for(frames, va)?;
        let slot = &mut entries[ptx(va.raw())];
        let perm = perm | Perm::VALID;
        if let Some(old) = *slot {
            if old.frame == frame {
                *slot = Some(Pte { frame, perm });
                return Ok(());
            }
        }
        frames.incref(frame);
        if let Some(old) = slot.replace(Pte { frame, perm }) {
            frames.decref(old.frame);
        }
        Ok(())
    }

    /// Removes the mapping at `va`; returns the entry that was there.
    pub fn remove(&mut self, frames: &mut FramePool, va: VirtAddr) -> Option<Pte> {
        let Some(Pde::Table { entries, .. }) = self.pdes.get_mut(pdx(va.raw())) else {
            return None;
        };
        let old = entries[ptx(va.raw())].take()?;
        frames.decref(old.frame);
        Some(old)
    }

    /// Every present user mapping in ascending address order.
    pub fn mappings(&self) -> impl Iterator<Item = (VirtAddr, Pte)> + '_ {
        self.pdes.iter().enumerate().flat_map(|(dir, pde)| {
            let entries: &[Option<Pte>] = match pde {
                Pde::Table { entries, .. } => &entries[..],
                _ => &[],
            };
            entries
                .iter()
                .enumerate()
                .filter_map(move |(idx, e)| e.map(|pte| (VirtAddr::new(va_from(dir, idx)), pte)))
        })
    }

    /// Drops every user mapping, every table page and finally the root.
    pub fn release(mut self, frames: &mut FramePool) {
        for pde in self.pdes.iter_mut() {
            if let Pde::Table { frame, entries } = core::mem::replace(pde, Pde::Empty) {
                for pte in entries.iter().flatten() {
                    frames.decref(pte.frame);
                }
                frames.decref(frame);
            }
        }
        frames.decref(self.root);
    }

    fn table_for(
        &mut self,
        frames: &mut FramePool,
        va: VirtAddr,
    ) -> Result<&mut [Option<Pte>], MmError> {
        let pde = &mut self.pdes[pdx(va.raw())];
        if let Pde::Empty = pde {
            let frame = frames.alloc()?;
            frames.incref(frame);
            *pde = Pde::Table { frame, entries: vec![None; ENTRIES_PER_TABLE].into_boxed_slice() };
        }
        match pde {
            Pde::Table { entries, .. } => Ok(entries),
            _ => Err(MmError::OutOfRange),
        }
    }
}
