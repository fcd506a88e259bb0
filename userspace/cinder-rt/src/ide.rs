// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: IDE block driver over the device-window syscalls
//! OWNERS: @runtime
//! PUBLIC API: ide_read, ide_write, IDE_STAGING
//! DEPENDS_ON: syscall::{read_dev, write_dev}, pgfault::store
//! INVARIANTS: One device transaction per sector; a failed transaction is fatal

use cinder_abi::layout::{PAGE_SIZE, UTEXT};
use cinder_abi::mmio::ide::{
    BUFFER, DISK_ID, OFFSET, OP_READ, OP_WRITE, SECTOR_SIZE, START_OP, STATUS,
};
use cinder_abi::mmio::IDE;
use cinder_abi::{EnvId, Errno, Perm, Trap};

use crate::pgfault;
use crate::syscall::{self, user_panic};

/// Page the driver stages register values in.
pub const IDE_STAGING: usize = UTEXT - PAGE_SIZE;

static_assertions::const_assert!(SECTOR_SIZE <= PAGE_SIZE);

pub(crate) fn ensure_staging<T: Trap>(port: &mut T) -> Result<(), Errno> {
    if port.mapping(IDE_STAGING).is_none() {
        syscall::mem_alloc(port, EnvId::SELF, IDE_STAGING, Perm::VALID | Perm::WRITABLE)?;
    }
    Ok(())
}

fn write_reg<T: Trap>(port: &mut T, reg: usize, value: u32) -> Result<(), Errno> {
    pgfault::store(port, IDE_STAGING, &value.to_le_bytes());
    syscall::write_dev(port, IDE_STAGING, IDE.base + reg, 4)
}

fn read_reg<T: Trap>(port: &mut T, reg: usize) -> Result<u32, Errno> {
    // read_dev needs a writable target
    pgfault::store(port, IDE_STAGING, &[0; 4]);
    syscall::read_dev(port, IDE_STAGING, IDE.base + reg, 4)?;
    let mut raw = [0u8; 4];
    port.load(IDE_STAGING, &mut raw);
    Ok(u32::from_le_bytes(raw))
}

fn start<T: Trap>(port: &mut T, diskno: u32, secno: usize, op: u32) -> Result<(), Errno> {
    let offset = secno
        .checked_mul(SECTOR_SIZE)
        .and_then(|o| u32::try_from(o).ok())
        .ok_or(Errno::Inval)?;
    write_reg(port, DISK_ID, diskno)?;
    write_reg(port, OFFSET, offset)?;
    write_reg(port, START_OP, op)?;
    if read_reg(port, STATUS)? == 0 {
        user_panic(port, format_args!("ide: disk {} sector {} failed", diskno, secno));
    }
    Ok(())
}

/// Reads `nsecs` sectors starting at `secno` of disk `diskno` into user memory at `dst_va`.
pub fn ide_read<T: Trap>(
    port: &mut T,
    diskno: u32,
    secno: usize,
    dst_va: usize,
    nsecs: usize,
) -> Result<(), Errno> {
    ensure_staging(port)?;
    for i in 0..nsecs {
        start(port, diskno, secno + i, OP_READ)?;
        syscall::read_dev(port, dst_va + i * SECTOR_SIZE, IDE.base + BUFFER, SECTOR_SIZE)?;
    }
    Ok(())
}

/// Writes `nsecs` sectors from user memory at `src_va` to disk `diskno` starting at `secno`.
pub fn ide_write<T: Trap>(
    port: &mut T,
    diskno: u32,
    secno: usize,
    src_va: usize,
    nsecs: usize,
) -> Result<(), Errno> {
    ensure_staging(port)?;
    for i in 0..nsecs {
        syscall::write_dev(port, src_va + i * SECTOR_SIZE, IDE.base + BUFFER, SECTOR_SIZE)?;
        start(port, diskno, secno + i, OP_WRITE)?;
    }
    Ok(())
}
