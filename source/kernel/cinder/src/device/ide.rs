// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! IDE controller with in-memory disks.
//!
//! Writing the start-op register runs one whole-sector transfer between the selected disk and
//! the sector buffer, then sets the status register (1 = done, 0 = failed).

use alloc::vec;
use alloc::vec::Vec;

use cinder_abi::mmio::ide::{
    BUFFER, DISK_ID, OFFSET, OP_READ, OP_WRITE, SECTOR_SIZE, START_OP, STATUS,
};

use super::Mmio;

const REG_FILE_LEN: usize = 0x40;

pub struct Ide {
    disks: Vec<Vec<u8>>,
    regs: [u8; REG_FILE_LEN],
    buffer: [u8; SECTOR_SIZE],
}

impl Ide {
    pub fn new(disk_sectors: &[usize]) -> Self {
        Self {
            disks: disk_sectors.iter().map(|n| vec![0u8; n * SECTOR_SIZE]).collect(),
            regs: [0; REG_FILE_LEN],
            buffer: [0; SECTOR_SIZE],
        }
    }

    fn reg(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.regs[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    fn set_reg(&mut self, offset: usize, value: u32) {
        self.regs[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Raw disk contents, for inspection.
    pub fn disk(&self, number: usize) -> Option<&[u8]> {
        self.disks.get(number).map(Vec::as_slice)
    }

    fn run(&mut self) {
        let op = self.reg(START_OP);
        let offset = self.reg(OFFSET) as usize;
        let disk_no = self.reg(DISK_ID) as usize;
        let ok = match self.disks.get_mut(disk_no) {
            Some(disk) if offset % SECTOR_SIZE == 0 && offset + SECTOR_SIZE <= disk.len() => {
                let sector = &mut disk[offset..offset + SECTOR_SIZE];
                match op {
                    OP_READ => {
                        self.buffer.copy_from_slice(sector);
                        true
                    }
                    OP_WRITE => {
                        sector.copy_from_slice(&self.buffer);
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        };
        if !ok {
            log_warn!(target: "ide", "op {} disk {} offset {:#x} failed", op, disk_no, offset);
        }
        self.set_reg(STATUS, ok as u32);
    }
}

impl Mmio for Ide {
    fn read(&mut self, offset: usize, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let at = offset + i;
            *byte = if at < REG_FILE_LEN {
                self.regs[at]
            } else if (BUFFER..BUFFER + SECTOR_SIZE).contains(&at) {
                self.buffer[at - BUFFER]
            } else {
                0
            };
        }
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        let mut start = false;
        for (i, byte) in data.iter().enumerate() {
            let at = offset + i;
            if at < REG_FILE_LEN {
                self.regs[at] = *byte;
                start |= (START_OP..START_OP + 4).contains(&at);
            } else if (BUFFER..BUFFER + SECTOR_SIZE).contains(&at) {
                self.buffer[at - BUFFER] = *byte;
            }
        }
        if start {
            self.run();
        }
    }
}
