// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Real-time clock driven by the kernel's dispatch counter.

use cinder_abi::mmio::rtc::{SECONDS, TRIGGER, USECONDS};

use super::Mmio;

#[derive(Default)]
pub struct Rtc {
    now_us: u64,
    latched_us: u64,
}

impl Rtc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, micros: u64) {
        self.now_us = self.now_us.saturating_add(micros);
    }

    pub fn now_us(&self) -> u64 {
        self.now_us
    }

    fn register(&self, offset: usize) -> u32 {
        match offset {
            SECONDS => (self.latched_us / 1_000_000) as u32,
            USECONDS => (self.latched_us % 1_000_000) as u32,
            _ => 0,
        }
    }
}

impl Mmio for Rtc {
    fn read(&mut self, offset: usize, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let at = offset + i;
            let word = self.register(at & !3).to_le_bytes();
            *byte = word[at & 3];
        }
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        if (offset..offset + data.len()).contains(&TRIGGER) {
            self.latched_us = self.now_us;
        }
    }
}
