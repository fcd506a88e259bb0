// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Console UART. Offset 0 is the data register in both directions; a multi-byte access
//! there streams bytes in order.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use super::Mmio;

#[derive(Default)]
pub struct Console {
    output: Vec<u8>,
    input: VecDeque<u8>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn putc(&mut self, byte: u8) {
        self.output.push(byte);
    }

    /// Next input byte, 0 when none is pending.
    pub fn getc(&mut self) -> u8 {
        self.input.pop_front().unwrap_or(0)
    }

    /// Queues bytes as if typed on the terminal.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Everything written since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }
}

impl Mmio for Console {
    fn read(&mut self, offset: usize, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = if offset == 0 { self.getc() } else { 0 };
        }
    }

    fn write(&mut self, offset: usize, data: &[u8]) {
        if offset == 0 {
            self.output.extend_from_slice(data);
        }
    }
}
