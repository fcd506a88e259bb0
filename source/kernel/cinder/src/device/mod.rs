// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Simulated devices behind the whitelisted MMIO windows
//! OWNERS: @kernel-team
//! PUBLIC API: DeviceBus (read/write/advance_clock), Mmio, Console, Ide, Rtc, DeviceError
//! DEPENDS_ON: cinder_abi::mmio (window table + register maps)
//! INVARIANTS: Accesses are routed only when the whole range lies in one window

extern crate alloc;

mod console;
mod ide;
mod rtc;

use core::fmt;

use cinder_abi::mmio::{self, MmioWindow};

pub use console::Console;
pub use ide::Ide;
pub use rtc::Rtc;

/// Byte-addressed register file of one device.
pub trait Mmio {
    /// Reads `buf.len()` bytes starting at `offset` inside the window.
    fn read(&mut self, offset: usize, buf: &mut [u8]);
    /// Writes `data` starting at `offset` inside the window.
    fn write(&mut self, offset: usize, data: &[u8]);
}

/// Errors surfaced by the device bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// Range is not fully covered by one whitelisted window.
    OutsideWindow,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// All devices reachable from user mode.
pub struct DeviceBus {
    pub console: Console,
    pub ide: Ide,
    pub rtc: Rtc,
}

impl DeviceBus {
    /// Creates a bus with one IDE disk per entry of `disk_sectors`.
    pub fn new(disk_sectors: &[usize]) -> Self {
        Self { console: Console::new(), ide: Ide::new(disk_sectors), rtc: Rtc::new() }
    }

    fn route(&mut self, addr: usize, len: usize) -> Result<(&mut dyn Mmio, usize), DeviceError> {
        let window: &MmioWindow = mmio::window_for(addr, len).ok_or(DeviceError::OutsideWindow)?;
        let offset = addr - window.base;
        let device: &mut dyn Mmio = match window.base {
            b if b == mmio::CONSOLE.base => &mut self.console,
            b if b == mmio::IDE.base => &mut self.ide,
            _ => &mut self.rtc,
        };
        Ok((device, offset))
    }

    pub fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let (device, offset) = self.route(addr, buf.len())?;
        device.read(offset, buf);
        Ok(())
    }

    pub fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), DeviceError> {
        let (device, offset) = self.route(addr, data.len())?;
        device.write(offset, data);
        Ok(())
    }

    /// Advances the RTC by `micros`.
    pub fn advance_clock(&mut self, micros: u64) {
        self.rtc.advance(micros);
    }
}
