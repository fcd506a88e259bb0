// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Whitelisted device windows reachable through `read_dev`/`write_dev`, plus the register maps
//! userland drivers program through them.

/// One physical MMIO window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MmioWindow {
    /// Short device name used in diagnostics.
    pub name: &'static str,
    /// First byte of the window.
    pub base: usize,
    /// Window length in bytes.
    pub len: usize,
}

impl MmioWindow {
    /// True when `[addr, addr + len)` lies entirely inside this window.
    pub const fn covers(&self, addr: usize, len: usize) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        addr >= self.base && end <= self.base + self.len
    }
}

/// Console UART window.
pub const CONSOLE: MmioWindow = MmioWindow { name: "console", base: 0x1000_0000, len: 0x20 };
/// IDE disk controller window.
pub const IDE: MmioWindow = MmioWindow { name: "ide", base: 0x1300_0000, len: 0x4200 };
/// Real-time clock window.
pub const RTC: MmioWindow = MmioWindow { name: "rtc", base: 0x1500_0000, len: 0x200 };

/// Every window a user environment may touch.
pub const WINDOWS: [MmioWindow; 3] = [CONSOLE, IDE, RTC];

/// Returns the window that fully covers `[addr, addr + len)`.
pub fn window_for(addr: usize, len: usize) -> Option<&'static MmioWindow> {
    WINDOWS.iter().find(|w| w.covers(addr, len))
}

/// IDE register offsets relative to [`IDE`]`.base`.
pub mod ide {
    /// Byte offset on disk of the next transfer (u32).
    pub const OFFSET: usize = 0x0000;
    /// Disk number of the next transfer (u32).
    pub const DISK_ID: usize = 0x0010;
    /// Writing starts a transfer: [`OP_READ`] or [`OP_WRITE`] (u32).
    pub const START_OP: usize = 0x0020;
    /// Result of the last transfer: 0 on failure (u32).
    pub const STATUS: usize = 0x0030;
    /// One-sector data buffer.
    pub const BUFFER: usize = 0x4000;
    /// Sector size in bytes.
    pub const SECTOR_SIZE: usize = 0x200;
    /// Disk to buffer.
    pub const OP_READ: u32 = 0;
    /// Buffer to disk.
    pub const OP_WRITE: u32 = 1;
}

/// RTC register offsets relative to [`RTC`]`.base`.
pub mod rtc {
    /// Writing latches the current time.
    pub const TRIGGER: usize = 0x00;
    /// Latched seconds (u32).
    pub const SECONDS: usize = 0x10;
    /// Latched microseconds (u32).
    pub const USECONDS: usize = 0x20;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_must_fit_entirely() {
        assert_eq!(window_for(0x1300_4000, 0x200), Some(&IDE));
        assert_eq!(window_for(0x1300_4300, 0x10), None);
        assert_eq!(window_for(0x1000_0000, 1), Some(&CONSOLE));
        assert_eq!(window_for(0x1000_001f, 2), None);
        assert_eq!(window_for(0x1500_01ff, 1), Some(&RTC));
        assert_eq!(window_for(usize::MAX, 2), None);
        assert_eq!(window_for(0x1400_0000, 4), None);
    }
}
