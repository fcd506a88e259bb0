// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Real-time clock reader.

use cinder_abi::mmio::rtc::{SECONDS, TRIGGER, USECONDS};
use cinder_abi::mmio::RTC;
use cinder_abi::{Errno, Trap};

use crate::ide::{ensure_staging, IDE_STAGING};
use crate::pgfault;
use crate::syscall;

/// Latched time as (seconds, microseconds).
pub fn now<T: Trap>(port: &mut T) -> Result<(u32, u32), Errno> {
    // shares the IDE staging page
    ensure_staging(port)?;
    pgfault::store(port, IDE_STAGING, &[0; 8]);
    syscall::write_dev(port, IDE_STAGING, RTC.base + TRIGGER, 4)?;
    syscall::read_dev(port, IDE_STAGING, RTC.base + SECONDS, 4)?;
    syscall::read_dev(port, IDE_STAGING + 4, RTC.base + USECONDS, 4)?;
    let mut raw = [0u8; 8];
    port.load(IDE_STAGING, &mut raw);
    let secs = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let usecs = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
    Ok((secs, usecs))
}
