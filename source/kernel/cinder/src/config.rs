// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Boot-time kernel configuration
//! OWNERS: @kernel-team
//! PUBLIC API: KernelConfig (default/validate), ConfigError
//! INVARIANTS: Values are fixed once Kernel::new accepts them

use core::fmt;

use crate::log::Level;

/// Default number of environment slots.
pub const DEFAULT_ENV_CAPACITY: usize = 1024;
/// Default number of physical frames.
pub const DEFAULT_FRAME_COUNT: usize = 2048;
/// Default size of each simulated disk in sectors.
pub const DEFAULT_DISK_SECTORS: usize = 64;

/// Static sizing and policy knobs handed to [`crate::Kernel::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelConfig {
    /// Environment table capacity; part of every id (`generation * capacity + slot`).
    pub env_capacity: usize,
    /// Physical frames available to page tables and user pages.
    pub frame_count: usize,
    /// Sector count of each attached IDE disk, by disk number.
    pub disks: alloc::vec::Vec<usize>,
    /// Most verbose log level emitted.
    pub log_level: Level,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            env_capacity: DEFAULT_ENV_CAPACITY,
            frame_count: DEFAULT_FRAME_COUNT,
            disks: alloc::vec![DEFAULT_DISK_SECTORS],
            log_level: Level::Info,
        }
    }
}

/// Rejected configuration values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// At least one environment slot is required.
    NoEnvSlots,
    /// Ids are 32-bit; the capacity must leave room for at least one generation.
    EnvCapacityTooLarge,
    /// At least one frame is required.
    NoFrames,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl KernelConfig {
    /// Small configuration for tests and demos.
    pub fn small(env_capacity: usize, frame_count: usize) -> Self {
        Self { env_capacity, frame_count, ..Self::default() }
    }

    /// Checks the configuration before the kernel sizes its tables from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.env_capacity == 0 {
            return Err(ConfigError::NoEnvSlots);
        }
        // generation 1 must still produce a representable id for the last slot
        if self.env_capacity > (u32::MAX as usize) / 2 {
            return Err(ConfigError::EnvCapacityTooLarge);
        }
        if self.frame_count == 0 {
            return Err(ConfigError::NoFrames);
        }
        Ok(())
    }
}
