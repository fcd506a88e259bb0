// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), no_std)]
#![forbid(clippy::unwrap_used)]
#![deny(unsafe_code)]

//! CONTEXT: CINDER kernel core (environments, scheduler, syscalls, COW-capable memory)
//! OWNERS: @kernel-team
//! PUBLIC API: Kernel, KernelConfig, Dispatch, Image/Segment, log_* macros
//! DEPENDS_ON: cinder-abi, bitflags, spin, static_assertions
//! INVARIANTS: Single owner of all mutable kernel state (Kernel); dispatch receives an explicit
//!             Context; fatal conditions halt through panic::halt

extern crate alloc;

#[macro_use]
pub mod diag;

pub mod config;
pub mod device;
pub mod env;
pub mod kernel;
pub mod mm;
pub mod panic;
pub mod sched;
pub mod syscall;
pub mod trap;
pub mod types;

pub use diag::log;

pub use config::{ConfigError, KernelConfig};
pub use env::{Image, Segment};
pub use kernel::{Dispatch, Kernel};
