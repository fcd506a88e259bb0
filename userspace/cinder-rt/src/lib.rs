// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: User runtime for CINDER environments
//! OWNERS: @runtime
//! STATUS: Functional
//!
//! PUBLIC API:
//!   - syscall: typed wrappers over every kernel entry point
//!   - pgfault: exception-stack setup, fault upcall routing, COW copy handler
//!   - fork: copy-on-write fork and its child continuation
//!   - ipc: one-shot send and two-step receive
//!   - ide / clock: block and RTC drivers over the device windows
//!
//! DEPENDENCIES:
//!   - cinder-abi: syscall numbers, layout, the `Trap` port
//!
//! Every function takes the machine as `&mut impl Trap`; the runtime keeps no state of its own.
//! Anything it needs to remember lives in the environment's memory or kernel slot.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

pub mod clock;
pub mod fork;
pub mod ide;
pub mod ipc;
pub mod pgfault;
pub mod syscall;

pub use cinder_abi::{EnvId, EnvStatus, Errno, Perm, Trap};
pub use fork::{fork, ForkReturn};
pub use syscall::user_panic;
