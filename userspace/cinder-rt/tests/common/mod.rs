// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared boot helpers for the runtime integration tests.

#![allow(dead_code)]

use cinder::types::FrameNumber;
use cinder::{Dispatch, Image, Kernel, KernelConfig, Segment};
use cinder_abi::layout::UTEXT;
use cinder_abi::{EnvId, Perm, Trap};
use cinder_rt::syscall;

/// Read-only text page.
pub const TEXT: usize = UTEXT;
/// Private writable data page.
pub const DATA: usize = 0x0050_0000;
/// Initial contents of `DATA`.
pub const DATA_INIT: &[u8] = b"boot data";

const CODE: [u8; 8] = [0x13, 0, 0, 0, 0x73, 0, 0, 0];

pub fn image() -> [Segment<'static>; 2] {
    [
        Segment { va: TEXT, mem_len: CODE.len(), perm: Perm::VALID, data: &CODE },
        Segment { va: DATA, mem_len: 64, perm: Perm::VALID | Perm::WRITABLE, data: DATA_INIT },
    ]
}

/// Kernel with one Runnable environment loaded from [`image`] and already dispatched.
pub fn boot(env_capacity: usize) -> (Kernel, EnvId) {
    let mut kernel = Kernel::new(KernelConfig::small(env_capacity, 512)).unwrap();
    let segments = image();
    let id = kernel.create_env(&Image { entry: TEXT, segments: &segments }, 1).unwrap();
    assert_eq!(kernel.schedule(), Dispatch::Run(id));
    (kernel, id)
}

/// Yields until `id` owns the processor.
pub fn switch_to(kernel: &mut Kernel, id: EnvId) {
    for _ in 0..16 {
        if kernel.current() == Some(id) {
            return;
        }
        syscall::yield_now(kernel);
    }
    panic!("env {} never scheduled (current {:?})", id, kernel.current());
}

pub fn read(kernel: &mut Kernel, va: usize, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    kernel.load(va, &mut buf);
    buf
}

/// Refcount of the frame currently backing `va` in the running environment.
pub fn refcount(kernel: &Kernel, va: usize) -> u32 {
    let frame = kernel.mapping(va).expect("mapped").frame;
    kernel.frames().refcount(FrameNumber::from_index(frame))
}
