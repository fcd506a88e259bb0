// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg(test)]
//! CONTEXT: Property-based tests for env identity
//! OWNERS: @kernel-team
//! NOTE: Tests only; no kernel logic.
//!
//! TEST_SCOPE:
//!   - Ids stay unique and non-zero across arbitrary alloc/free interleavings
//!   - An id never resolves again once its slot was freed
//!
//! TEST_SCENARIOS:
//!   - retired_ids_never_resolve(): random alloc/free script against a small table

use alloc::vec::Vec;

use proptest::prelude::*;

use super::{EnvError, EnvTable};
use crate::mm::FramePool;
use crate::types::EnvId;

proptest! {
    #[test]
    fn retired_ids_never_resolve(capacity in 1usize..6, script in proptest::collection::vec(any::<(bool, u8)>(), 1..64)) {
        let mut envs = EnvTable::new(capacity);
        let mut frames = FramePool::new(capacity + 1);
        let mut live: Vec<EnvId> = Vec::new();
        let mut retired: Vec<EnvId> = Vec::new();

        for (do_alloc, pick) in script {
            if do_alloc {
                match envs.alloc(EnvId::SELF, &mut frames) {
                    Ok(id) => {
                        prop_assert!(!id.is_self());
                        prop_assert!(!live.contains(&id));
                        prop_assert!(!retired.contains(&id));
                        live.push(id);
                    }
                    Err(err) => {
                        prop_assert_eq!(err, EnvError::NoFreeEnv);
                        prop_assert_eq!(live.len(), capacity);
                    }
                }
            } else if !live.is_empty() {
                let id = live.swap_remove(pick as usize % live.len());
                envs.free(id, &mut frames).unwrap();
                retired.push(id);
            }
            for id in &retired {
                prop_assert_eq!(envs.resolve(*id, *id, false), Err(EnvError::BadEnv));
            }
            for id in &live {
                prop_assert_eq!(envs.resolve(*id, *id, true), Ok(*id));
            }
        }
    }
}
