// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Two-queue priority round-robin scheduler
//! OWNERS: @kernel-sched-team
//! PUBLIC API: Scheduler (enqueue/remove/select), QueueRole
//! DEPENDS_ON: env::EnvTable (status + priority of queued environments)
//! INVARIANTS: Every allocated environment sits in exactly one queue; an environment is only
//!             selected while Runnable; a head gets at most `priority` consecutive grants before
//!             it moves to the expired queue

extern crate alloc;

use alloc::collections::VecDeque;
use core::marker::PhantomData;

use crate::env::EnvTable;
use crate::types::EnvId;

/// Which of the two queues currently plays the active role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRole {
    First,
    Second,
}

impl QueueRole {
    const fn index(self) -> usize {
        match self {
            QueueRole::First => 0,
            QueueRole::Second => 1,
        }
    }

    const fn other(self) -> Self {
        match self {
            QueueRole::First => QueueRole::Second,
            QueueRole::Second => QueueRole::First,
        }
    }
}

/// Single-CPU scheduler over two rotating queues.
///
/// The tick counter is scheduler-global: it counts consecutive grants to the head of the active
/// queue and resets whenever a different environment becomes the candidate.
pub struct Scheduler {
    queues: [VecDeque<EnvId>; 2],
    active: QueueRole,
    ticks: u32,
    last_granted: Option<EnvId>,
    _not_send_sync: PhantomData<*mut ()>,
}
static_assertions::assert_not_impl_any!(Scheduler: Send, Sync);

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates an empty scheduler with the first queue active.
    pub fn new() -> Self {
        Self {
            queues: [VecDeque::new(), VecDeque::new()],
            active: QueueRole::First,
            ticks: 0,
            last_granted: None,
            _not_send_sync: PhantomData,
        }
    }

    /// Appends `id` to the tail of the active queue.
    pub fn enqueue(&mut self, id: EnvId) {
        debug_assert!(!self.contains(id), "env {} queued twice", id);
        self.queues[self.active.index()].push_back(id);
    }

    /// Drops `id` from whichever queue holds it.
    pub fn remove(&mut self, id: EnvId) -> bool {
        for queue in self.queues.iter_mut() {
            if let Some(pos) = queue.iter().position(|e| *e == id) {
                queue.remove(pos);
                if self.last_granted == Some(id) {
                    self.last_granted = None;
                    self.ticks = 0;
                }
                return true;
            }
        }
        false
    }

    pub fn contains(&self, id: EnvId) -> bool {
        self.queues.iter().any(|q| q.contains(&id))
    }

    /// Total queued environments.
    pub fn len(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_role(&self) -> QueueRole {
        self.active
    }

    /// Consecutive grants to the current head.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Queue contents, front first, for the given role.
    pub fn queue(&self, role: QueueRole) -> impl Iterator<Item = EnvId> + '_ {
        self.queues[role.index()].iter().copied()
    }

    /// Picks the environment to run next, or `None` when nothing can run.
    ///
    /// `None` is returned once every queued environment was examined without a grant, so the
    /// caller can idle instead of spinning.
    pub fn select(&mut self, envs: &EnvTable) -> Option<EnvId> {
        let mut budget = self.len() + 1;
        while budget > 0 {
            if self.queues[self.active.index()].is_empty() {
                if self.queues[self.active.other().index()].is_empty() {
                    return None;
                }
                self.active = self.active.other();
                #[cfg(feature = "sched_trace")]
                log_trace!(target: "sched", "swap -> {:?}", self.active);
            }
            let active = self.active.index();
            let head = self.queues[active][0];
            if self.last_granted != Some(head) {
                self.ticks = 0;
                self.last_granted = Some(head);
            }
            let quantum = envs.get(head).filter(|e| e.is_runnable()).map(|e| e.priority());
            match quantum {
                Some(quantum) if self.ticks < quantum => {
                    self.ticks += 1;
                    #[cfg(feature = "sched_trace")]
                    log_trace!(target: "sched", "grant {} tick {}/{}", head, self.ticks, quantum);
                    return Some(head);
                }
                _ => {
                    self.queues[active].pop_front();
                    self.queues[self.active.other().index()].push_back(head);
                    self.ticks = 0;
                    self.last_granted = None;
                    budget -= 1;
                    #[cfg(feature = "sched_trace")]
                    log_trace!(target: "sched", "expire {}", head);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::FramePool;
    use cinder_abi::EnvStatus;

    fn spawn(envs: &mut EnvTable, frames: &mut FramePool, sched: &mut Scheduler, pri: u32) -> EnvId {
        let id = envs.alloc(EnvId::SELF, frames).unwrap();
        let env = envs.get_mut(id).unwrap();
        env.set_priority(pri);
        env.set_status(EnvStatus::Runnable);
        sched.enqueue(id);
        id
    }

    fn setup() -> (EnvTable, FramePool, Scheduler) {
        (EnvTable::new(8), FramePool::new(16), Scheduler::new())
    }

    #[test]
    fn quantum_scenario_three_then_one() {
        let (mut envs, mut frames, mut sched) = setup();
        let a = spawn(&mut envs, &mut frames, &mut sched, 3);
        let b = spawn(&mut envs, &mut frames, &mut sched, 1);
        let picks: Vec<EnvId> = (0..4).map(|_| sched.select(&envs).unwrap()).collect();
        assert_eq!(picks, [a, a, a, b]);
        // both expired: queues swap and A leads again
        assert_eq!(sched.select(&envs), Some(a));
        assert_eq!(sched.active_role(), QueueRole::Second);
    }

    #[test]
    fn equal_priorities_alternate() {
        let (mut envs, mut frames, mut sched) = setup();
        let a = spawn(&mut envs, &mut frames, &mut sched, 1);
        let b = spawn(&mut envs, &mut frames, &mut sched, 1);
        let picks: Vec<EnvId> = (0..6).map(|_| sched.select(&envs).unwrap()).collect();
        assert_eq!(picks, [a, b, a, b, a, b]);
    }

    #[test]
    fn equal_quanta_run_in_turns() {
        let (mut envs, mut frames, mut sched) = setup();
        let a = spawn(&mut envs, &mut frames, &mut sched, 2);
        let b = spawn(&mut envs, &mut frames, &mut sched, 2);
        let picks: Vec<EnvId> = (0..8).map(|_| sched.select(&envs).unwrap()).collect();
        let mut turns = picks.clone();
        turns.dedup();
        assert_eq!(turns, [a, b, a, b]);
    }

    #[test]
    fn never_selects_non_runnable() {
        let (mut envs, mut frames, mut sched) = setup();
        let a = spawn(&mut envs, &mut frames, &mut sched, 2);
        let b = spawn(&mut envs, &mut frames, &mut sched, 2);
        envs.get_mut(a).unwrap().set_status(EnvStatus::NotRunnable);
        for _ in 0..10 {
            assert_eq!(sched.select(&envs), Some(b));
        }
        assert!(sched.contains(a));
    }

    #[test]
    fn idles_when_nothing_is_runnable() {
        let (mut envs, mut frames, mut sched) = setup();
        assert_eq!(sched.select(&envs), None);
        let a = spawn(&mut envs, &mut frames, &mut sched, 1);
        envs.get_mut(a).unwrap().set_status(EnvStatus::NotRunnable);
        assert_eq!(sched.select(&envs), None);
        envs.get_mut(a).unwrap().set_status(EnvStatus::Runnable);
        assert_eq!(sched.select(&envs), Some(a));
    }

    #[test]
    fn removed_head_does_not_leak_ticks() {
        let (mut envs, mut frames, mut sched) = setup();
        let a = spawn(&mut envs, &mut frames, &mut sched, 3);
        let b = spawn(&mut envs, &mut frames, &mut sched, 2);
        assert_eq!(sched.select(&envs), Some(a));
        assert_eq!(sched.select(&envs), Some(a));
        assert!(sched.remove(a));
        assert_eq!(sched.select(&envs), Some(b));
        assert_eq!(sched.ticks(), 1);
        assert_eq!(sched.select(&envs), Some(b));
        assert!(!sched.contains(a));
    }
}
