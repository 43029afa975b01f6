//! Exhaustive exploration of every interleaving of the bucket protocol, at
//! the granularity of individual lock operations, for two threads sharing
//! one bucket of two buffers.
//!
//! Threads run sequences of `read` + `release`, `read` + `pin` + `release`,
//! and `unpin`. Bucket-lock critical sections call the same slot-metadata
//! code as the cache ([`claim`], [`SlotMeta::unref`], [`SlotMeta::pin`],
//! [`SlotMeta::unpin`]). Every reachable state is checked for:
//!
//! * reference counts matching the threads that hold a reference or a pin,
//! * no block bound to two slots,
//! * no slot rebound while a thread uses it or holds a pin on it,
//! * progress: some thread can always move until all are done.

use crate::bucket::{Claim, SlotMeta, claim};
use crate::device::BlockId;
use std::collections::HashSet;

const SLOTS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Step {
    Lock,
    Claim,
    Unlock,
    SleepLock,
    Load,
    SleepUnlock,
    Unref,
    Pin,
    Unpin,
}

/// `read` followed by `release` as the cache does it: the sleep lock is given
/// up before the reference.
const READ_RELEASE: &[Step] = &[
    Step::Lock,
    Step::Claim,
    Step::Unlock,
    Step::SleepLock,
    Step::Load,
    Step::SleepUnlock,
    Step::Lock,
    Step::Unref,
    Step::Unlock,
];

/// The same with the reference dropped while the sleep lock is still held.
const UNREF_FIRST: &[Step] = &[
    Step::Lock,
    Step::Claim,
    Step::Unlock,
    Step::SleepLock,
    Step::Load,
    Step::Lock,
    Step::Unref,
    Step::Unlock,
    Step::SleepUnlock,
];

/// `read`, `pin` while holding the buffer, then `release`.
const READ_PIN_RELEASE: &[Step] = &[
    Step::Lock,
    Step::Claim,
    Step::Unlock,
    Step::SleepLock,
    Step::Load,
    Step::Lock,
    Step::Pin,
    Step::Unlock,
    Step::SleepUnlock,
    Step::Lock,
    Step::Unref,
    Step::Unlock,
];

const UNPIN: &[Step] = &[Step::Lock, Step::Unpin, Step::Unlock];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Op {
    Read(u32),
    ReadPinned(u32),
    Unpin(u32),
}

impl Op {
    const fn block(self) -> BlockId {
        match self {
            Self::Read(b) | Self::ReadPinned(b) | Self::Unpin(b) => BlockId::new(1, b),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Thread {
    op: usize,
    step: usize,
    slot: Option<usize>,
    referenced: bool,
    pinned: Option<(usize, BlockId)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct State {
    clock: u64,
    bucket: Option<usize>,
    meta: [SlotMeta; SLOTS],
    sleeper: [Option<usize>; SLOTS],
    valid: [bool; SLOTS],
    threads: Vec<Thread>,
}

struct Explorer<'a> {
    programs: &'a [&'a [Op]],
    read: &'static [Step],
}

impl Explorer<'_> {
    fn initial(&self) -> State {
        State {
            clock: 0,
            bucket: None,
            meta: [SlotMeta {
                id: None,
                refcnt: 0,
                timestamp: 0,
            }; SLOTS],
            sleeper: [None; SLOTS],
            valid: [false; SLOTS],
            threads: vec![
                Thread {
                    op: 0,
                    step: 0,
                    slot: None,
                    referenced: false,
                    pinned: None,
                };
                self.programs.len()
            ],
        }
    }

    const fn steps(&self, op: Op) -> &'static [Step] {
        match op {
            Op::Read(_) => self.read,
            Op::ReadPinned(_) => READ_PIN_RELEASE,
            Op::Unpin(_) => UNPIN,
        }
    }

    /// Number of distinct states visited.
    fn run(&self) -> Result<usize, String> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.initial()];

        while let Some(state) = stack.pop() {
            if !seen.insert(state.clone()) {
                continue;
            }
            self.check(&state)?;

            let mut moved = false;
            for t in 0..self.programs.len() {
                if let Some(next) = self.step(&state, t)? {
                    moved = true;
                    stack.push(next);
                }
            }
            if !moved && !self.finished(&state) {
                return Err(format!("deadlock in {state:?}"));
            }
        }
        Ok(seen.len())
    }

    fn finished(&self, state: &State) -> bool {
        state
            .threads
            .iter()
            .zip(self.programs)
            .all(|(t, p)| t.op == p.len())
    }

    fn current(&self, state: &State, t: usize) -> Option<Op> {
        self.programs[t].get(state.threads[t].op).copied()
    }

    /// The state after thread `t` takes its next step; `None` if it is done
    /// or blocked.
    fn step(&self, state: &State, t: usize) -> Result<Option<State>, String> {
        let Some(op) = self.current(state, t) else {
            return Ok(None);
        };
        let id = op.block();
        let steps = self.steps(op);
        let th = state.threads[t];
        let mut next = state.clone();

        match steps[th.step] {
            Step::Lock => {
                if state.bucket.is_some() {
                    return Ok(None);
                }
                next.bucket = Some(t);
            }
            Step::Unlock => next.bucket = None,
            Step::Claim => {
                next.clock += 1;
                let slot = match claim(&mut next.meta, id, next.clock) {
                    Some(Claim::Hit(slot)) => slot,
                    Some(Claim::Miss { slot, .. }) => {
                        next.valid[slot] = false;
                        slot
                    }
                    None => return Err(format!("thread {t}: no buffer for {id} in {state:?}")),
                };
                next.threads[t].slot = Some(slot);
                next.threads[t].referenced = true;
            }
            Step::SleepLock => {
                let slot = th.slot.ok_or("sleep lock before claim")?;
                if state.sleeper[slot].is_some() {
                    return Ok(None);
                }
                next.sleeper[slot] = Some(t);
            }
            Step::Load => {
                let slot = th.slot.ok_or("load before claim")?;
                next.valid[slot] = true;
            }
            Step::SleepUnlock => {
                let slot = th.slot.ok_or("sleep unlock before claim")?;
                next.sleeper[slot] = None;
            }
            Step::Unref => {
                let slot = th.slot.ok_or("unref before claim")?;
                next.clock += 1;
                next.meta[slot].unref(next.clock);
                next.threads[t].referenced = false;
            }
            Step::Pin => {
                let slot = th.slot.ok_or("pin before claim")?;
                next.meta[slot].pin(id);
                next.threads[t].pinned = Some((slot, id));
            }
            Step::Unpin => {
                let (slot, pinned) = th.pinned.ok_or("unpin without a pin")?;
                if pinned != id {
                    return Err(format!("thread {t} unpins {id} but pinned {pinned}"));
                }
                next.meta[slot].unpin(id);
                next.threads[t].pinned = None;
            }
        }

        let th = &mut next.threads[t];
        th.step += 1;
        if th.step == steps.len() {
            *th = Thread {
                op: th.op + 1,
                step: 0,
                slot: None,
                referenced: false,
                pinned: th.pinned,
            };
        }
        Ok(Some(next))
    }

    fn check(&self, state: &State) -> Result<(), String> {
        for (s, m) in state.meta.iter().enumerate() {
            let users = state
                .threads
                .iter()
                .filter(|t| t.referenced && t.slot == Some(s))
                .count();
            let pins = state
                .threads
                .iter()
                .filter(|t| matches!(t.pinned, Some((p, _)) if p == s))
                .count();
            if usize::try_from(m.refcnt).ok() != Some(users + pins) {
                return Err(format!(
                    "slot {s} refcnt {} but {users} users and {pins} pins in {state:?}",
                    m.refcnt
                ));
            }
        }

        if state.meta[0].id.is_some() && state.meta[0].id == state.meta[1].id {
            return Err(format!("block bound twice in {state:?}"));
        }

        for (t, th) in state.threads.iter().enumerate() {
            if let Some(slot) = th.slot {
                let id = self.current(state, t).map(Op::block);
                if state.meta[slot].id != id {
                    return Err(format!(
                        "slot {slot} rebound to {:?} while thread {t} uses it for {id:?} in {state:?}",
                        state.meta[slot].id
                    ));
                }
            }
            if let Some((slot, id)) = th.pinned
                && state.meta[slot].id != Some(id)
            {
                return Err(format!(
                    "slot {slot} rebound to {:?} while thread {t} pins {id} in {state:?}",
                    state.meta[slot].id
                ));
            }
        }
        Ok(())
    }
}

const A: u32 = 1;
const B: u32 = 2;
const C: u32 = 3;

#[test]
fn crossing_keys() {
    let explorer = Explorer {
        programs: &[&[Op::Read(A), Op::Read(B)], &[Op::Read(B), Op::Read(A)]],
        read: READ_RELEASE,
    };
    let states = explorer.run().unwrap();
    assert!(states > 100, "explored only {states} states");
}

#[test]
fn same_key() {
    let explorer = Explorer {
        programs: &[&[Op::Read(A), Op::Read(A)], &[Op::Read(A)]],
        read: READ_RELEASE,
    };
    explorer.run().unwrap();
}

#[test]
fn eviction_under_contention() {
    let explorer = Explorer {
        programs: &[&[Op::Read(A), Op::Read(B)], &[Op::Read(C), Op::Read(A)]],
        read: READ_RELEASE,
    };
    explorer.run().unwrap();
}

#[test]
fn pinned_slot_survives_eviction_pressure() {
    // while A is pinned, B and C compete for the only other slot
    let explorer = Explorer {
        programs: &[
            &[Op::ReadPinned(A), Op::Unpin(A)],
            &[Op::Read(B), Op::Read(C), Op::Read(A), Op::Read(B)],
        ],
        read: READ_RELEASE,
    };
    let states = explorer.run().unwrap();
    assert!(states > 100, "explored only {states} states");
}

#[test]
fn both_threads_pin() {
    let explorer = Explorer {
        programs: &[
            &[Op::ReadPinned(A), Op::Unpin(A)],
            &[Op::ReadPinned(B), Op::Read(A), Op::Unpin(B)],
        ],
        read: READ_RELEASE,
    };
    explorer.run().unwrap();
}

#[test]
fn same_block_pinned_twice() {
    let explorer = Explorer {
        programs: &[
            &[Op::ReadPinned(A), Op::Unpin(A)],
            &[Op::ReadPinned(A), Op::Read(B), Op::Unpin(A)],
        ],
        read: READ_RELEASE,
    };
    explorer.run().unwrap();
}

#[test]
fn unreferencing_before_unlocking_lets_a_held_slot_be_rebound() {
    let explorer = Explorer {
        programs: &[&[Op::Read(A)], &[Op::Read(B), Op::Read(C)]],
        read: UNREF_FIRST,
    };
    let err = explorer.run().unwrap_err();
    assert!(err.contains("rebound"), "{err}");
}
