// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process selection and context switching.
//!
//! Every scheduling decision also ages the table: processes that are waiting
//! their turn gain a point, and the one that just got the CPU loses most of
//! its lead. This keeps a low-priority process from starving behind a busy
//! high-priority one.

use abi::ProcessStatus;

use crate::arch::{self, SavedState};
use crate::config::SchedPolicy;
use crate::err::Fatal;
use crate::process::{Process, ProcessTable};

/// Scheduling priority. Larger values are more important.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Self = Self(1);
    /// Priority of the console, and of children forked with `nice` set.
    pub const NICE: Self = Self(5);
    pub const MAX: Self = Self(10);

    pub fn get(self) -> u8 {
        self.0
    }

    /// One step more important, saturating at `MAX`.
    pub fn aged(self) -> Self {
        Self((self.0 + 1).min(Self::MAX.0))
    }

    /// Where a process lands after winning the CPU: back to `NICE` if it was
    /// above that, otherwise all the way down to `MIN`.
    pub fn demoted(self) -> Self {
        if self > Self::NICE {
            Self::NICE
        } else {
            Self::MIN
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MIN
    }
}

/// Picks the slot that should run next, without changing anything.
pub fn select(procs: &ProcessTable, policy: SchedPolicy) -> Option<usize> {
    match policy {
        SchedPolicy::Priority => priority_scan(procs.current(), procs.slots()),
        SchedPolicy::RoundRobin => next_ready(procs.current(), procs.slots()),
    }
}

/// Scans `procs` for the most important runnable process.
///
/// The process at `current` is the initial candidate if it is runnable, and
/// others must beat it strictly to replace it. Among the rest, ties go to the
/// first one in order after `current`, mod `procs.len()`.
fn priority_scan(current: usize, procs: &[Process]) -> Option<usize> {
    let mut choice = procs[current].status().is_runnable().then_some(current);
    let mut pos = current;
    for _step_no in 1..procs.len() {
        pos = (pos + 1) % procs.len();
        let p = &procs[pos];
        if !p.status().is_runnable() {
            continue;
        }
        if let Some(best) = choice {
            if p.priority() <= procs[best].priority() {
                continue;
            }
        }
        choice = Some(pos);
    }
    choice
}

/// Finds the first ready process after `current`, falling back to `current`
/// itself if it can keep going.
fn next_ready(current: usize, procs: &[Process]) -> Option<usize> {
    (1..procs.len())
        .map(|step| (current + step) % procs.len())
        .find(|&i| procs[i].status() == ProcessStatus::Ready)
        .or_else(|| procs[current].status().is_runnable().then_some(current))
}

/// Moves the CPU from the current process to `next`.
///
/// The outgoing state is captured from the trap frame into the current slot,
/// and `next`'s saved state is installed in its place. A current process that
/// was killed stays empty.
pub fn switch_to(procs: &mut ProcessTable, live: &mut SavedState, next: usize) {
    let prev = procs.current();
    ktrace!("switch {} -> {} [{}]", prev, next, procs);

    let outgoing = procs.get_mut(prev);
    arch::capture(live, outgoing.save_mut());
    if outgoing.status() == ProcessStatus::Executing {
        outgoing.set_status(ProcessStatus::Ready);
    }

    let incoming = procs.get_mut(next);
    arch::install(live, incoming.save());
    incoming.set_status(ProcessStatus::Executing);
    procs.set_current(next);
}

/// Adjusts priorities after a decision.
fn age(procs: &mut ProcessTable) {
    for i in 0..procs.slots().len() {
        let p = procs.get_mut(i);
        match p.status() {
            ProcessStatus::Executing => p.set_priority(p.priority().demoted()),
            ProcessStatus::Ready | ProcessStatus::Waiting => {
                p.set_priority(p.priority().aged())
            }
            ProcessStatus::Empty => (),
        }
    }
}

/// Makes a scheduling decision and acts on it.
///
/// If the chosen process is already current nothing is switched, but the
/// table is aged regardless.
pub fn reschedule(
    procs: &mut ProcessTable,
    policy: SchedPolicy,
    live: &mut SavedState,
) -> Result<(), Fatal> {
    let next = select(procs, policy).ok_or(Fatal::NoRunnableProcess)?;
    if next != procs.current() {
        switch_to(procs, live, next);
    } else {
        procs.get_mut(next).set_status(ProcessStatus::Executing);
    }
    age(procs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use abi::Pid;

    /// Builds a table with processes of the given priorities in slots
    /// `0..`, slot 0 executing. `None` leaves a slot empty.
    fn table(prios: &[Option<u8>]) -> (ProcessTable, SavedState) {
        let mut t = ProcessTable::new();
        for (i, p) in prios.iter().enumerate() {
            if let Some(p) = p {
                let mut proc = Process::new(
                    Pid(i as i32 + 1),
                    Priority(*p),
                    0x1000 * (i as u32 + 1),
                    0x100 + i as u32,
                );
                if i == 0 {
                    proc.set_status(ProcessStatus::Executing);
                }
                t.install(i, proc);
            }
        }
        let live = t.get(0).save().clone();
        (t, live)
    }

    #[test]
    fn incumbent_wins_ties() {
        let (t, _) = table(&[Some(5), Some(5), Some(5)]);
        assert_eq!(select(&t, SchedPolicy::Priority), Some(0));
    }

    #[test]
    fn nearest_after_current_wins_among_equals() {
        let (mut t, _) = table(&[Some(1), Some(4), Some(6), Some(6)]);
        assert_eq!(select(&t, SchedPolicy::Priority), Some(2));
        t.set_current(2);
        assert_eq!(select(&t, SchedPolicy::Priority), Some(2));
        t.set_current(1);
        assert_eq!(select(&t, SchedPolicy::Priority), Some(2));
    }

    #[test]
    fn empty_current_is_not_a_candidate() {
        let (mut t, _) = table(&[Some(9), Some(1)]);
        t.vacate(0);
        assert_eq!(select(&t, SchedPolicy::Priority), Some(1));
        t.vacate(1);
        assert_eq!(select(&t, SchedPolicy::Priority), None);
    }

    #[test]
    fn aging_promotes_waiters_and_demotes_winner() {
        let (mut t, mut live) = table(&[Some(8), Some(3), Some(10)]);
        reschedule(&mut t, SchedPolicy::Priority, &mut live).unwrap();
        assert_eq!(t.current(), 2);
        assert_eq!(t.get(2).priority(), Priority::NICE);
        assert_eq!(t.get(0).priority(), Priority(9));
        assert_eq!(t.get(1).priority(), Priority(4));

        // 9 beats 5.
        reschedule(&mut t, SchedPolicy::Priority, &mut live).unwrap();
        assert_eq!(t.current(), 0);
        assert_eq!(t.get(0).priority(), Priority::NICE);
        assert_eq!(t.get(2).priority(), Priority(6));
        assert_eq!(t.get(1).priority(), Priority(5));
    }

    #[test]
    fn aging_saturates() {
        assert_eq!(Priority::MAX.aged(), Priority::MAX);
        assert_eq!(Priority(9).aged(), Priority::MAX);
        assert_eq!(Priority::NICE.demoted(), Priority::MIN);
        assert_eq!(Priority(6).demoted(), Priority::NICE);
    }

    #[test]
    fn switch_moves_state_through_the_frame() {
        let (mut t, mut live) = table(&[Some(1), Some(9)]);
        live.gpr[4] = 0xAA;
        reschedule(&mut t, SchedPolicy::Priority, &mut live).unwrap();
        assert_eq!(t.current(), 1);
        assert_eq!(live.pc, 0x101);
        assert_eq!(t.get(0).save().gpr[4], 0xAA);
        assert_eq!(t.get(0).status(), ProcessStatus::Ready);
        assert_eq!(t.get(1).status(), ProcessStatus::Executing);
    }

    #[test]
    fn round_robin_ignores_priority() {
        let (mut t, mut live) = table(&[Some(10), None, Some(1), Some(1)]);
        let rr = SchedPolicy::RoundRobin;
        reschedule(&mut t, rr, &mut live).unwrap();
        assert_eq!(t.current(), 2);
        reschedule(&mut t, rr, &mut live).unwrap();
        assert_eq!(t.current(), 3);
        reschedule(&mut t, rr, &mut live).unwrap();
        assert_eq!(t.current(), 0);
        // Aging still runs, but has no say in the order.
        assert_eq!(t.get(0).priority(), Priority::NICE);
        assert_eq!(t.get(3).priority(), Priority(2));
    }

    #[test]
    fn round_robin_keeps_sole_runner() {
        let (mut t, mut live) = table(&[Some(1)]);
        reschedule(&mut t, SchedPolicy::RoundRobin, &mut live).unwrap();
        assert_eq!(t.current(), 0);
        t.vacate(0);
        assert_eq!(
            reschedule(&mut t, SchedPolicy::RoundRobin, &mut live),
            Err(Fatal::NoRunnableProcess)
        );
    }
}
