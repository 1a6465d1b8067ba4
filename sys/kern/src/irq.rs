// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reset and interrupt handling.

use crate::arch::{self, SavedState};
use crate::lifecycle;
use crate::sched;
use crate::startup::Kernel;

/// Brings the system up from nothing: programs the interrupt sources and
/// bootstraps the console program into `live`.
///
/// This also serves as the in-place reset after a fatal error.
pub fn handle_reset(k: &mut Kernel<'_>, live: &mut SavedState) {
    klog!(
        "reset: {} slots, {} pipes, preemption {}",
        crate::config::MAX_PROCESSES,
        crate::config::MAX_PIPES,
        if k.config.preemption { "on" } else { "off" }
    );
    arch::enable_interrupt_sources(k.config.preemption);
    lifecycle::bootstrap(k, live);
}

/// Services one interrupt. The interrupt is always signalled complete exactly
/// once, whatever its source.
pub fn handle_irq(k: &mut Kernel<'_>, live: &mut SavedState) {
    let id = arch::claim_interrupt();

    match id {
        arch::TIMER_IRQ => {
            arch::clear_timer();
            let policy = k.config.policy;
            if let Err(fatal) = sched::reschedule(&mut k.procs, policy, live) {
                k.fail(live, fatal);
            }
        }
        arch::CONSOLE_IRQ => {
            let byte = arch::console_getc();
            if k.console.receive(byte) {
                klog!("console: received {:#04x}", byte);
            } else {
                klog!("console: dropped {:#04x}", byte);
            }
            arch::clear_console_interrupt();
        }
        _ => {
            ktrace!("irq {} ignored", id);
        }
    }

    arch::complete_interrupt(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, CONSOLE_RX_CAPACITY};
    use crate::startup::testing::booted;

    fn raise(ids: &[u32]) {
        arch::with_board(|b| b.pending.extend(ids.iter().copied()));
    }

    #[test]
    fn reset_programs_sources() {
        let config = Config {
            preemption: false,
            ..Config::DEFAULT
        };
        let (k, _) = booted(config);
        assert_eq!(arch::with_board(|b| b.sources), Some(false));
        assert_eq!(k.procs().live(), 1);
    }

    #[test]
    fn every_source_is_completed_once() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        arch::with_board(|b| b.rx.push_back(b'x'));
        raise(&[arch::TIMER_IRQ, arch::CONSOLE_IRQ, 77]);
        for _ in 0..3 {
            handle_irq(&mut k, &mut live);
        }
        // Nothing pending: spurious.
        handle_irq(&mut k, &mut live);

        arch::with_board(|b| {
            assert_eq!(
                b.completed,
                [arch::TIMER_IRQ, arch::CONSOLE_IRQ, 77, arch::SPURIOUS_IRQ]
            );
            assert_eq!(b.timer_clears, 1);
            assert_eq!(b.console_clears, 1);
        });
        assert_eq!(k.console().pending(), 1);
    }

    #[test]
    fn completion_survives_a_reset() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        let cur = k.procs().current();
        k.procs.vacate(cur);
        raise(&[arch::TIMER_IRQ]);
        handle_irq(&mut k, &mut live);
        assert_eq!(k.procs().live(), 1);
        let completed = arch::with_board(|b| b.completed.clone());
        assert_eq!(completed, [arch::TIMER_IRQ]);
    }

    #[test]
    fn console_overflow_drops_input() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        let n = CONSOLE_RX_CAPACITY + 3;
        arch::with_board(|b| {
            b.rx.extend((0..n).map(|i| i as u8));
            b.pending.extend(core::iter::repeat(arch::CONSOLE_IRQ).take(n));
        });
        for _ in 0..n {
            handle_irq(&mut k, &mut live);
        }
        assert_eq!(k.console().pending(), CONSOLE_RX_CAPACITY);
        assert_eq!(k.console().dropped(), 3);
    }

    mod churn {
        use super::*;
        use crate::config::{SchedPolicy, MAX_PROCESSES};
        use crate::err::UserError;
        use crate::sched::Priority;
        use abi::{Pid, ProcessStatus};
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Fork(bool),
            Tick,
            Exit,
            Kill(i32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                3 => any::<bool>().prop_map(Op::Fork),
                4 => Just(Op::Tick),
                1 => Just(Op::Exit),
                1 => (0..MAX_PROCESSES as i32 + 4).prop_map(Op::Kill),
            ]
        }

        fn policy() -> impl Strategy<Value = SchedPolicy> {
            prop_oneof![
                Just(SchedPolicy::Priority),
                Just(SchedPolicy::RoundRobin),
            ]
        }

        fn check_table(k: &Kernel<'_>) {
            let slots = k.procs().slots();
            let executing: Vec<usize> = (0..slots.len())
                .filter(|&i| slots[i].status() == ProcessStatus::Executing)
                .collect();
            assert!(executing.len() <= 1, "executing: {executing:?}");
            if let Some(&i) = executing.first() {
                assert_eq!(i, k.procs().current());
            }

            let occupied: Vec<Pid> = slots
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| p.pid())
                .collect();
            assert_eq!(occupied.len(), k.procs().live());
            for (n, pid) in occupied.iter().enumerate() {
                assert!(!occupied[n + 1..].contains(pid), "{pid:?} twice");
            }
        }

        proptest! {
            #[test]
            fn table_stays_consistent(
                policy in policy(),
                ops in prop::collection::vec(op(), 1..64),
            ) {
                let config = Config {
                    strict: false,
                    policy,
                    ..Config::DEFAULT
                };
                let (mut k, mut live) = booted(config);

                for op in ops {
                    match op {
                        Op::Fork(nice) => {
                            if let Err(UserError::Fatal(f)) =
                                lifecycle::fork(&mut k, &mut live, nice)
                            {
                                k.fail(&mut live, f);
                            }
                        }
                        Op::Exit => {
                            lifecycle::exit(&mut k, 0);
                            let r = sched::reschedule(
                                &mut k.procs,
                                policy,
                                &mut live,
                            );
                            if let Err(f) = r {
                                k.fail(&mut live, f);
                            }
                        }
                        Op::Kill(pid) => {
                            lifecycle::kill(&mut k, Pid(pid)).ok();
                        }
                        Op::Tick => {
                            let before: Vec<(ProcessStatus, Priority)> = k
                                .procs()
                                .slots()
                                .iter()
                                .map(|p| (p.status(), p.priority()))
                                .collect();
                            let was_live = k.procs().live();

                            raise(&[arch::TIMER_IRQ]);
                            handle_irq(&mut k, &mut live);

                            let cur = k.procs().current();
                            let now = k.procs().current_process();
                            prop_assert_eq!(
                                now.status(),
                                ProcessStatus::Executing
                            );
                            prop_assert!(now.priority() <= Priority::NICE);

                            // A reset rebuilds the table; nothing to compare.
                            if was_live == 0 || k.procs().live() != was_live {
                                continue;
                            }
                            for (i, p) in k.procs().slots().iter().enumerate() {
                                let (status, prio) = before[i];
                                if i != cur && status == ProcessStatus::Ready {
                                    prop_assert_eq!(
                                        p.status(),
                                        ProcessStatus::Ready
                                    );
                                    prop_assert_eq!(
                                        p.priority(),
                                        prio.aged()
                                    );
                                }
                            }
                        }
                    }
                    check_table(&k);
                }
            }
        }
    }
}
