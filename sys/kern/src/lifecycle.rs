// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Creating, replacing and destroying processes.
//!
//! These operate on the current process through the live trap frame. None of
//! them reschedule; callers decide that.

use abi::{Pid, ProcessStatus, ERR_FAILED};

use crate::arch::{self, SavedState};
use crate::err::{Fatal, UserError};
use crate::process::{ArchState, Process};
use crate::sched::Priority;
use crate::startup::Kernel;

/// Resets all kernel state and makes the console program the sole, running
/// process in slot 0.
pub fn bootstrap(k: &mut Kernel<'_>, live: &mut SavedState) {
    k.procs.clear();
    k.pipes.clear();
    k.console.clear();

    let pid = k.procs.allocate_pid();
    let top = k.stacks.stack_top(0);
    let mut console = Process::new(pid, Priority::NICE, top, k.console_entry);
    console.set_status(ProcessStatus::Executing);
    k.procs.install(0, console);
    k.procs.set_current(0);
    arch::install(live, k.procs.get(0).save());

    klog!("bootstrap: console is pid {}", pid.0);
}

/// Duplicates the current process into the first free slot, including the
/// live part of its stack. Returns the child's pid.
///
/// The child resumes where the parent does, but sees `0` as its return value.
/// `nice` starts it at `Priority::NICE` instead of `Priority::MIN`.
///
/// If the table is full, the caller's return value is set to `-1` before the
/// fatal error is reported, so that it holds even if the kernel carries on.
pub fn fork(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
    nice: bool,
) -> Result<Pid, UserError> {
    let parent = k.procs.current();
    let Some(child) = k.procs.first_free() else {
        live.set_result(ERR_FAILED);
        return Err(Fatal::ProcessTableFull.into());
    };

    let parent_top = k.procs.get(parent).stack_top();
    let child_sp = k
        .stacks
        .copy_live(parent_top, live.stack_pointer(), child)
        .ok_or(UserError::FAILED)?;

    arch::capture(live, k.procs.get_mut(parent).save_mut());
    let pid = k.procs.allocate_pid();
    let priority = if nice { Priority::NICE } else { Priority::MIN };

    let mut p = k.procs.get(parent).clone();
    p.become_child(pid, priority, k.stacks.stack_top(child), child_sp);
    k.procs.install(child, p);

    klog!(
        "fork: pid {} -> pid {} (slot {})",
        k.procs.get(parent).pid().0,
        pid.0,
        child
    );
    Ok(pid)
}

/// Replaces the current program with the one at `entry`, on a zeroed stack.
/// With `arg`, the new program finds it in its first argument register.
pub fn exec(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
    entry: u32,
    arg: Option<u32>,
) {
    let cur = k.procs.current();
    k.stacks.clear(cur);
    live.reset_image(entry, k.procs.get(cur).stack_top());
    if let Some(arg) = arg {
        live.ret0(arg);
    }
    ktrace!("exec: slot {} at {:#x}", cur, entry);
}

/// Ends the current process. The caller must reschedule.
pub fn exit(k: &mut Kernel<'_>, status: i32) {
    let cur = k.procs.current();
    if let Some(pid) = terminate(k, cur) {
        klog!("exit: pid {} status {}", pid.0, status);
    }
}

/// Ends the process called `pid`, which may be the caller.
pub fn kill(k: &mut Kernel<'_>, pid: Pid) -> Result<(), UserError> {
    let index = k.procs.index_of(pid).ok_or(UserError::FAILED)?;
    terminate(k, index);
    klog!("kill: pid {}", pid.0);
    Ok(())
}

/// Empties slot `index` and closes every pipe its process was involved in.
/// Returns the pid, or `None` if the slot was already empty.
fn terminate(k: &mut Kernel<'_>, index: usize) -> Option<Pid> {
    let pid = k.procs.vacate(index)?;
    let closed = k.pipes.release(pid);
    if closed != 0 {
        klog!("pid {}: closed {} pipe(s)", pid.0, closed);
    }
    Some(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MAX_PROCESSES, STACK_SIZE};
    use crate::startup::testing::booted;
    use abi::PipeStatus;

    #[test]
    fn bootstrap_installs_console() {
        let (k, live) = booted(Config::DEFAULT);
        let console = k.procs.get(0);
        assert_eq!(console.pid(), Pid::BOOT);
        assert_eq!(console.status(), ProcessStatus::Executing);
        assert_eq!(console.priority(), Priority::NICE);
        assert_eq!(k.procs.live(), 1);
        assert_eq!(live.pc, arch::FAKE_CONSOLE_ENTRY);
        assert_eq!(live.sp, arch::FAKE_STACK_TOP);
        assert_eq!(live.cpsr, 0x50);
        assert!(k.procs.slots()[1..].iter().all(Process::is_empty));
    }

    #[test]
    fn fork_returns_twice() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        live.gpr[5] = 0x55;
        let pid = fork(&mut k, &mut live, false).unwrap();
        assert_eq!(pid, Pid(2));

        let child = k.procs.get(1);
        assert_eq!(child.status(), ProcessStatus::Ready);
        assert_eq!(child.priority(), Priority::MIN);
        assert_eq!(child.save().gpr[0], 0);
        assert_eq!(child.save().gpr[5], 0x55);
        assert_eq!(child.save().pc, live.pc);
        assert_eq!(child.stack_top(), k.stacks.stack_top(1));
        assert_eq!(k.procs.live(), 2);

        let nice = fork(&mut k, &mut live, true).unwrap();
        let i = k.procs.index_of(nice).unwrap();
        assert_eq!(k.procs.get(i).priority(), Priority::NICE);
    }

    #[test]
    fn fork_copies_stack_at_same_depth() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        let top0 = k.stacks.stack_top(0);
        live.sp = top0 - 12;
        k.stacks
            .bytes_mut(live.sp, 12)
            .unwrap()
            .copy_from_slice(b"hello world!");

        fork(&mut k, &mut live, false).unwrap();
        let child = k.procs.get(1).clone();
        assert_eq!(child.save().sp, child.stack_top() - 12);
        let copy = k.stacks.bytes(child.save().sp, 12).unwrap();
        assert_eq!(copy, b"hello world!");

        k.stacks.bytes_mut(child.save().sp, 5).unwrap().fill(b'x');
        assert_eq!(k.stacks.bytes(live.sp, 12).unwrap(), b"hello world!");
    }

    #[test]
    fn fork_with_full_table_fails() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        for _ in 1..MAX_PROCESSES {
            assert!(fork(&mut k, &mut live, false).is_ok());
        }
        assert_eq!(
            fork(&mut k, &mut live, false),
            Err(UserError::Fatal(Fatal::ProcessTableFull))
        );
        assert_eq!(live.gpr[0] as i32, -1);
        assert_eq!(k.procs.live(), MAX_PROCESSES);
    }

    #[test]
    fn fork_with_wild_sp_fails() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        live.sp = 0x10;
        assert_eq!(fork(&mut k, &mut live, false), Err(UserError::FAILED));
        assert_eq!(k.procs.live(), 1);
    }

    #[test]
    fn exec_starts_clean() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        let top = k.stacks.stack_top(0);
        live.sp = top - STACK_SIZE;
        k.stacks.bytes_mut(live.sp, STACK_SIZE).unwrap().fill(0xA5);
        live.gpr = [7; 13];
        live.lr = 0x1234;

        exec(&mut k, &mut live, 0x8000, None);
        assert_eq!(live.pc, 0x8000);
        assert_eq!(live.sp, top);
        assert_eq!(live.cpsr, 0x50);
        assert_eq!(live.lr, 0x1234);
        assert!(live.gpr.iter().all(|&r| r == 0));
        assert!(k
            .stacks
            .bytes(top - STACK_SIZE, STACK_SIZE)
            .unwrap()
            .iter()
            .all(|&b| b == 0));

        exec(&mut k, &mut live, 0x9000, Some(3));
        assert_eq!(live.gpr[0], 3);
        assert!(live.gpr[1..].iter().all(|&r| r == 0));
    }

    #[test]
    fn kill_is_not_repeatable() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        let pid = fork(&mut k, &mut live, false).unwrap();
        assert_eq!(kill(&mut k, pid), Ok(()));
        assert!(k.procs.get(1).is_empty());
        assert_eq!(kill(&mut k, pid), Err(UserError::FAILED));
        assert_eq!(kill(&mut k, Pid(99)), Err(UserError::FAILED));
        assert_eq!(k.procs.live(), 1);
    }

    #[test]
    fn termination_closes_pipes_of_the_target() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        let child = fork(&mut k, &mut live, false).unwrap();
        let id = k.pipes.open(Pid::BOOT).unwrap();
        k.pipes.assign_writer(id, Pid::BOOT).unwrap();
        k.pipes.assign_reader(id, child).unwrap();
        let other = k.pipes.open(Pid::BOOT).unwrap();

        kill(&mut k, child).unwrap();
        assert_eq!(k.pipes.pipes()[id as usize].status(), PipeStatus::Closed);
        assert_eq!(k.pipes.pipes()[other as usize].status(), PipeStatus::Open);
        assert!(k.pipes.write(id, Pid::BOOT, 1).is_err());
    }

    #[test]
    fn self_kill_keeps_slot_reserved() {
        let (mut k, mut live) = booted(Config::DEFAULT);
        kill(&mut k, Pid::BOOT).unwrap();
        assert_eq!(k.procs.live(), 0);
        // Still running on slot 0, so a fork must not land there.
        let pid = fork(&mut k, &mut live, false).unwrap();
        assert_eq!(k.procs.index_of(pid), Some(1));
        // Exiting afterwards doesn't count the process twice.
        exit(&mut k, 0);
        assert_eq!(k.procs.live(), 1);
    }
}
