// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Implementation of processes and the process table.

use abi::{Pid, ProcessStatus};

use crate::arch::SavedState;
use crate::config::MAX_PROCESSES;
use crate::sched::Priority;

/// Internal representation of a process: a process control block.
#[derive(Clone, Debug, Default)]
pub struct Process {
    /// Saved machine state of the user program. Only meaningful while the
    /// process is not executing; the live copy is in the trap frame.
    save: SavedState,
    pid: Pid,
    status: ProcessStatus,
    priority: Priority,
    /// Initial stack pointer, fixed by the slot the process occupies.
    stack_top: u32,
}

impl Process {
    /// Builds a process that will start at `entry` with an empty stack.
    pub fn new(
        pid: Pid,
        priority: Priority,
        stack_top: u32,
        entry: u32,
    ) -> Self {
        let mut save = SavedState::default();
        save.reset_image(entry, stack_top);
        Self {
            save,
            pid,
            status: ProcessStatus::Ready,
            priority,
            stack_top,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn stack_top(&self) -> u32 {
        self.stack_top
    }

    pub fn save(&self) -> &SavedState {
        &self.save
    }

    pub fn save_mut(&mut self) -> &mut SavedState {
        &mut self.save
    }

    pub fn is_empty(&self) -> bool {
        self.status == ProcessStatus::Empty
    }

    pub(crate) fn set_status(&mut self, status: ProcessStatus) {
        self.status = status;
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Turns a copy of a parent's control block into its child.
    pub(crate) fn become_child(
        &mut self,
        pid: Pid,
        priority: Priority,
        stack_top: u32,
        sp: u32,
    ) {
        self.pid = pid;
        self.priority = priority;
        self.stack_top = stack_top;
        self.status = ProcessStatus::Ready;
        self.save.set_stack_pointer(sp);
        self.save.ret0(0);
    }
}

/// Interface that must be implemented by the `arch::SavedState` type. This
/// gives architecture-independent access to process state for the rest of the
/// kernel.
pub trait ArchState: Default {
    fn stack_pointer(&self) -> u32;
    fn set_stack_pointer(&mut self, sp: u32);
    fn program_counter(&self) -> u32;

    /// Reads syscall argument register 0.
    fn arg0(&self) -> u32;
    /// Reads syscall argument register 1.
    fn arg1(&self) -> u32;
    /// Reads syscall argument register 2.
    fn arg2(&self) -> u32;

    /// Writes syscall return argument 0.
    fn ret0(&mut self, _: u32);

    /// Rewrites the state so that it starts a fresh program image at `entry`
    /// on an empty stack. All general-purpose registers are zeroed.
    fn reset_image(&mut self, entry: u32, stack_top: u32);

    /// Writes a signed result to return argument 0.
    fn set_result(&mut self, x: i32) {
        self.ret0(x as u32);
    }

    /// Interprets arguments as for the `write` and `read` syscalls.
    fn as_io_args(&self) -> IoArgs {
        IoArgs {
            fd: self.arg0(),
            buffer: self.arg1(),
            len: self.arg2(),
        }
    }

    /// Interprets arguments as for `fork`.
    fn as_fork_args(&self) -> ForkArgs {
        ForkArgs {
            nice: self.arg0() != 0,
        }
    }

    /// Interprets arguments as for `exit`.
    fn as_exit_args(&self) -> i32 {
        self.arg0() as i32
    }

    /// Interprets arguments as for `exec` and `exec-with-arg`.
    fn as_exec_args(&self) -> ExecArgs {
        ExecArgs {
            entry: self.arg0(),
            arg: self.arg1(),
        }
    }

    /// Interprets arguments as for `kill`.
    fn as_kill_args(&self) -> KillArgs {
        KillArgs {
            pid: Pid(self.arg0() as i32),
            signal: self.arg1(),
        }
    }

    /// Interprets arguments as for the pipe syscalls. Not every call uses
    /// `value`.
    fn as_pipe_args(&self) -> PipeArgs {
        PipeArgs {
            id: self.arg0() as i32,
            value: self.arg1(),
        }
    }
}

/// Decoded arguments for `write` and `read`.
#[derive(Clone, Debug)]
pub struct IoArgs {
    pub fd: u32,
    pub buffer: u32,
    pub len: u32,
}

/// Decoded arguments for `fork`.
#[derive(Clone, Debug)]
pub struct ForkArgs {
    /// Child starts at the nice priority rather than the minimum.
    pub nice: bool,
}

/// Decoded arguments for the exec family.
#[derive(Clone, Debug)]
pub struct ExecArgs {
    pub entry: u32,
    /// Only used by `exec-with-arg`.
    pub arg: u32,
}

/// Decoded arguments for `kill`.
#[derive(Clone, Debug)]
pub struct KillArgs {
    pub pid: Pid,
    /// Accepted and ignored; every kill terminates.
    pub signal: u32,
}

/// Decoded arguments for the pipe syscalls.
#[derive(Clone, Debug)]
pub struct PipeArgs {
    pub id: i32,
    pub value: u32,
}

/// Return value for operations that can have scheduling implications. This is
/// marked `must_use` because forgetting to actually update the scheduler after
/// performing an operation that requires it would be Bad.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum NextTask {
    /// It's fine to keep running whatever process we were just running.
    Same,
    /// We need to switch, and the scheduler needs to figure out to what.
    Other,
}

/// Fixed-size table of process slots.
#[derive(Debug)]
pub struct ProcessTable {
    slots: [Process; MAX_PROCESSES],
    /// Slot whose state is in the trap frame. This may name an empty slot
    /// if the running process has just killed itself.
    current: usize,
    last_pid: Pid,
    live: usize,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Process::default()),
            current: 0,
            last_pid: Pid(0),
            live: 0,
        }
    }

    pub fn slots(&self) -> &[Process] {
        &self.slots
    }

    pub fn get(&self, index: usize) -> &Process {
        &self.slots[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Process {
        &mut self.slots[index]
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_process(&self) -> &Process {
        &self.slots[self.current]
    }

    pub(crate) fn set_current(&mut self, index: usize) {
        self.current = index;
    }

    /// Number of non-empty slots.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Pid most recently handed out.
    pub fn last_pid(&self) -> Pid {
        self.last_pid
    }

    /// Checks whether `index` is in use. The current slot counts as in use
    /// even after its process has been killed, since the killed process keeps
    /// the CPU until the next scheduling decision.
    fn is_occupied(&self, index: usize) -> bool {
        index == self.current || !self.slots[index].is_empty()
    }

    /// Finds the lowest-indexed free slot.
    pub fn first_free(&self) -> Option<usize> {
        (0..MAX_PROCESSES).find(|&i| !self.is_occupied(i))
    }

    /// Finds the slot of the live process called `pid`.
    pub fn index_of(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|p| !p.is_empty() && p.pid == pid)
    }

    /// Advances the pid counter past any values still held by occupied slots
    /// (and past zero, which is reserved as `fork`'s child return value), and
    /// returns the result.
    pub fn allocate_pid(&mut self) -> Pid {
        let mut pid = self.last_pid;
        // There are more pids than slots, so this finds one within
        // MAX_PROCESSES + 2 steps.
        for _ in 0..MAX_PROCESSES + 2 {
            pid = pid.successor();
            let taken = (0..MAX_PROCESSES)
                .any(|i| self.is_occupied(i) && self.slots[i].pid == pid);
            if pid.0 != 0 && !taken {
                break;
            }
        }
        self.last_pid = pid;
        pid
    }

    /// Installs `process` into the free slot `index`.
    pub(crate) fn install(&mut self, index: usize, process: Process) {
        if self.slots[index].is_empty() && !process.is_empty() {
            self.live += 1;
        }
        self.slots[index] = process;
    }

    /// Marks the process in `index` empty. Returns its pid if it was live.
    pub(crate) fn vacate(&mut self, index: usize) -> Option<Pid> {
        let p = &mut self.slots[index];
        if p.is_empty() {
            return None;
        }
        p.status = ProcessStatus::Empty;
        self.live -= 1;
        Some(p.pid)
    }

    /// Empties every slot and restarts pid allocation.
    pub(crate) fn clear(&mut self) {
        *self = Self::new();
    }
}

/// One character per slot, for logs: `x` executing, `r` ready, `w` waiting,
/// `e` empty.
impl core::fmt::Display for ProcessTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use core::fmt::Write;
        self.slots
            .iter()
            .try_for_each(|p| f.write_char(p.status.as_char()))
    }
}
