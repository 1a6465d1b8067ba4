// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-independent syscall implementation.
//!
//! # Syscall implementations
//!
//! Syscalls are implemented by functions with the signature:
//!
//! ```ignore
//! fn syscall(k: &mut Kernel<'_>, live: &mut SavedState) -> Result<NextTask, UserError>;
//! ```
//!
//! `live` is the caller's trap frame. Arguments are read from it through the
//! argument proxies on `process::ArchState` (e.g. `live.as_io_args()`), and
//! successful results are written straight back into it. On return, a
//! `NextTask` indicates success with a possible scheduling hint, while a
//! `UserError` indicates a condition that needs to either be returned as a
//! response code or handed to the fatal-error policy. A common wrapper takes
//! care of the final side effects, reducing code in each syscall.

use core::convert::TryFrom;

use abi::{Pid, Sysnum, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};

use crate::arch::SavedState;
use crate::console;
use crate::err::{Fatal, UserError};
use crate::lifecycle;
use crate::process::{ArchState, NextTask};
use crate::sched;
use crate::stack;
use crate::startup::Kernel;

/// Runs syscall `nr` on behalf of the current process, whose state is in
/// `live`, and then reschedules if it asked for that.
pub fn handle_syscall(k: &mut Kernel<'_>, live: &mut SavedState, nr: u32) {
    ktrace!("syscall {:#x} from slot {}", nr, k.procs.current());

    let result = match Sysnum::try_from(nr) {
        Ok(Sysnum::Yield) => Ok(NextTask::Other),
        Ok(Sysnum::Write) => write(k, live),
        Ok(Sysnum::Read) => read(k, live),
        Ok(Sysnum::Fork) => fork(k, live),
        Ok(Sysnum::Exit) => exit(k, live),
        Ok(Sysnum::Exec) => exec(k, live, false),
        Ok(Sysnum::Kill) => kill(k, live),
        Ok(Sysnum::GetPid) => get_pid(k, live),
        Ok(Sysnum::ExecWithArg) => exec(k, live, true),
        Ok(Sysnum::PipeOpen) => pipe_open(k, live),
        Ok(Sysnum::PipeWrite) => pipe_write(k, live),
        Ok(Sysnum::PipeRead) => pipe_read(k, live),
        Ok(Sysnum::PipeClose) => pipe_close(k, live),
        Ok(Sysnum::PipeCanRead) => pipe_can_read(k, live),
        Ok(Sysnum::PipeCanWrite) => pipe_can_write(k, live),
        Ok(Sysnum::PipeAssignRead) => pipe_assign_read(k, live),
        Ok(Sysnum::PipeAssignWrite) => pipe_assign_write(k, live),
        Err(()) => Err(Fatal::BadSyscallNumber(nr).into()),
    };

    let next = match result {
        Ok(hint) => hint,
        Err(UserError::Recoverable(code, hint)) => {
            live.set_result(code);
            hint
        }
        Err(UserError::Fatal(fatal)) => {
            k.fail(live, fatal);
            return;
        }
    };

    if next == NextTask::Other {
        let policy = k.config.policy;
        if let Err(fatal) = sched::reschedule(&mut k.procs, policy, live) {
            k.fail(live, fatal);
        }
    }
}

fn caller_pid(k: &Kernel<'_>) -> Pid {
    k.procs.current_process().pid()
}

/// Like `caller_pid`, but refuses a caller that has killed itself and is only
/// running out its time slice. Its pipes were released when it was killed,
/// and nothing would release any it acquired afterwards.
fn live_caller_pid(k: &Kernel<'_>) -> Result<Pid, UserError> {
    let p = k.procs.current_process();
    if p.is_empty() {
        return Err(UserError::FAILED);
    }
    Ok(p.pid())
}

/// Implementation of the `write` syscall: copies a user buffer to the console.
fn write(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_io_args();
    if args.fd != STDOUT_FILENO && args.fd != STDERR_FILENO {
        return Err(UserError::FAILED);
    }
    let bytes = stack::user_bytes(&k.stacks, args.buffer, args.len)
        .ok_or(UserError::FAILED)?;
    console::transmit(bytes);
    live.set_result(args.len as i32);
    Ok(NextTask::Same)
}

/// Implementation of the `read` syscall: takes whatever console input has
/// arrived, up to the buffer's length, without waiting for more.
fn read(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_io_args();
    if args.fd != STDIN_FILENO {
        return Err(UserError::FAILED);
    }
    let buf = stack::user_bytes_mut(&mut k.stacks, args.buffer, args.len)
        .ok_or(UserError::FAILED)?;
    let n = k.console.drain_into(buf);
    live.set_result(n as i32);
    Ok(NextTask::Same)
}

fn fork(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_fork_args();
    let pid = lifecycle::fork(k, live, args.nice)?;
    live.set_result(pid.0);
    Ok(NextTask::Same)
}

fn exit(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    lifecycle::exit(k, live.as_exit_args());
    Ok(NextTask::Other)
}

fn exec(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
    with_arg: bool,
) -> Result<NextTask, UserError> {
    let args = live.as_exec_args();
    let arg = with_arg.then_some(args.arg);
    lifecycle::exec(k, live, args.entry, arg);
    Ok(NextTask::Same)
}

fn kill(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_kill_args();
    lifecycle::kill(k, args.pid)?;
    live.set_result(0);
    Ok(NextTask::Same)
}

fn get_pid(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    live.set_result(caller_pid(k).0);
    Ok(NextTask::Same)
}

fn pipe_open(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let owner = live_caller_pid(k)?;
    let id = k.pipes.open(owner)?;
    klog!("pipe {} opened by pid {}", id, owner.0);
    live.set_result(id);
    Ok(NextTask::Same)
}

fn pipe_write(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_pipe_args();
    let caller = caller_pid(k);
    k.pipes.write(args.id, caller, args.value)?;
    live.set_result(args.id);
    Ok(NextTask::Same)
}

fn pipe_read(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_pipe_args();
    let caller = caller_pid(k);
    let value = k.pipes.read(args.id, caller)?;
    live.ret0(value);
    Ok(NextTask::Same)
}

fn pipe_close(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_pipe_args();
    let caller = caller_pid(k);
    k.pipes.close(args.id, caller)?;
    klog!("pipe {} closed", args.id);
    live.set_result(args.id);
    Ok(NextTask::Same)
}

fn pipe_can_read(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_pipe_args();
    let ready = k.pipes.can_read(args.id).unwrap_or(false);
    live.ret0(u32::from(ready));
    Ok(NextTask::Same)
}

fn pipe_can_write(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_pipe_args();
    let ready = k.pipes.can_write(args.id).unwrap_or(false);
    live.ret0(u32::from(ready));
    Ok(NextTask::Same)
}

fn pipe_assign_read(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_pipe_args();
    live_caller_pid(k)?;
    k.pipes.assign_reader(args.id, Pid(args.value as i32))?;
    live.set_result(args.id);
    Ok(NextTask::Same)
}

fn pipe_assign_write(
    k: &mut Kernel<'_>,
    live: &mut SavedState,
) -> Result<NextTask, UserError> {
    let args = live.as_pipe_args();
    live_caller_pid(k)?;
    k.pipes.assign_writer(args.id, Pid(args.value as i32))?;
    live.set_result(args.id);
    Ok(NextTask::Same)
}
