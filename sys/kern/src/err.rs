// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common error-handling support.
//!
//! Syscall implementations return `Result<NextTask, UserError>` and leave the
//! reporting to their caller, so that the error paths read the same everywhere.

use abi::{PipeError, ERR_FAILED};

use crate::process::NextTask;

/// An error committed by, or on behalf of, user code during a syscall.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UserError {
    /// A recoverable error. The code (an `i32`, since user code sees negative
    /// values) is placed in the caller's return register. It may still cause a
    /// context switch, as indicated by the `NextTask`.
    Recoverable(i32, NextTask),
    /// A condition the kernel cannot paper over. What happens next depends on
    /// the kernel's configuration; see `Kernel::fail`.
    Fatal(Fatal),
}

impl UserError {
    /// The usual failure: `-1`, keep running.
    pub const FAILED: Self = Self::Recoverable(ERR_FAILED, NextTask::Same);
}

/// Conditions that the kernel treats as fatal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fatal {
    /// A trap carried a number that is not a syscall.
    BadSyscallNumber(u32),
    /// `fork` found no empty process slot.
    ProcessTableFull,
    /// The scheduler found nothing to run.
    NoRunnableProcess,
}

impl Fatal {
    /// Whether this must restart the system regardless of configuration,
    /// because there is no sensible way to continue.
    pub fn always_restarts(self) -> bool {
        matches!(self, Self::NoRunnableProcess)
    }
}

impl core::fmt::Display for Fatal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadSyscallNumber(n) => write!(f, "unknown syscall {n:#x}"),
            Self::ProcessTableFull => f.write_str("process table full"),
            Self::NoRunnableProcess => f.write_str("no runnable process"),
        }
    }
}

/// Convenience conversion from `Fatal`.
impl From<Fatal> for UserError {
    fn from(f: Fatal) -> Self {
        Self::Fatal(f)
    }
}

/// Pipe failures are always reported to the caller.
impl From<PipeError> for UserError {
    fn from(e: PipeError) -> Self {
        Self::Recoverable(e.code(), NextTask::Same)
    }
}
