// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions, shared between kernel and user programs.

#![no_std]

/// Names a process.
///
/// Pids are handed out by a counter that advances on every process creation
/// and skips values that are still held by a live process. They are distinct
/// from the index of the process's slot in the kernel's table, which user code
/// never sees.
///
/// This is an `i32` on the wire so that negative values can be used as error
/// returns from `fork` and `kill`.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
)]
#[repr(transparent)]
pub struct Pid(pub i32);

impl Pid {
    /// Pid of the process installed at boot (the console). It is never
    /// handed out again while that process lives.
    pub const BOOT: Self = Self(1);

    /// Pids wrap back to zero when the counter reaches this value.
    pub const LIMIT: i32 = i32::MAX;

    /// Produces the pid that follows `self` in allocation order, ignoring
    /// whether it is in use.
    pub fn successor(self) -> Self {
        Pid(self.0.wrapping_add(1).rem_euclid(Self::LIMIT))
    }
}

impl From<Pid> for u32 {
    fn from(p: Pid) -> Self {
        p.0 as u32
    }
}

/// Scheduling status of a process table slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ProcessStatus {
    /// Slot is unused.
    #[default]
    Empty,
    /// Runnable, but not on the CPU.
    Ready,
    /// Reserved for a blocking primitive; nothing currently produces it.
    Waiting,
    /// On the CPU. At most one slot is in this state.
    Executing,
}

impl ProcessStatus {
    /// Checks whether a slot in this state may be picked by the scheduler.
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::Ready | Self::Executing)
    }

    /// Single-character rendering used in kernel logs.
    pub fn as_char(self) -> char {
        match self {
            Self::Empty => 'e',
            Self::Ready => 'r',
            Self::Waiting => 'w',
            Self::Executing => 'x',
        }
    }
}

/// Status of a pipe.
///
/// A pipe moves `Closed -> Open` when created, `Open -> ReadyToWrite` once
/// both of its endpoints have been assigned, and then alternates between
/// `ReadyToWrite` and `ReadyToRead` as values are deposited and consumed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum PipeStatus {
    #[default]
    Closed,
    Open,
    ReadyToWrite,
    ReadyToRead,
}

/// Recoverable pipe failures, as returned to user code.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PipeError {
    /// The pipe id is out of range, or no closed pipe was available to open.
    InvalidId,
    /// The caller is not the endpoint (or owner) the operation requires.
    NotAuthorized,
    /// The pipe's status does not permit the operation right now.
    WrongState,
    /// The endpoint has already been bound to a process.
    AlreadyAssigned,
}

impl PipeError {
    /// Value placed in the caller's return register.
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidId => -1,
            Self::NotAuthorized => -2,
            Self::WrongState => -3,
            Self::AlreadyAssigned => -4,
        }
    }
}

/// Generic failure value for syscalls that report errors as `-1`.
pub const ERR_FAILED: i32 = -1;

/// Enumeration of syscall numbers, as encoded in the `SVC` immediate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Sysnum {
    Yield = 0x00,
    Write = 0x01,
    Read = 0x02,
    Fork = 0x03,
    Exit = 0x04,
    Exec = 0x05,
    Kill = 0x06,
    GetPid = 0x07,
    ExecWithArg = 0x08,

    PipeOpen = 0x10,
    PipeWrite = 0x11,
    PipeRead = 0x12,
    PipeClose = 0x13,
    PipeCanRead = 0x14,
    PipeCanWrite = 0x15,
    PipeAssignRead = 0x16,
    PipeAssignWrite = 0x17,
}

/// We're using an explicit `TryFrom` impl for `Sysnum` instead of
/// `FromPrimitive` because the kernel doesn't depend on `num-traits` and this
/// seems okay.
impl core::convert::TryFrom<u32> for Sysnum {
    type Error = ();

    fn try_from(x: u32) -> Result<Self, Self::Error> {
        match x {
            0x00 => Ok(Self::Yield),
            0x01 => Ok(Self::Write),
            0x02 => Ok(Self::Read),
            0x03 => Ok(Self::Fork),
            0x04 => Ok(Self::Exit),
            0x05 => Ok(Self::Exec),
            0x06 => Ok(Self::Kill),
            0x07 => Ok(Self::GetPid),
            0x08 => Ok(Self::ExecWithArg),
            0x10 => Ok(Self::PipeOpen),
            0x11 => Ok(Self::PipeWrite),
            0x12 => Ok(Self::PipeRead),
            0x13 => Ok(Self::PipeClose),
            0x14 => Ok(Self::PipeCanRead),
            0x15 => Ok(Self::PipeCanWrite),
            0x16 => Ok(Self::PipeAssignRead),
            0x17 => Ok(Self::PipeAssignWrite),
            _ => Err(()),
        }
    }
}

/// Standard file descriptors understood by `read` and `write`.
pub const STDIN_FILENO: u32 = 0;
pub const STDOUT_FILENO: u32 = 1;
pub const STDERR_FILENO: u32 = 2;

/// Exit status codes, by convention.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

bitflags::bitflags! {
    /// Bits of the ARMv7-A program status register that the kernel sets when
    /// it builds a context from scratch.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    #[repr(transparent)]
    pub struct Psr: u32 {
        /// Mode field value for USR mode.
        const MODE_USR = 0x10;
        /// Thumb execution state.
        const THUMB = 1 << 5;
        /// FIQs masked.
        const FIQ_MASK = 1 << 6;
        /// IRQs masked.
        const IRQ_MASK = 1 << 7;
    }
}

/// Status register for a freshly started program image: USR mode, IRQs
/// enabled, FIQs masked.
pub const INITIAL_PSR: Psr = Psr::MODE_USR.union(Psr::FIQ_MASK);
