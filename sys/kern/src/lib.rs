// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A small preemptive kernel for the ARM RealView Platform Baseboard for
//! Cortex-A8.
//!
//! The kernel keeps a fixed table of processes, each with a fixed slice of one
//! stack arena. It boots the console program as the first process. From there
//! user programs can fork, exec, exit, kill each other, and talk through
//! one-word pipes. A periodic timer interrupt drives preemption; the scheduler
//! picks by priority with aging, or round-robin.
//!
//! Everything hardware specific lives in `arch`. On the host, `arch` is a
//! fake board that tests can drive directly.
//!
//! # Design principles
//!
//! 1. Static configuration. Table sizes and default policies are fixed at
//!    build time, from `KERN_KCONFIG`.
//! 2. A strong preference for safe code where reasonable. The `unsafe` parts
//!    are the trap entry points and the register blocks.
//! 3. Simple and clear algorithms over fast and clever ones. The tables are
//!    small and are scanned linearly.

#![cfg_attr(target_os = "none", no_std)]

#[macro_use]
pub mod arch;

pub mod config;
pub mod console;
pub mod err;
pub mod fail;
pub mod irq;
pub mod lifecycle;
pub mod pipe;
pub mod process;
pub mod sched;
pub mod stack;
pub mod startup;
pub mod syscalls;
