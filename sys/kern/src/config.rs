// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Build-time kernel configuration.
//!
//! Table sizes and default behavior are generated by `build.rs` from the RON
//! text in `KERN_KCONFIG`. The behavioral knobs are gathered into `Config` so
//! that tests can build kernels with other settings.

/// How the scheduler chooses the next process.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedPolicy {
    /// Highest priority wins, with aging.
    Priority,
    /// Next ready slot after the current one.
    RoundRobin,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Whether the timer tick is enabled at reset.
    pub preemption: bool,
    /// If set, fatal kernel errors re-bootstrap the system. If clear, they are
    /// logged and the offending request is ignored.
    pub strict: bool,
    pub policy: SchedPolicy,
}

impl Config {
    pub const DEFAULT: Self = Self {
        preemption: KCONFIG_PREEMPTION,
        strict: KCONFIG_STRICT,
        policy: KCONFIG_POLICY,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

include!(concat!(env!("OUT_DIR"), "/kconfig.rs"));
