// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    generate_statics()?;
    Ok(())
}

/// Kernel configuration, supplied as RON in `KERN_KCONFIG`. Any field left out
/// takes the value the kernel was originally tuned for.
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct KernelConfig {
    max_processes: usize,
    max_pipes: usize,
    stack_size: u32,
    console_rx_capacity: usize,
    preemption: bool,
    strict: bool,
    policy: Policy,
}

#[derive(Deserialize, Debug)]
enum Policy {
    Priority,
    RoundRobin,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_processes: 20,
            max_pipes: 20,
            stack_size: 0x1000,
            console_rx_capacity: 32,
            preemption: true,
            strict: false,
            policy: Policy::Priority,
        }
    }
}

fn generate_statics() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-env-changed=KERN_KCONFIG");
    let kconfig: KernelConfig = match env::var("KERN_KCONFIG") {
        Ok(text) => ron::de::from_str(&text)?,
        Err(_) => KernelConfig::default(),
    };

    if kconfig.max_processes < 1 {
        return Err("max_processes must allow at least the console".into());
    }
    if kconfig.stack_size == 0 || kconfig.stack_size % 8 != 0 {
        return Err("stack_size must be a non-zero multiple of 8".into());
    }
    if kconfig.console_rx_capacity == 0 {
        return Err("console_rx_capacity must be non-zero".into());
    }

    let out = &PathBuf::from(env::var("OUT_DIR")?);
    let mut file = File::create(out.join("kconfig.rs"))?;

    writeln!(file, "// See build.rs for details")?;
    writeln!(
        file,
        "pub const MAX_PROCESSES: usize = {};",
        kconfig.max_processes
    )?;
    writeln!(file, "pub const MAX_PIPES: usize = {};", kconfig.max_pipes)?;
    writeln!(file, "pub const STACK_SIZE: u32 = {:#x};", kconfig.stack_size)?;
    writeln!(
        file,
        "pub const CONSOLE_RX_CAPACITY: usize = {};",
        kconfig.console_rx_capacity
    )?;
    writeln!(file, "const KCONFIG_PREEMPTION: bool = {};", kconfig.preemption)?;
    writeln!(file, "const KCONFIG_STRICT: bool = {};", kconfig.strict)?;
    writeln!(
        file,
        "const KCONFIG_POLICY: SchedPolicy = SchedPolicy::{:?};",
        kconfig.policy
    )?;

    Ok(())
}
