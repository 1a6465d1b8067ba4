// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture-specific support.
//!
//! In practice, this works by
//!
//! - Conditionally defining a nested module (below).
//! - `pub use`-ing its contents
//!
//! Thus, all architecture-specific types and functions show up right here in
//! the `arch` module, magically tailored for the current target.
//!
//! For this to work, each architecture support module must define the same set
//! of names:
//!
//! - `klog!`, the kernel logging macro.
//! - `TIMER_IRQ` and `CONSOLE_IRQ`, the interrupt ids of the preemption timer
//!   and the console UART receive line.
//! - `enable_interrupt_sources`, `claim_interrupt`, `complete_interrupt`,
//!   `clear_timer`, `clear_console_interrupt` for the interrupt controller
//!   and its two sources.
//! - `console_getc` and `console_putc`.
//! - `user_bytes` and `user_bytes_mut`, which expose user memory lying
//!   outside the stack arena.
//! - `user_stack_arena` and `console_entry`, consumed once at reset.
//!
//! The trap frame layout, `SavedState`, is the same on every backend: the host
//! backend simulates the ARMv7-A machine the kernel is written for.

mod frame;

pub use frame::SavedState;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "arm")] {
        #[macro_use]
        pub mod arm_a;
        pub use arm_a::*;
    } else {
        #[macro_use]
        pub mod fake;
        pub use fake::*;
    }
}

/// Like `klog!`, but only emitted when the `klog-trace` feature is on. Used
/// for events that happen on nearly every kernel entry.
macro_rules! ktrace {
    ($($t:tt)*) => {{
        #[cfg(feature = "klog-trace")]
        {
            klog!($($t)*);
        }
        #[cfg(not(feature = "klog-trace"))]
        {
            let _ = format_args!($($t)*);
        }
    }};
}

/// Takes a snapshot of the live machine state held in the trap frame.
///
/// Together with `install`, this is the only way the kernel moves register
/// state between the trap frame and a process table entry.
#[inline(always)]
pub fn capture(live: &SavedState, into: &mut SavedState) {
    into.clone_from(live);
}

/// Makes `state` the machine state that will be restored when the kernel
/// returns to user mode.
#[inline(always)]
pub fn install(live: &mut SavedState, state: &SavedState) {
    live.clone_from(state);
}
