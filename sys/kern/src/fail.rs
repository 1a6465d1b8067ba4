// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Last words of a kernel that has hit a bug.
//!
//! Violated kernel invariants panic, and the panic ends in `die`. Conditions
//! caused by user programs never get here; they go through `Kernel::fail`.
//!
//! `die` leaves two things behind in RAM for anyone inspecting a halted
//! board over JTAG:
//!
//! - `KERNEL_HAS_FAILED`, set once the kernel has died;
//! - `KERNEL_EPITAPH`, the reason as UTF-8, cut short if it doesn't fit and
//!   NUL-padded otherwise.
//!
//! The reason also goes out on the console UART. The core then spins with
//! interrupts still masked, so no process runs again until reset.

use core::fmt::{Display, Write};
use core::sync::atomic::Ordering;

#[used]
static mut KERNEL_HAS_FAILED: bool = false;

const EPITAPH_LEN: usize = 128;

#[used]
static mut KERNEL_EPITAPH: [u8; EPITAPH_LEN] = [0; EPITAPH_LEN];

fn halt() -> ! {
    loop {
        core::sync::atomic::fence(Ordering::SeqCst);
    }
}

/// Claims the epitaph buffer. A second failure (a panic while dying) halts
/// on the spot, leaving the first reason intact.
fn claim_epitaph() -> &'static mut [u8] {
    // Safety: the kernel runs with IRQs masked on a single core, so nothing
    // else touches these statics, and the flag lets only the first caller
    // past.
    unsafe {
        if core::ptr::replace(core::ptr::addr_of_mut!(KERNEL_HAS_FAILED), true)
        {
            halt();
        }
        &mut *core::ptr::addr_of_mut!(KERNEL_EPITAPH)
    }
}

/// Records `reason`, reports it, and stops the kernel for good.
#[inline(always)]
pub fn die(reason: impl Display) -> ! {
    die_impl(&reason)
}

#[inline(never)]
fn die_impl(reason: &dyn Display) -> ! {
    let mut epitaph = Truncating {
        rest: claim_epitaph(),
    };
    write!(epitaph, "{reason}").ok();

    #[cfg(target_arch = "arm")]
    crate::arch::klog_fmt(format_args!("kernel died: {reason}"));
    #[cfg(not(target_arch = "arm"))]
    klog!("kernel died: {}", reason);

    halt()
}

/// Formatter sink over a fixed buffer that silently drops whatever doesn't
/// fit.
struct Truncating {
    rest: &'static mut [u8],
}

impl Write for Truncating {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let n = s.len().min(self.rest.len());
        let (head, tail) = core::mem::take(&mut self.rest).split_at_mut(n);
        head.copy_from_slice(&s.as_bytes()[..n]);
        self.rest = tail;
        Ok(())
    }
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    die(info)
}
