// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel state and the entry points the trap vectors call.

use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::{self, SavedState};
use crate::config::Config;
use crate::console::Console;
use crate::err::Fatal;
use crate::irq;
use crate::pipe::PipeTable;
use crate::process::ProcessTable;
use crate::stack::StackArena;
use crate::syscalls;

/// Everything the kernel knows.
pub struct Kernel<'m> {
    pub(crate) procs: ProcessTable,
    pub(crate) pipes: PipeTable,
    pub(crate) stacks: StackArena<'m>,
    pub(crate) console: Console,
    pub(crate) config: Config,
    /// Where the console program starts, at every bootstrap.
    pub(crate) console_entry: u32,
}

impl<'m> Kernel<'m> {
    /// Creates a kernel with no processes. It must be bootstrapped (by
    /// `irq::handle_reset`) before any process can run.
    pub fn new(
        stacks: StackArena<'m>,
        config: Config,
        console_entry: u32,
    ) -> Self {
        Self {
            procs: ProcessTable::new(),
            pipes: PipeTable::new(),
            stacks,
            console: Console::new(),
            config,
            console_entry,
        }
    }

    pub fn procs(&self) -> &ProcessTable {
        &self.procs
    }

    pub fn pipes(&self) -> &PipeTable {
        &self.pipes
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Applies the fatal-error policy. In strict mode, and for errors that
    /// leave nothing sensible to resume, the whole system is reset in place.
    /// Otherwise the error is only logged and `live` is left as it is.
    pub fn fail(&mut self, live: &mut SavedState, fatal: Fatal) {
        klog!("fatal: {}", fatal);
        if self.config.strict || fatal.always_restarts() {
            irq::handle_reset(self, live);
        }
    }
}

/// Tracks when a mutable reference to the kernel is floating around, to
/// prevent production of a second one. This forms a sort of ad-hoc Mutex
/// around `KERNEL`.
///
/// Notice that this begins life initialized to `true`. This prevents use of
/// `with_kernel` before `kernel_reset` has filled in `KERNEL`.
static KERNEL_IN_USE: AtomicBool = AtomicBool::new(true);

static mut KERNEL: MaybeUninit<Kernel<'static>> = MaybeUninit::uninit();

/// Runs `body` with a reference to the kernel.
///
/// To preserve uniqueness of the `&mut` reference passed into `body`, this
/// function will detect any attempts to call it recursively and panic.
pub(crate) fn with_kernel<R>(
    body: impl FnOnce(&mut Kernel<'static>) -> R,
) -> R {
    if KERNEL_IN_USE.swap(true, Ordering::Acquire) {
        panic!(); // recursive use of with_kernel
    }
    // Safety: we have observed `KERNEL_IN_USE` being false, which means the
    // kernel is initialized (note that at reset it starts out true) and that
    // we're not already within a call to with_kernel. Thus, we can produce a
    // reference to it without aliasing.
    let kernel =
        unsafe { (*core::ptr::addr_of_mut!(KERNEL)).assume_init_mut() };

    let r = body(kernel);

    KERNEL_IN_USE.store(false, Ordering::Release);

    r
}

/// Reset entry point. Builds the kernel and starts the console program in
/// `frame`.
///
/// # Safety
///
/// `frame` must point to writable space for a `SavedState` that stays valid
/// until control passes to user mode. This may only be called from the reset
/// vector, once per boot.
#[no_mangle]
pub unsafe extern "C" fn kernel_reset(frame: *mut SavedState) {
    // Safety: the space is ours per our contract. It is uninitialized, so it
    // is written before a reference to it is formed.
    let live = unsafe {
        frame.write(SavedState::default());
        &mut *frame
    };

    let kernel = Kernel::new(
        arch::user_stack_arena(),
        Config::DEFAULT,
        arch::console_entry(),
    );
    // Safety: nothing can be holding a reference to `KERNEL` yet, since
    // `KERNEL_IN_USE` is still true.
    unsafe {
        (*core::ptr::addr_of_mut!(KERNEL)).write(kernel);
    }
    KERNEL_IN_USE.store(false, Ordering::Release);

    with_kernel(|k| irq::handle_reset(k, live));
}

/// IRQ entry point.
///
/// # Safety
///
/// `frame` must point to the trap frame built by the IRQ vector.
#[no_mangle]
pub unsafe extern "C" fn kernel_irq(frame: *mut SavedState) {
    // Safety: the vector hands us the only reference to the frame.
    let live = unsafe { &mut *frame };
    with_kernel(|k| irq::handle_irq(k, live));
}

/// Supervisor call entry point. `nr` is the immediate from the `SVC`
/// instruction.
///
/// # Safety
///
/// `frame` must point to the trap frame built by the SVC vector.
#[no_mangle]
pub unsafe extern "C" fn kernel_svc(frame: *mut SavedState, nr: u32) {
    // Safety: the vector hands us the only reference to the frame.
    let live = unsafe { &mut *frame };
    with_kernel(|k| syscalls::handle_syscall(k, live, nr));
}
