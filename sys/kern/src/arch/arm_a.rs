// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Architecture support for ARMv7-A on the RealView Platform Baseboard for
//! Cortex-A8.
//!
//! # Kernel entry
//!
//! There are three ways into the kernel: reset, `SVC` and IRQ. All three build
//! the same frame on the current (banked) kernel stack:
//!
//! ```text
//!   sp + 0   spsr        (user CPSR)
//!   sp + 4   lr          (user resume address)
//!   sp + 8   r0 .. r12   (user, via stm ^)
//!   sp + 60  sp          (user)
//!   sp + 64  lr          (user)
//!   sp + 68  pad         (keeps the stack 8-byte aligned across the call)
//! ```
//!
//! which is exactly a `SavedState`, and pass its address to the matching
//! `kernel_*` entry point in `startup`. On return the same frame is unwound
//! into the user registers and the processor drops back to USR mode with
//! `movs pc, lr`. Anything the kernel wrote into the frame, including a
//! different process's state, is what runs next.
//!
//! For `SVC` the syscall number is recovered from the immediate field of the
//! trapping instruction; user code is expected to run in ARM state.
//!
//! The kernel never unmasks IRQs while it runs, so entries do not nest.
//!
//! # Linker contract
//!
//! The image must provide `tos_svc`, `tos_irq` and `tos_usr` (tops of the SVC,
//! IRQ and user stack areas, 8-byte aligned), with `MAX_PROCESSES *
//! STACK_SIZE` bytes reserved below `tos_usr`, plus the console program's
//! entry point `main_console`. The `.vectors` section must be placed where the
//! board starts executing at reset.

use core::arch::global_asm;
use core::fmt::Write;

use vcell::VolatileCell;

use crate::config::{MAX_PROCESSES, STACK_SIZE};
use crate::stack::StackArena;

macro_rules! klog {
    ($($t:tt)*) => {{
        #[cfg(feature = "klog-uart")]
        {
            $crate::arch::klog_fmt(format_args!($($t)*));
        }
        #[cfg(not(feature = "klog-uart"))]
        {
            let _ = format_args!($($t)*);
        }
    }};
}

/// Interrupt id of SP804 timer module 0 at the distributor.
pub const TIMER_IRQ: u32 = 36;
/// Interrupt id of PL011 UART 0 at the distributor.
pub const CONSOLE_IRQ: u32 = 44;

/// Period of the preemption tick, in timer ticks.
const TIMER_PERIOD: u32 = 0x0006_0000;

global_asm! {"
    .section .vectors, \"ax\"
    .arm
    .balign 32
    .globl kern_vectors
    kern_vectors:
        ldr pc, =kern_lolevel_rst   @ reset
        b   .                       @ undefined instruction
        ldr pc, =kern_lolevel_svc   @ supervisor call
        b   .                       @ prefetch abort
        b   .                       @ data abort
        nop                         @ reserved
        ldr pc, =kern_lolevel_irq   @ IRQ
        b   .                       @ FIQ
        .ltorg

    .section .text.kern_lolevel, \"ax\"
    .arm
    kern_lolevel_rst:
        @ Point VBAR at our table, so that SVC and IRQ land here no matter
        @ where the image was loaded.
        ldr   r0, =kern_vectors
        mcr   p15, 0, r0, c12, c0, 0

        msr   cpsr_c, #0xD2         @ IRQ mode, IRQ and FIQ masked
        ldr   sp, =tos_irq
        msr   cpsr_c, #0xD3         @ SVC mode, IRQ and FIQ masked
        ldr   sp, =tos_svc

        @ Reserve a frame for the first process, which the kernel fills in.
        sub   sp, sp, #72
        mov   r0, sp
        bl    kernel_reset
        b     kern_resume

    kern_lolevel_svc:
        sub   sp, sp, #64
        stmia sp, {{r0-r12, sp, lr}}^
        mrs   r0, spsr
        stmdb sp!, {{r0, lr}}

        mov   r0, sp
        @ The syscall number is the low 24 bits of the SVC instruction.
        ldr   r1, [lr, #-4]
        bic   r1, r1, #0xFF000000
        bl    kernel_svc
        b     kern_resume

    kern_lolevel_irq:
        sub   lr, lr, #4            @ resume at the interrupted instruction
        sub   sp, sp, #64
        stmia sp, {{r0-r12, sp, lr}}^
        mrs   r0, spsr
        stmdb sp!, {{r0, lr}}

        mov   r0, sp
        bl    kernel_irq

    kern_resume:
        ldmia sp!, {{r0, lr}}
        msr   spsr_cxsf, r0
        ldmia sp, {{r0-r12, sp, lr}}^
        add   sp, sp, #64
        movs  pc, lr
"}

/// PL011 UART register block.
#[allow(dead_code)]
#[repr(C)]
struct Pl011 {
    dr: VolatileCell<u32>,
    rsr: VolatileCell<u32>,
    _reserved0: [u32; 4],
    fr: VolatileCell<u32>,
    _reserved1: u32,
    ilpr: VolatileCell<u32>,
    ibrd: VolatileCell<u32>,
    fbrd: VolatileCell<u32>,
    lcr_h: VolatileCell<u32>,
    cr: VolatileCell<u32>,
    ifls: VolatileCell<u32>,
    imsc: VolatileCell<u32>,
    ris: VolatileCell<u32>,
    mis: VolatileCell<u32>,
    icr: VolatileCell<u32>,
}

const FR_RXFE: u32 = 1 << 4;
const FR_TXFF: u32 = 1 << 5;
/// Receive interrupt, in IMSC and ICR.
const UART_RXI: u32 = 1 << 4;
/// UARTEN | TXE | RXE
const UART_ENABLE: u32 = 0x301;

/// One half of an SP804 dual timer.
#[allow(dead_code)]
#[repr(C)]
struct Sp804 {
    load: VolatileCell<u32>,
    value: VolatileCell<u32>,
    ctrl: VolatileCell<u32>,
    intclr: VolatileCell<u32>,
    ris: VolatileCell<u32>,
    mis: VolatileCell<u32>,
    bgload: VolatileCell<u32>,
}

const TIMER_32BIT: u32 = 1 << 1;
const TIMER_PERIODIC: u32 = 1 << 6;
const TIMER_INTEN: u32 = 1 << 5;
const TIMER_ENABLE: u32 = 1 << 7;

/// GIC CPU interface.
#[allow(dead_code)]
#[repr(C)]
struct GicCpu {
    ctlr: VolatileCell<u32>,
    pmr: VolatileCell<u32>,
    bpr: VolatileCell<u32>,
    iar: VolatileCell<u32>,
    eoir: VolatileCell<u32>,
}

/// GIC distributor, up to the second set-enable register.
#[allow(dead_code)]
#[repr(C)]
struct GicDist {
    ctlr: VolatileCell<u32>,
    typer: VolatileCell<u32>,
    _reserved0: [u32; 62],
    isenabler: [VolatileCell<u32>; 2],
}

const UART0: *const Pl011 = 0x1000_9000 as *const Pl011;
const TIMER0: *const Sp804 = 0x1001_1000 as *const Sp804;
const GICC0: *const GicCpu = 0x1E00_0000 as *const GicCpu;
const GICD0: *const GicDist = 0x1E00_1000 as *const GicDist;

// Safety (for the four accessors below): the blocks are fixed MMIO on this
// board, are only touched from kernel context, and every access goes through
// VolatileCell.
fn uart() -> &'static Pl011 {
    unsafe { &*UART0 }
}
fn timer() -> &'static Sp804 {
    unsafe { &*TIMER0 }
}
fn gicc() -> &'static GicCpu {
    unsafe { &*GICC0 }
}
fn gicd() -> &'static GicDist {
    unsafe { &*GICD0 }
}

/// Bit for interrupt `id` within its set-enable register.
const fn enable_bit(id: u32) -> u32 {
    1 << (id % 32)
}

/// Programs the UART, optionally the timer, and the interrupt controller.
pub fn enable_interrupt_sources(preemption: bool) {
    if preemption {
        let t = timer();
        t.load.set(TIMER_PERIOD);
        t.ctrl
            .set(TIMER_32BIT | TIMER_PERIODIC | TIMER_INTEN | TIMER_ENABLE);
    }

    let u = uart();
    u.imsc.set(u.imsc.get() | UART_RXI);
    u.cr.set(UART_ENABLE);

    let c = gicc();
    let d = gicd();
    c.pmr.set(0xF0);
    let en = &d.isenabler[(CONSOLE_IRQ / 32) as usize];
    en.set(en.get() | enable_bit(CONSOLE_IRQ));
    if preemption {
        let en = &d.isenabler[(TIMER_IRQ / 32) as usize];
        en.set(en.get() | enable_bit(TIMER_IRQ));
    }
    c.ctlr.set(1);
    d.ctlr.set(1);
}

pub fn claim_interrupt() -> u32 {
    gicc().iar.get()
}

pub fn complete_interrupt(id: u32) {
    gicc().eoir.set(id);
}

pub fn clear_timer() {
    timer().intclr.set(1);
}

pub fn clear_console_interrupt() {
    uart().icr.set(UART_RXI);
}

pub fn console_getc() -> u8 {
    let u = uart();
    while u.fr.get() & FR_RXFE != 0 {}
    u.dr.get() as u8
}

pub fn console_putc(byte: u8) {
    let u = uart();
    while u.fr.get() & FR_TXFF != 0 {}
    u.dr.set(u32::from(byte));
}

struct Uart;

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        s.bytes().for_each(console_putc);
        Ok(())
    }
}

/// Backend for `klog!`.
pub fn klog_fmt(args: core::fmt::Arguments<'_>) {
    let _ = Uart.write_fmt(args);
    let _ = Uart.write_str("\r\n");
}

/// Bounds-checks a user buffer that is not in the stack arena.
fn user_range(addr: u32, len: u32) -> Option<usize> {
    if addr == 0 {
        return None;
    }
    addr.checked_add(len).map(|_| addr as usize)
}

/// Exposes user memory outside the stack arena (program images and their
/// data). There is no memory protection on this board, so any address that
/// doesn't wrap is accepted.
pub fn user_bytes(addr: u32, len: u32) -> Option<&'static [u8]> {
    let base = user_range(addr, len)?;
    // Safety: user code is suspended while the kernel runs, and the slice is
    // dropped before the kernel returns.
    Some(unsafe { core::slice::from_raw_parts(base as *const u8, len as usize) })
}

pub fn user_bytes_mut(addr: u32, len: u32) -> Option<&'static mut [u8]> {
    let base = user_range(addr, len)?;
    // Safety: as for `user_bytes`.
    Some(unsafe {
        core::slice::from_raw_parts_mut(base as *mut u8, len as usize)
    })
}

extern "C" {
    static tos_usr: u8;
    fn main_console();
}

/// Describes the user stack area reserved by the linker script.
pub fn user_stack_arena() -> StackArena<'static> {
    let top = unsafe { core::ptr::addr_of!(tos_usr) } as usize;
    let len = STACK_SIZE as usize * MAX_PROCESSES;
    // Safety: the linker script reserves `len` bytes below `tos_usr` for
    // nothing but user stacks, and this is only called once per boot.
    unsafe { StackArena::from_raw(top as u32, (top - len) as *mut u8) }
}

pub fn console_entry() -> u32 {
    main_console as usize as u32
}
