// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host stand-in for the board.
//!
//! The interrupt controller, timer and UART are modelled by a per-thread
//! `FakeBoard`, so that tests can queue interrupts and console input and then
//! inspect what the kernel did with them.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::vec::Vec;

use crate::config::{MAX_PROCESSES, STACK_SIZE};
use crate::stack::StackArena;

macro_rules! klog {
    ($($t:tt)*) => {{
        #[cfg(feature = "klog-stdout")]
        {
            std::println!($($t)*);
        }
        #[cfg(not(feature = "klog-stdout"))]
        {
            let _ = format_args!($($t)*);
        }
    }};
}

/// Same ids as the real interrupt controller, so logs read alike.
pub const TIMER_IRQ: u32 = 36;
pub const CONSOLE_IRQ: u32 = 44;

/// What `claim_interrupt` reports when nothing is pending.
pub const SPURIOUS_IRQ: u32 = 1023;

/// Address the fake stack arena claims to end at.
pub const FAKE_STACK_TOP: u32 = 0x7000_0000;

/// Address reported for the console program's entry point.
pub const FAKE_CONSOLE_ENTRY: u32 = 0x0010_0000;

#[derive(Debug, Default)]
pub struct FakeBoard {
    /// Interrupts raised and not yet claimed, in arrival order.
    pub pending: VecDeque<u32>,
    /// Bytes waiting in the UART receive FIFO.
    pub rx: VecDeque<u8>,
    /// Bytes the kernel has transmitted.
    pub tx: Vec<u8>,
    /// Interrupt ids signalled as complete, in order.
    pub completed: Vec<u32>,
    pub timer_clears: usize,
    pub console_clears: usize,
    /// `Some(preemption)` once the interrupt sources have been programmed.
    pub sources: Option<bool>,
}

std::thread_local! {
    static BOARD: RefCell<FakeBoard> = RefCell::new(FakeBoard::default());
}

/// Runs `body` with access to this thread's board.
pub fn with_board<R>(body: impl FnOnce(&mut FakeBoard) -> R) -> R {
    BOARD.with(|b| body(&mut b.borrow_mut()))
}

/// Returns this thread's board to its power-on state.
pub fn reset_board() {
    with_board(|b| *b = FakeBoard::default());
}

pub fn enable_interrupt_sources(preemption: bool) {
    with_board(|b| b.sources = Some(preemption));
}

pub fn claim_interrupt() -> u32 {
    with_board(|b| b.pending.pop_front().unwrap_or(SPURIOUS_IRQ))
}

pub fn complete_interrupt(id: u32) {
    with_board(|b| b.completed.push(id));
}

pub fn clear_timer() {
    with_board(|b| b.timer_clears += 1);
}

pub fn clear_console_interrupt() {
    with_board(|b| b.console_clears += 1);
}

pub fn console_getc() -> u8 {
    with_board(|b| b.rx.pop_front().unwrap_or(0))
}

pub fn console_putc(byte: u8) {
    with_board(|b| b.tx.push(byte));
}

/// Only the stack arena is visible on the host.
pub fn user_bytes(_addr: u32, _len: u32) -> Option<&'static [u8]> {
    None
}

pub fn user_bytes_mut(_addr: u32, _len: u32) -> Option<&'static mut [u8]> {
    None
}

pub fn user_stack_arena() -> StackArena<'static> {
    let mem = std::vec![0u8; STACK_SIZE as usize * MAX_PROCESSES];
    StackArena::new(FAKE_STACK_TOP, mem.leak())
}

pub fn console_entry() -> u32 {
    FAKE_CONSOLE_ENTRY
}
