// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The console: UART output on behalf of `write`, and a small receive queue
//! that the UART interrupt fills and `read` drains.

use heapless::Deque;

use crate::arch;
use crate::config::CONSOLE_RX_CAPACITY;

pub struct Console {
    rx: Deque<u8, CONSOLE_RX_CAPACITY>,
    /// Bytes lost because nobody read the queue in time.
    dropped: usize,
}

impl Console {
    pub const fn new() -> Self {
        Self {
            rx: Deque::new(),
            dropped: 0,
        }
    }

    /// Queues a received byte. Returns `false` if the queue was full and the
    /// byte had to be dropped.
    pub fn receive(&mut self, byte: u8) -> bool {
        match self.rx.push_back(byte) {
            Ok(()) => true,
            Err(_) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Moves as many queued bytes as fit into `buf`, oldest first.
    pub fn drain_into(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.rx.pop_front() {
                Some(b) => *slot = b,
                None => break,
            }
            n += 1;
        }
        n
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends `bytes` to the UART, in order.
pub fn transmit(bytes: &[u8]) {
    bytes.iter().copied().for_each(arch::console_putc);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_come_out_in_order() {
        let mut c = Console::new();
        for b in b"hi!" {
            assert!(c.receive(*b));
        }
        let mut buf = [0u8; 2];
        assert_eq!(c.drain_into(&mut buf), 2);
        assert_eq!(&buf, b"hi");
        assert_eq!(c.drain_into(&mut buf), 1);
        assert_eq!(buf[0], b'!');
        assert_eq!(c.drain_into(&mut buf), 0);
    }

    #[test]
    fn overflow_drops_newest() {
        let mut c = Console::new();
        for i in 0..CONSOLE_RX_CAPACITY {
            assert!(c.receive(i as u8));
        }
        assert!(!c.receive(0xEE));
        assert_eq!(c.dropped(), 1);
        assert_eq!(c.pending(), CONSOLE_RX_CAPACITY);

        let mut first = [0u8; 1];
        c.drain_into(&mut first);
        assert_eq!(first[0], 0);
    }

    #[test]
    fn transmit_reaches_the_uart() {
        arch::reset_board();
        transmit(b"ok\n");
        assert_eq!(arch::with_board(|b| b.tx.clone()), b"ok\n");
    }
}
