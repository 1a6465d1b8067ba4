// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::process::ArchState;

/// ARMv7-A user state preserved across every kernel entry.
///
/// The trap entry sequence pushes exactly this structure (SPSR and the return
/// address first, then the banked user registers) and hands the kernel a
/// pointer to it. Whatever the structure holds when the kernel returns is what
/// the processor resumes with.
#[repr(C)]
#[derive(
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
pub struct SavedState {
    // NOTE: the following fields must be kept in this order, the entry
    // sequence depends on it!
    pub cpsr: u32,
    pub pc: u32,
    pub gpr: [u32; 13],
    pub sp: u32,
    pub lr: u32,
}

const_assert_eq!(core::mem::size_of::<SavedState>(), 17 * 4);

/// Map the user registers to (architecture-independent) syscall argument and
/// return slots.
impl ArchState for SavedState {
    fn stack_pointer(&self) -> u32 {
        self.sp
    }

    fn set_stack_pointer(&mut self, sp: u32) {
        self.sp = sp;
    }

    fn program_counter(&self) -> u32 {
        self.pc
    }

    fn arg0(&self) -> u32 {
        self.gpr[0]
    }
    fn arg1(&self) -> u32 {
        self.gpr[1]
    }
    fn arg2(&self) -> u32 {
        self.gpr[2]
    }

    fn ret0(&mut self, x: u32) {
        self.gpr[0] = x;
    }

    fn reset_image(&mut self, entry: u32, stack_top: u32) {
        self.cpsr = abi::INITIAL_PSR.bits();
        self.pc = entry;
        self.sp = stack_top;
        self.gpr = [0; 13];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lays out words the way the entry sequence stores them: SPSR, return
    /// address, `r0`-`r12`, then the user `sp` and `lr`.
    fn pushed(words: &[u32; 17]) -> [u8; 68] {
        let mut raw = [0u8; 68];
        for (chunk, w) in raw.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&w.to_ne_bytes());
        }
        raw
    }

    #[test]
    fn matches_entry_layout() {
        let mut words = [0u32; 17];
        for (i, w) in words.iter_mut().enumerate() {
            *w = 0x100 + i as u32;
        }
        let raw = pushed(&words);
        let s = SavedState::read_from_bytes(&raw).unwrap();
        assert_eq!(s.cpsr, 0x100);
        assert_eq!(s.pc, 0x101);
        assert_eq!(s.gpr[0], 0x102);
        assert_eq!(s.gpr[12], 0x10E);
        assert_eq!(s.sp, 0x10F);
        assert_eq!(s.lr, 0x110);
        assert_eq!(s.as_bytes(), &raw[..]);
    }

    #[test]
    fn reset_image_keeps_lr() {
        let mut s = SavedState {
            lr: 0xAAAA,
            gpr: [7; 13],
            ..Default::default()
        };
        s.reset_image(0x8000, 0x2000);
        assert_eq!(s.cpsr, 0x50);
        assert_eq!((s.pc, s.sp, s.lr), (0x8000, 0x2000, 0xAAAA));
        assert_eq!(s.gpr, [0; 13]);
    }
}
