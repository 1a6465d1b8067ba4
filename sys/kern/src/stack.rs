// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Support for interacting with user memory.
//!
//! User stacks live in a single arena of `MAX_PROCESSES` equal regions,
//! growing downward. Slot `i` owns the `STACK_SIZE` bytes below
//! `top - i * STACK_SIZE`. The kernel owns this memory outright and copies or
//! clears regions of it when processes are forked or exec'd.
//!
//! Buffers that user code passes to syscalls are resolved through
//! `user_bytes`/`user_bytes_mut`, which look in the arena first and otherwise
//! defer to the architecture.

use core::marker::PhantomData;
use core::ops::Range;
use core::ptr::NonNull;

use crate::arch;
use crate::config::{MAX_PROCESSES, STACK_SIZE};

const ARENA_LEN: usize = STACK_SIZE as usize * MAX_PROCESSES;

/// The user stack arena.
///
/// This holds a pointer rather than a slice because user code writes to the
/// memory whenever the kernel is not running. Slices into it are only formed
/// for the duration of a borrow of the arena.
pub struct StackArena<'m> {
    top: u32,
    base: NonNull<u8>,
    _mem: PhantomData<&'m mut [u8]>,
}

impl<'m> StackArena<'m> {
    /// Wraps `mem`, which stands for the addresses `top - mem.len() .. top`.
    ///
    /// # Panics
    ///
    /// If `mem` is not exactly the arena size, or would extend below address
    /// zero.
    pub fn new(top: u32, mem: &'m mut [u8]) -> Self {
        assert_eq!(mem.len(), ARENA_LEN);
        assert!(top as usize >= ARENA_LEN);
        Self {
            top,
            base: NonNull::from(mem).cast(),
            _mem: PhantomData,
        }
    }

    /// Wraps the arena at `base`, whose last byte is just below `top`.
    ///
    /// # Safety
    ///
    /// `base` must be non-null and address `MAX_PROCESSES * STACK_SIZE`
    /// writable bytes ending at `top`. Nothing but user stacks may use them,
    /// and no other `StackArena` may exist for them.
    pub unsafe fn from_raw(top: u32, base: *mut u8) -> Self {
        Self {
            top,
            // Safety: non-null per our contract.
            base: unsafe { NonNull::new_unchecked(base) },
            _mem: PhantomData,
        }
    }

    /// Address of the first byte past the arena.
    pub fn top(&self) -> u32 {
        self.top
    }

    fn bottom(&self) -> u32 {
        self.top - ARENA_LEN as u32
    }

    /// Initial stack pointer for the process in `slot`.
    pub fn stack_top(&self, slot: usize) -> u32 {
        self.top - slot as u32 * STACK_SIZE
    }

    /// Address range owned by `slot`.
    pub fn region(&self, slot: usize) -> Range<u32> {
        let end = self.stack_top(slot);
        end - STACK_SIZE..end
    }

    fn mem(&self) -> &[u8] {
        // Safety: `base` addresses ARENA_LEN bytes (see constructors) and the
        // returned borrow is tied to `self`.
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), ARENA_LEN) }
    }

    fn mem_mut(&mut self) -> &mut [u8] {
        // Safety: as for `mem`, with exclusivity from `&mut self`.
        unsafe {
            core::slice::from_raw_parts_mut(self.base.as_ptr(), ARENA_LEN)
        }
    }

    /// Translates `addr .. addr + len` into an offset range, if it lies
    /// entirely within the arena.
    fn offsets(&self, addr: u32, len: u32) -> Option<Range<usize>> {
        let end = addr.checked_add(len)?;
        if addr < self.bottom() || end > self.top {
            return None;
        }
        let start = (addr - self.bottom()) as usize;
        Some(start..start + len as usize)
    }

    /// Checks whether `addr .. addr + len` is inside the arena.
    pub fn contains(&self, addr: u32, len: u32) -> bool {
        self.offsets(addr, len).is_some()
    }

    pub fn bytes(&self, addr: u32, len: u32) -> Option<&[u8]> {
        let r = self.offsets(addr, len)?;
        Some(&self.mem()[r])
    }

    pub fn bytes_mut(&mut self, addr: u32, len: u32) -> Option<&mut [u8]> {
        let r = self.offsets(addr, len)?;
        Some(&mut self.mem_mut()[r])
    }

    /// Zeroes the entire region owned by `slot`.
    pub fn clear(&mut self, slot: usize) {
        let r = self.region(slot);
        if let Some(bytes) = self.bytes_mut(r.start, STACK_SIZE) {
            bytes.fill(0);
        }
    }

    /// Copies the live part of a stack, from `sp` up to `from_top`, to the
    /// same depth below the top of `to_slot`. Returns the stack pointer that
    /// addresses the copy.
    ///
    /// Returns `None` if `sp` is not within the `STACK_SIZE` bytes below
    /// `from_top`, since then there is no well-defined live part to copy.
    pub fn copy_live(
        &mut self,
        from_top: u32,
        sp: u32,
        to_slot: usize,
    ) -> Option<u32> {
        let used = from_top.checked_sub(sp)?;
        if used > STACK_SIZE {
            return None;
        }
        let src = self.offsets(sp, used)?;
        let child_sp = self.stack_top(to_slot) - used;
        let dst = self.offsets(child_sp, used)?;
        self.mem_mut().copy_within(src, dst.start);
        Some(child_sp)
    }
}

/// Resolves a user buffer for reading.
pub fn user_bytes<'a>(
    stacks: &'a StackArena<'_>,
    addr: u32,
    len: u32,
) -> Option<&'a [u8]> {
    if stacks.contains(addr, len) {
        stacks.bytes(addr, len)
    } else {
        arch::user_bytes(addr, len)
    }
}

/// Resolves a user buffer for writing.
pub fn user_bytes_mut<'a>(
    stacks: &'a mut StackArena<'_>,
    addr: u32,
    len: u32,
) -> Option<&'a mut [u8]> {
    if stacks.contains(addr, len) {
        stacks.bytes_mut(addr, len)
    } else {
        arch::user_bytes_mut(addr, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP: u32 = 0x4000_0000;

    fn arena() -> StackArena<'static> {
        StackArena::new(TOP, std::vec![0u8; ARENA_LEN].leak())
    }

    #[test]
    fn regions_are_disjoint_and_contiguous() {
        let a = arena();
        for i in 0..MAX_PROCESSES {
            let r = a.region(i);
            assert_eq!(r.end - r.start, STACK_SIZE);
            assert_eq!(r.end, a.stack_top(i));
            if i + 1 < MAX_PROCESSES {
                assert_eq!(a.region(i + 1).end, r.start);
            }
        }
        assert_eq!(a.region(MAX_PROCESSES - 1).start, a.bottom());
    }

    #[test]
    fn out_of_arena_accesses_are_refused() {
        let a = arena();
        assert!(a.bytes(TOP, 1).is_none());
        assert!(a.bytes(TOP - 1, 2).is_none());
        assert!(a.bytes(a.bottom() - 1, 1).is_none());
        assert!(a.bytes(u32::MAX, 2).is_none());
        assert_eq!(a.bytes(TOP - 4, 4).map(<[u8]>::len), Some(4));
        assert!(a.bytes(TOP, 0).is_some());
    }

    #[test]
    fn clear_only_touches_its_region() {
        let mut a = arena();
        let top1 = a.stack_top(1);
        a.bytes_mut(top1 - 4, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        let top0 = a.stack_top(0);
        a.bytes_mut(top0 - 4, 4).unwrap().copy_from_slice(&[5, 6, 7, 8]);

        a.clear(0);
        assert_eq!(a.bytes(top0 - 4, 4).unwrap(), &[0, 0, 0, 0]);
        assert_eq!(a.bytes(top1 - 4, 4).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn copy_live_preserves_depth() {
        let mut a = arena();
        let top0 = a.stack_top(0);
        a.bytes_mut(top0 - 8, 8)
            .unwrap()
            .copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let sp = a.copy_live(top0, top0 - 8, 3).unwrap();
        assert_eq!(sp, a.stack_top(3) - 8);
        assert_eq!(a.bytes(sp, 8).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        // Copies are independent afterwards.
        a.bytes_mut(sp, 1).unwrap()[0] = 0xFF;
        assert_eq!(a.bytes(top0 - 8, 1).unwrap(), &[1]);
    }

    #[test]
    fn copy_live_rejects_foreign_sp() {
        let mut a = arena();
        let top0 = a.stack_top(0);
        assert_eq!(a.copy_live(top0, top0 + 4, 1), None);
        assert_eq!(a.copy_live(top0, top0 - STACK_SIZE - 4, 1), None);
        assert_eq!(a.copy_live(top0, top0, 1), Some(a.stack_top(1)));
    }
}
