//! Caller-provided task storage
//!
//! A task's future is written in place into a `Stack` buffer owned by the application, so the
//! runtime never allocates. The buffer is laid out as
//!
//! ``` text
//! | sentinel | padding | future | painted headroom | sentinel |
//! ```
//!
//! The sentinels are checked on every switch when the `stack-debug` feature is enabled; the
//! painted area tells how much of the buffer was never needed.

use core::{
    future::Future,
    mem,
    ptr::{self, NonNull},
};

use crate::error::{SpawnError, StackEnd};

/// Pattern stamped at both ends of every stack
pub const SENTINEL: u32 = 0x5AA5_5AA5;

const SENTINEL_SIZE: usize = mem::size_of::<u32>();

/// Smallest usable stack: two sentinels around a zero-sized task
pub const MIN_STACK_SIZE: usize = 2 * SENTINEL_SIZE;

/// Fill byte of the unused part of a stack
const PAINT: u8 = 0xFF;

/// Storage for one task
#[repr(C, align(8))]
pub struct Stack<const LEN: usize> {
    contents: [u8; LEN],
}

impl<const LEN: usize> Stack<LEN> {
    /// Creates an empty stack
    pub const fn new() -> Self {
        assert!(LEN >= MIN_STACK_SIZE, "stack too small");
        assert!(LEN % SENTINEL_SIZE == 0, "stack length must be a multiple of four");
        Self {
            contents: [0; LEN],
        }
    }

    /// Size of the buffer in bytes
    pub const fn len(&self) -> usize {
        LEN
    }
}

impl<const LEN: usize> Default for Stack<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a spawned task lives inside its stack
#[derive(Clone, Copy)]
pub(crate) struct Region {
    base: NonNull<u8>,
    len: usize,
    used_end: usize,
}

impl Region {
    /// Moves `task` into `stack`, paints the rest and stamps the sentinels
    ///
    /// # Safety
    ///
    /// `base` must point to `len` writable bytes, aligned to 4, that nothing else accesses
    /// for as long as the region and the returned future pointer are in use
    pub(crate) unsafe fn init<'a, F>(
        base: NonNull<u8>,
        len: usize,
        task: F,
    ) -> Result<(Region, NonNull<dyn Future<Output = ()> + 'a>), SpawnError>
    where
        F: Future<Output = ()> + 'a,
    {
        let addr = base.as_ptr() as usize;
        let align = mem::align_of::<F>();
        let start = (addr + SENTINEL_SIZE + align - 1) / align * align - addr;
        let used_end = start + mem::size_of::<F>();
        let required = used_end + SENTINEL_SIZE;
        if required > len {
            return Err(SpawnError::StackTooSmall {
                required,
                available: len,
            });
        }

        let p = base.as_ptr();
        ptr::write_bytes(p, PAINT, len);
        (p as *mut u32).write_unaligned(SENTINEL);
        (p.add(len - SENTINEL_SIZE) as *mut u32).write_unaligned(SENTINEL);

        let fp = p.add(start) as *mut F;
        fp.write(task);
        let fp: *mut (dyn Future<Output = ()> + 'a) = fp;

        Ok((
            Region {
                base,
                len,
                used_end,
            },
            // NOTE(unsafe) derived from `base`, which is non-null
            NonNull::new_unchecked(fp),
        ))
    }

    /// Returns the first end whose sentinel was overwritten
    pub(crate) fn check(&self) -> Result<(), StackEnd> {
        let p = self.base.as_ptr();
        // NOTE(unsafe) the sentinels lie outside of the future; only the runtime touches them
        let (bottom, top) = unsafe {
            (
                (p as *const u32).read_unaligned(),
                (p.add(self.len - SENTINEL_SIZE) as *const u32).read_unaligned(),
            )
        };
        if bottom != SENTINEL {
            Err(StackEnd::Bottom)
        } else if top != SENTINEL {
            Err(StackEnd::Top)
        } else {
            Ok(())
        }
    }

    /// Painted bytes between the end of the future and the top sentinel
    ///
    /// Only the future itself is ever written, so this is fixed once the future is in place.
    pub(crate) fn free(&self) -> usize {
        let top = self.len - SENTINEL_SIZE;
        (self.used_end..top)
            .rev()
            // NOTE(unsafe) in bounds and outside of the future
            .take_while(|&i| unsafe { *self.base.as_ptr().add(i) } == PAINT)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&self, end: StackEnd) {
        let offset = match end {
            StackEnd::Bottom => 0,
            StackEnd::Top => self.len - 1,
        };
        unsafe { *self.base.as_ptr().add(offset) = 0 }
    }
}

#[cfg(test)]
mod tests {
    use core::future;

    use super::*;

    fn region<const LEN: usize, F>(stack: &mut Stack<LEN>, task: F) -> Result<Region, SpawnError>
    where
        F: Future<Output = ()>,
    {
        let base = NonNull::from(&mut stack.contents).cast::<u8>();
        unsafe { Region::init(base, LEN, task) }.map(|(region, fut)| {
            // the tests never poll the task; release it properly
            unsafe { ptr::drop_in_place(fut.as_ptr()) };
            region
        })
    }

    #[test]
    fn headroom() {
        let mut stack = Stack::<64>::new();
        let region = region(&mut stack, future::ready(())).unwrap();
        assert_eq!(region.check(), Ok(()));
        // `Ready<()>` is one byte, placed right after the bottom sentinel
        assert_eq!(region.free(), 64 - 2 * SENTINEL_SIZE - 1);
    }

    #[test]
    fn too_small() {
        let payload = [0u64; 4];
        let mut stack = Stack::<32>::new();
        let err = region(&mut stack, async move {
            let _ = payload;
        })
        .err()
        .unwrap();
        assert!(matches!(
            err,
            SpawnError::StackTooSmall { available: 32, .. }
        ));
    }

    #[test]
    fn sentinels() {
        let mut stack = Stack::<32>::new();
        let region = region(&mut stack, future::ready(())).unwrap();
        region.corrupt(StackEnd::Top);
        assert_eq!(region.check(), Err(StackEnd::Top));
        region.corrupt(StackEnd::Bottom);
        assert_eq!(region.check(), Err(StackEnd::Bottom));
    }
}
