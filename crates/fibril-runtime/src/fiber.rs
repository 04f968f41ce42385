//! Fiber control block and lifecycle
//!
//! A fiber's control block lives at the high end of its own stack mapping;
//! the usable stack grows down from just below it. Creating a fiber is one
//! mmap, destroying it one munmap.

use std::os::fd::RawFd;

use fibril_core::error::MemoryError;

use crate::arch::Context;
use crate::iopoll::Interest;
use crate::memory;
use crate::timer::TimerHandle;

/// The body executed by a fiber. Runs once, on the fiber's own stack.
pub type Coroutine = Box<dyn FnOnce() + 'static>;

/// A fiber: a suspended or running activation with its own stack.
///
/// Owned by the scheduler through raw pointers; the timer and the readiness
/// poller hold non-owning pointers that are severed before the fiber dies.
pub struct Fiber {
    /// Body to invoke on first entry; taken exactly once
    pub(crate) coroutine: Option<Coroutine>,
    /// Saved continuation; `None` until the fiber first suspends and again
    /// after it dies
    pub(crate) context: Option<Context>,
    /// Wake status delivered on next resume: 1 = normal, negative = -errno.
    /// Zero only while the fiber has no saved continuation.
    pub(crate) status: i32,
    /// Descriptor currently awaited, or -1
    pub(crate) fd: RawFd,
    /// Direction of the current descriptor wait; meaningful only when fd >= 0
    pub(crate) interest: Interest,
    /// Timer linkage while sleeping or awaiting I/O with a finite timeout
    pub(crate) timer: Option<TimerHandle>,
    stack_base: *mut u8,
    stack_size: usize,
}

impl Fiber {
    /// Map a stack region and place a new fiber control block at its top.
    pub fn create(coroutine: Coroutine, stack_size: usize) -> Result<*mut Fiber, MemoryError> {
        debug_assert!(stack_size > 2 * std::mem::size_of::<Fiber>());
        let base = memory::map_stack(stack_size)?;

        let top = base as usize + stack_size;
        let fiber = (top - std::mem::size_of::<Fiber>()) & !(std::mem::align_of::<Fiber>() - 1);
        let fiber = fiber as *mut Fiber;

        unsafe {
            fiber.write(Fiber {
                coroutine: Some(coroutine),
                context: None,
                status: 0,
                fd: -1,
                interest: Interest::Readable,
                timer: None,
                stack_base: base,
                stack_size,
            });
        }
        Ok(fiber)
    }

    /// Reuse a dead fiber's stack and control block for a new coroutine.
    ///
    /// # Safety
    ///
    /// `fiber` must point at a fiber on the dead queue: not running, not
    /// linked into any queue, timer, or awaiter slot.
    pub unsafe fn revive(fiber: *mut Fiber, coroutine: Coroutine) {
        let f = &mut *fiber;
        debug_assert!(f.context.is_none());
        debug_assert!(f.timer.is_none());
        f.coroutine = Some(coroutine);
        f.status = 0;
        f.fd = -1;
    }

    /// Top of the usable stack: just below the control block, 16-aligned.
    pub fn stack_top(fiber: *mut Fiber) -> *mut u8 {
        ((fiber as usize) & !15) as *mut u8
    }

    /// Drop the control block and release the stack mapping.
    ///
    /// # Safety
    ///
    /// `fiber` must be a dead fiber with no remaining links, and nothing may
    /// still execute on its stack.
    pub unsafe fn destroy(fiber: *mut Fiber) -> Result<(), MemoryError> {
        let base = (*fiber).stack_base;
        let size = (*fiber).stack_size;
        std::ptr::drop_in_place(fiber);
        memory::unmap_stack(base, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_layout() {
        let fiber = Fiber::create(Box::new(|| {}), 64 * 1024).expect("create failed");
        let top = Fiber::stack_top(fiber);
        // Control block sits at the high end; stack top is below it
        assert!(top as usize <= fiber as usize);
        assert_eq!(top as usize % 16, 0);
        unsafe {
            assert_eq!((*fiber).fd, -1);
            assert_eq!((*fiber).status, 0);
            assert!((*fiber).coroutine.is_some());
            assert!((*fiber).context.is_none());
            Fiber::destroy(fiber).expect("destroy failed");
        }
    }

    #[test]
    fn test_revive_resets_state() {
        let fiber = Fiber::create(Box::new(|| {}), 64 * 1024).expect("create failed");
        unsafe {
            (*fiber).coroutine = None;
            (*fiber).status = -libc::EBADF;
            (*fiber).fd = -1;
            Fiber::revive(fiber, Box::new(|| {}));
            assert!((*fiber).coroutine.is_some());
            assert_eq!((*fiber).status, 0);
            assert_eq!((*fiber).fd, -1);
            Fiber::destroy(fiber).expect("destroy failed");
        }
    }
}
