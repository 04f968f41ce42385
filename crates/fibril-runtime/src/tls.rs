//! Thread-local scheduler handle
//!
//! Every public verb operates on the scheduler installed on the calling
//! thread. The handle is per-thread, never process-global, so independent
//! schedulers can run on distinct threads.

use std::cell::Cell;

use fibril_core::kfatal;

use crate::scheduler::Scheduler;

thread_local! {
    static SCHEDULER: Cell<*mut Scheduler> = const { Cell::new(std::ptr::null_mut()) };
}

/// Bind a scheduler to the current thread. Nested installs abort.
pub fn install(scheduler: *mut Scheduler) {
    SCHEDULER.with(|cell| {
        if !cell.get().is_null() {
            kfatal!("scheduler already installed on this thread");
        }
        cell.set(scheduler);
    });
}

/// Unbind the current thread's scheduler.
pub fn uninstall() {
    SCHEDULER.with(|cell| cell.set(std::ptr::null_mut()));
}

/// The current thread's scheduler, or null if none is installed.
#[inline]
pub fn current() -> *mut Scheduler {
    SCHEDULER.with(|cell| cell.get())
}

/// The current thread's scheduler; aborts if none is installed.
#[inline]
pub fn scheduler() -> *mut Scheduler {
    let ptr = current();
    if ptr.is_null() {
        kfatal!("no scheduler installed on this thread");
    }
    ptr
}

/// Whether a scheduler is installed on the current thread.
#[inline]
pub fn is_installed() -> bool {
    !current().is_null()
}
