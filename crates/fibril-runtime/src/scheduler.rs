//! The fiber scheduler
//!
//! Owns every fiber plus the timer and the readiness poller, and drives the
//! run loop on the host thread. All state here is mutated only by the thread
//! that installed the scheduler, and only while no other fiber is running:
//! either from inside a verb on the current fiber, or from the run loop
//! itself.
//!
//! Switch discipline: `running` is non-null exactly while a fiber executes
//! user code, and null exactly while the run-loop body runs. Every switch
//! sets it to the target fiber or back to null.

use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use fibril_core::error::RuntimeResult;
use fibril_core::{kdebug, kerror, kfatal};

use crate::arch::{self, Context};
use crate::config::RuntimeConfig;
use crate::fiber::{Coroutine, Fiber};
use crate::iopoll::{Interest, IoPoll};
use crate::timer::Timer;

/// Panic payload raised by `exit_current` to unwind the fiber's stack.
/// Caught in `fiber_start`; never escapes the runtime.
pub(crate) struct StackUnwind;

pub struct Scheduler {
    config: RuntimeConfig,
    ready: VecDeque<*mut Fiber>,
    dead: VecDeque<*mut Fiber>,
    fiber_count: usize,
    timer: Timer,
    iopoll: IoPoll,
    /// Non-null exactly while a fiber executes user code
    running: *mut Fiber,
    /// Saved continuation of the run loop; the switch target when no fiber
    /// is ready
    loop_ctx: Context,
}

impl Scheduler {
    pub fn new(config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        let iopoll = IoPoll::new(config.poll_events)?;
        Ok(Self {
            config,
            ready: VecDeque::new(),
            dead: VecDeque::new(),
            fiber_count: 0,
            timer: Timer::new(),
            iopoll,
            running: std::ptr::null_mut(),
            loop_ctx: Context::default(),
        })
    }

    /// Queue a new fiber for the coroutine, reviving a dead fiber's stack
    /// when one is available.
    pub fn spawn(&mut self, coroutine: Coroutine) {
        let fiber = if let Some(fiber) = self.dead.pop_front() {
            unsafe { Fiber::revive(fiber, coroutine) };
            fiber
        } else {
            let fiber = Fiber::create(coroutine, self.config.stack_size)
                .unwrap_or_else(|e| kfatal!("fiber stack allocation failed: {}", e));
            self.fiber_count += 1;
            fiber
        };
        self.ready.push_back(fiber);
    }

    /// Drive fibers until none remain.
    ///
    /// One iteration: dispatch ready fibers, reap the dead queue, wait for
    /// readiness with the timer's deadline as the poll timeout, then expire
    /// due timers. Fibers woken by readiness are queued ahead of fibers
    /// woken by expiry in the same iteration.
    pub fn run(&mut self) {
        assert!(self.running.is_null(), "run() re-entered from a fiber");
        if self.fiber_count == 0 {
            return;
        }
        kdebug!("scheduler: run loop started with {} fiber(s)", self.fiber_count);

        let mut woken: Vec<*mut Fiber> = Vec::new();
        loop {
            if !self.ready.is_empty() {
                if unsafe { arch::save_context(&mut self.loop_ctx) } == 0 {
                    let fiber = self.ready.pop_front().unwrap();
                    unsafe { self.execute_fiber(fiber) };
                }
                // a fiber switched back; fall through to housekeeping
            }

            if !self.dead.is_empty() {
                while let Some(fiber) = self.dead.pop_front() {
                    if let Err(e) = unsafe { Fiber::destroy(fiber) } {
                        kfatal!("fiber stack release failed: {}", e);
                    }
                    self.fiber_count -= 1;
                }
                if self.fiber_count == 0 {
                    kdebug!("scheduler: run loop finished");
                    return;
                }
            }

            // Readiness wait, bounded by the earliest timer deadline
            woken.clear();
            loop {
                let timeout = self.timer.poll_timeout(Instant::now());
                if self.iopoll.wait(timeout, &mut woken) {
                    break;
                }
            }
            for &fiber in &woken {
                unsafe {
                    if let Some(handle) = (*fiber).timer.take() {
                        self.timer.cancel(handle);
                    }
                    (*fiber).fd = -1;
                }
            }
            self.ready.extend(woken.drain(..));

            // Expired timers; awaiting fibers are cancelled with ETIMEDOUT
            self.timer.drain_due(Instant::now(), &mut woken);
            for &fiber in &woken {
                unsafe {
                    (*fiber).timer = None;
                    if (*fiber).fd >= 0 {
                        self.iopoll.unpark((*fiber).fd, (*fiber).interest);
                        (*fiber).fd = -1;
                        (*fiber).status = -libc::ETIMEDOUT;
                    }
                }
                self.ready.push_back(fiber);
            }
            woken.clear();
        }
    }

    /// Switch back to the run-loop continuation. Only valid once the run
    /// loop has saved it.
    unsafe fn execute_loop(&mut self) -> ! {
        self.running = std::ptr::null_mut();
        arch::restore_context(&self.loop_ctx, 1)
    }

    /// Switch to `fiber`: first entry goes through the stack trampoline,
    /// resumption delivers the fiber's pending wake status.
    unsafe fn execute_fiber(&mut self, fiber: *mut Fiber) -> ! {
        self.running = fiber;
        match (*fiber).context.take() {
            None => {
                let top = Fiber::stack_top(fiber);
                arch::enter_fiber(fiber_start as usize, self as *mut Scheduler as usize, top)
            }
            Some(ctx) => {
                debug_assert!((*fiber).status != 0);
                arch::restore_context(&ctx, (*fiber).status)
            }
        }
    }

    /// Move the current fiber to the ready-queue tail and run the head.
    /// No-op when nothing else is ready.
    pub fn yield_current(&mut self) {
        assert!(!self.running.is_null(), "yield outside a fiber");
        if self.ready.is_empty() {
            return;
        }
        let fiber = self.running;
        unsafe {
            let ctx = (*fiber).context.insert(Context::default());
            if arch::save_context(ctx) != 0 {
                return;
            }
            (*fiber).status = 1;
            self.ready.push_back(fiber);
            let next = self.ready.pop_front().unwrap();
            self.execute_fiber(next)
        }
    }

    /// Park the current fiber on the timer for `duration_ms` and switch
    /// away.
    pub fn sleep_current(&mut self, duration_ms: i32) {
        assert!(!self.running.is_null(), "sleep outside a fiber");
        let fiber = self.running;
        unsafe {
            let ctx = (*fiber).context.insert(Context::default());
            if arch::save_context(ctx) != 0 {
                return;
            }
            (*fiber).status = 1;
            (*fiber).timer = Some(self.timer.insert(fiber, duration_ms));
            if self.ready.is_empty() {
                self.execute_loop()
            }
            let next = self.ready.pop_front().unwrap();
            self.execute_fiber(next)
        }
    }

    /// Unwind the current fiber's stack. Destructors up the stack run; the
    /// fiber then transitions to the dead queue in `fiber_start`.
    pub fn exit_current(&mut self) -> ! {
        assert!(!self.running.is_null(), "exit outside a fiber");
        panic::panic_any(StackUnwind)
    }

    /// Transition the current fiber to the dead queue and switch away.
    /// Its stack stays mapped until the run loop reaps it.
    unsafe fn kill_current(&mut self) -> ! {
        let fiber = self.running;
        (*fiber).context = None;
        (*fiber).status = 0;
        self.dead.push_back(fiber);
        if self.ready.is_empty() {
            self.execute_loop()
        }
        let next = self.ready.pop_front().unwrap();
        self.execute_fiber(next)
    }

    /// Park the current fiber until (`fd`, `interest`) is ready or the
    /// timeout fires.
    ///
    /// Returns 0 on readiness (retry the syscall) or -1 with errno set on a
    /// cancellation wake. A timeout of 0 fails immediately with EAGAIN; a
    /// negative timeout waits without arming a timer.
    pub fn await_io(&mut self, fd: RawFd, interest: Interest, timeout_ms: i32) -> i32 {
        assert!(!self.running.is_null(), "await_io outside a fiber");
        if timeout_ms == 0 {
            errno::set_errno(errno::Errno(libc::EAGAIN));
            return -1;
        }
        let fiber = self.running;
        unsafe {
            let ctx = (*fiber).context.insert(Context::default());
            let status = arch::save_context(ctx);
            if status != 0 {
                if status < 0 {
                    errno::set_errno(errno::Errno(-status));
                    return -1;
                }
                return 0;
            }
            (*fiber).status = 1;
            (*fiber).fd = fd;
            (*fiber).interest = interest;
            self.iopoll.park(fiber, fd, interest);
            if timeout_ms > 0 {
                (*fiber).timer = Some(self.timer.insert(fiber, timeout_ms));
            }
            if self.ready.is_empty() {
                self.execute_loop()
            }
            let next = self.ready.pop_front().unwrap();
            self.execute_fiber(next)
        }
    }

    /// Begin tracking a descriptor created by a runtime verb.
    pub fn watch_io(&mut self, fd: RawFd) -> RuntimeResult<()> {
        self.iopoll.register(fd)?;
        Ok(())
    }

    /// Whether a descriptor is tracked.
    pub fn io_is_watched(&self, fd: RawFd) -> bool {
        self.iopoll.has(fd)
    }

    /// Stop tracking a descriptor. Fibers parked on it are re-armed with
    /// EBADF, unlinked from the timer, and queued ready, so a closed
    /// descriptor can never leave a fiber parked forever.
    pub fn unwatch_io(&mut self, fd: RawFd) {
        let parked = self.iopoll.unregister(fd);
        let mut cancelled = 0;
        for fiber in [parked.reader, parked.writer].into_iter().flatten() {
            unsafe {
                if let Some(handle) = (*fiber).timer.take() {
                    self.timer.cancel(handle);
                }
                (*fiber).fd = -1;
                (*fiber).status = -libc::EBADF;
            }
            self.ready.push_back(fiber);
            cancelled += 1;
        }
        if cancelled > 0 {
            kdebug!("scheduler: close cancelled {} waiter(s) on fd {}", cancelled, fd);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Normally both queues are empty: run() returns only at quiescence.
        // Fibers spawned but never run still hold stack mappings.
        debug_assert!(self.running.is_null());
        for fiber in self.ready.drain(..).chain(self.dead.drain(..)) {
            if let Err(e) = unsafe { Fiber::destroy(fiber) } {
                kerror!("fiber stack release failed: {}", e);
            }
        }
    }
}

/// First frame on every fiber stack.
///
/// Runs the coroutine, catching the `StackUnwind` payload `exit` raises.
/// Any other panic crossing the fiber boundary is fatal, matching the
/// no-unwind contract of the start frame. Afterwards the fiber self-queues
/// onto the dead queue and switches away for good.
extern "C" fn fiber_start(scheduler: *mut Scheduler) {
    unsafe {
        {
            let fiber = (*scheduler).running;
            let coroutine = (*fiber)
                .coroutine
                .take()
                .unwrap_or_else(|| kfatal!("fiber entered without a coroutine"));
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || coroutine())) {
                if !payload.is::<StackUnwind>() {
                    kfatal!("fiber panicked; aborting");
                }
            }
        }
        (*scheduler).kill_current()
    }
}
