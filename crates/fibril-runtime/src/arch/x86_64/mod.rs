//! x86_64 context switching implementation
//!
//! Uses naked-function assembly, stable in Rust 1.88+.

use std::arch::naked_asm;

/// Saved fiber context: the System V AMD64 callee-saved registers.
///
/// `rsp` points at the return address of the `save_context` call that filled
/// this block; `rip` mirrors that return address.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub rsp: u64,
    pub rip: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

/// Save the current continuation into `ctx` and return 0.
///
/// When a matching `restore_context(ctx, status)` runs later, this call
/// returns a second time with `status` as its result.
///
/// # Safety
///
/// `ctx` must be valid for writes and must stay alive (and unmoved) until
/// the context is restored or discarded.
#[unsafe(naked)]
pub unsafe extern "C" fn save_context(_ctx: *mut Context) -> i32 {
    naked_asm!(
        // rsp points at our return address; that address doubles as the
        // resume point
        "mov [rdi + 0x00], rsp",
        "mov rax, [rsp]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        "xor eax, eax",
        "ret",
    );
}

/// Resume a previously saved continuation, delivering `status`.
///
/// Control reappears as a second return from the `save_context` call that
/// filled `ctx`, with `status` as its result. `status` must be nonzero.
///
/// # Safety
///
/// `ctx` must hold a context saved by `save_context` whose stack is still
/// alive. The current stack is abandoned.
#[unsafe(naked)]
pub unsafe extern "C" fn restore_context(_ctx: *const Context, _status: i32) -> ! {
    naked_asm!(
        "mov rbx, [rdi + 0x10]",
        "mov rbp, [rdi + 0x18]",
        "mov r12, [rdi + 0x20]",
        "mov r13, [rdi + 0x28]",
        "mov r14, [rdi + 0x30]",
        "mov r15, [rdi + 0x38]",
        "mov rsp, [rdi + 0x00]",
        // the saved return address sits at [rsp]; returning there makes the
        // original save_context call return `status`
        "mov eax, esi",
        "ret",
    );
}

/// Switch onto a fresh fiber stack and call `entry(arg)`.
///
/// The entry function must never return; fiber termination always leaves
/// through a context switch.
///
/// # Safety
///
/// `stack_top` must point at the top of a live, writable stack region with
/// nothing below it in use. `entry` must be an `extern "C" fn(usize)`.
#[unsafe(naked)]
pub unsafe extern "C" fn enter_fiber(_entry: usize, _arg: usize, _stack_top: *mut u8) -> ! {
    naked_asm!(
        "mov rsp, rdx",
        "and rsp, -16",
        "mov rax, rdi",
        "mov rdi, rsi",
        "xor ebp, ebp",
        "call rax",
        "ud2",
    );
}
