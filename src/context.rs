//! Saved execution state and the switch routine
//!
//! A `Context` holds only what the switch call itself does not already
//! preserve: the stack pointer, the callee-saved registers and the
//! address to resume at. Caller-saved registers are dead across
//! `switch` by the C calling convention, so they never need storing.
//!
//! A new task's context is pre-loaded so the first switch into it looks
//! exactly like resuming a suspended task: the resume address is the
//! trampoline, and three callee-saved registers carry the entry
//! function, its data pointer and the scheduler address. The trampoline
//! moves those into argument registers and calls the entry.
//!
//! `switch` and `trampoline` are naked functions; nothing else reads or
//! writes a `Context`'s register fields.
//!
//! Author: coop-rtos contributors

use core::arch::naked_asm;
use core::mem::offset_of;

/// Task entry called by the trampoline with (data, scheduler)
pub(crate) type EntryFn =
    unsafe extern "C" fn(data: *mut u8, scheduler: *const crate::scheduler::Scheduler) -> !;

#[cfg(any(
    all(target_arch = "x86_64", windows),
    all(target_arch = "arm", target_abi = "eabihf"),
    all(target_arch = "riscv32", target_feature = "f"),
    not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "arm",
        target_arch = "riscv32"
    ))
))]
compile_error!(
    "unsupported target: context switching is implemented for x86_64 (System V), \
     aarch64, soft-float ARM Thumb and riscv32 without F"
);

// ─── x86_64 (System V) ──────────────────────────────────────────────

#[cfg(target_arch = "x86_64")]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    sp: usize,
    rbx: usize,
    rbp: usize,
    r12: usize, // data
    r13: usize, // scheduler
    r14: usize, // entry
    r15: usize,
    pc: usize,
}

#[cfg(target_arch = "x86_64")]
impl Context {
    /// All-zero context (main task before its first switch-out)
    pub const fn zeroed() -> Self {
        Self { sp: 0, rbx: 0, rbp: 0, r12: 0, r13: 0, r14: 0, r15: 0, pc: 0 }
    }

    pub(crate) fn prepare(&mut self, sp: usize, entry: EntryFn, data: usize, scheduler: usize) {
        *self = Self::zeroed();
        self.sp = sp;
        self.r12 = data;
        self.r13 = scheduler;
        self.r14 = entry as *const () as usize;
        self.pc = trampoline as *const () as usize;
    }

    /// Saved stack pointer
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Address the task resumes at on its next switch-in
    pub fn resume_addr(&self) -> usize {
        self.pc
    }
}

#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
unsafe extern "C" fn trampoline() -> ! {
    naked_asm!(
        "mov rdi, r12",
        "mov rsi, r13",
        "call r14",
        "ud2",
    )
}

/// Save the running state into `current` and resume `next`
///
/// # Safety
///
/// `next` must hold a context prepared by `Context::prepare` or saved by
/// an earlier `switch`, and its stack must still be alive.
#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch(current: *mut Context, next: *const Context) {
    // rdi = current, rsi = next
    naked_asm!(
        "pop rax",
        "mov [rdi + {sp}], rsp",
        "mov [rdi + {rbx}], rbx",
        "mov [rdi + {rbp}], rbp",
        "mov [rdi + {r12}], r12",
        "mov [rdi + {r13}], r13",
        "mov [rdi + {r14}], r14",
        "mov [rdi + {r15}], r15",
        "mov [rdi + {pc}], rax",
        "mov rsp, [rsi + {sp}]",
        "mov rbx, [rsi + {rbx}]",
        "mov rbp, [rsi + {rbp}]",
        "mov r12, [rsi + {r12}]",
        "mov r13, [rsi + {r13}]",
        "mov r14, [rsi + {r14}]",
        "mov r15, [rsi + {r15}]",
        "jmp qword ptr [rsi + {pc}]",
        sp = const offset_of!(Context, sp),
        rbx = const offset_of!(Context, rbx),
        rbp = const offset_of!(Context, rbp),
        r12 = const offset_of!(Context, r12),
        r13 = const offset_of!(Context, r13),
        r14 = const offset_of!(Context, r14),
        r15 = const offset_of!(Context, r15),
        pc = const offset_of!(Context, pc),
    )
}

// ─── aarch64 ────────────────────────────────────────────────────────

#[cfg(target_arch = "aarch64")]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    sp: usize,
    /// x19..=x30 (x19 data, x20 scheduler, x21 entry, x30 resume address)
    x: [usize; 12],
    /// d8..=d15
    d: [u64; 8],
}

#[cfg(target_arch = "aarch64")]
impl Context {
    /// All-zero context (main task before its first switch-out)
    pub const fn zeroed() -> Self {
        Self { sp: 0, x: [0; 12], d: [0; 8] }
    }

    pub(crate) fn prepare(&mut self, sp: usize, entry: EntryFn, data: usize, scheduler: usize) {
        *self = Self::zeroed();
        self.sp = sp;
        self.x[0] = data;
        self.x[1] = scheduler;
        self.x[2] = entry as *const () as usize;
        self.x[11] = trampoline as *const () as usize;
    }

    /// Saved stack pointer
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Address the task resumes at on its next switch-in
    pub fn resume_addr(&self) -> usize {
        self.x[11]
    }
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
unsafe extern "C" fn trampoline() -> ! {
    naked_asm!(
        "mov x0, x19",
        "mov x1, x20",
        "blr x21",
        "brk #0x1",
    )
}

/// Save the running state into `current` and resume `next`
///
/// # Safety
///
/// `next` must hold a context prepared by `Context::prepare` or saved by
/// an earlier `switch`, and its stack must still be alive.
#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch(current: *mut Context, next: *const Context) {
    // x0 = current, x1 = next
    naked_asm!(
        "mov x9, sp",
        "str x9, [x0, #{sp}]",
        "stp x19, x20, [x0, #{x19}]",
        "stp x21, x22, [x0, #{x21}]",
        "stp x23, x24, [x0, #{x23}]",
        "stp x25, x26, [x0, #{x25}]",
        "stp x27, x28, [x0, #{x27}]",
        "stp x29, x30, [x0, #{x29}]",
        "stp d8, d9, [x0, #{d8}]",
        "stp d10, d11, [x0, #{d10}]",
        "stp d12, d13, [x0, #{d12}]",
        "stp d14, d15, [x0, #{d14}]",
        "ldr x9, [x1, #{sp}]",
        "mov sp, x9",
        "ldp x19, x20, [x1, #{x19}]",
        "ldp x21, x22, [x1, #{x21}]",
        "ldp x23, x24, [x1, #{x23}]",
        "ldp x25, x26, [x1, #{x25}]",
        "ldp x27, x28, [x1, #{x27}]",
        "ldp x29, x30, [x1, #{x29}]",
        "ldp d8, d9, [x1, #{d8}]",
        "ldp d10, d11, [x1, #{d10}]",
        "ldp d12, d13, [x1, #{d12}]",
        "ldp d14, d15, [x1, #{d14}]",
        "ret",
        sp = const offset_of!(Context, sp),
        x19 = const offset_of!(Context, x) + 0,
        x21 = const offset_of!(Context, x) + 16,
        x23 = const offset_of!(Context, x) + 32,
        x25 = const offset_of!(Context, x) + 48,
        x27 = const offset_of!(Context, x) + 64,
        x29 = const offset_of!(Context, x) + 80,
        d8 = const offset_of!(Context, d) + 0,
        d10 = const offset_of!(Context, d) + 16,
        d12 = const offset_of!(Context, d) + 32,
        d14 = const offset_of!(Context, d) + 48,
    )
}

// ─── ARM Thumb (ARMv6-M instruction subset, runs on v7-M too) ───────

#[cfg(target_arch = "arm")]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    sp: usize,
    /// r4..=r11 (r4 data, r5 scheduler, r6 entry)
    r: [usize; 8],
    lr: usize,
}

#[cfg(target_arch = "arm")]
impl Context {
    /// All-zero context (main task before its first switch-out)
    pub const fn zeroed() -> Self {
        Self { sp: 0, r: [0; 8], lr: 0 }
    }

    pub(crate) fn prepare(&mut self, sp: usize, entry: EntryFn, data: usize, scheduler: usize) {
        *self = Self::zeroed();
        self.sp = sp;
        self.r[0] = data;
        self.r[1] = scheduler;
        self.r[2] = entry as *const () as usize;
        self.lr = trampoline as *const () as usize;
    }

    /// Saved stack pointer
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Address the task resumes at on its next switch-in
    pub fn resume_addr(&self) -> usize {
        self.lr
    }
}

#[cfg(target_arch = "arm")]
#[unsafe(naked)]
unsafe extern "C" fn trampoline() -> ! {
    naked_asm!(
        "mov r0, r4",
        "mov r1, r5",
        "blx r6",
        "udf #0",
    )
}

/// Save the running state into `current` and resume `next`
///
/// Thumb-1 `stm`/`ldm` cannot reach r8-r12 or lr, so the high registers
/// go through r2 one at a time.
///
/// # Safety
///
/// `next` must hold a context prepared by `Context::prepare` or saved by
/// an earlier `switch`, and its stack must still be alive.
#[cfg(target_arch = "arm")]
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch(current: *mut Context, next: *const Context) {
    // r0 = current, r1 = next
    naked_asm!(
        "mov r2, sp",
        "str r2, [r0, #{sp}]",
        "str r4, [r0, #{r4}]",
        "str r5, [r0, #{r5}]",
        "str r6, [r0, #{r6}]",
        "str r7, [r0, #{r7}]",
        "mov r2, r8",
        "str r2, [r0, #{r8}]",
        "mov r2, r9",
        "str r2, [r0, #{r9}]",
        "mov r2, r10",
        "str r2, [r0, #{r10}]",
        "mov r2, r11",
        "str r2, [r0, #{r11}]",
        "mov r2, lr",
        "str r2, [r0, #{lr}]",
        "ldr r2, [r1, #{r8}]",
        "mov r8, r2",
        "ldr r2, [r1, #{r9}]",
        "mov r9, r2",
        "ldr r2, [r1, #{r10}]",
        "mov r10, r2",
        "ldr r2, [r1, #{r11}]",
        "mov r11, r2",
        "ldr r2, [r1, #{lr}]",
        "mov lr, r2",
        "ldr r2, [r1, #{sp}]",
        "mov sp, r2",
        "ldr r4, [r1, #{r4}]",
        "ldr r5, [r1, #{r5}]",
        "ldr r6, [r1, #{r6}]",
        "ldr r7, [r1, #{r7}]",
        "bx lr",
        sp = const offset_of!(Context, sp),
        r4 = const offset_of!(Context, r) + 0,
        r5 = const offset_of!(Context, r) + 4,
        r6 = const offset_of!(Context, r) + 8,
        r7 = const offset_of!(Context, r) + 12,
        r8 = const offset_of!(Context, r) + 16,
        r9 = const offset_of!(Context, r) + 20,
        r10 = const offset_of!(Context, r) + 24,
        r11 = const offset_of!(Context, r) + 28,
        lr = const offset_of!(Context, lr),
    )
}

// ─── riscv32 (integer only) ─────────────────────────────────────────

#[cfg(target_arch = "riscv32")]
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    sp: usize,
    /// s0..=s11 (s1 data, s2 scheduler, s3 entry)
    s: [usize; 12],
    ra: usize,
}

#[cfg(target_arch = "riscv32")]
impl Context {
    /// All-zero context (main task before its first switch-out)
    pub const fn zeroed() -> Self {
        Self { sp: 0, s: [0; 12], ra: 0 }
    }

    pub(crate) fn prepare(&mut self, sp: usize, entry: EntryFn, data: usize, scheduler: usize) {
        *self = Self::zeroed();
        self.sp = sp;
        self.s[1] = data;
        self.s[2] = scheduler;
        self.s[3] = entry as *const () as usize;
        self.ra = trampoline as *const () as usize;
    }

    /// Saved stack pointer
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Address the task resumes at on its next switch-in
    pub fn resume_addr(&self) -> usize {
        self.ra
    }
}

#[cfg(target_arch = "riscv32")]
#[unsafe(naked)]
unsafe extern "C" fn trampoline() -> ! {
    naked_asm!(
        "mv a0, s1",
        "mv a1, s2",
        "jalr s3",
        "unimp",
    )
}

/// Save the running state into `current` and resume `next`
///
/// # Safety
///
/// `next` must hold a context prepared by `Context::prepare` or saved by
/// an earlier `switch`, and its stack must still be alive.
#[cfg(target_arch = "riscv32")]
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch(current: *mut Context, next: *const Context) {
    // a0 = current, a1 = next
    naked_asm!(
        "sw sp, {sp}(a0)",
        "sw s0, {s0}(a0)",
        "sw s1, {s1}(a0)",
        "sw s2, {s2}(a0)",
        "sw s3, {s3}(a0)",
        "sw s4, {s4}(a0)",
        "sw s5, {s5}(a0)",
        "sw s6, {s6}(a0)",
        "sw s7, {s7}(a0)",
        "sw s8, {s8}(a0)",
        "sw s9, {s9}(a0)",
        "sw s10, {s10}(a0)",
        "sw s11, {s11}(a0)",
        "sw ra, {ra}(a0)",
        "lw sp, {sp}(a1)",
        "lw s0, {s0}(a1)",
        "lw s1, {s1}(a1)",
        "lw s2, {s2}(a1)",
        "lw s3, {s3}(a1)",
        "lw s4, {s4}(a1)",
        "lw s5, {s5}(a1)",
        "lw s6, {s6}(a1)",
        "lw s7, {s7}(a1)",
        "lw s8, {s8}(a1)",
        "lw s9, {s9}(a1)",
        "lw s10, {s10}(a1)",
        "lw s11, {s11}(a1)",
        "lw ra, {ra}(a1)",
        "ret",
        sp = const offset_of!(Context, sp),
        s0 = const offset_of!(Context, s) + 0,
        s1 = const offset_of!(Context, s) + 4,
        s2 = const offset_of!(Context, s) + 8,
        s3 = const offset_of!(Context, s) + 12,
        s4 = const offset_of!(Context, s) + 16,
        s5 = const offset_of!(Context, s) + 20,
        s6 = const offset_of!(Context, s) + 24,
        s7 = const offset_of!(Context, s) + 28,
        s8 = const offset_of!(Context, s) + 32,
        s9 = const offset_of!(Context, s) + 36,
        s10 = const offset_of!(Context, s) + 40,
        s11 = const offset_of!(Context, s) + 44,
        ra = const offset_of!(Context, ra),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn never(_: *mut u8, _: *const crate::scheduler::Scheduler) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    #[test]
    fn test_zeroed_context() {
        let ctx = Context::zeroed();
        assert_eq!(ctx.sp(), 0);
        assert_eq!(ctx.resume_addr(), 0);
    }

    #[test]
    fn test_prepare_resumes_at_trampoline() {
        let mut ctx = Context::zeroed();
        ctx.prepare(0x1000, never, 0x2000, 0x3000);
        assert_eq!(ctx.sp(), 0x1000);
        assert_eq!(ctx.resume_addr(), trampoline as *const () as usize);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_x86_64_layout() {
        assert_eq!(core::mem::size_of::<Context>(), 64);
        assert_eq!(offset_of!(Context, pc), 56);
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_aarch64_layout() {
        assert_eq!(core::mem::size_of::<Context>(), 168);
        assert_eq!(offset_of!(Context, d), 104);
    }
}
