//! coop-rtos — cooperative round-robin kernel
//!
//! Minimal multitasking for single-core microcontrollers without memory
//! protection:
//! - Static task table, caller-owned stacks, no heap
//! - Context switch on explicit yield only, strict round-robin order
//! - Per-task countdown timers aged by a periodic tick interrupt
//! - Single-slot per-task mailboxes with optional pend timeout
//!
//! ```ignore
//! static SCHED: Scheduler = Scheduler::new();
//! static KERNEL: Kernel<'static> = Kernel::new(&SCHED);
//!
//! // SysTick handler
//! KERNEL.tick();
//!
//! // Boot code, before the main loop starts yielding
//! unsafe { SCHED.create_with(&mut *addr_of_mut!(BLINK_STACK), |_| loop {
//!     toggle_led();
//!     KERNEL.delay(500);
//! }) }?;
//! ```
//!
//! Author: coop-rtos contributors

#![no_std]

pub mod config;
pub mod error;
pub mod context;
pub mod task;
pub mod scheduler;
pub mod timer;
pub mod mailbox;
pub mod kernel;

pub use config::MAX_TASKS;
pub use error::Error;
pub use task::{TaskFn, TaskId};
pub use scheduler::{Cooperative, Scheduler};
pub use timer::Timers;
pub use mailbox::{Mailbox, EMPTY, SIGNAL};
pub use kernel::Kernel;
