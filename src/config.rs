//! Build-time configuration
//!
//! Capacity tier and stack constants. Nothing here is read at runtime;
//! the tier is picked by Cargo feature so the task table is a plain
//! static array.
//!
//! Author: coop-rtos contributors

/// Maximum tasks (including the implicit main task in slot 0)
///
/// Capable parts get 32 slots, `constrained` builds get 8.
#[cfg(not(feature = "constrained"))]
pub const MAX_TASKS: usize = 32;

/// Maximum tasks (including the implicit main task in slot 0)
#[cfg(feature = "constrained")]
pub const MAX_TASKS: usize = 8;

/// Word written over every task stack at creation
///
/// Untouched words keep this value, so stack growth can be read back
/// from memory (see `Scheduler::stack_unused`).
pub const STACK_FILL: u32 = 0xCDCD_CDCD;

/// Minimum free words below the entry closure after task setup
pub const MIN_STACK_WORDS: usize = 64;

/// Stack pointer alignment used for every new task (bytes)
///
/// 16 covers x86_64 and aarch64; the 32-bit targets only need 8.
pub const STACK_ALIGN: usize = 16;
