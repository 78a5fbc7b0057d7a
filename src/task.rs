//! Task identifiers and descriptors
//!
//! A task is a stack buffer owned by the caller plus a `Context` owned
//! by the scheduler. Tasks are never destroyed, so a descriptor slot is
//! written once by `create` and afterwards only by the switch routine.
//!
//! Author: coop-rtos contributors

use core::fmt;

use crate::config::{MAX_TASKS, STACK_FILL};
use crate::context::Context;
use crate::scheduler::Scheduler;

/// Task entry for the function-pointer form of `Scheduler::create`
///
/// Receives the scheduler it runs under and the opaque argument given at
/// creation. If it returns, the task keeps yielding forever.
pub type TaskFn = fn(&Scheduler, usize);

/// 1-based task identifier (slot index + 1)
///
/// `TaskId::MAIN` is the caller's own context in slot 0; created tasks
/// are numbered from 2 upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u16);

impl TaskId {
    /// The implicit main task
    pub const MAIN: TaskId = TaskId(1);

    /// Id for a task table slot, if the table has that slot
    pub const fn from_slot(slot: usize) -> Option<Self> {
        if slot < MAX_TASKS {
            Some(TaskId(slot as u16 + 1))
        } else {
            None
        }
    }

    /// Id for a slot the scheduler has already populated (`slot < ntasks`)
    pub(crate) const fn of_slot(slot: usize) -> Self {
        TaskId(slot as u16 + 1)
    }

    /// Id from its raw 1-based value, if it can name a table slot
    pub const fn new(raw: u16) -> Option<Self> {
        if raw == 0 || raw as usize > MAX_TASKS {
            None
        } else {
            Some(TaskId(raw))
        }
    }

    /// Raw 1-based value
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Task table slot index
    pub const fn slot(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task{}", self.0)
    }
}

/// Task table entry
#[derive(Clone, Copy)]
pub struct Task {
    /// Saved execution state
    pub(crate) context: Context,
    /// Lowest word of the caller's stack buffer (null for the main task)
    stack: *const u32,
    /// Stack buffer length in words
    stack_words: usize,
}

impl Task {
    /// Empty slot (also the main task's entry)
    pub const fn empty() -> Self {
        Self {
            context: Context::zeroed(),
            stack: core::ptr::null(),
            stack_words: 0,
        }
    }

    pub(crate) fn with_stack(stack: *const u32, stack_words: usize) -> Self {
        Self {
            context: Context::zeroed(),
            stack,
            stack_words,
        }
    }

    /// Does this slot own a stack buffer?
    pub fn has_stack(&self) -> bool {
        !self.stack.is_null()
    }

    /// Stack buffer length in words
    pub fn stack_words(&self) -> usize {
        self.stack_words
    }

    /// Words at the low end of the stack still holding `STACK_FILL`
    ///
    /// Stacks grow down, so this is the head-room the task has never
    /// touched.
    ///
    /// # Safety
    ///
    /// The stack buffer given at creation must still be alive.
    pub(crate) unsafe fn unused_words(&self) -> usize {
        let mut n = 0;
        while n < self.stack_words {
            // SAFETY: n < stack_words, inside the caller's buffer. Volatile
            // because the owning task writes it through its stack pointer.
            let word = unsafe { self.stack.add(n).read_volatile() };
            if word != STACK_FILL {
                break;
            }
            n += 1;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_slots() {
        assert_eq!(TaskId::MAIN.slot(), 0);
        assert_eq!(TaskId::from_slot(0), Some(TaskId::MAIN));
        assert_eq!(TaskId::from_slot(1).map(TaskId::get), Some(2));
        assert_eq!(TaskId::from_slot(3).map(TaskId::slot), Some(3));
    }

    #[test]
    fn test_task_id_from_slot_rejects_out_of_table() {
        assert!(TaskId::from_slot(MAX_TASKS - 1).is_some());
        assert!(TaskId::from_slot(MAX_TASKS).is_none());
        assert!(TaskId::from_slot(65535).is_none());
        assert!(TaskId::from_slot(70000).is_none());
        assert!(TaskId::from_slot(usize::MAX).is_none());
    }

    #[test]
    fn test_task_id_range() {
        assert!(TaskId::new(0).is_none());
        assert_eq!(TaskId::new(1), Some(TaskId::MAIN));
        assert!(TaskId::new(MAX_TASKS as u16).is_some());
        assert!(TaskId::new(MAX_TASKS as u16 + 1).is_none());
    }

    #[test]
    fn test_empty_task() {
        let task = Task::empty();
        assert!(!task.has_stack());
        assert_eq!(task.stack_words(), 0);
    }

    #[test]
    fn test_unused_words_counts_fill_from_bottom() {
        let mut stack = [STACK_FILL; 16];
        stack[10] = 0;
        stack[15] = 7;
        let task = Task::with_stack(stack.as_ptr(), stack.len());
        assert!(task.has_stack());
        assert_eq!(unsafe { task.unused_words() }, 10);
    }
}
