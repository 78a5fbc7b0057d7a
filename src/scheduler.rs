//! Round-robin cooperative scheduler
//!
//! Owns the task table and the two counters everything else keys off:
//! `ntasks` (populated slots, starting at 1 for the caller's own
//! context) and `curtask` (slot now running). Control changes hands only
//! in `yield_now`, in strict ascending slot order with wraparound.
//!
//! No preemption: a task that never yields starves every other task.
//!
//! Author: coop-rtos contributors

use core::cell::UnsafeCell;
use core::mem::{align_of, size_of};
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use log::debug;

use crate::config::{MAX_TASKS, MIN_STACK_WORDS, STACK_ALIGN, STACK_FILL};
use crate::context::{self, EntryFn};
use crate::error::Error;
use crate::task::{Task, TaskFn, TaskId};

/// What the coordination layer needs from a scheduler
///
/// `wait` gives up the CPU for one round-robin pass. Slots are 0-based
/// table indices.
pub trait Cooperative {
    /// Number of populated task slots
    fn task_count(&self) -> usize;
    /// Slot of the running task
    fn current_task(&self) -> usize;
    /// Let every other task run once, then resume
    fn wait(&self);
}

/// Cooperative scheduler
///
/// Static task table, no dynamic allocation. `const`-constructible so it
/// can live in a `static`.
pub struct Scheduler {
    /// Static task table (slot 0 is the main task)
    tasks: UnsafeCell<[Task; MAX_TASKS]>,
    /// Populated slots
    ntasks: AtomicUsize,
    /// Running slot, always < ntasks
    curtask: AtomicUsize,
    /// Total context switches
    switches: AtomicU32,
}

// SAFETY: single core, cooperative. The task table is only read or
// written by thread-mode code, and only one task runs at a time; control
// moves between tasks exclusively inside `yield_now`. Interrupt handlers
// may read `ntasks` (an atomic) and nothing else.
unsafe impl Sync for Scheduler {}

impl Scheduler {
    /// Scheduler with only the caller's context (slot 0) populated
    pub const fn new() -> Self {
        Self {
            tasks: UnsafeCell::new([Task::empty(); MAX_TASKS]),
            ntasks: AtomicUsize::new(1),
            curtask: AtomicUsize::new(0),
            switches: AtomicU32::new(0),
        }
    }

    /// Register `entry(scheduler, arg)` as a new task on `stack`
    ///
    /// Returns the new task's 1-based id. The task first runs when a
    /// round-robin pass reaches its slot.
    ///
    /// # Safety
    ///
    /// Same contract as [`Scheduler::create_with`].
    pub unsafe fn create(&self, entry: TaskFn, stack: &mut [u32], arg: usize) -> Result<TaskId, Error> {
        // SAFETY: forwarded to the caller
        unsafe { self.create_with(stack, move |scheduler: &Scheduler| entry(scheduler, arg)) }
    }

    /// Register the closure `task` as a new task on `stack`
    ///
    /// The buffer is filled with `STACK_FILL`, the closure is moved into
    /// its top end and the slot's context is pointed at the trampoline.
    /// If `task` returns, the slot keeps taking its turn by yielding
    /// immediately.
    ///
    /// # Safety
    ///
    /// - `stack` must stay alive and untouched by anything but the task
    ///   for as long as this scheduler switches tasks; it is never freed.
    /// - `stack` must be large enough for everything the task calls.
    ///   Overflow is not detected and corrupts adjacent memory.
    /// - The scheduler must not move once a task has been created, and
    ///   everything `task` borrows must outlive its execution.
    pub unsafe fn create_with<F>(&self, stack: &mut [u32], task: F) -> Result<TaskId, Error>
    where
        F: FnOnce(&Scheduler),
    {
        let slot = self.ntasks.load(Ordering::Relaxed);
        if slot >= MAX_TASKS {
            return Err(Error::TableFull);
        }

        let base = stack.as_ptr() as usize;
        let top = base + stack.len() * size_of::<u32>();
        let align = align_of::<F>().max(STACK_ALIGN);
        let data = match top.checked_sub(size_of::<F>()) {
            Some(addr) => addr & !(align - 1),
            None => return Err(Error::StackTooSmall),
        };
        if data < base + MIN_STACK_WORDS * size_of::<u32>() {
            return Err(Error::StackTooSmall);
        }

        stack.fill(STACK_FILL);
        // SAFETY: base <= data and data + size_of::<F>() <= top, so the
        // write stays inside `stack`; data is aligned for F.
        unsafe {
            stack
                .as_mut_ptr()
                .cast::<u8>()
                .add(data - base)
                .cast::<F>()
                .write(task);
        }

        // The entry frame grows down from just below the closure.
        let entry: EntryFn = task_main::<F>;
        let mut desc = Task::with_stack(stack.as_ptr(), stack.len());
        desc.context.prepare(data, entry, data, self as *const Self as usize);

        // SAFETY: slot >= ntasks, so no task and no saved context refers
        // to it yet.
        unsafe { self.tasks.get().cast::<Task>().add(slot).write(desc) };
        self.ntasks.store(slot + 1, Ordering::Release);

        let id = TaskId::of_slot(slot);
        debug!("{} created: {} stack words", id, stack.len());
        Ok(id)
    }

    /// Suspend the running task and resume the next one
    ///
    /// No-op while only the main task exists. Returns when the
    /// round-robin pass comes back to the caller.
    pub fn yield_now(&self) {
        let ntasks = self.ntasks.load(Ordering::Acquire);
        if ntasks <= 1 {
            return;
        }

        let prev = self.curtask.load(Ordering::Relaxed);
        let next = if prev + 1 >= ntasks { 0 } else { prev + 1 };
        self.curtask.store(next, Ordering::Relaxed);
        self.switches
            .store(self.switches.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);

        let table = self.tasks.get().cast::<Task>();
        // SAFETY: prev and next are populated slots and differ. The
        // running task is `prev`, so its context is free to overwrite;
        // `next` was prepared by `create_with` or saved by an earlier
        // switch, and its stack outlives the scheduler per that contract.
        unsafe {
            let current = &raw mut (*table.add(prev)).context;
            let resume = &raw const (*table.add(next)).context;
            context::switch(current, resume);
        }
    }

    /// Number of populated slots (including the main task)
    pub fn task_count(&self) -> usize {
        self.ntasks.load(Ordering::Acquire)
    }

    /// Id of the running task
    pub fn current(&self) -> TaskId {
        TaskId::of_slot(self.curtask.load(Ordering::Relaxed))
    }

    /// Total context switches performed (wrapping)
    pub fn context_switches(&self) -> u32 {
        self.switches.load(Ordering::Relaxed)
    }

    /// Stack words task `id` has never touched
    ///
    /// `None` for the main task and for ids not yet created.
    pub fn stack_unused(&self, id: TaskId) -> Option<usize> {
        let slot = id.slot();
        if slot == 0 || slot >= self.task_count() {
            return None;
        }
        // SAFETY: populated slot; copied out, no reference is kept
        let task = unsafe { self.tasks.get().cast::<Task>().add(slot).read() };
        // SAFETY: `create_with` requires the stack to outlive the scheduler
        Some(unsafe { task.unused_words() })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Cooperative for Scheduler {
    fn task_count(&self) -> usize {
        Scheduler::task_count(self)
    }

    fn current_task(&self) -> usize {
        self.curtask.load(Ordering::Relaxed)
    }

    fn wait(&self) {
        self.yield_now();
    }
}

/// First code a new task runs, called by the trampoline
///
/// Takes the closure off the top of the task stack, runs it, and turns
/// the slot into a permanent yielder if it returns.
unsafe extern "C" fn task_main<F>(data: *mut u8, scheduler: *const Scheduler) -> !
where
    F: FnOnce(&Scheduler),
{
    // SAFETY: `create_with` wrote an aligned F at `data` and this entry
    // runs once per task; the scheduler pointer is the creating scheduler.
    let (task, scheduler) = unsafe { (data.cast::<F>().read(), &*scheduler) };
    task(scheduler);
    loop {
        scheduler.yield_now();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::cell::{Cell, RefCell};
    use std::vec;
    use std::vec::Vec;

    const STACK_WORDS: usize = 16 * 1024;

    fn stack() -> Vec<u32> {
        vec![0u32; STACK_WORDS]
    }

    fn idle(_: &Scheduler, _: usize) {}

    #[test]
    fn test_scheduler_empty() {
        let sched = Scheduler::new();
        assert_eq!(sched.task_count(), 1);
        assert_eq!(sched.current(), TaskId::MAIN);
        assert_eq!(sched.context_switches(), 0);
    }

    #[test]
    fn test_yield_alone_is_noop() {
        let sched = Scheduler::new();
        sched.yield_now();
        sched.yield_now();
        assert_eq!(sched.current(), TaskId::MAIN);
        assert_eq!(sched.context_switches(), 0);
    }

    #[test]
    fn test_create_ids_until_full() {
        let mut stacks: Vec<Vec<u32>> = (0..MAX_TASKS).map(|_| vec![0u32; 256]).collect();
        let sched = Scheduler::new();
        let mut bufs = stacks.iter_mut();

        for expected in 2..=MAX_TASKS as u16 {
            let buf = bufs.next().unwrap();
            let id = unsafe { sched.create(idle, buf, 0) };
            assert_eq!(id.map(TaskId::get), Ok(expected));
        }

        let buf = bufs.next().unwrap();
        assert_eq!(unsafe { sched.create(idle, buf, 0) }, Err(Error::TableFull));
        assert_eq!(sched.task_count(), MAX_TASKS);
    }

    #[test]
    fn test_create_fills_stack() {
        let mut buf = vec![0u32; 256];
        let sched = Scheduler::new();
        let id = unsafe { sched.create(idle, &mut buf, 0) }.unwrap();

        // Only the top few words hold the entry closure.
        assert!(buf[..240].iter().all(|&w| w == STACK_FILL));
        let unused = sched.stack_unused(id).unwrap();
        assert!(unused >= 240 && unused <= 256);
        assert_eq!(sched.stack_unused(TaskId::MAIN), None);
        assert_eq!(sched.stack_unused(TaskId::from_slot(2).unwrap()), None);
    }

    #[test]
    fn test_create_rejects_small_stack() {
        let mut buf = vec![0u32; MIN_STACK_WORDS / 2];
        let sched = Scheduler::new();
        assert_eq!(unsafe { sched.create(idle, &mut buf, 0) }, Err(Error::StackTooSmall));
        assert_eq!(sched.task_count(), 1);
    }

    #[test]
    fn test_round_robin_order() {
        let log = RefCell::new(Vec::new());
        let mut stacks = [stack(), stack(), stack()];
        let sched = Scheduler::new();

        for buf in stacks.iter_mut() {
            unsafe {
                sched.create_with(buf, |s| loop {
                    log.borrow_mut().push(s.current().get());
                    s.yield_now();
                })
                .unwrap();
            }
        }

        for _ in 0..3 {
            log.borrow_mut().push(sched.current().get());
            sched.yield_now();
        }

        assert_eq!(*log.borrow(), [1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4]);
        assert_eq!(sched.current(), TaskId::MAIN);
        assert_eq!(sched.context_switches(), 12);
    }

    #[test]
    fn test_three_tasks_each_run_once_per_pass() {
        let counts = [Cell::new(0u32), Cell::new(0u32), Cell::new(0u32)];
        let mut stacks = [stack(), stack(), stack()];
        let sched = Scheduler::new();

        for (buf, count) in stacks.iter_mut().zip(counts.iter()) {
            unsafe {
                sched.create_with(buf, move |s| loop {
                    count.set(count.get() + 1);
                    s.yield_now();
                })
                .unwrap();
            }
        }

        for _ in 0..3 {
            sched.yield_now();
        }

        // 9 task-side yields plus 3 from main
        assert!(counts.iter().all(|c| c.get() == 3));
        assert_eq!(sched.context_switches(), 12);
    }

    #[test]
    fn test_locals_survive_yield() {
        let total = Cell::new(0u64);
        let mut buf = stack();
        let sched = Scheduler::new();

        unsafe {
            sched.create_with(&mut buf, |s| {
                let mut acc = 0u64;
                for i in 0..5u64 {
                    acc += i * i;
                    s.yield_now();
                }
                total.set(acc);
            })
            .unwrap();
        }

        for _ in 0..6 {
            sched.yield_now();
        }
        assert_eq!(total.get(), 30);
    }

    #[test]
    fn test_returned_task_keeps_yielding() {
        let ran = Cell::new(0u32);
        let spins = Cell::new(0u32);
        let mut stacks = [stack(), stack()];
        let sched = Scheduler::new();
        let [a, b] = &mut stacks;

        unsafe { sched.create_with(a, |_| ran.set(ran.get() + 1)).unwrap() };
        unsafe {
            sched.create_with(b, |s| loop {
                spins.set(spins.get() + 1);
                s.yield_now();
            })
            .unwrap();
        }

        for _ in 0..4 {
            sched.yield_now();
        }
        assert_eq!(ran.get(), 1);
        assert_eq!(spins.get(), 4);
        assert_eq!(sched.current(), TaskId::MAIN);
    }

    fn add_own_id(s: &Scheduler, arg: usize) {
        // SAFETY: the test passes the address of a live Cell<usize>
        let cell = unsafe { &*(arg as *const Cell<usize>) };
        cell.set(cell.get() + s.current().get() as usize);
    }

    #[test]
    fn test_fn_entry_receives_argument() {
        let seen = Cell::new(0usize);
        let mut buf = stack();
        let sched = Scheduler::new();

        let id = unsafe { sched.create(add_own_id, &mut buf, &seen as *const Cell<usize> as usize) }.unwrap();
        assert_eq!(id.get(), 2);

        sched.yield_now();
        sched.yield_now();
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn test_stack_use_is_visible() {
        let mut buf = stack();
        let sched = Scheduler::new();
        let id = unsafe {
            sched.create_with(&mut buf, |s| loop {
                let scratch = [7u8; 512];
                core::hint::black_box(&scratch);
                s.yield_now();
            })
            .unwrap()
        };

        let before = sched.stack_unused(id).unwrap();
        sched.yield_now();
        let after = sched.stack_unused(id).unwrap();
        assert!(after < before);
        assert!(after > 0);
    }
}
