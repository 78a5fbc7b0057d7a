//! Kernel — timers and mailboxes on top of the scheduler
//!
//! Adds per-task countdown timers and single-slot mailboxes to any
//! [`Cooperative`] scheduler. Blocking calls are polling loops: they
//! re-check their condition after every `wait()`, since only other
//! tasks (or the tick interrupt) can change it.
//!
//! The kernel never allocates task ids; it indexes its per-task arrays
//! by the scheduler's slot numbers.
//!
//! Author: coop-rtos contributors

use log::debug;

use crate::config::MAX_TASKS;
use crate::error::Error;
use crate::mailbox::Mailbox;
use crate::scheduler::{Cooperative, Scheduler};
use crate::task::TaskId;
use crate::timer::Timers;

/// Coordination layer
///
/// `const`-constructible, so both the scheduler and the kernel can be
/// `static`s and the tick interrupt can reach the kernel directly.
pub struct Kernel<'s, S: Cooperative = Scheduler> {
    /// Scheduler providing `wait()` and the slot counters
    scheduler: &'s S,
    /// One countdown per task slot
    timers: Timers,
    /// One mailbox per task slot
    mailboxes: [Mailbox; MAX_TASKS],
}

impl<'s, S: Cooperative> Kernel<'s, S> {
    /// Kernel with all timers expired and all mailboxes empty
    pub const fn new(scheduler: &'s S) -> Self {
        Self {
            scheduler,
            timers: Timers::new(),
            mailboxes: [const { Mailbox::new() }; MAX_TASKS],
        }
    }

    /// Expire all timers, empty all mailboxes, zero the tick counter
    pub fn reset(&self) {
        self.timers.reset();
        for mailbox in &self.mailboxes {
            mailbox.clear();
        }
        debug!("kernel reset: {} task slots", MAX_TASKS);
    }

    /// Scheduler this kernel waits on
    pub fn scheduler(&self) -> &'s S {
        self.scheduler
    }

    /// System tick, called from the periodic timer interrupt
    ///
    /// Counts down every armed timer of a populated slot and advances the
    /// tick counter. Never switches tasks. Must not be re-entered.
    pub fn tick(&self) {
        self.timers.tick(self.scheduler.task_count());
    }

    /// Ticks delivered since init (wrapping)
    pub fn now(&self) -> u32 {
        self.timers.now()
    }

    /// Ticks left on task `id`'s timer
    pub fn timer_remaining(&self, id: TaskId) -> u32 {
        self.timers.remaining(id.slot())
    }

    /// Block the calling task for at least `ticks` ticks
    ///
    /// `delay(0)` is a plain yield. Wall time also depends on how long the
    /// other tasks run before they yield.
    pub fn delay(&self, ticks: u32) {
        if ticks == 0 {
            self.scheduler.wait();
            return;
        }
        let slot = self.scheduler.current_task();
        self.timers.arm(slot, ticks);
        while !self.timers.is_expired(slot) {
            self.scheduler.wait();
        }
    }

    /// Post `msg` to `mailbox` without blocking
    pub fn post(&self, mailbox: &Mailbox, msg: usize) -> Result<(), Error> {
        mailbox.post(msg)
    }

    /// Wait for a message in `mailbox` and take it
    ///
    /// A waiting message is returned at once. Otherwise `timeout == 0`
    /// waits forever, and a positive `timeout` gives up with `Timeout`
    /// once the caller's timer has run down. Nothing is consumed on
    /// timeout.
    pub fn pend(&self, mailbox: &Mailbox, timeout: u32) -> Result<usize, Error> {
        if mailbox.is_empty() {
            if timeout == 0 {
                while mailbox.is_empty() {
                    self.scheduler.wait();
                }
            } else {
                let slot = self.scheduler.current_task();
                self.timers.arm(slot, timeout);
                while mailbox.is_empty() && !self.timers.is_expired(slot) {
                    self.scheduler.wait();
                }
                // A message that raced the last tick still counts.
                let msg = mailbox.accept().map_err(|_| Error::Timeout)?;
                self.timers.arm(slot, 0);
                return Ok(msg);
            }
        }
        mailbox.accept()
    }

    /// Take the message in `mailbox` if there is one; never waits
    pub fn accept(&self, mailbox: &Mailbox) -> Result<usize, Error> {
        mailbox.accept()
    }

    /// Task `id`'s own mailbox
    pub fn mailbox(&self, id: TaskId) -> Result<&Mailbox, Error> {
        self.mailboxes.get(id.slot()).ok_or(Error::InvalidTask)
    }

    /// The calling task's own mailbox
    ///
    /// `InvalidTask` if the scheduler reports a slot outside the table.
    pub fn inbox(&self) -> Result<&Mailbox, Error> {
        self.mailboxes
            .get(self.scheduler.current_task())
            .ok_or(Error::InvalidTask)
    }
}
