//! Per-task countdown timers and the system tick counter
//!
//! One countdown per task slot: 0 means expired (or never armed), a
//! positive value is the number of ticks left. The tick handler runs in
//! interrupt context, so every access goes through a critical section
//! (riscv32imc and thumbv6m have no atomic read-modify-write).
//!
//! Author: coop-rtos contributors

use core::cell::Cell;

use critical_section::Mutex;

use crate::config::MAX_TASKS;

/// Countdown table plus a free-running tick counter
pub struct Timers {
    /// Ticks remaining per task slot
    remaining: [Mutex<Cell<u32>>; MAX_TASKS],
    /// Ticks delivered since init (wrapping)
    ticks: Mutex<Cell<u32>>,
}

impl Timers {
    /// All timers expired, tick counter at zero
    pub const fn new() -> Self {
        Self {
            remaining: [const { Mutex::new(Cell::new(0)) }; MAX_TASKS],
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Expire every timer and zero the tick counter
    pub fn reset(&self) {
        critical_section::with(|cs| {
            for timer in &self.remaining {
                timer.borrow(cs).set(0);
            }
            self.ticks.borrow(cs).set(0);
        });
    }

    /// Start slot's countdown at `ticks` (0 disarms)
    pub fn arm(&self, slot: usize, ticks: u32) {
        if let Some(timer) = self.remaining.get(slot) {
            critical_section::with(|cs| timer.borrow(cs).set(ticks));
        }
    }

    /// Ticks left on slot's countdown (0 for unknown slots)
    pub fn remaining(&self, slot: usize) -> u32 {
        match self.remaining.get(slot) {
            Some(timer) => critical_section::with(|cs| timer.borrow(cs).get()),
            None => 0,
        }
    }

    /// Has slot's countdown reached zero?
    pub fn is_expired(&self, slot: usize) -> bool {
        self.remaining(slot) == 0
    }

    /// Age the first `active` countdowns by one tick
    ///
    /// Expired timers stay at 0. Not reentrant: tick interrupts must not
    /// nest.
    pub fn tick(&self, active: usize) {
        let active = active.min(MAX_TASKS);
        critical_section::with(|cs| {
            for timer in &self.remaining[..active] {
                let timer = timer.borrow(cs);
                let left = timer.get();
                if left != 0 {
                    timer.set(left - 1);
                }
            }
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        });
    }

    /// Ticks delivered since init (wrapping)
    pub fn now(&self) -> u32 {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }

    /// Ticks elapsed since a reference `now()` reading
    pub fn elapsed_since(&self, reference: u32) -> u32 {
        self.now().wrapping_sub(reference)
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_timers_expired() {
        let timers = Timers::new();
        assert_eq!(timers.now(), 0);
        assert!((0..MAX_TASKS).all(|slot| timers.is_expired(slot)));
    }

    #[test]
    fn test_arm_and_count_down() {
        let timers = Timers::new();
        timers.arm(1, 3);
        assert_eq!(timers.remaining(1), 3);

        timers.tick(2);
        timers.tick(2);
        assert_eq!(timers.remaining(1), 1);
        assert!(!timers.is_expired(1));

        timers.tick(2);
        assert!(timers.is_expired(1));
        assert_eq!(timers.now(), 3);
    }

    #[test]
    fn test_expired_timer_stays_zero() {
        let timers = Timers::new();
        timers.arm(0, 1);
        for _ in 0..5 {
            timers.tick(1);
        }
        assert_eq!(timers.remaining(0), 0);
        assert_eq!(timers.now(), 5);
    }

    #[test]
    fn test_tick_only_ages_active_slots() {
        let timers = Timers::new();
        timers.arm(1, 4);
        timers.arm(3, 4);

        timers.tick(2);
        assert_eq!(timers.remaining(1), 3);
        assert_eq!(timers.remaining(3), 4);
    }

    #[test]
    fn test_out_of_range_slot_ignored() {
        let timers = Timers::new();
        timers.arm(MAX_TASKS, 5);
        assert_eq!(timers.remaining(MAX_TASKS), 0);
        timers.tick(MAX_TASKS + 10);
        assert_eq!(timers.now(), 1);
    }

    #[test]
    fn test_reset() {
        let timers = Timers::new();
        timers.arm(2, 9);
        timers.tick(3);
        timers.reset();
        assert_eq!(timers.now(), 0);
        assert!(timers.is_expired(2));
    }

    #[test]
    fn test_elapsed_since() {
        let timers = Timers::new();
        timers.tick(1);
        let reference = timers.now();
        timers.tick(1);
        timers.tick(1);
        assert_eq!(timers.elapsed_since(reference), 2);
    }
}
