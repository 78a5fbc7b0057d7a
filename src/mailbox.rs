//! Single-slot mailboxes
//!
//! A mailbox holds at most one pointer-sized message. `EMPTY` (0) is
//! reserved to mean "no message", so it can never be posted. A post to
//! a full mailbox is rejected, not queued.
//!
//! The slot sits behind a critical section so interrupt handlers may
//! post as well.
//!
//! Author: coop-rtos contributors

use core::cell::Cell;

use critical_section::Mutex;

use crate::error::Error;

/// Message value meaning "mailbox empty"
pub const EMPTY: usize = 0;

/// Arbitrary non-empty message, for pure signalling
pub const SIGNAL: usize = 1;

/// One-message mailbox
pub struct Mailbox {
    slot: Mutex<Cell<usize>>,
}

impl Mailbox {
    /// Empty mailbox
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(EMPTY)),
        }
    }

    /// Is there no message waiting?
    pub fn is_empty(&self) -> bool {
        self.peek() == EMPTY
    }

    /// Message waiting, or `EMPTY`, without taking it
    pub fn peek(&self) -> usize {
        critical_section::with(|cs| self.slot.borrow(cs).get())
    }

    /// Store `msg` if the mailbox is empty
    ///
    /// A full mailbox is left unchanged (`MailboxInUse`); `EMPTY` cannot
    /// be posted (`ZeroMessage`).
    pub fn post(&self, msg: usize) -> Result<(), Error> {
        critical_section::with(|cs| {
            let slot = self.slot.borrow(cs);
            if slot.get() != EMPTY {
                Err(Error::MailboxInUse)
            } else if msg == EMPTY {
                Err(Error::ZeroMessage)
            } else {
                slot.set(msg);
                Ok(())
            }
        })
    }

    /// Take the waiting message, leaving the mailbox empty
    pub fn accept(&self) -> Result<usize, Error> {
        critical_section::with(|cs| match self.slot.borrow(cs).replace(EMPTY) {
            EMPTY => Err(Error::NoMessage),
            msg => Ok(msg),
        })
    }

    /// Drop any waiting message
    pub fn clear(&self) {
        critical_section::with(|cs| self.slot.borrow(cs).set(EMPTY));
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
