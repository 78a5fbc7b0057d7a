//! Kernel error codes
//!
//! Every failure is reported synchronously through `Result`. The numeric
//! codes are stable so they can be handed across an FFI boundary or
//! printed on a serial console.
//!
//! Author: coop-rtos contributors

use core::fmt;

/// Error returned by task creation and the mailbox/timer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Task id outside the table
    InvalidTask,
    /// Post to a mailbox that already holds a message
    MailboxInUse,
    /// Post of the empty message
    ZeroMessage,
    /// Timed pend expired before a message arrived
    Timeout,
    /// Accept on an empty mailbox
    NoMessage,
    /// Stack buffer cannot hold the task's entry frame
    StackTooSmall,
    /// Task table already holds `MAX_TASKS` entries
    TableFull,
}

impl Error {
    /// Small-integer code (0 is reserved for success)
    pub const fn code(self) -> u16 {
        match self {
            Error::InvalidTask => 1,
            Error::MailboxInUse => 2,
            Error::ZeroMessage => 3,
            Error::Timeout => 4,
            Error::NoMessage => 5,
            Error::StackTooSmall => 6,
            Error::TableFull => u16::MAX,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTask => write!(f, "invalid task id"),
            Error::MailboxInUse => write!(f, "mailbox in use"),
            Error::ZeroMessage => write!(f, "zero message"),
            Error::Timeout => write!(f, "timeout"),
            Error::NoMessage => write!(f, "no message present"),
            Error::StackTooSmall => write!(f, "stack too small"),
            Error::TableFull => write!(f, "task table full"),
        }
    }
}
