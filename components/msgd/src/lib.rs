//! Slotbus Message Daemon - Interrupt-driven mailbox delivery
//!
//! # Purpose
//! Waits for the message receiver's interrupt, pulls the sender and body out
//! of the mailbox files, hands them to the application and acknowledges the
//! interrupt without disturbing any other slot's pending bit.
//!
//! # Integration Points
//! - Depends on: `slotbus-bus` (interrupt register), `slotbus-drivers`
//!   (filesystem, message receiver)
//! - Provides to: programs that want to consume messages
//!
//! # Architecture
//! [`service_slot`] is a pure function of (pending mask, mailbox store) and
//! carries all the protocol rules. [`MessageDaemon`] owns suspension, the
//! Idle/Servicing state and the register writes that acknowledge the
//! interrupt.
//!
//! # Testing Strategy
//! - Unit tests: [`service_slot`] against an in-memory mailbox store
//! - Integration tests: the daemon on the simulated machine

#![no_std]

extern crate alloc;

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod daemon;
pub mod mailbox;
pub mod service;

pub use daemon::{CollectingSink, DaemonState, LogSink, MessageDaemon, MessageSink};
pub use mailbox::{MailboxMessage, MailboxStore, INBOX_FILE, MAILBOX_CAPACITY, SENDER_FILE};
pub use service::{service_slot, Outcome, Serviced};

use core::fmt;

use slotbus_drivers::DriverError;
use thiserror::Error;

/// Why a pending mailbox could not be delivered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("INBOX.MSG or SENDER.MSG not found or invalid")]
    NoValidMessage,

    #[error("message or sender too large (sender {sender_len} bytes, body {body_len} bytes)")]
    TooLarge { sender_len: u16, body_len: u16 },

    /// Sizes were fine but a read failed afterwards: the mailbox changed
    /// underneath the handler
    #[error("error reading messages (sender: {}, body: {})", ReadStatus(.sender), ReadStatus(.body))]
    ReadFailed {
        sender: Option<DriverError>,
        body: Option<DriverError>,
    },

    #[error("cannot delete {file}: {error}")]
    Cleanup { file: &'static str, error: DriverError },
}

struct ReadStatus<'a>(&'a Option<DriverError>);

impl fmt::Display for ReadStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(err) => write!(f, "{}", err),
            None => write!(f, "ok"),
        }
    }
}
