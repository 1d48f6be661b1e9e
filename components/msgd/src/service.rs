//! Servicing one pending mailbox
//!
//! [`service_slot`] performs every step of the handler except the register
//! writes: it decides whether the slot is pending, validates and reads the
//! mailbox, deletes it and reports which mask bit to clear. The caller does
//! the clearing, and only of [`Serviced::clear`].

use slotbus_bus::{IntMask, SlotIndex};

use crate::mailbox::{MailboxMessage, MailboxStore, INBOX_FILE, MAX_CONTENT, SENDER_FILE};
use crate::ServiceError;

/// What happened to the mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The slot's bit was not set; nothing was touched
    NotPending,
    Delivered(MailboxMessage),
    Failed(ServiceError),
}

/// Result of one servicing pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serviced {
    pub outcome: Outcome,
    /// First failure while deleting the mailbox files, if any
    pub cleanup: Option<ServiceError>,
    /// Bit the caller must clear: the serviced slot's, or nothing
    pub clear: IntMask,
    /// Pending bits that belong to other slots
    pub remaining: IntMask,
}

/// Service `slot` given a snapshot of the pending mask
///
/// When the slot is pending its bit is always reported for clearing, even if
/// the mailbox was missing, oversized or vanished mid-read. Once both files
/// were sized they are deleted regardless of the outcome so a poisoned
/// mailbox is never delivered twice.
pub fn service_slot<S: MailboxStore + ?Sized>(
    pending: IntMask,
    slot: SlotIndex,
    store: &mut S,
) -> Serviced {
    let mask = IntMask::slot(slot);
    if !pending.contains(mask) {
        return Serviced {
            outcome: Outcome::NotPending,
            cleanup: None,
            clear: IntMask::empty(),
            remaining: pending,
        };
    }

    let body_size = store.size(INBOX_FILE);
    let sender_size = store.size(SENDER_FILE);

    let (outcome, cleanup) = match (sender_size, body_size) {
        (Some(sender_len), Some(body_len)) => {
            let outcome = if sender_len as usize >= MAX_CONTENT || body_len as usize >= MAX_CONTENT {
                Outcome::Failed(ServiceError::TooLarge { sender_len, body_len })
            } else {
                read_mailbox(store, sender_len as usize, body_len as usize)
            };
            (outcome, remove_mailbox(store))
        }
        _ => (Outcome::Failed(ServiceError::NoValidMessage), None),
    };

    Serviced { outcome, cleanup, clear: mask, remaining: pending.difference(mask) }
}

fn read_mailbox<S: MailboxStore + ?Sized>(store: &mut S, sender_len: usize, body_len: usize) -> Outcome {
    let mut message = MailboxMessage::empty();
    let sender = store.read_into(SENDER_FILE, message.sender_buf());
    let body = store.read_into(INBOX_FILE, message.body_buf());

    match (sender, body) {
        (Ok(_), Ok(_)) => {
            message.terminate(sender_len, body_len);
            Outcome::Delivered(message)
        }
        (sender, body) => Outcome::Failed(ServiceError::ReadFailed {
            sender: sender.err(),
            body: body.err(),
        }),
    }
}

fn remove_mailbox<S: MailboxStore + ?Sized>(store: &mut S) -> Option<ServiceError> {
    let mut first = None;
    for file in [INBOX_FILE, SENDER_FILE] {
        if let Err(error) = store.delete(file) {
            first.get_or_insert(ServiceError::Cleanup { file, error });
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use slotbus_drivers::{DriverError, FsCommand, FsStatus};

    #[derive(Default)]
    struct FakeStore {
        files: BTreeMap<String, Vec<u8>>,
        /// File that disappears between sizing and reading
        vanishes: Option<&'static str>,
        reads: usize,
        deletes: Vec<String>,
    }

    fn not_found(command: FsCommand) -> DriverError {
        DriverError::Fs { command, status: FsStatus::NotFound }
    }

    impl FakeStore {
        fn with(sender: &[u8], body: &[u8]) -> Self {
            let mut store = Self::default();
            store.files.insert(SENDER_FILE.to_string(), sender.to_vec());
            store.files.insert(INBOX_FILE.to_string(), body.to_vec());
            store
        }
    }

    impl MailboxStore for FakeStore {
        fn size(&mut self, name: &str) -> Option<u16> {
            self.files.get(name).map(|data| data.len() as u16)
        }

        fn read_into(&mut self, name: &str, buf: &mut [u8]) -> slotbus_drivers::Result<usize> {
            self.reads += 1;
            if self.vanishes == Some(name) {
                self.files.remove(name);
            }
            let data = self.files.get(name).ok_or(not_found(FsCommand::Size))?;
            if data.len() > buf.len() {
                return Err(DriverError::BufferTooSmall { size: data.len(), capacity: buf.len() });
            }
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }

        fn delete(&mut self, name: &str) -> slotbus_drivers::Result<()> {
            self.deletes.push(name.to_string());
            self.files.remove(name).map(|_| ()).ok_or(not_found(FsCommand::Delete))
        }
    }

    fn slot(i: usize) -> SlotIndex {
        SlotIndex::new(i).unwrap()
    }

    #[test]
    fn test_delivers_and_cleans_up() {
        let mut store = FakeStore::with(b"earth", b"move_to(1,2,3)");
        let pending = IntMask::SLOT0;
        let serviced = service_slot(pending, slot(0), &mut store);

        let Outcome::Delivered(message) = &serviced.outcome else {
            panic!("expected delivery, got {:?}", serviced.outcome);
        };
        assert_eq!(message.sender(), b"earth");
        assert_eq!(message.body(), b"move_to(1,2,3)");
        assert_eq!(message.sender_with_nul(), b"earth\0");
        assert_eq!(message.body_with_nul().last(), Some(&0));

        assert!(store.files.is_empty());
        assert_eq!(serviced.cleanup, None);
        assert_eq!(serviced.clear, IntMask::SLOT0);
        assert!(serviced.remaining.is_empty());
    }

    #[test]
    fn test_not_pending_touches_nothing() {
        let mut store = FakeStore::with(b"a", b"b");
        let pending = IntMask::SLOT7;
        let serviced = service_slot(pending, slot(3), &mut store);

        assert_eq!(serviced.outcome, Outcome::NotPending);
        assert!(serviced.clear.is_empty());
        assert_eq!(serviced.remaining, IntMask::SLOT7);
        assert_eq!(store.files.len(), 2);
        assert!(store.deletes.is_empty());
    }

    #[test]
    fn test_sibling_bit_survives() {
        let mut store = FakeStore::with(b"a", b"b");
        let serviced = service_slot(IntMask::SLOT3 | IntMask::SLOT7, slot(3), &mut store);
        assert_eq!(serviced.clear, IntMask::SLOT3);
        assert_eq!(serviced.remaining, IntMask::SLOT7);
    }

    #[test]
    fn test_missing_file_reports_and_clears() {
        let mut store = FakeStore::default();
        store.files.insert(INBOX_FILE.to_string(), b"orphan".to_vec());

        let serviced = service_slot(IntMask::SLOT2, slot(2), &mut store);
        assert_eq!(serviced.outcome, Outcome::Failed(ServiceError::NoValidMessage));
        assert_eq!(serviced.clear, IntMask::SLOT2);
        assert_eq!(store.reads, 0);
        // Nothing confirmed both files existed, so nothing is deleted
        assert!(store.deletes.is_empty());
    }

    #[test]
    fn test_oversize_reports_and_deletes() {
        let mut store = FakeStore::with(b"a", &[b'x'; 255]);
        let serviced = service_slot(IntMask::SLOT0, slot(0), &mut store);
        assert_eq!(
            serviced.outcome,
            Outcome::Failed(ServiceError::TooLarge { sender_len: 1, body_len: 255 })
        );
        assert_eq!(store.reads, 0);
        assert!(store.files.is_empty());
        assert_eq!(serviced.clear, IntMask::SLOT0);
    }

    #[test]
    fn test_largest_accepted_content() {
        let mut store = FakeStore::with(&[b's'; 254], &[b'b'; 254]);
        let serviced = service_slot(IntMask::SLOT0, slot(0), &mut store);
        let Outcome::Delivered(message) = serviced.outcome else {
            panic!("254 bytes must be accepted");
        };
        assert_eq!(message.body().len(), 254);
        assert_eq!(message.body_with_nul()[254], 0);
    }

    #[test]
    fn test_race_between_size_and_read() {
        let mut store = FakeStore::with(b"earth", b"hello");
        store.vanishes = Some(SENDER_FILE);

        let serviced = service_slot(IntMask::SLOT1, slot(1), &mut store);
        match &serviced.outcome {
            Outcome::Failed(ServiceError::ReadFailed { sender, body }) => {
                assert!(sender.is_some());
                assert!(body.is_none());
            }
            other => panic!("expected a read failure, got {:?}", other),
        }
        // Both deletes attempted; the vanished one fails
        assert_eq!(store.deletes, vec![INBOX_FILE.to_string(), SENDER_FILE.to_string()]);
        assert!(matches!(serviced.cleanup, Some(ServiceError::Cleanup { file: SENDER_FILE, .. })));
        assert!(store.files.is_empty());
        assert_eq!(serviced.clear, IntMask::SLOT1);
    }
}
