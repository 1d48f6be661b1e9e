//! The message daemon
//!
//! Suspends until an interrupt is pending, then services the receiver's slot
//! with interrupt delivery disabled. Interrupts are re-enabled only after
//! the receiver was acknowledged and its mask bit cleared, so the handler
//! never re-enters itself.

use alloc::vec::Vec;

use slotbus_bus::{
    without_interrupts, BusLayout, InterruptControl, InterruptRegister, RegisterBus, SlotIndex,
    WaitForInterrupt,
};
use slotbus_drivers::{Filesystem, MessageReceiver};

use crate::mailbox::MailboxMessage;
use crate::service::{service_slot, Outcome, Serviced};
use crate::ServiceError;

/// Where delivered messages and failures go
pub trait MessageSink {
    fn deliver(&mut self, message: &MailboxMessage);

    fn report(&mut self, error: &ServiceError);
}

/// Writes every delivery and failure to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn deliver(&mut self, message: &MailboxMessage) {
        log::info!(
            "Message Received from {}: {}",
            message.sender_lossy(),
            message.body_lossy()
        );
    }

    fn report(&mut self, error: &ServiceError) {
        log::warn!("msgd: {}", error);
    }
}

/// Keeps everything it is handed, for callers that inspect results later
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub delivered: Vec<MailboxMessage>,
    pub errors: Vec<ServiceError>,
}

impl MessageSink for CollectingSink {
    fn deliver(&mut self, message: &MailboxMessage) {
        self.delivered.push(message.clone());
    }

    fn report(&mut self, error: &ServiceError) {
        self.errors.push(error.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Suspended, or about to suspend
    Idle,
    /// Handling the receiver's pending interrupt
    Servicing(SlotIndex),
}

pub struct MessageDaemon<'b, B: ?Sized> {
    bus: &'b B,
    interrupts: InterruptRegister<'b, B>,
    receiver: MessageReceiver<'b, B>,
    fs: Filesystem<'b, B>,
    state: DaemonState,
}

impl<'b, B: RegisterBus + InterruptControl + ?Sized> MessageDaemon<'b, B> {
    /// Locate the receiver and enable interrupt delivery
    ///
    /// # Errors
    /// [`slotbus_drivers::DriverError::Bus`] if no slot advertises `MSGRECV`
    pub fn start(
        bus: &'b B,
        layout: &BusLayout,
        fs: Filesystem<'b, B>,
    ) -> slotbus_drivers::Result<Self> {
        let receiver = MessageReceiver::find(bus, layout)?;
        log::info!("msgd: receiver in slot {}, waiting for messages", receiver.slot());

        let daemon = Self {
            bus,
            interrupts: InterruptRegister::new(bus, layout.interrupt_mask),
            receiver,
            fs,
            state: DaemonState::Idle,
        };
        bus.set_interrupts_enabled(true);
        Ok(daemon)
    }

    pub fn slot(&self) -> SlotIndex {
        self.receiver.slot()
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Service the receiver's slot if it is pending
    ///
    /// Bits owned by other slots are left set. The sink hears about the
    /// outcome once interrupts are back on.
    pub fn handle_interrupt(&mut self, sink: &mut dyn MessageSink) -> Serviced {
        let slot = self.slot();
        let bus = self.bus;

        let serviced = without_interrupts(bus, || {
            let pending = self.interrupts.pending();
            if !pending.is_pending(slot) {
                return service_slot(pending, slot, &mut self.fs);
            }

            self.state = DaemonState::Servicing(slot);
            let serviced = service_slot(pending, slot, &mut self.fs);
            if !serviced.clear.is_empty() {
                self.receiver.acknowledge();
                self.interrupts.acknowledge(slot);
            }
            self.state = DaemonState::Idle;
            serviced
        });

        match &serviced.outcome {
            Outcome::NotPending => {
                log::trace!("msgd: woke with {:?}, slot {} not pending", serviced.remaining, slot)
            }
            Outcome::Delivered(message) => sink.deliver(message),
            Outcome::Failed(error) => sink.report(error),
        }
        if let Some(error) = &serviced.cleanup {
            sink.report(error);
        }
        serviced
    }
}

impl<'b, B: RegisterBus + InterruptControl + WaitForInterrupt + ?Sized> MessageDaemon<'b, B> {
    /// Suspend until something is pending, then handle it
    pub fn wait_and_handle(&mut self, sink: &mut dyn MessageSink) -> Serviced {
        self.bus.wait_for_interrupt();
        self.handle_interrupt(sink)
    }

    pub fn run(&mut self, sink: &mut dyn MessageSink) -> ! {
        loop {
            self.wait_and_handle(sink);
        }
    }
}
