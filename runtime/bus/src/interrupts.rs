//! Interrupt mask and interrupt control
//!
//! # Purpose
//! The interrupt-mask register is shared by every peripheral on the bus. A
//! read returns the pending bits; a write clears exactly the bits written.
//! [`InterruptRegister`] only exposes single-slot acknowledgement so a
//! handler cannot wipe a sibling's pending signal.
//!
//! # Critical sections
//! [`without_interrupts`] masks interrupt delivery for the duration of a
//! closure and restores the previous state afterwards, also on unwind.

use bitflags::bitflags;

use crate::{RegisterAddress, RegisterBus, RegisterPort, SlotIndex, Word};

bitflags! {
    /// Pending-interrupt bits, one per slot
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct IntMask: u16 {
        const SLOT0  = 1 << 0;
        const SLOT1  = 1 << 1;
        const SLOT2  = 1 << 2;
        const SLOT3  = 1 << 3;
        const SLOT4  = 1 << 4;
        const SLOT5  = 1 << 5;
        const SLOT6  = 1 << 6;
        const SLOT7  = 1 << 7;
        const SLOT8  = 1 << 8;
        const SLOT9  = 1 << 9;
        const SLOT10 = 1 << 10;
        const SLOT11 = 1 << 11;
        const SLOT12 = 1 << 12;
        const SLOT13 = 1 << 13;
        const SLOT14 = 1 << 14;
        const SLOT15 = 1 << 15;
    }
}

impl IntMask {
    /// The single bit owned by `slot`
    pub fn slot(slot: SlotIndex) -> Self {
        Self::from_bits_retain(1 << slot.get())
    }

    pub fn is_pending(self, slot: SlotIndex) -> bool {
        self.contains(Self::slot(slot))
    }

    /// Pending slots in ascending order
    pub fn slots(self) -> impl Iterator<Item = SlotIndex> {
        SlotIndex::all().filter(move |&slot| self.is_pending(slot))
    }
}

/// Global interrupt enable, as seen by the running program
pub trait InterruptControl {
    fn interrupts_enabled(&self) -> bool;

    fn set_interrupts_enabled(&self, enabled: bool);
}

impl<C: InterruptControl + ?Sized> InterruptControl for &C {
    fn interrupts_enabled(&self) -> bool {
        (**self).interrupts_enabled()
    }

    fn set_interrupts_enabled(&self, enabled: bool) {
        (**self).set_interrupts_enabled(enabled)
    }
}

/// The program's only blocking point: suspend until an interrupt is pending
pub trait WaitForInterrupt {
    fn wait_for_interrupt(&self);
}

impl<W: WaitForInterrupt + ?Sized> WaitForInterrupt for &W {
    fn wait_for_interrupt(&self) {
        (**self).wait_for_interrupt()
    }
}

struct RestoreOnDrop<'c, C: InterruptControl + ?Sized> {
    ctl: &'c C,
    was_enabled: bool,
}

impl<C: InterruptControl + ?Sized> Drop for RestoreOnDrop<'_, C> {
    fn drop(&mut self) {
        self.ctl.set_interrupts_enabled(self.was_enabled);
    }
}

/// Run `f` with interrupt delivery disabled
///
/// Nests: the state found on entry is the state restored on exit.
pub fn without_interrupts<C, F, R>(ctl: &C, f: F) -> R
where
    C: InterruptControl + ?Sized,
    F: FnOnce() -> R,
{
    let was_enabled = ctl.interrupts_enabled();
    if was_enabled {
        ctl.set_interrupts_enabled(false);
    }
    let _restore = RestoreOnDrop { ctl, was_enabled };
    f()
}

/// Handle on the interrupt-mask register
pub struct InterruptRegister<'b, B: ?Sized> {
    port: RegisterPort<'b, B>,
}

impl<'b, B: RegisterBus + ?Sized> InterruptRegister<'b, B> {
    pub fn new(bus: &'b B, addr: RegisterAddress) -> Self {
        Self { port: RegisterPort::new(bus, addr) }
    }

    /// Snapshot of the pending bits
    pub fn pending(&self) -> IntMask {
        IntMask::from_bits_retain(self.port.read())
    }

    /// Clear the bit owned by `slot` and nothing else
    pub fn acknowledge(&self, slot: SlotIndex) {
        let bit: Word = IntMask::slot(slot).bits();
        log::debug!("interrupts: acknowledge slot {}", slot);
        self.port.write(bit);
    }
}
