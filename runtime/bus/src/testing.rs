//! In-memory bus for unit tests

use core::cell::{Cell, RefCell};
use std::boxed::Box;
use std::vec::Vec;

use crate::{InterruptControl, RegisterAddress, RegisterBus, Word};

/// Flat 64 KiB of RAM that records word writes in order
pub struct MemBus {
    mem: RefCell<Box<[u8]>>,
    writes: RefCell<Vec<(u16, Word)>>,
    byte_reads: Cell<usize>,
    enabled: Cell<bool>,
}

impl MemBus {
    pub fn new() -> Self {
        Self {
            mem: RefCell::new(vec![0u8; 0x1_0000].into_boxed_slice()),
            writes: RefCell::new(Vec::new()),
            byte_reads: Cell::new(0),
            enabled: Cell::new(true),
        }
    }

    /// Word writes observed so far, oldest first
    pub fn writes(&self) -> Vec<(u16, Word)> {
        self.writes.borrow().clone()
    }

    /// Number of byte reads served so far
    pub fn byte_reads(&self) -> usize {
        self.byte_reads.get()
    }

    /// Store a NUL-padded name into the 8-byte field at `addr`
    pub fn put_name(&self, addr: u16, name: &[u8]) {
        let mut field = [0u8; 8];
        field[..name.len()].copy_from_slice(name);
        self.write_bytes(RegisterAddress::new(addr), &field);
    }
}

impl RegisterBus for MemBus {
    fn read_word(&self, addr: RegisterAddress) -> Word {
        let lo = self.read_byte(addr) as u16;
        let hi = self.read_byte(addr.offset(1)) as u16;
        lo | (hi << 8)
    }

    fn write_word(&self, addr: RegisterAddress, value: Word) {
        self.writes.borrow_mut().push((addr.get(), value));
        let mut mem = self.mem.borrow_mut();
        mem[addr.get() as usize] = value as u8;
        mem[addr.offset(1).get() as usize] = (value >> 8) as u8;
    }

    fn read_byte(&self, addr: RegisterAddress) -> u8 {
        self.byte_reads.set(self.byte_reads.get() + 1);
        self.mem.borrow()[addr.get() as usize]
    }

    fn write_byte(&self, addr: RegisterAddress, value: u8) {
        self.mem.borrow_mut()[addr.get() as usize] = value;
    }
}

impl InterruptControl for MemBus {
    fn interrupts_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_interrupts_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
}
