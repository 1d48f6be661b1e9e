//! Register ports and bus backends
//!
//! A [`RegisterAddress`] names one location in the machine's 16-bit address
//! space. Application code never dereferences it; reads and writes go through
//! a [`RegisterBus`], usually via a [`RegisterPort`] bound to one address.

use core::fmt;
use core::ptr::{read_volatile, write_volatile};

/// Width of every device register
pub type Word = u16;

/// One memory-mapped location on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(transparent))]
pub struct RegisterAddress(u16);

impl RegisterAddress {
    pub const fn new(addr: u16) -> Self {
        Self(addr)
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    /// Address `by` bytes further on. Wraps at the top of the address space.
    pub const fn offset(self, by: u16) -> Self {
        Self(self.0.wrapping_add(by))
    }
}

impl From<u16> for RegisterAddress {
    fn from(addr: u16) -> Self {
        Self(addr)
    }
}

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Access to the machine's address space
///
/// Word accesses are little-endian. Implementations must deliver accesses in
/// program order: a write issued before another write is observed first.
pub trait RegisterBus {
    fn read_word(&self, addr: RegisterAddress) -> Word;

    fn write_word(&self, addr: RegisterAddress, value: Word);

    fn read_byte(&self, addr: RegisterAddress) -> u8;

    fn write_byte(&self, addr: RegisterAddress, value: u8);

    /// Fill `buf` from consecutive bytes starting at `addr`
    fn read_bytes(&self, addr: RegisterAddress, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_byte(addr.offset(i as u16));
        }
    }

    /// Copy `data` to consecutive bytes starting at `addr`
    fn write_bytes(&self, addr: RegisterAddress, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.write_byte(addr.offset(i as u16), byte);
        }
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for &B {
    fn read_word(&self, addr: RegisterAddress) -> Word {
        (**self).read_word(addr)
    }

    fn write_word(&self, addr: RegisterAddress, value: Word) {
        (**self).write_word(addr, value)
    }

    fn read_byte(&self, addr: RegisterAddress) -> u8 {
        (**self).read_byte(addr)
    }

    fn write_byte(&self, addr: RegisterAddress, value: u8) {
        (**self).write_byte(addr, value)
    }

    fn read_bytes(&self, addr: RegisterAddress, buf: &mut [u8]) {
        (**self).read_bytes(addr, buf)
    }

    fn write_bytes(&self, addr: RegisterAddress, data: &[u8]) {
        (**self).write_bytes(addr, data)
    }
}

/// Typed handle to one fixed register
pub struct RegisterPort<'b, B: ?Sized> {
    bus: &'b B,
    addr: RegisterAddress,
}

impl<'b, B: RegisterBus + ?Sized> RegisterPort<'b, B> {
    pub fn new(bus: &'b B, addr: RegisterAddress) -> Self {
        Self { bus, addr }
    }

    pub fn address(&self) -> RegisterAddress {
        self.addr
    }

    #[inline]
    pub fn read(&self) -> Word {
        let value = self.bus.read_word(self.addr);
        log::trace!("read  {} -> {:#06x}", self.addr, value);
        value
    }

    #[inline]
    pub fn write(&self, value: Word) {
        log::trace!("write {} <- {:#06x}", self.addr, value);
        self.bus.write_word(self.addr, value);
    }
}

/// Volatile access to the real machine's address space
///
/// Logical address `a` lives at `base + a` in the running program's memory.
pub struct MmioBus {
    base: usize,
    size: usize,
}

impl MmioBus {
    /// Create a bus over `size` bytes of device memory starting at `base`
    ///
    /// # Safety
    /// Caller must ensure the whole range is valid, mapped device memory for
    /// as long as the bus is used.
    pub const unsafe fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Address of `width` bytes at `addr`, or `None` if they leave the mapping
    #[inline]
    fn ptr(&self, addr: RegisterAddress, width: usize) -> Option<usize> {
        let offset = addr.get() as usize;
        if offset + width > self.size {
            log::warn!("mmio: {}-byte access at {} outside the {}-byte mapping", width, addr, self.size);
            return None;
        }
        Some(self.base + offset)
    }
}

// Accesses outside the mapping behave like an open bus: reads return zero,
// writes are dropped.
impl RegisterBus for MmioBus {
    fn read_word(&self, addr: RegisterAddress) -> Word {
        let Some(ptr) = self.ptr(addr, 2) else {
            return 0;
        };
        if ptr % 2 == 0 {
            // SAFETY: inside the mapping per `new`'s contract, aligned just checked
            unsafe { read_volatile(ptr as *const u16) }
        } else {
            // Odd-addressed registers are assembled from two byte accesses
            let lo = self.read_byte(addr) as u16;
            let hi = self.read_byte(addr.offset(1)) as u16;
            lo | (hi << 8)
        }
    }

    fn write_word(&self, addr: RegisterAddress, value: Word) {
        let Some(ptr) = self.ptr(addr, 2) else {
            return;
        };
        if ptr % 2 == 0 {
            // SAFETY: inside the mapping per `new`'s contract, aligned just checked
            unsafe { write_volatile(ptr as *mut u16, value) }
        } else {
            self.write_byte(addr, value as u8);
            self.write_byte(addr.offset(1), (value >> 8) as u8);
        }
    }

    fn read_byte(&self, addr: RegisterAddress) -> u8 {
        match self.ptr(addr, 1) {
            // SAFETY: inside the mapping per `new`'s contract
            Some(ptr) => unsafe { read_volatile(ptr as *const u8) },
            None => 0,
        }
    }

    fn write_byte(&self, addr: RegisterAddress, value: u8) {
        if let Some(ptr) = self.ptr(addr, 1) {
            // SAFETY: inside the mapping per `new`'s contract
            unsafe { write_volatile(ptr as *mut u8, value) }
        }
    }
}
