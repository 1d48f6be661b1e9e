//! The simulated machine
//!
//! All state lives behind one mutex, so every register access is atomic with
//! respect to other threads poking the machine (tests raising interrupts,
//! a host feeding the receiver queue). A condition variable wakes
//! [`WaitForInterrupt`] callers when a device raises its bit.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use slotbus_bus::{
    BusLayout, IntMask, InterruptControl, RegisterAddress, RegisterBus, SlotIndex,
    WaitForInterrupt, Word, NAME_LEN, SLOT_COUNT,
};

use crate::fs_device::{FsDevice, FsPort};
use crate::peripherals::{encode_name_word, Peripheral};
use crate::VirtualDisk;

/// How often a blocked [`WaitForInterrupt`] lets devices make progress
const STEP_INTERVAL: Duration = Duration::from_millis(5);

const RAM_SIZE: usize = 0x1_0000;

/// Where things sit in the simulated address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub layout: BusLayout,
    /// First of the six consecutive filesystem ports
    pub fs_ports: RegisterAddress,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self { layout: BusLayout::DEFAULT, fs_ports: RegisterAddress::new(0xFF10) }
    }
}

/// Machine state devices may touch: RAM, the disk and the interrupt mask
pub struct Core {
    ram: Box<[u8]>,
    disk: VirtualDisk,
    int_mask: u16,
    /// Set whenever a bit is raised, consumed when a wait returns
    edge: bool,
}

impl Core {
    fn new(disk: VirtualDisk) -> Self {
        Self { ram: vec![0u8; RAM_SIZE].into_boxed_slice(), disk, int_mask: 0, edge: false }
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn disk(&self) -> &VirtualDisk {
        &self.disk
    }

    pub fn disk_mut(&mut self) -> &mut VirtualDisk {
        &mut self.disk
    }

    /// Bytes up to (not including) a NUL found within `max + 1` bytes
    pub fn read_c_string(&self, addr: u16, max: usize) -> Option<Vec<u8>> {
        let start = addr as usize;
        let window = self.ram.get(start..RAM_SIZE.min(start + max + 1))?;
        let len = window.iter().position(|&b| b == 0)?;
        Some(window[..len].to_vec())
    }

    /// `len` bytes from `addr`, wrapping at the top of memory
    pub fn read_wrapping(&self, addr: u16, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.ram[addr.wrapping_add(i as u16) as usize]).collect()
    }

    pub fn pending(&self) -> IntMask {
        IntMask::from_bits_retain(self.int_mask)
    }

    fn raise(&mut self, slot: SlotIndex) {
        self.int_mask |= IntMask::slot(slot).bits();
        self.edge = true;
    }
}

/// What a device sees while it runs: the core plus its own slot
pub struct DeviceContext<'a> {
    pub core: &'a mut Core,
    slot: SlotIndex,
}

impl DeviceContext<'_> {
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// Set this device's bit in the interrupt mask
    pub fn raise_interrupt(&mut self) {
        log::debug!("sim: slot {} raises its interrupt", self.slot);
        self.core.raise(self.slot);
    }
}

struct State {
    config: MachineConfig,
    core: Core,
    fs: FsDevice,
    slots: [Option<Box<dyn Peripheral>>; SLOT_COUNT],
    interrupts_enabled: bool,
    unguarded_fs_commands: usize,
}

enum Target {
    Slot { slot: SlotIndex, offset: u16 },
    Mask,
    Fs(FsPort),
    Ram,
}

impl State {
    fn decode(&self, addr: RegisterAddress) -> Target {
        let layout = &self.config.layout;
        if layout.contains(addr) {
            let rel = addr.get() - layout.bus_base.get();
            let index = (rel / layout.slot_stride) as usize;
            if let Ok(slot) = SlotIndex::new(index) {
                return Target::Slot { slot, offset: rel % layout.slot_stride };
            }
        }
        if addr == layout.interrupt_mask {
            return Target::Mask;
        }
        let fs_offset = addr.get().wrapping_sub(self.config.fs_ports.get());
        if let Some(port) = FsPort::from_offset(fs_offset) {
            return Target::Fs(port);
        }
        Target::Ram
    }

    fn read_word(&self, addr: RegisterAddress) -> Word {
        match self.decode(addr) {
            Target::Slot { slot, offset } => self.read_slot(slot, offset),
            Target::Mask => self.core.int_mask,
            Target::Fs(port) => self.fs.read(port),
            Target::Ram => {
                let lo = self.core.ram[addr.get() as usize] as Word;
                let hi = self.core.ram[addr.offset(1).get() as usize] as Word;
                lo | (hi << 8)
            }
        }
    }

    fn write_word(&mut self, addr: RegisterAddress, value: Word) {
        match self.decode(addr) {
            Target::Slot { slot, offset } => self.write_slot(slot, offset, value),
            Target::Mask => {
                self.core.int_mask &= !value;
                if self.core.int_mask == 0 {
                    self.core.edge = false;
                }
            }
            Target::Fs(port) => {
                if port == FsPort::Cmd && self.interrupts_enabled {
                    log::warn!("sim: filesystem command {} issued with interrupts enabled", value);
                    self.unguarded_fs_commands += 1;
                }
                self.fs.write(port, value, &mut self.core.ram, &mut self.core.disk);
            }
            Target::Ram => {
                self.core.ram[addr.get() as usize] = value as u8;
                self.core.ram[addr.offset(1).get() as usize] = (value >> 8) as u8;
            }
        }
    }

    fn read_byte(&self, addr: RegisterAddress) -> u8 {
        match self.decode(addr) {
            Target::Slot { slot, offset } => {
                let word = self.read_slot(slot, offset & !1);
                if offset % 2 == 0 {
                    word as u8
                } else {
                    (word >> 8) as u8
                }
            }
            Target::Mask | Target::Fs(_) => self.read_word(addr) as u8,
            Target::Ram => self.core.ram[addr.get() as usize],
        }
    }

    fn write_byte(&mut self, addr: RegisterAddress, value: u8) {
        match self.decode(addr) {
            Target::Slot { slot, offset } => {
                let word_offset = offset & !1;
                let current = self.read_slot(slot, word_offset);
                let merged = if offset % 2 == 0 {
                    (current & 0xFF00) | value as Word
                } else {
                    (current & 0x00FF) | ((value as Word) << 8)
                };
                self.write_slot(slot, word_offset, merged);
            }
            Target::Mask | Target::Fs(_) => self.write_word(addr, value as Word),
            Target::Ram => self.core.ram[addr.get() as usize] = value,
        }
    }

    fn read_slot(&self, slot: SlotIndex, offset: u16) -> Word {
        let Some(device) = &self.slots[slot.get()] else {
            return 0;
        };
        let name_offset = self.config.layout.name_offset;
        if (name_offset..name_offset + NAME_LEN as u16).contains(&offset) {
            return encode_name_word(&device.name(), offset - name_offset);
        }
        device.read_word(offset)
    }

    fn write_slot(&mut self, slot: SlotIndex, offset: u16, value: Word) {
        let name_offset = self.config.layout.name_offset;
        if (name_offset..name_offset + NAME_LEN as u16).contains(&offset) {
            return;
        }
        if let Some(device) = &mut self.slots[slot.get()] {
            let mut ctx = DeviceContext { core: &mut self.core, slot };
            device.write_word(offset, value, &mut ctx);
        }
    }

    fn step_devices(&mut self) {
        for (slot, device) in SlotIndex::all().zip(self.slots.iter_mut()) {
            if let Some(device) = device {
                let mut ctx = DeviceContext { core: &mut self.core, slot };
                device.step(&mut ctx);
            }
        }
    }

    /// A bit was raised since the last wait returned and is still pending
    ///
    /// Bits left set for another handler do not wake a waiter again.
    fn interrupt_ready(&self) -> bool {
        self.interrupts_enabled && self.core.edge && self.core.int_mask != 0
    }

    /// Consume the pending edge if an interrupt is ready
    fn take_interrupt(&mut self) -> bool {
        let ready = self.interrupt_ready();
        if ready {
            self.core.edge = false;
        }
        ready
    }
}

/// A complete simulated machine
pub struct Machine {
    config: MachineConfig,
    state: Mutex<State>,
    wake: Condvar,
}

impl Machine {
    /// Default memory map, empty bus, empty disk
    pub fn new() -> Self {
        Self::build(MachineConfig::default(), VirtualDisk::new())
    }

    pub fn with_config(config: MachineConfig, disk: VirtualDisk) -> slotbus_bus::Result<Self> {
        config.layout.validate()?;
        Ok(Self::build(config, disk))
    }

    fn build(config: MachineConfig, disk: VirtualDisk) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                config,
                core: Core::new(disk),
                fs: FsDevice::default(),
                slots: Default::default(),
                interrupts_enabled: false,
                unguarded_fs_commands: 0,
            }),
            wake: Condvar::new(),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Put a device into `slot`, returning whatever was there
    pub fn plug<P: Peripheral + 'static>(&self, slot: SlotIndex, device: P) -> Option<Box<dyn Peripheral>> {
        log::debug!("sim: {} plugged into slot {}", device.name(), slot);
        self.lock().slots[slot.get()].replace(Box::new(device))
    }

    pub fn unplug(&self, slot: SlotIndex) -> Option<Box<dyn Peripheral>> {
        self.lock().slots[slot.get()].take()
    }

    /// Set a slot's pending bit as if its device had raised it
    pub fn raise_interrupt(&self, slot: SlotIndex) {
        self.lock().core.raise(slot);
        self.wake.notify_all();
    }

    pub fn pending(&self) -> IntMask {
        self.lock().core.pending()
    }

    /// Give every device one chance to make progress
    pub fn step(&self) {
        self.lock().step_devices();
        self.wake.notify_all();
    }

    /// Run `f` against the core with the machine locked
    pub fn with_core<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        let result = f(&mut self.lock().core);
        self.wake.notify_all();
        result
    }

    pub fn with_disk<R>(&self, f: impl FnOnce(&mut VirtualDisk) -> R) -> R {
        self.with_core(|core| f(core.disk_mut()))
    }

    /// Filesystem commands that were issued while interrupts were enabled
    pub fn unguarded_fs_commands(&self) -> usize {
        self.lock().unguarded_fs_commands
    }

    /// Programs started through ExecWait, oldest first
    pub fn exec_log(&self) -> Vec<String> {
        self.lock().fs.exec_log().to_vec()
    }

    /// Like [`WaitForInterrupt::wait_for_interrupt`] but gives up after
    /// `timeout`; returns whether an interrupt is ready
    pub fn wait_for_interrupt_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            state.step_devices();
            if state.take_interrupt() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self.park(state, STEP_INTERVAL.min(deadline - now));
        }
    }

    fn park<'a>(&self, guard: MutexGuard<'a, State>, timeout: Duration) -> MutexGuard<'a, State> {
        match self.wake.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for Machine {
    fn read_word(&self, addr: RegisterAddress) -> Word {
        self.lock().read_word(addr)
    }

    fn write_word(&self, addr: RegisterAddress, value: Word) {
        self.lock().write_word(addr, value);
        self.wake.notify_all();
    }

    fn read_byte(&self, addr: RegisterAddress) -> u8 {
        self.lock().read_byte(addr)
    }

    fn write_byte(&self, addr: RegisterAddress, value: u8) {
        self.lock().write_byte(addr, value);
    }
}

impl InterruptControl for Machine {
    fn interrupts_enabled(&self) -> bool {
        self.lock().interrupts_enabled
    }

    fn set_interrupts_enabled(&self, enabled: bool) {
        self.lock().interrupts_enabled = enabled;
        if enabled {
            self.wake.notify_all();
        }
    }
}

impl WaitForInterrupt for Machine {
    fn wait_for_interrupt(&self) {
        let mut state = self.lock();
        loop {
            state.step_devices();
            if state.take_interrupt() {
                return;
            }
            state = self.park(state, STEP_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotbus_bus::{find_peripheral, PeripheralName};

    struct Recorder {
        last: Option<(u16, Word)>,
    }

    impl Peripheral for Recorder {
        fn name(&self) -> PeripheralName {
            PeripheralName::from_static(b"RECORD")
        }

        fn read_word(&self, offset: u16) -> Word {
            match self.last {
                Some((o, v)) if o == offset => v,
                _ => 0,
            }
        }

        fn write_word(&mut self, offset: u16, value: Word, ctx: &mut DeviceContext<'_>) {
            self.last = Some((offset, value));
            if offset == 0 {
                ctx.raise_interrupt();
            }
        }
    }

    fn slot(i: usize) -> SlotIndex {
        SlotIndex::new(i).unwrap()
    }

    #[test]
    fn test_ram_is_little_endian() {
        let m = Machine::new();
        m.write_word(RegisterAddress::new(0x1000), 0xBEEF);
        assert_eq!(m.read_byte(RegisterAddress::new(0x1000)), 0xEF);
        assert_eq!(m.read_byte(RegisterAddress::new(0x1001)), 0xBE);
    }

    #[test]
    fn test_empty_slots_read_zero_and_ignore_writes() {
        let m = Machine::new();
        let addr = RegisterAddress::new(0xFC30);
        m.write_word(addr, 0x1234);
        assert_eq!(m.read_word(addr), 0);
    }

    #[test]
    fn test_name_field_encodes_device_name() {
        let m = Machine::new();
        m.plug(slot(4), Recorder { last: None });
        // "PR" little-endian
        assert_eq!(m.read_word(RegisterAddress::new(0xFC48)), u16::from_le_bytes(*b"PR"));
        assert_eq!(m.read_byte(RegisterAddress::new(0xFC4C)), b'E');
        assert_eq!(m.read_byte(RegisterAddress::new(0xFC4D)), 0);

        let handle = find_peripheral(&m, &BusLayout::DEFAULT, &PeripheralName::from_static(b"RECORD")).unwrap();
        assert_eq!(handle.slot(), slot(4));
    }

    #[test]
    fn test_device_registers_routed_by_offset() {
        let m = Machine::new();
        m.plug(slot(1), Recorder { last: None });
        m.write_word(RegisterAddress::new(0xFC14), 77);
        assert_eq!(m.read_word(RegisterAddress::new(0xFC14)), 77);
        assert!(m.pending().is_empty());

        m.write_word(RegisterAddress::new(0xFC10), 1);
        assert_eq!(m.pending(), IntMask::SLOT1);
    }

    #[test]
    fn test_mask_write_clears_only_written_bits() {
        let m = Machine::new();
        m.raise_interrupt(slot(3));
        m.raise_interrupt(slot(7));
        let mask = BusLayout::DEFAULT.interrupt_mask;
        assert_eq!(m.read_word(mask), (1 << 3) | (1 << 7));

        m.write_word(mask, 1 << 3);
        assert_eq!(m.read_word(mask), 1 << 7);
    }

    #[test]
    fn test_fs_commands_counted_when_unguarded() {
        let m = Machine::new();
        m.set_interrupts_enabled(true);
        m.write_word(RegisterAddress::new(0xFF10), 6);
        assert_eq!(m.unguarded_fs_commands(), 1);

        m.set_interrupts_enabled(false);
        m.write_word(RegisterAddress::new(0xFF10), 6);
        assert_eq!(m.unguarded_fs_commands(), 1);
    }

    #[test]
    fn test_wait_requires_enabled_interrupts() {
        let m = Machine::new();
        m.raise_interrupt(slot(2));
        assert!(!m.wait_for_interrupt_timeout(Duration::from_millis(20)));

        m.set_interrupts_enabled(true);
        assert!(m.wait_for_interrupt_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_bit_left_pending_does_not_wake_again() {
        let m = Machine::new();
        m.set_interrupts_enabled(true);
        m.raise_interrupt(slot(7));
        assert!(m.wait_for_interrupt_timeout(Duration::from_millis(20)));

        // Nobody clears slot 7, so the next wait must block until it times out
        assert!(!m.wait_for_interrupt_timeout(Duration::from_millis(20)));
        assert_eq!(m.pending(), IntMask::SLOT7);

        m.raise_interrupt(slot(3));
        assert!(m.wait_for_interrupt_timeout(Duration::from_millis(20)));
        m.write_word(BusLayout::DEFAULT.interrupt_mask, 1 << 3);
        assert!(!m.wait_for_interrupt_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_wakes_on_interrupt_from_another_thread() {
        let m = std::sync::Arc::new(Machine::new());
        m.set_interrupts_enabled(true);
        let raiser = {
            let m = m.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                m.raise_interrupt(SlotIndex::new(9).unwrap());
            })
        };
        m.wait_for_interrupt();
        assert!(m.pending().is_pending(slot(9)));
        raiser.join().unwrap();
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let config = MachineConfig {
            layout: BusLayout { slot_stride: 4, ..BusLayout::DEFAULT },
            ..MachineConfig::default()
        };
        assert!(Machine::with_config(config, VirtualDisk::new()).is_err());
    }
}
