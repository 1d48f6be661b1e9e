//! Cost of a full slot-table scan

use std::cell::RefCell;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use slotbus_bus::{find_peripheral, BusLayout, PeripheralName, RegisterAddress, RegisterBus, Word};

struct ArrayBus(RefCell<Vec<u8>>);

impl ArrayBus {
    fn with_names(names: &[(usize, &[u8])]) -> Self {
        let bus = ArrayBus(RefCell::new(vec![0; 0x1_0000]));
        for &(slot, name) in names {
            let addr = 0xFC00 + slot as u16 * 16 + 8;
            bus.write_bytes(RegisterAddress::new(addr), name);
        }
        bus
    }
}

impl RegisterBus for ArrayBus {
    fn read_word(&self, addr: RegisterAddress) -> Word {
        let mem = self.0.borrow();
        let a = addr.get() as usize;
        mem[a] as u16 | (mem[(a + 1) & 0xFFFF] as u16) << 8
    }

    fn write_word(&self, addr: RegisterAddress, value: Word) {
        let mut mem = self.0.borrow_mut();
        let a = addr.get() as usize;
        mem[a] = value as u8;
        mem[(a + 1) & 0xFFFF] = (value >> 8) as u8;
    }

    fn read_byte(&self, addr: RegisterAddress) -> u8 {
        self.0.borrow()[addr.get() as usize]
    }

    fn write_byte(&self, addr: RegisterAddress, value: u8) {
        self.0.borrow_mut()[addr.get() as usize] = value;
    }
}

fn bench_discovery(c: &mut Criterion) {
    let layout = BusLayout::default();
    let bus = ArrayBus::with_names(&[(0, b"MSGRECV"), (2, b"CAMERA"), (15, b"MSGSNDR")]);
    let first = PeripheralName::from_static(b"MSGRECV");
    let last = PeripheralName::from_static(b"MSGSNDR");
    let absent = PeripheralName::from_static(b"NOSUCH");

    c.bench_function("discovery_first_slot", |b| {
        b.iter(|| find_peripheral(&bus, &layout, black_box(&first)))
    });
    c.bench_function("discovery_last_slot", |b| {
        b.iter(|| find_peripheral(&bus, &layout, black_box(&last)))
    });
    c.bench_function("discovery_miss", |b| {
        b.iter(|| find_peripheral(&bus, &layout, black_box(&absent)))
    });
}

criterion_group!(benches, bench_discovery);
criterion_main!(benches);
