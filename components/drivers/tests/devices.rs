//! Camera, sender and receiver drivers against the simulated machine

use slotbus_bus::{find_peripheral, BusLayout, IntMask, RegisterAddress, SlotIndex};
use slotbus_drivers::camera::{CAMERA, FRAME_HEIGHT, FRAME_WIDTH};
use slotbus_drivers::sender::MSGSNDR;
use slotbus_drivers::{Camera, DriverError, MessageReceiver, MessageSender, Scratch};
use slotbus_sim::peripherals::{
    camera::test_card_pixel, enqueue_message, CameraDevice, Envelope, MessageReceiverDevice,
    MessageSenderDevice, QUEUE_FILE,
};
use slotbus_sim::Machine;

fn slot(i: usize) -> SlotIndex {
    SlotIndex::new(i).unwrap()
}

fn populated() -> Machine {
    let machine = Machine::new();
    machine.plug(slot(0), MessageReceiverDevice::new());
    machine.plug(slot(2), CameraDevice::new());
    let (sender, _outbox) = MessageSenderDevice::new();
    machine.plug(slot(5), sender);
    machine
}

#[test]
fn test_discovery() {
    let machine = populated();
    let layout = BusLayout::DEFAULT;

    assert_eq!(find_peripheral(&machine, &layout, &CAMERA).unwrap().slot(), slot(2));
    let sender = find_peripheral(&machine, &layout, &MSGSNDR).unwrap();
    assert_eq!(sender.slot(), slot(5));
    assert_eq!(sender.base(), RegisterAddress::new(0xFC50));
    assert_eq!(MessageReceiver::find(&machine, &layout).unwrap().slot(), slot(0));
}

#[test]
fn test_discovery_sees_hot_swap() {
    let machine = populated();
    let layout = BusLayout::DEFAULT;

    machine.unplug(slot(2));
    assert!(matches!(Camera::find(&machine, &layout), Err(DriverError::Bus(_))));

    machine.plug(slot(9), CameraDevice::new());
    assert_eq!(Camera::find(&machine, &layout).unwrap().handle().slot(), slot(9));
}

#[test]
fn test_camera_capture_fills_buffer() {
    let machine = populated();
    let camera = Camera::find(&machine, &BusLayout::DEFAULT).unwrap();
    let buffer = RegisterAddress::new(0x8000);

    camera.capture_frame(buffer);

    let (w, h) = (FRAME_WIDTH as usize, FRAME_HEIGHT as usize);
    machine.with_core(|core| {
        let frame = &core.ram()[0x8000..0x8000 + w * h];
        assert_eq!(frame[0], test_card_pixel(0, 0, w, h));
        assert_eq!(frame[w - 1], test_card_pixel(w - 1, 0, w, h));
        assert_eq!(frame[w * h - 1], test_card_pixel(w - 1, h - 1, w, h));
    });
    assert_eq!(machine.pending(), IntMask::SLOT2);
}

#[test]
fn test_camera_custom_size() {
    let machine = populated();
    let camera = Camera::find(&machine, &BusLayout::DEFAULT).unwrap();

    camera.capture(RegisterAddress::new(0x9000), 4, 2);
    machine.with_core(|core| {
        let ram = core.ram();
        for y in 0..2 {
            for x in 0..4 {
                assert_eq!(ram[0x9000 + y * 4 + x], test_card_pixel(x, y, 4, 2));
            }
        }
        assert_eq!(ram[0x9008], 0);
    });
}

#[test]
fn test_sender_dispatches_staged_message() {
    let machine = Machine::new();
    let (device, outbox) = MessageSenderDevice::new();
    machine.plug(slot(5), device);
    let sender = MessageSender::find(&machine, &BusLayout::DEFAULT).unwrap();

    sender.send_staged(&Scratch::DEFAULT, "earth", b"status:ok").unwrap();

    assert_eq!(
        outbox.try_recv().unwrap(),
        Envelope { recipient: "earth".to_string(), body: b"status:ok".to_vec() }
    );
    assert!(outbox.try_recv().is_err());
}

#[test]
fn test_sender_rejects_bad_input() {
    let machine = Machine::new();
    let (device, outbox) = MessageSenderDevice::new();
    machine.plug(slot(5), device);
    let sender = MessageSender::find(&machine, &BusLayout::DEFAULT).unwrap();

    assert_eq!(sender.send_staged(&Scratch::DEFAULT, "", b"x"), Err(DriverError::InvalidRecipient));
    assert_eq!(
        sender.send_staged(&Scratch::DEFAULT, "ea\0rth", b"x"),
        Err(DriverError::InvalidRecipient)
    );

    let small = Scratch { capacity: 24, ..Scratch::DEFAULT };
    assert_eq!(
        sender.send_staged(&small, "earth", &[0u8; 20]),
        Err(DriverError::BufferTooSmall { size: 26, capacity: 24 })
    );
    assert!(outbox.try_recv().is_err());
}

#[test]
fn test_receiver_acknowledge_advances_queue() {
    let machine = populated();
    machine.with_disk(|disk| {
        enqueue_message(disk, b"earth", b"one").unwrap();
        enqueue_message(disk, b"earth", b"two").unwrap();
    });
    let receiver = MessageReceiver::find(&machine, &BusLayout::DEFAULT).unwrap();

    machine.step();
    assert_eq!(machine.pending(), IntMask::SLOT0);
    machine.with_disk(|disk| assert_eq!(disk.read("INBOX.MSG").unwrap(), b"one"));

    receiver.acknowledge();
    machine.step();
    machine.with_disk(|disk| assert_eq!(disk.read("INBOX.MSG").unwrap(), b"two"));

    receiver.acknowledge();
    machine.with_disk(|disk| assert!(!disk.exists(QUEUE_FILE)));
}
