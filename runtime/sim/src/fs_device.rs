//! Filesystem device behind the six global ports

use slotbus_bus::Word;

use crate::clock::Timestamp;
use crate::{DiskError, VirtualDisk};

const STATUS_SUCCESS: Word = 0;
const STATUS_NOT_FOUND: Word = 1;
const STATUS_FULL: Word = 2;
const STATUS_INVALID_NAME: Word = 3;
const STATUS_OUT_OF_BOUNDS: Word = 4;
const STATUS_DIR_END: Word = 5;

/// Filenames are read as at most this many bytes plus a terminator
const NAME_MAX: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FsPort {
    Cmd,
    Name,
    Buf,
    Size,
    Stat,
    SizeHigh,
}

impl FsPort {
    pub(crate) fn from_offset(offset: u16) -> Option<Self> {
        Some(match offset {
            0 => FsPort::Cmd,
            1 => FsPort::Name,
            2 => FsPort::Buf,
            3 => FsPort::Size,
            4 => FsPort::Stat,
            5 => FsPort::SizeHigh,
            _ => return None,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct FsDevice {
    name_ptr: Word,
    buf_ptr: Word,
    length: Word,
    status: Word,
    free_high: Word,
    /// Sorted snapshot and cursor of the listing in progress
    listing: Option<(Vec<String>, usize)>,
    exec_log: Vec<String>,
}

impl FsDevice {
    pub(crate) fn read(&self, port: FsPort) -> Word {
        match port {
            FsPort::Cmd => 0,
            FsPort::Name => self.name_ptr,
            FsPort::Buf => self.buf_ptr,
            FsPort::Size => self.length,
            FsPort::Stat => self.status,
            FsPort::SizeHigh => self.free_high,
        }
    }

    pub(crate) fn write(&mut self, port: FsPort, value: Word, ram: &mut [u8], disk: &mut VirtualDisk) {
        match port {
            FsPort::Cmd => self.execute(value, ram, disk),
            FsPort::Name => self.name_ptr = value,
            FsPort::Buf => self.buf_ptr = value,
            FsPort::Size => self.length = value,
            FsPort::Stat => self.status = value,
            FsPort::SizeHigh => self.free_high = value,
        }
    }

    /// Programs started through ExecWait, oldest first
    pub(crate) fn exec_log(&self) -> &[String] {
        &self.exec_log
    }

    fn execute(&mut self, command: Word, ram: &mut [u8], disk: &mut VirtualDisk) {
        let status = match command {
            1 => self.read_file(ram, disk),
            2 => self.write_file(ram, disk),
            3 => self.size(ram, disk),
            4 => self.delete(ram, disk),
            5 => self.list_next(ram, disk),
            6 => self.free_space(disk),
            7 => self.meta(ram, disk),
            8 => self.exec_wait(ram, disk),
            other => {
                log::warn!("sim: unknown filesystem command {}", other);
                return;
            }
        };
        log::debug!("sim: fs command {} -> status {}", command, status);
        self.status = status;
    }

    fn read_file(&mut self, ram: &mut [u8], disk: &mut VirtualDisk) -> Word {
        let Some(name) = read_name(ram, self.name_ptr) else {
            return STATUS_INVALID_NAME;
        };
        match disk.read(&name) {
            Ok(data) => {
                if copy_to_ram(ram, self.buf_ptr, data) {
                    STATUS_SUCCESS
                } else {
                    STATUS_OUT_OF_BOUNDS
                }
            }
            Err(err) => lookup_status(&err),
        }
    }

    fn write_file(&mut self, ram: &mut [u8], disk: &mut VirtualDisk) -> Word {
        let Some(name) = read_name(ram, self.name_ptr) else {
            return STATUS_INVALID_NAME;
        };
        let Some(data) = copy_from_ram(ram, self.buf_ptr, self.length) else {
            return STATUS_OUT_OF_BOUNDS;
        };
        match disk.write(&name, data) {
            Ok(()) => STATUS_SUCCESS,
            Err(DiskError::QuotaExceeded) => STATUS_FULL,
            Err(_) => STATUS_INVALID_NAME,
        }
    }

    fn size(&mut self, ram: &mut [u8], disk: &mut VirtualDisk) -> Word {
        let Some(name) = read_name(ram, self.name_ptr) else {
            return STATUS_INVALID_NAME;
        };
        match disk.size(&name) {
            Ok(size) => {
                self.length = size as Word;
                STATUS_SUCCESS
            }
            Err(err) => lookup_status(&err),
        }
    }

    fn delete(&mut self, ram: &mut [u8], disk: &mut VirtualDisk) -> Word {
        let Some(name) = read_name(ram, self.name_ptr) else {
            return STATUS_INVALID_NAME;
        };
        match disk.delete(&name) {
            Ok(()) => STATUS_SUCCESS,
            Err(err) => lookup_status(&err),
        }
    }

    fn list_next(&mut self, ram: &mut [u8], disk: &mut VirtualDisk) -> Word {
        let (names, cursor) = self.listing.get_or_insert_with(|| (disk.list(), 0));
        if *cursor >= names.len() {
            self.listing = None;
            return STATUS_DIR_END;
        }

        let mut record = names[*cursor].as_bytes().to_vec();
        record.push(0);
        if !copy_to_ram(ram, self.buf_ptr, &record) {
            return STATUS_OUT_OF_BOUNDS;
        }
        *cursor += 1;
        STATUS_SUCCESS
    }

    fn free_space(&mut self, disk: &VirtualDisk) -> Word {
        let free = disk.free_space();
        self.length = (free & 0xFFFF) as Word;
        self.free_high = ((free >> 16) & 0xFFFF) as Word;
        STATUS_SUCCESS
    }

    fn meta(&mut self, ram: &mut [u8], disk: &VirtualDisk) -> Word {
        let Some(name) = read_name(ram, self.name_ptr) else {
            return STATUS_INVALID_NAME;
        };
        let Ok((created, modified)) = disk.meta(&name) else {
            return STATUS_NOT_FOUND;
        };

        let mut record = Vec::with_capacity(24);
        for time in [created, modified] {
            for word in Timestamp::from_system_time(time).words() {
                record.extend_from_slice(&word.to_le_bytes());
            }
        }
        if copy_to_ram(ram, self.buf_ptr, &record) {
            STATUS_SUCCESS
        } else {
            STATUS_OUT_OF_BOUNDS
        }
    }

    fn exec_wait(&mut self, ram: &mut [u8], disk: &VirtualDisk) -> Word {
        let Some(name) = read_name(ram, self.name_ptr) else {
            return STATUS_INVALID_NAME;
        };
        if disk.read(&name).is_err() {
            return STATUS_NOT_FOUND;
        }
        log::info!("sim: exec {}", name);
        self.exec_log.push(name);
        STATUS_SUCCESS
    }
}

fn lookup_status(err: &DiskError) -> Word {
    match err {
        DiskError::NotFound => STATUS_NOT_FOUND,
        _ => STATUS_INVALID_NAME,
    }
}

/// NUL-terminated name of at most [`NAME_MAX`] bytes
fn read_name(ram: &[u8], ptr: Word) -> Option<String> {
    let start = ptr as usize;
    let window = ram.get(start..ram.len().min(start + NAME_MAX + 1))?;
    let len = window.iter().position(|&b| b == 0)?;
    String::from_utf8(window[..len].to_vec()).ok()
}

fn copy_to_ram(ram: &mut [u8], dst: Word, data: &[u8]) -> bool {
    let start = dst as usize;
    match ram.get_mut(start..start + data.len()) {
        Some(window) => {
            window.copy_from_slice(data);
            true
        }
        None => false,
    }
}

fn copy_from_ram(ram: &[u8], src: Word, len: Word) -> Option<&[u8]> {
    let start = src as usize;
    ram.get(start..start + len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: Word = 0x1000;
    const BUF: Word = 0x2000;

    struct Rig {
        dev: FsDevice,
        ram: Vec<u8>,
        disk: VirtualDisk,
    }

    impl Rig {
        fn new() -> Self {
            let mut dev = FsDevice::default();
            dev.name_ptr = NAME;
            dev.buf_ptr = BUF;
            Self { dev, ram: vec![0; 0x1_0000], disk: VirtualDisk::new() }
        }

        fn name(&mut self, name: &[u8]) {
            let start = NAME as usize;
            self.ram[start..start + name.len()].copy_from_slice(name);
            self.ram[start + name.len()] = 0;
        }

        fn run(&mut self, command: Word) -> Word {
            self.dev.write(FsPort::Cmd, command, &mut self.ram, &mut self.disk);
            self.dev.read(FsPort::Stat)
        }
    }

    #[test]
    fn test_write_then_read() {
        let mut rig = Rig::new();
        rig.name(b"TEST.TXT");
        rig.ram[BUF as usize..BUF as usize + 6].copy_from_slice(b"HELLO\0");
        rig.dev.length = 6;
        assert_eq!(rig.run(2), STATUS_SUCCESS);

        rig.ram[BUF as usize..BUF as usize + 6].fill(0);
        assert_eq!(rig.run(1), STATUS_SUCCESS);
        assert_eq!(&rig.ram[BUF as usize..BUF as usize + 6], b"HELLO\0");

        assert_eq!(rig.run(3), STATUS_SUCCESS);
        assert_eq!(rig.dev.read(FsPort::Size), 6);
    }

    #[test]
    fn test_name_without_terminator_is_invalid() {
        let mut rig = Rig::new();
        rig.ram[NAME as usize..NAME as usize + 17].fill(b'A');
        assert_eq!(rig.run(3), STATUS_INVALID_NAME);
    }

    #[test]
    fn test_missing_file_statuses() {
        let mut rig = Rig::new();
        rig.name(b"NOPE.TXT");
        assert_eq!(rig.run(1), STATUS_NOT_FOUND);
        assert_eq!(rig.run(3), STATUS_NOT_FOUND);
        assert_eq!(rig.run(4), STATUS_NOT_FOUND);
        assert_eq!(rig.run(7), STATUS_NOT_FOUND);
        assert_eq!(rig.run(8), STATUS_NOT_FOUND);
    }

    #[test]
    fn test_bad_disk_name_maps_to_invalid() {
        let mut rig = Rig::new();
        rig.name(b"BAD NAME");
        assert_eq!(rig.run(1), STATUS_INVALID_NAME);
        rig.dev.length = 1;
        assert_eq!(rig.run(2), STATUS_INVALID_NAME);
    }

    #[test]
    fn test_read_past_end_of_memory() {
        let mut rig = Rig::new();
        rig.disk.write("BIG.BIN", &[7; 64]).unwrap();
        rig.name(b"BIG.BIN");
        rig.dev.buf_ptr = 0xFFF0;
        assert_eq!(rig.run(1), STATUS_OUT_OF_BOUNDS);
    }

    #[test]
    fn test_listing_restarts_after_dir_end() {
        let mut rig = Rig::new();
        rig.disk.write("B.TXT", b"b").unwrap();
        rig.disk.write("A.TXT", b"a").unwrap();

        for _ in 0..2 {
            assert_eq!(rig.run(5), STATUS_SUCCESS);
            assert_eq!(&rig.ram[BUF as usize..BUF as usize + 6], b"A.TXT\0");
            assert_eq!(rig.run(5), STATUS_SUCCESS);
            assert_eq!(&rig.ram[BUF as usize..BUF as usize + 6], b"B.TXT\0");
            assert_eq!(rig.run(5), STATUS_DIR_END);
        }
    }

    #[test]
    fn test_free_space_split() {
        let mut rig = Rig::new();
        assert_eq!(rig.run(6), STATUS_SUCCESS);
        let free = (rig.dev.read(FsPort::SizeHigh) as usize) << 16 | rig.dev.read(FsPort::Size) as usize;
        assert_eq!(free, crate::MAX_DISK_BYTES);
    }

    #[test]
    fn test_exec_wait_records_program() {
        let mut rig = Rig::new();
        rig.disk.write("PROG.BIN", &[0x90]).unwrap();
        rig.name(b"PROG.BIN");
        assert_eq!(rig.run(8), STATUS_SUCCESS);
        assert_eq!(rig.dev.exec_log(), ["PROG.BIN".to_string()]);
    }

    #[test]
    fn test_unknown_command_keeps_status() {
        let mut rig = Rig::new();
        rig.name(b"NOPE.TXT");
        assert_eq!(rig.run(3), STATUS_NOT_FOUND);
        assert_eq!(rig.run(99), STATUS_NOT_FOUND);
    }
}
