//! Filesystem driver
//!
//! # Register interface
//! Six global ports, independent of the slot table:
//!
//! | Port | Meaning |
//! |---|---|
//! | CMD | command code, writing it runs the command |
//! | NAME | pointer to a NUL-terminated filename |
//! | BUF | pointer to the data buffer |
//! | SIZE | byte count (low word for FreeSpace) |
//! | STAT | result of the last command |
//! | SIZE_H | high word of FreeSpace |
//!
//! NAME and BUF point into machine memory, so the driver owns a [`Scratch`]
//! region and copies filenames and payloads through it.
//!
//! # Interrupt safety
//! The ports are shared with the interrupt handler. Every exchange, together
//! with the follow-up reads of SIZE and SIZE_H and the copy out of the
//! scratch buffer, runs inside [`without_interrupts`].

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use slotbus_bus::{
    without_interrupts, CommandExchange, InterruptControl, RegisterAddress, RegisterBus,
    RegisterPort, Status, Word,
};

use crate::{DriverError, Result};

/// Longest filename the device accepts, excluding the terminator
pub const FILE_NAME_MAX: usize = 16;

/// Bytes the device writes for GetMeta: 12 little-endian words
pub const META_LEN: usize = 24;

/// Longest listed name the driver will pull out of the scratch buffer
const LIST_NAME_MAX: usize = 32;

/// Filesystem command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FsCommand {
    Read = 1,
    Write = 2,
    Size = 3,
    Delete = 4,
    List = 5,
    FreeSpace = 6,
    GetMeta = 7,
    ExecWait = 8,
}

impl FsCommand {
    pub const fn code(self) -> Word {
        self as Word
    }
}

/// Decoded STAT register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsStatus {
    Success,
    NotFound,
    Full,
    InvalidName,
    OutOfBounds,
    DirEnd,
    /// A code outside the documented table, kept verbatim
    Unknown(Word),
}

impl FsStatus {
    pub const fn code(self) -> Word {
        match self {
            FsStatus::Success => 0,
            FsStatus::NotFound => 1,
            FsStatus::Full => 2,
            FsStatus::InvalidName => 3,
            FsStatus::OutOfBounds => 4,
            FsStatus::DirEnd => 5,
            FsStatus::Unknown(code) => code,
        }
    }
}

impl From<Status> for FsStatus {
    fn from(status: Status) -> Self {
        match status.code() {
            0 => FsStatus::Success,
            1 => FsStatus::NotFound,
            2 => FsStatus::Full,
            3 => FsStatus::InvalidName,
            4 => FsStatus::OutOfBounds,
            5 => FsStatus::DirEnd,
            code => FsStatus::Unknown(code),
        }
    }
}

impl fmt::Display for FsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsStatus::Success => write!(f, "success"),
            FsStatus::NotFound => write!(f, "not found"),
            FsStatus::Full => write!(f, "disk full"),
            FsStatus::InvalidName => write!(f, "invalid name"),
            FsStatus::OutOfBounds => write!(f, "out of bounds"),
            FsStatus::DirEnd => write!(f, "end of directory"),
            FsStatus::Unknown(code) => write!(f, "unknown status {}", code),
        }
    }
}

/// Addresses of the six filesystem ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct FsPorts {
    pub cmd: RegisterAddress,
    pub name: RegisterAddress,
    pub buf: RegisterAddress,
    pub size: RegisterAddress,
    pub stat: RegisterAddress,
    pub size_high: RegisterAddress,
}

impl FsPorts {
    pub const DEFAULT: Self = Self {
        cmd: RegisterAddress::new(0xFF10),
        name: RegisterAddress::new(0xFF11),
        buf: RegisterAddress::new(0xFF12),
        size: RegisterAddress::new(0xFF13),
        stat: RegisterAddress::new(0xFF14),
        size_high: RegisterAddress::new(0xFF15),
    };
}

impl Default for FsPorts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Machine memory the driver stages names and payloads in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct Scratch {
    /// Filename staging area, `FILE_NAME_MAX + 1` bytes
    pub name: RegisterAddress,
    /// Payload buffer
    pub data: RegisterAddress,
    /// Size of the payload buffer in bytes
    pub capacity: u16,
}

impl Scratch {
    pub const DEFAULT: Self = Self {
        name: RegisterAddress::new(0x6000),
        data: RegisterAddress::new(0x6020),
        capacity: 0x4000,
    };

    /// Check that both regions fit in the address space and do not overlap
    pub fn validate(&self) -> Result<()> {
        let name_start = self.name.get() as usize;
        let name_end = name_start + FILE_NAME_MAX + 1;
        let data_start = self.data.get() as usize;
        let data_end = data_start + self.capacity as usize;

        if (self.capacity as usize) < META_LEN {
            return Err(DriverError::InvalidScratch("data region smaller than a metadata record"));
        }
        if name_end > 0x1_0000 || data_end > 0x1_0000 {
            return Err(DriverError::InvalidScratch("region runs past the address space"));
        }
        if name_start < data_end && data_start < name_end {
            return Err(DriverError::InvalidScratch("name and data regions overlap"));
        }
        Ok(())
    }
}

impl Default for Scratch {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Extended-precision free byte count, as reported in SIZE / SIZE_H
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpace {
    pub low: Word,
    pub high: Word,
}

impl FreeSpace {
    pub fn bytes(&self) -> u32 {
        ((self.high as u32) << 16) | self.low as u32
    }
}

/// Calendar timestamp as reported by GetMeta
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileTime {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl FileTime {
    fn from_words(words: &[Word]) -> Self {
        Self {
            year: words[0],
            month: words[1],
            day: words[2],
            hour: words[3],
            minute: words[4],
            second: words[5],
        }
    }
}

impl fmt::Display for FileTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Creation and modification times of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub created: FileTime,
    pub modified: FileTime,
}

impl FileMeta {
    /// Decode the 24-byte GetMeta record
    pub fn from_record(record: &[u8; META_LEN]) -> Self {
        let mut words = [0 as Word; META_LEN / 2];
        for (word, pair) in words.iter_mut().zip(record.chunks_exact(2)) {
            *word = Word::from_le_bytes([pair[0], pair[1]]);
        }
        Self {
            created: FileTime::from_words(&words[..6]),
            modified: FileTime::from_words(&words[6..]),
        }
    }
}

/// Driver for the filesystem device
pub struct Filesystem<'b, B: ?Sized> {
    bus: &'b B,
    ports: FsPorts,
    scratch: Scratch,
}

impl<'b, B: RegisterBus + InterruptControl + ?Sized> Filesystem<'b, B> {
    pub fn new(bus: &'b B, ports: FsPorts, scratch: Scratch) -> Result<Self> {
        scratch.validate()?;
        Ok(Self { bus, ports, scratch })
    }

    pub fn ports(&self) -> &FsPorts {
        &self.ports
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Read a whole file
    ///
    /// Sizes the file first and refuses to issue the Read command when the
    /// content would overflow the scratch buffer.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        without_interrupts(self.bus, || {
            let len = self.load(name, self.scratch.capacity as usize)?;
            let mut data = alloc::vec![0u8; len];
            self.bus.read_bytes(self.scratch.data, &mut data);
            Ok(data)
        })
    }

    /// Read a whole file into `buf`, returning its length
    pub fn read_into(&self, name: &str, buf: &mut [u8]) -> Result<usize> {
        let limit = buf.len().min(self.scratch.capacity as usize);
        without_interrupts(self.bus, || {
            let len = self.load(name, limit)?;
            self.bus.read_bytes(self.scratch.data, &mut buf[..len]);
            Ok(len)
        })
    }

    /// Create or replace a file
    pub fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        if data.len() > self.scratch.capacity as usize {
            return Err(DriverError::BufferTooSmall {
                size: data.len(),
                capacity: self.scratch.capacity as usize,
            });
        }
        without_interrupts(self.bus, || {
            self.stage_name(name)?;
            self.bus.write_bytes(self.scratch.data, data);
            let status = self.exchange(FsCommand::Write, Some(data.len() as Word));
            Self::check(FsCommand::Write, status)
        })
    }

    /// Size of a file, or `None` on any failure
    ///
    /// Not-found, invalid names and device errors all collapse to `None`;
    /// use [`read`](Self::read) or [`delete`](Self::delete) for the precise
    /// cause.
    pub fn size(&self, name: &str) -> Option<u16> {
        without_interrupts(self.bus, || {
            self.stage_name(name).ok()?;
            match self.exchange(FsCommand::Size, None) {
                FsStatus::Success => Some(self.size_port().read()),
                status => {
                    log::debug!("fs: size of {} unavailable ({})", name, status);
                    None
                }
            }
        })
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        without_interrupts(self.bus, || {
            self.stage_name(name)?;
            let status = self.exchange(FsCommand::Delete, None);
            Self::check(FsCommand::Delete, status)
        })
    }

    /// Iterate over the directory
    ///
    /// The device keeps the iteration position. Only one listing may be in
    /// flight per device; a fresh call after the end starts over.
    pub fn list(&mut self) -> DirEntries<'_, 'b, B> {
        DirEntries { fs: self, finished: false }
    }

    pub fn free_space(&self) -> Result<FreeSpace> {
        without_interrupts(self.bus, || {
            let status = self.exchange(FsCommand::FreeSpace, None);
            Self::check(FsCommand::FreeSpace, status)?;
            Ok(FreeSpace {
                low: self.size_port().read(),
                high: RegisterPort::new(self.bus, self.ports.size_high).read(),
            })
        })
    }

    pub fn metadata(&self, name: &str) -> Result<FileMeta> {
        without_interrupts(self.bus, || {
            self.stage_name(name)?;
            let status = self.exchange(FsCommand::GetMeta, None);
            Self::check(FsCommand::GetMeta, status)?;
            let mut record = [0u8; META_LEN];
            self.bus.read_bytes(self.scratch.data, &mut record);
            Ok(FileMeta::from_record(&record))
        })
    }

    /// Run a stored program and wait for it to finish
    pub fn exec_wait(&self, name: &str) -> Result<()> {
        without_interrupts(self.bus, || {
            self.stage_name(name)?;
            let status = self.exchange(FsCommand::ExecWait, None);
            Self::check(FsCommand::ExecWait, status)
        })
    }

    /// Size `name`, check it against `limit` and read it into scratch
    ///
    /// Caller must hold interrupts off.
    fn load(&self, name: &str, limit: usize) -> Result<usize> {
        self.stage_name(name)?;
        let status = self.exchange(FsCommand::Size, None);
        Self::check(FsCommand::Size, status)?;

        let len = self.size_port().read() as usize;
        if len > limit {
            return Err(DriverError::BufferTooSmall { size: len, capacity: limit });
        }

        let status = self.exchange(FsCommand::Read, None);
        Self::check(FsCommand::Read, status)?;
        Ok(len)
    }

    fn stage_name(&self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > FILE_NAME_MAX || bytes.contains(&0) {
            return Err(DriverError::InvalidFileName);
        }
        self.bus.write_bytes(self.scratch.name, bytes);
        self.bus.write_byte(self.scratch.name.offset(bytes.len() as u16), 0);
        Ok(())
    }

    fn exchange(&self, command: FsCommand, length: Option<Word>) -> FsStatus {
        let mut exchange = CommandExchange::new(self.bus, self.ports.cmd)
            .param(self.ports.name, self.scratch.name.get())
            .param(self.ports.buf, self.scratch.data.get());
        if let Some(length) = length {
            exchange = exchange.param(self.ports.size, length);
        }
        FsStatus::from(exchange.issue(command.code(), self.ports.stat))
    }

    fn size_port(&self) -> RegisterPort<'b, B> {
        RegisterPort::new(self.bus, self.ports.size)
    }

    fn check(command: FsCommand, status: FsStatus) -> Result<()> {
        match status {
            FsStatus::Success => Ok(()),
            status => Err(DriverError::Fs { command, status }),
        }
    }

    fn read_listed_name(&self) -> String {
        let mut bytes = Vec::new();
        let limit = LIST_NAME_MAX.min(self.scratch.capacity as usize);
        for i in 0..limit {
            let byte = self.bus.read_byte(self.scratch.data.offset(i as u16));
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Directory listing in progress, see [`Filesystem::list`]
///
/// Dropping an unfinished listing drains the device to DirEnd so the next
/// listing starts from the first name.
pub struct DirEntries<'f, 'b, B: RegisterBus + InterruptControl + ?Sized> {
    fs: &'f mut Filesystem<'b, B>,
    finished: bool,
}

impl<B: RegisterBus + InterruptControl + ?Sized> Iterator for DirEntries<'_, '_, B> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let fs = &*self.fs;
        let step = without_interrupts(fs.bus, || match fs.exchange(FsCommand::List, None) {
            FsStatus::Success => Ok(Some(fs.read_listed_name())),
            FsStatus::DirEnd => Ok(None),
            status => Err(DriverError::Fs { command: FsCommand::List, status }),
        });
        match step {
            Ok(Some(name)) => Some(Ok(name)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl<B: RegisterBus + InterruptControl + ?Sized> Drop for DirEntries<'_, '_, B> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        log::debug!("fs: draining unfinished listing");
        let fs = &*self.fs;
        // Any non-success status ends the device's iteration or wedges it;
        // either way another List would not make progress.
        while without_interrupts(fs.bus, || fs.exchange(FsCommand::List, None))
            == FsStatus::Success
        {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        assert_eq!(FsStatus::from(Status::new(0)), FsStatus::Success);
        assert_eq!(FsStatus::from(Status::new(1)), FsStatus::NotFound);
        assert_eq!(FsStatus::from(Status::new(2)), FsStatus::Full);
        assert_eq!(FsStatus::from(Status::new(3)), FsStatus::InvalidName);
        assert_eq!(FsStatus::from(Status::new(4)), FsStatus::OutOfBounds);
        assert_eq!(FsStatus::from(Status::new(5)), FsStatus::DirEnd);
        assert_eq!(FsStatus::from(Status::new(42)), FsStatus::Unknown(42));
        assert_eq!(FsStatus::Unknown(42).code(), 42);
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(FsCommand::Read.code(), 1);
        assert_eq!(FsCommand::List.code(), 5);
        assert_eq!(FsCommand::ExecWait.code(), 8);
    }

    #[test]
    fn test_free_space_combines_words() {
        let free = FreeSpace { low: 0x8000, high: 0x0016 };
        assert_eq!(free.bytes(), 1_474_560);
    }

    #[test]
    fn test_meta_record_decoding() {
        let words: [u16; 12] = [2024, 2, 29, 23, 59, 58, 2025, 1, 1, 0, 0, 1];
        let mut record = [0u8; META_LEN];
        for (i, w) in words.iter().enumerate() {
            record[2 * i..2 * i + 2].copy_from_slice(&w.to_le_bytes());
        }
        let meta = FileMeta::from_record(&record);
        assert_eq!(meta.created.year, 2024);
        assert_eq!(meta.created.day, 29);
        assert_eq!(meta.modified.second, 1);
        assert!(meta.modified > meta.created);
        assert_eq!(format!("{}", meta.created), "2024-02-29 23:59:58");
    }

    #[test]
    fn test_scratch_validation() {
        assert!(Scratch::DEFAULT.validate().is_ok());

        let overlapping = Scratch { name: RegisterAddress::new(0x6010), ..Scratch::DEFAULT };
        assert!(matches!(overlapping.validate(), Err(DriverError::InvalidScratch(_))));

        let tiny = Scratch { capacity: 8, ..Scratch::DEFAULT };
        assert!(tiny.validate().is_err());

        let past_end = Scratch { data: RegisterAddress::new(0xF000), capacity: 0x2000, ..Scratch::DEFAULT };
        assert!(past_end.validate().is_err());
    }
}
