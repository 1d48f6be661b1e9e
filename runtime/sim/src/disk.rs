//! In-memory virtual disk behind the filesystem device
//!
//! Flat namespace, 8.3-style names, a fixed byte quota and optional
//! mirroring to a host directory. Listing order is byte-wise sorted.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;
use std::time::SystemTime;

use regex::Regex;

use crate::{DiskError, Result};

/// Capacity of the disk in bytes (a 1.44 MB floppy)
pub const MAX_DISK_BYTES: usize = 1_474_560;

const NAME_PATTERN: &str = r"^\.?[a-zA-Z0-9_]{1,12}(\.[a-zA-Z0-9]{1,3})?$";

/// Does `name` match the disk's filename rules?
pub fn is_valid_name(name: &str) -> bool {
    static NAME_RE: OnceLock<Option<Regex>> = OnceLock::new();
    NAME_RE
        .get_or_init(|| Regex::new(NAME_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

#[derive(Debug, Clone)]
struct FileEntry {
    data: Vec<u8>,
    created: SystemTime,
    modified: SystemTime,
}

#[derive(Debug, Default)]
pub struct VirtualDisk {
    files: BTreeMap<String, FileEntry>,
    /// Names written or deleted since the last persist
    dirty: BTreeSet<String>,
    used: usize,
}

impl VirtualDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file; replacing keeps the creation time
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if !is_valid_name(name) {
            return Err(DiskError::InvalidName);
        }
        let old_size = self.files.get(name).map_or(0, |entry| entry.data.len());
        if self.used - old_size + data.len() > MAX_DISK_BYTES {
            return Err(DiskError::QuotaExceeded);
        }

        let now = SystemTime::now();
        let entry = self.files.entry(name.to_owned()).or_insert_with(|| FileEntry {
            data: Vec::new(),
            created: now,
            modified: now,
        });
        entry.data = data.to_vec();
        entry.modified = now;

        self.used = self.used - old_size + data.len();
        self.dirty.insert(name.to_owned());
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<&[u8]> {
        self.entry(name).map(|entry| entry.data.as_slice())
    }

    pub fn size(&self, name: &str) -> Result<usize> {
        self.entry(name).map(|entry| entry.data.len())
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(DiskError::InvalidName);
        }
        let entry = self.files.remove(name).ok_or(DiskError::NotFound)?;
        self.used -= entry.data.len();
        self.dirty.insert(name.to_owned());
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// All names, sorted
    pub fn list(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// (created, modified)
    pub fn meta(&self, name: &str) -> Result<(SystemTime, SystemTime)> {
        self.entry(name).map(|entry| (entry.created, entry.modified))
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn free_space(&self) -> usize {
        MAX_DISK_BYTES.saturating_sub(self.used)
    }

    /// Has anything changed since the last persist?
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Import every valid file from a host directory
    ///
    /// A missing directory is not an error. Both timestamps come from the
    /// host file's modification time.
    pub fn load_from(&mut self, dir: &Path) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if !is_valid_name(&name) {
                log::debug!("disk: skipping host file {:?}", name);
                continue;
            }
            let data = match fs::read(entry.path()) {
                Ok(data) => data,
                Err(err) => {
                    log::warn!("disk: cannot load {}: {}", name, err);
                    continue;
                }
            };
            let stamp = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or_else(|_| SystemTime::now());

            let len = data.len();
            let previous = self.files.insert(
                name,
                FileEntry { data, created: stamp, modified: stamp },
            );
            self.used = self.used - previous.map_or(0, |p| p.data.len()) + len;
        }
        log::info!("disk: loaded {} files ({} bytes) from {}", self.files.len(), self.used, dir.display());
        Ok(())
    }

    /// Mirror changes since the last persist into a host directory
    ///
    /// Written files are (re)created; deleted files are removed. A file that
    /// fails to write stays dirty and the first error is returned after the
    /// remaining files were attempted.
    pub fn persist_to(&mut self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;

        let mut first_err = None;
        let dirty = std::mem::take(&mut self.dirty);
        for name in dirty {
            let path = dir.join(&name);
            let outcome = match self.files.get(&name) {
                Some(entry) => write_host_file(&path, entry),
                None => match fs::remove_file(&path) {
                    Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
                    _ => Ok(()),
                },
            };
            if let Err(err) = outcome {
                log::warn!("disk: cannot persist {}: {}", name, err);
                self.dirty.insert(name);
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn entry(&self, name: &str) -> Result<&FileEntry> {
        if !is_valid_name(name) {
            return Err(DiskError::InvalidName);
        }
        self.files.get(name).ok_or(DiskError::NotFound)
    }
}

fn write_host_file(path: &Path, entry: &FileEntry) -> io::Result<()> {
    fs::write(path, &entry.data)?;
    let file = fs::File::options().write(true).open(path)?;
    if let Err(err) = file.set_modified(entry.modified) {
        log::debug!("disk: cannot set mtime on {}: {}", path.display(), err);
    }
    Ok(())
}
