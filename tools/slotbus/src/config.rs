//! `slotbus.toml`: memory map, scratch regions, storage and slot assignments

use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;
use slotbus_bus::{BusLayout, RegisterAddress, SlotIndex};
use slotbus_drivers::fs::FILE_NAME_MAX;
use slotbus_drivers::{FsPorts, Scratch};
use slotbus_sim::MachineConfig;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG: &str = "slotbus.toml";

/// Simulated peripherals the CLI knows how to plug in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Camera,
    Sender,
    Receiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DeviceSlot {
    pub kind: DeviceKind,
    pub slot: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub layout: BusLayout,
    pub fs_ports: FsPorts,
    pub scratch: Scratch,
    /// Host directory mirroring the virtual disk; none keeps it in memory
    pub storage: Option<PathBuf>,
    #[serde(rename = "device")]
    pub devices: Vec<DeviceSlot>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: BusLayout::DEFAULT,
            fs_ports: FsPorts::DEFAULT,
            scratch: Scratch::DEFAULT,
            storage: None,
            devices: vec![
                DeviceSlot { kind: DeviceKind::Receiver, slot: 0 },
                DeviceSlot { kind: DeviceKind::Camera, slot: 2 },
                DeviceSlot { kind: DeviceKind::Sender, slot: 5 },
            ],
        }
    }
}

impl Config {
    /// Load `path`, or the default file if present, or the built-in defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG), false),
        };
        if !required && !path.exists() {
            log::debug!("no {} found, using built-in configuration", DEFAULT_CONFIG);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config = Self::parse(&text).with_context(|| format!("invalid {}", path.display()))?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.layout.validate()?;
        self.scratch.validate()?;

        // The simulated filesystem device decodes six consecutive ports
        let cmd = self.fs_ports.cmd;
        let consecutive = [
            self.fs_ports.name,
            self.fs_ports.buf,
            self.fs_ports.size,
            self.fs_ports.stat,
            self.fs_ports.size_high,
        ]
        .iter()
        .enumerate()
        .all(|(i, port)| port.get() == cmd.get().wrapping_add(i as u16 + 1));
        if !consecutive {
            bail!("filesystem ports must be six consecutive addresses starting at {}", cmd);
        }

        // Every region the machine decodes must be disjoint from the others
        let regions = self.regions();
        for (i, (name, range)) in regions.iter().enumerate() {
            for (other, other_range) in &regions[i + 1..] {
                if range.start < other_range.end && other_range.start < range.end {
                    bail!(
                        "{} {:#06x}..{:#06x} overlaps {} {:#06x}..{:#06x}",
                        name,
                        range.start,
                        range.end,
                        other,
                        other_range.start,
                        other_range.end
                    );
                }
            }
        }

        let mut taken = [false; slotbus_bus::SLOT_COUNT];
        for device in &self.devices {
            SlotIndex::new(device.slot)?;
            if std::mem::replace(&mut taken[device.slot], true) {
                bail!("slot {} is assigned twice", device.slot);
            }
        }
        Ok(())
    }

    /// Address ranges claimed by the slot table, ports and scratch buffers
    fn regions(&self) -> [(&'static str, Range<usize>); 5] {
        let span = |start: RegisterAddress, len: usize| {
            let start = start.get() as usize;
            start..start + len
        };
        [
            ("slot table", self.layout.bus_base.get() as usize..self.layout.table_end()),
            ("interrupt mask", span(self.layout.interrupt_mask, 2)),
            ("filesystem ports", span(self.fs_ports.cmd, 6)),
            ("scratch name", span(self.scratch.name, FILE_NAME_MAX + 1)),
            ("scratch data", span(self.scratch.data, self.scratch.capacity as usize)),
        ]
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig { layout: self.layout, fs_ports: self.fs_ports.cmd }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
            storage = "disk"

            [layout]
            bus_base = 0xE000
            interrupt_mask = 0xFF00

            [scratch]
            name = 0x5000
            data = 0x5100
            capacity = 1024

            [[device]]
            kind = "camera"
            slot = 7

            [[device]]
            kind = "receiver"
            slot = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.layout.bus_base, RegisterAddress::new(0xE000));
        assert_eq!(config.layout.slot_stride, 16);
        assert_eq!(config.layout.interrupt_mask, RegisterAddress::new(0xFF00));
        assert_eq!(config.fs_ports, FsPorts::DEFAULT);
        assert_eq!(config.scratch.capacity, 1024);
        assert_eq!(config.storage, Some(PathBuf::from("disk")));
        assert_eq!(
            config.devices,
            [
                DeviceSlot { kind: DeviceKind::Camera, slot: 7 },
                DeviceSlot { kind: DeviceKind::Receiver, slot: 1 },
            ]
        );
    }

    #[test]
    fn test_rejects_bad_layout() {
        assert!(Config::parse("[layout]\nslot_stride = 15\n").is_err());
    }

    #[test]
    fn test_rejects_scattered_fs_ports() {
        assert!(Config::parse("[fs_ports]\nstat = 0xFF30\n").is_err());
    }

    #[test]
    fn test_rejects_scratch_over_slot_table() {
        let err = Config::parse("[scratch]\ndata = 0xFC00\ncapacity = 64\n").unwrap_err();
        assert!(format!("{:#}", err).contains("slot table"));
        assert!(Config::parse("[scratch]\nname = 0xFF08\n").is_err());
    }

    #[test]
    fn test_rejects_fs_ports_over_slot_table() {
        let text = r#"
            [fs_ports]
            cmd = 0xFC20
            name = 0xFC21
            buf = 0xFC22
            size = 0xFC23
            stat = 0xFC24
            size_high = 0xFC25
        "#;
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn test_rejects_fs_ports_over_interrupt_mask() {
        assert!(Config::parse("[layout]\ninterrupt_mask = 0xFF14\n").is_err());
    }

    #[test]
    fn test_rejects_duplicate_slot() {
        let text = r#"
            [[device]]
            kind = "camera"
            slot = 3
            [[device]]
            kind = "sender"
            slot = 3
        "#;
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn test_rejects_unknown_device() {
        assert!(Config::parse("[[device]]\nkind = \"printer\"\nslot = 1\n").is_err());
    }

    #[test]
    fn test_machine_config() {
        let config = Config::default();
        let machine = config.machine_config();
        assert_eq!(machine.layout, BusLayout::DEFAULT);
        assert_eq!(machine.fs_ports, RegisterAddress::new(0xFF10));
    }
}
