//! slotbus - CLI for the simulated Slotbus machine
//!
//! # Purpose
//! Builds a simulated machine from `slotbus.toml`, plugs in the configured
//! peripherals and drives them through the same drivers a program on the
//! real machine would use.
//!
//! # Commands
//! - `scan` - List occupied expansion slots
//! - `find` - Locate a peripheral by name
//! - `fs` - Filesystem operations on the virtual disk
//! - `capture` - Take one camera frame
//! - `send` - Send a message through the message sender
//! - `daemon` - Run the message daemon

mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use crossbeam::channel::Receiver;
use slotbus_bus::{
    find_peripheral, PeripheralName, RegisterAddress, SlotIndex, SlotTable, WaitForInterrupt,
};
use slotbus_drivers::camera::{FRAME_HEIGHT, FRAME_WIDTH};
use slotbus_drivers::{Camera, Filesystem, MessageSender};
use slotbus_msgd::{MailboxMessage, MessageDaemon, MessageSink, ServiceError};
use slotbus_sim::peripherals::{
    enqueue_message, CameraDevice, Envelope, MessageReceiverDevice, MessageSenderDevice,
};
use slotbus_sim::{Machine, VirtualDisk};

use config::{Config, DeviceKind};

#[derive(Parser)]
#[command(name = "slotbus")]
#[command(author = "Slotbus Contributors")]
#[command(version)]
#[command(about = "Drive the simulated Slotbus machine", long_about = None)]
struct Cli {
    /// Configuration file (default: ./slotbus.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List occupied expansion slots
    Scan,

    /// Locate a peripheral by name
    Find {
        /// Peripheral name, up to 8 characters
        name: String,
    },

    /// Filesystem operations
    #[command(subcommand)]
    Fs(FsCommands),

    /// Capture one camera frame
    Capture {
        /// Frame buffer address in machine memory
        #[arg(short, long, value_parser = parse_address, default_value = "0x8000")]
        buffer: RegisterAddress,

        #[arg(long, default_value_t = FRAME_WIDTH)]
        width: u16,

        #[arg(long, default_value_t = FRAME_HEIGHT)]
        height: u16,

        /// Write the raw RGB332 frame to this host file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Send a message
    Send {
        /// Recipient identity
        to: String,

        /// Message body
        body: String,
    },

    /// Run the message daemon
    Daemon {
        /// Queue a message for the receiver before starting (SENDER=BODY)
        #[arg(short, long, value_parser = parse_injection)]
        inject: Vec<(String, String)>,

        /// Stop after this many milliseconds without an interrupt (0 runs forever)
        #[arg(long, default_value_t = 500)]
        idle_ms: u64,
    },
}

#[derive(Subcommand)]
enum FsCommands {
    /// List files
    Ls,

    /// Print a file
    Read {
        name: String,

        /// Write the content to this host file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Create or replace a file
    Write {
        name: String,

        /// Content given on the command line
        #[arg(short, long, conflicts_with = "from")]
        text: Option<String>,

        /// Content copied from a host file
        #[arg(short, long)]
        from: Option<PathBuf>,
    },

    /// Delete a file
    Rm { name: String },

    /// Print a file's size
    Size { name: String },

    /// Show free space
    Df,

    /// Show creation and modification times
    Meta { name: String },

    /// Run a stored program and wait for it
    Exec { name: String },
}

fn parse_address(s: &str) -> Result<RegisterAddress, String> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    value.map(RegisterAddress::new).map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn parse_injection(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((sender, body)) if !sender.is_empty() => Ok((sender.to_string(), body.to_string())),
        _ => Err(format!("expected SENDER=BODY, got '{}'", s)),
    }
}

/// A configured machine plus the host ends of its devices
struct Rig {
    config: Config,
    machine: Machine,
    outbox: Option<Receiver<Envelope>>,
}

impl Rig {
    fn build(config: Config) -> anyhow::Result<Self> {
        let mut disk = VirtualDisk::new();
        if let Some(dir) = &config.storage {
            disk.load_from(dir)
                .with_context(|| format!("cannot load virtual disk from {}", dir.display()))?;
        }
        let machine = Machine::with_config(config.machine_config(), disk)?;

        let mut outbox = None;
        for device in &config.devices {
            let slot = SlotIndex::new(device.slot)?;
            match device.kind {
                DeviceKind::Camera => {
                    machine.plug(slot, CameraDevice::new());
                }
                DeviceKind::Receiver => {
                    machine.plug(slot, MessageReceiverDevice::new());
                }
                DeviceKind::Sender => {
                    let (sender, rx) = MessageSenderDevice::new();
                    machine.plug(slot, sender);
                    outbox.get_or_insert(rx);
                }
            }
        }
        Ok(Self { config, machine, outbox })
    }

    fn fs(&self) -> anyhow::Result<Filesystem<'_, Machine>> {
        Ok(Filesystem::new(&self.machine, self.config.fs_ports, self.config.scratch)?)
    }

    /// Write the virtual disk back to the storage directory, if any
    fn persist(&self) -> anyhow::Result<()> {
        let Some(dir) = &self.config.storage else {
            return Ok(());
        };
        self.machine
            .with_disk(|disk| if disk.is_dirty() { disk.persist_to(dir) } else { Ok(()) })
            .with_context(|| format!("cannot persist virtual disk to {}", dir.display()))
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let rig = Rig::build(config)?;

    match cli.command {
        Commands::Scan => scan(&rig)?,
        Commands::Find { name } => find(&rig, &name)?,
        Commands::Fs(command) => run_fs(&rig, command)?,
        Commands::Capture { buffer, width, height, out } => {
            capture(&rig, buffer, width, height, out.as_deref())?
        }
        Commands::Send { to, body } => send(&rig, &to, &body)?,
        Commands::Daemon { inject, idle_ms } => daemon(&rig, &inject, idle_ms)?,
    }

    rig.persist()
}

fn scan(rig: &Rig) -> anyhow::Result<()> {
    let table = SlotTable::new(&rig.machine, rig.config.layout)?;
    println!("{} Scanning 16 expansion slots...", "🔍".green());

    let mut found = 0;
    for (slot, name) in table.occupants() {
        println!("  slot {:>2}  {}  {}", slot, table.base(slot), name.to_string().bold());
        found += 1;
    }
    if found == 0 {
        println!("  {}", "no peripherals".dimmed());
    }
    Ok(())
}

fn find(rig: &Rig, name: &str) -> anyhow::Result<()> {
    let target = PeripheralName::new(name.as_bytes())
        .with_context(|| format!("'{}' is not a valid peripheral name", name))?;
    let handle = find_peripheral(&rig.machine, &rig.config.layout, &target)?;
    println!(
        "{} {} in slot {} (base {})",
        "✅".green(),
        target.to_string().bold(),
        handle.slot(),
        handle.base()
    );
    Ok(())
}

fn run_fs(rig: &Rig, command: FsCommands) -> anyhow::Result<()> {
    let mut fs = rig.fs()?;

    match command {
        FsCommands::Ls => {
            let mut count = 0;
            for entry in fs.list() {
                let name = entry?;
                println!("  {}", name);
                count += 1;
            }
            println!("{} {} file(s)", "📁".green(), count);
        }

        FsCommands::Read { name, out } => {
            let data = fs.read(&name).with_context(|| format!("cannot read {}", name))?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &data)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    println!("{} {} bytes -> {}", "✅".green(), data.len(), path.display());
                }
                None => println!("{}", String::from_utf8_lossy(&data)),
            }
        }

        FsCommands::Write { name, text, from } => {
            let data = match (text, from) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
                (None, None) => bail!("give the content with --text or --from"),
            };
            fs.write(&name, &data).with_context(|| format!("cannot write {}", name))?;
            println!("{} {} ({} bytes)", "✅".green(), name.bold(), data.len());
        }

        FsCommands::Rm { name } => {
            fs.delete(&name).with_context(|| format!("cannot delete {}", name))?;
            println!("{} deleted {}", "✅".green(), name.bold());
        }

        FsCommands::Size { name } => match fs.size(&name) {
            Some(size) => println!("{} {} bytes", name.bold(), size),
            None => bail!("size of {} unavailable", name),
        },

        FsCommands::Df => {
            let free = fs.free_space()?;
            println!("{} {} bytes free", "💾".green(), free.bytes());
        }

        FsCommands::Meta { name } => {
            let meta = fs.metadata(&name).with_context(|| format!("cannot stat {}", name))?;
            println!("{}", name.bold());
            println!("  created:  {}", meta.created);
            println!("  modified: {}", meta.modified);
        }

        FsCommands::Exec { name } => {
            fs.exec_wait(&name).with_context(|| format!("cannot run {}", name))?;
            println!("{} {} finished", "🚀".green(), name.bold());
        }
    }
    Ok(())
}

fn capture(
    rig: &Rig,
    buffer: RegisterAddress,
    width: u16,
    height: u16,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let camera = Camera::find(&rig.machine, &rig.config.layout)?;
    let len = width as usize * height as usize;
    if buffer.get() as usize + len > 0x1_0000 {
        bail!("a {}x{} frame at {} runs past the end of memory", width, height, buffer);
    }

    camera.capture(buffer, width, height);
    let slot = camera.handle().slot();
    if !rig.machine.pending().is_pending(slot) {
        bail!("camera in slot {} did not signal completion", slot);
    }

    let frame = rig.machine.with_core(|core| {
        let start = buffer.get() as usize;
        core.ram()[start..start + len].to_vec()
    });
    println!("{} {}x{} frame at {} (slot {})", "📷".green(), width, height, buffer, slot);

    if let Some(path) = out {
        std::fs::write(path, &frame).with_context(|| format!("cannot write {}", path.display()))?;
        println!("  saved RGB332 frame to {}", path.display());
    }
    Ok(())
}

fn send(rig: &Rig, to: &str, body: &str) -> anyhow::Result<()> {
    let sender = MessageSender::find(&rig.machine, &rig.config.layout)?;
    sender.send_staged(&rig.config.scratch, to, body.as_bytes())?;

    let Some(outbox) = &rig.outbox else {
        bail!("no simulated sender is configured");
    };
    match outbox.try_recv() {
        Ok(envelope) => println!(
            "{} sent {} bytes to {}",
            "📨".green(),
            envelope.body.len(),
            envelope.recipient.bold()
        ),
        Err(_) => println!("{} sender accepted the message", "📨".green()),
    }
    Ok(())
}

/// Prints each delivery as it happens
#[derive(Default)]
struct ConsoleSink {
    delivered: usize,
    failed: usize,
}

impl MessageSink for ConsoleSink {
    fn deliver(&mut self, message: &MailboxMessage) {
        self.delivered += 1;
        println!(
            "{} Message Received from {}: {}",
            "📬".green(),
            message.sender_lossy().bold(),
            message.body_lossy()
        );
    }

    fn report(&mut self, error: &ServiceError) {
        self.failed += 1;
        println!("{} {}", "⚠️".yellow(), error);
    }
}

/// Handle one wake-up and mirror what it changed into the storage directory
fn serve_once(
    rig: &Rig,
    daemon: &mut MessageDaemon<'_, Machine>,
    sink: &mut dyn MessageSink,
) -> anyhow::Result<()> {
    daemon.handle_interrupt(sink);
    rig.persist()
}

fn daemon(rig: &Rig, inject: &[(String, String)], idle_ms: u64) -> anyhow::Result<()> {
    for (sender, body) in inject {
        rig.machine
            .with_disk(|disk| enqueue_message(disk, sender.as_bytes(), body.as_bytes()))
            .with_context(|| format!("cannot queue message from {}", sender))?;
    }

    let mut daemon = MessageDaemon::start(&rig.machine, &rig.config.layout, rig.fs()?)?;
    let mut sink = ConsoleSink::default();
    println!("{} msgd listening on slot {}", "🚀".green(), daemon.slot());

    if idle_ms == 0 {
        loop {
            rig.machine.wait_for_interrupt();
            serve_once(rig, &mut daemon, &mut sink)?;
        }
    }

    let idle = Duration::from_millis(idle_ms);
    while rig.machine.wait_for_interrupt_timeout(idle) {
        serve_once(rig, &mut daemon, &mut sink)?;
    }
    println!(
        "{} idle for {} ms, {} delivered, {} failed",
        "✅".green(),
        idle_ms,
        sink.delivered,
        sink.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotbus_sim::peripherals::QUEUE_FILE;

    #[test]
    fn test_each_delivery_reaches_storage() {
        let dir = std::env::temp_dir().join(format!("slotbus-serve-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let config = Config { storage: Some(dir.clone()), ..Config::default() };
        let rig = Rig::build(config).unwrap();
        rig.machine.with_disk(|disk| {
            enqueue_message(disk, b"earth", b"one").unwrap();
            enqueue_message(disk, b"earth", b"two").unwrap();
        });

        let mut daemon =
            MessageDaemon::start(&rig.machine, &rig.config.layout, rig.fs().unwrap()).unwrap();
        let mut sink = ConsoleSink::default();
        rig.machine.step();
        serve_once(&rig, &mut daemon, &mut sink).unwrap();

        assert_eq!(sink.delivered, 1);
        let on_host = std::fs::read(dir.join(QUEUE_FILE)).unwrap();
        let in_memory = rig.machine.with_disk(|disk| disk.read(QUEUE_FILE).unwrap().to_vec());
        assert_eq!(on_host, in_memory);
        assert!(!dir.join("INBOX.MSG").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
