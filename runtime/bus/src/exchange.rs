//! Command/status exchange
//!
//! Every device speaks the same handshake: parameter words first, then the
//! command code, then (for devices that have one) a status read. The
//! exchange buffers its parameters and emits the whole sequence in one call
//! so that no parameter write can land after the command.
//!
//! Compiler fences keep the compiler from moving the command write ahead of
//! the parameters or the status read ahead of the command. Bus backends are
//! responsible for program-order delivery at the hardware level.

use core::fmt;
use core::sync::atomic::{compiler_fence, Ordering};

use crate::{RegisterAddress, RegisterBus, RegisterPort, Word};

/// Most parameter writes a single exchange may carry
pub const MAX_PARAMS: usize = 4;

/// Raw result of a command; 0 is always success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(Word);

impl Status {
    pub const SUCCESS: Status = Status(0);

    pub const fn new(code: Word) -> Self {
        Self(code)
    }

    pub const fn code(self) -> Word {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

/// One in-flight command against a device
///
/// ```ignore
/// let status = CommandExchange::new(&bus, ports.cmd)
///     .param(ports.name, name_ptr)
///     .param(ports.buf, buf_ptr)
///     .issue(1, ports.stat);
/// ```
#[must_use = "an exchange does nothing until issued or fired"]
pub struct CommandExchange<'b, B: ?Sized> {
    bus: &'b B,
    command: RegisterAddress,
    params: [(RegisterAddress, Word); MAX_PARAMS],
    len: usize,
}

impl<'b, B: RegisterBus + ?Sized> CommandExchange<'b, B> {
    pub fn new(bus: &'b B, command: RegisterAddress) -> Self {
        Self {
            bus,
            command,
            params: [(RegisterAddress::new(0), 0); MAX_PARAMS],
            len: 0,
        }
    }

    /// Queue a parameter write; parameters go out in the order recorded
    ///
    /// # Panics
    /// Panics if more than [`MAX_PARAMS`] parameters are recorded.
    pub fn param(mut self, register: RegisterAddress, value: Word) -> Self {
        assert!(self.len < MAX_PARAMS, "command exchange takes at most {} parameters", MAX_PARAMS);
        self.params[self.len] = (register, value);
        self.len += 1;
        self
    }

    /// Parameters recorded so far
    pub fn params(&self) -> &[(RegisterAddress, Word)] {
        &self.params[..self.len]
    }

    /// Write parameters and command, then read the device's status register
    pub fn issue(self, code: Word, status: RegisterAddress) -> Status {
        self.write_sequence(code);
        compiler_fence(Ordering::SeqCst);
        let status = Status(RegisterPort::new(self.bus, status).read());
        log::debug!("exchange: command {} at {} -> {}", code, self.command, status);
        status
    }

    /// Write parameters and command without any status read-back
    ///
    /// Completion is not observable through this call.
    pub fn fire(self, code: Word) {
        self.write_sequence(code);
        log::debug!("exchange: fired command {} at {}", code, self.command);
    }

    fn write_sequence(&self, code: Word) {
        for &(register, value) in self.params() {
            RegisterPort::new(self.bus, register).write(value);
        }
        compiler_fence(Ordering::SeqCst);
        RegisterPort::new(self.bus, self.command).write(code);
    }
}
