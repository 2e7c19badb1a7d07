//! Register and memory access of a single core.
//!
//! A [`RegisterTransport`] turns logical register and memory accesses into transactions on the
//! debug port. Every call names the core it targets with a [`CoreSelector`], there is no "current
//! core" state shared between cores.

mod jtag;
#[cfg(any(test, feature = "test"))]
mod mock;

pub use jtag::{JtagStatus, JtagTransport, Transaction};
#[cfg(any(test, feature = "test"))]
pub use mock::{MockTransport, RegisterWrite};

use coredebug_target::{RegisterKind, RegisterRef};

use crate::probe::DebugProbeError;

/// Position of a core's TAP in the scan chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CoreSelector(pub usize);

impl std::fmt::Display for CoreSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "core {}", self.0)
    }
}

/// Width of a single memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessWidth {
    /// 8 bit
    U8,
    /// 16 bit
    U16,
    /// 32 bit
    U32,
}

impl AccessWidth {
    /// The access size in bytes.
    pub const fn bytes(self) -> u32 {
        match self {
            AccessWidth::U8 => 1,
            AccessWidth::U16 => 2,
            AccessWidth::U32 => 4,
        }
    }

    /// Whether `address` is naturally aligned for this width.
    pub const fn is_aligned(self, address: u32) -> bool {
        address % self.bytes() == 0
    }
}

impl TryFrom<u32> for AccessWidth {
    type Error = u32;

    fn try_from(size: u32) -> Result<Self, Self::Error> {
        match size {
            1 => Ok(AccessWidth::U8),
            2 => Ok(AccessWidth::U16),
            4 => Ok(AccessWidth::U32),
            other => Err(other),
        }
    }
}

/// An external reset line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetLine {
    /// SRST, resets the system.
    System,
    /// TRST, resets the TAP controllers.
    Test,
}

/// An error of the register transport.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum TransportError {
    /// The debug probe reported an error.
    Probe(#[from] DebugProbeError),
    /// The {0} transaction at {1:#010x} failed.
    TransactionFailed(Transaction, u32),
    /// Timed out waiting for the {0} transaction at {1:#010x}.
    Timeout(Transaction, u32),
    /// The scan returned {0} bits, expected {1}.
    ShortCapture(usize, usize),
    /// Memory access of {len} bytes at {address:#010x} is not a multiple of the access width.
    InvalidLength {
        /// Start address.
        address: u32,
        /// Length of the data in bytes.
        len: usize,
    },
}

/// Register and memory access for a core.
///
/// Batch methods take the register numbers in the order they should be accessed. Implementations
/// are expected to exploit address auto increment for contiguous numbers.
pub trait RegisterTransport {
    /// Read a batch of core registers.
    fn read_core_registers(
        &mut self,
        core: CoreSelector,
        numbers: &[u32],
    ) -> Result<Vec<u32>, TransportError>;

    /// Write a batch of core registers.
    fn write_core_registers(
        &mut self,
        core: CoreSelector,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError>;

    /// Read a batch of auxiliary registers.
    fn read_aux_registers(
        &mut self,
        core: CoreSelector,
        numbers: &[u32],
    ) -> Result<Vec<u32>, TransportError>;

    /// Write a batch of auxiliary registers.
    fn write_aux_registers(
        &mut self,
        core: CoreSelector,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError>;

    /// Read `count` accesses of `width` starting at `address`.
    fn read_memory(
        &mut self,
        core: CoreSelector,
        address: u32,
        width: AccessWidth,
        count: usize,
    ) -> Result<Vec<u8>, TransportError>;

    /// Write `data` starting at `address` with accesses of `width`.
    fn write_memory(
        &mut self,
        core: CoreSelector,
        address: u32,
        width: AccessWidth,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Read the debug port status word of the core.
    fn read_status(&mut self, core: CoreSelector) -> Result<u32, TransportError>;

    /// Drive an external reset line.
    fn set_reset_line(&mut self, line: ResetLine, asserted: bool) -> Result<(), TransportError>;

    /// Read a batch of registers of one kind.
    fn read_registers(
        &mut self,
        core: CoreSelector,
        kind: RegisterKind,
        numbers: &[u32],
    ) -> Result<Vec<u32>, TransportError> {
        match kind {
            RegisterKind::Core => self.read_core_registers(core, numbers),
            RegisterKind::Aux => self.read_aux_registers(core, numbers),
        }
    }

    /// Write a batch of registers of one kind.
    fn write_registers(
        &mut self,
        core: CoreSelector,
        kind: RegisterKind,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError> {
        match kind {
            RegisterKind::Core => self.write_core_registers(core, writes),
            RegisterKind::Aux => self.write_aux_registers(core, writes),
        }
    }

    /// Read a single register.
    fn read_register(
        &mut self,
        core: CoreSelector,
        register: RegisterRef,
    ) -> Result<u32, TransportError> {
        let values = self.read_registers(core, register.kind, &[register.number])?;
        values
            .first()
            .copied()
            .ok_or(TransportError::ShortCapture(0, 32))
    }

    /// Write a single register.
    fn write_register(
        &mut self,
        core: CoreSelector,
        register: RegisterRef,
        value: u32,
    ) -> Result<(), TransportError> {
        self.write_registers(core, register.kind, &[(register.number, value)])
    }
}
