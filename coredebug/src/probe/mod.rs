//! Access to the JTAG scan chain.
//!
//! Shifting bits through the scan chain is the job of a debug probe driver, which is not part of
//! this crate. Drivers implement [`JtagAccess`] and hand it to a
//! [`JtagTransport`](crate::transport::JtagTransport).

use bitvec::{order::Lsb0, vec::BitVec};

/// The bits captured while shifting a JTAG register.
pub type CapturedBits = BitVec<u8, Lsb0>;

/// An error reported by a debug probe.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum DebugProbeError {
    /// No TAP was found at scan chain position {0}.
    TargetNotFound(usize),
    /// The probe does not support {function_name}.
    NotImplemented {
        /// The unsupported function.
        function_name: &'static str,
    },
}

/// Low level JTAG register access.
///
/// Every method moves the TAP back to Run-Test/Idle and stays there for
/// [`idle_cycles`](JtagAccess::idle_cycles) cycles, which is when the TAP executes a transaction.
pub trait JtagAccess {
    /// Select the TAP at `index` in the scan chain. All following scans target this TAP.
    fn select_target(&mut self, index: usize) -> Result<(), DebugProbeError>;

    /// Configure the number of idle cycles which are inserted after each access.
    fn set_idle_cycles(&mut self, idle_cycles: u8);

    /// The number of idle cycles inserted after each access.
    fn idle_cycles(&self) -> u8;

    /// Read a JTAG register, shifting in zeros.
    fn read_register(&mut self, address: u32, len: u32) -> Result<CapturedBits, DebugProbeError>;

    /// Write to a JTAG register
    ///
    /// This function will perform a write to the IR register, if necessary,
    /// to select the correct register, and then to the DR register, to transmit the
    /// data. The data shifted out of the DR register will be returned.
    fn write_register(
        &mut self,
        address: u32,
        data: &[u8],
        len: u32,
    ) -> Result<CapturedBits, DebugProbeError>;

    /// Assert the system reset line (SRST).
    fn target_reset_assert(&mut self) -> Result<(), DebugProbeError>;

    /// Release the system reset line (SRST).
    fn target_reset_deassert(&mut self) -> Result<(), DebugProbeError>;

    /// Assert the test reset line (TRST).
    fn test_reset_assert(&mut self) -> Result<(), DebugProbeError> {
        Err(DebugProbeError::NotImplemented {
            function_name: "test_reset_assert",
        })
    }

    /// Release the test reset line (TRST).
    fn test_reset_deassert(&mut self) -> Result<(), DebugProbeError> {
        Err(DebugProbeError::NotImplemented {
            function_name: "test_reset_deassert",
        })
    }
}
