use serde::{Deserialize, Serialize};

/// How the reset lines of a board are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetConfiguration {
    /// The system reset line (SRST) is connected.
    pub has_srst: bool,
    /// The test reset line (TRST) is connected.
    pub has_trst: bool,
    /// Asserting SRST also resets the TAP.
    pub srst_pulls_trst: bool,
    /// Asserting TRST also resets the system.
    pub trst_pulls_srst: bool,
    /// JTAG cannot be used while SRST is asserted.
    pub srst_gates_jtag: bool,
    /// Halt the core right after asserting reset.
    pub reset_halt: bool,
}

impl Default for ResetConfiguration {
    fn default() -> Self {
        Self {
            has_srst: true,
            has_trst: false,
            srst_pulls_trst: false,
            trst_pulls_srst: false,
            srst_gates_jtag: false,
            reset_halt: false,
        }
    }
}
