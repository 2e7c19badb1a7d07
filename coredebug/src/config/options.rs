use std::time::Duration;

use coredebug_target::ResetConfiguration;
use serde::{Deserialize, Serialize};

/// User configurable behaviour of a debugged core.
///
/// The options can be loaded from YAML, missing fields take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreOptions {
    /// How the reset lines are wired.
    pub reset: ResetConfiguration,
    /// How long [`Core::wait_for_halt`](crate::Core::wait_for_halt) waits, in milliseconds.
    pub halt_timeout_ms: u64,
    /// How long a single step may take, in milliseconds.
    pub step_timeout_ms: u64,
    /// Flush the data cache before reading memory.
    pub dcache_flush: bool,
    /// Mask interrupts while the core runs on behalf of the debugger.
    pub mask_interrupts_on_debug_execution: bool,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            reset: ResetConfiguration::default(),
            halt_timeout_ms: 500,
            step_timeout_ms: 100,
            dcache_flush: true,
            mask_interrupts_on_debug_execution: true,
        }
    }
}

impl CoreOptions {
    /// Parse options from YAML.
    pub fn from_yaml_reader<R: std::io::Read>(reader: R) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_reader(reader)
    }

    /// Timeout for halting the core.
    pub fn halt_timeout(&self) -> Duration {
        Duration::from_millis(self.halt_timeout_ms)
    }

    /// Timeout for a single step.
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_fields_use_defaults() {
        let yaml = "step_timeout_ms: 20\nreset:\n  srst_pulls_trst: true\n  reset_halt: true\n";

        let options = CoreOptions::from_yaml_reader(yaml.as_bytes()).unwrap();

        assert_eq!(options.step_timeout(), Duration::from_millis(20));
        assert_eq!(options.halt_timeout(), Duration::from_millis(500));
        assert!(options.reset.has_srst);
        assert!(options.reset.srst_pulls_trst);
        assert!(options.reset.reset_halt);
        assert!(options.dcache_flush);
    }
}
