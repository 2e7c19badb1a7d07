use serde::{Deserialize, Serialize};

use crate::{
    serialize::{hex_option, hex_u_int, option_u32_or_hex, u32_or_hex},
    RegisterBits, RegisterRef, RegisterUpdate,
};

/// How the debugger stops, starts and steps the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunControl {
    /// Bits of the transport status word which are set while the core runs.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub running_mask: u32,
    /// Forces the core into the halted state.
    pub halt_request: RegisterUpdate,
    /// Lets the core run. Used for both free running and single steps.
    pub resume: RegisterUpdate,
    /// Arms single instruction stepping before `resume`.
    pub step_enable: RegisterUpdate,
    /// Disarms single instruction stepping after the step halted. Some cores clear the step
    /// bits by themselves.
    #[serde(default)]
    pub step_disable: Option<RegisterUpdate>,
    /// The global interrupt enable bit(s).
    #[serde(default)]
    pub interrupt_enable: Option<RegisterBits>,
}

/// Why the core entered the halted state, as reported by the hardware.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltCause {
    /// The core executed a trap instruction.
    SoftwareBreakpoint,
    /// One or more comparators matched.
    Comparator,
    /// A single step completed.
    Step,
    /// The debugger or another agent requested the halt.
    Request,
}

/// One halt cause decoding rule.
///
/// The rule matches if `register & mask` is non-zero, or equals `value` if one is given.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltCauseRule {
    /// Mask applied to the cause register.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub mask: u32,
    /// The expected masked value.
    #[serde(default, serialize_with = "hex_option", deserialize_with = "option_u32_or_hex")]
    pub value: Option<u32>,
    /// The cause reported on a match.
    pub cause: HaltCause,
}

impl HaltCauseRule {
    /// Check the rule against a cause register value.
    pub fn matches(&self, register: u32) -> bool {
        let masked = register & self.mask;
        match self.value {
            Some(value) => masked == value,
            None => masked != 0,
        }
    }
}

/// Decoding of the halt cause register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltCauses {
    /// The register holding the cause.
    pub register: RegisterRef,
    /// Rules, evaluated in order. The first matching rule wins.
    pub rules: Vec<HaltCauseRule>,
    /// Position of a per-comparator hit bit field in the cause register, if the core reports
    /// which comparators matched.
    #[serde(default)]
    pub comparator_hits_shift: Option<u32>,
}

impl HaltCauses {
    /// Classify a cause register value.
    pub fn decode(&self, register: u32) -> Option<HaltCause> {
        self.rules
            .iter()
            .find(|rule| rule.matches(register))
            .map(|rule| rule.cause)
    }

    /// Indices of the comparators marked as hit in a cause register value.
    pub fn comparator_hits(&self, register: u32, slots: usize) -> Vec<usize> {
        let Some(shift) = self.comparator_hits_shift else {
            return vec![];
        };

        (0..slots)
            .filter(|slot| {
                let bit = shift + *slot as u32;
                bit < 32 && register & (1 << bit) != 0
            })
            .collect()
    }
}
