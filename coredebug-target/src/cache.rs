use serde::{Deserialize, Serialize};

use crate::{
    serialize::{hex_u_int, u32_or_hex},
    RegisterRef,
};

/// Cache maintenance registers of a core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDescription {
    /// The instruction cache, if the core has one.
    #[serde(default)]
    pub instruction: Option<InstructionCache>,
    /// The data cache, if the core has one.
    #[serde(default)]
    pub data: Option<DataCache>,
}

/// Instruction cache maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionCache {
    /// Writing `command` to this register invalidates the whole instruction cache.
    pub invalidate: RegisterRef,
    /// The value written to `invalidate`.
    #[serde(default = "command", serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub command: u32,
}

/// Data cache maintenance.
///
/// The invalidate command either drops lines or writes them back first, depending on the flush
/// mode bit in the control register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCache {
    /// The cache control register.
    pub control: RegisterRef,
    /// The flush mode bit in `control`.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub flush_mode: u32,
    /// Writing `command` to this register invalidates the whole data cache.
    pub invalidate: RegisterRef,
    /// The value written to `invalidate`.
    #[serde(default = "command", serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub command: u32,
}

fn command() -> u32 {
    1
}
