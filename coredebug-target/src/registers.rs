use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::serialize::{hex_u_int, u32_or_hex};

/// The register space a register number belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// General purpose (core) registers.
    Core,
    /// Auxiliary registers, which hold control and status state of the core.
    Aux,
}

/// An architectural register address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegisterRef {
    /// The register space.
    pub kind: RegisterKind,
    /// The register number inside of the register space.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub number: u32,
}

impl RegisterRef {
    /// A core register.
    pub const fn core(number: u32) -> Self {
        Self {
            kind: RegisterKind::Core,
            number,
        }
    }

    /// An auxiliary register.
    pub const fn aux(number: u32) -> Self {
        Self {
            kind: RegisterKind::Aux,
            number,
        }
    }
}

impl std::fmt::Display for RegisterRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            RegisterKind::Core => write!(f, "core register {}", self.number),
            RegisterKind::Aux => write!(f, "aux register {:#x}", self.number),
        }
    }
}

/// A group of bits inside of a register.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBits {
    /// The register holding the bits.
    pub register: RegisterRef,
    /// Mask of the bits.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub mask: u32,
}

/// A write to a control register.
///
/// If `preserve` is set, the register is read first and only the bits in `set` and `clear` are
/// changed. Otherwise `set` is written as the complete register value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUpdate {
    /// The register to update.
    pub register: RegisterRef,
    /// Bits that are set by the update.
    #[serde(default, serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub set: u32,
    /// Bits that are cleared by the update.
    #[serde(default, serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub clear: u32,
    /// Keep the bits of the register not named in `set` or `clear`.
    #[serde(default)]
    pub preserve: bool,
}

impl RegisterUpdate {
    /// Apply the update to the current register value.
    pub fn apply(&self, current: u32) -> u32 {
        if self.preserve {
            (current & !self.clear) | self.set
        } else {
            self.set
        }
    }
}

/// Layout of the core register file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreRegisterFile {
    /// Number of register numbers, including reserved ones.
    pub count: u32,
    /// Prefix for register names without an alias, e.g. `r` for `r12`.
    pub name_prefix: String,
    /// Registers below this number belong to the general register class.
    pub general: u32,
    /// Names replacing `<prefix><number>`.
    #[serde(default)]
    pub aliases: BTreeMap<u32, String>,
    /// Numbers which must never be read or written, e.g. the long-immediate slot.
    #[serde(default)]
    pub reserved: Vec<u32>,
    /// Numbers which are not implemented on this variant.
    #[serde(default)]
    pub absent: Vec<u32>,
    /// Numbers which can only be read.
    #[serde(default)]
    pub read_only: Vec<u32>,
}

/// An auxiliary register the debugger caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxRegisterDescription {
    /// Register name.
    pub name: String,
    /// Register number.
    #[serde(serialize_with = "hex_u_int", deserialize_with = "u32_or_hex")]
    pub number: u32,
    /// Whether the register belongs to the general register class.
    #[serde(default)]
    pub general: bool,
    /// Whether the register can only be read.
    #[serde(default)]
    pub read_only: bool,
}

/// Register class used when listing registers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterClass {
    /// The registers a debugger shows by default.
    General,
    /// Every register of the core.
    All,
}

/// A fully resolved register of a core variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterDescription {
    /// Register name.
    pub name: String,
    /// Address of the register.
    pub register: RegisterRef,
    /// Whether the register belongs to [`RegisterClass::General`].
    pub general: bool,
    /// Whether the register can only be read.
    pub read_only: bool,
    /// Whether the register is implemented on this variant.
    pub exists: bool,
}

impl RegisterDescription {
    /// Whether the register is part of the given class.
    pub fn is_in_class(&self, class: RegisterClass) -> bool {
        match class {
            RegisterClass::General => self.general,
            RegisterClass::All => true,
        }
    }
}

impl CoreRegisterFile {
    /// The name of the register with the given number.
    pub fn name_of(&self, number: u32) -> String {
        self.aliases
            .get(&number)
            .cloned()
            .unwrap_or_else(|| format!("{}{}", self.name_prefix, number))
    }

    /// Whether the number must never be accessed.
    pub fn is_reserved(&self, number: u32) -> bool {
        self.reserved.contains(&number)
    }

    pub(crate) fn descriptions(&self) -> impl Iterator<Item = RegisterDescription> + '_ {
        (0..self.count)
            .filter(|number| !self.is_reserved(*number))
            .map(|number| RegisterDescription {
                name: self.name_of(number),
                register: RegisterRef::core(number),
                general: number < self.general,
                read_only: self.read_only.contains(&number),
                exists: !self.absent.contains(&number),
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn preserving_update_only_touches_named_bits() {
        let update = RegisterUpdate {
            register: RegisterRef::aux(0xa),
            set: 0,
            clear: 0x1,
            preserve: true,
        };

        assert_eq!(update.apply(0x8000_0003), 0x8000_0002);
    }

    #[test]
    fn plain_update_replaces_value() {
        let update = RegisterUpdate {
            register: RegisterRef::aux(0x5),
            set: 0x2,
            clear: 0,
            preserve: false,
        };

        assert_eq!(update.apply(0xffff_ffff), 0x2);
    }

    #[test]
    fn reserved_registers_are_not_described() {
        let file = CoreRegisterFile {
            count: 4,
            name_prefix: "r".to_string(),
            general: 2,
            aliases: BTreeMap::from([(3, "pcl".to_string())]),
            reserved: vec![2],
            absent: vec![1],
            read_only: vec![3],
        };

        let names = file
            .descriptions()
            .map(|description| (description.name, description.exists, description.read_only))
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec![
                ("r0".to_string(), true, false),
                ("r1".to_string(), false, false),
                ("pcl".to_string(), true, true),
            ]
        );
    }
}
