use serde::{Deserialize, Serialize};

use crate::{
    AuxRegisterDescription, CacheDescription, ComparatorDescription, CoreRegisterFile,
    HaltCauses, RegisterDescription, RegisterKind, RegisterRef, RunControl,
};

/// The families of cores the debug engine knows how to drive.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreFamily {
    /// ARCv2 EM cores.
    ArcEm,
    /// ARCv2 HS cores.
    ArcHs,
    /// Small RISC-V cores with two comparators.
    Rv32Lite,
    /// RISC-V cores with four comparators.
    Rv32,
}

/// Source of a variant description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VariantDescriptionSource {
    /// Shipped with the debug engine.
    BuiltIn,
    /// Loaded at runtime.
    External,
}

/// Trap instruction encodings, as they are laid out in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapInstructions {
    /// The 2 byte encoding.
    pub narrow: Vec<u8>,
    /// The 4 byte encoding.
    pub wide: Vec<u8>,
}

impl TrapInstructions {
    /// The trap instruction replacing an instruction of `length` bytes.
    pub fn for_length(&self, length: u32) -> Option<&[u8]> {
        match length {
            2 => Some(&self.narrow),
            4 => Some(&self.wide),
            _ => None,
        }
    }
}

/// Everything the debug engine needs to know about one core variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDescription {
    /// The variant name, e.g. `arc_em`.
    pub name: String,
    /// The family the variant belongs to.
    pub family: CoreFamily,
    /// Layout of the core register file.
    pub core_registers: CoreRegisterFile,
    /// The auxiliary registers saved on every halt.
    pub aux_registers: Vec<AuxRegisterDescription>,
    /// The program counter.
    pub program_counter: RegisterRef,
    /// Run control.
    pub run_control: RunControl,
    /// Halt cause decoding.
    pub halt_causes: HaltCauses,
    /// Hardware comparators.
    pub comparators: ComparatorDescription,
    /// Software breakpoint encodings.
    pub trap_instructions: TrapInstructions,
    /// Cache maintenance.
    #[serde(default)]
    pub caches: CacheDescription,
}

impl VariantDescription {
    /// All registers of the variant, core registers first.
    ///
    /// Reserved register numbers are not part of the list.
    pub fn registers(&self) -> Vec<RegisterDescription> {
        let aux = self.aux_registers.iter().map(|aux| {
            let register = RegisterRef::aux(aux.number);
            RegisterDescription {
                name: aux.name.clone(),
                register,
                general: aux.general || register == self.program_counter,
                read_only: aux.read_only,
                exists: true,
            }
        });

        self.core_registers.descriptions().chain(aux).collect()
    }

    /// Whether the register must never be accessed.
    pub fn is_reserved(&self, register: RegisterRef) -> bool {
        register.kind == RegisterKind::Core && self.core_registers.is_reserved(register.number)
    }

    /// Checks the description for inconsistencies.
    pub fn validate(&self) -> Result<(), String> {
        self.validate_registers()?;
        self.validate_comparators()?;
        self.validate_trap_instructions()?;

        Ok(())
    }

    fn validate_registers(&self) -> Result<(), String> {
        let file = &self.core_registers;

        if let Some(number) = file
            .reserved
            .iter()
            .chain(&file.absent)
            .chain(&file.read_only)
            .find(|number| **number >= file.count)
        {
            return Err(format!(
                "variant `{}` names core register {} but only has {} core registers",
                self.name, number, file.count
            ));
        }

        if self.is_reserved(self.program_counter) {
            return Err(format!(
                "the program counter of variant `{}` is a reserved register",
                self.name
            ));
        }

        let is_known = self
            .registers()
            .iter()
            .any(|register| register.register == self.program_counter && register.exists);
        if !is_known {
            return Err(format!(
                "the program counter of variant `{}` ({}) is not part of the register list",
                self.name, self.program_counter
            ));
        }

        Ok(())
    }

    fn validate_comparators(&self) -> Result<(), String> {
        let slots = &self.comparators.slots;

        if slots.is_empty() {
            return Err(format!("variant `{}` has no comparators", self.name));
        }

        // The cause register reports hits with one bit per slot.
        if slots.len() > 8 {
            return Err(format!(
                "variant `{}` has {} comparators, at most 8 are supported",
                self.name,
                slots.len()
            ));
        }

        if let Some(slot) = slots.iter().position(|slot| !slot.instruction && !slot.data) {
            return Err(format!(
                "comparator {} of variant `{}` can neither match instructions nor data",
                slot, self.name
            ));
        }

        Ok(())
    }

    fn validate_trap_instructions(&self) -> Result<(), String> {
        let trap = &self.trap_instructions;

        if trap.narrow.len() != 2 || trap.wide.len() != 4 {
            return Err(format!(
                "variant `{}` needs a 2 byte and a 4 byte trap instruction, got {} and {} bytes",
                self.name,
                trap.narrow.len(),
                trap.wide.len()
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const VARIANT: &str = r#"
name: tiny
family: rv32_lite
core_registers:
  count: 4
  name_prefix: x
  general: 4
  aliases:
    0: zero
  reserved: [3]
  absent: [2]
  read_only: [0]
aux_registers:
  - { name: status, number: 0x300 }
  - { name: pc, number: 0x7b1 }
program_counter: { kind: aux, number: 0x7b1 }
run_control:
  running_mask: 0x10
  halt_request: { register: { kind: aux, number: 0x7c0 }, set: 0x1 }
  resume: { register: { kind: aux, number: 0x7c0 }, set: 0x2 }
  step_enable: { register: { kind: aux, number: 0x7b0 }, set: 0x4, preserve: true }
halt_causes:
  register: { kind: aux, number: 0x7b0 }
  rules:
    - { mask: 0x1c0, value: 0x40, cause: software_breakpoint }
comparators:
  control: { disabled: 0x0, execute: 0x44, read: 0x41, write: 0x42, access: 0x43 }
  slots:
    - value: { kind: aux, number: 0x7d0 }
      control: { kind: aux, number: 0x7d8 }
trap_instructions:
  narrow: [0x02, 0x90]
  wide: [0x73, 0x00, 0x10, 0x00]
"#;

    fn variant() -> VariantDescription {
        serde_yaml::from_str(VARIANT).unwrap()
    }

    #[test]
    fn parse_variant() {
        let variant = variant();

        assert_eq!(variant.family, CoreFamily::Rv32Lite);
        assert_eq!(variant.program_counter, RegisterRef::aux(0x7b1));
        assert!(variant.comparators.slots[0].instruction);
        assert!(variant.comparators.slots[0].data);
        assert_eq!(variant.caches, CacheDescription::default());
        assert_eq!(variant.validate(), Ok(()));
    }

    #[test]
    fn registers_are_listed_core_first() {
        let names = variant()
            .registers()
            .into_iter()
            .map(|register| (register.name, register.general, register.exists))
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec![
                ("zero".to_string(), true, true),
                ("x1".to_string(), true, true),
                ("x2".to_string(), true, false),
                ("status".to_string(), false, true),
                ("pc".to_string(), true, true),
            ]
        );
    }

    #[test]
    fn reserved_core_registers() {
        let variant = variant();

        assert!(variant.is_reserved(RegisterRef::core(3)));
        assert!(!variant.is_reserved(RegisterRef::core(2)));
        assert!(!variant.is_reserved(RegisterRef::aux(3)));
    }

    #[test_case(|v| v.core_registers.read_only.push(7); "register number out of range")]
    #[test_case(|v| v.program_counter = RegisterRef::core(3); "reserved program counter")]
    #[test_case(|v| v.program_counter = RegisterRef::core(2); "absent program counter")]
    #[test_case(|v| v.comparators.slots.clear(); "no comparators")]
    #[test_case(|v| {
        let slot = v.comparators.slots[0].clone();
        v.comparators.slots = vec![slot; 9];
    }; "too many comparators")]
    #[test_case(|v| {
        v.comparators.slots[0].instruction = false;
        v.comparators.slots[0].data = false;
    }; "useless comparator")]
    #[test_case(|v| { v.trap_instructions.wide.pop(); }; "short trap instruction")]
    fn invalid_variants(change: fn(&mut VariantDescription)) {
        let mut variant = variant();
        change(&mut variant);

        assert!(variant.validate().is_err());
    }

    #[test]
    fn numbers_are_written_as_hex_and_read_back() {
        let yaml = serde_yaml::to_string(&variant()).unwrap();
        assert!(yaml.contains("0x7b1"), "{yaml}");
        assert!(yaml.contains("0x1c0"), "{yaml}");

        let parsed: VariantDescription = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed, variant());
    }

    #[test_case("{ kind: aux, number: 0x7b1 }"; "hex")]
    #[test_case("{ kind: aux, number: '0x7b1' }"; "hex string")]
    #[test_case("{ kind: aux, number: 1969 }"; "decimal")]
    #[test_case("{ kind: aux, number: '0b11110110001' }"; "binary string")]
    fn register_numbers(yaml: &str) {
        let register: RegisterRef = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(register, RegisterRef::aux(0x7b1));
    }

    #[test]
    fn oversized_numbers_are_rejected() {
        let result = serde_yaml::from_str::<RegisterRef>("{ kind: aux, number: 0x1_0000_0000 }");

        assert!(result.is_err());
    }

    // Kept in its own module so the test_case-generated `use super::*` does not glob-import
    // `pretty_assertions::assert_eq`, which is ambiguous with the prelude macro.
    mod trap_lengths {
        use test_case::test_case;

        use super::variant;

        #[test_case(2 => Some(vec![0x02, 0x90]))]
        #[test_case(4 => Some(vec![0x73, 0x00, 0x10, 0x00]))]
        #[test_case(3 => None)]
        fn trap_for_length(length: u32) -> Option<Vec<u8>> {
            variant()
                .trap_instructions
                .for_length(length)
                .map(<[u8]>::to_vec)
        }
    }
}
