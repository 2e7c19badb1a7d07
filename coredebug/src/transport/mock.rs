use std::{
    collections::{BTreeMap, HashMap, HashSet},
    ops::Range,
    sync::Arc,
};

use coredebug_target::{HaltCause, RegisterKind, RegisterRef, VariantDescription};

use super::{
    AccessWidth, CoreSelector, RegisterTransport, ResetLine, Transaction, TransportError,
};

/// A register write seen by the [`MockTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    /// The written register.
    pub register: RegisterRef,
    /// The written value.
    pub value: u32,
}

/// A simulated core, driven by the run control registers of a [`VariantDescription`].
///
/// Writing the halt request stops the core, writing the resume update starts it, or executes a
/// single instruction if stepping is armed. Everything else is plain storage.
#[derive(Debug)]
pub struct MockTransport {
    variant: Arc<VariantDescription>,
    core_selector: CoreSelector,
    core_registers: HashMap<u32, u32>,
    aux_registers: HashMap<u32, u32>,
    memory: BTreeMap<u32, u8>,
    read_only_memory: Vec<Range<u32>>,
    failing_registers: HashSet<RegisterRef>,
    memory_reads_until_failure: Option<usize>,
    running: bool,
    finish_steps: bool,
    step_length: u32,
    system_reset: bool,
    test_reset: bool,
    writes: Vec<RegisterWrite>,
    read_transactions: usize,
    write_transactions: usize,
}

impl MockTransport {
    /// A running core of the given variant at scan chain position 0.
    pub fn new(variant: Arc<VariantDescription>) -> Self {
        let core_registers = (0..variant.core_registers.count)
            .filter(|number| !variant.core_registers.is_reserved(*number))
            .map(|number| (number, 0x1000_0000 + number))
            .collect();

        Self {
            variant,
            core_selector: CoreSelector(0),
            core_registers,
            aux_registers: HashMap::new(),
            memory: BTreeMap::new(),
            read_only_memory: vec![],
            failing_registers: HashSet::new(),
            memory_reads_until_failure: None,
            running: true,
            finish_steps: true,
            step_length: 4,
            system_reset: false,
            test_reset: false,
            writes: vec![],
            read_transactions: 0,
            write_transactions: 0,
        }
    }

    /// Only accept accesses for `core`.
    pub fn with_core(mut self, core: CoreSelector) -> Self {
        self.core_selector = core;
        self
    }

    /// Whether the simulated core is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the system reset line is asserted.
    pub fn system_reset_asserted(&self) -> bool {
        self.system_reset
    }

    /// Whether the test reset line is asserted.
    pub fn test_reset_asserted(&self) -> bool {
        self.test_reset
    }

    /// Current value of a register, bypassing the transaction log.
    pub fn register(&self, register: RegisterRef) -> u32 {
        let registers = match register.kind {
            RegisterKind::Core => &self.core_registers,
            RegisterKind::Aux => &self.aux_registers,
        };
        registers.get(&register.number).copied().unwrap_or(0)
    }

    /// Set a register, bypassing the transaction log and run control.
    pub fn set_register(&mut self, register: RegisterRef, value: u32) {
        let registers = match register.kind {
            RegisterKind::Core => &mut self.core_registers,
            RegisterKind::Aux => &mut self.aux_registers,
        };
        registers.insert(register.number, value);
    }

    /// The current program counter.
    pub fn pc(&self) -> u32 {
        self.register(self.variant.program_counter)
    }

    /// Fill memory, bypassing read-only ranges.
    pub fn load_memory(&mut self, address: u32, data: &[u8]) {
        for (offset, byte) in data.iter().enumerate() {
            self.memory.insert(address + offset as u32, *byte);
        }
    }

    /// Read memory without logging a transaction.
    pub fn memory(&self, address: u32, len: usize) -> Vec<u8> {
        (0..len as u32)
            .map(|offset| self.memory.get(&(address + offset)).copied().unwrap_or(0))
            .collect()
    }

    /// Silently drop writes to `range`, like ROM does.
    pub fn add_read_only_memory(&mut self, range: Range<u32>) {
        self.read_only_memory.push(range);
    }

    /// Make all accesses to `register` fail.
    pub fn fail_register(&mut self, register: RegisterRef) {
        self.failing_registers.insert(register);
    }

    /// Let every memory read after the next `successful` ones fail.
    pub fn fail_memory_reads_after(&mut self, successful: usize) {
        self.memory_reads_until_failure = Some(successful);
    }

    /// Let single steps never complete.
    pub fn hang_on_step(&mut self) {
        self.finish_steps = false;
    }

    /// How far a single step advances the program counter.
    pub fn set_step_length(&mut self, length: u32) {
        self.step_length = length;
    }

    /// Halt the running core at `pc` as if it executed a trap instruction.
    pub fn hit_trap(&mut self, pc: u32) {
        self.set_register(self.variant.program_counter, pc);
        self.halt(HaltCause::SoftwareBreakpoint);
    }

    /// Halt the running core at `pc` as if comparator `slot` matched.
    pub fn hit_comparator(&mut self, slot: usize, pc: u32) {
        self.set_register(self.variant.program_counter, pc);
        self.halt(HaltCause::Comparator);

        let causes = &self.variant.halt_causes;
        if let Some(shift) = causes.comparator_hits_shift {
            let register = causes.register;
            let value = self.register(register) | 1 << (shift + slot as u32);
            self.set_register(register, value);
        }
    }

    /// Halt the core as if another agent requested it.
    pub fn halt_externally(&mut self) {
        self.halt(HaltCause::Request);
    }

    /// All register writes, oldest first.
    pub fn writes(&self) -> &[RegisterWrite] {
        &self.writes
    }

    /// Register writes to `register`, oldest first.
    pub fn writes_to(&self, register: RegisterRef) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|write| write.register == register)
            .map(|write| write.value)
            .collect()
    }

    /// Number of read transactions, each batch counting once.
    pub fn read_transactions(&self) -> usize {
        self.read_transactions
    }

    /// Number of write transactions, each batch counting once.
    pub fn write_transactions(&self) -> usize {
        self.write_transactions
    }

    /// Forget all logged transactions.
    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.read_transactions = 0;
        self.write_transactions = 0;
    }

    fn halt(&mut self, cause: HaltCause) {
        self.running = false;

        let resume = self.variant.run_control.resume;
        let value = (self.register(resume.register) | resume.clear) & !resume.set;
        self.set_register(resume.register, value);

        let causes = self.variant.halt_causes.clone();
        let mut value = self.register(causes.register);
        for rule in &causes.rules {
            value &= !rule.mask;
        }
        if let Some(shift) = causes.comparator_hits_shift {
            let slots = self.variant.comparators.slots.len() as u32;
            value &= !(((1u32 << slots) - 1) << shift);
        }
        if let Some(rule) = causes.rules.iter().find(|rule| rule.cause == cause) {
            value |= rule.value.unwrap_or(rule.mask);
        }
        self.set_register(causes.register, value);
    }

    fn step_armed(&self) -> bool {
        let step = self.variant.run_control.step_enable;
        step.set != 0 && self.register(step.register) & step.set == step.set
    }

    fn check_core(&self, core: CoreSelector) -> Result<(), TransportError> {
        if core != self.core_selector {
            return Err(TransportError::TransactionFailed(Transaction::Nop, core.0 as u32));
        }
        Ok(())
    }

    fn read_one(&mut self, register: RegisterRef) -> Result<u32, TransportError> {
        if self.failing_registers.contains(&register) {
            let transaction = match register.kind {
                RegisterKind::Core => Transaction::ReadCore,
                RegisterKind::Aux => Transaction::ReadAux,
            };
            return Err(TransportError::TransactionFailed(transaction, register.number));
        }
        Ok(self.register(register))
    }

    fn write_one(&mut self, register: RegisterRef, value: u32) -> Result<(), TransportError> {
        if self.failing_registers.contains(&register) {
            let transaction = match register.kind {
                RegisterKind::Core => Transaction::WriteCore,
                RegisterKind::Aux => Transaction::WriteAux,
            };
            return Err(TransportError::TransactionFailed(transaction, register.number));
        }

        self.writes.push(RegisterWrite { register, value });
        self.set_register(register, value);

        let run_control = self.variant.run_control.clone();
        let halt = run_control.halt_request;
        let resume = run_control.resume;

        if register == halt.register && halt.set != 0 && value & halt.set == halt.set {
            self.halt(HaltCause::Request);
        } else if register == resume.register
            && value & resume.set == resume.set
            && value & resume.clear == 0
        {
            if self.step_armed() {
                if self.finish_steps {
                    let pc = self.pc().wrapping_add(self.step_length);
                    self.set_register(self.variant.program_counter, pc);
                    self.halt(HaltCause::Step);
                } else {
                    self.running = true;
                }
            } else {
                self.running = true;
            }
        }

        Ok(())
    }

    fn read_batch(
        &mut self,
        core: CoreSelector,
        kind: RegisterKind,
        numbers: &[u32],
    ) -> Result<Vec<u32>, TransportError> {
        self.check_core(core)?;
        self.read_transactions += 1;
        numbers
            .iter()
            .map(|number| {
                self.read_one(RegisterRef {
                    kind,
                    number: *number,
                })
            })
            .collect()
    }

    fn write_batch(
        &mut self,
        core: CoreSelector,
        kind: RegisterKind,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError> {
        self.check_core(core)?;
        self.write_transactions += 1;
        for (number, value) in writes {
            self.write_one(
                RegisterRef {
                    kind,
                    number: *number,
                },
                *value,
            )?;
        }
        Ok(())
    }
}

impl RegisterTransport for MockTransport {
    fn read_core_registers(
        &mut self,
        core: CoreSelector,
        numbers: &[u32],
    ) -> Result<Vec<u32>, TransportError> {
        self.read_batch(core, RegisterKind::Core, numbers)
    }

    fn write_core_registers(
        &mut self,
        core: CoreSelector,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError> {
        self.write_batch(core, RegisterKind::Core, writes)
    }

    fn read_aux_registers(
        &mut self,
        core: CoreSelector,
        numbers: &[u32],
    ) -> Result<Vec<u32>, TransportError> {
        self.read_batch(core, RegisterKind::Aux, numbers)
    }

    fn write_aux_registers(
        &mut self,
        core: CoreSelector,
        writes: &[(u32, u32)],
    ) -> Result<(), TransportError> {
        self.write_batch(core, RegisterKind::Aux, writes)
    }

    fn read_memory(
        &mut self,
        core: CoreSelector,
        address: u32,
        width: AccessWidth,
        count: usize,
    ) -> Result<Vec<u8>, TransportError> {
        self.check_core(core)?;
        match &mut self.memory_reads_until_failure {
            Some(0) => {
                return Err(TransportError::TransactionFailed(
                    Transaction::ReadMemory,
                    address,
                ))
            }
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        self.read_transactions += 1;
        Ok(self.memory(address, count * width.bytes() as usize))
    }

    fn write_memory(
        &mut self,
        core: CoreSelector,
        address: u32,
        width: AccessWidth,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.check_core(core)?;
        if data.len() % width.bytes() as usize != 0 {
            return Err(TransportError::InvalidLength {
                address,
                len: data.len(),
            });
        }
        self.write_transactions += 1;

        for (offset, byte) in data.iter().enumerate() {
            let address = address + offset as u32;
            if self
                .read_only_memory
                .iter()
                .any(|range| range.contains(&address))
            {
                continue;
            }
            self.memory.insert(address, *byte);
        }
        Ok(())
    }

    fn read_status(&mut self, core: CoreSelector) -> Result<u32, TransportError> {
        self.check_core(core)?;
        if self.running {
            Ok(self.variant.run_control.running_mask)
        } else {
            Ok(0)
        }
    }

    fn set_reset_line(&mut self, line: ResetLine, asserted: bool) -> Result<(), TransportError> {
        match line {
            ResetLine::System => {
                if asserted {
                    // The core restarts from its reset vector.
                    self.set_register(self.variant.program_counter, 0);
                    self.running = true;
                }
                self.system_reset = asserted;
            }
            ResetLine::Test => self.test_reset = asserted,
        }
        Ok(())
    }
}
