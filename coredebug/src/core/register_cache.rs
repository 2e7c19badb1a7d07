use std::collections::HashMap;

use coredebug_target::{
    RegisterClass, RegisterDescription, RegisterKind, RegisterRef, VariantDescription,
};

/// The cached state of one register.
///
/// An entry is never dirty without being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    description: RegisterDescription,
    value: u32,
    valid: bool,
    dirty: bool,
}

impl CacheEntry {
    /// The register this entry caches.
    pub fn description(&self) -> &RegisterDescription {
        &self.description
    }

    /// The register name.
    pub fn name(&self) -> &str {
        &self.description.name
    }

    /// The register address.
    pub fn register(&self) -> RegisterRef {
        self.description.register
    }

    /// The cached value, if it reflects the hardware or a pending write.
    pub fn value(&self) -> Option<u32> {
        self.valid.then_some(self.value)
    }

    /// Whether the cached value reflects the hardware or a pending write.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether the cached value still needs to be written to the hardware.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the register is implemented by the core.
    pub fn exists(&self) -> bool {
        self.description.exists
    }
}

/// Register values of a halted core.
#[derive(Debug, Clone)]
pub struct RegisterCache {
    entries: Vec<CacheEntry>,
    index: HashMap<RegisterRef, usize>,
    saved: bool,
}

impl RegisterCache {
    /// An empty cache for all registers of `variant`.
    pub fn new(variant: &VariantDescription) -> Self {
        let entries = variant
            .registers()
            .into_iter()
            .map(|description| CacheEntry {
                description,
                value: 0,
                valid: false,
                dirty: false,
            })
            .collect::<Vec<_>>();

        let index = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.register(), index))
            .collect();

        Self {
            entries,
            index,
            saved: false,
        }
    }

    /// All entries, core registers first.
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Entries of a register class.
    pub fn class(&self, class: RegisterClass) -> impl Iterator<Item = &CacheEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.description.is_in_class(class))
    }

    /// The entry of a register.
    pub fn entry(&self, register: RegisterRef) -> Option<&CacheEntry> {
        self.index.get(&register).map(|index| &self.entries[*index])
    }

    fn entry_mut(&mut self, register: RegisterRef) -> Option<&mut CacheEntry> {
        self.index
            .get(&register)
            .map(|index| &mut self.entries[*index])
    }

    /// Whether a context was saved since the registers were last invalidated.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub(crate) fn mark_saved(&mut self) {
        self.saved = true;
    }

    /// Forget all values. Pending writes are dropped.
    pub(crate) fn invalidate(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
            entry.dirty = false;
        }
        self.saved = false;
    }

    /// Forget the value of a single register. A pending write is dropped.
    pub(crate) fn forget(&mut self, register: RegisterRef) {
        if let Some(entry) = self.entry_mut(register) {
            entry.valid = false;
            entry.dirty = false;
        }
    }

    /// Store a value read from the hardware.
    pub(crate) fn store(&mut self, register: RegisterRef, value: u32) {
        if let Some(entry) = self.entry_mut(register) {
            entry.value = value;
            entry.valid = true;
            entry.dirty = false;
        }
    }

    /// Store a value which still has to be written to the hardware.
    pub(crate) fn store_dirty(&mut self, register: RegisterRef, value: u32) {
        if let Some(entry) = self.entry_mut(register) {
            entry.value = value;
            entry.valid = true;
            entry.dirty = true;
        }
    }

    /// Update a valid, clean entry after the debugger wrote the hardware register directly.
    pub(crate) fn refresh(&mut self, register: RegisterRef, value: u32) {
        if let Some(entry) = self.entry_mut(register) {
            if entry.valid && !entry.dirty {
                entry.value = value;
            }
        }
    }

    /// Numbers of existing registers of `kind` without a valid value.
    pub(crate) fn stale(&self, kind: RegisterKind) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|entry| entry.register().kind == kind && entry.exists() && !entry.valid)
            .map(|entry| entry.register().number)
            .collect()
    }

    /// Pending writes to registers of `kind`.
    pub(crate) fn dirty(&self, kind: RegisterKind) -> Vec<(u32, u32)> {
        self.entries
            .iter()
            .filter(|entry| entry.register().kind == kind && entry.dirty)
            .map(|entry| (entry.register().number, entry.value))
            .collect()
    }

    pub(crate) fn mark_clean(&mut self, kind: RegisterKind) {
        for entry in &mut self.entries {
            if entry.register().kind == kind {
                entry.dirty = false;
            }
        }
    }
}
