//! Breakpoint and watchpoint management.
//!
//! Breakpoints and watchpoints requested while the core runs are recorded as pending and installed
//! on the next resume, so hardware is only touched while the core is halted.

use coredebug_target::{ComparatorMatch, ComparatorSlotDescription};

use super::Core;
use crate::{error::Resource, transport::AccessWidth, Error};

/// How a breakpoint is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind {
    /// A hardware comparator matches the instruction address.
    Hardware,
    /// The instruction is replaced by a trap instruction.
    Software,
}

/// Where a breakpoint currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Installation {
    /// Not installed yet.
    Pending,
    /// Programmed into a comparator slot.
    Comparator(usize),
    /// Memory holds the trap instruction, `original` is the replaced instruction.
    Patched {
        /// The replaced instruction bytes.
        original: Vec<u8>,
    },
}

/// A breakpoint requested by the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    address: u32,
    length: u32,
    kind: BreakpointKind,
    installation: Installation,
}

impl Breakpoint {
    /// The instruction address.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// The length of the guarded instruction, 2 or 4 bytes.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// How the breakpoint is implemented.
    pub fn kind(&self) -> BreakpointKind {
        self.kind
    }

    /// Whether the breakpoint is installed.
    pub fn is_set(&self) -> bool {
        self.installation != Installation::Pending
    }

    /// The current installation.
    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    /// The comparator slot of an installed hardware breakpoint.
    pub fn comparator(&self) -> Option<usize> {
        match self.installation {
            Installation::Comparator(slot) => Some(slot),
            _ => None,
        }
    }

    /// The replaced instruction of an installed software breakpoint.
    pub fn original_instruction(&self) -> Option<&[u8]> {
        match &self.installation {
            Installation::Patched { original } => Some(original),
            _ => None,
        }
    }
}

/// The accesses a watchpoint triggers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchpointAccess {
    /// Data reads.
    Read,
    /// Data writes.
    Write,
    /// Data reads and writes.
    Access,
}

impl From<WatchpointAccess> for ComparatorMatch {
    fn from(access: WatchpointAccess) -> Self {
        match access {
            WatchpointAccess::Read => ComparatorMatch::Read,
            WatchpointAccess::Write => ComparatorMatch::Write,
            WatchpointAccess::Access => ComparatorMatch::Access,
        }
    }
}

/// A data watchpoint requested by the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchpoint {
    address: u32,
    length: u32,
    access: WatchpointAccess,
    comparator: Option<usize>,
}

impl Watchpoint {
    /// The start address of the watched range.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// The length of the watched range.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// The accesses which trigger.
    pub fn access(&self) -> WatchpointAccess {
        self.access
    }

    /// Whether the watchpoint is installed.
    pub fn is_set(&self) -> bool {
        self.comparator.is_some()
    }

    /// The comparator slot of the installed watchpoint.
    pub fn comparator(&self) -> Option<usize> {
        self.comparator
    }
}

/// Usage of a hardware comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComparatorSlot {
    /// The slot is programmed.
    pub used: bool,
    /// The programmed address.
    pub value: u32,
    /// The programmed match, if used.
    pub kind: Option<ComparatorMatch>,
}

impl<'probe> Core<'probe> {
    /// All breakpoints.
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.state.breakpoints
    }

    /// All watchpoints.
    pub fn watchpoints(&self) -> &[Watchpoint] {
        &self.state.watchpoints
    }

    /// The state of the comparator slots.
    pub fn comparator_slots(&self) -> &[ComparatorSlot] {
        &self.state.comparators
    }

    /// Add a breakpoint at `address` for an instruction of `length` bytes.
    ///
    /// While the core runs, the breakpoint is installed on the next resume.
    #[tracing::instrument(skip(self))]
    pub fn add_breakpoint(
        &mut self,
        address: u32,
        length: u32,
        kind: BreakpointKind,
    ) -> Result<(), Error> {
        if length != 2 && length != 4 {
            return Err(Error::SyntaxError(format!(
                "breakpoint length must be 2 or 4 bytes, not {length}"
            )));
        }
        if address % 2 != 0 {
            return Err(Error::SyntaxError(format!(
                "breakpoint address {address:#010x} is not halfword aligned"
            )));
        }
        if self.breakpoint_index(address).is_some() {
            return Err(Error::SyntaxError(format!(
                "there already is a breakpoint at {address:#010x}"
            )));
        }
        if kind == BreakpointKind::Hardware {
            self.ensure_comparator_available(ComparatorMatch::Execute, false)?;
        }

        self.state.breakpoints.push(Breakpoint {
            address,
            length,
            kind,
            installation: Installation::Pending,
        });

        if self.state.run_state.is_halted() {
            let index = self.state.breakpoints.len() - 1;
            if let Err(error) = self.install_breakpoint(index) {
                self.state.breakpoints.remove(index);
                return Err(error);
            }
        } else {
            tracing::debug!("Core is not halted, breakpoint at {:#010x} is pending", address);
        }

        Ok(())
    }

    /// Remove the breakpoint at `address`.
    #[tracing::instrument(skip(self))]
    pub fn remove_breakpoint(&mut self, address: u32) -> Result<(), Error> {
        let index = self.breakpoint_index(address).ok_or_else(|| {
            Error::SyntaxError(format!("there is no breakpoint at {address:#010x}"))
        })?;

        if self.state.breakpoints[index].is_set() {
            if !self.state.run_state.is_halted() {
                return Err(Error::NotHalted);
            }
            self.uninstall_breakpoint(index)?;
        }

        self.state.breakpoints.remove(index);
        Ok(())
    }

    /// Add a watchpoint on `length` bytes at `address`.
    ///
    /// While the core runs, the watchpoint is installed on the next resume.
    #[tracing::instrument(skip(self))]
    pub fn add_watchpoint(
        &mut self,
        address: u32,
        length: u32,
        access: WatchpointAccess,
    ) -> Result<(), Error> {
        if !length.is_power_of_two() {
            return Err(Error::SyntaxError(format!(
                "watchpoint length {length} is not a power of two"
            )));
        }
        if address % length != 0 {
            return Err(Error::SyntaxError(format!(
                "watchpoint address {address:#010x} is not aligned to its length {length}"
            )));
        }

        let maskable = self
            .state
            .variant
            .comparators
            .slots
            .iter()
            .any(|slot| slot.data && slot.mask.is_some());
        if length > 4 && !maskable {
            return Err(Error::Unsupported("watchpoints on more than 4 bytes"));
        }

        if self.watchpoint_index(address).is_some() {
            return Err(Error::SyntaxError(format!(
                "there already is a watchpoint at {address:#010x}"
            )));
        }
        self.ensure_comparator_available(access.into(), length > 4)?;

        self.state.watchpoints.push(Watchpoint {
            address,
            length,
            access,
            comparator: None,
        });

        if self.state.run_state.is_halted() {
            let index = self.state.watchpoints.len() - 1;
            if let Err(error) = self.install_watchpoint(index) {
                self.state.watchpoints.remove(index);
                return Err(error);
            }
        }

        Ok(())
    }

    /// Remove the watchpoint at `address`.
    #[tracing::instrument(skip(self))]
    pub fn remove_watchpoint(&mut self, address: u32) -> Result<(), Error> {
        let index = self.watchpoint_index(address).ok_or_else(|| {
            Error::SyntaxError(format!("there is no watchpoint at {address:#010x}"))
        })?;

        if let Some(slot) = self.state.watchpoints[index].comparator {
            if !self.state.run_state.is_halted() {
                return Err(Error::NotHalted);
            }
            self.disable_comparator(slot)?;
        }

        self.state.watchpoints.remove(index);
        Ok(())
    }

    /// Install all breakpoints and watchpoints which are not installed yet.
    pub(crate) fn enable_pending(&mut self) -> Result<(), Error> {
        for index in 0..self.state.breakpoints.len() {
            if !self.state.breakpoints[index].is_set() {
                self.install_breakpoint(index)?;
            }
        }

        for index in 0..self.state.watchpoints.len() {
            if !self.state.watchpoints[index].is_set() {
                self.install_watchpoint(index)?;
            }
        }

        Ok(())
    }

    /// The index of an installed breakpoint at `address`.
    pub(crate) fn installed_breakpoint_at(&self, address: u32) -> Option<usize> {
        self.state
            .breakpoints
            .iter()
            .position(|breakpoint| breakpoint.address == address && breakpoint.is_set())
    }

    pub(crate) fn install_breakpoint(&mut self, index: usize) -> Result<(), Error> {
        let breakpoint = &self.state.breakpoints[index];
        let address = breakpoint.address;

        let installation = match breakpoint.kind {
            BreakpointKind::Hardware => {
                let slot = self.free_comparator(SlotRequest::Breakpoint(index))?;
                self.program_comparator(slot, address, 0, ComparatorMatch::Execute)?;
                Installation::Comparator(slot)
            }
            BreakpointKind::Software => {
                let original = self.patch_trap(address, breakpoint.length)?;
                Installation::Patched { original }
            }
        };

        tracing::debug!("Installed breakpoint at {:#010x}: {:?}", address, installation);
        self.state.breakpoints[index].installation = installation;
        Ok(())
    }

    pub(crate) fn uninstall_breakpoint(&mut self, index: usize) -> Result<(), Error> {
        let breakpoint = self.state.breakpoints[index].clone();

        match &breakpoint.installation {
            Installation::Pending => return Ok(()),
            Installation::Comparator(slot) => self.disable_comparator(*slot)?,
            Installation::Patched { original } => {
                self.restore_instruction(breakpoint.address, original)?
            }
        }

        tracing::debug!("Removed breakpoint at {:#010x}", breakpoint.address);
        self.state.breakpoints[index].installation = Installation::Pending;
        Ok(())
    }

    fn install_watchpoint(&mut self, index: usize) -> Result<(), Error> {
        let watchpoint = &self.state.watchpoints[index];
        let (address, length) = (watchpoint.address, watchpoint.length);
        let kind = ComparatorMatch::from(watchpoint.access);

        let slot = self.free_comparator(SlotRequest::Watchpoint(index))?;
        self.program_comparator(slot, address, length - 1, kind)?;

        tracing::debug!("Installed watchpoint at {:#010x} in slot {}", address, slot);
        self.state.watchpoints[index].comparator = Some(slot);
        Ok(())
    }

    /// Replace the instruction at `address` with a trap instruction, returning the original.
    fn patch_trap(&mut self, address: u32, length: u32) -> Result<Vec<u8>, Error> {
        let trap = self
            .state
            .variant
            .trap_instructions
            .for_length(length)
            .ok_or(Error::Unsupported("breakpoints of this length"))?
            .to_vec();
        let core = self.state.selector;
        let count = length as usize / 2;

        self.flush_data_cache()?;
        let original = self
            .transport
            .read_memory(core, address, AccessWidth::U16, count)?;
        self.transport
            .write_memory(core, address, AccessWidth::U16, &trap)?;

        // The write itself succeeded, a failed verification only lowers the confidence.
        match self
            .transport
            .read_memory(core, address, AccessWidth::U16, count)
        {
            Ok(written) if written == trap => {}
            Ok(written) => tracing::warn!(
                "Breakpoint at {:#010x} reads back as {:02x?} instead of {:02x?}, is the memory writable?",
                address,
                written,
                trap
            ),
            Err(error) => tracing::warn!(
                "Could not verify breakpoint at {:#010x}: {}",
                address,
                error
            ),
        }

        self.invalidate_caches()?;
        Ok(original)
    }

    /// Put the original instruction back, unless the trap was overwritten in the meantime.
    fn restore_instruction(&mut self, address: u32, original: &[u8]) -> Result<(), Error> {
        let trap = self
            .state
            .variant
            .trap_instructions
            .for_length(original.len() as u32)
            .ok_or(Error::Unsupported("breakpoints of this length"))?
            .to_vec();
        let core = self.state.selector;

        self.flush_data_cache()?;
        let current = self
            .transport
            .read_memory(core, address, AccessWidth::U16, original.len() / 2)?;

        if current == trap {
            self.transport
                .write_memory(core, address, AccessWidth::U16, original)?;
        } else {
            tracing::warn!(
                "Memory at {:#010x} no longer holds the breakpoint instruction, leaving it untouched",
                address
            );
        }

        self.invalidate_caches()
    }

    fn breakpoint_index(&self, address: u32) -> Option<usize> {
        self.state
            .breakpoints
            .iter()
            .position(|breakpoint| breakpoint.address == address)
    }

    fn watchpoint_index(&self, address: u32) -> Option<usize> {
        self.state
            .watchpoints
            .iter()
            .position(|watchpoint| watchpoint.address == address)
    }

    /// Check that a new request of `kind` can still be served once all pending requests are
    /// installed. `masked` requests need a slot with an address mask register.
    fn ensure_comparator_available(
        &self,
        kind: ComparatorMatch,
        masked: bool,
    ) -> Result<(), Error> {
        let mut requests = vec![(kind, masked)];
        requests.extend(self.pending_requests(None));

        match self.assign_comparators(&requests) {
            Some(_) => Ok(()),
            None => Err(Error::ResourceNotAvailable(resource(kind))),
        }
    }

    /// Pick a free slot for `request`, leaving a slot for every other pending request.
    fn free_comparator(&self, request: SlotRequest) -> Result<usize, Error> {
        let (kind, masked) = self.request_kind(request);
        let mut requests = vec![(kind, masked)];
        requests.extend(self.pending_requests(Some(request)));

        self.assign_comparators(&requests)
            .map(|assignment| assignment[0])
            .ok_or(Error::ResourceNotAvailable(resource(kind)))
    }

    fn request_kind(&self, request: SlotRequest) -> (ComparatorMatch, bool) {
        match request {
            SlotRequest::Breakpoint(_) => (ComparatorMatch::Execute, false),
            SlotRequest::Watchpoint(index) => {
                let watchpoint = &self.state.watchpoints[index];
                (watchpoint.access.into(), watchpoint.length > 4)
            }
        }
    }

    /// Comparator requests of all pending hardware breakpoints and watchpoints.
    fn pending_requests<'a>(
        &'a self,
        except: Option<SlotRequest>,
    ) -> impl Iterator<Item = (ComparatorMatch, bool)> + use<'a, 'probe> {
        let breakpoints = self
            .state
            .breakpoints
            .iter()
            .enumerate()
            .filter(|(_, breakpoint)| {
                breakpoint.kind == BreakpointKind::Hardware && !breakpoint.is_set()
            })
            .map(|(index, _)| SlotRequest::Breakpoint(index));
        let watchpoints = self
            .state
            .watchpoints
            .iter()
            .enumerate()
            .filter(|(_, watchpoint)| !watchpoint.is_set())
            .map(|(index, _)| SlotRequest::Watchpoint(index));

        breakpoints
            .chain(watchpoints)
            .filter(move |request| Some(*request) != except)
            .map(move |request| self.request_kind(request))
    }

    /// Assign a distinct free slot to every request, or `None` if they do not all fit.
    ///
    /// Unmasked requests try slots without a mask register first.
    fn assign_comparators(&self, requests: &[(ComparatorMatch, bool)]) -> Option<Vec<usize>> {
        let slots = &self.state.variant.comparators.slots;
        let candidates = requests
            .iter()
            .map(|&(kind, masked)| {
                let mut fitting = slots
                    .iter()
                    .zip(&self.state.comparators)
                    .enumerate()
                    .filter(|(_, (description, slot))| {
                        !slot.used && fits(description, kind, masked)
                    })
                    .map(|(index, (description, _))| (description.mask.is_some(), index))
                    .collect::<Vec<_>>();
                if !masked {
                    fitting.sort();
                }
                fitting.into_iter().map(|(_, index)| index).collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let mut owners = vec![None; slots.len()];
        for request in 0..requests.len() {
            let mut visited = vec![false; slots.len()];
            if !claim_slot(request, &candidates, &mut owners, &mut visited) {
                return None;
            }
        }

        let mut assignment = vec![0; requests.len()];
        for (slot, owner) in owners.iter().enumerate() {
            if let Some(request) = owner {
                assignment[*request] = slot;
            }
        }
        Some(assignment)
    }

    fn program_comparator(
        &mut self,
        slot: usize,
        value: u32,
        mask: u32,
        kind: ComparatorMatch,
    ) -> Result<(), Error> {
        let core = self.state.selector;
        let description = self.state.variant.comparators.slots[slot].clone();
        let control = self.state.variant.comparators.control.enable_value(kind);

        self.transport
            .write_register(core, description.value, value)?;
        if let Some(mask_register) = description.mask {
            self.transport.write_register(core, mask_register, mask)?;
        }
        self.transport
            .write_register(core, description.control, control)?;

        self.state.comparators[slot] = ComparatorSlot {
            used: true,
            value,
            kind: Some(kind),
        };
        Ok(())
    }

    fn disable_comparator(&mut self, slot: usize) -> Result<(), Error> {
        let core = self.state.selector;
        let control = self.state.variant.comparators.slots[slot].control;
        let disabled = self.state.variant.comparators.control.disabled;

        self.transport.write_register(core, control, disabled)?;

        self.state.comparators[slot] = ComparatorSlot::default();
        Ok(())
    }
}

/// A breakpoint or watchpoint asking for a comparator, by table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotRequest {
    Breakpoint(usize),
    Watchpoint(usize),
}

/// Find a slot for `request`, moving earlier requests to other candidates if needed.
fn claim_slot(
    request: usize,
    candidates: &[Vec<usize>],
    owners: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &slot in &candidates[request] {
        if visited[slot] {
            continue;
        }
        visited[slot] = true;

        let free = match owners[slot] {
            None => true,
            Some(owner) => claim_slot(owner, candidates, owners, visited),
        };
        if free {
            owners[slot] = Some(request);
            return true;
        }
    }
    false
}

fn fits(description: &ComparatorSlotDescription, kind: ComparatorMatch, masked: bool) -> bool {
    description.supports(kind) && (!masked || description.mask.is_some())
}

fn resource(kind: ComparatorMatch) -> Resource {
    if kind.is_instruction() {
        Resource::InstructionComparator
    } else {
        Resource::DataComparator
    }
}
