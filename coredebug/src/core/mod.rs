//! The debug state machine of a single core.
//!
//! A [`CoreState`] holds everything the debugger knows about one core: run state, cached
//! registers, breakpoints and comparator usage. It is borrowed together with a
//! [`RegisterTransport`] as a [`Core`], which implements the host facing operations.
//!
//! Every supported core is driven by the same code. The differences are all in the
//! [`VariantDescription`] the state was created with.

mod breakpoints;
mod cache;
mod register_cache;
mod status;

pub use breakpoints::{
    Breakpoint, BreakpointKind, ComparatorSlot, Installation, Watchpoint, WatchpointAccess,
};
pub use register_cache::{CacheEntry, RegisterCache};
pub use status::{DebugReason, RunState, TargetEvent};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use coredebug_target::{
    HaltCause, HaltCauses, RegisterClass, RegisterKind, RegisterRef, RegisterUpdate,
    VariantDescription,
};

use crate::{
    config::CoreOptions,
    error::OperationError,
    transport::{AccessWidth, CoreSelector, RegisterTransport, ResetLine},
    Error,
};
use cache::CacheState;

/// The debugger side state of one core.
///
/// Created when the debugger attaches to a core and kept for the whole session.
#[derive(Debug)]
pub struct CoreState {
    selector: CoreSelector,
    variant: Arc<VariantDescription>,
    options: CoreOptions,
    run_state: RunState,
    debug_reason: DebugReason,
    /// Reason for the next halt, set by operations which cause one.
    requested_reason: Option<DebugReason>,
    registers: RegisterCache,
    breakpoints: Vec<Breakpoint>,
    watchpoints: Vec<Watchpoint>,
    comparators: Vec<ComparatorSlot>,
    cache: CacheState,
    /// Interrupts were disabled by a debug execution resume.
    interrupts_masked: bool,
    /// Address of the watchpoint which caused the last halt.
    hit_watchpoint: Option<u32>,
    srst_asserted: bool,
    trst_asserted: bool,
    halt_after_reset: bool,
}

impl CoreState {
    /// State for the core at `selector`, driven according to `variant`.
    pub fn new(selector: CoreSelector, variant: Arc<VariantDescription>, options: CoreOptions) -> Self {
        let registers = RegisterCache::new(&variant);
        let comparators = vec![ComparatorSlot::default(); variant.comparators.slots.len()];
        let cache = CacheState::new(options.dcache_flush);

        Self {
            selector,
            variant,
            options,
            run_state: RunState::Unknown,
            debug_reason: DebugReason::NotHalted,
            requested_reason: None,
            registers,
            breakpoints: vec![],
            watchpoints: vec![],
            comparators,
            cache,
            interrupts_masked: false,
            hit_watchpoint: None,
            srst_asserted: false,
            trst_asserted: false,
            halt_after_reset: false,
        }
    }

    /// The scan chain position of the core.
    pub fn selector(&self) -> CoreSelector {
        self.selector
    }

    /// The variant description the core is driven with.
    pub fn variant(&self) -> &Arc<VariantDescription> {
        &self.variant
    }

    /// The options the core was attached with.
    pub fn options(&self) -> &CoreOptions {
        &self.options
    }

    /// The last known run state.
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Why the core last halted.
    pub fn debug_reason(&self) -> DebugReason {
        self.debug_reason
    }

    /// The register cache.
    pub fn registers(&self) -> &RegisterCache {
        &self.registers
    }
}

/// A core under debug, borrowed together with the transport used to reach it.
pub struct Core<'probe> {
    transport: &'probe mut dyn RegisterTransport,
    state: &'probe mut CoreState,
}

impl<'probe> Core<'probe> {
    /// Drive the core described by `state` through `transport`.
    pub fn new(transport: &'probe mut dyn RegisterTransport, state: &'probe mut CoreState) -> Self {
        Self { transport, state }
    }

    /// The debugger side state of the core.
    pub fn state(&self) -> &CoreState {
        self.state
    }

    /// The last known run state.
    pub fn run_state(&self) -> RunState {
        self.state.run_state
    }

    /// Why the core last halted.
    pub fn debug_reason(&self) -> DebugReason {
        self.state.debug_reason
    }

    /// Direct access to the transport, bypassing the register cache.
    pub(crate) fn transport(&mut self) -> &mut dyn RegisterTransport {
        &mut *self.transport
    }

    /// The scan chain position of the core.
    pub fn selector(&self) -> CoreSelector {
        self.state.selector
    }

    /// Check the hardware run state and update the state machine.
    ///
    /// Returns an event if the core halted since the last poll. The register context is saved
    /// before this returns.
    pub fn poll(&mut self) -> Result<Option<TargetEvent>, Error> {
        let running = self.is_running_in_hardware()?;
        let previous = self.state.run_state;

        if running {
            match previous {
                RunState::Halted => {
                    tracing::debug!("{} was resumed by another agent", self.state.selector);
                    self.state.registers.invalidate();
                    self.reset_cache_state();
                    self.state.debug_reason = DebugReason::NotHalted;
                    self.state.run_state = RunState::Running;
                }
                RunState::DebugRunning | RunState::Running => {}
                RunState::Unknown | RunState::Reset => {
                    tracing::debug!("{}: {:?} -> Running", self.state.selector, previous);
                    self.state.run_state = RunState::Running;
                }
            }
            return Ok(None);
        }

        let event = match previous {
            RunState::Halted => return Ok(None),
            RunState::DebugRunning => TargetEvent::DebugHalted,
            RunState::Running | RunState::Reset | RunState::Unknown => TargetEvent::Halted,
        };

        tracing::debug!("{}: {:?} -> Halted", self.state.selector, previous);
        self.state.run_state = RunState::Halted;
        self.debug_entry()?;

        Ok(Some(event))
    }

    /// Poll the core until it halts or `timeout` elapses.
    pub fn wait_for_core_halted(&mut self, timeout: Duration) -> Result<(), Error> {
        let start = Instant::now();

        loop {
            self.poll()?;
            if self.state.run_state.is_halted() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(OperationError::Timeout("the core to halt").into());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Poll the core until it halts, waiting at most the configured halt timeout.
    pub fn wait_for_halt(&mut self) -> Result<(), Error> {
        let timeout = self.state.options.halt_timeout();
        self.wait_for_core_halted(timeout)
    }

    /// Request the core to halt.
    ///
    /// The request is not waited for, use [`Core::wait_for_core_halted`] or [`Core::poll`].
    #[tracing::instrument(skip(self))]
    pub fn halt(&mut self) -> Result<(), Error> {
        match self.state.run_state {
            RunState::Halted => {
                tracing::debug!("{} is already halted", self.state.selector);
                return Ok(());
            }
            RunState::Reset if self.debug_port_in_reset() => {
                tracing::error!(
                    "{}: cannot request a halt while the debug port is held in reset",
                    self.state.selector
                );
                return Err(Error::TargetFailure(
                    "the debug port is held in reset by the asserted reset lines",
                ));
            }
            _ => {}
        }

        let request = self.state.variant.run_control.halt_request;
        self.apply_update(request)?;

        self.state.requested_reason = Some(DebugReason::DebugRequest);
        self.state.debug_reason = DebugReason::DebugRequest;

        self.poll()?;
        Ok(())
    }

    /// Let the halted core run.
    ///
    /// Unless `current` is set, execution continues at `address`. With `handle_breakpoints`, a
    /// breakpoint at the resume address is stepped over instead of hit again. A
    /// `debug_execution` resume runs code on behalf of the debugger: pending breakpoints stay
    /// pending and the resulting halt is reported as [`TargetEvent::DebugHalted`].
    #[tracing::instrument(skip(self))]
    pub fn resume(
        &mut self,
        current: bool,
        address: u32,
        handle_breakpoints: bool,
        debug_execution: bool,
    ) -> Result<(), Error> {
        if !self.state.run_state.is_halted() {
            return Err(Error::NotHalted);
        }

        if !debug_execution {
            self.enable_pending()?;
        }

        let pc = self.resume_address(current, address)?;
        self.restore_context()?;

        if handle_breakpoints {
            if let Some(index) = self.installed_breakpoint_at(pc) {
                tracing::debug!("Stepping over breakpoint at {:#010x}", pc);
                self.uninstall_breakpoint(index)?;
                self.single_step_core()?;
                self.install_breakpoint(index)?;
            }
        }

        if debug_execution {
            if self.state.options.mask_interrupts_on_debug_execution
                && !self.state.interrupts_masked
                && self.set_interrupt_enable(false)? == Some(true)
            {
                self.state.interrupts_masked = true;
            }
        } else if self.state.interrupts_masked {
            self.set_interrupt_enable(true)?;
            self.state.interrupts_masked = false;
        }

        let resume = self.state.variant.run_control.resume;
        self.apply_update(resume)?;

        self.state.registers.invalidate();
        self.state.hit_watchpoint = None;
        self.state.debug_reason = DebugReason::NotHalted;
        self.state.run_state = if debug_execution {
            RunState::DebugRunning
        } else {
            RunState::Running
        };

        tracing::debug!(
            "{} resumed at {:#010x}: {:?}",
            self.state.selector,
            pc,
            self.state.run_state
        );
        Ok(())
    }

    /// Execute a single instruction and wait for the core to halt again.
    #[tracing::instrument(skip(self))]
    pub fn step(&mut self, current: bool, address: u32, handle_breakpoints: bool) -> Result<(), Error> {
        if !self.state.run_state.is_halted() {
            return Err(Error::NotHalted);
        }

        self.enable_pending()?;

        let pc = self.resume_address(current, address)?;
        self.restore_context()?;

        let breakpoint = if handle_breakpoints {
            self.installed_breakpoint_at(pc)
        } else {
            None
        };
        if let Some(index) = breakpoint {
            self.uninstall_breakpoint(index)?;
        }

        self.state.requested_reason = Some(DebugReason::SingleStep);
        self.state.debug_reason = DebugReason::SingleStep;

        if let Err(error) = self.single_step_core() {
            self.state.requested_reason = None;
            return Err(error);
        }

        if let Some(index) = breakpoint {
            self.install_breakpoint(index)?;
        }

        self.state.registers.invalidate();
        self.state.run_state = RunState::Halted;
        self.debug_entry()?;

        Ok(())
    }

    /// Assert the reset line(s) of the core.
    #[tracing::instrument(skip(self))]
    pub fn assert_reset(&mut self) -> Result<(), Error> {
        let reset = self.state.options.reset.clone();

        if reset.has_srst {
            self.transport.set_reset_line(ResetLine::System, true)?;
            self.state.srst_asserted = true;
        } else if reset.has_trst && reset.trst_pulls_srst {
            self.transport.set_reset_line(ResetLine::Test, true)?;
            self.state.trst_asserted = true;
        } else {
            return Err(Error::Unsupported("reset without a system reset line"));
        }

        self.state.registers.invalidate();
        self.reset_cache_state();
        // The reset restores the interrupt enable state of the firmware.
        self.state.interrupts_masked = false;
        self.state.requested_reason = None;
        self.state.hit_watchpoint = None;
        self.state.debug_reason = DebugReason::NotHalted;
        self.state.run_state = RunState::Reset;

        if reset.reset_halt {
            if reset.srst_gates_jtag || self.debug_port_in_reset() {
                tracing::debug!("Halting {} once the reset is released", self.state.selector);
                self.state.halt_after_reset = true;
            } else {
                self.halt()?;
            }
        }

        Ok(())
    }

    /// Release the reset line(s) asserted by [`Core::assert_reset`].
    #[tracing::instrument(skip(self))]
    pub fn deassert_reset(&mut self) -> Result<(), Error> {
        if self.state.srst_asserted {
            self.transport.set_reset_line(ResetLine::System, false)?;
            self.state.srst_asserted = false;
        }
        if self.state.trst_asserted {
            self.transport.set_reset_line(ResetLine::Test, false)?;
            self.state.trst_asserted = false;
        }

        if std::mem::take(&mut self.state.halt_after_reset) {
            self.halt()?;
        } else if self.state.run_state == RunState::Reset {
            self.poll()?;
        }

        Ok(())
    }

    /// Read `count` values of `size` bytes starting at `address`.
    #[tracing::instrument(skip(self))]
    pub fn read_memory(&mut self, address: u32, size: u32, count: usize) -> Result<Vec<u8>, Error> {
        if !self.state.run_state.is_halted() {
            return Err(Error::NotHalted);
        }
        let width = access_width(address, size)?;
        if count == 0 {
            return Ok(vec![]);
        }

        self.flush_data_cache()?;
        let data = self
            .transport
            .read_memory(self.state.selector, address, width, count)?;
        Ok(data)
    }

    /// Write `count` values of `size` bytes starting at `address`.
    #[tracing::instrument(skip(self, data))]
    pub fn write_memory(
        &mut self,
        address: u32,
        size: u32,
        count: usize,
        data: &[u8],
    ) -> Result<(), Error> {
        if !self.state.run_state.is_halted() {
            return Err(Error::NotHalted);
        }
        let width = access_width(address, size)?;
        if data.len() != size as usize * count {
            return Err(Error::SyntaxError(format!(
                "expected {} bytes of data, got {}",
                size as usize * count,
                data.len()
            )));
        }
        if count == 0 {
            return Ok(());
        }

        self.flush_data_cache()?;
        self.transport
            .write_memory(self.state.selector, address, width, data)?;
        self.invalidate_caches()
    }

    /// Read a register through the register cache.
    pub fn read_register(&mut self, register: RegisterRef) -> Result<u32, Error> {
        if !self.state.run_state.is_halted() {
            return Err(Error::NotHalted);
        }
        self.check_register(register)?;

        self.read_cached(register)
    }

    /// Change a register. The value is written to the core on the next resume or step.
    pub fn write_register(&mut self, register: RegisterRef, value: u32) -> Result<(), Error> {
        if !self.state.run_state.is_halted() {
            return Err(Error::NotHalted);
        }
        let entry = self.check_register(register)?;
        if entry.description().read_only {
            return Err(Error::SyntaxError(format!(
                "register {} is read-only",
                entry.name()
            )));
        }

        self.state.registers.store_dirty(register, value);
        Ok(())
    }

    /// The registers of `class`, with their cached values.
    pub fn register_list(&self, class: RegisterClass) -> Vec<&CacheEntry> {
        self.state.registers.class(class).collect()
    }

    /// The watchpoint which caused the last halt, if it could be determined.
    pub fn hit_watchpoint(&self) -> Option<&Watchpoint> {
        let address = self.state.hit_watchpoint?;
        self.state
            .watchpoints
            .iter()
            .find(|watchpoint| watchpoint.address() == address)
    }

    /// Read all registers which are not cached yet.
    ///
    /// The program counter is read first, then the core and auxiliary registers in one batch
    /// each.
    pub fn save_context(&mut self) -> Result<(), Error> {
        let core = self.state.selector;
        let pc = self.state.variant.program_counter;

        if !self
            .state
            .registers
            .entry(pc)
            .is_some_and(CacheEntry::is_valid)
        {
            let value = self.transport.read_register(core, pc)?;
            self.state.registers.store(pc, value);
        }

        for kind in [RegisterKind::Core, RegisterKind::Aux] {
            let numbers = self.state.registers.stale(kind);
            if numbers.is_empty() {
                continue;
            }

            tracing::trace!("{}: reading {} {:?} registers", core, numbers.len(), kind);
            let values = self.transport.read_registers(core, kind, &numbers)?;
            for (number, value) in numbers.iter().zip(values) {
                self.state.registers.store(
                    RegisterRef {
                        kind,
                        number: *number,
                    },
                    value,
                );
            }
        }

        self.state.registers.mark_saved();
        Ok(())
    }

    /// Write all changed registers back to the core.
    pub fn restore_context(&mut self) -> Result<(), Error> {
        if !self.state.registers.is_saved() {
            return Err(OperationError::NoSavedContext.into());
        }
        let core = self.state.selector;

        for kind in [RegisterKind::Core, RegisterKind::Aux] {
            let writes = self.state.registers.dirty(kind);
            if writes.is_empty() {
                continue;
            }

            tracing::trace!("{}: writing {} {:?} registers", core, writes.len(), kind);
            self.transport.write_registers(core, kind, &writes)?;
            self.state.registers.mark_clean(kind);
        }

        Ok(())
    }

    /// Drop a cached register value after it was changed behind the cache.
    pub(crate) fn forget_register(&mut self, register: RegisterRef) {
        self.state.registers.forget(register);
    }

    fn debug_entry(&mut self) -> Result<(), Error> {
        self.reset_cache_state();
        self.state.hit_watchpoint = None;
        self.save_context()?;

        let reason = match self.state.requested_reason.take() {
            Some(reason) => reason,
            None => self.decode_debug_reason()?,
        };
        self.state.debug_reason = reason;

        let pc = self.read_cached(self.state.variant.program_counter)?;
        tracing::debug!(
            "{} halted at {:#010x}, reason: {:?}",
            self.state.selector,
            pc,
            reason
        );

        Ok(())
    }

    fn decode_debug_reason(&mut self) -> Result<DebugReason, Error> {
        let causes = self.state.variant.halt_causes.clone();
        let value = self.read_cached(causes.register)?;

        let reason = match causes.decode(value) {
            Some(HaltCause::SoftwareBreakpoint) => DebugReason::Breakpoint,
            Some(HaltCause::Comparator) => self.classify_comparator_hit(&causes, value)?,
            Some(HaltCause::Step) => DebugReason::SingleStep,
            Some(HaltCause::Request) => DebugReason::DebugRequest,
            None => DebugReason::Undefined,
        };
        Ok(reason)
    }

    /// Find out which installed breakpoints and watchpoints a comparator halt belongs to.
    fn classify_comparator_hit(&mut self, causes: &HaltCauses, value: u32) -> Result<DebugReason, Error> {
        let hits = causes.comparator_hits(value, self.state.comparators.len());

        let (breakpoint, watchpoint) = if hits.is_empty() {
            // The core does not tell which comparator matched, guess from the halt address.
            let pc = self.read_cached(self.state.variant.program_counter)?;
            let breakpoint = self
                .state
                .breakpoints
                .iter()
                .any(|breakpoint| breakpoint.address() == pc && breakpoint.comparator().is_some());

            let mut installed = self
                .state
                .watchpoints
                .iter()
                .filter(|watchpoint| watchpoint.is_set());
            let watchpoint = match (installed.next(), installed.next()) {
                (Some(watchpoint), None) if !breakpoint => Some(Some(watchpoint.address())),
                (Some(_), Some(_)) if !breakpoint => Some(None),
                _ => None,
            };
            (breakpoint, watchpoint)
        } else {
            let breakpoint = self.state.breakpoints.iter().any(|breakpoint| {
                breakpoint
                    .comparator()
                    .is_some_and(|slot| hits.contains(&slot))
            });
            let watchpoint = self
                .state
                .watchpoints
                .iter()
                .find(|watchpoint| {
                    watchpoint
                        .comparator()
                        .is_some_and(|slot| hits.contains(&slot))
                })
                .map(|watchpoint| Some(watchpoint.address()));
            (breakpoint, watchpoint)
        };

        self.state.hit_watchpoint = watchpoint.flatten();

        Ok(match (breakpoint, watchpoint.is_some()) {
            (true, true) => DebugReason::WatchpointAndBreakpoint,
            (true, false) => DebugReason::Breakpoint,
            (false, true) => DebugReason::Watchpoint,
            (false, false) => DebugReason::Undefined,
        })
    }

    /// Set the program counter for a resume or step and return the address execution continues
    /// at.
    fn resume_address(&mut self, current: bool, address: u32) -> Result<u32, Error> {
        let pc = self.state.variant.program_counter;
        if current {
            self.read_cached(pc)
        } else {
            self.state.registers.store_dirty(pc, address);
            Ok(address)
        }
    }

    /// Execute one instruction with interrupts masked and wait until the core halted again.
    fn single_step_core(&mut self) -> Result<(), Error> {
        let run_control = self.state.variant.run_control.clone();
        let interrupts = self.set_interrupt_enable(false)?;

        self.apply_update(run_control.step_enable)?;
        self.apply_update(run_control.resume)?;
        self.reset_cache_state();

        let stepped = self.wait_for_step();
        if stepped.is_err() {
            self.state.registers.invalidate();
            self.state.run_state = RunState::Unknown;
        }

        if let Some(disable) = run_control.step_disable {
            self.apply_update(disable)?;
        }
        stepped?;

        if interrupts == Some(true) {
            self.set_interrupt_enable(true)?;
        }
        Ok(())
    }

    fn wait_for_step(&mut self) -> Result<(), Error> {
        let timeout = self.state.options.step_timeout();
        let start = Instant::now();

        loop {
            if !self.is_running_in_hardware()? {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                tracing::warn!("{}: single step did not complete", self.state.selector);
                return Err(OperationError::Timeout("the single step to complete").into());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn is_running_in_hardware(&mut self) -> Result<bool, Error> {
        let status = self.transport.read_status(self.state.selector)?;
        Ok(status & self.state.variant.run_control.running_mask != 0)
    }

    /// Change the global interrupt enable, returning whether interrupts were enabled before.
    ///
    /// Returns `None` if the variant has no interrupt enable bit.
    fn set_interrupt_enable(&mut self, enabled: bool) -> Result<Option<bool>, Error> {
        let Some(bits) = self.state.variant.run_control.interrupt_enable else {
            return Ok(None);
        };
        let core = self.state.selector;

        let current = self.transport.read_register(core, bits.register)?;
        let was_enabled = current & bits.mask == bits.mask;
        let value = if enabled {
            current | bits.mask
        } else {
            current & !bits.mask
        };

        if value != current {
            self.transport.write_register(core, bits.register, value)?;
            self.state.registers.refresh(bits.register, value);
        }
        Ok(Some(was_enabled))
    }

    fn apply_update(&mut self, update: RegisterUpdate) -> Result<(), Error> {
        let core = self.state.selector;
        let current = if update.preserve {
            self.transport.read_register(core, update.register)?
        } else {
            0
        };
        let value = update.apply(current);

        self.transport.write_register(core, update.register, value)?;
        self.state.registers.refresh(update.register, value);
        Ok(())
    }

    /// The cached value of a register, loading it if necessary.
    fn read_cached(&mut self, register: RegisterRef) -> Result<u32, Error> {
        if let Some(value) = self
            .state
            .registers
            .entry(register)
            .and_then(CacheEntry::value)
        {
            return Ok(value);
        }

        let value = self.transport.read_register(self.state.selector, register)?;
        self.state.registers.store(register, value);
        Ok(value)
    }

    fn check_register(&self, register: RegisterRef) -> Result<&CacheEntry, Error> {
        if self.state.variant.is_reserved(register) {
            return Err(Error::SyntaxError(format!(
                "register {register} is reserved"
            )));
        }

        let entry = self
            .state
            .registers
            .entry(register)
            .ok_or_else(|| Error::SyntaxError(format!("unknown register {register}")))?;

        if !entry.exists() {
            return Err(Error::Unsupported("this register"));
        }
        Ok(entry)
    }

    fn debug_port_in_reset(&self) -> bool {
        let reset = &self.state.options.reset;
        self.state.trst_asserted || (reset.srst_pulls_trst && self.state.srst_asserted)
    }
}

fn access_width(address: u32, size: u32) -> Result<AccessWidth, Error> {
    let width = AccessWidth::try_from(size)
        .map_err(|size| Error::SyntaxError(format!("unsupported access size {size}")))?;

    if !width.is_aligned(address) {
        return Err(Error::SyntaxError(format!(
            "address {address:#010x} is not aligned to the access size {size}"
        )));
    }
    Ok(width)
}
