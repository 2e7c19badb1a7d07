//! # Core debug engine for JTAG debugged ARC and RISC-V cores
//!
//! This crate implements the debugger side of an on-chip debug connection: the run state
//! machine of a core, caching of its register context across halts, installation of hardware
//! and software breakpoints, and the cache maintenance needed to see coherent memory through
//! the debug port.
//!
//! All supported cores are driven by the same engine. The differences between core variants are
//! described by a [`VariantDescription`](coredebug_target::VariantDescription), looked up once
//! in a [`Registry`](config::Registry) when the core is attached.
//!
//! # Examples
//!
//! ## Halting a core and reading its registers
//!
//! ```no_run
//! # use coredebug::{Error, probe::JtagAccess};
//! # fn example(probe: impl JtagAccess) -> Result<(), Error> {
//! use std::time::Duration;
//!
//! use coredebug::{
//!     config::{CoreOptions, Registry},
//!     transport::{CoreSelector, JtagTransport},
//!     Core, CoreState, RegisterClass,
//! };
//! use coredebug_target::CoreFamily;
//!
//! let registry = Registry::from_builtin_variants().unwrap();
//! let variant = registry.variant(CoreFamily::ArcEm).unwrap();
//!
//! let mut transport = JtagTransport::new(probe);
//! let mut state = CoreState::new(CoreSelector(0), variant, CoreOptions::default());
//! let mut core = Core::new(&mut transport, &mut state);
//!
//! core.halt()?;
//! core.wait_for_core_halted(Duration::from_millis(100))?;
//!
//! for register in core.register_list(RegisterClass::General) {
//!     println!("{}: {:#010x?}", register.name(), register.value());
//! }
//!
//! core.resume(true, 0, true, false)?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

pub mod config;
mod core;
mod error;
pub mod monitor;
pub mod probe;
pub mod transport;

pub use crate::core::{
    Breakpoint, BreakpointKind, CacheEntry, ComparatorSlot, Core, CoreState, DebugReason,
    Installation, RegisterCache, RunState, TargetEvent, Watchpoint, WatchpointAccess,
};
pub use crate::error::{Error, OperationError, Resource};
pub use coredebug_target::{RegisterClass, RegisterKind, RegisterRef};
