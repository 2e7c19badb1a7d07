//! Core variant description schema
//!
//! The debug engine drives every supported core with the same state machine. What differs
//! between cores, e.g. register numbers, comparator counts and trap instruction encodings, is
//! described by a [`VariantDescription`], usually loaded from a YAML file.
//!
//! This crate contains the schema structs for these YAML files.
#![warn(missing_docs)]

mod cache;
mod comparator;
mod registers;
mod reset;
mod run_control;
pub(crate) mod serialize;
mod variant;

pub use cache::{CacheDescription, DataCache, InstructionCache};
pub use comparator::{
    ComparatorControl, ComparatorDescription, ComparatorMatch, ComparatorSlotDescription,
};
pub use registers::{
    AuxRegisterDescription, CoreRegisterFile, RegisterBits, RegisterClass, RegisterDescription,
    RegisterKind, RegisterRef, RegisterUpdate,
};
pub use reset::ResetConfiguration;
pub use run_control::{HaltCause, HaltCauseRule, HaltCauses, RunControl};
pub use variant::{CoreFamily, TrapInstructions, VariantDescription, VariantDescriptionSource};
