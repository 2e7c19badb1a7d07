//! Core variant descriptions and per core options.

mod options;
mod registry;

pub use options::CoreOptions;
pub use registry::{Registry, RegistryError};
