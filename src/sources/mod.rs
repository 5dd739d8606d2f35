//! Package registries.
//!
//! A registry answers one question: which package names does it publish.

pub mod registry;

pub use registry::{HttpIndex, RegistryIndex, StaticIndex};
