//! compendium - dependency hygiene for R research compendia
//!
//! This crate provides the core library functionality for compendium:
//! extracting package references from R sources, reconciling them against
//! DESCRIPTION and renv.lock, repairing the manifest, and generating a
//! stamped Dockerfile.

pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

pub use core::{lockfile::Lockfile, manifest::Manifest, stamp::VersionStamp};
pub use ops::{CheckReport, ReconciliationReport};
pub use util::context::GlobalContext;
