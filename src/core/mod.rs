//! Core data structures for compendium.
//!
//! This module contains the foundational types used throughout compendium:
//! - DCF documents and the DESCRIPTION manifest
//! - The renv.lock model
//! - Manifest serializers used by `--fix`
//! - Version stamps on generated artifacts
//! - The package to OS library mapping

pub mod dcf;
pub mod lockfile;
pub mod manifest;
pub mod package;
pub mod serializer;
pub mod stamp;
pub mod sysdeps;

pub use dcf::DcfDocument;
pub use lockfile::{load_lockfile, LockEntry, Lockfile, LOCKFILE_NAME};
pub use manifest::{load_manifest, Manifest, ParseOutcome, Section, MANIFEST_NAME};
pub use serializer::{serializer_for, ManifestEdit, ManifestSerializer};
pub use stamp::{generator_version, VersionStamp, TRACKED_ARTIFACTS};
pub use sysdeps::SystemDependencyMapping;
