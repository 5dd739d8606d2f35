//! Command implementations

pub mod check;
pub mod completions;
pub mod dockerfile;
pub mod staleness;
pub mod stamp;
pub mod sysdeps;
