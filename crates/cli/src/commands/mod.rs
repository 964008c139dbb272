//! Subcommand implementations

pub mod control;
pub mod stats;
pub mod status;
