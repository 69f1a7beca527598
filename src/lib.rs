//! KTP configuration library
//!
//! Discovers `.conf` fragments, merges them with runtime layers for the
//! active environment and exposes the result through [`config::ConfigManager`].

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
