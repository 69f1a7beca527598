//! CLI command definitions for ktp-config
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::format::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect layered KTP configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Resource root to scan for `config/*.conf` (repeatable; default: cwd and user dir)
    #[arg(short, long = "root", value_name = "DIR", global = true)]
    pub roots: Vec<PathBuf>,

    /// Environment name (skips KTP_ENV / ENVIRONMENT detection)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    /// System property, e.g. `-D ktp.env=prod`
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_key_value, global = true)]
    pub properties: Vec<(String, String)>,

    /// Override a config path; the value is typed like an unquoted `.conf` value
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value, global = true)]
    pub overrides: Vec<(String, String)>,

    /// Apply CONFIG_FORCE_* environment variables
    #[arg(long, global = true)]
    pub env_overrides: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every visible setting with its origin (default if no subcommand given)
    Dump {
        /// Output format: text, json or yaml
        #[arg(short, long, default_value = "text", value_parser = parse_format)]
        format: OutputFormat,
    },

    /// Print the resolved value at a dotted path
    Get {
        /// Dotted path, e.g. `storage.bucket`
        path: String,
    },

    /// List discovered fragments in merge order
    Sources,
}

/// Parse `key=value`; the value may itself contain `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::from_str(s).ok_or_else(|| format!("unknown format '{}' (text, json, yaml)", s))
}
