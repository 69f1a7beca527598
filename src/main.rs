//! ktp-config
//!
//! Command line view of the layered configuration a KTP service would see.

use anyhow::{Result, bail};
use clap::Parser;
use ktp_config::cli::{Cli, Command};
use ktp_config::config::{
    BuildOptions, ConfigManager, ConfigSources, ResourceRoot, RuntimeEnvironment,
    applies_to_environment, infer_scalar,
};
use ktp_config::format::{OutputFormat, format_entries};
use ktp_config::logging::{self, LogTarget};
use serde_json::Value;
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut options = BuildOptions::from_process().with_env_var_overrides(cli.env_overrides);
    for (key, value) in &cli.properties {
        options = options.with_property(key, value);
    }
    for (key, value) in &cli.overrides {
        options = options.with_override(key, infer_scalar(value));
    }

    let sources = if cli.roots.is_empty() {
        ConfigSources::from_environment()
    } else {
        ConfigSources::with_roots(cli.roots.iter().cloned().map(ResourceRoot::Directory).collect())
    };
    debug!(roots = ?sources.roots, "Config roots");

    let mut builder = ConfigManager::<Value>::builder().sources(sources).options(options);
    if let Some(name) = &cli.env {
        builder = builder.env(RuntimeEnvironment::new(name.as_str())?);
    }
    let manager = builder.build()?;

    let command = cli.command.unwrap_or(Command::Dump {
        format: OutputFormat::Text,
    });
    match command {
        Command::Dump { format } => {
            print!("{}", format_entries(&manager.get_all_config(), format)?);
        }
        Command::Get { path } => match manager.get_value(&path) {
            Some(Value::String(s)) => println!("{}", s),
            Some(other) => println!("{}", serde_json::to_string_pretty(other)?),
            None => bail!("No value at '{}'", path),
        },
        Command::Sources => {
            println!("environment: {}", manager.env());
            for fragment in manager.fragments() {
                let mark = if applies_to_environment(fragment, manager.env()) {
                    "+"
                } else {
                    "-"
                };
                println!(
                    "{} {:>4} {:<12} {:<12} {}",
                    mark,
                    fragment.priority,
                    display_or_dash(&fragment.name),
                    display_or_dash(&fragment.env_tag),
                    fragment.location_id
                );
            }
        }
    }

    Ok(())
}

fn display_or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
