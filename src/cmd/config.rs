//! Configuration view and validation commands (`agent-eta config`).

use anyhow::Result;
use std::path::Path;

use agent_eta::config::{EtaToml, TICK_ENV_VAR};

use super::super::ConfigCommands;

fn print_sections(toml: &EtaToml) {
    println!("[defaults]");
    println!("  total_steps = {}", toml.defaults.total_steps);
    println!("  expected_duration = {}", toml.defaults.expected_duration);
    println!("  expected_tokens = {}", toml.defaults.expected_tokens);
    println!();

    println!("[reporter]");
    println!("  tick_interval_ms = {}", toml.reporter.tick_interval_ms);
    println!("  stop_timeout_ms = {}", toml.reporter.stop_timeout_ms);
    println!("  bar_width = {}", toml.reporter.bar_width);
    println!("  clear_width = {}", toml.reporter.clear_width);
    println!();

    println!("[monitor]");
    println!("  enabled = {}", toml.monitor.enabled);
    println!("  interval_ms = {}", toml.monitor.interval_ms);
    println!("  cpu_threshold = {}", toml.monitor.cpu_threshold);
    println!("  memory_threshold = {}", toml.monitor.memory_threshold);
    println!();
}

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("agent-eta Configuration");
            println!("=======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                EtaToml::load(config_path)?
            } else {
                println!("No agent-eta.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                println!();
                EtaToml::default()
            };
            print_sections(&toml);

            println!("Effective values (with env overrides):");
            println!(
                "  tick_interval_ms = {} ({} overrides)",
                toml.tick_interval_ms(),
                TICK_ENV_VAR
            );
            println!();

            if !config_path.exists() {
                println!("Run 'agent-eta config init' to create an agent-eta.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No agent-eta.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = EtaToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("agent-eta.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            EtaToml::default().save(config_path)?;

            println!("Created agent-eta.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] total_steps, expected_duration, expected_tokens");
            println!("  - [reporter] tick_interval_ms, bar_width, clear_width");
            println!("  - [monitor] enabled, cpu_threshold, memory_threshold");
            println!();
        }
    }

    Ok(())
}
