//! Configuration view and validation commands: `checkloop config`.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use checkloop::config::{CONFIG_FILE_NAME, Config};
use console::style;

use super::super::ConfigCommands;

pub fn cmd_config(explicit: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => show(explicit),
        Some(ConfigCommands::Validate) => validate(explicit),
        Some(ConfigCommands::Init { force }) => init(explicit, force),
    }
}

fn show(explicit: Option<&Path>) -> Result<()> {
    let (config, path) = Config::resolve(explicit)?;
    println!();
    println!("checkloop configuration");
    println!("=======================");
    println!();
    match path {
        Some(p) => println!("Config file: {}", p.display()),
        None => println!("No {} found; using defaults", CONFIG_FILE_NAME),
    }
    println!("Effective values (with env overrides):");
    println!();
    let mut redacted = config;
    for key in [
        &mut redacted.generation.api_key,
        &mut redacted.review.api_key,
    ] {
        if key.is_some() {
            *key = Some("********".to_string());
        }
    }
    print!("{}", redacted.to_toml()?);
    Ok(())
}

fn validate(explicit: Option<&Path>) -> Result<()> {
    let (config, path) = Config::resolve(explicit)?;
    if let Some(p) = &path {
        println!("Validating {}", p.display());
    }
    let report = config.validate();
    for warning in &report.warnings {
        println!("{} {}", style("warning:").yellow().bold(), warning);
    }
    for error in &report.errors {
        println!("{} {}", style("error:").red().bold(), error);
    }
    if !report.is_ok() {
        bail!("Configuration has {} error(s)", report.errors.len());
    }
    println!("{}", style("Configuration is valid").green());
    Ok(())
}

fn init(explicit: Option<&Path>, force: bool) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Config::default().save(&path)?;
    println!("Created {}", path.display());
    Ok(())
}
