use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use unclone::defaults::{self, UncloneConfig};

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Display configuration (merged defaults + file)
    Show {
        /// Show only built-in defaults (ignore unclone.json)
        #[arg(long)]
        builtin: bool,
    },
    /// Set a configuration value at a JSON pointer path
    Set {
        /// JSON pointer path (e.g., /analysis/min_lines)
        pointer: String,
        /// Value to set (JSON)
        value: String,
    },
    /// Reset one value to its default
    Remove {
        /// JSON pointer path (e.g., /search/timeout_secs)
        pointer: String,
    },
    /// Reset configuration to built-in defaults (deletes unclone.json)
    Reset,
    /// Show the path to unclone.json
    Path,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<UncloneConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pointer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
}

impl ConfigOutput {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            config: None,
            path: None,
            exists: None,
            pointer: None,
            value: None,
            deleted: None,
        }
    }
}

pub fn run(args: ConfigArgs, global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    match args.command {
        ConfigCommand::Show { builtin } => show(builtin, global),
        ConfigCommand::Set { pointer, value } => set(&pointer, &value, global),
        ConfigCommand::Remove { pointer } => remove(&pointer, global),
        ConfigCommand::Reset => reset(),
        ConfigCommand::Path => path(),
    }
}

fn show(builtin: bool, global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    let config = if builtin {
        defaults::builtin_defaults()
    } else {
        global.config.clone()
    };
    Ok((
        ConfigOutput {
            config: Some(config),
            exists: Some(defaults::config_exists()),
            ..ConfigOutput::new("config.show")
        },
        0,
    ))
}

fn set(pointer: &str, value_str: &str, global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    let value: Value = serde_json::from_str(value_str).map_err(|e| {
        unclone::Error::validation_invalid_json(
            e,
            Some("parse value".to_string()),
            Some(value_str.chars().take(200).collect::<String>()),
        )
    })?;

    let config = defaults::set_pointer(&global.config, pointer, value.clone())?;
    defaults::save_config(&config)?;

    Ok((
        ConfigOutput {
            config: Some(config),
            pointer: Some(pointer.to_string()),
            value: Some(value),
            ..ConfigOutput::new("config.set")
        },
        0,
    ))
}

fn remove(pointer: &str, global: &crate::commands::GlobalArgs) -> CmdResult<ConfigOutput> {
    let config = defaults::remove_pointer(&global.config, pointer)?;
    defaults::save_config(&config)?;

    Ok((
        ConfigOutput {
            config: Some(config),
            pointer: Some(pointer.to_string()),
            ..ConfigOutput::new("config.remove")
        },
        0,
    ))
}

fn reset() -> CmdResult<ConfigOutput> {
    let deleted = defaults::reset_config()?;
    Ok((
        ConfigOutput {
            path: Some(defaults::config_path()?),
            deleted: Some(deleted),
            ..ConfigOutput::new("config.reset")
        },
        0,
    ))
}

fn path() -> CmdResult<ConfigOutput> {
    Ok((
        ConfigOutput {
            path: Some(defaults::config_path()?),
            exists: Some(defaults::config_exists()),
            ..ConfigOutput::new("config.path")
        },
        0,
    ))
}
