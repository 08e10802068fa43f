//! Config command implementation.

use colored::Colorize;
use serde_json::json;

use super::Context;
use crate::cli::args::{ConfigCommands, OutputFormat};
use crate::config::Config;
use crate::error::RollcallError;
use crate::output::to_json;

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the config cannot be serialized or written.
pub fn config(ctx: &Context, cmd: ConfigCommands) -> Result<String, RollcallError> {
    match cmd {
        ConfigCommands::Show => match ctx.format {
            OutputFormat::Json => to_json(&ctx.config),
            OutputFormat::Pretty => serde_yaml::to_string(&ctx.config)
                .map(|yaml| yaml.trim_end().to_string())
                .map_err(|e| RollcallError::Config(format!("Failed to serialize config: {e}"))),
        },
        ConfigCommands::Path => {
            let path = ctx.paths.config_file.display().to_string();
            match ctx.format {
                OutputFormat::Json => to_json(&json!({
                    "config": path,
                    "database": ctx.paths.database.display().to_string(),
                })),
                OutputFormat::Pretty => Ok(path),
            }
        }
        ConfigCommands::Init { force } => init(ctx, force),
    }
}

fn init(ctx: &Context, force: bool) -> Result<String, RollcallError> {
    let path = &ctx.paths.config_file;
    if path.exists() && !force {
        return Err(RollcallError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    ctx.paths.ensure_dirs()?;
    Config::default().save_to_path(path)?;

    match ctx.format {
        OutputFormat::Json => to_json(&json!({ "created": path.display().to_string() })),
        OutputFormat::Pretty => Ok(format!(
            "{} Wrote default configuration to {}",
            "✓".green(),
            path.display()
        )),
    }
}
