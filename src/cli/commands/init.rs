use std::{fs, path::Path};

use anyhow::{Context, Result};

use super::{CommandKind, CommandResult, CommandSummary, InitSummary};
use crate::config::{CONFIG_FILE_NAME, default_config_json};

pub fn init() -> Result<CommandResult> {
    init_in(Path::new("."))
}

/// Write the default `.spgmrc.json` into `dir` unless one exists.
pub fn init_in(dir: &Path) -> Result<CommandResult> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    let summary = if config_path.exists() {
        InitSummary {
            created: false,
            error: Some(format!("{} already exists", CONFIG_FILE_NAME)),
        }
    } else {
        fs::write(&config_path, default_config_json()? + "\n")
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        InitSummary {
            created: true,
            error: None,
        }
    };

    Ok(CommandResult::new(CommandKind::Init, CommandSummary::Init(summary)))
}
