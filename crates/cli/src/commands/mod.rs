//! Command implementations.

mod info;
mod publish;
mod validate;

pub use info::run_info;
pub use publish::run_publish;
pub use validate::run_validate;

use anyhow::{Context, Result};
use contracts::FanoutBlueprint;
use std::path::Path;

use crate::error::CliError;

/// Load and validate a configuration file
fn load_blueprint(path: &Path) -> Result<FanoutBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
