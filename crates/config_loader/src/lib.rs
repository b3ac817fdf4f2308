//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `FanoutBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("fanout.toml")).unwrap();
//! println!("Destinations: {}", blueprint.destinations.len());
//! ```

mod parser;
mod validator;

pub use contracts::FanoutBlueprint;
pub use parser::ConfigFormat;

use contracts::{ClientType, ContractError};
use std::path::Path;
use tracing::{debug, instrument};

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    /// Relative history and outbox paths are anchored at the directory of
    /// the configuration file.
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    #[instrument(name = "config_load", skip_all, fields(path = %path.display()))]
    pub fn load_from_path(path: &Path) -> Result<FanoutBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        let mut blueprint = Self::load_from_str(&content, format)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Self::anchor_paths(&mut blueprint, base);
        }
        Ok(blueprint)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<FanoutBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Serialize FanoutBlueprint to TOML string
    pub fn to_toml(blueprint: &FanoutBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize FanoutBlueprint to JSON string
    pub fn to_json(blueprint: &FanoutBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Rewrite relative file paths to be relative to `base`
    fn anchor_paths(blueprint: &mut FanoutBlueprint, base: &Path) {
        if let Some(path) = blueprint.history.path.as_mut() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }

        let outboxes = blueprint
            .destinations
            .iter_mut()
            .filter(|d| d.client == ClientType::File);
        for destination in outboxes {
            if let Some(dir) = destination.params.get_mut("path") {
                if Path::new(dir.as_str()).is_relative() {
                    *dir = base.join(dir.as_str()).display().to_string();
                }
            }
        }
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<FanoutBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        debug!(
            ?format,
            destinations = blueprint.destinations.len(),
            enabled = blueprint.enabled_destinations().count(),
            "Configuration validated"
        );
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MINIMAL_TOML: &str = r#"
[defaults]
max_per_hour = 4
min_interval_secs = 120

[[destinations]]
id = "mastodon"
client = "log"
max_length = 500

[[destinations]]
id = "devto"
client = "file"
require_title = true
[destinations.policy]
max_attempts = 5
[destinations.params]
path = "./outbox"

[history]
backend = "jsonl"
path = "./history.jsonl"

[dispatch]
deadline_secs = 30
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.destinations.len(), 2);
        assert_eq!(bp.dispatch.deadline(), Some(Duration::from_secs(30)));

        let devto = &bp.destinations[1];
        let policy = bp.policy_for(devto);
        assert_eq!(policy.retry.max_attempts, 5);
        assert_eq!(policy.limits.max_per_hour, 4);
        assert_eq!(policy.limits.min_interval, Duration::from_secs(120));
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.destinations.len(), bp2.destinations.len());
        assert_eq!(bp.destinations[0].id, bp2.destinations[0].id);
        assert_eq!(bp.defaults, bp2.defaults);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.destinations[1].policy, bp2.destinations[1].policy);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[destinations]]
id = "x"
client = "log"

[[destinations]]
id = "x"
client = "file"
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path_anchors_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("fanout.toml");
        std::fs::write(&config, MINIMAL_TOML).unwrap();

        let bp = ConfigLoader::load_from_path(&config).unwrap();
        assert_eq!(bp.history.path, Some(dir.path().join("./history.jsonl")));
        assert_eq!(
            bp.destinations[1].params["path"],
            dir.path().join("./outbox").display().to_string()
        );
    }

    #[test]
    fn test_absolute_paths_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("fanout.json");
        std::fs::write(
            &config,
            r#"{
                "destinations": [{ "id": "devto", "client": "file", "params": { "path": "/var/spool/fanout" } }],
                "history": { "backend": "jsonl", "path": "/var/lib/fanout/history.jsonl" }
            }"#,
        )
        .unwrap();

        let bp = ConfigLoader::load_from_path(&config).unwrap();
        assert_eq!(
            bp.history.path.as_deref(),
            Some(Path::new("/var/lib/fanout/history.jsonl"))
        );
        assert_eq!(bp.destinations[0].params["path"], "/var/spool/fanout");
    }

    #[test]
    fn test_unsupported_extension() {
        let result = ConfigLoader::load_from_path(Path::new("fanout.yaml"));
        assert!(result.unwrap_err().to_string().contains("unsupported"));
    }
}
