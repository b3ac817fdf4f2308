//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{ClientType, FanoutBlueprint, HistoryBackend};

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    destination_count: usize,
    enabled_count: usize,
    history_backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    deadline_secs: Option<u64>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    destination_count: blueprint.destinations.len(),
                    enabled_count: blueprint.enabled_destinations().count(),
                    history_backend: format!("{:?}", blueprint.history.backend),
                    deadline_secs: blueprint.dispatch.deadline_secs,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &FanoutBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.history.backend == HistoryBackend::Memory {
        warnings.push(
            "history.backend is 'memory' - duplicate detection does not survive restarts"
                .to_string(),
        );
    }

    for destination in &blueprint.destinations {
        if !destination.enabled {
            warnings.push(format!("Destination '{}' is disabled", destination.id));
            continue;
        }

        match destination.client {
            ClientType::Log => warnings.push(format!(
                "Destination '{}' uses the log client - nothing is actually published",
                destination.id
            )),
            ClientType::File if !destination.params.contains_key("path") => {
                warnings.push(format!(
                    "Destination '{}' has no 'path' parameter - writing to ./outbox",
                    destination.id
                ))
            }
            _ => {}
        }

        let policy = blueprint.policy_for(destination);
        if policy.duplicate_lookback.is_zero() {
            warnings.push(format!(
                "Destination '{}' has duplicate_lookback_secs = 0 - duplicate detection is off",
                destination.id
            ));
        }
        if policy.retry.max_attempts <= 1 {
            warnings.push(format!(
                "Destination '{}' never retries (max_attempts = {})",
                destination.id, policy.retry.max_attempts
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Destinations: {} ({} enabled)",
                summary.destination_count, summary.enabled_count
            );
            println!("  History: {}", summary.history_backend);
            if let Some(deadline) = summary.deadline_secs {
                println!("  Deadline: {}s", deadline);
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
