//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{DestinationConfig, DestinationPolicy, FanoutBlueprint};

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    history: HistoryInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    deadline_secs: Option<u64>,
    destinations: Vec<DestinationInfo>,
}

#[derive(Serialize)]
struct HistoryInfo {
    backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

#[derive(Serialize)]
struct DestinationInfo {
    id: String,
    client: String,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_length: Option<usize>,
    require_title: bool,
    policy: PolicyInfo,
}

/// Resolved policy in config units
#[derive(Serialize)]
struct PolicyInfo {
    max_per_hour: u32,
    max_per_day: u32,
    min_interval_secs: u64,
    cooldown_after_failure_secs: u64,
    max_attempts: u32,
    backoff_base_ms: u64,
    duplicate_lookback_secs: u64,
    admission_wait_secs: u64,
}

impl From<DestinationPolicy> for PolicyInfo {
    fn from(policy: DestinationPolicy) -> Self {
        Self {
            max_per_hour: policy.limits.max_per_hour,
            max_per_day: policy.limits.max_per_day,
            min_interval_secs: policy.limits.min_interval.as_secs(),
            cooldown_after_failure_secs: policy.limits.cooldown_after_failure.as_secs(),
            max_attempts: policy.retry.max_attempts,
            backoff_base_ms: policy.retry.backoff_base.as_millis() as u64,
            duplicate_lookback_secs: policy.duplicate_lookback.as_secs(),
            admission_wait_secs: policy.admission_wait.as_secs(),
        }
    }
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint, args.all);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args.all);
    }

    Ok(())
}

fn shown(blueprint: &FanoutBlueprint, all: bool) -> Vec<&DestinationConfig> {
    blueprint
        .destinations
        .iter()
        .filter(|d| all || d.enabled)
        .collect()
}

fn build_config_info(blueprint: &FanoutBlueprint, all: bool) -> ConfigInfo {
    let destinations = shown(blueprint, all)
        .into_iter()
        .map(|d| DestinationInfo {
            id: d.id.clone(),
            client: format!("{:?}", d.client).to_lowercase(),
            enabled: d.enabled,
            max_length: d.max_length,
            require_title: d.require_title,
            policy: blueprint.policy_for(d).into(),
        })
        .collect();

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        history: HistoryInfo {
            backend: format!("{:?}", blueprint.history.backend).to_lowercase(),
            path: blueprint
                .history
                .path
                .as_ref()
                .map(|p| p.display().to_string()),
        },
        deadline_secs: blueprint.dispatch.deadline_secs,
        destinations,
    }
}

fn print_config_info(blueprint: &FanoutBlueprint, all: bool) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Fanout Configuration                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📒 History");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Backend: {:?}", blueprint.history.backend);
    match &blueprint.history.path {
        Some(path) => println!("   └─ Path: {}", path.display()),
        None => println!("   └─ Path: (none)"),
    }

    match blueprint.dispatch.deadline_secs {
        Some(secs) => println!("\n⏱  Deadline: {}s", secs),
        None => println!("\n⏱  Deadline: unbounded"),
    }

    let destinations = shown(blueprint, all);
    println!("\n📤 Destinations ({})", destinations.len());
    for (i, destination) in destinations.iter().enumerate() {
        let is_last = i == destinations.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };
        let policy = blueprint.policy_for(destination);

        println!(
            "   {} {} ({:?}){}",
            prefix,
            destination.id,
            destination.client,
            if destination.enabled { "" } else { " [disabled]" }
        );
        println!(
            "   {}  ├─ Limits: {}/h, {}/day, {}s apart",
            child_prefix,
            policy.limits.max_per_hour,
            policy.limits.max_per_day,
            policy.limits.min_interval.as_secs()
        );
        println!(
            "   {}  ├─ Retry: {} attempts, {}ms base backoff",
            child_prefix,
            policy.retry.max_attempts,
            policy.retry.backoff_base.as_millis()
        );
        println!(
            "   {}  └─ Duplicates: {}h lookback",
            child_prefix,
            policy.duplicate_lookback.as_secs() / 3600
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};

    #[test]
    fn test_build_config_info_resolves_policy() {
        let blueprint = ConfigLoader::load_from_str(
            r#"
[defaults]
max_per_hour = 3

[[destinations]]
id = "devto"
client = "log"
require_title = true

[destinations.policy]
max_attempts = 5

[[destinations]]
id = "reddit"
client = "log"
enabled = false
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let info = build_config_info(&blueprint, false);
        assert_eq!(info.destinations.len(), 1);
        let devto = &info.destinations[0];
        assert_eq!(devto.client, "log");
        assert!(devto.require_title);
        assert_eq!(devto.policy.max_per_hour, 3);
        assert_eq!(devto.policy.max_attempts, 5);
        assert_eq!(devto.policy.min_interval_secs, 300);
        assert_eq!(info.history.backend, "memory");

        assert_eq!(build_config_info(&blueprint, true).destinations.len(), 2);
    }
}
