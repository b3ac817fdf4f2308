//! Configuration validation
//!
//! Rules:
//! - field ranges and non-empty ids (`validator` derive rules)
//! - destination ids unique
//! - at least one enabled destination
//! - resolved max_per_day >= max_per_hour
//! - JSON-lines history requires a path
//! - webhook destinations carry a `url` parameter

use std::collections::HashSet;

use contracts::{ClientType, ContractError, FanoutBlueprint, HistoryBackend};
use validator::{Validate, ValidationErrors};

/// Validate a FanoutBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_destination_ids(blueprint)?;
    validate_enabled_destinations(blueprint)?;
    validate_limits(blueprint)?;
    validate_client_params(blueprint)?;
    validate_history(blueprint)?;
    Ok(())
}

/// Derive-based field rules
fn validate_fields(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let (field, message) = first_field_error(&errors);
        ContractError::config_validation(field, message)
    })
}

/// Flatten the first failing field of a (possibly nested) error tree into a
/// dotted path
fn first_field_error(errors: &ValidationErrors) -> (String, String) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        match kind {
            ValidationErrorsKind::Field(list) => {
                let message = list
                    .first()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("failed '{}' rule", e.code))
                    })
                    .unwrap_or_else(|| "invalid value".to_string());
                return (field.to_string(), message);
            }
            ValidationErrorsKind::Struct(inner) => {
                let (path, message) = first_field_error(inner);
                return (format!("{field}.{path}"), message);
            }
            ValidationErrorsKind::List(items) => {
                if let Some((idx, inner)) = items.iter().next() {
                    let (path, message) = first_field_error(inner);
                    return (format!("{field}[{idx}].{path}"), message);
                }
            }
        }
    }
    ("<unknown>".to_string(), errors.to_string())
}

/// Destination ids are unique
fn validate_destination_ids(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for destination in &blueprint.destinations {
        if !seen.insert(destination.id.as_str()) {
            return Err(ContractError::config_validation(
                format!("destinations[id={}]", destination.id),
                "duplicate destination id",
            ));
        }
    }
    Ok(())
}

fn validate_enabled_destinations(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    if blueprint.enabled_destinations().next().is_none() {
        return Err(ContractError::config_validation(
            "destinations",
            "at least one enabled destination is required",
        ));
    }
    Ok(())
}

/// Daily cap can never be below the hourly cap once defaults are merged
fn validate_limits(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    for destination in &blueprint.destinations {
        let limits = blueprint.policy_for(destination).limits;
        if limits.max_per_day < limits.max_per_hour {
            return Err(ContractError::config_validation(
                format!("destinations[{}].policy.max_per_day", destination.id),
                format!(
                    "max_per_day ({}) must be >= max_per_hour ({})",
                    limits.max_per_day, limits.max_per_hour
                ),
            ));
        }
    }
    Ok(())
}

fn validate_client_params(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    for destination in &blueprint.destinations {
        if destination.client == ClientType::Webhook && !destination.params.contains_key("url") {
            return Err(ContractError::config_validation(
                format!("destinations[{}].params.url", destination.id),
                "webhook destination requires a 'url' parameter",
            ));
        }
    }
    Ok(())
}

fn validate_history(blueprint: &FanoutBlueprint) -> Result<(), ContractError> {
    let history = &blueprint.history;
    if history.backend == HistoryBackend::Jsonl && history.path.is_none() {
        return Err(ContractError::config_validation(
            "history.path",
            "jsonl history backend requires a path",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigVersion, DestinationConfig, DispatchSettings, HistoryConfig, PolicyConfig,
    };
    use std::collections::HashMap;

    fn minimal_blueprint() -> FanoutBlueprint {
        FanoutBlueprint {
            version: ConfigVersion::V1,
            defaults: PolicyConfig::default(),
            destinations: vec![DestinationConfig {
                id: "devto".into(),
                client: ClientType::Log,
                enabled: true,
                policy: PolicyConfig::default(),
                max_length: None,
                require_title: false,
                params: HashMap::new(),
            }],
            history: HistoryConfig::default(),
            dispatch: DispatchSettings::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_duplicate_destination_id() {
        let mut bp = minimal_blueprint();
        bp.destinations.push(bp.destinations[0].clone());
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("duplicate destination id"), "got: {err}");
    }

    #[test]
    fn test_empty_destination_id() {
        let mut bp = minimal_blueprint();
        bp.destinations[0].id = String::new();
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("destinations[0].id"), "got: {err}");
    }

    #[test]
    fn test_zero_hourly_cap_rejected() {
        let mut bp = minimal_blueprint();
        bp.destinations[0].policy.max_per_hour = Some(0);
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("max_per_hour"), "got: {err}");
    }

    #[test]
    fn test_daily_cap_below_hourly_cap() {
        let mut bp = minimal_blueprint();
        bp.defaults.max_per_day = Some(3);
        bp.destinations[0].policy.max_per_hour = Some(4);
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("max_per_day (3) must be >= max_per_hour (4)"), "got: {err}");
    }

    #[test]
    fn test_all_destinations_disabled() {
        let mut bp = minimal_blueprint();
        bp.destinations[0].enabled = false;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("at least one enabled"), "got: {err}");
    }

    #[test]
    fn test_webhook_requires_url() {
        let mut bp = minimal_blueprint();
        bp.destinations[0].client = ClientType::Webhook;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("'url'"), "got: {err}");
    }

    #[test]
    fn test_jsonl_history_requires_path() {
        let mut bp = minimal_blueprint();
        bp.history.backend = HistoryBackend::Jsonl;
        let err = validate(&bp).unwrap_err().to_string();
        assert!(err.contains("history.path"), "got: {err}");
    }
}
