//! DispatchEngineBuilder - wires destinations, history and formatter

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use contracts::{
    ClientType, ContentFormatter, DestinationClient, DestinationConfig, DestinationId,
    DestinationPolicy, FanoutBlueprint, History,
};

use crate::clock::{Clock, SystemClock};
use crate::destinations::{FileDestination, LogDestination, WebhookDestination};
use crate::duplicate_guard::DuplicateGuard;
use crate::engine::{Destination, DispatchEngine, EngineInner};
use crate::error::DispatcherError;
use crate::formatter::PassthroughFormatter;
use crate::history::{open_history, InMemoryHistory};
use crate::metrics::DestinationMetrics;
use crate::rate_limiter::RateLimiter;

/// Builder for creating a DispatchEngine
#[derive(Default)]
pub struct DispatchEngineBuilder {
    destinations: Vec<(DestinationId, Arc<dyn DestinationClient>, DestinationPolicy)>,
    history: Option<Arc<dyn History>>,
    formatter: Option<Arc<dyn ContentFormatter>>,
    clock: Option<Arc<dyn Clock>>,
    default_deadline: Option<Duration>,
}

impl DispatchEngineBuilder {
    /// Create a new DispatchEngineBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a destination
    pub fn destination(
        mut self,
        id: impl Into<DestinationId>,
        client: Arc<dyn DestinationClient>,
        policy: DestinationPolicy,
    ) -> Self {
        self.destinations.push((id.into(), client, policy));
        self
    }

    /// Attempt history (defaults to in-memory)
    pub fn history(mut self, history: Arc<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    /// Content formatter (defaults to `PassthroughFormatter` without rules)
    pub fn formatter(mut self, formatter: Arc<dyn ContentFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Timestamp source (defaults to `SystemClock`)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Deadline applied by `DispatchEngine::dispatch`
    pub fn default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }

    /// Builder preloaded from configuration: every enabled destination with
    /// its client, resolved policy and format rules, plus the history backend
    #[instrument(
        name = "dispatch_engine_from_blueprint",
        skip(blueprint),
        fields(destinations = blueprint.destinations.len())
    )]
    pub async fn from_blueprint(blueprint: &FanoutBlueprint) -> Result<Self, DispatcherError> {
        let history = open_history(&blueprint.history).await?;
        let formatter = PassthroughFormatter::from_configs(blueprint.enabled_destinations());

        let mut builder = Self::new()
            .history(history)
            .formatter(Arc::new(formatter))
            .default_deadline(blueprint.dispatch.deadline());

        for config in blueprint.enabled_destinations() {
            let client = create_client(config)?;
            builder = builder.destination(config.id.as_str(), client, blueprint.policy_for(config));
        }
        Ok(builder)
    }

    /// Build the engine
    ///
    /// # Errors
    /// A destination id registered twice.
    #[instrument(name = "dispatch_engine_build", skip(self), fields(destinations = self.destinations.len()))]
    pub fn build(self) -> Result<DispatchEngine, DispatcherError> {
        let mut limiter = RateLimiter::new();
        let mut destinations = HashMap::with_capacity(self.destinations.len());

        for (id, client, policy) in self.destinations {
            limiter.register(id.clone(), policy.limits)?;
            destinations.insert(
                id.clone(),
                Destination {
                    id,
                    client,
                    policy,
                    retry: policy.retry.into(),
                    metrics: Arc::new(DestinationMetrics::new()),
                },
            );
        }

        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistory::new()));
        let formatter = self
            .formatter
            .unwrap_or_else(|| Arc::new(PassthroughFormatter::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        info!(destinations = destinations.len(), "Dispatch engine ready");

        Ok(DispatchEngine::from_inner(EngineInner {
            destinations,
            limiter,
            guard: DuplicateGuard::new(Arc::clone(&history)),
            history,
            formatter,
            clock,
            default_deadline: self.default_deadline,
        }))
    }
}

/// Create a destination client from configuration
#[instrument(
    name = "dispatcher_create_client",
    skip(config),
    fields(destination = %config.id, client = ?config.client)
)]
pub fn create_client(config: &DestinationConfig) -> Result<Arc<dyn DestinationClient>, DispatcherError> {
    match config.client {
        ClientType::Log => Ok(Arc::new(LogDestination::new(&config.id))),
        ClientType::File => {
            let client = FileDestination::from_params(&config.id, &config.params)
                .map_err(|e| DispatcherError::client_creation(&config.id, e.to_string()))?;
            Ok(Arc::new(client))
        }
        ClientType::Webhook => {
            let client = WebhookDestination::from_params(&config.id, &config.params)
                .map_err(|e| DispatcherError::client_creation(&config.id, e))?;
            Ok(Arc::new(client))
        }
    }
}

/// Build an engine straight from configuration
pub async fn create_engine(blueprint: &FanoutBlueprint) -> Result<DispatchEngine, DispatcherError> {
    DispatchEngineBuilder::from_blueprint(blueprint)
        .await?
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigVersion, DispatchSettings, HistoryBackend, HistoryConfig, PolicyConfig,
    };
    use tempfile::tempdir;

    fn destination_config(id: &str, client: ClientType) -> DestinationConfig {
        DestinationConfig {
            id: id.to_string(),
            client,
            enabled: true,
            policy: PolicyConfig::default(),
            max_length: None,
            require_title: false,
            params: HashMap::new(),
        }
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let client: Arc<dyn DestinationClient> = Arc::new(LogDestination::new("x"));
        let result = DispatchEngineBuilder::new()
            .destination("x", Arc::clone(&client), DestinationPolicy::default())
            .destination("x", client, DestinationPolicy::default())
            .build();
        assert!(matches!(result, Err(DispatcherError::DuplicateDestination(_))));
    }

    #[test]
    fn test_create_client_webhook_requires_url() {
        let config = destination_config("hook", ClientType::Webhook);
        let err = create_client(&config).err().unwrap();
        assert!(err.to_string().contains("hook"));
    }

    #[tokio::test]
    async fn test_create_engine_from_blueprint() {
        let dir = tempdir().unwrap();
        let mut file = destination_config("devto", ClientType::File);
        file.params
            .insert("path".into(), dir.path().join("outbox").display().to_string());
        file.policy.max_per_hour = Some(2);
        let mut disabled = destination_config("reddit", ClientType::Log);
        disabled.enabled = false;

        let blueprint = FanoutBlueprint {
            version: ConfigVersion::V1,
            defaults: PolicyConfig {
                max_attempts: Some(4),
                ..Default::default()
            },
            destinations: vec![destination_config("mastodon", ClientType::Log), file, disabled],
            history: HistoryConfig {
                backend: HistoryBackend::Jsonl,
                path: Some(dir.path().join("history.jsonl")),
            },
            dispatch: DispatchSettings::default(),
        };

        let engine = create_engine(&blueprint).await.unwrap();
        let expected: Vec<DestinationId> = vec!["devto".into(), "mastodon".into()];
        assert_eq!(engine.destinations(), expected);
        let policy = engine.policy("devto").unwrap();
        assert_eq!(policy.limits.max_per_hour, 2);
        assert_eq!(policy.retry.max_attempts, 4);
        assert!(dir.path().join("history.jsonl").exists());
    }
}
