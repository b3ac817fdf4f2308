//! WebhookDestination - POSTs the payload as JSON to an HTTP endpoint
//!
//! Status mapping:
//! - 2xx: success (`id` / `url` picked from a JSON body when present)
//! - 401, 403: auth
//! - 400, 413, 422: validation (413 as content-too-long)
//! - 408, 429: throttled
//! - 5xx: server
//! - transport timeout / connect failure: timeout / network

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use contracts::{DestinationClient, Payload, SubmitError, SubmitErrorKind, SubmitReceipt};

/// Request timeout when `timeout_secs` is not given
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest response body quoted in an error message
const MAX_ERROR_BODY: usize = 512;

/// Configuration for WebhookDestination
#[derive(Debug, Clone)]
pub struct WebhookDestinationConfig {
    /// Endpoint
    pub url: Url,
    /// Bearer token
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl WebhookDestinationConfig {
    /// Create config from params map.
    ///
    /// `url` is required. The bearer token is read from the environment
    /// variable named by `token_env`, never from the config file itself.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let raw = params
            .get("url")
            .ok_or_else(|| "missing 'url' parameter".to_string())?;
        let url = Url::parse(raw).map_err(|e| format!("invalid url '{raw}': {e}"))?;

        let token = match params.get("token_env") {
            Some(var) => Some(
                std::env::var(var)
                    .map_err(|_| format!("environment variable '{var}' is not set"))?,
            ),
            None => None,
        };

        let timeout = match params.get("timeout_secs") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .map_err(|e| format!("invalid timeout_secs '{secs}': {e}"))?,
            ),
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            url,
            token,
            timeout,
        })
    }
}

/// Destination backed by an HTTP webhook
pub struct WebhookDestination {
    name: String,
    config: WebhookDestinationConfig,
    client: reqwest::Client,
}

impl WebhookDestination {
    /// Create a new WebhookDestination
    pub fn new(name: impl Into<String>, config: WebhookDestinationConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("fanout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            name: name.into(),
            config,
            client,
        })
    }

    /// Create from destination params
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, String> {
        let config = WebhookDestinationConfig::from_params(params)?;
        Self::new(name, config).map_err(|e| format!("http client: {e}"))
    }

    pub fn url(&self) -> &Url {
        &self.config.url
    }

    fn transport_error(&self, error: reqwest::Error) -> SubmitError {
        if error.is_timeout() {
            SubmitError::timeout(error.to_string())
        } else if let Some(status) = error.status() {
            classify_status(status, &error.to_string())
        } else {
            SubmitError::network(error.to_string())
        }
    }
}

/// Map a non-success HTTP status to a submission error
pub fn classify_status(status: StatusCode, body: &str) -> SubmitError {
    let mut message = format!("HTTP {}", status.as_u16());
    let body = body.trim();
    if !body.is_empty() {
        let quoted: String = body.chars().take(MAX_ERROR_BODY).collect();
        message.push_str(": ");
        message.push_str(&quoted);
    }

    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SubmitErrorKind::Auth,
        StatusCode::PAYLOAD_TOO_LARGE => SubmitErrorKind::ContentTooLong,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => SubmitErrorKind::Validation,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => SubmitErrorKind::Throttled,
        s if s.is_server_error() => SubmitErrorKind::Server,
        _ => SubmitErrorKind::Validation,
    };
    SubmitError::new(kind, message)
}

/// Pick `id` and `url` out of a JSON response body
fn parse_receipt(body: &str) -> SubmitReceipt {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return SubmitReceipt::default();
    };
    let post_id = match value.get("id") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let url = value.get("url").and_then(|u| u.as_str()).map(str::to_string);
    SubmitReceipt { post_id, url }
}

#[async_trait]
impl DestinationClient for WebhookDestination {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "webhook_destination_submit",
        skip(self, payload),
        fields(destination = %self.name, url = %self.config.url)
    )]
    async fn submit(&self, payload: &Payload) -> Result<SubmitReceipt, SubmitError> {
        let mut request = self.client.post(self.config.url.clone()).json(payload);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let err = classify_status(status, &body);
            warn!(destination = %self.name, status = status.as_u16(), kind = %err.kind, "Webhook rejected payload");
            return Err(err);
        }

        debug!(destination = %self.name, status = status.as_u16(), "Webhook accepted payload");
        Ok(parse_receipt(&body))
    }
}
