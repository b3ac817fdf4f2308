//! `publish` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use contracts::{
    AttemptOutcome, ContentFingerprint, ContentFormatter, ContentItem, DestinationId,
    DispatchResult, FanoutBlueprint,
};
use dispatcher::PassthroughFormatter;
use observability::DispatchMetricsAggregator;

use super::load_blueprint;
use crate::cli::{ContentArgs, PublishArgs};
use crate::error::CliError;

/// Execute the `publish` command
pub async fn run_publish(args: &PublishArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");
    let mut blueprint = load_blueprint(&args.config)?;

    if let Some(secs) = args.deadline {
        info!(deadline_secs = secs, "Overriding dispatch deadline from CLI");
        blueprint.dispatch.deadline_secs = (secs > 0).then_some(secs);
    }

    let item = build_item(&args.content)?;
    let targets = select_destinations(&blueprint, &args.destinations);

    info!(
        content_id = %item.id,
        destinations = targets.len(),
        "Content ready"
    );

    if args.dry_run {
        return print_dry_run(&blueprint, &item, &targets, args.json);
    }

    if args.metrics_port > 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let engine = dispatcher::create_engine(&blueprint)
        .await
        .context("Failed to build dispatch engine")?;

    // a shutdown signal cuts every wait short, but each destination still
    // records its outcome before we exit
    let cancel = CancellationToken::new();
    let dispatch = engine.dispatch_until_cancelled(&item, &targets, cancel.clone());
    tokio::pin!(dispatch);
    let mut interrupted = false;
    let outcome = tokio::select! {
        result = &mut dispatch => result,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, finishing in-flight submissions");
            interrupted = true;
            cancel.cancel();
            dispatch.await
        }
    };
    let result = outcome.context("Dispatch failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize dispatch result")?;
        println!("{}", json);
    } else {
        print_result(&result);
    }

    if interrupted {
        return Err(CliError::Interrupted.into());
    }

    let failed: Vec<String> = result
        .iter()
        .filter(|(_, attempt)| attempt.outcome == AttemptOutcome::Failed)
        .map(|(id, _)| id.to_string())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::PublishFailed {
            destinations: failed,
        }
        .into())
    }
}

/// Build the content item from `--item` or `--body`/`--body-file` plus
/// overrides
fn build_item(args: &ContentArgs) -> Result<ContentItem> {
    let mut item = match (&args.item, &args.body, &args.body_file) {
        (Some(path), _, _) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<ContentItem>(&raw)
                .map_err(|e| CliError::invalid_item(path.display().to_string(), e.to_string()))?
        }
        (None, Some(body), _) => ContentItem::new(String::new(), body.clone()),
        (None, None, Some(path)) => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ContentItem::new(String::new(), body.trim_end().to_string())
        }
        (None, None, None) => return Err(CliError::NoContent.into()),
    };

    if let Some(title) = &args.title {
        item.title = Some(title.clone());
    }
    if let Some(url) = &args.url {
        item.source_url = Some(url.clone());
    }
    if !args.tags.is_empty() {
        item.tags = args.tags.clone();
    }
    if let Some(id) = &args.id {
        item.id = id.clone();
    }
    if item.id.is_empty() {
        let fingerprint = ContentFingerprint::of_content(&item);
        let short: String = fingerprint.as_str().chars().take(12).collect();
        item.id = format!("item-{short}");
    }

    Ok(item)
}

/// Requested destinations, or every enabled one when none were named
fn select_destinations(blueprint: &FanoutBlueprint, requested: &[String]) -> Vec<DestinationId> {
    if requested.is_empty() {
        blueprint
            .enabled_destinations()
            .map(|d| DestinationId::from(d.id.as_str()))
            .collect()
    } else {
        requested.iter().map(|d| DestinationId::from(d.as_str())).collect()
    }
}

#[derive(Serialize)]
struct DryRunEntry {
    destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<contracts::Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_dry_run(
    blueprint: &FanoutBlueprint,
    item: &ContentItem,
    targets: &[DestinationId],
    json: bool,
) -> Result<()> {
    let formatter = PassthroughFormatter::from_configs(blueprint.enabled_destinations());
    let entries: Vec<DryRunEntry> = targets
        .iter()
        .map(|id| match formatter.format(id, item) {
            Ok(payload) => DryRunEntry {
                destination: id.to_string(),
                payload: Some(payload),
                error: None,
            },
            Err(e) => DryRunEntry {
                destination: id.to_string(),
                payload: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    if json {
        let json =
            serde_json::to_string_pretty(&entries).context("Failed to serialize dry run")?;
        println!("{}", json);
        return Ok(());
    }

    println!("\n=== Dry Run: {} ===\n", item.id);
    for entry in &entries {
        match (&entry.payload, &entry.error) {
            (Some(payload), _) => println!(
                "  ✓ {} ({} chars{})",
                entry.destination,
                payload.char_len(),
                payload
                    .title
                    .as_deref()
                    .map(|t| format!(", title \"{t}\""))
                    .unwrap_or_default()
            ),
            (None, Some(error)) => println!("  ✗ {}: {}", entry.destination, error),
            (None, None) => {}
        }
    }
    println!();
    Ok(())
}

fn print_result(result: &DispatchResult) {
    println!("\n=== Dispatch: {} ===\n", result.content_id);
    for (id, attempt) in result.iter() {
        let marker = match attempt.outcome {
            AttemptOutcome::Success => "✓",
            AttemptOutcome::Failed => "✗",
            AttemptOutcome::Skipped(_) | AttemptOutcome::RateLimited => "-",
        };
        let mut line = format!(
            "  {marker} {id}: {} (attempt {})",
            attempt.outcome, attempt.attempt_number
        );
        if let Some(post_id) = &attempt.destination_post_id {
            line.push_str(&format!(", post {post_id}"));
        }
        if let Some(retry_after) = attempt.retry_after() {
            line.push_str(&format!(", retry after {}s", retry_after.as_secs()));
        }
        if let Some(detail) = &attempt.error_detail {
            line.push_str(&format!(", {detail}"));
        }
        println!("{line}");
    }

    let mut aggregator = DispatchMetricsAggregator::new();
    aggregator.update(result);
    println!("\n{}", aggregator.summary());
}

/// Resolves on Ctrl+C or SIGTERM; never resolves if no handler can be installed
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn content_args() -> ContentArgs {
        ContentArgs {
            item: None,
            body: None,
            body_file: None,
            id: None,
            title: None,
            url: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_build_item_from_body_derives_id() {
        let args = ContentArgs {
            body: Some("hello world".into()),
            url: Some("https://example.com/a".into()),
            tags: vec!["rust".into()],
            ..content_args()
        };
        let item = build_item(&args).unwrap();
        assert!(item.id.starts_with("item-"));
        assert_eq!(item.id.len(), "item-".len() + 12);
        assert_eq!(item.source_url.as_deref(), Some("https://example.com/a"));
        assert_eq!(item.tags, vec!["rust"]);

        // same content, same id
        assert_eq!(build_item(&args).unwrap().id, item.id);
    }

    #[test]
    fn test_build_item_from_file_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"id": "launch-post", "body": "We shipped", "title": "Launch"}}"#
        )
        .unwrap();

        let args = ContentArgs {
            item: Some(file.path().to_path_buf()),
            title: Some("Launch day".into()),
            ..content_args()
        };
        let item = build_item(&args).unwrap();
        assert_eq!(item.id, "launch-post");
        assert_eq!(item.body, "We shipped");
        assert_eq!(item.title.as_deref(), Some("Launch day"));
    }

    #[test]
    fn test_build_item_requires_content() {
        let err = build_item(&content_args()).unwrap_err();
        assert!(err.to_string().contains("No content given"));
    }

    #[test]
    fn test_build_item_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let args = ContentArgs {
            item: Some(file.path().to_path_buf()),
            ..content_args()
        };
        let err = build_item(&args).unwrap_err();
        assert!(err.to_string().contains("Invalid content item"));
    }
}
