//! # Fanout CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 单条内容的多目标发布
//! - Ctrl+C / SIGTERM 中断处理

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_publish, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (webhook tokens live there)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(ObservabilityConfig::logs_only(
        cli.log_format.into(),
        cli.log_level(),
    ))?;

    info!(version = env!("CARGO_PKG_VERSION"), "Fanout CLI starting");

    let result = match &cli.command {
        Commands::Publish(args) => run_publish(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
