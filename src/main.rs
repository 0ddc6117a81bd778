//! CLI entry point: generates the configured feeds once, or forever on an
//! interval.

use anyhow::Result;
use clap::Parser;
use gbfs_synth::fetch::FetchError;
use gbfs_synth::pipeline::{RunSettings, generate_feed_for};
use rand::Rng;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gbfs_synth")]
#[command(about = "Generates GBFS feeds from shared-mobility operator data", long_about = None)]
struct Cli {
    /// Feed ids to generate, comma-separated
    #[arg(short, long, required = true, value_delimiter = ',')]
    providers: Vec<String>,

    /// Base URL feeds are published under
    #[arg(short, long)]
    base_url: String,

    /// Base URL for feeds whose config sets `useCustomBaseUrl`
    #[arg(short, long)]
    custom_base_url: Option<String>,

    /// Directory the feeds are written to, one subdirectory per feed
    #[arg(short, long, default_value = "out")]
    output_dir: PathBuf,

    /// Regenerate every N seconds (0 = run once)
    #[arg(short, long, default_value_t = 0)]
    interval: u64,

    /// Directory holding `{feed}.json` configs
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gbfs_synth.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gbfs_synth.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = RunSettings {
        config_dir: cli.config_dir,
        output_dir: cli.output_dir,
        base_url: cli.base_url.trim_end_matches('/').to_string(),
        custom_base_url: cli
            .custom_base_url
            .map(|url| url.trim_end_matches('/').to_string()),
    };

    loop {
        let mut failed = 0;
        for provider in &cli.providers {
            if let Err(e) = generate_feed_for(provider, &settings).await {
                log_failure(provider, &e);
                failed += 1;
            }
        }

        if cli.interval == 0 {
            info!(feeds = cli.providers.len(), failed, "Run complete");
            return Ok(if failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            });
        }

        let pause = jittered(cli.interval);
        info!(failed, pause_secs = pause.as_secs(), "Pass complete, waiting");
        tokio::time::sleep(pause).await;
    }
}

/// `interval` plus up to a tenth of it.
fn jittered(interval: u64) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..0.1);
    Duration::from_secs(interval).mul_f64(1.0 + jitter)
}

fn log_failure(provider: &str, e: &anyhow::Error) {
    match e.downcast_ref::<FetchError>() {
        Some(FetchError::Status { status, url }) => {
            error!(provider, %status, %url, "Generating feed failed due to HTTP error {status} for url {url}");
        }
        Some(FetchError::Transport { url, source }) if source.is_timeout() => {
            error!(provider, %url, "Generating feed failed due to timeout");
        }
        _ => error!(provider, error = %format!("{e:#}"), "Generating feed failed"),
    }
}
