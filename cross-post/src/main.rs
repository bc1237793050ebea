//! cross-post - Publish one post to several backends at once

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use libcrosscast::logging::LoggingConfig;
use libcrosscast::{
    Config, ConcurrencyMode, CrosscastError, MediaFile, Outcome, PostOrchestrator, PostRequest,
    PublishResult, Result,
};
use serde::Serialize;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "cross-post")]
#[command(version, about = "Publish one post to several backends at once")]
#[command(long_about = "\
cross-post - Publish one post to several backends at once

USAGE:
    # Text to every default backend
    cross-post \"Shipping 1.0 today\"

    # Images, video or a link preview
    cross-post \"Album\" --image a.png --image b.png
    cross-post \"Demo\" --video demo.mp4 --title \"Release demo\"
    cross-post \"Read this\" --link https://example.com/post

    # Pick backends and dispatch mode
    cross-post \"Hello\" --backend alpha,beta --mode sequential

    # JSON output for scripting
    cross-post \"Hello\" --format json | jq '.results[] | select(.success)'

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Override with --config or CROSSCAST_CONFIG.

EXIT CODES:
    0 - Every backend succeeded
    1 - Every backend failed, or a configuration error
    2 - Every backend rejected its credentials
    3 - Invalid input (including unreadable media files)
    4 - Some backends succeeded and some failed
")]
struct Cli {
    /// Post text
    text: String,

    /// Attach an image (repeatable)
    #[arg(long, value_name = "PATH")]
    image: Vec<PathBuf>,

    /// Attach a video
    #[arg(long, value_name = "PATH")]
    video: Option<PathBuf>,

    /// Attach a link
    #[arg(long, value_name = "URL")]
    link: Option<String>,

    /// Title for video and link posts
    #[arg(long)]
    title: Option<String>,

    /// Description for link posts
    #[arg(long)]
    description: Option<String>,

    /// Target backend(s), comma-separated (defaults from config)
    #[arg(short, long, value_delimiter = ',', value_name = "NAME")]
    backend: Vec<String>,

    /// Dispatch mode: parallel or sequential (defaults from config)
    #[arg(short, long)]
    mode: Option<ConcurrencyMode>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Configuration file
    #[arg(short, long, env = "CROSSCAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Machine-readable summary printed with `--format json`
#[derive(Debug, Serialize)]
struct Report<'a> {
    request_id: &'a str,
    outcome: Outcome,
    results: &'a [PublishResult],
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let logging = LoggingConfig {
        verbose: cli.verbose,
        ..LoggingConfig::from_env()
    };
    if let Err(e) = logging.init() {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    debug!("cross-post started with args: {:?}", cli);

    let request = build_request(&cli)?;

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let targets = if cli.backend.is_empty() {
        config.default_targets()
    } else {
        cli.backend.clone()
    };
    if targets.is_empty() {
        return Err(CrosscastError::InvalidInput(
            "No backends selected and none enabled in configuration".to_string(),
        ));
    }
    let mode = cli.mode.unwrap_or(config.defaults.mode);

    let orchestrator = PostOrchestrator::from_config(&config);
    let request = Arc::new(request);
    let results = orchestrator
        .publish(Arc::clone(&request), Some(targets.as_slice()), mode)
        .await;
    let outcome = Outcome::classify(&results);

    match cli.format.as_str() {
        "json" => {
            let report = Report {
                request_id: request.id(),
                outcome,
                results: &results,
            };
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| CrosscastError::InvalidInput(format!("Failed to encode report: {}", e)))?;
            println!("{}", json);
        }
        _ => print_text(&results, outcome),
    }

    Ok(Outcome::exit_code_for(&results))
}

fn build_request(cli: &Cli) -> Result<PostRequest> {
    let mut builder = PostRequest::builder(cli.text.clone());

    for path in &cli.image {
        builder = builder.image(MediaFile::from_path(path)?);
    }
    if let Some(path) = &cli.video {
        builder = builder.video(MediaFile::from_path(path)?);
    }
    if let Some(url) = &cli.link {
        builder = builder.link(url.clone());
    }
    if let Some(title) = &cli.title {
        builder = builder.title(title.clone());
    }
    if let Some(description) = &cli.description {
        builder = builder.description(description.clone());
    }

    builder.build()
}

fn print_text(results: &[PublishResult], outcome: Outcome) {
    for result in results {
        if result.success {
            let id = result.post_id.as_deref().unwrap_or("");
            match &result.permalink {
                Some(link) => println!("✓ {}: {} {}", result.backend, id, link),
                None => println!("✓ {}: {}", result.backend, id),
            }
        } else {
            let kind = result
                .error_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "error".to_string());
            println!(
                "✗ {}: [{}] {}",
                result.backend,
                kind,
                result.message.as_deref().unwrap_or("")
            );
        }
    }

    if outcome != Outcome::AllSucceeded {
        eprintln!("{}", outcome);
    }
}
