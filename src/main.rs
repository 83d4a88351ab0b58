use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use wbimg::{run, FetchConfig, ProgressReporter, Reporter, RunStatus, TracingReporter};

#[derive(Parser, Debug)]
#[command(name = "wbimg")]
#[command(about = "Download Wildberries product images by article or catalog link", long_about = None)]
#[command(version)]
struct Args {
    /// Article number or catalog link (read from stdin when omitted)
    input: Option<String>,

    /// Root directory for downloaded images
    #[arg(short, long, default_value = "images")]
    output: PathBuf,

    /// Basket domain serving product images
    #[arg(long, default_value = "wbbasket.ru")]
    host: String,

    /// Maximum number of images probed per shard
    #[arg(long, default_value_t = 50)]
    max_images: u32,

    /// Highest basket shard to probe
    #[arg(long, default_value_t = 16)]
    max_shard: u8,

    /// Lowest basket shard to probe
    #[arg(long, default_value_t = 1)]
    min_shard: u8,

    /// Number of parallel downloads
    #[arg(short = 'j', long, default_value_t = 3)]
    concurrency: usize,

    /// Download attempts per image before skipping it
    #[arg(long, default_value_t = 3)]
    attempts: u32,

    /// Delay between download attempts (e.g. "3s", "500ms")
    #[arg(long, default_value = "3s", value_parser = humantime::parse_duration)]
    retry_delay: Duration,

    /// Connect and read timeout per request
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_input() -> anyhow::Result<String> {
    eprint!("Enter an article number or a Wildberries product link: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read input from stdin")?;
    Ok(line)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; stdout is reserved for --json
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("wbimg={}", log_level))
        .with_writer(std::io::stderr)
        .init();

    let input = match args.input {
        Some(input) => input,
        None => read_input()?,
    };

    let config = FetchConfig {
        host: args.host,
        max_images: args.max_images,
        max_shard: args.max_shard,
        min_shard: args.min_shard,
        max_concurrent_downloads: args.concurrency,
        download_attempts: args.attempts,
        retry_delay: args.retry_delay,
        request_timeout: args.timeout,
        output_dir: args.output,
        ..FetchConfig::default()
    };

    let reporter: Arc<dyn Reporter> = if args.json {
        Arc::new(TracingReporter)
    } else {
        Arc::new(ProgressReporter::new())
    };

    let summary = match run(&input, &config, reporter).await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    match summary.status() {
        RunStatus::Complete | RunStatus::Partial => {
            if let Some(directory) = &summary.directory {
                info!(
                    "✅ Saved {} of {} image(s) to {}",
                    summary.saved,
                    summary.discovered,
                    directory.display()
                );
            }
            Ok(())
        }
        RunStatus::NothingFound => {
            eprintln!("❌ No images found for article {}", summary.product);
            std::process::exit(2);
        }
        RunStatus::AllSkipped => {
            eprintln!(
                "❌ Found {} image(s) for article {} but none could be downloaded",
                summary.discovered, summary.product
            );
            std::process::exit(2);
        }
    }
}
