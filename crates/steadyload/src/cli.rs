use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use steadyload_core::{BodyTemplate, HttpMethod, RunConfig, RunFile};

const DEFAULT_RATE: u32 = 10;
const DEFAULT_REQUESTS: u64 = 100;

#[derive(Parser, Debug)]
#[command(name = "steadyload")]
#[command(about = "Rate-limited HTTP load tester")]
pub struct Args {
    /// URLs to test (round-robin across all of them)
    pub urls: Vec<String>,

    /// HTTP method to use
    #[arg(long, value_parser = ["GET", "POST"])]
    pub method: Option<String>,

    /// JSON object template for the request body
    #[arg(long)]
    pub json_template: Option<String>,

    /// JSON paths to extract from each response
    #[arg(long, num_args = 1..)]
    pub json_paths: Vec<String>,

    /// Requests per second; also the maximum number in flight
    #[arg(long)]
    pub rate: Option<u32>,

    /// Total number of requests to make
    #[arg(long)]
    pub requests: Option<u64>,

    /// Output CSV file
    #[arg(long, default_value = "load_test_results.csv")]
    pub output: PathBuf,

    /// TOML run file providing defaults for any option not given here
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Per-request timeout in milliseconds (no timeout by default)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Seed for reproducible request bodies
    #[arg(long)]
    pub seed: Option<u64>,

    /// Also write the summary as JSON to this file
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Continue without asking if the pre-check fails
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Skip the pre-check request
    #[arg(long)]
    pub skip_precheck: bool,

    /// Log progress every N milliseconds (0 disables)
    #[arg(long, default_value = "1000")]
    pub print_every_ms: u64,
}

fn parse_template(raw: &str) -> Result<BodyTemplate> {
    let value: Value = serde_json::from_str(raw).context("--json-template is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--json-template must be a JSON object, got: {other}"),
    }
}

fn check_target(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).with_context(|| format!("Invalid URL: {raw}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("URL must be http:// or https:// (got {raw})");
    }
    if url.host_str().is_none() {
        anyhow::bail!("URL must include a hostname (got {raw})");
    }
    Ok(())
}

/// Merge CLI arguments over the optional run file. CLI values win.
pub fn build_config(args: &Args) -> Result<RunConfig> {
    let file = match &args.config {
        Some(path) => RunFile::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => RunFile::default(),
    };
    let run = file.run;

    let targets = if args.urls.is_empty() {
        run.targets
    } else {
        args.urls.clone()
    };
    if targets.is_empty() {
        anyhow::bail!("at least one URL is required (positional or [run].targets)");
    }
    for target in &targets {
        check_target(target)?;
    }

    let method = match &args.method {
        Some(m) => m.parse::<HttpMethod>()?,
        None => run.method.unwrap_or_default(),
    };

    let body_template = match &args.json_template {
        Some(raw) => Some(parse_template(raw)?),
        None => run.body_template,
    };

    let json_paths = if args.json_paths.is_empty() {
        run.json_paths
    } else {
        args.json_paths.clone()
    };

    let timeout_ms = args.timeout_ms.or(run.timeout_ms);

    let config = RunConfig {
        targets,
        method,
        body_template,
        json_paths,
        rate_limit: args.rate.or(run.rate_limit).unwrap_or(DEFAULT_RATE),
        total_requests: args
            .requests
            .or(run.total_requests)
            .unwrap_or(DEFAULT_REQUESTS),
        timeout: timeout_ms.map(Duration::from_millis),
        seed: args.seed.or(run.seed),
    };

    config.validate().context("Invalid run configuration")?;
    Ok(config)
}
