mod cli;
mod preflight;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;
use steadyload_core::report::{render_summary, write_csv};
use steadyload_core::{HttpTransport, Scheduler, StatsSummary, Transport};
use tracing::info;

use crate::cli::{build_config, Args};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(config.timeout).context("Failed to create HTTP transport")?,
    );

    if !args.skip_precheck && !preflight::gate(transport.clone(), &config, args.yes).await? {
        println!("Exiting.");
        return Ok(());
    }

    println!(
        "Starting load test with {} {} requests at {} requests per second",
        config.total_requests, config.method, config.rate_limit
    );

    let scheduler =
        Scheduler::new(transport).with_progress_log(Duration::from_millis(args.print_every_ms));
    let results = scheduler.run(&config).await?;

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {:?}", args.output))?;
    let mut writer = BufWriter::new(file);
    write_csv(&mut writer, &config.json_paths, &results)
        .and_then(|()| writer.flush())
        .with_context(|| format!("Failed to write {:?}", args.output))?;
    println!("\nDetailed results written to {}", args.output.display());

    let summary = StatsSummary::from_results(&results, results.elapsed().as_millis() as u64);

    if let Some(path) = &args.summary_json {
        let document = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "targets": config.targets,
            "method": config.method,
            "rate_limit": config.rate_limit,
            "total_requests": config.total_requests,
            "summary": summary,
        });
        std::fs::write(path, serde_json::to_string_pretty(&document)?)
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("Summary written to {}", path.display());
    }

    print!("{}", render_summary(&summary));

    Ok(())
}
