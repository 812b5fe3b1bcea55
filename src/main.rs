use anyhow::Context;
use bulkfetch::cli::Cli;
use bulkfetch::config::FetchConfig;
use bulkfetch::downloader::{self, Downloader};
use bulkfetch::parser;
use bulkfetch::types::DownloadStatus;
use clap::Parser;
use colored::*;
use log::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    info!("Starting bulk fetcher");

    let cli = Cli::parse();
    let input_file = cli.input_file.clone();
    let config = FetchConfig::from(cli);
    info!(
        "CLI arguments parsed: pool_size={}, chunked={}, chunks={}",
        config.pool_size, config.use_chunked, config.chunk_concurrency
    );

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("creating output directory {}", config.output_dir.display()))?;

    let urls = match parser::read_url_list(&input_file).await {
        Ok(urls) => urls,
        Err(e) => {
            error!("Failed to read URL list: {}", e);
            eprintln!("{}", "Failed to read URL list".red());
            return Err(e).with_context(|| format!("reading {}", input_file.display()));
        }
    };

    let stats_csv = config.stats_csv.clone();
    let downloader = Downloader::new(config).context("building HTTP client")?;
    let summary = downloader.download_all(urls).await;

    if let Some(path) = stats_csv {
        if let Err(e) = downloader::write_stats_csv(&summary, &path) {
            error!("Failed to write stats CSV: {}", e);
        }
    }

    println!("\n{}", "Download Summary:".bold());
    println!("Completed: {}", summary.completed.to_string().green());
    println!("Ignored:   {}", summary.ignored.to_string().yellow());
    println!("Errored:   {}", summary.errored.to_string().red());
    println!(
        "Total data transferred: {:.2} MB",
        summary.total_bytes_downloaded as f64 / 1_048_576.0
    );
    println!("Total duration: {:.2?}", summary.elapsed);

    if summary.errored > 0 {
        println!("\n{}", "Failed Downloads:".red().bold());
        for report in summary
            .reports
            .iter()
            .filter(|r| r.status == DownloadStatus::Failed)
        {
            println!("✗ {} - Error: {}", report.url.red(), report.error.as_deref().unwrap_or("unknown"));
        }
        anyhow::bail!("{} downloads failed", summary.errored);
    }

    info!(
        "Downloaded {} files took {:?}",
        summary.completed, summary.elapsed
    );
    Ok(())
}
