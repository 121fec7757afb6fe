mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

// mimalloc keeps memory flat under high worker concurrency where glibc
// malloc tends not to release.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use spinneret::{CrawlConfig, CrawlSession, JsonLinesSink, JsonStateStore, Seed};

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: CrawlConfig = toml::from_str(&config_str)?;

    // Environment overrides for quick tuning without editing the config.
    if let Ok(v) = std::env::var("SPINNERET_WORKERS") {
        if let Ok(n) = v.parse::<usize>() {
            if n > 0 && n <= 128 {
                config.max_concurrent_workers = n;
            }
        }
    }
    if let Ok(v) = std::env::var("SPINNERET_CONCURRENCY") {
        if let Ok(n) = v.parse::<usize>() {
            if n > 0 && n <= 64 {
                config.concurrency = n;
            }
        }
    }
    if let Ok(v) = std::env::var("SPINNERET_IGNORE_ROBOTS") {
        config.ignore_robots_txt = v != "0" && v.to_lowercase() != "false";
    }

    let state_dir = std::env::var("SPINNERET_STATE_DIR")
        .unwrap_or_else(|_| ".spinneret/state".to_string());

    match cli.command {
        Commands::Crawl {
            seeds,
            seed,
            depth,
            output,
            session_key,
        } => {
            if let Some(depth) = depth {
                config.max_depth = Some(depth);
            }

            let mut seed_urls: Vec<String> = Vec::new();
            if let Some(s) = seed {
                seed_urls.push(s);
            }
            if let Some(seeds_arg) = seeds {
                if std::path::Path::new(&seeds_arg).exists() {
                    let content = std::fs::read_to_string(&seeds_arg)?;
                    seed_urls.extend(
                        content
                            .lines()
                            .map(|l| l.trim().to_string())
                            .filter(|l| !l.is_empty()),
                    );
                } else {
                    seed_urls.extend(seeds_arg.split(',').map(|s| s.trim().to_string()));
                }
            }
            if seed_urls.is_empty() {
                anyhow::bail!("no seeds given; pass --seed or --seeds");
            }
            let seeds: Vec<Seed> = seed_urls.iter().map(Seed::from).collect();

            let sink = Arc::new(match &output {
                Some(path) => JsonLinesSink::create(path).await?,
                None => JsonLinesSink::stdout(),
            });

            let mut session = CrawlSession::new(config)?;
            if session_key.is_some() {
                session = session.with_state_store(Arc::new(JsonStateStore::new(&state_dir)));
            }

            let report = match &session_key {
                Some(key) => session.crawl_with_key(key, seeds, sink.clone()).await?,
                None => session.crawl(seeds, sink.clone()).await?,
            };
            sink.flush().await?;

            info!(
                total_pages = report.total_pages,
                domains = report.per_domain.len(),
                "crawl finished"
            );
            for domain in &report.per_domain {
                info!(
                    domain = %domain.domain,
                    pages_scraped = domain.pages_scraped,
                    "domain summary"
                );
            }
        }
        Commands::Resume {
            session_key,
            output,
        } => {
            let sink = Arc::new(match &output {
                Some(path) => JsonLinesSink::create(path).await?,
                None => JsonLinesSink::stdout(),
            });
            let session = CrawlSession::new(config)?
                .with_state_store(Arc::new(JsonStateStore::new(&state_dir)));
            let report = session.resume(&session_key, sink.clone()).await?;
            sink.flush().await?;
            info!(
                total_pages = report.total_pages,
                "resumed crawl finished"
            );
        }
    }

    Ok(())
}
