mod monitor;
mod worker;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error};
use url::Url;

use spinneret_core::{
    CompletionReason, CrawlConfig, CrawlError, CrawlEvent, CrawlLogger, CrawlResult, CrawlSink,
    CrawlTask, MiddlewareChain, Seed,
};
use spinneret_fetch::HttpFetcher;
use spinneret_frontier::{Deduplicator, TaskQueue};
use spinneret_parser::ExtractorConfig;
use spinneret_robots::RobotsCache;

use crate::filter::UrlFilter;

/// Everything one domain engine's workers and monitors share.
pub(crate) struct EngineShared {
    pub domain: String,
    pub config: Arc<CrawlConfig>,
    pub queue: TaskQueue,
    pub dedup: Deduplicator,
    pub heartbeats: DashMap<usize, Instant>,
    /// Results actually published to the sink.
    pub pages_scraped: AtomicUsize,
    pub robots: Arc<RobotsCache>,
    pub fetcher: Arc<HttpFetcher>,
    pub filter: Arc<UrlFilter>,
    pub logger: Arc<dyn CrawlLogger>,
    pub middleware: Arc<MiddlewareChain>,
    pub link_config: ExtractorConfig,
}

/// Shared collaborators handed to every engine by the session.
#[derive(Clone)]
pub(crate) struct EngineDeps {
    pub config: Arc<CrawlConfig>,
    pub robots: Arc<RobotsCache>,
    pub fetcher: Arc<HttpFetcher>,
    pub filter: Arc<UrlFilter>,
    pub logger: Arc<dyn CrawlLogger>,
    pub middleware: Arc<MiddlewareChain>,
}

/// What one finished engine reports back to the session.
#[derive(Debug)]
pub(crate) struct EngineOutcome {
    pub domain: String,
    pub pages_scraped: usize,
    pub reason: CompletionReason,
    pub pending_urls: Vec<String>,
    pub visited_urls: Vec<String>,
}

/// Drives one seed's domain to completion: a private FIFO, a deduplicator,
/// a bounded worker pool, and background health monitors. Owns everything
/// except the sink, which all engines share.
pub(crate) struct DomainEngine {
    shared: Arc<EngineShared>,
    seed: Seed,
}

impl DomainEngine {
    /// `visited` pre-seeds the deduplicator when resuming a session.
    pub fn new(seed: Seed, deps: EngineDeps, visited: &[String]) -> Result<Self, CrawlError> {
        let url = Url::parse(&seed.url)
            .map_err(|e| CrawlError::Config(format!("seed {:?}: {e}", seed.url)))?;
        let domain = url
            .host_str()
            .ok_or_else(|| CrawlError::Config(format!("seed {:?} has no host", seed.url)))?
            .to_ascii_lowercase();

        let dedup = Deduplicator::new(deps.config.normalize_urls_for_deduplication);
        dedup.seed_visited(visited.iter().map(String::as_str));

        let link_config = ExtractorConfig {
            respect_no_follow: deps.config.respect_no_follow,
            ..Default::default()
        };

        Ok(Self {
            shared: Arc::new(EngineShared {
                domain,
                config: deps.config,
                queue: TaskQueue::new(),
                dedup,
                heartbeats: DashMap::new(),
                pages_scraped: AtomicUsize::new(0),
                robots: deps.robots,
                fetcher: deps.fetcher,
                filter: deps.filter,
                logger: deps.logger,
                middleware: deps.middleware,
                link_config,
            }),
            seed,
        })
    }

    pub async fn run(self, sink: Arc<dyn CrawlSink>) -> EngineOutcome {
        let shared = self.shared;
        let logger = Arc::clone(&shared.logger);
        let config = Arc::clone(&shared.config);
        logger.emit(CrawlEvent::DomainStarted {
            domain: shared.domain.clone(),
        });

        shared
            .queue
            .add_task(CrawlTask::seed(
                self.seed.url.clone(),
                self.seed.metadata.clone(),
                self.seed.extract_spec.clone(),
            ))
            .await;

        let (tx, mut rx) = mpsc::channel::<CrawlResult>(config.result_channel_capacity);

        // Single consumer streaming into the user's sink. Never bounded by a
        // timeout: every published result must reach the sink before the
        // engine returns.
        let sink_driver = {
            let logger = Arc::clone(&logger);
            tokio::spawn(async move {
                while let Some(result) = rx.recv().await {
                    if let Err(e) = sink.deliver(result).await {
                        logger.emit(CrawlEvent::edge_case(
                            "sink_error",
                            vec![("error".into(), e.to_string())],
                        ));
                    }
                }
            })
        };

        let mut workers = Vec::with_capacity(config.max_concurrent_workers);
        for worker_id in 0..config.max_concurrent_workers {
            logger.emit(CrawlEvent::WorkerCreated {
                domain: shared.domain.clone(),
                worker_id,
            });
            let shared = Arc::clone(&shared);
            let tx = tx.clone();
            workers.push((
                worker_id,
                tokio::spawn(async move { worker::run(shared, worker_id, tx).await }),
            ));
        }
        drop(tx);

        let monitors = monitor::spawn(Arc::clone(&shared));

        for (worker_id, handle) in workers {
            if let Err(e) = handle.await {
                logger.emit(CrawlEvent::WorkerCrash {
                    domain: shared.domain.clone(),
                    worker_id,
                    error: e.to_string(),
                });
            }
        }

        monitors.shutdown().await;

        // All worker senders are gone; the driver exits once the channel
        // drains. This await is the durability guarantee.
        if let Err(e) = sink_driver.await {
            error!(domain = %shared.domain, error = %e, "sink driver failed");
        }

        let pages_scraped = shared.pages_scraped.load(Ordering::Acquire);
        let reason = shared
            .queue
            .completion_reason()
            .await
            .unwrap_or(if shared.queue.max_pages_hit() {
                CompletionReason::MaxPagesReached
            } else {
                CompletionReason::QueueEmpty
            });
        logger.emit(CrawlEvent::DomainCompleted {
            domain: shared.domain.clone(),
            reason,
            page_count: pages_scraped,
        });

        let pending_urls = shared
            .queue
            .drain_pending()
            .await
            .into_iter()
            .map(|t| t.url)
            .collect();
        let visited_urls = shared.dedup.snapshot();
        debug!(domain = %shared.domain, pages_scraped, "engine finished");

        EngineOutcome {
            domain: shared.domain.clone(),
            pages_scraped,
            reason,
            pending_urls,
            visited_urls,
        }
    }
}

/// Best-effort resident set size. Only meaningful on Linux; elsewhere the
/// memory warning simply never fires.
pub(crate) fn rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(pages * 4096)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
