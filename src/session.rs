use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use spinneret_core::{
    CrawlConfig, CrawlError, CrawlEvent, CrawlLogger, CrawlReport, CrawlSink, DomainSummary,
    MiddlewareChain, SavedState, Seed, StateStore, TracingLogger,
};
use spinneret_fetch::{FetchOptions, HttpFetcher};
use spinneret_frontier::{dedupe_seeds, SeedDedupPolicy};
use spinneret_robots::RobotsCache;

use crate::engine::{DomainEngine, EngineDeps, EngineOutcome};
use crate::filter::{same_site, UrlFilter};

/// One crawl of one or more seeds: per-seed domain engines, bounded engine
/// concurrency, one shared sink, one shared robots cache.
pub struct CrawlSession {
    config: Arc<CrawlConfig>,
    logger: Arc<dyn CrawlLogger>,
    robots: Arc<RobotsCache>,
    fetcher: Arc<HttpFetcher>,
    middleware: Arc<MiddlewareChain>,
    state_store: Option<Arc<dyn StateStore>>,
    seed_policy: SeedDedupPolicy,
}

impl CrawlSession {
    pub fn new(config: CrawlConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let robots = RobotsCache::new(&config.user_agent, config.request_timeout())?;
        let fetcher = HttpFetcher::new(FetchOptions::from_config(&config))?;
        Ok(Self {
            config: Arc::new(config),
            logger: Arc::new(TracingLogger),
            robots: Arc::new(robots),
            fetcher: Arc::new(fetcher),
            middleware: Arc::new(MiddlewareChain::default()),
            state_store: None,
            seed_policy: SeedDedupPolicy::default(),
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn CrawlLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_middleware(mut self, middleware: MiddlewareChain) -> Self {
        self.middleware = Arc::new(middleware);
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn with_seed_policy(mut self, policy: SeedDedupPolicy) -> Self {
        self.seed_policy = policy;
        self
    }

    /// Crawl the given seeds, funneling every result into `sink`.
    pub async fn crawl(
        &self,
        seeds: Vec<Seed>,
        sink: Arc<dyn CrawlSink>,
    ) -> Result<CrawlReport, CrawlError> {
        self.run(seeds, sink, None).await
    }

    /// Crawl and persist final state under `session_key`, so the run can be
    /// picked up later with [`CrawlSession::resume`]. Requires a state store.
    pub async fn crawl_with_key(
        &self,
        session_key: &str,
        seeds: Vec<Seed>,
        sink: Arc<dyn CrawlSink>,
    ) -> Result<CrawlReport, CrawlError> {
        if self.state_store.is_none() {
            return Err(CrawlError::State {
                op: "save",
                session_key: session_key.to_string(),
                cause: "no state store configured".into(),
            });
        }
        self.run(seeds, sink, Some((session_key.to_string(), Vec::new())))
            .await
    }

    /// Resume a previously saved session: pending URLs become the seeds and
    /// visited URLs pre-seed the deduplicators.
    pub async fn resume(
        &self,
        session_key: &str,
        sink: Arc<dyn CrawlSink>,
    ) -> Result<CrawlReport, CrawlError> {
        let store = self.state_store.as_ref().ok_or_else(|| CrawlError::State {
            op: "load",
            session_key: session_key.to_string(),
            cause: "no state store configured".into(),
        })?;
        let state = store
            .load_state(session_key)
            .await?
            .ok_or_else(|| CrawlError::State {
                op: "load",
                session_key: session_key.to_string(),
                cause: "no saved state".into(),
            })?;
        info!(
            session_key,
            pending = state.pending_urls.len(),
            visited = state.visited_urls.len(),
            "resuming session"
        );
        let seeds: Vec<Seed> = state.pending_urls.iter().map(Seed::from).collect();
        self.run(seeds, sink, Some((session_key.to_string(), state.visited_urls)))
            .await
    }

    async fn run(
        &self,
        seeds: Vec<Seed>,
        sink: Arc<dyn CrawlSink>,
        resume: Option<(String, Vec<String>)>,
    ) -> Result<CrawlReport, CrawlError> {
        let started = Instant::now();
        self.logger.emit(CrawlEvent::SessionStarted {
            seed_count: seeds.len(),
        });

        let outcome = dedupe_seeds(&seeds, &self.seed_policy);
        if outcome.stats.duplicates > 0 {
            info!(
                total = outcome.stats.total,
                unique = outcome.stats.unique,
                duplicates = outcome.stats.duplicates,
                "seed list reduced"
            );
            for skipped in &outcome.skipped {
                self.logger.emit(CrawlEvent::edge_case(
                    "seed_skipped",
                    vec![
                        ("url".into(), skipped.url.clone()),
                        ("reason".into(), skipped.reason.clone()),
                    ],
                ));
            }
        }
        if outcome.deduplicated.is_empty() {
            return Err(CrawlError::Config("no usable seeds".into()));
        }

        let multi_seed = outcome.deduplicated.len() > 1;
        if multi_seed
            && (!self.config.allowed_domains.is_empty() || !self.config.blocked_domains.is_empty())
        {
            warn!(
                seeds = outcome.deduplicated.len(),
                "allowed/blocked domain lists are ignored with multiple seeds; \
                 each engine restricts to its own seed's domain"
            );
            self.logger.emit(CrawlEvent::edge_case(
                "domain_filters_superseded",
                vec![("seeds".into(), outcome.deduplicated.len().to_string())],
            ));
        }

        let filter = Arc::new(UrlFilter::compile(&self.config, multi_seed)?);
        let deps = EngineDeps {
            config: Arc::clone(&self.config),
            robots: Arc::clone(&self.robots),
            fetcher: Arc::clone(&self.fetcher),
            filter,
            logger: Arc::clone(&self.logger),
            middleware: Arc::clone(&self.middleware),
        };

        let visited = resume
            .as_ref()
            .map(|(_, visited)| visited.as_slice())
            .unwrap_or(&[]);

        // Engines are built up front so a bad seed fails the session before
        // any crawling starts; the semaphore then caps how many run at once.
        let mut engines = Vec::with_capacity(outcome.deduplicated.len());
        for seed in outcome.deduplicated {
            let engine_visited = per_domain_visited(&seed, visited);
            engines.push(DomainEngine::new(seed, deps.clone(), &engine_visited)?);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(engines.len());
        for engine in engines {
            let semaphore = Arc::clone(&semaphore);
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("session semaphore closed");
                engine.run(sink).await
            }));
        }

        let mut outcomes: Vec<EngineOutcome> = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    self.logger.emit(CrawlEvent::edge_case(
                        "engine_crashed",
                        vec![("error".into(), e.to_string())],
                    ));
                }
            }
        }

        if let (Some(store), Some((session_key, _))) = (&self.state_store, &resume) {
            let state = SavedState {
                pending_urls: outcomes
                    .iter()
                    .flat_map(|o| o.pending_urls.iter().cloned())
                    .collect(),
                visited_urls: outcomes
                    .iter()
                    .flat_map(|o| o.visited_urls.iter().cloned())
                    .collect(),
            };
            if let Err(e) = store.save_state(session_key, &state).await {
                warn!(session_key, error = %e, "failed to persist session state");
            }
        }

        let total_pages: usize = outcomes.iter().map(|o| o.pages_scraped).sum();
        let per_domain = outcomes
            .into_iter()
            .map(|o| DomainSummary {
                domain: o.domain,
                pages_scraped: o.pages_scraped,
            })
            .collect();

        self.logger.emit(CrawlEvent::SessionCompleted {
            total_pages,
            duration_ms: started.elapsed().as_millis() as u64,
        });

        Ok(CrawlReport {
            completed: true,
            total_pages,
            per_domain,
        })
    }
}

/// Only the visited URLs that belong to this seed's domain pre-seed its
/// engine, so per-domain page accounting stays correct.
fn per_domain_visited(seed: &Seed, visited: &[String]) -> Vec<String> {
    let Some(anchor) = url::Url::parse(&seed.url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    else {
        return Vec::new();
    };
    visited
        .iter()
        .filter(|v| {
            url::Url::parse(v)
                .ok()
                .and_then(|u| u.host_str().map(|h| same_site(&h.to_ascii_lowercase(), &anchor)))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
