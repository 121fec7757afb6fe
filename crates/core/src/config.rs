use std::time::Duration;

use serde::Deserialize;

use crate::error::CrawlError;

/// Immutable options for a crawl session. Built once, validated at session
/// start, then shared read-only by every domain engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Upper bound on distinct pages per domain engine. `None` = unlimited.
    pub max_pages: Option<usize>,
    /// Links at depth >= this value are not enqueued. `None` = unlimited.
    pub max_depth: Option<u32>,
    /// Mandatory sleep before each fetch.
    pub request_delay_ms: u64,
    /// Soft cap reserved for rate-limiter middleware.
    pub max_requests_per_second_per_domain: Option<f64>,
    /// Workers per domain engine.
    pub max_concurrent_workers: usize,
    /// Parallel domain engines in a session.
    pub concurrency: usize,
    /// Ceiling applied to `Crawl-delay` values from robots.txt.
    pub max_robots_crawl_delay_ms: u64,
    /// Bypass robots.txt entirely.
    pub ignore_robots_txt: bool,
    /// Sent on every request; also used for robots section matching.
    pub user_agent: String,
    /// Ignored when a session has more than one seed.
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    /// Regex deny patterns applied to every URL.
    pub custom_url_filters: Vec<String>,
    /// Skip links marked rel=nofollow.
    pub respect_no_follow: bool,
    /// Canonicalize URLs inside the deduplicator.
    pub normalize_urls_for_deduplication: bool,
    pub allowed_protocols: Vec<String>,

    // Timing and threshold knobs.
    pub request_timeout_ms: u64,
    pub body_timeout_ms: u64,
    pub task_timeout_ms: u64,
    pub worker_stale_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub failure_detector_interval_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub queue_warn_threshold: usize,
    pub memory_warn_bytes: u64,
    pub max_body_size: usize,
    pub result_channel_capacity: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_depth: None,
            request_delay_ms: 0,
            max_requests_per_second_per_domain: None,
            max_concurrent_workers: 4,
            concurrency: 2,
            max_robots_crawl_delay_ms: 30_000,
            ignore_robots_txt: false,
            user_agent: format!("spinneret/{}", env!("CARGO_PKG_VERSION")),
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            custom_url_filters: Vec::new(),
            respect_no_follow: false,
            normalize_urls_for_deduplication: true,
            allowed_protocols: vec!["http".to_string(), "https".to_string()],
            request_timeout_ms: 30_000,
            body_timeout_ms: 10_000,
            task_timeout_ms: 10_000,
            worker_stale_ms: 60_000,
            heartbeat_interval_ms: 15_000,
            failure_detector_interval_ms: 30_000,
            max_retries: 2,
            retry_backoff_ms: 1_000,
            queue_warn_threshold: 10_000,
            memory_warn_bytes: 1024 * 1024 * 1024,
            max_body_size: 10 * 1024 * 1024,
            result_channel_capacity: 256,
        }
    }
}

impl CrawlConfig {
    /// Fatal at session start: a config that cannot drive a crawl.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.max_concurrent_workers == 0 {
            return Err(CrawlError::Config(
                "max_concurrent_workers must be at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(CrawlError::Config("concurrency must be at least 1".into()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(CrawlError::Config("user_agent must not be empty".into()));
        }
        if self.allowed_protocols.is_empty() {
            return Err(CrawlError::Config(
                "allowed_protocols must not be empty".into(),
            ));
        }
        if self.max_pages == Some(0) {
            return Err(CrawlError::Config("max_pages must be at least 1".into()));
        }
        if self.result_channel_capacity == 0 {
            return Err(CrawlError::Config(
                "result_channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.body_timeout_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn worker_stale(&self) -> Duration {
        Duration::from_millis(self.worker_stale_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn failure_detector_interval(&self) -> Duration {
        Duration::from_millis(self.failure_detector_interval_ms)
    }

    pub fn max_robots_crawl_delay(&self) -> Duration {
        Duration::from_millis(self.max_robots_crawl_delay_ms)
    }
}
