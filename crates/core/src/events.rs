use std::sync::Mutex;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::types::CompletionReason;

/// Structured lifecycle events emitted by the session and its engines.
/// Consumers get typed variants; the default logger flattens them into
/// tracing records with structured fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CrawlEvent {
    SessionStarted {
        seed_count: usize,
    },
    SessionCompleted {
        total_pages: usize,
        duration_ms: u64,
    },
    DomainStarted {
        domain: String,
    },
    DomainCompleted {
        domain: String,
        reason: CompletionReason,
        page_count: usize,
    },
    WorkerCreated {
        domain: String,
        worker_id: usize,
    },
    WorkerEnteringLoop {
        domain: String,
        worker_id: usize,
    },
    WorkerExitingLoop {
        domain: String,
        worker_id: usize,
        reason: String,
    },
    TaskAcquired {
        domain: String,
        worker_id: usize,
        url: String,
        active_workers: usize,
    },
    TaskAcquisitionTimeout {
        domain: String,
        worker_id: usize,
    },
    PageScraped {
        domain: String,
        worker_id: usize,
        url: String,
        page_count: usize,
    },
    QueueStatus {
        domain: String,
        queue_size: usize,
        active_workers: usize,
        page_count: usize,
        max_workers: usize,
    },
    RobotsBlocked {
        domain: String,
        url: String,
    },
    FetchRetry {
        domain: String,
        url: String,
        attempt: u32,
        error: String,
    },
    FetchFailed {
        domain: String,
        url: String,
        attempts: u32,
        error: String,
    },
    CrawlDelayCapped {
        domain: String,
        requested_ms: u64,
        capped_ms: u64,
    },
    HighMemoryUsage {
        domain: String,
        rss_bytes: u64,
    },
    ExcessiveQueueSize {
        domain: String,
        queue_size: usize,
    },
    WorkerDeathDetected {
        domain: String,
        worker_id: usize,
        last_seen_ms: u64,
    },
    CriticalFailureDetected {
        domain: String,
        reason: String,
        queue_size: usize,
        active_workers: usize,
        page_count: usize,
    },
    WorkerCrash {
        domain: String,
        worker_id: usize,
        error: String,
    },
    /// Free-form bucket for conditions that deserve a record but not their
    /// own variant.
    EdgeCase {
        category: String,
        details: Vec<(String, String)>,
    },
}

impl CrawlEvent {
    pub fn edge_case(category: &str, details: Vec<(String, String)>) -> Self {
        CrawlEvent::EdgeCase {
            category: category.to_string(),
            details,
        }
    }
}

/// Sink for crawl events. Implementations must tolerate concurrent emission
/// from many workers.
pub trait CrawlLogger: Send + Sync {
    fn emit(&self, event: CrawlEvent);
}

/// Default logger: forwards every event to `tracing` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl CrawlLogger for TracingLogger {
    fn emit(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::SessionStarted { seed_count } => {
                info!(seed_count, "session started");
            }
            CrawlEvent::SessionCompleted {
                total_pages,
                duration_ms,
            } => {
                info!(total_pages, duration_ms, "session completed");
            }
            CrawlEvent::DomainStarted { domain } => {
                info!(domain, "domain crawl started");
            }
            CrawlEvent::DomainCompleted {
                domain,
                reason,
                page_count,
            } => {
                info!(domain, reason = %reason, page_count, "domain crawl complete");
            }
            CrawlEvent::WorkerCreated { domain, worker_id } => {
                info!(domain, worker_id, "worker created");
            }
            CrawlEvent::WorkerEnteringLoop { domain, worker_id } => {
                info!(domain, worker_id, "worker entering loop");
            }
            CrawlEvent::WorkerExitingLoop {
                domain,
                worker_id,
                reason,
            } => {
                info!(domain, worker_id, reason, "worker exiting loop");
            }
            CrawlEvent::TaskAcquired {
                domain,
                worker_id,
                url,
                active_workers,
            } => {
                info!(domain, worker_id, url, active_workers, "task acquired");
            }
            CrawlEvent::TaskAcquisitionTimeout { domain, worker_id } => {
                warn!(domain, worker_id, "task acquisition timed out");
            }
            CrawlEvent::PageScraped {
                domain,
                worker_id,
                url,
                page_count,
            } => {
                info!(domain, worker_id, url, page_count, "page scraped");
            }
            CrawlEvent::QueueStatus {
                domain,
                queue_size,
                active_workers,
                page_count,
                max_workers,
            } => {
                info!(
                    domain,
                    queue_size, active_workers, page_count, max_workers, "queue status"
                );
            }
            CrawlEvent::RobotsBlocked { domain, url } => {
                info!(domain, url, "robots_blocked");
            }
            CrawlEvent::FetchRetry {
                domain,
                url,
                attempt,
                error,
            } => {
                warn!(domain, url, attempt, error, "fetch failed, will retry");
            }
            CrawlEvent::FetchFailed {
                domain,
                url,
                attempts,
                error,
            } => {
                warn!(domain, url, attempts, error, "fetch failed permanently");
            }
            CrawlEvent::CrawlDelayCapped {
                domain,
                requested_ms,
                capped_ms,
            } => {
                info!(domain, requested_ms, capped_ms, "crawl delay capped");
            }
            CrawlEvent::HighMemoryUsage { domain, rss_bytes } => {
                warn!(domain, rss_bytes, "high memory usage");
            }
            CrawlEvent::ExcessiveQueueSize { domain, queue_size } => {
                warn!(domain, queue_size, "excessive queue size");
            }
            CrawlEvent::WorkerDeathDetected {
                domain,
                worker_id,
                last_seen_ms,
            } => {
                warn!(domain, worker_id, last_seen_ms, "worker death detected");
            }
            CrawlEvent::CriticalFailureDetected {
                domain,
                reason,
                queue_size,
                active_workers,
                page_count,
            } => {
                error!(
                    domain,
                    reason, queue_size, active_workers, page_count, "critical failure detected"
                );
            }
            CrawlEvent::WorkerCrash {
                domain,
                worker_id,
                error,
            } => {
                error!(domain, worker_id, error, "worker crashed");
            }
            CrawlEvent::EdgeCase { category, details } => {
                warn!(category, ?details, "edge case");
            }
        }
    }
}

/// Discards every event. Handy default for embedding tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl CrawlLogger for NullLogger {
    fn emit(&self, _event: CrawlEvent) {}
}

/// Collects events in memory so tests can assert on what was emitted.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    events: Mutex<Vec<CrawlEvent>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CrawlEvent> {
        self.events.lock().expect("event log poisoned").clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&CrawlEvent) -> bool) -> usize {
        self.events
            .lock()
            .expect("event log poisoned")
            .iter()
            .filter(|e| predicate(e))
            .count()
    }
}

impl CrawlLogger for MemoryLogger {
    fn emit(&self, event: CrawlEvent) {
        self.events.lock().expect("event log poisoned").push(event);
    }
}
