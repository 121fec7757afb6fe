use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, error};
use url::Url;

use spinneret_core::{
    CompletionReason, CrawlError, CrawlEvent, CrawlLogger, CrawlResult, CrawlTask, FetchResponse,
};
use spinneret_frontier::TakeOutcome;
use spinneret_parser::{links, parse_response};

use super::{rss_bytes, EngineShared};

/// Whether the worker keeps looping after one task.
enum TaskEnd {
    Continue,
    Complete,
}

/// Logs the exiting_loop event on every path out of the worker, including
/// panics unwinding through the task.
struct ExitLog {
    logger: Arc<dyn CrawlLogger>,
    domain: String,
    worker_id: usize,
    reason: std::sync::Mutex<String>,
}

impl ExitLog {
    fn set(&self, reason: &str) {
        *self.reason.lock().expect("exit reason poisoned") = reason.to_string();
    }
}

impl Drop for ExitLog {
    fn drop(&mut self) {
        let reason = self.reason.lock().map(|r| r.clone()).unwrap_or_default();
        self.logger.emit(CrawlEvent::WorkerExitingLoop {
            domain: self.domain.clone(),
            worker_id: self.worker_id,
            reason,
        });
    }
}

pub(super) async fn run(
    shared: Arc<EngineShared>,
    worker_id: usize,
    results: mpsc::Sender<CrawlResult>,
) {
    let logger = Arc::clone(&shared.logger);
    logger.emit(CrawlEvent::WorkerEnteringLoop {
        domain: shared.domain.clone(),
        worker_id,
    });
    let exit = ExitLog {
        logger: Arc::clone(&logger),
        domain: shared.domain.clone(),
        worker_id,
        reason: std::sync::Mutex::new("crashed".to_string()),
    };

    loop {
        shared.heartbeats.insert(worker_id, Instant::now());
        emit_resource_warnings(&shared).await;

        let outcome = match tokio::time::timeout(
            shared.config.task_timeout(),
            shared.queue.take_task_or_complete(),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                // Should never happen: the critical section is short. Back
                // out and keep going rather than killing the worker.
                shared.queue.mark_idle().await;
                logger.emit(CrawlEvent::TaskAcquisitionTimeout {
                    domain: shared.domain.clone(),
                    worker_id,
                });
                logger.emit(CrawlEvent::edge_case(
                    "deadlock_detected",
                    vec![
                        ("domain".into(), shared.domain.clone()),
                        ("worker_id".into(), worker_id.to_string()),
                        ("stage".into(), "task_acquisition".into()),
                    ],
                ));
                continue;
            }
        };

        match outcome {
            TakeOutcome::Completed { reason, was_first } => {
                if was_first {
                    logger.emit(CrawlEvent::DomainCompleted {
                        domain: shared.domain.clone(),
                        reason,
                        page_count: shared.pages_scraped.load(Ordering::Acquire),
                    });
                }
                exit.set("completed");
                break;
            }
            TakeOutcome::EmptyButActive { active_workers } => {
                debug!(
                    domain = %shared.domain,
                    worker_id,
                    active_workers,
                    "queue empty, backing off"
                );
                let backoff = rand::thread_rng().gen_range(1_000..=5_000);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            TakeOutcome::Task {
                task,
                active_workers,
            } => {
                logger.emit(CrawlEvent::TaskAcquired {
                    domain: shared.domain.clone(),
                    worker_id,
                    url: task.url.clone(),
                    active_workers,
                });
                match process_task(&shared, worker_id, task, &results).await {
                    TaskEnd::Continue => {}
                    TaskEnd::Complete => {
                        exit.set("max_pages");
                        break;
                    }
                }
                if shared.queue.is_completed() {
                    exit.set("completed");
                    break;
                }
            }
        }
    }
}

async fn process_task(
    shared: &Arc<EngineShared>,
    worker_id: usize,
    task: CrawlTask,
    results: &mpsc::Sender<CrawlResult>,
) -> TaskEnd {
    let logger = &shared.logger;
    let config = &shared.config;
    let started = Instant::now();

    // First touch wins; anything already seen in this domain is dropped.
    if !shared.dedup.try_add(&task.url) {
        shared.queue.mark_idle().await;
        return TaskEnd::Continue;
    }

    // The admission above may have pushed the distinct-URL count past the
    // cap; such a task must not produce a result.
    if let Some(cap) = config.max_pages {
        if shared.dedup.size() > cap {
            if shared.queue.mark_max_pages() {
                logger.emit(CrawlEvent::DomainCompleted {
                    domain: shared.domain.clone(),
                    reason: CompletionReason::MaxPagesReached,
                    page_count: shared.pages_scraped.load(Ordering::Acquire),
                });
            }
            shared.queue.mark_idle().await;
            return TaskEnd::Complete;
        }
    }

    let url = match Url::parse(&task.url) {
        Ok(url) => url,
        Err(e) => {
            logger.emit(CrawlEvent::edge_case(
                "invalid_task_url",
                vec![
                    ("url".into(), task.url.clone()),
                    ("error".into(), e.to_string()),
                ],
            ));
            shared.queue.mark_idle().await;
            return TaskEnd::Continue;
        }
    };

    if let Err(reason) = shared.filter.should_follow(&url, &shared.domain) {
        logger.emit(CrawlEvent::edge_case(
            "url_filtered",
            vec![
                ("url".into(), task.url.clone()),
                ("reason".into(), reason.as_str().to_string()),
            ],
        ));
        shared.queue.mark_idle().await;
        return TaskEnd::Continue;
    }

    if !config.ignore_robots_txt {
        let verdict = shared.robots.check_url(&task.url).await;
        if !verdict.allowed {
            logger.emit(CrawlEvent::RobotsBlocked {
                domain: shared.domain.clone(),
                url: task.url.clone(),
            });
            shared.queue.mark_idle().await;
            return TaskEnd::Continue;
        }
        if let Some(requested) = verdict.crawl_delay {
            let ceiling = config.max_robots_crawl_delay();
            let delay = requested.min(ceiling);
            if delay < requested {
                logger.emit(CrawlEvent::CrawlDelayCapped {
                    domain: shared.domain.clone(),
                    requested_ms: requested.as_millis() as u64,
                    capped_ms: delay.as_millis() as u64,
                });
            }
            tokio::time::sleep(delay).await;
        }
    }

    if config.request_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(config.request_delay_ms)).await;
    }

    let resp = match fetch_with_retries(shared, &task, &url).await {
        Ok(resp) => resp,
        Err((e, attempts)) => {
            logger.emit(CrawlEvent::FetchFailed {
                domain: shared.domain.clone(),
                url: task.url.clone(),
                attempts,
                error: e.to_string(),
            });
            shared.queue.mark_idle().await;
            return TaskEnd::Continue;
        }
    };

    // Synchronous CPU section: parse, summarize, extract. No awaits until
    // the parsed document is dropped.
    let parsed = match parse_response(
        &resp,
        task.depth,
        &shared.link_config,
        task.extract_spec.as_ref(),
    ) {
        Ok(parsed) => parsed,
        Err(e @ CrawlError::Schema { .. }) => {
            // A schema violation is a pipeline bug; stop the domain rather
            // than deliver unchecked records.
            logger.emit(CrawlEvent::edge_case(
                "schema_violation",
                vec![
                    ("url".into(), task.url.clone()),
                    ("error".into(), e.to_string()),
                ],
            ));
            shared.queue.force_complete(CompletionReason::Error).await;
            shared.queue.mark_idle().await;
            return TaskEnd::Complete;
        }
        Err(e) => {
            logger.emit(CrawlEvent::edge_case(
                "parse_failed",
                vec![
                    ("url".into(), task.url.clone()),
                    ("error".into(), e.to_string()),
                ],
            ));
            shared.queue.mark_idle().await;
            return TaskEnd::Continue;
        }
    };

    let mut page = parsed.page;
    page.scrape_duration_ms = started.elapsed().as_millis() as u64;

    let result = CrawlResult {
        depth: task.depth,
        timestamp: chrono::Utc::now(),
        metadata: task.metadata.clone(),
        page_data: page,
    };
    if results.send(result).await.is_err() {
        error!(domain = %shared.domain, worker_id, "result channel closed");
    }
    let page_count = shared.pages_scraped.fetch_add(1, Ordering::AcqRel) + 1;
    logger.emit(CrawlEvent::PageScraped {
        domain: shared.domain.clone(),
        worker_id,
        url: task.url.clone(),
        page_count,
    });

    let below_depth_limit = config.max_depth.map(|d| task.depth < d).unwrap_or(true);
    if below_depth_limit {
        let mut enqueued = 0usize;
        for href in &parsed.links.links {
            let Some(resolved) = links::resolve_link(&resp.final_url, href) else {
                continue;
            };
            if shared.filter.should_follow(&resolved, &shared.domain).is_err() {
                continue;
            }
            if shared.dedup.contains(resolved.as_str()) {
                continue;
            }
            if shared.queue.add_task(task.child(resolved.into())).await {
                enqueued += 1;
            }
        }
        if enqueued > 0 {
            debug!(domain = %shared.domain, worker_id, enqueued, "links enqueued");
        }
    }

    shared.queue.mark_idle().await;

    if let Some(cap) = config.max_pages {
        if shared.dedup.size() >= cap {
            if shared.queue.mark_max_pages() {
                logger.emit(CrawlEvent::DomainCompleted {
                    domain: shared.domain.clone(),
                    reason: CompletionReason::MaxPagesReached,
                    page_count: shared.pages_scraped.load(Ordering::Acquire),
                });
            }
            return TaskEnd::Complete;
        }
    }

    if page_count % 10 == 0 {
        logger.emit(CrawlEvent::QueueStatus {
            domain: shared.domain.clone(),
            queue_size: shared.queue.size().await,
            active_workers: shared.queue.active_workers().await,
            page_count: shared.dedup.size(),
            max_workers: config.max_concurrent_workers,
        });
    }

    TaskEnd::Continue
}

/// Up to `max_retries` extra attempts with exponential backoff; content-type
/// rejections are final. Middleware folds around every attempt.
async fn fetch_with_retries(
    shared: &Arc<EngineShared>,
    task: &CrawlTask,
    url: &Url,
) -> Result<FetchResponse, (CrawlError, u32)> {
    let config = &shared.config;
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match fetch_once(shared, task, url).await {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if e.is_timeout() {
                    shared.logger.emit(CrawlEvent::edge_case(
                        "fetch_timeout",
                        vec![
                            ("url".into(), task.url.clone()),
                            ("attempt".into(), attempt.to_string()),
                            ("error".into(), e.to_string()),
                        ],
                    ));
                }
                if !e.is_retryable() || attempt > config.max_retries {
                    return Err((e, attempt));
                }
                shared.logger.emit(CrawlEvent::FetchRetry {
                    domain: shared.domain.clone(),
                    url: task.url.clone(),
                    attempt,
                    error: e.to_string(),
                });
                let backoff = config.retry_backoff_ms.saturating_mul(1 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }
    }
}

async fn fetch_once(
    shared: &Arc<EngineShared>,
    task: &CrawlTask,
    url: &Url,
) -> Result<FetchResponse, CrawlError> {
    shared.middleware.before_fetch(task).await?;
    match shared.fetcher.fetch(url).await {
        Ok(resp) => {
            shared.middleware.after_fetch(task, &resp).await?;
            Ok(resp)
        }
        Err(e) => {
            shared.middleware.on_fetch_error(task, &e).await;
            Err(e)
        }
    }
}

async fn emit_resource_warnings(shared: &Arc<EngineShared>) {
    if let Some(rss) = rss_bytes() {
        if rss > shared.config.memory_warn_bytes {
            shared.logger.emit(CrawlEvent::HighMemoryUsage {
                domain: shared.domain.clone(),
                rss_bytes: rss,
            });
        }
    }
    let queue_size = shared.queue.size().await;
    if queue_size > shared.config.queue_warn_threshold {
        shared.logger.emit(CrawlEvent::ExcessiveQueueSize {
            domain: shared.domain.clone(),
            queue_size,
        });
    }
}
