use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use spinneret_core::{CompletionReason, CrawlEvent, CrawlLogger};

use super::EngineShared;

pub(super) struct Monitors {
    heartbeat: JoinHandle<()>,
    failure: JoinHandle<()>,
}

impl Monitors {
    /// Cancel both background tasks once all workers have exited.
    pub async fn shutdown(self) {
        self.heartbeat.abort();
        self.failure.abort();
        let _ = self.heartbeat.await;
        let _ = self.failure.await;
    }
}

pub(super) fn spawn(shared: Arc<EngineShared>) -> Monitors {
    let heartbeat = tokio::spawn(heartbeat_loop(Arc::clone(&shared)));
    let failure = tokio::spawn(failure_loop(shared));
    Monitors { heartbeat, failure }
}

/// Flags workers whose heartbeat has gone stale and stops tracking them.
async fn heartbeat_loop(shared: Arc<EngineShared>) {
    let mut interval = tokio::time::interval(shared.config.heartbeat_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let stale = shared.config.worker_stale();
    loop {
        interval.tick().await;
        let mut dead = Vec::new();
        for entry in shared.heartbeats.iter() {
            let elapsed = entry.value().elapsed();
            if elapsed > stale {
                dead.push((*entry.key(), elapsed.as_millis() as u64));
            }
        }
        for (worker_id, last_seen_ms) in dead {
            shared.logger.emit(CrawlEvent::WorkerDeathDetected {
                domain: shared.domain.clone(),
                worker_id,
                last_seen_ms,
            });
            shared.heartbeats.remove(&worker_id);
        }
    }
}

/// What a failure-detector sample concluded.
fn should_trip(
    active_workers: usize,
    queue_size: usize,
    page_count: usize,
    no_progress_samples: u32,
) -> Option<&'static str> {
    if active_workers == 0 && queue_size > 0 && page_count > 0 {
        return Some("workers_exited_with_pending_queue");
    }
    if active_workers == 0 && page_count <= 1 && no_progress_samples >= 2 {
        return Some("no_progress");
    }
    None
}

/// Periodic supervisor that forces completion when the engine is
/// pathologically stuck, so a wedged domain cannot hang the session.
async fn failure_loop(shared: Arc<EngineShared>) {
    let mut interval = tokio::time::interval(shared.config.failure_detector_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so samples are spaced.
    interval.tick().await;

    let mut no_progress_samples: u32 = 0;
    let mut last_page_count: usize = 0;

    loop {
        interval.tick().await;
        if shared.queue.is_completed() {
            break;
        }

        let active_workers = shared.queue.active_workers().await;
        let queue_size = shared.queue.size().await;
        let page_count = shared.dedup.size();

        if page_count == last_page_count {
            no_progress_samples += 1;
        } else {
            no_progress_samples = 0;
            last_page_count = page_count;
        }
        debug!(
            domain = %shared.domain,
            active_workers,
            queue_size,
            page_count,
            no_progress_samples,
            "failure detector sample"
        );

        if let Some(reason) = should_trip(active_workers, queue_size, page_count, no_progress_samples)
        {
            if shared.queue.force_complete(CompletionReason::Error).await {
                shared.logger.emit(CrawlEvent::CriticalFailureDetected {
                    domain: shared.domain.clone(),
                    reason: reason.to_string(),
                    queue_size,
                    active_workers,
                    page_count,
                });
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_when_workers_vanish_with_work_left() {
        assert_eq!(
            should_trip(0, 5, 3, 0),
            Some("workers_exited_with_pending_queue")
        );
    }

    #[test]
    fn trips_after_two_stalled_samples_at_start() {
        assert_eq!(should_trip(0, 0, 1, 0), None);
        assert_eq!(should_trip(0, 0, 1, 1), None);
        assert_eq!(should_trip(0, 0, 1, 2), Some("no_progress"));
        assert_eq!(should_trip(0, 0, 0, 2), Some("no_progress"));
    }

    #[test]
    fn healthy_engines_do_not_trip() {
        assert_eq!(should_trip(2, 10, 50, 0), None);
        assert_eq!(should_trip(1, 0, 3, 5), None);
        assert_eq!(should_trip(0, 0, 10, 1), None);
    }
}
