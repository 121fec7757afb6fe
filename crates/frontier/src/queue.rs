use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use spinneret_core::{CompletionReason, CrawlTask};

/// Outcome of one `take_task_or_complete` call.
#[derive(Debug)]
pub enum TakeOutcome {
    /// A task was popped; `active_workers` includes the caller.
    Task {
        task: CrawlTask,
        active_workers: usize,
    },
    /// Queue empty but other workers may still enqueue descendants; the
    /// caller must back off and retry.
    EmptyButActive { active_workers: usize },
    /// The domain is done. `was_first` is true iff this call performed the
    /// false-to-true transition on the completion latch.
    Completed {
        reason: CompletionReason,
        was_first: bool,
    },
}

struct Inner {
    tasks: VecDeque<CrawlTask>,
    active_workers: usize,
    completion_reason: Option<CompletionReason>,
}

/// Per-domain FIFO of crawl tasks with atomic take-or-complete semantics.
///
/// The composite pop + active-worker increment and the completion decision
/// are serialized behind one mutex; the two latches are monotonic and flip
/// exactly once. After completion no task can be acquired or enqueued.
pub struct TaskQueue {
    inner: Mutex<Inner>,
    completed: AtomicBool,
    max_pages_reached: AtomicBool,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: VecDeque::new(),
                active_workers: 0,
                completion_reason: None,
            }),
            completed: AtomicBool::new(false),
            max_pages_reached: AtomicBool::new(false),
        }
    }

    pub async fn take_task_or_complete(&self) -> TakeOutcome {
        let mut inner = self.inner.lock().await;

        if self.completed.load(Ordering::Acquire) {
            return TakeOutcome::Completed {
                reason: inner
                    .completion_reason
                    .unwrap_or(CompletionReason::QueueEmpty),
                was_first: false,
            };
        }

        if self.max_pages_reached.load(Ordering::Acquire) {
            let was_first = self.latch_completed(&mut inner, CompletionReason::MaxPagesReached);
            return TakeOutcome::Completed {
                reason: CompletionReason::MaxPagesReached,
                was_first,
            };
        }

        if let Some(task) = inner.tasks.pop_front() {
            inner.active_workers += 1;
            return TakeOutcome::Task {
                task,
                active_workers: inner.active_workers,
            };
        }

        if inner.active_workers > 0 {
            return TakeOutcome::EmptyButActive {
                active_workers: inner.active_workers,
            };
        }

        // Queue empty and nobody holds a task: the unique safe completion
        // point, since no worker remains that could enqueue descendants.
        let was_first = self.latch_completed(&mut inner, CompletionReason::QueueEmpty);
        TakeOutcome::Completed {
            reason: CompletionReason::QueueEmpty,
            was_first,
        }
    }

    /// Enqueue a task. Returns false (and drops the task) once the domain
    /// has completed.
    pub async fn add_task(&self, task: CrawlTask) -> bool {
        if self.completed.load(Ordering::Acquire) {
            return false;
        }
        let mut inner = self.inner.lock().await;
        if self.completed.load(Ordering::Acquire) {
            return false;
        }
        inner.tasks.push_back(task);
        true
    }

    /// Decrement the active-worker count, clamped at zero.
    pub async fn mark_idle(&self) {
        let mut inner = self.inner.lock().await;
        inner.active_workers = inner.active_workers.saturating_sub(1);
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    pub async fn active_workers(&self) -> usize {
        self.inner.lock().await.active_workers
    }

    /// Latch the max-pages condition. Returns true iff this call flipped it.
    pub fn mark_max_pages(&self) -> bool {
        self.max_pages_reached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn max_pages_hit(&self) -> bool {
        self.max_pages_reached.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Force completion, used by the failure detector. Returns true iff this
    /// call performed the transition.
    pub async fn force_complete(&self, reason: CompletionReason) -> bool {
        let mut inner = self.inner.lock().await;
        self.latch_completed(&mut inner, reason)
    }

    pub async fn completion_reason(&self) -> Option<CompletionReason> {
        self.inner.lock().await.completion_reason
    }

    /// Remaining queued tasks, for persisting resumable state.
    pub async fn drain_pending(&self) -> Vec<CrawlTask> {
        let mut inner = self.inner.lock().await;
        inner.tasks.drain(..).collect()
    }

    fn latch_completed(&self, inner: &mut Inner, reason: CompletionReason) -> bool {
        let was_first = self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if was_first {
            inner.completion_reason = Some(reason);
        }
        was_first
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn task(url: &str) -> CrawlTask {
        CrawlTask::seed(url.to_string(), None, None)
    }

    #[tokio::test]
    async fn pops_fifo_and_tracks_active_workers() {
        let queue = TaskQueue::new();
        queue.add_task(task("https://ex.com/a")).await;
        queue.add_task(task("https://ex.com/b")).await;

        match queue.take_task_or_complete().await {
            TakeOutcome::Task {
                task,
                active_workers,
            } => {
                assert_eq!(task.url, "https://ex.com/a");
                assert_eq!(active_workers, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(queue.size().await, 1);
        assert_eq!(queue.active_workers().await, 1);
    }

    #[tokio::test]
    async fn empty_with_active_workers_backs_off() {
        let queue = TaskQueue::new();
        queue.add_task(task("https://ex.com/a")).await;
        let _ = queue.take_task_or_complete().await;

        match queue.take_task_or_complete().await {
            TakeOutcome::EmptyButActive { active_workers } => assert_eq!(active_workers, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!queue.is_completed());
    }

    #[tokio::test]
    async fn empty_and_idle_completes_exactly_once() {
        let queue = TaskQueue::new();
        queue.add_task(task("https://ex.com/a")).await;
        let _ = queue.take_task_or_complete().await;
        queue.mark_idle().await;

        match queue.take_task_or_complete().await {
            TakeOutcome::Completed { reason, was_first } => {
                assert_eq!(reason, CompletionReason::QueueEmpty);
                assert!(was_first);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        match queue.take_task_or_complete().await {
            TakeOutcome::Completed { was_first, .. } => assert!(!was_first),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_enqueue_after_completion() {
        let queue = TaskQueue::new();
        let _ = queue.take_task_or_complete().await; // completes: empty, idle
        assert!(queue.is_completed());
        assert!(!queue.add_task(task("https://ex.com/late")).await);
        assert_eq!(queue.size().await, 0);
    }

    #[tokio::test]
    async fn max_pages_latch_converts_to_completion() {
        let queue = TaskQueue::new();
        queue.add_task(task("https://ex.com/a")).await;
        assert!(queue.mark_max_pages());
        assert!(!queue.mark_max_pages());

        match queue.take_task_or_complete().await {
            TakeOutcome::Completed { reason, was_first } => {
                assert_eq!(reason, CompletionReason::MaxPagesReached);
                assert!(was_first);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn force_complete_wins_once_under_contention() {
        let queue = Arc::new(TaskQueue::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue.force_complete(CompletionReason::Error).await
            }));
        }
        let mut firsts = 0;
        for handle in handles {
            if handle.await.expect("join failed") {
                firsts += 1;
            }
        }
        assert_eq!(firsts, 1);
        assert_eq!(
            queue.completion_reason().await,
            Some(CompletionReason::Error)
        );
    }

    #[tokio::test]
    async fn mark_idle_clamps_at_zero() {
        let queue = TaskQueue::new();
        queue.mark_idle().await;
        assert_eq!(queue.active_workers().await, 0);
    }
}
