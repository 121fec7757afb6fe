use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CrawlError;
use crate::types::{CrawlTask, FetchResponse};

/// A hook around every page fetch. All three operations default to no-ops so
/// implementations only override what they care about.
#[async_trait]
pub trait CrawlMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn on_request(&self, _task: &CrawlTask) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn on_response(
        &self,
        _task: &CrawlTask,
        _response: &FetchResponse,
    ) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn on_error(&self, _task: &CrawlTask, _error: &CrawlError) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// Ordered middleware stack. Requests fold forward through the list,
/// responses and errors fold in reverse.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    stack: Vec<Arc<dyn CrawlMiddleware>>,
}

impl MiddlewareChain {
    pub fn new(stack: Vec<Arc<dyn CrawlMiddleware>>) -> Self {
        Self { stack }
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub async fn before_fetch(&self, task: &CrawlTask) -> Result<(), CrawlError> {
        for mw in &self.stack {
            mw.on_request(task).await.map_err(|e| wrap("request", mw.name(), e))?;
        }
        Ok(())
    }

    pub async fn after_fetch(
        &self,
        task: &CrawlTask,
        response: &FetchResponse,
    ) -> Result<(), CrawlError> {
        for mw in self.stack.iter().rev() {
            mw.on_response(task, response)
                .await
                .map_err(|e| wrap("response", mw.name(), e))?;
        }
        Ok(())
    }

    /// Error hooks are best-effort: a hook that itself fails is reported but
    /// does not mask the original fetch error.
    pub async fn on_fetch_error(&self, task: &CrawlTask, error: &CrawlError) {
        for mw in self.stack.iter().rev() {
            if let Err(e) = mw.on_error(task, error).await {
                tracing::warn!(middleware = mw.name(), error = %e, "error hook failed");
            }
        }
    }
}

fn wrap(phase: &'static str, name: &str, cause: CrawlError) -> CrawlError {
    match cause {
        already @ CrawlError::Middleware { .. } => already,
        other => CrawlError::Middleware {
            phase,
            name: name.to_string(),
            cause: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_request: bool,
    }

    #[async_trait]
    impl CrawlMiddleware for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn on_request(&self, _task: &CrawlTask) -> Result<(), CrawlError> {
            self.log.lock().unwrap().push(format!("req:{}", self.name));
            if self.fail_request {
                return Err(CrawlError::Config("boom".into()));
            }
            Ok(())
        }

        async fn on_response(
            &self,
            _task: &CrawlTask,
            _response: &FetchResponse,
        ) -> Result<(), CrawlError> {
            self.log.lock().unwrap().push(format!("resp:{}", self.name));
            Ok(())
        }
    }

    fn task() -> CrawlTask {
        CrawlTask::seed("https://example.com/".into(), None, None)
    }

    fn response() -> FetchResponse {
        FetchResponse {
            url: url::Url::parse("https://example.com/").unwrap(),
            final_url: url::Url::parse("https://example.com/").unwrap(),
            status: 200,
            headers: Default::default(),
            body: Vec::new(),
            content_type: Some("text/html".into()),
            fetched_at: chrono::Utc::now(),
            response_time_ms: 1,
        }
    }

    #[tokio::test]
    async fn requests_fold_forward_responses_fold_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new(vec![
            Arc::new(Recorder {
                name: "a",
                log: log.clone(),
                fail_request: false,
            }),
            Arc::new(Recorder {
                name: "b",
                log: log.clone(),
                fail_request: false,
            }),
        ]);

        chain.before_fetch(&task()).await.unwrap();
        chain.after_fetch(&task(), &response()).await.unwrap();

        let entries = log.lock().unwrap().clone();
        assert_eq!(entries, vec!["req:a", "req:b", "resp:b", "resp:a"]);
    }

    #[tokio::test]
    async fn request_failure_is_wrapped_with_middleware_name() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new(vec![Arc::new(Recorder {
            name: "limiter",
            log,
            fail_request: true,
        })]);

        let err = chain.before_fetch(&task()).await.unwrap_err();
        match err {
            CrawlError::Middleware { phase, name, .. } => {
                assert_eq!(phase, "request");
                assert_eq!(name, "limiter");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
