use thiserror::Error;

/// Why a bounded request gave up before producing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Timeout,
    Cancelled,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Timeout => write!(f, "timeout"),
            AbortReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("network failure for {url}: {cause}")]
    Network { url: String, cause: String },

    #[error("response failure for {url}: {cause}")]
    Response { url: String, cause: String },

    #[error("request aborted for {url} after {duration_ms}ms: {reason}")]
    RequestAbort {
        url: String,
        duration_ms: u64,
        reason: AbortReason,
    },

    #[error("content type {got:?} rejected for {url} (accepted: {accepted:?})")]
    ContentTypeReject {
        url: String,
        got: Option<String>,
        accepted: &'static [&'static str],
    },

    #[error("robots fetch failed for {origin}: {cause}")]
    RobotsFetch { origin: String, cause: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("middleware {name} failed during {phase}: {cause}")]
    Middleware {
        phase: &'static str,
        name: String,
        cause: String,
    },

    #[error("state {op} failed for session {session_key}: {cause}")]
    State {
        op: &'static str,
        session_key: String,
        cause: String,
    },

    #[error("page schema violation for {url}: {cause}")]
    Schema { url: String, cause: String },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// Whether the fetch retry policy applies. Content-type rejections are
    /// final; everything transport-shaped is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrawlError::Network { .. }
                | CrawlError::Response { .. }
                | CrawlError::RequestAbort { .. }
                | CrawlError::Middleware { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CrawlError::RequestAbort {
                reason: AbortReason::Timeout,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_reject_is_not_retryable() {
        let err = CrawlError::ContentTypeReject {
            url: "https://example.com/x.png".into(),
            got: Some("image/png".into()),
            accepted: &["text/html"],
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_errors_are_retryable() {
        let network = CrawlError::Network {
            url: "https://example.com".into(),
            cause: "connection refused".into(),
        };
        let abort = CrawlError::RequestAbort {
            url: "https://example.com".into(),
            duration_ms: 30_000,
            reason: AbortReason::Timeout,
        };
        assert!(network.is_retryable());
        assert!(abort.is_retryable());
        assert!(abort.is_timeout());
    }
}
