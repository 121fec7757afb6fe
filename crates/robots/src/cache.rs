use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use spinneret_core::CrawlError;

use crate::parse::RobotsRules;

/// Answer for one URL: may it be fetched, and how long to wait first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotsVerdict {
    pub allowed: bool,
    pub crawl_delay: Option<Duration>,
}

impl RobotsVerdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            crawl_delay: None,
        }
    }
}

/// Process-wide robots.txt cache, keyed by origin (`scheme://host[:port]`).
///
/// The first reference to an origin fetches `<origin>/robots.txt`; a
/// per-origin `OnceCell` gives single-flight so concurrent first references
/// fetch once. Fetch failures and non-2xx responses cache empty rules
/// (default allow). Entries live for the process.
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    entries: DashMap<String, Arc<OnceCell<Arc<RobotsRules>>>>,
}

impl RobotsCache {
    pub fn new(user_agent: &str, fetch_timeout: Duration) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| CrawlError::Config(format!("robots http client: {e}")))?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            entries: DashMap::new(),
        })
    }

    /// `scheme://host[:port]` of a URL, or None when it has no host.
    pub fn origin_of(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        match parsed.port() {
            Some(port) => Some(format!("{}://{}:{}", parsed.scheme(), host, port)),
            None => Some(format!("{}://{}", parsed.scheme(), host)),
        }
    }

    /// Whether the URL may be crawled, and any advertised crawl delay.
    /// Malformed URLs are allowed through with a warning.
    pub async fn check_url(&self, url: &str) -> RobotsVerdict {
        let Some(origin) = Self::origin_of(url) else {
            warn!(url, "cannot derive origin, allowing by default");
            return RobotsVerdict::allow();
        };
        let path = Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string());

        let rules = self.rules_for(&origin).await;
        RobotsVerdict {
            allowed: rules.is_allowed(&path),
            crawl_delay: rules.crawl_delay.map(Duration::from_secs_f64),
        }
    }

    /// Cached rules for an origin, fetching on first reference.
    pub async fn rules_for(&self, origin: &str) -> Arc<RobotsRules> {
        let cell = self
            .entries
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_init(|| async { Arc::new(self.fetch_rules(origin).await) })
            .await
            .clone()
    }

    pub fn cached_origins(&self) -> usize {
        self.entries.len()
    }

    async fn fetch_rules(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => {
                    debug!(origin, bytes = body.len(), "robots.txt fetched");
                    RobotsRules::parse(&body, &self.user_agent)
                }
                Err(e) => {
                    warn!(origin, error = %e, "robots.txt body unreadable, allowing by default");
                    RobotsRules::default()
                }
            },
            Ok(resp) => {
                debug!(origin, status = resp.status().as_u16(), "no usable robots.txt");
                RobotsRules::default()
            }
            Err(e) => {
                warn!(origin, error = %e, "robots.txt fetch failed, allowing by default");
                RobotsRules::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_includes_explicit_port_only() {
        assert_eq!(
            RobotsCache::origin_of("https://example.com/a/b"),
            Some("https://example.com".to_string())
        );
        assert_eq!(
            RobotsCache::origin_of("http://example.com:8080/a"),
            Some("http://example.com:8080".to_string())
        );
        assert_eq!(RobotsCache::origin_of("not a url"), None);
    }

    #[tokio::test]
    async fn malformed_url_is_allowed() {
        let cache = RobotsCache::new("spinneret/0.1", Duration::from_secs(1)).unwrap();
        let verdict = cache.check_url("::not-a-url::").await;
        assert!(verdict.allowed);
        assert_eq!(verdict.crawl_delay, None);
    }
}
