use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CrawlError;

/// Free-form metadata attached to seeds and propagated task-to-task.
pub type TaskMetadata = HashMap<String, serde_json::Value>;

/// One rule of an extract spec: either a bare CSS selector (first match's
/// trimmed text) or a rule object with selector, attribute, multiplicity,
/// existence check, and nested fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldRule {
    Selector(String),
    Rule {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        multiple: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exists: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<HashMap<String, FieldRule>>,
    },
}

/// field name -> extraction rule, evaluated over the parsed page.
pub type ExtractSpec = HashMap<String, FieldRule>;

/// A unit of crawl work. Immutable once enqueued; consumed when a worker
/// pops and processes it.
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub url: String,
    pub depth: u32,
    pub from_url: Option<String>,
    pub metadata: Option<TaskMetadata>,
    pub extract_spec: Option<ExtractSpec>,
}

impl CrawlTask {
    pub fn seed(url: String, metadata: Option<TaskMetadata>, extract_spec: Option<ExtractSpec>) -> Self {
        Self {
            url,
            depth: 0,
            from_url: None,
            metadata,
            extract_spec,
        }
    }

    /// A task for a link discovered on this task's page, one hop deeper.
    pub fn child(&self, url: String) -> Self {
        Self {
            url,
            depth: self.depth + 1,
            from_url: Some(self.url.clone()),
            metadata: self.metadata.clone(),
            extract_spec: self.extract_spec.clone(),
        }
    }
}

/// A crawl starting point: a URL, optionally with metadata to carry through
/// the whole crawl of that domain and an extract spec for its pages.
#[derive(Debug, Clone, Deserialize)]
pub struct Seed {
    pub url: String,
    #[serde(default)]
    pub metadata: Option<TaskMetadata>,
    #[serde(default)]
    pub extract_spec: Option<ExtractSpec>,
}

impl Seed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            metadata: None,
            extract_spec: None,
        }
    }
}

impl From<&str> for Seed {
    fn from(url: &str) -> Self {
        Seed::new(url)
    }
}

impl From<&String> for Seed {
    fn from(url: &String) -> Self {
        Seed::new(url.clone())
    }
}

/// One fetched HTTP response, before HTML parsing.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub response_time_ms: u64,
}

/// The convenience subset of page metadata most consumers want.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommonMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robots: Option<String>,
}

impl CommonMetadata {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.keywords.is_none()
            && self.author.is_none()
            && self.robots.is_none()
    }
}

/// What the scraper produces for every successfully fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageData {
    pub url: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// name | property | http-equiv -> content, for every meta tag.
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_metadata: Option<CommonMetadata>,
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub fetched_at: DateTime<Utc>,
    pub scrape_duration_ms: u64,
    pub depth: u32,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_fields: Option<serde_json::Value>,
}

impl PageData {
    /// Schema check. A violation here is a bug in the pipeline, not a bad
    /// page, and is fatal to the session.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.url.is_empty() || Url::parse(&self.url).is_err() {
            return Err(CrawlError::Schema {
                url: self.url.clone(),
                cause: "url is not a valid absolute URL".into(),
            });
        }
        if !(100..=599).contains(&self.status_code) {
            return Err(CrawlError::Schema {
                url: self.url.clone(),
                cause: format!("status code {} out of range", self.status_code),
            });
        }
        if self.content_hash.len() != 64 || !self.content_hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(CrawlError::Schema {
                url: self.url.clone(),
                cause: "content hash is not a sha-256 hex digest".into(),
            });
        }
        Ok(())
    }
}

/// The value type crossing the engine/sink boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub page_data: PageData,
    pub depth: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TaskMetadata>,
}

/// Why a domain engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    MaxPagesReached,
    QueueEmpty,
    Error,
}

impl std::fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionReason::MaxPagesReached => write!(f, "max_pages_reached"),
            CompletionReason::QueueEmpty => write!(f, "queue_empty"),
            CompletionReason::Error => write!(f, "error"),
        }
    }
}

/// Per-domain slice of a session report.
#[derive(Debug, Clone, Serialize)]
pub struct DomainSummary {
    pub domain: String,
    pub pages_scraped: usize,
}

/// Aggregate outcome of a crawl session.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub completed: bool,
    pub total_pages: usize,
    pub per_domain: Vec<DomainSummary>,
}

/// User-supplied consumer of crawl results. May be asynchronous and apply
/// backpressure; the engine waits for it to drain before returning.
#[async_trait]
pub trait CrawlSink: Send + Sync {
    async fn deliver(&self, result: CrawlResult) -> anyhow::Result<()>;
}

/// Minimum state needed to resume an interrupted session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavedState {
    pub pending_urls: Vec<String>,
    pub visited_urls: Vec<String>,
}

/// External persistence collaborator for resumable crawls.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_state(&self, session_key: &str) -> Result<Option<SavedState>, CrawlError>;
    async fn save_state(&self, session_key: &str, state: &SavedState) -> Result<(), CrawlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> PageData {
        PageData {
            url: url.to_string(),
            html: "<html></html>".into(),
            title: None,
            metadata: HashMap::new(),
            common_metadata: None,
            status_code: 200,
            headers: HashMap::new(),
            fetched_at: Utc::now(),
            scrape_duration_ms: 12,
            depth: 0,
            content_hash: "a".repeat(64),
            extracted_fields: None,
        }
    }

    #[test]
    fn child_task_propagates_metadata_one_hop_deeper() {
        let mut metadata = TaskMetadata::new();
        metadata.insert("campaign".into(), serde_json::json!("q3"));
        let seed = CrawlTask::seed("https://example.com/".into(), Some(metadata), None);
        let child = seed.child("https://example.com/about".into());
        assert_eq!(child.depth, 1);
        assert_eq!(child.from_url.as_deref(), Some("https://example.com/"));
        assert!(child.metadata.is_some());
    }

    #[test]
    fn page_data_validation() {
        assert!(page("https://example.com/").validate().is_ok());
        assert!(page("not a url").validate().is_err());

        let mut bad_status = page("https://example.com/");
        bad_status.status_code = 999;
        assert!(bad_status.validate().is_err());

        let mut bad_hash = page("https://example.com/");
        bad_hash.content_hash = "zz".into();
        assert!(bad_hash.validate().is_err());
    }

    #[test]
    fn field_rule_deserializes_both_shapes() {
        let spec: ExtractSpec = serde_json::from_value(serde_json::json!({
            "title": "h1",
            "prices": { "selector": ".price", "multiple": true },
            "link": { "selector": "a.next", "attribute": "href" },
        }))
        .expect("spec deserializes");
        assert!(matches!(spec["title"], FieldRule::Selector(_)));
        assert!(matches!(spec["prices"], FieldRule::Rule { .. }));
        assert!(matches!(spec["link"], FieldRule::Rule { .. }));
    }
}
