pub mod extract;
pub mod html;
pub mod links;

pub use links::{ExtractorConfig, LinkExtraction};

use scraper::Html;
use sha2::{Digest, Sha256};

use spinneret_core::{CrawlError, ExtractSpec, FetchResponse, PageData};

/// Max bytes to parse (5 MB). Larger bodies are truncated before parsing;
/// the content hash still covers the full body.
pub const MAX_PARSE_SIZE: usize = 5 * 1024 * 1024;

/// Everything a worker needs from one fetched page: the outgoing record and
/// the raw links to expand.
pub struct ParsedPage {
    pub page: PageData,
    pub links: LinkExtraction,
}

/// Parse one response into a `PageData` plus its outbound links. Parsing is
/// synchronous CPU work; callers must not hold this across suspension
/// points.
pub fn parse_response(
    resp: &FetchResponse,
    depth: u32,
    extractor: &ExtractorConfig,
    extract_spec: Option<&ExtractSpec>,
) -> Result<ParsedPage, CrawlError> {
    let body = if resp.body.len() > MAX_PARSE_SIZE {
        &resp.body[..MAX_PARSE_SIZE]
    } else {
        &resp.body
    };
    let body_str = String::from_utf8_lossy(body);

    let document = Html::parse_document(&body_str);
    let summary = html::summarize(&document);
    let links = links::extract_links(&document, extractor);
    let extracted_fields = extract_spec.map(|spec| extract::evaluate(&document, spec));

    let mut hasher = Sha256::new();
    hasher.update(&resp.body);
    let content_hash = format!("{:x}", hasher.finalize());

    let page = PageData {
        url: resp.final_url.to_string(),
        html: body_str.into_owned(),
        title: summary.title,
        metadata: summary.metadata,
        common_metadata: summary.common_metadata,
        status_code: resp.status,
        headers: resp.headers.clone(),
        fetched_at: resp.fetched_at,
        scrape_duration_ms: resp.response_time_ms,
        depth,
        content_hash,
        extracted_fields,
    };
    page.validate()?;

    Ok(ParsedPage { page, links })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use url::Url;

    use super::*;

    fn response(body: &str) -> FetchResponse {
        let url = Url::parse("https://example.com/page").unwrap();
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        FetchResponse {
            url: url.clone(),
            final_url: url,
            status: 200,
            headers,
            body: body.as_bytes().to_vec(),
            content_type: Some("text/html".into()),
            fetched_at: chrono::Utc::now(),
            response_time_ms: 42,
        }
    }

    #[test]
    fn builds_page_data_with_links_and_hash() {
        let resp = response(
            r#"<html><head><title>T</title><meta name="description" content="d"></head>
               <body><a href="/next">next</a></body></html>"#,
        );
        let parsed = parse_response(&resp, 1, &ExtractorConfig::default(), None).unwrap();
        assert_eq!(parsed.page.title.as_deref(), Some("T"));
        assert_eq!(parsed.page.depth, 1);
        assert_eq!(parsed.page.status_code, 200);
        assert_eq!(parsed.page.content_hash.len(), 64);
        assert_eq!(parsed.links.links, vec!["/next".to_string()]);
        assert!(parsed.page.validate().is_ok());
    }

    #[test]
    fn attaches_extracted_fields_when_spec_present() {
        let resp = response(r#"<html><body><h1>Hello</h1></body></html>"#);
        let spec: ExtractSpec =
            serde_json::from_value(serde_json::json!({ "heading": "h1" })).unwrap();
        let parsed =
            parse_response(&resp, 0, &ExtractorConfig::default(), Some(&spec)).unwrap();
        let fields = parsed.page.extracted_fields.expect("fields attached");
        assert_eq!(fields["heading"], "Hello");
    }

    #[test]
    fn identical_bodies_hash_identically() {
        let a = parse_response(&response("<html></html>"), 0, &ExtractorConfig::default(), None)
            .unwrap();
        let b = parse_response(&response("<html></html>"), 0, &ExtractorConfig::default(), None)
            .unwrap();
        assert_eq!(a.page.content_hash, b.page.content_hash);
    }
}
