use std::collections::HashMap;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// How outbound links are harvested from a page.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// When non-empty, a link must match at least one of these.
    pub allow_patterns: Vec<Regex>,
    /// A link matching any of these is dropped.
    pub deny_patterns: Vec<Regex>,
    /// CSS roots to restrict extraction to. Empty = whole document.
    pub restrict_css: Vec<String>,
    /// Tags to pull `href` from.
    pub allowed_tags: Vec<String>,
    /// Skip links carrying rel=nofollow.
    pub respect_no_follow: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            allow_patterns: Vec::new(),
            deny_patterns: Vec::new(),
            restrict_css: Vec::new(),
            allowed_tags: vec!["a".to_string(), "area".to_string()],
            respect_no_follow: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct LinkExtraction {
    /// Raw href values; the caller resolves them against the page URL.
    pub links: Vec<String>,
    pub total_elements_processed: usize,
    pub extraction_breakdown: HashMap<String, usize>,
}

/// Harvest raw hrefs from a parsed document per the extractor config.
pub fn extract_links(document: &Html, config: &ExtractorConfig) -> LinkExtraction {
    let mut out = LinkExtraction::default();

    for tag in &config.allowed_tags {
        let selectors: Vec<String> = if config.restrict_css.is_empty() {
            vec![format!("{tag}[href]")]
        } else {
            config
                .restrict_css
                .iter()
                .map(|root| format!("{root} {tag}[href]"))
                .collect()
        };

        for selector_str in selectors {
            let Ok(selector) = Selector::parse(&selector_str) else {
                debug!(selector = %selector_str, "unparseable selector, skipping");
                continue;
            };
            for el in document.select(&selector) {
                out.total_elements_processed += 1;

                if config.respect_no_follow {
                    let no_follow = el
                        .value()
                        .attr("rel")
                        .map(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("nofollow")))
                        .unwrap_or(false);
                    if no_follow {
                        continue;
                    }
                }

                let Some(href) = el.value().attr("href") else {
                    continue;
                };
                let href = href.trim();
                if href.is_empty() {
                    continue;
                }
                if config.deny_patterns.iter().any(|re| re.is_match(href)) {
                    continue;
                }
                if !config.allow_patterns.is_empty()
                    && !config.allow_patterns.iter().any(|re| re.is_match(href))
                {
                    continue;
                }

                *out.extraction_breakdown.entry(tag.clone()).or_insert(0) += 1;
                out.links.push(href.to_string());
            }
        }
    }

    out
}

/// Resolve one raw href against the page URL. Returns None for fragments,
/// non-HTTP(S) schemes, and anything that fails to join.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }
    let mut resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved)
}
