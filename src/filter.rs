use regex::Regex;
use url::Url;

use spinneret_core::{CrawlConfig, CrawlError};

/// Why a URL was rejected by the follow filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Protocol,
    NoHost,
    OutsideDomain,
    BlockedDomain,
    NotAllowedDomain,
    CustomFilter,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Protocol => "protocol_not_allowed",
            RejectReason::NoHost => "no_host",
            RejectReason::OutsideDomain => "outside_seed_domain",
            RejectReason::BlockedDomain => "blocked_domain",
            RejectReason::NotAllowedDomain => "not_in_allowed_domains",
            RejectReason::CustomFilter => "custom_filter",
        }
    }
}

/// Compiled URL gate applied to every task and every discovered link.
/// Crawls are always restricted to the seed's own domain; the allow/block
/// lists only apply in single-seed sessions.
pub struct UrlFilter {
    allowed_protocols: Vec<String>,
    allowed_domains: Vec<String>,
    blocked_domains: Vec<String>,
    deny_patterns: Vec<Regex>,
    multi_seed: bool,
}

impl UrlFilter {
    pub fn compile(config: &CrawlConfig, multi_seed: bool) -> Result<Self, CrawlError> {
        let mut deny_patterns = Vec::with_capacity(config.custom_url_filters.len());
        for pattern in &config.custom_url_filters {
            let re = Regex::new(pattern).map_err(|e| {
                CrawlError::Config(format!("invalid custom_url_filter {pattern:?}: {e}"))
            })?;
            deny_patterns.push(re);
        }
        Ok(Self {
            allowed_protocols: config
                .allowed_protocols
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            allowed_domains: config
                .allowed_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            blocked_domains: config
                .blocked_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            deny_patterns,
            multi_seed,
        })
    }

    /// Gate one URL against the seed's domain anchor.
    pub fn should_follow(&self, url: &Url, anchor_host: &str) -> Result<(), RejectReason> {
        if !self
            .allowed_protocols
            .iter()
            .any(|p| p == url.scheme())
        {
            return Err(RejectReason::Protocol);
        }
        let Some(host) = url.host_str() else {
            return Err(RejectReason::NoHost);
        };
        let host = host.to_ascii_lowercase();

        if !same_site(&host, anchor_host) {
            return Err(RejectReason::OutsideDomain);
        }

        if !self.multi_seed {
            if self
                .blocked_domains
                .iter()
                .any(|blocked| same_site(&host, blocked))
            {
                return Err(RejectReason::BlockedDomain);
            }
            if !self.allowed_domains.is_empty()
                && !self
                    .allowed_domains
                    .iter()
                    .any(|allowed| same_site(&host, allowed))
            {
                return Err(RejectReason::NotAllowedDomain);
            }
        }

        let as_str = url.as_str();
        if self.deny_patterns.iter().any(|re| re.is_match(as_str)) {
            return Err(RejectReason::CustomFilter);
        }
        Ok(())
    }
}

/// Same host or a subdomain relationship, with a leading `www.` treated as
/// noise on either side.
pub fn same_site(host: &str, anchor: &str) -> bool {
    let host = host.strip_prefix("www.").unwrap_or(host);
    let anchor = anchor
        .to_ascii_lowercase();
    let anchor = anchor.strip_prefix("www.").unwrap_or(&anchor);
    host == anchor
        || host
            .strip_suffix(anchor)
            .map(|rest| rest.ends_with('.'))
            .unwrap_or(false)
}
