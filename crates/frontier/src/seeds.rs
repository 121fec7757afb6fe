use serde::Deserialize;
use url::Url;

use spinneret_core::Seed;

use crate::normalize::{normalize_path, sort_query};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WwwHandling {
    Ignore,
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolHandling {
    PreferHttps,
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrailingSlashHandling {
    Ignore,
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryParamHandling {
    Preserve,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentHandling {
    Ignore,
    Preserve,
}

/// How the seed list is collapsed before engines are dispatched. Each knob
/// is independent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeedDedupPolicy {
    pub www: WwwHandling,
    pub protocol: ProtocolHandling,
    pub trailing_slash: TrailingSlashHandling,
    pub query_params: QueryParamHandling,
    pub fragment: FragmentHandling,
}

impl Default for SeedDedupPolicy {
    fn default() -> Self {
        Self {
            www: WwwHandling::Ignore,
            protocol: ProtocolHandling::PreferHttps,
            trailing_slash: TrailingSlashHandling::Ignore,
            query_params: QueryParamHandling::Preserve,
            fragment: FragmentHandling::Ignore,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedSeed {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedDedupStats {
    pub total: usize,
    pub unique: usize,
    pub duplicates: usize,
}

#[derive(Debug)]
pub struct SeedDedupOutcome {
    pub deduplicated: Vec<Seed>,
    pub skipped: Vec<SkippedSeed>,
    pub stats: SeedDedupStats,
}

/// Collapse a seed list under the given policy. First occurrence wins,
/// except that under `prefer-https` an https variant replaces a previously
/// kept http variant of the same seed.
pub fn dedupe_seeds(seeds: &[Seed], policy: &SeedDedupPolicy) -> SeedDedupOutcome {
    let mut kept: Vec<(String, Seed, String)> = Vec::new(); // (key, seed, scheme)
    let mut skipped: Vec<SkippedSeed> = Vec::new();

    for seed in seeds {
        let Some((key, scheme)) = seed_key(&seed.url, policy) else {
            skipped.push(SkippedSeed {
                url: seed.url.clone(),
                reason: "invalid url".into(),
            });
            continue;
        };

        match kept.iter_mut().find(|(k, _, _)| *k == key) {
            None => kept.push((key, seed.clone(), scheme)),
            Some(entry) => {
                let replace = policy.protocol == ProtocolHandling::PreferHttps
                    && entry.2 == "http"
                    && scheme == "https";
                if replace {
                    let old = std::mem::replace(&mut entry.1, seed.clone());
                    entry.2 = scheme;
                    skipped.push(SkippedSeed {
                        url: old.url,
                        reason: format!("http variant superseded by {}", seed.url),
                    });
                } else {
                    skipped.push(SkippedSeed {
                        url: seed.url.clone(),
                        reason: format!("duplicate of {}", entry.1.url),
                    });
                }
            }
        }
    }

    let deduplicated: Vec<Seed> = kept.into_iter().map(|(_, seed, _)| seed).collect();
    let stats = SeedDedupStats {
        total: seeds.len(),
        unique: deduplicated.len(),
        duplicates: skipped.len(),
    };
    tracing::debug!(
        total = stats.total,
        unique = stats.unique,
        duplicates = stats.duplicates,
        "seed list deduplicated"
    );
    SeedDedupOutcome {
        deduplicated,
        skipped,
        stats,
    }
}

/// Policy-aware canonical key for one seed, plus its original scheme.
fn seed_key(raw: &str, policy: &SeedDedupPolicy) -> Option<(String, String)> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let scheme = url.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }

    let key_scheme = match policy.protocol {
        ProtocolHandling::PreferHttps => "https",
        ProtocolHandling::Preserve => scheme.as_str(),
    };
    let key_host = match policy.www {
        WwwHandling::Ignore => host.strip_prefix("www.").unwrap_or(&host),
        WwwHandling::Preserve => &host,
    };

    let mut key = format!("{key_scheme}://{key_host}");
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    let path = match policy.trailing_slash {
        TrailingSlashHandling::Ignore => normalize_path(url.path()),
        TrailingSlashHandling::Preserve => {
            let collapsed = normalize_path(url.path());
            if url.path().len() > 1 && url.path().ends_with('/') && !collapsed.ends_with('/') {
                format!("{collapsed}/")
            } else {
                collapsed
            }
        }
    };
    key.push_str(&path);

    if policy.query_params == QueryParamHandling::Preserve {
        if let Some(query) = url.query() {
            let sorted = sort_query(query);
            if !sorted.is_empty() {
                key.push('?');
                key.push_str(&sorted);
            }
        }
    }

    if policy.fragment == FragmentHandling::Preserve {
        if let Some(fragment) = url.fragment() {
            key.push('#');
            key.push_str(fragment);
        }
    }

    Some((key, scheme))
}
