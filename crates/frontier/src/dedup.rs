use dashmap::DashSet;

use crate::normalize::normalize;

/// Thread-safe set of canonical URLs with test-and-insert semantics.
///
/// `try_add` is a single `DashSet::insert`, so the check and the insert are
/// indivisible across concurrent callers. Each domain engine owns one
/// instance; nothing is shared between domains.
pub struct Deduplicator {
    seen: DashSet<String>,
    normalize_urls: bool,
}

impl Deduplicator {
    pub fn new(normalize_urls: bool) -> Self {
        Self {
            seen: DashSet::new(),
            normalize_urls,
        }
    }

    fn key(&self, url: &str) -> String {
        if self.normalize_urls {
            normalize(url)
        } else {
            url.to_string()
        }
    }

    /// Returns true iff the URL was newly inserted.
    pub fn try_add(&self, url: &str) -> bool {
        self.seen.insert(self.key(url))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(&self.key(url))
    }

    pub fn size(&self) -> usize {
        self.seen.len()
    }

    pub fn clear(&self) {
        self.seen.clear();
    }

    /// Bulk-insert already-visited URLs, e.g. when resuming a session.
    pub fn seed_visited<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.try_add(url.as_ref());
        }
    }

    /// Copy of the canonical URLs seen so far, for persisting resumable
    /// state. Order is unspecified.
    pub fn snapshot(&self) -> Vec<String> {
        self.seen.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn variants_of_the_same_url_count_once() {
        let dedup = Deduplicator::new(true);
        assert!(dedup.try_add("https://EXAMPLE.com/a"));
        assert!(!dedup.try_add("https://example.com/a/"));
        assert!(!dedup.try_add("https://example.com:443/a#frag"));
        assert_eq!(dedup.size(), 1);
        assert!(dedup.contains("https://example.com/a"));
    }

    #[test]
    fn normalization_can_be_disabled() {
        let dedup = Deduplicator::new(false);
        assert!(dedup.try_add("https://example.com/a"));
        assert!(dedup.try_add("https://example.com/a/"));
        assert_eq!(dedup.size(), 2);
    }

    #[test]
    fn clear_resets_the_set() {
        let dedup = Deduplicator::new(true);
        dedup.try_add("https://example.com/a");
        dedup.clear();
        assert_eq!(dedup.size(), 0);
        assert!(!dedup.contains("https://example.com/a"));
    }

    #[test]
    fn concurrent_try_add_admits_exactly_one() {
        let dedup = Arc::new(Deduplicator::new(true));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let dedup = Arc::clone(&dedup);
            handles.push(std::thread::spawn(move || {
                dedup.try_add("https://example.com/contended")
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|added| *added)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(dedup.size(), 1);
    }

    #[test]
    fn seed_visited_bulk_inserts() {
        let dedup = Deduplicator::new(true);
        dedup.seed_visited(["https://example.com/a", "https://example.com/b"]);
        assert_eq!(dedup.size(), 2);
        assert!(!dedup.try_add("https://example.com/a/"));
    }
}
