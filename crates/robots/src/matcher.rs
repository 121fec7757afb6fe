use regex::Regex;

/// Compiled form of one Disallow rule. `*` in the rule is a wildcard; every
/// other regex metacharacter is escaped and the pattern is anchored at the
/// start of the path. If the regex cannot be built the matcher falls back to
/// prefix matching, treating a trailing `*` as a wildcard suffix.
#[derive(Debug, Clone)]
pub(crate) enum PathMatcher {
    Pattern(Regex),
    Prefix(String),
}

impl PathMatcher {
    pub(crate) fn compile(rule: &str) -> Self {
        match build_regex(rule) {
            Ok(re) => PathMatcher::Pattern(re),
            Err(_) => {
                let prefix = rule.strip_suffix('*').unwrap_or(rule);
                PathMatcher::Prefix(prefix.to_string())
            }
        }
    }

    pub(crate) fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Pattern(re) => re.is_match(path),
            PathMatcher::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

fn build_regex(rule: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::with_capacity(rule.len() + 8);
    pattern.push('^');
    for ch in rule.chars() {
        if ch == '*' {
            pattern.push_str(".*");
        } else {
            pattern.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4])));
        }
    }
    Regex::new(&pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rule_matches_path_prefix() {
        let m = PathMatcher::compile("/admin");
        assert!(m.matches("/admin"));
        assert!(m.matches("/admin/users"));
        assert!(!m.matches("/public/admin"));
    }

    #[test]
    fn bare_slash_disallows_everything() {
        let m = PathMatcher::compile("/");
        assert!(m.matches("/"));
        assert!(m.matches("/anything/at/all"));
    }

    #[test]
    fn star_is_a_wildcard() {
        let m = PathMatcher::compile("/private/*/secret");
        assert!(m.matches("/private/a/secret"));
        assert!(m.matches("/private/a/b/secret"));
        assert!(!m.matches("/private/a/open"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let m = PathMatcher::compile("/a+b(c)");
        assert!(m.matches("/a+b(c)"));
        assert!(!m.matches("/aab"));
        assert!(!m.matches("/ab"));
    }

    #[test]
    fn prefix_fallback_strips_trailing_star() {
        let m = PathMatcher::Prefix("/downloads/".to_string());
        assert!(m.matches("/downloads/file.zip"));
        assert!(!m.matches("/download"));
    }
}
