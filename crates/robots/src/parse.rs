use crate::matcher::PathMatcher;

/// Rules extracted from one origin's robots.txt, filtered to the sections
/// that apply to the configured user agent. Never mutated after parsing and
/// cached for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    pub disallowed_paths: Vec<String>,
    /// Seconds, as advertised. The engine caps this at use time.
    pub crawl_delay: Option<f64>,
    /// Which section supplied the rules: the configured agent, or `*`.
    pub user_agent_tag: String,
    matchers: Vec<PathMatcher>,
}

impl RobotsRules {
    /// Line-oriented parse. `#` comments and blank lines are skipped, the
    /// first `:` splits directive from value, and directives are recognized
    /// case-insensitively. Rules are kept from sections whose user-agent is
    /// `*` or matches `user_agent` (case-insensitive containment). Empty
    /// Disallow values are ignored.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let agent_lower = user_agent.to_lowercase();
        let mut rules = RobotsRules {
            user_agent_tag: "*".to_string(),
            ..Default::default()
        };

        // A section's user-agent lines may stack; rules after them apply to
        // every listed agent.
        let mut section_applies = false;
        let mut section_is_specific = false;
        let mut in_agent_header = false;
        let mut specific_delay: Option<f64> = None;
        let mut wildcard_delay: Option<f64> = None;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if !in_agent_header {
                        // New section: reset applicability.
                        section_applies = false;
                        section_is_specific = false;
                    }
                    in_agent_header = true;
                    let token = value.to_lowercase();
                    if token == "*" {
                        section_applies = true;
                    } else if agent_lower.contains(&token) {
                        section_applies = true;
                        section_is_specific = true;
                    }
                }
                "disallow" => {
                    in_agent_header = false;
                    if section_applies && !value.is_empty() {
                        rules.disallowed_paths.push(value.to_string());
                        rules.matchers.push(PathMatcher::compile(value));
                        if section_is_specific {
                            rules.user_agent_tag = user_agent.to_string();
                        }
                    }
                }
                "crawl-delay" => {
                    in_agent_header = false;
                    if section_applies {
                        if let Ok(seconds) = value.parse::<f64>() {
                            if seconds >= 0.0 {
                                if section_is_specific {
                                    specific_delay = Some(seconds);
                                } else {
                                    wildcard_delay = Some(seconds);
                                }
                            }
                        }
                    }
                }
                _ => {
                    in_agent_header = false;
                }
            }
        }

        rules.crawl_delay = specific_delay.or(wildcard_delay);
        rules
    }

    /// A path is allowed iff no disallow rule matches it.
    pub fn is_allowed(&self, path: &str) -> bool {
        !self.matchers.iter().any(|m| m.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty() && self.crawl_delay.is_none()
    }
}
