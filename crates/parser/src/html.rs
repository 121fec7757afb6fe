use std::collections::HashMap;

use scraper::{Html, Selector};

use spinneret_core::CommonMetadata;

pub struct HtmlSummary {
    pub title: Option<String>,
    /// name | property | http-equiv -> content, for every meta tag.
    pub metadata: HashMap<String, String>,
    pub common_metadata: Option<CommonMetadata>,
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Title and metadata of a parsed document. An empty title is treated as
/// absent.
pub fn summarize(document: &Html) -> HtmlSummary {
    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut metadata = HashMap::new();
    if let Some(meta) = selector("meta") {
        for el in document.select(&meta) {
            let value = el.value();
            let key = value
                .attr("name")
                .or_else(|| value.attr("property"))
                .or_else(|| value.attr("http-equiv"));
            if let (Some(key), Some(content)) = (key, value.attr("content")) {
                metadata.insert(key.to_string(), content.to_string());
            }
        }
    }

    let common = CommonMetadata {
        description: non_empty(metadata.get("description")),
        keywords: non_empty(metadata.get("keywords")),
        author: non_empty(metadata.get("author")),
        robots: non_empty(metadata.get("robots")),
    };
    let common_metadata = if common.is_empty() { None } else { Some(common) };

    HtmlSummary {
        title,
        metadata,
        common_metadata,
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
