use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};

use crate::config::ClassifierOptions;
use crate::domain::{Environment, SourceCatalog};

static YEAR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^0-9])((?:19|20)[0-9]{2})(?:[^0-9]|$)").expect("valid year pattern")
});

const OFFSHORE_WORDS: &[&str] = &["mar", "offshore", "marítima"];
const OFFSHORE_COMPOUNDS: &[&str] = &["producao_mar"];
const ONSHORE_WORDS: &[&str] = &["terra", "terrestre", "onshore"];
const ONSHORE_COMPOUNDS: &[&str] = &["producao_terra"];

const FILE_MARKERS: &[&str] = &[".csv", ".zip"];

/// Outcome of classifying a single hyperlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkClass {
    /// No year token or no CSV/archive marker.
    Rejected,
    /// Looks like a source file but its environment could not be decided.
    Unclassified { year: String },
    Classified {
        year: String,
        environment: Environment,
    },
}

/// Keyword families found in one piece of link metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Signal {
    offshore: bool,
    onshore: bool,
}

impl Signal {
    fn detect(haystack: &str) -> Self {
        let lowered = haystack.to_lowercase();
        let compound = lowered.replace('-', "_");
        let tokens: Vec<&str> = lowered
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .collect();
        let matches = |words: &[&str], compounds: &[&str]| {
            tokens.iter().any(|token| words.contains(token))
                || compounds.iter().any(|needle| compound.contains(needle))
        };
        Self {
            offshore: matches(OFFSHORE_WORDS, OFFSHORE_COMPOUNDS),
            onshore: matches(ONSHORE_WORDS, ONSHORE_COMPOUNDS),
        }
    }

    fn single(&self) -> Option<Environment> {
        match (self.offshore, self.onshore) {
            (true, false) => Some(Environment::Offshore),
            (false, true) => Some(Environment::Onshore),
            _ => None,
        }
    }
}

pub fn year_token(text: &str) -> Option<String> {
    YEAR_TOKEN
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|year| year.as_str().to_string())
}

pub fn has_file_marker(href: &str) -> bool {
    let lowered = href.to_lowercase();
    FILE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

pub fn classify_link(text: &str, href: &str, options: &ClassifierOptions) -> LinkClass {
    if !has_file_marker(href) {
        return LinkClass::Rejected;
    }
    let Some(year) = year_token(text) else {
        return LinkClass::Rejected;
    };

    let from_href = Signal::detect(href);
    let from_text = Signal::detect(text);
    let combined = Signal {
        offshore: from_href.offshore || from_text.offshore,
        onshore: from_href.onshore || from_text.onshore,
    };

    let environment = match (combined.offshore, combined.onshore) {
        (false, false) => None,
        (true, false) => Some(Environment::Offshore),
        (false, true) => Some(Environment::Onshore),
        (true, true) => {
            let (primary, secondary) = if options.prefer_href {
                (from_href, from_text)
            } else {
                (from_text, from_href)
            };
            primary
                .single()
                .or_else(|| secondary.single().filter(|_| !options.prefer_href))
                .or(options.ambiguous_default)
        }
    };

    match environment {
        Some(environment) => LinkClass::Classified { year, environment },
        None => LinkClass::Unclassified { year },
    }
}

/// Parses a listing page into classified sources.
///
/// Relative hrefs are resolved against `base_url` when one is given.
pub fn classify_listing(
    page: &[u8],
    base_url: Option<&str>,
    options: &ClassifierOptions,
) -> SourceCatalog {
    let mut catalog = SourceCatalog::new();
    let html = Html::parse_document(&String::from_utf8_lossy(page));
    let Ok(selector) = Selector::parse("a[href]") else {
        return catalog;
    };
    let base = base_url.and_then(|url| Url::parse(url).ok());

    for link in html.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let text = link.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() || href.trim().is_empty() {
            continue;
        }

        let url = absolute_url(base.as_ref(), href.trim());
        match classify_link(&text, href, options) {
            LinkClass::Classified { year, environment } => {
                if !catalog.insert(&year, environment, &url) {
                    tracing::debug!(%url, "duplicate source link skipped");
                }
            }
            LinkClass::Unclassified { year } => {
                tracing::debug!(%url, %year, "source link without environment keyword");
                catalog.push_unclassified(&url);
            }
            LinkClass::Rejected => {}
        }
    }

    catalog
}

fn absolute_url(base: Option<&Url>, href: &str) -> String {
    base.and_then(|base| base.join(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| href.to_string())
}
