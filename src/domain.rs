use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::AnpError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Onshore,
    Offshore,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Onshore, Environment::Offshore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Onshore => "onshore",
            Environment::Offshore => "offshore",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Environment {
    type Err = AnpError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "onshore" | "terra" => Ok(Environment::Onshore),
            "offshore" | "mar" => Ok(Environment::Offshore),
            _ => Err(AnpError::InvalidEnvironment(value.to_string())),
        }
    }
}

/// Index-building scan breadth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Only the most recent files of an environment.
    Quick,
    Full,
}

/// One downloadable production file as published on the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceDescriptor {
    pub year: String,
    pub environment: Environment,
    pub url: String,
}

impl SourceDescriptor {
    /// Local file name: the sanitized last path segment of the URL plus a
    /// short digest of the whole URL, so links that differ only in their
    /// query string do not share a cache entry. The extension is kept.
    pub fn file_name(&self) -> String {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        let segment = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let cleaned: String = segment
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_' | '%') {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        let tag = self.url_digest();
        if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.') {
            return format!("source-{tag}.csv");
        }
        match cleaned.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() && !extension.is_empty() => {
                format!("{stem}-{tag}.{extension}")
            }
            _ => format!("{cleaned}-{tag}"),
        }
    }

    /// First eight hex digits of the SHA-256 of the full URL.
    fn url_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_bytes());
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(8);
        digest
    }

    pub fn is_archive(&self) -> bool {
        self.url.to_lowercase().contains(".zip")
    }
}

/// Classified sources grouped as year -> environment -> URLs.
///
/// URLs are unique within a (year, environment) bucket and keep page order.
/// Links that carried a year but no recognizable environment are kept apart
/// in `unclassified` and never enter a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCatalog {
    years: BTreeMap<String, BTreeMap<Environment, Vec<String>>>,
    pub unclassified: Vec<String>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the URL was already present in that bucket.
    pub fn insert(&mut self, year: &str, environment: Environment, url: &str) -> bool {
        let urls = self
            .years
            .entry(year.to_string())
            .or_default()
            .entry(environment)
            .or_default();
        if urls.iter().any(|existing| existing == url) {
            return false;
        }
        urls.push(url.to_string());
        true
    }

    pub fn push_unclassified(&mut self, url: &str) {
        if !self.unclassified.iter().any(|existing| existing == url) {
            self.unclassified.push(url.to_string());
        }
    }

    /// Years, newest first.
    pub fn years(&self) -> Vec<&str> {
        self.years.keys().rev().map(String::as_str).collect()
    }

    pub fn urls(&self, year: &str, environment: Environment) -> &[String] {
        self.years
            .get(year)
            .and_then(|envs| envs.get(&environment))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        self.years
            .iter()
            .rev()
            .flat_map(|(year, envs)| {
                envs.iter().flat_map(move |(environment, urls)| {
                    urls.iter().map(move |url| SourceDescriptor {
                        year: year.clone(),
                        environment: *environment,
                        url: url.clone(),
                    })
                })
            })
            .collect()
    }

    /// Descriptors of one environment, newest year first.
    pub fn descriptors_for(&self, environment: Environment) -> Vec<SourceDescriptor> {
        self.descriptors()
            .into_iter()
            .filter(|descriptor| descriptor.environment == environment)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.years
            .values()
            .flat_map(|envs| envs.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct YearsNewestFirst<'a>(&'a BTreeMap<String, BTreeMap<Environment, Vec<String>>>);

impl Serialize for YearsNewestFirst<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().rev())
    }
}

impl Serialize for SourceCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SourceCatalog", 2)?;
        state.serialize_field("years", &YearsNewestFirst(&self.years))?;
        state.serialize_field("unclassified", &self.unclassified)?;
        state.end()
    }
}
