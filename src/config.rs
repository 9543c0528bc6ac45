use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::Environment;
use crate::error::AnpError;

pub const DEFAULT_CONFIG_FILE: &str = "anp-wells.json";
pub const DEFAULT_LISTING_URL: &str = "https://www.gov.br/anp/pt-br/centrais-de-conteudo/dados-abertos/producao-de-petroleo-e-gas-natural-por-poco";
pub const DEFAULT_QUICK_SAMPLE: usize = 3;
pub const DEFAULT_HEADER_SCAN_LINES: usize = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub quick_sample: Option<usize>,
    #[serde(default)]
    pub header_scan_lines: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub classifier: Option<ClassifierEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ClassifierEntry {
    #[serde(default)]
    pub prefer_href: Option<bool>,
    /// `null` drops links whose environment cannot be decided.
    #[serde(default = "default_ambiguous_entry")]
    pub ambiguous_default: Option<Environment>,
}

fn default_ambiguous_entry() -> Option<Environment> {
    Some(Environment::Onshore)
}

/// Tie-break applied when both keyword families match a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierOptions {
    pub prefer_href: bool,
    pub ambiguous_default: Option<Environment>,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            prefer_href: true,
            ambiguous_default: Some(Environment::Onshore),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub listing_url: String,
    pub quick_sample: usize,
    pub header_scan_lines: usize,
    pub timeout_secs: u64,
    pub classifier: ClassifierOptions,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            quick_sample: DEFAULT_QUICK_SAMPLE,
            header_scan_lines: DEFAULT_HEADER_SCAN_LINES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            classifier: ClassifierOptions::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must be readable; the default file is optional.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, AnpError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| AnpError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| AnpError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = ResolvedConfig::default();
        let classifier = match config.classifier {
            Some(entry) => ClassifierOptions {
                prefer_href: entry.prefer_href.unwrap_or(defaults.classifier.prefer_href),
                ambiguous_default: entry.ambiguous_default,
            },
            None => defaults.classifier,
        };

        ResolvedConfig {
            listing_url: config
                .listing_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.listing_url),
            quick_sample: config
                .quick_sample
                .filter(|n| *n > 0)
                .unwrap_or(defaults.quick_sample),
            header_scan_lines: config
                .header_scan_lines
                .filter(|n| *n > 0)
                .unwrap_or(defaults.header_scan_lines),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            classifier,
        }
    }
}
