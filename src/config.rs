use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::hierarchy::TieBreak;
use crate::matcher::MatchConfig;
use crate::paths;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub matching: MatchingConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Key bound in characters. Must be the same for every pass over a corpus.
    pub max_length: Option<usize>,
    pub min_prefix_length: Option<usize>,
    pub full_text_fallback: Option<bool>,
    pub tie_break: Option<TieBreak>,
}

impl Config {
    /// Load config from `LINEAGE_CONFIG` or `~/.lineage/config.toml`.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(&paths::config_path()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.matching.max_length == Some(0) {
            bail!(
                "failed to parse {}: matching.max_length must be greater than zero",
                path.display()
            );
        }
        Ok(())
    }

    /// Matcher settings: file values over built-in defaults.
    pub fn match_config(&self) -> MatchConfig {
        let defaults = MatchConfig::default();
        let m = &self.matching;
        MatchConfig {
            max_length: m.max_length.unwrap_or(defaults.max_length),
            min_prefix_length: m.min_prefix_length.unwrap_or(defaults.min_prefix_length),
            full_text_fallback: m.full_text_fallback.unwrap_or(defaults.full_text_fallback),
        }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.matching.tie_break.unwrap_or_default()
    }
}
