use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// A flag to register at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlagConfig {
    pub name: String,
    /// Detail tag shown in listings when the flag is set.
    #[serde(default)]
    pub label: Option<String>,
}

/// Service configuration, usually read from a TOML file.
///
/// ```toml
/// prefix = "#"
/// nicknames = ["小助手"]
/// corpus = "corpus.toml"
///
/// [[flags]]
/// name = "frozen"
/// label = "锁定"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Shorthand command prefix.
    pub prefix: String,
    /// Appellations stripped from the front of questions.
    pub nicknames: Vec<String>,
    /// Flags registered in this order after the built-in `regexp` flag.
    pub flags: Vec<FlagConfig>,
    /// Corpus file for the in-memory store.
    pub corpus: Option<PathBuf>,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self { prefix: "#".to_string(), nicknames: Vec::new(), flags: Vec::new(), corpus: None }
    }
}

impl QaConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: QaConfig = toml::from_str(source).map_err(|err| ConfigError::Parse { reason: err.to_string() })?;
        if config.prefix.is_empty() {
            return Err(ConfigError::InvalidPrefix);
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read { path: path.to_path_buf(), reason: err.to_string() })?;
        let mut config = Self::from_toml_str(&source)?;

        // A relative corpus path is relative to the config file.
        if let (Some(corpus), Some(dir)) = (config.corpus.as_ref(), path.parent()) {
            if corpus.is_relative() {
                config.corpus = Some(dir.join(corpus));
            }
        }
        Ok(config)
    }
}
