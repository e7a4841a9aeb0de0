//! Build configuration (`docweave.toml`) parsing and validation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::docstring::Flavor;

/// File name looked up by [`Config::discover`].
pub const CONFIG_FILE: &str = "docweave.toml";

/// Default template for guessed links to external documentation.
pub const DEFAULT_EXTERNAL_URL: &str = "https://docs.python.org/3/library/{module}.html#{identifier}";

/// Errors that can occur when loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid exclude pattern '{0}': {1}")]
    InvalidPattern(String, regex::Error),

    #[error("external-url must contain '{{identifier}}': {0}")]
    InvalidUrlTemplate(String),

    #[error("invalid value '{value}' for {variable}")]
    InvalidEnv { variable: &'static str, value: String },
}

/// The complete docweave.toml configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub links: LinkConfig,
}

/// Model builder settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Document members whose names mark them private.
    #[serde(default, rename = "include-private")]
    pub include_private: bool,

    /// Fix the docstring flavor for every module instead of detecting it.
    #[serde(default)]
    pub docformat: Option<Flavor>,

    /// Directories searched for modules given by name.
    #[serde(default, rename = "search-paths")]
    pub search_paths: Vec<PathBuf>,

    /// Regular expressions for module names to leave out.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Cross-reference settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkConfig {
    /// Guess URLs for references outside the documented modules.
    #[serde(default)]
    pub external: bool,

    /// URL template with `{module}`, `{qualname}` and `{identifier}` placeholders.
    #[serde(default = "default_external_url", rename = "external-url")]
    pub external_url: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            external: false,
            external_url: default_external_url(),
        }
    }
}

fn default_external_url() -> String {
    DEFAULT_EXTERNAL_URL.to_string()
}

impl Config {
    /// Load a configuration from a file path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `docweave.toml` from `dir` if present, defaults otherwise.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = dir.as_ref().join(CONFIG_FILE);
        if path.is_file() {
            tracing::debug!(target: "docweave", "loading {}", path.display());
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.exclude_patterns()?;
        if !self.links.external_url.contains("{identifier}") {
            return Err(ConfigError::InvalidUrlTemplate(
                self.links.external_url.clone(),
            ));
        }
        Ok(())
    }

    /// Compiled `exclude` patterns.
    pub fn exclude_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        self.build
            .exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern(pattern.clone(), e))
            })
            .collect()
    }

    /// Apply `DOCWEAVE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognised variables: `DOCWEAVE_INCLUDE_PRIVATE`, `DOCWEAVE_DOCFORMAT`
    /// (a flavor name, or `auto` to detect per module) and
    /// `DOCWEAVE_LINK_EXTERNAL`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("DOCWEAVE_INCLUDE_PRIVATE") {
            self.build.include_private = parse_flag("DOCWEAVE_INCLUDE_PRIVATE", &value)?;
        }
        if let Some(value) = lookup("DOCWEAVE_DOCFORMAT") {
            self.build.docformat = if value.trim().eq_ignore_ascii_case("auto") {
                None
            } else {
                Some(value.parse().map_err(|_| ConfigError::InvalidEnv {
                    variable: "DOCWEAVE_DOCFORMAT",
                    value: value.clone(),
                })?)
            };
        }
        if let Some(value) = lookup("DOCWEAVE_LINK_EXTERNAL") {
            self.links.external = parse_flag("DOCWEAVE_LINK_EXTERNAL", &value)?;
        }
        Ok(())
    }
}

fn parse_flag(variable: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            variable,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert!(!config.build.include_private);
        assert!(config.build.docformat.is_none());
        assert!(!config.links.external);
        assert_eq!(config.links.external_url, DEFAULT_EXTERNAL_URL);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[build]
include-private = true
docformat = "google"
search-paths = ["src", "vendor"]
exclude = ["^pkg\\.tests", "_compat$"]

[links]
external = true
external-url = "https://example.org/{qualname}#{identifier}"
"#;
        let config = Config::parse(toml).unwrap();
        assert!(config.build.include_private);
        assert_eq!(config.build.docformat, Some(Flavor::Google));
        assert_eq!(config.build.search_paths.len(), 2);
        let patterns = config.exclude_patterns().unwrap();
        assert!(patterns[0].is_match("pkg.tests.unit"));
        assert!(config.links.external);
    }

    #[test]
    fn reject_unknown_keys_and_bad_patterns() {
        assert!(matches!(
            Config::parse("[build]\nprivate = true\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::parse("[build]\nexclude = [\"(\"]\n"),
            Err(ConfigError::InvalidPattern(..))
        ));
        assert!(matches!(
            Config::parse("[links]\nexternal-url = \"https://example.org\"\n"),
            Err(ConfigError::InvalidUrlTemplate(_))
        ));
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("DOCWEAVE_INCLUDE_PRIVATE", "yes"),
            ("DOCWEAVE_DOCFORMAT", "numpy"),
            ("DOCWEAVE_LINK_EXTERNAL", "1"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert!(config.build.include_private);
        assert_eq!(config.build.docformat, Some(Flavor::Numpy));
        assert!(config.links.external);

        config
            .apply_overrides(|key| (key == "DOCWEAVE_DOCFORMAT").then(|| "auto".to_string()))
            .unwrap();
        assert_eq!(config.build.docformat, None);

        let err = config
            .apply_overrides(|key| (key == "DOCWEAVE_LINK_EXTERNAL").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                variable: "DOCWEAVE_LINK_EXTERNAL",
                ..
            }
        ));
    }

    #[test]
    fn discover_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert!(config.build.exclude.is_empty());

        std::fs::write(dir.path().join(CONFIG_FILE), "[build]\ninclude-private = true\n").unwrap();
        assert!(Config::discover(dir.path()).unwrap().build.include_private);
    }
}
