//! Layered run configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config PATH`, else `<config dir>/crosslink/config.toml`)
//! 3. environment variables prefixed `CROSSLINK_` (`__` separates nested keys)
//! 4. command-line flags
//!
//! A missing default file is not an error; a missing explicit file is, and
//! so is any file that fails to parse.
//!
//! ```toml
//! volume_globs = ["/mnt/disk*"]
//! exclusions = ["{volume}/appdata", "{volume}/system"]
//! priority_segment = "^torrents?$"
//! io_threads = 4
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::{PatternError, PriorityPattern, DEFAULT_PRIORITY_SEGMENT};
use crate::scanner::volume::VolumeError;
use crate::scanner::{ExclusionRule, VolumeSet, WalkerConfig};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "CROSSLINK_";

/// Fatal configuration problems. No mutation happens after one of these.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration could not be loaded or parsed.
    #[error("invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// An explicitly requested config file does not exist.
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    /// Volume resolution failed.
    #[error(transparent)]
    Volumes(#[from] VolumeError),

    /// The priority pattern is not a valid regular expression.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// `io_threads` must be at least 1.
    #[error("io_threads must be at least 1")]
    InvalidIoThreads,

    /// The effective configuration could not be rendered.
    #[error("cannot render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Effective configuration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Volume roots, in scan order.
    pub volumes: Vec<PathBuf>,
    /// Globs expanding to further volume roots (`*` in the last segment only).
    pub volume_globs: Vec<String>,
    /// Exclusion patterns; `{volume}` stands for each volume root.
    pub exclusions: Vec<ExclusionRule>,
    /// Regex matched case-insensitively against each path segment to find
    /// priority (canonical) copies.
    pub priority_segment: String,
    /// Worker threads for hashing.
    pub io_threads: usize,
    /// Smallest file size considered, in bytes.
    pub min_size: u64,
    /// Skip hidden files and directories.
    pub skip_hidden: bool,
    /// Never relink a file that already shares the canonical's inode.
    pub skip_shared_inodes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            volume_globs: Vec::new(),
            exclusions: Vec::new(),
            priority_segment: DEFAULT_PRIORITY_SEGMENT.to_string(),
            io_threads: 4,
            min_size: 1,
            skip_hidden: false,
            skip_shared_inodes: true,
        }
    }
}

/// Values set on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    /// Replaces `volumes` when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<PathBuf>,
    /// Replaces `volume_globs` when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volume_globs: Vec<String>,
    /// Replaces `exclusions` when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,
    /// Overrides `priority_segment`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_segment: Option<String>,
    /// Overrides `io_threads`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io_threads: Option<usize>,
    /// Overrides `min_size`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    /// Overrides `skip_hidden`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_hidden: Option<bool>,
}

impl Config {
    /// Default config file location for this platform.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "crosslink", "crosslink")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Build the layered figment without CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileNotFound`] if `path` is given but missing.
    pub fn figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) if !path.is_file() => {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            Some(path) => {
                log::debug!("Loading config from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => {
                if let Some(default) = Self::default_path().filter(|p| p.is_file()) {
                    log::debug!("Loading config from {}", default.display());
                    figment = figment.merge(Toml::file(default));
                }
            }
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing or malformed files, bad values,
    /// or an invalid priority pattern.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(path)?
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialization alone cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid thread count or pattern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.io_threads == 0 {
            return Err(ConfigError::InvalidIoThreads);
        }
        self.priority_pattern()?;
        Ok(())
    }

    /// Compile the priority pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] for an invalid regex.
    pub fn priority_pattern(&self) -> Result<PriorityPattern, ConfigError> {
        Ok(PriorityPattern::new(&self.priority_segment)?)
    }

    /// Resolve the configured roots and globs into a volume set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Volumes`] if no volume resolves or an explicit
    /// root is missing or not a directory.
    pub fn resolve_volumes(&self) -> Result<VolumeSet, ConfigError> {
        Ok(VolumeSet::resolve(&self.volumes, &self.volume_globs)?)
    }

    /// Walker settings derived from this configuration.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig::default()
            .with_skip_hidden(self.skip_hidden)
            .with_min_size(self.min_size)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
