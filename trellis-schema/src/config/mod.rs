//! Configuration file parsing for `trellis.toml`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{SchemaError, SchemaResult};

/// Main configuration structure for `trellis.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrellisConfig {
    /// Batched loader settings.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Selection analysis settings.
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Single-entity lookup settings.
    #[serde(default)]
    pub lookup: LookupConfig,

    /// Debug/logging settings.
    #[serde(default)]
    pub debug: DebugConfig,

    /// Environment-specific overrides.
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentOverride>,
}

impl TrellisConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> SchemaResult<Self> {
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| SchemaError::TomlError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that the type system cannot express.
    pub fn validate(&self) -> SchemaResult<()> {
        if self.loader.max_batch_size == 0 {
            return Err(SchemaError::config("loader.max_batch_size must be at least 1"));
        }
        if self.selection.max_depth == 0 {
            return Err(SchemaError::config("selection.max_depth must be at least 1"));
        }
        Ok(())
    }

    /// Apply environment-specific overrides.
    pub fn with_environment(mut self, env: &str) -> Self {
        if let Some(overrides) = self.environments.remove(env) {
            if let Some(loader) = overrides.loader {
                if let Some(max_batch_size) = loader.max_batch_size {
                    self.loader.max_batch_size = max_batch_size.max(1);
                }
                if let Some(ticks) = loader.batch_delay_ticks {
                    self.loader.batch_delay_ticks = ticks;
                }
                if let Some(cache) = loader.cache {
                    self.loader.cache = cache;
                }
            }
            if let Some(lookup) = overrides.lookup {
                if let Some(policy) = lookup.policy {
                    self.lookup.policy = policy;
                }
            }
            if let Some(debug) = overrides.debug {
                if let Some(log_batches) = debug.log_batches {
                    self.debug.log_batches = log_batches;
                }
            }
        }
        self
    }
}

/// Batched loader configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Maximum keys passed to one bulk fetch; larger flushes are chunked.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Cooperative yields a waiting load makes before flushing its batch.
    ///
    /// Values below one behave as one.
    #[serde(default = "default_batch_delay_ticks")]
    pub batch_delay_ticks: usize,

    /// Memoize results for the lifetime of the request.
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            batch_delay_ticks: default_batch_delay_ticks(),
            cache: true,
        }
    }
}

impl LoaderConfig {
    /// Set the maximum batch size (at least 1).
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Set the number of yields before a flush.
    pub fn with_batch_delay_ticks(mut self, ticks: usize) -> Self {
        self.batch_delay_ticks = ticks;
        self
    }

    /// Enable or disable memoization.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }
}

fn default_max_batch_size() -> usize { 100 }
fn default_batch_delay_ticks() -> usize { 1 }
fn default_true() -> bool { true }

/// Selection analysis configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionConfig {
    /// Let the root fetch join the edges found in the selection.
    #[serde(default = "default_true")]
    pub eager_join: bool,

    /// Deepest accepted selection tree.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            eager_join: true,
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_depth() -> usize { 16 }

/// How single-entity lookups treat storage failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupPolicy {
    /// Absent rows are `null`; storage failures are reported as errors.
    #[default]
    Strict,
    /// Any failure is reported as `null` (compatibility mode).
    NullOnError,
}

/// Single-entity lookup configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LookupConfig {
    /// Failure policy.
    #[serde(default)]
    pub policy: LookupPolicy,
}

/// Debug configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DebugConfig {
    /// Log every dispatched batch at `info` instead of `debug`.
    #[serde(default)]
    pub log_batches: bool,
}

/// Environment-specific configuration override.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOverride {
    /// Loader overrides.
    pub loader: Option<LoaderOverride>,

    /// Lookup overrides.
    pub lookup: Option<LookupOverride>,

    /// Debug overrides.
    pub debug: Option<DebugOverride>,
}

/// Loader configuration override.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderOverride {
    /// Override batch size.
    pub max_batch_size: Option<usize>,
    /// Override flush delay.
    pub batch_delay_ticks: Option<usize>,
    /// Override memoization.
    pub cache: Option<bool>,
}

/// Lookup configuration override.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LookupOverride {
    /// Override policy.
    pub policy: Option<LookupPolicy>,
}

/// Debug configuration override.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DebugOverride {
    /// Override batch logging.
    pub log_batches: Option<bool>,
}

/// Expand `${VAR}` references. Unset variables are left as written.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        let full_match = &cap[0];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    result
}
