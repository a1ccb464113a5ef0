//! Structured logging for loaders and the executor.
//!
//! Nothing is installed unless `TRELLIS_DEBUG` or `TRELLIS_LOG_LEVEL` is set.
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `TRELLIS_DEBUG` | `true`, `1`, `yes` | off |
//! | `TRELLIS_LOG_LEVEL` | `trace`, `debug`, `info`, `warn`, `error` | `debug` with `TRELLIS_DEBUG`, else `warn` |
//! | `TRELLIS_LOG_FORMAT` | `json`, `pretty`, `compact` | `json` |
//!
//! ```rust,no_run
//! trellis_query::logging::init();
//! ```
//!
//! Loaders log each dispatched batch at `debug` (`info` when
//! `debug.log_batches` is set), cache hits and primes at `trace`, and
//! failed batches at `warn`.

use std::env;
use std::fmt;
use std::sync::Once;

static INIT: Once = Once::new();

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line, human oriented.
    Pretty,
    /// Single-line, human oriented.
    Compact,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::Json,
        }
    }

    /// Name as accepted by `TRELLIS_LOG_FORMAT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging settings resolved from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// `TRELLIS_DEBUG` is on.
    pub debug: bool,
    /// Whether a level was set explicitly.
    pub explicit_level: bool,
    /// Maximum level for the `trellis*` targets.
    pub level: &'static str,
    /// Output format.
    pub format: LogFormat,
}

impl LogSettings {
    /// Read the `TRELLIS_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let debug = lookup("TRELLIS_DEBUG")
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"));
        let fallback = if debug { "debug" } else { "warn" };

        let requested = lookup("TRELLIS_LOG_LEVEL");
        let level = match requested.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => fallback,
        };

        Self {
            debug,
            explicit_level: requested.is_some(),
            level,
            format: lookup("TRELLIS_LOG_FORMAT")
                .map(|raw| LogFormat::parse(&raw))
                .unwrap_or_default(),
        }
    }

    /// Whether `init` should install a subscriber at all.
    pub fn enabled(&self) -> bool {
        self.debug || self.explicit_level
    }

    /// Filter directive covering every Trellis crate.
    pub fn directive(&self) -> String {
        ["trellis", "trellis_query", "trellis_schema"]
            .iter()
            .map(|target| format!("{}={}", target, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Check if `TRELLIS_DEBUG` is on.
pub fn is_debug_enabled() -> bool {
    LogSettings::from_env().debug
}

/// The level `init` would install.
pub fn log_level() -> &'static str {
    LogSettings::from_env().level
}

/// The format `init` would install.
pub fn log_format() -> LogFormat {
    LogSettings::from_env().format
}

/// Install the global subscriber once.
///
/// Later calls are no-ops, and a subscriber installed by the host
/// application is left in place. Without the `tracing-subscriber` feature
/// this only resolves the settings.
pub fn init() {
    INIT.call_once(|| {
        let settings = LogSettings::from_env();
        if !settings.enabled() {
            return;
        }
        install(settings);
    });
}

#[cfg(feature = "tracing-subscriber")]
fn install(settings: LogSettings) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_new(settings.directive()).unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match settings.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };

    if installed.is_ok() {
        tracing::info!(level = settings.level, format = %settings.format, "logging initialized");
    }
}

#[cfg(not(feature = "tracing-subscriber"))]
fn install(_settings: LogSettings) {}

/// Set `TRELLIS_LOG_LEVEL` and call [`init`].
///
/// # Safety
///
/// Mutates the process environment; call before spawning threads.
pub fn init_with_level(level: &str) {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var("TRELLIS_LOG_LEVEL", level);
    }
    init();
}

/// Set `TRELLIS_DEBUG=true` and call [`init`].
pub fn init_debug() {
    // SAFETY: documented as a startup-only call.
    unsafe {
        env::set_var("TRELLIS_DEBUG", "true");
    }
    init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_disabled_without_variables() {
        let s = settings(&[]);
        assert!(!s.enabled());
        assert_eq!(s.level, "warn");
        assert_eq!(s.format, LogFormat::Json);
    }

    #[test]
    fn test_debug_flag_raises_level() {
        let s = settings(&[("TRELLIS_DEBUG", "YES")]);
        assert!(s.enabled());
        assert_eq!(s.level, "debug");
    }

    #[test]
    fn test_explicit_level_and_format() {
        let s = settings(&[("TRELLIS_LOG_LEVEL", "Trace"), ("TRELLIS_LOG_FORMAT", "compact")]);
        assert!(s.enabled());
        assert_eq!(s.level, "trace");
        assert_eq!(s.format, LogFormat::Compact);
        assert_eq!(
            s.directive(),
            "trellis=trace,trellis_query=trace,trellis_schema=trace"
        );
    }

    #[test]
    fn test_unknown_level_falls_back() {
        let s = settings(&[("TRELLIS_LOG_LEVEL", "loud")]);
        assert!(s.enabled());
        assert_eq!(s.level, "warn");
    }
}
