//! Context configuration resolved from code and environment variables.
//!
//! | variable             | field      | values                                  |
//! |----------------------|------------|-----------------------------------------|
//! | `OXBRIDGE_RUNTIME`   | `runtime`  | `builtin` or a path to a runtime library |
//! | `OXBRIDGE_FALLBACK`  | `fallback` | `assume`, `warn`, `deny`                |
//! | `OXBRIDGE_LOG`       | `log`      | filter directives, e.g. `warn,oxbridge::runtime::dispatch=trace` |

use std::path::PathBuf;

/// Environment variable selecting the runtime.
pub const RUNTIME_ENV_VAR: &str = "OXBRIDGE_RUNTIME";
/// Environment variable selecting the fallback policy.
pub const FALLBACK_ENV_VAR: &str = "OXBRIDGE_FALLBACK";
/// Environment variable holding log filter directives.
pub const LOG_ENV_VAR: &str = oxbridge_log::DEFAULT_ENV_VAR;

/// Where the runtime entry points come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuntimeSource {
    /// The bundled `oxbridge-rt` runtime.
    #[default]
    Builtin,
    /// A shared library exporting the runtime C API.
    Library(PathBuf),
}

/// What dispatch does when a selector has no method metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Assume the all-object signature and log at debug level.
    Assume,
    /// Assume the all-object signature and log a warning.
    #[default]
    Warn,
    /// Fail with [`Error::UnrecognizedSelector`](crate::Error::UnrecognizedSelector).
    Deny,
}

impl FallbackPolicy {
    /// Parses `assume`, `warn` or `deny`, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assume" => Some(FallbackPolicy::Assume),
            "warn" => Some(FallbackPolicy::Warn),
            "deny" => Some(FallbackPolicy::Deny),
            _ => None,
        }
    }
}

/// Settings for a [`RuntimeContext`](crate::RuntimeContext).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    /// Runtime the context drives.
    pub runtime: RuntimeSource,

    /// Behavior for selectors without metadata.
    pub fallback: FallbackPolicy,

    /// Log filter directives applied when the context is created.
    pub log: Option<String>,
}

impl Config {
    /// Default configuration: builtin runtime, warn on fallback, logger untouched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves configuration from the environment, keeping defaults for
    /// unset or unparsable variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let runtime = match lookup(RUNTIME_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            Some(v) if v.trim().eq_ignore_ascii_case("builtin") => RuntimeSource::Builtin,
            Some(v) => RuntimeSource::Library(PathBuf::from(v.trim())),
            None => RuntimeSource::Builtin,
        };

        let fallback = lookup(FALLBACK_ENV_VAR)
            .and_then(|v| FallbackPolicy::parse(&v))
            .unwrap_or_default();

        let log = lookup(LOG_ENV_VAR).filter(|v| !v.trim().is_empty());

        Config {
            runtime,
            fallback,
            log,
        }
    }

    /// Sets the runtime source.
    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeSource) -> Self {
        self.runtime = runtime;
        self
    }

    /// Sets the fallback policy.
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets log filter directives.
    #[must_use]
    pub fn with_log(mut self, directives: impl Into<String>) -> Self {
        self.log = Some(directives.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(env(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.fallback, FallbackPolicy::Warn);
        assert_eq!(config.runtime, RuntimeSource::Builtin);
    }

    #[test]
    fn test_from_environment() {
        let config = Config::from_lookup(env(&[
            (RUNTIME_ENV_VAR, "/usr/lib/libobjc.so.4"),
            (FALLBACK_ENV_VAR, "DENY"),
            (LOG_ENV_VAR, "debug"),
        ]));
        assert_eq!(config.runtime, RuntimeSource::Library("/usr/lib/libobjc.so.4".into()));
        assert_eq!(config.fallback, FallbackPolicy::Deny);
        assert_eq!(config.log.as_deref(), Some("debug"));
    }

    #[test]
    fn test_unparsable_values_keep_defaults() {
        let config = Config::from_lookup(env(&[(FALLBACK_ENV_VAR, "sometimes"), (RUNTIME_ENV_VAR, " Builtin ")]));
        assert_eq!(config.fallback, FallbackPolicy::Warn);
        assert_eq!(config.runtime, RuntimeSource::Builtin);
    }

    #[test]
    fn test_builder() {
        let config = Config::new().with_fallback(FallbackPolicy::Assume).with_log("trace");
        assert_eq!(config.fallback, FallbackPolicy::Assume);
        assert_eq!(config.log.as_deref(), Some("trace"));
    }
}
