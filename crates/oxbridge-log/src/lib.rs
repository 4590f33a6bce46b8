//! A small, zero-dependency logging crate for the `oxbridge` workspace.
//!
//! Every record carries a target (the module path of the call site) and a
//! [`Level`]. Records are filtered by a set of directives of the form
//! `"warn,oxbridge::dispatch=trace"`: a bare level sets the default, and
//! `prefix=level` overrides it for every target starting with `prefix`. The
//! longest matching prefix wins.
//!
//! Output goes to stderr as `[LEVEL] target: message`, colored when the
//! level has a color assigned.
//!
//! # Example
//!
//! ```
//! use oxbridge_log::{debug, warn, Level};
//!
//! oxbridge_log::set_level(Level::Debug);
//! oxbridge_log::set_directives("info,my_crate::noisy=error").unwrap();
//!
//! let selector = "initWithFrame:";
//! debug!("resolving signature for {}", selector);
//! warn!("falling back to an assumed signature");
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};

/// Environment variable conventionally read by [`init_from_env`] callers.
pub const DEFAULT_ENV_VAR: &str = "OXBRIDGE_LOG";

/// Log levels, ordered from most severe (Error) to least severe (Trace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Failures the caller will see as an error
    Error = 0,
    /// Degraded behavior that still completes
    Warn = 1,
    /// Lifecycle events
    Info = 2,
    /// Per-operation diagnostics
    Debug = 3,
    /// Per-call tracing
    Trace = 4,
}

impl Level {
    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }

    /// Parses a level name, case-insensitively.
    ///
    /// ```
    /// use oxbridge_log::Level;
    ///
    /// assert_eq!(Level::from_str("warn"), Ok(Level::Warn));
    /// assert!(Level::from_str("loud").is_err());
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

/// A single `prefix=level` override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Module path prefix the override applies to
    pub target: String,
    /// Most verbose level emitted for matching targets
    pub level: Level,
}

/// Parses a directive string into a default level and a list of overrides.
///
/// Empty segments are ignored. Returns an error naming the first segment
/// that is not a valid level or `target=level` pair.
///
/// ```
/// use oxbridge_log::{parse_directives, Level};
///
/// let (default, overrides) = parse_directives("warn,oxbridge::dispatch=trace").unwrap();
/// assert_eq!(default, Some(Level::Warn));
/// assert_eq!(overrides[0].target, "oxbridge::dispatch");
/// ```
pub fn parse_directives(spec: &str) -> Result<(Option<Level>, Vec<Directive>), String> {
    let mut default = None;
    let mut overrides = Vec::new();

    for segment in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match segment.split_once('=') {
            Some((target, level)) => {
                let target = target.trim();
                if target.is_empty() {
                    return Err(format!("Missing target in directive: {segment}"));
                }
                overrides.push(Directive {
                    target: target.to_string(),
                    level: Level::from_str(level)?,
                });
            }
            None => default = Some(Level::from_str(segment)?),
        }
    }

    Ok((default, overrides))
}

/// The global logger.
///
/// The default level lives in an atomic so the common "no overrides" path
/// never takes a lock.
pub struct Logger {
    level: AtomicU8,
    overrides: RwLock<Vec<Directive>>,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            overrides: RwLock::new(Vec::new()),
        }
    }

    /// Sets the default level.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
    }

    /// Returns the default level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Replaces the per-target overrides.
    pub fn set_overrides(&self, mut overrides: Vec<Directive>) {
        // longest prefix first, so the first match is the most specific
        overrides.sort_by(|a, b| b.target.len().cmp(&a.target.len()));
        if let Ok(mut guard) = self.overrides.write() {
            *guard = overrides;
        }
    }

    /// Returns the effective level for `target`.
    pub fn level_for(&self, target: &str) -> Level {
        if let Ok(guard) = self.overrides.read() {
            if let Some(directive) = guard.iter().find(|d| target.starts_with(d.target.as_str())) {
                return directive.level;
            }
        }
        self.level()
    }

    /// Checks whether a record at `level` from `target` would be emitted.
    pub fn enabled(&self, level: Level, target: &str) -> bool {
        level <= self.level_for(target)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, initialized at [`Level::Warn`] on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Warn))
}

/// Sets the default level of the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Applies a directive string to the global logger.
///
/// A directive string without a bare level keeps the current default.
pub fn set_directives(spec: &str) -> Result<(), String> {
    let (default, overrides) = parse_directives(spec)?;
    let logger = get_logger();
    if let Some(level) = default {
        logger.set_level(level);
    }
    logger.set_overrides(overrides);
    Ok(())
}

/// Reads directives from the environment variable `var`, if set.
///
/// Returns `Ok(false)` when the variable is absent.
pub fn init_from_env(var: &str) -> Result<bool, String> {
    match std::env::var(var) {
        Ok(spec) => set_directives(&spec).map(|()| true),
        Err(_) => Ok(false),
    }
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    const RESET: &str = "\x1b[0m";

    if !get_logger().enabled(level, target) {
        return;
    }

    let color = level.color_code();
    let name = level.as_str();
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{color}[{name}]{RESET} {target}: {args}");
}

/// Logs a message at an explicit level, tagged with the caller's module path.
///
/// ```
/// use oxbridge_log::{log, Level};
///
/// log!(level: Level::Info, "registered {} classes", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {
        {
            let level = $level;
            if $crate::get_logger().enabled(level, module_path!()) {
                $crate::__log_with_target(level, module_path!(), format_args!($($arg)*));
            }
        }
    };
}

/// Logs at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Info < Level::Debug);
        assert!(Level::Debug < Level::Trace);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!(Level::from_str("error"), Ok(Level::Error));
        assert_eq!(Level::from_str(" Warning "), Ok(Level::Warn));
        assert_eq!(Level::from_str("TRACE"), Ok(Level::Trace));
        assert!(Level::from_str("verbose").is_err());
    }

    #[test]
    fn test_parse_directives() {
        let (default, overrides) =
            parse_directives("info, oxbridge::dispatch=trace,,oxbridge=warn").unwrap();
        assert_eq!(default, Some(Level::Info));
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides[1].level, Level::Warn);

        assert!(parse_directives("=debug").is_err());
        assert!(parse_directives("oxbridge=chatty").is_err());
        assert_eq!(parse_directives("").unwrap(), (None, Vec::new()));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let logger = Logger::new(Level::Error);
        logger.set_overrides(vec![
            Directive { target: "oxbridge".into(), level: Level::Info },
            Directive { target: "oxbridge::dispatch".into(), level: Level::Trace },
        ]);

        assert_eq!(logger.level_for("oxbridge::dispatch::cache"), Level::Trace);
        assert_eq!(logger.level_for("oxbridge::class"), Level::Info);
        assert_eq!(logger.level_for("other"), Level::Error);

        assert!(logger.enabled(Level::Trace, "oxbridge::dispatch"));
        assert!(!logger.enabled(Level::Debug, "oxbridge::class"));
        assert!(!logger.enabled(Level::Warn, "other"));
    }

    #[test]
    fn test_default_level_changes() {
        let logger = Logger::new(Level::Info);
        assert!(logger.enabled(Level::Info, "any"));
        assert!(!logger.enabled(Level::Debug, "any"));

        logger.set_level(Level::Trace);
        assert_eq!(logger.level(), Level::Trace);
        assert!(logger.enabled(Level::Trace, "any"));
    }

    #[test]
    fn test_init_from_missing_env() {
        assert_eq!(init_from_env("OXBRIDGE_LOG_TEST_UNSET_VARIABLE"), Ok(false));
    }

    #[test]
    fn test_macros_expand() {
        let id = 7;
        error!("error {}", id);
        warn!("warn {id}");
        info!("info");
        debug!("debug {:?}", [1, 2]);
        trace!("trace");
        log!(level: Level::Info, "explicit {}", "level");
    }
}
