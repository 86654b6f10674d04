//! Tracing subscriber initialization.
//!
//! Every crate logs through `tracing`; this crate installs the one
//! subscriber the host process uses. Output goes to stderr so command
//! output on stdout stays machine-readable.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by the `RUST_LOG` env var.
    pub log_level: Level,
    /// Per-target overrides (e.g. "lifeos_store" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build a config from string levels, skipping unparseable ones.
    pub fn from_levels<'a, I>(level: &str, module_levels: I, json: bool) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let log_level = parse_level(level).unwrap_or(Level::INFO);
        let module_levels = module_levels
            .into_iter()
            .filter_map(|(target, lvl)| parse_level(lvl).map(|l| (target.to_string(), l)))
            .collect();
        Self {
            log_level,
            module_levels,
            json,
        }
    }

    /// Filter directive string, e.g. `info,lifeos_store=debug`.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (target, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", target, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Parse a level name case-insensitively (`warn`, `WARN`, ...).
pub fn parse_level(value: &str) -> Option<Level> {
    value.trim().parse::<Level>().ok()
}

/// Install the global subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
    });
    let pretty_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}
