//! Structured debug logging setup

use crate::error::DiagnosticsError;
use tracing_subscriber::EnvFilter;

/// Installs the process `tracing` subscriber
#[derive(Debug, Clone)]
pub struct DebugLogger {
    filter: String,
}

impl DebugLogger {
    /// Default filter when neither `RUST_LOG` nor an explicit filter is given
    pub const DEFAULT_FILTER: &'static str = "info";

    /// Create new debug logger with the default filter
    pub fn new() -> Self {
        Self::with_filter(Self::DEFAULT_FILTER)
    }

    /// Create new debug logger with a filter directive such as `framesync_media=debug`
    pub fn with_filter(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
        }
    }

    /// Filter directive this logger installs
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Install the subscriber
    ///
    /// `RUST_LOG` overrides the configured filter. Returns `Ok(false)` when a
    /// global subscriber was already installed; the call is a no-op then.
    pub fn install(&self) -> Result<bool, DiagnosticsError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.filter).map_err(|e| {
                DiagnosticsError::InvalidFilter {
                    filter: self.filter.clone(),
                    reason: e.to_string(),
                }
            })?,
        };

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!("Logging initialized with filter '{}'", self.filter);
        }
        Ok(installed)
    }

    /// Initialize logging system with the given filter directive
    pub fn init_logging(filter: &str) -> Result<bool, DiagnosticsError> {
        Self::with_filter(filter).install()
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}
