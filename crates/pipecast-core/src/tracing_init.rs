//! Shared tracing/logging initialization.
//!
//! The relay binary and the integration harnesses set up `tracing_subscriber`
//! the same way: an env-filter scoped to the calling crate, plus optional JSON
//! output for log aggregation.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Build the filter directive used when `RUST_LOG` is not set.
///
/// `tower_http` is capped at `warn` so per-request spans don't drown out
/// session lifecycle logs.
pub fn default_directive(crate_name: &str, level: &str) -> String {
    format!("{}={level},tower_http=warn", crate_name.replace('-', "_"))
}

/// Initialise the global tracing subscriber.
///
/// * `crate_name` -- crate whose logs are enabled at `level` by default.
/// * `level` -- default level when `RUST_LOG` is unset (e.g. `"info"`).
/// * `log_json` -- emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(crate_name: &str, level: &str, log_json: bool) -> Result<()> {
    let directive = std::env::var("RUST_LOG").unwrap_or_else(|_| default_directive(crate_name, level));
    let env_filter = EnvFilter::try_new(&directive)
        .map_err(|e| Error::Config(format!("Invalid log filter {directive:?}: {e}")))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| Error::Config(format!("Tracing already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_uses_underscored_crate_name() {
        assert_eq!(
            default_directive("pipecast-relay", "debug"),
            "pipecast_relay=debug,tower_http=warn"
        );
    }

    #[test]
    fn directive_parses_as_env_filter() {
        assert!(EnvFilter::try_new(default_directive("pipecast-relay", "info")).is_ok());
    }
}
