//! Tracing initialisation for the onboarding binaries.
//!
//! Logs go to stderr so stdout carries only the run summary (text or JSON).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding a filter directive, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "ONBOARD_LOG";

/// Build the filter: `ONBOARD_LOG`, then `RUST_LOG`, then our crates at
/// `level` with everything else at `warn`.
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            let level = level.as_str().to_ascii_lowercase();
            EnvFilter::new(format!(
                "warn,onboard_core={level},onboard_xapi={level},pano_onboard={level}"
            ))
        })
}

/// Install the global subscriber. Later calls are ignored.
///
/// * `json`: newline-delimited JSON instead of the compact text format.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging");
    }
}
