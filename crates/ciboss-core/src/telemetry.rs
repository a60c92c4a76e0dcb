//! Tracing setup for the ciboss binary.
//!
//! Logs go to stderr so stdout stays free for the final Run State JSON.
//! Calling [`init_tracing`] twice is harmless; only the first call installs
//! the global subscriber.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events are shown at the requested level. Everything else
/// (HTTP stack, runtime) stays at `warn`.
const CIBOSS_TARGETS: [&str; 4] = ["ciboss", "ciboss_core", "ciboss_ci", "ciboss_remote"];

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(
        CIBOSS_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.as_str().to_ascii_lowercase())),
    );
    directives.join(",")
}

/// Level selected by the CLI `--verbose` flag.
pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. `json` switches to
/// newline-delimited JSON records.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_ciboss_crates() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("ciboss_core=debug"));
        assert!(directives.contains("ciboss=debug"));
    }

    #[test]
    fn test_level_for_verbose() {
        assert_eq!(level_for(true), Level::DEBUG);
        assert_eq!(level_for(false), Level::INFO);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
