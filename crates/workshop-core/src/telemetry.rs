//! Log output for the `workshop` binary and embedders.
//!
//! Records are printed on stdout, so every log line goes to stderr.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose verbosity follows the requested level. Everything else
/// logs at `warn` unless `RUST_LOG` says otherwise.
const WORKSHOP_TARGETS: [&str; 3] = ["workshop_core", "workshop_state", "workshop"];

/// Filter directives used when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(WORKSHOP_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the process-wide subscriber: JSON lines when `json` is set,
/// compact text otherwise. A subscriber installed earlier wins.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_workshop_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,workshop_core=debug,workshop_state=debug,workshop=debug"
        );
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
