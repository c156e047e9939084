//! Log setup for the goldcheck binary.
//!
//! Filter precedence: `GOLDCHECK_LOG`, then `RUST_LOG`, then the level from
//! the command line. The command-line level applies to goldcheck's own
//! crates only; dependencies stay at `warn` so per-model progress is not
//! buried under runtime noise. Output goes to stderr, leaving stdout to the
//! run summary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding a goldcheck-specific filter.
pub const LOG_ENV: &str = "GOLDCHECK_LOG";

const CRATES: &[&str] = &["goldcheck", "goldcheck_core", "goldcheck_ci"];

/// Directives used when neither [`LOG_ENV`] nor `RUST_LOG` is set.
pub fn default_directives(level: Level) -> String {
    let mut directives = String::from("warn");
    for krate in CRATES {
        directives.push_str(&format!(",{}={}", krate, level.as_str().to_lowercase()));
    }
    directives
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. `json` switches to newline-delimited JSON
/// for CI log collectors. Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(env_filter(level));
    if json {
        registry.with(layer.json()).try_init().ok();
    } else {
        registry.with(layer).try_init().ok();
    }
}
