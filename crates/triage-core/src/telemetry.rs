//! Logging for triage runs.
//!
//! stdout is reserved for the JSON report, so every log line goes to
//! stderr. `RUST_LOG` overrides the level picked from the command line.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// HTTP crates under the Jira client log every connection at debug.
const QUIET_TARGETS: &[&str] = &["hyper", "reqwest", "h2", "rustls"];

/// Set up stderr logging for a triage run; `json` switches to one object
/// per line for CI log collectors. Later calls are ignored.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback_directives(level)));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(layer.json()).try_init().ok();
    } else {
        registry.with(layer).try_init().ok();
    }
}

/// Filter used when `RUST_LOG` is unset.
fn fallback_directives(level: Level) -> String {
    let mut directives = vec![level.as_str().to_ascii_lowercase()];
    if level > Level::INFO {
        directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=info")));
    }
    directives.join(",")
}

/// `-v` flag to default level.
pub fn level_for_verbosity(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}
