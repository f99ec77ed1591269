//! Log output for the `drift` binary.
//!
//! Lines go to stderr so that reports printed on stdout can be piped.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directives used when `RUST_LOG` is unset. The HTTP stack stays at `warn`
/// so `--verbose` shows gateway traffic without connection chatter.
pub fn default_directives(level: Level) -> String {
    format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn")
}

/// Install the global subscriber: text lines, or JSON lines when `json` is set.
///
/// Returns `false` when a subscriber was already installed; the first one stays.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let text = (!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));
    let lines = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(lines)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_the_http_stack() {
        let directives = default_directives(Level::DEBUG);
        assert!(directives.starts_with("DEBUG,"));
        assert!(directives.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_only_the_first_subscriber_is_installed() {
        init_tracing(false, Level::DEBUG);
        assert!(!init_tracing(true, Level::INFO));
    }
}
