#![forbid(unsafe_code)]

//! Formatter for the adapter's `tracing` output.
//!
//! The filter comes from `OPTBRIDGE_LOG`, then `RUST_LOG`, then `warn`:
//!
//! ```bash
//! OPTBRIDGE_LOG=optbridge_runtime=debug cargo test
//! OPTBRIDGE_LOG=optbridge_runtime::installers::watcher=trace cargo run
//! ```

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Variable read before `RUST_LOG`.
pub const ENV_VAR: &str = "OPTBRIDGE_LOG";

static INIT: Once = Once::new();

fn filter_directives(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup(ENV_VAR)
        .or_else(|| lookup("RUST_LOG"))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "warn".to_owned())
}

/// Install the global subscriber. Only the first call has an effect; a
/// subscriber installed elsewhere is left in place.
pub fn init() {
    INIT.call_once(|| {
        let directives = filter_directives(|key| std::env::var(key).ok());
        let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("warn"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_filter(filter);
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_variable_wins_over_rust_log() {
        let directives = filter_directives(|key| match key {
            ENV_VAR => Some("optbridge_runtime=trace".to_owned()),
            "RUST_LOG" => Some("debug".to_owned()),
            _ => None,
        });
        assert_eq!(directives, "optbridge_runtime=trace");
    }

    #[test]
    fn falls_back_to_rust_log_then_warn() {
        assert_eq!(
            filter_directives(|key| (key == "RUST_LOG").then(|| "info".to_owned())),
            "info"
        );
        assert_eq!(filter_directives(|_| None), "warn");
    }

    #[test]
    fn repeated_init_is_harmless() {
        init();
        init();
    }
}
