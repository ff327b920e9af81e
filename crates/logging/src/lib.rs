#![warn(missing_docs)]

//! Shared logging helpers and CLI argument definitions for the popup workspace.
//!
//! Binaries flatten [`LogArgs`] into their clap parser, pass the flags to
//! [`compute_spec`], and install a subscriber with [`init_subscriber`] or by
//! building their own from [`env_filter_from_spec`].

use std::{env, io};

use clap::Args;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logging controls for CLI apps.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Set global log level to trace (our crates only)
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Set global log level to debug (our crates only)
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Set a single global log level for our crates (error|warn|info|debug|trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set an explicit tracing filter directive (overrides other flags)
    /// e.g. "popup_core=trace,popup_channel=debug"
    #[arg(long)]
    pub log_filter: Option<String>,
}

impl LogArgs {
    /// Filter spec for these flags; see [`compute_spec`].
    pub fn spec(&self) -> String {
        compute_spec(
            self.trace,
            self.debug,
            self.log_level.as_deref(),
            self.log_filter.as_deref(),
        )
    }
}

/// List of crate targets that constitute "our" logs.
pub fn our_crates() -> &'static [&'static str] {
    &[
        "popup_geom",
        "popup_protocol",
        "popup_channel",
        "popup_config",
        "popup_core",
        "popup_tester",
        "logging",
    ]
}

/// Build a filter directive string that sets the same `level` for all of our crates.
pub fn level_spec_for(level: &str) -> String {
    let lvl = level.to_ascii_lowercase();
    our_crates()
        .iter()
        .map(|t| format!("{}={}", t, lvl))
        .collect::<Vec<_>>()
        .join(",")
}

/// Compute the final filter spec string with precedence:
/// - `log_filter`
/// - `trace`/`debug`/`log_level` (crate-scoped)
/// - `RUST_LOG` env
/// - default to crate-scoped `info`
pub fn compute_spec(
    trace: bool,
    debug: bool,
    log_level: Option<&str>,
    log_filter: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if trace {
        return level_spec_for("trace");
    }
    if debug {
        return level_spec_for("debug");
    }
    if let Some(lvl) = log_level {
        return level_spec_for(lvl);
    }
    env::var("RUST_LOG").unwrap_or_else(|_| level_spec_for("info"))
}

/// Create an `EnvFilter` from a spec string.
pub fn env_filter_from_spec(spec: &str) -> EnvFilter {
    EnvFilter::new(spec)
}

/// Install a compact stderr subscriber for `spec`. Safe to call more than
/// once; later calls are ignored.
pub fn init_subscriber(spec: &str) {
    tracing_subscriber::registry()
        .with(env_filter_from_spec(spec))
        .with(fmt::layer().with_writer(io::stderr).without_time())
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let spec = compute_spec(true, false, Some("warn"), Some("popup_core=trace"));
        assert_eq!(spec, "popup_core=trace");
    }

    #[test]
    fn level_flags_scope_to_our_crates() {
        let spec = compute_spec(false, true, None, None);
        assert!(spec.contains("popup_core=debug"));
        assert!(spec.contains("popup_channel=debug"));
        assert!(!spec.contains("tokio"));

        let spec = compute_spec(false, false, Some("WARN"), None);
        assert!(spec.split(',').all(|d| d.ends_with("=warn")));
    }

    #[test]
    fn log_args_delegate_to_compute_spec() {
        let args = LogArgs {
            trace: true,
            ..LogArgs::default()
        };
        assert_eq!(args.spec(), level_spec_for("trace"));
    }
}
