//! `check-config` subcommand: load a provider config and echo the merged result.

use std::io::{self, Write};

use popup_config::{ProviderConfig, load_from_path};
use tracing::info;

use crate::{cli::CheckConfigArgs, error::Result};

/// Load and validate the config named by `args`.
fn load(args: &CheckConfigArgs) -> Result<ProviderConfig> {
    match load_from_path(&args.path) {
        Ok(cfg) => Ok(cfg),
        Err(e) => {
            eprintln!("{}", e.pretty());
            Err(e.into())
        }
    }
}

/// Run the `check-config` subcommand.
pub fn run(args: &CheckConfigArgs) -> Result<()> {
    let cfg = load(args)?;
    info!(path = %args.path.display(), environment = ?cfg.environment, "config ok");
    let mut out = io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string_pretty(&cfg)?)?;
    Ok(())
}
