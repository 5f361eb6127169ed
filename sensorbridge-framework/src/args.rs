//! CLI argument parsing for bridges.

use clap::Args;

/// Common CLI arguments for all bridges.
///
/// Bridges flatten this into their own parser with `#[command(flatten)]`.
/// Settings themselves come from the environment; these flags only steer
/// how the process runs.
#[derive(Args, Debug, Clone, Default)]
pub struct BridgeArgs {
    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Load and validate settings, print what would be published, then exit.
    #[arg(long)]
    pub check_config: bool,
}
