pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tagtrust")]
#[command(about = "Distribute X.509 certificates to tagged nodes over shared stores")]
pub struct Args {
    /// Path to the tagtrust state directory (defaults to ~/.tagtrust)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace). Overrides the config file.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
