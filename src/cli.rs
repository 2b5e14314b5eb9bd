use std::{path::PathBuf, sync::OnceLock};

use clap::Parser;

/// Forwards Rancher infrastructure container logs to fluentd.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, default_value = "fluentd-rancher.toml")]
    pub config: PathBuf,
    /// Route URI, e.g. `fluentd-rancher+tcp://fluentd:24224`.
    /// Takes precedence over the `[route]` section of the config file.
    pub route: Option<String>,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
