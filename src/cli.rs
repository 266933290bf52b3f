use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "reelpass",
    about = "Share private media collections through single-viewer links",
    long_about = None,
    version = env!("GIT_VERSION"),
    arg_required_else_help = true,
)]
pub struct Args {
    /// TOML catalog listing collections and share links
    pub catalog: PathBuf,

    /// HTTP port to listen on [default: 8300]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to TOML config file (overrides default search: ./reelpass.toml, ~/.config/reelpass/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Bind to localhost only (127.0.0.1) instead of all interfaces (0.0.0.0 + :::)
    #[arg(long)]
    pub localhost: bool,

    /// Seconds between client heartbeats [default: 10]
    #[arg(long, value_name = "SECS")]
    pub renew_interval: Option<u64>,

    /// Seconds without a heartbeat before a session is reclaimed [default: 30]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Append viewing events as JSON lines to this file instead of the log
    #[arg(long, value_name = "FILE")]
    pub events: Option<PathBuf>,
}
