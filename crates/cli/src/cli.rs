//! CLI argument parsing.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use lurepot_core::{Config, FetchOptions};

#[derive(Parser)]
#[command(name = "lurepot", about = "Decoy service for lookup-expression injection attacks")]
pub struct Cli {
    /// Port to listen on (repeatable)
    #[arg(long, short = 'p', required = true)]
    pub port: Vec<u16>,

    /// Analysis log file (JSON lines)
    #[arg(long, short = 'l', env = "LUREPOT_LOG_FILE", default_value = "lurepot.log")]
    pub log: PathBuf,

    /// Spoofed Server response header (e.g. "Apache/2.4.1")
    #[arg(long)]
    pub server_header: Option<String>,

    /// Retrieve payloads from resolved targets
    #[arg(long)]
    pub download_payloads: bool,

    /// Follow the class reference advertised by directory entries
    /// (requires --download-payloads)
    #[arg(long)]
    pub download_class: bool,

    /// Persist retrieved payloads here instead of hash-and-discard
    /// (requires --download-payloads)
    #[arg(long)]
    pub download_dir: Option<PathBuf>,

    /// Connect timeout for payload retrieval, in seconds
    #[arg(long, default_value = "5")]
    pub connect_timeout: u64,

    /// Read timeout for payload retrieval, in seconds
    #[arg(long, default_value = "10")]
    pub read_timeout: u64,

    /// Size cap per retrieved payload, in bytes
    #[arg(long, default_value = "2097152")]
    pub max_bytes: u64,
}

impl Cli {
    #[must_use]
    pub fn into_config(self) -> Config {
        Config {
            ports: self.port,
            log_file: self.log,
            server_header: self.server_header,
            fetch: FetchOptions {
                enabled: self.download_payloads,
                follow_class_reference: self.download_class,
                storage_dir: self.download_dir,
                connect_timeout: Duration::from_secs(self.connect_timeout),
                read_timeout: Duration::from_secs(self.read_timeout),
                max_bytes: self.max_bytes,
            },
        }
    }
}
