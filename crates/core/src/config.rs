//! Runtime configuration for the decoy service.

use std::path::PathBuf;
use std::time::Duration;

/// Payload-acquisition options, consumed by the fetcher.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Reach out to resolved targets at all.
    pub enabled: bool,
    /// Follow the remote class reference advertised by a directory entry.
    pub follow_class_reference: bool,
    /// Keep retrieved bytes on disk; `None` means hash-and-discard.
    pub storage_dir: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Hard cap on bytes retrieved per artifact.
    pub max_bytes: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            follow_class_reference: false,
            storage_dir: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            max_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Full service configuration, assembled by the binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub ports: Vec<u16>,
    pub log_file: PathBuf,
    /// Spoofed `Server` response header; omitted when `None`.
    pub server_header: Option<String>,
    pub fetch: FetchOptions,
}

impl Config {
    /// Validate before any request is served. This is the only point where
    /// misconfiguration is allowed to be fatal.
    ///
    /// # Errors
    ///
    /// Returns an error if no port is configured or a fetch capability is
    /// requested without payload retrieval being enabled.
    pub fn validate(&self) -> crate::Result<()> {
        if self.ports.is_empty() {
            return Err(eyre::eyre!("no listening port configured"));
        }
        if !self.fetch.enabled {
            if self.fetch.follow_class_reference {
                return Err(eyre::eyre!(
                    "--download-class requires --download-payloads"
                ));
            }
            if self.fetch.storage_dir.is_some() {
                return Err(eyre::eyre!("--download-dir requires --download-payloads"));
            }
        }
        if self.fetch.max_bytes == 0 {
            return Err(eyre::eyre!("payload size cap must be non-zero"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            log_file: PathBuf::from("lurepot.log"),
            server_header: None,
            fetch: FetchOptions::default(),
        }
    }
}
