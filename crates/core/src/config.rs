//! Client configuration: where clamd listens and how to talk to it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_SOCKET: &str = "/var/run/clamav/clamd.ctl";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3310;

/// INSTREAM chunk size. Must stay below the daemon's `StreamMaxLength`.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Address of a clamd listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Local stream socket at a filesystem path.
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl Target {
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::unix(DEFAULT_SOCKET)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "{}", path.display()),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

/// On-disk form (`~/.config/clamd/client.toml`).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    socket: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    timeout_secs: Option<f64>,
    chunk_size: Option<usize>,
}

/// Runtime configuration for a clamd client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub target: Target,
    /// Per socket operation (connect, read, write). `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: Target::default(),
            timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// `~/.config/clamd/client.toml`, if a home directory is known.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("clamd").join("client.toml"))
    }

    /// Load the default config file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_default() -> crate::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("no client config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// holds contradictory or out-of-range settings.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        let config = Self::from_toml(&content)
            .map_err(|e| eyre::eyre!("invalid config {}: {e}", path.display()))?;
        debug!(path = %path.display(), target = %config.target, "loaded client config");
        Ok(config)
    }

    fn from_toml(content: &str) -> crate::Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;

        let target = match (file.socket, file.host) {
            (Some(_), Some(_)) => {
                return Err(eyre::eyre!("`socket` and `host` are mutually exclusive"));
            }
            (Some(socket), None) => {
                if file.port.is_some() {
                    return Err(eyre::eyre!("`port` requires a TCP target, not `socket`"));
                }
                Target::Unix(socket)
            }
            (None, Some(host)) => Target::tcp(host, file.port.unwrap_or(DEFAULT_PORT)),
            (None, None) => match file.port {
                Some(port) => Target::tcp(DEFAULT_HOST, port),
                None => Target::default(),
            },
        };

        let timeout = file.timeout_secs.map(parse_timeout).transpose()?;

        let chunk_size = file.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(eyre::eyre!("`chunk_size` must be greater than zero"));
        }

        Ok(Self {
            target,
            timeout,
            chunk_size,
        })
    }
}

/// Seconds as a positive `Duration`.
///
/// # Errors
///
/// Returns an error for zero, negative, or non-finite values.
pub fn parse_timeout(secs: f64) -> crate::Result<Duration> {
    let timeout = Duration::try_from_secs_f64(secs)
        .map_err(|e| eyre::eyre!("invalid timeout {secs}: {e}"))?;
    if timeout.is_zero() {
        return Err(eyre::eyre!("timeout must be greater than zero"));
    }
    Ok(timeout)
}
