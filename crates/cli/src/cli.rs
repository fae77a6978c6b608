//! CLI argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clamd_core::config::{parse_timeout, DEFAULT_HOST, DEFAULT_PORT};
use clamd_core::{Config, Target};

fn positive_secs(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if val.is_finite() && val > 0.0 {
        Ok(val)
    } else {
        Err(format!("timeout must be a positive number of seconds, got {val}"))
    }
}

fn nonzero_chunk(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("chunk size must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("{e}")),
    }
}

#[derive(Parser)]
#[command(name = "clamdctl", about = "Client for the clamd scanning daemon", version)]
pub struct Cli {
    /// Client config file (default: ~/.config/clamd/client.toml)
    #[arg(long, env = "CLAMD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path of clamd's local socket
    #[arg(long, env = "CLAMD_SOCKET", conflicts_with_all = ["host", "port"])]
    pub socket: Option<PathBuf>,

    /// clamd TCP host
    #[arg(long, env = "CLAMD_HOST")]
    pub host: Option<String>,

    /// clamd TCP port
    #[arg(long, env = "CLAMD_PORT")]
    pub port: Option<u16>,

    /// Timeout in seconds for each connect, read and write
    #[arg(long, env = "CLAMD_TIMEOUT", value_parser = positive_secs)]
    pub timeout: Option<f64>,

    /// INSTREAM chunk size in bytes (keep below clamd's StreamMaxLength)
    #[arg(long, value_parser = nonzero_chunk)]
    pub chunk_size: Option<usize>,

    /// Print scan results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Config file settings with command-line overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded.
    pub fn resolve_config(&self) -> clamd_core::Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load(path)?,
            None => Config::load_default()?,
        };

        if let Some(ref socket) = self.socket {
            config.target = Target::Unix(socket.clone());
        } else if self.host.is_some() || self.port.is_some() {
            let (host, port) = match config.target {
                Target::Tcp { host, port } => (host, port),
                Target::Unix(_) => (DEFAULT_HOST.to_string(), DEFAULT_PORT),
            };
            config.target = Target::tcp(
                self.host.clone().unwrap_or(host),
                self.port.unwrap_or(port),
            );
        }

        if let Some(secs) = self.timeout {
            config.timeout = Some(parse_timeout(secs)?);
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Check the daemon answers PONG
    Ping,
    /// Print daemon and signature database version
    Version,
    /// Reload the signature databases
    Reload,
    /// Stop the daemon
    Shutdown,
    /// Scan a file or directory, stopping at the first detection
    Scan {
        /// Path as seen by the daemon
        path: PathBuf,
    },
    /// Scan a file or directory, continuing past detections
    Contscan {
        /// Path as seen by the daemon
        path: PathBuf,
    },
    /// Scan a file or directory with the daemon's worker threads
    Multiscan {
        /// Path as seen by the daemon
        path: PathBuf,
    },
    /// Stream data to the daemon for scanning (stdin when no file is given)
    Instream {
        /// Local file to upload
        file: Option<PathBuf>,
        /// Upload the EICAR test signature
        #[arg(long, conflicts_with = "file")]
        eicar: bool,
    },
    /// Print daemon statistics
    Stats,
}
