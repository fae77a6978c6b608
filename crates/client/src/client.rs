//! Client facade. Every call is one connect-send-receive-close transaction;
//! the client itself holds only immutable settings.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clamd_core::config::DEFAULT_CHUNK_SIZE;
use clamd_core::{ClamdError, Config, ScanResults, Target};
use tracing::{debug, instrument, trace};

use crate::instream;
use crate::protocol::{self, Command};
use crate::transport::{Connection, Exchange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    target: Target,
    timeout: Option<Duration>,
    chunk_size: usize,
}

impl Client {
    #[must_use]
    pub const fn new(target: Target) -> Self {
        Self {
            target,
            timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Client for a local socket, e.g. `/var/run/clamav/clamd.ctl`.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(Target::unix(path))
    }

    /// Client for a TCP listener, e.g. `127.0.0.1:3310`.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(Target::tcp(host, port))
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            target: config.target.clone(),
            timeout: config.timeout,
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Timeout applied to each connect, read and write. A zero duration
    /// clears the timeout, since sockets cannot wait for zero time.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// INSTREAM chunk size; must stay below the daemon's `StreamMaxLength`.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns `true` when the daemon answers `PONG`.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` if the daemon is unreachable or
    /// replies with anything other than `PONG`.
    #[instrument(skip(self), fields(command = "PING", target = %self.target))]
    pub fn ping(&self) -> Result<bool, ClamdError> {
        let mut exchange = self.send(Command::Ping, &[])?;
        let reply = exchange.receive_line()?;
        if reply == "PONG" {
            debug!("daemon alive");
            Ok(true)
        } else {
            Err(exchange.connection_error(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected reply to PING: {reply:?}"),
            )))
        }
    }

    /// Daemon and signature database version string.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` on transport failure and
    /// `ClamdError::Response` if the daemon answers with an error.
    #[instrument(skip(self), fields(command = "VERSION", target = %self.target))]
    pub fn version(&self) -> Result<String, ClamdError> {
        self.scalar_command(Command::Version)
    }

    /// Ask the daemon to reload its signature databases. Normally `RELOADING`.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` on transport failure and
    /// `ClamdError::Response` if the daemon answers with an error.
    #[instrument(skip(self), fields(command = "RELOAD", target = %self.target))]
    pub fn reload(&self) -> Result<String, ClamdError> {
        self.scalar_command(Command::Reload)
    }

    /// Tell the daemon to exit. Any reply is ignored.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` if the command cannot be delivered.
    #[instrument(skip(self), fields(command = "SHUTDOWN", target = %self.target))]
    pub fn shutdown(&self) -> Result<(), ClamdError> {
        self.send(Command::Shutdown, &[])?;
        debug!("shutdown requested");
        Ok(())
    }

    /// `SCAN`: the daemon stops at the first detection or error.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Input` if `path` is not valid UTF-8,
    /// `ClamdError::Connection` on transport failure and
    /// `ClamdError::Response` if a reply line is malformed.
    #[instrument(skip(self, path), fields(command = "SCAN", target = %self.target, path = %path.as_ref().display()))]
    pub fn scan(&self, path: impl AsRef<Path>) -> Result<ScanResults, ClamdError> {
        self.file_system_scan(Command::Scan, path.as_ref())
    }

    /// `CONTSCAN`: the daemon continues past detections and errors.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Input` if `path` is not valid UTF-8,
    /// `ClamdError::Connection` on transport failure and
    /// `ClamdError::Response` if a reply line is malformed.
    #[instrument(skip(self, path), fields(command = "CONTSCAN", target = %self.target, path = %path.as_ref().display()))]
    pub fn contscan(&self, path: impl AsRef<Path>) -> Result<ScanResults, ClamdError> {
        self.file_system_scan(Command::ContScan, path.as_ref())
    }

    /// `MULTISCAN`: like `CONTSCAN`, using the daemon's worker threads.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Input` if `path` is not valid UTF-8,
    /// `ClamdError::Connection` on transport failure and
    /// `ClamdError::Response` if a reply line is malformed.
    #[instrument(skip(self, path), fields(command = "MULTISCAN", target = %self.target, path = %path.as_ref().display()))]
    pub fn multiscan(&self, path: impl AsRef<Path>) -> Result<ScanResults, ClamdError> {
        self.file_system_scan(Command::MultiScan, path.as_ref())
    }

    /// Scan bytes read from `source` via INSTREAM. A clean stream yields a
    /// `stream: OK` entry, not an empty result.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::BufferTooLong` if the payload exceeds the daemon's
    /// `StreamMaxLength`, `ClamdError::Input` if `source` fails, and
    /// `ClamdError::Connection` / `ClamdError::Response` otherwise.
    #[instrument(skip(self, source), fields(command = "INSTREAM", target = %self.target, chunk_size = self.chunk_size))]
    pub fn instream<R: Read>(&self, mut source: R) -> Result<ScanResults, ClamdError> {
        let mut exchange = self.send(Command::Instream, &[])?;
        let results = instream::stream_scan(&mut exchange, &mut source, self.chunk_size)?;
        debug!(entries = results.len(), "stream scanned");
        Ok(results)
    }

    /// Raw multi-line `STATS` output, unparsed.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` on transport failure.
    #[instrument(skip(self), fields(command = "STATS", target = %self.target))]
    pub fn stats(&self) -> Result<String, ClamdError> {
        let mut exchange = self.send(Command::Stats, &[])?;
        exchange.receive_to_end()
    }

    fn send(&self, command: Command, args: &[&str]) -> Result<Exchange, ClamdError> {
        trace!(command = command.as_str(), "sending");
        let connection = Connection::open(&self.target, self.timeout)?;
        connection.send_command(&protocol::encode_command(command, args))
    }

    fn scalar_command(&self, command: Command) -> Result<String, ClamdError> {
        let mut exchange = self.send(command, &[])?;
        let line = exchange.receive_line()?;
        protocol::parse_scalar_reply(&line)
    }

    fn file_system_scan(&self, command: Command, path: &Path) -> Result<ScanResults, ClamdError> {
        let path = path.to_str().ok_or_else(|| {
            ClamdError::Input(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path is not valid UTF-8: {}", path.display()),
            ))
        })?;
        let mut exchange = self.send(command, &[path])?;
        let reply = exchange.receive_to_end()?;
        let results = protocol::parse_scan_reply(&reply)?;
        debug!(
            command = command.as_str(),
            entries = results.len(),
            found = results.found().count(),
            "scan complete"
        );
        Ok(results)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Target::default())
    }
}
