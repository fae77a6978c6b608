//! INSTREAM upload: scan bytes sent over the control connection.

use std::io::{self, Read, Write};

use clamd_core::{ClamdError, ScanResults};
use tracing::{trace, warn};

use crate::protocol::{self, INSTREAM_SIZE_LIMIT_REPLY};
use crate::transport::Exchange;

/// Which side of an upload failed.
#[derive(Debug)]
pub enum UploadError {
    /// Reading the caller's source failed.
    Source(io::Error),
    /// Writing to the daemon failed.
    Sink(io::Error),
}

/// Copy `source` to `sink` as length-prefixed chunks of at most `chunk_size`
/// bytes, then write the zero-length terminator. Returns the payload size.
///
/// # Errors
///
/// Returns `UploadError::Source` if reading fails and `UploadError::Sink` if
/// writing fails.
pub fn upload<R: Read, W: Write>(
    source: &mut R,
    sink: &mut W,
    chunk_size: usize,
) -> Result<u64, UploadError> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(UploadError::Source(e)),
        };
        protocol::write_chunk(sink, &buf[..n]).map_err(UploadError::Sink)?;
        total += n as u64;
        trace!(len = n, total, "chunk sent");
    }
    protocol::write_terminator(sink).map_err(UploadError::Sink)?;
    Ok(total)
}

/// Interpret the single reply line that ends an INSTREAM exchange.
///
/// # Errors
///
/// Returns `ClamdError::BufferTooLong` for the size-limit rejection and
/// `ClamdError::Response` for anything outside the scan line grammar.
pub fn interpret_reply(line: &str) -> Result<ScanResults, ClamdError> {
    if line == INSTREAM_SIZE_LIMIT_REPLY {
        warn!("daemon rejected stream: exceeds StreamMaxLength");
        return Err(ClamdError::BufferTooLong(line.to_string()));
    }
    let entry = protocol::parse_scan_line(line)?;
    Ok(ScanResults::from_iter([entry]))
}

/// Upload `source` over an exchange that has already sent `nINSTREAM` and read
/// the verdict.
///
/// The caller must keep `chunk_size` below the daemon's `StreamMaxLength`.
///
/// # Errors
///
/// Returns `ClamdError::Input` if the source fails, `ClamdError::BufferTooLong`
/// if the daemon rejects the size (including when it hangs up mid-upload),
/// and `ClamdError::Connection` or `ClamdError::Response` otherwise.
pub fn stream_scan<R: Read>(
    exchange: &mut Exchange,
    source: &mut R,
    chunk_size: usize,
) -> Result<ScanResults, ClamdError> {
    match upload(source, &mut *exchange, chunk_size) {
        Ok(total) => trace!(total, "stream uploaded"),
        Err(UploadError::Source(e)) => return Err(ClamdError::Input(e)),
        Err(UploadError::Sink(e)) => {
            // clamd answers an oversize stream and closes; the verdict may
            // still be readable after the write fails.
            return match exchange.receive_line() {
                Ok(line) if line == INSTREAM_SIZE_LIMIT_REPLY => interpret_reply(&line),
                _ => Err(exchange.connection_error(e)),
            };
        }
    }
    let line = exchange.receive_line()?;
    interpret_reply(&line)
}
