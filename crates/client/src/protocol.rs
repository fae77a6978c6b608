//! clamd wire protocol.
//!
//! Wire format:
//! - Request: `n<COMMAND>[ <arg>]*\n`
//! - Scalar reply: one line, suffixed with `ERROR` on failure
//! - Scan reply: `<path>: [<signature> ]<OK|FOUND|ERROR>` per line, until EOF
//! - INSTREAM payload: `[4B len_be][payload...]` repeated, then `[4B zero]`

use std::io::{self, Write};
use std::sync::LazyLock;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use clamd_core::{ClamdError, ScanEntry, ScanResults, ScanStatus};
use regex::Regex;
use tokio_util::codec::{Decoder, Encoder};

/// Reply sent when an INSTREAM upload exceeds `StreamMaxLength`.
pub const INSTREAM_SIZE_LIMIT_REPLY: &str = "INSTREAM size limit exceeded. ERROR";

/// Largest INSTREAM chunk the decoder accepts: 64 MB.
pub const MAX_CHUNK_LEN: u32 = 64 * 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Greedy `path` so a path containing `": "` anchors on the trailing status token.
static SCAN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<path>.*): (?:(?P<detail>.+) )?(?P<status>FOUND|OK|ERROR)$")
        .expect("scan line pattern should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Version,
    Reload,
    Shutdown,
    /// Scan a path, stop at the first error or detection.
    Scan,
    /// Scan a path, continue past errors and detections.
    ContScan,
    /// Scan a path with the daemon's thread pool.
    MultiScan,
    Instream,
    Stats,
}

impl Command {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Version => "VERSION",
            Self::Reload => "RELOAD",
            Self::Shutdown => "SHUTDOWN",
            Self::Scan => "SCAN",
            Self::ContScan => "CONTSCAN",
            Self::MultiScan => "MULTISCAN",
            Self::Instream => "INSTREAM",
            Self::Stats => "STATS",
        }
    }
}

/// Frame a command as `n<COMMAND>[ <arg>]*\n`.
///
/// Uses newline termination rather than the `z`/NUL form. Arguments are not
/// escaped; a path containing a newline cannot be expressed.
#[must_use]
pub fn encode_command(command: Command, args: &[&str]) -> Vec<u8> {
    let name = command.as_str();
    let len = 2 + name.len() + args.iter().map(|a| a.len() + 1).sum::<usize>();
    let mut frame = Vec::with_capacity(len);
    frame.push(b'n');
    frame.extend_from_slice(name.as_bytes());
    for arg in args {
        frame.push(b' ');
        frame.extend_from_slice(arg.as_bytes());
    }
    frame.push(b'\n');
    frame
}

/// Interpret a single-line reply (PING, VERSION, RELOAD).
///
/// # Errors
///
/// Returns `ClamdError::Response` with the text before the suffix if the line
/// ends in `ERROR`.
pub fn parse_scalar_reply(line: &str) -> Result<String, ClamdError> {
    let line = line.trim_end();
    match line.strip_suffix("ERROR") {
        Some(message) => Err(ClamdError::Response(message.trim_end().to_string())),
        None => Ok(line.to_string()),
    }
}

/// Parse one `<path>: [<detail> ]<status>` line.
///
/// # Errors
///
/// Returns `ClamdError::Response` carrying the line (minus any `ERROR`
/// suffix) when it matches no known status.
pub fn parse_scan_line(line: &str) -> Result<ScanEntry, ClamdError> {
    let Some(caps) = SCAN_LINE.captures(line) else {
        let message = line.strip_suffix("ERROR").unwrap_or(line).trim_end();
        return Err(ClamdError::Response(message.to_string()));
    };
    let status: ScanStatus = caps["status"].parse()?;
    Ok(ScanEntry::new(
        &caps["path"],
        status,
        caps.name("detail").map(|m| m.as_str().to_string()),
    ))
}

/// Parse a full multi-line scan reply, skipping blank lines.
///
/// # Errors
///
/// Returns `ClamdError::Response` on the first malformed line; entries parsed
/// before it are discarded.
pub fn parse_scan_reply(reply: &str) -> Result<ScanResults, ClamdError> {
    reply
        .split('\n')
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(parse_scan_line)
        .collect()
}

// ─── INSTREAM framing ───────────────────────────────────────────────────────

/// Length-prefixed chunk codec for INSTREAM. An empty chunk is the terminator.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstreamCodec;

impl<'a> Encoder<&'a [u8]> for InstreamCodec {
    type Error = io::Error;

    fn encode(&mut self, chunk: &'a [u8], dst: &mut BytesMut) -> io::Result<()> {
        let len = u32::try_from(chunk.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk too large"))?;
        dst.reserve(LEN_PREFIX + chunk.len());
        dst.put_u32(len);
        dst.put_slice(chunk);
        Ok(())
    }
}

impl Decoder for InstreamCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        if len > MAX_CHUNK_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "chunk exceeds 64MB limit",
            ));
        }

        let total = LEN_PREFIX + len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        Ok(Some(src.split_to(len as usize).freeze()))
    }
}

/// Write one length-prefixed chunk to a sync writer.
///
/// # Errors
///
/// Returns an error if the chunk is over 4 GB or the write fails.
pub fn write_chunk<W: Write>(w: &mut W, chunk: &[u8]) -> io::Result<()> {
    let mut buf = BytesMut::new();
    InstreamCodec.encode(chunk, &mut buf)?;
    w.write_all(&buf)
}

/// Write the zero-length terminator and flush.
///
/// # Errors
///
/// Returns an error if writing to the stream fails.
pub fn write_terminator<W: Write>(w: &mut W) -> io::Result<()> {
    write_chunk(w, &[])?;
    w.flush()
}
