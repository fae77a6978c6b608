//! Socket transport for clamd: one connection carries exactly one command.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use clamd_core::{ClamdError, Target};
use interprocess::local_socket::{prelude::*, GenericFilePath};
use tracing::trace;

enum Stream {
    Local(interprocess::local_socket::Stream),
    Tcp(TcpStream),
}

impl Stream {
    fn connect(target: &Target, timeout: Option<Duration>) -> io::Result<Self> {
        match target {
            Target::Unix(path) => Self::connect_local(path, timeout),
            Target::Tcp { host, port } => Self::connect_tcp(host, *port, timeout),
        }
    }

    fn connect_local(path: &Path, timeout: Option<Duration>) -> io::Result<Self> {
        let name = path
            .to_path_buf()
            .to_fs_name::<GenericFilePath>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let inner = interprocess::local_socket::Stream::connect(name)?;
        inner.set_recv_timeout(timeout)?;
        inner.set_send_timeout(timeout)?;
        Ok(Self::Local(inner))
    }

    fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<Self> {
        let inner = match timeout {
            None => TcpStream::connect((host, port))?,
            Some(timeout) => {
                let mut last_err = None;
                let mut connected = None;
                for addr in (host, port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                match connected {
                    Some(stream) => stream,
                    None => {
                        return Err(last_err.unwrap_or_else(|| {
                            io::Error::new(
                                io::ErrorKind::NotFound,
                                "host resolved to no addresses",
                            )
                        }))
                    }
                }
            }
        };
        inner.set_read_timeout(timeout)?;
        inner.set_write_timeout(timeout)?;
        Ok(Self::Tcp(inner))
    }

    fn close(&self) {
        if let Self::Tcp(inner) = self {
            let _ = inner.shutdown(Shutdown::Both);
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Local(inner) => inner.read(buf),
            Self::Tcp(inner) => inner.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Local(inner) => inner.write(buf),
            Self::Tcp(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Local(inner) => inner.flush(),
            Self::Tcp(inner) => inner.flush(),
        }
    }
}

/// A freshly opened connection that has not carried a command yet.
pub struct Connection {
    stream: Stream,
    target: String,
}

impl Connection {
    /// Connect to clamd, applying `timeout` to connect (TCP), reads and writes.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` if the socket path does not exist,
    /// the connection is refused, or the connect times out.
    pub fn open(target: &Target, timeout: Option<Duration>) -> Result<Self, ClamdError> {
        let stream =
            Stream::connect(target, timeout).map_err(|e| ClamdError::connection(target, e))?;
        trace!(%target, ?timeout, "connected");
        Ok(Self {
            stream,
            target: target.to_string(),
        })
    }

    /// Send the one command this connection is for. Consumes the connection,
    /// so a second command needs a new one.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` if the write fails.
    pub fn send_command(mut self, frame: &[u8]) -> Result<Exchange, ClamdError> {
        let sent = self
            .stream
            .write_all(frame)
            .and_then(|()| self.stream.flush());
        if let Err(e) = sent {
            self.stream.close();
            return Err(ClamdError::connection(&self.target, e));
        }
        trace!(target = %self.target, len = frame.len(), "command sent");
        Ok(Exchange {
            reader: BufReader::new(self.stream),
            target: self.target,
        })
    }
}

/// The request/reply phase of a connection. Closed on drop.
pub struct Exchange {
    reader: BufReader<Stream>,
    target: String,
}

impl Exchange {
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Wrap an I/O failure as a connection error for this target.
    #[must_use]
    pub fn connection_error(&self, source: io::Error) -> ClamdError {
        ClamdError::connection(&self.target, source)
    }

    /// Read one reply line with trailing whitespace removed.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` on a read failure or timeout, or if the
    /// daemon closes the stream before sending anything.
    pub fn receive_line(&mut self) -> Result<String, ClamdError> {
        let mut buf = Vec::new();
        let n = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| self.connection_error(e))?;
        if n == 0 {
            return Err(self.connection_error(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before reply",
            )));
        }
        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        trace!(target = %self.target, %line, "reply line");
        Ok(line)
    }

    /// Read until the daemon closes the stream.
    ///
    /// # Errors
    ///
    /// Returns `ClamdError::Connection` on a read failure or timeout.
    pub fn receive_to_end(&mut self) -> Result<String, ClamdError> {
        let mut buf = Vec::new();
        self.reader
            .read_to_end(&mut buf)
            .map_err(|e| self.connection_error(e))?;
        trace!(target = %self.target, len = buf.len(), "reply complete");
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl Write for Exchange {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reader.get_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.reader.get_mut().flush()
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.reader.get_ref().close();
        trace!(target = %self.target, "connection closed");
    }
}
