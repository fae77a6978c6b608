use std::io;

pub type Result<T> = eyre::Result<T>;

#[derive(Debug, thiserror::Error)]
pub enum ClamdError {
    /// Connect, send or receive failed, or the daemon hung up early.
    #[error("connection to clamd at {target} failed: {source}")]
    Connection {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The daemon replied with an `ERROR` line or something outside the grammar.
    #[error("clamd response error: {0}")]
    Response(String),

    /// INSTREAM payload exceeded the daemon's `StreamMaxLength`.
    #[error("clamd rejected stream: {0}")]
    BufferTooLong(String),

    #[error("failed to read scan input: {0}")]
    Input(#[source] io::Error),
}

impl ClamdError {
    pub fn connection(target: impl ToString, source: io::Error) -> Self {
        Self::Connection {
            target: target.to_string(),
            source,
        }
    }

    /// True for `Response` and its `BufferTooLong` refinement.
    #[must_use]
    pub const fn is_response_error(&self) -> bool {
        matches!(self, Self::Response(_) | Self::BufferTooLong(_))
    }

    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    #[must_use]
    pub const fn is_buffer_too_long(&self) -> bool {
        matches!(self, Self::BufferTooLong(_))
    }
}
