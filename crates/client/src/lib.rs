//! Synchronous client for the clamd scanning daemon.
//!
//! Each call opens a connection to clamd (local socket or TCP), sends one
//! command, reads the reply and closes the connection.

pub mod client;
pub mod instream;
pub mod protocol;
pub mod transport;

pub use clamd_core::{eicar, ClamdError, Config, ScanEntry, ScanResults, ScanStatus, Target};
pub use client::Client;
pub use protocol::{Command, InstreamCodec};
