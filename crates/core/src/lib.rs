//! Core clamd client types - scan results, errors, configuration.
//! No sockets, no protocol framing.

pub mod config;
pub mod eicar;
pub mod error;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub use config::{Config, Target};
pub use eicar::eicar;
pub use error::{ClamdError, Result};

/// Per-path verdict reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanStatus {
    Ok,
    Found,
    Error,
}

impl ScanStatus {
    /// Wire token as clamd prints it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Found => "FOUND",
            Self::Error => "ERROR",
        }
    }

    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Ok)
    }

    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = ClamdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Self::Ok),
            "FOUND" => Ok(Self::Found),
            "ERROR" => Ok(Self::Error),
            other => Err(ClamdError::Response(format!("unknown scan status {other:?}"))),
        }
    }
}

/// One result line: path, status, and the signature name (FOUND) or message (ERROR).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    pub path: String,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ScanEntry {
    #[must_use]
    pub fn new(path: impl Into<String>, status: ScanStatus, detail: Option<String>) -> Self {
        Self {
            path: path.into(),
            status,
            detail,
        }
    }

    /// Signature name, when the entry is a detection.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        if self.status.is_found() {
            self.detail.as_deref()
        } else {
            None
        }
    }
}

/// Results of one scan call keyed by reported path. A repeated path overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScanResults {
    entries: BTreeMap<String, ScanEntry>,
}

impl ScanResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: ScanEntry) -> Option<ScanEntry> {
        self.entries.insert(entry.path.clone(), entry)
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&ScanEntry> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScanEntry> {
        self.entries.values()
    }

    /// Entries with `FOUND` status.
    pub fn found(&self) -> impl Iterator<Item = &ScanEntry> {
        self.iter().filter(|e| e.status.is_found())
    }

    /// No entry was reported as `FOUND` or `ERROR`.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.iter().all(|e| e.status.is_clean())
    }
}

impl FromIterator<ScanEntry> for ScanResults {
    fn from_iter<I: IntoIterator<Item = ScanEntry>>(iter: I) -> Self {
        let mut results = Self::new();
        for entry in iter {
            results.insert(entry);
        }
        results
    }
}

impl IntoIterator for ScanResults {
    type Item = ScanEntry;
    type IntoIter = std::collections::btree_map::IntoValues<String, ScanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
