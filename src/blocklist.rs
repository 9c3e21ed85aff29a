use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::HoneypotError;

// Newline separated set of blacklisted IPs, shared between the
// honeypot (reader) and the rate scanner (writer) through the file only.
#[derive(Clone, Debug)]
pub struct Blocklist {
    path: PathBuf,
}

impl Blocklist {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Current persisted set; a missing file is an empty set
    pub fn load(&self) -> Result<HashSet<String>, HoneypotError> {
        Ok(parse_blocklist(&self.read_raw()?))
    }

    fn read_raw(&self) -> Result<Vec<u8>, HoneypotError> {
        match std::fs::read(&self.path) {
            Ok(raw) => Ok(raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(HoneypotError::storage(&self.path, e)),
        }
    }

    // Read fresh on every call so hand edits apply immediately.
    // I/O errors fail open: the IP is treated as not blocked.
    pub async fn is_blocked(&self, ip: &str) -> bool {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => parse_blocklist(&raw).contains(ip),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Blacklist unreadable, allowing request");
                false
            }
        }
    }

    // Append the IP unless already present. Returns true if newly added.
    pub fn block(&self, ip: &str) -> Result<bool, HoneypotError> {
        let ip = ip.trim();
        if ip.is_empty() || ip.contains(['\n', '\r']) {
            return Err(HoneypotError::InvalidIdentity(ip.to_string()));
        }

        let raw = self.read_raw()?;
        if parse_blocklist(&raw).contains(ip) {
            return Ok(false);
        }

        // a hand-edited file may lack the trailing newline
        let line = if raw.is_empty() || raw.ends_with(b"\n") {
            format!("{ip}\n")
        } else {
            format!("\n{ip}\n")
        };

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HoneypotError::storage(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| HoneypotError::storage(&self.path, e))?;

        Ok(true)
    }
}

// One entry per line. Lines are decoded on their own, so a bad byte
// only spoils the line it sits on.
pub fn parse_blocklist(raw: &[u8]) -> HashSet<String> {
    raw.split(|b| *b == b'\n')
        .map(String::from_utf8_lossy)
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
