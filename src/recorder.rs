use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::HoneypotError;
use crate::models::RequestRecord;

// File inside each identity directory holding its JSON lines
pub const RECORD_FILE: &str = "client_info.json";

// Append-only, per-IP request logs: <root>/<ip>/client_info.json
#[derive(Clone)]
pub struct RequestRecorder {
    root: PathBuf,
    // serialises appends to the same IP within this process
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl RequestRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self, ip: &str) -> Result<PathBuf, HoneypotError> {
        Ok(self.root.join(storage_key(ip)?).join(RECORD_FILE))
    }

    // Append one record as one line, creating the IP's directory on first write
    pub async fn record(&self, record: &RequestRecord) -> Result<(), HoneypotError> {
        let path = self.log_path(&record.ip)?;

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let lock = self.locks.entry(record.ip.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            append_line(&path, &line).await
        };

        // forget the lock once nobody else holds or waits on it
        drop(lock);
        self.locks.remove_if(&record.ip, |_, l| Arc::strong_count(l) == 1);

        result
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.len()
    }
}

async fn append_line(path: &Path, line: &[u8]) -> Result<(), HoneypotError> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| HoneypotError::storage(dir, e))?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| HoneypotError::storage(path, e))?;

    // single write of the whole line so other processes never see half a record
    file.write_all(line)
        .await
        .map_err(|e| HoneypotError::storage(path, e))?;
    file.flush()
        .await
        .map_err(|e| HoneypotError::storage(path, e))?;

    Ok(())
}

// Records read back from one log, plus how many lines were unusable
#[derive(Debug, Default)]
pub struct RecordLog {
    pub records: Vec<RequestRecord>,
    pub skipped: usize,
}

pub fn load_records(path: &Path) -> Result<RecordLog, HoneypotError> {
    let raw = std::fs::read(path).map_err(|e| HoneypotError::storage(path, e))?;
    Ok(parse_records(&raw))
}

// One record per line; malformed lines are skipped, never fatal
pub fn parse_records(raw: &[u8]) -> RecordLog {
    let mut log = RecordLog::default();

    for (idx, line) in raw.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<RequestRecord>(line) {
            Ok(record) => log.records.push(record),
            Err(source) => {
                let err = HoneypotError::MalformedRecord { line: idx + 1, source };
                debug!("{err}");
                log.skipped += 1;
            }
        }
    }

    log
}

// Every IP that has a request log under the root, sorted by name.
// Entries that are not directories, or have no log file, are ignored.
pub fn list_identities(root: &Path) -> Result<Vec<(String, PathBuf)>, HoneypotError> {
    let entries = std::fs::read_dir(root).map_err(|e| HoneypotError::storage(root, e))?;
    Ok(collect_identities(entries.map(|entry| entry.map(|e| e.path()))))
}

// An unreadable entry only costs that entry
fn collect_identities(
    entries: impl IntoIterator<Item = std::io::Result<PathBuf>>,
) -> Vec<(String, PathBuf)> {
    let mut identities = Vec::new();
    for entry in entries {
        let dir = match entry {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable log directory entry");
                continue;
            }
        };
        if !dir.is_dir() {
            continue;
        }
        let log = dir.join(RECORD_FILE);
        if !log.exists() {
            continue;
        }
        let Some(name) = dir.file_name() else {
            continue;
        };
        let ip = name.to_string_lossy().into_owned();
        identities.push((ip, log));
    }

    identities.sort_by(|a, b| a.0.cmp(&b.0));
    identities
}

// The IP doubles as a directory name, so refuse anything that could escape the root
fn storage_key(ip: &str) -> Result<&str, HoneypotError> {
    let bad = ip.is_empty()
        || ip == "."
        || ip == ".."
        || ip.contains(['/', '\\', '\0']);
    if bad {
        return Err(HoneypotError::InvalidIdentity(ip.to_string()));
    }
    Ok(ip)
}
