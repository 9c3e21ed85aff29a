use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::blocklist::Blocklist;
use crate::error::HoneypotError;
use crate::models::{RequestRecord, TIMESTAMP_FORMAT};
use crate::recorder::{list_identities, load_records};

// Only these method subsets are rate checked, each on its own
pub const SCANNED_METHODS: [&str; 2] = ["GET", "POST"];

pub const DEFAULT_THRESHOLD: usize = 20;

// One second in which an IP sent more than `threshold` requests of one method
#[derive(Debug, Clone, PartialEq)]
pub struct RateViolation {
    pub ip: String,
    pub method: String,
    pub second: NaiveDateTime,
    pub count: usize,
    pub records: Vec<RequestRecord>,
}

// Group `method` records by the second they arrived in and return every
// bucket holding strictly more than `threshold` of them, oldest first.
pub fn find_violations(
    ip: &str,
    method: &str,
    records: &[RequestRecord],
    threshold: usize,
) -> Vec<RateViolation> {
    let mut by_second: BTreeMap<NaiveDateTime, Vec<&RequestRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.method == method) {
        by_second.entry(record.second()).or_default().push(record);
    }

    by_second
        .into_iter()
        .filter(|(_, bucket)| bucket.len() > threshold)
        .map(|(second, bucket)| RateViolation {
            ip: ip.to_string(),
            method: method.to_string(),
            second,
            count: bucket.len(),
            records: bucket.into_iter().cloned().collect(),
        })
        .collect()
}

// Outcome of one pass over every request log
#[derive(Debug, Default)]
pub struct ScanReport {
    pub identities_scanned: usize,
    pub violations: Vec<RateViolation>,
    pub newly_blocked: Vec<String>,
    pub failures: Vec<(String, HoneypotError)>,
    pub skipped_lines: usize,
}

impl ScanReport {
    pub fn log_summary(&self) {
        info!(
            identities = self.identities_scanned,
            violations = self.violations.len(),
            newly_blocked = self.newly_blocked.len(),
            failures = self.failures.len(),
            skipped_lines = self.skipped_lines,
            "Scan pass complete"
        );
    }
}

#[derive(Clone, Debug)]
pub struct RateScanner {
    log_root: PathBuf,
    blocklist: Blocklist,
    threshold: usize,
}

impl RateScanner {
    // Fails if the log root is missing: the honeypot has never run, nothing to scan
    pub fn new(
        log_root: impl Into<PathBuf>,
        blocklist: Blocklist,
        threshold: usize,
    ) -> Result<Self, HoneypotError> {
        let log_root = log_root.into();
        if !log_root.is_dir() {
            return Err(HoneypotError::MissingLogRoot(log_root));
        }
        Ok(Self {
            log_root,
            blocklist,
            threshold,
        })
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    // Scan every IP's log once. Problems with one IP are collected in the
    // report; only failing to list the root aborts the pass.
    pub fn scan_pass(&self) -> Result<ScanReport, HoneypotError> {
        info!("Checking logs... Time: {}", Local::now().format(TIMESTAMP_FORMAT));

        let mut report = ScanReport::default();
        for (ip, log_path) in list_identities(&self.log_root)? {
            report.identities_scanned += 1;
            if let Err(e) = self.scan_identity(&ip, &log_path, &mut report) {
                error!("Error processing logs for IP {ip}: {e}");
                report.failures.push((ip, e));
            }
        }
        Ok(report)
    }

    fn scan_identity(
        &self,
        ip: &str,
        log_path: &Path,
        report: &mut ScanReport,
    ) -> Result<(), HoneypotError> {
        let log = load_records(log_path)?;
        report.skipped_lines += log.skipped;
        if log.records.is_empty() {
            return Ok(());
        }

        // every subset is evaluated even if blocking failed for an earlier one
        let mut block_error = None;
        for method in SCANNED_METHODS {
            let violations = find_violations(ip, method, &log.records, self.threshold);
            if violations.is_empty() {
                continue;
            }

            warn!("Rate limit violations detected for IP {ip} - {method} requests:");
            for v in &violations {
                warn!("  - {} {} requests at {}", v.count, method, v.second.format(TIMESTAMP_FORMAT));
            }
            report.violations.extend(violations);

            match self.blocklist.block(ip) {
                Ok(true) => {
                    warn!("[ALERT] IP {ip} has been added to {}", self.blocklist.path().display());
                    report.newly_blocked.push(ip.to_string());
                }
                Ok(false) => {}
                Err(e) => {
                    block_error.get_or_insert(e);
                }
            }
        }

        match block_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // Scan, then wait `every`, forever. Pass failures are logged and the loop goes on.
    pub async fn run(self, every: Duration) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Rate scanner started (root: {}, threshold: {}/s, interval: {:?})",
            self.log_root.display(),
            self.threshold,
            every
        );

        loop {
            ticker.tick().await;

            let scanner = self.clone();
            match tokio::task::spawn_blocking(move || scanner.scan_pass()).await {
                Ok(Ok(report)) => report.log_summary(),
                Ok(Err(e)) => error!("Scan pass failed: {e}"),
                Err(e) => error!("Scan pass aborted: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RECORD_FILE;
    use axum::http::HeaderMap;
    use std::io::Write;

    const T: &str = "2024-05-01 10:00:00";
    const T_PLUS_1: &str = "2024-05-01 10:00:01";

    fn records(ip: &str, method: &str, at: &str, n: usize) -> Vec<RequestRecord> {
        let at = NaiveDateTime::parse_from_str(at, TIMESTAMP_FORMAT).unwrap();
        (0..n)
            .map(|i| RequestRecord::capture_at(ip, method, &format!("/{i}"), &HeaderMap::new(), at))
            .collect()
    }

    fn write_log(root: &Path, ip: &str, records: &[RequestRecord]) {
        let dir = root.join(ip);
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(RECORD_FILE))
            .unwrap();
        for r in records {
            writeln!(file, "{}", serde_json::to_string(r).unwrap()).unwrap();
        }
    }

    fn setup() -> (tempfile::TempDir, RateScanner) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("logs");
        std::fs::create_dir(&root).unwrap();
        let blocklist = Blocklist::new(dir.path().join("blacklist.txt"));
        let scanner = RateScanner::new(root, blocklist, DEFAULT_THRESHOLD).unwrap();
        (dir, scanner)
    }

    #[test]
    fn burst_in_one_second_is_flagged_and_blocked() {
        let (_dir, scanner) = setup();
        write_log(scanner.log_root(), "1.2.3.4", &records("1.2.3.4", "GET", T, 25));

        let report = scanner.scan_pass().unwrap();

        assert_eq!(report.violations.len(), 1);
        let v = &report.violations[0];
        assert_eq!(v.ip, "1.2.3.4");
        assert_eq!(v.method, "GET");
        assert_eq!(v.count, 25);
        assert_eq!(v.records.len(), 25);
        assert_eq!(v.second.format(TIMESTAMP_FORMAT).to_string(), T);
        assert_eq!(report.newly_blocked, vec!["1.2.3.4".to_string()]);
        assert!(scanner.blocklist.load().unwrap().contains("1.2.3.4"));
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        assert!(find_violations("a", "GET", &records("a", "GET", T, 20), 20).is_empty());
        let over = find_violations("a", "GET", &records("a", "GET", T, 21), 20);
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].count, 21);
    }

    #[test]
    fn at_threshold_nothing_is_blocked() {
        let (_dir, scanner) = setup();
        write_log(scanner.log_root(), "1.2.3.4", &records("1.2.3.4", "GET", T, 20));

        let report = scanner.scan_pass().unwrap();

        assert!(report.violations.is_empty());
        assert!(report.newly_blocked.is_empty());
        assert!(scanner.blocklist.load().unwrap().is_empty());
    }

    #[test]
    fn get_and_post_are_checked_independently() {
        let (_dir, scanner) = setup();
        let mut all = records("1.2.3.4", "GET", T, 25);
        all.extend(records("1.2.3.4", "POST", T, 25));
        write_log(scanner.log_root(), "1.2.3.4", &all);

        let report = scanner.scan_pass().unwrap();

        let methods: Vec<&str> = report.violations.iter().map(|v| v.method.as_str()).collect();
        assert_eq!(methods, vec!["GET", "POST"]);
        assert!(report.violations.iter().all(|v| v.count == 25));
        // blocked twice in one pass, stored once
        assert_eq!(report.newly_blocked, vec!["1.2.3.4".to_string()]);
        let raw = std::fs::read_to_string(scanner.blocklist.path()).unwrap();
        assert_eq!(raw, "1.2.3.4\n");
    }

    #[test]
    fn mixed_methods_do_not_add_up() {
        // 15 GET + 15 POST in the same second: 30 total but neither subset is over
        let mut all = records("1.2.3.4", "GET", T, 15);
        all.extend(records("1.2.3.4", "POST", T, 15));
        for method in SCANNED_METHODS {
            assert!(find_violations("1.2.3.4", method, &all, 20).is_empty());
        }
    }

    #[test]
    fn other_methods_are_ignored() {
        let (_dir, scanner) = setup();
        write_log(scanner.log_root(), "1.2.3.4", &records("1.2.3.4", "PUT", T, 40));

        let report = scanner.scan_pass().unwrap();

        assert!(report.violations.is_empty());
        assert!(scanner.blocklist.load().unwrap().is_empty());
    }

    #[test]
    fn buckets_do_not_span_seconds() {
        let (_dir, scanner) = setup();
        let mut all = records("1.2.3.4", "GET", T, 15);
        all.extend(records("1.2.3.4", "GET", T_PLUS_1, 15));
        write_log(scanner.log_root(), "1.2.3.4", &all);

        let report = scanner.scan_pass().unwrap();

        assert!(report.violations.is_empty());
        assert!(scanner.blocklist.load().unwrap().is_empty());
    }

    #[test]
    fn already_blocked_ip_is_not_reported_as_new() {
        let (_dir, scanner) = setup();
        scanner.blocklist.block("1.2.3.4").unwrap();
        write_log(scanner.log_root(), "1.2.3.4", &records("1.2.3.4", "GET", T, 25));

        let report = scanner.scan_pass().unwrap();

        assert_eq!(report.violations.len(), 1);
        assert!(report.newly_blocked.is_empty());
        assert_eq!(scanner.blocklist.load().unwrap().len(), 1);
    }

    #[test]
    fn malformed_line_does_not_hide_the_burst() {
        let (_dir, scanner) = setup();
        let burst = records("1.2.3.4", "GET", T, 25);
        write_log(scanner.log_root(), "1.2.3.4", &burst[..10]);
        let path = scanner.log_root().join("1.2.3.4").join(RECORD_FILE);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        write_log(scanner.log_root(), "1.2.3.4", &burst[10..]);

        let report = scanner.scan_pass().unwrap();

        assert_eq!(report.skipped_lines, 1);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].count, 25);
    }

    #[test]
    fn one_broken_identity_does_not_stop_the_pass() {
        let (_dir, scanner) = setup();
        // the log "file" is a directory, so reading it fails
        std::fs::create_dir_all(scanner.log_root().join("0.0.0.1").join(RECORD_FILE)).unwrap();
        write_log(scanner.log_root(), "9.9.9.9", &records("9.9.9.9", "POST", T, 30));

        let report = scanner.scan_pass().unwrap();

        assert_eq!(report.identities_scanned, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "0.0.0.1");
        assert_eq!(report.newly_blocked, vec!["9.9.9.9".to_string()]);
    }

    #[test]
    fn unwritable_blocklist_is_a_per_identity_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("logs");
        std::fs::create_dir(&root).unwrap();
        // a directory where the blocklist file should be
        let blocklist = Blocklist::new(dir.path());
        let scanner = RateScanner::new(&root, blocklist, DEFAULT_THRESHOLD).unwrap();
        write_log(&root, "1.2.3.4", &records("1.2.3.4", "GET", T, 25));

        let report = scanner.scan_pass().unwrap();

        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].1,
            HoneypotError::StorageUnavailable { .. }
        ));
    }

    #[test]
    fn failed_get_block_still_reports_post() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("logs");
        std::fs::create_dir(&root).unwrap();
        let scanner = RateScanner::new(&root, Blocklist::new(dir.path()), DEFAULT_THRESHOLD).unwrap();
        let mut all = records("1.2.3.4", "GET", T, 25);
        all.extend(records("1.2.3.4", "POST", T_PLUS_1, 30));
        write_log(&root, "1.2.3.4", &all);

        let report = scanner.scan_pass().unwrap();

        let found: Vec<(&str, usize)> = report
            .violations
            .iter()
            .map(|v| (v.method.as_str(), v.count))
            .collect();
        assert_eq!(found, vec![("GET", 25), ("POST", 30)]);
        // one failure for the identity, not one per subset
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "1.2.3.4");
    }

    #[test]
    fn missing_log_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocklist = Blocklist::new(dir.path().join("blacklist.txt"));
        let err = RateScanner::new(dir.path().join("logs"), blocklist, DEFAULT_THRESHOLD).unwrap_err();
        assert!(matches!(err, HoneypotError::MissingLogRoot(_)));
    }
}
