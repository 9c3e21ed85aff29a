use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

// CLI arguments for the honeypot web endpoint
#[derive(Parser, Debug, Clone)]
#[command(name = "honeypot-gate")]
#[command(about = "Honeypot endpoint that records every visitor and refuses blacklisted IPs")]
pub struct ServerArgs {
    // Port to run the server on
    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    // Interface to bind, all interfaces by default
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: String,

    // Root directory of the per-IP request logs
    #[arg(short, long, default_value = "logs")]
    pub log_root: PathBuf,

    // Blacklist file, one IP per line
    #[arg(long, default_value = "blacklist.txt")]
    pub blacklist: PathBuf,

    // Human readable process log
    #[arg(long, default_value = "honeypot.log")]
    pub process_log: PathBuf,
}

impl ServerArgs {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

// CLI arguments for the offline rate scanner
#[derive(Parser, Debug, Clone)]
#[command(name = "rate-scanner")]
#[command(about = "Scans honeypot request logs and blacklists IPs that exceed the per-second rate")]
pub struct ScannerArgs {
    // Root directory of the per-IP request logs
    #[arg(short, long, default_value = "logs")]
    pub log_root: PathBuf,

    // Blacklist file, one IP per line
    #[arg(long, default_value = "blacklist.txt")]
    pub blacklist: PathBuf,

    // Max requests allowed within one second (strictly more is a violation)
    #[arg(short, long, default_value_t = 20)]
    pub threshold: usize,

    // Seconds between scan passes
    #[arg(short, long, default_value_t = 5)]
    pub interval: u64,

    // Run a single pass and exit
    #[arg(long)]
    pub once: bool,
}

impl ScannerArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.threshold == 0 {
            bail!("threshold must be greater than 0");
        }
        if self.interval == 0 {
            bail!("interval must be greater than 0");
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}
