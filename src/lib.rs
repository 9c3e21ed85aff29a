//! Honeypot endpoint with an offline rate scanner.
//!
//! The web side ([`server`]) records every allowed request into per-IP JSON
//! line logs ([`recorder`]) and refuses IPs listed in the blacklist
//! ([`blocklist`]). The [`scanner`] runs as its own process, buckets each
//! IP's GET and POST requests by second and blacklists any IP that went over
//! the threshold. The two sides only share the files on disk.

pub mod blocklist;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod recorder;
pub mod scanner;
pub mod server;
pub mod state;

pub use blocklist::Blocklist;
pub use error::HoneypotError;
pub use models::RequestRecord;
pub use recorder::RequestRecorder;
pub use scanner::{RateScanner, RateViolation, ScanReport};
