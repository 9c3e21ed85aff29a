mod health;
mod index;
mod metrics;

pub use health::health_handler;
pub use index::index_handler;
pub use metrics::metrics_handler;
