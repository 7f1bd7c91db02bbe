//! Common utilities and types shared across blobmaster

pub mod config;
pub mod error;
pub mod metrics;
pub mod utils;

pub use config::MasterConfig;
pub use error::{Error, Result};
pub use metrics::{TopologyMetrics, METRICS};
pub use utils::{format_bytes, round_up, timestamp_now};
