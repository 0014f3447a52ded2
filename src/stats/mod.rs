//! Statistics for a push session

pub mod metrics;

pub use metrics::PushStats;
