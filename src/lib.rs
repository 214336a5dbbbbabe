pub mod config;
pub mod error;
pub mod exporter;
pub mod k8s;
pub mod metrics;
