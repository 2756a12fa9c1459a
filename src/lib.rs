//! Powerwall Exporter Library
//!
//! Polls a Tesla Energy Gateway's local API and republishes its readings as
//! Prometheus metrics. Each scrape of `/metrics` triggers a fresh poll; a
//! background ticker keeps the cumulative energy counters moving between
//! scrapes.

pub mod codecs;
pub mod config;
pub mod counters;
pub mod enums;
pub mod error;
pub mod exporter;
pub mod gateway_api;
pub mod gateway_client;
pub mod model;
pub mod poll_engine;
pub mod registry;

// Re-export commonly used types for easier access
pub use config::{Config, ConfigError, Credentials};
pub use error::{ExporterError, Result};
pub use exporter::GatewayExporter;
pub use gateway_client::GatewayClient;
pub use model::{project, DeviceSnapshot, FixedInfo, Metrics};
pub use poll_engine::{PollEngine, SCRAPE_FAILED};
pub use registry::{MetricsRegistry, RegistryError};
