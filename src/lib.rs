//! Client-side query engine for the Confluent Cloud metrics API.
//!
//! Builds typed, validated queries (filters, groupings, aggregations,
//! intervals), runs them against the API and fans per-topic or per-metric
//! queries out over a bounded worker pool.

pub mod client;
pub mod config;
pub mod error;
pub mod fan_out;
pub mod filter;
pub mod granularity;
pub mod interval;
pub mod labels;
pub mod models;
pub mod transport;

pub use client::{MetricRequest, TelemetryClient};
pub use config::{ClientConfig, Credentials};
pub use error::{Error, FanOutError, KeyFailure, Result};
pub use fan_out::{FanOut, FanOutResult};
pub use filter::Filter;
pub use granularity::Granularity;
pub use interval::Interval;
pub use labels::Label;
pub use models::metrics::{Metric, ResourceType};
pub use models::query::{Aggregation, Group, Query};
pub use models::response::{QueryResponse, Telemetry};
