//! Smart-meter gateway collector.
//!
//! Every tick the [`collector::Collector`] fetches the gateway's `/core/modules`
//! document, extracts electricity and gas readings and writes them as one InfluxDB
//! point.

pub mod collector;
pub mod config;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod line_protocol;
pub mod reading;
pub mod sink;
pub mod telemetry;

pub use collector::{Collector, CollectorState, CollectorStats};
pub use config::Config;
pub use error::{CycleError, ExtractError, FetchError, WriteError};
pub use extract::{extract, extract_at};
pub use gateway::{GatewayClient, GatewayCredentials, ModuleSource};
pub use reading::{Field, Reading};
pub use sink::{InfluxSink, PointSink, SinkConfig};
