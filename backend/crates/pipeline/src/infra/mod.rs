//! Infrastructure Layer
//!
//! Database and external sink implementations.

pub mod log_sink;
pub mod postgres;

pub use log_sink::{HttpLogSink, LogSink, TracingLogSink};
pub use postgres::PgPipelineStore;
