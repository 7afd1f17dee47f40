//! Tracing setup shared by the bundler proxy binaries: fmt logging to stderr
//! with optional OTLP span export, plus span constructors for the dispatch path.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{LogFormat, OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};
