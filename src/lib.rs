//! HTTP transaction instrumentation library.
//!
//! Starts a transaction for every inbound request, observes the response
//! through a capability-preserving writer wrapper, and records the outcome
//! and structured context for a collector.
//!
//! Two entry points cover the two handler styles:
//! - [`handler::TracedHandler`] instruments handlers that write their
//!   response imperatively through a [`writer::ResponseWrite`] object;
//! - [`middleware::ApmLayer`] instruments an axum application as a tower
//!   layer.

// Core instrumentation
pub mod report;
pub mod writer;

// Entry points
pub mod handler;
pub mod middleware;

// Transaction object model
pub mod tracer;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub use config::AgentConfig;
pub use handler::TracedHandler;
pub use middleware::ApmLayer;
pub use tracer::{Tracer, TracerEvent, Transaction};
pub use writer::{wrap, ResponseSnapshot, ResponseWrite, TracedWriter};
