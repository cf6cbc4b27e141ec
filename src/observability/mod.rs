//! Observability helpers.
//!
//! # Data Flow
//! ```text
//! instrumentation produces:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (per-transaction counter + latency histogram)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Whatever metrics recorder the embedding binary installs
//! ```

pub mod logging;
pub mod metrics;
