//! Response observation layer.
//!
//! # Responsibilities
//! - Wrap a response writer without changing its observable behavior
//! - Record status code and headers-written state for the finalizer
//! - Preserve the writer's optional capabilities exactly
//!
//! # Design Decisions
//! - Hijack/push presence is encoded in the wrapper variant, fixed at wrap
//!   time
//! - Flush/close-notify degrade to safe no-ops instead of errors
//! - The snapshot handle is lock-free and only meaningful once the handler
//!   has returned

pub mod capability;
pub mod recorder;

pub use capability::{
    CloseNotify, CloseSignal, Flush, Hijack, HijackedIo, Push, RawStream, ResponseWrite,
};
pub use recorder::{wrap, ResponseRecorder, ResponseSnapshot, TracedWriter};
