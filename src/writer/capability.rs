//! Capability surface of a response writer.
//!
//! # Responsibilities
//! - Define the minimal write surface every response writer offers
//! - Define the optional capabilities: flush, close-notify, hijack, push
//! - Let wrappers probe capabilities and forward them exactly

use std::io;

use axum::http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};

/// Receiver that fires once when the client disconnects abnormally.
///
/// A `None` returned from [`CloseNotify::close_notify`] means the capability
/// is unavailable, not that the connection never closes.
pub type CloseSignal = tokio::sync::broadcast::Receiver<()>;

/// Duplex byte stream handed over by [`Hijack::hijack`].
pub type HijackedIo = Box<dyn RawStream>;

/// Object-safe alias for the stream types a hijack can yield.
pub trait RawStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RawStream for T {}

/// Minimal response-writing surface: set headers, write the status line,
/// write body bytes.
///
/// The `as_*` probes report which optional capabilities the writer supports.
/// They default to `None`; an implementor that supports a capability
/// overrides the probe to return itself.
pub trait ResponseWrite {
    /// Response header map as currently set.
    fn headers(&self) -> &HeaderMap;

    /// Mutable access to the response header map.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Write the status line. Implementations may lock the header map after
    /// this call.
    fn write_head(&mut self, status: StatusCode);

    /// Write body bytes, returning how many were accepted.
    fn write_body(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Probe for the flush capability.
    fn as_flush(&mut self) -> Option<&mut dyn Flush> {
        None
    }

    /// Probe for the close-notify capability.
    fn as_close_notify(&mut self) -> Option<&mut dyn CloseNotify> {
        None
    }

    /// Probe for the hijack capability.
    fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
        None
    }

    /// Probe for the server-push capability.
    fn as_push(&mut self) -> Option<&mut dyn Push> {
        None
    }
}

/// Flush buffered response data to the client.
pub trait Flush {
    fn flush(&mut self);
}

/// Subscribe to abnormal client-disconnect notification.
pub trait CloseNotify {
    /// Returns a receiver that fires once on disconnect, or `None` when the
    /// writer cannot observe disconnects.
    fn close_notify(&mut self) -> Option<CloseSignal>;
}

/// Take over the underlying connection, bypassing the response lifecycle.
pub trait Hijack {
    fn hijack(&mut self) -> io::Result<HijackedIo>;
}

/// Initiate a server push for the given target.
pub trait Push {
    fn push(&mut self, target: &str, headers: &HeaderMap) -> io::Result<()>;
}
