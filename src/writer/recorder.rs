//! Write interception and capability-preserving wrapping.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};

use crate::writer::capability::{CloseNotify, CloseSignal, Flush, Hijack, Push, ResponseWrite};

/// Observed response state, shared between the wrapper and the finalizer.
///
/// The handle returned by [`wrap`] is handed out before the handler runs and
/// must not be inspected until the handler has returned or its panic has
/// been recovered. The fields are relaxed atomics, so a premature read sees
/// an unspecified interleaving rather than a torn value.
#[derive(Debug, Default)]
pub struct ResponseSnapshot {
    status_code: AtomicU16,
    headers_written: AtomicBool,
}

impl ResponseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status code observed via `write_head`, defaulting to 200 OK.
    pub fn status_code(&self) -> StatusCode {
        match self.status_code.load(Ordering::Relaxed) {
            0 => StatusCode::OK,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::OK),
        }
    }

    /// Whether any header has been observed on the wrapped writer.
    pub fn headers_written(&self) -> bool {
        self.headers_written.load(Ordering::Relaxed)
    }

    pub fn record_status(&self, status: StatusCode) {
        self.status_code.store(status.as_u16(), Ordering::Relaxed);
    }

    pub fn record_headers_written(&self, written: bool) {
        self.headers_written.store(written, Ordering::Relaxed);
    }
}

/// Base wrapper: intercepts writes to keep the snapshot current.
///
/// The flush and close-notify capabilities are folded in here as flags
/// probed once at construction; they degrade to safe no-ops when the
/// wrapped writer lacks them. Hijack and push presence is encoded in the
/// [`TracedWriter`] variant instead.
pub struct ResponseRecorder<W: ResponseWrite> {
    inner: W,
    snapshot: Arc<ResponseSnapshot>,
    has_flush: bool,
    has_close_notify: bool,
}

impl<W: ResponseWrite> ResponseRecorder<W> {
    fn new(mut inner: W) -> Self {
        let has_flush = inner.as_flush().is_some();
        let has_close_notify = inner.as_close_notify().is_some();
        Self {
            inner,
            snapshot: Arc::new(ResponseSnapshot::new()),
            has_flush,
            has_close_notify,
        }
    }
}

impl<W: ResponseWrite> ResponseWrite for ResponseRecorder<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Forwards first, so any effect of the underlying writer happens before
    /// bookkeeping, then records the status and re-derives the
    /// headers-written state from the header map.
    fn write_head(&mut self, status: StatusCode) {
        self.inner.write_head(status);
        self.snapshot.record_status(status);
        self.snapshot
            .record_headers_written(!self.inner.headers().is_empty());
    }

    /// Forwards first and returns the wrapped writer's result unchanged.
    /// Writers that implicitly send headers on the first body write lock
    /// their header map at that point, which the re-derivation picks up.
    fn write_body(&mut self, data: &[u8]) -> io::Result<usize> {
        let result = self.inner.write_body(data);
        self.snapshot
            .record_headers_written(!self.inner.headers().is_empty());
        result
    }

    fn as_flush(&mut self) -> Option<&mut dyn Flush> {
        Some(self)
    }

    fn as_close_notify(&mut self) -> Option<&mut dyn CloseNotify> {
        Some(self)
    }
}

impl<W: ResponseWrite> Flush for ResponseRecorder<W> {
    /// No-op when the wrapped writer cannot flush; callers holding only the
    /// minimal surface may call this defensively.
    fn flush(&mut self) {
        if self.has_flush {
            if let Some(flush) = self.inner.as_flush() {
                flush.flush();
            }
        }
    }
}

impl<W: ResponseWrite> CloseNotify for ResponseRecorder<W> {
    fn close_notify(&mut self) -> Option<CloseSignal> {
        if !self.has_close_notify {
            return None;
        }
        self.inner
            .as_close_notify()
            .and_then(|notify| notify.close_notify())
    }
}

/// Wrapped writer variant, fixed for the lifetime of one request.
///
/// [`wrap`] probes the hijack and push capabilities once and picks the
/// variant; the probes on the returned writer answer exactly what the
/// wrapped writer answered at construction.
pub enum TracedWriter<W: ResponseWrite> {
    Plain(ResponseRecorder<W>),
    WithHijack(ResponseRecorder<W>),
    WithPush(ResponseRecorder<W>),
    WithHijackPush(ResponseRecorder<W>),
}

impl<W: ResponseWrite> TracedWriter<W> {
    fn recorder(&self) -> &ResponseRecorder<W> {
        match self {
            TracedWriter::Plain(recorder)
            | TracedWriter::WithHijack(recorder)
            | TracedWriter::WithPush(recorder)
            | TracedWriter::WithHijackPush(recorder) => recorder,
        }
    }

    fn recorder_mut(&mut self) -> &mut ResponseRecorder<W> {
        match self {
            TracedWriter::Plain(recorder)
            | TracedWriter::WithHijack(recorder)
            | TracedWriter::WithPush(recorder)
            | TracedWriter::WithHijackPush(recorder) => recorder,
        }
    }

    /// Consume the wrapper, returning the wrapped writer.
    pub fn into_inner(self) -> W {
        match self {
            TracedWriter::Plain(recorder)
            | TracedWriter::WithHijack(recorder)
            | TracedWriter::WithPush(recorder)
            | TracedWriter::WithHijackPush(recorder) => recorder.inner,
        }
    }
}

impl<W: ResponseWrite> ResponseWrite for TracedWriter<W> {
    fn headers(&self) -> &HeaderMap {
        self.recorder().headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.recorder_mut().headers_mut()
    }

    fn write_head(&mut self, status: StatusCode) {
        self.recorder_mut().write_head(status);
    }

    fn write_body(&mut self, data: &[u8]) -> io::Result<usize> {
        self.recorder_mut().write_body(data)
    }

    fn as_flush(&mut self) -> Option<&mut dyn Flush> {
        Some(self.recorder_mut())
    }

    fn as_close_notify(&mut self) -> Option<&mut dyn CloseNotify> {
        Some(self.recorder_mut())
    }

    /// Hijacking bypasses the header/status lifecycle, so the call forwards
    /// straight to the wrapped writer with no bookkeeping.
    fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
        match self {
            TracedWriter::WithHijack(recorder) | TracedWriter::WithHijackPush(recorder) => {
                recorder.inner.as_hijack()
            }
            _ => None,
        }
    }

    fn as_push(&mut self) -> Option<&mut dyn Push> {
        match self {
            TracedWriter::WithPush(recorder) | TracedWriter::WithHijackPush(recorder) => {
                recorder.inner.as_push()
            }
            _ => None,
        }
    }
}

/// Wrap a response writer, returning the wrapped writer and the snapshot
/// handle that will reflect its state once writing begins.
///
/// The returned writer supports hijack and push if and only if `writer`
/// does; flush and close-notify degrade to safe no-ops when absent.
pub fn wrap<W: ResponseWrite>(writer: W) -> (TracedWriter<W>, Arc<ResponseSnapshot>) {
    let mut recorder = ResponseRecorder::new(writer);
    let has_hijack = recorder.inner.as_hijack().is_some();
    let has_push = recorder.inner.as_push().is_some();
    let snapshot = Arc::clone(&recorder.snapshot);

    let writer = match (has_hijack, has_push) {
        (true, true) => TracedWriter::WithHijackPush(recorder),
        (true, false) => TracedWriter::WithHijack(recorder),
        (false, true) => TracedWriter::WithPush(recorder),
        (false, false) => TracedWriter::Plain(recorder),
    };
    (writer, snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::capability::HijackedIo;
    use axum::http::HeaderValue;
    use tokio::sync::broadcast;

    /// Fake writer with each capability toggled per test.
    struct MockWriter {
        headers: HeaderMap,
        status: Option<StatusCode>,
        body: Vec<u8>,
        flushes: usize,
        fail_writes: bool,
        with_flush: bool,
        with_close_notify: bool,
        with_hijack: bool,
        with_push: bool,
        close_tx: Option<broadcast::Sender<()>>,
    }

    impl MockWriter {
        fn new() -> Self {
            Self {
                headers: HeaderMap::new(),
                status: None,
                body: Vec::new(),
                flushes: 0,
                fail_writes: false,
                with_flush: false,
                with_close_notify: false,
                with_hijack: false,
                with_push: false,
                close_tx: None,
            }
        }

        fn with_capabilities(hijack: bool, push: bool) -> Self {
            let mut writer = Self::new();
            writer.with_hijack = hijack;
            writer.with_push = push;
            writer
        }
    }

    impl ResponseWrite for MockWriter {
        fn headers(&self) -> &HeaderMap {
            &self.headers
        }

        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_head(&mut self, status: StatusCode) {
            self.status = Some(status);
        }

        fn write_body(&mut self, data: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.body.extend_from_slice(data);
            Ok(data.len())
        }

        fn as_flush(&mut self) -> Option<&mut dyn Flush> {
            if self.with_flush {
                Some(self)
            } else {
                None
            }
        }

        fn as_close_notify(&mut self) -> Option<&mut dyn CloseNotify> {
            if self.with_close_notify {
                Some(self)
            } else {
                None
            }
        }

        fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
            if self.with_hijack {
                Some(self)
            } else {
                None
            }
        }

        fn as_push(&mut self) -> Option<&mut dyn Push> {
            if self.with_push {
                Some(self)
            } else {
                None
            }
        }
    }

    impl Flush for MockWriter {
        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    impl CloseNotify for MockWriter {
        fn close_notify(&mut self) -> Option<CloseSignal> {
            let tx = self
                .close_tx
                .get_or_insert_with(|| broadcast::channel(1).0);
            Some(tx.subscribe())
        }
    }

    impl Hijack for MockWriter {
        fn hijack(&mut self) -> io::Result<HijackedIo> {
            let (stream, _peer) = tokio::io::duplex(64);
            Ok(Box::new(stream))
        }
    }

    impl Push for MockWriter {
        fn push(&mut self, _target: &str, _headers: &HeaderMap) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn default_snapshot_reports_ok_and_no_headers() {
        let (_writer, snapshot) = wrap(MockWriter::new());
        assert_eq!(snapshot.status_code(), StatusCode::OK);
        assert!(!snapshot.headers_written());
    }

    #[test]
    fn tracks_status_and_headers_across_writes() {
        let mut mock = MockWriter::new();
        mock.headers
            .insert("x-preset", HeaderValue::from_static("1"));
        let (mut writer, snapshot) = wrap(mock);

        writer.write_head(StatusCode::NOT_FOUND);
        let written = writer.write_body(b"not here").unwrap();

        assert_eq!(written, 8);
        assert_eq!(snapshot.status_code(), StatusCode::NOT_FOUND);
        assert!(snapshot.headers_written());
    }

    #[test]
    fn headers_written_stays_false_for_an_empty_header_map() {
        let (mut writer, snapshot) = wrap(MockWriter::new());
        writer.write_body(b"payload").unwrap();
        assert!(!snapshot.headers_written());
    }

    #[test]
    fn preserves_hijack_and_push_in_every_combination() {
        for hijack in [false, true] {
            for push in [false, true] {
                let (mut writer, _snapshot) = wrap(MockWriter::with_capabilities(hijack, push));
                assert_eq!(writer.as_hijack().is_some(), hijack, "hijack presence");
                assert_eq!(writer.as_push().is_some(), push, "push presence");
            }
        }
    }

    #[test]
    fn forwards_writes_to_the_wrapped_writer() {
        let (mut writer, _snapshot) = wrap(MockWriter::new());
        writer
            .headers_mut()
            .insert("content-type", HeaderValue::from_static("text/plain"));
        writer.write_head(StatusCode::CREATED);
        writer.write_body(b"0123456789").unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.status, Some(StatusCode::CREATED));
        assert_eq!(inner.body, b"0123456789");
        assert_eq!(inner.headers.len(), 1);
    }

    #[test]
    fn write_errors_pass_through_unchanged() {
        let mut mock = MockWriter::new();
        mock.fail_writes = true;
        let (mut writer, snapshot) = wrap(mock);

        let err = writer.write_body(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(!snapshot.headers_written());
    }

    #[test]
    fn flush_without_support_is_a_no_op() {
        let (mut writer, _snapshot) = wrap(MockWriter::new());
        let flush = writer.as_flush().expect("wrapper always answers flush");
        flush.flush();
        flush.flush();
        assert_eq!(writer.into_inner().flushes, 0);
    }

    #[test]
    fn flush_forwards_when_supported() {
        let mut mock = MockWriter::new();
        mock.with_flush = true;
        let (mut writer, _snapshot) = wrap(mock);

        writer.as_flush().expect("flush probe").flush();
        writer.as_flush().expect("flush probe").flush();
        assert_eq!(writer.into_inner().flushes, 2);
    }

    #[test]
    fn close_notify_is_absent_without_support() {
        let (mut writer, _snapshot) = wrap(MockWriter::new());
        let notify = writer
            .as_close_notify()
            .expect("wrapper always answers close-notify");
        assert!(notify.close_notify().is_none());
    }

    #[test]
    fn close_notify_forwards_when_supported() {
        let mut mock = MockWriter::new();
        mock.with_close_notify = true;
        let (mut writer, _snapshot) = wrap(mock);

        let signal = writer.as_close_notify().expect("probe").close_notify();
        assert!(signal.is_some());
    }

    #[test]
    fn hijack_forwards_to_the_wrapped_writer() {
        let (mut writer, _snapshot) = wrap(MockWriter::with_capabilities(true, false));
        let stream = writer.as_hijack().expect("hijack probe").hijack();
        assert!(stream.is_ok());
    }
}
