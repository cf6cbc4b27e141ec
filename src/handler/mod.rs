//! Instrumented handler invocation.
//!
//! # Responsibilities
//! - Start one transaction per request and attach it to the request
//! - Wrap the response writer before the handler runs
//! - Guarantee finalize on every exit path, panic included
//! - Hand recovered panics to the optional recovery hook

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::http::{Request, StatusCode};

use crate::report;
use crate::tracer::{CurrentTransaction, PanicPayload, Tracer, Transaction};
use crate::writer::{wrap, ResponseWrite, TracedWriter};

/// Panic recovery hook, invoked with the wrapped writer, the request, the
/// transaction, and the recovered payload.
///
/// The hook is responsible for producing an error report and for writing
/// whatever response should stand in for the failed handler.
pub type RecoveryHook<B> =
    Box<dyn Fn(&mut dyn ResponseWrite, &Request<B>, &mut Transaction, &PanicPayload) + Send + Sync>;

/// Caller-supplied transaction naming override.
pub type NameFn<B> = Box<dyn Fn(&Request<B>) -> String + Send + Sync>;

/// Default transaction name: `"METHOD /path"`.
pub fn request_name<B>(req: &Request<B>) -> String {
    format!("{} {}", req.method(), req.uri().path())
}

/// Transaction name for requests no route matched.
pub fn unknown_route_name<B>(req: &Request<B>) -> String {
    format!("{} unknown route", req.method())
}

/// Recovery hook that reports the panic and answers with a 500.
pub fn report_and_respond<B>(tracer: Arc<Tracer>) -> RecoveryHook<B> {
    Box::new(
        move |writer: &mut dyn ResponseWrite,
              _request: &Request<B>,
              tx: &mut Transaction,
              payload: &PanicPayload| {
            tracer.recovered(payload, tx).send();
            writer.write_head(StatusCode::INTERNAL_SERVER_ERROR);
        },
    )
}

/// Runs handlers with transaction instrumentation.
///
/// The handler closure is passed per call, so one `TracedHandler` can serve
/// any number of routes.
pub struct TracedHandler<B = ()> {
    tracer: Arc<Tracer>,
    recovery: Option<RecoveryHook<B>>,
    request_name: Option<NameFn<B>>,
}

impl<B> TracedHandler<B> {
    pub fn new(tracer: Arc<Tracer>) -> Self {
        Self {
            tracer,
            recovery: None,
            request_name: None,
        }
    }

    /// Recover panics with `hook` instead of letting them propagate.
    pub fn with_recovery(mut self, hook: RecoveryHook<B>) -> Self {
        self.recovery = Some(hook);
        self
    }

    /// Name transactions with `name_fn` instead of `"METHOD /path"`.
    pub fn with_request_name(mut self, name_fn: NameFn<B>) -> Self {
        self.request_name = Some(name_fn);
        self
    }

    /// Serve one request: wrap the writer, run the handler, finalize.
    ///
    /// Finalize runs exactly once on every exit path. A panic is handed to
    /// the recovery hook when one is configured; otherwise it resumes after
    /// the transaction has been recorded with the completion state left
    /// unknown.
    pub fn serve<W, F>(&self, writer: W, mut request: Request<B>, handler: F)
    where
        W: ResponseWrite,
        F: FnOnce(&mut TracedWriter<W>, &Request<B>),
    {
        let name = match &self.request_name {
            Some(name_fn) => name_fn(&request),
            None => request_name(&request),
        };
        let mut tx = self.tracer.start_transaction(name, "request");
        request.extensions_mut().insert(CurrentTransaction {
            id: tx.id,
            sampled: tx.sampled(),
        });

        // Request facts are only needed for sampled transactions.
        let facts = tx.sampled().then(|| report::request_facts(&request));

        let (mut writer, snapshot) = wrap(writer);

        let mut finished = false;
        let mut repanic: Option<PanicPayload> = None;
        match panic::catch_unwind(AssertUnwindSafe(|| handler(&mut writer, &request))) {
            Ok(()) => finished = true,
            Err(payload) => match &self.recovery {
                Some(recover) => {
                    tracing::warn!(transaction = %tx.id, "handler panicked, recovering");
                    recover(&mut writer, &request, &mut tx, &payload);
                    finished = true;
                }
                None => repanic = Some(payload),
            },
        }

        report::finalize(&mut tx, &snapshot, writer.headers(), facts.as_ref(), finished);
        tx.end();

        if let Some(payload) = repanic {
            panic::resume_unwind(payload);
        }
    }
}
