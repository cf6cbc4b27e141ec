//! Transaction instrumentation for axum applications.
//!
//! # Responsibilities
//! - Name transactions from the router's matched path
//! - Skip configured ignore prefixes entirely
//! - Intercept panics from the inner service
//! - Finalize the transaction on every path and record metrics
//!
//! # Design Decisions
//! - Implemented as a tower `Layer`/`Service` pair so it can sit anywhere
//!   in the middleware stack regardless of state type
//! - Request facts are captured before the inner service consumes the
//!   request, and only for sampled transactions
//! - Without a panic responder the payload resumes unwinding after the
//!   transaction has been recorded

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use futures_util::FutureExt;
use tower::{Layer, Service};

use crate::config::AgentConfig;
use crate::handler::unknown_route_name;
use crate::observability::metrics;
use crate::report;
use crate::tracer::model::{Framework, RequestFacts};
use crate::tracer::{CurrentTransaction, PanicPayload, Tracer, Transaction};
use crate::writer::ResponseSnapshot;

/// Builds the response that stands in for a panicked handler.
pub type PanicResponder = Arc<dyn Fn(&PanicPayload) -> Response<Body> + Send + Sync>;

/// Responder producing an empty 500, the conventional stand-in for a failed
/// handler.
pub fn internal_error_responder() -> PanicResponder {
    Arc::new(|_payload: &PanicPayload| {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// Layer that instruments every request with a transaction.
#[derive(Clone)]
pub struct ApmLayer {
    tracer: Arc<Tracer>,
    ignore_prefixes: Arc<[String]>,
    recovery: Option<PanicResponder>,
}

impl ApmLayer {
    /// Instrument with the given tracer; ignored path prefixes come from
    /// the agent configuration.
    pub fn new(tracer: Arc<Tracer>, config: &AgentConfig) -> Self {
        Self {
            tracer,
            ignore_prefixes: config.ignore_url_prefixes.clone().into(),
            recovery: None,
        }
    }

    /// Convert handler panics into `responder`'s response plus an error
    /// report instead of resuming the unwind.
    pub fn with_panic_responder(mut self, responder: PanicResponder) -> Self {
        self.recovery = Some(responder);
        self
    }
}

impl<S> Layer<S> for ApmLayer {
    type Service = ApmService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApmService {
            inner,
            tracer: self.tracer.clone(),
            ignore_prefixes: self.ignore_prefixes.clone(),
            recovery: self.recovery.clone(),
        }
    }
}

/// Service produced by [`ApmLayer`].
#[derive(Clone)]
pub struct ApmService<S> {
    inner: S,
    tracer: Arc<Tracer>,
    ignore_prefixes: Arc<[String]>,
    recovery: Option<PanicResponder>,
}

impl<S> ApmService<S> {
    fn is_ignored(&self, path: &str) -> bool {
        self.ignore_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

impl<S> Service<Request<Body>> for ApmService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        // Swap the cloned service with the ready one (standard tower
        // pattern).
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        if self.is_ignored(request.uri().path()) {
            return Box::pin(inner.call(request));
        }

        let name = match request.extensions().get::<MatchedPath>() {
            Some(path) => format!("{} {}", request.method(), path.as_str()),
            None => unknown_route_name(&request),
        };
        let tracer = self.tracer.clone();
        let recovery = self.recovery.clone();

        let mut tx = tracer.start_transaction(name, "request");
        tracing::debug!(
            transaction = %tx.id,
            name = %tx.name,
            sampled = tx.sampled(),
            "transaction started"
        );
        request.extensions_mut().insert(CurrentTransaction {
            id: tx.id,
            sampled: tx.sampled(),
        });

        // The inner service consumes the request, so capture request facts
        // now; they are only needed for sampled transactions.
        let facts = tx.sampled().then(|| report::request_facts(&request));

        Box::pin(async move {
            let outcome = AssertUnwindSafe(inner.call(request)).catch_unwind().await;

            let snapshot = ResponseSnapshot::new();
            match outcome {
                Ok(Ok(response)) => {
                    snapshot.record_status(response.status());
                    snapshot.record_headers_written(!response.headers().is_empty());
                    finish(tx, &snapshot, response.headers(), facts.as_ref(), true);
                    Ok(response)
                }
                Ok(Err(err)) => {
                    // The inner service failed without producing a
                    // response; record what was observed and pass the
                    // error through untouched.
                    finish(tx, &snapshot, &HeaderMap::new(), facts.as_ref(), false);
                    Err(err)
                }
                Err(payload) => match recovery {
                    Some(responder) => {
                        tracing::warn!(transaction = %tx.id, "handler panicked, recovering");
                        tracer.recovered(&payload, &tx).send();
                        let response = responder(&payload);
                        snapshot.record_status(response.status());
                        snapshot.record_headers_written(!response.headers().is_empty());
                        finish(tx, &snapshot, response.headers(), facts.as_ref(), true);
                        Ok(response)
                    }
                    None => {
                        finish(tx, &snapshot, &HeaderMap::new(), facts.as_ref(), false);
                        panic::resume_unwind(payload)
                    }
                },
            }
        })
    }
}

/// Finalize and enqueue the transaction, stamping the adapter's framework
/// identity and the per-result metrics.
fn finish(
    mut tx: Transaction,
    snapshot: &ResponseSnapshot,
    current_headers: &HeaderMap,
    facts: Option<&RequestFacts>,
    finished: bool,
) {
    report::finalize(&mut tx, snapshot, current_headers, facts, finished);
    if tx.sampled() {
        tx.context.framework = Some(framework_identity());
    }
    metrics::record_transaction(&tx.result, tx.elapsed());
    tx.end();
}

/// Identity reported in the transaction context for this adapter.
fn framework_identity() -> Framework {
    Framework {
        name: "axum".to_string(),
        version: "0.8".to_string(),
    }
}
