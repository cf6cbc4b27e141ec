//! Transaction outcome and context recording.
//!
//! # Responsibilities
//! - Map status codes to canonical result labels
//! - Build request facts from the inbound request
//! - Record response context with provable-only finished/headers-sent flags
//!
//! # Design Decisions
//! - The result label is set for every transaction; context only for
//!   sampled ones
//! - Context headers come from the writer's header map at finalize time,
//!   not from the snapshot
//! - `finished`/`headers_sent` are asserted only when provable, omitted
//!   otherwise, and never recorded as an explicit `false`

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use url::Url;

use crate::tracer::model::{HeaderFacts, RequestFacts, ResponseFacts};
use crate::tracer::Transaction;
use crate::writer::ResponseSnapshot;

/// Canonical result label for a status code: `"HTTP 2xx"` for 200-299 and
/// so on, `"HTTP <code>"` for codes outside the 1xx-5xx ranges.
pub fn status_result(status: StatusCode) -> String {
    let code = status.as_u16();
    match code / 100 {
        1 => "HTTP 1xx".to_string(),
        2 => "HTTP 2xx".to_string(),
        3 => "HTTP 3xx".to_string(),
        4 => "HTTP 4xx".to_string(),
        5 => "HTTP 5xx".to_string(),
        _ => format!("HTTP {code}"),
    }
}

/// Request-context builder: method, full URL, headers, client address.
///
/// The client address is read from the [`ConnectInfo`] extension when the
/// server was set up to provide it.
pub fn request_facts<B>(req: &Request<B>) -> RequestFacts {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string());
    RequestFacts {
        method: req.method().to_string(),
        url: full_url(req),
        headers: header_facts(req.headers()),
        remote_addr,
    }
}

/// Absolute URL for the request; origin-form targets are completed from the
/// Host header.
fn full_url<B>(req: &Request<B>) -> String {
    let uri = req.uri();
    if uri.scheme().is_some() {
        return uri.to_string();
    }
    let host = req
        .headers()
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    match Url::parse(&format!("http://{host}{uri}")) {
        Ok(url) => url.to_string(),
        Err(_) => uri.to_string(),
    }
}

/// Flatten a header map into name -> values, preserving multi-value
/// headers.
pub fn header_facts(headers: &HeaderMap) -> HeaderFacts {
    let mut facts = HeaderFacts::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        facts.entry(name.as_str().to_string()).or_default().push(value);
    }
    facts
}

/// Record the transaction outcome.
///
/// The result label is set unconditionally: it feeds aggregate statistics
/// even for unsampled transactions. Context capture stops there unless the
/// transaction is sampled.
///
/// `current_headers` is the writer's header map read at finalize time;
/// framework code may mutate headers between write calls and finalize, so
/// the snapshot's view is not used for the copy.
///
/// `finished` proves normal completion. When false the handler merely
/// failed to signal completion, which does not prove the response was
/// incomplete, so the context flag is omitted rather than set to false.
/// `headers_sent` follows the same rule: asserted when the snapshot
/// observed a write or the current header map is non-empty, omitted
/// otherwise.
pub fn finalize(
    tx: &mut Transaction,
    snapshot: &ResponseSnapshot,
    current_headers: &HeaderMap,
    request: Option<&RequestFacts>,
    finished: bool,
) {
    tx.result = status_result(snapshot.status_code());
    if !tx.sampled() {
        return;
    }

    tx.context.request = request.cloned();
    let headers_sent = snapshot.headers_written() || !current_headers.is_empty();
    tx.context.response = Some(ResponseFacts {
        status_code: snapshot.status_code().as_u16(),
        headers: header_facts(current_headers),
        finished: finished.then_some(true),
        headers_sent: headers_sent.then_some(true),
    });
}
