//! In-memory context records attached to sampled transactions.
//!
//! These records are what the exporter serializes; the wire format itself
//! lives outside this crate.

use std::collections::BTreeMap;

use serde::Serialize;

/// Header name to values, preserving multi-value headers.
pub type HeaderFacts = BTreeMap<String, Vec<String>>;

/// Framework identity reported by an adapter.
#[derive(Clone, Debug, Serialize)]
pub struct Framework {
    pub name: String,
    pub version: String,
}

/// Facts about the inbound request.
#[derive(Clone, Debug, Serialize)]
pub struct RequestFacts {
    pub method: String,
    pub url: String,
    pub headers: HeaderFacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
}

/// Facts about the observed response.
///
/// `finished` and `headers_sent` are tri-state: `Some(true)` when proven,
/// absent when unknown, never `Some(false)`.
#[derive(Clone, Debug, Serialize)]
pub struct ResponseFacts {
    pub status_code: u16,
    pub headers: HeaderFacts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers_sent: Option<bool>,
}

/// Structured context captured for sampled transactions.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TransactionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestFacts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseFacts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<Framework>,
}

impl TransactionContext {
    /// True when nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.request.is_none() && self.response.is_none() && self.framework.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_flags_do_not_serialize() {
        let facts = ResponseFacts {
            status_code: 200,
            headers: HeaderFacts::new(),
            finished: None,
            headers_sent: None,
        };
        let value = serde_json::to_value(&facts).unwrap();
        assert!(value.get("finished").is_none());
        assert!(value.get("headers_sent").is_none());
    }

    #[test]
    fn asserted_flags_serialize_as_true() {
        let facts = ResponseFacts {
            status_code: 201,
            headers: HeaderFacts::new(),
            finished: Some(true),
            headers_sent: Some(true),
        };
        let value = serde_json::to_value(&facts).unwrap();
        assert_eq!(value["finished"], true);
        assert_eq!(value["headers_sent"], true);
    }
}
