//! Transaction lifecycle: start, sample, end, enqueue for export.
//!
//! # Data Flow
//! ```text
//! Tracer::start_transaction ──▶ Transaction (result + context filled in
//!        │                      by the instrumentation layer)
//!        │                            │ end()
//!        ▼                            ▼
//! Sampler (decision at start)   TracerEvent channel ──▶ exporter (external)
//! ```

pub mod model;
pub mod sampler;

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::tracer::model::TransactionContext;
use crate::tracer::sampler::{RatioSampler, Sampler};

/// Payload carried by an unwinding panic.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Service metadata reported once per export stream.
#[derive(Clone, Debug)]
pub struct ServiceMetadata {
    pub name: String,
    pub environment: Option<String>,
}

/// Event handed to the external exporter.
#[derive(Debug)]
pub enum TracerEvent {
    Transaction(Transaction),
    Error(ErrorReport),
}

/// Starts transactions and queues finished ones for export.
///
/// The receiver returned by [`Tracer::new`] is the hand-off point to the
/// collector transport, which lives outside this crate.
pub struct Tracer {
    metadata: ServiceMetadata,
    sampler: Box<dyn Sampler>,
    events: mpsc::UnboundedSender<TracerEvent>,
}

impl Tracer {
    /// Build a tracer from configuration, returning the event receiver the
    /// exporter drains.
    pub fn new(config: &AgentConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<TracerEvent>) {
        Self::with_sampler(config, Box::new(RatioSampler::new(config.sample_ratio)))
    }

    /// Build a tracer with a caller-supplied sampling policy.
    pub fn with_sampler(
        config: &AgentConfig,
        sampler: Box<dyn Sampler>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TracerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let tracer = Arc::new(Self {
            metadata: ServiceMetadata {
                name: config.service_name.clone(),
                environment: config.environment.clone(),
            },
            sampler,
            events,
        });
        (tracer, receiver)
    }

    pub fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    /// Start a transaction. The sampling decision is made here and is final
    /// for the transaction's lifetime.
    pub fn start_transaction(
        &self,
        name: impl Into<String>,
        tx_type: impl Into<String>,
    ) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            name: name.into(),
            tx_type: tx_type.into(),
            result: String::new(),
            context: TransactionContext::default(),
            sampled: self.sampler.sample(),
            started: Instant::now(),
            duration: None,
            events: self.events.clone(),
        }
    }

    /// Convert a recovered panic payload into an error report tied to the
    /// given transaction.
    pub fn recovered(&self, payload: &PanicPayload, tx: &Transaction) -> ErrorReport {
        ErrorReport {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            culprit: tx.name.clone(),
            message: panic_message(payload),
            events: self.events.clone(),
        }
    }
}

fn panic_message(payload: &PanicPayload) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

/// One traced unit of work, here a single HTTP request.
#[derive(Debug)]
pub struct Transaction {
    pub id: Uuid,
    pub name: String,
    pub tx_type: String,
    /// Short outcome label, e.g. "HTTP 2xx". Set for every transaction,
    /// sampled or not.
    pub result: String,
    /// Structured context, populated only for sampled transactions.
    pub context: TransactionContext,
    sampled: bool,
    started: Instant,
    pub duration: Option<Duration>,
    events: mpsc::UnboundedSender<TracerEvent>,
}

impl Transaction {
    /// Whether this transaction was selected for full context capture.
    pub fn sampled(&self) -> bool {
        self.sampled
    }

    /// Time elapsed since the transaction started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Finish the transaction and queue it for export.
    pub fn end(mut self) {
        self.duration = Some(self.started.elapsed());
        let events = self.events.clone();
        let _ = events.send(TracerEvent::Transaction(self));
    }
}

/// Error captured from a recovered panic, tied to its transaction.
#[derive(Debug)]
pub struct ErrorReport {
    pub id: Uuid,
    pub transaction_id: Uuid,
    /// Transaction name at the time of recovery.
    pub culprit: String,
    pub message: String,
    events: mpsc::UnboundedSender<TracerEvent>,
}

impl ErrorReport {
    /// Queue the report for export.
    pub fn send(self) {
        let events = self.events.clone();
        let _ = events.send(TracerEvent::Error(self));
    }
}

/// Propagation handle attached to the request extensions while a
/// transaction is in flight.
#[derive(Clone, Copy, Debug)]
pub struct CurrentTransaction {
    pub id: Uuid,
    pub sampled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_enqueues_the_transaction_with_a_duration() {
        let (tracer, mut events) = Tracer::new(&AgentConfig::default());
        let tx = tracer.start_transaction("GET /widgets", "request");
        let id = tx.id;
        tx.end();

        let TracerEvent::Transaction(finished) = events.try_recv().unwrap() else {
            panic!("expected a transaction event");
        };
        assert_eq!(finished.id, id);
        assert_eq!(finished.name, "GET /widgets");
        assert_eq!(finished.tx_type, "request");
        assert!(finished.duration.is_some());
    }

    #[test]
    fn recovered_extracts_panic_messages() {
        let (tracer, mut events) = Tracer::new(&AgentConfig::default());
        let tx = tracer.start_transaction("GET /widgets", "request");

        let payload: PanicPayload = Box::new("static message");
        let report = tracer.recovered(&payload, &tx);
        assert_eq!(report.message, "static message");
        assert_eq!(report.transaction_id, tx.id);
        assert_eq!(report.culprit, "GET /widgets");
        report.send();

        let payload: PanicPayload = Box::new(format!("formatted {}", 42));
        assert_eq!(tracer.recovered(&payload, &tx).message, "formatted 42");

        let payload: PanicPayload = Box::new(7usize);
        assert_eq!(tracer.recovered(&payload, &tx).message, "panic");

        assert!(matches!(events.try_recv(), Ok(TracerEvent::Error(_))));
    }

    #[test]
    fn metadata_comes_from_the_configuration() {
        let config = AgentConfig {
            service_name: "billing".to_string(),
            environment: Some("staging".to_string()),
            ..AgentConfig::default()
        };
        let (tracer, _events) = Tracer::new(&config);
        assert_eq!(tracer.metadata().name, "billing");
        assert_eq!(tracer.metadata().environment.as_deref(), Some("staging"));
    }
}
