//! Usage analytics: fire-and-forget event recording.
//!
//! The gateway only needs `record_event`. It must never block or fail a request, so sinks
//! either drop the event immediately ([`NoopEventSink`]) or hand it to a bounded queue
//! ([`ChannelEventSink`]) drained by a background task.

use crate::error::ErrorKind;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        result_count: Option<usize>,
    },
    Failure {
        error_kind: ErrorKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEvent {
    pub request_id: String,
    /// Non-secret tenant identifier (never the credential).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_hint: Option<String>,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    pub duration_ms: u64,
    pub outcome: Outcome,
    pub timestamp: String,
}

impl UsageEvent {
    pub fn new(
        request_id: impl Into<String>,
        operation: impl Into<String>,
        duration: Duration,
        outcome: Outcome,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            tenant_hint: None,
            operation: operation.into(),
            resource: None,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            outcome,
            timestamp: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn with_tenant_hint(mut self, hint: Option<String>) -> Self {
        self.tenant_hint = hint;
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: Option<String>) -> Self {
        self.resource = resource;
        self
    }
}

pub trait EventSink: Send + Sync {
    /// Must return immediately and never fail the caller.
    fn record_event(&self, event: UsageEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record_event(&self, _event: UsageEvent) {}
}

/// Keeps events in memory; used by embedders that inspect usage in-process.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<UsageEvent>>,
}

impl MemoryEventSink {
    #[must_use]
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemoryEventSink {
    fn record_event(&self, event: UsageEvent) {
        self.events.lock().push(event);
    }
}

pub type EventHandler = Box<dyn Fn(UsageEvent) + Send + Sync>;

/// Bounded queue in front of an [`EventHandler`]. When the queue is full events are dropped
/// and counted.
pub struct ChannelEventSink {
    tx: mpsc::Sender<UsageEvent>,
    dropped: Arc<AtomicU64>,
}

impl ChannelEventSink {
    /// Spawn the drain task on the current runtime. The task ends once the sink is dropped
    /// and the queue is empty.
    #[must_use]
    pub fn spawn(capacity: usize, handler: EventHandler) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<UsageEvent>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event);
            }
        });
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    /// Sink whose handler logs every event under the `analytics` target.
    #[must_use]
    pub fn spawn_logging(capacity: usize) -> (Self, JoinHandle<()>) {
        Self::spawn(capacity, Box::new(log_event))
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEventSink {
    fn record_event(&self, event: UsageEvent) {
        if self.tx.try_send(event).is_err() {
            let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if n.is_power_of_two() {
                tracing::warn!(target: "analytics", dropped = n, "analytics queue full; dropping events");
            }
        }
    }
}

fn log_event(event: UsageEvent) {
    let (status, result_count, error_kind) = match &event.outcome {
        Outcome::Success { result_count } => ("success", *result_count, None),
        Outcome::Failure { error_kind } => ("failure", None, Some(error_kind.as_str())),
    };
    tracing::info!(
        target: "analytics",
        request_id = %event.request_id,
        tenant = event.tenant_hint.as_deref().unwrap_or("-"),
        operation = %event.operation,
        resource = event.resource.as_deref().unwrap_or("-"),
        duration_ms = event.duration_ms,
        status,
        result_count,
        error_kind,
        "usage"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(op: &str) -> UsageEvent {
        UsageEvent::new(
            "req-1",
            op,
            Duration::from_millis(12),
            Outcome::Success {
                result_count: Some(3),
            },
        )
    }

    #[tokio::test]
    async fn channel_sink_delivers_events_to_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let (sink, handle) = ChannelEventSink::spawn(
            8,
            Box::new(move |e: UsageEvent| seen2.lock().push(e.operation)),
        );

        sink.record_event(event("query"));
        sink.record_event(event("list_docs"));
        drop(sink);
        handle.await.expect("drain task");

        assert_eq!(*seen.lock(), vec!["query", "list_docs"]);
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts_without_blocking() {
        let (sink, _handle) = ChannelEventSink::spawn(1, Box::new(|_e: UsageEvent| {}));
        // The drain task has not run yet on this single-threaded runtime, so the queue holds
        // exactly one event.
        for _ in 0..5 {
            sink.record_event(event("query"));
        }
        assert_eq!(sink.dropped(), 4);
    }

    #[test]
    fn outcome_serialises_with_status_tag() {
        let v = serde_json::to_value(Outcome::Failure {
            error_kind: ErrorKind::Validation,
        })
        .expect("json");
        assert_eq!(
            v,
            serde_json::json!({"status": "failure", "error_kind": "validation"})
        );
    }

    #[test]
    fn memory_sink_keeps_events() {
        let sink = MemoryEventSink::default();
        sink.record_event(event("health").with_tenant_hint(Some("TKN-1".into())));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tenant_hint.as_deref(), Some("TKN-1"));
    }
}
