//! Event bus for server-sent events
//!
//! Handlers and the generation monitor emit [`AppEvent`]s on a
//! `tokio::sync::broadcast` channel; the SSE endpoint forwards them to
//! connected browsers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Currency;

/// Events broadcast to SSE clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AppEvent {
    /// A generation was accepted by the provider
    GenerationSubmitted {
        job_id: Uuid,
        task_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The provider reported a non-terminal status
    GenerationProgress {
        job_id: Uuid,
        provider_status: String,
        attempt: u32,
        max_attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Audio was stored and tracks recorded
    GenerationCompleted {
        job_id: Uuid,
        track_ids: Vec<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// The job failed or timed out
    GenerationFailed {
        job_id: Uuid,
        reason: String,
        timed_out: bool,
        timestamp: DateTime<Utc>,
    },

    /// Credits were given back after a failure
    RefundIssued {
        job_id: Uuid,
        payer: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_hash: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The compensating refund failed and needs manual reconciliation
    RefundFailed {
        job_id: Uuid,
        payer: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// New community chat message
    ChatPosted {
        message_id: Uuid,
        sender: String,
        timestamp: DateTime<Utc>,
    },

    /// A marketplace listing was bought
    ListingSold {
        listing_id: Uuid,
        buyer: String,
        price: f64,
        currency: Currency,
        timestamp: DateTime<Utc>,
    },
}

impl AppEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            AppEvent::GenerationSubmitted { .. } => "GenerationSubmitted",
            AppEvent::GenerationProgress { .. } => "GenerationProgress",
            AppEvent::GenerationCompleted { .. } => "GenerationCompleted",
            AppEvent::GenerationFailed { .. } => "GenerationFailed",
            AppEvent::RefundIssued { .. } => "RefundIssued",
            AppEvent::RefundFailed { .. } => "RefundFailed",
            AppEvent::ChatPosted { .. } => "ChatPosted",
            AppEvent::ListingSold { .. } => "ListingSold",
        }
    }
}

/// Broadcast channel shared by every producer and SSE connection
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: AppEvent) -> Result<usize, broadcast::error::SendError<AppEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
