//! Outbound notification seam.
//!
//! Each successful transition dispatches at most one notification to the
//! party responsible for the next action. Dispatch is fire and forget: a
//! gateway failure is logged and swallowed by the caller, it never rolls
//! back the transition that produced it.

use super::clock::TimeStamp;
use chrono::Utc;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
    InApp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    FleetReviewRequested {
        booking_id: String,
    },
    HostReviewRequested {
        booking_id: String,
    },
    BookingRejected {
        booking_id: String,
        reason: String,
    },
    BookingConfirmed {
        booking_id: String,
        code: String,
    },
    DocumentsRequested {
        booking_id: String,
        document_types: Vec<String>,
        deadline: Option<TimeStamp<Utc>>,
        message: Option<String>,
    },
    HoldReleased {
        booking_id: String,
    },
    BookingCancelled {
        booking_id: String,
        reason: String,
    },
    FinalReviewOpened {
        booking_id: String,
    },
    ClaimFiled {
        claim_id: String,
        booking_id: String,
        response_deadline: TimeStamp<Utc>,
        needs_response: bool,
    },
    ClaimResponseReceived {
        claim_id: String,
    },
    ClaimResolved {
        claim_id: String,
        outcome: String,
    },
    ClaimResponseOverdue {
        claim_id: String,
        booking_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: Channel,
    pub recipient: String,
    pub event: NotificationEvent,
}

pub trait NotificationGateway: Send + Sync {
    fn send(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Drops every notification, for wiring the engine without a delivery
/// backend.
pub struct NullGateway;

impl NotificationGateway for NullGateway {
    fn send(&self, _notification: Notification) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps every notification in memory so tests and consumers can inspect
/// what was dispatched and to whom.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("gateway mutex poisoned").clone()
    }
}

impl NotificationGateway for RecordingGateway {
    fn send(&self, notification: Notification) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("gateway mutex poisoned")
            .push(notification);
        Ok(())
    }
}
