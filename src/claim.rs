//! Damage claims and the dispute response window.
//!
//! A claim records who filed it and a response deadline fixed once at filing
//! time. Everything time-sensitive about the window (hours remaining,
//! urgency, expiry) is derived from that deadline and the current clock at
//! read time, never written back, so a stale reader cannot observe a stale
//! urgency flag.

use super::clock::TimeStamp;
use super::error::WorkflowError;
use super::utils::new_uuid_to_bech32;
use chrono::Utc;

/// Content floor for a guest response. Anything shorter is rejected as
/// validation failure rather than recorded.
pub const MIN_RESPONSE_CHARS: usize = 100;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum ClaimStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    UnderReview,
    #[n(2)]
    Approved,
    #[n(3)]
    Denied,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Denied => "denied",
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClaimStatus::Approved | ClaimStatus::Denied)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum FiledBy {
    #[n(0)]
    Guest,
    #[n(1)]
    Host,
}

impl FiledBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiledBy::Guest => "guest",
            FiledBy::Host => "host",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum ClaimType {
    #[n(0)]
    Damage,
    #[n(1)]
    Cleaning,
    #[n(2)]
    Fuel,
    #[n(3)]
    LateReturn,
    #[n(4)]
    Other,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimType::Damage => "damage",
            ClaimType::Cleaning => "cleaning",
            ClaimType::Fuel => "fuel",
            ClaimType::LateReturn => "late_return",
            ClaimType::Other => "other",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum FaultAttribution {
    #[n(0)]
    Guest,
    #[n(1)]
    Host,
    #[n(2)]
    ThirdParty,
    #[n(3)]
    Undetermined,
}

/// Operator decision when closing a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Approved,
    Denied,
}

/// Policy knobs for the response window. The window length lands inside the
/// usual 24 to 72 hour band.
#[derive(Debug, Clone)]
pub struct ClaimPolicy {
    pub response_window_hours: i64,
    pub urgency_threshold_hours: i64,
    pub hold_counterparty_account: bool,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            response_window_hours: 48,
            urgency_threshold_hours: 12,
            hold_counterparty_account: true,
        }
    }
}

/// Snapshot of the response window derived from `(deadline, now)`. Computed
/// on every read and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseWindow {
    pub hours_remaining: i64,
    pub minutes_remaining: i64,
    pub is_urgent: bool,
    pub expired: bool,
}

/// Pure derivation of the window state. `expired` flips exactly when `now`
/// reaches the deadline, the remaining counts clamp at zero.
pub fn response_window(
    deadline: &TimeStamp<Utc>,
    now: &TimeStamp<Utc>,
    urgency_threshold_hours: i64,
) -> ResponseWindow {
    let expired = now.to_datetime_utc() >= deadline.to_datetime_utc();
    let minutes_remaining = now.minutes_until(deadline).max(0);
    ResponseWindow {
        hours_remaining: minutes_remaining / 60,
        minutes_remaining,
        is_urgent: !expired && minutes_remaining <= urgency_threshold_hours * 60,
        expired,
    }
}

// Key is the claim id, booking_id is the foreign reference back to the
// booking the incident happened on.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ClaimRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub booking_id: String,
    #[n(2)]
    pub filed_by: FiledBy,
    #[n(3)]
    pub claim_type: ClaimType,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub photos: Vec<String>,
    #[n(6)]
    pub estimated_cost: Option<u64>,
    #[n(7)]
    pub approved_amount: Option<u64>,
    #[n(8)]
    pub deductible: Option<u64>,
    #[n(9)]
    pub fault: FaultAttribution,
    #[n(10)]
    pub status: ClaimStatus,
    #[n(11)]
    pub filed_at: TimeStamp<Utc>,
    #[n(12)]
    pub response_deadline: TimeStamp<Utc>,
    #[n(13)]
    pub needs_response: bool,
    #[n(14)]
    pub has_responded: bool,
    #[n(15)]
    pub guest_response_text: Option<String>,
    #[n(16)]
    pub guest_response_photos: Vec<String>,
    #[n(17)]
    pub guest_response_date: Option<TimeStamp<Utc>>,
    #[n(18)]
    pub account_hold_applied: bool,
    #[n(19)]
    pub escalated_at: Option<TimeStamp<Utc>>,
    #[n(20)]
    pub resolution_notes: Option<String>,
    #[n(21)]
    pub resolved_at: Option<TimeStamp<Utc>>,
    #[n(22)]
    pub updated_at: TimeStamp<Utc>,
    #[n(23)]
    pub version: u64,
}

/// A claim together with its derived window, the shape handed to callers.
/// `account_hold_active` is the effective hold: the stored flag only counts
/// while the responder still has time and has not responded.
#[derive(Debug, Clone)]
pub struct ClaimView {
    pub claim: ClaimRecord,
    pub window: ResponseWindow,
    pub account_hold_active: bool,
}

impl ClaimRecord {
    /// File a new claim. The response deadline is fixed here and never
    /// changes afterwards. Only a host-filed claim obligates the guest to
    /// respond, and only then is the counterparty account hold applied.
    pub fn file(
        booking_id: &str,
        filed_by: FiledBy,
        claim_type: ClaimType,
        description: &str,
        estimated_cost: Option<u64>,
        photos: Vec<String>,
        policy: &ClaimPolicy,
        now: TimeStamp<Utc>,
    ) -> Result<Self, WorkflowError> {
        if description.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "claim description must not be empty".into(),
            ));
        }
        let id = new_uuid_to_bech32("claim_")?;
        let needs_response = filed_by == FiledBy::Host;

        Ok(Self {
            id,
            booking_id: booking_id.to_string(),
            filed_by,
            claim_type,
            description: description.to_string(),
            photos,
            estimated_cost,
            approved_amount: None,
            deductible: None,
            fault: FaultAttribution::Undetermined,
            status: ClaimStatus::Pending,
            filed_at: now.clone(),
            response_deadline: now.plus_hours(policy.response_window_hours),
            needs_response,
            has_responded: false,
            guest_response_text: None,
            guest_response_photos: Vec::new(),
            guest_response_date: None,
            account_hold_applied: needs_response && policy.hold_counterparty_account,
            escalated_at: None,
            resolution_notes: None,
            resolved_at: None,
            updated_at: now,
            version: 0,
        })
    }

    pub fn deadline_expired(&self, now: &TimeStamp<Utc>) -> bool {
        now.to_datetime_utc() >= self.response_deadline.to_datetime_utc()
    }

    pub fn window(&self, now: &TimeStamp<Utc>, policy: &ClaimPolicy) -> ResponseWindow {
        response_window(&self.response_deadline, now, policy.urgency_threshold_hours)
    }

    pub fn account_hold_active(&self, now: &TimeStamp<Utc>) -> bool {
        self.account_hold_applied && !self.has_responded && !self.deadline_expired(now)
    }

    /// Record the guest side of the story. Legal exactly once, and only
    /// while the window is still open.
    pub fn submit_response(
        &mut self,
        text: &str,
        photos: Vec<String>,
        now: TimeStamp<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.status.is_terminal() {
            return Err(WorkflowError::invalid_transition(
                "claim",
                "submit response",
                self.status.as_str(),
            ));
        }
        if self.has_responded {
            return Err(WorkflowError::PreconditionNotMet(
                "a response has already been submitted".into(),
            ));
        }
        if self.deadline_expired(&now) {
            return Err(WorkflowError::PreconditionNotMet(
                "the response window has closed".into(),
            ));
        }
        if text.chars().count() < MIN_RESPONSE_CHARS {
            return Err(WorkflowError::Validation(format!(
                "response text must be at least {MIN_RESPONSE_CHARS} characters"
            )));
        }
        self.has_responded = true;
        self.guest_response_text = Some(text.to_string());
        self.guest_response_photos = photos;
        self.guest_response_date = Some(now);
        self.account_hold_applied = false;
        self.status = ClaimStatus::UnderReview;
        Ok(())
    }

    /// Operator resolution. Guarded so a claim cannot be closed while the
    /// counterparty still has time to respond. An expired window permits
    /// resolution without a response, expiry escalates rather than
    /// auto-denies.
    pub fn resolve(
        &mut self,
        outcome: ClaimOutcome,
        approved_amount: Option<u64>,
        notes: Option<String>,
        now: TimeStamp<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.status.is_terminal() {
            return Err(WorkflowError::invalid_transition(
                "claim",
                "resolve",
                self.status.as_str(),
            ));
        }
        if self.needs_response && !self.has_responded && !self.deadline_expired(&now) {
            return Err(WorkflowError::PreconditionNotMet(
                "the response window is still open".into(),
            ));
        }
        match outcome {
            ClaimOutcome::Approved => {
                let amount = approved_amount.ok_or_else(|| {
                    WorkflowError::Validation("an approved claim requires an approved amount".into())
                })?;
                self.approved_amount = Some(amount);
                self.status = ClaimStatus::Approved;
            }
            ClaimOutcome::Denied => {
                self.status = ClaimStatus::Denied;
            }
        }
        self.resolution_notes = notes;
        self.resolved_at = Some(now);
        self.account_hold_applied = false;
        Ok(())
    }

    /// One-time marker that the window lapsed unanswered. Returns whether
    /// the claim was newly escalated so the caller can alert an operator
    /// exactly once. Expiry itself is always re-derived from the deadline,
    /// this only tracks that the alert fired.
    pub fn escalate(&mut self, now: TimeStamp<Utc>) -> bool {
        if !self.needs_response
            || self.has_responded
            || self.status.is_terminal()
            || self.escalated_at.is_some()
            || !self.deadline_expired(&now)
        {
            return false;
        }
        self.escalated_at = Some(now);
        self.account_hold_applied = false;
        true
    }
}
