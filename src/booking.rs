//! Booking records and their lifecycle transitions.
//!
//! A booking carries several status dimensions that move independently: the
//! overall lifecycle, the two review tiers gating payment capture, identity
//! verification, payment and the trip itself. Every mutation goes through a
//! transition method that checks the current state first, so a caller can
//! never drive a record into an illegal combination.

use super::clock::TimeStamp;
use super::error::WorkflowError;
use super::utils::{new_uuid_to_bech32, short_code};
use chrono::Utc;

/// Risk scores at or above this are flagged for a closer look during review.
pub const RISK_FLAG_THRESHOLD: u8 = 75;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Active,
    #[n(3)]
    OnHold,
    #[n(4)]
    Completed,
    #[n(5)]
    Cancelled,
    #[n(6)]
    DisputeReview,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::Pending => "pending",
            LifecycleStatus::Confirmed => "confirmed",
            LifecycleStatus::Active => "active",
            LifecycleStatus::OnHold => "on_hold",
            LifecycleStatus::Completed => "completed",
            LifecycleStatus::Cancelled => "cancelled",
            LifecycleStatus::DisputeReview => "dispute_review",
        }
    }
    /// Completed and Cancelled accept no further lifecycle actions. A claim
    /// filed against a completed booking reopens it through
    /// [`BookingRecord::open_dispute_review`], which has its own guard.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleStatus::Completed | LifecycleStatus::Cancelled)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum FleetReviewStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

impl FleetReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FleetReviewStatus::Pending => "pending",
            FleetReviewStatus::Approved => "approved",
            FleetReviewStatus::Rejected => "rejected",
        }
    }
}

// The host tier cannot reject. A host that refuses a booking cancels it
// instead, which releases the authorization.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum HostReviewStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
}

impl HostReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostReviewStatus::Pending => "pending",
            HostReviewStatus::Approved => "approved",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    #[n(0)]
    Authorized,
    #[n(1)]
    Captured,
    #[n(2)]
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum TripStatus {
    #[n(0)]
    NotStarted,
    #[n(1)]
    InProgress,
    #[n(2)]
    Ended,
}

/// The window after completion during which the host may still file a
/// damage claim before the deposit is released.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum HostFinalReviewStatus {
    #[n(0)]
    NotStarted,
    #[n(1)]
    PendingReview,
    #[n(2)]
    Closed,
}

/// Present only while the booking is on hold. Records what to restore when
/// the hold is released. The deadline is advisory, it is surfaced to the
/// guest but nothing fires when it passes.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct HoldState {
    #[n(0)]
    pub reason: String,
    #[n(1)]
    pub set_at: TimeStamp<Utc>,
    #[n(2)]
    pub set_by: String,
    #[n(3)]
    pub deadline: Option<TimeStamp<Utc>>,
    #[n(4)]
    pub message: Option<String>,
    #[n(5)]
    pub prior_status: LifecycleStatus,
    #[n(6)]
    pub requested_documents: Vec<String>,
}

// Key is the booking id. Amounts are integer minor units.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct BookingRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub code: String,
    #[n(2)]
    pub guest_id: String,
    #[n(3)]
    pub host_id: String,
    #[n(4)]
    pub vehicle_id: String,
    #[n(5)]
    pub start_date: TimeStamp<Utc>,
    #[n(6)]
    pub end_date: TimeStamp<Utc>,
    #[n(7)]
    pub total_amount: u64,
    #[n(8)]
    pub deposit_amount: u64,
    #[n(9)]
    pub lifecycle: LifecycleStatus,
    #[n(10)]
    pub fleet_review: FleetReviewStatus,
    #[n(11)]
    pub host_review: HostReviewStatus,
    #[n(12)]
    pub verification: VerificationStatus,
    #[n(13)]
    pub payment: PaymentStatus,
    #[n(14)]
    pub trip: TripStatus,
    #[n(15)]
    pub hold: Option<HoldState>,
    #[n(16)]
    pub host_final_review: HostFinalReviewStatus,
    #[n(17)]
    pub risk_score: u8,
    #[n(18)]
    pub flagged_for_review: bool,
    #[n(19)]
    pub cancellation_reason: Option<String>,
    #[n(20)]
    pub cancelled_at: Option<TimeStamp<Utc>>,
    #[n(21)]
    pub cancelled_by: Option<String>,
    #[n(22)]
    pub created_at: TimeStamp<Utc>,
    #[n(23)]
    pub updated_at: TimeStamp<Utc>,
    #[n(24)]
    pub version: u64,
}

// Used for constructing drafts. The record itself only ever comes out of
// validate_and_finalise so a booking always starts from a checked shape.
#[derive(Debug, Default)]
pub struct BookingDraft {
    guest_id: Option<String>,
    host_id: Option<String>,
    vehicle_id: Option<String>,
    start_date: Option<TimeStamp<Utc>>,
    end_date: Option<TimeStamp<Utc>>,
    total_amount: u64,
    deposit_amount: u64,
    risk_score: u8,
}

impl BookingDraft {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_guest(mut self, guest_id: impl Into<String>) -> Self {
        self.guest_id = Some(guest_id.into());
        self
    }
    pub fn set_host(mut self, host_id: impl Into<String>) -> Self {
        self.host_id = Some(host_id.into());
        self
    }
    pub fn set_vehicle(mut self, vehicle_id: impl Into<String>) -> Self {
        self.vehicle_id = Some(vehicle_id.into());
        self
    }
    pub fn set_start_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.start_date = Some(date);
        self
    }
    pub fn set_end_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.end_date = Some(date);
        self
    }
    pub fn set_total_amount(mut self, amount: u64) -> Self {
        self.total_amount = amount;
        self
    }
    pub fn set_deposit_amount(mut self, amount: u64) -> Self {
        self.deposit_amount = amount;
        self
    }
    pub fn set_risk_score(mut self, score: u8) -> Self {
        self.risk_score = score;
        self
    }
    /// Checks the predicate `start_date <= end_date` holds for the rental window
    pub fn validate_dates(&self) -> bool {
        match (self.start_date.as_ref(), self.end_date.as_ref()) {
            (Some(start), Some(end)) => start.to_datetime_utc() <= end.to_datetime_utc(),
            _ => false,
        }
    }
    // Checks fields, and performs validation. Returns the initial record with
    // the payment authorized and every review tier still pending.
    pub fn validate_and_finalise(self, now: TimeStamp<Utc>) -> Result<BookingRecord, WorkflowError> {
        let dates_ok = self.validate_dates();
        let guest_id = self
            .guest_id
            .ok_or_else(|| WorkflowError::Validation("guest is not set".into()))?;
        let host_id = self
            .host_id
            .ok_or_else(|| WorkflowError::Validation("host is not set".into()))?;
        let vehicle_id = self
            .vehicle_id
            .ok_or_else(|| WorkflowError::Validation("vehicle is not set".into()))?;
        if self.total_amount == 0 {
            return Err(WorkflowError::Validation("total amount is set to zero".into()));
        }
        if self.risk_score > 100 {
            return Err(WorkflowError::Validation(
                "risk score must be within 0..=100".into(),
            ));
        }
        if !dates_ok {
            return Err(WorkflowError::Validation(
                "start date must be set and must not be after end date".into(),
            ));
        }
        let start_date = self.start_date.expect("checked by validate_dates");
        let end_date = self.end_date.expect("checked by validate_dates");

        let id = new_uuid_to_bech32("bkg_")?;
        let code = short_code(&id);

        Ok(BookingRecord {
            id,
            code,
            guest_id,
            host_id,
            vehicle_id,
            start_date,
            end_date,
            total_amount: self.total_amount,
            deposit_amount: self.deposit_amount,
            lifecycle: LifecycleStatus::Pending,
            fleet_review: FleetReviewStatus::Pending,
            host_review: HostReviewStatus::Pending,
            verification: VerificationStatus::Pending,
            payment: PaymentStatus::Authorized,
            trip: TripStatus::NotStarted,
            hold: None,
            host_final_review: HostFinalReviewStatus::NotStarted,
            risk_score: self.risk_score,
            flagged_for_review: self.risk_score >= RISK_FLAG_THRESHOLD,
            cancellation_reason: None,
            cancelled_at: None,
            cancelled_by: None,
            created_at: now.clone(),
            updated_at: now,
            version: 0,
        })
    }
}

impl BookingRecord {
    /// First-line review. Approval hands the booking to the host tier, it
    /// does not capture payment.
    pub fn approve_fleet(&mut self) -> Result<(), WorkflowError> {
        if self.lifecycle.is_terminal() {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "approve fleet tier",
                self.lifecycle.as_str(),
            ));
        }
        if self.fleet_review != FleetReviewStatus::Pending {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "approve fleet tier",
                self.fleet_review.as_str(),
            ));
        }
        self.fleet_review = FleetReviewStatus::Approved;
        Ok(())
    }

    /// First-line rejection. Terminal, the booking is cancelled and the
    /// payment authorization released.
    pub fn reject_fleet(
        &mut self,
        reason: &str,
        actor: &str,
        now: TimeStamp<Utc>,
    ) -> Result<(), WorkflowError> {
        if self.lifecycle.is_terminal() {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "reject fleet tier",
                self.lifecycle.as_str(),
            ));
        }
        if self.fleet_review != FleetReviewStatus::Pending {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "reject fleet tier",
                self.fleet_review.as_str(),
            ));
        }
        self.fleet_review = FleetReviewStatus::Rejected;
        self.lifecycle = LifecycleStatus::Cancelled;
        self.payment = PaymentStatus::Cancelled;
        self.hold = None;
        self.cancellation_reason = Some(reason.to_string());
        self.cancelled_at = Some(now);
        self.cancelled_by = Some(actor.to_string());
        Ok(())
    }

    /// Second-line review by the vehicle owner. This is the only place
    /// payment capture happens, which keeps capture impossible without both
    /// approvals.
    pub fn approve_host(&mut self) -> Result<(), WorkflowError> {
        if self.lifecycle.is_terminal() {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "approve host tier",
                self.lifecycle.as_str(),
            ));
        }
        if self.fleet_review != FleetReviewStatus::Approved {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "approve host tier before fleet tier",
                self.fleet_review.as_str(),
            ));
        }
        if self.host_review != HostReviewStatus::Pending {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "approve host tier",
                self.host_review.as_str(),
            ));
        }
        self.host_review = HostReviewStatus::Approved;
        self.payment = PaymentStatus::Captured;
        self.lifecycle = LifecycleStatus::Confirmed;
        Ok(())
    }

    /// Suspend a confirmed booking pending identity documents. Calling this
    /// while already on hold extends the existing request and keeps the
    /// recorded prior status.
    pub fn place_hold(
        &mut self,
        requested_documents: Vec<String>,
        deadline: Option<TimeStamp<Utc>>,
        message: Option<String>,
        set_by: &str,
        now: TimeStamp<Utc>,
    ) -> Result<(), WorkflowError> {
        match self.lifecycle {
            LifecycleStatus::Confirmed => {
                self.hold = Some(HoldState {
                    reason: "identity verification".to_string(),
                    set_at: now,
                    set_by: set_by.to_string(),
                    deadline,
                    message,
                    prior_status: self.lifecycle.clone(),
                    requested_documents,
                });
                self.lifecycle = LifecycleStatus::OnHold;
                self.verification = VerificationStatus::Pending;
                Ok(())
            }
            LifecycleStatus::OnHold => {
                if let Some(hold) = self.hold.as_mut() {
                    for document in requested_documents {
                        if !hold.requested_documents.contains(&document) {
                            hold.requested_documents.push(document);
                        }
                    }
                    if deadline.is_some() {
                        hold.deadline = deadline;
                    }
                    if message.is_some() {
                        hold.message = message;
                    }
                }
                self.verification = VerificationStatus::Pending;
                Ok(())
            }
            _ => Err(WorkflowError::invalid_transition(
                "booking",
                "request verification documents",
                self.lifecycle.as_str(),
            )),
        }
    }

    /// Lift an active hold and restore the status recorded when it was
    /// placed. Falls back to Confirmed when no prior status was recorded.
    pub fn release_hold(&mut self) -> Result<(), WorkflowError> {
        if self.lifecycle != LifecycleStatus::OnHold {
            return Err(WorkflowError::PreconditionNotMet(
                "there is no active hold to release".into(),
            ));
        }
        self.lifecycle = self
            .hold
            .take()
            .map(|hold| hold.prior_status)
            .unwrap_or(LifecycleStatus::Confirmed);
        self.verification = VerificationStatus::Approved;
        Ok(())
    }

    /// Cancel from any state that has not finished yet. Always releases the
    /// payment, whether it was still authorized or already captured.
    pub fn cancel(
        &mut self,
        reason: &str,
        actor: &str,
        now: TimeStamp<Utc>,
    ) -> Result<(), WorkflowError> {
        match self.lifecycle {
            LifecycleStatus::Pending
            | LifecycleStatus::Confirmed
            | LifecycleStatus::Active
            | LifecycleStatus::OnHold => {
                self.lifecycle = LifecycleStatus::Cancelled;
                self.payment = PaymentStatus::Cancelled;
                self.hold = None;
                self.cancellation_reason = Some(reason.to_string());
                self.cancelled_at = Some(now);
                self.cancelled_by = Some(actor.to_string());
                Ok(())
            }
            _ => Err(WorkflowError::invalid_transition(
                "booking",
                "cancel",
                self.lifecycle.as_str(),
            )),
        }
    }

    pub fn start_trip(&mut self) -> Result<(), WorkflowError> {
        if self.lifecycle != LifecycleStatus::Confirmed || self.trip != TripStatus::NotStarted {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "start trip",
                self.lifecycle.as_str(),
            ));
        }
        self.lifecycle = LifecycleStatus::Active;
        self.trip = TripStatus::InProgress;
        Ok(())
    }

    pub fn end_trip(&mut self) -> Result<(), WorkflowError> {
        if self.lifecycle != LifecycleStatus::Active || self.trip != TripStatus::InProgress {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "end trip",
                self.lifecycle.as_str(),
            ));
        }
        self.trip = TripStatus::Ended;
        Ok(())
    }

    /// Close out an ended trip. Opens the host final review window during
    /// which the host may still file a damage claim.
    pub fn complete(&mut self) -> Result<(), WorkflowError> {
        if self.lifecycle != LifecycleStatus::Active || self.trip != TripStatus::Ended {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "complete",
                self.lifecycle.as_str(),
            ));
        }
        self.lifecycle = LifecycleStatus::Completed;
        self.host_final_review = HostFinalReviewStatus::PendingReview;
        Ok(())
    }

    /// A claim filed against a completed booking reopens it for review.
    pub fn open_dispute_review(&mut self) -> Result<(), WorkflowError> {
        if self.lifecycle != LifecycleStatus::Completed {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "open dispute review",
                self.lifecycle.as_str(),
            ));
        }
        self.lifecycle = LifecycleStatus::DisputeReview;
        Ok(())
    }

    /// Return to Completed once the last open claim has resolved. Also
    /// closes the host final review window.
    pub fn close_dispute_review(&mut self) -> Result<(), WorkflowError> {
        if self.lifecycle != LifecycleStatus::DisputeReview {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "close dispute review",
                self.lifecycle.as_str(),
            ));
        }
        self.lifecycle = LifecycleStatus::Completed;
        self.host_final_review = HostFinalReviewStatus::Closed;
        Ok(())
    }
}
