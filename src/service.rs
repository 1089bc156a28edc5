//! Service layer API for booking and claim workflow operations
//!
//! Every command follows the same shape: read the current time, load the
//! authoritative record, validate the action against it, commit the mutated
//! copy with a compare-and-swap, append one activity entry, then dispatch
//! the notification for whoever owns the next step. Commands return the full
//! updated record.

use super::activity::{ActivityEntry, ActivityLog};
use super::booking::{BookingDraft, BookingRecord, LifecycleStatus};
use super::claim::{
    ClaimOutcome, ClaimPolicy, ClaimRecord, ClaimType, ClaimView, FiledBy,
};
use super::clock::{Clock, TimeStamp};
use super::error::WorkflowError;
use super::notify::{Channel, Notification, NotificationEvent, NotificationGateway};
use super::store::RecordStore;
use chrono::Utc;
use std::sync::Arc;

/// In-app recipient for alerts that need an operator rather than a
/// counterparty, new bookings awaiting fleet review and overdue claims.
pub const OPERATIONS_DESK: &str = "operations_desk";

pub struct BookingService {
    store: RecordStore,
    log: ActivityLog,
    clock: Arc<dyn Clock>,
    gateway: Arc<dyn NotificationGateway>,
    policy: ClaimPolicy,
}

impl BookingService {
    pub fn new(
        instance: Arc<sled::Db>,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self::with_policy(instance, clock, gateway, ClaimPolicy::default())
    }

    pub fn with_policy(
        instance: Arc<sled::Db>,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn NotificationGateway>,
        policy: ClaimPolicy,
    ) -> Self {
        Self {
            store: RecordStore::new(instance.clone()),
            log: ActivityLog::new(instance),
            clock,
            gateway,
            policy,
        }
    }

    pub fn policy(&self) -> &ClaimPolicy {
        &self.policy
    }

    // A failed dispatch never fails the transition that produced it.
    fn dispatch(&self, channel: Channel, recipient: &str, event: NotificationEvent) {
        let notification = Notification {
            channel,
            recipient: recipient.to_string(),
            event,
        };
        if let Err(err) = self.gateway.send(notification) {
            tracing::warn!(error = %err, recipient, "notification dispatch failed");
        }
    }

    /// Create a booking from a validated draft. The payment is authorized at
    /// creation and the fleet tier becomes responsible for the next step.
    pub fn create_booking(&self, draft: BookingDraft) -> Result<BookingRecord, WorkflowError> {
        let now = self.clock.now();
        let record = draft.validate_and_finalise(now.clone())?;

        self.store.insert_booking(&record)?;

        self.log.append(
            &ActivityEntry::new(&record.id, "booking.created", "guest", now)
                .with_meta("code", record.code.clone())
                .with_meta("vehicle", record.vehicle_id.clone()),
        )?;
        self.dispatch(
            Channel::InApp,
            OPERATIONS_DESK,
            NotificationEvent::FleetReviewRequested {
                booking_id: record.id.clone(),
            },
        );

        Ok(record)
    }

    /// First-tier approval. Advances the booking to the host tier, payment
    /// stays authorized until the host also approves.
    pub fn approve_fleet_tier(
        &self,
        booking_id: &str,
        notes: Option<&str>,
    ) -> Result<BookingRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.approve_fleet()?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        let mut entry = ActivityEntry::new(booking_id, "booking.fleet_approved", "fleet_operator", now);
        if let Some(notes) = notes {
            entry = entry.with_meta("notes", notes);
        }
        self.log.append(&entry)?;

        // the host tier is now responsible for the final approval
        self.dispatch(
            Channel::Email,
            &record.host_id,
            NotificationEvent::HostReviewRequested {
                booking_id: record.id.clone(),
            },
        );

        Ok(record)
    }

    /// First-tier rejection. Terminal: cancels the booking and releases the
    /// payment authorization.
    pub fn reject_fleet_tier(
        &self,
        booking_id: &str,
        reason: &str,
    ) -> Result<BookingRecord, WorkflowError> {
        if reason.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "a rejection reason is required".into(),
            ));
        }
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.reject_fleet(reason, "fleet_operator", now.clone())?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        self.log.append(
            &ActivityEntry::new(booking_id, "booking.fleet_rejected", "fleet_operator", now)
                .with_meta("reason", reason),
        )?;
        self.dispatch(
            Channel::Email,
            &record.guest_id,
            NotificationEvent::BookingRejected {
                booking_id: record.id.clone(),
                reason: reason.to_string(),
            },
        );

        Ok(record)
    }

    /// Second-tier approval by the host. Only legal once the fleet tier has
    /// approved. Captures payment and confirms the booking.
    pub fn approve_host_tier(&self, booking_id: &str) -> Result<BookingRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.approve_host()?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        self.log
            .append(&ActivityEntry::new(booking_id, "booking.host_approved", "host", now))?;
        self.dispatch(
            Channel::Email,
            &record.guest_id,
            NotificationEvent::BookingConfirmed {
                booking_id: record.id.clone(),
                code: record.code.clone(),
            },
        );

        Ok(record)
    }

    /// Suspend a confirmed booking pending identity documents. Calling this
    /// on a booking already on hold extends the document request.
    pub fn request_verification_documents(
        &self,
        booking_id: &str,
        document_types: Vec<String>,
        deadline: Option<TimeStamp<Utc>>,
        message: Option<String>,
    ) -> Result<BookingRecord, WorkflowError> {
        if document_types.is_empty() {
            return Err(WorkflowError::Validation(
                "at least one document type is required".into(),
            ));
        }
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.place_hold(
            document_types.clone(),
            deadline.clone(),
            message.clone(),
            "fleet_operator",
            now.clone(),
        )?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        self.log.append(
            &ActivityEntry::new(booking_id, "booking.hold_placed", "fleet_operator", now)
                .with_meta("documents", document_types.join(",")),
        )?;
        self.dispatch(
            Channel::Email,
            &record.guest_id,
            NotificationEvent::DocumentsRequested {
                booking_id: record.id.clone(),
                document_types,
                deadline,
                message,
            },
        );

        Ok(record)
    }

    /// Lift an active hold, restoring the lifecycle status recorded when the
    /// hold was placed and marking verification approved.
    pub fn release_hold(&self, booking_id: &str) -> Result<BookingRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.release_hold()?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        self.log
            .append(&ActivityEntry::new(booking_id, "booking.hold_released", "fleet_operator", now))?;
        self.dispatch(
            Channel::Email,
            &record.guest_id,
            NotificationEvent::HoldReleased {
                booking_id: record.id.clone(),
            },
        );

        Ok(record)
    }

    /// Cancel a booking that has not finished. Always releases the payment
    /// and records who cancelled and why.
    pub fn cancel_booking(
        &self,
        booking_id: &str,
        reason: &str,
        actor: &str,
    ) -> Result<BookingRecord, WorkflowError> {
        if reason.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "a cancellation reason is required".into(),
            ));
        }
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.cancel(reason, actor, now.clone())?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        self.log.append(
            &ActivityEntry::new(booking_id, "booking.cancelled", actor, now)
                .with_meta("reason", reason),
        )?;

        // alert the counterparty of whoever cancelled
        let recipient = if actor == record.guest_id {
            &record.host_id
        } else {
            &record.guest_id
        };
        self.dispatch(
            Channel::Email,
            recipient,
            NotificationEvent::BookingCancelled {
                booking_id: record.id.clone(),
                reason: reason.to_string(),
            },
        );

        Ok(record)
    }

    pub fn start_trip(&self, booking_id: &str) -> Result<BookingRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.start_trip()?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        self.log
            .append(&ActivityEntry::new(booking_id, "booking.trip_started", "guest", now))?;

        Ok(record)
    }

    pub fn end_trip(&self, booking_id: &str) -> Result<BookingRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.end_trip()?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        self.log
            .append(&ActivityEntry::new(booking_id, "booking.trip_ended", "guest", now))?;

        Ok(record)
    }

    /// Complete a booking whose trip has ended. Opens the host final review
    /// window, the last chance to file a claim before the deposit releases.
    pub fn complete_booking(&self, booking_id: &str) -> Result<BookingRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut record, prior) = self.store.load_booking(booking_id)?;

        record.complete()?;
        self.store.commit_booking(&mut record, &prior, now.clone())?;

        self.log
            .append(&ActivityEntry::new(booking_id, "booking.completed", "system", now))?;
        self.dispatch(
            Channel::Email,
            &record.host_id,
            NotificationEvent::FinalReviewOpened {
                booking_id: record.id.clone(),
            },
        );

        Ok(record)
    }

    /// File a damage or incident claim against an active or completed
    /// booking. A claim against a completed booking reopens it for dispute
    /// review. The response deadline is fixed here, once, from policy.
    pub fn file_claim(
        &self,
        booking_id: &str,
        filed_by: FiledBy,
        claim_type: ClaimType,
        description: &str,
        estimated_cost: Option<u64>,
        photos: Vec<String>,
    ) -> Result<ClaimRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut booking, prior) = self.store.load_booking(booking_id)?;

        if !matches!(
            booking.lifecycle,
            LifecycleStatus::Active | LifecycleStatus::Completed | LifecycleStatus::DisputeReview
        ) {
            return Err(WorkflowError::invalid_transition(
                "booking",
                "file claim",
                booking.lifecycle.as_str(),
            ));
        }

        let claim = ClaimRecord::file(
            booking_id,
            filed_by,
            claim_type,
            description,
            estimated_cost,
            photos,
            &self.policy,
            now.clone(),
        )?;
        self.store.insert_claim(&claim)?;

        if booking.lifecycle == LifecycleStatus::Completed {
            booking.open_dispute_review()?;
            self.store.commit_booking(&mut booking, &prior, now.clone())?;
            self.log.append(
                &ActivityEntry::new(booking_id, "booking.dispute_opened", claim.filed_by.as_str(), now.clone())
                    .with_meta("claim", claim.id.clone()),
            )?;
        }

        self.log.append(
            &ActivityEntry::new(&claim.id, "claim.filed", claim.filed_by.as_str(), now)
                .with_meta("booking", booking_id)
                .with_meta("type", claim.claim_type.as_str()),
        )?;

        let recipient = match claim.filed_by {
            FiledBy::Host => &booking.guest_id,
            FiledBy::Guest => &booking.host_id,
        };
        self.dispatch(
            Channel::Email,
            recipient,
            NotificationEvent::ClaimFiled {
                claim_id: claim.id.clone(),
                booking_id: booking.id.clone(),
                response_deadline: claim.response_deadline.clone(),
                needs_response: claim.needs_response,
            },
        );

        Ok(claim)
    }

    /// Record the guest response to a claim. Legal once, inside the window,
    /// with enough text to be reviewable. Clears the counterparty account
    /// hold and moves the claim under review.
    pub fn submit_claim_response(
        &self,
        claim_id: &str,
        response_text: &str,
        photos: Vec<String>,
    ) -> Result<ClaimRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut claim, prior) = self.store.load_claim(claim_id)?;

        claim.submit_response(response_text, photos, now.clone())?;
        self.store.commit_claim(&mut claim, &prior, now.clone())?;

        self.log
            .append(&ActivityEntry::new(claim_id, "claim.response_submitted", "guest", now))?;

        let (booking, _) = self.store.load_booking(&claim.booking_id)?;
        let recipient = match claim.filed_by {
            FiledBy::Host => &booking.host_id,
            FiledBy::Guest => &booking.guest_id,
        };
        self.dispatch(
            Channel::Email,
            recipient,
            NotificationEvent::ClaimResponseReceived {
                claim_id: claim.id.clone(),
            },
        );

        Ok(claim)
    }

    /// Operator resolution of a claim. Once the booking's last open claim
    /// resolves, a booking sitting in dispute review returns to completed.
    pub fn resolve_claim(
        &self,
        claim_id: &str,
        outcome: ClaimOutcome,
        approved_amount: Option<u64>,
        notes: Option<&str>,
    ) -> Result<ClaimRecord, WorkflowError> {
        let now = self.clock.now();
        let (mut claim, prior) = self.store.load_claim(claim_id)?;

        claim.resolve(outcome, approved_amount, notes.map(str::to_string), now.clone())?;
        self.store.commit_claim(&mut claim, &prior, now.clone())?;

        let (mut booking, booking_prior) = self.store.load_booking(&claim.booking_id)?;
        if booking.lifecycle == LifecycleStatus::DisputeReview {
            let still_open = self
                .store
                .claims_for_booking(&claim.booking_id)?
                .iter()
                .any(|other| !other.status.is_terminal());
            if !still_open {
                booking.close_dispute_review()?;
                self.store
                    .commit_booking(&mut booking, &booking_prior, now.clone())?;
                self.log.append(
                    &ActivityEntry::new(&booking.id, "booking.dispute_closed", "operator", now.clone())
                        .with_meta("claim", claim.id.clone()),
                )?;
            }
        }

        self.log.append(
            &ActivityEntry::new(claim_id, "claim.resolved", "operator", now)
                .with_meta("outcome", claim.status.as_str()),
        )?;
        self.dispatch(
            Channel::Email,
            &booking.guest_id,
            NotificationEvent::ClaimResolved {
                claim_id: claim.id.clone(),
                outcome: claim.status.as_str().to_string(),
            },
        );

        Ok(claim)
    }

    /// Flag claims whose response window lapsed unanswered and alert the
    /// operations desk, once per claim. Never auto-denies. Expiry is also
    /// re-derived on every read, so nothing breaks when this is not running.
    pub fn sweep_expired_claims(&self) -> Result<Vec<String>, WorkflowError> {
        let now = self.clock.now();
        let mut escalated = Vec::new();

        for candidate in self.store.all_claims()? {
            if !candidate.needs_response
                || candidate.has_responded
                || candidate.status.is_terminal()
                || candidate.escalated_at.is_some()
                || !candidate.deadline_expired(&now)
            {
                continue;
            }
            // re-read the authoritative copy before committing the marker
            let (mut claim, prior) = self.store.load_claim(&candidate.id)?;
            if !claim.escalate(now.clone()) {
                continue;
            }
            self.store.commit_claim(&mut claim, &prior, now.clone())?;

            self.log.append(
                &ActivityEntry::new(&claim.id, "claim.response_overdue", "system", now.clone())
                    .with_meta("booking", claim.booking_id.clone()),
            )?;
            self.dispatch(
                Channel::InApp,
                OPERATIONS_DESK,
                NotificationEvent::ClaimResponseOverdue {
                    claim_id: claim.id.clone(),
                    booking_id: claim.booking_id.clone(),
                },
            );
            escalated.push(claim.id);
        }

        Ok(escalated)
    }

    /// A claim together with its response window derived at this instant.
    pub fn claim_view(&self, claim_id: &str) -> Result<ClaimView, WorkflowError> {
        let now = self.clock.now();
        let (claim, _) = self.store.load_claim(claim_id)?;
        let window = claim.window(&now, &self.policy);
        let account_hold_active = claim.account_hold_active(&now);

        Ok(ClaimView {
            claim,
            window,
            account_hold_active,
        })
    }

    pub fn get_booking(&self, booking_id: &str) -> Result<BookingRecord, WorkflowError> {
        self.store.load_booking(booking_id).map(|(record, _)| record)
    }

    pub fn get_claim(&self, claim_id: &str) -> Result<ClaimRecord, WorkflowError> {
        self.store.load_claim(claim_id).map(|(record, _)| record)
    }

    /// Audit trail for one booking or claim, oldest entry first.
    pub fn history(&self, entity_id: &str) -> Result<Vec<ActivityEntry>, WorkflowError> {
        self.log.entries_for(entity_id)
    }
}
