//! Property-based tests for booking lifecycle invariants
//!
//! This module uses proptest to drive a booking record through arbitrary
//! action sequences and then checks the invariants that must hold no matter
//! what order actions arrived in. The status dimensions move independently,
//! so the dangerous bugs are composite states no single transition would
//! produce on its own - payment captured after a rejection, a hold with
//! nothing to restore, a cancellation that kept the payment alive.

use proptest::prelude::*;
use rental_booking::{
    booking::{
        BookingDraft, BookingRecord, FleetReviewStatus, HostReviewStatus, LifecycleStatus,
        PaymentStatus,
    },
    clock::TimeStamp,
};

// These property tests cover:
//
// 1. Capture gating - payment captured implies both review tiers approved
// 2. Hold state coherence - on hold if and only if hold data is present
// 3. Cancellation bookkeeping - terminal cancel always releases the payment
// 4. Rejection terminality - a rejected booking never moves again
// 5. Hold round-trip - release restores exactly the pre-hold lifecycle
// 6. Failed transitions are harmless - a guarded error leaves no partial write
//
// What these tests DON'T cover (deliberately):
//
// - Persistence, versioning and conflict detection (db territory, covered
//   by the integration scenarios)
// - Claims (their window has its own property suite)
//

#[derive(Debug, Clone)]
enum Action {
    ApproveFleet,
    RejectFleet,
    ApproveHost,
    PlaceHold,
    ReleaseHold,
    Cancel,
    StartTrip,
    EndTrip,
    Complete,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::ApproveFleet),
        Just(Action::RejectFleet),
        Just(Action::ApproveHost),
        Just(Action::PlaceHold),
        Just(Action::ReleaseHold),
        Just(Action::Cancel),
        Just(Action::StartTrip),
        Just(Action::EndTrip),
        Just(Action::Complete),
    ]
}

/// Strategy to generate a sequence of actions (0 to 12 actions)
fn action_sequence_strategy() -> impl Strategy<Value = Vec<Action>> {
    prop::collection::vec(action_strategy(), 0..=12)
}

fn base_time() -> TimeStamp<chrono::Utc> {
    TimeStamp::new_with(2026, 3, 1, 9, 0, 0)
}

fn fresh_record() -> BookingRecord {
    BookingDraft::new()
        .set_guest("user_1guest")
        .set_host("user_1host")
        .set_vehicle("veh_1one")
        .set_start_date(base_time().plus_hours(24))
        .set_end_date(base_time().plus_hours(96))
        .set_total_amount(42_000)
        .set_deposit_amount(15_000)
        .validate_and_finalise(base_time())
        .expect("a well-formed draft finalises")
}

/// Apply one action, surfacing the transition result so callers can decide
/// whether a failure matters for the property at hand.
fn apply(record: &mut BookingRecord, action: &Action) -> Result<(), rental_booking::error::WorkflowError> {
    let now = base_time();
    match action {
        Action::ApproveFleet => record.approve_fleet(),
        Action::RejectFleet => record.reject_fleet("risk policy", "fleet_operator", now),
        Action::ApproveHost => record.approve_host(),
        Action::PlaceHold => record.place_hold(
            vec!["driving licence".to_string()],
            None,
            None,
            "fleet_operator",
            now,
        ),
        Action::ReleaseHold => record.release_hold(),
        Action::Cancel => record.cancel("change of plans", "guest", now),
        Action::StartTrip => record.start_trip(),
        Action::EndTrip => record.end_trip(),
        Action::Complete => record.complete(),
    }
}

// PROPERTY TESTS
proptest! {
    /// Property: payment is captured only with both review tiers approved
    ///
    /// Capture happens in exactly one transition, so no interleaving of
    /// actions may ever show a captured payment next to a pending or
    /// rejected review tier.
    #[test]
    fn prop_capture_implies_both_approvals(actions in action_sequence_strategy()) {
        let mut record = fresh_record();

        for action in &actions {
            let _ = apply(&mut record, action);

            if record.payment == PaymentStatus::Captured {
                prop_assert_eq!(
                    &record.fleet_review,
                    &FleetReviewStatus::Approved,
                    "captured payment requires fleet approval"
                );
                prop_assert_eq!(
                    &record.host_review,
                    &HostReviewStatus::Approved,
                    "captured payment requires host approval"
                );
            }
        }
    }

    /// Property: the booking is on hold if and only if hold data is present
    ///
    /// The hold struct records what to restore on release. A lifecycle of
    /// OnHold with no hold data would strand the booking, and leftover hold
    /// data outside OnHold would restore a stale status later.
    #[test]
    fn prop_on_hold_iff_hold_present(actions in action_sequence_strategy()) {
        let mut record = fresh_record();

        for action in &actions {
            let _ = apply(&mut record, action);

            prop_assert_eq!(
                record.lifecycle == LifecycleStatus::OnHold,
                record.hold.is_some(),
                "hold data and OnHold must appear together"
            );
        }
    }

    /// Property: a cancelled booking always has its payment released and a
    /// reason recorded
    #[test]
    fn prop_cancellation_releases_payment(actions in action_sequence_strategy()) {
        let mut record = fresh_record();

        for action in &actions {
            let _ = apply(&mut record, action);
        }

        if record.lifecycle == LifecycleStatus::Cancelled {
            prop_assert_eq!(
                &record.payment,
                &PaymentStatus::Cancelled,
                "cancellation must release the payment"
            );
            prop_assert!(
                record.cancellation_reason.is_some(),
                "cancellation must record a reason"
            );
            prop_assert!(record.cancelled_at.is_some());
        }
    }

    /// Property: fleet rejection is terminal
    ///
    /// Once rejected, the booking sits cancelled and neither approval tier
    /// can move it again, whatever else is thrown at it.
    #[test]
    fn prop_rejection_is_terminal(
        prefix in action_sequence_strategy(),
        suffix in action_sequence_strategy(),
    ) {
        let mut record = fresh_record();

        for action in &prefix {
            let _ = apply(&mut record, action);
        }

        if record.fleet_review != FleetReviewStatus::Rejected {
            // force the rejection if the prefix did not get there
            if apply(&mut record, &Action::RejectFleet).is_err() {
                // prefix drove the booking somewhere rejection cannot reach
                return Ok(());
            }
        }

        prop_assert_eq!(&record.lifecycle, &LifecycleStatus::Cancelled);

        for action in &suffix {
            let before = record.clone();
            let result = apply(&mut record, action);

            prop_assert!(result.is_err(), "no action may move a rejected booking");
            prop_assert_eq!(&record, &before, "a failed transition must not write");
        }
    }

    /// Property: a hold round-trip restores exactly the pre-hold lifecycle
    #[test]
    fn prop_hold_round_trip_restores_lifecycle(actions in action_sequence_strategy()) {
        let mut record = fresh_record();

        for action in &actions {
            let _ = apply(&mut record, action);
        }

        // the round trip is only defined from Confirmed
        if record.lifecycle != LifecycleStatus::Confirmed {
            return Ok(());
        }

        let before = record.lifecycle.clone();
        apply(&mut record, &Action::PlaceHold).expect("hold from Confirmed");
        prop_assert_eq!(&record.lifecycle, &LifecycleStatus::OnHold);

        apply(&mut record, &Action::ReleaseHold).expect("release an active hold");
        prop_assert_eq!(&record.lifecycle, &before, "release must restore the prior status");
        prop_assert!(record.hold.is_none());
    }

    /// Property: a failed transition leaves the record byte-for-byte alone
    ///
    /// Every guard runs before any field is written, so an error can never
    /// leave a half-applied transition behind.
    #[test]
    fn prop_failed_transitions_leave_no_trace(actions in action_sequence_strategy()) {
        let mut record = fresh_record();

        for action in &actions {
            let before = record.clone();
            if apply(&mut record, action).is_err() {
                prop_assert_eq!(&record, &before, "failed transitions must not write");
            }
        }
    }
}
