//! Stay lifecycle after creation: check-in, completion, no-show, reviews,
//! listings and access rules.

mod common;

use common::*;
use homestay_booking::BookingError;
use homestay_core::{Actor, BookingStatus, NotificationEvent, PageRequest, PaymentStatus};
use std::time::Duration;

async fn confirmed_booking(h: &Harness, key: &str) -> homestay_core::Booking {
    let booking = h.coordinator.create_booking(&guest(), request(key)).await.unwrap();
    h.coordinator.confirm_booking(&booking.id, &host()).await.unwrap()
}

#[tokio::test]
async fn test_stay_completes_after_check_out_and_can_be_reviewed() {
    let h = harness().await;
    let booking = confirmed_booking(&h, "req-stay").await;

    let err = h.coordinator.complete_booking(&booking.id, &host()).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    h.clock.set(at(20, 15));
    let checked_in = h.coordinator.check_in_guest(&booking.id, &host()).await.unwrap();
    assert_eq!(checked_in.checked_in_at, Some(at(20, 15)));

    // Once the stay started the guest can no longer cancel
    let err = h
        .coordinator
        .cancel_booking(&booking.id, &guest(), "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    h.clock.set(at(22, 11));
    let completed = h.coordinator.complete_booking(&booking.id, &host()).await.unwrap();
    assert_eq!(completed.status(), BookingStatus::Completed);
    assert_eq!(completed.completed_at, Some(at(22, 11)));

    let review = h
        .coordinator
        .submit_review(&booking.id, &guest(), 5, Some("  Quiet village, great breakfast ".to_string()))
        .await
        .unwrap();
    assert_eq!(review.rating, 5);
    assert_eq!(review.comment.as_deref(), Some("Quiet village, great breakfast"));
    assert_eq!(review.property_id, "prop-1");

    let err = h
        .coordinator
        .submit_review(&booking.id, &guest(), 4, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::AlreadyReviewed(_)));

    let events: Vec<_> = h.notifier.events().await.into_iter().map(|(_, e)| e).collect();
    assert_eq!(events, vec![NotificationEvent::Confirmed, NotificationEvent::Completed]);
}

#[tokio::test]
async fn test_review_rules() {
    let h = harness().await;
    let booking = confirmed_booking(&h, "req-review").await;

    let err = h
        .coordinator
        .submit_review(&booking.id, &guest(), 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    h.clock.set(at(22, 11));
    h.coordinator.complete_booking(&booking.id, &host()).await.unwrap();

    let err = h
        .coordinator
        .submit_review(&booking.id, &Actor::guest("guest-2"), 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));

    let err = h
        .coordinator
        .submit_review(&booking.id, &guest(), 6, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
}

#[tokio::test]
async fn test_no_show_only_without_check_in() {
    let h = harness().await;
    let absent = confirmed_booking(&h, "req-absent").await;

    let mut other = request("req-present");
    other.property_id = "prop-2".to_string();
    let present = h.coordinator.create_booking(&guest(), other).await.unwrap();
    h.coordinator.confirm_booking(&present.id, &host()).await.unwrap();

    let err = h.coordinator.mark_no_show(&absent.id, &host()).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    h.clock.set(at(20, 18));
    h.coordinator.check_in_guest(&present.id, &host()).await.unwrap();

    h.clock.set(at(21, 9));
    let no_show = h.coordinator.mark_no_show(&absent.id, &Actor::system()).await.unwrap();
    assert_eq!(no_show.status(), BookingStatus::NoShow);

    let err = h.coordinator.mark_no_show(&present.id, &host()).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_check_in_is_recorded_once() {
    let h = harness().await;
    let booking = confirmed_booking(&h, "req-checkin").await;

    h.clock.set(at(20, 15));
    let first = h.coordinator.check_in_guest(&booking.id, &host()).await.unwrap();
    h.clock.set(at(20, 16));
    let second = h.coordinator.check_in_guest(&booking.id, &host()).await.unwrap();
    assert_eq!(first, second);

    let err = h.coordinator.check_in_guest(&booking.id, &guest()).await.unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));
}

#[tokio::test]
async fn test_only_the_host_confirms() {
    let h = harness().await;
    let booking = h.coordinator.create_booking(&guest(), request("req-host")).await.unwrap();

    let err = h
        .coordinator
        .confirm_booking(&booking.id, &Actor::host("host-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));

    let err = h.coordinator.confirm_booking(&booking.id, &guest()).await.unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));

    let err = h.coordinator.confirm_booking("missing", &host()).await.unwrap_err();
    assert!(matches!(err, BookingError::NotFound(_)));

    let confirmed = h.coordinator.confirm_booking(&booking.id, &admin()).await.unwrap();
    assert_eq!(confirmed.status(), BookingStatus::Confirmed);
}

#[tokio::test]
async fn test_transition_retries_after_concurrent_version_bump() {
    let h = harness().await;
    let booking = h.coordinator.create_booking(&guest(), request("req-bump")).await.unwrap();
    assert_eq!(booking.version, 1);

    // The refund answers after 100 ms; a writer outside the coordinator
    // bumps the version while it is in flight
    h.gateway.stall_next_refund(Duration::from_millis(100)).await;
    let g = guest();
    let bookings = h.coordinator.database().bookings();
    let (cancelled, flagged) = tokio::join!(
        h.coordinator.cancel_booking(&booking.id, &g, "plans changed"),
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            bookings.flag_needs_attention(&booking.id, "support note").await
        },
    );

    flagged.unwrap();
    let cancelled = cancelled.unwrap();
    assert_eq!(cancelled.status(), BookingStatus::Cancelled);
    // 1 → 2 by the flag, 2 → 3 by the retried cancellation
    assert_eq!(cancelled.version, 3);
    assert_eq!(cancelled.needs_attention, None);

    // The first attempt's refund was replayed, not repeated
    assert_eq!(h.gateway.refund_calls().await, 2);
    assert!(h.gateway.outstanding().await.is_zero());
    let view = h.coordinator.get_booking(&booking.id, &guest()).await.unwrap();
    assert_eq!(view.payment.status, PaymentStatus::Cancelled);
    assert_eq!(view.payment_events.len(), 2);
}

#[tokio::test]
async fn test_views_and_listings_respect_ownership() {
    let h = harness().await;
    h.grant(GUEST, 10_000).await;
    let first = h.coordinator.create_booking(&guest(), request("req-list-1")).await.unwrap();
    h.clock.set(at(1, 10));
    let mut req = request("req-list-2");
    req.property_id = "prop-2".to_string();
    let second = h.coordinator.create_booking(&guest(), req).await.unwrap();
    h.coordinator.confirm_booking(&second.id, &host()).await.unwrap();

    let host_view = h.coordinator.get_booking(&first.id, &host()).await.unwrap();
    assert!(host_view.guest_credit.is_none());
    let guest_view = h.coordinator.get_booking(&first.id, &guest()).await.unwrap();
    assert_eq!(guest_view.guest_credit.unwrap().total_earned.won(), 10_000);

    let err = h
        .coordinator
        .get_booking(&first.id, &Actor::guest("guest-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));

    let page = h
        .coordinator
        .list_guest_bookings(&guest(), GUEST, None, PageRequest::new(1, 1))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items[0].id, second.id);

    let pending = h
        .coordinator
        .list_host_bookings(&host(), HOST, Some(BookingStatus::Pending), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(pending.total, 1);
    assert_eq!(pending.items[0].id, first.id);

    let err = h
        .coordinator
        .list_host_bookings(&Actor::host("host-2"), HOST, None, PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));
}

#[tokio::test]
async fn test_credit_grants_are_admin_only_and_idempotent() {
    let h = harness().await;

    let err = h
        .coordinator
        .grant_credit(&guest(), GUEST, homestay_core::Money::from_won(5_000), "self-grant", None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));

    h.grant(GUEST, 5_000).await;
    h.grant(GUEST, 5_000).await;
    assert_eq!(h.balance(GUEST).await, 5_000);

    let err = h
        .coordinator
        .credit_summary(&Actor::guest("guest-2"), GUEST)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));
}
