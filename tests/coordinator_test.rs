mod common;

use common::{ELEC, FakeClient, GAS, fixture, utc};
use glowdcc::coordinator::{ReadingPeriod, RefreshPolicy};
use glowdcc::error::GlowError;
use glowdcc::reading::TimeRange;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn cold_cache_fetches_today_once_then_serves_from_cache() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();
    let as_of = utc(2024, 1, 15, 10, 5);

    let first = fx.coordinator.get_current(elec, as_of).await.unwrap();
    let second = fx.coordinator.get_current(elec, as_of).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.value, 7.5);
    assert_eq!(fx.client.fetch_count(ELEC), 1);

    // Only today so far is requested
    let today = TimeRange::local_day(as_of.date_naive(), chrono_tz::Europe::London);
    assert_eq!(
        fx.client.requested_ranges(ELEC),
        vec![TimeRange::new(today.start, as_of)]
    );
    assert_eq!(fx.client.catchup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_requests_share_one_fetch() {
    let client = FakeClient::standard();
    client.set_delay(ELEC, Duration::from_millis(100));
    let fx = fixture(client, RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();
    let as_of = utc(2024, 1, 15, 10, 5);

    let (a, b, c) = tokio::join!(
        fx.coordinator.get_current(elec, as_of),
        fx.coordinator.get_current(elec, as_of),
        fx.coordinator.get_current(elec, as_of)
    );

    assert_eq!(fx.client.fetch_count(ELEC), 1);
    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
}

#[tokio::test]
async fn concurrent_waiters_share_a_failure() {
    let client = FakeClient::standard();
    client.set_delay(ELEC, Duration::from_millis(100));
    client.fail_next(ELEC, GlowError::network("connection reset"));
    let fx = fixture(client, RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();
    let as_of = utc(2024, 1, 15, 10, 5);

    let (a, b) = tokio::join!(
        fx.coordinator.get_current(elec, as_of),
        fx.coordinator.get_current(elec, as_of)
    );

    assert_eq!(fx.client.fetch_count(ELEC), 1);
    assert!(matches!(a, Err(GlowError::Network { .. })));
    assert!(matches!(b, Err(GlowError::Network { .. })));
}

#[tokio::test]
async fn slow_resource_does_not_block_others() {
    let client = FakeClient::standard();
    client.set_delay(ELEC, Duration::from_secs(2));
    let fx = fixture(client, RefreshPolicy::default()).await;
    let as_of = utc(2024, 1, 15, 10, 5);

    let coordinator = fx.coordinator.clone();
    let catalog = fx.catalog.clone();
    let slow = tokio::spawn(async move {
        let elec = catalog.resource(ELEC).unwrap();
        coordinator.get_current(elec, as_of).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let gas = fx.catalog.resource(GAS).unwrap();
    let reading = tokio::time::timeout(
        Duration::from_millis(500),
        fx.coordinator.get_current(gas, as_of),
    )
    .await
    .expect("gas fetch waited on electricity")
    .unwrap();

    assert_eq!(reading.value, 20.0);
    slow.abort();
}

#[tokio::test]
async fn rate_limited_refresh_serves_previous_reading() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();

    let cached = fx
        .coordinator
        .get_current(elec, utc(2024, 1, 15, 10, 0))
        .await
        .unwrap();

    fx.client.fail_next(ELEC, GlowError::rate_limited("429"));
    fx.client.set_value(ELEC, 9.0);
    let served = fx
        .coordinator
        .get_current(elec, utc(2024, 1, 15, 10, 40))
        .await
        .unwrap();

    assert_eq!(fx.client.fetch_count(ELEC), 2);
    assert_eq!(served, cached);
}

#[tokio::test]
async fn too_old_reading_is_not_served_on_failure() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();

    fx.coordinator
        .get_current(elec, utc(2024, 1, 15, 10, 0))
        .await
        .unwrap();

    fx.client.fail_next(ELEC, GlowError::network("down"));
    let err = fx
        .coordinator
        .get_current(elec, utc(2024, 1, 15, 13, 30))
        .await
        .unwrap_err();
    assert!(matches!(err, GlowError::Network { .. }));
}

#[tokio::test]
async fn rejected_session_is_not_masked_by_cached_reading() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();

    fx.coordinator
        .get_current(elec, utc(2024, 1, 15, 10, 0))
        .await
        .unwrap();

    // Rejected before and after the one re-authentication
    fx.client.fail_next(ELEC, GlowError::auth("token revoked"));
    fx.client.fail_next(ELEC, GlowError::auth("token revoked"));
    let err = fx
        .coordinator
        .get_current(elec, utc(2024, 1, 15, 10, 40))
        .await
        .unwrap_err();

    assert!(err.is_auth());
    assert_eq!(fx.client.fetch_count(ELEC), 3);
}

#[tokio::test]
async fn malformed_response_is_not_masked_by_cached_reading() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();

    fx.coordinator
        .get_current(elec, utc(2024, 1, 15, 10, 0))
        .await
        .unwrap();

    fx.client
        .fail_next(ELEC, GlowError::Serialization { message: "bad json".into() });
    let err = fx
        .coordinator
        .get_current(elec, utc(2024, 1, 15, 10, 40))
        .await
        .unwrap_err();
    assert!(matches!(err, GlowError::Serialization { .. }));
}

#[tokio::test]
async fn first_fetch_failure_propagates_and_does_not_stick() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();
    let as_of = utc(2024, 1, 15, 10, 5);

    fx.client.fail_next(ELEC, GlowError::rate_limited("429"));
    let err = fx.coordinator.get_current(elec, as_of).await.unwrap_err();
    assert!(matches!(err, GlowError::RateLimit { .. }));

    // The failed attempt leaves nothing in flight
    let reading = fx.coordinator.get_current(elec, as_of).await.unwrap();
    assert_eq!(reading.value, 7.5);
    assert_eq!(fx.client.fetch_count(ELEC), 2);
}

#[tokio::test]
async fn refresh_waits_for_next_slot_and_min_interval() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();

    for (h, m) in [(10, 2), (10, 20), (10, 29)] {
        fx.coordinator
            .get_current(elec, utc(2024, 1, 15, h, m))
            .await
            .unwrap();
    }
    assert_eq!(fx.client.fetch_count(ELEC), 1);

    fx.client.set_value(ELEC, 8.25);
    let refreshed = fx
        .coordinator
        .get_current(elec, utc(2024, 1, 15, 10, 31))
        .await
        .unwrap();
    assert_eq!(fx.client.fetch_count(ELEC), 2);
    assert_eq!(refreshed.value, 8.25);
}

#[tokio::test]
async fn settled_day_is_never_refetched() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();
    let yesterday = ReadingPeriod::Day(chrono::NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());

    let settled = fx
        .coordinator
        .get_reading(elec, yesterday, utc(2024, 1, 15, 2, 0))
        .await
        .unwrap();
    for h in [3, 9, 18, 23] {
        let again = fx
            .coordinator
            .get_reading(elec, yesterday, utc(2024, 1, 15, h, 45))
            .await
            .unwrap();
        assert_eq!(again, settled);
    }
    assert_eq!(fx.client.fetch_count(ELEC), 1);
    // A complete day needs no catch-up
    assert_eq!(fx.client.catchup_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn before_settle_cutoff_reports_previous_day() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();
    let as_of = utc(2024, 1, 15, 0, 45);

    let reading = fx.coordinator.get_current(elec, as_of).await.unwrap();

    let yesterday = TimeRange::local_day(
        chrono::NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
        chrono_tz::Europe::London,
    );
    assert_eq!(reading.range, yesterday);
    // Not settled yet, so the backend is asked to catch up first
    assert_eq!(fx.client.catchup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_timeout_is_a_failure_and_clears_in_flight() {
    let client = FakeClient::standard();
    client.set_delay(ELEC, Duration::from_millis(500));
    let policy = RefreshPolicy {
        fetch_timeout: Duration::from_millis(50),
        ..RefreshPolicy::default()
    };
    let fx = fixture(client, policy).await;
    let elec = fx.catalog.resource(ELEC).unwrap();
    let as_of = utc(2024, 1, 15, 10, 5);

    let err = fx.coordinator.get_current(elec, as_of).await.unwrap_err();
    assert!(matches!(err, GlowError::Timeout { .. }));

    fx.client.clear_delay(ELEC);
    let reading = fx.coordinator.get_current(elec, as_of).await.unwrap();
    assert_eq!(reading.value, 7.5);
}

#[tokio::test]
async fn cancelled_leader_does_not_strand_waiters() {
    let client = FakeClient::standard();
    client.set_delay(ELEC, Duration::from_millis(300));
    let fx = fixture(client, RefreshPolicy::default()).await;
    let as_of = utc(2024, 1, 15, 10, 5);

    let coordinator = fx.coordinator.clone();
    let catalog = fx.catalog.clone();
    let leader = tokio::spawn(async move {
        let elec = catalog.resource(ELEC).unwrap();
        coordinator.get_current(elec, as_of).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    leader.abort();
    let _ = leader.await;

    fx.client.clear_delay(ELEC);
    let elec = fx.catalog.resource(ELEC).unwrap();
    let reading = tokio::time::timeout(
        Duration::from_secs(1),
        fx.coordinator.get_current(elec, as_of),
    )
    .await
    .expect("request stranded behind a cancelled fetch")
    .unwrap();
    assert_eq!(reading.value, 7.5);
    assert_eq!(fx.client.fetch_count(ELEC), 2);
}

#[tokio::test]
async fn tariff_resources_read_their_component() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let as_of = utc(2024, 1, 15, 10, 5);

    let rate = fx.catalog.resource("elec-1-rate").unwrap();
    let standing = fx.catalog.resource("elec-1-tariff").unwrap();
    assert_eq!(
        fx.coordinator.get_current(rate, as_of).await.unwrap().value,
        24.5
    );
    assert_eq!(
        fx.coordinator.get_current(standing, as_of).await.unwrap().value,
        53.35
    );
    assert_eq!(
        fx.coordinator.current_period(rate, as_of),
        ReadingPeriod::Tariff
    );
    // Both components come from one tariff call
    assert_eq!(fx.client.tariff_count(ELEC), 1);
}

#[tokio::test]
async fn tariff_components_share_one_concurrent_fetch() {
    let client = FakeClient::standard();
    client.set_delay(GAS, Duration::from_millis(50));
    let fx = fixture(client, RefreshPolicy::default()).await;
    let rate = fx.catalog.resource("gas-1-rate").unwrap();
    let standing = fx.catalog.resource("gas-1-tariff").unwrap();
    let as_of = utc(2024, 1, 15, 10, 5);

    let (r, s) = tokio::join!(
        fx.coordinator.get_current(rate, as_of),
        fx.coordinator.get_current(standing, as_of)
    );

    assert_eq!(r.unwrap().value, 6.0);
    assert_eq!(s.unwrap().value, 29.11);
    assert_eq!(fx.client.tariff_count(GAS), 1);

    // Invalidating one component refetches the shared tariff
    fx.coordinator.invalidate(standing);
    fx.client.set_tariff(GAS, 6.5, 29.11);
    fx.client.clear_delay(GAS);
    assert_eq!(fx.coordinator.get_current(rate, as_of).await.unwrap().value, 6.5);
    assert_eq!(fx.client.tariff_count(GAS), 2);
}

#[tokio::test]
async fn invalidate_forces_refetch() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();
    let as_of = utc(2024, 1, 15, 10, 5);

    fx.coordinator.get_current(elec, as_of).await.unwrap();
    fx.coordinator.invalidate(elec);
    fx.coordinator.get_current(elec, as_of).await.unwrap();
    assert_eq!(fx.client.fetch_count(ELEC), 2);

    let today = ReadingPeriod::Day(as_of.date_naive());
    assert_eq!(fx.coordinator.cached(elec, today).unwrap().fetched_at, as_of);
    fx.coordinator.clear();
    assert!(fx.coordinator.cached(elec, today).is_none());
}

#[tokio::test]
async fn mismatched_period_is_rejected() {
    let fx = fixture(FakeClient::standard(), RefreshPolicy::default()).await;
    let elec = fx.catalog.resource(ELEC).unwrap();

    let err = fx
        .coordinator
        .get_reading(elec, ReadingPeriod::Tariff, utc(2024, 1, 15, 10, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, GlowError::Validation { .. }));
    assert_eq!(fx.client.tariff_count(ELEC), 0);
}
