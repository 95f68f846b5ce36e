mod common;

use chrono::Duration;
use serde_json::json;

use notification_engine::clock::Clock;
use notification_engine::db::models::{Channel, RegisterDevice, UpdateNotificationPreferences};
use notification_engine::db::{DeviceRepository, PreferencesRepository};
use notification_engine::services::devices::{DeviceService, PreferenceService};

fn registration(recipient_id: i64, token: &str) -> RegisterDevice {
    RegisterDevice {
        recipient_id,
        token: token.to_string(),
        channel: Channel::MobilePushIos,
        recipient_role: Some("consumer".to_string()),
        device_info: Some(json!({"model": "test-device"})),
    }
}

#[tokio::test]
async fn registration_is_idempotent() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let service = DeviceService::with_pool(pool.clone(), clock.clone());

    let first = service.register(registration(1, "token-one")).await.unwrap();

    clock.advance(Duration::seconds(10));
    let mut again = registration(1, "token-one");
    again.channel = Channel::MobilePushAndroid;
    let second = service.register(again).await.unwrap();

    // Same row, updated in place.
    assert_eq!(first.id, second.id);
    assert_eq!(second.channel, "mobile-push-android");
    assert!(second.last_used_at > first.last_used_at);

    let endpoints = service.get_active_endpoints(1).await.unwrap();
    assert_eq!(endpoints.len(), 1);
}

#[tokio::test]
async fn unregister_deactivates_but_keeps_the_row() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let service = DeviceService::with_pool(pool.clone(), clock.clone());

    service.register(registration(2, "token-two")).await.unwrap();

    let found = service.unregister(2, "token-two").await.unwrap();
    assert!(found);
    assert!(!service.unregister(2, "unknown-token").await.unwrap());

    assert!(service.get_active_endpoints(2).await.unwrap().is_empty());

    // Audit trail survives.
    let all = service.get_all_endpoints(2).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(!all[0].is_active);

    // Re-registering the same token reactivates it.
    service.register(registration(2, "token-two")).await.unwrap();
    assert_eq!(service.get_active_endpoints(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stale_endpoints_are_swept() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let service = DeviceService::with_pool(pool.clone(), clock.clone());

    service.register(registration(3, "old-token")).await.unwrap();

    clock.advance(Duration::days(89));
    service.register(registration(3, "fresh-token")).await.unwrap();

    clock.advance(Duration::days(2));
    let swept = service.deactivate_stale(90).await.unwrap();
    assert_eq!(swept, 1);

    let active = service.get_active_endpoints(3).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].token, "fresh-token");
}

#[tokio::test]
async fn preferences_default_to_all_true() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let service = PreferenceService::with_pool(pool.clone(), clock.clone());

    // No row exists yet; first read materializes the defaults.
    assert!(PreferencesRepository::find_by_recipient(&pool, 5)
        .await
        .unwrap()
        .is_none());

    let preferences = service.get(5).await.unwrap();
    assert!(preferences.order_updates);
    assert!(preferences.payment_notifications);
    assert!(preferences.promotions);
    assert!(preferences.system_alerts);
    assert!(preferences.chat_messages);
}

#[tokio::test]
async fn preference_update_merges_partial_fields() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let service = PreferenceService::with_pool(pool.clone(), clock.clone());

    let updated = service
        .update(
            6,
            UpdateNotificationPreferences {
                promotions: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.promotions);
    assert!(updated.order_updates);

    // A second partial update must not resurrect the promotions flag.
    let updated = service
        .update(
            6,
            UpdateNotificationPreferences {
                chat_messages: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.promotions);
    assert!(!updated.chat_messages);
    assert!(updated.system_alerts);
}

#[tokio::test]
async fn role_lookup_only_sees_active_endpoints() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    common::register_endpoint(&pool, 30, "driver-a", Channel::MobilePushAndroid, "driver", now)
        .await;
    common::register_endpoint(&pool, 31, "driver-b", Channel::MobilePushAndroid, "driver", now)
        .await;
    common::register_endpoint(&pool, 32, "shopper", Channel::MobilePushAndroid, "consumer", now)
        .await;

    DeviceRepository::unregister(&pool, 31, "driver-b", now)
        .await
        .unwrap();

    let drivers = DeviceRepository::recipient_ids_by_role(&pool, "driver")
        .await
        .unwrap();
    assert_eq!(drivers, vec![30]);
}
