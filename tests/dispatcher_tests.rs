mod common;

use std::sync::Arc;

use serde_json::json;

use common::{SendBehavior, StubSender};
use notification_engine::clock::Clock;
use notification_engine::db::models::{
    Channel, NotificationCategory, UpdateNotificationPreferences,
};
use notification_engine::db::{
    DeviceRepository, PreferencesRepository, QueueRepository, RecordRepository,
};
use notification_engine::services::channels::ChannelSender;
use notification_engine::services::dispatcher::{NotificationJob, SendOptions};
use notification_engine::services::queue::{EnqueueOptions, QueueService};
use notification_engine::services::scheduler::Scheduler;

#[tokio::test]
async fn partial_fanout_success_counts_as_delivered() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    common::register_endpoint(&pool, 42, &"m".repeat(32), Channel::MobilePushIos, "consumer", now)
        .await;
    common::register_endpoint(
        &pool,
        42,
        "https://push.example.com/sub/abc",
        Channel::BrowserPush,
        "consumer",
        now,
    )
    .await;

    let mobile = StubSender::new(Channel::MobilePushIos, SendBehavior::FailTransient);
    let browser = StubSender::new(Channel::BrowserPush, SendBehavior::Succeed);
    let (dispatcher, _bus) = common::dispatcher_with(
        &pool,
        clock,
        vec![
            mobile.clone() as Arc<dyn ChannelSender>,
            browser.clone() as Arc<dyn ChannelSender>,
        ],
    );

    let delivered = dispatcher
        .send_to_recipient(42, &common::notification("Order shipped"), &SendOptions::default())
        .await
        .unwrap();

    assert!(delivered, "one successful endpoint is enough");
    assert_eq!(mobile.sent_tokens().len(), 1);
    assert_eq!(browser.sent_tokens().len(), 1);

    let records = RecordRepository::find_by_recipient(&pool, 42, None, None)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
}

#[tokio::test]
async fn gated_category_drops_without_channel_attempts() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    common::register_endpoint(&pool, 7, &"t".repeat(32), Channel::MobilePushIos, "consumer", now)
        .await;
    PreferencesRepository::update(
        &pool,
        7,
        UpdateNotificationPreferences {
            promotions: Some(false),
            ..Default::default()
        },
        now,
    )
    .await
    .unwrap();

    let mobile = StubSender::new(Channel::MobilePushIos, SendBehavior::Succeed);
    let (dispatcher, _bus) =
        common::dispatcher_with(&pool, clock, vec![mobile.clone() as Arc<dyn ChannelSender>]);

    let delivered = dispatcher
        .send_to_recipient(
            7,
            &common::notification("Weekend deals"),
            &SendOptions {
                category: Some(NotificationCategory::Promotions),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(!delivered);
    assert!(mobile.sent_tokens().is_empty(), "gated sends reach no channel");

    // The drop is still recorded.
    let records = RecordRepository::find_by_recipient(&pool, 7, None, None)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].category, "promotions");
}

#[tokio::test]
async fn recipient_without_endpoints_is_not_delivered() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();

    let mobile = StubSender::new(Channel::MobilePushIos, SendBehavior::Succeed);
    let (dispatcher, _bus) =
        common::dispatcher_with(&pool, clock, vec![mobile.clone() as Arc<dyn ChannelSender>]);

    let delivered = dispatcher
        .send_to_recipient(99, &common::notification("Hello"), &SendOptions::default())
        .await
        .unwrap();

    assert!(!delivered);
    assert!(mobile.sent_tokens().is_empty());

    let records = RecordRepository::find_by_recipient(&pool, 99, None, None)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
}

#[tokio::test]
async fn emergency_bypasses_promotion_optout_but_not_system_alerts() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    // Recipient 1 opted out of promotions only; recipient 2 explicitly
    // disabled system alerts.
    common::register_endpoint(&pool, 1, &"a".repeat(32), Channel::MobilePushIos, "consumer", now)
        .await;
    common::register_endpoint(&pool, 2, &"b".repeat(32), Channel::MobilePushIos, "consumer", now)
        .await;
    PreferencesRepository::update(
        &pool,
        1,
        UpdateNotificationPreferences {
            promotions: Some(false),
            ..Default::default()
        },
        now,
    )
    .await
    .unwrap();
    PreferencesRepository::update(
        &pool,
        2,
        UpdateNotificationPreferences {
            system_alerts: Some(false),
            ..Default::default()
        },
        now,
    )
    .await
    .unwrap();

    let mobile = StubSender::new(Channel::MobilePushIos, SendBehavior::Succeed);
    let (dispatcher, _bus) =
        common::dispatcher_with(&pool, clock, vec![mobile.clone() as Arc<dyn ChannelSender>]);

    let outcome = dispatcher
        .send_emergency(&[1, 2], &common::notification("Service disruption"))
        .await
        .unwrap();

    // Recipient 1 gets the alert despite the promotions opt-out; recipient
    // 2's explicit system-alerts opt-out is authoritative.
    assert_eq!(outcome.success, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(mobile.sent_tokens(), vec!["a".repeat(32)]);
}

#[tokio::test]
async fn bulk_counts_recipients_independently() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    common::register_endpoint(&pool, 10, &"w".repeat(32), Channel::MobilePushIos, "consumer", now)
        .await;
    common::register_endpoint(&pool, 11, "broken-token-aaaaaaaaaaaa", Channel::Sms, "consumer", now)
        .await;
    // Recipient 12 has no endpoints at all.

    let mobile = StubSender::new(Channel::MobilePushIos, SendBehavior::Succeed);
    let sms = StubSender::new(Channel::Sms, SendBehavior::FailTransient);
    let (dispatcher, _bus) = common::dispatcher_with(
        &pool,
        clock,
        vec![
            mobile.clone() as Arc<dyn ChannelSender>,
            sms.clone() as Arc<dyn ChannelSender>,
        ],
    );

    let outcome = dispatcher
        .send_bulk(&[10, 11, 12], &common::notification("Receipt"), &SendOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.success, 1);
    assert_eq!(outcome.failed, 2);
}

#[tokio::test]
async fn role_send_resolves_recipients_from_registry() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    common::register_endpoint(&pool, 20, &"d".repeat(32), Channel::MobilePushAndroid, "driver", now)
        .await;
    common::register_endpoint(&pool, 21, &"e".repeat(32), Channel::MobilePushAndroid, "driver", now)
        .await;
    common::register_endpoint(&pool, 22, &"c".repeat(32), Channel::MobilePushAndroid, "consumer", now)
        .await;

    let android = StubSender::new(Channel::MobilePushAndroid, SendBehavior::Succeed);
    let (dispatcher, _bus) =
        common::dispatcher_with(&pool, clock, vec![android.clone() as Arc<dyn ChannelSender>]);

    let outcome = dispatcher
        .send_to_role("driver", &common::notification("New delivery job"), &SendOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.success, 2);
    assert_eq!(outcome.failed, 0);

    let mut sent = android.sent_tokens();
    sent.sort();
    assert_eq!(sent, vec!["d".repeat(32), "e".repeat(32)]);
}

#[tokio::test]
async fn permanent_failure_deactivates_endpoint() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    let endpoint =
        common::register_endpoint(&pool, 30, &"z".repeat(32), Channel::MobilePushIos, "consumer", now)
            .await;

    let mobile = StubSender::new(Channel::MobilePushIos, SendBehavior::FailPermanent);
    let (dispatcher, _bus) =
        common::dispatcher_with(&pool, clock, vec![mobile.clone() as Arc<dyn ChannelSender>]);

    let delivered = dispatcher
        .send_to_recipient(30, &common::notification("Ping"), &SendOptions::default())
        .await
        .unwrap();
    assert!(!delivered);

    let endpoints = DeviceRepository::find_by_recipient(&pool, 30).await.unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].id, endpoint.id);
    assert!(!endpoints[0].is_active, "doomed endpoint must be deactivated");
}

#[tokio::test]
async fn queued_notification_failure_is_rescheduled() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    common::register_endpoint(&pool, 50, &"q".repeat(32), Channel::MobilePushIos, "consumer", now)
        .await;

    let mobile = StubSender::new(Channel::MobilePushIos, SendBehavior::FailTransient);
    let (dispatcher, _bus) =
        common::dispatcher_with(&pool, clock.clone(), vec![mobile.clone() as Arc<dyn ChannelSender>]);

    let queue = Arc::new(QueueService::new(
        pool.clone(),
        clock.clone(),
        common::test_queue_config(),
    ));
    let mut scheduler = Scheduler::new(queue.clone(), clock.clone(), common::test_queue_config());
    scheduler.register_handler("push-notification", dispatcher.clone());

    let job = NotificationJob {
        recipient_id: Some(50),
        role: None,
        notification: common::notification("Payment received"),
        options: SendOptions::default(),
    };
    let id = queue
        .enqueue_for_recipient(
            50,
            "push-notification",
            serde_json::to_value(&job).unwrap(),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    for handle in scheduler.tick().await.unwrap() {
        handle.await.unwrap();
    }

    // The all-channels-failed dispatch surfaces as a handler error and the
    // message gets a retry with backoff.
    let message = QueueRepository::find_by_id(&pool, &id).await.unwrap().unwrap();
    assert_eq!(message.attempts, 1);
    assert_eq!(message.status, "pending");
    assert!(message.due_at > now);
    assert_eq!(mobile.sent_tokens().len(), 1);
}

#[tokio::test]
async fn email_message_type_targets_only_email_endpoints() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();
    let now = clock.now();

    common::register_endpoint(&pool, 60, &"p".repeat(32), Channel::MobilePushIos, "consumer", now)
        .await;
    common::register_endpoint(&pool, 60, "rider60@example.com", Channel::Email, "consumer", now)
        .await;

    let mobile = StubSender::new(Channel::MobilePushIos, SendBehavior::Succeed);
    let email = StubSender::new(Channel::Email, SendBehavior::Succeed);
    let (dispatcher, _bus) = common::dispatcher_with(
        &pool,
        clock.clone(),
        vec![
            mobile.clone() as Arc<dyn ChannelSender>,
            email.clone() as Arc<dyn ChannelSender>,
        ],
    );

    let queue = Arc::new(QueueService::new(
        pool.clone(),
        clock.clone(),
        common::test_queue_config(),
    ));
    let mut scheduler = Scheduler::new(queue.clone(), clock, common::test_queue_config());
    scheduler.register_handler("email", dispatcher.clone());

    let job = NotificationJob {
        recipient_id: Some(60),
        role: None,
        notification: common::notification("Monthly statement"),
        options: SendOptions::default(),
    };
    queue
        .enqueue("email", serde_json::to_value(&job).unwrap(), EnqueueOptions::default())
        .await
        .unwrap();

    for handle in scheduler.tick().await.unwrap() {
        handle.await.unwrap();
    }

    assert!(mobile.sent_tokens().is_empty());
    assert_eq!(email.sent_tokens(), vec!["rider60@example.com".to_string()]);
}

#[tokio::test]
async fn queued_realtime_event_reaches_bus_subscribers() {
    let pool = common::memory_pool().await;
    let clock = common::manual_clock();

    let (dispatcher, bus) = common::dispatcher_with(&pool, clock.clone(), vec![]);
    let mut subscriber = bus.subscribe();

    let queue = Arc::new(QueueService::new(
        pool.clone(),
        clock.clone(),
        common::test_queue_config(),
    ));
    let mut scheduler = Scheduler::new(queue.clone(), clock, common::test_queue_config());
    scheduler.register_handler("realtime-event", dispatcher.clone());

    queue
        .enqueue_for_recipient(
            77,
            "realtime-event",
            json!({"event": "courier-location", "lat": 52.52, "lng": 13.405}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    for handle in scheduler.tick().await.unwrap() {
        handle.await.unwrap();
    }

    let event = subscriber.try_recv().expect("event should be on the bus");
    assert_eq!(event.recipient_id, Some(77));
    assert_eq!(event.payload["event"], "courier-location");

    // Delivered events leave the queue for good.
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.recipient_depth, 0);
    assert_eq!(stats.dead_letter_depth, 0);
}
