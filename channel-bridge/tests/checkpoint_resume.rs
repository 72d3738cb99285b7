mod support;

use channel_bridge::{ChannelKey, Cursor, WorkerState};
use support::{make_harness, wait_until};

const ORDERS: &str = r#"{
    "options": {
        "replayIdStoreTableName": "cursors",
        "replayIdStoreDelay": 20,
        "initialReplayId": -2
    },
    "prod": {
        "connection": { "username": "bridge", "password": "secret" },
        "channels": [ { "channelName": "/event/Order__e", "snsTopicArn": "orders" } ]
    }
}"#;

fn orders_key() -> ChannelKey {
    ChannelKey::new("prod", "/event/Order__e")
}

#[tokio::test]
async fn resumes_from_flushed_cursor_after_reload() {
    let harness = make_harness(ORDERS);
    harness.bridge.reload().await.expect("first reload succeeds");

    harness
        .transport
        .emit("/event/Order__e", 10, serde_json::json!({ "orderId": 1 }))
        .await;
    harness
        .transport
        .emit("/event/Order__e", 11, serde_json::json!({ "orderId": 2 }))
        .await;
    harness.bridge.stop_all().await;

    let table = harness.checkpoints.table("cursors");
    assert_eq!(table.stored(&orders_key()), Some(Cursor::new(11)));

    harness.bridge.reload().await.expect("second reload succeeds");

    assert_eq!(
        harness.transport.subscribe_requests("/event/Order__e"),
        vec![Cursor::EARLIEST, Cursor::new(11)]
    );
    assert_eq!(
        harness.publishers.publisher("orders").published_json(),
        vec![
            serde_json::json!({ "orderId": 1 }),
            serde_json::json!({ "orderId": 2 })
        ]
    );
}

#[tokio::test]
async fn failed_publish_leaves_cursor_unchanged() {
    let harness = make_harness(ORDERS);
    harness.checkpoints.table("cursors").seed(&orders_key(), Cursor::new(4));
    harness.bridge.reload().await.expect("reload succeeds");

    harness.publishers.publisher("orders").set_failing(true);
    harness
        .transport
        .emit("/event/Order__e", 5, serde_json::json!({ "orderId": 5 }))
        .await;

    let status = &harness.bridge.status()["prod///event/Order__e"];
    assert_eq!(status.cursor, Some(Cursor::new(4)));
    assert_eq!(status.recent_events.len(), 1);
    assert!(status
        .log
        .iter()
        .any(|entry| entry.message.starts_with("Failed to publish")));
}

#[tokio::test]
async fn auth_failure_restarts_from_last_cursor() {
    let harness = make_harness(ORDERS);
    harness.bridge.reload().await.expect("reload succeeds");
    harness
        .transport
        .emit("/event/Order__e", 21, serde_json::json!({ "orderId": 21 }))
        .await;

    let notified = harness
        .transport
        .fail_auth("/event/Order__e", "session expired")
        .await;
    assert_eq!(notified, 1);

    let transport = harness.transport.clone();
    wait_until("the worker to log in again", || transport.logins().len() == 2).await;
    let bridge = &harness.bridge;
    wait_until("the worker to be started again", || {
        bridge.status()["prod///event/Order__e"].state == WorkerState::Started
            && transport.subscribe_requests("/event/Order__e").len() == 2
    })
    .await;

    assert_eq!(
        harness.transport.subscribe_requests("/event/Order__e"),
        vec![Cursor::EARLIEST, Cursor::new(21)]
    );
    assert_eq!(harness.transport.max_live_subscriptions("/event/Order__e"), 1);
    assert!(harness.bridge.status()["prod///event/Order__e"]
        .log
        .iter()
        .any(|entry| entry.message.starts_with("Restart needed")));
}

#[tokio::test]
async fn auth_failure_after_stop_does_not_restart() {
    let harness = make_harness(ORDERS);
    harness.bridge.reload().await.expect("reload succeeds");
    let worker = harness
        .bridge
        .workers()
        .get(&orders_key())
        .cloned()
        .expect("orders worker");

    harness.bridge.stop_all().await;
    assert_eq!(
        harness
            .transport
            .fail_auth("/event/Order__e", "session expired")
            .await,
        0
    );
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(harness.transport.logins().len(), 1);
}

#[tokio::test]
async fn without_checkpoint_table_workers_start_from_initial_cursor() {
    let harness = make_harness(
        r#"{
            "options": { "initialCursor": -2 },
            "prod": {
                "connection": { "username": "u" },
                "channels": [ { "channelName": "/event/A", "topic": "a" } ]
            }
        }"#,
    );
    harness.bridge.reload().await.expect("first reload succeeds");
    harness
        .transport
        .emit("/event/A", 3, serde_json::json!({}))
        .await;
    harness.bridge.reload().await.expect("second reload succeeds");

    assert_eq!(
        harness.transport.subscribe_requests("/event/A"),
        vec![Cursor::EARLIEST, Cursor::EARLIEST]
    );
}
