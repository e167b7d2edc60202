// 投递流程集成测试：Hub 循环 + 投递领域服务 + 内存端口实现
mod common;

use anyhow::Result;
use chat_gateway::domain::model::{DeliveryReport, InboundFrame};
use serde_json::json;

use common::{
    CountingDirectory, Harness, NOTIFICATION_TOPIC, PERSISTENCE_TOPIC, parse_frame, user,
};

fn text(conversation_id: i64, sender: &str, content: &str) -> Vec<u8> {
    json!({
        "type": "text",
        "conversation_id": conversation_id,
        "sender_id": sender,
        "content": content,
    })
    .to_string()
    .into_bytes()
}

async fn send(harness: &Harness, sender: &str, payload: Vec<u8>) -> Result<DeliveryReport> {
    let report = harness
        .hub
        .dispatch_and_wait(InboundFrame::from_user(user(sender), payload))
        .await?;
    Ok(report.expect("payload decodes"))
}

#[tokio::test]
async fn fans_out_to_online_members_except_sender() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(7, &["A", "B", "C"]));
    let (_a, mut a_rx, _) = harness.connect("A", 8).await?;
    let (_b, mut b_rx, _) = harness.connect("B", 8).await?;
    let (_c, mut c_rx, _) = harness.connect("C", 8).await?;

    let report = send(&harness, "A", text(7, "A", "hello")).await?;

    assert_eq!(report.delivered, 2);
    assert_eq!(report.notified, 0);
    assert_eq!(report.evicted, 0);
    assert!(report.persistence_published);

    for rx in [&mut b_rx, &mut c_rx] {
        let frame = parse_frame(&rx.try_recv()?);
        assert_eq!(frame["content"], "hello");
        assert_eq!(frame["sender_id"], "A");
    }
    assert!(a_rx.try_recv().is_err());

    let persisted = harness.publisher.events(PERSISTENCE_TOPIC).await;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].key, "7");
    assert!(harness.publisher.events(NOTIFICATION_TOPIC).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn online_recipient_receives_enriched_frame() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(42, &["A", "B"]));
    let (_b, mut b_rx, _) = harness.connect("B", 8).await?;

    let report = send(&harness, "A", text(42, "A", "hi")).await?;
    assert_eq!(report.conversation_id, 42);
    assert_eq!(report.delivered, 1);

    let frame = parse_frame(&b_rx.try_recv()?);
    assert_eq!(frame["type"], "text");
    assert_eq!(frame["conversation_id"], 42);
    assert_eq!(frame["sender_id"], "A");
    assert_eq!(frame["sender_name"], "User A");
    assert_eq!(frame["content"], "hi");
    assert!(frame["created_at"].is_string());

    let persisted = harness.publisher.events(PERSISTENCE_TOPIC).await;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].key, "42");
    assert!(harness.publisher.events(NOTIFICATION_TOPIC).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn offline_recipient_gets_notification_event() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(42, &["A", "B"]));
    let (_a, mut a_rx, _) = harness.connect("A", 8).await?;

    let report = send(&harness, "A", text(42, "A", "hi")).await?;
    assert_eq!(report.delivered, 0);
    assert_eq!(report.notified, 1);
    assert!(a_rx.try_recv().is_err());

    let notifications = harness.publisher.events(NOTIFICATION_TOPIC).await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].key, "B");
    assert_eq!(
        notifications[0].payload,
        json!({
            "receiver_id": "B",
            "conversation_id": 42,
            "content": "hi",
            "type": "text",
            "sender_id": "A",
            "sender_name": "User A",
        })
    );
    assert_eq!(harness.publisher.events(PERSISTENCE_TOPIC).await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn saturated_queue_evicts_and_notifies_without_blocking_others() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(5, &["A", "B", "C"]));
    let (_b, _b_rx, b_closed) = harness.connect("B", 1).await?;
    let (_c, mut c_rx, _) = harness.connect("C", 8).await?;

    // 第一条消息填满 B 的队列
    let first = send(&harness, "A", text(5, "A", "one")).await?;
    assert_eq!(first.delivered, 2);

    let second = send(&harness, "A", text(5, "A", "two")).await?;
    assert_eq!(second.delivered, 1);
    assert_eq!(second.evicted, 1);
    assert_eq!(second.notified, 1);

    assert!(!harness.registry.is_online("B").await);
    assert!(b_closed.is_closed());

    let notifications = harness.publisher.events(NOTIFICATION_TOPIC).await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].key, "B");
    assert_eq!(notifications[0].payload["content"], "two");

    assert_eq!(parse_frame(&c_rx.try_recv()?)["content"], "one");
    assert_eq!(parse_frame(&c_rx.try_recv()?)["content"], "two");
    Ok(())
}

#[tokio::test]
async fn stale_unregister_does_not_remove_reconnected_user() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(5, &["A", "B"]));
    let (stale_key, _stale_rx, _) = harness.connect("B", 1).await?;

    send(&harness, "A", text(5, "A", "fill")).await?;
    let evicted = send(&harness, "A", text(5, "A", "evict")).await?;
    assert_eq!(evicted.evicted, 1);
    assert_eq!(evicted.notified, 1);

    // B 重新连接后，旧连接的写任务才发出注销
    let (fresh_key, mut fresh_rx, _) = harness.connect("B", 8).await?;
    harness.hub.unregister(stale_key.clone()).await?;

    let report = send(&harness, "A", text(5, "A", "welcome back")).await?;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.notified, 0);
    assert_eq!(
        harness.registry.current_connection("B").await,
        Some(fresh_key)
    );
    assert_eq!(parse_frame(&fresh_rx.try_recv()?)["content"], "welcome back");
    Ok(())
}

#[tokio::test]
async fn reconnect_supersedes_and_closes_previous_connection() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(3, &["A", "B"]));
    let (_old, mut old_rx, old_closed) = harness.connect("B", 8).await?;
    let (_new, mut new_rx, new_closed) = harness.connect("B", 8).await?;

    let report = send(&harness, "A", text(3, "A", "latest")).await?;
    assert_eq!(report.delivered, 1);

    assert!(old_closed.is_closed());
    assert!(!new_closed.is_closed());
    assert!(old_rx.try_recv().is_err());
    assert_eq!(parse_frame(&new_rx.try_recv()?)["content"], "latest");
    assert_eq!(harness.registry.online_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn participant_lookup_is_cached_after_first_miss() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(9, &["A", "B", "C"]));

    send(&harness, "A", text(9, "A", "first")).await?;
    send(&harness, "A", text(9, "A", "second")).await?;

    assert_eq!(harness.directory.query_count(), 1);
    let mut cached = harness.cache.members(9).await.expect("cache populated");
    cached.sort();
    assert_eq!(cached, vec!["A", "B", "C"]);
    Ok(())
}

#[tokio::test]
async fn file_url_is_signed_only_for_live_delivery() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(11, &["A", "B"]));
    let (_b, mut b_rx, _) = harness.connect("B", 8).await?;

    let payload = json!({
        "type": "file",
        "conversation_id": "11",
        "content": "photo",
        "file_name": "a.png",
        "file_path": "uploads/a.png",
        "file_url": "http://attacker.example/a.png",
        "file_size": 2048,
    });
    send(&harness, "A", payload.to_string().into_bytes()).await?;

    let frame = parse_frame(&b_rx.try_recv()?);
    assert_eq!(
        frame["file_url"],
        "https://files.example/uploads/a.png?signature=test"
    );

    let persisted = harness.publisher.events(PERSISTENCE_TOPIC).await;
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].key, "11");
    assert_eq!(persisted[0].payload["file_path"], "uploads/a.png");
    assert!(persisted[0].payload.get("file_url").is_none());
    Ok(())
}

#[tokio::test]
async fn file_message_without_object_store_is_delivered_unsigned() -> Result<()> {
    let harness = Harness::build(CountingDirectory::with(11, &["A", "B"]), None);
    let (_b, mut b_rx, _) = harness.connect("B", 8).await?;

    let payload = json!({
        "type": "file",
        "conversation_id": 11,
        "file_path": "uploads/a.png",
    });
    let report = send(&harness, "A", payload.to_string().into_bytes()).await?;
    assert_eq!(report.delivered, 1);

    let frame = parse_frame(&b_rx.try_recv()?);
    assert!(frame.get("file_url").is_none());
    Ok(())
}

#[tokio::test]
async fn mark_as_read_is_echoed_to_sender() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(12, &["A", "B", "C"]));
    let (_a, mut a_rx, _) = harness.connect("A", 8).await?;
    let (_b, mut b_rx, _) = harness.connect("B", 8).await?;

    let payload = json!({
        "type": "mark_as_read",
        "conversation_id": 12,
        "last_read_message_id": 99,
    });
    let report = send(&harness, "A", payload.to_string().into_bytes()).await?;

    assert_eq!(report.delivered, 2);
    // C 离线，A 作为发送方不会收到通知
    assert_eq!(report.notified, 1);
    assert_eq!(parse_frame(&a_rx.try_recv()?)["last_read_message_id"], 99);
    assert_eq!(parse_frame(&b_rx.try_recv()?)["type"], "mark_as_read");

    let notifications = harness.publisher.events(NOTIFICATION_TOPIC).await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].key, "C");
    Ok(())
}

#[tokio::test]
async fn authenticated_identity_overrides_claimed_sender() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(8, &["A", "B"]));
    let (_b, mut b_rx, _) = harness.connect("B", 8).await?;

    send(&harness, "A", text(8, "mallory", "spoof")).await?;

    assert_eq!(parse_frame(&b_rx.try_recv()?)["sender_id"], "A");
    let persisted = harness.publisher.events(PERSISTENCE_TOPIC).await;
    assert_eq!(persisted[0].payload["sender_id"], "A");
    assert!(persisted[0].payload["created_at"].is_string());
    Ok(())
}

#[tokio::test]
async fn undecodable_frame_is_dropped() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(1, &["A", "B"]));
    let (_b, mut b_rx, _) = harness.connect("B", 8).await?;

    for payload in [&b"not json"[..], &br#"{"type":"sticker","conversation_id":1}"#[..]] {
        let report = harness
            .hub
            .dispatch_and_wait(InboundFrame::from_user(user("A"), payload.to_vec()))
            .await?;
        assert!(report.is_none());
    }

    assert!(b_rx.try_recv().is_err());
    assert!(harness.publisher.events(PERSISTENCE_TOPIC).await.is_empty());
    assert_eq!(harness.directory.query_count(), 0);
    Ok(())
}

#[tokio::test]
async fn publish_failure_does_not_block_live_delivery() -> Result<()> {
    let harness = Harness::new(CountingDirectory::with(4, &["A", "B", "C"]));
    let (_b, mut b_rx, _) = harness.connect("B", 8).await?;
    harness.publisher.fail();

    let report = send(&harness, "A", text(4, "A", "still here")).await?;

    assert!(!report.persistence_published);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.notified, 0);
    assert_eq!(parse_frame(&b_rx.try_recv()?)["content"], "still here");
    Ok(())
}

#[tokio::test]
async fn queued_frames_are_persisted_when_hub_stops() -> Result<()> {
    let (harness, hub_loop) = Harness::paused(CountingDirectory::with(9, &["A", "B"]));
    let (_b, mut b_rx, b_closed) = harness.connect("B", 8).await?;
    for content in ["first", "second"] {
        harness
            .hub
            .dispatch(InboundFrame::from_user(user("A"), text(9, "A", content)))
            .await?;
    }

    // 停机信号先于队列中的命令就绪
    hub_loop.run_until(std::future::ready(())).await;

    let persisted = harness.publisher.events(PERSISTENCE_TOPIC).await;
    assert_eq!(persisted.len(), 2);
    assert!(persisted.iter().all(|event| event.key == "9"));
    assert_eq!(persisted[0].payload["content"], "first");
    assert_eq!(persisted[1].payload["content"], "second");

    assert_eq!(parse_frame(&b_rx.try_recv()?)["content"], "first");
    assert_eq!(parse_frame(&b_rx.try_recv()?)["content"], "second");
    assert!(b_closed.is_closed());
    assert!(!harness.registry.is_online("B").await);

    // 循环退出后不再接受新命令
    assert!(
        harness
            .hub
            .dispatch(InboundFrame::from_user(user("A"), text(9, "A", "late")))
            .await
            .is_err()
    );
    Ok(())
}
