// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! Event bus integration tests: per-subscriber ordering, replay, lifecycle

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spectra_mcp_rs::bus::{EventBus, SubjectConfig};
use spectra_mcp_rs::bus::events::RegistrationEvent;

fn collector() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> futures::future::BoxFuture<'static, spectra_mcp_rs::McpResult<()>> + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = seen.clone();
    let handler = move |v: u32| {
        let seen = seen_in.clone();
        let fut: futures::future::BoxFuture<'static, spectra_mcp_rs::McpResult<()>> =
            Box::pin(async move {
                seen.lock().unwrap().push(v);
                Ok(())
            });
        fut
    };
    (seen, handler)
}

#[tokio::test]
async fn test_each_subscriber_sees_publication_order() {
    let bus = EventBus::new();
    let subject = bus
        .subject::<u32>("order.test", SubjectConfig::default())
        .unwrap();

    let (seen_a, handler_a) = collector();
    let (seen_b, handler_b) = collector();
    let _sub_a = subject.subscribe(false, handler_a).unwrap();
    let _sub_b = subject.subscribe(false, handler_b).unwrap();

    for i in 0..50 {
        subject.publish(i).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let expected: Vec<u32> = (0..50).collect();
    assert_eq!(*seen_a.lock().unwrap(), expected);
    assert_eq!(*seen_b.lock().unwrap(), expected);
}

#[tokio::test]
async fn test_replay_depth_bounds_retained_suffix() {
    let bus = EventBus::new();
    let subject = bus
        .subject::<u32>(
            "replay.bound",
            SubjectConfig {
                buffer_size: 64,
                replay_depth: 3,
            },
        )
        .unwrap();

    for i in 0..10 {
        subject.publish(i).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (seen, handler) = collector();
    let _sub = subject.subscribe(true, handler).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Only the bounded suffix is replayed, in publication order.
    assert_eq!(*seen.lock().unwrap(), vec![7, 8, 9]);
}

#[tokio::test]
async fn test_subscriber_without_replay_sees_only_live() {
    let bus = EventBus::new();
    let subject = bus
        .subject::<u32>(
            "replay.optout",
            SubjectConfig {
                buffer_size: 64,
                replay_depth: 8,
            },
        )
        .unwrap();

    subject.publish(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let (seen, handler) = collector();
    let _sub = subject.subscribe(false, handler).unwrap();
    subject.publish(2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*seen.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_bus_shutdown_rejects_everything() {
    let bus = EventBus::new();
    let subject = bus
        .subject::<RegistrationEvent>("shutdown.test", SubjectConfig::default())
        .unwrap();
    bus.shutdown();

    let err = subject
        .publish(RegistrationEvent {
            name: "x".to_string(),
            added: true,
        })
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("shut down"));
}

#[tokio::test]
async fn test_typed_subjects_coexist() {
    let bus = EventBus::new();
    let numbers = bus
        .subject::<u32>("numbers", SubjectConfig::default())
        .unwrap();
    let events = bus
        .subject::<RegistrationEvent>("registrations", SubjectConfig::default())
        .unwrap();

    numbers.publish(1).await.unwrap();
    events
        .publish(RegistrationEvent {
            name: "tool".to_string(),
            added: true,
        })
        .await
        .unwrap();

    // Same name, wrong type: rejected.
    assert!(bus.subject::<String>("numbers", SubjectConfig::default()).is_err());
}
