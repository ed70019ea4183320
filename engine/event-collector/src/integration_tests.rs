//! End-to-end scenarios across producer, pool, metrics and health

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::event::sample_event;
use crate::{
    CollectorConfig, CollectorError, EventProducer, HealthConfig, HealthMonitor, HealthState,
    InMemoryLogClient, ProducerState,
};

fn config_with_workers(workers: usize) -> CollectorConfig {
    let mut config = CollectorConfig::default();
    config.pool.workers = workers;
    config
}

fn ready_producer(workers: usize) -> (Arc<InMemoryLogClient>, Arc<EventProducer>) {
    let client = Arc::new(InMemoryLogClient::new("events"));
    let producer = Arc::new(EventProducer::new(config_with_workers(workers), client.clone()));
    (client, producer)
}

#[tokio::test]
async fn test_click_event_end_to_end() {
    let (client, producer) = ready_producer(4);
    assert!(producer.initialize().await);

    let before = producer.get_metrics().unwrap().events_total;
    let event_id = producer.send_event(sample_event()).await.unwrap();
    assert!(!event_id.to_string().is_empty());

    let after = producer.get_metrics().unwrap();
    assert_eq!(after.events_total, before + 1);
    assert_eq!(after.events_per_minute, 1);
    assert_eq!(after.errors_total, 0);

    let stored: serde_json::Value = serde_json::from_slice(&client.records()[0].payload).unwrap();
    assert_eq!(stored["event_id"], serde_json::json!(event_id.to_string()));
    assert_eq!(stored["event_type"], "click");
    assert_eq!(stored["service"], "collector");

    producer.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_thousand_concurrent_sends_on_four_workers() {
    let (client, producer) = ready_producer(4);
    assert!(producer.initialize().await);
    client.set_append_delay(Some(Duration::from_micros(200)));

    let mut tasks = Vec::with_capacity(1000);
    for _ in 0..1000 {
        let producer = producer.clone();
        tasks.push(tokio::spawn(async move { producer.send_event(sample_event()).await }));
    }

    let mut ids = HashSet::new();
    let mut failures = 0u64;
    for task in tasks {
        match task.await.unwrap() {
            Ok(id) => assert!(ids.insert(id), "duplicate event id {id}"),
            Err(_) => failures += 1,
        }
    }

    let snapshot = producer.get_metrics().unwrap();
    assert_eq!(ids.len() as u64 + failures, 1000);
    assert_eq!(snapshot.events_total, ids.len() as u64);
    assert_eq!(snapshot.errors_total, failures);
    assert_eq!(snapshot.events_total + snapshot.errors_total, 1000);
    assert_eq!(client.record_count(), ids.len());
    assert_eq!(snapshot.queue_size, 0);

    producer.close().await;
}

#[tokio::test]
async fn test_failed_initialize_reports_unavailable() {
    let client = Arc::new(InMemoryLogClient::new("events"));
    client.set_reachable(false);
    let producer = Arc::new(EventProducer::new(config_with_workers(2), client.clone()));

    assert!(!producer.initialize().await);
    assert_eq!(producer.state(), ProducerState::Uninitialized);

    let monitor = HealthMonitor::new(producer.clone(), HealthConfig::default());
    assert_eq!(monitor.check().await.status, HealthState::Unavailable);

    let err = producer.send_event(sample_event()).await.unwrap_err();
    assert!(matches!(err, CollectorError::NotInitialized));
    assert_eq!(producer.get_metrics().unwrap().errors_total, 0);

    producer.close().await;
}

#[tokio::test]
async fn test_monitor_reconnects_when_log_returns() {
    let client = Arc::new(InMemoryLogClient::new("events"));
    client.set_reachable(false);
    let producer = Arc::new(EventProducer::new(config_with_workers(2), client.clone()));
    let monitor = HealthMonitor::new(producer.clone(), HealthConfig::default());

    assert!(!producer.initialize().await);
    assert_eq!(monitor.check().await.status, HealthState::Unavailable);

    client.set_reachable(true);
    assert_eq!(monitor.check().await.status, HealthState::Healthy);
    assert!(producer.is_ready());
    producer.send_event(sample_event()).await.unwrap();

    producer.close().await;
}

#[tokio::test]
async fn test_append_failures_are_counted() {
    let (client, producer) = ready_producer(2);
    producer.initialize().await;

    producer.send_event(sample_event()).await.unwrap();
    client.set_fail_appends(true);
    for _ in 0..3 {
        let err = producer.send_event(sample_event()).await.unwrap_err();
        assert!(err.is_append_failure());
    }

    let snapshot = producer.get_metrics().unwrap();
    assert_eq!(snapshot.events_total, 1);
    assert_eq!(snapshot.errors_total, 3);
    assert_eq!(snapshot.events_per_minute, 1);

    producer.close().await;
}

#[tokio::test]
async fn test_close_twice_releases_once() {
    let (client, producer) = ready_producer(2);
    producer.initialize().await;
    producer.send_event(sample_event()).await.unwrap();

    producer.close().await;
    producer.close().await;

    assert_eq!(producer.state(), ProducerState::Closed);
    assert_eq!(client.release_count(), 1);
    // Buffered records were kept before release
    assert_eq!(client.record_count(), 1);
}

#[tokio::test]
async fn test_send_after_close_is_rejected() {
    let (client, producer) = ready_producer(2);
    producer.initialize().await;
    producer.close().await;

    let err = producer.send_event(sample_event()).await.unwrap_err();
    assert!(matches!(err, CollectorError::ShuttingDown));
    assert_eq!(client.record_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_waits_for_in_flight_appends() {
    let (client, producer) = ready_producer(2);
    producer.initialize().await;
    client.set_append_delay(Some(Duration::from_millis(50)));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let producer = producer.clone();
        tasks.push(tokio::spawn(async move { producer.send_event(sample_event()).await }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    producer.close().await;
    assert_eq!(client.release_count(), 1);

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, CollectorError::ShuttingDown)),
        }
    }
    // Every admitted append reached the log before release
    assert_eq!(client.record_count(), accepted);
}

#[tokio::test]
async fn test_abandoned_caller_still_updates_metrics() {
    let (client, producer) = ready_producer(1);
    producer.initialize().await;
    client.set_append_delay(Some(Duration::from_millis(50)));

    let abandoned = {
        let producer = producer.clone();
        tokio::spawn(async move { producer.send_event(sample_event()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    abandoned.abort();

    producer.close().await;
    assert_eq!(client.record_count(), 1);
    assert_eq!(producer.metrics().events_total(), 1);
}
