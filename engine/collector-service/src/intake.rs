//! JSON-lines event intake for development and replay

use event_collector::{Event, EventProducer, HealthMonitor};
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// One input line: an event plus an optional caller address
#[derive(Debug, Deserialize)]
struct IntakeLine {
    #[serde(flatten)]
    event: Event,

    #[serde(default)]
    client_ip: Option<IpAddr>,
}

/// Per-run intake counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    pub accepted: u64,
    pub failed: u64,
    /// Refused because the collector was not healthy
    pub rejected: u64,
    /// Unparseable or out of bounds
    pub invalid: u64,
}

/// Read events line by line and ingest them concurrently
///
/// Returns once the reader is exhausted and every admitted event has an outcome.
pub async fn run_intake<R>(
    reader: R,
    producer: Arc<EventProducer>,
    monitor: Arc<HealthMonitor>,
    concurrency: usize,
) -> std::io::Result<IntakeSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let slots = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut in_flight = JoinSet::new();
    let mut summary = IntakeSummary::default();
    let mut line_number = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = match serde_json::from_str::<IntakeLine>(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Line {}: invalid event JSON: {}", line_number, e);
                summary.invalid += 1;
                continue;
            }
        };

        if let Err(e) = parsed.event.validate() {
            warn!("Line {}: {}", line_number, e);
            summary.invalid += 1;
            continue;
        }

        let health = monitor.status();
        if !health.status.is_available() {
            warn!("Line {}: rejected, collector {}", line_number, health.status.as_str());
            summary.rejected += 1;
            continue;
        }

        let Ok(permit) = slots.clone().acquire_owned().await else {
            break;
        };
        let producer = producer.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            producer.ingest(parsed.event, parsed.client_ip).await
        });

        // Reap finished ingests so the set stays bounded
        while let Some(done) = in_flight.try_join_next() {
            tally(&mut summary, done);
        }
    }

    while let Some(done) = in_flight.join_next().await {
        tally(&mut summary, done);
    }

    info!(
        "Intake finished: {} accepted, {} failed, {} rejected, {} invalid",
        summary.accepted, summary.failed, summary.rejected, summary.invalid
    );
    Ok(summary)
}

fn tally(
    summary: &mut IntakeSummary,
    done: Result<event_collector::Result<event_collector::IngestReceipt>, tokio::task::JoinError>,
) {
    match done {
        Ok(Ok(receipt)) => {
            debug!("{} ({})", receipt.message, receipt.event_id);
            summary.accepted += 1;
        }
        Ok(Err(e)) => {
            warn!("Ingest failed: {}", e);
            summary.failed += 1;
        }
        Err(e) => {
            warn!("Ingest task failed: {}", e);
            summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_collector::{CollectorConfig, HealthConfig, InMemoryLogClient};

    const CLICK: &str = r#"{"event_type":"click","user_id":"u1","session_id":"s1","timestamp":"T","url":"http://x","user_agent":"UA","screen_resolution":"1920x1080"}"#;

    async fn setup(reachable: bool) -> (Arc<InMemoryLogClient>, Arc<EventProducer>, Arc<HealthMonitor>) {
        let client = Arc::new(InMemoryLogClient::new("events"));
        client.set_reachable(reachable);
        let producer = Arc::new(EventProducer::new(CollectorConfig::default(), client.clone()));
        producer.initialize().await;
        let config = HealthConfig { reconnect: false, ..Default::default() };
        let monitor = Arc::new(HealthMonitor::new(producer.clone(), config));
        monitor.check().await;
        (client, producer, monitor)
    }

    #[tokio::test]
    async fn test_intake_counts_each_line() {
        let (client, producer, monitor) = setup(true).await;
        let with_ip = CLICK.replacen('{', r#"{"client_ip":"10.1.2.3","#, 1);
        let input = format!(
            "{CLICK}\n\nnot json\n{}\n{with_ip}\n",
            CLICK.replace("\"u1\"", "\"\"")
        );

        let summary = run_intake(input.as_bytes(), producer.clone(), monitor, 4).await.unwrap();
        assert_eq!(summary, IntakeSummary { accepted: 2, failed: 0, rejected: 0, invalid: 2 });
        assert_eq!(client.record_count(), 2);

        let with_addr = client
            .records()
            .iter()
            .filter(|record| String::from_utf8_lossy(&record.payload).contains("10.1.2.3"))
            .count();
        assert_eq!(with_addr, 1);
        producer.close().await;
    }

    #[tokio::test]
    async fn test_unavailable_collector_rejects_lines() {
        let (client, producer, monitor) = setup(false).await;
        let input = format!("{CLICK}\n{CLICK}\n");

        let summary = run_intake(input.as_bytes(), producer.clone(), monitor, 4).await.unwrap();
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.accepted, 0);
        assert_eq!(client.record_count(), 0);
        producer.close().await;
    }
}
