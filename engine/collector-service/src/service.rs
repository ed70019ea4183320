//! Service state management and component initialization

use anyhow::{Context, Result};
use event_collector::{
    EventProducer, HealthMonitor, HealthStatus, InMemoryLogClient, KafkaLogClient, LogClient,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{MetricsConfig, ServiceConfig};
use crate::signals::ShutdownHandle;

/// Service state containing all initialized components
pub struct CollectorService {
    /// Service configuration
    pub config: ServiceConfig,

    /// Ingestion core
    pub producer: Arc<EventProducer>,

    /// Health monitor gating intake
    pub monitor: Arc<HealthMonitor>,

    shutdown: ShutdownHandle,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl CollectorService {
    /// Create the service with all components constructed but not started
    pub fn new(config: ServiceConfig, shutdown: ShutdownHandle) -> Result<Self> {
        info!("Initializing service components...");

        let log_config = config.collector.log_client.clone();
        let client: Arc<dyn LogClient> = if config.service.dry_run {
            info!("Dry run: events go to an in-memory log (topic '{}')", log_config.topic);
            Arc::new(InMemoryLogClient::new(log_config.topic))
        } else {
            info!("Using Kafka at {} (topic '{}')", log_config.bootstrap_servers, log_config.topic);
            Arc::new(KafkaLogClient::new(log_config))
        };

        let producer = Arc::new(EventProducer::new(config.collector.clone(), client));
        let monitor = Arc::new(HealthMonitor::new(producer.clone(), config.collector.health.clone()));

        info!("Service components initialized successfully");
        Ok(Self { config, producer, monitor, shutdown, tasks: Mutex::new(Vec::new()) })
    }

    /// Connect the producer and start background tasks
    ///
    /// An unreachable log is not fatal; the health monitor keeps retrying.
    pub async fn start(&self) -> Result<()> {
        if self.config.metrics.enabled {
            install_metrics_exporter(&self.config.metrics)?;
        }

        if !self.producer.initialize().await {
            warn!("Log unreachable at startup; intake reports unavailable until it connects");
        }

        let status = self.monitor.check().await;
        info!("Initial health: {}", status.status.as_str());

        let health_task = tokio::spawn(self.monitor.clone().run(self.shutdown.subscribe()));
        let reporter_task = tokio::spawn(report_metrics(
            self.producer.clone(),
            self.config.metrics.clone(),
            self.shutdown.subscribe(),
        ));

        let mut tasks = self.tasks.lock().await;
        tasks.push(("health monitor", health_task));
        tasks.push(("metrics reporter", reporter_task));
        Ok(())
    }

    /// Latest health status
    pub fn health(&self) -> HealthStatus {
        self.monitor.status()
    }

    /// Graceful shutdown of all components
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        self.shutdown.trigger("service shutdown");

        let shutdown_timeout = self.config.service.shutdown_timeout();
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for (name, handle) in tasks {
            match timeout(shutdown_timeout, handle).await {
                Ok(Ok(())) => info!("{} stopped gracefully", name),
                Ok(Err(e)) => error!("{} task failed: {}", name, e),
                Err(_) => warn!("{} did not stop within timeout", name),
            }
        }

        // Waits for in-flight appends, then flushes the log client; the close
        // keeps running in the background if this wait gives up
        timeout(self.config.close_timeout(), self.producer.close())
            .await
            .context("Event producer did not close within the shutdown timeout")?;

        info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Install the Prometheus exporter on the configured port
pub fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::describe_counter!("collector_events_total", "Events acknowledged by the log");
    metrics::describe_counter!("collector_errors_total", "Events whose append failed");
    metrics::describe_gauge!("collector_events_per_minute", "Events acknowledged in the last 60s");
    metrics::describe_gauge!("collector_queue_size", "Appends waiting for or running on a worker");

    info!("Prometheus metrics exposed on {}", address);
    Ok(())
}

/// Publish sliding-window gauges until shutdown
async fn report_metrics(
    producer: Arc<EventProducer>,
    config: MetricsConfig,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Ok(snapshot) = producer.get_metrics() else { break };
                metrics::gauge!("collector_events_per_minute", snapshot.events_per_minute as f64);
                metrics::gauge!("collector_queue_size", snapshot.queue_size as f64);
                debug!(
                    "events_total={} errors_total={} events_per_minute={} queue_size={}",
                    snapshot.events_total,
                    snapshot.errors_total,
                    snapshot.events_per_minute,
                    snapshot.queue_size
                );
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}
