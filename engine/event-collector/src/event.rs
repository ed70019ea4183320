//! Event records flowing through the collector

use crate::error::{AppendError, CollectorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use uuid::Uuid;

/// Service tag stamped into every enriched record
pub const SERVICE_NAME: &str = "collector";

const MAX_IDENTIFIER_LEN: usize = 100;
const MAX_URL_LEN: usize = 500;
const MAX_USER_AGENT_LEN: usize = 1000;
const MAX_SCREEN_RESOLUTION_LEN: usize = 50;

/// Analytics event as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub user_id: String,
    pub session_id: String,

    /// Caller-supplied timestamp, passed through without format checks
    #[serde(rename = "timestamp")]
    pub client_timestamp: String,

    pub url: String,
    pub user_agent: String,
    pub screen_resolution: String,

    /// Free-form extras; `null` reads as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub additional_data: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Map<String, Value>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Event {
    /// Check the field length bounds accepted at intake
    pub fn validate(&self) -> Result<()> {
        check_len("event_type", &self.event_type, 1, MAX_IDENTIFIER_LEN)?;
        check_len("user_id", &self.user_id, 1, MAX_IDENTIFIER_LEN)?;
        check_len("session_id", &self.session_id, 1, MAX_IDENTIFIER_LEN)?;
        check_len("url", &self.url, 0, MAX_URL_LEN)?;
        check_len("user_agent", &self.user_agent, 0, MAX_USER_AGENT_LEN)?;
        check_len("screen_resolution", &self.screen_resolution, 0, MAX_SCREEN_RESOLUTION_LEN)?;
        Ok(())
    }
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(CollectorError::invalid_event(format!(
            "{field} length {len} outside {min}..={max}"
        )));
    }
    Ok(())
}

/// Event plus the fields assigned at acceptance; the record written to the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub event_id: Uuid,

    #[serde(flatten)]
    pub event: Event,

    pub client_ip: Option<String>,
    pub received_at: DateTime<Utc>,
    pub service: String,
}

impl EnrichedEvent {
    pub fn new(event: Event, client_addr: Option<IpAddr>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event,
            client_ip: client_addr.map(|addr| addr.to_string()),
            received_at: Utc::now(),
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Message key used for downstream partitioning
    pub fn key(&self) -> String {
        self.event_id.to_string()
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Broker metadata for an acknowledged append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub partition: i32,
    pub offset: i64,
}

/// Result of one append attempt
pub type AppendOutcome = std::result::Result<DeliveryReceipt, AppendError>;

/// Accepted-for-ingestion response handed back to the intake layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub message: String,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl IngestReceipt {
    pub fn accepted(event_id: Uuid, received_at: DateTime<Utc>) -> Self {
        Self { message: "Event accepted".to_string(), event_id, timestamp: received_at }
    }
}

#[cfg(test)]
pub(crate) fn sample_event() -> Event {
    Event {
        event_type: "click".to_string(),
        user_id: "u1".to_string(),
        session_id: "s1".to_string(),
        client_timestamp: "T".to_string(),
        url: "http://x".to_string(),
        user_agent: "UA".to_string(),
        screen_resolution: "1920x1080".to_string(),
        additional_data: Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_deserializes_wire_format() {
        let raw = json!({
            "event_type": "click",
            "user_id": "u1",
            "session_id": "s1",
            "timestamp": "T",
            "url": "http://x",
            "user_agent": "UA",
            "screen_resolution": "1920x1080"
        });

        let event: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(event, sample_event());
        assert!(event.additional_data.is_empty());
    }

    #[test]
    fn test_null_additional_data_reads_as_empty() {
        let raw = json!({
            "event_type": "click",
            "user_id": "u1",
            "session_id": "s1",
            "timestamp": "T",
            "url": "http://x",
            "user_agent": "UA",
            "screen_resolution": "1920x1080",
            "additional_data": null
        });

        let event: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(event, sample_event());

        let extras = json!({ "additional_data": { "button": "buy" } });
        let mut raw = serde_json::to_value(sample_event()).unwrap();
        raw["additional_data"] = extras["additional_data"].clone();
        let event: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(event.additional_data["button"], "buy");

        let mut raw = serde_json::to_value(sample_event()).unwrap();
        raw["additional_data"] = json!([1, 2]);
        assert!(serde_json::from_value::<Event>(raw).is_err());
    }

    #[test]
    fn test_validation_bounds() {
        assert!(sample_event().validate().is_ok());

        let mut event = sample_event();
        event.event_type.clear();
        assert!(matches!(event.validate(), Err(CollectorError::InvalidEvent(_))));

        let mut event = sample_event();
        event.url = "x".repeat(501);
        assert!(event.validate().is_err());

        let mut event = sample_event();
        event.screen_resolution = "9".repeat(50);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_enriched_payload_layout() {
        let mut event = sample_event();
        event.additional_data.insert("button".to_string(), json!({"id": 42}));

        let enriched = EnrichedEvent::new(event, Some("10.0.0.7".parse().unwrap()));
        let payload: Value = serde_json::from_slice(&enriched.to_payload().unwrap()).unwrap();

        assert_eq!(payload["event_id"], json!(enriched.event_id.to_string()));
        assert_eq!(payload["event_type"], json!("click"));
        assert_eq!(payload["timestamp"], json!("T"));
        assert_eq!(payload["client_ip"], json!("10.0.0.7"));
        assert_eq!(payload["service"], json!("collector"));
        assert_eq!(payload["additional_data"]["button"]["id"], json!(42));
        assert_eq!(enriched.key(), enriched.event_id.to_string());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = EnrichedEvent::new(sample_event(), None);
        let b = EnrichedEvent::new(sample_event(), None);
        assert_ne!(a.event_id, b.event_id);
        assert!(a.client_ip.is_none());
    }
}
