//! Metric record data model
//!
//! A [`Record`] is one observation moving from the source endpoint, through
//! the shared queue, to the load-balanced destination. Delivery metadata is
//! never stored on the record itself: it lives in a [`DeliveryEnvelope`] that
//! borrows the record for the duration of one request, so a failed delivery
//! can put the record back exactly as it was.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a record came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Fetched from the live source endpoint
    Live,
    /// Produced by the dummy generator
    Dummy,
    /// Any other marker, e.g. the downstream API that received the record
    #[serde(untagged)]
    Other(String),
}

/// One metric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique within a run
    pub id: String,

    /// ISO-8601 creation time
    pub timestamp: String,

    /// Memory figures in MB
    pub total_ram: f64,
    pub ram_free: f64,
    pub ram_used: f64,

    /// Percentages in the range 0-100
    pub ram_percent: f64,
    pub cpu_used_percent: f64,
    pub cpu_free_percent: f64,

    pub processes_running: u64,
    pub processes_total: u64,
    pub processes_sleeping: u64,
    pub processes_zombie: u64,
    pub processes_stopped: u64,

    /// Wall-clock time of the observation (`HH:MM:SS`)
    pub hour: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<SourceTag>,

    /// Fields the source sent beyond the schema, forwarded untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Destination identifier attached to every delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTag {
    pub api: String,
    pub load_balancer: String,
}

impl Default for DeliveryTag {
    fn default() -> Self {
        Self {
            api: "Balanced".to_string(),
            load_balancer: "nginx".to_string(),
        }
    }
}

impl DeliveryTag {
    pub fn envelope<'a>(&'a self, record: &'a Record) -> DeliveryEnvelope<'a> {
        DeliveryEnvelope {
            record,
            api: &self.api,
            load_balancer: &self.load_balancer,
        }
    }
}

/// Wire form of a record on its way to the destination
#[derive(Debug, Serialize)]
pub struct DeliveryEnvelope<'a> {
    #[serde(flatten)]
    pub record: &'a Record,
    pub api: &'a str,
    pub load_balancer: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Record {
        serde_json::from_value(json!({
            "id": "r-1",
            "timestamp": "2025-01-01T10:00:00Z",
            "total_ram": 16000,
            "ram_free": 6000,
            "ram_used": 10000,
            "ram_percent": 62.5,
            "cpu_used_percent": 40.0,
            "cpu_free_percent": 60.0,
            "processes_running": 3,
            "processes_total": 300,
            "processes_sleeping": 290,
            "processes_zombie": 1,
            "processes_stopped": 6,
            "hour": "10:00:00",
            "host": "node-a"
        }))
        .unwrap()
    }

    #[test]
    fn test_extra_fields_are_kept() {
        let record = sample();
        assert_eq!(record.extra.get("host"), Some(&json!("node-a")));
        assert_eq!(record.source_tag, None);
        assert_eq!(record.total_ram, 16000.0);
    }

    #[test]
    fn test_envelope_adds_delivery_fields_without_touching_record() {
        let record = sample();
        let before = record.clone();
        let tag = DeliveryTag::default();

        let wire = serde_json::to_value(tag.envelope(&record)).unwrap();

        assert_eq!(wire["api"], json!("Balanced"));
        assert_eq!(wire["load_balancer"], json!("nginx"));
        assert_eq!(wire["id"], json!("r-1"));
        assert_eq!(wire["host"], json!("node-a"));
        assert_eq!(record, before);
    }

    #[test]
    fn test_source_tag_serialization() {
        let mut record = sample();
        record.source_tag = Some(SourceTag::Dummy);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["source_tag"], json!("dummy"));

        record.source_tag = None;
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("source_tag").is_none());
    }

    #[test]
    fn test_unknown_source_tag_is_kept_verbatim() {
        let mut value = serde_json::to_value(sample()).unwrap();
        value["source_tag"] = json!("python_api");

        let record: Record = serde_json::from_value(value).unwrap();
        assert_eq!(
            record.source_tag,
            Some(SourceTag::Other("python_api".to_string()))
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["source_tag"], json!("python_api"));

        let live: Record = serde_json::from_value({
            let mut value = value;
            value["source_tag"] = json!("live");
            value
        })
        .unwrap();
        assert_eq!(live.source_tag, Some(SourceTag::Live));
    }
}
