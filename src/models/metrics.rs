use serde::{Deserialize, Serialize};

use crate::labels::{self, Label, LabelDescriptor};

/// Namespace every Kafka server metric lives under.
pub const METRIC_PREFIX: &str = "io.confluent.kafka.server/";

pub const LIFECYCLE_STAGE_PREVIEW: &str = "PREVIEW";
pub const LIFECYCLE_STAGE_GENERAL: &str = "GENERAL_AVAILABILITY";

/// A metric descriptor as returned by the descriptor endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Metric {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub metric_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lifecycle_stage: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelDescriptor>,
}

impl Metric {
    /// Build a metric from a raw name, adding the server namespace when the
    /// name carries none.
    pub fn new(name: &str) -> Self {
        let name = if name.contains('/') {
            name.to_string()
        } else {
            format!("{METRIC_PREFIX}{name}")
        };
        Self {
            name,
            ..Default::default()
        }
    }

    /// Name without the server namespace.
    pub fn short_name(&self) -> &str {
        self.name.strip_prefix(METRIC_PREFIX).unwrap_or(&self.name)
    }

    /// True for both the fully qualified and the short name.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.short_name() == name
    }

    /// Labels this metric advertises. Empty when the descriptor was not
    /// fetched from the API.
    pub fn supported_labels(&self) -> Vec<Label> {
        self.labels.iter().map(LabelDescriptor::label).collect()
    }

    /// Keep only the wanted labels this metric supports. Metrics without an
    /// advertised label set accept everything.
    pub fn valid_labels(&self, wanted: &[Label]) -> Vec<Label> {
        if self.labels.is_empty() {
            return wanted.to_vec();
        }
        let supported = self.supported_labels();
        wanted
            .iter()
            .filter(|l| l.is_resource() || supported.contains(l))
            .cloned()
            .collect()
    }

    pub fn is_preview(&self) -> bool {
        self.lifecycle_stage == LIFECYCLE_STAGE_PREVIEW
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A resource type descriptor, e.g. `kafka` identified by `kafka.id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceType {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<LabelDescriptor>,
}

impl ResourceType {
    fn known(resource_type: &str, label: Label) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            description: String::new(),
            labels: vec![LabelDescriptor {
                key: label.key().to_string(),
                description: String::new(),
            }],
        }
    }

    pub fn kafka() -> Self {
        Self::known("kafka", labels::KAFKA_ID)
    }

    pub fn connector() -> Self {
        Self::known("connector", labels::CONNECTOR_ID)
    }

    pub fn ksql() -> Self {
        Self::known("ksql", labels::KSQL_ID)
    }

    pub fn schema_registry() -> Self {
        Self::known("schema_registry", labels::SCHEMA_REGISTRY_ID)
    }

    pub fn known_types() -> Vec<ResourceType> {
        vec![
            Self::kafka(),
            Self::connector(),
            Self::ksql(),
            Self::schema_registry(),
        ]
    }

    /// Known resource type identified by `label`, e.g. `kafka` for `kafka.id`.
    pub fn for_label(label: &Label) -> Option<ResourceType> {
        Self::known_types()
            .into_iter()
            .find(|rt| rt.labels.iter().any(|d| d.label() == *label))
    }
}

pub fn kafka_received_bytes() -> Metric {
    Metric::new("io.confluent.kafka.server/received_bytes")
}

pub fn kafka_sent_bytes() -> Metric {
    Metric::new("io.confluent.kafka.server/sent_bytes")
}

pub fn kafka_received_records() -> Metric {
    Metric::new("io.confluent.kafka.server/received_records")
}

pub fn kafka_sent_records() -> Metric {
    Metric::new("io.confluent.kafka.server/sent_records")
}

pub fn kafka_retained_bytes() -> Metric {
    Metric::new("io.confluent.kafka.server/retained_bytes")
}

pub fn kafka_active_connections() -> Metric {
    Metric::new("io.confluent.kafka.server/active_connection_count")
}

pub fn kafka_requests() -> Metric {
    Metric::new("io.confluent.kafka.server/request_count")
}

pub fn kafka_partitions() -> Metric {
    Metric::new("io.confluent.kafka.server/partition_count")
}

pub fn kafka_successful_authentications() -> Metric {
    Metric::new("io.confluent.kafka.server/successful_authentication_count")
}

/// Metrics every Kafka cluster reports.
pub fn known_kafka_server_metrics() -> Vec<Metric> {
    vec![
        kafka_received_bytes(),
        kafka_sent_bytes(),
        kafka_received_records(),
        kafka_sent_records(),
        kafka_retained_bytes(),
        kafka_active_connections(),
        kafka_requests(),
        kafka_partitions(),
        kafka_successful_authentications(),
    ]
}

pub fn known_ksql_metrics() -> Vec<Metric> {
    vec![Metric::new("io.confluent.kafka.ksql/streaming_unit_count")]
}

pub fn known_schema_registry_metrics() -> Vec<Metric> {
    vec![Metric::new("io.confluent.kafka.schema_registry/schema_count")]
}

pub fn known_connector_metrics() -> Vec<Metric> {
    [
        "sent_records",
        "received_records",
        "sent_bytes",
        "received_bytes",
        "dead_letter_queue_records",
    ]
    .iter()
    .map(|n| Metric::new(&format!("io.confluent.kafka.connect/{n}")))
    .collect()
}
