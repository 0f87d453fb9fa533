use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::hash::{Hash, Hasher};

/// Which side of a data point a label describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    /// Identifies the entity being measured, e.g. a Kafka cluster id.
    Resource,
    /// A dimension of the data point itself, e.g. topic or partition.
    Metric,
}

/// A named dimension, serialized as its dotted key.
#[derive(Debug, Clone)]
pub struct Label {
    key: Cow<'static, str>,
    kind: LabelKind,
}

pub const METRIC_PREFIX: &str = "metric.";

pub const KAFKA_ID: Label = Label::resource("kafka.id");
pub const CONNECTOR_ID: Label = Label::resource("connector.id");
pub const KSQL_ID: Label = Label::resource("ksql.id");
pub const SCHEMA_REGISTRY_ID: Label = Label::resource("schema_registry.id");

pub const TOPIC: Label = Label::metric("metric.topic");
pub const TYPE: Label = Label::metric("metric.type");
pub const PARTITION: Label = Label::metric("metric.partition");

pub const KNOWN_RESOURCES: [Label; 4] = [KAFKA_ID, CONNECTOR_ID, KSQL_ID, SCHEMA_REGISTRY_ID];
pub const KNOWN_METRIC_LABELS: [Label; 3] = [TOPIC, TYPE, PARTITION];

impl Label {
    pub const fn resource(key: &'static str) -> Self {
        Self {
            key: Cow::Borrowed(key),
            kind: LabelKind::Resource,
        }
    }

    pub const fn metric(key: &'static str) -> Self {
        Self {
            key: Cow::Borrowed(key),
            kind: LabelKind::Metric,
        }
    }

    /// Build a label from a key seen at runtime. Keys under `metric.` are
    /// metric labels, everything else identifies a resource.
    pub fn from_key(key: impl Into<String>) -> Self {
        let key: String = key.into();
        let kind = if key.starts_with(METRIC_PREFIX) {
            LabelKind::Metric
        } else {
            LabelKind::Resource
        };
        Self {
            key: Cow::Owned(key),
            kind,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    pub fn is_resource(&self) -> bool {
        self.kind == LabelKind::Resource
    }

    /// True if this is one of the labels the API is known to advertise.
    pub fn is_known(&self) -> bool {
        KNOWN_RESOURCES
            .iter()
            .chain(KNOWN_METRIC_LABELS.iter())
            .any(|l| l == self)
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Ok(Label::from_key(key))
    }
}

/// Label as advertised by the descriptor endpoints, which carry a description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDescriptor {
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl LabelDescriptor {
    pub fn label(&self) -> Label {
        Label::from_key(self.key.clone())
    }
}
