use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::labels::Label;
use crate::models::metrics::{Metric, ResourceType};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// One data point of a query result.
///
/// Only `timestamp`, `value` and `metric` are fixed. Every other key is a
/// label the query grouped by, so which keys appear depends on the request;
/// they are kept in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub value: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub metric: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Telemetry {
    /// Value of a grouped label as a string, numbers included.
    pub fn label_value(&self, label: &Label) -> Option<String> {
        match self.fields.get(label.key())? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Telemetry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;

        let mut raw = serde_json::Map::deserialize(deserializer)?;
        let mut row = Telemetry::default();

        if let Some(ts) = raw.remove("timestamp") {
            let ts = ts
                .as_str()
                .ok_or_else(|| D::Error::custom("timestamp must be a string"))?;
            row.timestamp = Some(DateTime::parse_from_rfc3339(ts).map_err(D::Error::custom)?);
        }
        if let Some(value) = raw.remove("value") {
            row.value = match value {
                serde_json::Value::Null => 0.0,
                v => v
                    .as_f64()
                    .ok_or_else(|| D::Error::custom(format!("value must be a number, got {v}")))?,
            };
        }
        if let Some(metric) = raw.remove("metric") {
            row.metric = match metric {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                v => return Err(D::Error::custom(format!("metric must be a string, got {v}"))),
            };
        }
        row.fields = raw.into_iter().collect();
        Ok(row)
    }
}

/// Result rows of a query or attributes request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub data: Vec<Telemetry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    #[serde(default)]
    pub data: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesResponse {
    #[serde(default)]
    pub data: Vec<ResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pointer: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parameter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<ErrorSource>,
}

/// Body of a non-2xx response. The API answers either with an `errors`
/// list or a single `error` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorDetail>,
    #[serde(skip)]
    pub raw: String,
}

impl ErrorResponse {
    /// Parse an error body, keeping the raw text when it is not JSON.
    pub fn parse(body: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(body).into_owned();
        match serde_json::from_slice::<ErrorResponse>(body) {
            Ok(mut parsed) => {
                parsed.raw = raw;
                parsed
            }
            Err(_) => ErrorResponse {
                raw,
                ..Default::default()
            },
        }
    }

    pub fn details(&self) -> impl Iterator<Item = &ApiErrorDetail> {
        self.errors.iter().chain(self.error.iter())
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .details()
            .map(|d| {
                let code = if d.code.is_empty() { &d.status } else { &d.code };
                if d.detail.is_empty() {
                    code.clone()
                } else {
                    format!("{code} ({})", d.detail)
                }
            })
            .collect();
        if parts.is_empty() {
            write!(f, "{}", self.raw.trim())
        } else {
            write!(f, "received the following errors from the API: {}", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{KAFKA_ID, PARTITION, TOPIC};

    #[test]
    fn telemetry_buckets_dynamic_fields() {
        let json = r#"{
            "data": [
                {"timestamp": "2021-04-19T15:00:00Z", "value": 42.5, "metric.topic": "orders", "kafka.id": "lkc-1", "metric.partition": 3},
                {"timestamp": "2021-04-19T15:01:00Z", "value": 7, "metric.topic": "payments"}
            ],
            "meta": {"pagination": {"page_size": 1000, "total_size": 2}}
        }"#;
        let resp: QueryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data.len(), 2);

        let row = &resp.data[0];
        assert_eq!(row.value, 42.5);
        assert_eq!(row.metric, "");
        assert_eq!(row.label_value(&TOPIC).as_deref(), Some("orders"));
        assert_eq!(row.label_value(&KAFKA_ID).as_deref(), Some("lkc-1"));
        assert_eq!(row.label_value(&PARTITION).as_deref(), Some("3"));
        assert!(!row.fields.contains_key("value"));
        assert_eq!(
            row.timestamp.unwrap().to_rfc3339(),
            "2021-04-19T15:00:00+00:00"
        );

        assert_eq!(resp.data[1].value, 7.0);
        assert_eq!(resp.meta.unwrap().pagination.total_size, Some(2));
    }

    #[test]
    fn telemetry_serializes_flat() {
        let mut row = Telemetry {
            value: 1.0,
            metric: "m".into(),
            ..Default::default()
        };
        row.fields.insert("metric.topic".into(), "t1".into());
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"value":1.0,"metric":"m","metric.topic":"t1"}"#
        );
    }

    #[test]
    fn telemetry_rejects_non_string_metric() {
        let err = serde_json::from_str::<Telemetry>(r#"{"value": 1, "metric": 42}"#).unwrap_err();
        assert!(err.to_string().contains("metric must be a string"));

        let row: Telemetry =
            serde_json::from_str(r#"{"value": 1, "metric": "io.confluent.kafka.server/sent_bytes"}"#)
                .unwrap();
        assert_eq!(row.metric, "io.confluent.kafka.server/sent_bytes");
        assert!(row.fields.is_empty());
    }

    #[test]
    fn error_response_both_shapes() {
        let list = ErrorResponse::parse(
            br#"{"errors":[{"id":"1","status":"400","code":"invalid_filter","title":"Bad","detail":"unknown field","source":[{"pointer":"/filter","parameter":"field"}]}]}"#,
        );
        assert_eq!(list.errors[0].source[0].pointer, "/filter");
        assert_eq!(
            list.to_string(),
            "received the following errors from the API: invalid_filter (unknown field)"
        );

        let single = ErrorResponse::parse(br#"{"error":{"status":"401","detail":"bad key"}}"#);
        assert_eq!(single.details().count(), 1);
        assert_eq!(
            single.to_string(),
            "received the following errors from the API: 401 (bad key)"
        );

        let text = ErrorResponse::parse(b"upstream timeout\n");
        assert_eq!(text.to_string(), "upstream timeout");
    }
}
