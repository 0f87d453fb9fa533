use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::filter::{self, Filter};
use crate::granularity::Granularity;
use crate::interval::Interval;
use crate::labels::{self, Label};
use crate::models::metrics::{self, Metric, ResourceType};
use crate::models::query::{Aggregation, Group, Query};
use crate::models::response::{MetricsResponse, QueryResponse, ResourcesResponse, Telemetry};
use crate::transport::{HttpTransport, Method, Transport};

pub const PATH_QUERY: &str = "query";
pub const PATH_ATTRIBUTES: &str = "attributes";
pub const PATH_DESCRIPTOR_METRICS: &str = "descriptors/metrics";
pub const PATH_DESCRIPTOR_RESOURCES: &str = "descriptors/resources";

/// What to measure, for which resource, over which window.
#[derive(Debug, Clone)]
pub struct MetricRequest {
    pub resource: Label,
    pub resource_id: String,
    pub metric: Metric,
    pub granularity: Granularity,
    pub interval: Interval,
}

impl MetricRequest {
    pub fn new(
        resource: Label,
        resource_id: impl Into<String>,
        metric: Metric,
        granularity: Granularity,
        interval: Interval,
    ) -> Self {
        Self {
            resource,
            resource_id: resource_id.into(),
            metric,
            granularity,
            interval,
        }
    }

    /// Request against a Kafka cluster, identified by `kafka.id`.
    pub fn kafka(
        cluster: impl Into<String>,
        metric: Metric,
        granularity: Granularity,
        interval: Interval,
    ) -> Self {
        Self::new(labels::KAFKA_ID, cluster, metric, granularity, interval)
    }

    pub fn with_metric(&self, metric: Metric) -> Self {
        Self {
            metric,
            ..self.clone()
        }
    }

    pub fn resource_filter(&self) -> Filter {
        filter::equal_to(self.resource.clone(), self.resource_id.clone())
    }

    /// SUM of the metric, filtered to the resource and grouped by it plus
    /// whichever of `extra_groups` the metric supports.
    pub fn to_query(&self, filter: Filter, extra_groups: &[Label], limit: u32) -> Query {
        let mut wanted = vec![self.resource.clone()];
        wanted.extend(extra_groups.iter().cloned());

        Query::metric_query(
            self.granularity,
            vec![self.interval.clone()],
            vec![Aggregation::sum_of(&self.metric)],
        )
        .with_filter(filter)
        .with_group_by(Group::of(self.metric.valid_labels(&wanted)))
        .with_limit(limit)
    }
}

/// Client for the metrics API. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct TelemetryClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
}

impl TelemetryClient {
    /// Client talking HTTP with the configured credentials and headers.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let url = self.config.api_url(path);
        if let Some(body) = &body {
            tracing::trace!(%method, url, query = %String::from_utf8_lossy(body), "sending request");
        } else {
            tracing::debug!(%method, url, "sending request");
        }

        let res = self.transport.send(method, &url, body).await?;
        if !res.is_success() {
            let err = Error::from_status(res.status, &url, &res.body);
            tracing::error!(%method, url, status = res.status, "{err}");
            return Err(err);
        }

        tracing::debug!(%method, url, bytes = res.body.len(), "request succeeded");
        Ok(res.body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.send(Method::Get, path, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<T> {
        let body = self.send(Method::Post, path, Some(query.to_json()?)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Validate and run one metric query. Invalid queries never reach the
    /// network.
    pub async fn post_query(&self, query: &Query) -> Result<QueryResponse> {
        query.validate()?;
        self.post(PATH_QUERY, query).await
    }

    /// Run an attribute query, which lists the values of the grouped labels.
    pub async fn post_label_query(&self, query: &Query) -> Result<QueryResponse> {
        query.validate_label_query()?;
        self.post(PATH_ATTRIBUTES, query).await
    }

    pub async fn get_available_metrics(&self) -> Result<Vec<Metric>> {
        let res: MetricsResponse = self.get(PATH_DESCRIPTOR_METRICS).await?;
        Ok(res.data)
    }

    pub async fn get_available_metrics_for_resource(&self, resource_type: &str) -> Result<Vec<Metric>> {
        let path = format!(
            "{PATH_DESCRIPTOR_METRICS}?resource_type={}",
            urlencoding::encode(resource_type)
        );
        let res: MetricsResponse = self.get(&path).await?;
        Ok(res.data)
    }

    pub async fn get_available_resources(&self) -> Result<Vec<ResourceType>> {
        let res: ResourcesResponse = self.get(PATH_DESCRIPTOR_RESOURCES).await?;
        Ok(res.data)
    }

    /// Look a user supplied name up in the advertised catalog.
    pub async fn resolve_metric(&self, name: &str) -> Result<Metric> {
        let available = self.get_available_metrics().await?;
        if let Some(m) = available.iter().find(|m| m.matches(name)) {
            return Ok(m.clone());
        }
        Err(Error::UnknownMetric {
            name: name.to_string(),
            available: available
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Resolve several names at once. Names the catalog doesn't know are
    /// skipped.
    pub async fn resolve_metrics(&self, names: &[String]) -> Result<Vec<Metric>> {
        let available = self.get_available_metrics().await?;
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            match available.iter().find(|m| m.matches(name)) {
                Some(m) => resolved.push(m.clone()),
                None => tracing::warn!(metric = %name, "skipping unknown metric"),
            }
        }
        Ok(resolved)
    }

    /// Distinct values of `field` seen for the metric on one resource.
    pub async fn label_query(
        &self,
        resource: &Label,
        resource_id: &str,
        metric: &Metric,
        field: &Label,
        interval: &Interval,
    ) -> Result<Vec<String>> {
        let query = Query::label_query(Group::of([field.clone()]))
            .with_filter(filter::equal_to(resource.clone(), resource_id))
            .with_metric(metric);
        let query = Query {
            intervals: vec![interval.clone()],
            ..query
        };

        let res = self.post_label_query(&query).await?;
        let mut values: Vec<String> = Vec::with_capacity(res.data.len());
        for row in &res.data {
            if let Some(v) = row.label_value(field) {
                if !values.contains(&v) {
                    values.push(v);
                }
            }
        }
        tracing::debug!(metric = %metric, field = %field, count = values.len(), "label query");
        Ok(values)
    }

    pub async fn get_topics_for_metric(
        &self,
        cluster: &str,
        metric: &Metric,
        interval: &Interval,
    ) -> Result<Vec<String>> {
        self.label_query(&labels::KAFKA_ID, cluster, metric, &labels::TOPIC, interval)
            .await
    }

    pub async fn get_request_types(&self, cluster: &str, interval: &Interval) -> Result<Vec<String>> {
        self.label_query(
            &labels::KAFKA_ID,
            cluster,
            &metrics::kafka_requests(),
            &labels::TYPE,
            interval,
        )
        .await
    }

    async fn run_for_metric(&self, request: &MetricRequest, query: Query) -> Result<Vec<Telemetry>> {
        let res = self.post_query(&query).await?;
        let mut data = res.data;
        for row in &mut data {
            row.metric = request.metric.name.clone();
        }
        Ok(data)
    }

    /// All data points of the metric for the resource.
    pub async fn query_metric(&self, request: &MetricRequest) -> Result<Vec<Telemetry>> {
        let query = request.to_query(request.resource_filter(), &[], self.config.page_limit);
        self.run_for_metric(request, query).await
    }

    /// Data points for the resource broken down by `group_by`. Labels the
    /// metric doesn't advertise are dropped from the grouping.
    pub async fn query_metric_with_labels(
        &self,
        request: &MetricRequest,
        group_by: &[Label],
    ) -> Result<Vec<Telemetry>> {
        let query = request.to_query(request.resource_filter(), group_by, self.config.page_limit);
        self.run_for_metric(request, query).await
    }

    /// Data points restricted to one value of `label`, grouped by it.
    pub async fn query_metric_and_label(
        &self,
        request: &MetricRequest,
        label: &Label,
        value: &str,
    ) -> Result<Vec<Telemetry>> {
        let filter = request
            .resource_filter()
            .and_equal_to(label.clone(), value);
        let query = request.to_query(filter, &[label.clone()], self.config.page_limit);
        self.run_for_metric(request, query).await
    }

    pub async fn query_metric_and_type(
        &self,
        request: &MetricRequest,
        request_type: &str,
    ) -> Result<Vec<Telemetry>> {
        self.query_metric_and_label(request, &labels::TYPE, request_type)
            .await
    }

    /// Data points for one topic. A wildcard topic (`*` or `all`) returns
    /// every topic in one grouped query instead.
    pub async fn query_metric_and_topic(
        &self,
        request: &MetricRequest,
        topic: &str,
    ) -> Result<Vec<Telemetry>> {
        if crate::fan_out::is_wildcard(topic) {
            return self.query_metric_for_all_topics(request).await;
        }
        self.query_metric_and_label(request, &labels::TOPIC, topic)
            .await
    }

    /// Like [`query_metric_and_topic`](Self::query_metric_and_topic) but also
    /// broken down per partition.
    pub async fn query_metric_and_topic_with_partitions(
        &self,
        request: &MetricRequest,
        topic: &str,
    ) -> Result<Vec<Telemetry>> {
        let filter = if crate::fan_out::is_wildcard(topic) {
            request.resource_filter()
        } else {
            request.resource_filter().and_equal_to(labels::TOPIC, topic)
        };
        let query = request.to_query(
            filter,
            &[labels::TOPIC, labels::PARTITION],
            self.config.page_limit,
        );
        self.run_for_metric(request, query).await
    }

    /// Every topic's data points in a single query grouped by topic.
    pub async fn query_metric_for_all_topics(&self, request: &MetricRequest) -> Result<Vec<Telemetry>> {
        let query = request.to_query(
            request.resource_filter(),
            &[labels::TOPIC],
            self.config.page_limit,
        );
        self.run_for_metric(request, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::transport::mock::{MockTransport, ok, status};
    use chrono::{DateTime, Duration};
    use serde_json::json;

    fn client(mock: MockTransport) -> (TelemetryClient, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let config = ClientConfig {
            base_url: "http://metrics.test".into(),
            ..ClientConfig::new(Credentials::new("k", "s"))
        };
        (TelemetryClient::with_transport(config, mock.clone()), mock)
    }

    fn hour() -> Interval {
        let start = DateTime::parse_from_rfc3339("2021-04-19T00:00:00Z").unwrap();
        Interval::starting_from(start, Duration::hours(1)).unwrap()
    }

    fn request() -> MetricRequest {
        MetricRequest::kafka(
            "lkc-1",
            metrics::kafka_received_bytes(),
            Granularity::OneMinute,
            hour(),
        )
    }

    #[tokio::test]
    async fn post_query_sends_validated_body() {
        let (client, mock) = client(MockTransport::new(|method, url, _| {
            assert_eq!(method, Method::Post);
            assert_eq!(url, "http://metrics.test/v2/metrics/cloud/query");
            ok(json!({"data": [{"timestamp": "2021-04-19T00:00:00Z", "value": 10, "metric.topic": "t1"}]}))
        }));

        let rows = client.query_metric_and_topic(&request(), "t1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].metric, "io.confluent.kafka.server/received_bytes");

        let requests = mock.requests.lock().unwrap();
        let body = requests[0].2.as_ref().unwrap();
        assert_eq!(body["group_by"], json!(["kafka.id", "metric.topic"]));
        assert_eq!(body["filter"]["op"], "AND");
        assert_eq!(body["filter"]["filters"][1]["value"], "t1");
        assert_eq!(body["limit"], 1000);
        assert_eq!(body["granularity"], "PT1M");
    }

    #[tokio::test]
    async fn invalid_query_never_reaches_network() {
        let (client, mock) = client(MockTransport::new(|_, _, _| ok(json!({"data": []}))));
        let too_long = Interval::starting_from(
            DateTime::parse_from_rfc3339("2021-04-19T00:00:00Z").unwrap(),
            Duration::hours(7),
        )
        .unwrap();
        let query = Query::metric_query(
            Granularity::OneMinute,
            vec![too_long],
            vec![Aggregation::sum_of(&metrics::kafka_sent_bytes())],
        );

        let err = client.post_query(&query).await.unwrap_err();
        assert!(matches!(err, Error::IntervalExceedsGranularity { .. }));

        let err = client.post_label_query(&Query::default()).await.unwrap_err();
        assert!(matches!(err, Error::MissingGroupBy));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn non_success_status_is_classified() {
        let (client, _) = client(MockTransport::new(|_, url, _| {
            if url.ends_with("/query") {
                status(429, json!({"errors": [{"status": "429", "detail": "too many requests"}]}))
            } else {
                status(500, json!({"error": {"code": "internal", "detail": "boom"}}))
            }
        }));

        let err = client.query_metric(&request()).await.unwrap_err();
        assert!(err.is_rate_limited());

        let err = client.get_available_metrics().await.unwrap_err();
        match err {
            Error::Api { status, response, .. } => {
                assert_eq!(status, 500);
                assert_eq!(response.error.unwrap().code, "internal");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let (client, _) = client(MockTransport::new(|_, _, _| {
            Err(Error::Transport("connection refused".into()))
        }));
        let err = client.query_metric(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(ref m) if m == "connection refused"));
    }

    #[tokio::test]
    async fn label_query_collects_distinct_values() {
        let (client, mock) = client(MockTransport::new(|_, url, body| {
            assert!(url.ends_with("/attributes"));
            let body = body.unwrap();
            assert_eq!(body["group_by"], json!(["metric.topic"]));
            assert_eq!(body["metric"], "io.confluent.kafka.server/received_bytes");
            assert_eq!(body["intervals"][0], "2021-04-19T00:00:00Z/PT1H");
            assert!(body.get("aggregations").is_none());
            ok(json!({"data": [
                {"metric.topic": "t1"},
                {"metric.topic": "t2"},
                {"metric.topic": "t1"},
                {"kafka.id": "lkc-1"}
            ]}))
        }));

        let topics = client
            .get_topics_for_metric("lkc-1", &metrics::kafka_received_bytes(), &hour())
            .await
            .unwrap();
        assert_eq!(topics, vec!["t1", "t2"]);
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn catalog_lookups() {
        let (client, mock) = client(MockTransport::new(|method, url, _| {
            assert_eq!(method, Method::Get);
            if url.ends_with("descriptors/resources") {
                ok(json!({"data": [{"type": "kafka", "labels": [{"key": "kafka.id"}]}]}))
            } else {
                ok(json!({"data": [
                    {"name": "io.confluent.kafka.server/received_bytes", "labels": [{"key": "metric.topic"}]},
                    {"name": "io.confluent.kafka.server/sent_bytes"}
                ], "meta": {"pagination": {"page_size": 100}}}))
            }
        }));

        let m = client.resolve_metric("received_bytes").await.unwrap();
        assert_eq!(m.supported_labels(), vec![labels::TOPIC]);

        let err = client.resolve_metric("nope").await.unwrap_err();
        assert!(matches!(err, Error::UnknownMetric { ref available, .. } if available.contains("sent_bytes")));

        let resolved = client
            .resolve_metrics(&["sent_bytes".into(), "nope".into()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);

        let resources = client.get_available_resources().await.unwrap();
        assert_eq!(resources[0].resource_type, "kafka");

        client.get_available_metrics_for_resource("kafka").await.unwrap();
        let requests = mock.requests.lock().unwrap();
        assert_eq!(
            requests.last().unwrap().1,
            "http://metrics.test/v2/metrics/cloud/descriptors/metrics?resource_type=kafka"
        );
    }

    #[tokio::test]
    async fn metric_grouped_by_caller_labels() {
        let (client, mock) = client(MockTransport::new(|_, _, _| {
            ok(json!({"data": [
                {"value": 3, "metric.topic": "orders", "metric.partition": 0},
                {"value": 4, "metric.topic": "orders", "metric.partition": 1}
            ]}))
        }));

        let mut req = request();
        req.metric.labels = vec![crate::labels::LabelDescriptor {
            key: "metric.topic".into(),
            description: String::new(),
        }];
        let rows = client
            .query_metric_with_labels(&req, &[labels::TOPIC, labels::PARTITION])
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .all(|r| r.metric == "io.confluent.kafka.server/received_bytes"));
        assert_eq!(rows[1].label_value(&labels::PARTITION).as_deref(), Some("1"));

        let requests = mock.requests.lock().unwrap();
        let body = requests[0].2.as_ref().unwrap();
        assert_eq!(body["group_by"], json!(["kafka.id", "metric.topic"]));
        assert_eq!(body["filter"]["op"], "EQ");
        assert_eq!(body["aggregations"][0]["agg"], "SUM");
    }

    #[tokio::test]
    async fn partition_and_type_queries_group_accordingly() {
        let (client, mock) = client(MockTransport::new(|_, _, _| ok(json!({"data": []}))));

        client
            .query_metric_and_topic_with_partitions(&request(), "orders")
            .await
            .unwrap();
        client.query_metric_and_type(&request(), "Produce").await.unwrap();
        client.query_metric_and_topic(&request(), "ALL").await.unwrap();

        let requests = mock.requests.lock().unwrap();
        let bodies: Vec<&serde_json::Value> =
            requests.iter().map(|r| r.2.as_ref().unwrap()).collect();
        assert_eq!(
            bodies[0]["group_by"],
            json!(["kafka.id", "metric.topic", "metric.partition"])
        );
        assert_eq!(bodies[1]["group_by"], json!(["kafka.id", "metric.type"]));
        assert_eq!(bodies[1]["filter"]["filters"][1]["value"], "Produce");
        assert_eq!(bodies[2]["group_by"], json!(["kafka.id", "metric.topic"]));
        assert_eq!(bodies[2]["filter"]["op"], "EQ");
    }
}
