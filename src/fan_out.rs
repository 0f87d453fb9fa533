//! Bounded parallel execution of one query per key (topic or metric name).
//!
//! Keys are queued on a channel drained by `min(max_workers, keys)` workers.
//! Successful rows and per-key failures travel on separate channels and are
//! merged once every worker has exited. A failing key never cancels the
//! others.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::{MetricRequest, TelemetryClient};
use crate::error::{Error, FanOutError, KeyFailure, Result};
use crate::models::metrics::{Metric, ResourceType};
use crate::models::response::Telemetry;

/// `*` or any casing of `all`.
pub fn is_wildcard(key: &str) -> bool {
    key == "*" || key.eq_ignore_ascii_case("all")
}

/// Drop discovered keys listed in the blacklist, keeping discovery order.
pub fn apply_blacklist(discovered: Vec<String>, blacklist: &[String]) -> Vec<String> {
    discovered
        .into_iter()
        .filter(|k| !blacklist.contains(k))
        .collect()
}

/// Outcome of a fan-out: rows from every key that succeeded plus the
/// failures of the ones that didn't.
#[derive(Debug, Default)]
pub struct FanOutResult {
    pub data: Vec<Telemetry>,
    pub errors: FanOutError,
}

impl FanOutResult {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&self) -> Option<&FanOutError> {
        (!self.errors.is_empty()).then_some(&self.errors)
    }

    /// All-or-nothing view: any failed key turns the whole call into an error.
    pub fn into_result(self) -> Result<Vec<Telemetry>> {
        if self.errors.is_empty() {
            Ok(self.data)
        } else {
            Err(Error::FanOut(self.errors))
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    max_workers: usize,
}

impl FanOut {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run `job` once per key with at most `max_workers` in flight.
    ///
    /// Row order across keys is unspecified. Keys whose worker died without
    /// answering are reported as [`Error::WorkerLost`].
    pub async fn run<F, Fut>(&self, keys: Vec<String>, job: F) -> FanOutResult
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Telemetry>>> + Send + 'static,
    {
        if keys.is_empty() {
            return FanOutResult::default();
        }

        let workers = self.max_workers.min(keys.len());
        debug!(keys = keys.len(), workers, "starting fan-out");

        let (work_tx, work_rx) = mpsc::channel::<String>(keys.len());
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(String, Vec<Telemetry>)>();
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<KeyFailure>();
        let job = Arc::new(job);

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let job = Arc::clone(&job);
            let result_tx = result_tx.clone();
            let error_tx = error_tx.clone();

            pool.spawn(async move {
                loop {
                    let next = work_rx.lock().await.recv().await;
                    let Some(key) = next else { break };

                    debug!(worker_id, key, "worker picked up key");
                    match job(key.clone()).await {
                        Ok(rows) => {
                            let _ = result_tx.send((key, rows));
                        }
                        Err(error) => {
                            warn!(worker_id, key, error = %error, "key failed");
                            let _ = error_tx.send(KeyFailure { key, error });
                        }
                    }
                }
                debug!(worker_id, "worker finished");
            });
        }
        drop(result_tx);
        drop(error_tx);

        // Undispatched keys are picked up by `unanswered` below.
        for key in &keys {
            if work_tx.send(key.clone()).await.is_err() {
                warn!(key, "work queue closed before dispatch finished");
                break;
            }
        }
        drop(work_tx);

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "fan-out worker panicked");
            }
        }

        let mut out = FanOutResult::default();
        let mut answered: Vec<String> = Vec::with_capacity(keys.len());
        while let Some((key, rows)) = result_rx.recv().await {
            answered.push(key);
            out.data.extend(rows);
        }
        while let Some(failure) = error_rx.recv().await {
            answered.push(failure.key.clone());
            out.errors.failures.push(failure);
        }
        for key in unanswered(&keys, &answered) {
            out.errors.failures.push(KeyFailure {
                error: Error::WorkerLost { key: key.clone() },
                key,
            });
        }

        info!(
            keys = keys.len(),
            rows = out.data.len(),
            failed = out.errors.len(),
            "fan-out complete"
        );
        out
    }
}

/// Keys with no result or error, one entry per missing occurrence.
fn unanswered(keys: &[String], answered: &[String]) -> Vec<String> {
    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for key in answered {
        *remaining.entry(key.as_str()).or_default() += 1;
    }
    let mut lost = Vec::new();
    for key in keys {
        match remaining.get_mut(key.as_str()) {
            Some(n) if *n > 0 => *n -= 1,
            _ => lost.push(key.clone()),
        }
    }
    lost
}

impl TelemetryClient {
    pub fn fan_out(&self) -> FanOut {
        FanOut::new(self.config().max_workers)
    }

    /// Query the metric once per topic in parallel.
    ///
    /// A wildcard anywhere in `topics` replaces the list with every topic the
    /// cluster reports for the metric, minus `blacklist`. The blacklist only
    /// applies to discovered topics. Discovery failures are returned as the
    /// outer error; per-topic failures land in the result.
    pub async fn query_metric_and_topics(
        &self,
        request: &MetricRequest,
        topics: &[String],
        include_partitions: bool,
        blacklist: &[String],
    ) -> Result<FanOutResult> {
        let topics = if topics.iter().any(|t| is_wildcard(t)) {
            let discovered = self
                .label_query(
                    &request.resource,
                    &request.resource_id,
                    &request.metric,
                    &crate::labels::TOPIC,
                    &request.interval,
                )
                .await?;
            apply_blacklist(discovered, blacklist)
        } else {
            topics.to_vec()
        };

        let client = self.clone();
        let request = Arc::new(request.clone());
        let result = self
            .fan_out()
            .run(topics, move |topic| {
                let client = client.clone();
                let request = Arc::clone(&request);
                async move {
                    if include_partitions {
                        client
                            .query_metric_and_topic_with_partitions(&request, &topic)
                            .await
                    } else {
                        client.query_metric_and_topic(&request, &topic).await
                    }
                }
            })
            .await;
        Ok(result)
    }

    /// Query several metrics for the same resource in parallel. `template`
    /// supplies everything but the metric.
    ///
    /// A wildcard anywhere in `metric_names` means every metric the API
    /// advertises for the template's resource type, minus `blacklist`.
    /// Resources outside the known types fall back to the full catalog.
    pub async fn query_metrics(
        &self,
        template: &MetricRequest,
        metric_names: &[String],
        blacklist: &[String],
    ) -> Result<FanOutResult> {
        let mut catalog: HashMap<String, Metric> = HashMap::new();
        let names = if metric_names.iter().any(|m| is_wildcard(m)) {
            let available = match ResourceType::for_label(&template.resource) {
                Some(rt) => {
                    self.get_available_metrics_for_resource(&rt.resource_type)
                        .await?
                }
                None => self.get_available_metrics().await?,
            };
            let names = available.iter().map(|m| m.name.clone()).collect();
            catalog.extend(available.into_iter().map(|m| (m.name.clone(), m)));
            apply_blacklist(names, blacklist)
        } else {
            metric_names.to_vec()
        };

        let client = self.clone();
        let template = Arc::new(template.clone());
        let catalog = Arc::new(catalog);
        let result = self
            .fan_out()
            .run(names, move |name| {
                let client = client.clone();
                let metric = catalog
                    .get(&name)
                    .cloned()
                    .unwrap_or_else(|| Metric::new(&name));
                let request = template.with_metric(metric);
                async move { client.query_metric(&request).await }
            })
            .await;
        Ok(result)
    }
}
