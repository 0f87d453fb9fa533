use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::granularity::Granularity;
use crate::interval::Interval;
use crate::labels::Label;
use crate::models::metrics::Metric;

pub const AGG_SUM: &str = "SUM";

/// One aggregation of a metric, e.g. `{"agg":"SUM","metric":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub agg: String,
    pub metric: String,
}

impl Aggregation {
    pub fn sum_of(metric: &Metric) -> Self {
        Self {
            agg: AGG_SUM.to_string(),
            metric: metric.name.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.agg.is_empty() {
            return Err(Error::InvalidAggregation("agg can not be empty"));
        }
        if self.metric.is_empty() {
            return Err(Error::InvalidAggregation("metric can not be empty"));
        }
        Ok(())
    }
}

/// Labels to group results by. Order only affects output column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Group {
    pub labels: Vec<Label>,
}

impl Group {
    pub fn of(labels: impl IntoIterator<Item = Label>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    pub fn and(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// A request to the metrics query or attributes endpoint.
///
/// Two shapes are in use: a label query (`group_by` set, no aggregation)
/// discovers dimension values, a metric query (granularity, intervals and
/// aggregations set) fetches data points. Unset fields are left off the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<Granularity>,
    #[serde(default, skip_serializing_if = "Group::is_empty")]
    pub group_by: Group,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intervals: Vec<Interval>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
}

impl Query {
    pub fn label_query(group_by: Group) -> Self {
        Self {
            group_by,
            ..Default::default()
        }
    }

    pub fn metric_query(
        granularity: Granularity,
        intervals: Vec<Interval>,
        aggregations: Vec<Aggregation>,
    ) -> Self {
        Self {
            granularity: Some(granularity),
            intervals,
            aggregations,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_group_by(mut self, group_by: Group) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_metric(mut self, metric: &Metric) -> Self {
        self.metric = Some(metric.name.clone());
        self
    }

    /// Check aggregations are complete and every interval fits inside what
    /// the granularity allows.
    pub fn validate(&self) -> Result<()> {
        for agg in &self.aggregations {
            agg.validate()?;
        }

        if let Some(granularity) = self.granularity {
            for interval in &self.intervals {
                if !granularity.is_valid_interval(interval) {
                    return Err(Error::IntervalExceedsGranularity {
                        interval: interval.to_string(),
                        granularity: granularity.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Label queries additionally need something to group by.
    pub fn validate_label_query(&self) -> Result<()> {
        if self.group_by.is_empty() {
            return Err(Error::MissingGroupBy);
        }
        self.validate()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
