use crate::models::response::ErrorResponse;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid aggregation: {0}")]
    InvalidAggregation(&'static str),

    #[error(
        "invalid interval and granularity combination: interval {interval} is longer than {granularity} supports"
    )]
    IntervalExceedsGranularity { interval: String, granularity: String },

    #[error("group by is a required field for label queries")]
    MissingGroupBy,

    #[error("unknown granularity {0:?}")]
    InvalidGranularity(String),

    #[error("cannot parse interval {input:?}: {reason}")]
    InvalidInterval { input: String, reason: String },

    #[error("metric {name:?} is not available, expected one of: {available}")]
    UnknownMetric { name: String, available: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("your account has hit or exceeded the current request rate limit ({url})")]
    RateLimited { url: String, response: ErrorResponse },

    #[error("received status code {status} instead of 200 for a call to {url}: {response}")]
    Api {
        status: u16,
        url: String,
        response: ErrorResponse,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    FanOut(FanOutError),

    #[error("worker stopped before answering key {key:?}")]
    WorkerLost { key: String },
}

impl Error {
    /// True for HTTP 429 responses; the core never retries these itself.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Map a non-2xx HTTP status and its body into an API error.
    pub fn from_status(status: u16, url: &str, body: &[u8]) -> Self {
        let response = ErrorResponse::parse(body);
        if status == 429 {
            Error::RateLimited {
                url: url.to_string(),
                response,
            }
        } else {
            Error::Api {
                status,
                url: url.to_string(),
                response,
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

/// A single key that failed during a fan-out.
#[derive(Debug)]
pub struct KeyFailure {
    pub key: String,
    pub error: Error,
}

/// Every failure collected by one fan-out call.
#[derive(Debug, Default)]
pub struct FanOutError {
    pub failures: Vec<KeyFailure>,
}

impl FanOutError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.key.as_str())
    }
}

impl std::fmt::Display for FanOutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<String> = self
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.key, failure.error))
            .collect();
        write!(f, "{}", messages.join("\n\n"))
    }
}

impl std::error::Error for FanOutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let body = br#"{"errors":[{"status":"429","code":"too_many_requests","detail":"slow down"}]}"#;
        let err = Error::from_status(429, "https://example.test/v2/metrics/cloud/query", body);
        assert!(err.is_rate_limited());

        let err = Error::from_status(400, "https://example.test/v2/metrics/cloud/query", body);
        assert!(!err.is_rate_limited());
        match err {
            Error::Api { status, response, .. } => {
                assert_eq!(status, 400);
                assert_eq!(response.errors[0].code, "too_many_requests");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn fan_out_error_joins_messages() {
        let err = FanOutError {
            failures: vec![
                KeyFailure {
                    key: "a".into(),
                    error: Error::Transport("connection reset".into()),
                },
                KeyFailure {
                    key: "b".into(),
                    error: Error::MissingGroupBy,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "a: transport error: connection reset\n\nb: group by is a required field for label queries"
        );
        assert_eq!(err.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
