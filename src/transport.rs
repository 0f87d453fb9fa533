use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::time::Duration;

use crate::config::{ClientConfig, Credentials};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Raw answer of one round trip; status interpretation is left to the caller.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request. Authentication and headers are the implementor's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, method: Method, url: &str, body: Option<Vec<u8>>)
    -> Result<TransportResponse>;
}

/// reqwest-backed transport with basic auth and the configured headers.
pub struct HttpTransport {
    http: reqwest::Client,
    credentials: Credentials,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &config.http_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Transport(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Transport(format!("invalid header value for {name}: {e}")))?;
            headers.insert(name, value);
        }
        if !config.user_agent.is_empty() {
            let ua = HeaderValue::from_str(&config.user_agent)
                .map_err(|e| Error::Transport(format!("invalid user agent: {e}")))?;
            headers.insert(USER_AGENT, ua);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(config.max_workers)
            .build()?;

        Ok(Self {
            http,
            credentials: config.credentials.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<TransportResponse> {
        let mut req = match method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        }
        .basic_auth(&self.credentials.api_key, Some(&self.credentials.api_secret));
        if let Some(body) = body {
            req = req.body(body);
        }

        let res = req.send().await?;
        let status = res.status().as_u16();
        let body = res.bytes().await?.to_vec();
        tracing::trace!(%method, url, status, bytes = body.len(), "received response");
        Ok(TransportResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_configured_headers() {
        let mut config = ClientConfig::new(Credentials::new("k", "s"));
        config
            .http_headers
            .insert("X-Request-Source".into(), "tests".into());
        assert!(HttpTransport::new(&config).is_ok());

        config.http_headers.insert("bad header".into(), "x".into());
        assert!(matches!(HttpTransport::new(&config), Err(Error::Transport(_))));
    }

    #[test]
    fn success_range() {
        let ok = TransportResponse { status: 204, body: vec![] };
        let not_ok = TransportResponse { status: 429, body: vec![] };
        assert!(ok.is_success());
        assert!(!not_ok.is_success());
    }
}
