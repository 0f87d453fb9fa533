use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://api.telemetry.confluent.cloud";
pub const DEFAULT_USER_AGENT: &str = "ccloud-metrics-sdk/rust";
pub const DEFAULT_MAX_WORKERS: usize = 5;
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;

/// Client configuration loaded from `ccloud-metrics.toml`.
///
/// Built once and handed to the client; nothing here is process-global.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: u8,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Upper bound on concurrent requests during a fan-out.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// `limit` sent with every metric query.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Extra headers added to every request.
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

#[derive(Clone, Deserialize, Default)]
pub struct Credentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"********")
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_version() -> u8 {
    2
}

fn default_dataset() -> String {
    "cloud".to_string()
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            base_url: default_base_url(),
            api_version: default_api_version(),
            dataset: default_dataset(),
            max_workers: default_max_workers(),
            page_limit: default_page_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            http_headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config.sanitized())
    }

    /// Apply `CCLOUD_*` environment variables on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("CCLOUD_API_KEY") {
            self.credentials.api_key = key;
        }
        if let Ok(secret) = std::env::var("CCLOUD_API_SECRET") {
            self.credentials.api_secret = secret;
        }
        if let Ok(url) = std::env::var("CCLOUD_METRICS_BASE_URL") {
            self.base_url = url;
        }
        if let Some(workers) = std::env::var("CCLOUD_METRICS_MAX_WORKERS")
            .ok()
            .and_then(|w| w.parse().ok())
        {
            self.max_workers = workers;
        }
        self.sanitized()
    }

    /// Zero worker counts or page limits fall back to the defaults.
    fn sanitized(mut self) -> Self {
        if self.max_workers == 0 {
            self.max_workers = DEFAULT_MAX_WORKERS;
        }
        if self.page_limit == 0 {
            self.page_limit = DEFAULT_PAGE_LIMIT;
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        self
    }

    /// `{base_url}/v{api_version}/metrics/{dataset}/{path}`
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v{}/metrics/{}/{}",
            self.base_url, self.api_version, self.dataset, path
        )
    }
}
