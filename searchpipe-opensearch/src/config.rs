//! OpenSearch client configuration.

use std::time::Duration;

/// Default cluster address.
pub const DEFAULT_URL: &str = "http://localhost:9200";

/// OpenSearch client configuration.
#[derive(Debug, Clone)]
pub struct OpenSearchConfig {
    /// OpenSearch URL(s). Requests go to the first one.
    pub urls: Vec<String>,
    /// Basic auth username.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Default timeout for every request.
    pub request_timeout: Duration,
}

impl Default for OpenSearchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl OpenSearchConfig {
    /// Create a new configuration with a single URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Create configuration with multiple URLs for a cluster.
    pub fn cluster(urls: Vec<String>) -> Self {
        Self {
            urls,
            ..Self::new("")
        }
    }

    /// Load configuration from the environment.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `OPENSEARCH_URL` | Comma-separated cluster URLs (default `http://localhost:9200`) |
    /// | `OPENSEARCH_USERNAME` | Basic auth username |
    /// | `OPENSEARCH_PASSWORD` | Basic auth password |
    /// | `OPENSEARCH_REQUEST_TIMEOUT_SECS` | Request timeout in seconds |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let urls: Vec<String> = lookup("OPENSEARCH_URL")
            .map(|urls| {
                urls.split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut config = if urls.is_empty() {
            Self::default()
        } else {
            Self::cluster(urls)
        };

        if let (Some(user), Some(pass)) = (lookup("OPENSEARCH_USERNAME"), lookup("OPENSEARCH_PASSWORD")) {
            config = config.with_basic_auth(user, pass);
        }

        if let Some(secs) = lookup("OPENSEARCH_REQUEST_TIMEOUT_SECS").and_then(|s| s.trim().parse().ok()) {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        config
    }

    /// Set basic authentication credentials.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
