//! OpenSearch client implementation.

use crate::{
    config::OpenSearchConfig,
    endpoints::{endpoint, Endpoint},
    error::{OpenSearchError, Result, TransportError},
    mapping::{IndexSettings, Mapping},
    transport::{RequestParams, Transport, TransportResult},
};
use async_trait::async_trait;
use opensearch::{
    http::{
        headers::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
        transport::{SingleNodeConnectionPool, TransportBuilder},
        Method, StatusCode,
    },
    OpenSearch,
};
use searchpipe_log::{debug, info};
use serde_json::{json, Value};
use std::sync::Arc;

/// Request body for [`OpenSearchClient::perform`].
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// A JSON document.
    Json(Value),
    /// Newline-delimited JSON, sent verbatim.
    NdJson(String),
}

/// OpenSearch client.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct OpenSearchClient {
    client: Arc<OpenSearch>,
    config: Arc<OpenSearchConfig>,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client.
    pub fn new(config: OpenSearchConfig) -> Result<Self> {
        info!("Initializing OpenSearch client for: {:?}", config.urls);

        let url = config.urls.first()
            .ok_or_else(|| OpenSearchError::Validation("No URLs provided".to_string()))?;

        let url = opensearch::http::Url::parse(url)
            .map_err(|e| OpenSearchError::Validation(format!("Invalid URL: {}", e)))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(config.request_timeout)
            .disable_proxy();

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.auth(
                opensearch::auth::Credentials::Basic(user.clone(), pass.clone())
            );
        }

        let transport = builder.build()
            .map_err(|e| OpenSearchError::Connection(e.to_string()))?;

        debug!("OpenSearch client initialized");

        Ok(Self {
            client: Arc::new(OpenSearch::new(transport)),
            config: Arc::new(config),
        })
    }

    /// Get the underlying OpenSearch client.
    pub fn inner(&self) -> &OpenSearch {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &OpenSearchConfig {
        &self.config
    }

    /// Call any endpoint from the [endpoint table](crate::endpoints::ENDPOINTS).
    ///
    /// `parts` fills the path template (`[("index", "logs")]`). HEAD
    /// endpoints answer `true` or `false` instead of failing on 404.
    pub async fn perform(
        &self,
        name: &str,
        parts: &[(&str, &str)],
        body: Option<RequestBody>,
        params: &RequestParams,
    ) -> Result<Value> {
        let endpoint = lookup(name)?;
        endpoint.validate(params)?;
        let path = endpoint.path(parts)?;

        let mut headers = header_map(params)?;
        let body = match body {
            Some(RequestBody::Json(_)) if endpoint.ndjson => {
                return Err(OpenSearchError::Validation(format!(
                    "{} takes an NDJSON body",
                    endpoint.name
                )));
            }
            Some(RequestBody::NdJson(_)) if !endpoint.ndjson => {
                return Err(OpenSearchError::Validation(format!(
                    "{} takes a JSON body",
                    endpoint.name
                )));
            }
            Some(RequestBody::Json(value)) => Some(serde_json::to_string(&value)?),
            Some(RequestBody::NdJson(lines)) => Some(lines),
            None => None,
        };
        if body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(endpoint.content_type()));
        }

        debug!("{:?} {}", endpoint.method, path);

        let response = self
            .client
            .transport()
            .send(endpoint.method, &path, headers, params.query.as_ref(), body, params.timeout)
            .await
            .map_err(client_error)?;

        let status = response.status_code();
        if endpoint.method == Method::Head {
            return Ok(Value::Bool(status.is_success()));
        }

        let text = response.text().await.map_err(client_error)?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            return Err(response_error(status, body).into());
        }

        Ok(body)
    }

    /// Refresh an index to make recent changes searchable.
    pub async fn refresh(&self, index: &str) -> Result<()> {
        debug!("Refreshing index {}", index);
        self.perform("indices.refresh", &[("index", index)], None, &RequestParams::default())
            .await?;
        Ok(())
    }

    /// Count documents matching `query` (all documents when `None`).
    pub async fn count(&self, index: &str, query: Option<Value>) -> Result<u64> {
        let body = query.map(|q| RequestBody::Json(json!({ "query": q })));
        let response = self
            .perform("count", &[("index", index)], body, &RequestParams::default())
            .await?;
        response["count"].as_u64().ok_or_else(|| {
            OpenSearchError::UnexpectedResponse("count response has no count".to_string())
        })
    }

    /// Create an index with its settings and mappings.
    pub async fn create_index(&self, index: &str, settings: &IndexSettings) -> Result<()> {
        info!("Creating index {}", index);
        let body = RequestBody::Json(settings.to_wire());
        self.perform("indices.create", &[("index", index)], Some(body), &RequestParams::default())
            .await?;
        Ok(())
    }

    /// Fetch the current mapping of an index.
    pub async fn get_mapping(&self, index: &str) -> Result<Mapping> {
        let response = self
            .perform("indices.get_mapping", &[("index", index)], None, &RequestParams::default())
            .await?;
        Mapping::from_index_response(&response, index)
    }

    /// Check whether an index exists.
    pub async fn index_exists(&self, index: &str) -> Result<bool> {
        let exists = self
            .perform("indices.exists", &[("index", index)], None, &RequestParams::default())
            .await?;
        Ok(exists.as_bool().unwrap_or(false))
    }

    /// Get a document by id, `None` when it does not exist.
    pub async fn get(&self, index: &str, id: &str, params: &RequestParams) -> Result<Option<Value>> {
        match self.perform("get", &[("index", index), ("id", id)], None, params).await {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.status_code() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Run an SQL query through the SQL plugin.
    pub async fn sql_query(&self, query: &str) -> Result<Value> {
        self.perform(
            "sql.query",
            &[],
            Some(RequestBody::Json(json!({ "query": query }))),
            &RequestParams::default(),
        )
        .await
    }

    async fn dispatch(
        &self,
        name: &str,
        parts: &[(&str, &str)],
        body: Option<RequestBody>,
        params: &RequestParams,
    ) -> TransportResult {
        // The helpers run `check_params` before their first call.
        self.perform(name, parts, body, params).await.map_err(|e| match e {
            OpenSearchError::Transport(e) => e,
            other => TransportError {
                status: other.status_code(),
                error: other.to_string(),
                info: None,
            },
        })
    }
}

fn lookup(name: &str) -> Result<&'static Endpoint> {
    endpoint(name).ok_or_else(|| OpenSearchError::Validation(format!("Unknown endpoint: {}", name)))
}

fn header_map(params: &RequestParams) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in params.headers.iter().flatten() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| OpenSearchError::Validation(format!("Invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| OpenSearchError::Validation(format!("Invalid header value: {}", e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn client_error(error: opensearch::Error) -> OpenSearchError {
    let transport = match error.status_code() {
        Some(status) => TransportError::new(status.as_u16(), error.to_string()),
        None => TransportError::connection(error.to_string()),
    };
    transport.into()
}

/// Error label from an error response: `error.type`, a plain `error`
/// string, or the status reason.
fn response_error(status: StatusCode, body: Value) -> TransportError {
    let label = match body.get("error") {
        Some(Value::Object(error)) => error.get("type").and_then(Value::as_str).map(str::to_string),
        Some(Value::String(error)) => Some(error.clone()),
        _ => None,
    }
    .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    TransportError::new(status.as_u16(), label).with_info(body)
}

#[async_trait]
impl Transport for OpenSearchClient {
    async fn bulk(&self, index: Option<&str>, body: String, params: &RequestParams) -> TransportResult {
        let parts = [("index", index.unwrap_or_default())];
        self.dispatch("bulk", &parts, Some(RequestBody::NdJson(body)), params).await
    }

    async fn search(&self, index: Option<&str>, body: Value, params: &RequestParams) -> TransportResult {
        let parts = [("index", index.unwrap_or_default())];
        self.dispatch("search", &parts, Some(RequestBody::Json(body)), params).await
    }

    async fn scroll(&self, scroll_id: &str, scroll: &str, params: &RequestParams) -> TransportResult {
        let body = json!({ "scroll_id": scroll_id, "scroll": scroll });
        self.dispatch("scroll", &[], Some(RequestBody::Json(body)), params).await
    }

    async fn clear_scroll(&self, scroll_id: &str, params: &RequestParams) -> TransportResult {
        let body = json!({ "scroll_id": [scroll_id] });
        match self.dispatch("clear_scroll", &[], Some(RequestBody::Json(body)), params).await {
            // Already expired.
            Err(e) if e.status == Some(404) => Ok(Value::Null),
            other => other,
        }
    }

    async fn create_pit(&self, index: &str, keep_alive: &str, params: &RequestParams) -> TransportResult {
        let params = params.clone().param("keep_alive", keep_alive);
        self.dispatch("create_pit", &[("index", index)], None, &params).await
    }

    async fn delete_pit(&self, pit_id: &str, params: &RequestParams) -> TransportResult {
        let body = json!({ "pit_id": [pit_id] });
        self.dispatch("delete_pit", &[], Some(RequestBody::Json(body)), params).await
    }

    fn check_params(&self, name: &str, params: &RequestParams) -> Result<()> {
        lookup(name)?.validate(params)?;
        header_map(params)?;
        Ok(())
    }
}

impl std::fmt::Debug for OpenSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchClient")
            .field("urls", &self.config.urls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_error_uses_error_type() {
        let body = json!({"error": {"type": "index_not_found_exception", "reason": "no such index"}, "status": 404});
        let err = response_error(StatusCode::NOT_FOUND, body);
        assert_eq!(err.to_string(), "TransportError(404, 'index_not_found_exception')");
        assert!(err.info.is_some());
    }

    #[test]
    fn test_response_error_falls_back_to_reason() {
        let err = response_error(StatusCode::TOO_MANY_REQUESTS, Value::Null);
        assert!(err.is_rejection());
        assert_eq!(err.error, "Too Many Requests");
    }

    #[test]
    fn test_header_map() {
        let params = RequestParams::new().header("X-Opaque-Id", "scan-1");
        let headers = header_map(&params).unwrap();
        assert_eq!(headers.get("x-opaque-id").unwrap(), "scan-1");
        assert!(header_map(&RequestParams::new().header("bad header", "x")).is_err());
    }

    #[test]
    fn test_check_params_uses_endpoint_table() {
        let client = OpenSearchClient::new(OpenSearchConfig::default()).unwrap();
        let search = RequestParams::new().param("q", "type:answers");

        assert!(client.check_params("search", &search).is_ok());
        assert!(matches!(
            client.check_params("scroll", &search),
            Err(OpenSearchError::Validation(_))
        ));
        assert!(client.check_params("clear_scroll", &search.without_query()).is_ok());
        assert!(client.check_params("bulk", &RequestParams::new().header("bad header", "x")).is_err());
        assert!(client.check_params("no.such.endpoint", &RequestParams::new()).is_err());
    }

    #[test]
    fn test_rejects_empty_url_list() {
        let err = OpenSearchClient::new(OpenSearchConfig::cluster(vec![])).unwrap_err();
        assert!(matches!(err, OpenSearchError::Validation(_)));
    }
}
