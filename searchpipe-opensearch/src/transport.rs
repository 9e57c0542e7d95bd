//! The narrow client interface the helpers are written against.
//!
//! Everything the bulk, scan and reindex helpers need from a cluster goes
//! through [`Transport`]. [`OpenSearchClient`](crate::OpenSearchClient)
//! implements it over HTTP; tests implement it in memory.

use crate::error::{Result, TransportError};
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Result of a single transport call.
pub type TransportResult = std::result::Result<Value, TransportError>;

/// Per-call options forwarded to the transport.
///
/// Each field is optional so that an override set can replace individual
/// top-level fields of a base set while inheriting the others
/// (see [`RequestParams::inherit`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    /// Extra HTTP headers.
    pub headers: Option<BTreeMap<String, String>>,
    /// Query-string parameters.
    pub query: Option<BTreeMap<String, String>>,
    /// Timeout for this call only.
    pub timeout: Option<Duration>,
}

impl RequestParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    /// Add a query-string parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.to_string());
        self
    }

    /// Authenticate this call with basic credentials.
    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        self.header("authorization", format!("Basic {}", token))
    }

    /// Authenticate this call with an API key id and secret.
    pub fn api_key(self, id: &str, key: &str) -> Self {
        let token = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", id, key));
        self.header("authorization", format!("ApiKey {}", token))
    }

    /// Set the per-call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fields set on `self` win; unset fields are taken from `base`.
    ///
    /// The replacement is per top-level field: a header map on `self`
    /// replaces the whole header map of `base`.
    pub fn inherit(&self, base: &RequestParams) -> RequestParams {
        RequestParams {
            headers: self.headers.clone().or_else(|| base.headers.clone()),
            query: self.query.clone().or_else(|| base.query.clone()),
            timeout: self.timeout.or(base.timeout),
        }
    }

    /// Headers and timeout only, without any query-string parameters.
    pub fn without_query(&self) -> RequestParams {
        RequestParams {
            headers: self.headers.clone(),
            query: None,
            timeout: self.timeout,
        }
    }

    /// Look up a query-string parameter.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.as_ref()?.get(name).map(String::as_str)
    }

    /// Look up a header, case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Cluster operations used by the helpers.
///
/// Implementations report any non-2xx answer (and any failure to get an
/// answer) as a [`TransportError`]. Per-item failures inside a successful
/// bulk response are not transport errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an NDJSON bulk body, optionally scoped to a default index.
    async fn bulk(&self, index: Option<&str>, body: String, params: &RequestParams)
        -> TransportResult;

    /// Run a search. `index` is `None` for point-in-time searches.
    async fn search(&self, index: Option<&str>, body: Value, params: &RequestParams)
        -> TransportResult;

    /// Fetch the next scroll page.
    async fn scroll(&self, scroll_id: &str, scroll: &str, params: &RequestParams)
        -> TransportResult;

    /// Release a scroll context.
    async fn clear_scroll(&self, scroll_id: &str, params: &RequestParams) -> TransportResult;

    /// Open a point-in-time context over `index`.
    async fn create_pit(&self, index: &str, keep_alive: &str, params: &RequestParams)
        -> TransportResult;

    /// Release a point-in-time context.
    async fn delete_pit(&self, pit_id: &str, params: &RequestParams) -> TransportResult;

    /// Reject `params` for `endpoint` before anything is sent.
    ///
    /// Helpers call this once up front so that a misconfigured call fails
    /// as a validation error instead of a transport failure. The default
    /// accepts everything.
    fn check_params(&self, endpoint: &str, params: &RequestParams) -> Result<()> {
        let _ = (endpoint, params);
        Ok(())
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn bulk(
        &self,
        index: Option<&str>,
        body: String,
        params: &RequestParams,
    ) -> TransportResult {
        (**self).bulk(index, body, params).await
    }

    async fn search(
        &self,
        index: Option<&str>,
        body: Value,
        params: &RequestParams,
    ) -> TransportResult {
        (**self).search(index, body, params).await
    }

    async fn scroll(&self, scroll_id: &str, scroll: &str, params: &RequestParams) -> TransportResult {
        (**self).scroll(scroll_id, scroll, params).await
    }

    async fn clear_scroll(&self, scroll_id: &str, params: &RequestParams) -> TransportResult {
        (**self).clear_scroll(scroll_id, params).await
    }

    async fn create_pit(&self, index: &str, keep_alive: &str, params: &RequestParams) -> TransportResult {
        (**self).create_pit(index, keep_alive, params).await
    }

    async fn delete_pit(&self, pit_id: &str, params: &RequestParams) -> TransportResult {
        (**self).delete_pit(pit_id, params).await
    }

    fn check_params(&self, endpoint: &str, params: &RequestParams) -> Result<()> {
        (**self).check_params(endpoint, params)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &T {
    async fn bulk(
        &self,
        index: Option<&str>,
        body: String,
        params: &RequestParams,
    ) -> TransportResult {
        (**self).bulk(index, body, params).await
    }

    async fn search(
        &self,
        index: Option<&str>,
        body: Value,
        params: &RequestParams,
    ) -> TransportResult {
        (**self).search(index, body, params).await
    }

    async fn scroll(&self, scroll_id: &str, scroll: &str, params: &RequestParams) -> TransportResult {
        (**self).scroll(scroll_id, scroll, params).await
    }

    async fn clear_scroll(&self, scroll_id: &str, params: &RequestParams) -> TransportResult {
        (**self).clear_scroll(scroll_id, params).await
    }

    async fn create_pit(&self, index: &str, keep_alive: &str, params: &RequestParams) -> TransportResult {
        (**self).create_pit(index, keep_alive, params).await
    }

    async fn delete_pit(&self, pit_id: &str, params: &RequestParams) -> TransportResult {
        (**self).delete_pit(pit_id, params).await
    }

    fn check_params(&self, endpoint: &str, params: &RequestParams) -> Result<()> {
        (**self).check_params(endpoint, params)
    }
}
