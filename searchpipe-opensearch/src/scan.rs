//! Scroll and point-in-time scanning.
//!
//! A [`ScanCursor`] turns one query into a lazy sequence of every matching
//! hit. It pages with the scroll API, or with a point-in-time context and
//! `search_after`, and releases the server-side context exactly once however
//! the scan ends.

use crate::{
    error::{OpenSearchError, Result, ScanError},
    transport::{RequestParams, Transport},
};
use futures::stream::{self, Stream};
use searchpipe_log::{debug, warn};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Options for [`scan`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Hits per page (per shard for scroll searches).
    pub size: usize,
    /// How long the server keeps the scroll or point-in-time context alive.
    pub scroll: String,
    /// Timeout applied to each search and scroll call.
    pub request_timeout: Option<Duration>,
    /// Release the scroll context when the scan ends.
    pub clear_scroll: bool,
    /// Fail the scan when a page was served by fewer shards than expected.
    pub raise_on_error: bool,
    /// Keep the query's own sort instead of the fast `_doc` order.
    pub preserve_order: bool,
    /// Page with a point-in-time context instead of a scroll.
    pub use_point_in_time: bool,
    /// Headers, query parameters and timeout for the searches. Headers and
    /// timeout are also forwarded to scroll and release calls; query
    /// parameters are not.
    pub params: RequestParams,
    /// Overrides applied to scroll calls only.
    pub scroll_params: Option<RequestParams>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            size: 1000,
            scroll: "5m".to_string(),
            request_timeout: None,
            clear_scroll: true,
            raise_on_error: true,
            preserve_order: false,
            use_point_in_time: false,
            params: RequestParams::default(),
            scroll_params: None,
        }
    }
}

impl ScanOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the context keep-alive, e.g. `"5m"`.
    pub fn with_scroll(mut self, scroll: impl Into<String>) -> Self {
        self.scroll = scroll.into();
        self
    }

    /// Set the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Enable or disable releasing the scroll context.
    pub fn clear_scroll(mut self, enabled: bool) -> Self {
        self.clear_scroll = enabled;
        self
    }

    /// Enable or disable [`ScanError`] on partial shard failures.
    pub fn raise_on_error(mut self, enabled: bool) -> Self {
        self.raise_on_error = enabled;
        self
    }

    /// Keep the query's sort.
    pub fn preserve_order(mut self, enabled: bool) -> Self {
        self.preserve_order = enabled;
        self
    }

    /// Page with a point-in-time context.
    pub fn use_point_in_time(mut self, enabled: bool) -> Self {
        self.use_point_in_time = enabled;
        self
    }

    /// Set the forwarded request parameters.
    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }

    /// Set overrides for scroll calls.
    pub fn with_scroll_params(mut self, params: RequestParams) -> Self {
        self.scroll_params = Some(params);
        self
    }
}

/// Server-side context owned by a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Context {
    Scroll(String),
    PointInTime(String),
}

impl Context {
    fn id(&self) -> &str {
        match self {
            Context::Scroll(id) | Context::PointInTime(id) => id,
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::Scroll(id) => write!(f, "scroll {}", id),
            Context::PointInTime(id) => write!(f, "point in time {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Paging,
    LastPage,
    Done,
}

/// Best-effort release; failures are logged and swallowed.
async fn release<T>(transport: &T, context: Context, params: &RequestParams, clear_scroll: bool)
where
    T: Transport + ?Sized,
{
    let result = match &context {
        Context::Scroll(id) if clear_scroll => transport.clear_scroll(id, params).await,
        Context::Scroll(_) => return,
        Context::PointInTime(id) => transport.delete_pit(id, params).await,
    };
    match result {
        Ok(_) => debug!("Released {}", context),
        Err(e) => warn!("Failed to release {}: {}", context, e),
    }
}

fn hits(response: &Value) -> Vec<Value> {
    response
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn count(shards: &Value, key: &str) -> u64 {
    shards.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Lazy cursor over every hit of a query.
///
/// Hits are pulled with [`next_hit`](ScanCursor::next_hit). The context is
/// released when the hits run out, when an error ends the scan, on
/// [`close`](ScanCursor::close), or, as a last resort, by a task spawned on
/// the ambient tokio runtime when the cursor is dropped early.
pub struct ScanCursor<T>
where
    T: Transport + Clone + 'static,
{
    transport: T,
    index: String,
    query: Value,
    options: ScanOptions,
    params: RequestParams,
    context_params: RequestParams,
    phase: Phase,
    buffer: VecDeque<Value>,
    context: Option<Context>,
    search_after: Option<Value>,
    pending_error: Option<OpenSearchError>,
    partial_pages: usize,
}

impl<T> ScanCursor<T>
where
    T: Transport + Clone + 'static,
{
    /// Cursor over `index` for `query` (match-all when `None`).
    ///
    /// Nothing is sent until the first hit is requested.
    pub fn new(transport: T, index: impl Into<String>, query: Option<Value>, options: ScanOptions) -> Self {
        let mut params = options.params.clone();
        if params.timeout.is_none() {
            params.timeout = options.request_timeout;
        }

        Self {
            transport,
            index: index.into(),
            query: query.unwrap_or_else(|| json!({"query": {"match_all": {}}})),
            options,
            context_params: params.without_query(),
            params,
            phase: Phase::Init,
            buffer: VecDeque::new(),
            context: None,
            search_after: None,
            pending_error: None,
            partial_pages: 0,
        }
    }

    /// Pages that were served by fewer shards than the index has.
    pub fn partial_pages(&self) -> usize {
        self.partial_pages
    }

    /// Current scroll or point-in-time id, while the context is held.
    pub fn context_id(&self) -> Option<&str> {
        self.context.as_ref().map(Context::id)
    }

    /// Whether the cursor has finished.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done && self.buffer.is_empty()
    }

    /// Next hit, or `None` once every hit has been returned.
    pub async fn next_hit(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(hit) = self.buffer.pop_front() {
                return Ok(Some(hit));
            }

            if let Some(error) = self.pending_error.take() {
                self.close().await;
                return Err(error);
            }

            let step = match self.phase {
                Phase::Init => self.start().await,
                Phase::Paging => self.fetch_next().await,
                Phase::LastPage | Phase::Done => {
                    self.close().await;
                    return Ok(None);
                }
            };

            if let Err(error) = step {
                self.close().await;
                return Err(error);
            }
        }
    }

    /// Release the context and stop. Safe to call more than once.
    pub async fn close(&mut self) {
        self.phase = Phase::Done;
        self.buffer.clear();
        if let Some(context) = self.context.take() {
            release(&self.transport, context, &self.context_params, self.options.clear_scroll).await;
        }
    }

    /// Stream the remaining hits.
    pub fn into_stream(self) -> impl Stream<Item = Result<Value>> {
        stream::try_unfold(self, |mut cursor| async move {
            let hit = cursor.next_hit().await?;
            Ok::<_, OpenSearchError>(hit.map(|hit| (hit, cursor)))
        })
    }

    fn search_params(&self) -> RequestParams {
        let params = self.params.clone().param("size", self.options.size);
        if self.options.use_point_in_time {
            params
        } else {
            params.param("scroll", &self.options.scroll)
        }
    }

    fn scroll_params(&self) -> RequestParams {
        match &self.options.scroll_params {
            Some(overrides) => overrides.inherit(&self.context_params),
            None => self.context_params.clone(),
        }
    }

    /// Fail before opening a context if any call of this scan would be
    /// refused its parameters.
    fn check_params(&self) -> Result<()> {
        let transport = &self.transport;
        if self.options.use_point_in_time {
            transport.check_params("create_pit", &self.context_params)?;
            transport.check_params("delete_pit", &self.context_params)?;
        } else {
            transport.check_params("scroll", &self.scroll_params())?;
            transport.check_params("clear_scroll", &self.context_params)?;
        }
        transport.check_params("search", &self.search_params())
    }

    fn base_body(&self) -> Map<String, Value> {
        match &self.query {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        }
    }

    async fn start(&mut self) -> Result<()> {
        self.check_params()?;
        if self.options.use_point_in_time {
            return self.start_point_in_time().await;
        }

        let mut body = self.base_body();
        if !self.options.preserve_order {
            body.insert("sort".to_string(), json!("_doc"));
        }

        let response = self
            .transport
            .search(Some(self.index.as_str()), Value::Object(body), &self.search_params())
            .await?;

        match response.get("_scroll_id").and_then(Value::as_str) {
            Some(id) => {
                debug!("Opened scroll over {}", self.index);
                self.context = Some(Context::Scroll(id.to_string()));
                self.absorb(&response, true);
            }
            None => {
                // No cursor to page with or release: the first page is all there is.
                self.buffer.extend(hits(&response));
                self.phase = Phase::Done;
            }
        }
        Ok(())
    }

    async fn start_point_in_time(&mut self) -> Result<()> {
        let response = self
            .transport
            .create_pit(&self.index, &self.options.scroll, &self.context_params)
            .await?;
        let pit_id = response
            .get("pit_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                OpenSearchError::UnexpectedResponse("point in time response has no pit_id".to_string())
            })?;
        debug!("Opened point in time over {}", self.index);
        self.context = Some(Context::PointInTime(pit_id.to_string()));
        self.search_point_in_time().await
    }

    async fn search_point_in_time(&mut self) -> Result<()> {
        let Some(pit_id) = self.context_id().map(str::to_string) else {
            self.phase = Phase::Done;
            return Ok(());
        };

        let mut body = self.base_body();
        body.insert(
            "pit".to_string(),
            json!({"id": pit_id, "keep_alive": self.options.scroll}),
        );
        body.insert("sort".to_string(), self.point_in_time_sort());
        if let Some(after) = &self.search_after {
            body.insert("search_after".to_string(), after.clone());
        }

        let response = self
            .transport
            .search(None, Value::Object(body), &self.search_params())
            .await?;

        if let Some(id) = response.get("pit_id").and_then(Value::as_str) {
            self.context = Some(Context::PointInTime(id.to_string()));
        }

        let has_more = self.absorb(&response, true);
        if has_more {
            self.search_after = self.buffer.back().and_then(|hit| hit.get("sort")).cloned();
            if self.search_after.is_none() {
                self.phase = Phase::LastPage;
            }
        }
        Ok(())
    }

    /// Caller sort (when preserved) followed by the `_shard_doc` tiebreaker.
    fn point_in_time_sort(&self) -> Value {
        let tiebreaker = json!({"_shard_doc": "asc"});
        if !self.options.preserve_order {
            return json!([tiebreaker]);
        }
        let mut sort = match self.query.get("sort") {
            Some(Value::Array(keys)) => keys.clone(),
            Some(key) => vec![key.clone()],
            None => Vec::new(),
        };
        sort.push(tiebreaker);
        Value::Array(sort)
    }

    async fn fetch_next(&mut self) -> Result<()> {
        if self.options.use_point_in_time {
            return self.search_point_in_time().await;
        }

        let Some(scroll_id) = self.context_id().map(str::to_string) else {
            self.phase = Phase::Done;
            return Ok(());
        };

        let response = self
            .transport
            .scroll(&scroll_id, &self.options.scroll, &self.scroll_params())
            .await?;

        let next_id = response.get("_scroll_id").and_then(Value::as_str);
        if let Some(id) = next_id {
            self.context = Some(Context::Scroll(id.to_string()));
        }
        self.absorb(&response, next_id.is_some());
        Ok(())
    }

    /// Buffer a page and check its shard counts. Returns whether paging
    /// should continue.
    fn absorb(&mut self, response: &Value, can_continue: bool) -> bool {
        let page = hits(response);
        if page.is_empty() {
            self.phase = Phase::LastPage;
            return false;
        }

        self.check_shards(response);
        self.buffer.extend(page);
        self.phase = if can_continue { Phase::Paging } else { Phase::LastPage };
        can_continue
    }

    fn check_shards(&mut self, response: &Value) {
        let Some(shards) = response.get("_shards") else {
            return;
        };
        let successful = count(shards, "successful");
        let skipped = count(shards, "skipped");
        let total = count(shards, "total");

        if successful + skipped < total {
            self.partial_pages += 1;
            let message = format!(
                "Scroll request has only succeeded on {} (+{} skipped) shards out of {}.",
                successful, skipped, total
            );
            warn!("{}", message);
            if self.options.raise_on_error && self.pending_error.is_none() {
                let scroll_id = self.context_id().unwrap_or_default().to_string();
                self.pending_error = Some(ScanError { scroll_id, message }.into());
            }
        }
    }
}

impl<T> Drop for ScanCursor<T>
where
    T: Transport + Clone + 'static,
{
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        if matches!(context, Context::Scroll(_)) && !self.options.clear_scroll {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = self.transport.clone();
                let params = self.context_params.clone();
                let clear_scroll = self.options.clear_scroll;
                handle.spawn(async move {
                    release(&transport, context, &params, clear_scroll).await;
                });
            }
            Err(_) => warn!("Scan cursor dropped outside a runtime; {} was not released", context),
        }
    }
}

impl<T> fmt::Debug for ScanCursor<T>
where
    T: Transport + Clone + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCursor")
            .field("index", &self.index)
            .field("phase", &self.phase)
            .field("context", &self.context)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

/// Stream every hit of `query` over `index`.
///
/// ```rust,no_run
/// use futures::TryStreamExt;
/// use searchpipe_opensearch::{scan, OpenSearchClient, OpenSearchConfig, ScanOptions};
/// use serde_json::json;
///
/// # async fn run() -> searchpipe_opensearch::Result<()> {
/// let client = OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200"))?;
/// let query = json!({"query": {"term": {"type": "answers"}}});
/// let hits: Vec<_> = scan(client, "questions", Some(query), ScanOptions::default())
///     .try_collect()
///     .await?;
/// println!("{} answers", hits.len());
/// # Ok(())
/// # }
/// ```
pub fn scan<T>(
    transport: T,
    index: impl Into<String>,
    query: Option<Value>,
    options: ScanOptions,
) -> impl Stream<Item = Result<Value>>
where
    T: Transport + Clone + 'static,
{
    ScanCursor::new(transport, index, query, options).into_stream()
}
