//! Bulk operations with streaming support.
//!
//! Operations are grouped into batches by the chunker, each batch is sent by
//! a [`BulkExecutor`] (retrying items the cluster rejects under load), and
//! the per-item outcomes are either streamed back to the caller or folded
//! into a [`BulkSummary`] by a [`BulkAggregator`].

use crate::{
    chunk::{chunk_stream, Batch, ChunkLimits, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_BYTES},
    error::{BulkIndexError, OpenSearchError, Result, TransportError, REJECTED_STATUS},
    operation::{OpType, Operation},
    scheduler::{Backoff, CooperativeScheduler, Scheduler},
    transport::{RequestParams, Transport},
};
use futures::{
    future,
    stream::{self, Stream, StreamExt, TryStreamExt},
};
use searchpipe_log::{debug, info};
use serde_json::{Map, Value};
use std::time::Duration;

/// Options for the bulk helpers.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Maximum operations per request.
    pub chunk_size: usize,
    /// Maximum request body size in bytes.
    pub max_chunk_bytes: usize,
    /// Retry rounds for rejected (429) items. Zero disables retries.
    pub max_retries: u32,
    /// Delay before the first retry round.
    pub initial_backoff: Duration,
    /// Upper bound for any retry delay.
    pub max_backoff: Duration,
    /// Fail the batch with [`BulkIndexError`] when any item failed.
    pub raise_on_error: bool,
    /// Propagate transport errors instead of turning them into item failures.
    pub raise_on_exception: bool,
    /// Item statuses that count as success.
    pub ignore_status: Vec<u16>,
    /// Emit successful outcomes from the streaming helpers.
    pub yield_ok: bool,
    /// Only count failures in [`bulk`] instead of collecting them.
    pub stats_only: bool,
    /// Default index for operations without `_index`.
    pub index: Option<String>,
    /// Headers, query parameters and timeout for every bulk request.
    pub params: RequestParams,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            max_retries: 0,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(600),
            raise_on_error: true,
            raise_on_exception: true,
            ignore_status: Vec::new(),
            yield_ok: true,
            stats_only: false,
            index: None,
            params: RequestParams::default(),
        }
    }
}

impl BulkOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum operations per request.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the maximum request body size.
    pub fn with_max_chunk_bytes(mut self, bytes: usize) -> Self {
        self.max_chunk_bytes = bytes;
        self
    }

    /// Set the number of retry rounds for rejected items.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial retry delay.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the maximum retry delay.
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Enable or disable [`BulkIndexError`] on item failures.
    pub fn raise_on_error(mut self, enabled: bool) -> Self {
        self.raise_on_error = enabled;
        self
    }

    /// Enable or disable propagation of transport errors.
    pub fn raise_on_exception(mut self, enabled: bool) -> Self {
        self.raise_on_exception = enabled;
        self
    }

    /// Treat these item statuses as success.
    pub fn with_ignore_status(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.ignore_status = statuses.into_iter().collect();
        self
    }

    /// Emit or suppress successful outcomes.
    pub fn yield_ok(mut self, enabled: bool) -> Self {
        self.yield_ok = enabled;
        self
    }

    /// Count failures instead of collecting them.
    pub fn stats_only(mut self, enabled: bool) -> Self {
        self.stats_only = enabled;
        self
    }

    /// Set the default index.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Set the forwarded request parameters.
    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }

    /// Chunking bounds derived from these options.
    pub fn limits(&self) -> ChunkLimits {
        ChunkLimits::new(self.chunk_size, self.max_chunk_bytes)
    }

    /// Retry backoff derived from these options.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_backoff, self.max_backoff)
    }

    fn is_ignored(&self, status: u16) -> bool {
        self.ignore_status.contains(&status)
    }
}

/// Final outcome of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    /// Operation type of the item.
    pub op_type: OpType,
    /// Whether the item succeeded (or its status was ignored).
    pub ok: bool,
    /// Response fragment: `_index`, `_id`, `status` and, on failure,
    /// `error` plus the echoed `data`.
    pub result: Value,
}

impl BulkItem {
    /// Item status, if the response carried a numeric one.
    pub fn status(&self) -> Option<u16> {
        self.result
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
    }

    /// Error entry of a failed item.
    pub fn error(&self) -> Option<&Value> {
        self.result.get("error")
    }

    /// The `{"<op_type>": {...}}` record shape used in failure lists.
    pub fn to_value(&self) -> Value {
        let mut record = Map::new();
        record.insert(self.op_type.as_str().to_string(), self.result.clone());
        Value::Object(record)
    }
}

/// Sends batches and resolves every item, retrying rejected ones.
pub struct BulkExecutor<'a, T: ?Sized, S = CooperativeScheduler> {
    transport: &'a T,
    options: BulkOptions,
    scheduler: S,
}

impl<'a, T> BulkExecutor<'a, T, CooperativeScheduler>
where
    T: Transport + ?Sized,
{
    /// Executor that waits cooperatively between retry rounds.
    pub fn new(transport: &'a T, options: BulkOptions) -> Self {
        Self::with_scheduler(transport, options, CooperativeScheduler)
    }
}

impl<'a, T, S> BulkExecutor<'a, T, S>
where
    T: Transport + ?Sized,
    S: Scheduler,
{
    /// Executor using the given scheduler for backoff waits.
    pub fn with_scheduler(transport: &'a T, options: BulkOptions, scheduler: S) -> Self {
        Self {
            transport,
            options,
            scheduler,
        }
    }

    /// Options in use.
    pub fn options(&self) -> &BulkOptions {
        &self.options
    }

    /// Send one batch and return one outcome per item, in input order.
    ///
    /// Items rejected with 429 are resent as a smaller batch after a
    /// backoff, up to `max_retries` rounds. Every other item is final as
    /// soon as its status is known. The batch returns only once every item
    /// is resolved; with `raise_on_error` any failure then turns the whole
    /// batch into a [`BulkIndexError`].
    ///
    /// Request parameters the bulk endpoint does not take fail the call
    /// with a validation error before anything is sent, whatever
    /// `raise_on_exception` says.
    pub async fn execute(&self, batch: &Batch) -> Result<Vec<BulkItem>> {
        self.transport.check_params("bulk", &self.options.params)?;
        let backoff = self.options.backoff();
        let max_retries = self.options.max_retries;
        let mut outcomes: Vec<Option<BulkItem>> = vec![None; batch.len()];
        let mut pending: Vec<usize> = (0..batch.len()).collect();
        let mut attempt: u32 = 0;

        while !pending.is_empty() {
            if attempt > 0 {
                let delay = backoff.delay_for_retry(attempt);
                info!(
                    "Retrying {} rejected bulk item(s) in {:?} (round {}/{})",
                    pending.len(),
                    delay,
                    attempt,
                    max_retries
                );
                self.scheduler.sleep(delay).await;
            }

            let can_retry = attempt < max_retries;
            let body = batch.body_for(&pending);
            debug!(
                "Sending bulk request with {} item(s), {} bytes",
                pending.len(),
                body.len()
            );

            let mut rejected = Vec::new();
            match self
                .transport
                .bulk(self.options.index.as_deref(), body, &self.options.params)
                .await
            {
                Err(error) => {
                    let ignored = error.status.is_some_and(|s| self.options.is_ignored(s));
                    if self.options.raise_on_exception && !ignored {
                        if error.is_rejection() && can_retry {
                            rejected = pending;
                        } else {
                            return Err(error.into());
                        }
                    } else {
                        for &position in &pending {
                            if error.is_rejection() && can_retry {
                                rejected.push(position);
                                continue;
                            }
                            let (op_type, fragment) = self.synthesize(batch, position, &error);
                            outcomes[position] = Some(self.resolve(batch, position, op_type, fragment));
                        }
                    }
                }
                Ok(response) => {
                    let items = response
                        .get("items")
                        .and_then(Value::as_array)
                        .ok_or_else(|| {
                            OpenSearchError::UnexpectedResponse(
                                "bulk response has no items".to_string(),
                            )
                        })?;

                    if items.len() != pending.len() {
                        return Err(OpenSearchError::UnexpectedResponse(format!(
                            "bulk response has {} item(s) for {} operation(s)",
                            items.len(),
                            pending.len()
                        )));
                    }

                    for (&position, raw) in pending.iter().zip(items) {
                        let (op_type, fragment) = split_item(batch, position, raw)?;
                        if item_status(&fragment) == REJECTED_STATUS && can_retry {
                            rejected.push(position);
                            continue;
                        }
                        outcomes[position] = Some(self.resolve(batch, position, op_type, fragment));
                    }
                }
            }

            pending = rejected;
            attempt += 1;
        }

        let outcomes: Vec<BulkItem> = outcomes.into_iter().flatten().collect();

        if self.options.raise_on_error {
            let errors: Vec<Value> = outcomes
                .iter()
                .filter(|item| !item.ok)
                .map(BulkItem::to_value)
                .collect();
            if !errors.is_empty() {
                return Err(BulkIndexError { errors }.into());
            }
        }

        Ok(outcomes)
    }

    /// Per-item failure standing in for a transport error.
    fn synthesize(&self, batch: &Batch, position: usize, error: &TransportError) -> (OpType, Value) {
        let mut fragment = Map::new();
        fragment.insert("error".to_string(), Value::String(error.to_string()));
        fragment.insert("status".to_string(), error.status_value());

        let op_type = match batch.item(position) {
            Some(item) => {
                let operation = item.operation();
                if let Some(data) = operation.data() {
                    fragment.insert("data".to_string(), data);
                }
                for (key, value) in operation.meta() {
                    fragment.insert(key.clone(), value.clone());
                }
                operation.op_type()
            }
            None => OpType::Index,
        };

        (op_type, Value::Object(fragment))
    }

    fn resolve(&self, batch: &Batch, position: usize, op_type: OpType, mut fragment: Value) -> BulkItem {
        let ok = match fragment.get("status").and_then(Value::as_u64) {
            Some(status) => {
                (200..300).contains(&status)
                    || u16::try_from(status).is_ok_and(|s| self.options.is_ignored(s))
            }
            None => false,
        };

        if !ok
            && let Value::Object(map) = &mut fragment
            && !map.contains_key("data")
            && let Some(data) = batch.item(position).and_then(|i| i.operation().data())
        {
            map.insert("data".to_string(), data);
        }

        BulkItem {
            op_type,
            ok,
            result: fragment,
        }
    }
}

fn item_status(fragment: &Value) -> u16 {
    fragment
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(500)
}

/// Split `{"<op_type>": {...}}` into its op type and fragment.
fn split_item(batch: &Batch, position: usize, raw: &Value) -> Result<(OpType, Value)> {
    let entry = raw
        .as_object()
        .and_then(|map| map.iter().next())
        .ok_or_else(|| {
            OpenSearchError::UnexpectedResponse(format!("malformed bulk item: {}", raw))
        })?;

    let op_type = OpType::parse(entry.0)
        .or_else(|| batch.item(position).map(|i| i.operation().op_type()))
        .unwrap_or_default();

    let mut fragment = entry.1.clone();
    if let Value::Object(map) = &mut fragment
        && !map.contains_key("status")
    {
        map.insert("status".to_string(), Value::from(500u16));
    }

    Ok((op_type, fragment))
}

/// Stream the outcome of every operation, batch by batch.
///
/// Batches are sent strictly one after another. The stream ends after the
/// first error (a propagated transport error or a [`BulkIndexError`]).
pub fn streaming_bulk<'a, T, I>(
    transport: &'a T,
    operations: I,
    options: BulkOptions,
) -> impl Stream<Item = Result<BulkItem>> + 'a
where
    T: Transport + ?Sized,
    I: IntoIterator<Item = Operation>,
    I::IntoIter: 'a,
{
    let operations = stream::iter(operations.into_iter().map(Ok));
    streaming_bulk_with(transport, operations, options, CooperativeScheduler)
}

/// Like [`streaming_bulk`], reading operations from a fallible stream.
pub fn streaming_bulk_from_stream<'a, T, O>(
    transport: &'a T,
    operations: O,
    options: BulkOptions,
) -> impl Stream<Item = Result<BulkItem>> + 'a
where
    T: Transport + ?Sized,
    O: Stream<Item = Result<Operation>> + Unpin + 'a,
{
    streaming_bulk_with(transport, operations, options, CooperativeScheduler)
}

/// Streaming bulk with an explicit scheduler for backoff waits.
pub fn streaming_bulk_with<'a, T, O, S>(
    transport: &'a T,
    operations: O,
    options: BulkOptions,
    scheduler: S,
) -> impl Stream<Item = Result<BulkItem>> + 'a
where
    T: Transport + ?Sized,
    O: Stream<Item = Result<Operation>> + Unpin + 'a,
    S: Scheduler + 'a,
{
    let yield_ok = options.yield_ok;
    let batches = Box::pin(chunk_stream(operations, options.limits()));
    let executor = BulkExecutor::with_scheduler(transport, options, scheduler);

    stream::try_unfold((executor, batches), |(executor, mut batches)| async move {
        let Some(batch) = batches.next().await else {
            return Ok(None);
        };
        let items = executor.execute(&batch?).await?;
        let items = stream::iter(items.into_iter().map(Ok::<_, OpenSearchError>));
        Ok::<_, OpenSearchError>(Some((items, (executor, batches))))
    })
    .try_flatten()
    .try_filter(move |item| future::ready(yield_ok || !item.ok))
}

/// How failures are reported by [`bulk`].
#[derive(Debug, Clone, PartialEq)]
pub enum Failures {
    /// Failure count only (`stats_only`).
    Count(usize),
    /// Every failure record, in input order.
    Items(Vec<Value>),
}

/// Result of [`bulk`] and [`reindex`](crate::reindex).
#[derive(Debug, Clone, PartialEq)]
pub struct BulkSummary {
    /// Number of successful operations.
    pub success: usize,
    /// Failed operations.
    pub failures: Failures,
}

impl BulkSummary {
    /// Number of failed operations in either reporting mode.
    pub fn failed_count(&self) -> usize {
        match &self.failures {
            Failures::Count(n) => *n,
            Failures::Items(items) => items.len(),
        }
    }
}

/// Folds a stream of outcomes into a [`BulkSummary`].
#[derive(Debug, Default)]
pub struct BulkAggregator {
    stats_only: bool,
    success: usize,
    failed: usize,
    errors: Vec<Value>,
}

impl BulkAggregator {
    /// Aggregator collecting failures, or only counting them with `stats_only`.
    pub fn new(stats_only: bool) -> Self {
        Self {
            stats_only,
            ..Default::default()
        }
    }

    /// Record one outcome.
    pub fn record(&mut self, item: BulkItem) {
        if item.ok {
            self.success += 1;
        } else {
            self.failed += 1;
            if !self.stats_only {
                self.errors.push(item.to_value());
            }
        }
    }

    /// Consume a stream of outcomes; the first error is returned as is.
    pub async fn consume<St>(mut self, outcomes: St) -> Result<BulkSummary>
    where
        St: Stream<Item = Result<BulkItem>>,
    {
        let mut outcomes = std::pin::pin!(outcomes);
        while let Some(item) = outcomes.next().await {
            self.record(item?);
        }
        Ok(self.finish())
    }

    /// Summary of everything recorded.
    pub fn finish(self) -> BulkSummary {
        let failures = if self.stats_only {
            Failures::Count(self.failed)
        } else {
            Failures::Items(self.errors)
        };
        BulkSummary {
            success: self.success,
            failures,
        }
    }
}

/// Index every operation and summarize the outcome.
///
/// Successful outcomes are always counted here, whatever `yield_ok` says.
pub async fn bulk<T, I>(transport: &T, operations: I, options: BulkOptions) -> Result<BulkSummary>
where
    T: Transport + ?Sized,
    I: IntoIterator<Item = Operation>,
{
    let operations = stream::iter(operations.into_iter().map(Ok));
    bulk_with(transport, operations, options, CooperativeScheduler).await
}

/// [`bulk`] over a fallible operation stream with an explicit scheduler.
pub async fn bulk_with<T, O, S>(
    transport: &T,
    operations: O,
    options: BulkOptions,
    scheduler: S,
) -> Result<BulkSummary>
where
    T: Transport + ?Sized,
    O: Stream<Item = Result<Operation>> + Unpin,
    S: Scheduler,
{
    let aggregator = BulkAggregator::new(options.stats_only);
    let options = options.yield_ok(true);
    aggregator
        .consume(streaming_bulk_with(transport, operations, options, scheduler))
        .await
}
