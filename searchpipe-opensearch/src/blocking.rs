//! Blocking entry points for callers without an async runtime.
//!
//! Every call is driven to completion on a private current-thread runtime
//! and backoff waits park the calling thread. The algorithms are the same
//! ones the async helpers run.
//!
//! Do not use these from inside an async context: driving a runtime from
//! within another one panics.

use crate::{
    bulk::{bulk_with, streaming_bulk_with, BulkItem, BulkOptions, BulkSummary},
    error::Result,
    operation::Operation,
    reindex::{reindex_with, ReindexOptions},
    scan::{ScanCursor, ScanOptions},
    scheduler::BlockingScheduler,
    transport::Transport,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use tokio::runtime::{Builder, Runtime};

/// Bulk, scan and reindex helpers that block the calling thread.
///
/// ```rust,no_run
/// use searchpipe_opensearch::blocking::BlockingHelpers;
/// use searchpipe_opensearch::{BulkOptions, OpenSearchClient, OpenSearchConfig, Operation};
/// use serde_json::json;
///
/// # fn run() -> searchpipe_opensearch::Result<()> {
/// let client = OpenSearchClient::new(OpenSearchConfig::from_env())?;
/// let helpers = BlockingHelpers::new(client)?;
///
/// let operations = (0..100).map(|i| Operation::index(json!({"n": i})).with_index("numbers"));
/// let summary = helpers.bulk(operations, BulkOptions::default())?;
/// println!("indexed {}", summary.success);
/// # Ok(())
/// # }
/// ```
pub struct BlockingHelpers<T> {
    transport: T,
    runtime: Runtime,
}

impl<T> BlockingHelpers<T>
where
    T: Transport + Clone + 'static,
{
    /// Wrap a transport with a private runtime.
    pub fn new(transport: T) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { transport, runtime })
    }

    /// The wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Index every operation and summarize the outcome.
    pub fn bulk<I>(&self, operations: I, options: BulkOptions) -> Result<BulkSummary>
    where
        I: IntoIterator<Item = Operation>,
    {
        let operations = stream::iter(operations.into_iter().map(Ok));
        self.runtime
            .block_on(bulk_with(&self.transport, operations, options, BlockingScheduler))
    }

    /// Iterate over per-item outcomes, one batch at a time.
    pub fn streaming_bulk<'a, I>(&'a self, operations: I, options: BulkOptions) -> BulkIter<'a>
    where
        I: IntoIterator<Item = Operation>,
        I::IntoIter: 'a,
    {
        let operations = stream::iter(operations.into_iter().map(Ok));
        let outcomes = streaming_bulk_with(&self.transport, operations, options, BlockingScheduler);
        BulkIter {
            runtime: &self.runtime,
            outcomes: Box::pin(outcomes),
        }
    }

    /// Iterate over every hit of `query`.
    pub fn scan(&self, index: impl Into<String>, query: Option<Value>, options: ScanOptions) -> ScanIter<'_, T> {
        ScanIter {
            runtime: &self.runtime,
            cursor: ScanCursor::new(self.transport.clone(), index, query, options),
        }
    }

    /// Copy documents from `source_index` into `target_index`.
    pub fn reindex(&self, source_index: &str, target_index: &str, options: ReindexOptions) -> Result<BulkSummary> {
        self.runtime.block_on(reindex_with(
            self.transport.clone(),
            &self.transport,
            source_index,
            target_index,
            options,
            BlockingScheduler,
        ))
    }
}

/// Blocking iterator over bulk outcomes.
pub struct BulkIter<'a> {
    runtime: &'a Runtime,
    outcomes: Pin<Box<dyn Stream<Item = Result<BulkItem>> + 'a>>,
}

impl Iterator for BulkIter<'_> {
    type Item = Result<BulkItem>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.outcomes.next())
    }
}

/// Blocking iterator over scan hits.
///
/// Dropping the iterator before it is exhausted releases the scroll or
/// point-in-time context before `drop` returns.
pub struct ScanIter<'a, T>
where
    T: Transport + Clone + 'static,
{
    runtime: &'a Runtime,
    cursor: ScanCursor<T>,
}

impl<T> ScanIter<'_, T>
where
    T: Transport + Clone + 'static,
{
    /// Pages that were served by fewer shards than the index has.
    pub fn partial_pages(&self) -> usize {
        self.cursor.partial_pages()
    }

    /// Release the context now.
    pub fn close(&mut self) {
        self.runtime.block_on(self.cursor.close());
    }
}

impl<T> Iterator for ScanIter<'_, T>
where
    T: Transport + Clone + 'static,
{
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.cursor.next_hit()).transpose()
    }
}

impl<T> Drop for ScanIter<'_, T>
where
    T: Transport + Clone + 'static,
{
    fn drop(&mut self) {
        self.close();
    }
}
