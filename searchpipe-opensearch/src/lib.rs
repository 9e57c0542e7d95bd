//! Bulk, scan and reindex helpers for OpenSearch.
//!
//! This crate provides:
//! - Batching of index/create/update/delete operations into NDJSON bulk
//!   requests bounded by item count and byte size
//! - Bulk execution with per-item outcomes, retries of rejected (429) items
//!   with exponential backoff, and aggregate success/failure summaries
//! - Scroll and point-in-time scans that release their server-side context
//!   exactly once
//! - Reindexing between indices, or between clusters, that preserves routing
//! - Blocking variants of every helper ([`blocking`])
//! - A table-driven client for the REST endpoints the helpers need
//!   ([`endpoints`]) and a typed field/mapping DSL
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::TryStreamExt;
//! use searchpipe_opensearch::{
//!     bulk, scan, BulkOptions, OpenSearchClient, OpenSearchConfig, Operation, ScanOptions,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenSearchClient::new(OpenSearchConfig::new("http://localhost:9200"))?;
//!
//!     // Index a thousand documents in batches of 500
//!     let operations = (0..1000).map(|i| {
//!         Operation::index(json!({"n": i}))
//!             .with_index("numbers")
//!             .with_id(i.to_string())
//!     });
//!     let summary = bulk(&client, operations, BulkOptions::default()).await?;
//!     println!("indexed {} documents", summary.success);
//!
//!     // Read them back
//!     let hits: Vec<_> = scan(client.clone(), "numbers", None, ScanOptions::default())
//!         .try_collect()
//!         .await?;
//!     println!("scanned {} documents", hits.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blocking;
pub mod endpoints;

mod bulk;
mod chunk;
mod client;
mod config;
mod error;
mod field;
mod mapping;
mod operation;
mod reindex;
mod scan;
mod scheduler;
mod transport;

pub use bulk::{
    bulk, bulk_with, streaming_bulk, streaming_bulk_from_stream, streaming_bulk_with,
    BulkAggregator, BulkExecutor, BulkItem, BulkOptions, BulkSummary, Failures,
};
pub use chunk::{
    chunk_stream, Batch, BatchBuilder, BatchItem, ChunkLimits, Chunker, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_CHUNK_BYTES,
};
pub use client::{OpenSearchClient, RequestBody};
pub use config::{OpenSearchConfig, DEFAULT_URL};
pub use error::{
    BulkIndexError, OpenSearchError, Result, ScanError, TransportError, REJECTED_STATUS,
};
pub use field::{Dynamic, Field, FieldKind, FieldValue, Properties};
pub use mapping::{IndexSettings, Mapping};
pub use operation::{OpType, Operation};
pub use reindex::{hit_to_operation, reindex, reindex_between, reindex_with, ReindexOptions};
pub use scan::{scan, ScanCursor, ScanOptions};
pub use scheduler::{Backoff, BlockingScheduler, CooperativeScheduler, Scheduler};
pub use transport::{RequestParams, Transport, TransportResult};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        bulk, reindex, scan, streaming_bulk, BulkOptions, OpenSearchClient, OpenSearchConfig,
        OpenSearchError, Operation, ReindexOptions, Result, ScanOptions, Transport,
    };
}
