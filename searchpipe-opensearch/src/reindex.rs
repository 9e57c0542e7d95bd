//! Copying documents between indices with scan + bulk.

use crate::{
    bulk::{bulk_with, BulkOptions, BulkSummary},
    chunk::DEFAULT_CHUNK_SIZE,
    error::{OpenSearchError, Result},
    operation::{action_key, OpType, Operation},
    scan::{scan, ScanOptions},
    scheduler::{CooperativeScheduler, Scheduler},
    transport::Transport,
};
use futures::stream::StreamExt;
use searchpipe_log::info;
use serde_json::{json, Map, Value};

/// Options for [`reindex`].
#[derive(Debug, Clone)]
pub struct ReindexOptions {
    /// Source query; match-all when `None`.
    pub query: Option<Value>,
    /// Operations per bulk request; overrides `bulk.chunk_size`.
    pub chunk_size: usize,
    /// Scroll keep-alive; overrides `scan.scroll`.
    pub scroll: String,
    /// Action used for the copied documents.
    pub op_type: OpType,
    /// Count failures instead of collecting them.
    pub stats_only: bool,
    /// Options for reading the source index.
    pub scan: ScanOptions,
    /// Options for writing the target index.
    pub bulk: BulkOptions,
}

impl Default for ReindexOptions {
    fn default() -> Self {
        Self {
            query: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            scroll: "5m".to_string(),
            op_type: OpType::Index,
            stats_only: false,
            scan: ScanOptions::default(),
            bulk: BulkOptions::default(),
        }
    }
}

impl ReindexOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only copy documents matching `query`.
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Set the bulk chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the scroll keep-alive.
    pub fn with_scroll(mut self, scroll: impl Into<String>) -> Self {
        self.scroll = scroll.into();
        self
    }

    /// Write with `op_type` instead of `index`.
    pub fn with_op_type(mut self, op_type: OpType) -> Self {
        self.op_type = op_type;
        self
    }

    /// Count failures instead of collecting them.
    pub fn stats_only(mut self, enabled: bool) -> Self {
        self.stats_only = enabled;
        self
    }

    /// Set the scan options.
    pub fn with_scan(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Set the bulk options.
    pub fn with_bulk(mut self, bulk: BulkOptions) -> Self {
        self.bulk = bulk;
        self
    }
}

/// Turn a scanned hit into an operation against `target`.
///
/// The `_source` is copied as is. Underscore-prefixed stored fields
/// (`fields._routing`, `fields._parent`, ...) go to the action line, and the
/// hit's own `_routing` wins over a stored one.
pub fn hit_to_operation(hit: Value, target: &str, op_type: OpType) -> Result<Operation> {
    let mut hit = match hit {
        Value::Object(hit) => hit,
        other => {
            return Err(OpenSearchError::UnexpectedResponse(format!(
                "search hit is not an object: {}",
                other
            )));
        }
    };

    let id = hit.remove("_id");
    let source = hit.remove("_source").unwrap_or_else(|| json!({}));
    let routing = hit.remove("_routing");
    let stored = match hit.remove("fields") {
        Some(Value::Object(fields)) => fields,
        _ => Map::new(),
    };

    let operation = match (op_type, id.clone()) {
        (OpType::Delete, Some(id)) => Operation::delete(id),
        (OpType::Delete, None) => {
            return Err(OpenSearchError::Validation(
                "cannot delete a hit without _id".to_string(),
            ));
        }
        (OpType::Index, _) => Operation::index(source),
        (OpType::Create, _) => Operation::create(source),
        (OpType::Update, _) => Operation::update(source),
    };

    let mut operation = operation.with_index(target);
    if op_type != OpType::Delete
        && let Some(id) = id
    {
        operation = operation.with_id(id);
    }
    for (key, value) in stored {
        if key.starts_with('_') && !matches!(key.as_str(), "_id" | "_index" | "_source") {
            operation = operation.with_meta(action_key(&key), single_value(value));
        }
    }
    if let Some(routing) = routing {
        operation = operation.with_routing(routing);
    }
    Ok(operation)
}

/// Stored fields come back as arrays; unwrap the single-value ones.
fn single_value(value: Value) -> Value {
    match value {
        Value::Array(mut values) if values.len() == 1 => values.remove(0),
        other => other,
    }
}

/// Copy every document of `source_index` matching the query into
/// `target_index` on the same cluster.
pub async fn reindex<T>(
    client: T,
    source_index: &str,
    target_index: &str,
    options: ReindexOptions,
) -> Result<BulkSummary>
where
    T: Transport + Clone + 'static,
{
    let target = client.clone();
    reindex_with(client, &target, source_index, target_index, options, CooperativeScheduler).await
}

/// Like [`reindex`], writing through a different client.
pub async fn reindex_between<T, U>(
    source: T,
    target: &U,
    source_index: &str,
    target_index: &str,
    options: ReindexOptions,
) -> Result<BulkSummary>
where
    T: Transport + Clone + 'static,
    U: Transport + ?Sized,
{
    reindex_with(source, target, source_index, target_index, options, CooperativeScheduler).await
}

/// Reindex with an explicit scheduler for bulk backoff waits.
pub async fn reindex_with<T, U, S>(
    source: T,
    target: &U,
    source_index: &str,
    target_index: &str,
    options: ReindexOptions,
    scheduler: S,
) -> Result<BulkSummary>
where
    T: Transport + Clone + 'static,
    U: Transport + ?Sized,
    S: Scheduler,
{
    info!("Reindexing {} into {}", source_index, target_index);

    let ReindexOptions {
        query,
        chunk_size,
        scroll,
        op_type,
        stats_only,
        scan: scan_options,
        bulk: bulk_options,
    } = options;

    let scan_options = scan_options.with_scroll(scroll);
    let bulk_options = bulk_options.with_chunk_size(chunk_size).stats_only(stats_only);

    let target_name = target_index.to_string();
    let operations = scan(source, source_index, query, scan_options)
        .map(move |hit| hit.and_then(|hit| hit_to_operation(hit, &target_name, op_type)));

    let summary = bulk_with(target, Box::pin(operations), bulk_options, scheduler).await?;
    info!(
        "Reindexed {} document(s) into {} with {} failure(s)",
        summary.success,
        target_index,
        summary.failed_count()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_keeps_id_source_and_routing() {
        let hit = json!({
            "_index": "test-index",
            "_id": "47",
            "_score": 1.0,
            "_routing": "42",
            "_source": {"answer": 42, "question_answer": {"name": "answer", "parent": 42}}
        });

        let op = hit_to_operation(hit, "prod-index", OpType::Index).unwrap();

        assert_eq!(
            op.action(),
            json!({"index": {"_index": "prod-index", "_id": "47", "routing": "42"}})
        );
        assert_eq!(
            op.data(),
            Some(json!({"answer": 42, "question_answer": {"name": "answer", "parent": 42}}))
        );
    }

    #[test]
    fn test_routing_from_stored_fields() {
        let hit = json!({
            "_id": "1",
            "_source": {},
            "fields": {"_routing": ["7"]}
        });
        let op = hit_to_operation(hit, "t", OpType::Create).unwrap();
        assert_eq!(op.op_type(), OpType::Create);
        assert_eq!(op.meta().get("routing"), Some(&json!("7")));
    }

    #[test]
    fn test_stored_metadata_fields_reach_the_action_line() {
        let hit = json!({
            "_id": "47",
            "_source": {"some": "data"},
            "fields": {"_routing": ["42"], "_parent": ["42"], "_custom": "x", "tags": ["a"]}
        });
        let op = hit_to_operation(hit, "t", OpType::Index).unwrap();

        assert_eq!(
            op.action(),
            json!({"index": {"_index": "t", "_id": "47", "routing": "42", "parent": "42", "_custom": "x"}})
        );
        assert_eq!(op.data(), Some(json!({"some": "data"})));
    }

    #[test]
    fn test_hit_routing_wins_over_stored_routing() {
        let hit = json!({"_id": "1", "_routing": "9", "_source": {}, "fields": {"_routing": ["7"]}});
        let op = hit_to_operation(hit, "t", OpType::Index).unwrap();
        assert_eq!(op.meta().get("routing"), Some(&json!("9")));
    }

    #[test]
    fn test_hit_without_routing() {
        let op = hit_to_operation(json!({"_id": 3, "_source": {"a": 1}}), "t", OpType::Index)
            .unwrap();
        assert!(op.meta().get("routing").is_none());
        assert!(hit_to_operation(json!([1]), "t", OpType::Index).is_err());
    }
}
