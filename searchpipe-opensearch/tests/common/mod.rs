//! In-memory cluster used by the integration tests.
//!
//! Stores documents per index, executes NDJSON bulk bodies, pages scroll
//! and point-in-time searches, and records every call it receives. Like a
//! real cluster, it answers 400 to query parameters the endpoint does not
//! take.

#![allow(dead_code)]

use async_trait::async_trait;
use searchpipe_opensearch::endpoints::endpoint;
use searchpipe_opensearch::{RequestParams, Transport, TransportError, TransportResult};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// One received call.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub target: Option<String>,
    pub body: Option<Value>,
    pub params: RequestParams,
}

#[derive(Debug, Clone)]
pub struct Doc {
    pub id: String,
    pub routing: Option<String>,
    pub source: Value,
    seq: u64,
}

#[derive(Default)]
struct State {
    indices: BTreeMap<String, Vec<Doc>>,
    mappings: HashMap<String, Value>,
    scrolls: HashMap<String, (Vec<Value>, usize)>,
    pits: HashMap<String, String>,
    next_seq: u64,
    next_context: u64,
    calls: Vec<Call>,
    bulk_calls: usize,
    fail_at: Vec<usize>,
    fail_with: Option<TransportError>,
    shards: Option<Value>,
    scroll_ids: bool,
}

/// Cheap to clone; clones share one cluster.
#[derive(Clone)]
pub struct Engine {
    state: Arc<Mutex<State>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let state = State {
            scroll_ids: true,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Fail the bulk calls with these 1-based numbers.
    pub fn fail_bulk_at(self, calls: &[usize], error: TransportError) -> Self {
        {
            let mut state = self.state();
            state.fail_at = calls.to_vec();
            state.fail_with = Some(error);
        }
        self
    }

    /// Report these shard counts on every search page.
    pub fn with_shards(self, shards: Value) -> Self {
        self.state().shards = Some(shards);
        self
    }

    /// Answer searches without a scroll id.
    pub fn without_scroll_ids(self) -> Self {
        self.state().scroll_ids = false;
        self
    }

    /// Create an index with a mapping body. Integer fields reject
    /// non-numeric values.
    pub fn create_index(&self, index: &str, mappings: Value) {
        let mut state = self.state();
        state.indices.entry(index.to_string()).or_default();
        state.mappings.insert(index.to_string(), mappings);
    }

    pub fn insert(&self, index: &str, id: &str, routing: Option<&str>, source: Value) {
        let mut state = self.state();
        put(&mut state, index, id.to_string(), routing.map(str::to_string), source);
    }

    /// Documents `0..n` shaped like the reindex fixtures.
    pub fn seed_answers(&self, index: &str, n: u64) {
        for x in 0..n {
            self.insert(
                index,
                &x.to_string(),
                None,
                json!({
                    "answer": x,
                    "correct": x == 42,
                    "type": if x % 2 == 0 { "answers" } else { "questions" }
                }),
            );
        }
    }

    pub fn exists(&self, index: &str) -> bool {
        self.state().indices.contains_key(index)
    }

    pub fn get(&self, index: &str, id: &str) -> Option<Doc> {
        self.state()
            .indices
            .get(index)?
            .iter()
            .find(|doc| doc.id == id)
            .cloned()
    }

    /// Number of documents matching `query` (all when `None`).
    pub fn count(&self, index: &str, query: Option<Value>) -> usize {
        let query = query.unwrap_or(Value::Null);
        self.state()
            .indices
            .get(index)
            .map(|docs| docs.iter().filter(|doc| matches(&doc.source, &query)).count())
            .unwrap_or(0)
    }

    pub fn calls(&self, method: &str) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    pub fn bulk_calls(&self) -> usize {
        self.state().bulk_calls
    }

    pub fn open_scrolls(&self) -> usize {
        self.state().scrolls.len()
    }

    pub fn open_pits(&self) -> usize {
        self.state().pits.len()
    }

    fn record(
        &self,
        method: &'static str,
        target: Option<&str>,
        body: Option<&Value>,
        params: &RequestParams,
    ) -> Result<(), TransportError> {
        self.state().calls.push(Call {
            method,
            target: target.map(str::to_string),
            body: body.cloned(),
            params: params.clone(),
        });

        let rejected = params.query.iter().flatten().find(|(name, _)| {
            !endpoint(method).is_some_and(|e| e.accepts(name))
        });
        match rejected {
            Some((name, _)) => Err(TransportError::new(400, "illegal_argument_exception").with_info(json!({
                "error": {
                    "type": "illegal_argument_exception",
                    "reason": format!("request [{}] contains unrecognized parameter: [{}]", method, name)
                },
                "status": 400
            }))),
            None => Ok(()),
        }
    }
}

fn put(state: &mut State, index: &str, id: String, routing: Option<String>, source: Value) {
    state.next_seq += 1;
    let seq = state.next_seq;
    let docs = state.indices.entry(index.to_string()).or_default();
    let doc = Doc { id, routing, source, seq };
    match docs.iter_mut().find(|d| d.id == doc.id) {
        Some(existing) => *existing = Doc { seq: existing.seq, ..doc },
        None => docs.push(doc),
    }
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn mapping_error(state: &State, index: &str, source: &Value) -> Option<Value> {
    let properties = state.mappings.get(index)?.get("properties")?.as_object()?;
    for (field, definition) in properties {
        let Some(value) = source.get(field) else {
            continue;
        };
        if definition["type"] == "integer" && !value.is_i64() && !value.is_u64() {
            let parses = value.as_str().is_some_and(|s| s.parse::<i64>().is_ok());
            if !parses {
                return Some(json!({
                    "type": "mapper_parsing_exception",
                    "reason": format!("failed to parse field [{}] of type [integer]", field)
                }));
            }
        }
    }
    None
}

fn item(op: &str, index: &str, id: &str, status: u16, outcome: Result<&str, Value>) -> Value {
    let mut body = Map::new();
    body.insert("_index".to_string(), json!(index));
    body.insert("_id".to_string(), json!(id));
    body.insert("status".to_string(), json!(status));
    match outcome {
        Ok(result) => body.insert("result".to_string(), json!(result)),
        Err(error) => body.insert("error".to_string(), error),
    };
    json!({ op: body })
}

/// Whether `source` satisfies a (tiny) query: match_all, term, bool
/// filter/must, or a `q=field:value` string.
fn matches(source: &Value, query: &Value) -> bool {
    match query {
        Value::Null => true,
        Value::String(q) => match q.split_once(':') {
            Some((field, value)) => field_equals(source, field, &json!(value)),
            None => true,
        },
        Value::Object(map) => map.iter().all(|(key, clause)| match key.as_str() {
            "query" => matches(source, clause),
            "match_all" => true,
            "term" | "match" => clause.as_object().is_some_and(|terms| {
                terms.iter().all(|(field, value)| {
                    let value = value.get("value").unwrap_or(value);
                    field_equals(source, field, value)
                })
            }),
            "bool" => clause.as_object().is_some_and(|bool_query| {
                ["filter", "must"].iter().all(|occur| match bool_query.get(*occur) {
                    Some(Value::Array(clauses)) => clauses.iter().all(|c| matches(source, c)),
                    Some(c) => matches(source, c),
                    None => true,
                })
            }),
            _ => true,
        }),
        _ => true,
    }
}

fn field_equals(source: &Value, field: &str, expected: &Value) -> bool {
    match (source.get(field), expected) {
        (Some(actual), Value::String(s)) if !actual.is_string() => actual.to_string() == *s,
        (Some(actual), expected) => actual == expected,
        (None, _) => false,
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Sort fields from a request body, ignoring `_doc` and `_shard_doc`.
fn sort_fields(body: &Value) -> Vec<(String, bool)> {
    let keys = match body.get("sort") {
        Some(Value::Array(keys)) => keys.clone(),
        Some(key) => vec![key.clone()],
        None => Vec::new(),
    };
    keys.iter()
        .filter_map(|key| match key {
            Value::String(field) => Some((field.clone(), false)),
            Value::Object(map) => map.iter().next().map(|(field, order)| {
                let order = order.get("order").unwrap_or(order);
                (field.clone(), order == "desc")
            }),
            _ => None,
        })
        .filter(|(field, _)| field != "_doc" && field != "_shard_doc")
        .collect()
}

/// Matching hits of `index` in request order, each with its sort values.
fn collect_hits(state: &State, index: &str, body: &Value, params: &RequestParams) -> Vec<Value> {
    let q = params.query_value("q").map(|q| Value::String(q.to_string())).unwrap_or(Value::Null);
    let mut docs: Vec<&Doc> = state
        .indices
        .get(index)
        .map(|docs| {
            docs.iter()
                .filter(|doc| matches(&doc.source, body) && matches(&doc.source, &q))
                .collect()
        })
        .unwrap_or_default();

    let fields = sort_fields(body);
    docs.sort_by(|a, b| {
        for (field, desc) in &fields {
            let ordering = compare(&a.source[field.as_str()], &b.source[field.as_str()]);
            let ordering = if *desc { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.seq.cmp(&b.seq)
    });

    docs.into_iter()
        .map(|doc| {
            let mut sort: Vec<Value> = fields
                .iter()
                .map(|(field, _)| doc.source[field.as_str()].clone())
                .collect();
            sort.push(json!(doc.seq));

            let mut hit = json!({
                "_index": index,
                "_id": doc.id,
                "_score": null,
                "_source": doc.source,
                "sort": sort,
            });
            if let Some(routing) = &doc.routing {
                hit["_routing"] = json!(routing);
            }
            hit
        })
        .collect()
}

fn page_size(params: &RequestParams) -> usize {
    params
        .query_value("size")
        .and_then(|size| size.parse().ok())
        .unwrap_or(10)
}

fn shards(state: &State) -> Value {
    state
        .shards
        .clone()
        .unwrap_or_else(|| json!({"total": 1, "successful": 1, "skipped": 0, "failed": 0}))
}

#[async_trait]
impl Transport for Engine {
    async fn bulk(&self, index: Option<&str>, body: String, params: &RequestParams) -> TransportResult {
        self.record("bulk", index, Some(&Value::String(body.clone())), params)?;

        let mut state = self.state();
        state.bulk_calls += 1;
        if state.fail_at.contains(&state.bulk_calls) {
            if let Some(error) = state.fail_with.clone() {
                return Err(error);
            }
        }

        let mut lines = body.lines().filter(|line| !line.is_empty());
        let mut items = Vec::new();
        let mut errors = false;

        while let Some(line) = lines.next() {
            let action: Value = serde_json::from_str(line)
                .map_err(|e| TransportError::new(400, format!("parse_exception: {}", e)))?;
            let Some((op, meta)) = action.as_object().and_then(|a| a.iter().next()) else {
                return Err(TransportError::new(400, "action_request_validation_exception"));
            };
            let op = op.clone();
            let target = meta
                .get("_index")
                .and_then(Value::as_str)
                .or(index)
                .unwrap_or_default()
                .to_string();
            let routing = meta
                .get("routing")
                .or_else(|| meta.get("_routing"))
                .map(id_string);

            let data: Option<Value> = if op == "delete" {
                None
            } else {
                let line = lines.next().unwrap_or("{}");
                Some(serde_json::from_str(line).unwrap_or(Value::Null))
            };

            let id = match meta.get("_id") {
                Some(id) => id_string(id),
                None => {
                    state.next_context += 1;
                    format!("auto-{}", state.next_context)
                }
            };
            let existing = state
                .indices
                .get(&target)
                .and_then(|docs| docs.iter().find(|d| d.id == id))
                .cloned();

            let outcome = match op.as_str() {
                "index" | "create" => {
                    let source = data.unwrap_or(Value::Null);
                    if op == "create" && existing.is_some() {
                        item(&op, &target, &id, 409, Err(json!({"type": "version_conflict_engine_exception"})))
                    } else if let Some(error) = mapping_error(&state, &target, &source) {
                        item(&op, &target, &id, 400, Err(error))
                    } else {
                        let status = if existing.is_some() { 200 } else { 201 };
                        let result = if existing.is_some() { "updated" } else { "created" };
                        put(&mut state, &target, id.clone(), routing, source);
                        item(&op, &target, &id, status, Ok(result))
                    }
                }
                "update" => {
                    let body = data.unwrap_or(Value::Null);
                    let patch = body.get("doc").cloned().unwrap_or(json!({}));
                    let upsert = body.get("doc_as_upsert") == Some(&Value::Bool(true));
                    match existing {
                        Some(doc) => {
                            let mut source = doc.source.clone();
                            if let (Some(target_map), Some(patch_map)) = (source.as_object_mut(), patch.as_object()) {
                                for (k, v) in patch_map {
                                    target_map.insert(k.clone(), v.clone());
                                }
                            }
                            put(&mut state, &target, id.clone(), routing.or(doc.routing), source);
                            item(&op, &target, &id, 200, Ok("updated"))
                        }
                        None if upsert => {
                            put(&mut state, &target, id.clone(), routing, patch);
                            item(&op, &target, &id, 201, Ok("created"))
                        }
                        None => item(&op, &target, &id, 404, Err(json!({"type": "document_missing_exception"}))),
                    }
                }
                "delete" => match existing {
                    Some(_) => {
                        if let Some(docs) = state.indices.get_mut(&target) {
                            docs.retain(|d| d.id != id);
                        }
                        item(&op, &target, &id, 200, Ok("deleted"))
                    }
                    None => item(&op, &target, &id, 404, Ok("not_found")),
                },
                other => return Err(TransportError::new(400, format!("unknown action [{}]", other))),
            };

            let status = outcome[op.as_str()]["status"].as_u64().unwrap_or(500);
            errors |= !(200..300).contains(&status);
            items.push(outcome);
        }

        Ok(json!({"took": 1, "errors": errors, "items": items}))
    }

    async fn search(&self, index: Option<&str>, body: Value, params: &RequestParams) -> TransportResult {
        self.record("search", index, Some(&body), params)?;

        let mut state = self.state();
        let size = page_size(params);

        if let Some(pit_id) = body["pit"]["id"].as_str() {
            let index = state.pits.get(pit_id).cloned().ok_or_else(|| {
                TransportError::new(404, "search_context_missing_exception")
            })?;
            let hits = collect_hits(&state, &index, &body, params);
            let start = match body.get("search_after") {
                Some(after) => hits
                    .iter()
                    .position(|hit| &hit["sort"] == after)
                    .map(|p| p + 1)
                    .unwrap_or(hits.len()),
                None => 0,
            };
            let page: Vec<Value> = hits.into_iter().skip(start).take(size).collect();
            return Ok(json!({
                "pit_id": pit_id,
                "_shards": shards(&state),
                "hits": {"hits": page},
            }));
        }

        let index = index.unwrap_or_default();
        let mut hits = collect_hits(&state, index, &body, params);
        let total = hits.len();
        let rest = hits.split_off(size.min(total));

        let mut response = json!({
            "_shards": shards(&state),
            "hits": {"total": {"value": total, "relation": "eq"}, "hits": hits},
        });
        if params.query_value("scroll").is_some() && state.scroll_ids {
            state.next_context += 1;
            let scroll_id = format!("scroll-{}", state.next_context);
            state.scrolls.insert(scroll_id.clone(), (rest, size));
            response["_scroll_id"] = json!(scroll_id);
        }
        Ok(response)
    }

    async fn scroll(&self, scroll_id: &str, scroll: &str, params: &RequestParams) -> TransportResult {
        let body = json!({"scroll_id": scroll_id, "scroll": scroll});
        self.record("scroll", None, Some(&body), params)?;

        let mut state = self.state();
        let shards = shards(&state);
        let (remaining, size) = state
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| TransportError::new(404, "search_context_missing_exception"))?;
        let rest = remaining.split_off((*size).min(remaining.len()));
        let page = std::mem::replace(remaining, rest);

        Ok(json!({
            "_scroll_id": scroll_id,
            "_shards": shards,
            "hits": {"hits": page},
        }))
    }

    async fn clear_scroll(&self, scroll_id: &str, params: &RequestParams) -> TransportResult {
        let body = json!({"scroll_id": [scroll_id]});
        self.record("clear_scroll", None, Some(&body), params)?;
        let freed = self.state().scrolls.remove(scroll_id).is_some();
        Ok(json!({"succeeded": true, "num_freed": usize::from(freed)}))
    }

    async fn create_pit(&self, index: &str, keep_alive: &str, params: &RequestParams) -> TransportResult {
        self.record("create_pit", Some(index), Some(&json!({"keep_alive": keep_alive})), params)?;
        let mut state = self.state();
        if !state.indices.contains_key(index) {
            return Err(TransportError::new(404, "index_not_found_exception"));
        }
        state.next_context += 1;
        let pit_id = format!("pit-{}", state.next_context);
        state.pits.insert(pit_id.clone(), index.to_string());
        Ok(json!({"pit_id": pit_id, "_shards": shards(&state)}))
    }

    async fn delete_pit(&self, pit_id: &str, params: &RequestParams) -> TransportResult {
        self.record("delete_pit", None, Some(&json!({"pit_id": [pit_id]})), params)?;
        match self.state().pits.remove(pit_id) {
            Some(_) => Ok(json!({"pits": [{"pit_id": pit_id, "successful": true}]})),
            None => Err(TransportError::new(404, "not_found")),
        }
    }
}
