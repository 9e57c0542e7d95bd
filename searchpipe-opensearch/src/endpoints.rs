//! Table of the REST endpoints the client can call.
//!
//! Each entry maps an endpoint name to its HTTP method, its path templates
//! and the query parameters it accepts. [`OpenSearchClient::perform`]
//! resolves a name through this table instead of carrying one method per
//! endpoint.
//!
//! [`OpenSearchClient::perform`]: crate::OpenSearchClient::perform

use crate::{
    error::{OpenSearchError, Result},
    transport::RequestParams,
};
use opensearch::http::Method;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Query parameters every endpoint accepts.
pub const COMMON_PARAMS: &[&str] = &["error_trace", "filter_path", "human", "pretty", "source"];

/// Characters left as is inside a path part.
const PATH_PART: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b',')
    .remove(b'*');

/// One REST endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    /// Dotted endpoint name, e.g. `indices.refresh`.
    pub name: &'static str,
    /// HTTP method.
    pub method: Method,
    /// Path templates, most specific first. `{part}` marks a path part.
    pub paths: &'static [&'static str],
    /// Endpoint-specific query parameters.
    pub params: &'static [&'static str],
    /// Whether the endpoint takes an NDJSON body.
    pub ndjson: bool,
}

const SEARCH_PARAMS: &[&str] = &[
    "_source",
    "_source_excludes",
    "_source_includes",
    "allow_no_indices",
    "allow_partial_search_results",
    "analyze_wildcard",
    "analyzer",
    "batched_reduce_size",
    "ccs_minimize_roundtrips",
    "default_operator",
    "df",
    "docvalue_fields",
    "expand_wildcards",
    "explain",
    "from",
    "ignore_throttled",
    "ignore_unavailable",
    "lenient",
    "max_concurrent_shard_requests",
    "pre_filter_shard_size",
    "preference",
    "q",
    "request_cache",
    "rest_total_hits_as_int",
    "routing",
    "scroll",
    "search_type",
    "seq_no_primary_term",
    "size",
    "sort",
    "stats",
    "stored_fields",
    "suggest_field",
    "suggest_mode",
    "suggest_size",
    "suggest_text",
    "terminate_after",
    "timeout",
    "track_scores",
    "track_total_hits",
    "typed_keys",
    "version",
];

const SQL_PARAMS: &[&str] = &["format", "sanitize"];

/// Every endpoint known to the client.
pub static ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        name: "bulk",
        method: Method::Post,
        paths: &["/{index}/_bulk", "/_bulk"],
        params: &[
            "_source",
            "_source_excludes",
            "_source_includes",
            "pipeline",
            "refresh",
            "require_alias",
            "routing",
            "timeout",
            "wait_for_active_shards",
        ],
        ndjson: true,
    },
    Endpoint {
        name: "search",
        method: Method::Post,
        paths: &["/{index}/_search", "/_search"],
        params: SEARCH_PARAMS,
        ndjson: false,
    },
    Endpoint {
        name: "scroll",
        method: Method::Post,
        paths: &["/_search/scroll"],
        params: &["rest_total_hits_as_int", "scroll", "scroll_id"],
        ndjson: false,
    },
    Endpoint {
        name: "clear_scroll",
        method: Method::Delete,
        paths: &["/_search/scroll/{scroll_id}", "/_search/scroll"],
        params: &[],
        ndjson: false,
    },
    Endpoint {
        name: "create_pit",
        method: Method::Post,
        paths: &["/{index}/_search/point_in_time"],
        params: &[
            "allow_partial_pit_creation",
            "expand_wildcards",
            "keep_alive",
            "preference",
            "routing",
        ],
        ndjson: false,
    },
    Endpoint {
        name: "delete_pit",
        method: Method::Delete,
        paths: &["/_search/point_in_time"],
        params: &[],
        ndjson: false,
    },
    Endpoint {
        name: "delete_all_pits",
        method: Method::Delete,
        paths: &["/_search/point_in_time/_all"],
        params: &[],
        ndjson: false,
    },
    Endpoint {
        name: "get_all_pits",
        method: Method::Get,
        paths: &["/_search/point_in_time/_all"],
        params: &[],
        ndjson: false,
    },
    Endpoint {
        name: "count",
        method: Method::Post,
        paths: &["/{index}/_count", "/_count"],
        params: &[
            "allow_no_indices",
            "analyze_wildcard",
            "analyzer",
            "default_operator",
            "df",
            "expand_wildcards",
            "ignore_throttled",
            "ignore_unavailable",
            "lenient",
            "min_score",
            "preference",
            "q",
            "routing",
            "terminate_after",
        ],
        ndjson: false,
    },
    Endpoint {
        name: "get",
        method: Method::Get,
        paths: &["/{index}/_doc/{id}"],
        params: &[
            "_source",
            "_source_excludes",
            "_source_includes",
            "preference",
            "realtime",
            "refresh",
            "routing",
            "stored_fields",
            "version",
            "version_type",
        ],
        ndjson: false,
    },
    Endpoint {
        name: "indices.create",
        method: Method::Put,
        paths: &["/{index}"],
        params: &[
            "cluster_manager_timeout",
            "master_timeout",
            "timeout",
            "wait_for_active_shards",
        ],
        ndjson: false,
    },
    Endpoint {
        name: "indices.exists",
        method: Method::Head,
        paths: &["/{index}"],
        params: &[
            "allow_no_indices",
            "cluster_manager_timeout",
            "expand_wildcards",
            "flat_settings",
            "ignore_unavailable",
            "include_defaults",
            "local",
        ],
        ndjson: false,
    },
    Endpoint {
        name: "indices.get_mapping",
        method: Method::Get,
        paths: &["/{index}/_mapping", "/_mapping"],
        params: &[
            "allow_no_indices",
            "cluster_manager_timeout",
            "expand_wildcards",
            "ignore_unavailable",
            "local",
        ],
        ndjson: false,
    },
    Endpoint {
        name: "indices.refresh",
        method: Method::Post,
        paths: &["/{index}/_refresh", "/_refresh"],
        params: &["allow_no_indices", "expand_wildcards", "ignore_unavailable"],
        ndjson: false,
    },
    Endpoint {
        name: "sql.query",
        method: Method::Post,
        paths: &["/_plugins/_sql"],
        params: SQL_PARAMS,
        ndjson: false,
    },
    Endpoint {
        name: "sql.explain",
        method: Method::Post,
        paths: &["/_plugins/_sql/_explain"],
        params: SQL_PARAMS,
        ndjson: false,
    },
    Endpoint {
        name: "sql.close",
        method: Method::Post,
        paths: &["/_plugins/_sql/close"],
        params: SQL_PARAMS,
        ndjson: false,
    },
    Endpoint {
        name: "sql.get_stats",
        method: Method::Get,
        paths: &["/_plugins/_sql/stats"],
        params: SQL_PARAMS,
        ndjson: false,
    },
    Endpoint {
        name: "sql.post_stats",
        method: Method::Post,
        paths: &["/_plugins/_sql/stats"],
        params: SQL_PARAMS,
        ndjson: false,
    },
    Endpoint {
        name: "sql.settings",
        method: Method::Put,
        paths: &["/_plugins/_query/settings"],
        params: &["format"],
        ndjson: false,
    },
];

/// Look up an endpoint by name.
pub fn endpoint(name: &str) -> Option<&'static Endpoint> {
    ENDPOINTS.iter().find(|e| e.name == name)
}

fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    template
        .split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
}

impl Endpoint {
    /// Content type of the request body.
    pub fn content_type(&self) -> &'static str {
        if self.ndjson {
            "application/x-ndjson"
        } else {
            "application/json"
        }
    }

    /// Whether `param` may be sent in the query string.
    pub fn accepts(&self, param: &str) -> bool {
        self.params.contains(&param) || COMMON_PARAMS.contains(&param)
    }

    /// Build the request path from the most specific template whose parts
    /// are all given. Empty part values count as missing.
    pub fn path(&self, parts: &[(&str, &str)]) -> Result<String> {
        let lookup = |name: &str| {
            parts
                .iter()
                .find(|(key, value)| *key == name && !value.is_empty())
                .map(|(_, value)| *value)
        };

        let template = self
            .paths
            .iter()
            .find(|template| placeholders(template).all(|name| lookup(name).is_some()))
            .ok_or_else(|| {
                OpenSearchError::Validation(format!(
                    "missing path parts for {}: expected one of {:?}",
                    self.name, self.paths
                ))
            })?;

        let path = template
            .split('/')
            .map(|segment| {
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) => lookup(name)
                        .map(|value| utf8_percent_encode(value, PATH_PART).to_string())
                        .unwrap_or_default(),
                    None => segment.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("/");

        Ok(path)
    }

    /// Reject query parameters the endpoint does not accept.
    pub fn validate(&self, params: &RequestParams) -> Result<()> {
        let Some(query) = &params.query else {
            return Ok(());
        };
        match query.keys().find(|key| !self.accepts(key)) {
            Some(key) => Err(OpenSearchError::Validation(format!(
                "{} does not accept the query parameter {:?}",
                self.name, key
            ))),
            None => Ok(()),
        }
    }
}
