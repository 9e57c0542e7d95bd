//! Field definitions for index mappings.
//!
//! A [`Field`] is one of a closed set of [`FieldKind`]s plus the parameters
//! that kind was declared with. Fields convert to and from the JSON the
//! cluster uses in mapping bodies, and know how to turn a raw document
//! value into a typed [`FieldValue`].

use crate::error::{OpenSearchError, Result};
use base64::Engine;
use serde_json::{Map, Value};
use std::fmt;
use std::net::IpAddr;

/// How an object treats fields that are not in its mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dynamic {
    /// Add new fields to the mapping.
    True,
    /// Keep new fields in `_source` without indexing them.
    False,
    /// Reject documents with unknown fields.
    Strict,
}

impl Dynamic {
    /// Parse from a wire value (`true`, `false`, `"true"`, `"false"`, `"strict"`).
    pub fn from_wire(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(true) => Ok(Dynamic::True),
            Value::Bool(false) => Ok(Dynamic::False),
            Value::String(s) if s == "true" => Ok(Dynamic::True),
            Value::String(s) if s == "false" => Ok(Dynamic::False),
            Value::String(s) if s == "strict" => Ok(Dynamic::Strict),
            other => Err(OpenSearchError::Validation(format!(
                "invalid dynamic setting: {}",
                other
            ))),
        }
    }

    /// Wire value.
    pub fn to_wire(self) -> Value {
        match self {
            Dynamic::True => Value::Bool(true),
            Dynamic::False => Value::Bool(false),
            Dynamic::Strict => Value::String("strict".to_string()),
        }
    }
}

/// Field types known to the mapping DSL.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Full-text field.
    Text,
    /// Exact-value string.
    Keyword,
    /// Keyword with the same value in every document.
    ConstantKeyword,
    /// Keyword optimized for wildcard queries.
    Wildcard,
    /// Text field with prefix-optimized subfields.
    SearchAsYouType,
    /// Object indexed as a single flat field.
    FlatObject,
    /// 64-bit integer.
    Long,
    /// 32-bit integer.
    Integer,
    /// 16-bit integer.
    Short,
    /// 8-bit integer.
    Byte,
    /// Unsigned 64-bit integer.
    UnsignedLong,
    /// 64-bit float.
    Double,
    /// 32-bit float.
    Float,
    /// 16-bit float.
    HalfFloat,
    /// Float stored as a long scaled by a fixed factor.
    ScaledFloat {
        /// Multiplier applied before storing.
        scaling_factor: f64,
    },
    /// Boolean.
    Boolean,
    /// Date.
    Date,
    /// Base64 encoded bytes.
    Binary,
    /// IPv4 or IPv6 address.
    Ip,
    /// Range of integers.
    IntegerRange,
    /// Range of longs.
    LongRange,
    /// Range of floats.
    FloatRange,
    /// Range of doubles.
    DoubleRange,
    /// Range of dates.
    DateRange,
    /// Range of IP addresses.
    IpRange,
    /// JSON object with mapped properties.
    Object {
        /// Behavior for unmapped fields.
        dynamic: Option<Dynamic>,
    },
    /// Array of objects indexed as separate documents.
    Nested {
        /// Behavior for unmapped fields.
        dynamic: Option<Dynamic>,
    },
    /// Parent/child relation.
    Join,
    /// Dense vector for k-NN search.
    KnnVector {
        /// Number of dimensions.
        dimension: u64,
    },
    /// Numeric feature for rank_feature queries.
    RankFeature,
    /// Map of numeric features.
    RankFeatures,
    /// Completion suggester input.
    Completion,
    /// Latitude/longitude point.
    GeoPoint,
    /// Arbitrary geo shape.
    GeoShape,
    /// Number of tokens in a string.
    TokenCount,
    /// Stored query.
    Percolator,
    /// Alias to another field.
    Alias,
}

impl FieldKind {
    /// The mapping `type` name.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Keyword => "keyword",
            FieldKind::ConstantKeyword => "constant_keyword",
            FieldKind::Wildcard => "wildcard",
            FieldKind::SearchAsYouType => "search_as_you_type",
            FieldKind::FlatObject => "flat_object",
            FieldKind::Long => "long",
            FieldKind::Integer => "integer",
            FieldKind::Short => "short",
            FieldKind::Byte => "byte",
            FieldKind::UnsignedLong => "unsigned_long",
            FieldKind::Double => "double",
            FieldKind::Float => "float",
            FieldKind::HalfFloat => "half_float",
            FieldKind::ScaledFloat { .. } => "scaled_float",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Binary => "binary",
            FieldKind::Ip => "ip",
            FieldKind::IntegerRange => "integer_range",
            FieldKind::LongRange => "long_range",
            FieldKind::FloatRange => "float_range",
            FieldKind::DoubleRange => "double_range",
            FieldKind::DateRange => "date_range",
            FieldKind::IpRange => "ip_range",
            FieldKind::Object { .. } => "object",
            FieldKind::Nested { .. } => "nested",
            FieldKind::Join => "join",
            FieldKind::KnnVector { .. } => "knn_vector",
            FieldKind::RankFeature => "rank_feature",
            FieldKind::RankFeatures => "rank_features",
            FieldKind::Completion => "completion",
            FieldKind::GeoPoint => "geo_point",
            FieldKind::GeoShape => "geo_shape",
            FieldKind::TokenCount => "token_count",
            FieldKind::Percolator => "percolator",
            FieldKind::Alias => "alias",
        }
    }

    /// Kinds that need no parameters, by `type` name.
    fn simple(name: &str) -> Option<Self> {
        let kind = match name {
            "text" => FieldKind::Text,
            "keyword" => FieldKind::Keyword,
            "constant_keyword" => FieldKind::ConstantKeyword,
            "wildcard" => FieldKind::Wildcard,
            "search_as_you_type" => FieldKind::SearchAsYouType,
            "flat_object" => FieldKind::FlatObject,
            "long" => FieldKind::Long,
            "integer" => FieldKind::Integer,
            "short" => FieldKind::Short,
            "byte" => FieldKind::Byte,
            "unsigned_long" => FieldKind::UnsignedLong,
            "double" => FieldKind::Double,
            "float" => FieldKind::Float,
            "half_float" => FieldKind::HalfFloat,
            "boolean" => FieldKind::Boolean,
            "date" => FieldKind::Date,
            "binary" => FieldKind::Binary,
            "ip" => FieldKind::Ip,
            "integer_range" => FieldKind::IntegerRange,
            "long_range" => FieldKind::LongRange,
            "float_range" => FieldKind::FloatRange,
            "double_range" => FieldKind::DoubleRange,
            "date_range" => FieldKind::DateRange,
            "ip_range" => FieldKind::IpRange,
            "join" => FieldKind::Join,
            "rank_feature" => FieldKind::RankFeature,
            "rank_features" => FieldKind::RankFeatures,
            "completion" => FieldKind::Completion,
            "geo_point" => FieldKind::GeoPoint,
            "geo_shape" => FieldKind::GeoShape,
            "token_count" => FieldKind::TokenCount,
            "percolator" => FieldKind::Percolator,
            "alias" => FieldKind::Alias,
            _ => return None,
        };
        Some(kind)
    }

    fn has_properties(&self) -> bool {
        matches!(self, FieldKind::Object { .. } | FieldKind::Nested { .. })
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named fields in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<(String, Field)>);

impl Properties {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field, keeping the original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = field,
            None => self.0.push((name, field)),
        }
    }

    /// Field by name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Whether a field with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wire object `{name: field, ...}`.
    pub fn to_wire(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(name, field)| (name.clone(), field.to_wire()))
                .collect(),
        )
    }

    /// Parse a wire object of fields.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            OpenSearchError::Validation(format!("properties must be an object, got {}", value))
        })?;
        let mut properties = Properties::new();
        for (name, field) in map {
            properties.insert(name.clone(), Field::from_wire(field)?);
        }
        Ok(properties)
    }
}

/// One field of a mapping.
///
/// ```rust
/// use searchpipe_opensearch::Field;
/// use serde_json::json;
///
/// let title = Field::text()
///     .analyzer("snowball")
///     .multi_field("raw", Field::keyword());
/// assert_eq!(
///     title.to_wire(),
///     json!({"type": "text", "analyzer": "snowball", "fields": {"raw": {"type": "keyword"}}})
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    kind: FieldKind,
    params: Map<String, Value>,
    fields: Properties,
    properties: Properties,
}

impl Field {
    /// Field of the given kind without parameters.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            params: Map::new(),
            fields: Properties::new(),
            properties: Properties::new(),
        }
    }

    /// `text` field.
    pub fn text() -> Self {
        Self::new(FieldKind::Text)
    }

    /// `keyword` field.
    pub fn keyword() -> Self {
        Self::new(FieldKind::Keyword)
    }

    /// `integer` field.
    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    /// `long` field.
    pub fn long() -> Self {
        Self::new(FieldKind::Long)
    }

    /// `float` field.
    pub fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    /// `boolean` field.
    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    /// `date` field.
    pub fn date() -> Self {
        Self::new(FieldKind::Date)
    }

    /// `scaled_float` field.
    pub fn scaled_float(scaling_factor: f64) -> Self {
        Self::new(FieldKind::ScaledFloat { scaling_factor })
    }

    /// `knn_vector` field.
    pub fn knn_vector(dimension: u64) -> Self {
        Self::new(FieldKind::KnnVector { dimension })
    }

    /// `object` field.
    pub fn object() -> Self {
        Self::new(FieldKind::Object { dynamic: None })
    }

    /// `nested` field.
    pub fn nested() -> Self {
        Self::new(FieldKind::Nested { dynamic: None })
    }

    /// `join` field with `parent -> children` relations.
    pub fn join(relations: impl IntoIterator<Item = (String, Value)>) -> Self {
        let relations: Map<String, Value> = relations.into_iter().collect();
        Self::new(FieldKind::Join).param("relations", Value::Object(relations))
    }

    /// Field kind.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Declared parameters other than the kind-specific ones.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Multi-fields.
    pub fn fields(&self) -> &Properties {
        &self.fields
    }

    /// Sub-fields of an object or nested field.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Set a mapping parameter.
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Set the index-time analyzer.
    pub fn analyzer(self, analyzer: impl Into<String>) -> Self {
        self.param("analyzer", Value::String(analyzer.into()))
    }

    /// Set the search-time analyzer.
    pub fn search_analyzer(self, analyzer: impl Into<String>) -> Self {
        self.param("search_analyzer", Value::String(analyzer.into()))
    }

    /// Add a multi-field.
    pub fn multi_field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name, field);
        self
    }

    /// Add a sub-field. Only object and nested fields carry properties.
    pub fn property(mut self, name: impl Into<String>, field: Field) -> Result<Self> {
        if !self.kind.has_properties() {
            return Err(OpenSearchError::Validation(format!(
                "{} fields have no properties",
                self.kind
            )));
        }
        self.properties.insert(name, field);
        Ok(self)
    }

    /// Set the dynamic behavior of an object or nested field.
    pub fn dynamic(mut self, dynamic: Dynamic) -> Result<Self> {
        match &mut self.kind {
            FieldKind::Object { dynamic: slot } | FieldKind::Nested { dynamic: slot } => {
                *slot = Some(dynamic);
                Ok(self)
            }
            other => Err(OpenSearchError::Validation(format!(
                "{} fields have no dynamic setting",
                other
            ))),
        }
    }

    /// Mapping JSON for this field.
    pub fn to_wire(&self) -> Value {
        let mut wire = Map::new();
        wire.insert("type".to_string(), Value::String(self.kind.name().to_string()));

        match &self.kind {
            FieldKind::ScaledFloat { scaling_factor } => {
                wire.insert("scaling_factor".to_string(), Value::from(*scaling_factor));
            }
            FieldKind::KnnVector { dimension } => {
                wire.insert("dimension".to_string(), Value::from(*dimension));
            }
            FieldKind::Object { dynamic: Some(dynamic) } | FieldKind::Nested { dynamic: Some(dynamic) } => {
                wire.insert("dynamic".to_string(), dynamic.to_wire());
            }
            _ => {}
        }

        for (key, value) in &self.params {
            wire.insert(key.clone(), value.clone());
        }
        if !self.fields.is_empty() {
            wire.insert("fields".to_string(), self.fields.to_wire());
        }
        if !self.properties.is_empty() {
            wire.insert("properties".to_string(), self.properties.to_wire());
        }
        Value::Object(wire)
    }

    /// Parse mapping JSON.
    ///
    /// A definition without `type` but with `properties` is an object, as
    /// the cluster reports them.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            OpenSearchError::Validation(format!("field definition must be an object, got {}", value))
        })?;

        let type_name = match map.get("type") {
            Some(Value::String(name)) => name.as_str(),
            None if map.contains_key("properties") => "object",
            _ => {
                return Err(OpenSearchError::Validation(format!(
                    "field definition has no type: {}",
                    value
                )));
            }
        };

        let kind = match type_name {
            "scaled_float" => {
                let scaling_factor = map.get("scaling_factor").and_then(Value::as_f64).ok_or_else(|| {
                    OpenSearchError::Validation("scaled_float requires scaling_factor".to_string())
                })?;
                FieldKind::ScaledFloat { scaling_factor }
            }
            "knn_vector" => {
                let dimension = map.get("dimension").and_then(Value::as_u64).ok_or_else(|| {
                    OpenSearchError::Validation("knn_vector requires dimension".to_string())
                })?;
                FieldKind::KnnVector { dimension }
            }
            "object" | "nested" => {
                let dynamic = map.get("dynamic").map(Dynamic::from_wire).transpose()?;
                if type_name == "object" {
                    FieldKind::Object { dynamic }
                } else {
                    FieldKind::Nested { dynamic }
                }
            }
            other => FieldKind::simple(other).ok_or_else(|| {
                OpenSearchError::Validation(format!("unknown field type: {}", other))
            })?,
        };

        let mut field = Field::new(kind);
        for (key, value) in map {
            match key.as_str() {
                "type" => {}
                "scaling_factor" if matches!(field.kind, FieldKind::ScaledFloat { .. }) => {}
                "dimension" if matches!(field.kind, FieldKind::KnnVector { .. }) => {}
                "dynamic" if field.kind.has_properties() => {}
                "fields" => field.fields = Properties::from_wire(value)?,
                "properties" if field.kind.has_properties() => {
                    field.properties = Properties::from_wire(value)?;
                }
                _ => {
                    field.params.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(field)
    }

    /// Convert a raw document value into a typed value for this field.
    ///
    /// `null` always becomes [`FieldValue::Null`].
    pub fn deserialize(&self, value: &Value) -> Result<FieldValue> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }

        let invalid = || {
            OpenSearchError::Validation(format!("invalid {} value: {}", self.kind, value))
        };

        match &self.kind {
            FieldKind::Boolean => Ok(FieldValue::Bool(truthy(value))),
            FieldKind::Integer | FieldKind::Long | FieldKind::Short | FieldKind::Byte => {
                let n = match value {
                    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                n.map(FieldValue::Integer).ok_or_else(invalid)
            }
            FieldKind::Float
            | FieldKind::Double
            | FieldKind::HalfFloat
            | FieldKind::ScaledFloat { .. } => {
                let f = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                f.map(FieldValue::Float).ok_or_else(invalid)
            }
            FieldKind::Ip => value
                .as_str()
                .and_then(|s| s.parse::<IpAddr>().ok())
                .map(FieldValue::Ip)
                .ok_or_else(invalid),
            FieldKind::Binary => value
                .as_str()
                .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok())
                .map(FieldValue::Binary)
                .ok_or_else(invalid),
            FieldKind::KnnVector { .. } => value
                .as_array()
                .and_then(|items| items.iter().map(Value::as_f64).collect::<Option<Vec<f64>>>())
                .map(FieldValue::Vector)
                .ok_or_else(invalid),
            _ => Ok(FieldValue::Raw(value.clone())),
        }
    }
}

/// `"false"`, `""`, `0`, `false` and empty collections are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "false"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// A document value interpreted through its field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Missing value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integral number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// IP address.
    Ip(IpAddr),
    /// Decoded bytes.
    Binary(Vec<u8>),
    /// k-NN vector.
    Vector(Vec<f64>),
    /// Value of a kind without special handling.
    Raw(Value),
}

impl FieldValue {
    /// Document JSON for this value.
    pub fn to_wire(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(n) => Value::from(*n),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Ip(ip) => Value::String(ip.to_string()),
            FieldValue::Binary(bytes) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            FieldValue::Vector(items) => items.iter().map(|f| Value::from(*f)).collect(),
            FieldValue::Raw(value) => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_from_wire_keeps_params() {
        let wire = json!({"type": "text", "index": "not_analyzed"});
        let field = Field::from_wire(&wire).unwrap();
        assert_eq!(field.kind(), &FieldKind::Text);
        assert_eq!(field.to_wire(), wire);
    }

    #[test]
    fn test_multi_fields() {
        let field = Field::text()
            .multi_field("raw", Field::keyword())
            .multi_field("eng", Field::text().analyzer("english"));
        let wire = json!({
            "type": "text",
            "fields": {
                "raw": {"type": "keyword"},
                "eng": {"type": "text", "analyzer": "english"}
            }
        });
        assert_eq!(field.to_wire(), wire);
        assert_eq!(Field::from_wire(&wire).unwrap(), field);
    }

    #[test]
    fn test_multiple_analyzers() {
        let field = Field::text().analyzer("snowball").search_analyzer("keyword");
        assert_eq!(
            field.to_wire(),
            json!({"analyzer": "snowball", "search_analyzer": "keyword", "type": "text"})
        );
    }

    #[test]
    fn test_scaled_float_requires_factor() {
        assert_eq!(
            Field::scaled_float(123.0).to_wire(),
            json!({"type": "scaled_float", "scaling_factor": 123.0})
        );
        assert!(Field::from_wire(&json!({"type": "scaled_float"})).is_err());
    }

    #[test]
    fn test_knn_vector() {
        let wire = json!({
            "type": "knn_vector",
            "dimension": 256,
            "method": {"name": "hnsw", "space_type": "l2", "engine": "faiss"}
        });
        let field = Field::from_wire(&wire).unwrap();
        assert_eq!(field.kind(), &FieldKind::KnnVector { dimension: 256 });
        assert_eq!(field.to_wire(), wire);
        assert!(Field::from_wire(&json!({"type": "knn_vector"})).is_err());

        let vector = json!([1.0, 2.0, 3.0]);
        let value = field.deserialize(&vector).unwrap();
        assert_eq!(value, FieldValue::Vector(vec![1.0, 2.0, 3.0]));
        assert_eq!(value.to_wire(), vector);
        assert_eq!(field.deserialize(&Value::Null).unwrap(), FieldValue::Null);
    }

    #[test]
    fn test_simple_kinds() {
        assert_eq!(
            Field::new(FieldKind::ConstantKeyword).to_wire(),
            json!({"type": "constant_keyword"})
        );
        assert_eq!(Field::new(FieldKind::RankFeatures).to_wire(), json!({"type": "rank_features"}));
    }

    #[test]
    fn test_object_dynamic_values() {
        for dynamic in [json!(true), json!(false), json!("strict")] {
            let field = Field::from_wire(&json!({"type": "object", "dynamic": dynamic})).unwrap();
            assert_eq!(field.to_wire()["dynamic"], dynamic);
        }
        assert!(Field::from_wire(&json!({"type": "object", "dynamic": "sometimes"})).is_err());
        assert!(Field::text().dynamic(Dynamic::Strict).is_err());
    }

    #[test]
    fn test_object_disabled_and_properties() {
        let disabled = Field::object().param("enabled", json!(false));
        assert_eq!(disabled.to_wire(), json!({"type": "object", "enabled": false}));

        let object = Field::object().property("inner_int", Field::integer()).unwrap();
        assert_eq!(
            object.to_wire(),
            json!({"type": "object", "properties": {"inner_int": {"type": "integer"}}})
        );
        assert!(Field::keyword().property("x", Field::integer()).is_err());
    }

    #[test]
    fn test_untyped_definition_with_properties_is_object() {
        let field = Field::from_wire(&json!({"properties": {"name": {"type": "keyword"}}})).unwrap();
        assert_eq!(field.kind(), &FieldKind::Object { dynamic: None });
        assert!(field.properties().contains("name"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(Field::from_wire(&json!({"type": "hologram"})).is_err());
        assert!(Field::from_wire(&json!("text")).is_err());
    }

    #[test]
    fn test_boolean_deserialization() {
        let field = Field::boolean();
        for falsy in [json!("false"), json!(false), json!(""), json!(0)] {
            assert_eq!(field.deserialize(&falsy).unwrap(), FieldValue::Bool(false));
        }
        for truthy in [json!(true), json!("true"), json!(1)] {
            assert_eq!(field.deserialize(&truthy).unwrap(), FieldValue::Bool(true));
        }
    }

    #[test]
    fn test_numeric_deserialization() {
        assert_eq!(Field::float().deserialize(&json!("42")).unwrap(), FieldValue::Float(42.0));
        assert!(Field::float().deserialize(&json!("not_a_float")).is_err());
        assert_eq!(Field::integer().deserialize(&json!("42")).unwrap(), FieldValue::Integer(42));
        assert!(Field::integer().deserialize(&json!("not_an_integer")).is_err());
        assert_eq!(Field::integer().deserialize(&Value::Null).unwrap(), FieldValue::Null);
    }

    #[test]
    fn test_ip_deserialization() {
        let field = Field::new(FieldKind::Ip);
        let v6 = field.deserialize(&json!("::1")).unwrap();
        assert_eq!(v6, FieldValue::Ip("::1".parse().unwrap()));
        assert_eq!(v6.to_wire(), json!("::1"));
        assert!(field.deserialize(&json!("127.0.0.1")).is_ok());
        assert!(field.deserialize(&json!("not_an_ipaddress")).is_err());
    }

    #[test]
    fn test_binary_deserialization() {
        let field = Field::new(FieldKind::Binary);
        let value = field.deserialize(&json!("NDI=")).unwrap();
        assert_eq!(value, FieldValue::Binary(b"42".to_vec()));
        assert_eq!(field.deserialize(&value.to_wire()).unwrap(), value);
    }
}
