//! Index mappings and index creation bodies.

use crate::{
    error::{OpenSearchError, Result},
    field::{Dynamic, Field, Properties},
};
use serde_json::{json, Map, Value};

/// Mapping of an index: its properties plus top-level options.
///
/// ```rust
/// use searchpipe_opensearch::{Field, Mapping};
/// use serde_json::json;
///
/// let mapping = Mapping::new()
///     .field("title", Field::text().multi_field("raw", Field::keyword()))
///     .option("date_detection", json!(false));
///
/// assert_eq!(Mapping::from_wire(&mapping.to_wire()).unwrap(), mapping);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    properties: Properties,
    dynamic: Option<Dynamic>,
    options: Map<String, Value>,
}

impl Mapping {
    /// Empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.properties.insert(name, field);
        self
    }

    /// Set how unmapped fields are handled.
    pub fn dynamic(mut self, dynamic: Dynamic) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    /// Set a top-level option such as `date_detection` or `_source`.
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Mapped fields.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Top-level options other than `dynamic` and `properties`.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Find a field by dotted path, descending through objects and
    /// multi-fields (`"comments.author.raw"`).
    pub fn resolve(&self, path: &str) -> Option<&Field> {
        let mut parts = path.split('.');
        let mut field = self.properties.get(parts.next()?)?;
        for part in parts {
            field = field
                .properties()
                .get(part)
                .or_else(|| field.fields().get(part))?;
        }
        Some(field)
    }

    /// Mapping body JSON.
    pub fn to_wire(&self) -> Value {
        let mut wire = self.options.clone();
        if let Some(dynamic) = self.dynamic {
            wire.insert("dynamic".to_string(), dynamic.to_wire());
        }
        wire.insert("properties".to_string(), self.properties.to_wire());
        Value::Object(wire)
    }

    /// Parse a mapping body.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            OpenSearchError::Validation(format!("mapping must be an object, got {}", value))
        })?;

        let mut mapping = Mapping::new();
        for (key, value) in map {
            match key.as_str() {
                "properties" => mapping.properties = Properties::from_wire(value)?,
                "dynamic" => mapping.dynamic = Some(Dynamic::from_wire(value)?),
                _ => {
                    mapping.options.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(mapping)
    }

    /// Parse the mapping of `index` out of a get-mapping response
    /// (`{"<index>": {"mappings": {...}}}`).
    pub fn from_index_response(response: &Value, index: &str) -> Result<Self> {
        let mappings = response
            .get(index)
            .and_then(|entry| entry.get("mappings"))
            .ok_or_else(|| {
                OpenSearchError::UnexpectedResponse(format!("no mappings for index {}", index))
            })?;
        Self::from_wire(mappings)
    }
}

/// Body of an index creation request.
#[derive(Debug, Clone, Default)]
pub struct IndexSettings {
    /// Number of primary shards.
    pub number_of_shards: Option<u32>,
    /// Number of replicas.
    pub number_of_replicas: Option<u32>,
    /// Refresh interval, e.g. `"1s"` or `"-1"`.
    pub refresh_interval: Option<String>,
    /// Analysis settings.
    pub analysis: Option<Value>,
    /// Field mappings.
    pub mappings: Option<Mapping>,
}

impl IndexSettings {
    /// Empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of shards.
    pub fn shards(mut self, shards: u32) -> Self {
        self.number_of_shards = Some(shards);
        self
    }

    /// Set number of replicas.
    pub fn replicas(mut self, replicas: u32) -> Self {
        self.number_of_replicas = Some(replicas);
        self
    }

    /// Set refresh interval.
    pub fn refresh_interval(mut self, interval: impl Into<String>) -> Self {
        self.refresh_interval = Some(interval.into());
        self
    }

    /// Set analysis settings.
    pub fn analysis(mut self, analysis: Value) -> Self {
        self.analysis = Some(analysis);
        self
    }

    /// Set mappings.
    pub fn mappings(mut self, mappings: Mapping) -> Self {
        self.mappings = Some(mappings);
        self
    }

    /// Request body for `indices.create`.
    pub fn to_wire(&self) -> Value {
        let mut body = Map::new();
        let mut settings = Map::new();

        if let Some(shards) = self.number_of_shards {
            settings.insert("number_of_shards".to_string(), json!(shards));
        }
        if let Some(replicas) = self.number_of_replicas {
            settings.insert("number_of_replicas".to_string(), json!(replicas));
        }
        if let Some(interval) = &self.refresh_interval {
            settings.insert("refresh_interval".to_string(), json!(interval));
        }
        if let Some(analysis) = &self.analysis {
            settings.insert("analysis".to_string(), analysis.clone());
        }

        if !settings.is_empty() {
            body.insert("settings".to_string(), Value::Object(settings));
        }
        if let Some(mappings) = &self.mappings {
            body.insert("mappings".to_string(), mappings.to_wire());
        }

        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;

    fn nested_mapping() -> Value {
        json!({
            "date_detection": false,
            "properties": {
                "title": {
                    "type": "text",
                    "analyzer": "snowball",
                    "fields": {"raw": {"type": "keyword"}}
                },
                "created_at": {"type": "date"},
                "comments": {
                    "type": "nested",
                    "properties": {
                        "author": {
                            "type": "text",
                            "analyzer": "snowball",
                            "fields": {"raw": {"type": "keyword"}}
                        },
                        "created_at": {"type": "date"}
                    }
                }
            }
        })
    }

    #[test]
    fn test_mapping_round_trips_through_wire() {
        let wire = nested_mapping();
        let mapping = Mapping::from_wire(&wire).unwrap();
        assert_eq!(mapping.to_wire(), wire);
        assert_eq!(mapping.options()["date_detection"], json!(false));
        assert_eq!(mapping.properties().len(), 3);
    }

    #[test]
    fn test_properties_keep_declaration_order() {
        let mapping = Mapping::new()
            .field("z", Field::keyword())
            .field("a", Field::keyword())
            .field("z", Field::text());
        let names: Vec<&str> = mapping.properties().names().collect();
        assert_eq!(names, vec!["z", "a"]);
        assert_eq!(mapping.resolve("z").unwrap().kind(), &FieldKind::Text);
    }

    #[test]
    fn test_resolve_nested_and_multi_fields() {
        let mapping = Mapping::from_wire(&nested_mapping()).unwrap();
        assert_eq!(mapping.resolve("comments.author.raw").unwrap().kind(), &FieldKind::Keyword);
        assert_eq!(mapping.resolve("comments.created_at").unwrap().kind(), &FieldKind::Date);
        assert!(mapping.resolve("comments.missing").is_none());
        assert!(mapping.resolve("").is_none());
    }

    #[test]
    fn test_dynamic_is_validated() {
        let mapping = Mapping::new().dynamic(Dynamic::Strict);
        assert_eq!(mapping.to_wire(), json!({"dynamic": "strict", "properties": {}}));
        assert!(Mapping::from_wire(&json!({"dynamic": "maybe"})).is_err());
    }

    #[test]
    fn test_from_index_response() {
        let response = json!({"blog": {"mappings": nested_mapping()}});
        assert!(Mapping::from_index_response(&response, "blog").is_ok());
        assert!(Mapping::from_index_response(&response, "other").is_err());
    }

    #[test]
    fn test_index_settings_body() {
        let settings = IndexSettings::new()
            .shards(1)
            .replicas(0)
            .mappings(Mapping::new().field("tag", Field::keyword()));
        assert_eq!(
            settings.to_wire(),
            json!({
                "settings": {"number_of_shards": 1, "number_of_replicas": 0},
                "mappings": {"properties": {"tag": {"type": "keyword"}}}
            })
        );
        assert_eq!(IndexSettings::new().to_wire(), json!({}));
    }
}
