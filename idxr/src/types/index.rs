use std::time::Duration;

use mongodb::bson::{Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use serde::{Deserialize, Serialize};

/// Direction of a single key in an index.
///
/// Serialized the way MongoDB spells it: `1`, `-1` or `"text"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Bson", into = "Bson")]
pub enum IndexDirection {
    Ascending,
    Descending,
    Text,
}

impl From<IndexDirection> for Bson {
    fn from(direction: IndexDirection) -> Self {
        match direction {
            IndexDirection::Ascending => Bson::Int32(1),
            IndexDirection::Descending => Bson::Int32(-1),
            IndexDirection::Text => Bson::String("text".to_string()),
        }
    }
}

impl TryFrom<Bson> for IndexDirection {
    type Error = String;

    fn try_from(value: Bson) -> Result<Self, Self::Error> {
        match value {
            Bson::Int32(1) | Bson::Int64(1) => Ok(IndexDirection::Ascending),
            Bson::Int32(-1) | Bson::Int64(-1) => Ok(IndexDirection::Descending),
            Bson::Double(d) if d == 1.0 => Ok(IndexDirection::Ascending),
            Bson::Double(d) if d == -1.0 => Ok(IndexDirection::Descending),
            Bson::String(s) if s == "text" => Ok(IndexDirection::Text),
            other => Err(format!("invalid index direction: {other} (expected 1, -1 or \"text\")")),
        }
    }
}

/// A field path together with its direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub direction: IndexDirection,
}

impl IndexKey {
    pub fn new(field: impl Into<String>, direction: IndexDirection) -> Self {
        Self { field: field.into(), direction }
    }
}

/// Options recognised on an index. `name` is the identity used when
/// skipping indexes that already exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSpecOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_filter_expression: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<u64>,
}

impl IndexSpecOptions {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl From<&IndexSpecOptions> for IndexOptions {
    fn from(options: &IndexSpecOptions) -> Self {
        IndexOptions::builder()
            .name(options.name.clone())
            .unique(options.unique)
            .sparse(options.sparse)
            .background(options.background)
            .partial_filter_expression(options.partial_filter_expression.clone())
            .expire_after(options.expire_after_seconds.map(Duration::from_secs))
            .build()
    }
}

/// Ordered keys and options describing a single index.
///
/// ```
/// use idxr::IndexSpec;
///
/// let index = IndexSpec::new().ascending("primary_email").name("user_email_unique").unique();
/// assert_eq!(index.index_name(), Some("user_email_unique"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,
    #[serde(default)]
    pub options: IndexSpecOptions,
}

impl IndexSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, field: impl Into<String>, direction: IndexDirection) -> Self {
        self.keys.push(IndexKey::new(field, direction));
        self
    }

    pub fn ascending(self, field: impl Into<String>) -> Self {
        self.key(field, IndexDirection::Ascending)
    }

    pub fn descending(self, field: impl Into<String>) -> Self {
        self.key(field, IndexDirection::Descending)
    }

    pub fn text(self, field: impl Into<String>) -> Self {
        self.key(field, IndexDirection::Text)
    }

    pub fn with_options(mut self, options: IndexSpecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.options.unique = Some(true);
        self
    }

    pub fn sparse(mut self) -> Self {
        self.options.sparse = Some(true);
        self
    }

    pub fn background(mut self) -> Self {
        self.options.background = Some(true);
        self
    }

    pub fn partial_filter(mut self, expression: Document) -> Self {
        self.options.partial_filter_expression = Some(expression);
        self
    }

    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.options.expire_after_seconds = Some(ttl.as_secs());
        self
    }

    /// The configured name, if any. Unnamed indexes are never skipped.
    pub fn index_name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    /// Key document in declaration order, e.g. `{ "shop_id": 1, "created_at": -1 }`.
    pub fn keys_document(&self) -> Document {
        let mut keys = Document::new();
        for key in &self.keys {
            keys.insert(key.field.clone(), Bson::from(key.direction));
        }
        keys
    }

    pub fn to_model(&self) -> IndexModel {
        let options = if self.options.is_empty() { None } else { Some(IndexOptions::from(&self.options)) };
        IndexModel::builder().keys(self.keys_document()).options(options).build()
    }
}

/// A collection name paired with the index to maintain on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub collection: String,
    pub index: IndexSpec,
}

impl IndexDefinition {
    pub fn new(collection: impl Into<String>, index: IndexSpec) -> Self {
        Self { collection: collection.into(), index }
    }

    /// Parses a list of definitions from YAML (or JSON, which is valid YAML).
    pub fn parse_list(source: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }
}
