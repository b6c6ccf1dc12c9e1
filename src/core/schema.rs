//! Collection schemas and field path resolution
//!
//! A [`SchemaRegistry`] is built once from configuration and never mutated.
//! It doubles as the validated-schema cache: every request resolves field
//! paths against the same `Arc<CollectionSchema>` values.

use crate::config::{CollectionConfig, FieldConfig, FilterConfig};
use crate::core::error::ConfigError;
use crate::core::field::{FieldKind, FieldPath};
use crate::core::pluralize::Pluralizer;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Semantic type of a field, including nested structure
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Enum(Vec<String>),
    Tags,
    DateTime,
    Uuid,
    Integer,
    Float,
    Boolean,
    Object(ObjectSchema),
}

impl FieldType {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldType::String => FieldKind::String,
            FieldType::Enum(_) => FieldKind::Enum,
            FieldType::Tags => FieldKind::Tags,
            FieldType::DateTime => FieldKind::DateTime,
            FieldType::Uuid => FieldKind::Uuid,
            FieldType::Integer => FieldKind::Integer,
            FieldType::Float => FieldKind::Float,
            FieldType::Boolean => FieldKind::Boolean,
            FieldType::Object(_) => FieldKind::Object,
        }
    }

    /// Allowed values of an enum field
    pub fn variants(&self) -> Option<&[String]> {
        match self {
            FieldType::Enum(values) => Some(values),
            _ => None,
        }
    }
}

/// A named field of a collection or of a nested object
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldSchema {
    pub fn kind(&self) -> FieldKind {
        self.field_type.kind()
    }
}

/// An ordered set of fields; the root of a collection or an `object` field
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    fields: IndexMap<String, FieldSchema>,
}

impl ObjectSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn from_config(context: &str, fields: &[FieldConfig]) -> Result<Self, ConfigError> {
        let mut map = IndexMap::with_capacity(fields.len());
        for field in fields {
            let location = format!("{}.{}", context, field.name);
            if !Pluralizer::is_snake_case(&field.name) {
                return Err(ConfigError::InvalidValue {
                    field: location,
                    message: "field names must be snake_case".to_string(),
                });
            }
            let field_type = FieldType::from_config(&location, field)?;
            let schema = FieldSchema {
                name: field.name.clone(),
                field_type,
            };
            if map.insert(field.name.clone(), schema).is_some() {
                return Err(ConfigError::Duplicate {
                    what: "field".to_string(),
                    name: location,
                });
            }
        }
        Ok(Self { fields: map })
    }
}

impl FieldType {
    fn from_config(location: &str, field: &FieldConfig) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            field: location.to_string(),
            message: message.to_string(),
        };

        if field.kind != FieldKind::Enum && !field.values.is_empty() {
            return Err(invalid("only enum fields declare values"));
        }
        if field.kind != FieldKind::Object && !field.fields.is_empty() {
            return Err(invalid("only object fields declare nested fields"));
        }

        Ok(match field.kind {
            FieldKind::String => FieldType::String,
            FieldKind::Enum => {
                if field.values.is_empty() {
                    return Err(invalid("enum fields need at least one value"));
                }
                FieldType::Enum(field.values.clone())
            }
            FieldKind::Tags => FieldType::Tags,
            FieldKind::DateTime => FieldType::DateTime,
            FieldKind::Uuid => FieldType::Uuid,
            FieldKind::Integer => FieldType::Integer,
            FieldKind::Float => FieldType::Float,
            FieldKind::Boolean => FieldType::Boolean,
            FieldKind::Object => {
                if field.fields.is_empty() {
                    return Err(invalid("object fields need at least one nested field"));
                }
                FieldType::Object(ObjectSchema::from_config(location, &field.fields)?)
            }
        })
    }
}

/// Why a field path failed to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Segment at `depth` is not declared
    UnknownField { depth: usize },
    /// Segment at `depth` descends into a field that is not an object
    NotAnObject { depth: usize },
}

/// Schema of a queryable collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    name: String,
    primary_key: String,
    primary_key_kind: FieldKind,
    time_field: Option<FieldPath>,
    root: ObjectSchema,
}

impl CollectionSchema {
    /// Build and validate a schema from its declaration
    pub fn from_config(config: &CollectionConfig) -> Result<Self, ConfigError> {
        if !Pluralizer::is_snake_case(&config.name) {
            return Err(ConfigError::InvalidValue {
                field: config.name.clone(),
                message: "collection names must be snake_case".to_string(),
            });
        }
        if !Pluralizer::is_plural(&config.name) {
            tracing::warn!(collection = %config.name, "collection name is not plural");
        }

        let root = ObjectSchema::from_config(&config.name, &config.fields)?;

        let primary_key_kind = match root.field(&config.primary_key).map(FieldSchema::kind) {
            Some(kind @ (FieldKind::Uuid | FieldKind::String | FieldKind::Integer)) => kind,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.primary_key", config.name),
                    message: format!("primary key cannot be a {} field", other),
                });
            }
            None => {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.primary_key", config.name),
                    message: format!("field '{}' is not declared", config.primary_key),
                });
            }
        };

        let mut schema = Self {
            name: config.name.clone(),
            primary_key: config.primary_key.clone(),
            primary_key_kind,
            time_field: None,
            root,
        };

        if let Some(raw) = &config.time_field {
            let invalid = |message: String| ConfigError::InvalidValue {
                field: format!("{}.time_field", config.name),
                message,
            };
            let path = FieldPath::parse(raw).map_err(|e| invalid(e.to_string()))?;
            match schema.resolve(&path) {
                Ok(field) if field.kind() == FieldKind::DateTime => {}
                Ok(field) => {
                    return Err(invalid(format!(
                        "'{}' is a {} field, expected datetime",
                        raw,
                        field.kind()
                    )));
                }
                Err(_) => return Err(invalid(format!("'{}' is not declared", raw))),
            }
            schema.time_field = Some(path);
        }

        Ok(schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn primary_key_path(&self) -> FieldPath {
        FieldPath::single(&self.primary_key)
    }

    pub fn primary_key_kind(&self) -> FieldKind {
        self.primary_key_kind
    }

    pub fn time_field(&self) -> Option<&FieldPath> {
        self.time_field.as_ref()
    }

    pub fn root(&self) -> &ObjectSchema {
        &self.root
    }

    /// Resolve a field path, descending into nested object fields
    pub fn resolve(&self, path: &FieldPath) -> Result<&FieldSchema, PathError> {
        let mut current = &self.root;
        let mut found: Option<&FieldSchema> = None;

        for (depth, segment) in path.segments().iter().enumerate() {
            if let Some(parent) = found {
                match &parent.field_type {
                    FieldType::Object(children) => current = children,
                    _ => return Err(PathError::NotAnObject { depth }),
                }
            }
            found = Some(
                current
                    .field(segment)
                    .ok_or(PathError::UnknownField { depth })?,
            );
        }

        found.ok_or(PathError::UnknownField { depth: 0 })
    }
}

impl fmt::Display for CollectionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} fields)", self.name, self.root.len())
    }
}

/// Immutable registry of every queryable collection
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<CollectionSchema>>,
}

impl SchemaRegistry {
    /// Build every collection schema declared in the configuration
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        let mut schemas = HashMap::with_capacity(config.collections.len());
        for collection in &config.collections {
            let schema = CollectionSchema::from_config(collection)?;
            if schemas
                .insert(collection.name.clone(), Arc::new(schema))
                .is_some()
            {
                return Err(ConfigError::Duplicate {
                    what: "collection".to_string(),
                    name: collection.name.clone(),
                });
            }
        }
        tracing::debug!(collections = schemas.len(), "schema registry built");
        Ok(Self { schemas })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CollectionSchema>> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Collection names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
