//! Indexation contexts: a resource's schema bound to concrete field mappings.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ModelError;
use crate::types::source::{Column, Resource};

/// Cadence at which a context is rebuilt by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl Frequency {
    /// Time that must elapse after a successful build before the next one is due.
    pub fn interval(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::days(7),
            Self::Monthly => Duration::days(30),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Weekly => f.write_str("weekly"),
            Self::Monthly => f.write_str("monthly"),
        }
    }
}

impl FromStr for Frequency {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(ModelError::UnknownFrequency(other.to_string())),
        }
    }
}

/// Per-context overrides for one column of the resource schema.
///
/// `name` is the column name in harvested documents; `alias`, when set, is the
/// field name used in the index instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProperty {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    /// Date format for `date` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default = "default_occurs")]
    pub occurs: [u32; 2],
    #[serde(default)]
    pub rejected: bool,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,
}

fn default_occurs() -> [u32; 2] {
    [0, 1]
}

fn default_true() -> bool {
    true
}

impl ColumnProperty {
    pub fn new(name: impl Into<String>, property_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            property_type: Some(property_type.into()),
            pattern: None,
            occurs: default_occurs(),
            rejected: false,
            searchable: true,
            weight: None,
            analyzer: None,
            search_analyzer: None,
        }
    }

    /// Seed a property from a discovered column.
    pub fn from_column(column: &Column) -> Self {
        let mut property = Self::new(column.name.clone(), field_type_for(&column.column_type));
        property.occurs = column.occurs;
        property
    }

    /// Name of the field in the index: the alias, or the column name when no
    /// alias is set.
    pub fn field_name(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.trim().is_empty() => alias,
            _ => &self.name,
        }
    }

    /// Check that the property carries a name and a type.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::InvalidProperty(
                "property name is required".to_string(),
            ));
        }
        match self.property_type.as_deref() {
            Some(t) if !t.trim().is_empty() => Ok(()),
            _ => Err(ModelError::InvalidProperty(format!(
                "property '{}' has no type",
                self.name
            ))),
        }
    }
}

/// Map a harvested column type onto a search-engine field type.
pub fn field_type_for(column_type: &str) -> &'static str {
    match column_type.to_lowercase().as_str() {
        "string" | "text" => "text",
        "integer" | "int" | "long" => "long",
        "double" | "float" | "decimal" => "double",
        "boolean" | "bool" => "boolean",
        "date" | "datetime" => "date",
        "geometry" | "point" | "multipoint" | "linestring" | "multilinestring" | "polygon"
        | "multipolygon" => "geo_shape",
        _ => "keyword",
    }
}

/// Indexation profile binding a resource to a named mapping configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: Uuid,
    pub name: String,
    pub resource_id: Uuid,
    #[serde(default)]
    pub properties: Vec<ColumnProperty>,
    #[serde(default)]
    pub frequency: Frequency,
}

impl Context {
    pub fn new(name: impl Into<String>, resource_id: Uuid, properties: Vec<ColumnProperty>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            resource_id,
            properties,
            frequency: Frequency::default(),
        }
    }

    /// Create a context whose properties mirror the resource's columns.
    pub fn from_resource(name: impl Into<String>, resource: &Resource) -> Self {
        let properties = resource
            .columns
            .iter()
            .map(ColumnProperty::from_column)
            .collect();
        Self::new(name, resource.id, properties)
    }

    /// Stable alias under which the context's current index is reachable.
    pub fn alias(&self) -> String {
        self.id.simple().to_string()
    }
}
