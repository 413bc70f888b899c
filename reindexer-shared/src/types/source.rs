//! Data sources and the resources discovered inside them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::errors::ModelError;

/// Protocol used to reach a source and harvest its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Directory tree of PDF files on the local filesystem.
    Pdf,
    /// OGC Web Feature Service endpoint.
    Wfs,
    /// GeoNetwork metadata catalog.
    Geonet,
}

impl SourceMode {
    /// Whether documents of this mode need the attachment ingest pipeline.
    pub fn requires_attachment_pipeline(&self) -> bool {
        matches!(self, Self::Pdf)
    }

    /// Whether the source URI is a network endpoint rather than a path.
    pub fn is_network(&self) -> bool {
        !matches!(self, Self::Pdf)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Wfs => "wfs",
            Self::Geonet => "geonet",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "wfs" => Ok(Self::Wfs),
            "geonet" => Ok(Self::Geonet),
            other => Err(ModelError::UnknownMode(other.to_string())),
        }
    }
}

/// A named, user-owned data origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    /// Filesystem path for `pdf`, service endpoint for network modes.
    pub uri: String,
    pub mode: SourceMode,
    pub user: String,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        mode: SourceMode,
        user: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            uri: uri.into(),
            mode,
            user: user.into(),
        }
    }

    /// Check that the URI is usable for the source mode.
    ///
    /// `pdf` sources must point at an existing directory. Network sources must be
    /// an absolute `http` or `https` URL.
    pub fn verify_uri(&self) -> Result<(), ModelError> {
        let invalid = |reason: &str| ModelError::InvalidUri {
            uri: self.uri.clone(),
            mode: self.mode.to_string(),
            reason: reason.to_string(),
        };

        if self.mode.is_network() {
            let url = Url::parse(&self.uri).map_err(|e| invalid(&e.to_string()))?;
            match url.scheme() {
                "http" | "https" => Ok(()),
                other => Err(invalid(&format!("unsupported scheme '{}'", other))),
            }
        } else if Path::new(&self.uri).is_dir() {
            Ok(())
        } else {
            Err(invalid("directory does not exist"))
        }
    }
}

/// One column of a discovered resource schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    /// Minimum and maximum number of occurrences per record.
    #[serde(default = "default_occurs")]
    pub occurs: [u32; 2],
    #[serde(default)]
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

fn default_occurs() -> [u32; 2] {
    [0, 1]
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            occurs: default_occurs(),
            count: 0,
            rule: None,
        }
    }
}

/// One discoverable dataset within a source.
///
/// The column schema is fixed once discovered; re-discovery replaces the whole
/// resource rather than editing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub source_id: Uuid,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Resource {
    pub fn new(name: impl Into<String>, source_id: Uuid, columns: Vec<Column>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source_id,
            columns,
        }
    }
}
