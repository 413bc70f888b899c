//! Text-analysis configuration units composed into index `analysis` settings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named analyzer: at most one tokenizer followed by an ordered filter chain.
///
/// When `config` is set it is used verbatim as the analyzer definition and the
/// linked tokenizer and filters are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analyzer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub reserved: bool,
    /// Filter names, in attachment order.
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl Analyzer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user: None,
            reserved: false,
            filters: Vec::new(),
            tokenizer: None,
            config: None,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: impl Into<String>) -> Self {
        self.tokenizer = Some(tokenizer.into());
        self
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }

    /// Whether the analyzer has both a filter chain and a tokenizer.
    pub fn is_fully_linked(&self) -> bool {
        !self.filters.is_empty() && self.tokenizer.is_some()
    }

    /// Whether API consumers may alter this analyzer.
    ///
    /// Reserved analyzers are read-only unless they are fully linked.
    pub fn is_editable(&self) -> bool {
        !self.reserved || self.is_fully_linked()
    }
}

/// A named token filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user: None,
            reserved: false,
            config: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }
}

/// A named tokenizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tokenizer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl Tokenizer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user: None,
            reserved: false,
            config: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }
}

/// Whether a stored config blob carries anything worth emitting.
pub fn has_config(config: &Option<Value>) -> bool {
    match config {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
