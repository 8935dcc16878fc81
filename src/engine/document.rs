//! Documents accepted by the index writer.
//!
//! A document is keyed by a string id and carries either a vector or a list
//! of text fields. Each text field controls how much of it is indexed through
//! [`IndexOptions`], whether length normalization applies (`norms`) and
//! whether the raw text is kept for retrieval (`store`).

use serde::{Deserialize, Serialize};

/// How much information is indexed for a text field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOptions {
    /// Only documents are indexed; every match counts as a single occurrence.
    #[serde(alias = "DOCS")]
    Docs,
    /// Documents and term frequencies.
    #[serde(alias = "DOCS_AND_FREQS")]
    Freqs,
    /// Documents, frequencies and positions (required for phrase queries).
    #[default]
    #[serde(alias = "DOCS_AND_FREQS_AND_POSITIONS")]
    Positions,
    /// Everything above plus character offsets.
    #[serde(alias = "DOCS_AND_FREQS_AND_POSITIONS_AND_OFFSETS")]
    Offsets,
}

impl IndexOptions {
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::Freqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::Positions
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndexOptions::Docs => "docs",
            IndexOptions::Freqs => "freqs",
            IndexOptions::Positions => "positions",
            IndexOptions::Offsets => "offsets",
        }
    }
}

fn default_norms() -> bool {
    true
}

/// A named text field of a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextField {
    /// Field name.
    #[serde(rename = "fieldName")]
    pub name: String,
    /// Raw text, analyzed at write time.
    pub text: String,
    /// Keep the raw text so it can be read back from a snapshot.
    #[serde(default)]
    pub store: bool,
    /// Indexed detail for this field.
    #[serde(default)]
    pub index_options: IndexOptions,
    /// Whether field length takes part in scoring.
    #[serde(default = "default_norms")]
    pub norms: bool,
}

impl TextField {
    /// Create an unstored field indexed with positions and norms.
    pub fn new<N: Into<String>, T: Into<String>>(name: N, text: T) -> Self {
        TextField {
            name: name.into(),
            text: text.into(),
            store: false,
            index_options: IndexOptions::default(),
            norms: true,
        }
    }

    pub fn stored(mut self) -> Self {
        self.store = true;
        self
    }

    pub fn with_index_options(mut self, options: IndexOptions) -> Self {
        self.index_options = options;
        self
    }

    pub fn omit_norms(mut self) -> Self {
        self.norms = false;
        self
    }
}

/// The indexed content of a document.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentBody {
    Vector(Vec<f32>),
    Text(Vec<TextField>),
}

/// A document ready to be handed to the writer.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: DocumentBody,
}

impl Document {
    pub fn vector<S: Into<String>>(id: S, vector: Vec<f32>) -> Self {
        Document {
            id: id.into(),
            body: DocumentBody::Vector(vector),
        }
    }

    pub fn text<S: Into<String>>(id: S, fields: Vec<TextField>) -> Self {
        Document {
            id: id.into(),
            body: DocumentBody::Text(fields),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.body {
            DocumentBody::Vector(_) => "vector",
            DocumentBody::Text(_) => "text",
        }
    }
}
