//! Core data models used throughout the prompt finder.
//!
//! [`RawRecord`] and [`ContentBlock`] are what a [`RecordSource`](crate::traits::RecordSource)
//! hands back after typed deserialization. The corpus builder turns them
//! into immutable [`Document`]s collected in a [`Corpus`].

use serde::Serialize;
use std::collections::BTreeMap;

/// A typed property value on a knowledge-base record.
///
/// Only the shapes the corpus builder reads are modelled; everything else
/// collapses into [`PropertyValue::Other`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// The record's title column (plain text).
    Title(String),
    /// Free-form rich text (plain text).
    RichText(String),
    /// Tag list, in source order.
    MultiSelect(Vec<String>),
    /// Single tag, possibly unset.
    Select(Option<String>),
    /// A property type the pipeline does not consume.
    Other,
}

/// A record as returned by the document store, before block retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl RawRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property insertion, used by adapters and tests.
    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

/// Kind of a content block belonging to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading,
    ListItem,
    ToDo,
    Toggle,
    Quote,
    Callout,
    Code,
    /// Images, dividers, embeds and anything else without body text.
    Unsupported,
}

impl BlockKind {
    /// Whether text in this block counts towards a document body.
    pub fn is_paragraph_like(self) -> bool {
        !matches!(self, BlockKind::Unsupported)
    }
}

/// A single content block with its plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl ContentBlock {
    /// A plain paragraph block.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
        }
    }
}

/// A normalized, immutable prompt document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub body: String,
    /// Title, keywords and body joined by single spaces. The only field the
    /// vector index reads.
    pub search_text: String,
}

impl Document {
    /// Build a document and derive its `search_text`.
    ///
    /// Empty parts are skipped when joining, so a document with only a body
    /// has `search_text == body`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        keywords: Vec<String>,
        body: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let body = body.into();
        let joined_keywords = keywords.join(" ");
        let search_text = [title.as_str(), joined_keywords.as_str(), body.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            id: id.into(),
            title,
            keywords,
            body,
            search_text,
        }
    }
}

/// Ordered documents from one source fetch.
///
/// Positions are stable for the lifetime of the corpus and are the row
/// numbers of the [`VectorIndex`](crate::index::VectorIndex) built from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    documents: Vec<Document>,
}

impl Corpus {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }
}

/// A selected document and its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    /// Position in the corpus the score was computed against.
    pub position: usize,
    pub document: Document,
    /// Cosine similarity in `[0.0, 1.0]`.
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_text_joins_all_fields() {
        let doc = Document::new(
            "p1",
            "Weekly report",
            vec!["report".into(), "summary".into()],
            "Summarize the week.",
        );
        assert_eq!(doc.search_text, "Weekly report report summary Summarize the week.");
    }

    #[test]
    fn test_search_text_skips_empty_parts() {
        let doc = Document::new("p2", "", Vec::new(), "body only");
        assert_eq!(doc.search_text, "body only");

        let doc = Document::new("p3", "title only", Vec::new(), "");
        assert_eq!(doc.search_text, "title only");
    }

    #[test]
    fn test_empty_document_is_retained() {
        let doc = Document::new("p4", "", Vec::new(), "");
        assert!(doc.search_text.is_empty());
        let corpus = Corpus::new(vec![doc]);
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn test_unsupported_blocks_are_not_paragraph_like() {
        assert!(BlockKind::Paragraph.is_paragraph_like());
        assert!(BlockKind::Code.is_paragraph_like());
        assert!(!BlockKind::Unsupported.is_paragraph_like());
    }
}
