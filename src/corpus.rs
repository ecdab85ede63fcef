//! Corpus builder: raw records → normalized [`Document`]s.
//!
//! For each record, in source order:
//!
//! 1. Title from the configured title property (or the record's `title`
//!    typed property).
//! 2. Keywords from the configured keywords property.
//! 3. Body from the plain text of every paragraph-like block, joined by `\n`.
//!
//! A record whose blocks cannot be read ([`Error::MalformedRecord`]) keeps
//! an empty body; the rest of the corpus is unaffected. A
//! [`Error::FetchFailure`] aborts the whole build.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{ContentBlock, Corpus, Document, PropertyValue, RawRecord};
use crate::traits::RecordSource;

/// Which record properties feed the document fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    /// Explicit title property. `None` picks the first title-typed property.
    pub title_property: Option<String>,
    pub keywords_property: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            title_property: None,
            keywords_property: "Keywords".to_string(),
        }
    }
}

/// Fetch every record from `source` and build a [`Corpus`].
pub async fn build_corpus(source: &dyn RecordSource, fields: &FieldMapping) -> Result<Corpus> {
    let records = source.fetch_records().await?;
    debug!(source = source.name(), records = records.len(), "records fetched");

    let mut documents = Vec::with_capacity(records.len());
    let mut degraded = 0usize;

    for record in &records {
        let body = match source.fetch_blocks(&record.id).await {
            Ok(blocks) => join_blocks(&blocks),
            Err(Error::MalformedRecord { record_id, reason }) => {
                warn!(%record_id, %reason, "record blocks unreadable, indexing without body");
                degraded += 1;
                String::new()
            }
            Err(e) => return Err(e),
        };

        documents.push(Document::new(
            record.id.clone(),
            extract_title(record, fields),
            extract_keywords(record, fields),
            body,
        ));
    }

    info!(
        source = source.name(),
        documents = documents.len(),
        degraded,
        "corpus built"
    );
    Ok(Corpus::new(documents))
}

/// Plain text of the paragraph-like blocks, one per line.
pub fn join_blocks(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter(|b| b.kind.is_paragraph_like() && !b.text.is_empty())
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Title of a record.
///
/// # Arguments
///
/// * `record` - the raw knowledge-base record.
/// * `fields` - names the title property. When unset, the first
///   title-typed property is used.
///
/// # Returns
///
/// The trimmed title text, or an empty string when the record has none.
pub fn extract_title(record: &RawRecord, fields: &FieldMapping) -> String {
    let value = match &fields.title_property {
        Some(name) => record.properties.get(name),
        None => record
            .properties
            .values()
            .find(|v| matches!(v, PropertyValue::Title(_))),
    };

    match value {
        Some(PropertyValue::Title(s)) | Some(PropertyValue::RichText(s)) => s.trim().to_string(),
        Some(PropertyValue::Select(Some(s))) => s.trim().to_string(),
        Some(PropertyValue::MultiSelect(tags)) => tags.join(" "),
        _ => String::new(),
    }
}

/// Keyword tags of a record, in source order without duplicates.
///
/// A multi-select property gives its options directly. Text properties
/// are split on `,`, `、` and `，`. Blank tags are dropped.
pub fn extract_keywords(record: &RawRecord, fields: &FieldMapping) -> Vec<String> {
    let raw: Vec<String> = match record.properties.get(&fields.keywords_property) {
        Some(PropertyValue::MultiSelect(tags)) => tags.clone(),
        Some(PropertyValue::RichText(s)) | Some(PropertyValue::Title(s)) => split_tags(s),
        Some(PropertyValue::Select(Some(s))) => split_tags(s),
        _ => Vec::new(),
    };

    let mut keywords: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !keywords.iter().any(|k| k == tag) {
            keywords.push(tag.to_string());
        }
    }
    keywords
}

fn split_tags(s: &str) -> Vec<String> {
    s.split([',', '、', '，'])
        .map(|t| t.to_string())
        .collect()
}
