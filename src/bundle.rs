//! Packages selected documents into a single context bundle for the
//! generator.
//!
//! Format, one section per selected document in selection order:
//!
//! ```text
//! ## Prompt 1: <title>
//! <body>
//!
//! ---
//!
//! ## Prompt 2: <title>
//! <body>
//! ```
//!
//! Bodies are passed through untruncated.

use crate::models::Corpus;

/// Separator placed between two document sections.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Concatenate the title and body of each selected document.
///
/// Positions not present in `corpus` are skipped.
pub fn package(corpus: &Corpus, selected: &[usize]) -> String {
    selected
        .iter()
        .filter_map(|&pos| corpus.get(pos))
        .enumerate()
        .map(|(rank, doc)| format!("## Prompt {}: {}\n{}", rank + 1, doc.title, doc.body))
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}
