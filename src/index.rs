//! Character n-gram TF-IDF vector index.
//!
//! Text is lowercased and whitespace runs are collapsed to a single space;
//! no word segmentation is performed, so CJK text without spaces yields
//! useful features. Every contiguous window of `min..=max` characters is a
//! feature.
//!
//! # Weighting
//!
//! ```text
//! idf(t)    = ln((1 + n) / (1 + df(t))) + 1
//! w(d, t)   = tf(d, t) × idf(t)
//! row(d)    = w(d, ·) / ‖w(d, ·)‖₂
//! ```
//!
//! Rows are L2-normalized, so cosine similarity between a projected query
//! and a row is a plain dot product. The vocabulary is frozen at build time
//! with columns assigned in lexicographic feature order, which makes two
//! builds over the same corpus identical.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::models::Corpus;

/// Inclusive range of n-gram lengths, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NgramRange {
    min: usize,
    max: usize,
}

impl NgramRange {
    /// An inclusive n-gram length range.
    ///
    /// Fails with [`Error::Config`] unless `1 <= min <= max`.
    pub fn new(min: usize, max: usize) -> Result<Self> {
        if min == 0 || min > max {
            return Err(Error::Config(format!(
                "n-gram range must satisfy 1 <= min <= max, got {}..={}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl Default for NgramRange {
    fn default() -> Self {
        Self { min: 2, max: 3 }
    }
}

/// Lowercase `text` and collapse each whitespace run into one space.
fn normalize(text: &str) -> Vec<char> {
    let mut out = Vec::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Extract character n-grams from `text`, shortest first.
///
/// Text shorter than an n-gram length contributes no grams of that length.
///
/// ```rust
/// use prompt_finder::index::{char_ngrams, NgramRange};
///
/// let grams = char_ngrams("日本語", NgramRange::default());
/// assert_eq!(grams, vec!["日本", "本語", "日本語"]);
/// ```
pub fn char_ngrams(text: &str, range: NgramRange) -> Vec<String> {
    let chars = normalize(text);
    let mut grams = Vec::new();
    for n in range.min..=range.max {
        if chars.len() < n {
            break;
        }
        grams.extend(chars.windows(n).map(|w| w.iter().collect::<String>()));
    }
    grams
}

fn term_counts(text: &str, range: NgramRange) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for gram in char_ngrams(text, range) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}

/// A sparse vector with entries sorted by column and no explicit zeros.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    fn from_entries(mut entries: Vec<(usize, f64)>) -> Self {
        entries.retain(|(_, w)| *w != 0.0);
        entries.sort_by_key(|(col, _)| *col);
        Self { entries }
    }

    /// Scale to unit L2 norm. All-zero vectors are left as they are.
    fn normalized(mut self) -> Self {
        let norm = self.entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for (_, w) in &mut self.entries {
                *w /= norm;
            }
        }
        self
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dot product by merging the two sorted entry lists.
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (ca, wa) = self.entries[i];
            let (cb, wb) = other.entries[j];
            match ca.cmp(&cb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// A fitted vocabulary plus one normalized TF-IDF row per corpus document.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    ngram: NgramRange,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    rows: Vec<SparseVector>,
}

impl VectorIndex {
    /// Fit the vocabulary and weight every document of `corpus`.
    ///
    /// An empty corpus yields an empty index. A non-empty corpus in which no
    /// document produces a single n-gram fails with
    /// [`Error::EmptyVocabulary`].
    pub fn build(corpus: &Corpus, ngram: NgramRange) -> Result<Self> {
        let counts: Vec<HashMap<String, u32>> = corpus
            .iter()
            .map(|doc| term_counts(&doc.search_text, ngram))
            .collect();

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for doc_counts in &counts {
            for term in doc_counts.keys() {
                *doc_freq.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        if doc_freq.is_empty() && !corpus.is_empty() {
            return Err(Error::EmptyVocabulary);
        }

        let n = corpus.len() as f64;
        let mut vocabulary = HashMap::with_capacity(doc_freq.len());
        let mut idf = Vec::with_capacity(doc_freq.len());
        for (col, (term, df)) in doc_freq.iter().enumerate() {
            vocabulary.insert((*term).to_string(), col);
            idf.push(((1.0 + n) / (1.0 + *df as f64)).ln() + 1.0);
        }

        let rows = counts
            .iter()
            .map(|doc_counts| {
                let entries = doc_counts
                    .iter()
                    .map(|(term, tf)| {
                        let col = vocabulary[term.as_str()];
                        (col, *tf as f64 * idf[col])
                    })
                    .collect();
                SparseVector::from_entries(entries).normalized()
            })
            .collect();

        Ok(Self {
            ngram,
            vocabulary,
            idf,
            rows,
        })
    }

    /// Project text into the frozen vocabulary. Unseen n-grams are dropped.
    pub fn project(&self, text: &str) -> SparseVector {
        let entries = term_counts(text, self.ngram)
            .into_iter()
            .filter_map(|(term, tf)| {
                self.vocabulary
                    .get(&term)
                    .map(|&col| (col, tf as f64 * self.idf[col]))
            })
            .collect();
        SparseVector::from_entries(entries).normalized()
    }

    /// Number of rows (equals the corpus size it was built from).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, position: usize) -> Option<&SparseVector> {
        self.rows.get(position)
    }

    pub fn rows(&self) -> &[SparseVector] {
        &self.rows
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Total stored weights across all rows.
    pub fn nonzeros(&self) -> usize {
        self.rows.iter().map(SparseVector::nnz).sum()
    }

    pub fn ngram_range(&self) -> NgramRange {
        self.ngram
    }

    /// Cosine similarity between two indexed documents.
    pub fn similarity(&self, a: usize, b: usize) -> f64 {
        match (self.rows.get(a), self.rows.get(b)) {
            (Some(ra), Some(rb)) => ra.dot(rb).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn corpus(texts: &[&str]) -> Corpus {
        Corpus::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| Document::new(format!("d{}", i), "", Vec::new(), *t))
                .collect(),
        )
    }

    fn norm(v: &SparseVector) -> f64 {
        v.entries().iter().map(|(_, w)| w * w).sum::<f64>().sqrt()
    }

    #[test]
    fn test_ngrams_lowercase_and_collapse_whitespace() {
        let grams = char_ngrams("Ab  \tC", NgramRange::default());
        assert_eq!(grams, vec!["ab", "b ", " c", "ab ", "b c"]);
    }

    #[test]
    fn test_ngrams_short_text() {
        assert!(char_ngrams("x", NgramRange::default()).is_empty());
        assert!(char_ngrams("", NgramRange::default()).is_empty());
        assert_eq!(char_ngrams("xy", NgramRange::default()), vec!["xy"]);
    }

    #[test]
    fn test_ngram_range_validation() {
        assert!(NgramRange::new(0, 2).is_err());
        assert!(NgramRange::new(3, 2).is_err());
        let r = NgramRange::new(1, 4).unwrap();
        assert_eq!((r.min(), r.max()), (1, 4));
    }

    #[test]
    fn test_row_count_matches_corpus() {
        let c = corpus(&["apple pie", "banana bread", "", "cherry tart"]);
        let index = VectorIndex::build(&c, NgramRange::default()).unwrap();
        assert_eq!(index.len(), c.len());
    }

    #[test]
    fn test_rows_are_unit_norm_or_zero() {
        let c = corpus(&["apple pie", "", "プロンプトの例"]);
        let index = VectorIndex::build(&c, NgramRange::default()).unwrap();
        assert!((norm(index.row(0).unwrap()) - 1.0).abs() < 1e-9);
        assert!(index.row(1).unwrap().is_zero());
        assert!((norm(index.row(2).unwrap()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_corpus_builds_empty_index() {
        let index = VectorIndex::build(&Corpus::default(), NgramRange::default()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.vocabulary_len(), 0);
    }

    #[test]
    fn test_all_empty_text_is_empty_vocabulary() {
        let c = corpus(&["", "x"]);
        let err = VectorIndex::build(&c, NgramRange::default()).unwrap_err();
        assert_eq!(err, Error::EmptyVocabulary);
    }

    #[test]
    fn test_projection_drops_unseen_features() {
        let c = corpus(&["abc"]);
        let index = VectorIndex::build(&c, NgramRange::default()).unwrap();
        assert_eq!(index.vocabulary_len(), 3); // ab, bc, abc
        assert!(index.project("xyz").is_zero());
        assert_eq!(index.vocabulary_len(), 3);
        assert_eq!(index.project("abz").nnz(), 1);
    }

    #[test]
    fn test_common_features_weigh_less() {
        // "ab" occurs in both documents, "cd" only in the first.
        let c = corpus(&["ab cd", "ab"]);
        let index = VectorIndex::build(&c, NgramRange::new(2, 2).unwrap()).unwrap();
        let ab = index.vocabulary["ab"];
        let cd = index.vocabulary["cd"];
        assert!(index.idf[cd] > index.idf[ab]);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let c = corpus(&["weekly report prompt", "議事録の要約", "code review checklist"]);
        let a = VectorIndex::build(&c, NgramRange::default()).unwrap();
        let b = VectorIndex::build(&c, NgramRange::default()).unwrap();
        assert_eq!(a.rows(), b.rows());
        assert_eq!(a.idf, b.idf);
    }

    #[test]
    fn test_dot_of_disjoint_vectors_is_zero() {
        let a = SparseVector::from_entries(vec![(0, 1.0), (2, 1.0)]);
        let b = SparseVector::from_entries(vec![(1, 1.0), (3, 1.0)]);
        assert_eq!(a.dot(&b), 0.0);
        assert_eq!(a.dot(&a), 2.0);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let c = corpus(&["meeting notes", "meeting notes", "unrelated"]);
        let index = VectorIndex::build(&c, NgramRange::default()).unwrap();
        assert!((index.similarity(0, 1) - 1.0).abs() < 1e-9);
        assert!(index.similarity(0, 2) < 1.0);
        assert_eq!(index.similarity(0, 99), 0.0);
    }
}
