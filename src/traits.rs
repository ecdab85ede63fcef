//! Seams to the two external collaborators of the pipeline.
//!
//! ```text
//! ┌──────────────┐   fetch_records / fetch_blocks   ┌──────────────┐
//! │ RecordSource │ ───────────────────────────────▶ │ CorpusBuilder│
//! │ (Notion, …)  │                                  └──────┬───────┘
//! └──────────────┘                                         ▼
//!                                               index → score → select
//!                                                          │
//! ┌──────────────┐          generate(prompt)               ▼
//! │  Generator   │ ◀─────────────────────────────── bundle + question
//! │ (OpenAI, …)  │
//! └──────────────┘
//! ```
//!
//! Implement [`RecordSource`] to index a different knowledge base and
//! [`Generator`] to use a different language model. Both are object-safe
//! and used as `Arc<dyn …>` by [`PromptFinder`](crate::search::PromptFinder).

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ContentBlock, RawRecord};

/// A knowledge base that yields prompt records.
///
/// # Error contract
///
/// - [`Error::FetchFailure`](crate::error::Error::FetchFailure): the store is
///   unreachable or unauthorized. Aborts the rebuild.
/// - [`Error::MalformedRecord`](crate::error::Error::MalformedRecord): one
///   record is unreadable. The corpus builder degrades that record's body to
///   `""` and carries on.
///
/// Timeouts and retries are the implementation's responsibility; the
/// pipeline awaits each call without a deadline of its own.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Short label for logs (e.g. `"notion"`).
    fn name(&self) -> &str;

    /// List every record, in the store's order.
    async fn fetch_records(&self) -> Result<Vec<RawRecord>>;

    /// Fetch the content blocks of one record, in the store's order.
    async fn fetch_blocks(&self, record_id: &str) -> Result<Vec<ContentBlock>>;
}

/// A hosted language model that turns a prompt into an answer.
///
/// Failures surface as [`Error::GenerationFailure`](crate::error::Error::GenerationFailure)
/// and are not retried by the pipeline.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier, for logs and stats.
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}
