//! # Prompt Finder
//!
//! Suggests a reusable prompt from a shared prompt library for a free-text
//! question.
//!
//! Prompt documents live in a Notion database. They are indexed with
//! character n-gram TF-IDF, so queries in languages without whitespace word
//! boundaries (Japanese, Chinese) match as well as English ones. The best
//! few matches are handed to a hosted language model, which explains which
//! prompt to use and how.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Notion    │──▶│   Corpus    │──▶│ Vector Index │  (cached, TTL)
//! │  database   │   │   builder   │   │ char n-grams │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │ per query
//!                      score ──▶ select ──▶ bundle ──▶ generator
//!                                            │
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌──────────┐
//!                 │   CLI    │         │   HTTP   │
//!                 │ (pfind)  │         │  (axum)  │
//!                 └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export NOTION_API_KEY=secret_...
//! pfind candidates "議事録を要約したい"   # retrieval only
//! pfind search "議事録を要約したい"       # retrieval + generation
//! pfind serve                             # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | Error taxonomy |
//! | [`models`] | Records, blocks, documents, corpus |
//! | [`traits`] | `RecordSource` and `Generator` seams |
//! | [`connector_notion`] | Notion database source |
//! | [`corpus`] | Records → documents |
//! | [`index`] | Character n-gram TF-IDF index |
//! | [`score`] | Query → per-document cosine similarity |
//! | [`select`] | Threshold, rank, dedup, cap |
//! | [`bundle`] | Selected documents → generator context |
//! | [`cache`] | TTL snapshot holder with atomic swap |
//! | [`generator`] | OpenAI and Gemini generators |
//! | [`search`] | Query orchestration |
//! | [`stats`] | Index statistics |
//! | [`server`] | JSON HTTP server |
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |

pub mod bundle;
pub mod cache;
pub mod config;
pub mod connector_notion;
pub mod corpus;
pub mod error;
pub mod generator;
pub mod index;
pub mod logging;
pub mod models;
pub mod score;
pub mod search;
pub mod select;
pub mod server;
pub mod stats;
pub mod traits;

pub use error::{Error, Result};
pub use search::{Answer, PromptFinder, SearchOutcome};
