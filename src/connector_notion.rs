//! Notion database connector.
//!
//! Reads prompt records from a Notion database through the public REST API
//! and implements [`RecordSource`] for the corpus builder.
//!
//! # Endpoints
//!
//! | Call | Endpoint | Pagination |
//! |------|----------|------------|
//! | [`RecordSource::fetch_records`] | `POST {api_url}/databases/{id}/query` | `start_cursor` in body |
//! | [`RecordSource::fetch_blocks`] | `GET {api_url}/blocks/{id}/children` | `start_cursor` query param |
//!
//! Both follow `has_more` / `next_cursor` until the listing is exhausted.
//! Blocks with `has_children` (toggles, list items, callouts, ...) are
//! expanded in place, up to [`MAX_NESTING`] levels below the page.
//!
//! # Configuration
//!
//! ```toml
//! [notion]
//! database_id = "0f3c2b7e..."
//! token_env = "NOTION_API_KEY"   # default
//! keywords_property = "Keywords" # default
//! ```
//!
//! # Failure classification
//!
//! - HTTP 429 and 5xx are retried with exponential backoff (1s, 2s, 4s, ...)
//!   up to `max_retries` times.
//! - Any failure listing the database is a [`Error::FetchFailure`].
//! - On a single page's block listing, HTTP 403/404 or an undecodable body
//!   is a [`Error::MalformedRecord`]; network errors, HTTP 401 and exhausted
//!   retries are a [`Error::FetchFailure`].
//! - Entries are decoded one at a time. A page without an id is skipped, a
//!   property or block that does not decode is kept as unsupported, and
//!   `null` stands in for an empty list anywhere.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::NotionConfig;
use crate::error::{Error, Result};
use crate::models::{BlockKind, ContentBlock, PropertyValue, RawRecord};
use crate::traits::RecordSource;

/// How many levels of nested blocks are expanded below a page.
pub const MAX_NESTING: usize = 3;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A [`RecordSource`] backed by one Notion database.
pub struct NotionSource {
    database_id: String,
    api_url: String,
    notion_version: String,
    token: String,
    page_size: u32,
    max_retries: u32,
    retry_delay: Duration,
    client: reqwest::Client,
}

impl NotionSource {
    /// Build a source from config, reading the integration token from the
    /// environment variable named by `token_env`.
    pub fn from_config(config: &NotionConfig) -> anyhow::Result<Self> {
        let token = std::env::var(&config.token_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.token_env)
        })?;
        Ok(Self::with_token(config, token)?)
    }

    pub fn with_token(config: &NotionConfig, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::FetchFailure(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            database_id: config.database_id.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            notion_version: config.notion_version.clone(),
            token: token.into(),
            page_size: config.page_size,
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(1),
            client,
        })
    }

    /// Override the base backoff delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Send one API call, retrying on 429 and 5xx.
    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> std::result::Result<reqwest::Response, CallFailure> {
        let mut last_err = CallFailure::Network("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay * (1u32 << (attempt - 1).min(5));
                let delay_ms = delay.as_millis() as u64;
                debug!(attempt, delay_ms, url, "retrying Notion request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.token)
                .header("Notion-Version", &self.notion_version)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_err = CallFailure::Exhausted(status, body_text);
                        continue;
                    }
                    return Err(CallFailure::Status(status, body_text));
                }
                Err(e) => {
                    last_err = CallFailure::Network(e.to_string());
                    continue;
                }
            }
        }

        Err(last_err)
    }

    /// Every child entry of `block_id`, across all listing pages.
    async fn list_children(&self, record_id: &str, block_id: &str) -> Result<Vec<Value>> {
        let url = format!("{}/blocks/{}/children", self.api_url, block_id);
        let page_size = self.page_size.to_string();
        let mut entries = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("page_size", page_size.as_str())];
            if let Some(c) = cursor.as_deref() {
                query.push(("start_cursor", c));
            }

            let response = self
                .call::<()>(Method::GET, &url, &query, None)
                .await
                .map_err(|e| classify_block_failure(record_id, e))?;

            let listing: Listing<Value> = response
                .json()
                .await
                .map_err(|e| Error::malformed(record_id, format!("undecodable blocks: {}", e)))?;

            entries.extend(listing.results);

            match listing.next_cursor {
                Some(next) if listing.has_more => cursor = Some(next),
                _ => break,
            }
        }

        Ok(entries)
    }

    /// Append the blocks under `block_id` to `out` in reading order,
    /// expanding nested children depth-first.
    fn collect_blocks<'a>(
        &'a self,
        record_id: &'a str,
        block_id: &'a str,
        depth: usize,
        out: &'a mut Vec<ContentBlock>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for entry in self.list_children(record_id, block_id).await? {
                let has_children = entry
                    .get("has_children")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let nested = entry
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|_| has_children)
                    .map(str::to_string);

                let block = decode_block(record_id, entry);
                let expand = block.kind != BlockKind::Unsupported && depth < MAX_NESTING;
                out.push(block);

                if let (true, Some(child_id)) = (expand, nested) {
                    self.collect_blocks(record_id, &child_id, depth + 1, out).await?;
                }
            }
            Ok(())
        })
    }
}

/// Why a Notion call did not produce a successful response.
#[derive(Debug)]
enum CallFailure {
    /// Non-retryable HTTP status.
    Status(StatusCode, String),
    /// Retryable status still failing after every attempt.
    Exhausted(StatusCode, String),
    Network(String),
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::Status(status, body) | CallFailure::Exhausted(status, body) => {
                write!(f, "Notion API error {}: {}", status, body)
            }
            CallFailure::Network(e) => write!(f, "Notion request failed: {}", e),
        }
    }
}

#[async_trait]
impl RecordSource for NotionSource {
    fn name(&self) -> &str {
        "notion"
    }

    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        let url = format!("{}/databases/{}/query", self.api_url, self.database_id);
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = QueryRequest {
                page_size: self.page_size,
                start_cursor: cursor.as_deref(),
            };
            let response = self
                .call(Method::POST, &url, &[], Some(&body))
                .await
                .map_err(|e| Error::FetchFailure(e.to_string()))?;

            let listing: Listing<Value> = response.json().await.map_err(|e| {
                Error::FetchFailure(format!("invalid database query response: {}", e))
            })?;

            for entry in listing.results {
                match serde_json::from_value::<Page>(entry) {
                    Ok(page) => records.push(page.into_record()),
                    Err(e) => warn!(error = %e, "skipping database entry without a page id"),
                }
            }

            match listing.next_cursor {
                Some(next) if listing.has_more => cursor = Some(next),
                _ => break,
            }
        }

        debug!(database = %self.database_id, records = records.len(), "database listed");
        Ok(records)
    }

    async fn fetch_blocks(&self, record_id: &str) -> Result<Vec<ContentBlock>> {
        let mut blocks = Vec::new();
        self.collect_blocks(record_id, record_id, 0, &mut blocks).await?;
        Ok(blocks)
    }
}

fn classify_block_failure(record_id: &str, failure: CallFailure) -> Error {
    match failure {
        CallFailure::Status(StatusCode::UNAUTHORIZED, _)
        | CallFailure::Exhausted(..)
        | CallFailure::Network(_) => Error::FetchFailure(failure.to_string()),
        CallFailure::Status(..) => Error::malformed(record_id, failure.to_string()),
    }
}

fn decode_block(record_id: &str, entry: Value) -> ContentBlock {
    match serde_json::from_value::<NotionBlock>(entry) {
        Ok(block) => block.into_content_block(),
        Err(e) => {
            debug!(record_id, error = %e, "undecodable block kept as unsupported");
            NotionBlock::Unsupported.into_content_block()
        }
    }
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============ Wire types ============

#[derive(Serialize)]
struct QueryRequest<'a> {
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct Listing<T> {
    results: Vec<T>,
    #[serde(default, deserialize_with = "null_as_default")]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct Page {
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    properties: BTreeMap<String, Value>,
}

impl Page {
    fn into_record(self) -> RawRecord {
        let id = self.id;
        let properties = self
            .properties
            .into_iter()
            .map(|(name, raw)| {
                let value = match serde_json::from_value::<NotionProperty>(raw) {
                    Ok(prop) => prop.into_value(),
                    Err(e) => {
                        debug!(
                            record_id = %id,
                            property = %name,
                            error = %e,
                            "undecodable property"
                        );
                        PropertyValue::Other
                    }
                };
                (name, value)
            })
            .collect();
        RawRecord { id, properties }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NotionProperty {
    Title {
        #[serde(default, deserialize_with = "null_as_default")]
        title: Vec<RichText>,
    },
    RichText {
        #[serde(default, deserialize_with = "null_as_default")]
        rich_text: Vec<RichText>,
    },
    MultiSelect {
        #[serde(default, deserialize_with = "null_as_default")]
        multi_select: Vec<SelectOption>,
    },
    Select {
        #[serde(default, deserialize_with = "null_as_default")]
        select: Option<SelectOption>,
    },
    #[serde(other)]
    Unsupported,
}

impl NotionProperty {
    fn into_value(self) -> PropertyValue {
        match self {
            NotionProperty::Title { title } => PropertyValue::Title(plain_text(&title)),
            NotionProperty::RichText { rich_text } => {
                PropertyValue::RichText(plain_text(&rich_text))
            }
            NotionProperty::MultiSelect { multi_select } => {
                PropertyValue::MultiSelect(multi_select.into_iter().map(|o| o.name).collect())
            }
            NotionProperty::Select { select } => PropertyValue::Select(select.map(|o| o.name)),
            NotionProperty::Unsupported => PropertyValue::Other,
        }
    }
}

#[derive(Deserialize)]
struct RichText {
    #[serde(default, deserialize_with = "null_as_default")]
    plain_text: String,
}

#[derive(Deserialize)]
struct SelectOption {
    name: String,
}

#[derive(Deserialize, Default)]
struct TextPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    rich_text: Vec<RichText>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NotionBlock {
    Paragraph {
        paragraph: TextPayload,
    },
    #[serde(rename = "heading_1")]
    Heading1 {
        heading_1: TextPayload,
    },
    #[serde(rename = "heading_2")]
    Heading2 {
        heading_2: TextPayload,
    },
    #[serde(rename = "heading_3")]
    Heading3 {
        heading_3: TextPayload,
    },
    BulletedListItem {
        bulleted_list_item: TextPayload,
    },
    NumberedListItem {
        numbered_list_item: TextPayload,
    },
    ToDo {
        to_do: TextPayload,
    },
    Toggle {
        toggle: TextPayload,
    },
    Quote {
        quote: TextPayload,
    },
    Callout {
        callout: TextPayload,
    },
    Code {
        code: TextPayload,
    },
    #[serde(other)]
    Unsupported,
}

impl NotionBlock {
    fn into_content_block(self) -> ContentBlock {
        let (kind, payload) = match self {
            NotionBlock::Paragraph { paragraph } => (BlockKind::Paragraph, paragraph),
            NotionBlock::Heading1 { heading_1 } => (BlockKind::Heading, heading_1),
            NotionBlock::Heading2 { heading_2 } => (BlockKind::Heading, heading_2),
            NotionBlock::Heading3 { heading_3 } => (BlockKind::Heading, heading_3),
            NotionBlock::BulletedListItem { bulleted_list_item } => {
                (BlockKind::ListItem, bulleted_list_item)
            }
            NotionBlock::NumberedListItem { numbered_list_item } => {
                (BlockKind::ListItem, numbered_list_item)
            }
            NotionBlock::ToDo { to_do } => (BlockKind::ToDo, to_do),
            NotionBlock::Toggle { toggle } => (BlockKind::Toggle, toggle),
            NotionBlock::Quote { quote } => (BlockKind::Quote, quote),
            NotionBlock::Callout { callout } => (BlockKind::Callout, callout),
            NotionBlock::Code { code } => (BlockKind::Code, code),
            NotionBlock::Unsupported => (BlockKind::Unsupported, TextPayload::default()),
        };
        ContentBlock {
            kind,
            text: plain_text(&payload.rich_text),
        }
    }
}

fn plain_text(spans: &[RichText]) -> String {
    spans.iter().map(|s| s.plain_text.as_str()).collect()
}
