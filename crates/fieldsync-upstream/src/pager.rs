// crates/fieldsync-upstream/src/pager.rs
// ============================================================================
// Module: Upstream Cursor Pager
// Description: Drives paginated GET requests until upstream exhaustion.
// Purpose: Yield upstream pages in order with fail-closed termination rules.
// Dependencies: fieldsync-core, reqwest, serde, serde_json, url
// ============================================================================

//! ## Overview
//! [`CursorPager`] issues `GET <base>/<resource>?limit=<n>[&cursor=<token>]`
//! requests with bearer-token and API-key headers. Termination is checked
//! after every page, in order: the processed count reaching the upstream's
//! self-reported total, an empty page while a cursor is still present
//! (anomalous, flagged to observers, treated as completion), or an absent
//! cursor. The upstream's total is a hint, never trusted as the only stop:
//! a hard page ceiling bounds pathological upstreams. Non-success statuses
//! abort pagination; nothing is retried silently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use fieldsync_core::NoopObserver;
use fieldsync_core::Page;
use fieldsync_core::PageSource;
use fieldsync_core::PageStream;
use fieldsync_core::ProcessName;
use fieldsync_core::SyncEvent;
use fieldsync_core::SyncObserver;
use fieldsync_core::UpstreamError;
use fieldsync_core::UpstreamRecord;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the upstream API key.
const API_KEY_HEADER: &str = "x-api-key";
/// Default page size requested from the upstream.
const DEFAULT_PAGE_SIZE: u32 = 200;
/// Default per-request timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default hard ceiling on pages per pagination pass.
const DEFAULT_MAX_PAGES: u64 = 10_000;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the upstream pager.
///
/// # Invariants
/// - `base_url` must parse as an absolute URL.
/// - `page_size` is the `limit` query parameter; must be greater than zero.
/// - `max_pages` bounds every pagination pass; breaching it fails the pass.
/// - `timeout_ms` applies to each page request's full lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpstreamConfig {
    /// Absolute base URL of the upstream API.
    pub base_url: String,
    /// Resource path appended to the base URL.
    pub resource: String,
    /// Bearer token sent in the Authorization header.
    pub auth_token: String,
    /// API key sent in the `x-api-key` header; empty disables the header.
    #[serde(default)]
    pub api_key: String,
    /// Page size requested via the `limit` parameter.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Hard ceiling on pages fetched in one pass.
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,
    /// User agent string for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Returns the default page size.
const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Returns the default per-request timeout.
const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Returns the default page ceiling.
const fn default_max_pages() -> u64 {
    DEFAULT_MAX_PAGES
}

/// Returns the default user agent.
fn default_user_agent() -> String {
    "fieldsync/0.1".to_string()
}

// ============================================================================
// SECTION: Wire Format
// ============================================================================

/// Upstream page envelope as returned by the API.
///
/// # Invariants
/// - `total_count` is self-reported and may disagree with observed entries.
#[derive(Debug, Deserialize)]
struct PageEnvelope {
    /// Records carried by this page.
    #[serde(default, rename = "domainObjects")]
    domain_objects: Vec<Value>,
    /// Opaque cursor for the next page, absent or null at end of data.
    #[serde(default)]
    cursor: Option<String>,
    /// Upstream's self-reported total record count.
    #[serde(default, rename = "totalCount")]
    total_count: u64,
}

// ============================================================================
// SECTION: Pager
// ============================================================================

/// Cursor-driven pager over the upstream observation API.
///
/// # Invariants
/// - Redirects are not followed.
/// - Each [`CursorPager::open`] starts pagination from the beginning; a
///   pass is never restartable mid-stream.
pub struct CursorPager {
    /// Pipeline identity used for observer events.
    process: ProcessName,
    /// Pager configuration.
    config: UpstreamConfig,
    /// HTTP client used for page requests.
    client: Client,
    /// Event observer notified of pagination anomalies.
    observer: Arc<dyn SyncObserver>,
}

impl CursorPager {
    /// Creates a pager for the given pipeline and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] when the configuration is unusable or the
    /// HTTP client cannot be constructed.
    pub fn new(process: ProcessName, config: UpstreamConfig) -> Result<Self, UpstreamError> {
        if config.page_size == 0 {
            return Err(UpstreamError::Client("page_size must be greater than zero".to_string()));
        }
        if config.max_pages == 0 {
            return Err(UpstreamError::Client("max_pages must be greater than zero".to_string()));
        }
        Url::parse(&config.base_url)
            .map_err(|err| UpstreamError::Client(format!("invalid base_url: {err}")))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|err| UpstreamError::Client(format!("http client build failed: {err}")))?;
        Ok(Self {
            process,
            config,
            client,
            observer: Arc::new(NoopObserver),
        })
    }

    /// Replaces the event observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Builds the page request URL for the given cursor.
    fn page_url(&self, cursor: Option<&str>) -> Result<Url, UpstreamError> {
        let base = Url::parse(&self.config.base_url)
            .map_err(|err| UpstreamError::Client(format!("invalid base_url: {err}")))?;
        let mut url = base
            .join(&self.config.resource)
            .map_err(|err| UpstreamError::Client(format!("invalid resource path: {err}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("limit", &self.config.page_size.to_string());
            if let Some(cursor) = cursor {
                pairs.append_pair("cursor", cursor);
            }
        }
        Ok(url)
    }

    /// Fetches and decodes one page for the given cursor.
    fn fetch_page(&self, cursor: Option<&str>) -> Result<PageEnvelope, UpstreamError> {
        let url = self.page_url(cursor)?;
        let mut request = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.auth_token));
        if !self.config.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, self.config.api_key.clone());
        }
        let response =
            request.send().map_err(|err| UpstreamError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }
        response.json::<PageEnvelope>().map_err(|err| UpstreamError::Malformed(err.to_string()))
    }
}

impl PageSource for CursorPager {
    fn open(&self) -> Result<Box<dyn PageStream + '_>, UpstreamError> {
        Ok(Box::new(CursorStream {
            pager: self,
            cursor: None,
            processed: 0,
            pages_fetched: 0,
            done: false,
        }))
    }
}

// ============================================================================
// SECTION: Stream
// ============================================================================

/// One in-flight pagination pass.
///
/// # Invariants
/// - `cursor` always holds the token for the next request.
/// - Once `done` is set, the stream only yields `Ok(None)`.
struct CursorStream<'a> {
    /// Owning pager supplying the client and configuration.
    pager: &'a CursorPager,
    /// Cursor for the next request; `None` before the first page.
    cursor: Option<String>,
    /// Records processed so far across pages.
    processed: u64,
    /// Pages fetched so far, checked against the ceiling.
    pages_fetched: u64,
    /// Set when a termination condition has been reached.
    done: bool,
}

impl PageStream for CursorStream<'_> {
    fn next_page(&mut self) -> Result<Option<Page>, UpstreamError> {
        if self.done {
            return Ok(None);
        }
        if self.pages_fetched >= self.pager.config.max_pages {
            return Err(UpstreamError::PageLimit {
                max_pages: self.pager.config.max_pages,
            });
        }
        let envelope = self.pager.fetch_page(self.cursor.as_deref())?;
        let mut entries = Vec::with_capacity(envelope.domain_objects.len());
        for value in envelope.domain_objects {
            entries.push(UpstreamRecord::from_value(value).map_err(UpstreamError::Malformed)?);
        }
        let batch_len = u64::try_from(entries.len()).unwrap_or(u64::MAX);
        self.processed = self.processed.saturating_add(batch_len);
        self.pages_fetched = self.pages_fetched.saturating_add(1);

        // Termination conditions, checked after each page, in order.
        let next_cursor = envelope.cursor.filter(|token| !token.is_empty());
        if self.processed >= envelope.total_count {
            self.done = true;
        } else if entries.is_empty() && next_cursor.is_some() {
            // Anomalous: upstream handed out a cursor but no data. Complete
            // with what was loaded rather than spinning on empty pages.
            self.pager.observer.record(&SyncEvent::EarlyTermination {
                process: self.pager.process,
                processed: self.processed,
                total_count: envelope.total_count,
            });
            self.done = true;
        } else if next_cursor.is_none() {
            self.done = true;
        }
        self.cursor = next_cursor;
        Ok(Some(Page {
            entries,
            cursor: self.cursor.clone(),
            total_count: envelope.total_count,
        }))
    }
}
