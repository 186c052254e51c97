//! Fetch context: the owned state passed to every strategy.
//!
//! The context replaces ambient module-level state with one explicit object
//! created at process start. It bundles the HTTP client, endpoint
//! configuration, the organization-identity port, and the optional scrape
//! delegate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ringbar_core::UsageSnapshot;

use crate::scrape::ScrapeDelegate;

/// Default base URL for the remote quota service.
pub const DEFAULT_BASE_URL: &str = "https://claude.ai";

/// Default deadline for the passive-scrape round trip.
pub const DEFAULT_SCRAPE_DEADLINE: Duration = Duration::from_secs(15);

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Storage Ports
// ============================================================================

/// Port for the persisted organization identity.
///
/// Discovery writes through this once an id is extracted; the direct API
/// strategy reads through it on every attempt.
#[async_trait]
pub trait IdentityKeeper: Send + Sync {
    /// Returns the current organization id, if known.
    async fn org_id(&self) -> Option<String>;

    /// Persists a discovered organization id.
    async fn set_org_id(&self, id: &str);
}

/// Port for the cached snapshot.
///
/// Single-writer discipline: only the chain calls [`SnapshotStore::replace`];
/// every other consumer is read-only.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the most recent snapshot, if any.
    async fn current(&self) -> Option<UsageSnapshot>;

    /// Replaces the snapshot wholesale, as one atomic write.
    async fn replace(&self, snapshot: UsageSnapshot);
}

// ============================================================================
// Fetch Context
// ============================================================================

/// Context provided to acquisition strategies.
#[derive(Clone)]
pub struct FetchContext {
    /// Shared HTTP client.
    pub http: reqwest::Client,
    /// Base URL of the remote quota service.
    pub base_url: String,
    /// Ambient session cookie header, if configured.
    pub session_cookie: Option<String>,
    /// Persisted organization identity.
    pub identity: Arc<dyn IdentityKeeper>,
    /// Passive-scrape collaborator, if wired up.
    pub scrape: Option<Arc<dyn ScrapeDelegate>>,
    /// Deadline for the scrape round trip.
    pub scrape_deadline: Duration,
}

impl FetchContext {
    /// Creates a builder.
    pub fn builder(identity: Arc<dyn IdentityKeeper>) -> FetchContextBuilder {
        FetchContextBuilder::new(identity)
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("base_url", &self.base_url)
            .field("scrape_deadline", &self.scrape_deadline)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`FetchContext`].
pub struct FetchContextBuilder {
    base_url: String,
    session_cookie: Option<String>,
    identity: Arc<dyn IdentityKeeper>,
    scrape: Option<Arc<dyn ScrapeDelegate>>,
    scrape_deadline: Duration,
    http_timeout: Duration,
}

impl FetchContextBuilder {
    /// Creates a new builder with the identity port (always required).
    pub fn new(identity: Arc<dyn IdentityKeeper>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_cookie: None,
            identity,
            scrape: None,
            scrape_deadline: DEFAULT_SCRAPE_DEADLINE,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Sets the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the ambient session cookie header.
    pub fn session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Wires up the scrape collaborator.
    pub fn scrape_delegate(mut self, delegate: Arc<dyn ScrapeDelegate>) -> Self {
        self.scrape = Some(delegate);
        self
    }

    /// Sets the scrape round-trip deadline.
    pub fn scrape_deadline(mut self, deadline: Duration) -> Self {
        self.scrape_deadline = deadline;
        self
    }

    /// Sets the HTTP request timeout.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builds the context.
    pub fn build(self) -> FetchContext {
        let http = reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .unwrap_or_default();

        FetchContext {
            http,
            base_url: self.base_url,
            session_cookie: self.session_cookie,
            identity: self.identity,
            scrape: self.scrape,
            scrape_deadline: self.scrape_deadline,
        }
    }
}

// ============================================================================
// In-Memory Ports (tests and standalone use)
// ============================================================================

/// In-memory identity keeper.
#[derive(Default)]
pub struct MemoryIdentity {
    org_id: tokio::sync::RwLock<Option<String>>,
}

impl MemoryIdentity {
    /// Creates an empty keeper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a keeper pre-seeded with an id.
    pub fn with_org_id(id: impl Into<String>) -> Self {
        Self {
            org_id: tokio::sync::RwLock::new(Some(id.into())),
        }
    }
}

#[async_trait]
impl IdentityKeeper for MemoryIdentity {
    async fn org_id(&self) -> Option<String> {
        self.org_id.read().await.clone()
    }

    async fn set_org_id(&self, id: &str) {
        *self.org_id.write().await = Some(id.to_string());
    }
}

/// In-memory snapshot store.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshot: tokio::sync::RwLock<Option<UsageSnapshot>>,
    writes: std::sync::atomic::AtomicUsize,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of replacements performed.
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn current(&self) -> Option<UsageSnapshot> {
        self.snapshot.read().await.clone()
    }

    async fn replace(&self, snapshot: UsageSnapshot) {
        *self.snapshot.write().await = Some(snapshot);
        self.writes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
