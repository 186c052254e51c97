// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `RingBar` Fetch
//!
//! The acquisition pipeline: an ordered chain of fallback strategies that
//! produces the canonical [`ringbar_core::UsageSnapshot`].
//!
//! Strategies, in order:
//! 1. Direct quota API (requires a known organization id)
//! 2. Identity discovery via bootstrap endpoints, then one API retry
//! 3. Passive scrape delegation to an external renderer (best effort)
//!
//! The chain consults the snapshot store for throttling, normalizes every
//! raw payload, writes the result back as one atomic replacement, and is
//! serialized by an in-flight lock so concurrent triggers share a single
//! network attempt.

pub mod api;
pub mod chain;
pub mod context;
pub mod discovery;
pub mod error;
pub mod scrape;
pub mod strategy;

pub use api::{ApiUsagePayload, QuotaApiClient};
pub use chain::{ChainOutcome, UsageChain};
pub use context::{
    FetchContext, FetchContextBuilder, IdentityKeeper, MemoryIdentity, MemorySnapshotStore,
    SnapshotStore,
};
pub use discovery::DiscoveryClient;
pub use error::FetchError;
pub use scrape::{BestEffortExtractor, ExtractionTier, ScrapeDelegate, ScrapedUsage};
pub use strategy::{QuotaStrategy, RawUsage, StrategyOutcome};
