// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `RingBar` Core
//!
//! Core types and models for the `RingBar` application.
//!
//! This crate provides the foundational types used across all other
//! `RingBar` crates:
//!
//! - [`UsageSnapshot`] - The canonical usage record (session + weekly quotas)
//! - [`ModelWeekly`] - Optional per-model weekly quota
//! - [`SnapshotSource`] / [`SnapshotError`] - Provenance and error tagging
//! - [`Settings`] / [`SettingsPatch`] - Merge-updated user preferences
//! - [`ColorBand`] / [`BandColor`] - Percentage-to-color mapping for the rings

pub mod error;
pub mod models;

pub use error::CoreError;

pub use models::{
    BandColor, ColorBand, ModelWeekly, Settings, SettingsPatch, SnapshotError, SnapshotSource,
    UsageSnapshot, band_color_for, clamp_percent, default_color_bands, validate_bands,
};
