// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `RingBar` App
//!
//! The application layer: dual-ring icon rendering, the indicator state
//! machine with its 30 fps frame loop, the background refresh scheduler,
//! and the mpsc event service platform glue talks to.

pub mod animation;
pub mod icon;
pub mod scheduler;
pub mod service;

pub use animation::{AnimationController, IconSink, IndicatorState};
pub use icon::{ICON_SIZE, IconRenderer, RenderedIcon};
pub use scheduler::RefreshScheduler;
pub use service::{AppEvent, ChannelScrapeDelegate, EventService};
