//! Indicator state machine and frame loop.
//!
//! The controller owns the icon's three states:
//!
//! - `Idle`: one static draw of the last committed percentages, no timer
//! - `Loading`: indeterminate sweep while a fetch attempt is in flight
//! - `Warning`: counter-rotating pulse when any quota reaches the warning
//!   threshold
//!
//! The 30 fps frame task runs only while not Idle. Frames are pushed
//! through an [`IconSink`]; the platform tray consumes them elsewhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use ringbar_core::UsageSnapshot;

use crate::icon::{IconRenderer, RenderedIcon};

// ============================================================================
// Constants
// ============================================================================

/// Frame interval for 30 fps.
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Loading sweep speed: a full revolution per second.
const LOADING_DEG_PER_FRAME: f32 = 12.0;

/// Warning counter-rotation speed.
const WARNING_DEG_PER_FRAME: f32 = 4.0;

// ============================================================================
// State & Sink
// ============================================================================

/// Indicator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    /// Static draw of the last known percentages.
    Idle,
    /// A fetch attempt is in flight.
    Loading,
    /// A quota reached the warning threshold.
    Warning,
}

/// Receiver for rendered frames.
pub trait IconSink: Send + Sync {
    /// Consumes one rendered frame.
    fn push(&self, icon: RenderedIcon);
}

// ============================================================================
// Controller
// ============================================================================

struct Shared {
    renderer: IconRenderer,
    sink: Arc<dyn IconSink>,
    state: Mutex<IndicatorState>,
    snapshot: Mutex<Option<UsageSnapshot>>,
    // Cleared by stop() before the task is aborted; the frame task rechecks
    // it under draw_gate so no frame lands after stop() returns.
    animating: AtomicBool,
    // Held around every push and around stop()'s final draw. A frame that
    // passed the flag check cannot slip in once stop() holds the gate.
    draw_gate: Mutex<()>,
}

/// Drives the indicator state machine and the frame task.
pub struct AnimationController {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AnimationController {
    /// Creates a controller pushing frames into `sink`.
    pub fn new(renderer: IconRenderer, sink: Arc<dyn IconSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                renderer,
                sink,
                state: Mutex::new(IndicatorState::Idle),
                snapshot: Mutex::new(None),
                animating: AtomicBool::new(false),
                draw_gate: Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Current indicator state.
    pub fn state(&self) -> IndicatorState {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A fetch attempt started: enter Loading and run the frame task.
    pub fn fetch_started(&self) {
        self.set_state(IndicatorState::Loading);
        self.ensure_frame_task();
        debug!("Indicator entered Loading");
    }

    /// A fetch attempt settled with this snapshot.
    ///
    /// Errors and below-threshold results return to Idle with one static
    /// draw; a success at or above `warn_threshold` enters Warning.
    pub fn settled(&self, snapshot: UsageSnapshot, warn_threshold: u8) {
        let warn = !snapshot.error.is_error()
            && snapshot.max_percent() >= f64::from(warn_threshold);

        *self
            .shared
            .snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(snapshot);

        if warn {
            self.set_state(IndicatorState::Warning);
            self.ensure_frame_task();
            debug!("Indicator entered Warning");
        } else {
            self.stop();
        }
    }

    /// Returns to Idle: cancels the frame task and issues exactly one
    /// final static draw of the last committed percentages.
    pub fn stop(&self) {
        self.shared.animating.store(false, Ordering::SeqCst);
        let _gate = self
            .shared
            .draw_gate
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        self.set_state(IndicatorState::Idle);

        let snapshot = self
            .shared
            .snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        self.shared
            .sink
            .push(self.shared.renderer.render_static(snapshot.as_ref()));
        debug!("Indicator entered Idle");
    }

    fn set_state(&self, state: IndicatorState) {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn ensure_frame_task(&self) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        self.shared.animating.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(frame_loop(shared)));
    }
}

/// The 30 fps frame task. Runs until aborted or the state returns to Idle.
async fn frame_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut frame: u32 = 0;

    loop {
        ticker.tick().await;
        if !shared.animating.load(Ordering::SeqCst) {
            return;
        }

        let state = *shared.state.lock().unwrap_or_else(|e| e.into_inner());
        let rendered = match state {
            IndicatorState::Idle => return,
            IndicatorState::Loading => {
                let phase = frame as f32 * LOADING_DEG_PER_FRAME;
                shared.renderer.render_loading(phase % 360.0)
            }
            IndicatorState::Warning => {
                let snapshot = shared
                    .snapshot
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone()
                    .unwrap_or_default();
                let rotation = (frame as f32 * WARNING_DEG_PER_FRAME) % 360.0;
                let pulse = ((frame as f32 * 0.21).sin() + 1.0) / 2.0;
                shared.renderer.render_warning(&snapshot, rotation, pulse)
            }
        };

        {
            let _gate = shared.draw_gate.lock().unwrap_or_else(|e| e.into_inner());
            if shared.animating.load(Ordering::SeqCst) {
                shared.sink.push(rendered);
            }
        }
        frame = frame.wrapping_add(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
