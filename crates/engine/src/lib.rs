//! Frame prefetch engine.
//!
//! While the view scrolls, a background worker keeps rendering frames around
//! the focus point it expects the view to have by the time the frame is shown.
//! Frames are rendered into buffers larger than the viewport so the consumer
//! can crop them to the exact position at display time.
//!
//! Threading model:
//! - `control`: atomics for direction, direction epoch and abort, plus the
//!   focus snapshot published through `ArcSwap`.
//! - `worker`: the single producer thread.
//! - `frame`: frame ownership. Buffers move through channels and come back
//!   when a [`FrameView`] is dropped; no buffer is ever shared.

mod control;
mod frame;
mod worker;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, select};
use model::{Direction, MapGrid};
use renderer::{PixelBuffer, RenderOptions, TileRenderer};
use tracing::{debug, error, warn};
use view::{PixelPoint, PixelSize, TileGeometry, clamp_focus_point};

use control::{FrameProjection, ScrollControl, StatsCounters};
use frame::RenderedFrame;
use worker::{MAX_FRAME_BUFFERS, Worker};

pub use control::{EngineStats, FocusSnapshot};
pub use frame::FrameView;

pub const DEFAULT_PIXELS_PER_MILLI: f32 = 0.5;
pub const DEFAULT_LOOKAHEAD_TILES: u32 = 2;
pub const MAX_LOOKAHEAD_TILES: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefetchConfig {
    /// Scroll speed used to extrapolate the focus point.
    pub pixels_per_milli: f32,
    /// Extra tile widths rendered on every side of the viewport, between 1
    /// and [`MAX_LOOKAHEAD_TILES`].
    pub lookahead_tiles: u32,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            pixels_per_milli: DEFAULT_PIXELS_PER_MILLI,
            lookahead_tiles: DEFAULT_LOOKAHEAD_TILES,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("prefetch viewport has no area")]
    EmptyViewport,
    #[error("scroll speed must be finite and non-negative, got {0}")]
    InvalidSpeed(f32),
    #[error("lookahead must be between 1 and {max} tiles, got {0}", max = MAX_LOOKAHEAD_TILES)]
    InvalidLookahead(u32),
    #[error("prefetch buffer for {viewport:?} with {lookahead_tiles} lookahead tiles is too large")]
    BufferTooLarge {
        viewport: PixelSize,
        lookahead_tiles: u32,
    },
    #[error("prefetch engine already stopped")]
    Stopped,
    #[error("failed to spawn prefetch worker")]
    Spawn(#[source] std::io::Error),
}

/// Everything the worker renders from. Captured once per engine; a change
/// of viewport size or zoom means a new engine.
#[derive(Clone)]
pub struct PrefetchScene {
    pub map: Arc<dyn MapGrid>,
    pub renderer: Arc<dyn TileRenderer>,
    pub options: Arc<ArcSwap<RenderOptions>>,
    pub geometry: TileGeometry,
    pub viewport: PixelSize,
    /// Map pixel at the viewport centre when scrolling starts.
    pub focus: PixelPoint,
    /// How long a synchronous render of the viewport took; seeds the
    /// prediction of the first frame.
    pub render_estimate: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Scrolling,
    Stopped,
}

pub(crate) struct Shared {
    pub(crate) control: ScrollControl,
    pub(crate) focus: ArcSwap<FocusSnapshot>,
    pub(crate) counters: StatsCounters,
}

pub struct PrefetchEngine {
    shared: Arc<Shared>,
    projection: FrameProjection,
    frame_rx: Receiver<RenderedFrame>,
    doorbell_tx: Sender<()>,
    recycle_tx: Sender<PixelBuffer>,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    pending_worker: Mutex<Option<Worker>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl PrefetchEngine {
    /// Creates an idle engine; the worker thread starts with the first
    /// scroll direction.
    pub fn new(scene: PrefetchScene, config: PrefetchConfig) -> Result<Self, EngineError> {
        let map = scene.map.size();
        let projection = FrameProjection::new(scene.viewport, scene.geometry, map, config)?;
        let initial_render = scale_by_area(
            scene.render_estimate,
            projection.buffer_size(),
            projection.viewport,
        );
        let focus = clamp_focus_point(scene.focus, scene.viewport, scene.geometry, map);
        let shared = Arc::new(Shared {
            control: ScrollControl::default(),
            focus: ArcSwap::from_pointee(FocusSnapshot {
                point: focus,
                delivered_at: Instant::now(),
            }),
            counters: StatsCounters::default(),
        });

        let (frame_tx, frame_rx) = bounded(1);
        let (doorbell_tx, doorbell_rx) = bounded(1);
        let (recycle_tx, recycle_rx) = bounded(MAX_FRAME_BUFFERS);
        let (stop_tx, stop_rx) = bounded(1);
        let worker = Worker {
            shared: Arc::clone(&shared),
            scene,
            projection,
            initial_render,
            frame_tx,
            doorbell_rx,
            recycle_rx,
            stop_rx: stop_rx.clone(),
        };
        debug!(
            width = projection.viewport.width,
            height = projection.viewport.height,
            margin = projection.margin,
            "prefetch engine created"
        );
        Ok(Self {
            shared,
            projection,
            frame_rx,
            doorbell_tx,
            recycle_tx,
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            pending_worker: Mutex::new(Some(worker)),
            worker_handle: Mutex::new(None),
        })
    }

    pub fn state(&self) -> EngineState {
        if self.shared.control.is_aborted() {
            return EngineState::Stopped;
        }
        let started = self
            .worker_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if started {
            EngineState::Scrolling
        } else {
            EngineState::Idle
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.shared.control.direction()
    }

    /// Steers the scroll. Starts the worker on the first direction; `None`
    /// parks it.
    ///
    /// The focus snapshot is re-anchored at the current predicted position so
    /// the scroll path stays continuous across direction changes.
    pub fn set_direction(&self, direction: Option<Direction>) -> Result<(), EngineError> {
        if self.shared.control.is_aborted() {
            return Err(EngineError::Stopped);
        }
        let previous = self.shared.control.direction();
        if previous != direction {
            let now = Instant::now();
            let current = **self.shared.focus.load();
            let point = self.projection.predict(&current, previous, now);
            self.shared.focus.store(Arc::new(FocusSnapshot {
                point,
                delivered_at: now,
            }));
            self.shared.control.set_direction(direction);
            debug!(?previous, ?direction, "scroll direction changed");
            self.ring_doorbell();
        }
        if direction.is_some() {
            self.ensure_worker()?;
        }
        Ok(())
    }

    fn ensure_worker(&self) -> Result<(), EngineError> {
        let Some(worker) = self
            .pending_worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };
        let handle = std::thread::Builder::new()
            .name("map-prefetch".to_string())
            .spawn(move || worker.run())
            .map_err(EngineError::Spawn)?;
        *self
            .worker_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Blocks until a usable frame arrives; `None` once the engine stops.
    ///
    /// A frame whose rendered focus is too far from the focus wanted now is
    /// handed back to the producer and the wait continues.
    pub fn get_frame(&self) -> Option<FrameView> {
        loop {
            if self.shared.control.is_aborted() {
                return None;
            }
            let received = select! {
                recv(self.frame_rx) -> frame => frame.ok(),
                recv(self.stop_rx) -> _ => None,
            };
            let Some(frame) = received else {
                return None;
            };
            if self.shared.control.is_aborted() {
                return None;
            }
            if let Some(view) = self.present(frame) {
                return Some(view);
            }
        }
    }

    /// Takes the pending frame without waiting.
    ///
    /// `Ok(None)` means no usable frame is ready: either none has been
    /// rendered yet or the pending one was too stale and went back to the
    /// producer. The caller draws the view itself meanwhile.
    pub fn try_get_frame(&self) -> Result<Option<FrameView>, EngineError> {
        if self.shared.control.is_aborted() {
            return Err(EngineError::Stopped);
        }
        match self.frame_rx.try_recv() {
            Ok(frame) => Ok(self.present(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(EngineError::Stopped),
        }
    }

    /// Crops `frame` to the focus wanted now, or recycles it when the crop
    /// would leave the buffer.
    fn present(&self, frame: RenderedFrame) -> Option<FrameView> {
        let now = Instant::now();
        let snapshot = **self.shared.focus.load();
        let desired = self
            .projection
            .predict(&snapshot, self.shared.control.direction(), now);
        let Some(crop_origin) = self.projection.crop_origin(frame.focus, desired) else {
            StatsCounters::bump(&self.shared.counters.rejected);
            let generation = frame.buffer.generation();
            if self.shared.control.record_rejection(true) {
                StatsCounters::bump(&self.shared.counters.starved);
                warn!(
                    generation,
                    rendered = ?frame.focus,
                    ?desired,
                    "prefetch starvation: consecutive frames too stale to display"
                );
            } else {
                debug!(generation, "stale prefetch frame rejected");
            }
            let _ = self.recycle_tx.try_send(frame.buffer);
            self.ring_doorbell();
            return None;
        };
        self.shared.focus.store(Arc::new(FocusSnapshot {
            point: desired,
            delivered_at: now,
        }));
        self.shared.control.record_rejection(false);
        StatsCounters::bump(&self.shared.counters.delivered);
        self.ring_doorbell();
        Some(FrameView::new(
            frame,
            crop_origin,
            self.projection.viewport,
            desired,
            self.recycle_tx.clone(),
        ))
    }

    /// Stops the worker and releases every waiter. Safe to call repeatedly
    /// and from any thread.
    pub fn stop(&self) {
        if self.shared.control.abort() {
            debug!("prefetch engine stopping");
        }
        // Dropping the only stop sender disconnects every `stop_rx` select arm.
        self.stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.pending_worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.ring_doorbell();
    }

    /// Focus point of the last delivered frame, or of the last direction change.
    pub fn focus_point(&self) -> PixelPoint {
        self.shared.focus.load().point
    }

    /// Focus point the view should have now, extrapolated from the last
    /// delivery along the current direction.
    pub fn desired_focus(&self) -> PixelPoint {
        let snapshot = **self.shared.focus.load();
        self.projection
            .predict(&snapshot, self.shared.control.direction(), Instant::now())
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.counters.snapshot()
    }

    pub fn viewport(&self) -> PixelSize {
        self.projection.viewport
    }

    fn ring_doorbell(&self) {
        match self.doorbell_tx.try_send(()) {
            Ok(()) => {}
            Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {}
        }
    }
}

/// Scales a viewport render time to a buffer of a different area.
fn scale_by_area(duration: Duration, buffer: PixelSize, viewport: PixelSize) -> Duration {
    let area = |size: PixelSize| f64::from(size.width) * f64::from(size.height);
    let scaled = duration.as_secs_f64() * area(buffer) / area(viewport);
    Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
}

impl Drop for PrefetchEngine {
    fn drop(&mut self) {
        self.stop();
        let handle = self
            .worker_handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("prefetch worker panicked");
            }
        }
    }
}
