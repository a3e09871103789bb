//! Producer side of the prefetch engine.
//!
//! The worker renders one frame at a time around a predicted focus point and
//! offers it through the one-slot frame channel. While the slot is occupied
//! it parks on the doorbell; a direction change observed before handoff
//! throws the frame away and starts over.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, select};
use renderer::{FailureThrottle, PixelBuffer, TileSource, render_tiles};
use tracing::{debug, trace};
use view::{PixelPoint, bounds_for_origin};

use crate::control::{FrameProjection, StatsCounters};
use crate::frame::RenderedFrame;
use crate::{PrefetchScene, Shared};

/// Buffers alive at once: one being rendered, one being shown.
pub(crate) const MAX_FRAME_BUFFERS: usize = 2;

pub(crate) struct Worker {
    pub(crate) shared: Arc<Shared>,
    pub(crate) scene: PrefetchScene,
    pub(crate) projection: FrameProjection,
    /// Expected duration of the first render.
    pub(crate) initial_render: Duration,
    pub(crate) frame_tx: Sender<RenderedFrame>,
    pub(crate) doorbell_rx: Receiver<()>,
    pub(crate) recycle_rx: Receiver<PixelBuffer>,
    pub(crate) stop_rx: Receiver<()>,
}

enum Handoff {
    Delivered,
    Discarded(PixelBuffer),
    Stopped,
}

impl Worker {
    pub(crate) fn run(self) {
        debug!("prefetch worker started");
        let mut spare: Option<PixelBuffer> = None;
        let mut allocated = 0_usize;
        let mut generation = 0_u64;
        let mut last_render = self.initial_render;
        let mut throttle = FailureThrottle::default();

        while !self.shared.control.is_aborted() {
            let (epoch, direction) = self.shared.control.steering();
            let Some(direction) = direction else {
                if !self.park() {
                    break;
                }
                continue;
            };
            let Some(mut buffer) = self.acquire_buffer(&mut spare, &mut allocated) else {
                break;
            };

            let started = Instant::now();
            let snapshot = **self.shared.focus.load();
            let focus = self
                .projection
                .predict(&snapshot, Some(direction), started + last_render);
            generation += 1;
            buffer.set_generation(generation);
            self.render(&mut buffer, focus, &mut throttle);
            last_render = started.elapsed();
            StatsCounters::bump(&self.shared.counters.rendered);
            trace!(generation, ?focus, ?direction, "prefetch frame rendered");

            let frame = RenderedFrame {
                buffer,
                focus,
                direction: Some(direction),
                epoch,
            };
            match self.hand_off(frame) {
                Handoff::Delivered => {}
                Handoff::Discarded(buffer) => {
                    StatsCounters::bump(&self.shared.counters.discarded);
                    debug!(generation, "prefetch frame discarded after direction change");
                    spare = Some(buffer);
                }
                Handoff::Stopped => break,
            }
        }
        debug!("prefetch worker exited");
    }

    fn render(&self, buffer: &mut PixelBuffer, focus: PixelPoint, throttle: &mut FailureThrottle) {
        let origin = self.projection.buffer_origin(focus);
        let bounds = bounds_for_origin(
            origin,
            buffer.size(),
            self.projection.geometry,
            self.projection.map,
        );
        let clip = buffer.bounds();
        let Some(bounds) = bounds else {
            buffer.fill(renderer::BACKGROUND);
            return;
        };
        let source = TileSource {
            map: self.scene.map.as_ref(),
            renderer: self.scene.renderer.as_ref(),
            options: **self.scene.options.load(),
        };
        render_tiles(buffer, &bounds, clip, &source, throttle);
    }

    /// Blocks until the doorbell rings; `false` once the engine stops.
    fn park(&self) -> bool {
        select! {
            recv(self.doorbell_rx) -> rung => rung.is_ok() && !self.shared.control.is_aborted(),
            recv(self.stop_rx) -> _ => false,
        }
    }

    fn acquire_buffer(
        &self,
        spare: &mut Option<PixelBuffer>,
        allocated: &mut usize,
    ) -> Option<PixelBuffer> {
        if let Some(buffer) = spare.take() {
            return Some(buffer);
        }
        if let Ok(buffer) = self.recycle_rx.try_recv() {
            return Some(buffer);
        }
        if *allocated < MAX_FRAME_BUFFERS {
            *allocated += 1;
            debug!(allocated = *allocated, "prefetch buffer allocated");
            return Some(PixelBuffer::new(self.projection.buffer_size()));
        }
        select! {
            recv(self.recycle_rx) -> buffer => buffer.ok(),
            recv(self.stop_rx) -> _ => None,
        }
    }

    fn hand_off(&self, mut frame: RenderedFrame) -> Handoff {
        loop {
            if self.shared.control.is_aborted() {
                return Handoff::Stopped;
            }
            if self.shared.control.direction_epoch() != frame.epoch {
                return Handoff::Discarded(frame.buffer);
            }
            match self.frame_tx.try_send(frame) {
                Ok(()) => return Handoff::Delivered,
                Err(TrySendError::Disconnected(_)) => return Handoff::Stopped,
                Err(TrySendError::Full(returned)) => frame = returned,
            }
            if !self.park() {
                return Handoff::Stopped;
            }
        }
    }
}
