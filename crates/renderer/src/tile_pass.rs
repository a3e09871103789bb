//! Per-tile render pass.
//!
//! Walks the visible tiles row by row, top to bottom and left to right, and
//! hands each one to the content renderer with a canvas whose origin is the
//! tile's bounding-box corner. A tile whose renderer fails is left
//! incomplete; the pass keeps going. Renderer panics are caught without
//! reaching the panic hook's output, so they are rate-limited like errors.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use model::{MapGrid, TilePos};
use tracing::error;
use view::{ViewportBounds, tile_to_pixel};

use crate::panic_hook::SilencedPanics;
use crate::{DirtyRect, PixelBuffer, RenderError, RenderOptions, TileCanvas, TileContext, TileRenderer};

/// Minimum spacing between two logged renderer failures.
pub const FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Rate limiter for renderer failure logging.
#[derive(Debug)]
pub struct FailureThrottle {
    interval: Duration,
    last_logged: Option<Instant>,
    suppressed: u64,
    total: u64,
}

impl Default for FailureThrottle {
    fn default() -> Self {
        Self::new(FAILURE_LOG_INTERVAL)
    }
}

impl FailureThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: None,
            suppressed: 0,
            total: 0,
        }
    }

    /// Records a failure; returns whether it was logged.
    pub fn record(&mut self, tile: TilePos, failure: &RenderError) -> bool {
        self.record_at(tile, failure, Instant::now())
    }

    fn record_at(&mut self, tile: TilePos, failure: &RenderError, now: Instant) -> bool {
        self.total += 1;
        let due = self
            .last_logged
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if !due {
            self.suppressed += 1;
            return false;
        }
        error!(
            x = tile.x,
            y = tile.y,
            suppressed = self.suppressed,
            %failure,
            "tile renderer failed"
        );
        self.last_logged = Some(now);
        self.suppressed = 0;
        true
    }

    pub fn total_failures(&self) -> u64 {
        self.total
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TilePassStats {
    pub tiles_rendered: u32,
    pub tiles_failed: u32,
}

/// Everything a pass needs besides the target buffer.
pub struct TileSource<'a> {
    pub map: &'a dyn MapGrid,
    pub renderer: &'a dyn TileRenderer,
    pub options: RenderOptions,
}

/// Renders every tile of `bounds` intersecting `clip` into `buffer`.
///
/// `bounds` must describe a viewport of the buffer's size; the clip region is
/// cleared to the background first.
pub fn render_tiles(
    buffer: &mut PixelBuffer,
    bounds: &ViewportBounds,
    clip: DirtyRect,
    source: &TileSource<'_>,
    throttle: &mut FailureThrottle,
) -> TilePassStats {
    let mut stats = TilePassStats::default();
    let Some(clip) = clip.intersection(&buffer.bounds()) else {
        return stats;
    };
    buffer.fill_rect(clip, crate::BACKGROUND);

    let silenced = SilencedPanics::enter();
    let geometry = bounds.geometry();
    for tile in bounds.tiles() {
        let origin = tile_to_pixel(tile, bounds);
        let tile_rect = DirtyRect::new(
            origin.x,
            origin.y,
            origin.x + geometry.width() as i32,
            origin.y + geometry.height() as i32,
        );
        if !tile_rect.intersects(&clip) {
            continue;
        }
        let context = TileContext {
            tile,
            explored: source.map.is_explored(tile),
            options: source.options,
            geometry,
        };
        let mut canvas = TileCanvas::new(buffer, origin, clip, geometry);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            source.renderer.render_tile(&mut canvas, &context)
        }))
        .unwrap_or_else(|payload| {
            Err(RenderError::from_panic(payload).at_location(silenced.take_location()))
        });
        match outcome {
            Ok(()) => stats.tiles_rendered += 1,
            Err(failure) => {
                stats.tiles_failed += 1;
                throttle.record(tile, &failure);
            }
        }
    }
    stats
}
