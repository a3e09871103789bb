//! Foreground display loop.
//!
//! While a scroll is active, frames come from the prefetch engine; when none
//! is ready the painter renders the scroll position itself instead of
//! waiting. Otherwise it keeps a persistent buffer and only re-renders what
//! has been invalidated since the last display.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use engine::{EngineError, EngineStats, PrefetchConfig, PrefetchEngine, PrefetchScene};
use model::{Direction, MapGrid, TilePos};
use renderer::{
    BACKGROUND, DirtyRect, FailureThrottle, PixelBuffer, RenderOptions, RepaintManager,
    RepaintPlan, TileRenderer, TileSource, render_tiles,
};
use tracing::{debug, error, warn};
use view::{MapViewport, PixelPoint, PixelSize, ViewError, bounds_for_origin};

use crate::config::{ConfigError, ViewerConfig};

/// What [`MapPainter::display_frame`] put on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOutcome {
    /// Nothing visible: no focus or an empty viewport.
    Blank,
    /// A frame delivered by the prefetch engine.
    Prefetched { generation: u64 },
    /// A synchronous render at the scroll position, used while the engine
    /// has no usable frame.
    Fallback,
    /// The cached buffer, unchanged.
    Cached,
    /// The cached buffer after re-rendering its dirty region.
    Partial(DirtyRect),
    /// A synchronous render of the whole viewport.
    Full,
}

impl DisplayOutcome {
    pub fn is_full_redraw(self) -> bool {
        matches!(self, DisplayOutcome::Full | DisplayOutcome::Fallback)
    }
}

pub struct MapPainter {
    map: Arc<dyn MapGrid>,
    renderer: Arc<dyn TileRenderer>,
    options: Arc<ArcSwap<RenderOptions>>,
    viewport: MapViewport,
    repaint: RepaintManager,
    throttle: FailureThrottle,
    prefetch: PrefetchConfig,
    engine: Option<PrefetchEngine>,
    /// Duration of the last synchronous full render.
    render_estimate: Duration,
    /// Map pixel at the viewport centre of the last frame shown while scrolling.
    scroll_focus: Option<PixelPoint>,
}

impl MapPainter {
    pub fn new(
        map: Arc<dyn MapGrid>,
        renderer: Arc<dyn TileRenderer>,
        config: &ViewerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut viewport = MapViewport::new(
            map.size(),
            config.tile_geometry()?,
            config.viewport_size(),
        );
        viewport.change_zoom(config.zoom)?;
        Ok(Self {
            map,
            renderer,
            options: Arc::new(ArcSwap::from_pointee(config.render_options())),
            viewport,
            repaint: RepaintManager::new(),
            throttle: FailureThrottle::default(),
            prefetch: config.prefetch_config(),
            engine: None,
            render_estimate: Duration::ZERO,
            scroll_focus: None,
        })
    }

    pub fn viewport(&self) -> &MapViewport {
        &self.viewport
    }

    pub fn scroll_direction(&self) -> Option<Direction> {
        self.engine.as_ref().and_then(PrefetchEngine::direction)
    }

    pub fn engine_stats(&self) -> Option<EngineStats> {
        self.engine.as_ref().map(PrefetchEngine::stats)
    }

    pub fn render_options(&self) -> RenderOptions {
        **self.options.load()
    }

    /// Publishes new drawing options. Takes effect with the next frame; the
    /// cached buffer is redrawn completely.
    pub fn set_render_options(&mut self, options: RenderOptions) {
        if self.render_options() == options {
            return;
        }
        self.options.store(Arc::new(options));
        self.repaint.mark_all_dirty();
    }

    pub fn change_size(&mut self, size: PixelSize) -> bool {
        let direction = self.suspend_scroll(true);
        let changed = self.viewport.change_size(size);
        self.resume_scroll(direction);
        changed
    }

    pub fn change_focus(&mut self, focus: Option<TilePos>) -> bool {
        let direction = self.suspend_scroll(false);
        let changed = self.viewport.change_focus(focus);
        self.resume_scroll(direction);
        changed
    }

    pub fn change_zoom(&mut self, scale: f32) -> Result<bool, ViewError> {
        let direction = self.suspend_scroll(true);
        let changed = self.viewport.change_zoom(scale);
        self.resume_scroll(direction);
        changed
    }

    /// Marks tiles whose content changed in the world.
    pub fn invalidate_tiles(&mut self, tiles: impl IntoIterator<Item = TilePos>) {
        let geometry = self.viewport.geometry();
        for tile in tiles {
            if !self.viewport.is_visible(tile) {
                continue;
            }
            let Some(origin) = self.viewport.tile_to_pixel(tile) else {
                continue;
            };
            self.repaint.mark_dirty(DirtyRect::new(
                origin.x,
                origin.y,
                origin.x + geometry.width() as i32,
                origin.y + geometry.height() as i32,
            ));
        }
    }

    /// Starts, steers or ends a scroll.
    ///
    /// Ending a scroll makes the tile under the last shown focus point the
    /// new focus tile.
    pub fn set_scroll_direction(&mut self, direction: Option<Direction>) -> Result<(), EngineError> {
        let Some(direction) = direction else {
            self.suspend_scroll(true);
            return Ok(());
        };
        if let Some(engine) = &self.engine {
            return engine.set_direction(Some(direction));
        }
        let Some(focus) = self.viewport.focus_point() else {
            warn!(?direction, "scroll requested without a visible focus");
            return Ok(());
        };
        let scene = PrefetchScene {
            map: Arc::clone(&self.map),
            renderer: Arc::clone(&self.renderer),
            options: Arc::clone(&self.options),
            geometry: self.viewport.geometry(),
            viewport: self.viewport.size(),
            focus,
            render_estimate: self.render_estimate,
        };
        let engine = PrefetchEngine::new(scene, self.prefetch)?;
        engine.set_direction(Some(direction))?;
        debug!(?direction, "scroll started");
        self.engine = Some(engine);
        self.scroll_focus = None;
        Ok(())
    }

    /// Stops the engine, if any, and returns the direction it was scrolling in.
    fn suspend_scroll(&mut self, keep_position: bool) -> Option<Direction> {
        let engine = self.engine.take()?;
        let direction = engine.direction();
        engine.stop();
        let shown = self.scroll_focus.take();
        if keep_position {
            let point = shown.unwrap_or_else(|| engine.focus_point());
            match self.viewport.tile_at_map_point(point) {
                Some(tile) => {
                    self.viewport.change_focus(Some(tile));
                }
                None => warn!(?point, "scroll ended outside the map"),
            }
        }
        debug!(?direction, "scroll suspended");
        direction
    }

    fn resume_scroll(&mut self, direction: Option<Direction>) {
        if direction.is_none() {
            return;
        }
        if let Err(failure) = self.set_scroll_direction(direction) {
            error!(%failure, "failed to restart prefetching; continuing without it");
        }
    }

    /// Puts the current view into `target`, which should match the viewport size.
    ///
    /// Never waits for the prefetch engine.
    pub fn display_frame(&mut self, target: &mut PixelBuffer) -> DisplayOutcome {
        let polled = self
            .engine
            .as_ref()
            .map(|engine| (engine.try_get_frame(), engine.desired_focus()));
        match polled {
            Some((Ok(Some(frame)), _)) => {
                frame.blit_into(target);
                self.scroll_focus = Some(frame.focus());
                DisplayOutcome::Prefetched {
                    generation: frame.generation(),
                }
            }
            Some((Ok(None), focus)) => self.display_scroll_position(target, focus),
            Some((Err(failure), _)) => {
                warn!(%failure, "prefetch engine unavailable; rendering synchronously");
                self.engine = None;
                self.scroll_focus = None;
                self.display_cached(target)
            }
            None => self.display_cached(target),
        }
    }

    /// Renders the whole viewport centred on the map pixel `focus`.
    fn display_scroll_position(&mut self, target: &mut PixelBuffer, focus: PixelPoint) -> DisplayOutcome {
        let size = self.viewport.size();
        let origin = focus.offset(-((size.width / 2) as i32), -((size.height / 2) as i32));
        let Some(bounds) = bounds_for_origin(origin, size, self.viewport.geometry(), self.map.size())
        else {
            target.fill(BACKGROUND);
            return DisplayOutcome::Blank;
        };
        let started = Instant::now();
        let source = TileSource {
            map: self.map.as_ref(),
            renderer: self.renderer.as_ref(),
            options: **self.options.load(),
        };
        let full = target.bounds();
        let stats = render_tiles(target, &bounds, full, &source, &mut self.throttle);
        self.render_estimate = started.elapsed();
        self.scroll_focus = Some(focus);
        debug!(
            rendered = stats.tiles_rendered,
            failed = stats.tiles_failed,
            ?focus,
            "no prefetched frame ready; rendered scroll position synchronously"
        );
        DisplayOutcome::Fallback
    }

    fn display_cached(&mut self, target: &mut PixelBuffer) -> DisplayOutcome {
        self.repaint
            .prepare_buffers(self.viewport.size(), self.viewport.focus());
        let Some(bounds) = self.viewport.bounds().copied() else {
            target.fill(BACKGROUND);
            return DisplayOutcome::Blank;
        };
        let plan = self.repaint.repaint_plan();
        let Some(buffer) = self.repaint.buffer_mut() else {
            target.fill(BACKGROUND);
            return DisplayOutcome::Blank;
        };
        let (clip, outcome) = match plan {
            RepaintPlan::Nothing => (None, DisplayOutcome::Cached),
            RepaintPlan::Partial(rect) => (Some(rect), DisplayOutcome::Partial(rect)),
            RepaintPlan::Full => (Some(buffer.bounds()), DisplayOutcome::Full),
        };
        if let Some(clip) = clip {
            let started = Instant::now();
            let source = TileSource {
                map: self.map.as_ref(),
                renderer: self.renderer.as_ref(),
                options: **self.options.load(),
            };
            let stats = render_tiles(buffer, &bounds, clip, &source, &mut self.throttle);
            if plan == RepaintPlan::Full {
                self.render_estimate = started.elapsed();
            }
            debug!(
                rendered = stats.tiles_rendered,
                failed = stats.tiles_failed,
                ?clip,
                "synchronous repaint"
            );
            self.repaint.mark_clean(clip);
        }
        if let Some(buffer) = self.repaint.buffer() {
            target.copy_window_from(buffer, PixelPoint::default());
        }
        outcome
    }
}
