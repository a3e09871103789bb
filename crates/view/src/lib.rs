//! Viewport projection for staggered tile maps.
//!
//! `geometry` holds pixel primitives and tile sizes, `projection` the pure
//! placement and coordinate-conversion functions. [`MapViewport`] is the
//! foreground-owned state that recomputes bounds whenever focus, size or zoom
//! changes.

mod geometry;
mod projection;

pub use geometry::{
    DEFAULT_TILE_HEIGHT, DEFAULT_TILE_WIDTH, MIN_TILE_EDGE, PixelPoint, PixelSize, TileGeometry,
};
pub use projection::{
    Alignment, ON_SCREEN_MARGIN_TILES, ViewportBounds, bounds_for_origin, clamp_focus_point,
    is_on_screen, is_visible, pixel_to_tile, position_view, tile_to_pixel,
};

use model::{MapSize, TilePos};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("zoom factor must be finite and positive")]
    InvalidZoom,
    #[error("tile geometry {width}x{height} must have even edges of at least 2 pixels")]
    InvalidTileGeometry { width: u32, height: u32 },
}

/// Foreground view state: focus tile, viewport size and zoom, plus the
/// bounds derived from them.
#[derive(Debug, Clone)]
pub struct MapViewport {
    map: MapSize,
    base_geometry: TileGeometry,
    geometry: TileGeometry,
    zoom: f32,
    size: PixelSize,
    focus: Option<TilePos>,
    bounds: Option<ViewportBounds>,
}

impl MapViewport {
    pub fn new(map: MapSize, base_geometry: TileGeometry, size: PixelSize) -> Self {
        Self {
            map,
            base_geometry,
            geometry: base_geometry,
            zoom: 1.0,
            size,
            focus: None,
            bounds: None,
        }
    }

    pub fn map(&self) -> MapSize {
        self.map
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn focus(&self) -> Option<TilePos> {
        self.focus
    }

    pub fn bounds(&self) -> Option<&ViewportBounds> {
        self.bounds.as_ref()
    }

    /// Returns whether the size actually changed.
    pub fn change_size(&mut self, size: PixelSize) -> bool {
        if self.size == size {
            return false;
        }
        self.size = size;
        self.reposition();
        true
    }

    /// Off-map tiles are rejected and leave the view untouched.
    pub fn change_focus(&mut self, focus: Option<TilePos>) -> bool {
        if let Some(tile) = focus {
            if !self.map.contains(tile) {
                warn!(x = tile.x, y = tile.y, "focus tile outside map ignored");
                return false;
            }
        }
        if self.focus == focus {
            return false;
        }
        self.focus = focus;
        self.reposition();
        true
    }

    /// Scales the base tile geometry; returns whether the geometry changed.
    pub fn change_zoom(&mut self, scale: f32) -> Result<bool, ViewError> {
        let geometry = self.base_geometry.scaled(scale)?;
        self.zoom = scale;
        if geometry == self.geometry {
            return Ok(false);
        }
        self.geometry = geometry;
        self.reposition();
        Ok(true)
    }

    fn reposition(&mut self) {
        self.bounds = position_view(self.focus, self.size, self.geometry, self.map);
        match &self.bounds {
            Some(bounds) => debug!(
                top_left = ?bounds.top_left(),
                bottom_right = ?bounds.bottom_right(),
                alignment = ?bounds.alignment(),
                "viewport repositioned"
            ),
            None => debug!("viewport has nothing visible"),
        }
    }

    /// Map pixel at the centre of the current view.
    pub fn focus_point(&self) -> Option<PixelPoint> {
        self.bounds.as_ref().map(ViewportBounds::focus_point)
    }

    pub fn is_visible(&self, tile: TilePos) -> bool {
        self.bounds
            .as_ref()
            .is_some_and(|bounds| is_visible(tile, bounds))
    }

    pub fn is_on_screen(&self, tile: TilePos) -> bool {
        self.bounds
            .as_ref()
            .is_some_and(|bounds| is_on_screen(tile, bounds))
    }

    /// Checked variant of [`tile_to_pixel`]; asking for a tile outside the
    /// view is reported and answered with `None`.
    pub fn tile_to_pixel(&self, tile: TilePos) -> Option<PixelPoint> {
        let bounds = self.bounds.as_ref()?;
        if !is_visible(tile, bounds) {
            warn!(x = tile.x, y = tile.y, "pixel position requested for tile outside viewport");
            return None;
        }
        Some(tile_to_pixel(tile, bounds))
    }

    pub fn pixel_to_tile(&self, point: PixelPoint) -> Option<TilePos> {
        let bounds = self.bounds.as_ref()?;
        pixel_to_tile(point, self.focus, bounds)
    }

    /// Tile under a map pixel, independent of the current scroll origin.
    pub fn tile_at_map_point(&self, point: PixelPoint) -> Option<TilePos> {
        let bounds = bounds_for_origin(PixelPoint::default(), self.size, self.geometry, self.map)?;
        pixel_to_tile(point, Some(bounds.top_left()), &bounds)
    }

    pub fn clamp_focus_point(&self, point: PixelPoint) -> PixelPoint {
        clamp_focus_point(point, self.size, self.geometry, self.map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> MapViewport {
        MapViewport::new(
            MapSize::new(50, 50),
            TileGeometry::default(),
            PixelSize::new(640, 320),
        )
    }

    #[test]
    fn bounds_follow_focus_changes() {
        let mut view = viewport();
        assert!(view.bounds().is_none());
        assert!(!view.is_visible(TilePos::new(0, 0)));

        assert!(view.change_focus(Some(TilePos::new(20, 20))));
        assert!(view.is_visible(TilePos::new(20, 20)));
        assert!(!view.change_focus(Some(TilePos::new(20, 20))));

        assert!(!view.change_focus(Some(TilePos::new(80, 1))));
        assert_eq!(view.focus(), Some(TilePos::new(20, 20)));

        assert!(view.change_focus(None));
        assert!(view.bounds().is_none());
        assert_eq!(view.pixel_to_tile(PixelPoint::new(1, 1)), None);
    }

    #[test]
    fn zoom_rescales_geometry_and_bounds() {
        let mut view = viewport();
        view.change_focus(Some(TilePos::new(25, 25)));
        let before = view.bounds().expect("bounds").tile_count();

        assert_eq!(view.change_zoom(0.5), Ok(true));
        assert_eq!(view.geometry().width(), 64);
        let after = view.bounds().expect("bounds").tile_count();
        assert!(after > before);

        assert_eq!(view.change_zoom(0.5), Ok(false));
        assert_eq!(view.change_zoom(-1.0), Err(ViewError::InvalidZoom));
        assert_eq!(view.geometry().width(), 64);
    }

    #[test]
    fn checked_tile_to_pixel_refuses_hidden_tiles() {
        let mut view = viewport();
        view.change_focus(Some(TilePos::new(25, 25)));
        assert!(view.tile_to_pixel(TilePos::new(25, 25)).is_some());
        assert_eq!(view.tile_to_pixel(TilePos::new(0, 0)), None);
    }

    #[test]
    fn map_point_lookup_ignores_scroll_origin() {
        let mut view = viewport();
        view.change_focus(Some(TilePos::new(30, 30)));
        let geometry = view.geometry();
        let tile = TilePos::new(12, 7);
        let center = geometry.tile_center_in_map(tile);
        assert_eq!(view.tile_at_map_point(center), Some(tile));
    }

    #[test]
    fn resize_repositions_and_reports_change() {
        let mut view = viewport();
        view.change_focus(Some(TilePos::new(25, 25)));
        assert!(!view.change_size(PixelSize::new(640, 320)));
        assert!(view.change_size(PixelSize::new(0, 320)));
        assert!(view.bounds().is_none());
        assert!(view.change_size(PixelSize::new(1280, 640)));
        assert!(view.is_visible(TilePos::new(25, 25)));
        assert_eq!(
            view.focus_point(),
            Some(view.clamp_focus_point(view.focus_point().expect("focus point")))
        );
    }
}
