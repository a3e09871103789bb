//! Pixel-space primitives and tile geometry.
//!
//! Map pixel space places tile `(x, y)` with its bounding box at
//! `(x * width + (y odd ? half_width : 0), y * half_height)`. Screen space is
//! map pixel space shifted by the viewport origin.

use model::{MapSize, TilePos};

use crate::ViewError;

pub const DEFAULT_TILE_WIDTH: u32 = 128;
pub const DEFAULT_TILE_HEIGHT: u32 = 64;
/// Smallest tile edge a zoom may produce; keeps halves non-zero.
pub const MIN_TILE_EDGE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub const fn delta_to(self, other: PixelPoint) -> (i32, i32) {
        (other.x - self.x, other.y - self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Grows the size by `margin` pixels on every side; `None` on overflow.
    pub fn inflate(self, margin: u32) -> Option<Self> {
        let border = margin.checked_mul(2)?;
        Some(Self {
            width: self.width.checked_add(border)?,
            height: self.height.checked_add(border)?,
        })
    }
}

/// Bounding rectangle of a single tile in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    width: u32,
    height: u32,
    half_width: u32,
    half_height: u32,
}

impl Default for TileGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_TILE_WIDTH,
            height: DEFAULT_TILE_HEIGHT,
            half_width: DEFAULT_TILE_WIDTH / 2,
            half_height: DEFAULT_TILE_HEIGHT / 2,
        }
    }
}

impl TileGeometry {
    /// Both edges must be even and at least [`MIN_TILE_EDGE`].
    pub fn new(width: u32, height: u32) -> Result<Self, ViewError> {
        if width < MIN_TILE_EDGE || height < MIN_TILE_EDGE || width % 2 != 0 || height % 2 != 0 {
            return Err(ViewError::InvalidTileGeometry { width, height });
        }
        Ok(Self {
            width,
            height,
            half_width: width / 2,
            half_height: height / 2,
        })
    }

    /// Geometry of `self` scaled by `scale`, rounded to even edges.
    pub fn scaled(&self, scale: f32) -> Result<Self, ViewError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ViewError::InvalidZoom);
        }
        let width = round_to_even(self.width as f32 * scale);
        let height = round_to_even(self.height as f32 * scale);
        Self::new(width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn half_width(&self) -> u32 {
        self.half_width
    }

    pub fn half_height(&self) -> u32 {
        self.half_height
    }

    /// Top-left corner of the tile's bounding box in map pixel space.
    pub fn tile_origin_in_map(&self, tile: TilePos) -> PixelPoint {
        let parity = if tile.is_odd_row() { self.half_width } else { 0 };
        PixelPoint::new(
            (i64::from(tile.x) * i64::from(self.width) + i64::from(parity)) as i32,
            (i64::from(tile.y) * i64::from(self.half_height)) as i32,
        )
    }

    pub fn tile_center_in_map(&self, tile: TilePos) -> PixelPoint {
        self.tile_origin_in_map(tile)
            .offset(self.half_width as i32, self.half_height as i32)
    }

    /// Pixel extent of the whole map, including the odd-row overhang.
    pub fn map_extent(&self, map: MapSize) -> PixelSize {
        if map.is_empty() {
            return PixelSize::default();
        }
        PixelSize::new(
            map.width * self.width + self.half_width,
            (map.height + 1) * self.half_height,
        )
    }

    /// Pixel margin spanning `tiles` tile widths; `None` on overflow.
    pub fn lookahead_margin(&self, tiles: u32) -> Option<u32> {
        self.width.checked_mul(tiles)
    }
}

fn round_to_even(value: f32) -> u32 {
    let halves = (value / 2.0).round();
    let rounded = if halves < 1.0 { 1.0 } else { halves };
    (rounded as u32).saturating_mul(2).max(MIN_TILE_EDGE)
}

pub(crate) fn floor_div(value: i64, divisor: i64) -> i64 {
    value.div_euclid(divisor)
}

pub(crate) fn ceil_div(value: i64, divisor: i64) -> i64 {
    -(-value).div_euclid(divisor)
}
