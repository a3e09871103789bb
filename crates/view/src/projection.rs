//! Tile-to-pixel viewport projection.
//!
//! `position_view` places the viewport over the map for a focus tile, pinning
//! it to map edges when the focus is close to them. The resulting
//! [`ViewportBounds`] is an immutable snapshot that the remaining functions
//! read.

use std::ops::RangeInclusive;

use bitflags::bitflags;
use model::{Direction, MapSize, TilePos};

use crate::geometry::{PixelPoint, PixelSize, TileGeometry, ceil_div, floor_div};

/// Tolerance band of [`is_on_screen`], in tiles.
pub const ON_SCREEN_MARGIN_TILES: i64 = 2;

bitflags! {
    /// Map edges the viewport is pinned against; no scrolling is possible past them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Alignment: u8 {
        const TOP = 1 << 0;
        const BOTTOM = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

/// Visible tiles of a positioned viewport.
///
/// Rows are exact. Columns are exact per row parity, since odd rows are
/// shifted by half a tile: [`top_left`](Self::top_left) and
/// [`bottom_right`](Self::bottom_right) bound the union of both parities, and
/// [`columns`](Self::columns) gives the tiles of one row that intersect the
/// viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportBounds {
    top_left: TilePos,
    bottom_right: TilePos,
    even_columns: Option<(u32, u32)>,
    odd_columns: Option<(u32, u32)>,
    top_left_pixel: PixelPoint,
    origin: PixelPoint,
    alignment: Alignment,
    geometry: TileGeometry,
    viewport: PixelSize,
    map: MapSize,
}

impl ViewportBounds {
    pub fn top_left(&self) -> TilePos {
        self.top_left
    }

    pub fn bottom_right(&self) -> TilePos {
        self.bottom_right
    }

    /// Screen position of the bounding box of the [`top_left`](Self::top_left) tile.
    pub fn top_left_pixel(&self) -> PixelPoint {
        self.top_left_pixel
    }

    /// Map pixel shown at screen `(0, 0)`.
    pub fn origin(&self) -> PixelPoint {
        self.origin
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn aligned_top(&self) -> bool {
        self.alignment.contains(Alignment::TOP)
    }

    pub fn aligned_bottom(&self) -> bool {
        self.alignment.contains(Alignment::BOTTOM)
    }

    pub fn aligned_left(&self) -> bool {
        self.alignment.contains(Alignment::LEFT)
    }

    pub fn aligned_right(&self) -> bool {
        self.alignment.contains(Alignment::RIGHT)
    }

    pub fn geometry(&self) -> TileGeometry {
        self.geometry
    }

    pub fn viewport(&self) -> PixelSize {
        self.viewport
    }

    pub fn map(&self) -> MapSize {
        self.map
    }

    /// Map pixel at the centre of the viewport.
    pub fn focus_point(&self) -> PixelPoint {
        self.origin.offset(
            (self.viewport.width / 2) as i32,
            (self.viewport.height / 2) as i32,
        )
    }

    /// Columns of `row` whose tiles intersect the viewport; empty for rows
    /// outside the view.
    pub fn columns(&self, row: u32) -> RangeInclusive<u32> {
        let span = if row < self.top_left.y || row > self.bottom_right.y {
            None
        } else if row % 2 == 1 {
            self.odd_columns
        } else {
            self.even_columns
        };
        match span {
            Some((first, last)) => first..=last,
            None => RangeInclusive::new(1, 0),
        }
    }

    /// Visible tiles in row-major order, top to bottom then left to right.
    pub fn tiles(&self) -> impl Iterator<Item = TilePos> + '_ {
        (self.top_left.y..=self.bottom_right.y)
            .flat_map(move |y| self.columns(y).map(move |x| TilePos::new(x, y)))
    }

    pub fn tile_count(&self) -> usize {
        (self.top_left.y..=self.bottom_right.y)
            .map(|y| self.columns(y).count())
            .sum()
    }
}

struct AxisPlacement {
    origin: i64,
    pinned_low: bool,
    pinned_high: bool,
}

fn place_axis(center: i64, extent: i64, viewport: i64) -> AxisPlacement {
    if extent <= viewport {
        return AxisPlacement {
            origin: 0,
            pinned_low: true,
            pinned_high: true,
        };
    }
    let desired = center - viewport / 2;
    let max_origin = extent - viewport;
    if desired <= 0 {
        AxisPlacement {
            origin: 0,
            pinned_low: true,
            pinned_high: false,
        }
    } else if desired >= max_origin {
        AxisPlacement {
            origin: max_origin,
            pinned_low: false,
            pinned_high: true,
        }
    } else {
        AxisPlacement {
            origin: desired,
            pinned_low: false,
            pinned_high: false,
        }
    }
}

/// Places the viewport so that `focus` is centred, or as close to centred as
/// the map edges allow.
///
/// Returns `None` when there is no focus, the viewport has no area, the map is
/// empty, or the focus lies off the map.
pub fn position_view(
    focus: Option<TilePos>,
    viewport: PixelSize,
    geometry: TileGeometry,
    map: MapSize,
) -> Option<ViewportBounds> {
    let focus = focus?;
    if viewport.is_empty() || map.is_empty() || !map.contains(focus) {
        return None;
    }
    let extent = geometry.map_extent(map);
    let center = geometry.tile_center_in_map(focus);
    let horizontal = place_axis(
        i64::from(center.x),
        i64::from(extent.width),
        i64::from(viewport.width),
    );
    let vertical = place_axis(
        i64::from(center.y),
        i64::from(extent.height),
        i64::from(viewport.height),
    );

    let mut alignment = Alignment::empty();
    alignment.set(Alignment::LEFT, horizontal.pinned_low);
    alignment.set(Alignment::RIGHT, horizontal.pinned_high);
    alignment.set(Alignment::TOP, vertical.pinned_low);
    alignment.set(Alignment::BOTTOM, vertical.pinned_high);

    let origin = PixelPoint::new(horizontal.origin as i32, vertical.origin as i32);
    bounds_with_alignment(origin, viewport, geometry, map, alignment)
}

/// Bounds for an arbitrary map pixel `origin`, as used when rendering frames
/// for a predicted scroll position rather than a focus tile.
pub fn bounds_for_origin(
    origin: PixelPoint,
    viewport: PixelSize,
    geometry: TileGeometry,
    map: MapSize,
) -> Option<ViewportBounds> {
    if viewport.is_empty() || map.is_empty() {
        return None;
    }
    let extent = geometry.map_extent(map);
    let max_x = i64::from(extent.width) - i64::from(viewport.width);
    let max_y = i64::from(extent.height) - i64::from(viewport.height);
    let mut alignment = Alignment::empty();
    alignment.set(Alignment::LEFT, i64::from(origin.x) <= 0);
    alignment.set(Alignment::RIGHT, i64::from(origin.x) >= max_x);
    alignment.set(Alignment::TOP, i64::from(origin.y) <= 0);
    alignment.set(Alignment::BOTTOM, i64::from(origin.y) >= max_y);
    bounds_with_alignment(origin, viewport, geometry, map, alignment)
}

fn bounds_with_alignment(
    origin: PixelPoint,
    viewport: PixelSize,
    geometry: TileGeometry,
    map: MapSize,
    alignment: Alignment,
) -> Option<ViewportBounds> {
    let tile_width = i64::from(geometry.width());
    let tile_height = i64::from(geometry.height());
    let half_width = i64::from(geometry.half_width());
    let half_height = i64::from(geometry.half_height());
    let origin_x = i64::from(origin.x);
    let origin_y = i64::from(origin.y);

    // A row spans [y * half_height, y * half_height + height); a column spans
    // [x * width + shift, x * width + shift + width) with shift = half_width
    // on odd rows.
    let first_row = (floor_div(origin_y - tile_height, half_height) + 1).max(0);
    let last_row = (ceil_div(origin_y + i64::from(viewport.height), half_height) - 1)
        .min(i64::from(map.height) - 1);
    if first_row > last_row {
        return None;
    }
    let columns = |shift: i64| {
        let first = (floor_div(origin_x - tile_width - shift, tile_width) + 1).max(0);
        let last = (ceil_div(origin_x + i64::from(viewport.width) - shift, tile_width) - 1)
            .min(i64::from(map.width) - 1);
        (first <= last).then_some((first as u32, last as u32))
    };
    let has_odd_row = first_row % 2 == 1 || last_row > first_row;
    let has_even_row = first_row % 2 == 0 || last_row > first_row;
    let even_columns = columns(0).filter(|_| has_even_row);
    let odd_columns = columns(half_width).filter(|_| has_odd_row);
    let (first_column, last_column) = match (even_columns, odd_columns) {
        (Some(even), Some(odd)) => (even.0.min(odd.0), even.1.max(odd.1)),
        (Some(span), None) | (None, Some(span)) => span,
        (None, None) => return None,
    };

    let top_left = TilePos::new(first_column, first_row as u32);
    let bottom_right = TilePos::new(last_column, last_row as u32);
    let top_left_in_map = geometry.tile_origin_in_map(top_left);
    Some(ViewportBounds {
        top_left,
        bottom_right,
        even_columns,
        odd_columns,
        top_left_pixel: PixelPoint::new(top_left_in_map.x - origin.x, top_left_in_map.y - origin.y),
        origin,
        alignment,
        geometry,
        viewport,
        map,
    })
}

/// Screen position of `tile`'s bounding box.
///
/// Performs no visibility check; callers confirm `is_visible` first.
pub fn tile_to_pixel(tile: TilePos, bounds: &ViewportBounds) -> PixelPoint {
    let geometry = bounds.geometry;
    let columns = i64::from(tile.x) - i64::from(bounds.top_left.x);
    let rows = i64::from(tile.y) - i64::from(bounds.top_left.y);
    let parity = i64::from(tile.is_odd_row()) - i64::from(bounds.top_left.is_odd_row());
    let x = i64::from(bounds.top_left_pixel.x)
        + columns * i64::from(geometry.width())
        + parity * i64::from(geometry.half_width());
    let y = i64::from(bounds.top_left_pixel.y) + rows * i64::from(geometry.half_height());
    PixelPoint::new(x as i32, y as i32)
}

/// Tile whose diamond contains the screen point.
///
/// The point is first bucketed into a tile-sized rectangle aligned to even
/// rows; points in one of the rectangle's corner wedges belong to the
/// diagonal neighbor on the adjacent odd row.
pub fn pixel_to_tile(
    point: PixelPoint,
    focus: Option<TilePos>,
    bounds: &ViewportBounds,
) -> Option<TilePos> {
    focus?;
    let geometry = bounds.geometry;
    let tile_width = i64::from(geometry.width());
    let tile_height = i64::from(geometry.height());
    let half_width = i64::from(geometry.half_width());
    let half_height = i64::from(geometry.half_height());

    let map_x = i64::from(point.x) + i64::from(bounds.origin.x);
    let map_y = i64::from(point.y) + i64::from(bounds.origin.y);
    let column = floor_div(map_x, tile_width);
    let row_pair = floor_div(map_y, tile_height);
    let dx = map_x - column * tile_width - half_width;
    let dy = map_y - row_pair * tile_height - half_height;

    let (base_x, base_y) = (column, row_pair * 2);
    if dx.abs() * half_height + dy.abs() * half_width <= half_width * half_height {
        return bounds.map.tile_at(base_x, base_y);
    }
    let wedge = match (dx < 0, dy < 0) {
        (true, true) => Direction::NW,
        (false, true) => Direction::NE,
        (true, false) => Direction::SW,
        (false, false) => Direction::SE,
    };
    let (step_x, step_y) = wedge.tile_delta(false);
    bounds.map.tile_at(base_x + step_x, base_y + step_y)
}

/// Whether any part of `tile`'s bounding box lies inside the viewport.
pub fn is_visible(tile: TilePos, bounds: &ViewportBounds) -> bool {
    bounds.columns(tile.y).contains(&tile.x)
}

/// Looser visibility used by callers that only need to avoid flicker at the
/// edges; accepts tiles up to [`ON_SCREEN_MARGIN_TILES`] outside the bounds.
pub fn is_on_screen(tile: TilePos, bounds: &ViewportBounds) -> bool {
    let x = i64::from(tile.x);
    let y = i64::from(tile.y);
    x >= i64::from(bounds.top_left.x) - ON_SCREEN_MARGIN_TILES
        && x <= i64::from(bounds.bottom_right.x) + ON_SCREEN_MARGIN_TILES
        && y >= i64::from(bounds.top_left.y) - ON_SCREEN_MARGIN_TILES
        && y <= i64::from(bounds.bottom_right.y) + ON_SCREEN_MARGIN_TILES
}

/// Clamps a viewport-centre map pixel so the viewport never leaves the map.
///
/// Axes on which the whole map fits collapse to the pinned placement used by
/// [`position_view`].
pub fn clamp_focus_point(
    point: PixelPoint,
    viewport: PixelSize,
    geometry: TileGeometry,
    map: MapSize,
) -> PixelPoint {
    let extent = geometry.map_extent(map);
    let clamp_axis = |center: i32, extent: u32, viewport: u32| -> i32 {
        let half = i64::from(viewport / 2);
        let max_origin = (i64::from(extent) - i64::from(viewport)).max(0);
        let origin = (i64::from(center) - half).clamp(0, max_origin);
        (origin + half) as i32
    };
    PixelPoint::new(
        clamp_axis(point.x, extent.width, viewport.width),
        clamp_axis(point.y, extent.height, viewport.height),
    )
}
