use bitvec::prelude::{BitVec, Lsb0};

/// Logical tile coordinate on a staggered (diamond) map.
///
/// Odd rows are shifted right by half a tile width, so the visual row above
/// or below a tile alternates between the same column and its neighbor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TilePos {
    pub x: u32,
    pub y: u32,
}

impl TilePos {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub const fn is_odd_row(self) -> bool {
        self.y & 1 == 1
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MapSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapLayoutError {
    #[error("tile index out of bounds")]
    TileIndexOutOfBounds,
}

impl MapSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn max_tiles(self) -> usize {
        self.width as usize * self.height as usize
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const fn contains(self, tile: TilePos) -> bool {
        tile.x < self.width && tile.y < self.height
    }

    /// Converts signed coordinates into a tile, rejecting anything off the map.
    pub fn tile_at(self, x: i64, y: i64) -> Option<TilePos> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some(TilePos::new(x as u32, y as u32))
    }

    pub fn tile_index(self, tile: TilePos) -> Result<usize, MapLayoutError> {
        if !self.contains(tile) {
            Err(MapLayoutError::TileIndexOutOfBounds)
        } else {
            Ok(tile.y as usize * self.width as usize + tile.x as usize)
        }
    }

    pub fn tile_pos(self, index: usize) -> Result<TilePos, MapLayoutError> {
        if index >= self.max_tiles() {
            Err(MapLayoutError::TileIndexOutOfBounds)
        } else {
            let x = index % self.width as usize;
            let y = index / self.width as usize;
            Ok(TilePos::new(x as u32, y as u32))
        }
    }
}

/// The eight compass directions, used both for neighbor stepping and for
/// the active scroll direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    /// Tile delta `(dx, dy)` for a step from a tile in an odd or even row.
    pub const fn tile_delta(self, odd_row: bool) -> (i64, i64) {
        match (self, odd_row) {
            (Direction::N, _) => (0, -2),
            (Direction::NE, true) => (1, -1),
            (Direction::NE, false) => (0, -1),
            (Direction::E, _) => (1, 0),
            (Direction::SE, true) => (1, 1),
            (Direction::SE, false) => (0, 1),
            (Direction::S, _) => (0, 2),
            (Direction::SW, true) => (0, 1),
            (Direction::SW, false) => (-1, 1),
            (Direction::W, _) => (-1, 0),
            (Direction::NW, true) => (0, -1),
            (Direction::NW, false) => (-1, -1),
        }
    }

    /// Unit screen-space vector; y grows downwards.
    pub const fn pixel_delta(self) -> (i32, i32) {
        match self {
            Direction::N => (0, -1),
            Direction::NE => (1, -1),
            Direction::E => (1, 0),
            Direction::SE => (1, 1),
            Direction::S => (0, 1),
            Direction::SW => (-1, 1),
            Direction::W => (-1, 0),
            Direction::NW => (-1, -1),
        }
    }

    /// Raw step without map bounds; `None` only when a coordinate would go negative.
    pub fn step(self, tile: TilePos) -> Option<TilePos> {
        let (dx, dy) = self.tile_delta(tile.is_odd_row());
        let x = i64::from(tile.x) + dx;
        let y = i64::from(tile.y) + dy;
        if x < 0 || y < 0 || x > i64::from(u32::MAX) || y > i64::from(u32::MAX) {
            return None;
        }
        Some(TilePos::new(x as u32, y as u32))
    }

    /// Stable non-zero code for packing into an atomic.
    pub const fn code(self) -> u8 {
        match self {
            Direction::N => 1,
            Direction::NE => 2,
            Direction::E => 3,
            Direction::SE => 4,
            Direction::S => 5,
            Direction::SW => 6,
            Direction::W => 7,
            Direction::NW => 8,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Direction::N),
            2 => Some(Direction::NE),
            3 => Some(Direction::E),
            4 => Some(Direction::SE),
            5 => Some(Direction::S),
            6 => Some(Direction::SW),
            7 => Some(Direction::W),
            8 => Some(Direction::NW),
            _ => None,
        }
    }
}

/// Read-only view of the game world consumed by the rendering pipeline.
pub trait MapGrid: Send + Sync {
    fn size(&self) -> MapSize;

    fn is_explored(&self, tile: TilePos) -> bool;

    fn width(&self) -> u32 {
        self.size().width
    }

    fn height(&self) -> u32 {
        self.size().height
    }

    fn tile_at(&self, x: i64, y: i64) -> Option<TilePos> {
        self.size().tile_at(x, y)
    }

    fn neighbor(&self, tile: TilePos, direction: Direction) -> Option<TilePos> {
        direction
            .step(tile)
            .filter(|neighbor| self.size().contains(*neighbor))
    }
}

/// In-memory map with an explored mask, one bit per tile.
#[derive(Debug, Clone)]
pub struct GridMap {
    size: MapSize,
    explored: BitVec<usize, Lsb0>,
}

impl GridMap {
    pub fn new(width: u32, height: u32) -> Self {
        let size = MapSize::new(width, height);
        Self {
            size,
            explored: BitVec::repeat(false, size.max_tiles()),
        }
    }

    pub fn fully_explored(width: u32, height: u32) -> Self {
        let size = MapSize::new(width, height);
        Self {
            size,
            explored: BitVec::repeat(true, size.max_tiles()),
        }
    }

    pub fn set_explored(&mut self, tile: TilePos, explored: bool) -> Result<(), MapLayoutError> {
        let index = self.size.tile_index(tile)?;
        self.explored.set(index, explored);
        Ok(())
    }

    pub fn explored_count(&self) -> usize {
        self.explored.count_ones()
    }
}

impl MapGrid for GridMap {
    fn size(&self) -> MapSize {
        self.size
    }

    fn is_explored(&self, tile: TilePos) -> bool {
        match self.size.tile_index(tile) {
            Ok(index) => self.explored[index],
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_index_round_trips_inside_layout() {
        let size = MapSize::new(7, 5);
        let tile = TilePos::new(3, 4);
        let index = size.tile_index(tile).expect("index");
        assert_eq!(index, 31);
        assert_eq!(size.tile_pos(index), Ok(tile));
        assert_eq!(
            size.tile_index(TilePos::new(7, 0)),
            Err(MapLayoutError::TileIndexOutOfBounds)
        );
    }

    #[test]
    fn diagonal_steps_depend_on_row_parity() {
        let even = TilePos::new(4, 4);
        let odd = TilePos::new(4, 5);
        assert_eq!(Direction::NE.step(even), Some(TilePos::new(4, 3)));
        assert_eq!(Direction::NE.step(odd), Some(TilePos::new(5, 4)));
        assert_eq!(Direction::SW.step(even), Some(TilePos::new(3, 5)));
        assert_eq!(Direction::SW.step(odd), Some(TilePos::new(4, 6)));
        assert_eq!(Direction::N.step(TilePos::new(0, 1)), None);
    }

    #[test]
    fn opposite_steps_cancel_out() {
        let opposite = [
            (Direction::N, Direction::S),
            (Direction::NE, Direction::SW),
            (Direction::E, Direction::W),
            (Direction::SE, Direction::NW),
        ];
        for tile in [TilePos::new(5, 6), TilePos::new(5, 7)] {
            for (there, back) in opposite {
                let moved = there.step(tile).expect("step");
                assert_eq!(back.step(moved), Some(tile), "{there:?} then {back:?}");
            }
        }
    }

    #[test]
    fn neighbor_respects_map_bounds() {
        let map = GridMap::new(3, 3);
        assert_eq!(map.neighbor(TilePos::new(2, 1), Direction::NE), None);
        assert_eq!(
            map.neighbor(TilePos::new(1, 1), Direction::NE),
            Some(TilePos::new(2, 0))
        );
        assert_eq!(map.tile_at(-1, 0), None);
        assert_eq!(map.tile_at(2, 2), Some(TilePos::new(2, 2)));
    }

    #[test]
    fn explored_mask_tracks_tiles() {
        let mut map = GridMap::new(4, 4);
        assert!(!map.is_explored(TilePos::new(1, 2)));
        map.set_explored(TilePos::new(1, 2), true).expect("explore");
        assert!(map.is_explored(TilePos::new(1, 2)));
        assert_eq!(map.explored_count(), 1);
        assert!(!map.is_explored(TilePos::new(9, 9)));
        assert!(GridMap::fully_explored(2, 2).is_explored(TilePos::new(1, 1)));
    }

    #[test]
    fn direction_codes_round_trip() {
        for direction in Direction::ALL {
            assert_eq!(Direction::from_code(direction.code()), Some(direction));
        }
        assert_eq!(Direction::from_code(0), None);
    }
}
