//! CPU pixel surfaces.
//!
//! `PixelBuffer` owns 0xAARRGGBB pixels. `TileCanvas` is the drawing context
//! handed to the content renderer: its coordinates are relative to one
//! tile's bounding box and every write is clipped to the pass's clip rect.

use view::{PixelPoint, PixelSize, TileGeometry};

use crate::DirtyRect;

pub const BACKGROUND: u32 = 0xFF00_0000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    generation: u64,
}

impl PixelBuffer {
    pub fn new(size: PixelSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
            pixels: vec![BACKGROUND; size.width as usize * size.height as usize],
            generation: 0,
        }
    }

    pub fn size(&self) -> PixelSize {
        PixelSize::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> DirtyRect {
        DirtyRect::from_size(self.size())
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Tag identifying which render pass last wrote the buffer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width as usize + x as usize])
    }

    pub fn fill(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    pub fn fill_rect(&mut self, rect: DirtyRect, color: u32) {
        let Some(rect) = rect.intersection(&self.bounds()) else {
            return;
        };
        let stride = self.width as usize;
        for y in rect.min_y..rect.max_y {
            let row = y as usize * stride;
            self.pixels[row + rect.min_x as usize..row + rect.max_x as usize].fill(color);
        }
    }

    /// Copies the `self.size()` window of `source` starting at `source_origin`.
    ///
    /// Parts of the window falling outside `source` are left untouched.
    pub fn copy_window_from(&mut self, source: &PixelBuffer, source_origin: PixelPoint) {
        let window = DirtyRect::new(
            source_origin.x,
            source_origin.y,
            source_origin.x + self.width as i32,
            source_origin.y + self.height as i32,
        );
        let Some(window) = window.intersection(&source.bounds()) else {
            return;
        };
        let row_len = window.width() as usize;
        for source_y in window.min_y..window.max_y {
            let source_start = source_y as usize * source.width as usize + window.min_x as usize;
            let target_y = (source_y - source_origin.y) as usize;
            let target_x = (window.min_x - source_origin.x) as usize;
            let target_start = target_y * self.width as usize + target_x;
            self.pixels[target_start..target_start + row_len]
                .copy_from_slice(&source.pixels[source_start..source_start + row_len]);
        }
    }

    pub fn as_rgba8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for pixel in &self.pixels {
            let [a, r, g, b] = pixel.to_be_bytes();
            bytes.extend_from_slice(&[r, g, b, a]);
        }
        bytes
    }
}

/// Drawing context for a single tile.
pub struct TileCanvas<'a> {
    buffer: &'a mut PixelBuffer,
    origin: PixelPoint,
    clip: DirtyRect,
    geometry: TileGeometry,
}

impl<'a> TileCanvas<'a> {
    pub(crate) fn new(
        buffer: &'a mut PixelBuffer,
        origin: PixelPoint,
        clip: DirtyRect,
        geometry: TileGeometry,
    ) -> Self {
        Self {
            buffer,
            origin,
            clip,
            geometry,
        }
    }

    pub fn width(&self) -> u32 {
        self.geometry.width()
    }

    pub fn height(&self) -> u32 {
        self.geometry.height()
    }

    /// Generation of the buffer being drawn into.
    pub fn generation(&self) -> u64 {
        self.buffer.generation()
    }

    /// Fills a rectangle given in tile-local coordinates.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: u32) {
        let rect = DirtyRect::new(
            self.origin.x + x,
            self.origin.y + y,
            self.origin.x + x + width as i32,
            self.origin.y + y + height as i32,
        );
        if let Some(rect) = rect.intersection(&self.clip) {
            self.buffer.fill_rect(rect, color);
        }
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, color: u32) {
        self.fill_rect(x, y, 1, 1, color);
    }

    /// Fills the tile's diamond, leaving the bounding box corners untouched.
    pub fn fill_diamond(&mut self, color: u32) {
        let half_width = self.geometry.half_width() as i64;
        let half_height = self.geometry.half_height() as i64;
        for row in 0..self.geometry.height() as i64 {
            // Distance of the row's pixel centre from the horizontal axis.
            let dy = (2 * row + 1 - 2 * half_height).abs();
            let span = half_width * (2 * half_height - dy) / (2 * half_height);
            if span <= 0 {
                continue;
            }
            self.fill_rect(
                (half_width - span) as i32,
                row as i32,
                (2 * span) as u32,
                1,
                color,
            );
        }
    }
}
