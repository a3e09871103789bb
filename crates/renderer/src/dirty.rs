//! Dirty-region tracking for the repaint buffer.
//!
//! The tracked region is a single bounding rectangle: `None` means nothing is
//! pending, a rectangle equal to the buffer bounds means everything is stale.

use model::TilePos;
use tracing::{debug, warn};
use view::PixelSize;

use crate::PixelBuffer;

/// Share of the buffer area above which a partial repaint is promoted to a full one.
pub const FULL_REPAINT_RATIO_THRESHOLD: f32 = 0.75;

/// Half-open pixel rectangle `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirtyRect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl DirtyRect {
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub const fn from_size(size: PixelSize) -> Self {
        Self::new(0, 0, size.width as i32, size.height as i32)
    }

    pub const fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }

    pub const fn width(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.max_x - self.min_x) as u32
        }
    }

    pub const fn height(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.max_y - self.min_y) as u32
        }
    }

    pub const fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Bounding rectangle of both; empty inputs are ignored.
    pub fn union(&self, other: &DirtyRect) -> DirtyRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        DirtyRect::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    pub fn intersection(&self, other: &DirtyRect) -> Option<DirtyRect> {
        let rect = DirtyRect::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        );
        (!rect.is_empty()).then_some(rect)
    }

    pub fn intersects(&self, other: &DirtyRect) -> bool {
        self.intersection(other).is_some()
    }

    pub fn contains(&self, other: &DirtyRect) -> bool {
        if other.is_empty() {
            return true;
        }
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepaintPlan {
    Nothing,
    Partial(DirtyRect),
    Full,
}

/// Owns the persistent viewport buffer and its stale region.
#[derive(Debug, Default)]
pub struct RepaintManager {
    buffer: Option<PixelBuffer>,
    dirty: Option<DirtyRect>,
    focus: Option<TilePos>,
}

impl RepaintManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the buffer match `size` and `focus`.
    ///
    /// Returns whether the previous contents were discarded, either by
    /// reallocation or because a different part of the map is now framed.
    pub fn prepare_buffers(&mut self, size: PixelSize, focus: Option<TilePos>) -> bool {
        let had_buffer = self.buffer.is_some();
        if size.is_empty() {
            self.buffer = None;
            self.dirty = None;
            self.focus = focus;
            return had_buffer;
        }
        let size_changed = self
            .buffer
            .as_ref()
            .is_none_or(|buffer| buffer.size() != size);
        if size_changed {
            debug!(width = size.width, height = size.height, "repaint buffer allocated");
            self.buffer = Some(PixelBuffer::new(size));
            self.focus = focus;
            self.mark_all_dirty();
            return true;
        }
        if self.focus != focus {
            self.focus = focus;
            self.mark_all_dirty();
            return true;
        }
        false
    }

    pub fn buffer(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut PixelBuffer> {
        self.buffer.as_mut()
    }

    pub fn dirty_region(&self) -> Option<DirtyRect> {
        self.dirty
    }

    /// Unions `rect`, clipped to the buffer, into the dirty region.
    pub fn mark_dirty(&mut self, rect: DirtyRect) {
        let Some(buffer) = &self.buffer else {
            return;
        };
        let Some(clipped) = rect.intersection(&buffer.bounds()) else {
            return;
        };
        self.dirty = Some(match self.dirty {
            Some(existing) => existing.union(&clipped),
            None => clipped,
        });
    }

    pub fn mark_all_dirty(&mut self) {
        self.dirty = self.buffer.as_ref().map(PixelBuffer::bounds);
    }

    pub fn is_all_dirty(&self) -> bool {
        match &self.buffer {
            None => true,
            Some(buffer) => self.dirty == Some(buffer.bounds()),
        }
    }

    /// Clears the dirty region once `painted` is known to cover it.
    ///
    /// A painted area that does not contain the dirty region is a caller bug:
    /// it is reported and the region stays pending for the next pass.
    pub fn mark_clean(&mut self, painted: DirtyRect) -> bool {
        let Some(dirty) = self.dirty else {
            return true;
        };
        if painted.contains(&dirty) {
            self.dirty = None;
            return true;
        }
        warn!(
            ?painted,
            ?dirty,
            "mark_clean called with a painted area smaller than the dirty region"
        );
        false
    }

    /// Decides how much of the buffer the next pass has to redraw.
    pub fn repaint_plan(&self) -> RepaintPlan {
        let Some(buffer) = &self.buffer else {
            return RepaintPlan::Full;
        };
        let Some(dirty) = self.dirty else {
            return RepaintPlan::Nothing;
        };
        let total = buffer.bounds().area();
        if dirty == buffer.bounds()
            || (dirty.area() as f32) >= (total as f32) * FULL_REPAINT_RATIO_THRESHOLD
        {
            RepaintPlan::Full
        } else {
            RepaintPlan::Partial(dirty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(width: u32, height: u32) -> RepaintManager {
        let mut manager = RepaintManager::new();
        manager.prepare_buffers(PixelSize::new(width, height), Some(TilePos::new(1, 1)));
        manager.mark_clean(DirtyRect::new(0, 0, width as i32, height as i32));
        manager
    }

    #[test]
    fn new_manager_is_all_dirty_without_buffer() {
        let manager = RepaintManager::new();
        assert!(manager.is_all_dirty());
        assert_eq!(manager.repaint_plan(), RepaintPlan::Full);
        assert_eq!(manager.dirty_region(), None);
    }

    #[test]
    fn prepare_reports_resets() {
        let mut manager = RepaintManager::new();
        let focus = Some(TilePos::new(3, 3));
        assert!(manager.prepare_buffers(PixelSize::new(100, 80), focus));
        assert!(manager.is_all_dirty());
        manager.mark_clean(DirtyRect::new(0, 0, 100, 80));
        assert!(!manager.prepare_buffers(PixelSize::new(100, 80), focus));
        assert!(!manager.is_all_dirty());

        assert!(manager.prepare_buffers(PixelSize::new(100, 80), Some(TilePos::new(4, 3))));
        assert!(manager.is_all_dirty());
        manager.mark_clean(DirtyRect::new(0, 0, 100, 80));

        assert!(manager.prepare_buffers(PixelSize::new(120, 80), Some(TilePos::new(4, 3))));
        assert_eq!(manager.buffer().map(PixelBuffer::size), Some(PixelSize::new(120, 80)));

        assert!(manager.prepare_buffers(PixelSize::new(0, 80), None));
        assert!(manager.buffer().is_none());
        assert!(!manager.prepare_buffers(PixelSize::new(0, 80), None));
    }

    #[test]
    fn dirty_region_grows_by_union_and_never_shrinks() {
        let mut manager = prepared(200, 200);
        let rects = [
            DirtyRect::new(10, 10, 20, 20),
            DirtyRect::new(50, 5, 60, 15),
            DirtyRect::new(15, 15, 18, 18),
            DirtyRect::new(0, 90, 4, 120),
        ];
        let mut previous: Option<DirtyRect> = None;
        for rect in rects {
            manager.mark_dirty(rect);
            let current = manager.dirty_region().expect("dirty");
            assert!(current.contains(&rect));
            if let Some(previous) = previous {
                assert!(current.contains(&previous));
            }
            previous = Some(current);
        }
        assert_eq!(manager.dirty_region(), Some(DirtyRect::new(0, 5, 60, 120)));
    }

    #[test]
    fn dirty_region_is_clipped_to_buffer() {
        let mut manager = prepared(50, 40);
        manager.mark_dirty(DirtyRect::new(-10, 30, 10, 90));
        assert_eq!(manager.dirty_region(), Some(DirtyRect::new(0, 30, 10, 40)));
        manager.mark_dirty(DirtyRect::new(60, 60, 70, 70));
        manager.mark_dirty(DirtyRect::new(5, 5, 5, 9));
        assert_eq!(manager.dirty_region(), Some(DirtyRect::new(0, 30, 10, 40)));
    }

    #[test]
    fn mark_clean_requires_full_coverage() {
        let mut manager = prepared(100, 100);
        manager.mark_dirty(DirtyRect::new(10, 10, 40, 40));

        assert!(!manager.mark_clean(DirtyRect::new(10, 10, 30, 40)));
        assert_eq!(manager.dirty_region(), Some(DirtyRect::new(10, 10, 40, 40)));

        assert!(manager.mark_clean(DirtyRect::new(0, 0, 50, 50)));
        assert_eq!(manager.dirty_region(), None);
        assert_eq!(manager.repaint_plan(), RepaintPlan::Nothing);
    }

    #[test]
    fn large_partial_regions_are_promoted_to_full() {
        let mut manager = prepared(100, 100);
        manager.mark_dirty(DirtyRect::new(0, 0, 10, 10));
        assert_eq!(
            manager.repaint_plan(),
            RepaintPlan::Partial(DirtyRect::new(0, 0, 10, 10))
        );
        manager.mark_dirty(DirtyRect::new(0, 0, 100, 80));
        assert_eq!(manager.repaint_plan(), RepaintPlan::Full);
        assert!(!manager.is_all_dirty());
        manager.mark_all_dirty();
        assert!(manager.is_all_dirty());
    }

    #[test]
    fn rect_helpers_handle_empty_inputs() {
        let empty = DirtyRect::new(5, 5, 5, 10);
        let rect = DirtyRect::new(0, 0, 4, 4);
        assert!(empty.is_empty());
        assert_eq!(rect.union(&empty), rect);
        assert_eq!(empty.union(&rect), rect);
        assert!(rect.contains(&empty));
        assert_eq!(rect.intersection(&DirtyRect::new(4, 0, 8, 4)), None);
        assert!(rect.intersects(&DirtyRect::new(3, 3, 8, 8)));
        assert_eq!(empty.area(), 0);
    }
}
