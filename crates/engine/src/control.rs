use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Instant;

use model::{Direction, MapSize};
use view::{PixelPoint, PixelSize, TileGeometry, clamp_focus_point};

use crate::{EngineError, MAX_LOOKAHEAD_TILES, PrefetchConfig};

/// Scalars shared between the foreground and the producer thread.
///
/// Buffer ownership never goes through here; only the steering state does.
#[derive(Debug, Default)]
pub(crate) struct ScrollControl {
    direction: AtomicU8,
    direction_epoch: AtomicU64,
    aborted: AtomicBool,
    last_frame_rejected: AtomicBool,
}

impl ScrollControl {
    pub(crate) fn direction(&self) -> Option<Direction> {
        Direction::from_code(self.direction.load(Ordering::Acquire))
    }

    /// Stores `direction`; returns whether it differs from the previous one.
    pub(crate) fn set_direction(&self, direction: Option<Direction>) -> bool {
        let code = direction.map_or(0, Direction::code);
        let previous = self.direction.swap(code, Ordering::AcqRel);
        if previous == code {
            return false;
        }
        self.direction_epoch.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Bumped on every direction change; a frame rendered under an older
    /// epoch is stale.
    pub(crate) fn direction_epoch(&self) -> u64 {
        self.direction_epoch.load(Ordering::Acquire)
    }

    /// Epoch and direction to render the next frame with.
    ///
    /// The epoch is loaded before the direction while `set_direction` stores
    /// the direction before bumping the epoch, so a read racing a change
    /// yields an epoch that is already outdated at handoff.
    pub(crate) fn steering(&self) -> (u64, Option<Direction>) {
        self.steering_with(|| {})
    }

    fn steering_with(&self, between_loads: impl FnOnce()) -> (u64, Option<Direction>) {
        let epoch = self.direction_epoch();
        between_loads();
        (epoch, self.direction())
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Returns `true` only for the call that actually aborted.
    pub(crate) fn abort(&self) -> bool {
        !self.aborted.swap(true, Ordering::AcqRel)
    }

    /// Records whether the latest received frame went unused and returns the
    /// previous answer.
    pub(crate) fn record_rejection(&self, rejected: bool) -> bool {
        self.last_frame_rejected.swap(rejected, Ordering::AcqRel)
    }
}

/// Focus point and the instant it was last delivered, published together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusSnapshot {
    pub point: PixelPoint,
    pub delivered_at: Instant,
}

/// Fixed projection parameters of one engine instance.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameProjection {
    pub(crate) viewport: PixelSize,
    pub(crate) geometry: TileGeometry,
    pub(crate) map: MapSize,
    pub(crate) margin: u32,
    pub(crate) pixels_per_milli: f32,
    buffer: PixelSize,
}

impl FrameProjection {
    pub(crate) fn new(
        viewport: PixelSize,
        geometry: TileGeometry,
        map: MapSize,
        config: PrefetchConfig,
    ) -> Result<Self, EngineError> {
        if viewport.is_empty() {
            return Err(EngineError::EmptyViewport);
        }
        if !config.pixels_per_milli.is_finite() || config.pixels_per_milli < 0.0 {
            return Err(EngineError::InvalidSpeed(config.pixels_per_milli));
        }
        let tiles = config.lookahead_tiles;
        if !(1..=MAX_LOOKAHEAD_TILES).contains(&tiles) {
            return Err(EngineError::InvalidLookahead(tiles));
        }
        let too_large = EngineError::BufferTooLarge {
            viewport,
            lookahead_tiles: tiles,
        };
        let margin = geometry.lookahead_margin(tiles);
        let buffer = margin.and_then(|margin| viewport.inflate(margin));
        let (Some(margin), Some(buffer)) = (margin, buffer) else {
            return Err(too_large);
        };
        // Buffer offsets are computed in signed pixels.
        if i32::try_from(buffer.width).is_err() || i32::try_from(buffer.height).is_err() {
            return Err(too_large);
        }
        Ok(Self {
            viewport,
            geometry,
            map,
            margin,
            pixels_per_milli: config.pixels_per_milli,
            buffer,
        })
    }

    pub(crate) fn buffer_size(&self) -> PixelSize {
        self.buffer
    }

    /// Focus point expected at `at` when scrolling in `direction` since the
    /// snapshot was delivered.
    pub(crate) fn predict(
        &self,
        snapshot: &FocusSnapshot,
        direction: Option<Direction>,
        at: Instant,
    ) -> PixelPoint {
        let Some(direction) = direction else {
            return snapshot.point;
        };
        let elapsed_ms = at.saturating_duration_since(snapshot.delivered_at).as_secs_f64() * 1000.0;
        let distance = (elapsed_ms * f64::from(self.pixels_per_milli)).round();
        let distance = distance.min(f64::from(i32::MAX / 2)) as i32;
        let (dx, dy) = direction.pixel_delta();
        let point = snapshot
            .point
            .offset(dx.saturating_mul(distance), dy.saturating_mul(distance));
        clamp_focus_point(point, self.viewport, self.geometry, self.map)
    }

    /// Map pixel shown at the buffer's top-left corner for a frame rendered
    /// around `focus`.
    pub(crate) fn buffer_origin(&self, focus: PixelPoint) -> PixelPoint {
        focus.offset(
            -((self.viewport.width / 2) as i32) - self.margin as i32,
            -((self.viewport.height / 2) as i32) - self.margin as i32,
        )
    }

    /// Position of the viewport window inside a buffer rendered around
    /// `rendered`, or `None` when the window would leave the buffer.
    pub(crate) fn crop_origin(&self, rendered: PixelPoint, desired: PixelPoint) -> Option<PixelPoint> {
        let (dx, dy) = rendered.delta_to(desired);
        let margin = i64::from(self.margin);
        let x = margin + i64::from(dx);
        let y = margin + i64::from(dy);
        let span = 2 * margin;
        if !(0..=span).contains(&x) || !(0..=span).contains(&y) {
            return None;
        }
        Some(PixelPoint::new(x as i32, y as i32))
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) rendered: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) starved: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> EngineStats {
        EngineStats {
            frames_rendered: self.rendered.load(Ordering::Relaxed),
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            frames_discarded: self.discarded.load(Ordering::Relaxed),
            frames_rejected: self.rejected.load(Ordering::Relaxed),
            starvation_warnings: self.starved.load(Ordering::Relaxed),
        }
    }
}

/// Counters describing how well prefetching keeps up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub frames_rendered: u64,
    pub frames_delivered: u64,
    /// Rendered for a direction that changed before handoff.
    pub frames_discarded: u64,
    /// Received by the consumer but too stale to crop.
    pub frames_rejected: u64,
    /// Rejections that followed another rejection.
    pub starvation_warnings: u64,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn projection() -> FrameProjection {
        FrameProjection::new(
            PixelSize::new(64, 32),
            TileGeometry::new(16, 8).expect("geometry"),
            MapSize::new(1000, 1000),
            PrefetchConfig::default(),
        )
        .expect("projection")
    }

    #[test]
    fn direction_changes_bump_the_epoch() {
        let control = ScrollControl::default();
        assert_eq!(control.direction(), None);
        assert!(control.set_direction(Some(Direction::E)));
        assert_eq!(control.direction_epoch(), 1);
        assert!(!control.set_direction(Some(Direction::E)));
        assert_eq!(control.direction_epoch(), 1);
        assert!(control.set_direction(None));
        assert_eq!(control.direction_epoch(), 2);
        assert_eq!(control.direction(), None);
    }

    #[test]
    fn steering_read_racing_a_direction_change_is_outdated() {
        let control = ScrollControl::default();
        control.set_direction(Some(Direction::E));
        let (epoch, direction) = control.steering_with(|| {
            control.set_direction(Some(Direction::S));
        });
        assert_eq!(direction, Some(Direction::S));
        assert_ne!(epoch, control.direction_epoch());

        let (epoch, direction) = control.steering();
        assert_eq!(direction, Some(Direction::S));
        assert_eq!(epoch, control.direction_epoch());
    }

    #[test]
    fn projection_validates_lookahead() {
        let geometry = TileGeometry::new(16, 8).expect("geometry");
        let viewport = PixelSize::new(64, 32);
        let map = MapSize::new(10, 10);
        let with_tiles = |lookahead_tiles| {
            FrameProjection::new(
                viewport,
                geometry,
                map,
                PrefetchConfig {
                    lookahead_tiles,
                    ..PrefetchConfig::default()
                },
            )
        };
        assert!(matches!(with_tiles(0), Err(EngineError::InvalidLookahead(0))));
        assert!(matches!(
            with_tiles(MAX_LOOKAHEAD_TILES + 1),
            Err(EngineError::InvalidLookahead(_))
        ));
        assert!(matches!(
            with_tiles(u32::MAX),
            Err(EngineError::InvalidLookahead(_))
        ));
        let widest = with_tiles(MAX_LOOKAHEAD_TILES).expect("projection");
        assert_eq!(widest.margin, 16 * MAX_LOOKAHEAD_TILES);

        let huge_tiles = TileGeometry::new(1 << 30, 8).expect("geometry");
        assert!(matches!(
            FrameProjection::new(viewport, huge_tiles, map, PrefetchConfig::default()),
            Err(EngineError::BufferTooLarge { .. })
        ));
    }

    #[test]
    fn abort_reports_only_the_first_call() {
        let control = ScrollControl::default();
        assert!(control.abort());
        assert!(!control.abort());
        assert!(control.is_aborted());
    }

    #[test]
    fn prediction_moves_along_the_direction() {
        let projection = projection();
        let start = Instant::now();
        let snapshot = FocusSnapshot {
            point: PixelPoint::new(4000, 2000),
            delivered_at: start,
        };
        let later = start + Duration::from_millis(100);
        assert_eq!(
            projection.predict(&snapshot, Some(Direction::E), later),
            PixelPoint::new(4050, 2000)
        );
        assert_eq!(
            projection.predict(&snapshot, Some(Direction::NW), later),
            PixelPoint::new(3950, 1950)
        );
        assert_eq!(projection.predict(&snapshot, None, later), snapshot.point);
        // Instants before the snapshot do not move backwards.
        assert_eq!(
            projection.predict(&snapshot, Some(Direction::E), start - Duration::from_millis(5)),
            snapshot.point
        );
    }

    #[test]
    fn prediction_stops_at_the_map_edge() {
        let projection = projection();
        let snapshot = FocusSnapshot {
            point: PixelPoint::new(40, 2000),
            delivered_at: Instant::now(),
        };
        let later = snapshot.delivered_at + Duration::from_secs(10);
        let predicted = projection.predict(&snapshot, Some(Direction::W), later);
        assert_eq!(predicted, PixelPoint::new(32, 2000));
    }

    #[test]
    fn crop_stays_inside_the_oversized_buffer() {
        let projection = projection();
        let rendered = PixelPoint::new(500, 500);
        assert_eq!(
            projection.crop_origin(rendered, rendered),
            Some(PixelPoint::new(32, 32))
        );
        assert_eq!(
            projection.crop_origin(rendered, rendered.offset(32, -32)),
            Some(PixelPoint::new(64, 0))
        );
        assert_eq!(projection.crop_origin(rendered, rendered.offset(33, 0)), None);
        assert_eq!(projection.crop_origin(rendered, rendered.offset(0, -33)), None);
        assert_eq!(projection.buffer_size(), PixelSize::new(128, 96));
        assert_eq!(
            projection.buffer_origin(rendered),
            PixelPoint::new(500 - 32 - 32, 500 - 16 - 32)
        );
    }
}
