use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use model::{GridMap, TilePos};
use renderer::{BACKGROUND, RenderError, TileCanvas, TileContext};

use super::*;

const TILE_WIDTH: u32 = 16;
const TILE_HEIGHT: u32 = 8;

fn tile_renderer<F>(draw: F) -> Arc<dyn TileRenderer>
where
    F: Fn(&mut TileCanvas<'_>, &TileContext) -> Result<(), RenderError> + Send + Sync + 'static,
{
    Arc::new(draw)
}

fn generation_renderer() -> Arc<dyn TileRenderer> {
    tile_renderer(|canvas, _context| {
        let color = canvas.generation() as u32;
        let (width, height) = (canvas.width(), canvas.height());
        canvas.fill_rect(0, 0, width, height, color);
        Ok(())
    })
}

fn scene(renderer: Arc<dyn TileRenderer>) -> PrefetchScene {
    let geometry = TileGeometry::new(TILE_WIDTH, TILE_HEIGHT).expect("geometry");
    PrefetchScene {
        map: Arc::new(GridMap::fully_explored(1000, 1000)),
        renderer,
        options: Arc::new(ArcSwap::from_pointee(RenderOptions::default())),
        geometry,
        viewport: PixelSize::new(64, 32),
        focus: geometry.tile_center_in_map(TilePos::new(500, 500)),
        render_estimate: Duration::ZERO,
    }
}

fn engine(renderer: Arc<dyn TileRenderer>) -> PrefetchEngine {
    PrefetchEngine::new(scene(renderer), PrefetchConfig::default()).expect("engine")
}

fn assert_single_generation(frame: &FrameView) {
    let expected = frame.generation() as u32;
    let size = frame.size();
    let mut drawn = 0;
    for y in 0..size.height {
        for x in 0..size.width {
            let pixel = frame.pixel(x, y).expect("pixel inside view");
            assert!(
                pixel == BACKGROUND || pixel == expected,
                "pixel {pixel:#x} at ({x}, {y}) written by another pass than {expected}"
            );
            drawn += usize::from(pixel == expected);
        }
    }
    assert!(drawn > 0);
}

#[test]
fn idle_engine_does_not_start_a_worker() {
    let engine = engine(generation_renderer());
    assert_eq!(engine.state(), EngineState::Idle);
    engine.set_direction(None).expect("set direction");
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.stats(), EngineStats::default());
}

#[test]
fn rejects_unusable_setups() {
    let mut empty = scene(generation_renderer());
    empty.viewport = PixelSize::new(0, 32);
    assert!(matches!(
        PrefetchEngine::new(empty, PrefetchConfig::default()),
        Err(EngineError::EmptyViewport)
    ));

    let config = PrefetchConfig {
        pixels_per_milli: f32::NAN,
        ..PrefetchConfig::default()
    };
    assert!(matches!(
        PrefetchEngine::new(scene(generation_renderer()), config),
        Err(EngineError::InvalidSpeed(_))
    ));

    let config = PrefetchConfig {
        lookahead_tiles: 0,
        ..PrefetchConfig::default()
    };
    assert!(matches!(
        PrefetchEngine::new(scene(generation_renderer()), config),
        Err(EngineError::InvalidLookahead(0))
    ));
}

#[test]
fn render_estimate_is_scaled_to_the_oversized_buffer() {
    let viewport = PixelSize::new(64, 32);
    let buffer = PixelSize::new(128, 96);
    assert_eq!(
        scale_by_area(Duration::from_millis(10), buffer, viewport),
        Duration::from_millis(60)
    );
    assert_eq!(
        scale_by_area(Duration::ZERO, buffer, viewport),
        Duration::ZERO
    );
    assert_eq!(
        scale_by_area(Duration::MAX, buffer, viewport),
        Duration::MAX
    );
}

#[test]
fn polling_never_blocks_and_reports_a_stopped_engine() {
    let engine = engine(generation_renderer());
    assert!(matches!(engine.try_get_frame(), Ok(None)));

    engine.set_direction(Some(Direction::E)).expect("set direction");
    let deadline = Instant::now() + Duration::from_secs(5);
    let frame = loop {
        if let Some(frame) = engine.try_get_frame().expect("engine running") {
            break frame;
        }
        assert!(Instant::now() < deadline, "no frame was delivered");
        thread::sleep(Duration::from_millis(1));
    };
    assert_single_generation(&frame);
    drop(frame);

    engine.stop();
    assert!(matches!(engine.try_get_frame(), Err(EngineError::Stopped)));
}

#[test]
fn slow_consumer_starves_and_is_warned_about() {
    let config = PrefetchConfig {
        pixels_per_milli: 5.0,
        lookahead_tiles: 2,
    };
    let engine = PrefetchEngine::new(scene(generation_renderer()), config).expect("engine");
    let start = engine.focus_point();
    engine.set_direction(Some(Direction::E)).expect("set direction");

    // Every pending frame is about 40ms old when polled, i.e. 200 pixels
    // behind, far past the 32 pixel margin.
    for _ in 0..5 {
        thread::sleep(Duration::from_millis(40));
        assert!(engine.try_get_frame().expect("engine running").is_none());
    }

    let stats = engine.stats();
    assert_eq!(stats.frames_delivered, 0);
    assert!(stats.frames_rejected >= 2, "{stats:?}");
    assert!(stats.starvation_warnings >= 1, "{stats:?}");
    assert_eq!(engine.focus_point(), start);
    assert!(engine.desired_focus().x > start.x);
}

#[test]
fn frames_are_never_observed_while_being_rendered() {
    let engine = engine(generation_renderer());
    let start = engine.focus_point();
    engine.set_direction(Some(Direction::E)).expect("set direction");
    assert_eq!(engine.state(), EngineState::Scrolling);

    let mut last_generation = 0;
    for _ in 0..12 {
        let frame = engine.get_frame().expect("frame");
        let generation = frame.generation();
        assert!(generation > last_generation, "frames arrive in render order");
        last_generation = generation;

        assert_single_generation(&frame);
        // Give the producer time to render into its other buffer meanwhile.
        thread::sleep(Duration::from_millis(2));
        assert_eq!(frame.generation(), generation);
        assert_single_generation(&frame);
        assert_eq!(frame.direction(), Some(Direction::E));
    }

    assert!(engine.focus_point().x > start.x);
    assert_eq!(engine.focus_point().y, start.y);
    let stats = engine.stats();
    assert!(stats.frames_delivered >= 12);
    assert!(stats.frames_rendered >= stats.frames_delivered);
}

#[test]
fn stop_is_idempotent_and_releases_blocked_consumers() {
    let engine = engine(generation_renderer());
    thread::scope(|scope| {
        let consumer = scope.spawn(|| engine.get_frame().is_none());
        thread::sleep(Duration::from_millis(50));
        engine.stop();
        engine.stop();
        assert!(consumer.join().expect("consumer thread"));
    });

    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(engine.get_frame().is_none());
    assert!(matches!(
        engine.set_direction(Some(Direction::N)),
        Err(EngineError::Stopped)
    ));
}

#[test]
fn stop_while_scrolling_halts_production() {
    let engine = engine(generation_renderer());
    engine.set_direction(Some(Direction::S)).expect("set direction");
    drop(engine.get_frame().expect("frame"));

    engine.stop();
    thread::sleep(Duration::from_millis(50));
    let rendered = engine.stats().frames_rendered;
    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.stats().frames_rendered, rendered);
    assert!(engine.get_frame().is_none());
}

#[test]
fn direction_change_discards_the_frame_in_flight() {
    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);
    let first_call = AtomicBool::new(true);
    let engine = engine(tile_renderer(move |canvas, _context| {
        if first_call.swap(false, Ordering::SeqCst) {
            let _ = started_tx.send(());
            let _ = gate_rx.recv();
        }
        let color = canvas.generation() as u32;
        canvas.put_pixel(0, 0, color);
        Ok(())
    }));

    engine.set_direction(Some(Direction::E)).expect("set direction");
    started_rx.recv().expect("first frame started");
    engine.set_direction(Some(Direction::S)).expect("set direction");
    gate_tx.send(()).expect("release renderer");

    let frame = engine.get_frame().expect("frame");
    assert_eq!(frame.direction(), Some(Direction::S));
    assert!(frame.generation() >= 2);
    assert!(engine.stats().frames_discarded >= 1);
}

#[test]
fn stale_frames_are_rejected_until_a_fresh_one_arrives() {
    let last_generation = AtomicU64::new(0);
    let engine = engine(tile_renderer(move |canvas, _context| {
        let generation = canvas.generation();
        if last_generation.swap(generation, Ordering::SeqCst) != generation {
            thread::sleep(Duration::from_millis(30));
        }
        Ok(())
    }));

    engine.set_direction(Some(Direction::E)).expect("set direction");
    // The first frames are predicted for the first few milliseconds; by now
    // the view has moved about 100 pixels, far past the 32 pixel margin.
    thread::sleep(Duration::from_millis(200));

    let frame = engine.get_frame().expect("frame");
    assert!(frame.generation() >= 2);
    let stats = engine.stats();
    assert!(stats.frames_rejected >= 1);
    assert_eq!(stats.frames_delivered, 1);
}
