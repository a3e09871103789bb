use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mapview::{DEFAULT_LOG_FILTER, DisplayOutcome, MapPainter, ViewerConfig, init_logging};
use model::{Direction, GridMap, MapGrid, TilePos};
use renderer::{PixelBuffer, RenderError, RenderQuality, TileCanvas, TileContext, TileRenderer};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Scroll a generated tile map through the prefetch pipeline")]
struct Arguments {
    /// Viewer configuration (JSON). Defaults apply when omitted.
    #[arg(long, short = 'c', value_parser)]
    config: Option<PathBuf>,
    /// Map width in tiles.
    #[arg(long, default_value_t = 120)]
    map_width: u32,
    /// Map height in tile rows.
    #[arg(long, default_value_t = 240)]
    map_height: u32,
    /// Scroll direction.
    #[arg(long, value_enum, default_value = "east")]
    direction: ScrollDirection,
    /// Number of frames to display while scrolling.
    #[arg(long, default_value_t = 90)]
    frames: u32,
    /// Delay between displayed frames, in milliseconds.
    #[arg(long, default_value_t = 16)]
    frame_interval_ms: u64,
    /// Where to write the last displayed frame.
    #[arg(long, short = 'o', value_parser, default_value = "target/mapview/last_frame.png")]
    output: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum ScrollDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl From<ScrollDirection> for Direction {
    fn from(value: ScrollDirection) -> Self {
        match value {
            ScrollDirection::North => Direction::N,
            ScrollDirection::NorthEast => Direction::NE,
            ScrollDirection::East => Direction::E,
            ScrollDirection::SouthEast => Direction::SE,
            ScrollDirection::South => Direction::S,
            ScrollDirection::SouthWest => Direction::SW,
            ScrollDirection::West => Direction::W,
            ScrollDirection::NorthWest => Direction::NW,
        }
    }
}

const TERRAIN_PALETTE: [u32; 4] = [0xFF3A_7D44, 0xFF2F_5D8A, 0xFFC2_B280, 0xFF6B_6B6B];
const FOG: u32 = 0xFF1C_1C1C;
const MARKER: u32 = 0xFFF0_F0F0;

/// Flat-coloured diamonds; terrain type is derived from the coordinates.
struct DemoTileRenderer;

impl TileRenderer for DemoTileRenderer {
    fn render_tile(
        &self,
        canvas: &mut TileCanvas<'_>,
        context: &TileContext,
    ) -> Result<(), RenderError> {
        if !context.explored {
            canvas.fill_diamond(FOG);
            return Ok(());
        }
        let terrain = (context.tile.x.wrapping_mul(7) ^ context.tile.y.wrapping_mul(13)) as usize;
        canvas.fill_diamond(TERRAIN_PALETTE[terrain % TERRAIN_PALETTE.len()]);
        if context.options.quality == RenderQuality::High {
            let (width, height) = (canvas.width() as i32, canvas.height() as i32);
            canvas.fill_rect(width / 2 - 1, height / 2 - 1, 2, 2, MARKER);
        }
        Ok(())
    }
}

fn build_map(width: u32, height: u32) -> Result<GridMap> {
    let mut map = GridMap::new(width, height);
    for y in 0..height {
        for x in 0..width {
            // Leave a sparse pattern of unexplored tiles.
            let explored = (u64::from(x) * 3 + u64::from(y) * 5) % 11 != 0;
            map.set_explored(TilePos::new(x, y), explored)
                .context("mark generated tile")?;
        }
    }
    Ok(map)
}

fn main() -> Result<()> {
    let arguments = Arguments::parse();
    init_logging(DEFAULT_LOG_FILTER);

    let config = match &arguments.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("load viewer config {}", path.display()))?,
        None => ViewerConfig::default(),
    };
    let map = build_map(arguments.map_width, arguments.map_height)?;
    info!(
        width = map.width(),
        height = map.height(),
        explored = map.explored_count(),
        "map generated"
    );

    let mut painter = MapPainter::new(Arc::new(map), Arc::new(DemoTileRenderer), &config)
        .context("create map painter")?;
    painter.change_focus(Some(TilePos::new(
        arguments.map_width / 2,
        arguments.map_height / 2,
    )));

    let mut target = PixelBuffer::new(config.viewport_size());
    let outcome = painter.display_frame(&mut target);
    info!(?outcome, "initial frame displayed");

    let direction = Direction::from(arguments.direction);
    painter
        .set_scroll_direction(Some(direction))
        .context("start scrolling")?;
    let (mut prefetched, mut fallback) = (0_u32, 0_u32);
    for _ in 0..arguments.frames {
        match painter.display_frame(&mut target) {
            DisplayOutcome::Prefetched { .. } => prefetched += 1,
            DisplayOutcome::Fallback => fallback += 1,
            _ => {}
        }
        thread::sleep(Duration::from_millis(arguments.frame_interval_ms));
    }
    if let Some(stats) = painter.engine_stats() {
        info!(
            prefetched,
            fallback,
            rendered = stats.frames_rendered,
            delivered = stats.frames_delivered,
            discarded = stats.frames_discarded,
            rejected = stats.frames_rejected,
            starved = stats.starvation_warnings,
            "scroll finished"
        );
    }

    painter
        .set_scroll_direction(None)
        .context("stop scrolling")?;
    let outcome = painter.display_frame(&mut target);
    info!(?outcome, focus = ?painter.viewport().focus(), "final frame displayed");

    if let Some(parent) = arguments.output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create output directory {}", parent.display()))?;
    }
    let image = image::RgbaImage::from_raw(target.width(), target.height(), target.as_rgba8())
        .context("frame buffer does not match its size")?;
    image
        .save(&arguments.output)
        .with_context(|| format!("write {}", arguments.output.display()))?;
    info!(path = %arguments.output.display(), "last frame written");
    Ok(())
}
