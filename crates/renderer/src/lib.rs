//! Renderer crate root.
//!
//! This crate owns everything that turns viewport bounds into pixels:
//! - `surface`: CPU pixel buffers and the per-tile drawing canvas.
//! - `dirty`: the persistent repaint buffer and its stale region.
//! - `tile_pass`: the row-major per-tile render pass with failure isolation.
//! - `panic_hook`: keeps panics caught by the pass out of the panic output.
//!
//! Tile content itself comes from a [`TileRenderer`] supplied by the caller.

mod dirty;
mod panic_hook;
mod surface;
mod tile_pass;

use std::any::Any;

use model::TilePos;
use view::TileGeometry;

pub use dirty::{DirtyRect, FULL_REPAINT_RATIO_THRESHOLD, RepaintManager, RepaintPlan};
pub use surface::{BACKGROUND, PixelBuffer, TileCanvas};
pub use tile_pass::{
    FAILURE_LOG_INTERVAL, FailureThrottle, TilePassStats, TileSource, render_tiles,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("tile render failed: {reason}")]
    Failed { reason: String },
    #[error("tile asset missing: {0}")]
    MissingAsset(String),
    #[error("tile renderer panicked: {0}")]
    Panicked(String),
}

impl RenderError {
    /// Converts a `catch_unwind` payload into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        RenderError::Panicked(message)
    }

    /// Appends the panic's source location, when known, to a panic message.
    pub fn at_location(self, location: Option<String>) -> Self {
        match (self, location) {
            (RenderError::Panicked(message), Some(location)) => {
                RenderError::Panicked(format!("{message} (at {location})"))
            }
            (error, _) => error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderQuality {
    Lowest,
    #[default]
    Normal,
    High,
}

/// Global drawing options, read fresh at the start of every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    pub terrain_animation: bool,
    pub quality: RenderQuality,
}

/// What a renderer needs to know about the tile it is drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileContext {
    pub tile: TilePos,
    pub explored: bool,
    pub options: RenderOptions,
    pub geometry: TileGeometry,
}

/// Draws the content of one tile.
///
/// Implementations must only draw inside the canvas they are given; an
/// error or panic leaves that tile incomplete without affecting the others.
pub trait TileRenderer: Send + Sync {
    fn render_tile(
        &self,
        canvas: &mut TileCanvas<'_>,
        context: &TileContext,
    ) -> Result<(), RenderError>;
}

impl<F> TileRenderer for F
where
    F: Fn(&mut TileCanvas<'_>, &TileContext) -> Result<(), RenderError> + Send + Sync,
{
    fn render_tile(
        &self,
        canvas: &mut TileCanvas<'_>,
        context: &TileContext,
    ) -> Result<(), RenderError> {
        self(canvas, context)
    }
}
