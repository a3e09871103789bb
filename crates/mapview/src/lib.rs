//! Map view glue: the display loop, configuration and logging setup.
//!
//! [`MapPainter`] is the surface a host toolkit drives. It owns the
//! foreground view state and the repaint buffer, and runs a prefetch engine
//! for the duration of each scroll.

mod config;
mod logging;
mod painter;

pub use config::{ConfigError, PrefetchSettings, QualitySetting, RenderSettings, ViewerConfig};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use painter::{DisplayOutcome, MapPainter};
