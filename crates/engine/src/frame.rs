use crossbeam_channel::Sender;
use model::Direction;
use renderer::PixelBuffer;
use view::{PixelPoint, PixelSize};

/// A completed frame travelling from the producer to the consumer.
#[derive(Debug)]
pub(crate) struct RenderedFrame {
    pub(crate) buffer: PixelBuffer,
    pub(crate) focus: PixelPoint,
    pub(crate) direction: Option<Direction>,
    pub(crate) epoch: u64,
}

/// A delivered frame, cropped to the viewport.
///
/// The view owns its buffer until dropped, at which point the buffer goes
/// back to the producer for reuse. Holding more than one view at a time
/// starves the producer of buffers.
#[derive(Debug)]
pub struct FrameView {
    buffer: PixelBuffer,
    crop_origin: PixelPoint,
    viewport: PixelSize,
    focus: PixelPoint,
    direction: Option<Direction>,
    recycle: Sender<PixelBuffer>,
}

impl FrameView {
    pub(crate) fn new(
        frame: RenderedFrame,
        crop_origin: PixelPoint,
        viewport: PixelSize,
        focus: PixelPoint,
        recycle: Sender<PixelBuffer>,
    ) -> Self {
        Self {
            buffer: frame.buffer,
            crop_origin,
            viewport,
            focus,
            direction: frame.direction,
            recycle,
        }
    }

    /// The full oversized buffer the frame was rendered into.
    pub fn source(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Top-left of the viewport window inside [`FrameView::source`].
    pub fn crop_origin(&self) -> PixelPoint {
        self.crop_origin
    }

    pub fn size(&self) -> PixelSize {
        self.viewport
    }

    /// Map pixel at the centre of the cropped view.
    pub fn focus(&self) -> PixelPoint {
        self.focus
    }

    /// Scroll direction the frame was rendered for.
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn generation(&self) -> u64 {
        self.buffer.generation()
    }

    /// Pixel at `(x, y)` of the cropped view.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.viewport.width || y >= self.viewport.height {
            return None;
        }
        self.buffer.pixel(
            (self.crop_origin.x as u32) + x,
            (self.crop_origin.y as u32) + y,
        )
    }

    /// Copies the cropped view into `target`, which should be viewport-sized.
    pub fn blit_into(&self, target: &mut PixelBuffer) {
        target.copy_window_from(&self.buffer, self.crop_origin);
    }
}

impl Drop for FrameView {
    fn drop(&mut self) {
        let buffer = std::mem::replace(&mut self.buffer, PixelBuffer::new(PixelSize::default()));
        // The producer may already be gone; the buffer is simply freed then.
        let _ = self.recycle.try_send(buffer);
    }
}
