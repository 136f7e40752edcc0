//! The frame source seam.
//!
//! Camera acquisition is an external concern; the recognition loop only
//! needs "give me the next frame, or nothing right now".

use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    #[error("capture failed: {0}")]
    Capture(String),
}

/// Contract for whatever feeds frames to the recognition loop.
pub trait FrameSource {
    /// Return the next frame, or `None` if nothing is available yet.
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, SourceError>;
}

/// Frame source used when no camera integration is wired in.
/// Never yields a frame; the recognition loop idles.
pub struct IdleSource;

impl FrameSource for IdleSource {
    fn next_frame(&mut self) -> Result<Option<DynamicImage>, SourceError> {
        Ok(None)
    }
}
