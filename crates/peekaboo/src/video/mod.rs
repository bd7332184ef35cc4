//! Video input.
//!
//! A [`StreamSource`] opens a [`FrameStream`] for a URL. The only source shipped with the crate is
//! [`HttpCamera`], a client for IP cameras serving MJPEG (or single JPEG snapshots) over HTTP.

mod httpcam;

pub use httpcam::{HttpCamera, HttpStream};

use url::Url;

use crate::image::Image;
use crate::timer::Timer;

/// Something that can open video streams.
pub trait StreamSource {
    type Stream: FrameStream;

    /// Opens the stream at `url`.
    ///
    /// Fails if the URL is not supported, the endpoint is unreachable, or it doesn't serve a
    /// supported stream format.
    fn open(&mut self, url: &Url) -> anyhow::Result<Self::Stream>;
}

/// An open, pull-based video stream.
pub trait FrameStream {
    /// Blocks until the next frame is available and returns it.
    ///
    /// Errors are not necessarily permanent: calling `read` again after a failure retries.
    fn read(&mut self) -> anyhow::Result<Image>;

    /// Timers of the stream's receive and decode stages, logged along with the frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: FrameStream + ?Sized> FrameStream for Box<S> {
    fn read(&mut self) -> anyhow::Result<Image> {
        (**self).read()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}
