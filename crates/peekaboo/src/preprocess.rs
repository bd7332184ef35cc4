//! Frame preparation for the detectors.

use crate::image::{AsImageView, Image, ImageView};

/// A camera frame prepared for detection and display.
///
/// Holds the mirrored frame, which the hand detector reads and the annotator later draws on, and a
/// grayscale copy of it for the face detector.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    frame: Image,
    gray: Image,
}

impl Preprocessed {
    /// Returns the mirrored color frame.
    pub fn rgb(&self) -> ImageView<'_> {
        self.frame.as_view()
    }

    /// Returns the grayscale copy of the mirrored frame.
    pub fn gray(&self) -> ImageView<'_> {
        self.gray.as_view()
    }

    /// Consumes `self`, returning the mirrored color frame for annotation.
    pub fn into_frame(self) -> Image {
        self.frame
    }
}

/// Mirrors `frame` horizontally and derives a grayscale copy from the result.
pub fn preprocess(mut frame: Image) -> Preprocessed {
    frame.mirror();
    let gray = frame.to_grayscale();
    Preprocessed { frame, gray }
}
