//! Frame storage and pixel access.
//!
//! Frames are decoded into an [`Image`]. Detectors never copy a frame to look at part of it;
//! they read through an [`ImageView`], which may be offset, scaled to a different size or rotated
//! relative to the frame. Annotations are drawn with the functions in [`draw`].

pub mod draw;
mod jpeg;

#[cfg(test)]
mod tests;

use std::fmt;

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{imageops, Rgba, RgbaImage};

pub use crate::rect::{Rect, RotatedRect};
pub use crate::resolution::{AspectRatio, Resolution};
pub use jpeg::JpegBackend;

/// An owned RGBA8 frame.
#[derive(Clone)]
pub struct Image {
    // Stored as RGBA so the display can upload it to a texture as-is.
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Decodes a single JPEG frame, as delivered by MJPEG cameras.
    pub fn decode_jpeg(data: &[u8], backend: JpegBackend) -> anyhow::Result<Self> {
        jpeg::decode_jpeg(data, backend)
    }

    /// Creates a black, fully transparent image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: RgbaImage::new(width, height),
        }
    }

    /// Builds an image of size `res` by calling `f` for every pixel.
    pub fn from_fn(res: Resolution, mut f: impl FnMut(u32, u32) -> Color) -> Self {
        Self {
            buf: RgbaImage::from_fn(res.width(), res.height(), |x, y| Rgba(f(x, y).0)),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// The area covered by this image, with its top left corner at the origin.
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }

    /// Reads the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics when the coordinates are out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Overwrites the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics when the coordinates are out of bounds.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Sets the pixel at `(x, y)` if it lies inside the image, and does nothing otherwise.
    pub(crate) fn put(&mut self, x: i32, y: i32, color: Color) {
        if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
            if x < self.width() && y < self.height() {
                self.set(x, y, color);
            }
        }
    }

    /// Fills the whole image with `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }

    /// Returns a view of the part of this image covered by `area`.
    ///
    /// `area` may be rotated and may extend past the image borders. Pixels of the view that fall
    /// outside of the image read as [`Color::NULL`].
    pub fn view(&self, area: impl Into<RotatedRect>) -> ImageView<'_> {
        ImageView {
            image: self,
            area: area.into(),
        }
    }

    /// Mirrors the image along its vertical axis, returning the result.
    pub fn mirrored(&self) -> Image {
        Image {
            buf: imageops::flip_horizontal(&self.buf),
        }
    }

    /// Mirrors the image along its vertical axis.
    pub fn mirror(&mut self) {
        imageops::flip_horizontal_in_place(&mut self.buf);
    }

    /// Returns an opaque copy holding only the luminance of each pixel.
    ///
    /// Red, green and blue of every output pixel are equal.
    pub fn to_grayscale(&self) -> Image {
        let luma = imageops::grayscale(&self.buf);
        Image::from_fn(self.resolution(), |x, y| {
            let l = luma[(x, y)].0[0];
            Color::from_rgb8(l, l, l)
        })
    }

    /// Raw pixel bytes in RGBA order, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({})", self.resolution())
    }
}

/// A read-only window onto an [`Image`].
///
/// The window is described by a [`RotatedRect`] in the image's pixel space. Its pixel grid has the
/// size of that rectangle, and pixel `(0, 0)` sits at the rectangle's (rotated) top left corner.
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    area: RotatedRect,
}

impl<'a> ImageView<'a> {
    pub fn width(&self) -> u32 {
        self.area.rect().width() as u32
    }

    pub fn height(&self) -> u32 {
        self.area.rect().height() as u32
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// The area covered by this view in its own coordinates, with the top left corner at the
    /// origin.
    pub fn rect(&self) -> Rect {
        let r = self.area.rect();
        Rect::from_top_left(0.0, 0.0, r.width(), r.height())
    }

    /// Reads the pixel at view coordinates `(x, y)`.
    ///
    /// Pixels that map outside of the image are [`Color::NULL`].
    pub fn get(&self, x: u32, y: u32) -> Color {
        match self.source_pixel(x, y) {
            Some((x, y)) => self.image.get(x, y),
            None => Color::NULL,
        }
    }

    /// Narrows this view to `area`, given in this view's coordinates.
    pub fn view(&self, area: impl Into<RotatedRect>) -> ImageView<'a> {
        let area: RotatedRect = area.into();
        let (cx, cy) = area.rect().center();
        let [cx, cy] = self.area.transform_out(cx, cy);
        let (w, h) = (area.rect().width(), area.rect().height());
        let radians = self.area.rotation_radians() + area.rotation_radians();

        ImageView {
            image: self.image,
            area: RotatedRect::new(Rect::from_center(cx, cy, w, h), radians),
        }
    }

    /// Copies the visible pixels into a new [`Image`].
    pub fn to_image(&self) -> Image {
        Image::from_fn(self.resolution(), |x, y| self.get(x, y))
    }

    /// Maps a view pixel to the image pixel whose center is nearest to it.
    fn source_pixel(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        let [sx, sy] = self.area.transform_out(x as f32 + 0.5, y as f32 + 0.5);
        let (sx, sy) = ((sx - 0.5).round(), (sy - 0.5).round());
        let inside = sx >= 0.0
            && sy >= 0.0
            && sx < self.image.width() as f32
            && sy < self.image.height() as f32;
        inside.then_some((sx as u32, sy as u32))
    }
}

impl fmt::Debug for ImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageView({} at {:?})", self.resolution(), self.area)
    }
}

/// Anything the detectors can read pixels from.
pub trait AsImageView {
    fn as_view(&self) -> ImageView<'_>;
}

impl AsImageView for Image {
    fn as_view(&self) -> ImageView<'_> {
        self.view(self.rect())
    }
}

impl AsImageView for ImageView<'_> {
    fn as_view(&self) -> ImageView<'_> {
        *self
    }
}

impl<V: AsImageView + ?Sized> AsImageView for &V {
    fn as_view(&self) -> ImageView<'_> {
        (**self).as_view()
    }
}

/// An 8-bit sRGB color with straight (non-premultiplied) alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// All zeroes; what a view returns for pixels outside its image.
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self::from_rgb8(0, 0, 0);
    pub const WHITE: Self = Self::from_rgb8(255, 255, 255);
    pub const RED: Self = Self::from_rgb8(255, 0, 0);
    pub const GREEN: Self = Self::from_rgb8(0, 255, 0);
    pub const BLUE: Self = Self::from_rgb8(0, 0, 255);

    /// Creates an opaque color.
    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }

    /// The red, green and blue components, in that order.
    #[inline]
    pub fn rgb(&self) -> [u8; 3] {
        [self.r(), self.g(), self.b()]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}
