//! Annotation primitives.
//!
//! Each function returns a guard that can be configured through its builder methods and draws
//! onto the image when it is dropped:
//!
//! ```no_run
//! # use peekaboo::image::{draw, Color, Image, Rect};
//! # let mut frame = Image::new(64, 64);
//! draw::rect(&mut frame, Rect::from_top_left(8.0, 8.0, 16.0, 16.0))
//!     .color(Color::BLUE)
//!     .stroke_width(2);
//! ```
//!
//! Anything that falls outside of the image is clipped.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii, MonoFont, MonoTextStyle},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle, StrokeAlignment},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::image::{Color, Image, Rect};

pub struct DrawRect<'a> {
    image: &'a mut Image,
    rect: Rect,
    color: Color,
    stroke_width: u32,
}

impl DrawRect<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Outline thickness in pixels, 1 by default. The outline grows towards the inside.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawRect<'_> {
    fn drop(&mut self) {
        let top_left = Point::new(self.rect.x().round() as i32, self.rect.y().round() as i32);
        let size = Size::new(
            self.rect.width().round() as u32,
            self.rect.height().round() as u32,
        );
        let style = PrimitiveStyleBuilder::new()
            .stroke_color(self.color)
            .stroke_width(self.stroke_width)
            .stroke_alignment(StrokeAlignment::Inside)
            .build();
        render(Rectangle::new(top_left, size).into_styled(style), self.image);
    }
}

pub struct DrawLine<'a> {
    image: &'a mut Image,
    line: Line,
    color: Color,
    stroke_width: u32,
}

impl DrawLine<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        let style = PrimitiveStyle::with_stroke(self.color, self.stroke_width);
        render(self.line.into_styled(style), self.image);
    }
}

pub struct DrawCircle<'a> {
    image: &'a mut Image,
    circle: Circle,
    color: Color,
    filled: bool,
}

impl DrawCircle<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Draws a disc instead of a one pixel wide ring.
    pub fn filled(&mut self) -> &mut Self {
        self.filled = true;
        self
    }
}

impl Drop for DrawCircle<'_> {
    fn drop(&mut self) {
        let style = match self.filled {
            true => PrimitiveStyle::with_fill(self.color),
            false => PrimitiveStyle::with_stroke(self.color, 1),
        };
        render(self.circle.into_styled(style), self.image);
    }
}

pub struct DrawText<'a> {
    image: &'a mut Image,
    position: Point,
    text: &'a str,
    color: Color,
    font: &'static MonoFont<'static>,
    alignment: Alignment,
    baseline: Baseline,
}

impl DrawText<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Switches from the 6x10 font to a 10x20 one.
    pub fn large(&mut self) -> &mut Self {
        self.font = &ascii::FONT_10X20;
        self
    }

    /// Places the text so that it starts at `x` instead of being centered on it.
    pub fn align_left(&mut self) -> &mut Self {
        self.alignment = Alignment::Left;
        self
    }

    /// Places the text so that it ends at `y` instead of being centered on it.
    pub fn align_bottom(&mut self) -> &mut Self {
        self.baseline = Baseline::Bottom;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        let character_style = MonoTextStyle::new(self.font, self.color);
        let text_style = TextStyleBuilder::new()
            .alignment(self.alignment)
            .baseline(self.baseline)
            .build();
        let text = Text::with_text_style(self.text, self.position, character_style, text_style);
        render(text, self.image);
    }
}

/// Outlines `rect`. Red by default.
pub fn rect(image: &mut Image, rect: Rect) -> DrawRect<'_> {
    DrawRect {
        image,
        rect,
        color: Color::RED,
        stroke_width: 1,
    }
}

/// Draws a line between two pixels, both ends included. Blue by default.
pub fn line(image: &mut Image, start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> DrawLine<'_> {
    DrawLine {
        image,
        line: Line::new(Point::new(start_x, start_y), Point::new(end_x, end_y)),
        color: Color::BLUE,
        stroke_width: 1,
    }
}

/// Draws a circle of the given diameter around `(x, y)`. Green by default.
pub fn circle(image: &mut Image, x: i32, y: i32, diameter: u32) -> DrawCircle<'_> {
    DrawCircle {
        image,
        circle: Circle::with_center(Point::new(x, y), diameter),
        color: Color::GREEN,
        filled: false,
    }
}

/// Writes `text` centered on `(x, y)`. Red by default.
pub fn text<'a>(image: &'a mut Image, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        image,
        position: Point::new(x, y),
        text,
        color: Color::RED,
        font: &ascii::FONT_6X10,
        alignment: Alignment::Center,
        baseline: Baseline::Middle,
    }
}

fn render<D: Drawable<Color = Color>>(drawable: D, image: &mut Image) {
    match drawable.draw(&mut Canvas(image)) {
        Ok(_) => {}
        Err(never) => match never {},
    }
}

/// Adapts an [`Image`] to `embedded-graphics`.
struct Canvas<'a>(&'a mut Image);

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Color>>,
    {
        for Pixel(Point { x, y }, color) in pixels {
            self.0.put(x, y, color);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::image::Resolution;

    use super::*;

    fn black(width: u32, height: u32) -> Image {
        let mut image = Image::new(width, height);
        image.clear(Color::BLACK);
        image
    }

    #[test]
    fn rect_outline_stays_inside() {
        let mut image = black(8, 8);
        rect(&mut image, Rect::from_top_left(2.0, 2.0, 4.0, 4.0)).color(Color::GREEN);

        for (x, y) in [(2, 2), (5, 2), (2, 5), (5, 5), (3, 2)] {
            assert_eq!(image.get(x, y), Color::GREEN, "({x}, {y})");
        }
        for (x, y) in [(1, 1), (3, 3), (4, 4), (6, 6)] {
            assert_eq!(image.get(x, y), Color::BLACK, "({x}, {y})");
        }
    }

    #[test]
    fn thick_outline() {
        let mut image = black(10, 10);
        rect(&mut image, Rect::from_top_left(1.0, 1.0, 8.0, 8.0)).stroke_width(2);
        assert_eq!(image.get(1, 5), Color::RED);
        assert_eq!(image.get(2, 5), Color::RED);
        assert_eq!(image.get(3, 5), Color::BLACK);
        assert_eq!(image.get(0, 5), Color::BLACK);
    }

    #[test]
    fn clips_at_image_border() {
        let mut image = black(4, 4);
        line(&mut image, -10, 1, 10, 1).color(Color::RED);
        text(&mut image, -50, -50, "offscreen");
        circle(&mut image, 100, 100, 30).filled();

        assert_eq!(image.resolution(), Resolution::new(4, 4));
        for x in 0..4 {
            assert_eq!(image.get(x, 1), Color::RED);
            assert_eq!(image.get(x, 0), Color::BLACK);
        }
    }

    #[test]
    fn filled_circle_covers_center() {
        let mut image = black(9, 9);
        circle(&mut image, 4, 4, 5).color(Color::RED).filled();
        assert_eq!(image.get(4, 4), Color::RED);
        assert_eq!(image.get(0, 0), Color::BLACK);
    }

    #[test]
    fn left_aligned_text_starts_at_x() {
        let mut image = black(40, 20);
        text(&mut image, 20, 15, "Hi")
            .color(Color::WHITE)
            .align_left()
            .align_bottom();
        let lit: Vec<(u32, u32)> = (0..20)
            .flat_map(|y| (0..40).map(move |x| (x, y)))
            .filter(|&(x, y)| image.get(x, y) == Color::WHITE)
            .collect();
        assert!(!lit.is_empty());
        assert!(lit.iter().all(|&(x, y)| x >= 20 && y <= 15), "{lit:?}");
    }
}
