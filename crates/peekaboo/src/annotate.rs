//! Drawing detection results onto frames.

use crate::face::DetectedFace;
use crate::hand::{DetectedHand, CONNECTIVITY};
use crate::image::{draw, Color, Image, Rect, Resolution};

const FACE_COLOR: Color = Color::BLUE;
const HAND_COLOR: Color = Color::GREEN;
const LANDMARK_COLOR: Color = Color::RED;
const CONNECTION_COLOR: Color = Color::from_rgb8(224, 224, 224);

const BOX_STROKE: u32 = 2;
/// Distance between the top edge of a box and the bottom of its label.
const LABEL_OFFSET: i32 = 10;
const LANDMARK_DIAMETER: u32 = 5;

/// Draws all `faces` and `hands` onto `frame`.
///
/// The frame's resolution is never changed; anything outside of the frame is clipped.
pub fn annotate(frame: &mut Image, faces: &[DetectedFace], hands: &[DetectedHand]) {
    for face in faces {
        draw_face(frame, face);
    }
    for hand in hands {
        draw_hand(frame, hand);
    }
}

/// Draws a face's bounding box and a "Face" label above it.
pub fn draw_face(frame: &mut Image, face: &DetectedFace) {
    let rect = face.rect();
    draw::rect(frame, rect)
        .color(FACE_COLOR)
        .stroke_width(BOX_STROKE);
    draw_label(frame, &rect, "Face", FACE_COLOR);
}

/// Draws a hand's bounding box, a "Hand" label and the landmark skeleton.
pub fn draw_hand(frame: &mut Image, hand: &DetectedHand) {
    let res = frame.resolution();
    let bounds = hand_bounds(hand, res);
    draw::rect(frame, bounds)
        .color(HAND_COLOR)
        .stroke_width(BOX_STROKE);
    draw_label(frame, &bounds, "Hand", HAND_COLOR);

    let points = hand.pixel_landmarks(res);
    for &(a, b) in CONNECTIVITY {
        let ((ax, ay), (bx, by)) = (points[a as usize], points[b as usize]);
        draw::line(frame, ax, ay, bx, by)
            .color(CONNECTION_COLOR)
            .stroke_width(2);
    }
    for &(x, y) in &points {
        draw::circle(frame, x, y, LANDMARK_DIAMETER)
            .color(LANDMARK_COLOR)
            .filled();
    }
}

/// Computes the axis-aligned pixel bounding box of a hand's landmarks in a frame of size `res`.
pub fn hand_bounds(hand: &DetectedHand, res: Resolution) -> Rect {
    let points = hand.pixel_landmarks(res);
    let (mut x_min, mut y_min) = (i32::MAX, i32::MAX);
    let (mut x_max, mut y_max) = (i32::MIN, i32::MIN);
    for (x, y) in points {
        x_min = x_min.min(x);
        y_min = y_min.min(y);
        x_max = x_max.max(x);
        y_max = y_max.max(y);
    }

    Rect::from_ranges(
        x_min as f32..=x_max as f32,
        y_min as f32..=y_max as f32,
    )
}

fn draw_label(frame: &mut Image, rect: &Rect, label: &str, color: Color) {
    let x = rect.x().round() as i32;
    let y = rect.y().round() as i32 - LABEL_OFFSET;
    draw::text(frame, x, y, label)
        .color(color)
        .align_left()
        .align_bottom();
}
