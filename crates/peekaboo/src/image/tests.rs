use std::f32::consts::{FRAC_PI_2, PI};

use super::*;
use Color as C;

fn grid<const W: usize, const H: usize>(rows: [[Color; W]; H]) -> Image {
    Image::from_fn(Resolution::new(W as u32, H as u32), |x, y| {
        rows[y as usize][x as usize]
    })
}

fn pixels(view: ImageView<'_>) -> Vec<Color> {
    (0..view.height())
        .flat_map(|y| (0..view.width()).map(move |x| (x, y)))
        .map(|(x, y)| view.get(x, y))
        .collect()
}

#[test]
fn whole_image_view() {
    let image = grid([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);
    let view = image.as_view();
    assert_eq!(view.resolution(), image.resolution());
    assert_eq!(view.rect(), image.rect());
    assert_eq!(pixels(view), [C::RED, C::GREEN, C::BLUE, C::WHITE]);
}

#[test]
fn nested_views_accumulate_offsets() {
    let image = grid([
        [C::BLACK, C::BLACK, C::BLACK, C::BLACK],
        [C::BLACK, C::RED, C::GREEN, C::BLACK],
        [C::BLACK, C::BLUE, C::WHITE, C::BLACK],
    ]);

    let inner = image.view(Rect::from_top_left(1.0, 1.0, 3.0, 2.0));
    assert_eq!(inner.rect(), Rect::from_top_left(0.0, 0.0, 3.0, 2.0));
    assert_eq!(inner.get(0, 0), C::RED);

    let innermost = inner.view(Rect::from_top_left(1.0, 1.0, 1.0, 1.0));
    assert_eq!(innermost.resolution(), Resolution::new(1, 1));
    assert_eq!(innermost.get(0, 0), C::WHITE);

    // Growing back out of the parent view reaches the surrounding pixels of the image.
    let outer = inner.view(Rect::from_top_left(-1.0, -1.0, 2.0, 2.0));
    assert_eq!(pixels(outer), [C::BLACK, C::BLACK, C::BLACK, C::RED]);
}

#[test]
fn out_of_bounds_reads_are_null() {
    let image = grid([[C::RED, C::GREEN]]);
    let view = image.view(Rect::from_top_left(1.0, 0.0, 3.0, 2.0));
    assert_eq!(view.resolution(), Resolution::new(3, 2));
    assert_eq!(pixels(view)[0], C::GREEN);
    assert!(pixels(view)[1..].iter().all(|&c| c == C::NULL));

    let view = image.view(Rect::from_top_left(-5.0, -5.0, 2.0, 2.0));
    assert!(pixels(view).iter().all(|&c| c == C::NULL));
}

#[test]
fn rotated_views() {
    #[rustfmt::skip]
    let image = grid([
        [C::RED, C::GREEN],
        [C::BLUE, C::WHITE],
    ]);
    let full = Rect::from_top_left(0.0, 0.0, 2.0, 2.0);

    let half_turn = image.view(RotatedRect::new(full, PI));
    assert_eq!(pixels(half_turn), [C::WHITE, C::BLUE, C::GREEN, C::RED]);

    // A clockwise view rotation shows the content turned counterclockwise.
    let quarter = image.view(RotatedRect::new(full, FRAC_PI_2));
    assert_eq!(pixels(quarter), [C::GREEN, C::WHITE, C::RED, C::BLUE]);

    // Rotations of nested views add up.
    let again = quarter.view(RotatedRect::new(full, FRAC_PI_2));
    assert_eq!(pixels(again), pixels(half_turn));
}

#[test]
fn mirroring() {
    let image = grid([[C::RED, C::GREEN, C::BLUE], [C::WHITE, C::BLACK, C::BLACK]]);
    let mirrored = image.mirrored();
    assert_eq!(
        pixels(mirrored.as_view()),
        [C::BLUE, C::GREEN, C::RED, C::BLACK, C::BLACK, C::WHITE],
    );

    let mut in_place = image.clone();
    in_place.mirror();
    assert_eq!(in_place.data(), mirrored.data());

    in_place.mirror();
    assert_eq!(in_place.data(), image.data());
}

#[test]
fn grayscale() {
    let image = grid([[C::WHITE, C::BLACK, C::RED]]);
    let gray = image.to_grayscale();
    assert_eq!(gray.resolution(), image.resolution());
    assert_eq!(gray.get(0, 0), C::WHITE);
    assert_eq!(gray.get(1, 0), C::BLACK);

    let red = gray.get(2, 0);
    let [r, g, b] = red.rgb();
    assert!(r == g && g == b, "{red:?}");
    assert!(r > 0 && r < 255, "{red:?}");
    assert_eq!(red.a(), 255);
}

#[test]
fn copy_out_of_view() {
    let image = grid([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);
    let copy = image.view(Rect::from_top_left(1.0, 0.0, 1.0, 2.0)).to_image();
    assert_eq!(copy.resolution(), Resolution::new(1, 2));
    assert_eq!(copy.get(0, 0), C::GREEN);
    assert_eq!(copy.get(0, 1), C::WHITE);
}

#[test]
fn put_ignores_outside_pixels() {
    let mut image = Image::new(2, 2);
    image.put(1, 1, C::RED);
    image.put(-1, 0, C::RED);
    image.put(2, 0, C::RED);
    image.put(0, 5, C::RED);
    assert_eq!(pixels(image.as_view()), [C::NULL, C::NULL, C::NULL, C::RED]);
}
