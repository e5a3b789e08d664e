use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;

/// Size of a flattened card face.
pub const FACE_WIDTH: u32 = 270;
pub const FACE_HEIGHT: u32 = 370;

const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
const MAIN_AREA: Rgb<u8> = Rgb([220, 220, 220]);
const PRINT: Rgb<u8> = Rgb([50, 50, 50]);
const TABLE: Rgb<u8> = Rgb([30, 30, 30]);

/// A flat card face: white stock with a 250x350 light-gray main area nominally
/// 10 px in from the top-left corner, shifted by `offset` and clipped to the
/// card, carrying a dark printed block 40 px inside the main area.
pub fn card_face(offset: (i32, i32)) -> RgbImage {
    let (dx, dy) = offset;
    let mut face = RgbImage::from_pixel(FACE_WIDTH, FACE_HEIGHT, PAPER);
    draw_filled_rect_mut(&mut face, Rect::at(10 + dx, 10 + dy).of_size(250, 350), MAIN_AREA);
    draw_filled_rect_mut(&mut face, Rect::at(50 + dx, 50 + dy).of_size(171, 271), PRINT);
    face
}

/// A card face lying flat on a dark table, 65 px in from the photo's corner.
pub fn card_photo(offset: (i32, i32)) -> RgbImage {
    let face = card_face(offset);
    let mut photo = RgbImage::from_pixel(400, 500, TABLE);
    image::imageops::replace(&mut photo, &face, 65, 65);
    photo
}

/// A featureless photo.
pub fn blank_photo() -> RgbImage {
    RgbImage::from_pixel(300, 300, Rgb([128, 128, 128]))
}

/// A round object with no corners to find.
pub fn disc_photo() -> RgbImage {
    let mut photo = RgbImage::from_pixel(300, 300, TABLE);
    draw_filled_circle_mut(&mut photo, (150, 150), 80, PAPER);
    photo
}

/// Uniform RGB noise, reproducible from `seed`.
pub fn noise_photo(seed: u64) -> RgbImage {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 56) as u8
    };
    RgbImage::from_fn(300, 300, |_, _| Rgb([next(), next(), next()]))
}

/// Save an image as `<dir>/<name>` and return the path.
pub fn save_png(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    img.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}
