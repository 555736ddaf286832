//! Image preprocessing for the CLIP vision tower.
//!
//! CLIP ViT-B/32 expects:
//! - Shortest side resized to 224 with a bicubic filter
//! - Center crop to 224×224
//! - Normalization: (pixel/255 - mean) / std with the CLIP channel statistics
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Input resolution of the vision tower.
pub const CLIP_IMAGE_SIZE: u32 = 224;

/// CLIP normalization mean (per-channel).
const NORM_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std (per-channel).
const NORM_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Size after scaling the shortest side to `target`.
fn shortest_edge_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
    if width <= height {
        let h = (target as f64 * height as f64 / width as f64) as u32;
        (target, h.max(target))
    } else {
        let w = (target as f64 * width as f64 / height as f64) as u32;
        (w.max(target), target)
    }
}

/// Preprocess an image for CLIP inference.
///
/// Alpha is dropped, not composited; CLIP was trained on plain RGB conversions.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let (w, h) = shortest_edge_dimensions(image.width(), image.height(), image_size);
    let resized = image.resize_exact(w, h, FilterType::CatmullRom);

    let left = (w - image_size) / 2;
    let top = (h - image_size) / 2;
    let rgb = resized
        .crop_imm(left, top, image_size, image_size)
        .to_rgb8();

    let size = image_size as usize;
    Array4::from_shape_fn((1, CHANNELS, size, size), |(_, c, y, x)| {
        let value = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (value - NORM_MEAN[c]) / NORM_STD[c]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

    #[test]
    fn test_preprocess_shape() {
        for (w, h) in [(640, 480), (480, 640), (224, 224), (10, 3000)] {
            let img = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            let tensor = preprocess(&img, CLIP_IMAGE_SIZE);
            assert_eq!(tensor.shape(), &[1, 3, 224, 224], "{w}x{h}");
        }
    }

    #[test]
    fn test_rgba_input_accepted() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(300, 200));
        assert_eq!(preprocess(&img, 32).shape(), &[1, 3, 32, 32]);
    }

    #[test]
    fn test_shortest_edge_dimensions() {
        assert_eq!(shortest_edge_dimensions(640, 480, 224), (298, 224));
        assert_eq!(shortest_edge_dimensions(480, 640, 224), (224, 298));
        assert_eq!(shortest_edge_dimensions(100, 100, 224), (224, 224));
    }

    #[test]
    fn test_center_crop_keeps_middle() {
        // Left third red, middle blue, right third red; crop keeps blue center
        let img = RgbImage::from_fn(672, 224, |x, _| {
            if (224..448).contains(&x) {
                Rgb([0, 0, 255])
            } else {
                Rgb([255, 0, 0])
            }
        });
        let tensor = preprocess(&DynamicImage::ImageRgb8(img), 224);
        let blue = (1.0 - NORM_MEAN[2]) / NORM_STD[2];
        assert!((tensor[[0, 2, 112, 112]] - blue).abs() < 0.05);
        assert!((tensor[[0, 2, 112, 5]] - blue).abs() < 0.05);
    }

    #[test]
    fn test_normalization_of_black() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, Rgb([0, 0, 0])));
        let tensor = preprocess(&img, 16);
        for c in 0..3 {
            let expected = -NORM_MEAN[c] / NORM_STD[c];
            assert!((tensor[[0, c, 8, 8]] - expected).abs() < 1e-4);
        }
    }
}
