//! Image preprocessing for the tagger.
//!
//! The tagger expects:
//! - RGB input, alpha flattened onto white
//! - Aspect-preserving resize so the longer side equals the model input size
//! - Centered padding to a square with the dataset mean color (124, 116, 104)
//! - ImageNet normalization: (pixel/255 - mean) / std per channel
//! - Tensor layout: NCHW [1, 3, size, size]

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// Border fill color, the mean pixel of the training set.
pub const PAD_COLOR: [u8; 3] = [124, 116, 104];

/// ImageNet per-channel mean.
const NORM_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviation.
const NORM_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocess an image into a `[1, 3, size, size]` tensor.
pub fn preprocess(image: &DynamicImage, size: u32) -> Array4<f32> {
    let canvas = letterbox(&to_rgb(image), size);
    let side = size as usize;

    Array4::from_shape_fn((1, CHANNELS, side, side), |(_, c, y, x)| {
        let value = canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (value - NORM_MEAN[c]) / NORM_STD[c]
    })
}

/// Convert any color mode to 8-bit RGB, compositing alpha onto white.
pub fn to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in rgb.pixels_mut().zip(rgba.pixels()) {
        let alpha = src[3] as u32;
        *dst = Rgb([
            blend(src[0], alpha),
            blend(src[1], alpha),
            blend(src[2], alpha),
        ]);
    }
    rgb
}

/// Blend a channel over white with rounding division by 255.
fn blend(foreground: u8, alpha: u32) -> u8 {
    let tmp = foreground as u32 * alpha + 255 * (255 - alpha) + 128;
    ((tmp + (tmp >> 8)) >> 8) as u8
}

/// Dimensions after fitting the longer side to `target`, keeping aspect ratio.
///
/// The shorter side is truncated, never below one pixel.
pub fn fit_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
    let ratio = width as f64 / height as f64;
    if ratio > 1.0 {
        let h = (target as f64 / ratio) as u32;
        (target, h.max(1))
    } else {
        let w = (target as f64 * ratio) as u32;
        (w.max(1), target)
    }
}

/// Resize to fit inside a `size` square and pad the rest with [`PAD_COLOR`].
pub fn letterbox(rgb: &RgbImage, size: u32) -> RgbImage {
    let (new_w, new_h) = fit_dimensions(rgb.width(), rgb.height(), size);
    let resized = imageops::resize(rgb, new_w, new_h, FilterType::Lanczos3);

    let mut canvas = RgbImage::from_pixel(size, size, Rgb(PAD_COLOR));
    let x = (size - new_w) / 2;
    let y = (size - new_h) / 2;
    imageops::replace(&mut canvas, &resized, x as i64, y as i64);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_preprocess_shape_for_any_aspect_and_mode() {
        let images = [
            DynamicImage::ImageRgb8(RgbImage::new(640, 480)),
            DynamicImage::ImageRgb8(RgbImage::new(300, 900)),
            DynamicImage::ImageRgba8(RgbaImage::new(50, 50)),
            DynamicImage::ImageLuma8(GrayImage::new(1000, 3)),
        ];
        for img in &images {
            let tensor = preprocess(img, 64);
            assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        }
    }

    #[test]
    fn test_fit_dimensions() {
        assert_eq!(fit_dimensions(1000, 500, 512), (512, 256));
        assert_eq!(fit_dimensions(500, 1000, 512), (256, 512));
        assert_eq!(fit_dimensions(700, 700, 512), (512, 512));
        // Truncates like integer division, and never reaches zero
        assert_eq!(fit_dimensions(3, 1, 512), (512, 170));
        assert_eq!(fit_dimensions(10_000, 1, 512), (512, 1));
    }

    #[test]
    fn test_alpha_composited_onto_white() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let rgb = to_rgb(&DynamicImage::ImageRgba8(img));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_half_alpha_blends_midway() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 128]));
        let rgb = to_rgb(&DynamicImage::ImageRgba8(img));
        let v = rgb.get_pixel(0, 0)[0];
        assert!((126..=128).contains(&v), "got {v}");
    }

    #[test]
    fn test_grayscale_expands_to_three_channels() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([200])));
        let rgb = to_rgb(&img);
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_letterbox_pads_with_mean_color() {
        // Wide white image: rows above and below the content are padding
        let img = RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]));
        let canvas = letterbox(&img, 20);
        assert_eq!(canvas.dimensions(), (20, 20));
        assert_eq!(canvas.get_pixel(10, 0), &Rgb(PAD_COLOR));
        assert_eq!(canvas.get_pixel(10, 19), &Rgb(PAD_COLOR));
        assert_eq!(canvas.get_pixel(10, 10), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_normalization_of_padding() {
        // 1x1-high strip leaves almost the whole canvas as padding
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 1, Rgb([0, 0, 0])));
        let tensor = preprocess(&img, 16);
        for c in 0..3 {
            let expected = (PAD_COLOR[c] as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
            assert!((tensor[[0, c, 0, 0]] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(37, 23, |x, y| {
            Rgb([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8])
        }));
        assert_eq!(preprocess(&img, 32), preprocess(&img, 32));
    }
}
