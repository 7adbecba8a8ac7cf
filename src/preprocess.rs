//! Image decoding and the tensor preparation the classifier was trained with.
//!
//! The transform mirrors the training pipeline of the bundled model:
//! * bilinear resize to 224x224 with half-pixel centers and no antialiasing,
//!   computed on `f32` pixels without re-quantization
//! * ResNet50 "caffe" normalization: RGB to BGR, then subtraction of the
//!   ImageNet channel means, no scaling
//! * a leading batch axis of size one
//!
//! Decoding is bounded so that a small, highly compressed upload cannot
//! expand into an arbitrarily large pixel buffer. Resizing reads the decoded
//! 8 bit samples in place; only the 224x224 tensor is allocated as `f32`.

use crate::engine::TensorLayout;
use image::{ImageError, ImageReader, Limits, RgbImage};
use std::io::Cursor;
use tract_onnx::prelude::tract_ndarray::{Array3, Array4, ArrayView3, Axis, ShapeError};

pub const CHANNELS: u32 = 3;
pub const HEIGHT: u32 = 224;
pub const WIDTH: u32 = 224;

/// ImageNet channel means in BGR order, on the 0..=255 pixel scale.
pub const IMAGENET_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// Largest accepted width or height of an uploaded image.
pub const MAX_IMAGE_SIDE: u32 = 8192;

/// Upper bound on the memory a decoder may allocate for one image.
pub const MAX_DECODE_ALLOC: u64 = 128 * 1024 * 1024;

/// Decode, resize, normalize and batch an encoded image.
pub fn preprocess(image_bytes: &[u8], layout: TensorLayout) -> PreprocessResult<Array4<f32>> {
    let rgb = decode_rgb(image_bytes)?;

    log::debug!(
        "preprocess() - decoded image of {}x{} pixels",
        rgb.width(),
        rgb.height()
    );

    let resized = resize_bilinear(pixels(&rgb)?, HEIGHT as usize, WIDTH as usize);
    let normalized = normalize_caffe(resized);

    Ok(to_batch(normalized, layout))
}

/// Decode any supported format and force three channels.
///
/// Grayscale is replicated into all channels, an alpha channel is dropped.
/// Images beyond [`MAX_IMAGE_SIDE`] or [`MAX_DECODE_ALLOC`] are refused before
/// their pixels are allocated.
pub fn decode_rgb(image_bytes: &[u8]) -> PreprocessResult<RgbImage> {
    if image_bytes.is_empty() {
        return Err(PreprocessError::EmptyInput);
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_SIDE);
    limits.max_image_height = Some(MAX_IMAGE_SIDE);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(image_bytes))
        .with_guessed_format()
        .map_err(ImageError::from)?;
    reader.limits(limits);

    let rgb = reader.decode()?.into_rgb8();

    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(PreprocessError::EmptyImage);
    }

    Ok(rgb)
}

/// Borrow the decoded samples as a (height, width, channel) view in RGB order.
pub fn pixels(image: &RgbImage) -> PreprocessResult<ArrayView3<'_, u8>> {
    let (width, height) = image.dimensions();

    Ok(ArrayView3::from_shape(
        (height as usize, width as usize, CHANNELS as usize),
        image.as_raw().as_slice(),
    )?)
}

/// Bilinear resampling of an HWC tensor with half-pixel centers.
///
/// Sample positions are `(i + 0.5) * in / out - 0.5`, clamped into the
/// source. No antialiasing kernel is applied on downscaling, so resizing to
/// the source size is an exact identity.
pub fn resize_bilinear<A>(src: ArrayView3<'_, A>, out_height: usize, out_width: usize) -> Array3<f32>
where
    A: Copy + Into<f32>,
{
    let (in_height, in_width, channels) = src.dim();

    let ys = interpolation_weights(in_height, out_height);
    let xs = interpolation_weights(in_width, out_width);

    let mut out = Array3::<f32>::zeros((out_height, out_width, channels));

    for (y, &(top, bottom, y_lerp)) in ys.iter().enumerate() {
        for (x, &(left, right, x_lerp)) in xs.iter().enumerate() {
            for c in 0..channels {
                let top_left: f32 = src[[top, left, c]].into();
                let top_right: f32 = src[[top, right, c]].into();
                let bottom_left: f32 = src[[bottom, left, c]].into();
                let bottom_right: f32 = src[[bottom, right, c]].into();

                let upper = top_left + (top_right - top_left) * x_lerp;
                let lower = bottom_left + (bottom_right - bottom_left) * x_lerp;

                out[[y, x, c]] = upper + (lower - upper) * y_lerp;
            }
        }
    }

    out
}

/// (lower index, upper index, fraction) per output coordinate.
fn interpolation_weights(in_size: usize, out_size: usize) -> Vec<(usize, usize, f32)> {
    let scale = in_size as f32 / out_size as f32;
    let last = in_size.saturating_sub(1) as f32;

    (0..out_size)
        .map(|i| {
            let position = (i as f32 + 0.5) * scale - 0.5;
            let floor = position.floor();
            let lower = floor.clamp(0.0, last) as usize;
            let upper = position.ceil().clamp(0.0, last) as usize;

            (lower, upper, position - floor)
        })
        .collect()
}

/// ResNet50 "caffe" normalization of an RGB, HWC tensor.
///
/// Output channels are in BGR order and centered on the ImageNet means.
pub fn normalize_caffe(rgb: Array3<f32>) -> Array3<f32> {
    let (height, width, channels) = rgb.dim();

    Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
        rgb[[y, x, channels - 1 - c]] - IMAGENET_MEAN_BGR[c]
    })
}

/// Add the leading batch axis in the requested layout.
pub fn to_batch(hwc: Array3<f32>, layout: TensorLayout) -> Array4<f32> {
    match layout {
        TensorLayout::Nhwc => hwc.insert_axis(Axis(0)),
        TensorLayout::Nchw => hwc
            .permuted_axes([2, 0, 1])
            .as_standard_layout()
            .to_owned()
            .insert_axis(Axis(0)),
    }
}

pub type PreprocessResult<T> = Result<T, PreprocessError>;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("no image data received")]
    EmptyInput,

    #[error("decoded image has no pixels")]
    EmptyImage,

    #[error("unable to decode image: {0}")]
    Decode(#[from] ImageError),

    #[error("decoded pixels do not form an image: {0}")]
    Pixels(#[from] ShapeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn row(values: &[f32]) -> Array3<f32> {
        Array3::from_shape_vec((1, values.len(), 1), values.to_vec()).unwrap()
    }

    #[test]
    fn resize_to_same_size_is_identity() {
        let src = Array3::from_shape_fn((224, 224, 3), |(y, x, c)| ((y * 31 + x * 7 + c * 101) % 256) as f32);

        let resized = resize_bilinear(src.view(), 224, 224);

        assert_eq!(resized, src);
    }

    #[test]
    fn upsampling_uses_half_pixel_centers() {
        let resized = resize_bilinear(row(&[0.0, 100.0]).view(), 1, 4);

        assert_eq!(resized.iter().copied().collect::<Vec<_>>(), vec![0.0, 25.0, 75.0, 100.0]);
    }

    #[test]
    fn downsampling_does_not_antialias() {
        let resized = resize_bilinear(row(&[0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]).view(), 1, 2);

        // samples sit at 1.5 and 5.5, a wider kernel would pull in the edges
        assert_eq!(resized.iter().copied().collect::<Vec<_>>(), vec![15.0, 55.0]);
    }

    #[test]
    fn caffe_normalization_swaps_channels_and_centers() {
        let pixel = Array3::from_shape_vec((1, 1, 3), vec![10.0, 20.0, 200.0]).unwrap();

        let normalized = normalize_caffe(pixel);

        let expected = [200.0 - 103.939, 20.0 - 116.779, 10.0 - 123.68];
        for (got, want) in normalized.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-4, "{got} != {want}");
        }
    }

    #[test]
    fn nchw_batch_moves_channels_forward() {
        let hwc = Array3::from_shape_fn((2, 3, 3), |(y, x, c)| (y * 100 + x * 10 + c) as f32);

        let nhwc = to_batch(hwc.clone(), TensorLayout::Nhwc);
        let nchw = to_batch(hwc, TensorLayout::Nchw);

        assert_eq!(nhwc.shape(), &[1, 2, 3, 3]);
        assert_eq!(nchw.shape(), &[1, 3, 2, 3]);
        assert_eq!(nchw[[0, 2, 1, 0]], 102.0);
        assert_eq!(nchw[[0, 2, 1, 0]], nhwc[[0, 1, 0, 2]]);
    }

    #[test]
    fn grayscale_is_replicated_to_rgb() {
        let gray = GrayImage::from_pixel(5, 3, Luma([77]));
        let bytes = encode(DynamicImage::ImageLuma8(gray), ImageFormat::Png);

        let rgb = decode_rgb(&bytes).unwrap();

        assert_eq!(rgb.dimensions(), (5, 3));
        assert!(rgb.pixels().all(|p| *p == Rgb([77, 77, 77])));
    }

    #[test]
    fn alpha_channel_is_dropped() {
        let rgba = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 0]));
        let bytes = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::Png);

        let rgb = decode_rgb(&bytes).unwrap();

        assert!(rgb.pixels().all(|p| *p == Rgb([1, 2, 3])));
    }

    #[test]
    fn preprocess_yields_model_input_shape() {
        let image = RgbImage::from_pixel(37, 91, Rgb([255, 0, 128]));
        let bytes = encode(DynamicImage::ImageRgb8(image), ImageFormat::Png);

        let nhwc = preprocess(&bytes, TensorLayout::Nhwc).unwrap();
        let nchw = preprocess(&bytes, TensorLayout::Nchw).unwrap();

        assert_eq!(nhwc.shape(), &[1, 224, 224, 3]);
        assert_eq!(nchw.shape(), &[1, 3, 224, 224]);

        // solid color survives resizing, so every pixel is the normalized color
        assert!((nhwc[[0, 100, 100, 0]] - (128.0 - 103.939)).abs() < 1e-3);
        assert!((nhwc[[0, 0, 223, 2]] - (255.0 - 123.68)).abs() < 1e-3);
        assert_eq!(nhwc[[0, 5, 6, 1]], nchw[[0, 1, 5, 6]]);
    }

    #[test]
    fn preprocess_is_deterministic() {
        let image = RgbImage::from_fn(50, 30, |x, y| Rgb([(x * 5) as u8, (y * 8) as u8, 9]));
        let bytes = encode(DynamicImage::ImageRgb8(image), ImageFormat::Png);

        assert_eq!(
            preprocess(&bytes, TensorLayout::Nhwc).unwrap(),
            preprocess(&bytes, TensorLayout::Nhwc).unwrap()
        );
    }

    #[test]
    fn samples_are_read_in_place() {
        let image = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8, y as u8, 200]));

        let view = pixels(&image).unwrap();

        assert_eq!(view.dim(), (2, 3, 3));
        assert_eq!(view[[1, 2, 0]], 2);
        assert_eq!(view[[1, 2, 1]], 1);
        assert_eq!(view.as_ptr(), image.as_raw().as_ptr());

        let identity = resize_bilinear(view, 2, 3);
        assert_eq!(identity[[1, 2, 2]], 200.0);
    }

    #[test]
    fn oversized_dimensions_are_refused() {
        // compresses to a few hundred bytes but declares MAX_IMAGE_SIDE + 1 columns
        let wide = GrayImage::from_pixel(MAX_IMAGE_SIDE + 1, 1, Luma([0]));
        let bytes = encode(DynamicImage::ImageLuma8(wide), ImageFormat::Png);
        assert!(bytes.len() < 4096);

        let result = decode_rgb(&bytes);

        assert!(matches!(
            result,
            Err(PreprocessError::Decode(ImageError::Limits(_)))
        ));
    }

    #[test]
    fn text_is_not_an_image() {
        let result = decode_rgb(b"name,age\nalice,31\n");
        assert!(matches!(result, Err(PreprocessError::Decode(_))));

        assert!(matches!(decode_rgb(&[]), Err(PreprocessError::EmptyInput)));
    }
}
