use super::request::MAX_DIMENSION;
use super::ThumbnailError;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Frame, GenericImageView};

const DEFAULT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
}

impl OutputFormat {
    /// Anything other than `png` or `gif` encodes as JPEG.
    pub fn from_extension(extension: &str) -> Self {
        match extension {
            "png" => OutputFormat::Png,
            "gif" => OutputFormat::Gif,
            _ => OutputFormat::Jpeg,
        }
    }
}

/// Decode `bytes`, scale to `width` x `height` and encode as `format`.
///
/// A zero side is derived from the other one keeping the aspect ratio; both zero
/// keeps the original size. Negative sides count as zero.
pub fn resize_image(
    bytes: &[u8],
    width: i64,
    height: i64,
    format: OutputFormat,
    quality: i64,
) -> Result<Vec<u8>, ThumbnailError> {
    let img = image::load_from_memory(bytes)?;
    let (target_w, target_h) = target_dimensions(img.dimensions(), width, height)?;
    let resized = if (target_w, target_h) == img.dimensions() {
        img
    } else {
        DynamicImage::ImageRgba8(image::imageops::resize(
            &img,
            target_w,
            target_h,
            FilterType::Lanczos3,
        ))
    };

    let mut out = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let quality = u8::try_from(quality)
                .ok()
                .filter(|q| (1..=100).contains(q))
                .unwrap_or(DEFAULT_JPEG_QUALITY);
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
            encoder.encode_image(&resized.to_rgb8())?;
        }
        OutputFormat::Png => {
            DynamicImage::ImageRgba8(resized.to_rgba8())
                .write_with_encoder(PngEncoder::new(&mut out))?;
        }
        OutputFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut out);
            encoder.encode_frame(Frame::new(resized.to_rgba8()))?;
        }
    }
    Ok(out)
}

/// A side derived from the aspect ratio is capped at `MAX_DIMENSION`, shrinking
/// the requested side by the same ratio.
fn target_dimensions(
    (orig_w, orig_h): (u32, u32),
    width: i64,
    height: i64,
) -> Result<(u32, u32), ThumbnailError> {
    let width = width.max(0) as u64;
    let height = height.max(0) as u64;
    let (orig_w64, orig_h64) = (orig_w as u64, orig_h as u64);
    let (w, h) = match (width, height) {
        (0, 0) => (orig_w64, orig_h64),
        (w, 0) => fit_within_max(w, (orig_h64 * w + orig_w64 / 2) / orig_w64.max(1)),
        (0, h) => fit_within_max((orig_w64 * h + orig_h64 / 2) / orig_h64.max(1), h),
        (w, h) => (w, h),
    };
    let w = u32::try_from(w.max(1)).map_err(|_| ThumbnailError::SizeTooLarge)?;
    let h = u32::try_from(h.max(1)).map_err(|_| ThumbnailError::SizeTooLarge)?;
    Ok((w, h))
}

fn fit_within_max(w: u64, h: u64) -> (u64, u64) {
    let max = MAX_DIMENSION as u64;
    if w <= max && h <= max {
        (w, h)
    } else if w >= h {
        (max, (h * max + w / 2) / w)
    } else {
        ((w * max + h / 2) / h, max)
    }
}
