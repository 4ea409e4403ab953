use crate::error::TollgateError;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, Frame, ImageFormat, ImageReader};
use std::io::Cursor;

#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_pixels: u64,
    pub thumb_max_width: u32,
    pub thumb_max_height: u32,
}

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Original re-encoded without metadata or trailing bytes.
    pub original: Vec<u8>,
    pub thumb_format: ImageFormat,
    pub thumb_width: u32,
    pub thumb_height: u32,
    pub thumb: Vec<u8>,
}

pub const ALLOWED_MIME: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Map an accepted MIME type to its image format.
pub fn format_for_mime(mime: &str) -> Option<ImageFormat> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

pub fn extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        _ => "png",
    }
}

/// Identify the format from magic bytes; only the four accepted formats pass.
pub fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, TollgateError> {
    let format = image::guess_format(bytes)
        .map_err(|_| TollgateError::UnsupportedMediaType("unrecognised image data".to_string()))?;
    match format {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP => Ok(format),
        other => Err(TollgateError::UnsupportedMediaType(format!(
            "{} images are not accepted",
            other.to_mime_type()
        ))),
    }
}

/// Largest size that fits in `max_w` x `max_h` keeping the aspect ratio.
/// Never upscales; each side is at least 1.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let scale = (f64::from(max_w) / f64::from(width))
        .min(f64::from(max_h) / f64::from(height))
        .min(1.0);
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w.min(width), h.min(height))
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, TollgateError> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        // the JPEG encoder rejects alpha channels
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut buf, format)?,
        ImageFormat::WebP => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut buf, format)?,
        _ => img.write_to(&mut buf, format)?,
    }
    Ok(buf.into_inner())
}

/// Rebuild an animated GIF frame by frame. Every frame is decoded to a full
/// canvas, so all frames together share the `max_pixels` budget.
fn reencode_gif(bytes: &[u8], max_pixels: u64) -> Result<Vec<u8>, TollgateError> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut decoded = 0u64;
    for frame in GifDecoder::new(Cursor::new(bytes))?.into_frames() {
        let frame = frame?;
        let (w, h) = frame.buffer().dimensions();
        decoded += u64::from(w) * u64::from(h);
        if decoded > max_pixels {
            return Err(TollgateError::InvalidImage(format!(
                "animation exceeds the {max_pixels} pixel limit"
            )));
        }
        frames.push(frame);
    }

    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder.set_repeat(Repeat::Infinite)?;
        encoder.encode_frames(frames)?;
    }
    Ok(out)
}

/// Decode, bound-check, thumbnail and re-encode. CPU bound; call from a
/// blocking task.
pub fn process_image(
    bytes: &[u8],
    format: ImageFormat,
    limits: ImageLimits,
) -> Result<ProcessedImage, TollgateError> {
    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format).into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(TollgateError::InvalidImage("image has no pixels".to_string()));
    }
    if u64::from(width) * u64::from(height) > limits.max_pixels {
        return Err(TollgateError::InvalidImage(format!(
            "{width}x{height} exceeds the {} pixel limit",
            limits.max_pixels
        )));
    }

    let img = ImageReader::with_format(Cursor::new(bytes), format).decode()?;

    let (thumb_width, thumb_height) =
        fit_within(width, height, limits.thumb_max_width, limits.thumb_max_height);
    let thumb_img = if (thumb_width, thumb_height) == (width, height) {
        img.clone()
    } else {
        img.resize_exact(thumb_width, thumb_height, FilterType::Lanczos3)
    };

    let thumb_format = match format {
        ImageFormat::Gif => ImageFormat::Png,
        other => other,
    };
    let original = match format {
        ImageFormat::Gif => reencode_gif(bytes, limits.max_pixels)?,
        other => encode(&img, other)?,
    };
    let thumb = encode(&thumb_img, thumb_format)?;

    Ok(ProcessedImage {
        format,
        width,
        height,
        original,
        thumb_format,
        thumb_width,
        thumb_height,
        thumb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Delay, Rgb, RgbImage, Rgba, RgbaImage};

    const LIMITS: ImageLimits = ImageLimits {
        max_pixels: 10_000_000,
        thumb_max_width: 200,
        thumb_max_height: 200,
    };

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn gif(width: u32, height: u32, frames: usize) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder.set_repeat(Repeat::Infinite).unwrap();
            let frames = (0..frames).map(|i| {
                let shade = (i * 60 % 256) as u8;
                Frame::from_parts(
                    RgbaImage::from_pixel(width, height, Rgba([shade, 10, 10, 255])),
                    0,
                    0,
                    Delay::from_numer_denom_ms(100, 1),
                )
            });
            encoder.encode_frames(frames).unwrap();
        }
        out
    }

    #[test]
    fn fit_within_scales_down_preserving_ratio() {
        assert_eq!(fit_within(800, 400, 200, 200), (200, 100));
        assert_eq!(fit_within(400, 800, 200, 200), (100, 200));
        assert_eq!(fit_within(1000, 3, 200, 200), (200, 1));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within(50, 20, 200, 200), (50, 20));
        assert_eq!(fit_within(200, 200, 200, 200), (200, 200));
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(format_for_mime("image/JPEG"), Some(ImageFormat::Jpeg));
        assert_eq!(format_for_mime("image/png; charset=binary"), Some(ImageFormat::Png));
        assert_eq!(format_for_mime("image/svg+xml"), None);
        assert_eq!(format_for_mime("text/html"), None);
    }

    #[test]
    fn sniffing_rejects_non_images() {
        assert!(sniff_format(b"<?php echo 'hi'; ?>").is_err());
        assert_eq!(sniff_format(&png(2, 2)).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn thumbnail_is_bounded() {
        let out = process_image(&png(640, 320), ImageFormat::Png, LIMITS).unwrap();
        assert_eq!((out.width, out.height), (640, 320));
        assert_eq!((out.thumb_width, out.thumb_height), (200, 100));
        let decoded = image::load_from_memory(&out.thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
    }

    #[test]
    fn pixel_limit_is_enforced_before_decoding() {
        let limits = ImageLimits {
            max_pixels: 100,
            ..LIMITS
        };
        let err = process_image(&png(20, 20), ImageFormat::Png, limits).unwrap_err();
        assert!(matches!(err, TollgateError::InvalidImage(_)));
    }

    #[test]
    fn truncated_data_fails_to_decode() {
        let mut bytes = png(64, 64);
        bytes.truncate(bytes.len() / 2);
        assert!(process_image(&bytes, ImageFormat::Png, LIMITS).is_err());
    }

    #[test]
    fn gif_original_drops_bytes_after_the_trailer() {
        let payload = b"<?php system($_GET['c']); ?>";
        let mut bytes = gif(16, 16, 3);
        bytes.extend_from_slice(payload);

        let out = process_image(&bytes, ImageFormat::Gif, LIMITS).unwrap();
        assert!(out.original.starts_with(b"GIF8"));
        assert!(!out.original.windows(payload.len()).any(|w| w == payload));
        assert_eq!(out.thumb_format, ImageFormat::Png);

        let frames = GifDecoder::new(Cursor::new(out.original.as_slice()))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn gif_frames_share_the_pixel_budget() {
        let limits = ImageLimits {
            max_pixels: 100,
            ..LIMITS
        };
        let err = process_image(&gif(8, 8, 2), ImageFormat::Gif, limits).unwrap_err();
        assert!(matches!(err, TollgateError::InvalidImage(_)));
        assert!(process_image(&gif(8, 8, 1), ImageFormat::Gif, limits).is_ok());
    }
}
