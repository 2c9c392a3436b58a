use crate::types::{AspectRatio, NormalizedImage, Result, SourceImage, VibeshiftError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, Frame, ImageEncoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

pub const ACCEPTED_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

/// 10 MiB
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Longest allowed side of a normalized image.
pub const MAX_OUTPUT_DIMENSION: u32 = 2048;

/// Re-encode quality factor, honoured by lossy encoders only.
pub const ENCODE_QUALITY: f32 = 0.9;

/// Source region kept by the center crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Cheap checks on declared type and size. Runs before any decode.
pub fn validate(source: &SourceImage) -> Result<ImageFormat> {
    let format = match format_for_mime(&source.mime_type) {
        Some(format) => format,
        None => {
            let accepted: Vec<String> = ACCEPTED_MIME_TYPES
                .iter()
                .map(|t| t.trim_start_matches("image/").to_uppercase())
                .collect();
            warn!("Rejected upload with unsupported type '{}'", source.mime_type);
            return Err(VibeshiftError::Validation(format!(
                "Unsupported format. Please use: {}",
                accepted.join(", ")
            )));
        }
    };

    if source.size() > MAX_UPLOAD_BYTES {
        warn!("Rejected upload of {} bytes", source.size());
        return Err(VibeshiftError::Validation(format!(
            "File too large. Maximum size is {}MB. Current: {:.2}MB",
            MAX_UPLOAD_BYTES / (1024 * 1024),
            source.size() as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(format)
}

pub fn format_for_mime(mime_type: &str) -> Option<ImageFormat> {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/webp" => Some(ImageFormat::WebP),
        "image/gif" => Some(ImageFormat::Gif),
        _ => None,
    }
}

/// Declared type for a file on disk, judged by its extension.
pub fn mime_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Integer division rounding half up.
fn round_div(numerator: u64, denominator: u64) -> u64 {
    (2 * numerator + denominator) / (2 * denominator)
}

/// Symmetric crop of a `width`×`height` image to `ratio`. Never letterboxes.
pub fn plan_crop(width: u32, height: u32, ratio: AspectRatio) -> CropRect {
    let rw = ratio.width_term() as u64;
    let rh = ratio.height_term() as u64;
    let (w, h) = (width as u64, height as u64);

    if w * rh > h * rw {
        let crop_width = round_div(h * rw, rh).clamp(1, w.max(1));
        CropRect {
            x: round_div(w - crop_width, 2) as u32,
            y: 0,
            width: crop_width as u32,
            height,
        }
    } else {
        let crop_height = round_div(w * rh, rw).clamp(1, h.max(1));
        CropRect {
            x: 0,
            y: round_div(h - crop_height, 2) as u32,
            width,
            height: crop_height as u32,
        }
    }
}

/// Output size for a crop: scaled down to the dimension cap, never up.
pub fn plan_output(crop: &CropRect, ratio: AspectRatio) -> (u32, u32) {
    if crop.width <= MAX_OUTPUT_DIMENSION && crop.height <= MAX_OUTPUT_DIMENSION {
        return (crop.width, crop.height);
    }

    let rw = ratio.width_term() as u64;
    let rh = ratio.height_term() as u64;
    let max = MAX_OUTPUT_DIMENSION as u64;
    if crop.width > crop.height {
        (MAX_OUTPUT_DIMENSION, round_div(max * rh, rw).max(1) as u32)
    } else {
        (round_div(max * rw, rh).max(1) as u32, MAX_OUTPUT_DIMENSION)
    }
}

/// Validate, center-crop, bound and re-encode an upload.
pub fn normalize(source: &SourceImage, ratio: AspectRatio) -> Result<NormalizedImage> {
    let format = validate(source)?;

    let decoded = decode(&source.bytes)?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(VibeshiftError::Decode("image has no pixels".to_string()));
    }

    let crop = plan_crop(width, height, ratio);
    let (out_width, out_height) = plan_output(&crop, ratio);
    debug!(
        "Normalizing {}x{} to {}: crop {:?}, output {}x{}",
        width, height, ratio, crop, out_width, out_height
    );

    let cropped = decoded.crop_imm(crop.x, crop.y, crop.width, crop.height);
    let resized = if (out_width, out_height) == (crop.width, crop.height) {
        cropped
    } else {
        cropped.resize_exact(out_width, out_height, FilterType::Triangle)
    };

    let data = encode(&resized, format)?;
    info!(
        "Normalized {} ({}x{} -> {}x{}, {} bytes)",
        source.name.as_deref().unwrap_or("image"),
        width,
        height,
        out_width,
        out_height,
        data.len()
    );

    Ok(NormalizedImage {
        base64: BASE64.encode(&data),
        data,
        width: out_width,
        height: out_height,
        mime_type: canonical_mime(format).to_string(),
    })
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| VibeshiftError::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(VibeshiftError::Decode("unrecognized image data".to_string()));
    }
    reader
        .decode()
        .map_err(|e| VibeshiftError::Decode(e.to_string()))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let (width, height) = (image.width(), image.height());
    let mut buf = Vec::new();

    let encoded = match format {
        ImageFormat::Jpeg => {
            let quality = (ENCODE_QUALITY * 100.0).round() as u8;
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        ImageFormat::Png => {
            let rgba = image.to_rgba8();
            PngEncoder::new(&mut buf).write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
        }
        ImageFormat::WebP => {
            let rgba = image.to_rgba8();
            WebPEncoder::new_lossless(&mut buf).write_image(
                rgba.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            )
        }
        ImageFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut buf);
            encoder.encode_frame(Frame::new(image.to_rgba8()))
        }
        other => {
            return Err(VibeshiftError::Encode(format!("no encoder for {:?}", other)));
        }
    };

    encoded.map_err(|e| VibeshiftError::Encode(e.to_string()))?;
    Ok(buf)
}

fn canonical_mime(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        _ => "image/jpeg",
    }
}
