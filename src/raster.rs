//! Built-in transcoder — pure Rust, on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP) | `image` crate (pure Rust decoders) |
//! | Identify AVIF | `avif-parse` (container metadata, no AV1 decode) |
//! | Identify SVG | `width`/`height`/`viewBox` attributes of the document |
//! | Resize | `resize_exact` with `Lanczos3` |
//! | Encode JPEG/PNG/GIF/WebP/AVIF | `image` crate encoders |
//!
//! AVIF is encode-only: the `image` crate's `"avif"` feature enables the
//! rav1e encoder but not a decoder, so AVIF sources can be identified and
//! passed through but not re-encoded. WebP output is lossless (the only
//! encoder the `image` crate ships).
//!
//! SVG is identify-only. Rasterizing vector sources is out of scope — the
//! planner never asks for it — and a request for SVG *output* is refused.

use crate::config::ProcessingConfig;
use crate::format::Format;
use crate::transcode::{ImageInfo, TranscodeError, Transcoder};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader};
use regex::Regex;
use std::io::Cursor;
use std::sync::LazyLock;

/// Transcoder over the `image` crate. Stateless.
#[derive(Debug, Default)]
pub struct RasterTranscoder;

impl RasterTranscoder {
    pub fn new() -> Self {
        Self
    }
}

impl Transcoder for RasterTranscoder {
    fn read_metadata(&self, bytes: &[u8]) -> Result<ImageInfo, TranscodeError> {
        if looks_like_svg(bytes) {
            return svg_metadata(bytes);
        }

        let guessed =
            image::guess_format(bytes).map_err(|e| TranscodeError::Metadata(e.to_string()))?;

        if guessed == ImageFormat::Avif {
            return avif_metadata(bytes);
        }

        let format = match guessed {
            ImageFormat::Jpeg => Format::Jpg,
            ImageFormat::Png => Format::Png,
            ImageFormat::Gif => Format::Gif,
            ImageFormat::WebP => Format::Webp,
            other => {
                return Err(TranscodeError::Metadata(format!(
                    "unrecognized image format {other:?}"
                )));
            }
        };

        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| TranscodeError::Metadata(e.to_string()))?
            .into_dimensions()
            .map_err(|e| TranscodeError::Metadata(e.to_string()))?;

        Ok(ImageInfo { width, height, format })
    }

    fn transcode(
        &self,
        bytes: &[u8],
        format: Format,
        target_width: Option<u32>,
        processing: &ProcessingConfig,
    ) -> Result<Vec<u8>, TranscodeError> {
        if format.is_vector_only() {
            return Err(TranscodeError::UnsupportedOutput(format));
        }

        let mut img =
            image::load_from_memory(bytes).map_err(|e| TranscodeError::Decode(e.to_string()))?;

        if let Some(tw) = target_width {
            let (w, h) = (img.width(), img.height());
            // Shrink only; upscale requests never reach the transcoder.
            if tw < w {
                let th = ((h as f64 * tw as f64 / w as f64).round() as u32).max(1);
                img = img.resize_exact(tw, th, FilterType::Lanczos3);
            }
        }

        encode(&img, format, processing)
    }
}

fn encode(
    img: &DynamicImage,
    format: Format,
    processing: &ProcessingConfig,
) -> Result<Vec<u8>, TranscodeError> {
    let mut out = Cursor::new(Vec::new());
    let encode_err = |e: image::ImageError| TranscodeError::Encode {
        format,
        reason: e.to_string(),
    };

    match format {
        Format::Jpg => {
            // The JPEG encoder has no alpha support.
            let rgb = img.to_rgb8();
            let mut encoder =
                JpegEncoder::new_with_quality(&mut out, processing.jpg.quality.value() as u8);
            encoder.encode_image(&rgb).map_err(encode_err)?;
        }
        Format::Png => img.write_to(&mut out, ImageFormat::Png).map_err(encode_err)?,
        Format::Gif => img.write_to(&mut out, ImageFormat::Gif).map_err(encode_err)?,
        Format::Webp => {
            let rgba = img.to_rgba8();
            WebPEncoder::new_lossless(&mut out)
                .encode(&rgba, rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
                .map_err(encode_err)?;
        }
        Format::Avif => {
            let rgba = img.to_rgba8();
            AvifEncoder::new_with_speed_quality(
                &mut out,
                processing.avif.speed,
                processing.avif.quality.value() as u8,
            )
            .write_image(&rgba, rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
            .map_err(encode_err)?;
        }
        Format::Svg => return Err(TranscodeError::UnsupportedOutput(format)),
    }

    Ok(out.into_inner())
}

fn avif_metadata(bytes: &[u8]) -> Result<ImageInfo, TranscodeError> {
    let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
        .map_err(|e| TranscodeError::Metadata(format!("failed to parse AVIF: {e:?}")))?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| TranscodeError::Metadata(format!("failed to read AVIF metadata: {e:?}")))?;
    Ok(ImageInfo {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
        format: Format::Avif,
    })
}

static SVG_OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<svg[^>]*>").expect("valid regex"));
static SVG_WIDTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bwidth\s*=\s*["']\s*([0-9]*\.?[0-9]+)\s*(?:px)?\s*["']"#)
        .expect("valid regex")
});
static SVG_HEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bheight\s*=\s*["']\s*([0-9]*\.?[0-9]+)\s*(?:px)?\s*["']"#)
        .expect("valid regex")
});
static SVG_VIEWBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bviewBox\s*=\s*["']\s*[-0-9.]+[\s,]+[-0-9.]+[\s,]+([0-9.]+)[\s,]+([0-9.]+)\s*["']"#,
    )
    .expect("valid regex")
});

fn looks_like_svg(bytes: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return false;
    };
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with('<') && SVG_OPEN_TAG.is_match(trimmed)
}

/// Dimensions from the `<svg>` tag: explicit `width`/`height` attributes
/// first, `viewBox` as the fallback.
fn svg_metadata(bytes: &[u8]) -> Result<ImageInfo, TranscodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| TranscodeError::Metadata("svg is not valid UTF-8".into()))?;
    let tag = SVG_OPEN_TAG
        .find(text)
        .ok_or_else(|| TranscodeError::Metadata("no <svg> tag".into()))?
        .as_str();

    let parse = |caps: Option<regex::Captures>, index: usize| -> Option<u32> {
        caps.and_then(|c| c.get(index))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .map(|v| v.round().max(1.0) as u32)
    };

    let width = parse(SVG_WIDTH.captures(tag), 1);
    let height = parse(SVG_HEIGHT.captures(tag), 1);
    let (width, height) = match (width, height) {
        (Some(w), Some(h)) => (w, h),
        _ => {
            let viewbox = SVG_VIEWBOX.captures(tag).and_then(|caps| {
                let w = caps.get(1)?.as_str().parse::<f64>().ok()?;
                let h = caps.get(2)?.as_str().parse::<f64>().ok()?;
                Some((w.round().max(1.0) as u32, h.round().max(1.0) as u32))
            });
            viewbox.ok_or_else(|| {
                TranscodeError::Metadata("svg has neither width/height nor viewBox".into())
            })?
        }
    };

    Ok(ImageInfo {
        width,
        height,
        format: Format::Svg,
    })
}
