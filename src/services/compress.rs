// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Upload compression: downscale and re-encode as JPEG until the image fits
//! the byte target.

use crate::error::AppError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

/// Compression knobs.
#[derive(Debug, Clone, Copy)]
pub struct CompressOptions {
    /// Longest side after resizing, in pixels.
    pub max_dimension: u32,
    pub target_bytes: usize,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            target_bytes: 1024 * 1024,
            initial_quality: 90,
            min_quality: 40,
            quality_step: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
    /// JPEG quality used; `None` when the input was passed through.
    pub quality: Option<u8>,
    pub original_bytes: usize,
    pub passthrough: bool,
}

/// Compress `input` according to `opts`.
pub fn compress_image(input: &[u8], opts: &CompressOptions) -> Result<CompressedImage, AppError> {
    let format = image::guess_format(input)
        .map_err(|e| AppError::BadRequest(format!("Unrecognized image: {}", e)))?;
    let decoded = image::load_from_memory_with_format(input, format)
        .map_err(|e| AppError::BadRequest(format!("Could not decode image: {}", e)))?;

    let (width, height) = (decoded.width(), decoded.height());
    let longest = width.max(height);

    if input.len() <= opts.target_bytes && longest <= opts.max_dimension {
        return Ok(CompressedImage {
            bytes: input.to_vec(),
            content_type: format.to_mime_type(),
            width,
            height,
            quality: None,
            original_bytes: input.len(),
            passthrough: true,
        });
    }

    let resized = if longest > opts.max_dimension {
        decoded.resize(opts.max_dimension, opts.max_dimension, FilterType::Lanczos3)
    } else {
        decoded
    };
    let rgb = resized.to_rgb8();

    let step = opts.quality_step.max(1);
    let min_quality = opts.min_quality.clamp(1, 100);
    let mut quality = opts.initial_quality.clamp(min_quality, 100);
    let mut best: Option<(Vec<u8>, u8)> = None;

    loop {
        let encoded = encode_jpeg(&rgb, quality)?;
        let fits = encoded.len() <= opts.target_bytes;

        if best
            .as_ref()
            .map_or(true, |(bytes, _)| encoded.len() < bytes.len())
        {
            best = Some((encoded, quality));
        }

        if fits || quality <= min_quality {
            break;
        }
        quality = quality.saturating_sub(step).max(min_quality);
    }

    let (bytes, quality) = best.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("JPEG encoder produced no output"))
    })?;

    tracing::debug!(
        original = input.len(),
        compressed = bytes.len(),
        quality,
        width = rgb.width(),
        height = rgb.height(),
        "Compressed image"
    );

    Ok(CompressedImage {
        bytes,
        content_type: "image/jpeg",
        width: rgb.width(),
        height: rgb.height(),
        quality: Some(quality),
        original_bytes: input.len(),
        passthrough: false,
    })
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, AppError> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(image)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JPEG encoding failed: {}", e)))?;
    Ok(out)
}
