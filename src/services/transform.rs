//! Transform executor: turns source bytes plus a [`TransformSpec`] into the
//! transformed variant.
//!
//! The default implementation decodes with the `image` crate on the blocking
//! pool, resizes, rotates counter-clockwise, flips, and re-encodes in the
//! source format.

use crate::models::options::TransformSpec;
use async_trait::async_trait;
use bytes::Bytes;
use image::{
    DynamicImage, GenericImageView, ImageError, ImageFormat, ImageOutputFormat,
    imageops::FilterType,
};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Largest output width or height, in pixels, unless configured otherwise.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("rotation of {0} degrees is not supported")]
    InvalidRotation(i32),
    #[error("quality {0} is outside 1-100")]
    InvalidQuality(i32),
    #[error("failed to decode image: {0}")]
    Decode(#[source] ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] ImageError),
    #[error("output of {width}x{height} exceeds the {max}px limit")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("transform task aborted: {0}")]
    Aborted(String),
}

/// Pure function from source bytes to transformed bytes.
#[async_trait]
pub trait Transformer: Send + Sync + 'static {
    async fn transform(&self, source: Bytes, spec: &TransformSpec) -> Result<Bytes, TransformError>;
}

/// [`Transformer`] backed by the `image` crate.
#[derive(Clone, Copy, Debug)]
pub struct ImageTransformer {
    filter: FilterType,
    max_dimension: u32,
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl ImageTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject resizes whose output width or height would exceed `max`.
    pub fn with_max_dimension(mut self, max: u32) -> Self {
        self.max_dimension = max;
        self
    }

    /// Blocking transform. Prefer [`Transformer::transform`] from async code.
    pub fn apply(&self, source: &[u8], spec: &TransformSpec) -> Result<Bytes, TransformError> {
        let rotation = validate_rotation(spec.rotation_degrees)?;
        let quality = validate_quality(spec.quality_percent)?;

        let format = image::guess_format(source).map_err(TransformError::Decode)?;
        let img = image::load_from_memory_with_format(source, format)
            .map_err(TransformError::Decode)?;
        let (orig_w, orig_h) = img.dimensions();

        let target = target_size(spec, orig_w, orig_h);
        if let Some((width, height)) = target {
            if width > self.max_dimension || height > self.max_dimension {
                return Err(TransformError::TooLarge {
                    width,
                    height,
                    max: self.max_dimension,
                });
            }
        }
        let untouched = target.is_none()
            && rotation == 0
            && !spec.flip_horizontal
            && !spec.flip_vertical
            && quality.is_none();
        if untouched {
            debug!("no-op transform, returning source bytes");
            return Ok(Bytes::copy_from_slice(source));
        }

        let mut img = match target {
            Some((w, h)) => self.resize(img, spec, w, h),
            None => img,
        };

        img = match rotation {
            90 => img.rotate270(),
            180 => img.rotate180(),
            270 => img.rotate90(),
            _ => img,
        };
        if spec.flip_vertical {
            img = img.flipv();
        }
        if spec.flip_horizontal {
            img = img.fliph();
        }

        let output = match format {
            ImageFormat::Jpeg => ImageOutputFormat::Jpeg(quality.unwrap_or(DEFAULT_JPEG_QUALITY)),
            other => ImageOutputFormat::from(other),
        };

        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), output)
            .map_err(TransformError::Encode)?;

        debug!(
            original_width = orig_w,
            original_height = orig_h,
            width = img.width(),
            height = img.height(),
            size = buf.len(),
            "image transformed"
        );
        Ok(Bytes::from(buf))
    }

    fn resize(&self, img: DynamicImage, spec: &TransformSpec, w: u32, h: u32) -> DynamicImage {
        if spec.width == 0.0 || spec.height == 0.0 {
            // One side was derived from the aspect ratio already.
            img.resize_exact(w, h, self.filter)
        } else if spec.fits_within_box() {
            img.resize(w, h, self.filter)
        } else {
            img.resize_to_fill(w, h, self.filter)
        }
    }
}

#[async_trait]
impl Transformer for ImageTransformer {
    async fn transform(&self, source: Bytes, spec: &TransformSpec) -> Result<Bytes, TransformError> {
        let this = *self;
        let spec = spec.clone();
        tokio::task::spawn_blocking(move || this.apply(&source, &spec))
            .await
            .map_err(|e| TransformError::Aborted(e.to_string()))?
    }
}

fn validate_rotation(degrees: i32) -> Result<i32, TransformError> {
    match degrees {
        0 | 90 | 180 | 270 => Ok(degrees),
        other => Err(TransformError::InvalidRotation(other)),
    }
}

fn validate_quality(quality: i32) -> Result<Option<u8>, TransformError> {
    match quality {
        0 => Ok(None),
        1..=100 => Ok(Some(quality as u8)),
        other => Err(TransformError::InvalidQuality(other)),
    }
}

/// Resolve one requested dimension against the source dimension.
fn resolve_dimension(requested: f64, original: u32) -> u32 {
    if requested <= 0.0 {
        0
    } else if requested <= 1.0 {
        (original as f64 * requested).round() as u32
    } else {
        requested as u32
    }
}

/// Output size, or `None` when no resize is needed.
fn target_size(spec: &TransformSpec, orig_w: u32, orig_h: u32) -> Option<(u32, u32)> {
    let mut w = resolve_dimension(spec.width, orig_w);
    let mut h = resolve_dimension(spec.height, orig_h);

    if !spec.allow_upscale {
        w = w.min(orig_w);
        h = h.min(orig_h);
    }

    match (w, h) {
        (0, 0) => return None,
        (0, h) => w = ((orig_w as f64 * h as f64 / orig_h as f64).round() as u32).max(1),
        (w, 0) => h = ((orig_h as f64 * w as f64 / orig_w as f64).round() as u32).max(1),
        _ => {}
    }

    if (w, h) == (orig_w, orig_h) {
        None
    } else {
        Some((w, h))
    }
}
