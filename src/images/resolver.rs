//! Size decisions and the resize primitive.
//!
//! Target geometry follows the host CMS rules: cropped sizes take a centred
//! rectangle with the preset's aspect ratio, uncropped sizes fit inside the
//! preset box, and nothing is ever upscaled.

use std::io::Cursor;

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use mediamirror_common::paths::sized_file_name;
use mediamirror_db::models::GeneratedSize;

use super::error::SyncError;
use crate::config::SizePreset;

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Whether `preset` can be derived from an original of the given size.
///
/// True when either axis of the original reaches the preset's non-zero
/// target on that axis. An undefined preset is never generatable.
pub fn can_generate(original: Dimensions, preset: Option<&SizePreset>) -> bool {
    let Some(preset) = preset else {
        return false;
    };

    (original.width > 0 && preset.width != 0 && original.width >= preset.width)
        || (original.height > 0 && preset.height != 0 && original.height >= preset.height)
}

/// Whether an existing generated size no longer matches its preset.
///
/// `None` when the preset is undefined or the size was never generated.
/// Cropped presets need both axes to match; uncropped presets need either.
pub fn is_mismatched(generated: Option<&GeneratedSize>, preset: Option<&SizePreset>) -> Option<bool> {
    let (generated, preset) = (generated?, preset?);

    let width_matches = generated.width == preset.width;
    let height_matches = generated.height == preset.height;

    let matches = if preset.crop {
        width_matches && height_matches
    } else {
        width_matches || height_matches
    };

    Some(!matches)
}

/// Source rectangle and output size of one resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub src_x: u32,
    pub src_y: u32,
    pub src_width: u32,
    pub src_height: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute the resize for `preset`, or `None` when there is nothing to do.
///
/// `None` covers a zero-sized original, a preset without any dimension and
/// a target at least as large as the original on both axes.
pub fn resize_plan(original: Dimensions, preset: &SizePreset) -> Option<ResizePlan> {
    let (orig_w, orig_h) = (original.width, original.height);
    if orig_w == 0 || orig_h == 0 || (preset.width == 0 && preset.height == 0) {
        return None;
    }

    let plan = if preset.crop {
        let aspect = orig_w as f64 / orig_h as f64;
        let mut new_w = preset.width.min(orig_w);
        let mut new_h = preset.height.min(orig_h);

        if new_w == 0 {
            new_w = (new_h as f64 * aspect).round() as u32;
        }
        if new_h == 0 {
            new_h = (new_w as f64 / aspect).round() as u32;
        }

        let size_ratio = f64::max(new_w as f64 / orig_w as f64, new_h as f64 / orig_h as f64);
        let crop_w = ((new_w as f64 / size_ratio).round() as u32).min(orig_w);
        let crop_h = ((new_h as f64 / size_ratio).round() as u32).min(orig_h);

        ResizePlan {
            src_x: (orig_w - crop_w) / 2,
            src_y: (orig_h - crop_h) / 2,
            src_width: crop_w,
            src_height: crop_h,
            width: new_w,
            height: new_h,
        }
    } else {
        let (new_w, new_h) = constrain(orig_w, orig_h, preset.width, preset.height);
        ResizePlan {
            src_x: 0,
            src_y: 0,
            src_width: orig_w,
            src_height: orig_h,
            width: new_w,
            height: new_h,
        }
    };

    if plan.width == 0 || plan.height == 0 {
        return None;
    }
    if plan.width >= orig_w && plan.height >= orig_h {
        return None;
    }

    Some(plan)
}

/// Scale `width`×`height` down to fit the box, keeping the aspect ratio.
/// A zero bound leaves that axis unconstrained.
fn constrain(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let width_ratio = if max_w > 0 && width > max_w {
        max_w as f64 / width as f64
    } else {
        1.0
    };
    let height_ratio = if max_h > 0 && height > max_h {
        max_h as f64 / height as f64
    } else {
        1.0
    };

    let ratio = width_ratio.min(height_ratio);
    let new_w = ((width as f64 * ratio).round() as u32).max(1);
    let new_h = ((height as f64 * ratio).round() as u32).max(1);
    (new_w, new_h)
}

/// A freshly encoded size, ready to be written next to the original.
#[derive(Debug, Clone)]
pub struct RenderedSize {
    pub size: GeneratedSize,
    pub data: Bytes,
}

/// Decode `data`, resize it for `preset` and encode it in the original's format.
///
/// CPU-bound; call from a blocking context.
pub fn render(original_key: &str, data: &[u8], preset: &SizePreset) -> Result<RenderedSize, SyncError> {
    if preset.width == 0 && preset.height == 0 {
        return Err(SyncError::generation(format!(
            "size '{}' has neither width nor height",
            preset.name
        )));
    }

    let format = image::guess_format(data)
        .map_err(|e| SyncError::generation(format!("unrecognised image data: {}", e)))?;
    let img = image::load_from_memory_with_format(data, format)
        .map_err(|e| SyncError::generation(format!("failed to decode {}: {}", original_key, e)))?;

    let original = Dimensions::new(img.width(), img.height());
    let plan = resize_plan(original, preset).ok_or_else(|| {
        SyncError::generation(format!(
            "no resize needed: original is {}x{}, '{}' is {}x{}",
            original.width, original.height, preset.name, preset.width, preset.height
        ))
    })?;

    let resized = img
        .crop_imm(plan.src_x, plan.src_y, plan.src_width, plan.src_height)
        .resize_exact(plan.width, plan.height, FilterType::Lanczos3);

    // JPEG has no alpha channel
    let resized = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(resized.to_rgb8())
    } else {
        resized
    };

    let mut buf = Cursor::new(Vec::new());
    resized
        .write_to(&mut buf, format)
        .map_err(|e| SyncError::generation(format!("failed to encode {:?}: {}", format, e)))?;

    Ok(RenderedSize {
        size: GeneratedSize {
            name: preset.name.clone(),
            file: sized_file_name(original_key, plan.width, plan.height),
            width: plan.width,
            height: plan.height,
            mime_type: Some(format.to_mime_type().to_string()),
        },
        data: Bytes::from(buf.into_inner()),
    })
}

/// The configured presets and the decisions made against them.
#[derive(Debug, Clone)]
pub struct SizeResolver {
    presets: Vec<SizePreset>,
}

impl SizeResolver {
    pub fn new(presets: Vec<SizePreset>) -> Self {
        Self { presets }
    }

    pub fn presets(&self) -> &[SizePreset] {
        &self.presets
    }

    pub fn preset(&self, name: &str) -> Option<&SizePreset> {
        self.presets.iter().find(|p| p.name == name)
    }

    pub fn can_generate(&self, original: Dimensions, name: &str) -> bool {
        can_generate(original, self.preset(name))
    }

    pub fn is_mismatched(&self, generated: Option<&GeneratedSize>, name: &str) -> Option<bool> {
        is_mismatched(generated, self.preset(name))
    }

    /// Render size `name` from the original's bytes on the blocking pool.
    pub async fn generate(
        &self,
        original_key: &str,
        data: Bytes,
        name: &str,
    ) -> Result<RenderedSize, SyncError> {
        let preset = self
            .preset(name)
            .cloned()
            .ok_or_else(|| SyncError::PresetNotDefined(name.to_string()))?;
        let key = original_key.to_string();

        tokio::task::spawn_blocking(move || render(&key, &data, &preset))
            .await
            .map_err(|e| SyncError::generation(format!("resize task failed: {}", e)))?
    }
}
