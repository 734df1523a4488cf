use crate::errors::ProcessError;

use image::{DynamicImage, imageops::FilterType};
use std::fs;
use std::path::{Path, PathBuf};

const THUMBNAIL_MAX_BORDER: u32 = 600;
const WEBP_QUALITY: f32 = 100.0;

/// Base edge length of the blurhash working image; component counts derive
/// from it so wider images get more horizontal detail and vice versa.
const BLURHASH_BASE_SIZE: u32 = 64;
const BLURHASH_MIN_EDGE: u32 = 16;
const BLURHASH_MIN_COMPONENTS: u32 = 3;
const BLURHASH_MAX_COMPONENTS: u32 = 9;

#[derive(Clone, Debug)]
pub struct ThumbnailOutput {
    pub bytes: Vec<u8>,
    pub blurhash: Option<String>,
    pub reused: bool,
}

/// Produces the on-disk WebP thumbnail and the blurhash placeholder string.
#[derive(Clone, Debug)]
pub struct ThumbnailService {
    directory: PathBuf,
    max_border: u32,
}

impl ThumbnailService {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            directory,
            max_border: THUMBNAIL_MAX_BORDER,
        }
    }

    pub fn with_max_border(mut self, max_border: u32) -> Self {
        self.max_border = max_border;
        self
    }

    pub fn thumbnail_path(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{}.webp", id))
    }

    /// Generates (or reuses) the thumbnail for `id` and computes its
    /// blurhash. `orientation` is baked into the output pixels. A blurhash
    /// failure degrades to `None`; only the thumbnail itself can fail.
    pub fn generate(
        &self,
        bytes: &[u8],
        id: &str,
        orientation: u16,
        force: bool,
    ) -> Result<ThumbnailOutput, ProcessError> {
        let path = self.thumbnail_path(id);

        if !force && path.exists() {
            let existing = fs::read(&path)
                .map_err(|error| ProcessError::ThumbnailWrite(error.to_string()))?;
            let blurhash = self.blurhash_for(&existing, id);
            return Ok(ThumbnailOutput {
                bytes: existing,
                blurhash,
                reused: true,
            });
        }

        let decoded = image::load_from_memory(bytes)
            .map_err(|error| ProcessError::ThumbnailWrite(format!("{}: {}", id, error)))?;
        let upright = bake_orientation(decoded, orientation);
        let resized = if upright.width() <= self.max_border && upright.height() <= self.max_border {
            upright
        } else {
            upright.resize(self.max_border, self.max_border, FilterType::Lanczos3)
        };

        let encoded = encode_webp(&resized, id)?;
        write_atomic(&path, &encoded)
            .map_err(|error| ProcessError::ThumbnailWrite(format!("{}: {}", id, error)))?;

        let blurhash = self.blurhash_for(&encoded, id);
        Ok(ThumbnailOutput {
            bytes: encoded,
            blurhash,
            reused: false,
        })
    }

    /// Encodes the blurhash from thumbnail bytes. Component counts follow
    /// the thumbnail's aspect ratio.
    pub fn blurhash_for(&self, thumbnail_bytes: &[u8], id: &str) -> Option<String> {
        let image = match image::load_from_memory(thumbnail_bytes) {
            Ok(image) => image,
            Err(error) => {
                log::warn!("Blurhash for {} skipped, thumbnail unreadable: {}", id, error);
                return None;
            }
        };

        let (target_width, target_height) = blurhash_dimensions(image.width(), image.height());
        let (components_x, components_y) = blurhash_components(target_width, target_height);

        let small = image.resize_exact(target_width, target_height, FilterType::Triangle);
        let rgba = small.to_rgba8();

        match blurhash::encode(
            components_x,
            components_y,
            target_width,
            target_height,
            rgba.as_raw(),
        ) {
            Ok(hash) => Some(hash),
            Err(error) => {
                log::warn!("Blurhash encoding failed for {}: {}", id, error);
                None
            }
        }
    }
}

/// Working-image dimensions: the long edge is pinned to the base size, the
/// short edge follows the aspect ratio, and both stay at 16 or above.
pub fn blurhash_dimensions(width: u32, height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (BLURHASH_BASE_SIZE, BLURHASH_BASE_SIZE);
    }
    let base = BLURHASH_BASE_SIZE as f64;
    let (target_width, target_height) = if width >= height {
        let scaled = (base * height as f64 / width as f64).round() as u32;
        (BLURHASH_BASE_SIZE, scaled)
    } else {
        let scaled = (base * width as f64 / height as f64).round() as u32;
        (scaled, BLURHASH_BASE_SIZE)
    };
    (
        target_width.max(BLURHASH_MIN_EDGE),
        target_height.max(BLURHASH_MIN_EDGE),
    )
}

pub fn blurhash_components(width: u32, height: u32) -> (u32, u32) {
    let clamp = |edge: u32| {
        ((edge as f64 / 16.0).round() as u32)
            .max(BLURHASH_MIN_COMPONENTS)
            .min(BLURHASH_MAX_COMPONENTS)
    };
    (clamp(width), clamp(height))
}

/// Rotates and flips pixels so the output renders upright without relying
/// on EXIF-aware viewers.
pub fn bake_orientation(image: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

fn encode_webp(image: &DynamicImage, id: &str) -> Result<Vec<u8>, ProcessError> {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let encoder = webp::Encoder::from_image(&rgba)
        .map_err(|error| ProcessError::ThumbnailWrite(format!("{}: {}", id, error)))?;
    Ok(encoder.encode(WEBP_QUALITY).to_vec())
}

/// Write-to-temp plus rename so a crash never leaves a truncated thumbnail
/// behind.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent)?;

    let temp = path.with_extension("webp.tmp");
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)
}
