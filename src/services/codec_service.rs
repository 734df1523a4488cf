use crate::config::HEIC_EXTENSIONS;
use crate::errors::ProcessError;
use exif::{In, Reader, Tag};
use std::borrow::Cow;
use std::io::Cursor;

/// Header-level facts about an image, read without decoding pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub orientation: u16,
}

#[derive(Clone, Debug, Default)]
pub struct CodecService;

impl CodecService {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes input bytes for the rest of the pipeline: HEIC family
    /// inputs are transcoded to JPEG, everything else passes through
    /// untouched.
    pub fn preprocess<'a>(&self, bytes: &'a [u8], key: &str) -> Result<Cow<'a, [u8]>, ProcessError> {
        if is_heic_key(key) {
            return Ok(Cow::Owned(self.transcode_heic(bytes, key)?));
        }
        Ok(Cow::Borrowed(bytes))
    }

    /// Reads dimensions, format and EXIF orientation from the image header.
    pub fn probe(&self, bytes: &[u8]) -> Result<ImageMeta, ProcessError> {
        let dimensions = imagesize::blob_size(bytes)
            .map_err(|error| ProcessError::MetadataMissing(error.to_string()))?;
        let format = image::guess_format(bytes)
            .map(|format| format!("{:?}", format).to_ascii_lowercase())
            .map_err(|error| ProcessError::MetadataMissing(error.to_string()))?;

        Ok(ImageMeta {
            width: dimensions.width as u32,
            height: dimensions.height as u32,
            format,
            orientation: read_orientation(bytes),
        })
    }

    #[cfg(feature = "heif")]
    fn transcode_heic(&self, bytes: &[u8], key: &str) -> Result<Vec<u8>, ProcessError> {
        use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

        let lib_heif = LibHeif::new();
        let context = HeifContext::read_from_bytes(bytes)
            .map_err(|error| ProcessError::Decode(format!("{}: {}", key, error)))?;
        let handle = context
            .primary_image_handle()
            .map_err(|error| ProcessError::Decode(format!("{}: {}", key, error)))?;
        let decoded = lib_heif
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(|error| ProcessError::Decode(format!("{}: {}", key, error)))?;

        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| ProcessError::Decode(format!("{}: no interleaved plane", key)))?;
        let width = plane.width;
        let height = plane.height;
        let stride = plane.stride;

        let row_bytes = width as usize * 3;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(&plane.data[start..start + row_bytes]);
        }

        let buffer = image::RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| ProcessError::Decode(format!("{}: invalid decoded plane", key)))?;

        let mut output = Cursor::new(Vec::new());
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, 95);
        image::DynamicImage::ImageRgb8(buffer)
            .write_with_encoder(encoder)
            .map_err(|error| ProcessError::Decode(format!("{}: {}", key, error)))?;
        Ok(output.into_inner())
    }

    #[cfg(not(feature = "heif"))]
    fn transcode_heic(&self, _bytes: &[u8], key: &str) -> Result<Vec<u8>, ProcessError> {
        Err(ProcessError::Decode(format!(
            "{}: HEIC support is not compiled in",
            key
        )))
    }
}

pub fn is_heic_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    HEIC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Orientations 5 through 8 rotate by 90 degrees, swapping the visual
/// dimensions.
pub fn apply_orientation(width: u32, height: u32, orientation: u16) -> (u32, u32) {
    if (5..=8).contains(&orientation) {
        (height, width)
    } else {
        (width, height)
    }
}

fn read_orientation(bytes: &[u8]) -> u16 {
    let mut cursor = Cursor::new(bytes);
    let Ok(exif) = Reader::new().read_from_container(&mut cursor) else {
        return 1;
    };
    exif.get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|value| value as u16)
        .unwrap_or(1)
}
