pub mod codec_service;
pub mod exif_service;
pub mod fuji_recipe;
pub mod manifest_store;
pub mod photo_processor;
pub mod thumbnail_service;

pub use codec_service::{CodecService, ImageMeta};
pub use exif_service::ExifService;
pub use manifest_store::ManifestStore;
pub use photo_processor::{Outcome, PhotoProcessor, ProcessResult};
pub use thumbnail_service::{ThumbnailService, ThumbnailOutput};
