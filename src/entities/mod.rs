pub mod exif_data;
pub mod photo_info;
pub mod photo_record;
pub mod storage_object;

pub use exif_data::{ExifGroup, ExifValue};
pub use photo_info::PhotoInfo;
pub use photo_record::{MANIFEST_TIME_FORMAT, PhotoRecord};
pub use storage_object::StorageObject;
