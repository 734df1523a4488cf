use super::exif_data::ExifGroup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Timestamp format used throughout the manifest document.
pub const MANIFEST_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// One entry of the manifest document consumed by the viewer front-end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(with = "manifest_time")]
    pub date_taken: DateTime<Utc>,
    pub views: u32,
    pub tags: Vec<String>,
    pub original_url: String,
    pub thumbnail_url: Option<String>,
    pub blurhash: Option<String>,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    pub s3_key: String,
    #[serde(with = "manifest_time")]
    pub last_modified: DateTime<Utc>,
    pub size: i64,
    pub exif: Option<ExifGroup>,
    pub is_live_photo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_photo_video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_photo_video_s3_key: Option<String>,
}

impl PhotoRecord {
    /// Manifest order: newest first, ties broken by id so equal inputs always
    /// serialize identically.
    pub fn manifest_order(&self, other: &Self) -> Ordering {
        other
            .date_taken
            .cmp(&self.date_taken)
            .then_with(|| self.id.cmp(&other.id))
    }
}

pub mod manifest_time {
    use super::MANIFEST_TIME_FORMAT;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(MANIFEST_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|value| value.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}
