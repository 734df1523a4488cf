use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One object as reported by the storage backend listing. Keys are opaque;
/// two objects are the same object when their keys match.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
}

impl PartialEq for StorageObject {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for StorageObject {}

impl StorageObject {
    /// Final path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(self.key.as_str())
    }

    /// File name without its extension; used as the photo id.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(index) if index > 0 => &name[..index],
            _ => name,
        }
    }

    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        name.rfind('.')
            .filter(|index| *index > 0)
            .map(|index| name[index..].to_ascii_lowercase())
    }
}
