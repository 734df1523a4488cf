use super::ObjectStore;
use crate::config::StorageConfig;
use crate::entities::StorageObject;
use crate::errors::StorageError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::Bucket;
use s3::Region;
use s3::creds::Credentials;

/// Adapter for S3 and S3-compatible backends (AWS, MinIO, R2, OSS). Listing
/// is fully paginated by the client library and truncated to the caller's
/// `max_keys`.
pub struct S3Store {
    bucket: Bucket,
    bucket_name: String,
    region: String,
    endpoint: String,
    custom_domain: Option<String>,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let region = if endpoint.is_empty() {
            config
                .region
                .parse::<Region>()
                .context("invalid S3 region")?
        } else {
            Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            }
        };

        let credentials = if config.access_key_id.is_empty() {
            Credentials::anonymous().context("failed to build anonymous credentials")?
        } else {
            Credentials::new(
                Some(&config.access_key_id),
                Some(&config.secret_access_key),
                None,
                None,
                None,
            )
            .context("failed to build S3 credentials")?
        };

        let mut bucket =
            Bucket::new(&config.bucket, region, credentials).context("failed to open S3 bucket")?;
        if !endpoint.is_empty() {
            bucket = bucket.with_path_style();
        }

        Ok(Self {
            bucket,
            bucket_name: config.bucket.clone(),
            region: config.region.clone(),
            endpoint,
            custom_domain: config
                .custom_domain
                .as_ref()
                .map(|domain| domain.trim_end_matches('/').to_string())
                .filter(|domain| !domain.is_empty()),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<StorageObject>, StorageError> {
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .await
            .map_err(|error| StorageError::Unreachable(error.to_string()))?;

        let mut objects = Vec::new();
        for page in pages {
            for item in page.contents {
                objects.push(StorageObject {
                    last_modified: parse_last_modified(&item.last_modified),
                    etag: item
                        .e_tag
                        .map(|tag| tag.trim_matches('"').to_string())
                        .unwrap_or_default(),
                    size: item.size as i64,
                    key: item.key,
                });
                if objects.len() >= max_keys {
                    return Ok(objects);
                }
            }
        }
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|error| StorageError::Unreachable(error.to_string()))?;

        match response.status_code() {
            200 => Ok(response.bytes().to_vec()),
            404 => Err(StorageError::NotFound(key.to_string())),
            status => Err(StorageError::Unreachable(format!(
                "GET {} returned status {}",
                key, status
            ))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        if let Some(domain) = &self.custom_domain {
            return format!("{}/{}/{}", domain, self.bucket_name, key);
        }
        if self.endpoint.contains("amazonaws.com") || self.endpoint.is_empty() {
            return format!(
                "https://{}.s3.{}.amazonaws.com/{}/{}",
                self.bucket_name, self.region, self.bucket_name, key
            );
        }
        format!("{}/{}/{}", self.endpoint, self.bucket_name, key)
    }

    fn thumbnail_url(&self, key: &str, id: &str) -> String {
        match &self.custom_domain {
            Some(_) => format!("{}?width=316", self.public_url(key)),
            None => format!("/thumbnails/{}.webp", id),
        }
    }
}

fn parse_last_modified(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}
