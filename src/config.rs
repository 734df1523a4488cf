use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "photo-manifest.json";
pub const MANIFEST_RELATIVE_PATH: &str = "src/data/photos-manifest.json";
pub const THUMBNAIL_RELATIVE_DIR: &str = "public/thumbnails";

pub const SUPPORTED_EXTENSIONS: [&str; 10] = [
    ".jpg", ".jpeg", ".png", ".webp", ".gif", ".bmp", ".tiff", ".heic", ".heif", ".hif",
];
pub const HEIC_EXTENSIONS: [&str; 3] = [".heic", ".heif", ".hif"];
pub const LIVE_PHOTO_VIDEO_EXTENSIONS: [&str; 2] = [".mov", ".mp4"];

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub storage: StorageConfig,
    pub options: OptionsConfig,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
    /// Root of the site checkout the manifest and thumbnails are written into.
    pub root_dir: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub bucket: String,
    pub region: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub prefix: String,
    pub custom_domain: Option<String>,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: Option<String>,
    pub path: String,
    pub use_raw_url: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    S3,
    Github,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionsConfig {
    pub default_concurrency: usize,
    pub max_photos: usize,
    pub enable_live_photo_detection: bool,
    pub show_progress: bool,
    pub show_detailed_stats: bool,
    pub supported_formats: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceConfig {
    pub worker: WorkerConfig,
    pub memory_limit: usize,
    pub enable_cache: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerConfig {
    pub max_workers: usize,
    pub timeout: u64,
    pub use_cluster_mode: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub level: LogLevel,
    pub output_to_file: bool,
    pub log_file_path: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::S3,
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            prefix: String::new(),
            custom_domain: None,
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            token: None,
            path: String::new(),
            use_raw_url: true,
        }
    }
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 10,
            max_photos: 10_000,
            enable_live_photo_detection: true,
            show_progress: true,
            show_detailed_stats: true,
            supported_formats: SUPPORTED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            memory_limit: 2048,
            enable_cache: true,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timeout: 30_000,
            use_cluster_mode: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            level: LogLevel::Info,
            output_to_file: false,
            log_file_path: None,
        }
    }
}

fn default_max_workers() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|value| value.get())
        .unwrap_or(2);
    (cores / 2).max(1)
}

impl LogLevel {
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

impl Config {
    /// Loads configuration from the given file, from `photo-manifest.json` in
    /// the current directory, or falls back to defaults when neither exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if candidate.exists() {
            let text = std::fs::read_to_string(&candidate)
                .with_context(|| format!("failed to read config file {}", candidate.display()))?;
            let config: Config = serde_json::from_str(&text)
                .with_context(|| format!("invalid config file {}", candidate.display()))?;
            Ok(config)
        } else if path.is_some() {
            anyhow::bail!("config file {} does not exist", candidate.display());
        } else {
            Ok(Config::default())
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root_dir.join(MANIFEST_RELATIVE_PATH)
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.root_dir.join(THUMBNAIL_RELATIVE_DIR)
    }

    pub fn thumbnail_path(&self, id: &str) -> PathBuf {
        self.thumbnail_dir().join(format!("{}.webp", id))
    }

    /// Listing prefix for the configured provider: the bucket prefix for S3,
    /// the in-repository base path for Git hosting.
    pub fn effective_prefix(&self) -> &str {
        match self.storage.provider {
            StorageProvider::S3 => self.storage.prefix.as_str(),
            StorageProvider::Github => self.storage.path.as_str(),
        }
    }

    pub fn is_supported_format(&self, key: &str) -> bool {
        let lower = key.to_ascii_lowercase();
        self.options
            .supported_formats
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }
}

/// Ingestion modes that disable specific classes of reuse. Parsed from the
/// CLI in the coordinator and from the environment in worker processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForceFlags {
    pub all: bool,
    pub manifest: bool,
    pub thumbnails: bool,
}

impl ForceFlags {
    pub fn from_env() -> Self {
        Self {
            all: env_flag("FORCE_MODE"),
            manifest: env_flag("FORCE_MANIFEST"),
            thumbnails: env_flag("FORCE_THUMBNAILS"),
        }
    }

    pub fn export_env(&self, command: &mut tokio::process::Command) {
        command.env("FORCE_MODE", bool_env(self.all));
        command.env("FORCE_MANIFEST", bool_env(self.manifest));
        command.env("FORCE_THUMBNAILS", bool_env(self.thumbnails));
    }
}

pub fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| value == "true" || value == "1")
        .unwrap_or(false)
}

fn bool_env(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
