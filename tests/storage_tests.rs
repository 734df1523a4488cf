use chrono::Utc;
use photo_manifest::config::{StorageConfig, StorageProvider};
use photo_manifest::entities::StorageObject;
use photo_manifest::storage::{GithubStore, ObjectStore, S3Store, detect_live_photos};

fn object(key: &str) -> StorageObject {
    StorageObject {
        key: key.to_string(),
        size: 1,
        last_modified: Utc::now(),
        etag: "etag".to_string(),
    }
}

#[test]
fn live_photos_pair_on_directory_and_stem() {
    let objects = vec![
        object("a/IMG_0001.heic"),
        object("a/IMG_0001.mov"),
        object("a/IMG_0002.jpg"),
        object("b/IMG_0003.jpg"),
        object("b/IMG_0004.mp4"),
    ];

    let pairs = detect_live_photos(&objects);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs["a/IMG_0001.heic"].key, "a/IMG_0001.mov");
    assert!(!pairs.contains_key("a/IMG_0002.jpg"));
    assert!(!pairs.contains_key("b/IMG_0003.jpg"));
}

#[test]
fn live_photo_pairing_does_not_cross_directories() {
    let objects = vec![object("a/IMG_0001.jpg"), object("b/IMG_0001.mov")];
    assert!(detect_live_photos(&objects).is_empty());
}

#[test]
fn mp4_clips_also_pair() {
    let objects = vec![object("x/clip.jpg"), object("x/clip.mp4")];
    let pairs = detect_live_photos(&objects);
    assert_eq!(pairs["x/clip.jpg"].key, "x/clip.mp4");
}

fn s3_config() -> StorageConfig {
    StorageConfig {
        provider: StorageProvider::S3,
        bucket: "pics".to_string(),
        region: "us-west-2".to_string(),
        access_key_id: "key".to_string(),
        secret_access_key: "secret".to_string(),
        ..StorageConfig::default()
    }
}

#[test]
fn custom_domain_takes_precedence_in_urls() {
    let mut config = s3_config();
    config.endpoint = "https://minio.test:9000".to_string();
    config.custom_domain = Some("https://cdn.example.com/".to_string());

    let store = S3Store::new(&config).expect("store");
    assert_eq!(
        store.public_url("a/b.jpg"),
        "https://cdn.example.com/pics/a/b.jpg"
    );
    assert_eq!(
        store.thumbnail_url("a/b.jpg", "b"),
        "https://cdn.example.com/pics/a/b.jpg?width=316"
    );
}

#[test]
fn aws_endpoints_use_the_virtual_hosted_form() {
    let config = s3_config();
    let store = S3Store::new(&config).expect("store");
    assert_eq!(
        store.public_url("a/b.jpg"),
        "https://pics.s3.us-west-2.amazonaws.com/pics/a/b.jpg"
    );
    assert_eq!(store.thumbnail_url("a/b.jpg", "b"), "/thumbnails/b.webp");
}

#[test]
fn generic_endpoints_keep_their_host() {
    let mut config = s3_config();
    config.endpoint = "https://minio.test:9000/".to_string();

    let store = S3Store::new(&config).expect("store");
    assert_eq!(
        store.public_url("a/b.jpg"),
        "https://minio.test:9000/pics/a/b.jpg"
    );
}

fn github_config() -> StorageConfig {
    StorageConfig {
        provider: StorageProvider::Github,
        owner: "someone".to_string(),
        repo: "photos".to_string(),
        branch: "main".to_string(),
        ..StorageConfig::default()
    }
}

#[test]
fn github_raw_urls_are_the_default() {
    let store = GithubStore::new(&github_config()).expect("store");
    assert_eq!(
        store.public_url("albums/a b.jpg"),
        "https://raw.githubusercontent.com/someone/photos/main/albums/a%20b.jpg"
    );
    assert_eq!(store.thumbnail_url("albums/a b.jpg", "a b"), "/thumbnails/a b.webp");
}

#[test]
fn github_cdn_urls_when_raw_is_disabled() {
    let mut config = github_config();
    config.use_raw_url = false;

    let store = GithubStore::new(&config).expect("store");
    assert_eq!(
        store.public_url("albums/x.jpg"),
        "https://cdn.jsdelivr.net/gh/someone/photos@main/albums/x.jpg"
    );
}

#[test]
fn github_url_form_ignores_the_token() {
    let mut config = github_config();
    config.use_raw_url = false;
    config.token = Some("ghp_secret".to_string());

    let store = GithubStore::new(&config).expect("store");
    assert_eq!(
        store.public_url("albums/x.jpg"),
        "https://cdn.jsdelivr.net/gh/someone/photos@main/albums/x.jpg"
    );
}
