#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{ImageBuffer, ImageFormat, Rgb};
use photo_manifest::entities::StorageObject;
use photo_manifest::errors::StorageError;
use photo_manifest::storage::ObjectStore;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_gradient(width, height, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_gradient(width, height, ImageFormat::Jpeg)
}

fn encode_gradient(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_fn(width, height, |x, y| {
        let red = (x % 255) as u8;
        let green = (y % 255) as u8;
        let blue = ((x + y) % 255) as u8;
        Rgb([red, green, blue])
    });
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .expect("failed to encode fixture image");
    buffer.into_inner()
}

/// Declarative EXIF content for fixture JPEGs.
#[derive(Default)]
pub struct ExifSpec {
    pub orientation: Option<u16>,
    pub date_time_original: Option<String>,
    pub offset_time_original: Option<String>,
    pub artist: Option<String>,
    pub gps: Option<GpsSpec>,
    pub maker_note: Option<Vec<u8>>,
}

pub struct GpsSpec {
    pub latitude: (u32, u32, u32),
    pub latitude_ref: char,
    pub longitude: (u32, u32, u32),
    pub longitude_ref: char,
    pub altitude: Option<(u32, u32)>,
}

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_UNDEFINED: u16 = 7;

struct Entry {
    tag: u16,
    value_type: u16,
    count: u32,
    data: EntryData,
}

enum EntryData {
    Inline([u8; 4]),
    Blob(Vec<u8>),
}

impl Entry {
    fn short(tag: u16, value: u16) -> Self {
        let mut inline = [0u8; 4];
        inline[..2].copy_from_slice(&value.to_le_bytes());
        Self {
            tag,
            value_type: TYPE_SHORT,
            count: 1,
            data: EntryData::Inline(inline),
        }
    }

    fn long(tag: u16, value: u32) -> Self {
        Self {
            tag,
            value_type: TYPE_LONG,
            count: 1,
            data: EntryData::Inline(value.to_le_bytes()),
        }
    }

    fn byte(tag: u16, value: u8) -> Self {
        let mut inline = [0u8; 4];
        inline[0] = value;
        Self {
            tag,
            value_type: TYPE_BYTE,
            count: 1,
            data: EntryData::Inline(inline),
        }
    }

    fn ascii(tag: u16, text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let count = bytes.len() as u32;
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..bytes.len()].copy_from_slice(&bytes);
            Self {
                tag,
                value_type: TYPE_ASCII,
                count,
                data: EntryData::Inline(inline),
            }
        } else {
            Self {
                tag,
                value_type: TYPE_ASCII,
                count,
                data: EntryData::Blob(bytes),
            }
        }
    }

    fn rationals(tag: u16, values: &[(u32, u32)]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for (numerator, denominator) in values {
            bytes.extend_from_slice(&numerator.to_le_bytes());
            bytes.extend_from_slice(&denominator.to_le_bytes());
        }
        Self {
            tag,
            value_type: TYPE_RATIONAL,
            count: values.len() as u32,
            data: EntryData::Blob(bytes),
        }
    }

    fn undefined(tag: u16, bytes: Vec<u8>) -> Self {
        let count = bytes.len() as u32;
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..bytes.len()].copy_from_slice(&bytes);
            Self {
                tag,
                value_type: TYPE_UNDEFINED,
                count,
                data: EntryData::Inline(inline),
            }
        } else {
            Self {
                tag,
                value_type: TYPE_UNDEFINED,
                count,
                data: EntryData::Blob(bytes),
            }
        }
    }
}

fn ifd_size(entry_count: usize) -> usize {
    2 + entry_count * 12 + 4
}

/// Little-endian TIFF blob with IFD0, an Exif IFD and an optional GPS IFD.
pub fn tiff_bytes(spec: &ExifSpec) -> Vec<u8> {
    let mut ifd0 = Vec::new();
    if let Some(orientation) = spec.orientation {
        ifd0.push(Entry::short(0x0112, orientation));
    }
    if let Some(artist) = &spec.artist {
        ifd0.push(Entry::ascii(0x013b, artist));
    }

    let mut exif_ifd = Vec::new();
    if let Some(date) = &spec.date_time_original {
        exif_ifd.push(Entry::ascii(0x9003, date));
    }
    if let Some(offset) = &spec.offset_time_original {
        exif_ifd.push(Entry::ascii(0x9011, offset));
    }
    if let Some(note) = &spec.maker_note {
        exif_ifd.push(Entry::undefined(0x927c, note.clone()));
    }

    let mut gps_ifd = Vec::new();
    if let Some(gps) = &spec.gps {
        gps_ifd.push(Entry::ascii(0x0001, &gps.latitude_ref.to_string()));
        gps_ifd.push(Entry::rationals(
            0x0002,
            &[
                (gps.latitude.0, 1),
                (gps.latitude.1, 1),
                (gps.latitude.2, 1),
            ],
        ));
        gps_ifd.push(Entry::ascii(0x0003, &gps.longitude_ref.to_string()));
        gps_ifd.push(Entry::rationals(
            0x0004,
            &[
                (gps.longitude.0, 1),
                (gps.longitude.1, 1),
                (gps.longitude.2, 1),
            ],
        ));
        if let Some(altitude) = gps.altitude {
            gps_ifd.push(Entry::byte(0x0005, 0));
            gps_ifd.push(Entry::rationals(0x0006, &[altitude]));
        }
    }

    let ifd0_count = ifd0.len() + usize::from(!exif_ifd.is_empty()) + usize::from(!gps_ifd.is_empty());
    let ifd0_offset = 8usize;
    let exif_offset = ifd0_offset + ifd_size(ifd0_count);
    let gps_offset = exif_offset
        + if exif_ifd.is_empty() {
            0
        } else {
            ifd_size(exif_ifd.len())
        };
    let data_offset = gps_offset
        + if gps_ifd.is_empty() {
            0
        } else {
            ifd_size(gps_ifd.len())
        };

    if !exif_ifd.is_empty() {
        ifd0.push(Entry::long(0x8769, exif_offset as u32));
    }
    if !gps_ifd.is_empty() {
        ifd0.push(Entry::long(0x8825, gps_offset as u32));
    }
    ifd0.sort_by_key(|entry| entry.tag);

    let mut out = Vec::new();
    out.extend_from_slice(b"II");
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&(ifd0_offset as u32).to_le_bytes());

    let mut data = Vec::new();
    write_ifd(&mut out, &ifd0, data_offset, &mut data);
    if !exif_ifd.is_empty() {
        write_ifd(&mut out, &exif_ifd, data_offset, &mut data);
    }
    if !gps_ifd.is_empty() {
        write_ifd(&mut out, &gps_ifd, data_offset, &mut data);
    }
    out.extend_from_slice(&data);
    out
}

fn write_ifd(out: &mut Vec<u8>, entries: &[Entry], data_base: usize, data: &mut Vec<u8>) {
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for entry in entries {
        out.extend_from_slice(&entry.tag.to_le_bytes());
        out.extend_from_slice(&entry.value_type.to_le_bytes());
        out.extend_from_slice(&entry.count.to_le_bytes());
        match &entry.data {
            EntryData::Inline(inline) => out.extend_from_slice(inline),
            EntryData::Blob(blob) => {
                let offset = (data_base + data.len()) as u32;
                out.extend_from_slice(&offset.to_le_bytes());
                data.extend_from_slice(blob);
            }
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
}

/// JPEG with the given EXIF spliced in as an APP1 segment.
pub fn jpeg_with_exif(width: u32, height: u32, spec: &ExifSpec) -> Vec<u8> {
    let base = jpeg_bytes(width, height);
    let tiff = tiff_bytes(spec);

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend_from_slice(&tiff);

    let mut out = Vec::with_capacity(base.len() + payload.len() + 4);
    out.extend_from_slice(&base[..2]);
    out.push(0xff);
    out.push(0xe1);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&base[2..]);
    out
}

/// Minimal Fujifilm maker note: signature, embedded IFD offset and a run of
/// little-endian entries with inline values.
pub fn fuji_maker_note(entries: &[(u16, u16, u32)]) -> Vec<u8> {
    let mut note = Vec::new();
    note.extend_from_slice(b"FUJIFILM");
    note.extend_from_slice(&12u32.to_le_bytes());
    note.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, value_type, value) in entries {
        note.extend_from_slice(&tag.to_le_bytes());
        note.extend_from_slice(&value_type.to_le_bytes());
        note.extend_from_slice(&1u32.to_le_bytes());
        match *value_type {
            TYPE_SHORT => {
                note.extend_from_slice(&(*value as u16).to_le_bytes());
                note.extend_from_slice(&[0, 0]);
            }
            _ => note.extend_from_slice(&value.to_le_bytes()),
        }
    }
    note.extend_from_slice(&0u32.to_le_bytes());
    note
}

pub struct MemoryObject {
    pub bytes: Vec<u8>,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
}

/// In-memory backend for driving the build pipeline in tests.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, MemoryObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, bytes: Vec<u8>, last_modified: DateTime<Utc>) {
        let etag = format!("etag-{}-{}", key.len(), bytes.len());
        self.objects.lock().unwrap().insert(
            key.to_string(),
            MemoryObject {
                bytes,
                last_modified,
                etag,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<StorageObject>, StorageError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .take(max_keys)
            .map(|(key, object)| StorageObject {
                key: key.clone(),
                size: object.bytes.len() as i64,
                last_modified: object.last_modified,
                etag: object.etag.clone(),
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://photos.test/{}", key)
    }

    fn thumbnail_url(&self, _key: &str, id: &str) -> String {
        format!("/thumbnails/{}.webp", id)
    }
}
