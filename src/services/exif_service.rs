use crate::entities::{ExifGroup, ExifValue};
use crate::services::fuji_recipe;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use exif::{Context, Exif, In, Reader, Tag, Value};
use std::io::Cursor;

const GROUP_IMAGE: &str = "Image";
const GROUP_PHOTO: &str = "Photo";
const GROUP_GPS: &str = "GPSInfo";

/// Fields stripped from every group after maker-note decoding; their
/// payloads are binary blobs with no value to the viewer. 0xc4a5 is the
/// PrintImageMatching tag on parsers that report it by number only.
const STRIPPED_FIELDS: [&str; 4] = ["MakerNote", "UserComment", "PrintImageMatching", "0xc4a5"];

#[derive(Clone, Copy, Debug, Default)]
pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    /// Extracts the EXIF tree from `processed`, falling back to `original`
    /// when the processed bytes carry no EXIF block (HEIC transcoding drops
    /// it). Returns `None` on any parse failure; extraction never errors
    /// upward.
    pub fn extract(&self, processed: &[u8], original: Option<&[u8]>) -> Option<ExifGroup> {
        let exif = read_exif(processed).or_else(|| original.and_then(read_exif))?;
        let mut root = build_tree(&exif);

        if let Some(photo) = root.group_mut(GROUP_PHOTO) {
            let recipe = photo
                .get("MakerNote")
                .and_then(maker_note_bytes)
                .and_then(|bytes| fuji_recipe::decode(&bytes));
            if let Some(recipe) = recipe {
                photo.insert("FujiRecipe", ExifValue::Group(recipe));
            }
        }

        strip_binary_fields(&mut root);
        sanitize_group(&mut root);
        attach_gps_decimal(&mut root);

        if root.is_empty() { None } else { Some(root) }
    }

    /// Capture instant from `DateTimeOriginal`, shifted by
    /// `OffsetTimeOriginal` when present. The offset is subtracted from the
    /// naively-parsed instant, matching the manifest's historical contents.
    pub fn date_taken(exif: &ExifGroup) -> Option<DateTime<Utc>> {
        let photo = exif.group(GROUP_PHOTO)?;
        let raw = photo.text("DateTimeOriginal")?;
        let naive = parse_exif_timestamp(raw)?;
        let mut instant = Utc.from_utc_datetime(&naive);

        if let Some(offset_text) = photo.text("OffsetTimeOriginal") {
            if let Some(offset) = parse_utc_offset(offset_text) {
                instant = instant - Duration::seconds(offset.local_minus_utc() as i64);
            }
        }
        Some(instant)
    }
}

fn read_exif(bytes: &[u8]) -> Option<Exif> {
    let mut cursor = Cursor::new(bytes);
    if let Ok(exif) = Reader::new().read_from_container(&mut cursor) {
        return Some(exif);
    }
    // The container parser gave up; look for a bare TIFF header or an
    // `Exif` marker and parse raw from that offset.
    let offset = find_tiff_header(bytes)?;
    Reader::new().read_raw(bytes[offset..].to_vec()).ok()
}

fn find_tiff_header(bytes: &[u8]) -> Option<usize> {
    const EXIF_MARKER: &[u8] = b"Exif\0\0";
    if let Some(position) = find_subsequence(bytes, EXIF_MARKER) {
        return Some(position + EXIF_MARKER.len());
    }
    for (position, window) in bytes.windows(4).enumerate() {
        if window == b"II*\0" || window == b"MM\0*" {
            return Some(position);
        }
    }
    None
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn build_tree(exif: &Exif) -> ExifGroup {
    let mut root = ExifGroup::new();
    for field in exif.fields() {
        if field.ifd_num != In::PRIMARY {
            continue;
        }
        let group_name = match field.tag.0 {
            Context::Tiff => GROUP_IMAGE,
            Context::Exif => GROUP_PHOTO,
            Context::Gps => GROUP_GPS,
            _ => continue,
        };
        let name = field_name(field.tag);
        let value = convert_value(&field.value);

        match root.group_mut(group_name) {
            Some(group) => group.insert(name, value),
            None => {
                let mut group = ExifGroup::new();
                group.insert(name, value);
                root.insert(group_name, ExifValue::Group(group));
            }
        }
    }
    root
}

fn field_name(tag: Tag) -> String {
    if tag.description().is_some() {
        tag.to_string()
    } else {
        format!("0x{:04x}", tag.number())
    }
}

fn convert_value(value: &Value) -> ExifValue {
    match value {
        Value::Byte(items) => ExifValue::Bytes(items.clone()),
        Value::Ascii(lines) => {
            let mut texts: Vec<ExifValue> = lines
                .iter()
                .map(|line| ExifValue::Text(String::from_utf8_lossy(line).into_owned()))
                .collect();
            if texts.len() == 1 {
                texts.remove(0)
            } else {
                ExifValue::List(texts)
            }
        }
        Value::Short(items) => scalar_or_list(items.iter().map(|v| ExifValue::Int(*v as i64))),
        Value::Long(items) => scalar_or_list(items.iter().map(|v| ExifValue::Int(*v as i64))),
        Value::SByte(items) => scalar_or_list(items.iter().map(|v| ExifValue::Int(*v as i64))),
        Value::SShort(items) => scalar_or_list(items.iter().map(|v| ExifValue::Int(*v as i64))),
        Value::SLong(items) => scalar_or_list(items.iter().map(|v| ExifValue::Int(*v as i64))),
        Value::Rational(items) => scalar_or_list(
            items
                .iter()
                .map(|r| ExifValue::from_rational(r.num, r.denom)),
        ),
        Value::SRational(items) => scalar_or_list(
            items
                .iter()
                .map(|r| ExifValue::from_signed_rational(r.num, r.denom)),
        ),
        Value::Float(items) => scalar_or_list(items.iter().map(|v| ExifValue::Float(*v as f64))),
        Value::Double(items) => scalar_or_list(items.iter().map(|v| ExifValue::Float(*v))),
        Value::Undefined(bytes, _) => ExifValue::Bytes(bytes.clone()),
        Value::Unknown(..) => ExifValue::List(Vec::new()),
    }
}

fn scalar_or_list(values: impl Iterator<Item = ExifValue>) -> ExifValue {
    let mut collected: Vec<ExifValue> = values.collect();
    if collected.len() == 1 {
        collected.remove(0)
    } else {
        ExifValue::List(collected)
    }
}

fn maker_note_bytes(value: &ExifValue) -> Option<Vec<u8>> {
    match value {
        ExifValue::Bytes(bytes) => Some(bytes.clone()),
        _ => None,
    }
}

fn strip_binary_fields(root: &mut ExifGroup) {
    for value in root.fields.values_mut() {
        if let ExifValue::Group(group) = value {
            for name in STRIPPED_FIELDS {
                group.remove(name);
            }
        }
    }
}

/// Removes NUL bytes, trims non-date strings, drops fields that become
/// empty, and prunes groups emptied by the process. Date fields keep their
/// raw spacing so timestamps survive byte-for-byte.
fn sanitize_group(group: &mut ExifGroup) {
    let names: Vec<String> = group.fields.keys().cloned().collect();
    for name in names {
        let keep = match group.fields.get_mut(&name) {
            Some(value) => sanitize_value(&name, value),
            None => false,
        };
        if !keep {
            group.fields.remove(&name);
        }
    }
}

fn sanitize_value(name: &str, value: &mut ExifValue) -> bool {
    match value {
        ExifValue::Text(text) => {
            let mut cleaned: String = text.chars().filter(|c| *c != '\0').collect();
            if !is_date_field(name) {
                cleaned = cleaned.trim().to_string();
            }
            *text = cleaned;
            !text.is_empty()
        }
        ExifValue::Group(inner) => {
            sanitize_group(inner);
            !inner.is_empty()
        }
        ExifValue::List(items) => {
            items.retain_mut(|item| sanitize_value(name, item));
            !items.is_empty()
        }
        ExifValue::Bytes(bytes) => !bytes.is_empty(),
        ExifValue::Int(_) | ExifValue::Float(_) => true,
    }
}

fn is_date_field(name: &str) -> bool {
    name.contains("Date") || name.contains("Time")
}

/// When both GPS coordinates are present, attaches decimal-degree fields
/// with hemisphere signs applied and rounds the altitude to a whole meter.
fn attach_gps_decimal(root: &mut ExifGroup) {
    let Some(gps) = root.group_mut(GROUP_GPS) else {
        return;
    };

    let latitude = gps
        .get("GPSLatitude")
        .and_then(ExifValue::as_decimal_degrees);
    let longitude = gps
        .get("GPSLongitude")
        .and_then(ExifValue::as_decimal_degrees);

    if let (Some(mut latitude), Some(mut longitude)) = (latitude, longitude) {
        if gps.text("GPSLatitudeRef").map(str::to_ascii_uppercase) == Some("S".to_string()) {
            latitude = -latitude;
        }
        if gps.text("GPSLongitudeRef").map(str::to_ascii_uppercase) == Some("W".to_string()) {
            longitude = -longitude;
        }
        gps.insert("Latitude", ExifValue::Float(latitude));
        gps.insert("Longitude", ExifValue::Float(longitude));
    }

    if let Some(altitude) = gps.get("GPSAltitude").and_then(ExifValue::as_float) {
        gps.insert("GPSAltitude", ExifValue::Int(altitude.round() as i64));
    }
}

fn parse_exif_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    None
}

fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match trimmed.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
