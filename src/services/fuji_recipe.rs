//! Decoder for the Fujifilm maker-note block. The note embeds a
//! little-endian IFD whose entries describe the in-camera film recipe:
//! simulation mode, grain, color chrome, white balance shift, dynamic
//! range and tone settings.

use crate::entities::{ExifGroup, ExifValue};

const SIGNATURE: &[u8] = b"FUJIFILM";

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_SLONG: u16 = 9;

/// Decodes a Fujifilm maker note into a recipe group. Returns `None` for
/// notes from other vendors or notes too malformed to walk.
pub fn decode(note: &[u8]) -> Option<ExifGroup> {
    if !note.starts_with(SIGNATURE) || note.len() < 14 {
        return None;
    }
    let ifd_offset = read_u32(note, 8)? as usize;
    let entry_count = read_u16(note, ifd_offset)? as usize;

    let mut recipe = ExifGroup::new();
    for index in 0..entry_count {
        let entry = ifd_offset + 2 + index * 12;
        let tag = read_u16(note, entry)?;
        let value_type = read_u16(note, entry + 2)?;
        let count = read_u32(note, entry + 4)? as usize;
        let Some(values) = read_values(note, entry + 8, value_type, count) else {
            continue;
        };
        if let Some((name, value)) = translate(tag, &values, note, entry + 8) {
            recipe.insert(name, value);
        }
    }

    if recipe.is_empty() { None } else { Some(recipe) }
}

/// Raw integer payload of one IFD entry; values wider than four bytes live
/// at an offset relative to the note start.
fn read_values(note: &[u8], value_slot: usize, value_type: u16, count: usize) -> Option<Vec<i64>> {
    if count == 0 || count > 64 {
        return None;
    }
    let unit = match value_type {
        TYPE_BYTE | TYPE_ASCII => 1,
        TYPE_SHORT => 2,
        TYPE_LONG | TYPE_SLONG => 4,
        _ => return None,
    };
    let total = unit * count;
    let start = if total <= 4 {
        value_slot
    } else {
        read_u32(note, value_slot)? as usize
    };

    let mut values = Vec::with_capacity(count);
    for index in 0..count {
        let at = start + index * unit;
        let value = match value_type {
            TYPE_BYTE | TYPE_ASCII => *note.get(at)? as i64,
            TYPE_SHORT => read_u16(note, at)? as i64,
            TYPE_LONG => read_u32(note, at)? as i64,
            TYPE_SLONG => read_u32(note, at)? as i32 as i64,
            _ => return None,
        };
        values.push(value);
    }
    Some(values)
}

fn translate(
    tag: u16,
    values: &[i64],
    note: &[u8],
    value_slot: usize,
) -> Option<(&'static str, ExifValue)> {
    let first = *values.first()?;
    let entry = match tag {
        0x1000 => ("Quality", ascii_value(note, value_slot, values.len())?),
        0x1001 => ("Sharpness", enum_text(first, sharpness_name)),
        0x1002 => ("WhiteBalance", enum_text(first, white_balance_name)),
        0x1003 => ("Color", enum_text(first, saturation_name)),
        0x1004 => ("Contrast", enum_text(first, contrast_name)),
        0x100a => (
            "WhiteBalanceFineTune",
            ExifValue::List(values.iter().map(|v| ExifValue::Int(*v)).collect()),
        ),
        0x100e => ("NoiseReduction", enum_text(first, noise_reduction_name)),
        0x100f => ("Clarity", ExifValue::Int(first / 1000)),
        0x1040 => ("ShadowTone", ExifValue::Int(-(first / 16))),
        0x1041 => ("HighlightTone", ExifValue::Int(-(first / 16))),
        0x1047 => ("GrainEffectRoughness", enum_text(first, effect_name)),
        0x1048 => ("ColorChromeEffect", enum_text(first, effect_name)),
        0x104c => ("GrainEffectSize", enum_text(first, grain_size_name)),
        0x104e => ("ColorChromeFXBlue", enum_text(first, effect_name)),
        0x1401 => ("FilmMode", enum_text(first, film_mode_name)),
        0x1402 => ("DynamicRangeSetting", enum_text(first, dynamic_range_name)),
        0x1403 => ("DevelopmentDynamicRange", ExifValue::Int(first)),
        _ => return None,
    };
    Some(entry)
}

fn ascii_value(note: &[u8], value_slot: usize, count: usize) -> Option<ExifValue> {
    let start = if count <= 4 {
        value_slot
    } else {
        read_u32(note, value_slot)? as usize
    };
    let bytes = note.get(start..start + count)?;
    let text: String = bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(ExifValue::Text(text))
    }
}

fn enum_text(value: i64, name: fn(i64) -> Option<&'static str>) -> ExifValue {
    match name(value) {
        Some(text) => ExifValue::Text(text.to_string()),
        None => ExifValue::Int(value),
    }
}

fn film_mode_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0x000 => "Provia (Standard)",
        0x120 => "Astia (Smooth)",
        0x200 | 0x400 => "Velvia (Vivid)",
        0x500 => "Pro Neg. Std",
        0x501 => "Pro Neg. Hi",
        0x600 => "Classic Chrome",
        0x700 => "Eterna (Cinema)",
        0x800 => "Classic Negative",
        0x900 => "Bleach Bypass",
        0xa00 => "Nostalgic Neg",
        0xb00 => "Reala ACE",
        _ => return None,
    })
}

fn saturation_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0x000 => "0 (Normal)",
        0x080 => "+1 (Medium High)",
        0x0c0 => "+3",
        0x0e0 => "+4",
        0x100 => "+2 (High)",
        0x180 => "-1 (Medium Low)",
        0x200 => "-2 (Low)",
        0x2c0 => "-3",
        0x2e0 => "-4",
        0x300 => "B&W",
        0x301 => "B&W Red Filter",
        0x302 => "B&W Yellow Filter",
        0x303 => "B&W Green Filter",
        0x310 => "B&W Sepia",
        0x500 => "Acros",
        0x501 => "Acros Red Filter",
        0x502 => "Acros Yellow Filter",
        0x503 => "Acros Green Filter",
        _ => return None,
    })
}

fn sharpness_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0x01 => "-4 (Softest)",
        0x02 => "-3 (Very Soft)",
        0x03 => "0 (Normal)",
        0x04 => "+3 (Hard)",
        0x05 => "+4 (Hardest)",
        0x82 => "-1 (Medium Soft)",
        0x84 => "+1 (Medium Hard)",
        _ => return None,
    })
}

fn contrast_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0x000 => "0 (Normal)",
        0x080 => "+1 (Medium High)",
        0x100 => "+2 (High)",
        0x180 => "-1 (Medium Low)",
        0x200 => "-2 (Low)",
        _ => return None,
    })
}

fn white_balance_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0x000 => "Auto",
        0x001 => "Auto (White Priority)",
        0x002 => "Auto (Ambience Priority)",
        0x100 => "Daylight",
        0x200 => "Cloudy",
        0x300 => "Daylight Fluorescent",
        0x301 => "Day White Fluorescent",
        0x302 => "White Fluorescent",
        0x400 => "Incandescent",
        0x500 => "Flash",
        0x600 => "Underwater",
        0xf00 => "Custom",
        0xf01 => "Custom 2",
        0xf02 => "Custom 3",
        0xff0 => "Kelvin",
        _ => return None,
    })
}

fn noise_reduction_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0x000 => "0 (Normal)",
        0x100 => "+2 (Strong)",
        0x180 => "+1 (Medium Strong)",
        0x1c0 => "+3",
        0x1e0 => "+4",
        0x200 => "-2 (Weak)",
        0x280 => "-1 (Medium Weak)",
        0x2c0 => "-3",
        0x2e0 => "-4",
        _ => return None,
    })
}

fn effect_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0 => "Off",
        32 => "Weak",
        64 => "Strong",
        _ => return None,
    })
}

fn grain_size_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0 => "Off",
        16 => "Small",
        32 => "Large",
        _ => return None,
    })
}

fn dynamic_range_name(value: i64) -> Option<&'static str> {
    Some(match value {
        0x0000 => "Auto",
        0x0001 => "Manual",
        0x0100 => "DR100",
        0x0200 => "DR200",
        0x0201 => "DR400",
        0x8000 => "Film Simulation",
        _ => return None,
    })
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let slice = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let slice = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
}
