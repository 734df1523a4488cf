mod common;

use common::fuji_maker_note;
use photo_manifest::entities::ExifValue;
use photo_manifest::services::fuji_recipe;

const SHORT: u16 = 3;
const SLONG: u16 = 9;

#[test]
fn non_fuji_notes_are_rejected() {
    assert!(fuji_recipe::decode(b"Canon\0\0\0\0\0\0\0").is_none());
    assert!(fuji_recipe::decode(b"").is_none());
    assert!(fuji_recipe::decode(b"FUJIFILM").is_none());
}

#[test]
fn film_modes_translate_to_names() {
    let note = fuji_maker_note(&[(0x1401, SHORT, 0x000)]);
    let recipe = fuji_recipe::decode(&note).expect("recipe");
    assert_eq!(recipe.text("FilmMode"), Some("Provia (Standard)"));

    let note = fuji_maker_note(&[(0x1401, SHORT, 0x800)]);
    let recipe = fuji_recipe::decode(&note).expect("recipe");
    assert_eq!(recipe.text("FilmMode"), Some("Classic Negative"));
}

#[test]
fn unknown_enum_values_fall_back_to_numbers() {
    let note = fuji_maker_note(&[(0x1401, SHORT, 0x123)]);
    let recipe = fuji_recipe::decode(&note).expect("recipe");
    assert_eq!(
        recipe.get("FilmMode").and_then(ExifValue::as_int),
        Some(0x123)
    );
}

#[test]
fn tone_values_are_rescaled() {
    let note = fuji_maker_note(&[
        (0x1040, SLONG, (-32i32) as u32),
        (0x1041, SLONG, 16),
        (0x100f, SLONG, 3000),
    ]);
    let recipe = fuji_recipe::decode(&note).expect("recipe");

    assert_eq!(
        recipe.get("ShadowTone").and_then(ExifValue::as_int),
        Some(2)
    );
    assert_eq!(
        recipe.get("HighlightTone").and_then(ExifValue::as_int),
        Some(-1)
    );
    assert_eq!(recipe.get("Clarity").and_then(ExifValue::as_int), Some(3));
}

#[test]
fn grain_and_color_chrome_settings_decode() {
    let note = fuji_maker_note(&[
        (0x1047, SHORT, 32),
        (0x104c, SHORT, 16),
        (0x1048, SHORT, 0),
        (0x104e, SHORT, 64),
        (0x1402, SHORT, 0x200),
        (0x1403, SHORT, 200),
    ]);
    let recipe = fuji_recipe::decode(&note).expect("recipe");

    assert_eq!(recipe.text("GrainEffectRoughness"), Some("Weak"));
    assert_eq!(recipe.text("GrainEffectSize"), Some("Small"));
    assert_eq!(recipe.text("ColorChromeEffect"), Some("Off"));
    assert_eq!(recipe.text("ColorChromeFXBlue"), Some("Strong"));
    assert_eq!(recipe.text("DynamicRangeSetting"), Some("DR200"));
    assert_eq!(
        recipe
            .get("DevelopmentDynamicRange")
            .and_then(ExifValue::as_int),
        Some(200)
    );
}

#[test]
fn notes_with_only_unknown_tags_yield_none() {
    let note = fuji_maker_note(&[(0x9999, SHORT, 1)]);
    assert!(fuji_recipe::decode(&note).is_none());
}
