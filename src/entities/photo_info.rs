use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})[-_ ]*").expect("leading date pattern"));
static TRAILING_VIEWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_ ]*(\d+)views?$").expect("trailing views pattern"));
static VIEWS_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)views?").expect("views token pattern"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_]+").expect("separator pattern"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("space run pattern"));

/// Metadata derivable from the object key alone: display title, capture date
/// encoded in the file name, view count, and the tag path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhotoInfo {
    pub title: String,
    pub date: Option<DateTime<Utc>>,
    pub views: u32,
    pub tags: Vec<String>,
}

impl PhotoInfo {
    pub fn from_key(key: &str, prefix: &str) -> Self {
        let relative = key.strip_prefix(prefix).unwrap_or(key);
        let relative = relative.trim_start_matches('/');

        let mut segments: Vec<&str> = relative.split('/').collect();
        let file_name = segments.pop().unwrap_or(relative);
        let stem = match file_name.rfind('.') {
            Some(index) if index > 0 => &file_name[..index],
            _ => file_name,
        };

        let tags = segments
            .iter()
            .map(|segment| segment.trim())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            title: title_from_stem(stem),
            date: date_from_stem(stem),
            views: views_from_stem(stem),
            tags,
        }
    }
}

/// Strips a leading `YYYY-MM-DD` date and a trailing `<digits>views` token,
/// collapses separators to spaces, and falls back to the raw stem when
/// nothing is left.
fn title_from_stem(stem: &str) -> String {
    let without_date = LEADING_DATE.replace(stem, "");
    let without_views = TRAILING_VIEWS.replace(&without_date, "");
    let spaced = SEPARATORS.replace_all(&without_views, " ");
    let collapsed = SPACES.replace_all(&spaced, " ");
    let title = collapsed.trim();
    if title.is_empty() {
        stem.to_string()
    } else {
        title.to_string()
    }
}

fn date_from_stem(stem: &str) -> Option<DateTime<Utc>> {
    let capture = LEADING_DATE.captures(stem)?;
    let date = NaiveDate::parse_from_str(&capture[1], "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

fn views_from_stem(stem: &str) -> u32 {
    VIEWS_TOKEN
        .captures(stem)
        .and_then(|capture| capture[1].parse().ok())
        .unwrap_or(0)
}
