use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Timestamp tags and their sub-second companions, highest priority first.
pub const DATE_TAGS: [(Tag, Tag); 3] = [
    // 36867 / 37521
    (Tag::DateTimeOriginal, Tag::SubSecTimeOriginal),
    // 36868 / 37522
    (Tag::DateTimeDigitized, Tag::SubSecTimeDigitized),
    // 306 / 37520
    (Tag::DateTime, Tag::SubSecTime),
];

/// "2020:09:21 14:03:11" joined with its sub-second part, e.g. ".500000".
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S%.f";

/// A metadata value as a reader hands it back: either a scalar or a
/// sequence of which only the first element is meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Single(String),
    Sequence(Vec<String>),
}

impl TagValue {
    pub fn into_first(self) -> Option<String> {
        match self {
            TagValue::Single(s) => Some(s),
            TagValue::Sequence(values) => values.into_iter().next(),
        }
    }
}

/// Anything that can look up a metadata value by tag.
pub trait TagSource {
    fn tag_value(&self, tag: Tag) -> Option<TagValue>;
}

impl TagSource for exif::Exif {
    fn tag_value(&self, tag: Tag) -> Option<TagValue> {
        let field = self.get_field(tag, In::PRIMARY)?;
        let value = match field.value {
            // The default formatter quotes ASCII values, so decode them directly
            Value::Ascii(ref parts) => TagValue::Sequence(
                parts
                    .iter()
                    .map(|p| String::from_utf8_lossy(p).into_owned())
                    .collect(),
            ),
            Value::Short(ref v) => TagValue::Sequence(v.iter().map(u16::to_string).collect()),
            Value::Long(ref v) => TagValue::Sequence(v.iter().map(u32::to_string).collect()),
            _ => TagValue::Single(field.display_value().to_string()),
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    Metadata,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub source: DateSource,
}

/// Determine the date a file was taken.
/// Tries the EXIF timestamps, falls back to the filesystem modified time.
/// Returns `None` only when the file cannot be stat'ed at all.
pub fn resolve(path: &Path) -> Option<ResolvedDate> {
    match extract_exif_date(path) {
        Ok(Some(date)) => {
            return Some(ResolvedDate {
                date,
                source: DateSource::Metadata,
            })
        }
        Ok(None) => tracing::debug!("No EXIF date in {}", path.display()),
        Err(e) => tracing::debug!("Could not read EXIF from {}: {:#}", path.display(), e),
    }

    match extract_filesystem_date(path) {
        Ok(date) => Some(ResolvedDate {
            date,
            source: DateSource::Modified,
        }),
        Err(e) => {
            tracing::warn!(
                "Could not get modified date for {}: {:#}",
                path.display(),
                e
            );
            None
        }
    }
}

fn extract_exif_date(path: &Path) -> Result<Option<NaiveDate>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader)?;
    date_from_tags(&exif)
}

/// Walk [`DATE_TAGS`] and parse the first timestamp present.
/// `Ok(None)` means none of the timestamps exist; a timestamp that exists
/// but does not parse is an error.
pub fn date_from_tags<S: TagSource>(source: &S) -> Result<Option<NaiveDate>> {
    for (primary, subsec) in DATE_TAGS {
        let Some(value) = source.tag_value(primary) else {
            continue;
        };
        let timestamp = value
            .into_first()
            .ok_or_else(|| anyhow!("{} has no value", primary))?;
        let subsec = source
            .tag_value(subsec)
            .and_then(TagValue::into_first)
            .unwrap_or_else(|| "0".to_string());
        let subsec = subsec.trim();
        if !is_fraction(subsec) {
            bail!("Malformed sub-second value {:?} for {}", subsec, primary);
        }

        let full = format!("{}.{}", timestamp.trim(), subsec);
        let dt = NaiveDateTime::parse_from_str(&full, EXIF_DATETIME_FORMAT)
            .with_context(|| format!("Malformed {} value {:?}", primary, full))?;
        return Ok(Some(dt.date()));
    }
    Ok(None)
}

/// One to six digits, the precision a microsecond fraction allows.
fn is_fraction(s: &str) -> bool {
    (1..=6).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

fn extract_filesystem_date(path: &Path) -> Result<NaiveDate> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata.modified()?;
    let datetime: chrono::DateTime<chrono::Local> = modified.into();
    Ok(datetime.date_naive())
}

/// How many files were dated by each source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceCounts {
    pub metadata: usize,
    pub modified: usize,
    pub undated: usize,
}

impl SourceCounts {
    pub fn record(&mut self, resolved: Option<&ResolvedDate>) {
        match resolved.map(|r| r.source) {
            Some(DateSource::Metadata) => self.metadata += 1,
            Some(DateSource::Modified) => self.modified += 1,
            None => self.undated += 1,
        }
    }
}
