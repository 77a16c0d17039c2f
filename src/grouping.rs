use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Folder label for a date, `Year_Month_Day` without zero padding
/// (e.g. `2020_9_21`), or [`DateKey::NO_DATE_TAKEN`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateKey(String);

impl DateKey {
    pub const NO_DATE_TAKEN: &'static str = "NO_DATE_TAKEN";

    pub fn from_date(date: NaiveDate) -> Self {
        Self(format!("{}_{}_{}", date.year(), date.month(), date.day()))
    }

    pub fn no_date() -> Self {
        Self(Self::NO_DATE_TAKEN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Option<NaiveDate>> for DateKey {
    fn from(date: Option<NaiveDate>) -> Self {
        date.map(Self::from_date).unwrap_or_else(Self::no_date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct DateGroup {
    pub key: DateKey,
    pub files: Vec<PathBuf>,
}

/// Files keyed by date. Dates iterate in the order they were first seen and
/// files keep their insertion order within a date.
#[derive(Debug, Default)]
pub struct DateGroups {
    groups: Vec<DateGroup>,
    index: HashMap<DateKey, usize>,
}

impl DateGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: DateKey, path: PathBuf) {
        match self.index.get(&key) {
            Some(&i) => self.groups[i].files.push(path),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push(DateGroup {
                    key,
                    files: vec![path],
                });
            }
        }
    }

    /// Number of distinct dates.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|g| g.files.len()).sum()
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&[PathBuf]> {
        self.groups
            .iter()
            .find(|g| g.key.as_str() == key)
            .map(|g| g.files.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateGroup> {
        self.groups.iter()
    }
}

/// Resolve a key for every file and bucket the files by it.
/// `on_progress` receives (distinct dates, files processed) after each file.
pub fn group_by_date<R, P>(files: &[PathBuf], mut resolve: R, mut on_progress: P) -> DateGroups
where
    R: FnMut(&Path) -> DateKey,
    P: FnMut(usize, usize),
{
    let mut groups = DateGroups::new();
    for (i, path) in files.iter().enumerate() {
        let key = resolve(path);
        groups.insert(key, path.clone());
        on_progress(groups.len(), i + 1);
    }
    groups
}
