use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Suffix filter built from a comma-separated list such as `jpg,mp4,mov`.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    suffixes: Vec<String>,
}

impl ExtensionFilter {
    pub fn parse(list: &str) -> Self {
        let suffixes = list
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { suffixes }
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    /// Matches on the end of the file name, so `jpg` also matches `photo.JPG`
    /// and `.tar.gz` style suffixes work.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();
        self.suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }
}

/// Collect every file under `input_dir` accepted by `filter`, in walk order.
pub fn scan_files(input_dir: &Path, filter: &ExtensionFilter) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(input_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if filter.matches(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
