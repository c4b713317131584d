//! String and file-list helpers.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Trim leading and trailing whitespace.
pub fn strip(s: &str) -> &str {
    s.trim()
}

/// Split on whitespace, dropping empty tokens.
pub fn split(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

/// Replace every occurrence of `old` with `new`.
pub fn change(s: &str, old: &str, new: &str) -> String {
    if old.is_empty() {
        return s.to_string();
    }
    s.replace(old, new)
}

/// File name without its directory and extension (`/a/b/run1.hepmc` -> `run1`).
pub fn nameonly(name: &str) -> String {
    let path = Path::new(name);
    path.file_stem().map_or_else(|| name.to_string(), |s| s.to_string_lossy().into_owned())
}

/// Read a file list: whitespace-separated names, blank lines and `#` comments
/// skipped.
pub fn file_names(filelist: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let filelist = filelist.as_ref();
    let text = std::fs::read_to_string(filelist).map_err(|e| {
        Error::Validation(format!("unable to open file list '{}': {e}", filelist.display()))
    })?;
    Ok(parse_file_list(&text))
}

fn parse_file_list(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(|l| l.split('#').next().unwrap_or_default())
        .flat_map(str::split_whitespace)
        .map(PathBuf::from)
        .collect()
}
