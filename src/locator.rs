use crate::errors::StampError;
use anyhow::Result;
use log::debug;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Matches `*.??proj` file names (csproj, fsproj, vbproj, ...) at the end of a path.
pub fn filename_match_regex() -> Result<Regex> {
    Ok(Regex::new(r#"(?i)[/\\][^/\\]*\.[^/\\]{2}proj$"#)?)
}

/// Lazily yields project files under `root`, in file-name order per directory.
///
/// Only the immediate directory is scanned unless `recursive` is set. A missing
/// root fails up front with [`StampError::NotFound`]; errors met while walking are
/// yielded in place of the entry that caused them.
pub fn locate(root: impl AsRef<Path>, recursive: bool) -> Result<impl Iterator<Item = Result<PathBuf>>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(StampError::NotFound(root.to_path_buf()).into());
    }

    debug!("Scanning '{}' (recursive: {})", root.display(), recursive);
    let filename_regex = filename_match_regex()?;
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    Ok(walker.into_iter().filter_map(move |item| match item {
        Ok(entry) => {
            let path = entry.path();
            if entry.file_type().is_file() && filename_regex.is_match(path.to_string_lossy().as_ref()) {
                debug!("Found project file: '{}'", path.display());
                Some(Ok(entry.into_path()))
            } else {
                None
            }
        }
        Err(err) => Some(Err(err.into())),
    }))
}
