use crate::arguments::{OutputFormat, Strategy};
use crate::errors::StampError;
use crate::locator::locate;
use crate::version::{INITIAL_VERSION, Version};
use crate::xml::{Document, XmlError};
use anyhow::{Context, Result};
use log::{debug, error, info};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TARGET_FRAMEWORK_TAG: &str = "TargetFramework";
const PROPERTY_GROUP_TAG: &str = "PropertyGroup";
const VERSION_TAG: &str = "Version";
const ASSEMBLY_VERSION_TAG: &str = "AssemblyVersion";
const FILE_VERSION_TAG: &str = "FileVersion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampOptions {
    pub strategy: Strategy,
    pub reset_build: bool,
    pub recursive: bool,
    /// Abort the batch on the first failing file instead of logging and moving on.
    pub fail_fast: bool,
    pub dry_run: bool,
}

impl Default for StampOptions {
    fn default() -> Self {
        StampOptions {
            strategy: Strategy::default(),
            reset_build: false,
            recursive: true,
            fail_fast: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChange {
    pub old_version: String,
    pub new_version: String,
}

/// One line of output per stamped project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StampRecord {
    pub project: PathBuf,
    pub new_version: String,
    pub old_version: String,
}

impl StampRecord {
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        Ok(match format {
            OutputFormat::Text => format!(
                "{}: {} --> {}",
                self.project.display(),
                self.old_version,
                self.new_version
            ),
            OutputFormat::Json => serde_json::to_string(self)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StampSummary {
    pub stamped: usize,
    pub failed: usize,
}

/// Stamps the property group that declares the target framework.
///
/// `Version`, `AssemblyVersion` and `FileVersion` are created when missing, then
/// all three receive the version computed from the current `Version` text.
/// Nothing is modified when the group is missing; a malformed version fails after
/// the missing fields were added, so the caller must not persist the document then.
pub fn stamp_document(document: &mut Document, strategy: Strategy, reset_build: bool) -> Result<VersionChange, StampError> {
    let group_path = document
        .find_all(TARGET_FRAMEWORK_TAG)
        .iter()
        .find_map(|marker| document.nearest_ancestor(marker, PROPERTY_GROUP_TAG))
        .ok_or(StampError::Structural)?;
    let group = document.element_at_mut(&group_path).ok_or(StampError::Structural)?;

    let old_version = group
        .get_or_insert_field(VERSION_TAG, INITIAL_VERSION)
        .ok_or(StampError::Structural)?
        .text()?
        .trim()
        .to_string();
    group
        .get_or_insert_field(ASSEMBLY_VERSION_TAG, "")
        .ok_or(StampError::Structural)?;
    group
        .get_or_insert_field(FILE_VERSION_TAG, "")
        .ok_or(StampError::Structural)?;

    let new_version = Version::parse(&old_version)?
        .bump(strategy, reset_build)?
        .to_string();
    for tag in [VERSION_TAG, ASSEMBLY_VERSION_TAG, FILE_VERSION_TAG] {
        group
            .get_or_insert_field(tag, "")
            .ok_or(StampError::Structural)?
            .set_text(&new_version);
    }

    Ok(VersionChange { old_version, new_version })
}

pub fn load_document(path: impl AsRef<Path>) -> Result<Document> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
    let document = String::from_utf8(bytes)
        .map_err(XmlError::from)
        .and_then(|source| Document::parse(&source))
        .map_err(StampError::Parse)?;
    Ok(document)
}

/// Stamps a single project file in place.
pub fn stamp_file(path: impl AsRef<Path>, options: &StampOptions) -> Result<StampRecord> {
    let path = path.as_ref();
    debug!("Checking file: '{}'", path.display());

    let mut document = load_document(path).with_context(|| format!("Failed to stamp '{}'", path.display()))?;
    let change = stamp_document(&mut document, options.strategy, options.reset_build)
        .with_context(|| format!("Failed to stamp '{}'", path.display()))?;
    debug!(
        "Incrementing version from {} -> {}",
        change.old_version, change.new_version
    );

    if options.dry_run {
        info!("Dry run, not writing '{}'", path.display());
    } else {
        write_atomically(path, &document.to_string())?;
    }

    Ok(StampRecord {
        project: path.to_path_buf(),
        new_version: change.new_version,
        old_version: change.old_version,
    })
}

/// Stamps every project file under `root`, handing each record to `on_record` as
/// soon as its file has been written.
///
/// A missing root is always fatal. Per-file failures are logged and counted in the
/// summary, unless `fail_fast` is set, in which case the first one is returned and
/// files already stamped stay stamped.
pub fn stamp_all(
    root: impl AsRef<Path>,
    options: &StampOptions,
    mut on_record: impl FnMut(&StampRecord) -> Result<()>,
) -> Result<StampSummary> {
    let root = root.as_ref();
    info!("Stamping projects in '{}' with {:?}", root.display(), options.strategy);

    let mut summary = StampSummary::default();
    for path in locate(root, options.recursive)? {
        match path.and_then(|path| stamp_file(&path, options)) {
            Ok(record) => {
                summary.stamped += 1;
                on_record(&record)?;
            }
            Err(err) if options.fail_fast => return Err(err),
            Err(err) => {
                error!("{:#}", err);
                summary.failed += 1;
            }
        }
    }

    info!("Stamped {} project(s), {} failed", summary.stamped, summary.failed);
    Ok(summary)
}

/// Replaces `path` with `contents` through a temporary file in the same directory.
///
/// Symlinked and hard-linked files are written in place instead, so the link keeps
/// pointing at the updated content. The swapped-in file takes the original's
/// permissions but is owned by the current user.
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let metadata = fs::symlink_metadata(path).with_context(|| format!("Failed to inspect '{}'", path.display()))?;
    if metadata.file_type().is_symlink() || is_hard_linked(&metadata) {
        debug!("'{}' is a link, writing in place", path.display());
        fs::write(path, contents).with_context(|| format!("Failed to write '{}'", path.display()))?;
        return Ok(());
    }

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path)?.permissions();

    let mut file = NamedTempFile::new_in(directory)
        .with_context(|| format!("Failed to create a temporary file in '{}'", directory.display()))?;
    file.write_all(contents.as_bytes())?;
    file.as_file().sync_all()?;
    fs::set_permissions(file.path(), permissions)?;
    file.persist(path)
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn is_hard_linked(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink() > 1
}

#[cfg(not(unix))]
fn is_hard_linked(_metadata: &fs::Metadata) -> bool {
    false
}
