use crate::xml::XmlError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StampError {
    #[error("Folder not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Project file is not well-formed: {0}")]
    Parse(#[from] XmlError),
    #[error("Cannot find the property group that declares a TargetFramework")]
    Structural,
    #[error("Malformed version '{0}': expected four dot-separated integers")]
    Format(String),
}
