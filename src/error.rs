// src/error.rs

//! Error types for manifest loading, artifact acquisition and uploads
//!
//! Acquisition and upload errors are per-item: the loader logs them and
//! records a failed recipe or image, it never lets them escape a run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Manifest YAML could not be parsed
    #[error("cannot parse manifest {source_name}: {message}")]
    Parse { source_name: String, message: String },

    /// Canonical manifest version is missing or not one we load
    #[error("unsupported or missing manifest version: {0:?}")]
    UnsupportedVersion(Option<String>),

    /// Link type other than `http` or `file`
    #[error("cannot acquire artifact with unsupported or missing link type '{link_type}' ({path})")]
    UnsupportedLinkType { link_type: String, path: String },

    /// A `file` link points at nothing
    #[error("failed to find artifact {0} in the local filesystem")]
    ArtifactNotFound(PathBuf),

    /// A `file` link exists but this process cannot read it
    #[error(
        "failed to access artifact {} due to permissions (mode {mode:o}, owner {file_uid}:{file_gid}, process {uid}:{gid})",
        path.display()
    )]
    PermissionDenied {
        path: PathBuf,
        mode: u32,
        file_uid: u32,
        file_gid: u32,
        uid: u32,
        gid: u32,
    },

    /// Transport failure or non-2xx status while downloading
    #[error("download of {url} failed: {message}")]
    DownloadFailed { url: String, message: String },

    /// Calculated digest differs from the manifest
    #[error("md5 mismatch for {}: expected {expected}, got {actual}", path.display())]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Recipe lacks a field IMS needs
    #[error("malformed recipe {name}: {message}")]
    MalformedRecipe { name: String, message: String },

    /// IMS or the object store rejected an upload
    #[error("upload service error: {0}")]
    UploadService(String),

    /// BOS rejected or never received a session template
    #[error("session template submission failed: {0}")]
    TemplateSubmission(String),

    /// Missing or invalid process configuration
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a parse error for a named manifest source
    pub fn parse(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }

    /// Build an upload service error from anything displayable
    pub fn upload(err: impl std::fmt::Display) -> Self {
        Self::UploadService(err.to_string())
    }
}
