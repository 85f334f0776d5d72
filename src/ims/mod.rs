// src/ims/mod.rs

//! Upload collaborator
//!
//! The loader hands verified local files to an [`ArtifactUploader`] and gets
//! IMS record identifiers back. [`ImsClient`] is the production
//! implementation: IMS REST calls over the shared session plus an
//! [`ObjectStore`] for the bytes.

mod client;
mod s3;

pub use client::{wait_until_ready, ImsClient, READINESS_INTERVAL};
pub use s3::{object_url, ObjectStore, S3Store};

use crate::error::Result;
use crate::manifest::ArtifactType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A verified recipe archive ready for registration
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeUpload {
    pub name: String,
    pub path: PathBuf,
    pub linux_distribution: String,
    pub template_dictionary: Option<serde_json::Value>,
    pub arch: String,
    pub require_dkms: bool,
}

/// Verified image artifacts, one optional file per upload slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageUpload {
    pub image_name: String,
    pub rootfs: Option<PathBuf>,
    pub kernel: Option<PathBuf>,
    pub initrd: Option<PathBuf>,
    pub boot_parameters: Option<PathBuf>,
    pub arch: Option<String>,
    /// Reuse an existing image of the same name instead of creating one
    pub skip_existing: bool,
}

impl ImageUpload {
    pub fn new(image_name: impl Into<String>) -> Self {
        Self {
            image_name: image_name.into(),
            ..Default::default()
        }
    }

    /// Mutable slot for a recognized artifact role; `None` for other roles
    pub fn slot_mut(&mut self, artifact_type: &ArtifactType) -> Option<&mut Option<PathBuf>> {
        match artifact_type {
            ArtifactType::Rootfs => Some(&mut self.rootfs),
            ArtifactType::Kernel => Some(&mut self.kernel),
            ArtifactType::Initrd => Some(&mut self.initrd),
            ArtifactType::BootParameters => Some(&mut self.boot_parameters),
            ArtifactType::Other(_) => None,
        }
    }

    /// Filled slots in upload order
    pub fn slots(&self) -> impl Iterator<Item = (ArtifactType, &Path)> {
        [
            (ArtifactType::Rootfs, &self.rootfs),
            (ArtifactType::Kernel, &self.kernel),
            (ArtifactType::Initrd, &self.initrd),
            (ArtifactType::BootParameters, &self.boot_parameters),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.as_deref().map(|p| (kind, p)))
    }
}

/// Object-store link stored on an IMS record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImsLink {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(rename = "type", default)]
    pub link_type: Option<String>,
}

impl ImsLink {
    pub fn s3(path: impl Into<String>, etag: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            etag: Some(etag.into()),
            link_type: Some("s3".to_string()),
        }
    }
}

/// IMS recipe record, as far as the loader cares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub link: Option<ImsLink>,
}

/// IMS image record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub link: Option<ImsLink>,
}

/// Outcome of an image upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUploadResult {
    pub ims_image_record: ImageRecord,
}

impl ImageUploadResult {
    /// Manifest etag and path of the uploaded image, when IMS reported both
    pub fn manifest_link(&self) -> Option<(&str, &str)> {
        let link = self.ims_image_record.link.as_ref()?;
        Some((link.etag.as_deref()?, link.path.as_deref()?))
    }
}

/// Service that persists artifacts and registers them with IMS
pub trait ArtifactUploader {
    fn recipe_upload(&self, recipe: &RecipeUpload) -> Result<RecipeRecord>;

    fn image_upload_artifacts(&self, image: &ImageUpload) -> Result<ImageUploadResult>;
}
