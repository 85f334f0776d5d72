// src/lib.rs

//! IMS artifact loader
//!
//! Loads OS image recipes and pre-built boot images described by a manifest
//! into the Image Management Service (IMS) and its object store, optionally
//! creating a BOS session template for each image.
//!
//! # Architecture
//!
//! - Manifests: release-tool manifests are normalized into the canonical
//!   `{version, recipes, images}` shape, merging content directories
//! - Acquisition: `file` and `http` links become verified local files
//! - Upload: an [`ArtifactUploader`] registers the files with IMS
//! - Templates: best-effort BOS session templates per uploaded image
//!
//! A run is best-effort per item and all-or-nothing for its results record.

pub mod acquire;
pub mod bos;
pub mod client;
pub mod config;
mod error;
pub mod hash;
pub mod ims;
pub mod manifest;
pub mod pipeline;

pub use acquire::Acquirer;
pub use bos::TemplateEmitter;
pub use client::{RetryPolicy, Session};
pub use config::{BosConfig, BosVersion, Config, ReleaseConfig, S3Config};
pub use error::{Error, Result};
pub use ims::{
    ArtifactUploader, ImageUpload, ImageUploadResult, ImsClient, RecipeRecord, RecipeUpload,
};
pub use manifest::{
    merge_manifests, normalize_release_manifest, ArtifactRecord, ArtifactType, Image, Link,
    LinkType, Manifest, Recipe, ReleaseManifest,
};
pub use pipeline::{LoadOutcome, LoadResults, Loader, RecordId};
