// src/manifest/mod.rs

//! Canonical artifact manifest
//!
//! The canonical manifest (`version`, `recipes`, `images`) is what the loader
//! consumes. Release-tool manifests are turned into this shape by
//! [`release::normalize_release_manifest`]; several canonical manifests are
//! folded together by [`merge::merge_manifests`].
//!
//! Maps are [`IndexMap`]s: manifest order decides which entry survives a
//! name collision, and replacing a name keeps its original position.

pub mod merge;
pub mod release;

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

pub use merge::merge_manifests;
pub use release::{
    convert_enumerated, normalize_release_manifest, process_content_dirs,
    rewrite_content_dir_manifest, ReleaseManifest,
};

/// Version stamped on every manifest this crate produces
pub const CANONICAL_VERSION: &str = "1.0.0";

/// Canonical manifest versions the loader accepts
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0.0", "1.1.0"];

/// Default recipe architecture
pub const DEFAULT_ARCH: &str = "x86_64";

/// Recipes keyed by name
pub type Recipes = IndexMap<String, Recipe>;

/// Images keyed by name
pub type Images = IndexMap<String, Image>;

/// How an artifact's bytes are reached
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LinkType {
    Http,
    File,
    /// Anything else; rejected when the artifact is acquired
    Other(String),
    /// No `type` key at all
    #[default]
    Missing,
}

impl From<String> for LinkType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "http" => Self::Http,
            "file" => Self::File,
            "" => Self::Missing,
            _ => Self::Other(s),
        }
    }
}

impl LinkType {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<LinkType> for String {
    fn from(t: LinkType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::File => write!(f, "file"),
            Self::Other(s) => write!(f, "{s}"),
            Self::Missing => Ok(()),
        }
    }
}

/// Reference to an artifact's bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "type", default, skip_serializing_if = "LinkType::is_missing")]
    pub link_type: LinkType,
    /// Absolute filesystem path or absolute URL
    pub path: String,
}

impl Link {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            link_type: LinkType::File,
            path: path.into(),
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self {
            link_type: LinkType::Http,
            path: url.into(),
        }
    }
}

/// Role of an artifact inside an image; the MIME type IMS keys it by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ArtifactType {
    Rootfs,
    Kernel,
    Initrd,
    BootParameters,
    /// Unrecognized roles are carried but never uploaded
    Other(String),
}

impl ArtifactType {
    pub const ROOTFS_MIME: &'static str = "application/vnd.cray.image.rootfs.squashfs";
    pub const KERNEL_MIME: &'static str = "application/vnd.cray.image.kernel";
    pub const INITRD_MIME: &'static str = "application/vnd.cray.image.initrd";
    pub const BOOT_PARAMETERS_MIME: &'static str = "application/vnd.cray.image.parameters.boot";

    pub fn mime_type(&self) -> &str {
        match self {
            Self::Rootfs => Self::ROOTFS_MIME,
            Self::Kernel => Self::KERNEL_MIME,
            Self::Initrd => Self::INITRD_MIME,
            Self::BootParameters => Self::BOOT_PARAMETERS_MIME,
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ArtifactType {
    fn from(s: String) -> Self {
        match s.as_str() {
            Self::ROOTFS_MIME => Self::Rootfs,
            Self::KERNEL_MIME => Self::Kernel,
            Self::INITRD_MIME => Self::Initrd,
            Self::BOOT_PARAMETERS_MIME => Self::BootParameters,
            _ => Self::Other(s),
        }
    }
}

impl From<ArtifactType> for String {
    fn from(t: ArtifactType) -> Self {
        t.mime_type().to_string()
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// OS image-build recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub link: Link,
    /// Empty means "do not verify"
    #[serde(default, deserialize_with = "md5_or_empty")]
    pub md5: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux_distribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_type: Option<String>,
    /// Passed through to IMS untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dictionary: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_dkms: Option<bool>,
}

impl Recipe {
    pub fn arch(&self) -> &str {
        self.arch.as_deref().unwrap_or(DEFAULT_ARCH)
    }

    pub fn require_dkms(&self) -> bool {
        self.require_dkms.unwrap_or(false)
    }
}

/// One typed file of an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub link: Link,
    #[serde(default, deserialize_with = "md5_or_empty")]
    pub md5: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
}

/// Bootable image bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub artifacts: Vec<ArtifactRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// Canonical manifest
///
/// `recipes`/`images` are `None` when the key is absent, which is distinct
/// from present-but-empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipes: Option<Recipes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Images>,
}

impl Manifest {
    /// Empty manifest stamped with [`CANONICAL_VERSION`]
    pub fn canonical() -> Self {
        Self {
            version: Some(CANONICAL_VERSION.to_string()),
            recipes: None,
            images: None,
        }
    }

    /// Parse a canonical manifest without checking its version
    pub fn from_yaml(source_name: &str, content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::parse(source_name, e))
    }

    /// Read and parse a canonical manifest, rejecting unknown versions
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest = Self::from_yaml(&path.display().to_string(), &content)?;
        manifest.check_version()?;
        Ok(manifest)
    }

    /// Fail with [`Error::UnsupportedVersion`] unless the version is loadable
    pub fn check_version(&self) -> Result<()> {
        match self.version.as_deref() {
            Some(v) if SUPPORTED_VERSIONS.contains(&v) => Ok(()),
            other => Err(Error::UnsupportedVersion(other.map(str::to_string))),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::parse("canonical manifest", e))
    }

    /// Recipes in manifest order, or nothing
    pub fn recipes(&self) -> impl Iterator<Item = (&String, &Recipe)> {
        self.recipes.iter().flat_map(|r| r.iter())
    }

    /// Images in manifest order, or nothing
    pub fn images(&self) -> impl Iterator<Item = (&String, &Image)> {
        self.images.iter().flat_map(|i| i.iter())
    }
}

/// `md5: ~` and `md5: null` mean the same as leaving the key out
fn md5_or_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Join path segments textually, the way `os.path.join` does
///
/// An absolute segment replaces what came before it. The filesystem is
/// never consulted.
pub(crate) fn join_path(base: &str, segment: &str) -> String {
    Path::new(base).join(segment).to_string_lossy().into_owned()
}
