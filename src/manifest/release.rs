// src/manifest/release.rs

//! Release-tool (IUF) product manifests
//!
//! A product manifest describes IMS content under `content.ims`:
//!
//! ```yaml
//! content:
//!   ims:
//!     content_dirs:
//!     - ims-content            # each holds a canonical manifest.yaml
//!     recipes:
//!     - path: recipes/base.tar.gz
//!       linux_distribution: sles15
//!       md5sum: ...
//!     images:
//!     - name: base-image
//!       path: images/base
//!       rootfs: { path: base.squashfs, md5sum: ... }
//!       kernel: { path: base.kernel, md5sum: ... }
//!       initrd: { path: base.initrd, md5sum: ... }
//! ```
//!
//! Everything is turned into one canonical [`Manifest`] of `file` links
//! rooted at the distribution directory.

use super::{
    join_path, merge_manifests, ArtifactRecord, ArtifactType, Image, Images, Link, LinkType,
    Manifest, Recipe, Recipes,
};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Name of the canonical manifest inside a content directory
pub const CONTENT_DIR_MANIFEST: &str = "manifest.yaml";

/// Top level of a release-tool product manifest
///
/// Only `content.ims` matters here; every other key is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseManifest {
    #[serde(default)]
    pub content: Option<ReleaseContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseContent {
    #[serde(default)]
    pub ims: Option<ImsContent>,
}

/// The `content.ims` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImsContent {
    #[serde(default)]
    pub content_dirs: Option<Vec<String>>,
    #[serde(default)]
    pub recipes: Option<Vec<EnumeratedRecipe>>,
    #[serde(default)]
    pub images: Option<Vec<EnumeratedImage>>,
}

/// A recipe archive listed directly in the product manifest
#[derive(Debug, Clone, Deserialize)]
pub struct EnumeratedRecipe {
    #[serde(default)]
    pub name: Option<String>,
    /// Relative to the distribution root
    pub path: String,
    #[serde(default)]
    pub md5sum: Option<String>,
    #[serde(default)]
    pub linux_distribution: Option<String>,
    #[serde(default)]
    pub recipe_type: Option<String>,
    #[serde(default)]
    pub template_dictionary: Option<serde_json::Value>,
}

/// One file of an enumerated image
#[derive(Debug, Clone, Deserialize)]
pub struct EnumeratedArtifact {
    /// Relative to the image's own path
    pub path: String,
    #[serde(default)]
    pub md5sum: Option<String>,
}

/// An image listed directly in the product manifest
#[derive(Debug, Clone, Deserialize)]
pub struct EnumeratedImage {
    #[serde(default)]
    pub name: Option<String>,
    /// Directory relative to the distribution root
    pub path: String,
    #[serde(default)]
    pub rootfs: Option<EnumeratedArtifact>,
    #[serde(default)]
    pub kernel: Option<EnumeratedArtifact>,
    #[serde(default)]
    pub initrd: Option<EnumeratedArtifact>,
}

impl EnumeratedImage {
    /// Present artifacts in upload-slot order
    fn artifacts(&self) -> impl Iterator<Item = (ArtifactType, &EnumeratedArtifact)> {
        [
            (ArtifactType::Rootfs, self.rootfs.as_ref()),
            (ArtifactType::Kernel, self.kernel.as_ref()),
            (ArtifactType::Initrd, self.initrd.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, artifact)| artifact.map(|a| (kind, a)))
    }
}

impl ReleaseManifest {
    pub fn from_yaml(source_name: &str, content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::parse(source_name, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&path.display().to_string(), &content)
    }

    fn ims(&self) -> Option<&ImsContent> {
        self.content.as_ref().and_then(|c| c.ims.as_ref())
    }
}

/// Build the canonical manifest for a release-tool product manifest
///
/// Content directories are processed first, then the enumerated recipes and
/// images; on a name collision the enumerated entry wins. The result is
/// always stamped `1.0.0` whatever version the product manifest carries.
pub fn normalize_release_manifest(input: &ReleaseManifest, distribution_root: &str) -> Manifest {
    let ims = input.ims().cloned().unwrap_or_default();

    let content_dirs = ims.content_dirs.unwrap_or_default();
    let from_content_dirs = process_content_dirs(content_dirs.as_slice(), distribution_root);

    let recipes = ims.recipes.unwrap_or_default();
    let images = ims.images.unwrap_or_default();
    let enumerated = convert_enumerated(&recipes, &images, distribution_root);

    merge_manifests([&from_content_dirs, &enumerated])
}

/// Read and rewrite each content directory's manifest, then merge them
///
/// A directory whose manifest is missing, unreadable or malformed is logged
/// and skipped; it never fails the run.
pub fn process_content_dirs<S: AsRef<str>>(paths: &[S], distribution_root: &str) -> Manifest {
    let mut manifests = Vec::with_capacity(paths.len());

    for content_dir in paths {
        let content_dir = content_dir.as_ref();
        let full_path = join_path(distribution_root, content_dir);
        let manifest_path = Path::new(&full_path).join(CONTENT_DIR_MANIFEST);

        let content = match std::fs::read_to_string(&manifest_path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "Could not open IMS content manifest {}: {}; skipping",
                    manifest_path.display(),
                    e
                );
                continue;
            }
        };

        match Manifest::from_yaml(&manifest_path.display().to_string(), &content) {
            Ok(manifest) => {
                debug!("Loaded content directory manifest {}", manifest_path.display());
                manifests.push(rewrite_content_dir_manifest(&manifest, &full_path));
            }
            Err(e) => {
                warn!(
                    "Could not parse manifest YAML from content directory {}: {}",
                    content_dir, e
                );
            }
        }
    }

    merge_manifests(&manifests)
}

/// Re-root a content directory manifest's `file` links under its directory
///
/// Content directory manifests are written as if the directory were `/`, so
/// `/a/b.sqshfs` in `/mnt/x` becomes `/mnt/x/a/b.sqshfs`. Other link types
/// are left alone. The input manifest is not modified.
pub fn rewrite_content_dir_manifest(manifest: &Manifest, content_dir_path: &str) -> Manifest {
    let fix_link = |link: &mut Link| {
        if link.link_type == LinkType::File {
            link.path = join_path(content_dir_path, link.path.trim_matches('/'));
        }
    };

    let mut rewritten = manifest.clone();
    for recipe in rewritten.recipes.iter_mut().flat_map(|r| r.values_mut()) {
        fix_link(&mut recipe.link);
    }
    for image in rewritten.images.iter_mut().flat_map(|i| i.values_mut()) {
        for artifact in &mut image.artifacts {
            fix_link(&mut artifact.link);
        }
    }
    rewritten
}

/// Name a recipe after its archive when the manifest gives none
///
/// `foo-1.2.tar.gz` and `foo-1.2.tgz` both become `foo-1.2`.
fn derive_recipe_name(path: &str) -> String {
    let basename = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());

    if let Some(stem) = basename.strip_suffix(".tar.gz") {
        return stem.to_string();
    }
    Path::new(&basename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(basename)
}

fn derive_image_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Convert enumerated recipes and images into a canonical manifest
///
/// Both `recipes` and `images` are present in the result, possibly empty.
/// An image with none of `rootfs`, `kernel`, `initrd` contributes nothing.
pub fn convert_enumerated(
    recipes: &[EnumeratedRecipe],
    images: &[EnumeratedImage],
    distribution_root: &str,
) -> Manifest {
    let mut converted_recipes = Recipes::new();
    for recipe in recipes {
        let name = recipe
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| derive_recipe_name(&recipe.path));

        let built = Recipe {
            link: Link::file(join_path(distribution_root, &recipe.path)),
            md5: recipe.md5sum.clone().unwrap_or_default(),
            linux_distribution: recipe.linux_distribution.clone(),
            recipe_type: recipe.recipe_type.clone(),
            template_dictionary: recipe.template_dictionary.clone(),
            arch: None,
            require_dkms: None,
        };

        if converted_recipes.insert(name.clone(), built).is_some() {
            warn!(
                "Recipe \"{}\" is duplicated in the product manifest; only the last instance will be imported",
                name
            );
        }
    }

    let mut converted_images = Images::new();
    for image in images {
        let image_dir = join_path(distribution_root, &image.path);
        let artifacts: Vec<ArtifactRecord> = image
            .artifacts()
            .map(|(artifact_type, artifact)| ArtifactRecord {
                link: Link::file(join_path(&image_dir, &artifact.path)),
                md5: artifact.md5sum.clone().unwrap_or_default(),
                artifact_type,
            })
            .collect();

        if artifacts.is_empty() {
            info!("Image entry at {} lists no artifacts; ignoring it", image.path);
            continue;
        }

        let name = image
            .name
            .clone()
            .unwrap_or_else(|| derive_image_name(&image.path));
        let converted = Image {
            artifacts,
            arch: None,
        };
        if converted_images.insert(name.clone(), converted).is_some() {
            warn!(
                "Image \"{}\" is duplicated in the product manifest; only the last instance will be imported",
                name
            );
        }
    }

    let mut manifest = Manifest::canonical();
    manifest.recipes = Some(converted_recipes);
    manifest.images = Some(converted_images);
    manifest
}
