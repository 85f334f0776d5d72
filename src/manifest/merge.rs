// src/manifest/merge.rs

//! Folding canonical manifests together
//!
//! Several content directories may ship the same recipe or image name. The
//! last manifest wins and each collision is logged.

use super::{Images, Manifest, Recipes};
use tracing::warn;

/// Merge canonical manifests in order, last writer wins per name
///
/// Recipes and images are merged independently. The result carries
/// `version = 1.0.0` and omits `recipes`/`images` entirely when nothing
/// survived for that kind.
pub fn merge_manifests<'a, I>(manifests: I) -> Manifest
where
    I: IntoIterator<Item = &'a Manifest>,
{
    let mut recipes = Recipes::new();
    let mut images = Images::new();

    for manifest in manifests {
        for (name, recipe) in manifest.recipes() {
            if recipes.insert(name.clone(), recipe.clone()).is_some() {
                warn!("Duplicate recipe {} detected", name);
            }
        }
        for (name, image) in manifest.images() {
            if images.insert(name.clone(), image.clone()).is_some() {
                warn!("Duplicate image {} detected", name);
            }
        }
    }

    let mut merged = Manifest::canonical();
    if !recipes.is_empty() {
        merged.recipes = Some(recipes);
    }
    if !images.is_empty() {
        merged.images = Some(images);
    }
    merged
}
