// src/pipeline.rs

//! Artifact pipeline
//!
//! Every recipe and then every image of a canonical manifest is acquired,
//! verified and handed to the [`ArtifactUploader`]. Items never block each
//! other: a failure is logged, the item is left out of the results, and the
//! run carries on with an overall failure flag set. The results record is
//! only written when every item succeeded.

use crate::acquire::Acquirer;
use crate::bos::TemplateEmitter;
use crate::client::Session;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ims::{
    ArtifactUploader, ImageUpload, ImageUploadResult, RecipeRecord, RecipeUpload,
};
use crate::manifest::{Image, Manifest, Recipe};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// IMS identifier recorded for a loaded item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId {
    pub id: String,
}

/// Loaded items of one kind and whether all of them made it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub records: IndexMap<String, RecordId>,
    pub ok: bool,
}

impl Default for LoadOutcome {
    fn default() -> Self {
        Self {
            records: IndexMap::new(),
            ok: true,
        }
    }
}

impl LoadOutcome {
    fn record(&mut self, name: &str, id: Option<String>) {
        match id {
            Some(id) => {
                self.records.insert(name.to_string(), RecordId { id });
            }
            None => self.ok = false,
        }
    }
}

/// Results record persisted after a fully successful run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResults {
    pub recipes: IndexMap<String, RecordId>,
    pub images: IndexMap<String, RecordId>,
}

impl LoadResults {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Io(io::Error::other(e)))
    }

    /// Write the record, creating parent directories as needed
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}

/// Drives acquisition and upload for one run
pub struct Loader<'a> {
    acquirer: Acquirer<'a>,
    uploader: &'a dyn ArtifactUploader,
    emitter: Option<TemplateEmitter<'a>>,
    skip_existing: bool,
    results_path: PathBuf,
}

impl<'a> Loader<'a> {
    pub fn new(config: &'a Config, session: &'a Session, uploader: &'a dyn ArtifactUploader) -> Self {
        let emitter = config
            .create_session_template
            .then(|| TemplateEmitter::new(session, &config.bos));

        Self {
            acquirer: Acquirer::new(session, &config.download_dir),
            uploader,
            emitter,
            // Only skip same-named images under the release tool
            skip_existing: config.in_release_mode(),
            results_path: config.results_path.clone(),
        }
    }

    /// Load one recipe; failures are logged and yield `None`
    pub fn load_recipe(&mut self, name: &str, recipe: &Recipe) -> Option<RecipeRecord> {
        info!("Loading recipe {}", name);
        match self.try_load_recipe(name, recipe) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Error loading recipe {}: {}", name, e);
                None
            }
        }
    }

    fn try_load_recipe(&mut self, name: &str, recipe: &Recipe) -> Result<RecipeRecord> {
        debug!("load_recipe data: {:?}", recipe);
        let linux_distribution =
            recipe
                .linux_distribution
                .clone()
                .ok_or_else(|| Error::MalformedRecipe {
                    name: name.to_string(),
                    message: "missing linux_distribution".to_string(),
                })?;

        let path = self.acquirer.acquire(&recipe.link, &recipe.md5)?;

        self.uploader.recipe_upload(&RecipeUpload {
            name: name.to_string(),
            path,
            linux_distribution,
            template_dictionary: recipe.template_dictionary.clone(),
            arch: recipe.arch().to_string(),
            require_dkms: recipe.require_dkms(),
        })
    }

    /// Load every recipe in manifest order
    pub fn load_recipes(&mut self, manifest: &Manifest) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        for (name, recipe) in manifest.recipes() {
            let id = self.load_recipe(name, recipe).map(|record| record.id);
            outcome.record(name, id);
        }
        outcome
    }

    /// Load one image; failures are logged and yield `None`
    pub fn load_image(&mut self, name: &str, image: &Image) -> Option<ImageUploadResult> {
        info!("Loading image {}", name);
        match self.try_load_image(name, image) {
            Ok(result) => Some(result),
            Err(e) => {
                error!("Error loading image {}: {}", name, e);
                None
            }
        }
    }

    fn try_load_image(&mut self, name: &str, image: &Image) -> Result<ImageUploadResult> {
        let mut upload = ImageUpload::new(name);

        for artifact in &image.artifacts {
            debug!("Artifact data: {:?}", artifact);
            let path = self.acquirer.acquire(&artifact.link, &artifact.md5)?;
            match upload.slot_mut(&artifact.artifact_type) {
                Some(slot) => {
                    if slot.replace(path).is_some() {
                        warn!(
                            "Image {} lists more than one {} artifact; using the last one",
                            name, artifact.artifact_type
                        );
                    }
                }
                None => debug!(
                    "Not uploading artifact of unrecognized type {}",
                    artifact.artifact_type
                ),
            }
        }

        upload.arch = image.arch.clone();
        upload.skip_existing = self.skip_existing;

        let result = self.uploader.image_upload_artifacts(&upload)?;

        if let Some(emitter) = &self.emitter {
            match result.manifest_link() {
                Some((etag, path)) => {
                    emitter.emit(etag, path, &result.ims_image_record.id);
                }
                None => error!(
                    "Error creating BOS session template. IMS image result missing link etag or path: {:?}",
                    result
                ),
            }
        }

        Ok(result)
    }

    /// Load every image in manifest order
    pub fn load_images(&mut self, manifest: &Manifest) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        for (name, image) in manifest.images() {
            let id = self
                .load_image(name, image)
                .map(|result| result.ims_image_record.id);
            outcome.record(name, id);
        }
        outcome
    }

    /// Load recipes then images; persist the results only if all succeeded
    ///
    /// Returns whether every item loaded. An `Err` means the results record
    /// itself could not be written.
    pub fn run(&mut self, manifest: &Manifest) -> Result<bool> {
        let recipes = self.load_recipes(manifest);
        let images = self.load_images(manifest);

        if !(recipes.ok && images.ok) {
            warn!("Not all recipes and images loaded; no results record written");
            return Ok(false);
        }

        let results = LoadResults {
            recipes: recipes.records,
            images: images.records,
        };
        info!("{}", results.to_yaml()?);
        results.write(&self.results_path)?;
        Ok(true)
    }
}
