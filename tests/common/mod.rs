// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use ims_load_artifacts::hash::md5_file;
use ims_load_artifacts::ims::{ImageRecord, ImsLink};
use ims_load_artifacts::{
    ArtifactUploader, Config, Error, ImageUpload, ImageUploadResult, RecipeRecord, RecipeUpload,
    Result, RetryPolicy, Session,
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One call seen by [`RecordingUploader`]
#[derive(Debug, Clone, PartialEq)]
pub enum UploadCall {
    Recipe(RecipeUpload),
    Image(ImageUpload),
}

/// Uploader that records every call and the files it was handed
///
/// Each file is hashed at call time, so a test can tell whether the bytes
/// were in place before the upload started.
#[derive(Default)]
pub struct RecordingUploader {
    pub calls: RefCell<Vec<UploadCall>>,
    /// `(path, md5)` of every file seen, in call order
    pub files: RefCell<Vec<(PathBuf, String)>>,
    /// Names whose upload is rejected
    pub reject: Vec<String>,
}

impl RecordingUploader {
    pub fn rejecting(names: &[&str]) -> Self {
        Self {
            reject: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn image_calls(&self) -> Vec<ImageUpload> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                UploadCall::Image(image) => Some(image.clone()),
                UploadCall::Recipe(_) => None,
            })
            .collect()
    }

    pub fn recipe_calls(&self) -> Vec<RecipeUpload> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                UploadCall::Recipe(recipe) => Some(recipe.clone()),
                UploadCall::Image(_) => None,
            })
            .collect()
    }

    fn see(&self, path: &Path) -> Result<()> {
        let md5 = md5_file(path)?;
        self.files.borrow_mut().push((path.to_path_buf(), md5));
        Ok(())
    }

    fn check(&self, name: &str) -> Result<()> {
        if self.reject.iter().any(|r| r == name) {
            return Err(Error::UploadService(format!("{name} rejected")));
        }
        Ok(())
    }
}

impl ArtifactUploader for RecordingUploader {
    fn recipe_upload(&self, recipe: &RecipeUpload) -> Result<RecipeRecord> {
        self.calls
            .borrow_mut()
            .push(UploadCall::Recipe(recipe.clone()));
        self.see(&recipe.path)?;
        self.check(&recipe.name)?;
        Ok(RecipeRecord {
            id: format!("recipe-id-{}", recipe.name),
            name: recipe.name.clone(),
            link: None,
        })
    }

    fn image_upload_artifacts(&self, image: &ImageUpload) -> Result<ImageUploadResult> {
        self.calls
            .borrow_mut()
            .push(UploadCall::Image(image.clone()));
        for (_, path) in image.slots() {
            self.see(path)?;
        }
        self.check(&image.image_name)?;
        let id = format!("image-id-{}", image.image_name);
        Ok(ImageUploadResult {
            ims_image_record: ImageRecord {
                link: Some(ImsLink::s3(
                    format!("s3://boot-images/{id}/manifest.json"),
                    "etag",
                )),
                id,
                name: image.image_name.clone(),
            },
        })
    }
}

/// Scratch area with a configuration pointing into it
pub struct TestEnv {
    pub dir: TempDir,
    pub config: Config,
    pub session: Session,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            download_dir: dir.path().join("downloads"),
            results_path: dir.path().join("results").join("records.yaml"),
            ..Config::default()
        };
        let session = Session::with_policy(None, RetryPolicy::immediate(1)).unwrap();
        Self {
            dir,
            config,
            session,
        }
    }

    /// Write a file under the scratch area, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn root(&self) -> &str {
        self.dir.path().to_str().unwrap()
    }

    pub fn results(&self) -> Option<serde_yaml::Value> {
        let content = std::fs::read_to_string(&self.config.results_path).ok()?;
        Some(serde_yaml::from_str(&content).unwrap())
    }
}
