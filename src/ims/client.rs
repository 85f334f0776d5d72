// src/ims/client.rs

//! IMS REST client
//!
//! Recipes: create the record, store the archive under
//! `recipes/<id>/recipe.tar.gz`, then link the record to it.
//!
//! Images: create the record, store each artifact under `<id>/<file name>`,
//! write an image manifest listing them as `<id>/manifest.json`, then link the
//! record to the manifest. With `skip_existing`, an already-linked image of
//! the same name is returned untouched.

use super::s3::{object_url, ObjectStore, S3Store};
use super::{
    ArtifactUploader, ImageRecord, ImageUpload, ImageUploadResult, ImsLink, RecipeRecord,
    RecipeUpload,
};
use crate::client::Session;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::md5_file;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause between readiness probes
pub const READINESS_INTERVAL: Duration = Duration::from_secs(2);

/// Recipe type registered for every recipe
const RECIPE_TYPE: &str = "kiwi-ng";

const IMAGE_MANIFEST_VERSION: &str = "1.0";

/// Block until IMS answers its readiness probe with a 2xx
pub fn wait_until_ready(session: &Session, ims_url: &str, interval: Duration) {
    let url = format!("{ims_url}/healthz/ready");
    loop {
        info!("Waiting for IMS to become ready at {}", url);
        match session.send(|c| c.get(url.as_str())) {
            Ok(response) if response.status().is_success() => {
                info!("IMS is ready");
                return;
            }
            Ok(response) => warn!("IMS is not ready yet: HTTP {}", response.status()),
            Err(e) => warn!("IMS is not ready yet: {}", e),
        }
        std::thread::sleep(interval);
    }
}

/// Image manifest stored next to an image's artifacts
#[derive(Debug, Serialize)]
struct ImageManifest {
    version: &'static str,
    created: String,
    artifacts: Vec<ImageManifestArtifact>,
}

#[derive(Debug, Serialize)]
struct ImageManifestArtifact {
    link: ImsLink,
    md5: String,
    #[serde(rename = "type")]
    artifact_type: String,
}

/// IMS's list form of a recipe template dictionary
///
/// Mappings become `[{key, value}]`; lists are assumed to be in that form
/// already. Anything else is dropped.
fn template_dictionary_list(dictionary: Option<&Value>) -> Value {
    match dictionary {
        None | Some(Value::Null) => json!([]),
        Some(Value::Array(items)) => Value::Array(items.clone()),
        Some(Value::Object(map)) => Value::Array(
            map.iter()
                .map(|(key, value)| json!({"key": key, "value": value}))
                .collect(),
        ),
        Some(other) => {
            warn!("Ignoring template_dictionary that is neither a mapping nor a list: {}", other);
            json!([])
        }
    }
}

/// Production [`ArtifactUploader`]
pub struct ImsClient<'a, S = S3Store> {
    session: &'a Session,
    base_url: String,
    store: S,
    recipe_bucket: String,
    image_bucket: String,
}

impl<'a> ImsClient<'a, S3Store> {
    /// Client for the configured IMS and object store
    pub fn from_config(config: &Config, session: &'a Session) -> Result<Self> {
        let s3 = config.require_s3()?;
        Ok(ImsClient::new(session, &config.ims_url, S3Store::new(s3)?)
            .with_buckets(&s3.ims_bucket, &s3.boot_images_bucket))
    }
}

impl<'a, S: ObjectStore> ImsClient<'a, S> {
    pub fn new(session: &'a Session, ims_url: &str, store: S) -> Self {
        Self {
            session,
            base_url: ims_url.trim_end_matches('/').to_string(),
            store,
            recipe_bucket: "ims".to_string(),
            image_bucket: "boot-images".to_string(),
        }
    }

    pub fn with_buckets(mut self, recipe_bucket: &str, image_bucket: &str) -> Self {
        self.recipe_bucket = recipe_bucket.to_string();
        self.image_bucket = image_bucket.to_string();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("{} {}", method, url);

        let response = self.session.send(|c| {
            let request = c.request(method.clone(), url.as_str());
            match body {
                Some(body) => request.json(body),
                None => request,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!("IMS Service Response is {}", text);
            return Err(Error::UploadService(format!(
                "{method} {url} returned HTTP {status}"
            )));
        }

        response.json().map_err(Error::Http)
    }

    /// First image of this name that already points at a manifest
    fn find_linked_image(&self, name: &str) -> Result<Option<ImageRecord>> {
        let images: Vec<ImageRecord> = self.request(Method::GET, "images", None)?;
        Ok(images.into_iter().find(|image| {
            image.name == name && image.link.as_ref().is_some_and(|l| l.path.is_some())
        }))
    }
}

impl<S: ObjectStore> ArtifactUploader for ImsClient<'_, S> {
    fn recipe_upload(&self, recipe: &RecipeUpload) -> Result<RecipeRecord> {
        info!("Registering recipe {} with IMS", recipe.name);
        let body = json!({
            "name": recipe.name,
            "recipe_type": RECIPE_TYPE,
            "linux_distribution": recipe.linux_distribution,
            "arch": recipe.arch,
            "require_dkms": recipe.require_dkms,
            "template_dictionary": template_dictionary_list(recipe.template_dictionary.as_ref()),
        });
        let record: RecipeRecord = self.request(Method::POST, "recipes", Some(&body))?;

        let key = format!("recipes/{}/recipe.tar.gz", record.id);
        let etag = self
            .store
            .put_file(&self.recipe_bucket, &key, &recipe.path)?;
        let link = ImsLink::s3(object_url(&self.recipe_bucket, &key), etag);

        self.request(
            Method::PATCH,
            &format!("recipes/{}", record.id),
            Some(&json!({ "link": link })),
        )
    }

    fn image_upload_artifacts(&self, image: &ImageUpload) -> Result<ImageUploadResult> {
        if image.skip_existing {
            if let Some(existing) = self.find_linked_image(&image.image_name)? {
                info!(
                    "Image {} already exists in IMS as {}, skipping upload",
                    image.image_name, existing.id
                );
                return Ok(ImageUploadResult {
                    ims_image_record: existing,
                });
            }
        }

        info!("Registering image {} with IMS", image.image_name);
        let mut body = json!({ "name": image.image_name });
        if let Some(arch) = &image.arch {
            body["arch"] = json!(arch);
        }
        let record: ImageRecord = self.request(Method::POST, "images", Some(&body))?;

        let mut artifacts = Vec::new();
        for (artifact_type, path) in image.slots() {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::upload(format!("{} has no file name", path.display())))?;
            let key = format!("{}/{}", record.id, file_name);
            let md5 = md5_file(path)?;
            let etag = self.store.put_file(&self.image_bucket, &key, path)?;
            artifacts.push(ImageManifestArtifact {
                link: ImsLink::s3(object_url(&self.image_bucket, &key), etag),
                md5,
                artifact_type: artifact_type.mime_type().to_string(),
            });
        }

        let manifest = ImageManifest {
            version: IMAGE_MANIFEST_VERSION,
            created: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            artifacts,
        };
        let key = format!("{}/manifest.json", record.id);
        let etag = self.store.put_bytes(
            &self.image_bucket,
            &key,
            &serde_json::to_vec_pretty(&manifest)?,
        )?;
        let link = ImsLink::s3(object_url(&self.image_bucket, &key), etag);

        let record = self.request(
            Method::PATCH,
            &format!("images/{}", record.id),
            Some(&json!({ "link": link })),
        )?;
        Ok(ImageUploadResult {
            ims_image_record: record,
        })
    }
}
