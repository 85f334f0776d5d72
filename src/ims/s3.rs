// src/ims/s3.rs

//! Object storage for uploaded artifacts

use crate::config::S3Config;
use crate::error::{Error, Result};
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// Where IMS-managed bytes live
pub trait ObjectStore {
    /// Upload a local file to `bucket/key`, returning the object's ETag
    fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<String>;

    /// Upload an in-memory object, returning its ETag
    fn put_bytes(&self, bucket: &str, key: &str, content: &[u8]) -> Result<String>;
}

/// `s3://bucket/key` form stored in IMS links
pub fn object_url(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}

/// S3-compatible store (Ceph RGW in practice)
///
/// Certificates are always verified. The rustls backend of rust-s3 has no
/// switch for turning that off, so `SSL_VALIDATE=false` only logs a warning.
pub struct S3Store {
    region: Region,
    credentials: Credentials,
}

impl S3Store {
    pub fn new(config: &S3Config) -> Result<Self> {
        if !config.ssl_validate {
            warn!("SSL_VALIDATE is false but object store certificates are still verified");
        }

        let region = Region::Custom {
            region: "us-east-1".to_string(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(config.access_key.as_str()),
            Some(config.secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(Error::upload)?;

        Ok(Self {
            region,
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(Error::upload)?;
        Ok(bucket.with_path_style())
    }

    fn etag(bucket: &Bucket, key: &str) -> Result<String> {
        let (head, _) = bucket.head_object(key).map_err(Error::upload)?;
        Ok(head
            .e_tag
            .map(|tag| tag.trim_matches('"').to_string())
            .unwrap_or_default())
    }
}

impl ObjectStore for S3Store {
    fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<String> {
        debug!("Uploading {} to {}", path.display(), object_url(bucket, key));
        let bucket = self.bucket(bucket)?;
        let mut file = File::open(path)?;
        bucket
            .put_object_stream(&mut file, key)
            .map_err(Error::upload)?;
        Self::etag(&bucket, key)
    }

    fn put_bytes(&self, bucket: &str, key: &str, content: &[u8]) -> Result<String> {
        debug!("Uploading {} bytes to {}", content.len(), object_url(bucket, key));
        let bucket = self.bucket(bucket)?;
        bucket.put_object(key, content).map_err(Error::upload)?;
        Self::etag(&bucket, key)
    }
}
