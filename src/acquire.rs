// src/acquire.rs

//! Artifact acquisition and verification
//!
//! Turns a manifest [`Link`] into a readable local file:
//!
//! ```text
//! Pending -> Acquiring -> Acquired -> Verifying -> Verified
//!                 \                        \
//!                  Failed(reason)           Failed(IntegrityMismatch)
//! ```
//!
//! `file` links must already exist and be readable. `http` links are
//! streamed into the staging directory under the URL's last path segment.
//! A non-empty expected MD5 is then checked; an empty one skips the check.

use crate::client::Session;
use crate::error::{Error, Result};
use crate::hash::verify_file_md5;
use crate::manifest::{Link, LinkType};
use std::collections::HashSet;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Resolves links to verified local files
pub struct Acquirer<'a> {
    session: &'a Session,
    staging_dir: PathBuf,
    /// Staged filenames written during this run
    staged: HashSet<PathBuf>,
}

impl<'a> Acquirer<'a> {
    pub fn new(session: &'a Session, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            staging_dir: staging_dir.into(),
            staged: HashSet::new(),
        }
    }

    /// Acquire an artifact and verify it against `expected_md5`
    ///
    /// Returns the local path of the verified artifact.
    pub fn acquire(&mut self, link: &Link, expected_md5: &str) -> Result<PathBuf> {
        let local_path = match &link.link_type {
            LinkType::File => check_local_file(Path::new(&link.path))?,
            LinkType::Http => self.download(&link.path)?,
            other => {
                return Err(Error::UnsupportedLinkType {
                    link_type: other.to_string(),
                    path: link.path.clone(),
                });
            }
        };

        if expected_md5.is_empty() {
            debug!("Not verifying md5sum of {}", local_path.display());
            return Ok(local_path);
        }

        debug!("Verifying md5sum of {}", local_path.display());
        match verify_file_md5(&local_path, expected_md5)? {
            Ok(()) => {
                info!("Successfully verified the md5sum of {}", local_path.display());
                Ok(local_path)
            }
            Err(mismatch) => {
                debug!("  Input md5    : {}", mismatch.expected);
                debug!("  Computed md5 : {}", mismatch.actual);
                // Only remove what we downloaded; local artifacts are not ours
                if link.link_type == LinkType::Http {
                    if let Err(e) = std::fs::remove_file(&local_path) {
                        warn!("Failed to remove {}: {}", local_path.display(), e);
                    }
                }
                Err(Error::IntegrityMismatch {
                    path: local_path,
                    expected: mismatch.expected,
                    actual: mismatch.actual,
                })
            }
        }
    }

    fn download(&mut self, url: &str) -> Result<PathBuf> {
        let dest_path = self.staging_dir.join(staged_filename(url)?);

        if !self.staged.insert(dest_path.clone()) {
            warn!(
                "{} was already staged during this run and will be overwritten by {}",
                dest_path.display(),
                url
            );
        }

        self.session.download_file(url, &dest_path)?;
        Ok(dest_path)
    }
}

/// Local filename for a downloaded URL: its final path segment
fn staged_filename(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| Error::DownloadFailed {
        url: url.to_string(),
        message: format!("invalid URL: {e}"),
    })?;

    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::DownloadFailed {
            url: url.to_string(),
            message: "URL has no file name".to_string(),
        })
}

/// Check that a local artifact exists and this process can read it
fn check_local_file(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(Error::ArtifactNotFound(path.to_path_buf()));
    }

    if nix::unistd::access(path, nix::unistd::AccessFlags::R_OK).is_err() {
        let metadata = std::fs::metadata(path)?;
        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        info!("Accessing local file: {}", path.display());
        info!("  File permissions: {:o}", metadata.mode());
        info!("  File ownership: {},{}", metadata.uid(), metadata.gid());
        info!("  Current userid:grpid - {}:{}", uid, gid);
        return Err(Error::PermissionDenied {
            path: path.to_path_buf(),
            mode: metadata.mode(),
            file_uid: metadata.uid(),
            file_gid: metadata.gid(),
            uid,
            gid,
        });
    }

    Ok(path.to_path_buf())
}
