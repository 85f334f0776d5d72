// src/commands.rs
//! Command handlers for the IMS artifact loader

use anyhow::{Context, Result};
use ims_load_artifacts::config::DEFAULT_RELEASE_MANIFEST_NAME;
use ims_load_artifacts::ims::{wait_until_ready, READINESS_INTERVAL};
use ims_load_artifacts::{
    normalize_release_manifest, Config, ImsClient, Loader, Manifest, ReleaseConfig,
    ReleaseManifest, Session,
};
use std::path::PathBuf;
use tracing::info;

/// Work out the distribution root and product manifest
///
/// Command-line values win over the environment. A release path given on the
/// command line also moves the default manifest location with it.
pub fn resolve_release(
    config: &Config,
    release_path: Option<PathBuf>,
    manifest: Option<PathBuf>,
) -> ReleaseConfig {
    let from_env = config.release.as_ref();
    let manifest_from_env = if release_path.is_none() {
        from_env.map(|r| r.manifest_path.clone())
    } else {
        None
    };

    let distribution_root = release_path
        .or_else(|| from_env.map(|r| r.distribution_root.clone()))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let manifest_path = manifest
        .or(manifest_from_env)
        .unwrap_or_else(|| distribution_root.join(DEFAULT_RELEASE_MANIFEST_NAME));

    ReleaseConfig {
        distribution_root,
        manifest_path,
    }
}

/// Canonical manifest for a release distribution
pub fn normalized_manifest(release: &ReleaseConfig) -> Result<Manifest> {
    let input = ReleaseManifest::load(&release.manifest_path).with_context(|| {
        format!(
            "Could not load IUF product manifest {}",
            release.manifest_path.display()
        )
    })?;
    Ok(normalize_release_manifest(
        &input,
        &release.distribution_root.to_string_lossy(),
    ))
}

fn run_loader(config: &Config, session: &Session, manifest: &Manifest) -> Result<bool> {
    let uploader = ImsClient::from_config(config, session)?;
    let ok = Loader::new(config, session, &uploader).run(manifest)?;
    Ok(ok)
}

/// Standalone mode: wait for IMS, then load a canonical manifest
pub fn cmd_load(config: &Config, manifest: Option<PathBuf>) -> Result<bool> {
    config.require_s3()?;
    let session = Session::new(config)?;
    wait_until_ready(&session, &config.ims_url, READINESS_INTERVAL);

    let path = manifest.unwrap_or_else(|| config.manifest_file.clone());
    info!("Loading manifest {}", path.display());
    let manifest =
        Manifest::load(&path).with_context(|| format!("Cannot load manifest {}", path.display()))?;

    run_loader(config, &session, &manifest)
}

/// Release-tool mode: normalize the product manifest, then load it
pub fn cmd_iuf(
    config: &Config,
    release_path: Option<PathBuf>,
    manifest: Option<PathBuf>,
) -> Result<bool> {
    config.require_s3()?;
    let release = resolve_release(config, release_path, manifest);
    info!(
        "Loading IMS content from {} ({})",
        release.distribution_root.display(),
        release.manifest_path.display()
    );
    let canonical = normalized_manifest(&release)?;

    let mut config = config.clone();
    config.release = Some(release);
    let session = Session::new(&config)?;
    run_loader(&config, &session, &canonical)
}

/// Print the canonical manifest for a release distribution
pub fn cmd_normalize(
    config: &Config,
    release_path: Option<PathBuf>,
    manifest: Option<PathBuf>,
) -> Result<()> {
    let release = resolve_release(config, release_path, manifest);
    let canonical = normalized_manifest(&release)?;
    print!("{}", canonical.to_yaml()?);
    Ok(())
}
