// src/config.rs

//! Process configuration
//!
//! Everything the loader needs from its environment is read once into a
//! [`Config`] and handed to the session, the IMS client, the loader and the
//! template emitter by reference. Nothing reads the environment after
//! startup.

use crate::error::{Error, Result};
use std::path::PathBuf;

pub const DEFAULT_IMS_URL: &str = "http://cray-ims";
pub const DEFAULT_BOS_URL: &str = "http://cray-bos";
pub const DEFAULT_BOS_V2_ENDPOINT: &str = "v2/sessiontemplates";
pub const DEFAULT_RESULTS_PATH: &str = "/results/records.yaml";
pub const DEFAULT_MANIFEST_FILE: &str = "/manifest.yaml";
pub const DEFAULT_RELEASE_MANIFEST_NAME: &str = "iuf-product-manifest.yaml";

pub const DEFAULT_KERNEL_PARAMETERS: &str = "console=ttyS0,115200 bad_page=panic crashkernel=340M \
     hugepagelist=2m-2g intel_iommu=off intel_pstate=disable iommu=pt ip=dhcp \
     numa_interleave_omit=headless numa_zonelist_order=node oops=panic pageblock_order=14 \
     pcie_ports=native printk.synchronous=y rd.neednet=1 rd.retry=10 rd.shell \
     turbo_boost_limit=999 spire_join_token=${SPIRE_JOIN_TOKEN}";
pub const DEFAULT_ROOTFS_PROVIDER: &str = "cpss3";
pub const DEFAULT_ROOTFS_PROVIDER_PASSTHROUGH: &str = "dvs:api-gw-service-nmn.local:300:nmn0";

/// Interpret a boolean-ish environment value
///
/// `true`, `on`, `yes`, `t` and `1` (any case) are true; anything else,
/// including an empty string, is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "on" | "yes" | "t" | "1"
    )
}

/// BOS API generation a session template is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BosVersion {
    /// POST to a collection, template name in the body, `boot_ordinal` present
    V1,
    /// PUT to `<endpoint>/<name>`, no name in the body
    V2,
}

/// Object store credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub ssl_validate: bool,
    pub ims_bucket: String,
    pub boot_images_bucket: String,
}

/// Defaults and target for BOS session templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BosConfig {
    pub url: String,
    pub endpoint: String,
    pub version: BosVersion,
    pub kernel_parameters: String,
    pub rootfs_provider: String,
    pub rootfs_provider_passthrough: String,
    pub cfs_configuration: String,
    pub enable_cfs: bool,
}

impl Default for BosConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BOS_URL.to_string(),
            endpoint: DEFAULT_BOS_V2_ENDPOINT.to_string(),
            version: BosVersion::V2,
            kernel_parameters: DEFAULT_KERNEL_PARAMETERS.to_string(),
            rootfs_provider: DEFAULT_ROOTFS_PROVIDER.to_string(),
            rootfs_provider_passthrough: DEFAULT_ROOTFS_PROVIDER_PASSTHROUGH.to_string(),
            cfs_configuration: String::new(),
            enable_cfs: false,
        }
    }
}

/// Release-tool (IUF) integration settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
    pub distribution_root: PathBuf,
    pub manifest_path: PathBuf,
}

/// Complete process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub ims_url: String,
    pub auth_token: Option<String>,
    /// `None` when any credential variable is missing; uploads need it
    pub s3: Option<S3Config>,
    pub download_dir: PathBuf,
    pub results_path: PathBuf,
    pub manifest_file: PathBuf,
    pub bos: BosConfig,
    pub create_session_template: bool,
    /// Set when running under the release tool; implies skip-existing images
    pub release: Option<ReleaseConfig>,
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ims_url: DEFAULT_IMS_URL.to_string(),
            auth_token: None,
            s3: None,
            download_dir: PathBuf::from("/tmp"),
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            manifest_file: PathBuf::from(DEFAULT_MANIFEST_FILE),
            bos: BosConfig::default(),
            create_session_template: false,
            release: None,
            log_level: None,
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str| lookup(key).is_some_and(|v| parse_bool(&v));

        let s3 = match (
            lookup("S3_ENDPOINT"),
            lookup("ACCESS_KEY"),
            lookup("SECRET_KEY"),
            lookup("SSL_VALIDATE"),
        ) {
            (Some(endpoint), Some(access_key), Some(secret_key), Some(ssl_validate)) => {
                Some(S3Config {
                    endpoint,
                    access_key,
                    secret_key,
                    ssl_validate: parse_bool(&ssl_validate),
                    ims_bucket: var_or("S3_IMS_BUCKET", "ims"),
                    boot_images_bucket: var_or("S3_BOOT_IMAGES_BUCKET", "boot-images"),
                })
            }
            _ => None,
        };

        let (endpoint, version) = if let Some(endpoint) = lookup("BOS_SESSIONTEMPLATES_ENDPOINT") {
            (endpoint, BosVersion::V2)
        } else if let Some(endpoint) = lookup("BOS_SESSION_ENDPOINT") {
            (endpoint, BosVersion::V1)
        } else {
            (DEFAULT_BOS_V2_ENDPOINT.to_string(), BosVersion::V2)
        };

        let bos = BosConfig {
            url: var_or("BOS_URL", DEFAULT_BOS_URL).trim_matches('/').to_string(),
            endpoint: endpoint.trim_start_matches('/').to_string(),
            version,
            kernel_parameters: var_or("BOS_KERNEL_PARAMETERS", DEFAULT_KERNEL_PARAMETERS),
            rootfs_provider: var_or("BOS_ROOTFS_PROVIDER", DEFAULT_ROOTFS_PROVIDER),
            rootfs_provider_passthrough: var_or(
                "BOS_ROOTFS_PROVIDER_PASSTHROUGH",
                DEFAULT_ROOTFS_PROVIDER_PASSTHROUGH,
            ),
            cfs_configuration: var_or("BOS_CFS_CONFIGURATION", ""),
            enable_cfs: flag("BOS_ENABLE_CFS"),
        };

        let release = lookup("IUF").filter(|v| !v.is_empty()).map(|_| {
            let distribution_root = lookup("IUF_RELEASE_PATH")
                .map(PathBuf::from)
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_else(|| PathBuf::from("."));
            let manifest_path = lookup("IUF_MANIFEST_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| distribution_root.join(DEFAULT_RELEASE_MANIFEST_NAME));
            ReleaseConfig {
                distribution_root,
                manifest_path,
            }
        });

        Self {
            ims_url: var_or("IMS_URL", DEFAULT_IMS_URL).trim_matches('/').to_string(),
            auth_token: lookup("AUTH_TOKEN").filter(|t| !t.is_empty()),
            s3,
            download_dir: PathBuf::from(var_or("DOWNLOAD_PATH", "/tmp")),
            results_path: PathBuf::from(var_or("RESULTS_PATH", DEFAULT_RESULTS_PATH)),
            manifest_file: PathBuf::from(var_or("MANIFEST_FILE", DEFAULT_MANIFEST_FILE)),
            bos,
            create_session_template: flag("CREATE_BOS_SESSION_TEMPLATE"),
            release,
            log_level: lookup("LOG_LEVEL"),
        }
    }

    /// Whether the process runs under the release tool
    pub fn in_release_mode(&self) -> bool {
        self.release.is_some()
    }

    /// Object store settings, or an error naming what is missing
    pub fn require_s3(&self) -> Result<&S3Config> {
        self.s3.as_ref().ok_or_else(|| {
            Error::Config(
                "missing one of S3_ENDPOINT, ACCESS_KEY, SECRET_KEY, SSL_VALIDATE".to_string(),
            )
        })
    }
}
