// src/bos.rs

//! BOS session templates for uploaded images
//!
//! One template per image, named `ims-id-<image id>`. The document is
//! rendered from a YAML text template and then parsed, so an empty
//! substitution comes back as a YAML null. Those nulls are turned back into
//! empty strings before the template is sent, since BOS rejects them.
//!
//! BOS v1 takes a POST to the collection with the name in the body; v2 takes
//! a PUT to `<endpoint>/<name>` and has no name or `boot_ordinal` field.
//!
//! Emission is best-effort. A failure is logged and never affects the image
//! that triggered it.

use crate::client::Session;
use crate::config::{BosConfig, BosVersion};
use crate::error::{Error, Result};
use serde_json::Value;
use tracing::{debug, error, info};

const V1_TEMPLATE: &str = "\
boot_sets:
  compute:
    boot_ordinal: 2
    etag: '${ims_etag}'
    kernel_parameters: ${bos_kernel_parameters}
    network: nmn
    node_roles_groups:
    - Compute
    path: '${ims_manifest_path}'
    rootfs_provider: ${bos_rootfs_provider}
    rootfs_provider_passthrough: ${bos_rootfs_provider_passthrough}
    type: s3
cfs:
  configuration: ${bos_cfs_configuration}
enable_cfs: ${bos_enable_cfs}
name: ${ims_image_name}
";

const V2_TEMPLATE: &str = "\
boot_sets:
  compute:
    etag: '${ims_etag}'
    kernel_parameters: ${bos_kernel_parameters}
    node_roles_groups:
    - Compute
    path: '${ims_manifest_path}'
    rootfs_provider: ${bos_rootfs_provider}
    rootfs_provider_passthrough: ${bos_rootfs_provider_passthrough}
    type: s3
cfs:
  configuration: ${bos_cfs_configuration}
enable_cfs: ${bos_enable_cfs}
";

/// Fields that must be strings even when their value is empty
const STRING_FIELDS: [&str; 4] = [
    "/boot_sets/compute/kernel_parameters",
    "/boot_sets/compute/rootfs_provider",
    "/boot_sets/compute/rootfs_provider_passthrough",
    "/cfs/configuration",
];

pub fn session_template_name(image_id: &str) -> String {
    format!("ims-id-{image_id}")
}

/// Replace every `${name}` in one pass; substituted text is not rescanned
fn substitute(template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            Error::TemplateSubmission("unterminated placeholder in session template".to_string())
        })?;
        let name = &after[..end];
        let value = vars
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| {
                Error::TemplateSubmission(format!("no value for session template field {name}"))
            })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Builds and submits session templates
pub struct TemplateEmitter<'a> {
    session: &'a Session,
    config: &'a BosConfig,
}

impl<'a> TemplateEmitter<'a> {
    pub fn new(session: &'a Session, config: &'a BosConfig) -> Self {
        Self { session, config }
    }

    /// Session template body for an image
    pub fn render(&self, etag: &str, manifest_path: &str, image_id: &str) -> Result<Value> {
        let name = session_template_name(image_id);
        let enable_cfs = if self.config.enable_cfs { "true" } else { "false" };
        let mut vars = vec![
            ("ims_etag", etag),
            ("ims_manifest_path", manifest_path),
            ("bos_kernel_parameters", self.config.kernel_parameters.as_str()),
            ("bos_rootfs_provider", self.config.rootfs_provider.as_str()),
            (
                "bos_rootfs_provider_passthrough",
                self.config.rootfs_provider_passthrough.as_str(),
            ),
            ("bos_cfs_configuration", self.config.cfs_configuration.as_str()),
            ("bos_enable_cfs", enable_cfs),
        ];

        let template = match self.config.version {
            BosVersion::V1 => {
                vars.push(("ims_image_name", name.as_str()));
                V1_TEMPLATE
            }
            BosVersion::V2 => V2_TEMPLATE,
        };

        let text = substitute(template, &vars)?;
        debug!("{}", text);

        let mut body: Value = serde_yaml::from_str(&text).map_err(|e| {
            Error::TemplateSubmission(format!("session template was not proper YAML: {e}"))
        })?;
        if !body.is_object() {
            return Err(Error::TemplateSubmission(
                "session template must be formatted as a mapping".to_string(),
            ));
        }

        for pointer in STRING_FIELDS {
            if let Some(value) = body.pointer_mut(pointer) {
                if value.is_null() {
                    *value = Value::String(String::new());
                }
            }
        }

        Ok(body)
    }

    /// Render and send the template for an image
    pub fn submit(&self, etag: &str, manifest_path: &str, image_id: &str) -> Result<()> {
        let body = self.render(etag, manifest_path, image_id)?;
        let collection = format!("{}/{}", self.config.url, self.config.endpoint);

        let response = match self.config.version {
            BosVersion::V1 => self.session.send(|c| c.post(collection.as_str()).json(&body)),
            BosVersion::V2 => {
                let url = format!("{}/{}", collection, session_template_name(image_id));
                self.session.send(|c| c.put(url.as_str()).json(&body))
            }
        }
        .map_err(|e| {
            Error::TemplateSubmission(format!(
                "problem contacting the Boot Orchestration Service (BOS): {e}"
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(Error::TemplateSubmission(format!(
                "BOS returned HTTP {status}: {text}"
            )));
        }
        Ok(())
    }

    /// Submit and report success; failures are logged, never returned
    pub fn emit(&self, etag: &str, manifest_path: &str, image_id: &str) -> bool {
        info!(
            "Creating BOS session template {}",
            session_template_name(image_id)
        );
        match self.submit(etag, manifest_path, image_id) {
            Ok(()) => true,
            Err(e) => {
                error!("Error creating BOS session template: {}", e);
                false
            }
        }
    }
}
