// tests/release_manifest.rs

//! Release-tool product manifests: normalization and loading.

mod common;

use common::{RecordingUploader, TestEnv};
use ims_load_artifacts::hash::md5_bytes;
use ims_load_artifacts::{
    normalize_release_manifest, ArtifactType, Loader, Manifest, ReleaseConfig, ReleaseManifest,
};
use std::path::Path;

/// A distribution with one content directory and enumerated content
fn build_distribution(env: &TestEnv) -> ReleaseManifest {
    env.write("ims/recipes/x86_64/cos-base-3.0.0.tar.gz", "cos recipe");
    env.write("ims/recipes/x86_64/uan-base-3.0.0.tgz", "uan recipe");
    env.write("ims/images/compute/rootfs.squashfs", "compute rootfs");
    env.write("ims/images/compute/kernel", "compute kernel");

    // Content directory manifests use paths relative to their own root
    env.write("legacy/artifacts/legacy.squashfs", "legacy rootfs");
    env.write(
        "legacy/manifest.yaml",
        &format!(
            r#"
version: "1.0.0"
images:
  legacy-image:
    artifacts:
    - link:
        type: file
        path: /artifacts/legacy.squashfs
      md5: {}
      type: application/vnd.cray.image.rootfs.squashfs
  compute:
    artifacts:
    - link:
        type: http
        path: http://example.com/never-fetched
      type: application/vnd.cray.image.rootfs.squashfs
"#,
            md5_bytes(b"legacy rootfs")
        ),
    );

    let yaml = format!(
        r#"
iuf_version: ^0.5.0
name: cos
version: 3.0.0
content:
  ims:
    content_dirs:
    - legacy
    - missing-dir
    recipes:
    - path: ims/recipes/x86_64/cos-base-3.0.0.tar.gz
      md5sum: {cos}
      linux_distribution: sles15
      template_dictionary:
        COS_VERSION: 3.0.0
    - path: ims/recipes/x86_64/uan-base-3.0.0.tgz
      linux_distribution: sles15
    images:
    - path: ims/images/compute
      rootfs:
        path: rootfs.squashfs
        md5sum: {rootfs}
      kernel:
        path: kernel
    - name: empty-image
      path: ims/images/empty
"#,
        cos = md5_bytes(b"cos recipe"),
        rootfs = md5_bytes(b"compute rootfs"),
    );
    ReleaseManifest::from_yaml("iuf-product-manifest.yaml", &yaml).unwrap()
}

#[test]
fn test_normalize_distribution() {
    let env = TestEnv::new();
    let input = build_distribution(&env);
    let manifest = normalize_release_manifest(&input, env.root());

    assert_eq!(manifest.version.as_deref(), Some("1.0.0"));

    let recipes = manifest.recipes.as_ref().unwrap();
    assert_eq!(
        recipes.keys().collect::<Vec<_>>(),
        ["cos-base-3.0.0", "uan-base-3.0.0"]
    );
    let cos = &recipes["cos-base-3.0.0"];
    assert_eq!(
        Path::new(&cos.link.path),
        env.dir.path().join("ims/recipes/x86_64/cos-base-3.0.0.tar.gz")
    );
    assert_eq!(cos.md5, md5_bytes(b"cos recipe"));
    assert_eq!(recipes["uan-base-3.0.0"].md5, "");

    let images = manifest.images.as_ref().unwrap();
    // The enumerated compute image replaces the content directory one in place
    assert_eq!(images.keys().collect::<Vec<_>>(), ["legacy-image", "compute"]);

    let legacy = &images["legacy-image"].artifacts[0];
    assert_eq!(
        Path::new(&legacy.link.path),
        env.dir.path().join("legacy/artifacts/legacy.squashfs")
    );

    let compute = &images["compute"];
    assert_eq!(compute.artifacts.len(), 2);
    assert_eq!(compute.artifacts[0].artifact_type, ArtifactType::Rootfs);
    assert_eq!(compute.artifacts[1].artifact_type, ArtifactType::Kernel);
    assert_eq!(
        Path::new(&compute.artifacts[1].link.path),
        env.dir.path().join("ims/images/compute/kernel")
    );
    assert!(!images.contains_key("empty-image"));
}

#[test]
fn test_normalized_manifest_round_trips_as_yaml() {
    let env = TestEnv::new();
    let manifest = normalize_release_manifest(&build_distribution(&env), env.root());

    let yaml = manifest.to_yaml().unwrap();
    let reparsed = Manifest::from_yaml("normalized", &yaml).unwrap();
    reparsed.check_version().unwrap();
    assert_eq!(reparsed, manifest);
}

#[test]
fn test_load_distribution_in_release_mode() {
    let mut env = TestEnv::new();
    env.config.release = Some(ReleaseConfig {
        distribution_root: env.dir.path().to_path_buf(),
        manifest_path: env.dir.path().join("iuf-product-manifest.yaml"),
    });
    let manifest = normalize_release_manifest(&build_distribution(&env), env.root());

    let uploader = RecordingUploader::default();
    let mut loader = Loader::new(&env.config, &env.session, &uploader);
    assert!(loader.run(&manifest).unwrap());

    let recipes = uploader.recipe_calls();
    assert_eq!(recipes.len(), 2);
    assert_eq!(
        recipes[0].template_dictionary,
        Some(serde_json::json!({"COS_VERSION": "3.0.0"}))
    );

    let images = uploader.image_calls();
    assert_eq!(images.len(), 2);
    assert!(images.iter().all(|i| i.skip_existing));
    assert!(images[1].initrd.is_none());

    let results = env.results().unwrap();
    assert_eq!(results["images"]["legacy-image"]["id"], "image-id-legacy-image");
    assert_eq!(results["recipes"]["uan-base-3.0.0"]["id"], "recipe-id-uan-base-3.0.0");
}

#[test]
fn test_malformed_product_manifest_is_parse_error() {
    let err = ReleaseManifest::from_yaml("iuf-product-manifest.yaml", "content: [unclosed")
        .unwrap_err();
    assert!(err.to_string().contains("iuf-product-manifest.yaml"));
}
