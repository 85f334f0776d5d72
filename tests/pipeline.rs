// tests/pipeline.rs

//! End-to-end loader runs against a recording uploader.

mod common;

use common::{RecordingUploader, TestEnv, UploadCall};
use ims_load_artifacts::hash::md5_bytes;
use ims_load_artifacts::{Loader, Manifest};

fn file_image(env: &TestEnv, name: &str) -> String {
    let rootfs = env.write(&format!("{name}/rootfs.squashfs"), &format!("{name} rootfs"));
    format!(
        "  {name}:\n    artifacts:\n    - link:\n        type: file\n        path: {}\n      md5: {}\n      type: application/vnd.cray.image.rootfs.squashfs\n",
        rootfs.display(),
        md5_bytes(format!("{name} rootfs").as_bytes()),
    )
}

#[test]
fn test_recipe_and_image_end_to_end() {
    let mut server = mockito::Server::new();
    let download = server
        .mock("GET", "/repository/recipes/cray-sles15-barebones.tgz")
        .with_status(200)
        .with_body("recipe archive")
        .create();

    let env = TestEnv::new();
    let kernel = env.write("images/compute/kernel", "kernel");
    let initrd = env.write("images/compute/initrd", "initrd");
    let rootfs = env.write("images/compute/rootfs", "rootfs");

    let yaml = format!(
        r#"
version: "1.0.0"
recipes:
  cray-sles15-barebones:
    link:
      type: http
      path: {url}/repository/recipes/cray-sles15-barebones.tgz
    md5: {recipe_md5}
    linux_distribution: sles15
images:
  compute:
    artifacts:
    - link: {{type: file, path: {rootfs}}}
      md5: {rootfs_md5}
      type: application/vnd.cray.image.rootfs.squashfs
    - link: {{type: file, path: {kernel}}}
      md5: {kernel_md5}
      type: application/vnd.cray.image.kernel
    - link: {{type: file, path: {initrd}}}
      md5: {initrd_md5}
      type: application/vnd.cray.image.initrd
"#,
        url = server.url(),
        recipe_md5 = md5_bytes(b"recipe archive"),
        rootfs = rootfs.display(),
        rootfs_md5 = md5_bytes(b"rootfs"),
        kernel = kernel.display(),
        kernel_md5 = md5_bytes(b"kernel"),
        initrd = initrd.display(),
        initrd_md5 = md5_bytes(b"initrd"),
    );
    let manifest = Manifest::from_yaml("manifest.yaml", &yaml).unwrap();
    manifest.check_version().unwrap();

    let uploader = RecordingUploader::default();
    let mut loader = Loader::new(&env.config, &env.session, &uploader);
    assert!(loader.run(&manifest).unwrap());
    download.assert();

    // Recipes go first, then images
    let calls = uploader.calls.borrow();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], UploadCall::Recipe(ref r) if r.name == "cray-sles15-barebones"));
    assert!(matches!(calls[1], UploadCall::Image(ref i) if i.image_name == "compute"));

    // Every file handed to the uploader was complete when the call was made
    let files = uploader.files.borrow();
    assert_eq!(
        files[0],
        (
            env.config.download_dir.join("cray-sles15-barebones.tgz"),
            md5_bytes(b"recipe archive")
        )
    );
    assert_eq!(files[1], (rootfs.clone(), md5_bytes(b"rootfs")));
    assert_eq!(files[2], (kernel.clone(), md5_bytes(b"kernel")));
    assert_eq!(files[3], (initrd.clone(), md5_bytes(b"initrd")));

    let results = env.results().unwrap();
    let top = results.as_mapping().unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(
        results["recipes"]["cray-sles15-barebones"]["id"],
        "recipe-id-cray-sles15-barebones"
    );
    assert_eq!(results["images"]["compute"]["id"], "image-id-compute");
}

#[test]
fn test_one_failed_recipe_fails_the_run() {
    let env = TestEnv::new();
    let archive = env.write("recipes/broken.tar.gz", "recipe");

    let mut yaml = format!(
        "version: 1.0.0\nrecipes:\n  broken:\n    link:\n      type: file\n      path: {}\n    md5: {}\n    linux_distribution: sles15\nimages:\n",
        archive.display(),
        md5_bytes(b"not the recipe"),
    );
    for name in ["image-a", "image-b", "image-c"] {
        yaml.push_str(&file_image(&env, name));
    }
    let manifest = Manifest::from_yaml("manifest.yaml", &yaml).unwrap();

    let uploader = RecordingUploader::default();
    let mut loader = Loader::new(&env.config, &env.session, &uploader);
    assert!(!loader.run(&manifest).unwrap());

    // The bad recipe never reached the uploader; every image still did
    assert!(uploader.recipe_calls().is_empty());
    let images: Vec<_> = uploader
        .image_calls()
        .into_iter()
        .map(|i| i.image_name)
        .collect();
    assert_eq!(images, ["image-a", "image-b", "image-c"]);
    assert!(env.results().is_none());
}

#[test]
fn test_rejected_image_fails_the_run() {
    let env = TestEnv::new();
    let mut yaml = String::from("version: 1.1.0\nimages:\n");
    for name in ["image-a", "image-b"] {
        yaml.push_str(&file_image(&env, name));
    }
    let manifest = Manifest::from_yaml("manifest.yaml", &yaml).unwrap();

    let uploader = RecordingUploader::rejecting(&["image-a"]);
    let mut loader = Loader::new(&env.config, &env.session, &uploader);
    assert!(!loader.run(&manifest).unwrap());
    assert_eq!(uploader.image_calls().len(), 2);
    assert!(env.results().is_none());
}

#[test]
fn test_unsupported_and_missing_artifacts_are_item_failures() {
    let env = TestEnv::new();
    let good = file_image(&env, "good");
    let yaml = format!(
        r#"version: 1.0.0
images:
  ftp-image:
    artifacts:
    - link: {{type: ftp, path: ftp://example.com/rootfs}}
      type: application/vnd.cray.image.rootfs.squashfs
  missing-image:
    artifacts:
    - link: {{type: file, path: /nonexistent/rootfs}}
      type: application/vnd.cray.image.rootfs.squashfs
{good}"#
    );
    let manifest = Manifest::from_yaml("manifest.yaml", &yaml).unwrap();

    let uploader = RecordingUploader::default();
    let mut loader = Loader::new(&env.config, &env.session, &uploader);
    let outcome = loader.load_images(&manifest);

    assert!(!outcome.ok);
    assert_eq!(outcome.records.keys().collect::<Vec<_>>(), ["good"]);
    assert_eq!(outcome.records["good"].id, "image-id-good");
}

#[test]
fn test_null_md5_loads_without_verification() {
    let env = TestEnv::new();
    let archive = env.write("recipes/base.tar.gz", "recipe");
    let rootfs = env.write("images/base/rootfs", "rootfs");
    let kernel = env.write("images/base/kernel", "kernel");

    let yaml = format!(
        r#"version: 1.0.0
recipes:
  base:
    link: {{type: file, path: {archive}}}
    md5: null
    linux_distribution: sles15
images:
  base:
    artifacts:
    - link: {{type: file, path: {rootfs}}}
      md5: ~
      type: application/vnd.cray.image.rootfs.squashfs
    - link: {{type: file, path: {kernel}}}
      md5: null
      type: application/vnd.cray.image.kernel
"#,
        archive = archive.display(),
        rootfs = rootfs.display(),
        kernel = kernel.display(),
    );
    let manifest = Manifest::from_yaml("manifest.yaml", &yaml).unwrap();

    let uploader = RecordingUploader::default();
    let mut loader = Loader::new(&env.config, &env.session, &uploader);
    assert!(loader.run(&manifest).unwrap());
    assert_eq!(uploader.recipe_calls()[0].path, archive);
    assert_eq!(uploader.image_calls()[0].rootfs.as_deref(), Some(rootfs.as_path()));
    assert!(env.results().is_some());
}
