use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::archive::assemble;
use crate::config::{Config, ConfigOverrides};
use crate::errors::{is_manifest_missing, PackError};
use crate::filename::host_archive_name;
use crate::manifest::{Manifest, ManifestCache, MANIFEST_FILENAME};
use crate::provision::{host_matches_runner, CommandProvisioner, Provision};
use crate::scan::scan_native_libraries;
use crate::upload::{deploy, AwsCliUploader, Upload};
use crate::venv::locate_site_packages;

/// Manifest-derived inputs to the pipeline, read once per run.
#[derive(Debug, Clone, Default)]
pub struct ProjectFacts {
    pub name: String,
    pub version: String,
    pub includes: Vec<String>,
}

impl ProjectFacts {
    fn from_manifest(manifest: &Manifest, config: &Config) -> Self {
        let (name, version) = manifest.project_info(config.venv_tool);
        Self {
            name,
            version,
            includes: manifest.own_includes(),
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct PackReport {
    pub archive: PathBuf,
    pub dependency_files: usize,
    pub own_files: usize,
    pub uploaded: bool,
}

/// Entry point for the CLI: resolve configuration from the manifest and
/// flag overrides, then run the pipeline with the real collaborators.
///
/// # Errors
///
/// Propagates every `PackError` except `ManifestNotFound`, which degrades
/// to defaults with a warning.
pub fn pack_project(
    project_root: &Path,
    cli_overrides: &ConfigOverrides,
    output: Option<PathBuf>,
) -> Result<PackReport> {
    let mut cache = ManifestCache::new();
    let manifest_path = project_root.join(MANIFEST_FILENAME);
    let manifest = match cache.load(&manifest_path) {
        Ok(manifest) => Some(manifest),
        Err(err) if is_manifest_missing(&err) => {
            warn!(path = %manifest_path.display(), "manifest not found; using default configuration");
            None
        }
        Err(err) => return Err(err),
    };
    let config = Config::resolve(manifest, cli_overrides);
    let facts = manifest
        .map(|manifest| ProjectFacts::from_manifest(manifest, &config))
        .unwrap_or_default();

    let provisioner = CommandProvisioner::new(&config, project_root);
    let uploader = AwsCliUploader;
    run_with_config(&config, project_root, &facts, output, &provisioner, &uploader)
}

/// The packaging pipeline proper, with the external collaborators behind
/// their seams so tests can substitute stubs.
///
/// # Errors
///
/// Returns the typed `PackError` for every fatal condition in the
/// pipeline's taxonomy, or an I/O error with context.
pub fn run_with_config(
    config: &Config,
    project_root: &Path,
    facts: &ProjectFacts,
    output: Option<PathBuf>,
    provisioner: &dyn Provision,
    uploader: &dyn Upload,
) -> Result<PackReport> {
    if !host_matches_runner() {
        warn!(
            "the runner executes provided binaries only when compiled for Linux on ARM64; \
             building elsewhere requires pure-python dependencies or prebuilt aarch64 wheels"
        );
    }

    let site_packages = locate_site_packages(config, project_root, provisioner)?;
    info!(path = %site_packages.display(), "packaging site-packages");

    let native_libraries = scan_native_libraries(&site_packages);
    if !native_libraries.is_empty() {
        warn!(
            count = native_libraries.len(),
            "native shared libraries found in the virtual environment"
        );
        if config.deps_are_pure_python {
            warn!(
                "deps_are_pure_python is set; unset it in pyproject.toml or build on an \
                 ARM64 Linux host"
            );
            return Err(PackError::NativeBinaryMismatch {
                count: native_libraries.len(),
            }
            .into());
        }
    }

    let output = match output {
        Some(path) => path,
        None => {
            if facts.name.is_empty() {
                warn!("project name is empty; the synthesized archive name will look odd");
            }
            let name = host_archive_name(&facts.name, &facts.version, &site_packages);
            info!(%name, "using synthesized output filename");
            project_root.join(name)
        }
    };

    let assembled = assemble(config, project_root, &site_packages, &facts.includes, &output)?;
    info!(
        archive = %output.display(),
        dependency_files = assembled.dependency_files,
        own_files = assembled.own_files,
        "archive written"
    );

    let uploaded = deploy(config, &output, uploader)?;

    Ok(PackReport {
        archive: output,
        dependency_files: assembled.dependency_files,
        own_files: assembled.own_files,
        uploaded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    struct InertProvisioner;

    impl Provision for InertProvisioner {
        fn provision(&self) -> Result<()> {
            panic!("pipeline should not provision when the venv exists");
        }
    }

    #[derive(Default)]
    struct RecordingUploader {
        buckets: RefCell<Vec<String>>,
    }

    impl Upload for RecordingUploader {
        fn upload(&self, _archive: &Path, bucket: &str) -> Result<()> {
            self.buckets.borrow_mut().push(bucket.to_string());
            Ok(())
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, b"x").expect("write");
    }

    fn fixture_project(root: &Path) {
        fs::write(
            root.join(MANIFEST_FILENAME),
            r#"
[tool.poetry]
name = "sample_project"
version = "0.1.0"
include = ["app/**/*.py"]
"#,
        )
        .expect("write manifest");
        touch(&root.join("app/main.py"));
        touch(
            &root.join(".venv/lib/python3.9/site-packages/requests/__init__.py"),
        );
        touch(&root.join(".venv/lib/python3.9/site-packages/requests-2.0.dist-info/METADATA"));
    }

    #[test]
    fn full_run_synthesizes_the_name_and_counts_both_phases() {
        let temp = tempfile::tempdir().expect("tempdir");
        fixture_project(temp.path());

        let report = pack_project(temp.path(), &ConfigOverrides::default(), None)
            .expect("pack");
        assert_eq!(report.dependency_files, 1);
        assert_eq!(report.own_files, 1);
        assert!(!report.uploaded);

        let filename = report
            .archive
            .file_name()
            .and_then(|n| n.to_str())
            .expect("archive name");
        assert!(filename.starts_with("sample_project-0.1.0-py3.9-"));
        assert!(filename.ends_with(".zip"));
        assert!(report.archive.exists());
    }

    #[test]
    fn pure_python_assertion_fails_on_native_libraries() {
        let temp = tempfile::tempdir().expect("tempdir");
        fixture_project(temp.path());
        touch(&temp.path().join(".venv/lib/python3.9/site-packages/requests/_speedups.so"));

        let config = Config {
            deps_are_pure_python: true,
            ..Config::default()
        };
        let facts = ProjectFacts {
            name: "sample_project".to_string(),
            version: "0.1.0".to_string(),
            includes: vec!["app/**/*.py".to_string()],
        };
        let err = run_with_config(
            &config,
            temp.path(),
            &facts,
            None,
            &InertProvisioner,
            &RecordingUploader::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::NativeBinaryMismatch { count: 1 })
        ));
    }

    #[test]
    fn upload_guard_fires_before_the_collaborator() {
        let temp = tempfile::tempdir().expect("tempdir");
        fixture_project(temp.path());

        let config = Config {
            upload_to_s3: true,
            ..Config::default()
        };
        let facts = ProjectFacts {
            name: "sample_project".to_string(),
            version: "0.1.0".to_string(),
            includes: vec!["app/**/*.py".to_string()],
        };
        let uploader = RecordingUploader::default();
        let err = run_with_config(
            &config,
            temp.path(),
            &facts,
            None,
            &InertProvisioner,
            &uploader,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::UploadMisconfigured)
        ));
        assert!(uploader.buckets.borrow().is_empty());
    }

    #[test]
    fn configured_upload_reaches_the_collaborator_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        fixture_project(temp.path());

        let config = Config {
            upload_to_s3: true,
            s3_bucket_name: "team-artifacts".to_string(),
            ..Config::default()
        };
        let facts = ProjectFacts {
            name: "sample_project".to_string(),
            version: "0.1.0".to_string(),
            includes: vec!["app/**/*.py".to_string()],
        };
        let uploader = RecordingUploader::default();
        let report = run_with_config(
            &config,
            temp.path(),
            &facts,
            Some(temp.path().join("custom.zip")),
            &InertProvisioner,
            &uploader,
        )
        .expect("run");
        assert!(report.uploaded);
        assert_eq!(*uploader.buckets.borrow(), vec!["team-artifacts".to_string()]);
    }

    #[test]
    fn manifest_precedence_flags_beat_manifest_beats_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join(MANIFEST_FILENAME),
            r#"
[tool.bale]
outer_folder_name = "from-manifest"
deps_are_pure_python = true
"#,
        )
        .expect("write manifest");

        let mut cache = ManifestCache::new();
        let manifest = cache
            .load(&temp.path().join(MANIFEST_FILENAME))
            .expect("load");

        // manifest layer wins over defaults
        let config = Config::resolve(Some(manifest), &ConfigOverrides::default());
        assert_eq!(config.outer_folder_name, "from-manifest");
        assert!(config.deps_are_pure_python);

        // flag layer wins over both
        let config = Config::resolve(
            Some(manifest),
            &ConfigOverrides {
                outer_folder_name: Some("from-flags".to_string()),
                ..ConfigOverrides::default()
            },
        );
        assert_eq!(config.outer_folder_name, "from-flags");
        assert!(config.deps_are_pure_python);
    }
}
