use std::env;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::errors::PackError;
use crate::provision::Provision;

/// Optional override naming an external virtual-environment root,
/// consulted only when the configured venv is absent.
pub const VENV_ROOT_ENV: &str = "BALE_VENV_ROOT";

/// Conventional name of the installed-packages directory inside a venv.
const SITE_PACKAGES: &str = "site-packages";

/// Locate the installed-packages directory for the run, provisioning the
/// virtual environment on demand.
///
/// # Errors
///
/// Fails with `PackError::DependencyDirNotFound` when no site-packages
/// directory exists even after provisioning. Silently packaging some other
/// directory would produce a misleading but "successful" run, so this is
/// deliberately loud.
pub fn locate_site_packages(
    config: &Config,
    project_root: &Path,
    provisioner: &dyn Provision,
) -> Result<PathBuf> {
    let external = env::var_os(VENV_ROOT_ENV).map(PathBuf::from);
    locate_with(config, project_root, external, provisioner)
}

fn locate_with(
    config: &Config,
    project_root: &Path,
    external: Option<PathBuf>,
    provisioner: &dyn Provision,
) -> Result<PathBuf> {
    let mut venv_root = project_root.join(&config.source_venv);

    if !venv_root.exists() {
        if let Some(external) = external {
            if external.exists() {
                info!(path = %external.display(), "using external venv root from {VENV_ROOT_ENV}");
                venv_root = external;
            } else {
                warn!(
                    path = %external.display(),
                    "{VENV_ROOT_ENV} is set but does not exist; ignoring"
                );
            }
        }
    }

    if !venv_root.exists() {
        info!(path = %venv_root.display(), "virtual environment missing; provisioning");
        provisioner.provision()?;
    }

    match find_site_packages(&venv_root) {
        Some(dir) => {
            debug!(path = %dir.display(), "located site-packages");
            Ok(dir)
        }
        None => Err(PackError::DependencyDirNotFound(venv_root).into()),
    }
}

/// Depth-first search for a directory literally named `site-packages`.
fn find_site_packages(venv_root: &Path) -> Option<PathBuf> {
    use std::ffi::OsStr;

    WalkDir::new(venv_root)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_dir() && entry.file_name() == OsStr::new(SITE_PACKAGES)
        })
        .map(walkdir::DirEntry::into_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;

    struct StubProvisioner {
        called: Cell<bool>,
        create: Option<PathBuf>,
    }

    impl StubProvisioner {
        fn inert() -> Self {
            Self {
                called: Cell::new(false),
                create: None,
            }
        }

        fn creating(path: PathBuf) -> Self {
            Self {
                called: Cell::new(false),
                create: Some(path),
            }
        }
    }

    impl Provision for StubProvisioner {
        fn provision(&self) -> Result<()> {
            self.called.set(true);
            if let Some(path) = &self.create {
                fs::create_dir_all(path)?;
            }
            Ok(())
        }
    }

    #[test]
    fn existing_venv_is_used_without_provisioning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let site = temp
            .path()
            .join(".venv")
            .join("lib")
            .join("python3.11")
            .join(SITE_PACKAGES);
        fs::create_dir_all(&site).expect("mkdir");

        let provisioner = StubProvisioner::inert();
        let found = locate_site_packages(&Config::default(), temp.path(), &provisioner)
            .expect("locate");
        assert_eq!(found, site);
        assert!(!provisioner.called.get());
    }

    #[test]
    fn missing_venv_triggers_provisioning_then_walks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let site = temp.path().join(".venv").join("Lib").join(SITE_PACKAGES);

        let provisioner = StubProvisioner::creating(site.clone());
        let found = locate_with(&Config::default(), temp.path(), None, &provisioner)
            .expect("locate");
        assert_eq!(found, site);
        assert!(provisioner.called.get());
    }

    #[test]
    fn external_root_from_env_is_used_without_provisioning() {
        let project = tempfile::tempdir().expect("tempdir");
        let external = tempfile::tempdir().expect("tempdir");
        let site = external
            .path()
            .join("lib")
            .join("python3.11")
            .join(SITE_PACKAGES);
        fs::create_dir_all(&site).expect("mkdir");

        // the configured venv is absent, so the env override is consulted
        env::set_var(VENV_ROOT_ENV, external.path());
        let provisioner = StubProvisioner::inert();
        let found =
            locate_site_packages(&Config::default(), project.path(), &provisioner);
        env::remove_var(VENV_ROOT_ENV);

        assert_eq!(found.expect("locate"), site);
        assert!(!provisioner.called.get());
    }

    #[test]
    fn stale_external_root_is_ignored_and_provisioning_runs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let site = temp.path().join(".venv").join("lib").join(SITE_PACKAGES);

        let provisioner = StubProvisioner::creating(site.clone());
        let found = locate_with(
            &Config::default(),
            temp.path(),
            Some(temp.path().join("no-such-venv")),
            &provisioner,
        )
        .expect("locate");
        assert_eq!(found, site);
        assert!(provisioner.called.get());
    }

    #[test]
    fn missing_site_packages_after_provisioning_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let provisioner = StubProvisioner::creating(temp.path().join(".venv"));
        let err = locate_with(&Config::default(), temp.path(), None, &provisioner)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackError>(),
            Some(PackError::DependencyDirNotFound(_))
        ));
    }
}
