use std::env::consts;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{Config, VenvTool};
use crate::errors::PackError;
use crate::process::run_command;

/// Pinned export the cross path installs from; left behind for inspection.
pub const REQUIREMENTS_EXPORT: &str = "requirements-poetry.txt";

/// Wheel platform tag matching the runner's ARM64 Linux ABI.
const CROSS_TARGET_PLATFORM: &str = "manylinux2014_aarch64";

/// True when the build host's architecture matches the deployment target,
/// so natively built wheels are usable as-is.
#[must_use]
pub fn host_matches_runner() -> bool {
    consts::ARCH == "aarch64" && consts::OS == "linux"
}

/// Narrow seam around external package-manager invocations so the pipeline
/// can be tested with a stub that never spawns subprocesses.
pub trait Provision {
    /// Materialize the virtual environment.
    ///
    /// # Errors
    ///
    /// Returns `PackError::ProvisioningFailed` when any step exits
    /// non-zero. No retries, no rollback; a half-provisioned environment
    /// is left on disk for inspection.
    fn provision(&self) -> Result<()>;
}

/// Provisioner that shells out to poetry/pip in the project root.
#[derive(Debug)]
pub struct CommandProvisioner {
    tool: VenvTool,
    project_root: PathBuf,
    source_venv: PathBuf,
}

impl CommandProvisioner {
    #[must_use]
    pub fn new(config: &Config, project_root: &Path) -> Self {
        Self {
            tool: config.venv_tool,
            project_root: project_root.to_path_buf(),
            source_venv: config.source_venv.clone(),
        }
    }

    fn run_step(&self, program: &str, args: &[&str], envs: &[(String, String)]) -> Result<()> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        let command = format!("{program} {}", args.join(" "));
        debug!(%command, "provisioning step");
        let output = run_command(program, &args, envs, &self.project_root)?;
        if output.success() {
            debug!(%command, "provisioning step succeeded");
            return Ok(());
        }
        // Surface the captured streams for diagnosis before aborting.
        eprint!("{}", output.stdout);
        eprint!("{}", output.stderr);
        Err(PackError::ProvisioningFailed {
            command,
            code: output.code,
        }
        .into())
    }

    fn provision_with_poetry_native(&self) -> Result<()> {
        info!("provisioning in-project virtual environment with poetry");
        self.run_step("poetry", &["config", "virtualenvs.create", "true", "--local"], &[])?;
        self.run_step("poetry", &["config", "virtualenvs.in-project", "true", "--local"], &[])?;
        self.run_step("poetry", &["install", "--only", "main"], &[])?;
        self.run_step("poetry", &["build"], &[])
    }

    fn provision_with_poetry_cross(&self) -> Result<()> {
        info!(
            platform = CROSS_TARGET_PLATFORM,
            "host does not match the runner; installing prebuilt wheels for the target platform"
        );
        self.run_step("poetry", &["build"], &[])?;
        self.export_requirements()?;
        let only_binary = [("PIP_ONLY_BINARY".to_string(), ":all:".to_string())];
        self.run_step(
            "pip",
            &[
                "install",
                "-r",
                REQUIREMENTS_EXPORT,
                "--target",
                "vendor",
                "--upgrade",
                "--platform",
                CROSS_TARGET_PLATFORM,
                "--only-binary=:all:",
            ],
            &only_binary,
        )
    }

    fn provision_with_pip(&self) -> Result<()> {
        info!("provisioning virtual environment with pip");
        let venv = self.source_venv.to_string_lossy().into_owned();
        self.run_step("python3", &["-m", "venv", &venv], &[])?;
        let pip = venv_pip(&self.project_root.join(&self.source_venv));
        let pip = pip.to_string_lossy().into_owned();
        self.run_step(&pip, &["install", "-r", "requirements.txt"], &[])
    }

    fn export_requirements(&self) -> Result<()> {
        let args: Vec<String> = ["export", "--without-hashes", "--format=requirements.txt"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let command = format!("poetry {}", args.join(" "));
        debug!(%command, "provisioning step");
        let output = run_command("poetry", &args, &[], &self.project_root)?;
        if !output.success() {
            eprint!("{}", output.stdout);
            eprint!("{}", output.stderr);
            return Err(PackError::ProvisioningFailed {
                command,
                code: output.code,
            }
            .into());
        }
        let out_path = self.project_root.join(REQUIREMENTS_EXPORT);
        fs::write(&out_path, output.stdout)
            .with_context(|| format!("writing {}", out_path.display()))
    }
}

fn venv_pip(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("pip.exe")
    } else {
        venv.join("bin").join("pip")
    }
}

impl Provision for CommandProvisioner {
    fn provision(&self) -> Result<()> {
        match self.tool {
            VenvTool::Poetry => {
                if host_matches_runner() {
                    self.provision_with_poetry_native()
                } else {
                    self.provision_with_poetry_cross()
                }
            }
            VenvTool::Pip => self.provision_with_pip(),
        }
    }
}
