use std::path::PathBuf;

use bale_core::{ConfigOverrides, VenvTool};
use clap::{ArgAction, Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "bale",
    version,
    about = "Bundle a project's virtual environment and sources into a deployment zip"
)]
pub struct BaleCli {
    /// Drop loader hints, installer packages, and similar packaging cruft
    #[arg(long, value_name = "BOOL")]
    pub exclude_packaging_cruft: Option<bool>,

    /// Prefix folder inside the archive; the runner requires one
    #[arg(long, value_name = "NAME")]
    pub outer_folder_name: Option<String>,

    /// Virtual environment to package
    #[arg(long, value_name = "PATH")]
    pub source_venv: Option<PathBuf>,

    /// Tool used to materialize a missing virtual environment
    #[arg(long, value_enum)]
    pub venv_tool: Option<VenvToolArg>,

    /// Fail the run when native shared libraries are present
    #[arg(long, value_name = "BOOL")]
    pub deps_are_pure_python: Option<bool>,

    /// Upload the finished archive to object storage
    #[arg(long, value_name = "BOOL")]
    pub upload_to_s3: Option<bool>,

    /// Bucket receiving the upload
    #[arg(long, value_name = "BUCKET")]
    pub s3_bucket_name: Option<String>,

    /// Where to write the archive (default: synthesized name in the project root)
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Print a JSON summary of the run
    #[arg(long)]
    pub json: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl BaleCli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            exclude_packaging_cruft: self.exclude_packaging_cruft,
            outer_folder_name: self.outer_folder_name.clone(),
            source_venv: self.source_venv.clone(),
            venv_tool: self.venv_tool.map(VenvTool::from),
            deps_are_pure_python: self.deps_are_pure_python,
            upload_to_s3: self.upload_to_s3,
            s3_bucket_name: self.s3_bucket_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VenvToolArg {
    Poetry,
    Pip,
}

impl From<VenvToolArg> for VenvTool {
    fn from(arg: VenvToolArg) -> Self {
        match arg {
            VenvToolArg::Poetry => Self::Poetry,
            VenvToolArg::Pip => Self::Pip,
        }
    }
}
