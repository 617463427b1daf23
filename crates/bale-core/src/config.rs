use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::manifest::Manifest;

/// Which external tool materializes the virtual environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VenvTool {
    Poetry,
    Pip,
}

impl FromStr for VenvTool {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "poetry" => Ok(Self::Poetry),
            "pip" => Ok(Self::Pip),
            other => Err(format!("unknown venv tool {other:?} (expected poetry or pip)")),
        }
    }
}

impl fmt::Display for VenvTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poetry => f.write_str("poetry"),
            Self::Pip => f.write_str("pip"),
        }
    }
}

/// Bucket name the defaults ship with; uploads are refused until the user
/// replaces it.
pub const PLACEHOLDER_BUCKET: &str = "example";

/// Resolved run configuration. Built once per run from defaults, then the
/// manifest's `[tool.bale]` table, then CLI flags, and never mutated after.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub exclude_packaging_cruft: bool,
    pub outer_folder_name: String,
    pub source_venv: PathBuf,
    pub venv_tool: VenvTool,
    pub deps_are_pure_python: bool,
    pub upload_to_s3: bool,
    pub s3_bucket_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exclude_packaging_cruft: true,
            outer_folder_name: "venv".to_string(),
            source_venv: PathBuf::from(".venv"),
            venv_tool: VenvTool::Poetry,
            deps_are_pure_python: false,
            upload_to_s3: false,
            s3_bucket_name: PLACEHOLDER_BUCKET.to_string(),
        }
    }
}

/// A partial configuration layer; `None` fields leave the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub exclude_packaging_cruft: Option<bool>,
    pub outer_folder_name: Option<String>,
    pub source_venv: Option<PathBuf>,
    pub venv_tool: Option<VenvTool>,
    pub deps_are_pure_python: Option<bool>,
    pub upload_to_s3: Option<bool>,
    pub s3_bucket_name: Option<String>,
}

impl Config {
    /// Layer defaults, the manifest table, and CLI flags in that order.
    #[must_use]
    pub fn resolve(manifest: Option<&Manifest>, cli: &ConfigOverrides) -> Self {
        let mut config = Self::default();
        if let Some(manifest) = manifest {
            config.apply(&manifest.config_overrides());
        }
        config.apply(cli);
        config
    }

    pub(crate) fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(value) = overrides.exclude_packaging_cruft {
            self.exclude_packaging_cruft = value;
        }
        if let Some(value) = &overrides.outer_folder_name {
            if value.is_empty() {
                warn!("ignoring empty outer_folder_name override");
            } else {
                self.outer_folder_name = value.clone();
            }
        }
        if let Some(value) = &overrides.source_venv {
            self.source_venv = value.clone();
        }
        if let Some(value) = overrides.venv_tool {
            self.venv_tool = value;
        }
        if let Some(value) = overrides.deps_are_pure_python {
            self.deps_are_pure_python = value;
        }
        if let Some(value) = overrides.upload_to_s3 {
            self.upload_to_s3 = value;
        }
        if let Some(value) = &overrides.s3_bucket_name {
            self.s3_bucket_name = value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.exclude_packaging_cruft);
        assert_eq!(config.outer_folder_name, "venv");
        assert_eq!(config.source_venv, PathBuf::from(".venv"));
        assert_eq!(config.venv_tool, VenvTool::Poetry);
        assert!(!config.deps_are_pure_python);
        assert!(!config.upload_to_s3);
        assert_eq!(config.s3_bucket_name, PLACEHOLDER_BUCKET);
    }

    #[test]
    fn overrides_win_over_defaults_and_none_leaves_them_alone() {
        let mut config = Config::default();
        config.apply(&ConfigOverrides {
            outer_folder_name: Some("deps".to_string()),
            deps_are_pure_python: Some(true),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.outer_folder_name, "deps");
        assert!(config.deps_are_pure_python);
        // untouched layers keep their defaults
        assert_eq!(config.venv_tool, VenvTool::Poetry);
        assert!(config.exclude_packaging_cruft);
    }

    #[test]
    fn empty_outer_folder_override_is_rejected() {
        let mut config = Config::default();
        config.apply(&ConfigOverrides {
            outer_folder_name: Some(String::new()),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.outer_folder_name, "venv");
    }

    #[test]
    fn venv_tool_parses_case_insensitively() {
        assert_eq!("Poetry".parse::<VenvTool>().unwrap(), VenvTool::Poetry);
        assert_eq!("PIP".parse::<VenvTool>().unwrap(), VenvTool::Pip);
        assert!("conda".parse::<VenvTool>().is_err());
    }
}
