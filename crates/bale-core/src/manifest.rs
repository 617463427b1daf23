use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use toml_edit::{DocumentMut, Item};
use tracing::warn;

use crate::config::{ConfigOverrides, VenvTool};
use crate::errors::PackError;

pub const MANIFEST_FILENAME: &str = "pyproject.toml";

/// Table under which bale's own configuration lives in the manifest.
const TOOL_TABLE: [&str; 2] = ["tool", "bale"];

/// A parsed project manifest.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    doc: DocumentMut,
}

impl Manifest {
    fn parse(path: &Path, contents: &str) -> Result<Self> {
        let doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    #[must_use]
    #[allow(dead_code)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Project name and version, preferring the venv tool's own metadata
    /// table and falling back to the standardized `[project]` table.
    /// Missing values come back as empty strings, never an error.
    #[must_use]
    pub fn project_info(&self, tool: VenvTool) -> (String, String) {
        let poetry: &[&str] = &["tool", "poetry"];
        let project: &[&str] = &["project"];
        let order: [&[&str]; 2] = match tool {
            VenvTool::Poetry => [poetry, project],
            VenvTool::Pip => [project, poetry],
        };
        for section in order {
            if let Some(name) = self.string_at(section, "name") {
                let version = self.string_at(section, "version").unwrap_or_default();
                return (name, version);
            }
        }
        (String::new(), String::new())
    }

    /// Declared inclusion globs for the project's own source. A single
    /// string is normalized into a one-element sequence.
    #[must_use]
    pub fn own_includes(&self) -> Vec<String> {
        let Some(item) = lookup(&self.doc, &["tool", "poetry", "include"]) else {
            return Vec::new();
        };
        if let Some(single) = item.as_str() {
            return vec![single.to_string()];
        }
        if let Some(array) = item.as_array() {
            return array
                .iter()
                .filter_map(|value| value.as_str().map(ToString::to_string))
                .collect();
        }
        warn!(path = %self.path.display(), "tool.poetry.include is neither a string nor an array; ignoring");
        Vec::new()
    }

    /// The `[tool.bale]` table mapped onto configuration overrides.
    #[must_use]
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            exclude_packaging_cruft: self.bool_key("exclude_packaging_cruft"),
            outer_folder_name: self.string_key("outer_folder_name"),
            source_venv: self.string_key("source_venv").map(PathBuf::from),
            venv_tool: self.string_key("venv_tool").and_then(|raw| {
                match raw.parse::<VenvTool>() {
                    Ok(tool) => Some(tool),
                    Err(err) => {
                        warn!(path = %self.path.display(), %err, "ignoring tool.bale.venv_tool");
                        None
                    }
                }
            }),
            deps_are_pure_python: self.bool_key("deps_are_pure_python"),
            upload_to_s3: self.bool_key("upload_to_s3"),
            s3_bucket_name: self.string_key("s3_bucket_name"),
        }
    }

    fn string_at(&self, section: &[&str], key: &str) -> Option<String> {
        lookup(&self.doc, section)?
            .as_table_like()?
            .get(key)?
            .as_str()
            .map(ToString::to_string)
    }

    fn bool_key(&self, key: &str) -> Option<bool> {
        lookup(&self.doc, &TOOL_TABLE)?
            .as_table_like()?
            .get(key)?
            .as_bool()
    }

    fn string_key(&self, key: &str) -> Option<String> {
        lookup(&self.doc, &TOOL_TABLE)?
            .as_table_like()?
            .get(key)?
            .as_str()
            .map(ToString::to_string)
    }
}

fn lookup<'a>(doc: &'a DocumentMut, path: &[&str]) -> Option<&'a Item> {
    let mut item = doc.as_item();
    for key in path {
        item = item.as_table_like()?.get(key)?;
    }
    Some(item)
}

/// Per-run manifest cache keyed by file path. Scoped to one pipeline run
/// rather than process-global so runs stay reentrant and testable.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: HashMap<PathBuf, Manifest>,
}

impl ManifestCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and cache the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns `PackError::ManifestNotFound` when the file is absent;
    /// callers decide whether that is fatal. Any other read or parse
    /// failure is propagated as-is.
    pub fn load(&mut self, path: &Path) -> Result<&Manifest> {
        match self.entries.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let contents = fs::read_to_string(path).map_err(|err| {
                    if err.kind() == ErrorKind::NotFound {
                        anyhow::Error::new(PackError::ManifestNotFound(path.to_path_buf()))
                    } else {
                        anyhow::Error::new(err)
                            .context(format!("reading {}", path.display()))
                    }
                })?;
                let manifest = Manifest::parse(path, &contents)?;
                Ok(entry.insert(manifest))
            }
        }
    }
}
