use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::GlobBuilder;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::config::Config;
use crate::errors::PackError;

/// Directory-name suffixes dropped from the dependency tree when
/// `exclude_packaging_cruft` is set. Implied to be unwanted at runtime,
/// though someone's app may depend on one of these, hence the flag.
pub const EXCLUDED_DIR_SUFFIXES: [&str; 6] = [
    "_distutils_hack",
    "wheel",
    "pkg_resources",
    "pip",
    "setuptools",
    "__pycache__",
];

/// The runner's docs explicitly forbid shipping package metadata dirs.
const METADATA_DIR_SUFFIX: &str = ".dist-info";

/// Archive-tool droppings from a certain desktop OS; always rejected.
const MACOS_ARTIFACT: &str = "__MACOSX";

const CACHE_DIR: &str = "__pycache__";
const VENV_SENTINEL: &str = "_virtualenv.py";

/// Where prebuilt distribution artifacts are expected.
pub const DIST_DIR: &str = "dist";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct AssembleReport {
    pub dependency_files: usize,
    pub own_files: usize,
}

impl AssembleReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.dependency_files + self.own_files
    }
}

/// Build the deployment archive in one pass: the dependency tree first,
/// then the project's own files.
///
/// Any pre-existing file at `output` is deleted first, so re-runs are
/// idempotent. Inputs are never mutated.
///
/// # Errors
///
/// Fails with `PackError::EmptyArchive` when both phases contribute zero
/// entries, with `PackError::AmbiguousArtifact` when the wheel fallback
/// does not find exactly one candidate, and propagates I/O failures.
pub fn assemble(
    config: &Config,
    project_root: &Path,
    site_packages: &Path,
    includes: &[String],
    output: &Path,
) -> Result<AssembleReport> {
    if output.exists() {
        fs::remove_file(output)
            .with_context(|| format!("removing stale archive {}", output.display()))?;
    }
    let file = File::create(output)
        .with_context(|| format!("creating archive {}", output.display()))?;
    let mut zip = ZipWriter::new(file);

    let dependency_files = add_dependency_tree(&mut zip, config, site_packages)?;
    if dependency_files == 0 {
        warn!(path = %site_packages.display(), "no files were added from the dependency tree");
    }

    let own_files = if includes.is_empty() {
        let wheel = find_single_wheel(&project_root.join(DIST_DIR))?;
        add_wheel_entries(&mut zip, &config.outer_folder_name, &wheel)?
    } else {
        add_own_files(&mut zip, config, project_root, includes)?
    };
    if own_files == 0 {
        warn!("no files were added from the project's own sources");
    }

    zip.finish().context("finalizing archive")?;

    let report = AssembleReport {
        dependency_files,
        own_files,
    };
    if report.total() == 0 {
        return Err(PackError::EmptyArchive.into());
    }
    Ok(report)
}

fn zip_options() -> FileOptions {
    FileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Phase A: walk the installed-packages tree top-down, pruning excluded
/// subtrees before ever descending into them.
fn add_dependency_tree(
    zip: &mut ZipWriter<File>,
    config: &Config,
    site_packages: &Path,
) -> Result<usize> {
    let mut count = 0;
    let walker = WalkDir::new(site_packages)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| keep_dependency_entry(entry, config.exclude_packaging_cruft));
    for entry in walker {
        let entry = entry.context("walking site-packages")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(site_packages)
            .context("relativizing dependency path")?;
        if !keep_dependency_file(rel, config.exclude_packaging_cruft) {
            debug!(path = %rel.display(), "skipping");
            continue;
        }
        append_file(zip, &config.outer_folder_name, rel, entry.path())?;
        count += 1;
    }
    Ok(count)
}

fn keep_dependency_entry(entry: &DirEntry, exclude_cruft: bool) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.contains(MACOS_ARTIFACT) {
        return false;
    }
    if entry.file_type().is_dir() {
        if name.ends_with(METADATA_DIR_SUFFIX) {
            return false;
        }
        if exclude_cruft
            && EXCLUDED_DIR_SUFFIXES
                .iter()
                .any(|suffix| name.ends_with(suffix))
        {
            debug!(path = %entry.path().display(), "excluding packaging directory");
            return false;
        }
    }
    true
}

/// File-level re-check of the path rules. The metadata-dir test repeats the
/// directory pruning on every segment in case the walk root itself sits
/// inside an excluded path.
fn keep_dependency_file(rel: &Path, exclude_cruft: bool) -> bool {
    let segment_is_excluded = rel.components().any(|component| {
        let segment = component.as_os_str().to_string_lossy();
        segment.ends_with(METADATA_DIR_SUFFIX) || segment.contains(MACOS_ARTIFACT)
    });
    if segment_is_excluded {
        return false;
    }
    if exclude_cruft {
        if let Some(name) = rel.file_name().map(|n| n.to_string_lossy()) {
            if is_packaging_cruft(&name) {
                return false;
            }
        }
    }
    true
}

/// Loader hints, virtual-env markers, and the virtualenv sentinel module.
fn is_packaging_cruft(name: &str) -> bool {
    name.ends_with(".pth") || name.ends_with(".virtualenv") || name == VENV_SENTINEL
}

/// Phase B, glob strategy: expand the declared include patterns against
/// the project tree and append every match not filtered out by the cruft
/// and cache-directory rules.
fn add_own_files(
    zip: &mut ZipWriter<File>,
    config: &Config,
    project_root: &Path,
    includes: &[String],
) -> Result<usize> {
    let candidates = own_file_candidates(project_root)?;
    let mut selected: BTreeSet<PathBuf> = BTreeSet::new();
    for pattern in includes {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid include glob {pattern:?}"))?
            .compile_matcher();
        let mut matched_any = false;
        for rel in &candidates {
            if matcher.is_match(rel) {
                matched_any = true;
                selected.insert(rel.clone());
            }
        }
        if !matched_any {
            warn!(%pattern, "no files matched include pattern");
        }
    }

    let mut count = 0;
    for rel in selected {
        if config.exclude_packaging_cruft {
            if let Some(name) = rel.file_name().map(|n| n.to_string_lossy()) {
                if is_packaging_cruft(&name) {
                    debug!(path = %rel.display(), "skipping");
                    continue;
                }
            }
        }
        append_file(zip, &config.outer_folder_name, &rel, &project_root.join(&rel))?;
        count += 1;
    }
    Ok(count)
}

/// Project files eligible for include matching, relative to the root.
/// Cache directories, archive-tool artifacts, and dot-directories (venvs,
/// VCS metadata) are never candidates.
fn own_file_candidates(project_root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(project_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            if name.contains(MACOS_ARTIFACT) || name == CACHE_DIR {
                return false;
            }
            !(entry.file_type().is_dir()
                && entry.depth() > 0
                && name.starts_with('.'))
        });
    for entry in walker {
        let entry = entry.context("walking project tree")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(project_root)
            .context("relativizing project path")?;
        files.push(rel.to_path_buf());
    }
    Ok(files)
}

/// Phase B, prebuilt-artifact strategy: exactly one wheel in `dist/`.
fn find_single_wheel(dist_dir: &Path) -> Result<PathBuf> {
    let mut wheels = Vec::new();
    if dist_dir.is_dir() {
        for entry in fs::read_dir(dist_dir)
            .with_context(|| format!("reading {}", dist_dir.display()))?
        {
            let path = entry.context("reading dist entry")?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("whl") {
                wheels.push(path);
            }
        }
    }
    wheels.sort();
    if wheels.len() == 1 {
        Ok(wheels.remove(0))
    } else {
        Err(PackError::AmbiguousArtifact {
            dir: dist_dir.to_path_buf(),
            found: wheels.len(),
        }
        .into())
    }
}

/// Copy the wheel's entries under the outer prefix, dropping anything
/// inside a metadata directory.
fn add_wheel_entries(
    zip: &mut ZipWriter<File>,
    outer_folder_name: &str,
    wheel: &Path,
) -> Result<usize> {
    let file =
        File::open(wheel).with_context(|| format!("opening {}", wheel.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading {}", wheel.display()))?;
    let mut count = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).context("reading wheel entry")?;
        if !entry.is_file() {
            continue;
        }
        let name = entry.name().to_string();
        if name
            .split('/')
            .any(|segment| segment.ends_with(METADATA_DIR_SUFFIX))
        {
            continue;
        }
        zip.start_file(format!("{outer_folder_name}/{name}"), zip_options())?;
        io::copy(&mut entry, zip).context("copying wheel entry")?;
        count += 1;
    }
    Ok(count)
}

fn append_file(
    zip: &mut ZipWriter<File>,
    outer_folder_name: &str,
    rel: &Path,
    source: &Path,
) -> Result<()> {
    let rel = rel.to_string_lossy().replace('\\', "/");
    zip.start_file(format!("{outer_folder_name}/{rel}"), zip_options())?;
    let mut file =
        File::open(source).with_context(|| format!("opening {}", source.display()))?;
    io::copy(&mut file, zip)
        .with_context(|| format!("archiving {}", source.display()))?;
    Ok(())
}
