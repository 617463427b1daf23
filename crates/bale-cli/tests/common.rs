#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

pub fn touch(path: &Path) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, b"x").expect("write");
}

/// A minimal poetry project with an already-provisioned virtual
/// environment, so tests never shell out to a real package manager.
pub fn write_fixture(root: &Path) {
    fs::write(
        root.join("pyproject.toml"),
        r#"
[tool.poetry]
name = "sample_project"
version = "0.1.0"
include = ["app/**/*.py"]
"#,
    )
    .expect("write pyproject");
    touch(&root.join("app/main.py"));

    let site = root.join(".venv/lib/python3.9/site-packages");
    touch(&site.join("requests/__init__.py"));
    touch(&site.join("requests-2.0.dist-info/METADATA"));
    touch(&site.join("pip/__init__.py"));
    touch(&site.join("distutils-precedence.pth"));
}

pub fn entry_names(archive: &Path) -> Vec<String> {
    let file = File::open(archive).expect("open archive");
    let zip = ZipArchive::new(file).expect("read archive");
    let mut names: Vec<String> = zip.file_names().map(ToString::to_string).collect();
    names.sort();
    names
}

/// The archive name `bale` synthesizes for the fixture on this host.
pub fn expected_fixture_archive() -> String {
    let os = std::env::consts::OS;
    let bits = if usize::BITS >= 64 { "64" } else { "32" };
    format!("sample_project-0.1.0-py3.9-{os}-{os}{bits}.zip")
}

pub fn archive_path(root: &Path) -> PathBuf {
    root.join(expected_fixture_archive())
}
