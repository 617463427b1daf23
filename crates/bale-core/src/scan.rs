use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// Platform shared-library extensions the deployment runner cares about.
pub const NATIVE_LIBRARY_EXTENSIONS: [&str; 4] = ["so", "pyd", "dll", "dylib"];

/// Walk `dir` and report every file with a native shared-library extension.
///
/// Pure reporting; nothing is mutated or deleted. The pipeline uses the
/// result as a compatibility warning signal, and as a hard failure when the
/// configuration asserts the dependency set is pure Python.
#[must_use]
pub fn scan_native_libraries(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let has_native_extension = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| NATIVE_LIBRARY_EXTENSIONS.contains(&ext));
        if has_native_extension {
            debug!(path = %entry.path().display(), "native library found");
            found.push(entry.into_path());
        }
    }
    found
}
