use std::path::Path;

/// Interpreter version assumed when neither the venv layout nor a local
/// interpreter reveals one.
pub const FALLBACK_PYTHON_VERSION: (u32, u32) = (3, 11);

/// Derive the output archive name from project identity and platform facts.
///
/// Pure string formatting, deterministic for identical inputs. The shape
/// loosely follows a bdist wheel name:
/// `{name}-{version}-py{major}.{minor}-{os}-{os}{bitness}.zip`.
#[must_use]
pub fn synthesize(
    name: &str,
    version: &str,
    py_major: u32,
    py_minor: u32,
    os: &str,
    pointer_width_64: bool,
) -> String {
    let os = os.to_lowercase();
    let bitness = if pointer_width_64 { "64" } else { "32" };
    format!("{name}-{version}-py{py_major}.{py_minor}-{os}-{os}{bitness}.zip")
}

/// Archive name for the build host, taking the interpreter version from the
/// located site-packages path when it carries one.
#[must_use]
pub fn host_archive_name(name: &str, version: &str, site_packages: &Path) -> String {
    let (major, minor) =
        interpreter_version_from_path(site_packages).unwrap_or(FALLBACK_PYTHON_VERSION);
    synthesize(
        name,
        version,
        major,
        minor,
        std::env::consts::OS,
        usize::BITS >= 64,
    )
}

/// Parse `pythonX.Y` out of a venv path such as
/// `.venv/lib/python3.11/site-packages`. Windows venvs (`Lib/site-packages`)
/// carry no version segment and yield `None`.
#[must_use]
pub fn interpreter_version_from_path(path: &Path) -> Option<(u32, u32)> {
    path.components().rev().find_map(|component| {
        let segment = component.as_os_str().to_str()?;
        let rest = segment.strip_prefix("python")?;
        let (major, minor) = rest.split_once('.')?;
        Some((major.parse().ok()?, minor.parse().ok()?))
    })
}
