use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the packaging pipeline.
///
/// Everything here surfaces as a non-zero process exit with a one-line
/// message; only `ManifestNotFound` is treated as recoverable by the
/// pipeline itself (defaults are used and a warning is logged).
#[derive(Debug, Error)]
pub enum PackError {
    #[error("manifest not found at {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("no site-packages directory found under {}", .0.display())]
    DependencyDirNotFound(PathBuf),

    #[error("provisioning command `{command}` exited with status {code}")]
    ProvisioningFailed { command: String, code: i32 },

    #[error("expected exactly one wheel in {}, found {found}", .dir.display())]
    AmbiguousArtifact { dir: PathBuf, found: usize },

    #[error("no files were added to the archive; check the site-packages path and the include globs")]
    EmptyArchive,

    #[error("upload requested but s3_bucket_name is still the placeholder; set [tool.bale] s3_bucket_name in pyproject.toml")]
    UploadMisconfigured,

    #[error("{count} native shared libraries found in site-packages but deps_are_pure_python is set")]
    NativeBinaryMismatch { count: usize },
}

/// True when `err` is (or wraps) a recoverable missing-manifest error.
#[must_use]
pub fn is_manifest_missing(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PackError>(),
        Some(PackError::ManifestNotFound(_))
    )
}
