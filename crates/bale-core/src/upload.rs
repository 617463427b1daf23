use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;

use crate::config::{Config, PLACEHOLDER_BUCKET};
use crate::errors::PackError;
use crate::process::run_command;

/// Narrow seam around the object-storage put so pipeline tests never make
/// network calls.
pub trait Upload {
    /// Push `archive` to `bucket`, keyed by the archive's base filename.
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer fails; no retries are attempted.
    fn upload(&self, archive: &Path, bucket: &str) -> Result<()>;
}

/// Uploader that shells out to the AWS CLI for the single put.
#[derive(Debug, Default)]
pub struct AwsCliUploader;

impl Upload for AwsCliUploader {
    fn upload(&self, archive: &Path, bucket: &str) -> Result<()> {
        let key = archive
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("archive path {} has no filename", archive.display()))?;
        info!(%bucket, %key, "uploading archive");
        let args: Vec<String> = [
            "s3api",
            "put-object",
            "--bucket",
            bucket,
            "--key",
            key,
            "--body",
            &archive.to_string_lossy(),
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        let cwd = archive.parent().unwrap_or_else(|| Path::new("."));
        let output = run_command("aws", &args, &[], cwd)?;
        if !output.success() {
            eprint!("{}", output.stdout);
            eprint!("{}", output.stderr);
            bail!("upload of {key} to bucket {bucket} failed (exit {})", output.code);
        }
        Ok(())
    }
}

/// Upload the finished archive when the configuration asks for it.
///
/// Returns whether an upload happened.
///
/// # Errors
///
/// Fails with `PackError::UploadMisconfigured` before any external call
/// when the bucket name is still the shipped placeholder.
pub fn deploy(config: &Config, archive: &Path, uploader: &dyn Upload) -> Result<bool> {
    if !config.upload_to_s3 {
        return Ok(false);
    }
    if config.s3_bucket_name == PLACEHOLDER_BUCKET {
        return Err(PackError::UploadMisconfigured.into());
    }
    if !archive.exists() {
        bail!("cannot upload {}: file does not exist", archive.display());
    }
    uploader
        .upload(archive, &config.s3_bucket_name)
        .with_context(|| format!("uploading {}", archive.display()))?;
    Ok(true)
}
