#![deny(clippy::all, warnings)]

//! Assemble a deployment archive for a managed batch-compute job runner:
//! a project's installed third-party dependencies plus its own sources,
//! zipped under the prefix folder the runner's import machinery expects,
//! optionally pushed to object storage.

mod archive;
mod config;
mod errors;
mod filename;
mod manifest;
mod pack;
mod process;
mod provision;
mod scan;
mod upload;
mod venv;

pub use crate::config::{ConfigOverrides, VenvTool};
pub use crate::pack::{pack_project, PackReport};
