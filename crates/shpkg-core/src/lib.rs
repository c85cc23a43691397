#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

//! Lock-guarded, checksum-validated extraction of package archives into
//! shared destination directories.

mod archive;
mod cache;
pub mod checksum;
mod config;
mod error;
mod fs;
mod lock;
mod outcome;
mod provision;

pub use crate::cache::{EnsureOutcome, ExtractionCache};
pub use crate::config::{
    Config, GlobalOptions, LockConfig, LOCK_POLL_ENV, LOCK_TIMEOUT_ENV, STAGING_MAX_AGE_ENV,
};
pub use crate::error::ProvisionError;
pub use crate::lock::{lock_path, LockedRegion, LOCK_SUFFIX};
pub use crate::outcome::{
    format_status_message, to_json_response, CommandStatus, ExecutionOutcome,
};
pub use crate::provision::{MultiPackageProvisioner, Provisioned, ProvisionedPackage};

pub use shpkg_domain::{
    canonical_state, default_checksum_path, env_var_name, normalize_package_name, Digest,
    ExtractionState, PackageManifest,
};
