#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod digest;
pub mod manifest;
pub mod state;

pub use digest::Digest;
pub use manifest::{
    default_checksum_path, env_var_name, normalize_package_name, PackageManifest,
    CHECKSUM_SUFFIX,
};
pub use state::{canonical_state, ExtractionState};
