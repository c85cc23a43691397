use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors surfaced while provisioning packages.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(
        "[SHP100] gave up waiting for lock {} after {:.1}s; another job is still provisioning",
        lock.display(),
        waited.as_secs_f64()
    )]
    LockTimeout { lock: PathBuf, waited: Duration },
    #[error(
        "[SHP200] failed to extract {} into {}: {error}",
        archive.display(),
        dest.display()
    )]
    ExtractionFailed {
        archive: PathBuf,
        dest: PathBuf,
        error: io::Error,
    },
    #[error("[SHP300] {action} {}: {error}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        error: io::Error,
    },
    #[error("[SHP400] invalid package set: {0}")]
    InvalidManifest(String),
    #[error("package {name} failed to provision")]
    Package {
        name: String,
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    pub(crate) fn io(action: &'static str, path: &Path, error: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            error,
        }
    }

    pub(crate) fn extraction(archive: &Path, dest: &Path, error: io::Error) -> Self {
        Self::ExtractionFailed {
            archive: archive.to_path_buf(),
            dest: dest.to_path_buf(),
            error,
        }
    }

    pub(crate) fn for_package(self, name: &str) -> Self {
        Self::Package {
            name: name.to_string(),
            source: Box::new(self),
        }
    }

    /// The error beneath any package wrapper.
    #[must_use]
    pub fn root(&self) -> &ProvisionError {
        match self {
            Self::Package { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the package that failed, if the error was raised while provisioning one.
    #[must_use]
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::Package { name, .. } => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.root() {
            Self::LockTimeout { .. } => "SHP100",
            Self::ExtractionFailed { .. } => "SHP200",
            Self::Io { .. } => "SHP300",
            Self::InvalidManifest(_) | Self::Package { .. } => "SHP400",
        }
    }

    /// Only lock contention is worth resubmitting the job for.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self.root(), Self::LockTimeout { .. })
    }

    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self.root(), Self::InvalidManifest(_))
    }
}
