use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// One archive to materialize at a shared destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub archive: PathBuf,
    pub dest: PathBuf,
    pub checksum_file: PathBuf,
}

impl PackageManifest {
    pub fn new(
        name: &str,
        archive: impl Into<PathBuf>,
        dest: impl Into<PathBuf>,
        checksum_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: normalize_package_name(name),
            archive: archive.into(),
            dest: dest.into(),
            checksum_file: checksum_file.into(),
        }
    }

    /// Manifest whose checksum record sits next to `dest` as `<dest>.sha256`.
    pub fn with_default_checksum(
        name: &str,
        archive: impl Into<PathBuf>,
        dest: impl Into<PathBuf>,
    ) -> Self {
        let dest = dest.into();
        let checksum_file = default_checksum_path(&dest);
        Self::new(name, archive, dest, checksum_file)
    }

    #[must_use]
    pub fn env_var(&self) -> String {
        env_var_name(&self.name)
    }
}

/// Parses `NAME=ARCHIVE:DEST[:CHECKSUM]`.
impl FromStr for PackageManifest {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let (name, rest) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=ARCHIVE:DEST[:CHECKSUM], got {raw:?}"))?;
        if name.trim().is_empty() {
            bail!("package name is empty in {raw:?}");
        }
        let parts: Vec<&str> = rest.split(':').collect();
        let (archive, dest, checksum) = match parts.as_slice() {
            [archive, dest] => (*archive, *dest, None),
            [archive, dest, checksum] => (*archive, *dest, Some(*checksum)),
            _ => bail!("expected ARCHIVE:DEST[:CHECKSUM] after '=' in {raw:?}"),
        };
        if archive.is_empty() || dest.is_empty() {
            bail!("archive and destination must both be set in {raw:?}");
        }
        Ok(match checksum {
            Some(checksum) if !checksum.is_empty() => Self::new(name, archive, dest, checksum),
            _ => Self::with_default_checksum(name, archive, dest),
        })
    }
}

#[must_use]
pub fn normalize_package_name(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Shell variable exported for a package: `base-runtime` becomes `BASE_RUNTIME_DIR`.
#[must_use]
pub fn env_var_name(name: &str) -> String {
    let mut var: String = normalize_package_name(name)
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    if var.starts_with(|ch: char| ch.is_ascii_digit()) {
        var.insert(0, '_');
    }
    var.push_str("_DIR");
    var
}

#[must_use]
pub fn default_checksum_path(dest: &Path) -> PathBuf {
    let trimmed: PathBuf = dest.components().collect();
    let mut name = trimmed
        .file_name()
        .map_or_else(|| OsString::from("package"), ToOwned::to_owned);
    name.push(CHECKSUM_SUFFIX);
    trimmed.with_file_name(name)
}
