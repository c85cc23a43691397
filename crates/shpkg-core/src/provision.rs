use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use shpkg_domain::{env_var_name, normalize_package_name, PackageManifest};
use tracing::{debug, info};

use crate::cache::{EnsureOutcome, ExtractionCache};
use crate::error::ProvisionError;

/// One package after a successful `ensure`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionedPackage {
    pub manifest: PackageManifest,
    pub outcome: EnsureOutcome,
}

/// Packages ready for use, in provisioning order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Provisioned {
    packages: IndexMap<String, ProvisionedPackage>,
}

impl Provisioned {
    /// Install directory of `name` (case-insensitive).
    #[must_use]
    pub fn dest(&self, name: &str) -> Option<&Path> {
        self.packages
            .get(&normalize_package_name(name))
            .map(|package| package.manifest.dest.as_path())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProvisionedPackage> {
        self.packages.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// `(NAME_DIR, dest)` pairs for the job environment.
    pub fn env_bindings(&self) -> impl Iterator<Item = (String, &Path)> {
        self.packages
            .values()
            .map(|package| (package.manifest.env_var(), package.manifest.dest.as_path()))
    }
}

/// Ensures an ordered list of packages, base runtime first.
#[derive(Clone, Debug, Default)]
pub struct MultiPackageProvisioner {
    cache: ExtractionCache,
}

impl MultiPackageProvisioner {
    #[must_use]
    pub fn new(cache: ExtractionCache) -> Self {
        Self { cache }
    }

    #[must_use]
    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Ensures every manifest in order and stops at the first failure.
    ///
    /// Nothing is locked or written if the manifest set itself is inconsistent.
    pub fn provision(&self, manifests: &[PackageManifest]) -> Result<Provisioned, ProvisionError> {
        validate(manifests)?;
        let mut packages = IndexMap::with_capacity(manifests.len());
        for manifest in manifests {
            debug!(package = %manifest.name, "provisioning package");
            let outcome = self
                .cache
                .ensure(&manifest.archive, &manifest.dest, &manifest.checksum_file)
                .map_err(|err| err.for_package(&manifest.name))?;
            info!(
                package = %manifest.name,
                dest = %manifest.dest.display(),
                extracted = outcome.extracted(),
                "package ready"
            );
            packages.insert(
                normalize_package_name(&manifest.name),
                ProvisionedPackage {
                    manifest: manifest.clone(),
                    outcome,
                },
            );
        }
        Ok(Provisioned { packages })
    }
}

fn validate(manifests: &[PackageManifest]) -> Result<(), ProvisionError> {
    let mut names = HashSet::new();
    let mut vars = HashSet::new();
    let mut dests: Vec<PathBuf> = Vec::with_capacity(manifests.len());
    let mut records = HashSet::new();
    for manifest in manifests {
        let name = normalize_package_name(&manifest.name);
        if name.is_empty() {
            return Err(invalid("package name must not be empty".to_string()));
        }
        if !names.insert(name.clone()) {
            return Err(invalid(format!("package {name} is listed more than once")));
        }
        if !vars.insert(env_var_name(&name)) {
            return Err(invalid(format!(
                "package {name} maps to the same variable {} as another package",
                env_var_name(&name)
            )));
        }
        let dest = normalized(&manifest.dest);
        let record = normalized(&manifest.checksum_file);
        if let Some(other) = dests
            .iter()
            .find(|other| other.starts_with(&dest) || dest.starts_with(other))
        {
            return Err(invalid(format!(
                "destination {} of package {name} overlaps {}",
                manifest.dest.display(),
                other.display()
            )));
        }
        if !records.insert(record) {
            return Err(invalid(format!(
                "checksum file {} of package {name} is shared with another package",
                manifest.checksum_file.display()
            )));
        }
        dests.push(dest);
    }
    for record in &records {
        if let Some(dest) = dests.iter().find(|dest| record.starts_with(dest)) {
            return Err(invalid(format!(
                "checksum file {} lies inside destination {}",
                record.display(),
                dest.display()
            )));
        }
    }
    Ok(())
}

// Lexical only: `./env/base` and `env/base` compare equal, symlinks are not resolved.
fn normalized(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn invalid(message: String) -> ProvisionError {
    ProvisionError::InvalidManifest(message)
}
