use std::path::Path;

use serde::{Deserialize, Serialize};
use shpkg_domain::{canonical_state, Digest, ExtractionState};
use tracing::{debug, info, instrument, warn};

use crate::archive::{fill_missing, unpack_all};
use crate::checksum;
use crate::config::{Config, LockConfig};
use crate::error::ProvisionError;
use crate::fs::{
    exists_no_follow, parent_or_cwd, remove_dir_all_writable, staging_prefix, StagingDir,
};
use crate::lock::LockedRegion;

/// What `ensure` had to do for one destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum EnsureOutcome {
    /// The archive was unpacked from scratch and a new record written.
    Extracted {
        previous: ExtractionState,
        digest: Digest,
        restored: usize,
    },
    /// The record already matched; only missing entries (if any) were written.
    AlreadyValid { digest: Digest, restored: usize },
}

impl EnsureOutcome {
    #[must_use]
    pub fn digest(&self) -> &Digest {
        match self {
            Self::Extracted { digest, .. } | Self::AlreadyValid { digest, .. } => digest,
        }
    }

    #[must_use]
    pub fn extracted(&self) -> bool {
        matches!(self, Self::Extracted { .. })
    }

    /// Entries written by the fill-missing pass.
    #[must_use]
    pub fn restored(&self) -> usize {
        match self {
            Self::Extracted { restored, .. } | Self::AlreadyValid { restored, .. } => *restored,
        }
    }
}

/// Keeps a destination directory in step with its archive.
///
/// All state changes happen while holding the destination's [`LockedRegion`]:
///
/// * `Absent`/`Stale`: unpack into a staging sibling, swap it in, then write the record.
/// * `Valid`: leave everything in place.
///
/// Both paths finish with a fill-missing pass that only writes entries absent
/// from the destination. A failed extraction never writes a record, so the
/// next caller sees `Stale` and starts over.
#[derive(Clone, Debug, Default)]
pub struct ExtractionCache {
    config: Config,
}

impl ExtractionCache {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn lock_config(&self) -> &LockConfig {
        self.config.lock()
    }

    /// Classifies `dest` without taking the lock. Read-only.
    pub fn status(
        &self,
        archive: &Path,
        dest: &Path,
        checksum_file: &Path,
    ) -> Result<ExtractionState, ProvisionError> {
        let present = dest_present(dest)?;
        let matches = present && checksum::matches(checksum_file, archive)?;
        Ok(canonical_state(present, matches))
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(archive = %archive.display(), dest = %dest.display())
    )]
    pub fn ensure(
        &self,
        archive: &Path,
        dest: &Path,
        checksum_file: &Path,
    ) -> Result<EnsureOutcome, ProvisionError> {
        let _lock = LockedRegion::acquire(dest, self.config.lock())?;

        let digest = checksum::compute(archive)?;
        let present = dest_present(dest)?;
        let recorded = if present {
            checksum::read(checksum_file)?
        } else {
            None
        };
        let state = canonical_state(present, recorded.as_ref() == Some(&digest));
        debug!(%state, %digest, "classified destination");

        if state.needs_extraction() {
            self.extract_fresh(archive, dest, checksum_file, &digest)?;
        }

        let restored = fill_missing(archive, dest)
            .map_err(|err| ProvisionError::extraction(archive, dest, err))?;
        if restored > 0 && !state.needs_extraction() {
            warn!(
                restored,
                dest = %dest.display(),
                "restored entries missing from a valid destination"
            );
        }

        Ok(if state.needs_extraction() {
            EnsureOutcome::Extracted {
                previous: state,
                digest,
                restored,
            }
        } else {
            EnsureOutcome::AlreadyValid { digest, restored }
        })
    }

    fn extract_fresh(
        &self,
        archive: &Path,
        dest: &Path,
        checksum_file: &Path,
        digest: &Digest,
    ) -> Result<(), ProvisionError> {
        info!(archive = %archive.display(), dest = %dest.display(), "extracting archive");
        let failed = |err: std::io::Error| ProvisionError::extraction(archive, dest, err);

        let parent = parent_or_cwd(dest);
        let staging =
            StagingDir::new_in(&parent, &staging_prefix(dest), self.config.staging_max_age())
                .map_err(failed)?;
        unpack_all(archive, staging.path()).map_err(failed)?;
        remove_dir_all_writable(dest).map_err(failed)?;
        staging.persist(dest).map_err(failed)?;

        checksum::write(checksum_file, digest)
    }
}

fn dest_present(dest: &Path) -> Result<bool, ProvisionError> {
    exists_no_follow(dest).map_err(|err| ProvisionError::io("failed to inspect", dest, err))
}
