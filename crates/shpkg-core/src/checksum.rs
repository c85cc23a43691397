//! Persisted archive checksums.
//!
//! A record is a single `<sha256-hex>\n` line. It is read without holding the
//! destination lock and only ever written under it, right after a complete
//! extraction, so a matching record always describes a fully populated tree.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::Path;

use sha2::{Digest as _, Sha256};
use shpkg_domain::Digest;
use tracing::{debug, warn};

use crate::error::ProvisionError;
use crate::fs::parent_or_cwd;

/// Streams `archive` through SHA-256.
pub fn compute(archive: &Path) -> Result<Digest, ProvisionError> {
    let mut file = File::open(archive)
        .map_err(|err| ProvisionError::io("failed to open archive", archive, err))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; 64 * 1024];
    loop {
        let read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ProvisionError::io("failed to read archive", archive, err)),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(Digest::from_hash_output(&hasher.finalize()))
}

/// Returns `None` when no usable record exists.
pub fn read(checksum_file: &Path) -> Result<Option<Digest>, ProvisionError> {
    let contents = match fs::read_to_string(checksum_file) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) if err.kind() == ErrorKind::InvalidData => {
            warn!(path = %checksum_file.display(), "checksum record is not text; ignoring it");
            return Ok(None);
        }
        Err(err) => {
            return Err(ProvisionError::io(
                "failed to read checksum record",
                checksum_file,
                err,
            ))
        }
    };
    let digest = Digest::parse(&contents);
    if digest.is_none() {
        warn!(path = %checksum_file.display(), "checksum record is malformed; ignoring it");
    }
    Ok(digest)
}

/// Replaces the record via a temp file renamed into place.
pub fn write(checksum_file: &Path, digest: &Digest) -> Result<(), ProvisionError> {
    let parent = parent_or_cwd(checksum_file);
    fs::create_dir_all(&parent)
        .map_err(|err| ProvisionError::io("failed to create directory", &parent, err))?;
    let persist = || -> io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".shpkg-checksum-")
            .tempfile_in(&parent)?;
        tmp.write_all(digest.to_record().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(checksum_file).map_err(|err| err.error)?;
        Ok(())
    };
    persist().map_err(|err| {
        ProvisionError::io("failed to write checksum record", checksum_file, err)
    })?;
    debug!(path = %checksum_file.display(), %digest, "wrote checksum record");
    Ok(())
}

/// `true` only when a record exists and equals the archive's current digest.
pub fn matches(checksum_file: &Path, archive: &Path) -> Result<bool, ProvisionError> {
    let Some(recorded) = read(checksum_file)? else {
        return Ok(false);
    };
    Ok(recorded == compute(archive)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // sha256("hello\n")
    const HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn computes_sha256_of_contents() {
        let temp = tempdir().expect("tempdir");
        let archive = temp.path().join("hello.tar");
        fs::write(&archive, b"hello\n").expect("write");
        assert_eq!(compute(&archive).expect("digest").as_str(), HELLO);
    }

    #[test]
    fn missing_archive_is_an_io_error() {
        let temp = tempdir().expect("tempdir");
        let err = compute(&temp.path().join("missing.tar")).expect_err("missing");
        assert_eq!(err.code(), "SHP300");
    }

    #[test]
    fn absent_record_reads_as_none() {
        let temp = tempdir().expect("tempdir");
        assert_eq!(read(&temp.path().join("base.sha256")).expect("read"), None);
    }

    #[test]
    fn write_creates_parents_and_overwrites() {
        let temp = tempdir().expect("tempdir");
        let record = temp.path().join("records").join("nested").join("base.sha256");
        let first = Digest::parse(HELLO).expect("digest");
        let second = Digest::parse(&"0".repeat(64)).expect("digest");

        write(&record, &first).expect("first write");
        write(&record, &second).expect("second write");

        assert_eq!(fs::read_to_string(&record).expect("read"), second.to_record());
        let leftovers: Vec<_> = fs::read_dir(record.parent().expect("parent"))
            .expect("list")
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".shpkg"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn malformed_record_never_matches() {
        let temp = tempdir().expect("tempdir");
        let archive = temp.path().join("hello.tar");
        let record = temp.path().join("hello.sha256");
        fs::write(&archive, b"hello\n").expect("write");
        fs::write(&record, b"5891b5b5\n").expect("write truncated record");

        assert_eq!(read(&record).expect("read"), None);
        assert!(!matches(&record, &archive).expect("matches"));
    }

    #[test]
    fn matches_tracks_archive_replacement() {
        let temp = tempdir().expect("tempdir");
        let archive = temp.path().join("hello.tar");
        let record = temp.path().join("hello.sha256");
        fs::write(&archive, b"hello\n").expect("write");
        assert!(!matches(&record, &archive).expect("no record yet"));

        write(&record, &compute(&archive).expect("digest")).expect("record");
        assert!(matches(&record, &archive).expect("fresh record"));

        fs::write(&archive, b"goodbye\n").expect("replace archive");
        assert!(!matches(&record, &archive).expect("replaced archive"));
    }
}
