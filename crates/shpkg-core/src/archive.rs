use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, trace};

use crate::fs::exists_no_follow;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Opens a plain or gzip-compressed tarball, sniffing the compression from its header.
pub(crate) fn open_archive(path: &Path) -> io::Result<Archive<Box<dyn Read>>> {
    let mut file = File::open(path)?;
    let mut magic = Vec::with_capacity(GZIP_MAGIC.len());
    (&mut file).take(GZIP_MAGIC.len() as u64).read_to_end(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    let reader: Box<dyn Read> = if magic == GZIP_MAGIC {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    Ok(archive)
}

/// Unpacks every entry of `archive` under `dest`.
pub(crate) fn unpack_all(archive: &Path, dest: &Path) -> io::Result<()> {
    let mut tar = open_archive(archive)?;
    tar.unpack(dest)
}

/// Unpacks only the entries whose target is missing under `dest`.
///
/// Existing files, directories and links are left exactly as they are.
/// Returns the number of entries written.
pub(crate) fn fill_missing(archive: &Path, dest: &Path) -> io::Result<usize> {
    let mut tar = open_archive(archive)?;
    tar.set_overwrite(false);
    let mut restored = 0;
    for entry in tar.entries()? {
        let mut entry = entry?;
        let relative = entry.path()?.into_owned();
        let Some(target) = target_in(dest, &relative) else {
            trace!(path = %relative.display(), "skipping entry outside destination");
            continue;
        };
        if exists_no_follow(&target)? {
            continue;
        }
        if entry.unpack_in(dest)? {
            debug!(path = %target.display(), "restored missing entry");
            restored += 1;
        }
    }
    Ok(restored)
}

/// Where `unpack_in` puts `entry_path`: roots and `.` are dropped, `..` is refused.
fn target_in(dest: &Path, entry_path: &Path) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::ParentDir => return None,
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(dest.join(relative))
}


#[cfg(test)]
mod tests {
    use super::fixtures::{write_tar, write_tar_gz};
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unpacks_plain_and_gzip_archives() {
        let temp = tempdir().expect("tempdir");
        let plain = temp.path().join("pkg.tar");
        let gz = temp.path().join("pkg.tar.gz");
        write_tar(&plain, &[("bin/run", "#!/bin/sh\n")]);
        write_tar_gz(&gz, &[("bin/run", "#!/bin/sh\n")]);

        for (archive, dest) in [(&plain, "plain"), (&gz, "gz")] {
            let dest = temp.path().join(dest);
            unpack_all(archive, &dest).expect("unpack");
            assert_eq!(fs::read(dest.join("bin/run")).expect("read"), b"#!/bin/sh\n");
        }
    }

    #[test]
    fn garbage_is_not_an_archive() {
        let temp = tempdir().expect("tempdir");
        let archive = temp.path().join("broken.tar");
        fs::write(&archive, vec![0x42_u8; 2048]).expect("write");
        assert!(unpack_all(&archive, &temp.path().join("dest")).is_err());
    }

    #[test]
    fn fill_missing_restores_only_absent_entries() {
        let temp = tempdir().expect("tempdir");
        let archive = temp.path().join("pkg.tar");
        write_tar(
            &archive,
            &[("lib/a.py", "a = 1\n"), ("lib/b.py", "b = 2\n"), ("README", "docs\n")],
        );
        let dest = temp.path().join("dest");
        unpack_all(&archive, &dest).expect("unpack");
        fs::write(dest.join("lib/a.py"), b"patched\n").expect("local edit");
        fs::remove_file(dest.join("lib/b.py")).expect("remove");

        let restored = fill_missing(&archive, &dest).expect("fill");

        assert_eq!(restored, 1);
        assert_eq!(fs::read(dest.join("lib/b.py")).expect("read"), b"b = 2\n");
        assert_eq!(fs::read(dest.join("lib/a.py")).expect("read"), b"patched\n");
        assert_eq!(fill_missing(&archive, &dest).expect("second fill"), 0);
    }

    #[test]
    fn fill_missing_recreates_missing_directories() {
        let temp = tempdir().expect("tempdir");
        let archive = temp.path().join("pkg.tar");
        write_tar(&archive, &[("share/data/x.txt", "x\n")]);
        let dest = temp.path().join("dest");
        fs::create_dir_all(&dest).expect("mkdir");

        let restored = fill_missing(&archive, &dest).expect("fill");

        assert_eq!(restored, 3);
        assert_eq!(fs::read(dest.join("share/data/x.txt")).expect("read"), b"x\n");
    }

    #[test]
    fn entry_targets_follow_unpack_in() {
        let dest = Path::new("/env/base");
        assert_eq!(
            target_in(dest, Path::new("./bin/run")),
            Some(PathBuf::from("/env/base/bin/run"))
        );
        assert_eq!(
            target_in(dest, Path::new("/etc/motd")),
            Some(PathBuf::from("/env/base/etc/motd"))
        );
        assert_eq!(target_in(dest, Path::new("../escape")), None);
        assert_eq!(target_in(dest, Path::new("./")), None);
    }

    #[test]
    fn fill_missing_restores_absolute_entries_where_unpack_put_them() {
        let temp = tempdir().expect("tempdir");
        let archive = temp.path().join("abs.tar");
        let mut builder = tar::Builder::new(fs::File::create(&archive).expect("create"));
        let contents = b"motd\n";
        let mut header = tar::Header::new_gnu();
        let name = b"/etc-motd";
        header.as_gnu_mut().expect("gnu header").name[..name.len()].copy_from_slice(name);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder.append(&header, &contents[..]).expect("append");
        builder.into_inner().expect("finish");

        let dest = temp.path().join("dest");
        unpack_all(&archive, &dest).expect("unpack");
        assert_eq!(fs::read(dest.join("etc-motd")).expect("read"), contents);
        assert_eq!(fill_missing(&archive, &dest).expect("fill"), 0);

        fs::remove_file(dest.join("etc-motd")).expect("remove");
        assert_eq!(fill_missing(&archive, &dest).expect("refill"), 1);
        assert_eq!(fs::read(dest.join("etc-motd")).expect("read"), contents);
    }
}
