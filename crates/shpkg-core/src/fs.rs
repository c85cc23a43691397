use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

/// Best-effort recursive chmod for trees that were unpacked read-only.
#[cfg(unix)]
pub(crate) fn make_writable_recursive(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mode = meta.permissions().mode() | if meta.is_dir() { 0o700 } else { 0o600 };
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn make_writable_recursive(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mut perms = meta.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        let _ = fs::set_permissions(path, perms);
    }
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}

/// Removes `path` whatever it is; a missing path is not an error.
pub(crate) fn remove_dir_all_writable(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if !meta.is_dir() {
        return fs::remove_file(path);
    }
    make_writable_recursive(path);
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

pub(crate) fn exists_no_follow(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// `/env/base` + `.lock` gives `/env/base.lock`. Trailing separators are ignored.
pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> Option<PathBuf> {
    let trimmed: PathBuf = path.components().collect();
    let mut name = trimmed.file_name()?.to_os_string();
    name.push(suffix);
    Some(trimmed.with_file_name(name))
}

/// Directory that holds `path`, treating a bare relative name as living in `.`.
pub(crate) fn parent_or_cwd(path: &Path) -> PathBuf {
    let trimmed: PathBuf = path.components().collect();
    match trimmed.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub(crate) fn staging_prefix(dest: &Path) -> String {
    let name = dest
        .components()
        .collect::<PathBuf>()
        .file_name()
        .map_or_else(|| OsString::from("package"), ToOwned::to_owned);
    format!(".{}.partial-", name.to_string_lossy())
}

/// Hidden sibling directory an archive is unpacked into before it replaces the destination.
///
/// Dropping an unpersisted staging directory removes it, so a failed extraction leaves
/// nothing behind apart from what a killed process could not clean up; those leftovers
/// are pruned by later runs once they are older than the configured age.
pub(crate) struct StagingDir {
    inner: Option<tempfile::TempDir>,
    path: PathBuf,
}

impl StagingDir {
    pub(crate) fn new_in(root: &Path, prefix: &str, max_age: Duration) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        prune_stale_staging(root, prefix, max_age);
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        // tempdirs are created 0700; the renamed tree is shared with other users' jobs
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }
        Ok(Self {
            inner: Some(dir),
            path,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the staged tree to `dest`, which must not exist.
    pub(crate) fn persist(mut self, dest: &Path) -> io::Result<()> {
        let Some(dir) = self.inner.take() else {
            return Err(io::Error::other("staging directory already persisted"));
        };
        let path = dir.keep();
        if let Err(err) = fs::rename(&path, dest) {
            let _ = remove_dir_all_writable(&path);
            return Err(err);
        }
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let Some(dir) = self.inner.take() else {
            return;
        };
        let path = dir.keep();
        if let Err(err) = remove_dir_all_writable(&path) {
            warn!(path = %path.display(), %err, "failed to remove staging directory");
        }
    }
}

fn prune_stale_staging(root: &Path, prefix: &str, max_age: Duration) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    let now = SystemTime::now();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(prefix) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let Some(modified) = meta.modified().ok() else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age < max_age {
            continue;
        }
        debug!(path = %entry.path().display(), "pruning abandoned staging directory");
        let _ = remove_dir_all_writable(&entry.path());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sibling_paths_ignore_trailing_separators() {
        assert_eq!(
            sibling_with_suffix(Path::new("/env/base/"), ".lock"),
            Some(PathBuf::from("/env/base.lock"))
        );
        assert_eq!(
            sibling_with_suffix(Path::new("base"), ".lock"),
            Some(PathBuf::from("base.lock"))
        );
        assert_eq!(sibling_with_suffix(Path::new("/"), ".lock"), None);
    }

    #[test]
    fn parent_of_bare_name_is_cwd() {
        assert_eq!(parent_or_cwd(Path::new("base")), PathBuf::from("."));
        assert_eq!(parent_or_cwd(Path::new("/env/base/")), PathBuf::from("/env"));
    }

    #[cfg(unix)]
    #[test]
    fn removes_read_only_trees() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("tree");
        fs::create_dir_all(root.join("lib")).expect("mkdir");
        fs::write(root.join("lib").join("mod.py"), b"x = 1\n").expect("write");
        fs::set_permissions(root.join("lib"), fs::Permissions::from_mode(0o555)).expect("chmod");

        remove_dir_all_writable(&root).expect("remove");
        assert!(!root.exists());
        remove_dir_all_writable(&root).expect("missing path is fine");
    }

    #[test]
    fn dropped_staging_dir_is_removed() {
        let temp = tempdir().expect("tempdir");
        let path = {
            let staging = StagingDir::new_in(temp.path(), ".base.partial-", Duration::from_secs(60))
                .expect("staging");
            fs::write(staging.path().join("file"), b"data").expect("write");
            staging.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn persisted_staging_dir_becomes_destination() {
        let temp = tempdir().expect("tempdir");
        let dest = temp.path().join("base");
        let staging = StagingDir::new_in(temp.path(), ".base.partial-", Duration::from_secs(60))
            .expect("staging");
        fs::write(staging.path().join("file"), b"data").expect("write");
        staging.persist(&dest).expect("persist");
        assert_eq!(fs::read(dest.join("file")).expect("read"), b"data");
    }

    #[test]
    fn prunes_only_old_matching_directories() {
        let temp = tempdir().expect("tempdir");
        let abandoned = temp.path().join(".base.partial-old");
        let unrelated = temp.path().join("base");
        fs::create_dir_all(&abandoned).expect("mkdir");
        fs::create_dir_all(&unrelated).expect("mkdir");

        prune_stale_staging(temp.path(), ".base.partial-", Duration::ZERO);

        assert!(!abandoned.exists());
        assert!(unrelated.exists());
    }
}
