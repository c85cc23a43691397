#![allow(dead_code)]

use std::fs::File;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use serde_json::Value;
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

/// Scratch layout: archives under `pkgs/`, install root `env/` (not created).
pub struct Sandbox {
    pub temp: TempDir,
}

impl Sandbox {
    pub fn new(prefix: &str) -> Self {
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .expect("tempdir");
        std::fs::create_dir_all(temp.path().join("pkgs")).expect("pkgs dir");
        Self { temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn archive(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = self.root().join("pkgs").join(name);
        write_tar(&path, files);
        path
    }

    pub fn env(&self, name: &str) -> PathBuf {
        self.root().join("env").join(name)
    }
}

pub fn write_tar(path: &Path, files: &[(&str, &str)]) {
    let file = File::create(path).expect("create archive");
    let mut builder = Builder::new(file);
    for (name, contents) in files {
        if let Some(parent) = Path::new(name).parent().filter(|p| !p.as_os_str().is_empty()) {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            header.set_mtime(1_600_000_000);
            header.set_cksum();
            builder
                .append_data(&mut header, parent, std::io::empty())
                .expect("append dir");
        }
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o755);
        header.set_size(contents.len() as u64);
        header.set_mtime(1_600_000_000);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .expect("append file");
    }
    builder.into_inner().expect("finish archive");
}

pub fn package_arg(name: &str, archive: &Path, dest: &Path) -> String {
    format!("{name}={}:{}", archive.display(), dest.display())
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn stdout(assert: &Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

pub fn stderr(assert: &Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}
