//! Sysfs access for DRM devices.
//!
//! A device fd resolves to its sysfs directory through
//! `/sys/dev/char/<major>:<minor>`; from there attributes are read and
//! written as trimmed strings with typed convenience accessors on top. The
//! same attribute-directory mechanics serve debugfs directories, which share
//! the read/write model.

use crate::result::{SondarError, SondarResult};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::os::linux::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Resolve an open character device to its sysfs directory
pub fn device_sysfs_path(file: &File) -> SondarResult<PathBuf> {
    let rdev = file.metadata()?.st_rdev();
    let major = libc::major(rdev);
    let minor = libc::minor(rdev);
    let link = PathBuf::from(format!("/sys/dev/char/{major}:{minor}"));
    Ok(link.canonicalize()?)
}

/// The minor number of an open character device
pub fn device_minor(file: &File) -> SondarResult<u32> {
    let rdev = file.metadata()?.st_rdev();
    Ok(libc::minor(rdev))
}

/// A directory of small text attributes (sysfs, debugfs)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDir {
    root: PathBuf,
}

impl AttrDir {
    /// Wrap an existing directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The sysfs directory of an open DRM device
    pub fn for_device(file: &File) -> SondarResult<Self> {
        device_sysfs_path(file).map(Self::new)
    }

    /// Directory path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Whether the directory itself exists
    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Whether an attribute exists under this directory
    #[must_use]
    pub fn has_attr(&self, attr: &str) -> bool {
        self.root.join(attr).exists()
    }

    /// A sub-directory, if it exists
    #[must_use]
    pub fn subdir(&self, name: &str) -> Option<Self> {
        let path = self.root.join(name);
        path.is_dir().then(|| Self::new(path))
    }

    /// Read an attribute as a whitespace-trimmed string
    pub fn read(&self, attr: &str) -> SondarResult<String> {
        let bytes = std::fs::read(self.root.join(attr))?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    /// Write a string to an attribute
    pub fn write(&self, attr: &str, value: &str) -> SondarResult<()> {
        // Sysfs wants a single write syscall per store; truncation is a
        // no-op there but keeps regular files from retaining stale tails.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.root.join(attr))?;
        file.write_all(value.as_bytes())?;
        Ok(())
    }

    /// Read an attribute as `u32`
    pub fn read_u32(&self, attr: &str) -> SondarResult<u32> {
        let value = self.read(attr)?;
        value.parse().map_err(|_| SondarError::AttrParse {
            attr: attr.to_string(),
            value,
        })
    }

    /// Read an attribute as `u64`
    pub fn read_u64(&self, attr: &str) -> SondarResult<u64> {
        let value = self.read(attr)?;
        value.parse().map_err(|_| SondarError::AttrParse {
            attr: attr.to_string(),
            value,
        })
    }

    /// Read a kernel-style boolean attribute (`0`/`1`/`N`/`Y`)
    pub fn read_bool(&self, attr: &str) -> SondarResult<bool> {
        let value = self.read(attr)?;
        match value.as_str() {
            "0" | "N" | "n" => Ok(false),
            "1" | "Y" | "y" => Ok(true),
            _ => Err(SondarError::AttrParse {
                attr: attr.to_string(),
                value,
            }),
        }
    }

    /// Write a `u32` to an attribute
    pub fn write_u32(&self, attr: &str, value: u32) -> SondarResult<()> {
        self.write(attr, &value.to_string())
    }

    /// Write a `u64` to an attribute
    pub fn write_u64(&self, attr: &str, value: u64) -> SondarResult<()> {
        self.write(attr, &value.to_string())
    }

    /// The per-GT directory, trying the nested `gt/gt<N>` layout first and
    /// falling back to the legacy flat `gt<N>` one
    #[must_use]
    pub fn gt(&self, gt: u32) -> Option<Self> {
        let nested = self.root.join(format!("gt/gt{gt}"));
        if nested.is_dir() {
            return Some(Self::new(nested));
        }
        let flat = self.root.join(format!("gt{gt}"));
        flat.is_dir().then(|| Self::new(flat))
    }

    /// Number of GTs exposed by the device
    #[must_use]
    pub fn num_gts(&self) -> u32 {
        let mut count = 0;
        while self.gt(count).is_some() {
            count += 1;
        }
        count
    }

    /// Visit every readable regular file below this directory.
    ///
    /// Symlinks are skipped (sysfs trees are cyclic through them); files
    /// that cannot be read (write-only or hardware-gated attributes) are
    /// counted, not fatal.
    pub fn walk(&self, visit: &mut dyn FnMut(&Path, &[u8])) -> SondarResult<WalkStats> {
        let mut stats = WalkStats::default();
        walk_dir(&self.root, visit, &mut stats)?;
        Ok(stats)
    }
}

/// Outcome of a recursive attribute walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Files successfully read
    pub visited: usize,
    /// Files that existed but could not be read
    pub unreadable: usize,
}

fn walk_dir(
    dir: &Path,
    visit: &mut dyn FnMut(&Path, &[u8]),
    stats: &mut WalkStats,
) -> SondarResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(dir = %dir.display(), %err, "cannot list directory");
            stats.unreadable += 1;
            return Ok(());
        }
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(_) => {
                stats.unreadable += 1;
                continue;
            }
        };
        if meta.file_type().is_symlink() {
            continue;
        }
        if meta.is_dir() {
            walk_dir(&path, visit, stats)?;
        } else {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    stats.visited += 1;
                    visit(&path, &bytes);
                }
                Err(err) => {
                    tracing::trace!(file = %path.display(), %err, "unreadable attribute");
                    stats.unreadable += 1;
                }
            }
        }
    }
    Ok(())
}

/// The parameter directory of a loaded kernel module
#[must_use]
pub fn module_params(module: &str) -> AttrDir {
    AttrDir::new(format!("/sys/module/{module}/parameters"))
}

/// The DRM core module parameter directory
#[must_use]
pub fn drm_module_params() -> AttrDir {
    module_params("drm")
}
