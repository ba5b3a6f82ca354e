//! Debugfs access for DRM devices.
//!
//! Debugfs is mounted at `/sys/kernel/debug` and exposes one directory per
//! DRM minor under `dri/`. Reading it usually needs root; an unmounted or
//! unreadable debugfs is a requirement failure, never a hard error.

use crate::result::{SondarError, SondarResult};
use crate::sysfs::{device_minor, AttrDir};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Default debugfs mount point
pub const DEBUGFS_ROOT: &str = "/sys/kernel/debug";

/// The debugfs root, as a requirement.
///
/// Checks that the mount point exists and is listable (it is mode 700, so
/// this is effectively a root check).
pub fn root() -> SondarResult<PathBuf> {
    root_at(Path::new(DEBUGFS_ROOT))
}

fn root_at(path: &Path) -> SondarResult<PathBuf> {
    if !path.is_dir() {
        return Err(SondarError::requirement(format!(
            "debugfs not mounted at {}",
            path.display()
        )));
    }
    std::fs::read_dir(path).map_err(|err| {
        SondarError::requirement(format!("debugfs not accessible: {err}"))
    })?;
    Ok(path.to_path_buf())
}

/// The debugfs directory of an open DRM device (`dri/<minor>`)
pub fn device_dir(file: &File) -> SondarResult<AttrDir> {
    let minor = device_minor(file)?;
    let dir = root()?.join("dri").join(minor.to_string());
    if !dir.is_dir() {
        return Err(SondarError::requirement(format!(
            "no debugfs directory {}",
            dir.display()
        )));
    }
    Ok(AttrDir::new(dir))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_mount_is_a_requirement_failure() {
        let err = root_at(Path::new("/nonexistent/sondar-debugfs")).unwrap_err();
        assert!(err.is_requirement());
    }

    #[test]
    fn listable_directory_passes() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(root_at(tmp.path()).unwrap(), tmp.path());
    }
}
