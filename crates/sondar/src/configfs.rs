//! Configfs location and access.
//!
//! Locates configfs at `/sys/kernel/config`, verifying the filesystem magic
//! and attempting to mount it when absent (which needs root). The result is
//! cached for the process lifetime.

#![allow(unsafe_code)]

use crate::result::{SondarError, SondarResult};
use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Canonical configfs mount point
pub const CONFIGFS_ROOT: &str = "/sys/kernel/config";

/// `CONFIGFS_MAGIC` from `linux/magic.h`
const CONFIGFS_MAGIC: i64 = 0x6265_6570;

fn fs_magic(path: &Path) -> Option<i64> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes()).ok()?;
    let mut sfs: libc::statfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statfs(c_path.as_ptr(), &mut sfs) };
    (ret == 0).then_some(sfs.f_type as i64)
}

fn locate() -> Option<PathBuf> {
    let root = Path::new(CONFIGFS_ROOT);
    if fs_magic(root) == Some(CONFIGFS_MAGIC) {
        return Some(root.to_path_buf());
    }

    // Not mounted; try to mount it ourselves. EBUSY means somebody else
    // beat us to it, which is just as good.
    let mounted = nix::mount::mount(
        Some("none"),
        root,
        Some("configfs"),
        nix::mount::MsFlags::empty(),
        None::<&str>,
    );
    match mounted {
        Ok(()) => Some(root.to_path_buf()),
        Err(nix::errno::Errno::EBUSY) => Some(root.to_path_buf()),
        Err(err) => {
            tracing::debug!(%err, "cannot mount configfs");
            None
        }
    }
}

/// The configfs mount point, mounting it if needed; cached after the first
/// call
pub fn mount() -> Option<&'static Path> {
    static MOUNT: OnceLock<Option<PathBuf>> = OnceLock::new();
    MOUNT.get_or_init(locate).as_deref()
}

/// Open a named configfs directory, as a requirement
pub fn open(name: &str) -> SondarResult<PathBuf> {
    let root = mount()
        .ok_or_else(|| SondarError::requirement("configfs not mounted and not mountable"))?;
    let dir = root.join(name);
    if !dir.is_dir() {
        return Err(SondarError::requirement(format!(
            "no configfs directory {}",
            dir.display()
        )));
    }
    Ok(dir)
}
