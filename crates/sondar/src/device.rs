//! DRM device discovery and identification.
//!
//! Scans `/dev/dri` for primary (`card*`) and render (`renderD*`) nodes and
//! identifies the bound driver through the generic DRM version ioctl. No
//! driver-specific uAPI is touched here; absence of devices is reported as a
//! requirement failure so suites skip cleanly on hardware-less hosts.

#![allow(unsafe_code)]

use crate::result::{SondarError, SondarResult};
use crate::require;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// Directory holding DRM device nodes
pub const DRI_DIR: &str = "/dev/dri";

/// Kind of DRM device node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Primary node (`cardN`), full privileged API
    Primary,
    /// Render node (`renderDN`), unprivileged rendering API
    Render,
}

/// A DRM device node found under `/dev/dri`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceNode {
    /// Full path of the node
    pub path: PathBuf,
    /// Node file name, e.g. `card0`
    pub name: String,
    /// DRM minor number encoded in the name
    pub minor: u32,
    /// Node kind
    pub kind: NodeKind,
}

impl DeviceNode {
    /// Parse a directory entry name into a node, if it is one
    #[must_use]
    pub fn from_name(dir: &Path, name: &str) -> Option<Self> {
        let (kind, minor) = if let Some(rest) = name.strip_prefix("renderD") {
            (NodeKind::Render, rest.parse().ok()?)
        } else if let Some(rest) = name.strip_prefix("card") {
            (NodeKind::Primary, rest.parse().ok()?)
        } else {
            return None;
        };
        Some(Self {
            path: dir.join(name),
            name: name.to_string(),
            minor,
            kind,
        })
    }

    /// Open this node
    pub fn open(&self) -> SondarResult<Device> {
        Device::open(&self.path)
    }
}

/// Scan `/dev/dri` for device nodes; a missing directory yields an empty list
pub fn scan() -> SondarResult<Vec<DeviceNode>> {
    scan_dir(Path::new(DRI_DIR))
}

/// Scan an arbitrary directory for DRM-style device nodes
pub fn scan_dir(dir: &Path) -> SondarResult<Vec<DeviceNode>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut nodes = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(node) = entry
            .file_name()
            .to_str()
            .and_then(|name| DeviceNode::from_name(dir, name))
        {
            nodes.push(node);
        }
    }
    nodes.sort_by_key(|n| (n.kind, n.minor));
    Ok(nodes)
}

/// Driver identification returned by the DRM version ioctl
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverVersion {
    /// Driver name, e.g. `i915`, `xe`, `amdgpu`
    pub name: String,
    /// Driver date string
    pub date: String,
    /// Driver description
    pub desc: String,
    /// Major version
    pub major: i32,
    /// Minor version
    pub minor: i32,
    /// Patch level
    pub patchlevel: i32,
}

#[repr(C)]
struct DrmVersionRaw {
    version_major: libc::c_int,
    version_minor: libc::c_int,
    version_patchlevel: libc::c_int,
    name_len: libc::size_t,
    name: *mut libc::c_char,
    date_len: libc::size_t,
    date: *mut libc::c_char,
    desc_len: libc::size_t,
    desc: *mut libc::c_char,
}

nix::ioctl_readwrite!(drm_version_ioctl, 'd', 0x00, DrmVersionRaw);

/// An open DRM device
#[derive(Debug)]
pub struct Device {
    file: File,
    path: PathBuf,
}

impl Device {
    /// Open a device node read-write
    pub fn open(path: impl AsRef<Path>) -> SondarResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| SondarError::device(format!("open {}: {err}", path.display())))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// The underlying file
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Path the device was opened from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Query the driver name/version via `DRM_IOCTL_VERSION`.
    ///
    /// Two-call pattern: the first call reports string lengths, the second
    /// fills caller-provided buffers.
    pub fn version(&self) -> SondarResult<DriverVersion> {
        let fd = self.file.as_raw_fd();

        let mut raw: DrmVersionRaw = unsafe { std::mem::zeroed() };
        unsafe { drm_version_ioctl(fd, &mut raw) }?;

        let mut name = vec![0u8; raw.name_len];
        let mut date = vec![0u8; raw.date_len];
        let mut desc = vec![0u8; raw.desc_len];
        raw.name = name.as_mut_ptr().cast();
        raw.date = date.as_mut_ptr().cast();
        raw.desc = desc.as_mut_ptr().cast();
        unsafe { drm_version_ioctl(fd, &mut raw) }?;

        let to_string = |buf: &[u8], len: usize| {
            String::from_utf8_lossy(&buf[..len.min(buf.len())])
                .trim_end_matches('\0')
                .to_string()
        };

        Ok(DriverVersion {
            name: to_string(&name, raw.name_len),
            date: to_string(&date, raw.date_len),
            desc: to_string(&desc, raw.desc_len),
            major: raw.version_major,
            minor: raw.version_minor,
            patchlevel: raw.version_patchlevel,
        })
    }
}

/// Open the first device whose driver matches, preferring primary nodes.
///
/// `driver` of `None` accepts any driver. No nodes, or no node matching the
/// requested driver, is a requirement failure (skip).
pub fn open_driver(driver: Option<&str>) -> SondarResult<Device> {
    let nodes = scan()?;
    require!(!nodes.is_empty(), "no DRM device nodes under {DRI_DIR}");

    for node in &nodes {
        let device = match node.open() {
            Ok(device) => device,
            Err(err) => {
                tracing::debug!(node = node.name, %err, "cannot open node");
                continue;
            }
        };
        match device.version() {
            Ok(version) => {
                if driver.is_none() || driver == Some(version.name.as_str()) {
                    tracing::info!(node = node.name, driver = version.name, "opened DRM device");
                    return Ok(device);
                }
                tracing::debug!(node = node.name, driver = version.name, "driver not requested");
            }
            Err(err) => tracing::debug!(node = node.name, %err, "version ioctl failed"),
        }
    }

    match driver {
        Some(name) => Err(SondarError::requirement(format!(
            "no DRM device bound to driver {name:?}"
        ))),
        None => Err(SondarError::requirement("no usable DRM device")),
    }
}

/// Open any DRM device (requirement failure when none exists)
pub fn open_any() -> SondarResult<Device> {
    open_driver(None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn node_names_parse() {
        let dir = Path::new("/dev/dri");
        let node = DeviceNode::from_name(dir, "card0").unwrap();
        assert_eq!(node.kind, NodeKind::Primary);
        assert_eq!(node.minor, 0);
        assert_eq!(node.path, PathBuf::from("/dev/dri/card0"));

        let node = DeviceNode::from_name(dir, "renderD128").unwrap();
        assert_eq!(node.kind, NodeKind::Render);
        assert_eq!(node.minor, 128);

        assert!(DeviceNode::from_name(dir, "by-path").is_none());
        assert!(DeviceNode::from_name(dir, "cardX").is_none());
        assert!(DeviceNode::from_name(dir, "controlD64x").is_none());
    }

    #[test]
    fn scan_missing_dir_is_empty() {
        let nodes = scan_dir(Path::new("/nonexistent/sondar-dri")).unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn scan_orders_primary_before_render() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["renderD129", "card1", "renderD128", "card0", "by-path"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let nodes = scan_dir(dir.path()).unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["card0", "card1", "renderD128", "renderD129"]);
    }

    #[test]
    fn open_missing_node_is_a_device_error() {
        let err = Device::open("/nonexistent/sondar-card0").unwrap_err();
        assert!(matches!(err, SondarError::Device { .. }));
    }
}
