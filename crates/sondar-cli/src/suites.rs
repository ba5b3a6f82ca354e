//! The built-in probe suite.
//!
//! Driver-agnostic scenarios exercising the generic DRM surface: the version
//! ioctl, sysfs and debugfs trees, configfs, module parameters and process
//! isolation. Hosts without a DRM device skip cleanly instead of failing.

use sondar::device::{self, DeviceNode};
use sondar::harness::Suite;
use sondar::process::run_isolated;
use sondar::stats::{measure, SampleSummary};
use sondar::sysfs::AttrDir;
use sondar::{configfs, debugfs, require, skip, verify, SondarError, SondarResult, TestStatus};

/// Context shared by the probe subtests
#[derive(Debug, Default)]
pub struct ProbeCtx {
    /// DRM nodes discovered by the fixture
    pub nodes: Vec<DeviceNode>,
}

/// Build the probe suite
#[must_use]
pub fn probe_suite() -> Suite<ProbeCtx> {
    Suite::new("probe")
        .fixture(|ctx: &mut ProbeCtx| {
            ctx.nodes = device::scan()?;
            tracing::info!(nodes = ctx.nodes.len(), "scanned /dev/dri");
            Ok(())
        })
        .subtest("version", version)
        .subtest_with_dynamic("sysfs-read-all-entries", sysfs_read_all_entries)
        .subtest_with_dynamic("sysfs-gt", sysfs_gt)
        .subtest("debugfs-path", debugfs_path)
        .subtest("configfs-mount", configfs_mount)
        .subtest("module-params", module_params)
        .subtest("fork-isolation", fork_isolation)
}

/// Open the first openable node; no nodes, or none openable (unprivileged
/// hosts), is a requirement failure
fn open_first(nodes: &[DeviceNode]) -> SondarResult<sondar::device::Device> {
    require!(!nodes.is_empty(), "no DRM device nodes");
    for node in nodes {
        match node.open() {
            Ok(device) => return Ok(device),
            Err(err) => tracing::debug!(node = node.name, %err, "cannot open node"),
        }
    }
    skip!("no DRM node could be opened")
}

fn version(ctx: &mut ProbeCtx) -> SondarResult<()> {
    require!(!ctx.nodes.is_empty(), "no DRM device nodes");
    let mut identified = 0;
    for node in &ctx.nodes {
        let device = match node.open() {
            Ok(device) => device,
            Err(err) => {
                tracing::debug!(node = node.name, %err, "cannot open node");
                continue;
            }
        };
        let version = device.version()?;
        verify!(!version.name.is_empty(), "{}: empty driver name", node.name);
        verify!(version.major >= 0);
        tracing::info!(
            node = node.name,
            driver = version.name,
            version = format!("{}.{}.{}", version.major, version.minor, version.patchlevel),
            "identified driver"
        );
        identified += 1;
    }
    require!(identified > 0, "no DRM node could be opened");
    Ok(())
}

fn sysfs_read_all_entries(
    ctx: &mut ProbeCtx,
    run: &mut sondar::DynamicRunner,
) -> SondarResult<()> {
    for node in &ctx.nodes {
        run.dynamic(&node.name, || {
            let device = node.open().map_err(|err| {
                SondarError::requirement(format!("cannot open {}: {err}", node.name))
            })?;
            let dir = AttrDir::for_device(device.file())?;
            let stats = dir.walk(&mut |_, _| {})?;
            verify!(stats.visited > 0, "nothing readable under {}", dir.path().display());
            tracing::debug!(
                node = node.name,
                visited = stats.visited,
                unreadable = stats.unreadable,
                "walked sysfs tree"
            );
            Ok(())
        });
    }
    Ok(())
}

fn sysfs_gt(ctx: &mut ProbeCtx, run: &mut sondar::DynamicRunner) -> SondarResult<()> {
    for node in &ctx.nodes {
        let device = match node.open() {
            Ok(device) => device,
            Err(err) => {
                tracing::debug!(node = node.name, %err, "cannot open node");
                continue;
            }
        };
        let dir = AttrDir::for_device(device.file())?;
        for gt in 0..dir.num_gts() {
            run.dynamic(&format!("{}-gt{gt}", node.name), || {
                let gt_dir = dir
                    .gt(gt)
                    .ok_or_else(|| SondarError::device(format!("gt{gt} disappeared")))?;
                let stats = gt_dir.walk(&mut |_, _| {})?;
                verify!(stats.visited > 0);
                Ok(())
            });
        }
    }
    Ok(())
}

fn debugfs_path(ctx: &mut ProbeCtx) -> SondarResult<()> {
    let device = open_first(&ctx.nodes)?;
    let dir = debugfs::device_dir(device.file())?;
    let name = dir.read("name")?;
    verify!(!name.is_empty(), "empty debugfs name file");
    Ok(())
}

fn configfs_mount(_ctx: &mut ProbeCtx) -> SondarResult<()> {
    let root = configfs::mount()
        .ok_or_else(|| SondarError::requirement("configfs not mounted and not mountable"))?;
    verify!(root.is_dir());
    Ok(())
}

fn module_params(_ctx: &mut ProbeCtx) -> SondarResult<()> {
    let params = sondar::sysfs::drm_module_params();
    require!(params.exists(), "drm module not loaded");
    let stats = params.walk(&mut |_, _| {})?;
    verify!(
        stats.visited + stats.unreadable > 0,
        "no parameters under {}",
        params.path().display()
    );
    Ok(())
}

fn fork_isolation(_ctx: &mut ProbeCtx) -> SondarResult<()> {
    verify!(run_isolated(|| Ok(()))? == TestStatus::Success);
    verify!(run_isolated(|| Err(SondarError::assertion("on purpose")))? == TestStatus::Fail);
    verify!(run_isolated(|| Err(SondarError::requirement("on purpose")))? == TestStatus::Skip);
    Ok(())
}

/// Sample the latency of the DRM version ioctl on any available device;
/// `tick` is called once per iteration, warmup included (progress reporting)
pub fn bench_version(
    warmup: usize,
    iterations: usize,
    mut tick: impl FnMut(),
) -> SondarResult<SampleSummary> {
    let device = device::open_any()?;
    let samples = measure(warmup, iterations, || {
        let _ = device.version();
        tick();
    });
    Ok(samples.summary("drm-version-ioctl"))
}
