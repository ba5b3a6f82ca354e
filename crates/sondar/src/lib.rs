//! Sondar: a test harness and probe library for Linux DRM kernel-driver
//! validation.
//!
//! A validation suite is hundreds of small, independent scenarios: open the
//! device, set up fixtures, issue driver calls, assert on the result, tear
//! down. Sondar provides the shared runtime those scenarios sit on:
//!
//! - [`harness`]: suites of fixtures, subtests and dynamic (data-driven)
//!   subtests with SUCCESS/SKIP/FAIL classification and the exit-code
//!   contract runner tooling expects.
//! - [`hook`]: shell-command hooks fired at test lifecycle points, with
//!   structured `SONDAR_HOOK_*` environment metadata.
//! - [`device`]: `/dev/dri` discovery and driver identification via the
//!   generic DRM version ioctl.
//! - [`sysfs`], [`debugfs`], [`configfs`]: pseudo-filesystem access used as
//!   test inputs and oracles.
//! - [`kmemleak`]: kernel leak scanning between scenarios.
//! - [`process`]: fork-based isolation for scenarios that can wedge the
//!   caller.
//! - [`stats`]: timing-loop sampling for benchmark probes.
//!
//! # Example
//!
//! ```no_run
//! use sondar::harness::{RunOptions, Suite};
//! use sondar::verify;
//!
//! struct Ctx {
//!     device: Option<sondar::device::Device>,
//! }
//!
//! let mut suite = Suite::new("demo")
//!     .fixture(|ctx: &mut Ctx| {
//!         ctx.device = Some(sondar::device::open_any()?);
//!         Ok(())
//!     })
//!     .subtest("version", |ctx| {
//!         let version = ctx.device.as_ref().unwrap().version()?;
//!         verify!(!version.name.is_empty());
//!         Ok(())
//!     });
//!
//! let mut ctx = Ctx { device: None };
//! let summary = suite.run(&mut ctx, &RunOptions::default())?;
//! std::process::exit(summary.exit_code());
//! # Ok::<(), sondar::SondarError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod configfs;
pub mod debugfs;
pub mod device;
pub mod harness;
pub mod hook;
pub mod kmemleak;
pub mod process;
pub mod result;
pub mod stats;
pub mod sysfs;

pub use harness::{DynamicRunner, RunOptions, RunSummary, SubtestRecord, Suite};
pub use hook::{HookDescriptor, HookEvent, HookEventKind, Hooks};
pub use result::{exit_code, SondarError, SondarResult, TestStatus};
