//! Suite runtime: fixtures, subtests and dynamic subtests.
//!
//! A [`Suite`] is an ordered list of steps executed against a caller-supplied
//! context type. Fixtures mutate the context; subtests verify it. A subtest
//! body returns [`SondarResult`], and its outcome is classified as SUCCESS,
//! SKIP (requirement error) or FAIL (any other error, or a panic). Dynamic
//! subtests are generated at run time, one per hardware resource the body
//! discovers (engine, GT, device), through a [`DynamicRunner`].
//!
//! The runner drives the hook lifecycle of [`crate::hook`] and aggregates
//! results into a [`RunSummary`] carrying the process exit-code contract.

use crate::hook::{HookDescriptor, HookEvent, HookEventKind, Hooks};
use crate::result::{exit_code, SondarError, SondarResult, TestStatus};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

type StepFn<C> = Box<dyn FnMut(&mut C) -> SondarResult<()>>;
type DynStepFn<C> = Box<dyn FnMut(&mut C, &mut DynamicRunner) -> SondarResult<()>>;

enum Step<C> {
    Fixture(StepFn<C>),
    Subtest { name: String, body: StepFn<C> },
    DynamicSubtest { name: String, body: DynStepFn<C> },
}

/// Options controlling one suite run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Exact subtest names to run; empty means "all"
    pub run_subtests: Vec<String>,
    /// Shell-style glob (`*`, `?`) applied to subtest names
    pub filter: Option<String>,
    /// Parsed hook descriptors
    pub hooks: Vec<HookDescriptor>,
}

impl RunOptions {
    /// Whether a subtest name is selected by this invocation
    #[must_use]
    pub fn selects(&self, name: &str) -> bool {
        if !self.run_subtests.is_empty() {
            return self.run_subtests.iter().any(|n| n == name);
        }
        match &self.filter {
            Some(pattern) => glob_match(pattern, name),
            None => true,
        }
    }
}

/// Result of one subtest (or dynamic subtest) run
#[derive(Debug, Clone, Serialize)]
pub struct SubtestRecord {
    /// Subtest name
    pub name: String,
    /// Classified outcome
    pub status: TestStatus,
    /// Failure or skip message, if any
    pub message: Option<String>,
    /// Wall-clock duration
    pub duration: Duration,
    /// Outcomes of dynamic subtests run inside this subtest
    pub dynamics: Vec<SubtestRecord>,
}

impl SubtestRecord {
    fn new(name: &str, status: TestStatus, message: Option<String>, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
            duration,
            dynamics: Vec::new(),
        }
    }
}

/// Aggregated results of a suite run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Suite name
    pub suite: String,
    /// Per-subtest records, in execution order
    pub records: Vec<SubtestRecord>,
    /// Total wall-clock duration
    pub duration: Duration,
}

impl RunSummary {
    /// Count records with the given status
    #[must_use]
    pub fn count(&self, status: TestStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Records that failed (including timeouts and crashes)
    #[must_use]
    pub fn failures(&self) -> Vec<&SubtestRecord> {
        self.records.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// The overall result string: FAIL dominates, then SUCCESS, then SKIP
    #[must_use]
    pub fn overall_status(&self) -> TestStatus {
        if self.records.iter().any(|r| r.status.is_failure()) {
            TestStatus::Fail
        } else if self.records.iter().any(|r| r.status == TestStatus::Success) {
            TestStatus::Success
        } else {
            TestStatus::Skip
        }
    }

    /// The process exit code for this run
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let statuses = || self.records.iter().map(|r| r.status);
        if statuses().any(|s| matches!(s, TestStatus::Fail | TestStatus::Crash)) {
            exit_code::FAILURE
        } else if statuses().any(|s| s == TestStatus::Timeout) {
            exit_code::TIMEOUT
        } else if statuses().any(|s| s == TestStatus::Success) {
            exit_code::SUCCESS
        } else {
            exit_code::SKIP
        }
    }
}

/// Runner handed to the body of a dynamic subtest.
///
/// Each [`DynamicRunner::dynamic`] call runs one dynamic subtest and
/// classifies it individually; the enclosing subtest aggregates the results.
#[derive(Debug, Default)]
pub struct DynamicRunner {
    hooks: Hooks,
    records: Vec<SubtestRecord>,
}

impl DynamicRunner {
    /// Run one dynamic subtest
    pub fn dynamic<F>(&mut self, name: &str, body: F)
    where
        F: FnOnce() -> SondarResult<()>,
    {
        self.hooks
            .notify(&HookEvent::pre(HookEventKind::PreDynSubtest, name));

        let start = Instant::now();
        let (status, message) = classify(body);
        let duration = start.elapsed();

        tracing::debug!(dynamic = name, %status, "dynamic subtest finished");
        self.hooks.notify(&HookEvent::post(
            HookEventKind::PostDynSubtest,
            name,
            status.as_result_str(),
        ));
        self.records
            .push(SubtestRecord::new(name, status, message, duration));
    }

    /// Number of dynamic subtests run so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no dynamic subtest has run yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// An ordered test suite over a context type `C`
pub struct Suite<C> {
    name: String,
    steps: Vec<Step<C>>,
}

impl<C> std::fmt::Debug for Suite<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl<C> Suite<C> {
    /// Create an empty suite
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Suite name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a fixture step.
    ///
    /// Fixtures run in registration order, interleaved with subtests. A
    /// requirement error skips every remaining subtest; any other error or
    /// a panic fails them.
    #[must_use]
    pub fn fixture<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut C) -> SondarResult<()> + 'static,
    {
        self.steps.push(Step::Fixture(Box::new(f)));
        self
    }

    /// Add a statically named subtest
    #[must_use]
    pub fn subtest<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut C) -> SondarResult<()> + 'static,
    {
        self.steps.push(Step::Subtest {
            name: name.into(),
            body: Box::new(f),
        });
        self
    }

    /// Add a subtest whose cases are generated at run time
    #[must_use]
    pub fn subtest_with_dynamic<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut C, &mut DynamicRunner) -> SondarResult<()> + 'static,
    {
        self.steps.push(Step::DynamicSubtest {
            name: name.into(),
            body: Box::new(f),
        });
        self
    }

    /// Static subtest names, in registration order (the `--list-subtests`
    /// contract; dynamic subtest names only exist at run time)
    #[must_use]
    pub fn subtest_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::Subtest { name, .. } | Step::DynamicSubtest { name, .. } => {
                    Some(name.as_str())
                }
                Step::Fixture(_) => None,
            })
            .collect()
    }

    /// Run the suite.
    ///
    /// Fixtures and unselected subtests are driven per [`RunOptions`]; hook
    /// events fire at every lifecycle point. Requesting an unknown subtest
    /// by exact name fails before anything runs.
    pub fn run(&mut self, ctx: &mut C, opts: &RunOptions) -> SondarResult<RunSummary> {
        for requested in &opts.run_subtests {
            if !self.subtest_names().contains(&requested.as_str()) {
                return Err(SondarError::UnknownSubtest {
                    name: requested.clone(),
                });
            }
        }

        let mut hooks = Hooks::new(opts.hooks.clone());
        let mut records = Vec::new();
        let mut skip_rest: Option<String> = None;
        let mut fail_rest: Option<String> = None;
        let start = Instant::now();

        tracing::info!(suite = self.name, "starting suite");
        hooks.notify(&HookEvent::pre(HookEventKind::PreTest, &self.name));

        for step in &mut self.steps {
            match step {
                Step::Fixture(f) => {
                    if skip_rest.is_some() || fail_rest.is_some() {
                        continue;
                    }
                    let (status, message) = classify(|| f(ctx));
                    match status {
                        TestStatus::Success => {}
                        TestStatus::Skip => {
                            tracing::info!(reason = message.as_deref(), "fixture skipped the rest");
                            skip_rest = message;
                        }
                        _ => {
                            tracing::warn!(reason = message.as_deref(), "fixture failed");
                            fail_rest = message;
                        }
                    }
                }
                Step::Subtest { name, body } => {
                    if !opts.selects(name) {
                        continue;
                    }
                    hooks.notify(&HookEvent::pre(HookEventKind::PreSubtest, name));
                    let sub_start = Instant::now();
                    let (status, message) = if let Some(msg) = &fail_rest {
                        (TestStatus::Fail, Some(msg.clone()))
                    } else if let Some(msg) = &skip_rest {
                        (TestStatus::Skip, Some(msg.clone()))
                    } else {
                        classify(|| body(ctx))
                    };
                    let duration = sub_start.elapsed();
                    tracing::info!(subtest = name.as_str(), %status, "subtest finished");
                    hooks.notify(&HookEvent::post(
                        HookEventKind::PostSubtest,
                        name,
                        status.as_result_str(),
                    ));
                    records.push(SubtestRecord::new(name, status, message, duration));
                }
                Step::DynamicSubtest { name, body } => {
                    if !opts.selects(name) {
                        continue;
                    }
                    hooks.notify(&HookEvent::pre(HookEventKind::PreSubtest, name));
                    let sub_start = Instant::now();

                    let mut record = if let Some(msg) = &fail_rest {
                        SubtestRecord::new(name, TestStatus::Fail, Some(msg.clone()), Duration::ZERO)
                    } else if let Some(msg) = &skip_rest {
                        SubtestRecord::new(name, TestStatus::Skip, Some(msg.clone()), Duration::ZERO)
                    } else {
                        let mut runner = DynamicRunner {
                            hooks: std::mem::take(&mut hooks),
                            records: Vec::new(),
                        };
                        let (body_status, body_message) =
                            classify(|| body(ctx, &mut runner));
                        hooks = std::mem::take(&mut runner.hooks);

                        let (status, message) =
                            aggregate_dynamics(&runner.records, body_status, body_message);
                        let mut rec = SubtestRecord::new(name, status, message, Duration::ZERO);
                        rec.dynamics = runner.records;
                        rec
                    };
                    record.duration = sub_start.elapsed();

                    tracing::info!(subtest = name.as_str(), status = %record.status, "subtest finished");
                    hooks.notify(&HookEvent::post(
                        HookEventKind::PostSubtest,
                        name,
                        record.status.as_result_str(),
                    ));
                    records.push(record);
                }
            }
        }

        let summary = RunSummary {
            suite: self.name.clone(),
            records,
            duration: start.elapsed(),
        };
        hooks.notify(&HookEvent::post(
            HookEventKind::PostTest,
            &self.name,
            summary.overall_status().as_result_str(),
        ));
        tracing::info!(suite = self.name, status = %summary.overall_status(), "suite finished");

        Ok(summary)
    }
}

/// Aggregate a dynamic subtest body and its dynamic records into the result
/// of the enclosing subtest: FAIL if anything failed, else SUCCESS if any
/// dynamic succeeded, else SKIP.
fn aggregate_dynamics(
    dynamics: &[SubtestRecord],
    body_status: TestStatus,
    body_message: Option<String>,
) -> (TestStatus, Option<String>) {
    let first_failure = dynamics
        .iter()
        .find(|r| r.status.is_failure())
        .map(|r| r.message.clone().unwrap_or_else(|| r.name.clone()));

    if body_status.is_failure() {
        return (TestStatus::Fail, body_message);
    }
    if let Some(message) = first_failure {
        return (TestStatus::Fail, Some(message));
    }
    if dynamics.iter().any(|r| r.status == TestStatus::Success) {
        return (TestStatus::Success, None);
    }
    if dynamics.is_empty() {
        let message = body_message
            .unwrap_or_else(|| "no dynamic subtests executed".to_string());
        return (TestStatus::Skip, Some(message));
    }
    (TestStatus::Skip, body_message)
}

/// Run a body and classify its outcome, containing panics
fn classify<F>(body: F) -> (TestStatus, Option<String>)
where
    F: FnOnce() -> SondarResult<()>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => (TestStatus::Success, None),
        Ok(Err(err)) if err.is_requirement() => (TestStatus::Skip, Some(err.to_string())),
        Ok(Err(err)) => (TestStatus::Fail, Some(err.to_string())),
        Err(payload) => (TestStatus::Fail, Some(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Shell-style glob match (`*` and `?` only) over a subtest name
#[must_use]
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p = pattern.as_bytes();
    let n = name.as_bytes();
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == b'?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == b'*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == b'*' {
        pi += 1;
    }
    pi == p.len()
}

/// Skip the current scenario unless a condition holds.
///
/// Expands to an early `return` with a requirement error, so the enclosing
/// function must return a `Result` whose error converts from
/// [`SondarError`](crate::SondarError).
#[macro_export]
macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::SondarError::requirement(concat!(
                "condition not met: ",
                stringify!($cond)
            ))
            .into());
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::SondarError::requirement(format!($($arg)+)).into());
        }
    };
}

/// Skip the current scenario unconditionally with a message
#[macro_export]
macro_rules! skip {
    ($($arg:tt)+) => {
        return Err($crate::SondarError::requirement(format!($($arg)+)).into())
    };
}

/// Fail the current scenario unless a condition holds
#[macro_export]
macro_rules! verify {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::SondarError::assertion(stringify!($cond)).into());
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::SondarError::assertion(format!($($arg)+)).into());
        }
    };
}

/// Fail the current scenario unless two expressions compare equal
#[macro_export]
macro_rules! verify_eq {
    ($left:expr, $right:expr $(,)?) => {{
        let (l, r) = (&$left, &$right);
        if l != r {
            return Err($crate::SondarError::assertion(format!(
                "{} == {}: {l:?} != {r:?}",
                stringify!($left),
                stringify!($right)
            ))
            .into());
        }
    }};
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::result::SondarError;

    fn opts() -> RunOptions {
        RunOptions::default()
    }

    #[test]
    fn subtest_outcomes_are_classified() {
        let mut suite = Suite::new("demo")
            .subtest("ok", |_: &mut ()| Ok(()))
            .subtest("skipped", |_| Err(SondarError::requirement("no hw")))
            .subtest("failed", |_| Err(SondarError::assertion("broken")))
            .subtest("panicked", |_| panic!("boom"));

        let summary = suite.run(&mut (), &opts()).unwrap();
        let statuses: Vec<_> = summary.records.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                TestStatus::Success,
                TestStatus::Skip,
                TestStatus::Fail,
                TestStatus::Fail
            ]
        );
        assert!(summary.records[3]
            .message
            .as_deref()
            .unwrap()
            .contains("boom"));
        assert_eq!(summary.exit_code(), exit_code::FAILURE);
    }

    #[test]
    fn fixtures_mutate_the_context_in_order() {
        let mut suite = Suite::new("demo")
            .fixture(|ctx: &mut Vec<&str>| {
                ctx.push("fixture");
                Ok(())
            })
            .subtest("check", |ctx| {
                verify_eq!(ctx.as_slice(), ["fixture"]);
                ctx.push("subtest");
                Ok(())
            })
            .fixture(|ctx| {
                verify_eq!(ctx.as_slice(), ["fixture", "subtest"]);
                Ok(())
            });

        let mut ctx = Vec::new();
        let summary = suite.run(&mut ctx, &opts()).unwrap();
        assert_eq!(summary.exit_code(), exit_code::SUCCESS);
    }

    #[test]
    fn fixture_requirement_skips_the_rest() {
        let mut suite = Suite::new("demo")
            .subtest("before", |_: &mut ()| Ok(()))
            .fixture(|_| Err(SondarError::requirement("device gone")))
            .subtest("after", |_| Ok(()));

        let summary = suite.run(&mut (), &opts()).unwrap();
        assert_eq!(summary.records[0].status, TestStatus::Success);
        assert_eq!(summary.records[1].status, TestStatus::Skip);
        assert!(summary.records[1]
            .message
            .as_deref()
            .unwrap()
            .contains("device gone"));
        assert_eq!(summary.exit_code(), exit_code::SUCCESS);
    }

    #[test]
    fn fixture_failure_fails_the_rest() {
        let mut suite = Suite::new("demo")
            .fixture(|_: &mut ()| Err(SondarError::assertion("fixture broke")))
            .subtest("a", |_| Ok(()))
            .subtest("b", |_| Ok(()));

        let summary = suite.run(&mut (), &opts()).unwrap();
        assert!(summary.records.iter().all(|r| r.status == TestStatus::Fail));
        assert_eq!(summary.exit_code(), exit_code::FAILURE);
    }

    #[test]
    fn dynamic_results_aggregate_into_the_subtest() {
        let mut suite = Suite::new("demo").subtest_with_dynamic("engines", |_: &mut (), run| {
            run.dynamic("good", || Ok(()));
            run.dynamic("bad", || Err(SondarError::assertion("hung")));
            run.dynamic("absent", || Err(SondarError::requirement("no engine")));
            Ok(())
        });

        let summary = suite.run(&mut (), &opts()).unwrap();
        let record = &summary.records[0];
        assert_eq!(record.status, TestStatus::Fail);
        assert_eq!(record.dynamics.len(), 3);
        assert_eq!(record.dynamics[0].status, TestStatus::Success);
        assert_eq!(record.dynamics[1].status, TestStatus::Fail);
        assert_eq!(record.dynamics[2].status, TestStatus::Skip);
    }

    #[test]
    fn all_skipped_dynamics_skip_the_subtest() {
        let mut suite = Suite::new("demo").subtest_with_dynamic("engines", |_: &mut (), run| {
            run.dynamic("a", || Err(SondarError::requirement("off")));
            run.dynamic("b", || Err(SondarError::requirement("off")));
            Ok(())
        });

        let summary = suite.run(&mut (), &opts()).unwrap();
        assert_eq!(summary.records[0].status, TestStatus::Skip);
        assert_eq!(summary.exit_code(), exit_code::SKIP);
    }

    #[test]
    fn no_dynamics_executed_is_a_skip() {
        let mut suite =
            Suite::new("demo").subtest_with_dynamic("engines", |_: &mut (), _run| Ok(()));

        let summary = suite.run(&mut (), &opts()).unwrap();
        assert_eq!(summary.records[0].status, TestStatus::Skip);
        assert!(summary.records[0]
            .message
            .as_deref()
            .unwrap()
            .contains("no dynamic subtests"));
    }

    #[test]
    fn unknown_subtest_is_rejected_up_front() {
        let mut suite = Suite::new("demo").subtest("real", |_: &mut ()| Ok(()));
        let err = suite
            .run(
                &mut (),
                &RunOptions {
                    run_subtests: vec!["imaginary".to_string()],
                    ..RunOptions::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, SondarError::UnknownSubtest { .. }));
    }

    #[test]
    fn filter_selects_by_glob() {
        let mut suite = Suite::new("demo")
            .subtest("sysfs-basic", |_: &mut ()| Ok(()))
            .subtest("sysfs-gt", |_| Ok(()))
            .subtest("debugfs-basic", |_| Err(SondarError::assertion("nope")));

        let summary = suite
            .run(
                &mut (),
                &RunOptions {
                    filter: Some("sysfs-*".to_string()),
                    ..RunOptions::default()
                },
            )
            .unwrap();
        assert_eq!(summary.records.len(), 2);
        assert_eq!(summary.exit_code(), exit_code::SUCCESS);
    }

    #[test]
    fn empty_selection_exits_skip() {
        let mut suite = Suite::new("demo").subtest("only", |_: &mut ()| Ok(()));
        let summary = suite
            .run(
                &mut (),
                &RunOptions {
                    filter: Some("nothing-*".to_string()),
                    ..RunOptions::default()
                },
            )
            .unwrap();
        assert!(summary.records.is_empty());
        assert_eq!(summary.exit_code(), exit_code::SKIP);
        assert_eq!(summary.overall_status(), TestStatus::Skip);
    }

    #[test]
    fn subtest_names_lists_static_names_in_order() {
        let suite = Suite::new("demo")
            .fixture(|_: &mut ()| Ok(()))
            .subtest("a", |_| Ok(()))
            .subtest_with_dynamic("b", |_, _| Ok(()));
        assert_eq!(suite.subtest_names(), vec!["a", "b"]);
    }

    #[test]
    fn glob_match_covers_star_and_question_mark() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("sysfs-*", "sysfs-basic"));
        assert!(glob_match("*-gt", "sysfs-gt"));
        assert!(glob_match("g?-freq", "gt-freq"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("sysfs-*", "debugfs-basic"));
        assert!(!glob_match("g?-freq", "gtt-freq"));
        assert!(!glob_match("", "x"));
        assert!(glob_match("", ""));
        assert!(glob_match("**", ""));
    }
}
