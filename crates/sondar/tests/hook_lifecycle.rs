//! End-to-end check of the hook lifecycle: a suite with a dynamic
//! success/fail/skip triple and a plain subtest, observed through a hook
//! command that dumps the `SONDAR_HOOK_*` environment on every event.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use sondar::harness::{RunOptions, Suite};
use sondar::hook::parse_descriptors;
use sondar::result::{exit_code, SondarError};

fn lifecycle_suite() -> Suite<()> {
    Suite::new("demo")
        .subtest_with_dynamic("a", |(), run| {
            run.dynamic("success", || Ok(()));
            run.dynamic("failed", || Err(SondarError::assertion("fail on purpose")));
            run.dynamic("skipped", || Err(SondarError::requirement("skip on purpose")));
            Ok(())
        })
        .subtest("b", |()| Ok(()))
}

fn env_dump_command(log: &std::path::Path) -> String {
    format!(
        "echo \"$SONDAR_HOOK_EVENT|$SONDAR_HOOK_TEST_FULLNAME|$SONDAR_HOOK_TEST\
|$SONDAR_HOOK_SUBTEST|$SONDAR_HOOK_DYN_SUBTEST|$SONDAR_HOOK_RESULT\" >> {}",
        log.display()
    )
}

#[test]
fn every_event_carries_the_expected_env() {
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("hook.log");

    let opts = RunOptions {
        hooks: parse_descriptors(&[env_dump_command(&log)]).unwrap(),
        ..RunOptions::default()
    };
    let summary = lifecycle_suite().run(&mut (), &opts).unwrap();
    assert_eq!(summary.exit_code(), exit_code::FAILURE);

    let contents = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    let expected = [
        "pre-test|sondar@demo|demo|||",
        "pre-subtest|sondar@demo@a|demo|a||",
        "pre-dyn-subtest|sondar@demo@a@success|demo|a|success|",
        "post-dyn-subtest|sondar@demo@a@success|demo|a|success|SUCCESS",
        "pre-dyn-subtest|sondar@demo@a@failed|demo|a|failed|",
        "post-dyn-subtest|sondar@demo@a@failed|demo|a|failed|FAIL",
        "pre-dyn-subtest|sondar@demo@a@skipped|demo|a|skipped|",
        "post-dyn-subtest|sondar@demo@a@skipped|demo|a|skipped|SKIP",
        "post-subtest|sondar@demo@a|demo|a||FAIL",
        "pre-subtest|sondar@demo@b|demo|b||",
        "post-subtest|sondar@demo@b|demo|b||SUCCESS",
        "post-test|sondar@demo|demo|||FAIL",
    ];
    assert_eq!(lines, expected);
}

#[test]
fn event_filter_restricts_hook_execution() {
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("hook.log");

    let descriptor = format!("post-test:{}", env_dump_command(&log));
    let opts = RunOptions {
        hooks: parse_descriptors(&[descriptor]).unwrap(),
        ..RunOptions::default()
    };
    lifecycle_suite().run(&mut (), &opts).unwrap();

    let contents = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines, ["post-test|sondar@demo|demo|||FAIL"]);
}

#[test]
fn subtest_selection_limits_the_event_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("hook.log");

    let opts = RunOptions {
        run_subtests: vec!["b".to_string()],
        hooks: parse_descriptors(&[env_dump_command(&log)]).unwrap(),
        ..RunOptions::default()
    };
    let summary = lifecycle_suite().run(&mut (), &opts).unwrap();
    assert_eq!(summary.exit_code(), exit_code::SUCCESS);

    let contents = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    let expected = [
        "pre-test|sondar@demo|demo|||",
        "pre-subtest|sondar@demo@b|demo|b||",
        "post-subtest|sondar@demo@b|demo|b||SUCCESS",
        "post-test|sondar@demo|demo|||SUCCESS",
    ];
    assert_eq!(lines, expected);
}

#[test]
fn invalid_descriptor_fails_before_anything_runs() {
    let err = parse_descriptors(&["invalid-event:echo hello"]).unwrap_err();
    assert!(matches!(err, SondarError::HookParse { .. }));
}
