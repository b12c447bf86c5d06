mod common;

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{FakeAgent, RecordingSleeper, Step};
use fleet_coder::errors::error_kind_label;
use fleet_coder::telemetry::{current_log_path, RoutingMakeWriter};
use fleet_coder::{AgentInvoker, OrchestratorError, RetryPolicy, UnitOutcome, WorkUnit};

fn unit(log_dir: PathBuf) -> WorkUnit {
    WorkUnit {
        label: "tests/test_a.py".to_string(),
        instruction: "Here is your task".to_string(),
        files: vec!["pkg/core.py".to_string()],
        test_cmd: Some("pytest tests/test_a.py".to_string()),
        lint_cmd: String::new(),
        log_dir,
    }
}

fn secs(v: &[u64]) -> Vec<Duration> {
    v.iter().map(|s| Duration::from_secs(*s)).collect()
}

#[test]
fn test_retry_succeeds_on_third_attempt_with_growing_delays() {
    let td = tempfile::tempdir().expect("tmpdir");
    let agent = FakeAgent::new(vec![Step::Fail("rate limited"), Step::Fail("rate limited")]);
    let sleeper = RecordingSleeper::default();
    let invoker = AgentInvoker::new(&agent, RetryPolicy::default(), &sleeper);

    let outcome = invoker
        .invoke(&unit(td.path().join("logs/u")), td.path())
        .expect("third attempt succeeds");
    assert_eq!(outcome, UnitOutcome::Completed { attempts: 3 });
    assert_eq!(agent.calls().len(), 3);
    let delays = sleeper.delays();
    assert_eq!(delays, secs(&[4, 8]));
    assert!(delays.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_retry_gives_up_after_max_attempts() {
    let td = tempfile::tempdir().expect("tmpdir");
    let agent = FakeAgent::new(vec![Step::Fail("boom"); 10]);
    let sleeper = RecordingSleeper::default();
    let invoker = AgentInvoker::new(&agent, RetryPolicy::default(), &sleeper);

    let err = invoker
        .invoke(&unit(td.path().join("logs/u")), td.path())
        .expect_err("exhausted");
    assert_eq!(error_kind_label(&err), "invocation");
    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::Invocation { attempts, last }) => {
            assert_eq!(*attempts, 5);
            assert!(last.contains("boom"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(agent.calls().len(), 5);
    // capped at 10s, one wait between each pair of attempts
    assert_eq!(sleeper.delays(), secs(&[4, 8, 10, 10]));
}

#[test]
fn test_command_too_long_is_rejected_without_retry() {
    let td = tempfile::tempdir().expect("tmpdir");
    let agent = FakeAgent::new(vec![Step::TooLong]);
    let sleeper = RecordingSleeper::default();
    let invoker = AgentInvoker::new(&agent, RetryPolicy::default(), &sleeper);

    let outcome = invoker
        .invoke(&unit(td.path().join("logs/u")), td.path())
        .expect("rejection is not an error");
    assert!(matches!(outcome, UnitOutcome::Rejected { .. }));
    assert_eq!(agent.calls().len(), 1);
    assert!(sleeper.delays().is_empty());
}

#[test]
fn test_logs_are_redirected_during_the_call_and_restored_after() {
    let td = tempfile::tempdir().expect("tmpdir");
    let log_dir = td.path().join("logs/simpy/run/with_tests/tests__test_a");
    let agent = FakeAgent::new(vec![Step::Fail("flaky")]);
    let sleeper = RecordingSleeper::default();
    let invoker = AgentInvoker::new(&agent, RetryPolicy::default(), &sleeper);

    let subscriber = tracing_subscriber::fmt()
        .with_writer(RoutingMakeWriter)
        .with_ansi(false)
        .finish();
    let repo = Path::new("/work/simpy");
    let outcome = tracing::subscriber::with_default(subscriber, || {
        assert_eq!(current_log_path(), None);
        let out = invoker.invoke(&unit(log_dir.clone()), repo);
        assert_eq!(current_log_path(), None, "redirect must be undone");
        out
    })
    .expect("second attempt succeeds");
    assert_eq!(outcome, UnitOutcome::Completed { attempts: 2 });

    let log_file = log_dir.join("aider.log");
    assert!(log_file.is_file());
    for call in agent.calls() {
        assert_eq!(call.redirected_to.as_deref(), Some(log_file.as_path()));
        assert_eq!(call.log_file, log_file);
        assert_eq!(call.workdir, repo);
    }
    let text = std::fs::read_to_string(&log_file).expect("log");
    assert!(text.contains("fake agent called"), "{text}");
    assert!(text.contains("agent attempt failed"), "{text}");
}

#[test]
fn test_log_redirect_survives_a_failing_unit() {
    let td = tempfile::tempdir().expect("tmpdir");
    let agent = FakeAgent::new(vec![Step::Fail("nope")]);
    let sleeper = RecordingSleeper::default();
    let policy = RetryPolicy {
        max_attempts: 1,
        ..RetryPolicy::default()
    };
    let invoker = AgentInvoker::new(&agent, policy, &sleeper);
    assert!(invoker
        .invoke(&unit(td.path().join("logs/u")), td.path())
        .is_err());
    assert_eq!(current_log_path(), None);
    assert!(sleeper.delays().is_empty());
}
