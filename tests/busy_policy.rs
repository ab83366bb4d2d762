//! The documented busy policy: one invocation in flight, everything else
//! rejected with `SessionBusy`.

use std::time::Duration;

use gridgate::engine::{
    CaseSummary, ChangeSet, Engine, EngineCase, EngineFault, MatrixKind, MatrixResult,
    MutationOutcome, PowerTotals, ResultTable, SeriesOutcome, SolveOptions, SolveOutcome,
    TableKind,
};
use gridgate::{ErrorKind, Gateway, GatewayConfig, GatewayRuntime, ToolRequest, Value};

/// A stub backend whose solve blocks long enough to observe the busy
/// window deterministically.
struct SlowEngine {
    solve_delay: Duration,
}

#[derive(Debug)]
struct SlowCase {
    solve_delay: Duration,
}

impl Engine for SlowEngine {
    fn name(&self) -> &'static str {
        "slow-stub"
    }

    fn open(&self, source: &str) -> Result<Box<dyn EngineCase>, EngineFault> {
        if source != "stub" {
            return Err(EngineFault::SourceMissing {
                path: source.to_string(),
            });
        }
        Ok(Box::new(SlowCase {
            solve_delay: self.solve_delay,
        }))
    }
}

impl EngineCase for SlowCase {
    fn case_id(&self) -> &str {
        "stub"
    }

    fn summary(&self) -> CaseSummary {
        CaseSummary {
            case_id: "stub".to_string(),
            bus_count: 1,
            branch_count: 0,
            generator_count: 0,
            load_count: 0,
            base_mva: 1.0,
        }
    }

    fn solve(&mut self, _options: &SolveOptions) -> Result<SolveOutcome, EngineFault> {
        std::thread::sleep(self.solve_delay);
        Ok(SolveOutcome {
            converged: true,
            iterations: 1,
            max_mismatch_pu: 0.0,
        })
    }

    fn apply(
        &mut self,
        target: &str,
        _changes: &ChangeSet,
    ) -> Result<MutationOutcome, EngineFault> {
        Err(EngineFault::UnknownElement {
            target: target.to_string(),
        })
    }

    fn table(&self, _kind: TableKind) -> Result<ResultTable, EngineFault> {
        Err(EngineFault::backend("stub produces no tables"))
    }

    fn totals(&self) -> Result<PowerTotals, EngineFault> {
        Err(EngineFault::backend("stub produces no totals"))
    }

    fn matrix(&self, _kind: MatrixKind) -> Result<MatrixResult, EngineFault> {
        Err(EngineFault::backend("stub produces no matrices"))
    }

    fn run_series(
        &mut self,
        _options: &SolveOptions,
        _step_hours: f64,
        _profile: &[f64],
    ) -> Result<SeriesOutcome, EngineFault> {
        Err(EngineFault::backend("stub runs no series"))
    }

    fn snapshot(&self) -> Result<String, EngineFault> {
        Ok("{}".to_string())
    }
}

fn runtime(solve_delay: Duration) -> (tempfile::TempDir, GatewayRuntime) {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        artifact_root: dir.path().join("runs"),
        ..GatewayConfig::default()
    };
    let engine = Box::new(SlowEngine { solve_delay });
    let gateway = Gateway::with_engine(engine, &config).unwrap();
    (dir, GatewayRuntime::start(gateway))
}

#[test]
fn concurrent_invocation_is_rejected_not_queued() {
    let (_dir, runtime) = runtime(Duration::from_millis(300));

    let result = runtime.invoke(ToolRequest::new("load_case").with_argument("source", "stub"));
    assert!(result.is_success(), "load failed: {result:?}");

    // Start the slow solve asynchronously.
    let handle = runtime.submit(ToolRequest::new("solve_power_flow")).unwrap();

    // While it runs, every further call is rejected immediately.
    let rejected = runtime.invoke(ToolRequest::new("session_status"));
    assert_eq!(rejected.kind(), Some(ErrorKind::SessionBusy));
    let rejected = runtime.invoke(ToolRequest::new("load_case").with_argument("source", "stub"));
    assert_eq!(rejected.kind(), Some(ErrorKind::SessionBusy));

    // The in-flight solve is unaffected by the rejections.
    let solved = handle.join();
    assert!(solved.is_success(), "solve failed: {solved:?}");

    // Once it resolves, the runtime accepts calls again and the session
    // reflects the completed solve.
    let status = runtime.invoke(ToolRequest::new("session_status"));
    let payload = status.payload().unwrap().clone();
    assert_eq!(payload.get("status").and_then(Value::as_str), Some("solved"));
}

#[test]
fn rejection_does_not_disturb_session_state() {
    let (_dir, runtime) = runtime(Duration::from_millis(150));

    runtime.invoke(ToolRequest::new("load_case").with_argument("source", "stub"));
    let handle = runtime.submit(ToolRequest::new("solve_power_flow")).unwrap();

    for _ in 0..5 {
        let rejected = runtime.invoke(ToolRequest::new("release_case"));
        assert_eq!(rejected.kind(), Some(ErrorKind::SessionBusy));
    }
    assert!(handle.join().is_success());

    // None of the rejected releases ran.
    let status = runtime.invoke(ToolRequest::new("session_status"));
    let payload = status.payload().unwrap().clone();
    assert_eq!(payload.get("status").and_then(Value::as_str), Some("solved"));
    assert_eq!(payload.get("case_id").and_then(Value::as_str), Some("stub"));
}

#[test]
fn stub_faults_translate_to_engine_errors() {
    let (_dir, runtime) = runtime(Duration::from_millis(1));

    runtime.invoke(ToolRequest::new("load_case").with_argument("source", "stub"));
    runtime.invoke(ToolRequest::new("solve_power_flow"));

    let result = runtime.invoke(ToolRequest::new("get_total_power"));
    assert_eq!(result.kind(), Some(ErrorKind::EngineError));
}
