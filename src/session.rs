//! The session: the process-wide mutable simulation state.
//!
//! Exactly one [`Session`] exists per gateway process. It owns the engine
//! case handle exclusively and drives the lifecycle state machine
//! Empty -> Loaded -> Solved/Failed. Replacement follows a strict
//! release-before-load protocol so the previous handle's resources are
//! gone before the next case opens.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{
    CaseSummary, ChangeSet, Engine, EngineCase, MutationOutcome, SolveOptions, SolveOutcome,
};
use crate::error::{GatewayError, GatewayResult};

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No case is loaded.
    Empty,
    /// A case is loaded; no valid solution is stored.
    Loaded,
    /// The last solve converged and its solution is current.
    Solved,
    /// The last solve did not converge.
    Failed,
}

impl SessionStatus {
    /// The wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loaded => "loaded",
            Self::Solved => "solved",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single mutable session.
pub struct Session {
    engine: Box<dyn Engine>,
    case: Option<Box<dyn EngineCase>>,
    status: SessionStatus,
}

impl Session {
    /// Creates an empty session backed by the given engine.
    #[must_use]
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            engine,
            case: None,
            status: SessionStatus::Empty,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Identifier of the loaded case, if any.
    #[must_use]
    pub fn case_id(&self) -> Option<&str> {
        self.case.as_deref().map(|case| case.case_id())
    }

    /// Name of the backing engine.
    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Opens a case from a named source, replacing any loaded case.
    ///
    /// The previous handle is released before the new one is opened; a
    /// prior solution is discarded unconditionally. If the open fails the
    /// session is left Empty.
    pub fn load(&mut self, source: &str) -> GatewayResult<CaseSummary> {
        self.release();
        let case = self.engine.open(source)?;
        let summary = case.summary();
        info!(
            engine = self.engine.name(),
            case_id = %summary.case_id,
            buses = summary.bus_count,
            "case loaded"
        );
        self.case = Some(case);
        self.status = SessionStatus::Loaded;
        Ok(summary)
    }

    /// Runs the solution procedure on the loaded case.
    ///
    /// On convergence the session becomes Solved. On non-convergence the
    /// session becomes Failed and the call returns `ConvergenceError`;
    /// this is a recoverable outcome and the caller may solve again with
    /// different parameters.
    pub fn solve(&mut self, options: &SolveOptions) -> GatewayResult<SolveOutcome> {
        let status = self.status;
        let case = self
            .case
            .as_mut()
            .ok_or_else(|| precondition("solve", "loaded", status))?;
        let outcome = case.solve(options)?;
        if outcome.converged {
            self.status = SessionStatus::Solved;
            info!(
                iterations = outcome.iterations,
                max_mismatch_pu = outcome.max_mismatch_pu,
                "solve converged"
            );
            Ok(outcome)
        } else {
            self.status = SessionStatus::Failed;
            warn!(
                iterations = outcome.iterations,
                max_mismatch_pu = outcome.max_mismatch_pu,
                "solve did not converge"
            );
            Err(GatewayError::Convergence {
                iterations: outcome.iterations,
                max_mismatch_pu: outcome.max_mismatch_pu,
            })
        }
    }

    /// Applies numeric changes to a named element of the loaded case.
    ///
    /// Does not re-solve. If the engine reports that the change
    /// invalidates the stored solution, a Solved session reverts to
    /// Loaded.
    pub fn mutate(&mut self, target: &str, changes: &ChangeSet) -> GatewayResult<MutationOutcome> {
        let status = self.status;
        let case = self
            .case
            .as_mut()
            .ok_or_else(|| precondition("mutate", "loaded", status))?;
        let outcome = case.apply(target, changes)?;
        if outcome.invalidates_solution && self.status == SessionStatus::Solved {
            self.status = SessionStatus::Loaded;
        }
        info!(target, applied = ?outcome.applied, "element changed");
        Ok(outcome)
    }

    /// Releases the engine handle and resets to Empty. Safe to call
    /// repeatedly.
    pub fn release(&mut self) {
        if self.case.take().is_some() {
            info!("case released");
        }
        self.status = SessionStatus::Empty;
    }

    /// Read access to the loaded case for tools that work on any loaded
    /// session (Loaded, Solved or Failed).
    pub fn case(&self, operation: &str) -> GatewayResult<&dyn EngineCase> {
        self.case
            .as_deref()
            .ok_or_else(|| precondition(operation, "loaded", self.status))
    }

    /// Read access restricted to a Solved session, for result tools.
    pub fn solved_case(&self, operation: &str) -> GatewayResult<&dyn EngineCase> {
        if self.status != SessionStatus::Solved {
            return Err(precondition(operation, "solved", self.status));
        }
        self.case(operation)
    }

    /// Mutable access to the loaded case, for tools that run engine work
    /// without going through `solve`/`mutate` state transitions.
    pub fn case_mut(&mut self, operation: &str) -> GatewayResult<&mut Box<dyn EngineCase>> {
        let status = self.status;
        self.case
            .as_mut()
            .ok_or_else(|| precondition(operation, "loaded", status))
    }
}

fn precondition(operation: &str, required: &'static str, status: SessionStatus) -> GatewayError {
    GatewayError::Precondition {
        operation: operation.to_string(),
        required,
        status: status.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FeederEngine, SolveMethod};
    use crate::error::ErrorKind;

    fn options() -> SolveOptions {
        SolveOptions {
            method: SolveMethod::GaussSeidel,
            tolerance: 1e-8,
            max_iterations: 2000,
        }
    }

    fn session() -> Session {
        Session::new(Box::new(FeederEngine::new()))
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut session = session();
        assert_eq!(session.status(), SessionStatus::Empty);
        assert!(session.case_id().is_none());

        let summary = session.load("sample_case").unwrap();
        assert_eq!(summary.bus_count, 13);
        assert_eq!(session.status(), SessionStatus::Loaded);
        assert_eq!(session.case_id(), Some("sample_case"));

        session.solve(&options()).unwrap();
        assert_eq!(session.status(), SessionStatus::Solved);

        session.release();
        assert_eq!(session.status(), SessionStatus::Empty);
        session.release();
        assert_eq!(session.status(), SessionStatus::Empty);
    }

    #[test]
    fn solve_and_mutate_require_a_case() {
        let mut session = session();
        let err = session.solve(&options()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionError);

        let err = session.mutate("load_1", &ChangeSet::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionError);

        let err = session.solved_case("get_bus_voltages").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionError);
    }

    #[test]
    fn mutation_reverts_solved_to_loaded() {
        let mut session = session();
        session.load("sample_case").unwrap();
        session.solve(&options()).unwrap();

        let mut changes = ChangeSet::new();
        changes.insert("multiplier".to_string(), 1.5);
        let outcome = session.mutate("load_1", &changes).unwrap();
        assert!(outcome.invalidates_solution);
        assert_eq!(session.status(), SessionStatus::Loaded);
    }

    #[test]
    fn non_convergence_marks_failed_and_is_recoverable() {
        let mut session = session();
        session.load("sample_case").unwrap();

        let mut changes = ChangeSet::new();
        changes.insert("multiplier".to_string(), 10_000.0);
        session.mutate("load_1", &changes).unwrap();

        let err = session.solve(&options()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConvergenceError);
        assert_eq!(session.status(), SessionStatus::Failed);

        // Back the load off and retry without reloading.
        changes.insert("multiplier".to_string(), 1.0);
        session.mutate("load_1", &changes).unwrap();
        session.solve(&options()).unwrap();
        assert_eq!(session.status(), SessionStatus::Solved);
    }

    #[test]
    fn load_replaces_previous_handle_first() {
        let engine = FeederEngine::new();
        let gauge = engine.handle_gauge();
        let mut session = Session::new(Box::new(engine));

        for _ in 0..5 {
            session.load("sample_case").unwrap();
            assert_eq!(gauge.count(), 1);
        }
        let summary = session.load("two_bus").unwrap();
        assert_eq!(summary.bus_count, 2);
        assert_eq!(gauge.count(), 1);

        session.release();
        assert_eq!(gauge.count(), 0);
    }

    #[test]
    fn failed_load_leaves_session_empty() {
        let mut session = session();
        session.load("sample_case").unwrap();
        let err = session.load("missing.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(session.status(), SessionStatus::Empty);
        assert!(session.case_id().is_none());
    }
}
