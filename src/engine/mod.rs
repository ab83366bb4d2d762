//! The engine seam.
//!
//! A backend exposes itself through two traits: [`Engine`], the stateless
//! case factory, and [`EngineCase`], the exclusively owned handle to one
//! loaded case. The dispatcher and session never name a concrete backend;
//! everything they need flows through these traits and the native result
//! types below, which only the marshaler may convert into payload values.

mod cases;
mod feeder;

pub use cases::{BranchDef, BusDef, BusKind, CaseDefinition, GeneratorDef, LoadDef};
pub use feeder::{FeederEngine, HandleGauge};

use std::collections::BTreeMap;

use thiserror::Error;

/// Failures raised inside a backend, before translation into the
/// caller-visible taxonomy.
#[derive(Debug, Error)]
pub enum EngineFault {
    /// The case source does not exist.
    #[error("case source not found: {path}")]
    SourceMissing {
        /// The path or source name.
        path: String,
    },

    /// The case source exists but cannot be understood.
    #[error("malformed case '{path}': {detail}")]
    Malformed {
        /// The path or source name.
        path: String,
        /// What was wrong.
        detail: String,
    },

    /// A mutation target does not resolve.
    #[error("unknown element: {target}")]
    UnknownElement {
        /// The unresolved identifier.
        target: String,
    },

    /// A change violates a declared domain.
    #[error("invalid value for '{field}' on '{target}': {reason}")]
    InvalidValue {
        /// The element being changed.
        target: String,
        /// The field involved.
        field: String,
        /// The violated constraint.
        reason: String,
    },

    /// Anything else the backend reports.
    #[error("{message}")]
    Backend {
        /// The backend's message, preserved verbatim.
        message: String,
        /// Numeric reason code, when available.
        code: Option<i32>,
    },
}

impl EngineFault {
    /// Builds an opaque backend fault.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            code: None,
        }
    }
}

/// Lightweight structural summary of a loaded case. This, not the native
/// case object, is what `load` returns to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSummary {
    /// Identifier of the loaded case.
    pub case_id: String,
    /// Number of buses.
    pub bus_count: usize,
    /// Number of branches.
    pub branch_count: usize,
    /// Number of generators.
    pub generator_count: usize,
    /// Number of loads.
    pub load_count: usize,
    /// System base power in MVA.
    pub base_mva: f64,
}

/// Solution method requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMethod {
    /// Gauss-Seidel sweeps against the bus admittance matrix.
    GaussSeidel,
}

impl SolveMethod {
    /// Parses the wire name of a method. `default` selects the engine's
    /// standard method.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "gauss_seidel" | "default" => Some(Self::GaussSeidel),
            _ => None,
        }
    }

    /// The wire name of this method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GaussSeidel => "gauss_seidel",
        }
    }
}

/// Numeric and algorithmic parameters for one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOptions {
    /// Solution method.
    pub method: SolveMethod,
    /// Largest per-unit voltage update accepted as converged.
    pub tolerance: f64,
    /// Iteration budget before the solve is declared non-convergent.
    pub max_iterations: usize,
}

/// Convergence metadata for one solve. Non-convergence is an expected
/// outcome, reported here rather than as a fault.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// Whether the stopping criterion was met.
    pub converged: bool,
    /// Iterations performed.
    pub iterations: usize,
    /// Largest remaining power mismatch in per-unit.
    pub max_mismatch_pu: f64,
}

/// Acknowledgement of an applied mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// Fields that were changed, in application order.
    pub applied: Vec<String>,
    /// Whether the change invalidates a previously computed solution.
    pub invalidates_solution: bool,
}

/// A complex electrical quantity in polar form. Magnitudes are per-unit;
/// angles are degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phasor {
    /// Magnitude in per-unit.
    pub magnitude: f64,
    /// Angle in degrees.
    pub angle_deg: f64,
}

/// One native cell of a tabular result.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// An integer quantity (bus number, count).
    Int(i64),
    /// A real quantity; the column name carries the unit.
    Float(f64),
    /// A name or label.
    Text(String),
    /// A complex quantity, split by the marshaler into magnitude and angle.
    Phasor(Phasor),
}

/// A tabular result: ordered rows of ordered (column, cell) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    /// Table name, used in logs only.
    pub name: &'static str,
    /// Rows in engine order.
    pub rows: Vec<Vec<(String, Cell)>>,
}

/// Result-table categories a case can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Per-bus voltage phasors.
    BusVoltages,
    /// Per-branch power flows and losses.
    BranchFlows,
}

/// Matrix categories a case can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKind {
    /// Real part of the bus admittance matrix, per-unit.
    Conductance,
    /// Imaginary part of the bus admittance matrix, per-unit.
    Susceptance,
}

impl MatrixKind {
    /// Parses the wire name of a matrix kind.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "conductance" => Some(Self::Conductance),
            "susceptance" => Some(Self::Susceptance),
            _ => None,
        }
    }

    /// The wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Conductance => "conductance",
            Self::Susceptance => "susceptance",
        }
    }
}

/// A dense square matrix result in per-unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixResult {
    /// Row/column dimension.
    pub dimension: usize,
    /// Row-major dense entries.
    pub dense: Vec<Vec<f64>>,
}

/// System-level power totals after a solve.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerTotals {
    /// Active power injected at the slack bus, MW.
    pub slack_p_mw: f64,
    /// Reactive power injected at the slack bus, MVAr.
    pub slack_q_mvar: f64,
    /// Total scaled load active power, MW.
    pub load_p_mw: f64,
    /// Total scaled load reactive power, MVAr.
    pub load_q_mvar: f64,
    /// Total series losses, MW.
    pub loss_p_mw: f64,
}

/// One step of a time-series run.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStep {
    /// Zero-based step index.
    pub step: usize,
    /// Hour offset from the start of the run.
    pub hour: f64,
    /// Load scale factor applied for this step.
    pub scale: f64,
    /// Whether this step's solve converged.
    pub converged: bool,
    /// Iterations taken by this step's solve.
    pub iterations: usize,
    /// Slack active power for this step, MW.
    pub slack_p_mw: f64,
    /// Slack reactive power for this step, MVAr.
    pub slack_q_mvar: f64,
    /// Lowest bus voltage magnitude, per-unit.
    pub min_voltage_pu: f64,
    /// Highest bus voltage magnitude, per-unit.
    pub max_voltage_pu: f64,
}

/// The full outcome of a time-series run. The case's stored single-shot
/// solution is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesOutcome {
    /// One entry per step, in order.
    pub steps: Vec<SeriesStep>,
}

/// Numeric element changes, keyed by field name.
pub type ChangeSet = BTreeMap<String, f64>;

/// A stateless backend able to open cases.
pub trait Engine: Send {
    /// Backend name, used in logs and the session banner.
    fn name(&self) -> &'static str;

    /// Opens a case from a named source (built-in name or file path).
    fn open(&self, source: &str) -> Result<Box<dyn EngineCase>, EngineFault>;
}

/// The exclusively owned handle to one loaded case.
///
/// Handles are not safe for concurrent use; the session owns exactly one
/// and the runtime serializes access to it.
pub trait EngineCase: Send + std::fmt::Debug {
    /// Identifier of this case.
    fn case_id(&self) -> &str;

    /// Structural summary.
    fn summary(&self) -> CaseSummary;

    /// Runs the solution procedure. Non-convergence is reported in the
    /// outcome, not as a fault.
    fn solve(&mut self, options: &SolveOptions) -> Result<SolveOutcome, EngineFault>;

    /// Applies numeric changes to a named element.
    fn apply(&mut self, target: &str, changes: &ChangeSet) -> Result<MutationOutcome, EngineFault>;

    /// Produces a tabular result. Requires a stored solution.
    fn table(&self, kind: TableKind) -> Result<ResultTable, EngineFault>;

    /// Produces system power totals. Requires a stored solution.
    fn totals(&self) -> Result<PowerTotals, EngineFault>;

    /// Produces a matrix result. Available as soon as the case is loaded.
    fn matrix(&self, kind: MatrixKind) -> Result<MatrixResult, EngineFault>;

    /// Runs one scaled solve per profile entry without disturbing the
    /// stored solution.
    fn run_series(
        &mut self,
        options: &SolveOptions,
        step_hours: f64,
        profile: &[f64],
    ) -> Result<SeriesOutcome, EngineFault>;

    /// Serializes the current case definition (including applied
    /// mutations) for the run directory's input snapshot.
    fn snapshot(&self) -> Result<String, EngineFault>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parsing() {
        assert_eq!(SolveMethod::parse("gauss_seidel"), Some(SolveMethod::GaussSeidel));
        assert_eq!(SolveMethod::parse("default"), Some(SolveMethod::GaussSeidel));
        assert_eq!(SolveMethod::parse("newton"), None);
    }

    #[test]
    fn matrix_kind_parsing() {
        assert_eq!(MatrixKind::parse("conductance"), Some(MatrixKind::Conductance));
        assert_eq!(MatrixKind::parse("susceptance"), Some(MatrixKind::Susceptance));
        assert_eq!(MatrixKind::parse("jacobian"), None);
    }

    #[test]
    fn fault_messages() {
        let fault = EngineFault::InvalidValue {
            target: "load_2".to_string(),
            field: "multiplier".to_string(),
            reason: "must be non-negative".to_string(),
        };
        let msg = format!("{fault}");
        assert!(msg.contains("load_2"));
        assert!(msg.contains("multiplier"));
    }
}
