//! The embedded feeder engine.
//!
//! A balanced positive-sequence power-flow backend for radial and lightly
//! meshed feeders: bus admittance matrix, Gauss-Seidel sweeps, branch
//! flows, and named-element mutation. It is the reference [`Engine`]
//! implementation; the dispatcher only ever sees the trait.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::cases::{self, BusKind, CaseDefinition};
use super::{
    CaseSummary, Cell, ChangeSet, Engine, EngineCase, EngineFault, MatrixKind, MatrixResult,
    MutationOutcome, Phasor, PowerTotals, ResultTable, SeriesOutcome, SeriesStep, SolveOptions,
    SolveOutcome, TableKind,
};

/// Voltage magnitudes outside this band mark a diverging sweep.
const VOLTAGE_FLOOR: f64 = 0.01;
const VOLTAGE_CEILING: f64 = 10.0;

/// Counts live case handles of one engine instance.
///
/// Useful for verifying that repeated load/replace cycles release the
/// previous handle before creating the next.
#[derive(Debug, Clone)]
pub struct HandleGauge(Arc<AtomicUsize>);

impl HandleGauge {
    /// Number of case handles currently alive.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct HandleGuard(Arc<AtomicUsize>);

impl HandleGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The embedded balanced-feeder power-flow backend.
pub struct FeederEngine {
    case_root: Option<PathBuf>,
    handles: Arc<AtomicUsize>,
}

impl FeederEngine {
    /// Creates an engine that resolves file sources relative to the
    /// process working directory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            case_root: None,
            handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates an engine that resolves relative file sources under `root`.
    #[must_use]
    pub fn with_case_root(root: impl Into<PathBuf>) -> Self {
        Self {
            case_root: Some(root.into()),
            handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a gauge observing this engine's live case handles.
    #[must_use]
    pub fn handle_gauge(&self) -> HandleGauge {
        HandleGauge(Arc::clone(&self.handles))
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let raw = PathBuf::from(source);
        match (&self.case_root, raw.is_relative()) {
            (Some(root), true) => root.join(raw),
            _ => raw,
        }
    }
}

impl Default for FeederEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for FeederEngine {
    fn name(&self) -> &'static str {
        "feeder"
    }

    fn open(&self, source: &str) -> Result<Box<dyn EngineCase>, EngineFault> {
        let definition = match cases::builtin(source) {
            Some(definition) => definition,
            None => {
                let path = self.resolve(source);
                if !path.exists() {
                    return Err(EngineFault::SourceMissing {
                        path: source.to_string(),
                    });
                }
                let text = std::fs::read_to_string(&path).map_err(|e| EngineFault::Backend {
                    message: format!("failed to read '{}': {e}", path.display()),
                    code: None,
                })?;
                serde_json::from_str(&text).map_err(|e| EngineFault::Malformed {
                    path: source.to_string(),
                    detail: e.to_string(),
                })?
            }
        };

        let case = FeederCase::build(source, definition, HandleGuard::acquire(&self.handles))?;
        Ok(Box::new(case))
    }
}

struct SweepResult {
    v: DVector<Complex64>,
    converged: bool,
    iterations: usize,
    max_mismatch_pu: f64,
}

/// One loaded feeder case: definition, admittance matrix, and (after a
/// convergent solve) the stored voltage solution.
#[derive(Debug)]
pub struct FeederCase {
    id: String,
    def: CaseDefinition,
    bus_pos: BTreeMap<usize, usize>,
    slack: usize,
    ybus: DMatrix<Complex64>,
    solution: Option<DVector<Complex64>>,
    _handle: HandleGuard,
}

impl FeederCase {
    fn build(
        source: &str,
        def: CaseDefinition,
        handle: HandleGuard,
    ) -> Result<Self, EngineFault> {
        if def.base_mva <= 0.0 {
            return Err(EngineFault::backend("base_mva must be positive"));
        }
        if def.buses.is_empty() {
            return Err(EngineFault::backend("case defines no buses"));
        }

        let mut bus_pos = BTreeMap::new();
        for (pos, bus) in def.buses.iter().enumerate() {
            if bus_pos.insert(bus.id, pos).is_some() {
                return Err(EngineFault::backend(format!("duplicate bus id {}", bus.id)));
            }
        }

        let slack_positions: Vec<usize> = def
            .buses
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == BusKind::Slack)
            .map(|(pos, _)| pos)
            .collect();
        let &[slack] = slack_positions.as_slice() else {
            return Err(EngineFault::backend(format!(
                "case must define exactly one slack bus, found {}",
                slack_positions.len()
            )));
        };

        for branch in &def.branches {
            for end in [branch.from_bus, branch.to_bus] {
                if !bus_pos.contains_key(&end) {
                    return Err(EngineFault::backend(format!(
                        "branch endpoint {end} is not a bus"
                    )));
                }
            }
            if branch.r_pu == 0.0 && branch.x_pu == 0.0 {
                return Err(EngineFault::backend(format!(
                    "branch {}-{} has zero series impedance",
                    branch.from_bus, branch.to_bus
                )));
            }
        }
        for load in &def.loads {
            if !bus_pos.contains_key(&load.bus) {
                return Err(EngineFault::backend(format!(
                    "load bus {} is not a bus",
                    load.bus
                )));
            }
        }
        for generator in &def.generators {
            if !bus_pos.contains_key(&generator.bus) {
                return Err(EngineFault::backend(format!(
                    "generator bus {} is not a bus",
                    generator.bus
                )));
            }
        }

        let ybus = build_ybus(&def, &bus_pos);

        Ok(Self {
            id: source.to_string(),
            def,
            bus_pos,
            slack,
            ybus,
            solution: None,
            _handle: handle,
        })
    }

    /// Per-unit complex injections at every bus, with all loads scaled by
    /// `scale` on top of their own multipliers.
    fn injections(&self, scale: f64) -> DVector<Complex64> {
        let n = self.def.buses.len();
        let mut s = DVector::from_element(n, Complex64::new(0.0, 0.0));
        for load in &self.def.loads {
            let pos = self.bus_pos[&load.bus];
            let factor = load.multiplier * scale / self.def.base_mva;
            s[pos] -= Complex64::new(load.p_mw * factor, load.q_mvar * factor);
        }
        for generator in &self.def.generators {
            let pos = self.bus_pos[&generator.bus];
            s[pos] += Complex64::new(
                generator.setpoint_mw / self.def.base_mva,
                generator.q_mvar / self.def.base_mva,
            );
        }
        s
    }

    fn sweep(&self, s: &DVector<Complex64>, options: &SolveOptions) -> SweepResult {
        let n = self.def.buses.len();
        let slack_v = self.def.buses[self.slack].voltage_setpoint_pu;
        let mut v = DVector::from_element(n, Complex64::new(1.0, 0.0));
        v[self.slack] = Complex64::new(slack_v, 0.0);

        let mut converged = false;
        let mut iterations = 0;
        'sweeps: for iter in 1..=options.max_iterations {
            iterations = iter;
            let mut max_dv = 0.0_f64;
            for i in 0..n {
                if i == self.slack {
                    continue;
                }
                let mut neighbor_sum = Complex64::new(0.0, 0.0);
                for j in 0..n {
                    if j != i {
                        neighbor_sum += self.ybus[(i, j)] * v[j];
                    }
                }
                let vi = v[i];
                let updated = (s[i].conj() / vi.conj() - neighbor_sum) / self.ybus[(i, i)];
                let magnitude = updated.norm();
                v[i] = updated;
                if !magnitude.is_finite()
                    || magnitude > VOLTAGE_CEILING
                    || magnitude < VOLTAGE_FLOOR
                {
                    break 'sweeps;
                }
                max_dv = max_dv.max((updated - vi).norm());
            }
            if max_dv < options.tolerance {
                converged = true;
                break;
            }
        }

        let max_mismatch_pu = self.max_mismatch(&v, s);
        SweepResult {
            v,
            converged,
            iterations,
            max_mismatch_pu,
        }
    }

    fn max_mismatch(&self, v: &DVector<Complex64>, s: &DVector<Complex64>) -> f64 {
        let mut worst = 0.0_f64;
        for i in 0..self.def.buses.len() {
            if i == self.slack {
                continue;
            }
            let mut flow = Complex64::new(0.0, 0.0);
            for j in 0..self.def.buses.len() {
                flow += self.ybus[(i, j)] * v[j];
            }
            let mismatch = (v[i] * flow.conj() - s[i]).norm();
            if mismatch.is_finite() {
                worst = worst.max(mismatch);
            } else {
                return f64::INFINITY;
            }
        }
        worst
    }

    /// Sending- and receiving-end complex power of one branch, per-unit.
    fn branch_power(
        &self,
        v: &DVector<Complex64>,
        branch: &cases::BranchDef,
    ) -> (Complex64, Complex64) {
        let from = self.bus_pos[&branch.from_bus];
        let to = self.bus_pos[&branch.to_bus];
        let series = Complex64::new(branch.r_pu, branch.x_pu).inv();
        let shunt = Complex64::new(0.0, branch.b_shunt_pu / 2.0);

        let i_from = (v[from] - v[to]) * series + v[from] * shunt;
        let i_to = (v[to] - v[from]) * series + v[to] * shunt;
        (v[from] * i_from.conj(), v[to] * i_to.conj())
    }

    fn stored_solution(&self) -> Result<&DVector<Complex64>, EngineFault> {
        self.solution
            .as_ref()
            .ok_or_else(|| EngineFault::backend("no stored solution"))
    }

    fn slack_power(&self, v: &DVector<Complex64>) -> Complex64 {
        let mut flow = Complex64::new(0.0, 0.0);
        for j in 0..self.def.buses.len() {
            flow += self.ybus[(self.slack, j)] * v[j];
        }
        v[self.slack] * flow.conj() * self.def.base_mva
    }

    fn apply_load_change(
        &mut self,
        target: &str,
        ordinal: usize,
        field: &str,
        value: f64,
    ) -> Result<(), EngineFault> {
        let load = ordinal
            .checked_sub(1)
            .and_then(|i| self.def.loads.get_mut(i))
            .ok_or_else(|| EngineFault::UnknownElement {
                target: target.to_string(),
            })?;
        match field {
            "multiplier" => {
                if value < 0.0 {
                    return Err(invalid(target, field, "must be non-negative"));
                }
                load.multiplier = value;
            }
            "p_mw" => {
                if value < 0.0 {
                    return Err(invalid(target, field, "must be non-negative"));
                }
                load.p_mw = value;
            }
            "q_mvar" => load.q_mvar = value,
            _ => return Err(invalid(target, field, "not an adjustable load field")),
        }
        Ok(())
    }

    fn apply_generator_change(
        &mut self,
        target: &str,
        ordinal: usize,
        field: &str,
        value: f64,
    ) -> Result<(), EngineFault> {
        let generator = ordinal
            .checked_sub(1)
            .and_then(|i| self.def.generators.get_mut(i))
            .ok_or_else(|| EngineFault::UnknownElement {
                target: target.to_string(),
            })?;
        match field {
            "setpoint_mw" => {
                if value < 0.0 {
                    return Err(invalid(target, field, "must be non-negative"));
                }
                generator.setpoint_mw = value;
            }
            "q_mvar" => generator.q_mvar = value,
            _ => return Err(invalid(target, field, "not an adjustable generator field")),
        }
        Ok(())
    }

    fn apply_bus_change(
        &mut self,
        target: &str,
        id: usize,
        field: &str,
        value: f64,
    ) -> Result<(), EngineFault> {
        let pos = *self
            .bus_pos
            .get(&id)
            .ok_or_else(|| EngineFault::UnknownElement {
                target: target.to_string(),
            })?;
        match field {
            "voltage_setpoint_pu" => {
                if self.def.buses[pos].kind != BusKind::Slack {
                    return Err(invalid(
                        target,
                        field,
                        "only the slack bus has an adjustable voltage setpoint",
                    ));
                }
                if !(value > 0.0 && value <= 2.0) {
                    return Err(invalid(target, field, "must lie in (0, 2] per-unit"));
                }
                self.def.buses[pos].voltage_setpoint_pu = value;
            }
            _ => return Err(invalid(target, field, "not an adjustable bus field")),
        }
        Ok(())
    }
}

fn invalid(target: &str, field: &str, reason: &str) -> EngineFault {
    EngineFault::InvalidValue {
        target: target.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl EngineCase for FeederCase {
    fn case_id(&self) -> &str {
        &self.id
    }

    fn summary(&self) -> CaseSummary {
        CaseSummary {
            case_id: self.id.clone(),
            bus_count: self.def.buses.len(),
            branch_count: self.def.branches.len(),
            generator_count: self.def.generators.len(),
            load_count: self.def.loads.len(),
            base_mva: self.def.base_mva,
        }
    }

    fn solve(&mut self, options: &SolveOptions) -> Result<SolveOutcome, EngineFault> {
        let s = self.injections(1.0);
        let result = self.sweep(&s, options);
        let outcome = SolveOutcome {
            converged: result.converged,
            iterations: result.iterations,
            max_mismatch_pu: result.max_mismatch_pu,
        };
        self.solution = result.converged.then_some(result.v);
        Ok(outcome)
    }

    fn apply(&mut self, target: &str, changes: &ChangeSet) -> Result<MutationOutcome, EngineFault> {
        for (field, value) in changes {
            if !value.is_finite() {
                return Err(invalid(target, field, "must be finite"));
            }
        }

        let mut applied = Vec::new();
        for (field, value) in changes {
            if let Some(ordinal) = parse_ordinal(target, "load_") {
                self.apply_load_change(target, ordinal, field, *value)?;
            } else if let Some(ordinal) = parse_ordinal(target, "gen_") {
                self.apply_generator_change(target, ordinal, field, *value)?;
            } else if let Some(id) = parse_ordinal(target, "bus_") {
                self.apply_bus_change(target, id, field, *value)?;
            } else {
                return Err(EngineFault::UnknownElement {
                    target: target.to_string(),
                });
            }
            applied.push(field.clone());
        }

        let invalidates_solution = !applied.is_empty();
        if invalidates_solution {
            self.solution = None;
        }
        Ok(MutationOutcome {
            applied,
            invalidates_solution,
        })
    }

    fn table(&self, kind: TableKind) -> Result<ResultTable, EngineFault> {
        let v = self.stored_solution()?;
        match kind {
            TableKind::BusVoltages => {
                let rows = self
                    .def
                    .buses
                    .iter()
                    .map(|bus| {
                        let phasor = v[self.bus_pos[&bus.id]];
                        vec![
                            ("bus".to_string(), Cell::Int(bus.id as i64)),
                            (
                                "kind".to_string(),
                                Cell::Text(
                                    match bus.kind {
                                        BusKind::Slack => "slack",
                                        BusKind::Pq => "pq",
                                    }
                                    .to_string(),
                                ),
                            ),
                            (
                                "voltage".to_string(),
                                Cell::Phasor(Phasor {
                                    magnitude: phasor.norm(),
                                    angle_deg: phasor.arg().to_degrees(),
                                }),
                            ),
                        ]
                    })
                    .collect();
                Ok(ResultTable {
                    name: "bus_voltages",
                    rows,
                })
            }
            TableKind::BranchFlows => {
                let base = self.def.base_mva;
                let rows = self
                    .def
                    .branches
                    .iter()
                    .enumerate()
                    .map(|(i, branch)| {
                        let (s_from, s_to) = self.branch_power(v, branch);
                        vec![
                            (
                                "branch".to_string(),
                                Cell::Text(format!("branch_{}", i + 1)),
                            ),
                            ("from_bus".to_string(), Cell::Int(branch.from_bus as i64)),
                            ("to_bus".to_string(), Cell::Int(branch.to_bus as i64)),
                            ("p_from_mw".to_string(), Cell::Float(s_from.re * base)),
                            ("q_from_mvar".to_string(), Cell::Float(s_from.im * base)),
                            ("p_to_mw".to_string(), Cell::Float(s_to.re * base)),
                            ("q_to_mvar".to_string(), Cell::Float(s_to.im * base)),
                            (
                                "loss_mw".to_string(),
                                Cell::Float((s_from + s_to).re * base),
                            ),
                        ]
                    })
                    .collect();
                Ok(ResultTable {
                    name: "branch_flows",
                    rows,
                })
            }
        }
    }

    fn totals(&self) -> Result<PowerTotals, EngineFault> {
        let v = self.stored_solution()?;
        let slack = self.slack_power(v);

        let mut load_p_mw = 0.0;
        let mut load_q_mvar = 0.0;
        for load in &self.def.loads {
            load_p_mw += load.p_mw * load.multiplier;
            load_q_mvar += load.q_mvar * load.multiplier;
        }

        let mut loss_p_mw = 0.0;
        for branch in &self.def.branches {
            let (s_from, s_to) = self.branch_power(v, branch);
            loss_p_mw += (s_from + s_to).re * self.def.base_mva;
        }

        Ok(PowerTotals {
            slack_p_mw: slack.re,
            slack_q_mvar: slack.im,
            load_p_mw,
            load_q_mvar,
            loss_p_mw,
        })
    }

    fn matrix(&self, kind: MatrixKind) -> Result<MatrixResult, EngineFault> {
        let n = self.def.buses.len();
        let dense = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| match kind {
                        MatrixKind::Conductance => self.ybus[(i, j)].re,
                        MatrixKind::Susceptance => self.ybus[(i, j)].im,
                    })
                    .collect()
            })
            .collect();
        Ok(MatrixResult {
            dimension: n,
            dense,
        })
    }

    fn run_series(
        &mut self,
        options: &SolveOptions,
        step_hours: f64,
        profile: &[f64],
    ) -> Result<SeriesOutcome, EngineFault> {
        let mut steps = Vec::with_capacity(profile.len());
        for (step, &scale) in profile.iter().enumerate() {
            if !(scale.is_finite() && scale >= 0.0) {
                return Err(invalid(
                    "profile",
                    &format!("profile[{step}]"),
                    "must be a non-negative finite number",
                ));
            }
            let s = self.injections(scale);
            let result = self.sweep(&s, options);

            let (slack_p_mw, slack_q_mvar, min_voltage_pu, max_voltage_pu) = if result.converged {
                let slack = self.slack_power(&result.v);
                let mut min_v = f64::INFINITY;
                let mut max_v = f64::NEG_INFINITY;
                for i in 0..self.def.buses.len() {
                    let magnitude = result.v[i].norm();
                    min_v = min_v.min(magnitude);
                    max_v = max_v.max(magnitude);
                }
                (slack.re, slack.im, min_v, max_v)
            } else {
                (f64::NAN, f64::NAN, f64::NAN, f64::NAN)
            };

            steps.push(SeriesStep {
                step,
                hour: step as f64 * step_hours,
                scale,
                converged: result.converged,
                iterations: result.iterations,
                slack_p_mw,
                slack_q_mvar,
                min_voltage_pu,
                max_voltage_pu,
            });
        }
        Ok(SeriesOutcome { steps })
    }

    fn snapshot(&self) -> Result<String, EngineFault> {
        serde_json::to_string_pretty(&self.def).map_err(|e| EngineFault::Backend {
            message: format!("failed to serialize case definition: {e}"),
            code: None,
        })
    }
}

fn parse_ordinal(target: &str, prefix: &str) -> Option<usize> {
    target.strip_prefix(prefix)?.parse().ok()
}

fn build_ybus(def: &CaseDefinition, bus_pos: &BTreeMap<usize, usize>) -> DMatrix<Complex64> {
    let n = def.buses.len();
    let mut ybus = DMatrix::from_element(n, n, Complex64::new(0.0, 0.0));
    for branch in &def.branches {
        let from = bus_pos[&branch.from_bus];
        let to = bus_pos[&branch.to_bus];
        let series = Complex64::new(branch.r_pu, branch.x_pu).inv();
        let shunt = Complex64::new(0.0, branch.b_shunt_pu / 2.0);

        ybus[(from, from)] += series + shunt;
        ybus[(to, to)] += series + shunt;
        ybus[(from, to)] -= series;
        ybus[(to, from)] -= series;
    }
    ybus
}
