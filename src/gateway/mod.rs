//! The tool dispatcher.
//!
//! [`Gateway`] owns the session, the artifact store and the tool catalog,
//! and exposes exactly one operation to the outside: `invoke`. Every tool
//! is a data-declared [`ToolEntry`] (descriptor plus handler function);
//! adding a tool adds an entry, never a new code path through the
//! dispatcher. All errors are translated at this boundary and returned as
//! a typed failure, never re-raised.

mod runtime;

pub use runtime::{GatewayRuntime, InvocationHandle};

use std::time::Instant;

use tracing::{info, info_span, warn};

use crate::artifact::{ArtifactStore, INPUT_FILE, LOG_FILE, RESULTS_FILE};
use crate::catalog::{ParamKind, ParamSpec, SideEffect, ToolArgs, ToolCatalog, ToolDescriptor};
use crate::config::{GatewayConfig, SolverDefaults};
use crate::engine::{
    ChangeSet, Engine, FeederEngine, MatrixKind, SolveMethod, SolveOptions, TableKind,
};
use crate::error::{GatewayError, GatewayResult};
use crate::ir::{InvocationResult, ToolRequest};
use crate::marshal;
use crate::plot;
use crate::session::Session;
use crate::value::{FieldMap, Value};

/// Hard cap on time-series length (one year of hourly steps).
const MAX_SERIES_STEPS: usize = 8760;

/// Handler signature shared by every tool.
type Handler = fn(&mut Gateway, &ToolArgs) -> GatewayResult<FieldMap>;

/// One catalog entry: the public descriptor plus its handler.
struct ToolEntry {
    descriptor: ToolDescriptor,
    handler: Handler,
}

/// The gateway: one session, one artifact store, one fixed tool catalog.
pub struct Gateway {
    entries: Vec<ToolEntry>,
    catalog: ToolCatalog,
    session: Session,
    artifacts: ArtifactStore,
    defaults: SolverDefaults,
}

impl Gateway {
    /// Builds a gateway over the embedded feeder engine.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let engine: Box<dyn Engine> = Box::new(match &config.case_root {
            Some(root) => FeederEngine::with_case_root(root),
            None => FeederEngine::new(),
        });
        Self::with_engine(engine, config)
    }

    /// Builds a gateway over an arbitrary engine implementation.
    pub fn with_engine(engine: Box<dyn Engine>, config: &GatewayConfig) -> GatewayResult<Self> {
        let artifacts = ArtifactStore::open(config.artifact_root.clone())?;
        let entries = Self::build_entries();
        let catalog = ToolCatalog::new(entries.iter().map(|e| e.descriptor.clone()).collect());
        let session = Session::new(engine);
        info!(
            engine = session.engine_name(),
            tools = entries.len(),
            artifact_root = %artifacts.root().display(),
            "gateway ready"
        );
        Ok(Self {
            entries,
            catalog,
            session,
            artifacts,
            defaults: config.solver.clone(),
        })
    }

    /// The public tool catalog.
    #[must_use]
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Read access to the session, for hosts that report status.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Invokes a tool by name. Exactly one result is produced per call;
    /// every failure carries a kind from the closed taxonomy.
    pub fn invoke(&mut self, tool: &str, arguments: &FieldMap) -> InvocationResult {
        match self.dispatch(tool, arguments) {
            Ok(payload) => InvocationResult::success(payload),
            Err(err) => {
                warn!(tool, kind = %err.kind(), error = %err, "invocation failed");
                InvocationResult::failure(&err)
            }
        }
    }

    /// Handles a full request envelope, tracing under its request id.
    pub fn handle(&mut self, request: &ToolRequest) -> InvocationResult {
        let span = info_span!("invoke", tool = %request.tool, request_id = %request.request_id);
        let _guard = span.enter();
        self.invoke(&request.tool, &request.arguments)
    }

    fn dispatch(&mut self, tool: &str, arguments: &FieldMap) -> GatewayResult<FieldMap> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.descriptor.name == tool)
            .ok_or_else(|| GatewayError::UnknownTool {
                name: tool.to_string(),
            })?;
        let args = entry.descriptor.validate(arguments)?;
        let handler = entry.handler;
        handler(self, &args)
    }

    // ------------------------------------------------------------------
    // Tool handlers. Each corresponds to one catalog entry below.
    // ------------------------------------------------------------------

    fn tool_load_case(&mut self, args: &ToolArgs) -> GatewayResult<FieldMap> {
        let source = args.str_arg("source")?;
        let summary = self.session.load(source)?;
        Ok(marshal::summary_payload(&summary))
    }

    fn tool_get_case_info(&mut self, _args: &ToolArgs) -> GatewayResult<FieldMap> {
        let case = self.session.case("get_case_info")?;
        Ok(marshal::summary_payload(&case.summary()))
    }

    fn tool_session_status(&mut self, _args: &ToolArgs) -> GatewayResult<FieldMap> {
        let mut payload = FieldMap::new();
        payload.insert(
            "status".to_string(),
            Value::from(self.session.status().as_str()),
        );
        payload.insert(
            "case_id".to_string(),
            self.session
                .case_id()
                .map_or(Value::Null, Value::from),
        );
        payload.insert(
            "engine".to_string(),
            Value::from(self.session.engine_name()),
        );
        Ok(payload)
    }

    fn tool_release_case(&mut self, _args: &ToolArgs) -> GatewayResult<FieldMap> {
        self.session.release();
        let mut payload = FieldMap::new();
        payload.insert("released".to_string(), Value::Bool(true));
        Ok(payload)
    }

    fn tool_solve_power_flow(&mut self, args: &ToolArgs) -> GatewayResult<FieldMap> {
        let options = self.solve_options(args, "solve_power_flow")?;
        let started = Instant::now();
        let outcome = self.session.solve(&options)?;
        let elapsed_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
        Ok(marshal::solve_payload(&outcome, elapsed_ms))
    }

    fn tool_set_element(&mut self, args: &ToolArgs) -> GatewayResult<FieldMap> {
        let target = args.str_arg("target")?;
        let raw_changes = args.map_arg("changes")?;
        if raw_changes.is_empty() {
            return Err(GatewayError::InvalidValue {
                target: target.to_string(),
                field: "changes".to_string(),
                reason: "at least one change is required".to_string(),
            });
        }

        let mut changes = ChangeSet::new();
        for (field, value) in raw_changes {
            let number = value
                .as_float()
                .ok_or_else(|| GatewayError::TypeMismatch {
                    tool: "set_element".to_string(),
                    name: format!("changes.{field}"),
                    expected: "number",
                    actual: value.type_name().to_string(),
                })?;
            changes.insert(field.clone(), number);
        }

        let outcome = self.session.mutate(target, &changes)?;
        let mut payload = FieldMap::new();
        payload.insert("target".to_string(), Value::from(target));
        payload.insert(
            "applied".to_string(),
            Value::List(outcome.applied.iter().map(|f| Value::from(f.as_str())).collect()),
        );
        payload.insert(
            "solution_invalidated".to_string(),
            Value::Bool(outcome.invalidates_solution),
        );
        payload.insert(
            "status".to_string(),
            Value::from(self.session.status().as_str()),
        );
        Ok(payload)
    }

    fn tool_get_bus_voltages(&mut self, _args: &ToolArgs) -> GatewayResult<FieldMap> {
        let case = self.session.solved_case("get_bus_voltages")?;
        let table = case.table(TableKind::BusVoltages)?;
        let mut payload = FieldMap::new();
        payload.insert("count".to_string(), Value::Int(table.rows.len() as i64));
        payload.insert("rows".to_string(), marshal::table_rows(&table));
        Ok(payload)
    }

    fn tool_get_branch_flows(&mut self, _args: &ToolArgs) -> GatewayResult<FieldMap> {
        let case = self.session.solved_case("get_branch_flows")?;
        let table = case.table(TableKind::BranchFlows)?;
        let mut payload = FieldMap::new();
        payload.insert("count".to_string(), Value::Int(table.rows.len() as i64));
        payload.insert("rows".to_string(), marshal::table_rows(&table));
        Ok(payload)
    }

    fn tool_get_total_power(&mut self, _args: &ToolArgs) -> GatewayResult<FieldMap> {
        let case = self.session.solved_case("get_total_power")?;
        Ok(marshal::totals_payload(&case.totals()?))
    }

    fn tool_get_matrix(&mut self, args: &ToolArgs) -> GatewayResult<FieldMap> {
        let kind_name = args.str_arg("kind")?;
        let kind = MatrixKind::parse(kind_name).ok_or_else(|| GatewayError::InvalidValue {
            target: "get_matrix".to_string(),
            field: "kind".to_string(),
            reason: format!("unknown matrix kind '{kind_name}' (expected conductance or susceptance)"),
        })?;
        let full = args.bool_arg("full")?;
        let case = self.session.case("get_matrix")?;
        let matrix = case.matrix(kind)?;
        Ok(marshal::matrix_payload(&matrix, kind.as_str(), full))
    }

    fn tool_run_time_series(&mut self, args: &ToolArgs) -> GatewayResult<FieldMap> {
        let steps = args.usize_arg("steps")?;
        if steps == 0 || steps > MAX_SERIES_STEPS {
            return Err(GatewayError::InvalidValue {
                target: "run_time_series".to_string(),
                field: "steps".to_string(),
                reason: format!("must lie in 1..={MAX_SERIES_STEPS}"),
            });
        }
        let step_hours = args.f64_arg("step_hours")?;
        if !(step_hours.is_finite() && step_hours > 0.0) {
            return Err(GatewayError::InvalidValue {
                target: "run_time_series".to_string(),
                field: "step_hours".to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        let profile = match args.opt("profile") {
            Some(value) => {
                let raw = value.as_list().unwrap_or_default();
                if raw.len() != steps {
                    return Err(GatewayError::InvalidValue {
                        target: "run_time_series".to_string(),
                        field: "profile".to_string(),
                        reason: format!("expected {steps} entries, got {}", raw.len()),
                    });
                }
                let mut profile = Vec::with_capacity(raw.len());
                for (i, entry) in raw.iter().enumerate() {
                    let scale = entry.as_float().ok_or_else(|| GatewayError::TypeMismatch {
                        tool: "run_time_series".to_string(),
                        name: format!("profile[{i}]"),
                        expected: "number",
                        actual: entry.type_name().to_string(),
                    })?;
                    profile.push(scale);
                }
                profile
            }
            None => default_profile(steps),
        };

        let options = SolveOptions {
            method: SolveMethod::GaussSeidel,
            tolerance: self.defaults.tolerance,
            max_iterations: self.defaults.max_iterations,
        };

        let case = self.session.case_mut("run_time_series")?;
        let outcome = case.run_series(&options, step_hours, &profile)?;
        let snapshot = case.snapshot()?;

        let run = self.artifacts.begin_run()?;
        run.write(INPUT_FILE, snapshot.as_bytes())?;
        run.write(RESULTS_FILE, &series_csv(&outcome)?)?;
        run.write(LOG_FILE, series_log(&outcome).as_bytes())?;

        let converged_steps = outcome.steps.iter().filter(|s| s.converged).count();
        info!(
            run_id = run.id(),
            steps,
            converged_steps,
            "time series completed"
        );

        let mut payload = FieldMap::new();
        payload.insert("run_id".to_string(), Value::from(run.id()));
        payload.insert("steps".to_string(), Value::Int(steps as i64));
        payload.insert(
            "converged_steps".to_string(),
            Value::Int(converged_steps as i64),
        );
        payload.insert(
            "files".to_string(),
            Value::List(run.list()?.into_iter().map(Value::from).collect()),
        );
        Ok(payload)
    }

    fn tool_render_plot(&mut self, args: &ToolArgs) -> GatewayResult<FieldMap> {
        let run_id = args.str_arg("run_id")?;
        let raw_columns = args.list_arg("columns")?;
        if raw_columns.is_empty() {
            return Err(GatewayError::InvalidValue {
                target: "render_plot".to_string(),
                field: "columns".to_string(),
                reason: "at least one column is required".to_string(),
            });
        }
        let mut columns = Vec::with_capacity(raw_columns.len());
        for (i, entry) in raw_columns.iter().enumerate() {
            let name = entry.as_str().ok_or_else(|| GatewayError::TypeMismatch {
                tool: "render_plot".to_string(),
                name: format!("columns[{i}]"),
                expected: "string",
                actual: entry.type_name().to_string(),
            })?;
            columns.push(name.to_string());
        }

        let run = self.artifacts.run(run_id)?;
        let csv_text = run.read_to_string(RESULTS_FILE)?;
        let rendered = plot::render_series_plot(&csv_text, &columns)?;
        let file_name = plot::plot_file_name(&columns);
        run.write(&file_name, rendered.svg.as_bytes())?;

        let mut payload = FieldMap::new();
        payload.insert("run_id".to_string(), Value::from(run_id));
        payload.insert("plot_file".to_string(), Value::from(file_name));
        payload.insert("points".to_string(), Value::Int(rendered.points as i64));
        Ok(payload)
    }

    fn tool_read_run_log(&mut self, args: &ToolArgs) -> GatewayResult<FieldMap> {
        let run_id = args.str_arg("run_id")?;
        let run = self.artifacts.run(run_id)?;
        let content = run.read_to_string(LOG_FILE)?;
        let mut payload = FieldMap::new();
        payload.insert("run_id".to_string(), Value::from(run_id));
        payload.insert("log_content".to_string(), Value::from(content));
        Ok(payload)
    }

    fn tool_list_runs(&mut self, _args: &ToolArgs) -> GatewayResult<FieldMap> {
        let runs = self.artifacts.list_runs()?;
        let mut payload = FieldMap::new();
        payload.insert("count".to_string(), Value::Int(runs.len() as i64));
        payload.insert(
            "runs".to_string(),
            Value::List(runs.into_iter().map(Value::from).collect()),
        );
        Ok(payload)
    }

    fn tool_list_tools(&mut self, _args: &ToolArgs) -> GatewayResult<FieldMap> {
        let tools = self
            .catalog
            .descriptors()
            .iter()
            .map(|descriptor| {
                let mut entry = FieldMap::new();
                entry.insert("name".to_string(), Value::from(descriptor.name));
                entry.insert("doc".to_string(), Value::from(descriptor.doc));
                entry.insert("returns".to_string(), Value::from(descriptor.returns));
                entry.insert(
                    "side_effect".to_string(),
                    Value::from(descriptor.side_effect.as_str()),
                );
                entry.insert(
                    "params".to_string(),
                    Value::List(
                        descriptor
                            .params
                            .iter()
                            .map(|param| {
                                let mut spec = FieldMap::new();
                                spec.insert("name".to_string(), Value::from(param.name));
                                spec.insert("kind".to_string(), Value::from(param.kind.as_str()));
                                spec.insert("required".to_string(), Value::Bool(param.required));
                                spec.insert("doc".to_string(), Value::from(param.doc));
                                if let Some(default) = &param.default {
                                    spec.insert("default".to_string(), default.clone());
                                }
                                Value::Map(spec)
                            })
                            .collect(),
                    ),
                );
                Value::Map(entry)
            })
            .collect::<Vec<_>>();

        let mut payload = FieldMap::new();
        payload.insert("count".to_string(), Value::Int(tools.len() as i64));
        payload.insert("tools".to_string(), Value::List(tools));
        Ok(payload)
    }

    fn solve_options(&self, args: &ToolArgs, tool: &str) -> GatewayResult<SolveOptions> {
        let method_name = args.str_arg("method")?;
        let method = SolveMethod::parse(method_name).ok_or_else(|| GatewayError::InvalidValue {
            target: tool.to_string(),
            field: "method".to_string(),
            reason: format!("unknown method '{method_name}' (expected gauss_seidel or default)"),
        })?;

        let tolerance = match args.opt("tolerance").and_then(Value::as_float) {
            Some(tolerance) => tolerance,
            None => self.defaults.tolerance,
        };
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(GatewayError::InvalidValue {
                target: tool.to_string(),
                field: "tolerance".to_string(),
                reason: "must be a positive number".to_string(),
            });
        }

        let max_iterations = match args.opt("max_iterations").and_then(Value::as_int) {
            Some(n) if n >= 1 => n as usize,
            Some(_) => {
                return Err(GatewayError::InvalidValue {
                    target: tool.to_string(),
                    field: "max_iterations".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            None => self.defaults.max_iterations,
        };

        Ok(SolveOptions {
            method,
            tolerance,
            max_iterations,
        })
    }

    /// The catalog, one data-declared entry per tool.
    fn build_entries() -> Vec<ToolEntry> {
        vec![
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "load_case",
                    doc: "Open a case from a built-in name or a JSON case file, replacing any loaded case.",
                    params: vec![ParamSpec::required(
                        "source",
                        ParamKind::String,
                        "Built-in case name (sample_case, two_bus) or path to a JSON case file.",
                    )],
                    returns: "case summary: case_id, bus_count, branch_count, generator_count, load_count, base_mva",
                    side_effect: SideEffect::MutatesSession,
                },
                handler: Self::tool_load_case,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "get_case_info",
                    doc: "Summarize the loaded case.",
                    params: vec![],
                    returns: "case summary (same shape as load_case)",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_get_case_info,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "session_status",
                    doc: "Report the session lifecycle state.",
                    params: vec![],
                    returns: "status (empty|loaded|solved|failed), case_id, engine",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_session_status,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "release_case",
                    doc: "Release the loaded case and reset the session to empty.",
                    params: vec![],
                    returns: "released: true",
                    side_effect: SideEffect::MutatesSession,
                },
                handler: Self::tool_release_case,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "solve_power_flow",
                    doc: "Run the power-flow solution on the loaded case.",
                    params: vec![
                        ParamSpec::with_default(
                            "method",
                            ParamKind::String,
                            Value::String(String::from("gauss_seidel")),
                            "Solution method: gauss_seidel (alias: default).",
                        ),
                        ParamSpec::optional(
                            "tolerance",
                            ParamKind::Number,
                            "Convergence tolerance on the largest per-unit voltage update.",
                        ),
                        ParamSpec::optional(
                            "max_iterations",
                            ParamKind::Integer,
                            "Iteration budget before the solve is declared non-convergent.",
                        ),
                    ],
                    returns: "converged, iterations, max_mismatch_pu, elapsed_ms",
                    side_effect: SideEffect::MutatesSession,
                },
                handler: Self::tool_solve_power_flow,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "set_element",
                    doc: "Apply numeric changes to a named element (load_N, gen_N, bus_N) of the loaded case.",
                    params: vec![
                        ParamSpec::required(
                            "target",
                            ParamKind::String,
                            "Element identifier, e.g. load_1.",
                        ),
                        ParamSpec::required(
                            "changes",
                            ParamKind::Object,
                            "Field-to-number mapping, e.g. {\"multiplier\": 1.5}.",
                        ),
                    ],
                    returns: "target, applied, solution_invalidated, status",
                    side_effect: SideEffect::MutatesSession,
                },
                handler: Self::tool_set_element,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "get_bus_voltages",
                    doc: "Per-bus voltage phasors of the solved case.",
                    params: vec![],
                    returns: "rows of bus, kind, voltage_pu, voltage_deg",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_get_bus_voltages,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "get_branch_flows",
                    doc: "Per-branch power flows and losses of the solved case.",
                    params: vec![],
                    returns: "rows of branch, from_bus, to_bus, p_from_mw, q_from_mvar, p_to_mw, q_to_mvar, loss_mw",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_get_branch_flows,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "get_total_power",
                    doc: "System power totals of the solved case.",
                    params: vec![],
                    returns: "slack_p_mw, slack_q_mvar, load_p_mw, load_q_mvar, loss_p_mw",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_get_total_power,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "get_matrix",
                    doc: "Bus admittance matrix components of the loaded case.",
                    params: vec![
                        ParamSpec::required(
                            "kind",
                            ParamKind::String,
                            "conductance or susceptance.",
                        ),
                        ParamSpec::with_default(
                            "full",
                            ParamKind::Bool,
                            Value::Bool(false),
                            "true for dense nested rows, false for sparse (row, column, value) triples.",
                        ),
                    ],
                    returns: "kind, dimension, units, representation, matrix|entries",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_get_matrix,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "run_time_series",
                    doc: "Solve the loaded case over a load profile and write the run's artifacts.",
                    params: vec![
                        ParamSpec::with_default(
                            "steps",
                            ParamKind::Integer,
                            Value::Int(24),
                            "Number of steps.",
                        ),
                        ParamSpec::with_default(
                            "step_hours",
                            ParamKind::Number,
                            Value::Float(1.0),
                            "Hours per step.",
                        ),
                        ParamSpec::optional(
                            "profile",
                            ParamKind::List,
                            "Load scale factor per step; defaults to a valley-peak-valley day.",
                        ),
                    ],
                    returns: "run_id, steps, converged_steps, files",
                    side_effect: SideEffect::ProducesArtifacts,
                },
                handler: Self::tool_run_time_series,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "render_plot",
                    doc: "Render selected result columns of a past run as an SVG plot.",
                    params: vec![
                        ParamSpec::required("run_id", ParamKind::String, "Run directory id."),
                        ParamSpec::required(
                            "columns",
                            ParamKind::List,
                            "Column names from results.csv, e.g. slack_p_mw.",
                        ),
                    ],
                    returns: "run_id, plot_file, points",
                    side_effect: SideEffect::ProducesArtifacts,
                },
                handler: Self::tool_render_plot,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "read_run_log",
                    doc: "Read a past run's solver log.",
                    params: vec![ParamSpec::required(
                        "run_id",
                        ParamKind::String,
                        "Run directory id.",
                    )],
                    returns: "run_id, log_content",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_read_run_log,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "list_runs",
                    doc: "List all run directory ids, oldest first.",
                    params: vec![],
                    returns: "count, runs",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_list_runs,
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "list_tools",
                    doc: "Describe the tool catalog.",
                    params: vec![],
                    returns: "count, tools",
                    side_effect: SideEffect::ReadOnly,
                },
                handler: Self::tool_list_tools,
            },
        ]
    }
}

/// The default daily load shape: valley at both ends, peak in the middle.
fn default_profile(steps: usize) -> Vec<f64> {
    if steps <= 1 {
        return vec![1.0; steps];
    }
    (0..steps)
        .map(|k| {
            let phase = k as f64 / (steps - 1) as f64;
            0.7 + 0.3 * (std::f64::consts::PI * phase).sin()
        })
        .collect()
}

/// Serializes series steps as the run's `results.csv`.
fn series_csv(outcome: &crate::engine::SeriesOutcome) -> GatewayResult<Vec<u8>> {
    let io_err = |message: String| GatewayError::Io {
        path: RESULTS_FILE.to_string(),
        message,
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "step",
            "hour",
            "scale",
            "converged",
            "iterations",
            "slack_p_mw",
            "slack_q_mvar",
            "min_voltage_pu",
            "max_voltage_pu",
        ])
        .map_err(|e| io_err(e.to_string()))?;
    for step in &outcome.steps {
        writer
            .write_record([
                step.step.to_string(),
                step.hour.to_string(),
                step.scale.to_string(),
                step.converged.to_string(),
                step.iterations.to_string(),
                step.slack_p_mw.to_string(),
                step.slack_q_mvar.to_string(),
                step.min_voltage_pu.to_string(),
                step.max_voltage_pu.to_string(),
            ])
            .map_err(|e| io_err(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| io_err(e.to_string()))
}

/// Renders the run's human-readable `solver.log`.
fn series_log(outcome: &crate::engine::SeriesOutcome) -> String {
    let mut log = String::new();
    for step in &outcome.steps {
        if step.converged {
            log.push_str(&format!(
                "step {} scale {:.3}: converged in {} iterations, slack {:.4} MW, min voltage {:.4} pu\n",
                step.step, step.scale, step.iterations, step.slack_p_mw, step.min_voltage_pu
            ));
        } else {
            log.push_str(&format!(
                "step {} scale {:.3}: did not converge within {} iterations\n",
                step.step, step.scale, step.iterations
            ));
        }
    }
    log
}
