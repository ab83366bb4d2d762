//! Case definitions: the JSON case format and the built-in sources.
//!
//! A case definition is the structural and parametric description of the
//! system under analysis. File sources deserialize into [`CaseDefinition`];
//! built-in sources are constructed here so the gateway works out of the
//! box without any case files on disk.

use serde::{Deserialize, Serialize};

/// Role of a bus in the solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    /// Voltage reference; absorbs the system mismatch.
    Slack,
    /// Load bus with specified P and Q injections.
    #[default]
    Pq,
}

/// One bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusDef {
    /// Bus number, unique within the case.
    pub id: usize,
    /// Bus role.
    #[serde(default)]
    pub kind: BusKind,
    /// Voltage magnitude setpoint in per-unit. Only meaningful on the
    /// slack bus.
    #[serde(default = "default_setpoint")]
    pub voltage_setpoint_pu: f64,
}

/// One branch with per-unit series impedance and total line charging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDef {
    /// Sending-end bus number.
    pub from_bus: usize,
    /// Receiving-end bus number.
    pub to_bus: usize,
    /// Series resistance, per-unit.
    pub r_pu: f64,
    /// Series reactance, per-unit.
    pub x_pu: f64,
    /// Total charging susceptance, per-unit; split equally between ends.
    #[serde(default)]
    pub b_shunt_pu: f64,
}

/// One load. Consumption scales with `multiplier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadDef {
    /// Bus the load is connected to.
    pub bus: usize,
    /// Nominal active power, MW.
    pub p_mw: f64,
    /// Nominal reactive power, MVAr.
    pub q_mvar: f64,
    /// Scale factor applied to both P and Q.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// One generator, modeled as a fixed injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorDef {
    /// Bus the generator is connected to.
    pub bus: usize,
    /// Active power setpoint, MW.
    pub setpoint_mw: f64,
    /// Reactive power output, MVAr.
    #[serde(default)]
    pub q_mvar: f64,
}

/// The full case definition, as read from a JSON source or built in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDefinition {
    /// Case name.
    pub name: String,
    /// System base power, MVA.
    pub base_mva: f64,
    /// Buses, in case order.
    pub buses: Vec<BusDef>,
    /// Branches, in case order.
    pub branches: Vec<BranchDef>,
    /// Loads, in case order. Load N is addressable as `load_N` (1-based).
    #[serde(default)]
    pub loads: Vec<LoadDef>,
    /// Generators, in case order. Generator N is addressable as `gen_N`.
    #[serde(default)]
    pub generators: Vec<GeneratorDef>,
}

fn default_setpoint() -> f64 {
    1.0
}

fn default_multiplier() -> f64 {
    1.0
}

/// Resolves a built-in source name, if it is one.
#[must_use]
pub fn builtin(source: &str) -> Option<CaseDefinition> {
    match source {
        "sample_case" | "thirteen_bus" => Some(thirteen_bus()),
        "two_bus" => Some(two_bus()),
        _ => None,
    }
}

/// The 13-bus radial feeder used as the standard sample case: a trunk of
/// four buses with three laterals, eight loads and one embedded generator.
#[must_use]
pub fn thirteen_bus() -> CaseDefinition {
    let buses = (1..=13)
        .map(|id| BusDef {
            id,
            kind: if id == 1 { BusKind::Slack } else { BusKind::Pq },
            voltage_setpoint_pu: 1.0,
        })
        .collect();

    let branch = |from_bus, to_bus, r_pu, x_pu, b_shunt_pu| BranchDef {
        from_bus,
        to_bus,
        r_pu,
        x_pu,
        b_shunt_pu,
    };

    let load = |bus, p_mw, q_mvar| LoadDef {
        bus,
        p_mw,
        q_mvar,
        multiplier: 1.0,
    };

    CaseDefinition {
        name: "thirteen_bus".to_string(),
        base_mva: 10.0,
        buses,
        branches: vec![
            branch(1, 2, 0.010, 0.025, 0.004),
            branch(2, 3, 0.012, 0.030, 0.004),
            branch(3, 4, 0.015, 0.035, 0.004),
            branch(4, 5, 0.018, 0.040, 0.0),
            branch(2, 6, 0.014, 0.032, 0.0),
            branch(6, 7, 0.016, 0.036, 0.0),
            branch(7, 8, 0.012, 0.028, 0.0),
            branch(3, 9, 0.013, 0.030, 0.0),
            branch(9, 10, 0.017, 0.038, 0.0),
            branch(10, 11, 0.015, 0.034, 0.0),
            branch(4, 12, 0.016, 0.036, 0.0),
            branch(12, 13, 0.014, 0.032, 0.0),
        ],
        loads: vec![
            load(5, 1.2, 0.4),
            load(7, 0.9, 0.3),
            load(8, 1.5, 0.5),
            load(10, 0.8, 0.2),
            load(11, 1.1, 0.35),
            load(13, 1.6, 0.6),
            load(4, 0.7, 0.25),
            load(6, 1.0, 0.3),
        ],
        generators: vec![GeneratorDef {
            bus: 9,
            setpoint_mw: 1.5,
            q_mvar: 0.5,
        }],
    }
}

/// A minimal two-bus case: slack, one line, one load.
#[must_use]
pub fn two_bus() -> CaseDefinition {
    CaseDefinition {
        name: "two_bus".to_string(),
        base_mva: 10.0,
        buses: vec![
            BusDef {
                id: 1,
                kind: BusKind::Slack,
                voltage_setpoint_pu: 1.0,
            },
            BusDef {
                id: 2,
                kind: BusKind::Pq,
                voltage_setpoint_pu: 1.0,
            },
        ],
        branches: vec![BranchDef {
            from_bus: 1,
            to_bus: 2,
            r_pu: 0.01,
            x_pu: 0.05,
            b_shunt_pu: 0.0,
        }],
        loads: vec![LoadDef {
            bus: 2,
            p_mw: 1.0,
            q_mvar: 0.3,
            multiplier: 1.0,
        }],
        generators: vec![],
    }
}
