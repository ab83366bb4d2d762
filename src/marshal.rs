//! The result marshaler.
//!
//! Converts native engine results into JSON-safe payload values with
//! stable field names and explicit units. Marshaling is total for every
//! value an engine can legitimately return; nothing engine-native leaks
//! through. Complex quantities are split into magnitude (`*_pu`) and
//! angle (`*_deg`) fields; matrices are rendered dense or as
//! `(row, column, value)` triples, and the two representations agree on
//! every entry above [`SPARSITY_THRESHOLD`].

use crate::engine::{Cell, CaseSummary, MatrixResult, PowerTotals, ResultTable, SolveOutcome};
use crate::value::{FieldMap, Value};

/// Entries at or below this magnitude are omitted from the sparse
/// representation.
pub const SPARSITY_THRESHOLD: f64 = 1e-12;

/// Marshals a tabular result into an ordered list of row maps.
#[must_use]
pub fn table_rows(table: &ResultTable) -> Value {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let mut fields = FieldMap::new();
            for (name, cell) in row {
                match cell {
                    Cell::Int(v) => {
                        fields.insert(name.clone(), Value::Int(*v));
                    }
                    Cell::Float(v) => {
                        fields.insert(name.clone(), Value::Float(*v));
                    }
                    Cell::Text(v) => {
                        fields.insert(name.clone(), Value::String(v.clone()));
                    }
                    Cell::Phasor(p) => {
                        fields.insert(format!("{name}_pu"), Value::Float(p.magnitude));
                        fields.insert(format!("{name}_deg"), Value::Float(p.angle_deg));
                    }
                }
            }
            Value::Map(fields)
        })
        .collect();
    Value::List(rows)
}

/// Marshals a matrix in the representation selected by `full`.
///
/// Dense: `matrix` holds row-major nested lists. Sparse: `entries` holds
/// `[row, column, value]` triples for every entry above the sparsity
/// threshold.
#[must_use]
pub fn matrix_payload(matrix: &MatrixResult, kind: &str, full: bool) -> FieldMap {
    let mut payload = FieldMap::new();
    payload.insert("kind".to_string(), Value::from(kind));
    payload.insert("dimension".to_string(), Value::Int(matrix.dimension as i64));
    payload.insert("units".to_string(), Value::from("per_unit"));
    if full {
        payload.insert("representation".to_string(), Value::from("dense"));
        let rows = matrix
            .dense
            .iter()
            .map(|row| Value::List(row.iter().map(|v| Value::Float(*v)).collect()))
            .collect();
        payload.insert("matrix".to_string(), Value::List(rows));
    } else {
        payload.insert("representation".to_string(), Value::from("sparse"));
        let mut entries = Vec::new();
        for (i, row) in matrix.dense.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                if v.abs() > SPARSITY_THRESHOLD {
                    entries.push(Value::List(vec![
                        Value::Int(i as i64),
                        Value::Int(j as i64),
                        Value::Float(*v),
                    ]));
                }
            }
        }
        payload.insert("entries".to_string(), Value::List(entries));
    }
    payload
}

/// Marshals a case summary.
#[must_use]
pub fn summary_payload(summary: &CaseSummary) -> FieldMap {
    let mut payload = FieldMap::new();
    payload.insert("case_id".to_string(), Value::from(summary.case_id.as_str()));
    payload.insert("bus_count".to_string(), Value::Int(summary.bus_count as i64));
    payload.insert(
        "branch_count".to_string(),
        Value::Int(summary.branch_count as i64),
    );
    payload.insert(
        "generator_count".to_string(),
        Value::Int(summary.generator_count as i64),
    );
    payload.insert(
        "load_count".to_string(),
        Value::Int(summary.load_count as i64),
    );
    payload.insert("base_mva".to_string(), Value::Float(summary.base_mva));
    payload
}

/// Marshals a convergence summary.
#[must_use]
pub fn solve_payload(outcome: &SolveOutcome, elapsed_ms: u64) -> FieldMap {
    let mut payload = FieldMap::new();
    payload.insert("converged".to_string(), Value::Bool(outcome.converged));
    payload.insert(
        "iterations".to_string(),
        Value::Int(outcome.iterations as i64),
    );
    payload.insert(
        "max_mismatch_pu".to_string(),
        Value::Float(outcome.max_mismatch_pu),
    );
    payload.insert("elapsed_ms".to_string(), Value::Int(elapsed_ms as i64));
    payload
}

/// Marshals system power totals.
#[must_use]
pub fn totals_payload(totals: &PowerTotals) -> FieldMap {
    let mut payload = FieldMap::new();
    payload.insert("slack_p_mw".to_string(), Value::Float(totals.slack_p_mw));
    payload.insert(
        "slack_q_mvar".to_string(),
        Value::Float(totals.slack_q_mvar),
    );
    payload.insert("load_p_mw".to_string(), Value::Float(totals.load_p_mw));
    payload.insert("load_q_mvar".to_string(), Value::Float(totals.load_q_mvar));
    payload.insert("loss_p_mw".to_string(), Value::Float(totals.loss_p_mw));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Phasor;

    #[test]
    fn phasors_split_into_magnitude_and_angle() {
        let table = ResultTable {
            name: "bus_voltages",
            rows: vec![vec![
                ("bus".to_string(), Cell::Int(1)),
                (
                    "voltage".to_string(),
                    Cell::Phasor(Phasor {
                        magnitude: 0.98,
                        angle_deg: -1.2,
                    }),
                ),
            ]],
        };

        let Value::List(rows) = table_rows(&table) else {
            panic!("expected a list of rows");
        };
        let Value::Map(fields) = &rows[0] else {
            panic!("expected a row map");
        };
        assert_eq!(fields.get("bus"), Some(&Value::Int(1)));
        assert_eq!(fields.get("voltage_pu"), Some(&Value::Float(0.98)));
        assert_eq!(fields.get("voltage_deg"), Some(&Value::Float(-1.2)));
        assert!(!fields.contains_key("voltage"));
    }

    #[test]
    fn row_order_is_preserved() {
        let table = ResultTable {
            name: "t",
            rows: (0..5)
                .map(|i| vec![("bus".to_string(), Cell::Int(i))])
                .collect(),
        };
        let Value::List(rows) = table_rows(&table) else {
            panic!("expected a list");
        };
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(
                row.as_map().unwrap().get("bus"),
                Some(&Value::Int(i as i64))
            );
        }
    }

    #[test]
    fn dense_and_sparse_agree_above_threshold() {
        let matrix = MatrixResult {
            dimension: 3,
            dense: vec![
                vec![2.0, -1.0, 0.0],
                vec![-1.0, 2.0, -1.0],
                vec![0.0, -1.0, 1.0],
            ],
        };

        let dense = matrix_payload(&matrix, "conductance", true);
        let sparse = matrix_payload(&matrix, "conductance", false);

        let Some(Value::List(rows)) = dense.get("matrix") else {
            panic!("expected dense rows");
        };
        let Some(Value::List(entries)) = sparse.get("entries") else {
            panic!("expected sparse entries");
        };
        // Seven entries are non-zero.
        assert_eq!(entries.len(), 7);

        for entry in entries {
            let triple = entry.as_list().unwrap();
            let i = triple[0].as_int().unwrap() as usize;
            let j = triple[1].as_int().unwrap() as usize;
            let v = triple[2].as_float().unwrap();
            let dense_value = rows[i].as_list().unwrap()[j].as_float().unwrap();
            assert_eq!(v, dense_value);
        }

        // And every above-threshold dense entry appears in the triples.
        for (i, row) in matrix.dense.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                if v.abs() > SPARSITY_THRESHOLD {
                    assert!(entries.iter().any(|e| {
                        let t = e.as_list().unwrap();
                        t[0].as_int() == Some(i as i64) && t[1].as_int() == Some(j as i64)
                    }));
                }
            }
        }
    }

    #[test]
    fn payload_field_names_are_stable() {
        let summary = CaseSummary {
            case_id: "sample_case".to_string(),
            bus_count: 13,
            branch_count: 12,
            generator_count: 1,
            load_count: 8,
            base_mva: 10.0,
        };
        let payload = summary_payload(&summary);
        assert_eq!(payload.get("bus_count"), Some(&Value::Int(13)));
        assert_eq!(payload.get("base_mva"), Some(&Value::Float(10.0)));

        let totals = PowerTotals {
            slack_p_mw: 7.5,
            slack_q_mvar: 2.4,
            load_p_mw: 8.8,
            load_q_mvar: 2.9,
            loss_p_mw: 0.2,
        };
        let payload = totals_payload(&totals);
        assert_eq!(payload.get("slack_p_mw"), Some(&Value::Float(7.5)));
        assert_eq!(payload.get("loss_p_mw"), Some(&Value::Float(0.2)));
    }
}
