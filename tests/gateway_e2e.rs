//! End-to-end scenarios against the embedded feeder engine.

use gridgate::{
    ErrorKind, FeederEngine, FieldMap, Gateway, GatewayConfig, SessionStatus, Value,
};

fn gateway() -> (tempfile::TempDir, Gateway) {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        artifact_root: dir.path().join("runs"),
        ..GatewayConfig::default()
    };
    let gateway = Gateway::new(&config).unwrap();
    (dir, gateway)
}

fn args(pairs: &[(&str, Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn changes(pairs: &[(&str, f64)]) -> Value {
    Value::Map(
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), Value::Float(*value)))
            .collect(),
    )
}

fn invoke_ok(gateway: &mut Gateway, tool: &str, arguments: &FieldMap) -> FieldMap {
    let result = gateway.invoke(tool, arguments);
    match result.payload() {
        Some(payload) => payload.clone(),
        None => panic!("'{tool}' failed: {result:?}"),
    }
}

fn invoke_err(gateway: &mut Gateway, tool: &str, arguments: &FieldMap) -> ErrorKind {
    let result = gateway.invoke(tool, arguments);
    result
        .kind()
        .unwrap_or_else(|| panic!("'{tool}' unexpectedly succeeded"))
}

fn float(payload: &FieldMap, field: &str) -> f64 {
    payload
        .get(field)
        .and_then(Value::as_float)
        .unwrap_or_else(|| panic!("missing float field '{field}' in {payload:?}"))
}

#[test]
fn end_to_end_scenario() {
    let (_dir, mut gateway) = gateway();

    // Load the sample case.
    let summary = invoke_ok(
        &mut gateway,
        "load_case",
        &args(&[("source", Value::from("sample_case"))]),
    );
    assert_eq!(summary.get("bus_count"), Some(&Value::Int(13)));
    assert_eq!(summary.get("case_id"), Some(&Value::from("sample_case")));

    // Solve with the default method.
    let solved = invoke_ok(
        &mut gateway,
        "solve_power_flow",
        &args(&[("method", Value::from("default"))]),
    );
    assert_eq!(solved.get("converged"), Some(&Value::Bool(true)));
    let first_power = float(
        &invoke_ok(&mut gateway, "get_total_power", &FieldMap::new()),
        "slack_p_mw",
    );

    // Scale load_1 up by half. The stored solution is invalidated and the
    // session reverts to loaded.
    let ack = invoke_ok(
        &mut gateway,
        "set_element",
        &args(&[
            ("target", Value::from("load_1")),
            ("changes", changes(&[("multiplier", 1.5)])),
        ]),
    );
    assert_eq!(ack.get("solution_invalidated"), Some(&Value::Bool(true)));
    assert_eq!(ack.get("status"), Some(&Value::from("loaded")));
    assert_eq!(gateway.session().status(), SessionStatus::Loaded);

    // Result tools now refuse until the case is solved again.
    assert_eq!(
        invoke_err(&mut gateway, "get_total_power", &FieldMap::new()),
        ErrorKind::PreconditionError
    );

    // Re-solve and observe the different operating point.
    let solved = invoke_ok(&mut gateway, "solve_power_flow", &FieldMap::new());
    assert_eq!(solved.get("converged"), Some(&Value::Bool(true)));
    let second_power = float(
        &invoke_ok(&mut gateway, "get_total_power", &FieldMap::new()),
        "slack_p_mw",
    );
    assert!(
        second_power > first_power + 1e-6,
        "expected more slack power after scaling a load up: {first_power} -> {second_power}"
    );
}

#[test]
fn case_dependent_tools_fail_on_empty_session() {
    let (_dir, mut gateway) = gateway();

    assert_eq!(
        invoke_err(&mut gateway, "solve_power_flow", &FieldMap::new()),
        ErrorKind::PreconditionError
    );
    assert_eq!(
        invoke_err(
            &mut gateway,
            "set_element",
            &args(&[
                ("target", Value::from("load_1")),
                ("changes", changes(&[("multiplier", 1.5)])),
            ]),
        ),
        ErrorKind::PreconditionError
    );
    for tool in [
        "get_case_info",
        "get_bus_voltages",
        "get_branch_flows",
        "get_total_power",
        "run_time_series",
    ] {
        assert_eq!(
            invoke_err(&mut gateway, tool, &FieldMap::new()),
            ErrorKind::PreconditionError,
            "tool {tool}"
        );
    }
    assert_eq!(
        invoke_err(
            &mut gateway,
            "get_matrix",
            &args(&[("kind", Value::from("conductance"))]),
        ),
        ErrorKind::PreconditionError
    );
}

#[test]
fn every_tool_returns_a_taxonomy_conformant_result() {
    let (_dir, mut gateway) = gateway();
    let names: Vec<&str> = gateway.catalog().names();

    // With an empty session and empty arguments, every tool must produce
    // either a success or a typed failure. Nothing may panic.
    for name in names {
        let result = gateway.invoke(name, &FieldMap::new());
        if let Some(kind) = result.kind() {
            // Any kind is acceptable; the point is that one exists.
            let _ = kind.as_str();
        }
    }

    let result = gateway.invoke("run_power_flow", &FieldMap::new());
    assert_eq!(result.kind(), Some(ErrorKind::UnknownTool));
}

#[test]
fn malformed_calls_are_typed_failures() {
    let (_dir, mut gateway) = gateway();

    assert_eq!(
        invoke_err(&mut gateway, "load_case", &FieldMap::new()),
        ErrorKind::MissingArgument
    );
    assert_eq!(
        invoke_err(
            &mut gateway,
            "load_case",
            &args(&[("source", Value::Int(13))]),
        ),
        ErrorKind::TypeMismatch
    );
    // Undeclared argument names are rejected rather than ignored.
    assert_eq!(
        invoke_err(
            &mut gateway,
            "load_case",
            &args(&[
                ("source", Value::from("sample_case")),
                ("sorce", Value::from("typo")),
            ]),
        ),
        ErrorKind::TypeMismatch
    );
}

#[test]
fn unknown_element_and_invalid_value() {
    let (_dir, mut gateway) = gateway();
    invoke_ok(
        &mut gateway,
        "load_case",
        &args(&[("source", Value::from("sample_case"))]),
    );

    assert_eq!(
        invoke_err(
            &mut gateway,
            "set_element",
            &args(&[
                ("target", Value::from("load_99")),
                ("changes", changes(&[("multiplier", 1.5)])),
            ]),
        ),
        ErrorKind::UnknownElement
    );
    assert_eq!(
        invoke_err(
            &mut gateway,
            "set_element",
            &args(&[
                ("target", Value::from("load_1")),
                ("changes", changes(&[("multiplier", -2.0)])),
            ]),
        ),
        ErrorKind::InvalidValue
    );
    assert_eq!(
        invoke_err(
            &mut gateway,
            "set_element",
            &args(&[
                ("target", Value::from("load_1")),
                ("changes", Value::Map(FieldMap::new())),
            ]),
        ),
        ErrorKind::InvalidValue
    );
    // Non-numeric change values are a malformed call.
    let mut non_numeric = FieldMap::new();
    non_numeric.insert("multiplier".to_string(), Value::from("big"));
    assert_eq!(
        invoke_err(
            &mut gateway,
            "set_element",
            &args(&[
                ("target", Value::from("load_1")),
                ("changes", Value::Map(non_numeric)),
            ]),
        ),
        ErrorKind::TypeMismatch
    );
}

#[test]
fn divergence_marks_failed_and_recovery_works() {
    let (_dir, mut gateway) = gateway();
    invoke_ok(
        &mut gateway,
        "load_case",
        &args(&[("source", Value::from("sample_case"))]),
    );

    invoke_ok(
        &mut gateway,
        "set_element",
        &args(&[
            ("target", Value::from("load_1")),
            ("changes", changes(&[("multiplier", 10_000.0)])),
        ]),
    );
    assert_eq!(
        invoke_err(&mut gateway, "solve_power_flow", &FieldMap::new()),
        ErrorKind::ConvergenceError
    );
    let status = invoke_ok(&mut gateway, "session_status", &FieldMap::new());
    assert_eq!(status.get("status"), Some(&Value::from("failed")));

    // Back the load off and solve again without reloading.
    invoke_ok(
        &mut gateway,
        "set_element",
        &args(&[
            ("target", Value::from("load_1")),
            ("changes", changes(&[("multiplier", 1.0)])),
        ]),
    );
    let solved = invoke_ok(&mut gateway, "solve_power_flow", &FieldMap::new());
    assert_eq!(solved.get("converged"), Some(&Value::Bool(true)));
    assert_eq!(gateway.session().status(), SessionStatus::Solved);
}

#[test]
fn bus_voltage_rows_follow_marshaling_rules() {
    let (_dir, mut gateway) = gateway();
    invoke_ok(
        &mut gateway,
        "load_case",
        &args(&[("source", Value::from("sample_case"))]),
    );
    invoke_ok(&mut gateway, "solve_power_flow", &FieldMap::new());

    let payload = invoke_ok(&mut gateway, "get_bus_voltages", &FieldMap::new());
    assert_eq!(payload.get("count"), Some(&Value::Int(13)));
    let Some(Value::List(rows)) = payload.get("rows") else {
        panic!("expected rows");
    };
    assert_eq!(rows.len(), 13);

    for row in rows {
        let row = row.as_map().unwrap();
        let magnitude = row.get("voltage_pu").and_then(Value::as_float).unwrap();
        assert!(magnitude > 0.9 && magnitude < 1.01);
        assert!(row.contains_key("voltage_deg"));
        // The native complex phasor never leaks.
        assert!(!row.contains_key("voltage"));
    }

    let slack = rows[0].as_map().unwrap();
    assert_eq!(slack.get("bus"), Some(&Value::Int(1)));
    assert_eq!(slack.get("kind"), Some(&Value::from("slack")));
    assert_eq!(slack.get("voltage_pu"), Some(&Value::Float(1.0)));
}

#[test]
fn dense_and_sparse_matrix_representations_agree() {
    let (_dir, mut gateway) = gateway();
    invoke_ok(
        &mut gateway,
        "load_case",
        &args(&[("source", Value::from("sample_case"))]),
    );

    for kind in ["conductance", "susceptance"] {
        let dense = invoke_ok(
            &mut gateway,
            "get_matrix",
            &args(&[("kind", Value::from(kind)), ("full", Value::Bool(true))]),
        );
        let sparse = invoke_ok(
            &mut gateway,
            "get_matrix",
            &args(&[("kind", Value::from(kind))]),
        );
        assert_eq!(dense.get("dimension"), Some(&Value::Int(13)));
        assert_eq!(sparse.get("representation"), Some(&Value::from("sparse")));

        let Some(Value::List(rows)) = dense.get("matrix") else {
            panic!("expected dense matrix");
        };
        let Some(Value::List(entries)) = sparse.get("entries") else {
            panic!("expected sparse entries");
        };

        // Each triple matches its dense entry.
        for entry in entries {
            let triple = entry.as_list().unwrap();
            let i = triple[0].as_int().unwrap() as usize;
            let j = triple[1].as_int().unwrap() as usize;
            let value = triple[2].as_float().unwrap();
            let dense_value = rows[i].as_list().unwrap()[j].as_float().unwrap();
            assert_eq!(value, dense_value, "{kind}[{i}][{j}]");
        }

        // And each above-threshold dense entry has a triple.
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.as_list().unwrap().iter().enumerate() {
                let value = value.as_float().unwrap();
                if value.abs() > 1e-12 {
                    assert!(
                        entries.iter().any(|e| {
                            let t = e.as_list().unwrap();
                            t[0].as_int() == Some(i as i64) && t[1].as_int() == Some(j as i64)
                        }),
                        "{kind}[{i}][{j}] = {value} missing from sparse form"
                    );
                }
            }
        }
    }
}

#[test]
fn repeated_loads_release_the_previous_handle() {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        artifact_root: dir.path().join("runs"),
        ..GatewayConfig::default()
    };
    let engine = FeederEngine::new();
    let gauge = engine.handle_gauge();
    let mut gateway = Gateway::with_engine(Box::new(engine), &config).unwrap();

    for _ in 0..5 {
        invoke_ok(
            &mut gateway,
            "load_case",
            &args(&[("source", Value::from("sample_case"))]),
        );
        assert_eq!(gauge.count(), 1);
    }

    let summary = invoke_ok(
        &mut gateway,
        "load_case",
        &args(&[("source", Value::from("two_bus"))]),
    );
    assert_eq!(summary.get("bus_count"), Some(&Value::Int(2)));
    assert_eq!(gauge.count(), 1);

    invoke_ok(&mut gateway, "release_case", &FieldMap::new());
    assert_eq!(gauge.count(), 0);
    let status = invoke_ok(&mut gateway, "session_status", &FieldMap::new());
    assert_eq!(status.get("status"), Some(&Value::from("empty")));
}

#[test]
fn file_sources_report_not_found_and_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        artifact_root: dir.path().join("runs"),
        case_root: Some(dir.path().join("cases")),
        ..GatewayConfig::default()
    };
    std::fs::create_dir_all(dir.path().join("cases")).unwrap();
    std::fs::write(dir.path().join("cases/broken.json"), "{\"name\": ").unwrap();
    let mut gateway = Gateway::new(&config).unwrap();

    assert_eq!(
        invoke_err(
            &mut gateway,
            "load_case",
            &args(&[("source", Value::from("absent.json"))]),
        ),
        ErrorKind::NotFound
    );
    assert_eq!(
        invoke_err(
            &mut gateway,
            "load_case",
            &args(&[("source", Value::from("broken.json"))]),
        ),
        ErrorKind::ParseError
    );
    // A failed load leaves the session empty.
    let status = invoke_ok(&mut gateway, "session_status", &FieldMap::new());
    assert_eq!(status.get("status"), Some(&Value::from("empty")));
}
