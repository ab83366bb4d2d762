//! Dispatch overhead benchmarks.

use criterion::{criterion_group, criterion_main, Criterion};

use gridgate::{FieldMap, Gateway, GatewayConfig, Value};

fn bench_dispatch(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        artifact_root: dir.path().join("runs"),
        ..GatewayConfig::default()
    };
    let mut gateway = Gateway::new(&config).unwrap();

    c.bench_function("session_status", |b| {
        b.iter(|| gateway.invoke("session_status", &FieldMap::new()));
    });

    let mut load_args = FieldMap::new();
    load_args.insert("source".to_string(), Value::from("sample_case"));
    gateway.invoke("load_case", &load_args);

    c.bench_function("solve_thirteen_bus", |b| {
        b.iter(|| gateway.invoke("solve_power_flow", &FieldMap::new()));
    });

    let mut matrix_args = FieldMap::new();
    matrix_args.insert("kind".to_string(), Value::from("susceptance"));
    c.bench_function("get_matrix_sparse", |b| {
        b.iter(|| gateway.invoke("get_matrix", &matrix_args));
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
