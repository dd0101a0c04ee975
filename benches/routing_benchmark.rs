use berrysend_optimizer::graph::{Connection, Port, PortGraph, RouteMode};
use berrysend_optimizer::optimizer::{
    CriteriaWeights, OptimizationCriteria, Optimizer, OptimizerConfig,
};
use criterion::{criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use std::time::Duration;

/// Layered network: `layers` columns of `width` ports each, fully
/// connected column to column, so many distinct paths exist.
fn layered_graph(layers: usize, width: usize) -> PortGraph {
    let mut graph = PortGraph::new();

    for layer in 0..layers {
        for slot in 0..width {
            graph
                .add_port(Port {
                    id: format!("P{:02}-{:02}", layer, slot),
                    name: format!("Port {}/{}", layer, slot),
                    lat: (slot as f64) - 45.0,
                    lon: (layer as f64) * 2.0 - 90.0,
                    capacity_tonnes: 50_000.0,
                    region: "BENCH".to_string(),
                })
                .unwrap();
        }
    }

    for layer in 0..layers - 1 {
        for from in 0..width {
            for to in 0..width {
                let spread = 1.0 + ((from * 7 + to * 3) % 10) as f64 / 10.0;
                graph
                    .add_connection(
                        &format!("P{:02}-{:02}", layer, from),
                        &format!("P{:02}-{:02}", layer + 1, to),
                        Connection {
                            mode: RouteMode::Maritime,
                            distance_km: 500.0 * spread,
                            transit_hours: 24.0 * spread,
                            cost_usd: Decimal::from((800.0 * spread) as i64),
                            risk_factor: 0.05 * spread,
                            capacity_tonnes: None,
                            restricted: false,
                        },
                    )
                    .unwrap();
            }
        }
    }

    graph
}

fn bench_compute_route(c: &mut Criterion) {
    let graph = layered_graph(12, 8);
    let optimizer = Optimizer::new(OptimizerConfig {
        time_budget: Duration::from_secs(30),
        max_hops: 32,
    });
    let criteria = OptimizationCriteria::default();

    c.bench_function("compute_route layered 12x8", |b| {
        b.iter(|| {
            optimizer
                .compute_route(&graph, "P00-00", "P11-07", &criteria)
                .unwrap()
        })
    });
}

fn bench_compute_alternatives(c: &mut Criterion) {
    let graph = layered_graph(8, 6);
    let optimizer = Optimizer::new(OptimizerConfig {
        time_budget: Duration::from_secs(30),
        max_hops: 32,
    });
    let criteria = OptimizationCriteria {
        weights: CriteriaWeights::default(),
        ..OptimizationCriteria::default()
    };

    c.bench_function("compute_alternatives k=5 layered 8x6", |b| {
        b.iter(|| {
            optimizer
                .compute_alternatives(&graph, "P00-00", "P07-05", &criteria, 5)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_compute_route, bench_compute_alternatives);
criterion_main!(benches);
