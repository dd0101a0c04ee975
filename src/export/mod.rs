//! Route Result / Visualization Exporter
//!
//! Pure projections of computed routes and graph snapshots into the
//! node/edge shape the visualization frontend consumes. Path order is
//! preserved; no business logic lives here.

use crate::graph::{great_circle_km, PortGraph, RouteMode};
use crate::optimizer::{CriterionTotals, RoutePlan};
use chrono::{DateTime, Utc};
use petgraph::visit::EdgeRef;
use rust_decimal::Decimal;
use serde::Serialize;

/// A visited port
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub region: String,
}

/// A traversed connection, annotated with per-criterion contribution and
/// the running totals after this hop
#[derive(Debug, Clone, Serialize)]
pub struct EdgeView {
    pub from: String,
    pub to: String,
    pub mode: RouteMode,
    pub distance_km: f64,
    pub transit_hours: f64,
    pub cost_usd: Decimal,
    pub risk_factor: f64,
    pub weighted_cost: f64,
    pub cumulative: CriterionTotals,
}

/// Serializable projection of a computed route
#[derive(Debug, Clone, Serialize)]
pub struct RouteView {
    pub plan_id: String,
    pub origin: String,
    pub destination: String,
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub totals: CriterionTotals,
    pub weighted_score: f64,
    /// Straight-line origin to destination distance, for detour context
    pub direct_distance_km: Option<f64>,
}

/// One connection of the full-network view
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdgeView {
    pub from: String,
    pub to: String,
    pub mode: RouteMode,
    pub distance_km: f64,
    pub transit_hours: f64,
    pub cost_usd: Decimal,
    pub risk_factor: f64,
    pub capacity_tonnes: Option<f64>,
    pub restricted: bool,
}

/// Serializable projection of a whole snapshot
#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    pub built_at: DateTime<Utc>,
    pub nodes: Vec<NodeView>,
    pub edges: Vec<GraphEdgeView>,
}

/// Project a computed route against the snapshot it was computed on.
pub fn route_view(graph: &PortGraph, plan: &RoutePlan) -> RouteView {
    let mut visited: Vec<&str> = vec![plan.origin.as_str()];
    visited.extend(plan.hops.iter().map(|h| h.to_id.as_str()));

    let nodes: Vec<NodeView> = visited
        .iter()
        .filter_map(|id| graph.get_port(id))
        .map(|port| NodeView {
            id: port.id.clone(),
            name: port.name.clone(),
            lat: port.lat,
            lon: port.lon,
            region: port.region.clone(),
        })
        .collect();

    let mut cumulative = CriterionTotals::default();
    let edges: Vec<EdgeView> = plan
        .hops
        .iter()
        .map(|hop| {
            cumulative.distance_km += hop.distance_km;
            cumulative.transit_hours += hop.transit_hours;
            cumulative.cost_usd += hop.cost_usd;
            cumulative.risk += hop.risk_factor;

            EdgeView {
                from: hop.from_id.clone(),
                to: hop.to_id.clone(),
                mode: hop.mode,
                distance_km: hop.distance_km,
                transit_hours: hop.transit_hours,
                cost_usd: hop.cost_usd,
                risk_factor: hop.risk_factor,
                weighted_cost: hop.weighted_cost,
                cumulative,
            }
        })
        .collect();

    let direct_distance_km = match (
        graph.get_port(&plan.origin),
        graph.get_port(&plan.destination),
    ) {
        (Some(a), Some(b)) => Some(great_circle_km(a, b)),
        _ => None,
    };

    RouteView {
        plan_id: plan.plan_id.clone(),
        origin: plan.origin.clone(),
        destination: plan.destination.clone(),
        nodes,
        edges,
        totals: plan.totals,
        weighted_score: plan.weighted_score,
        direct_distance_km,
    }
}

/// Project the full snapshot for the network view.
pub fn graph_view(graph: &PortGraph) -> GraphView {
    let nodes: Vec<NodeView> = graph
        .ports()
        .map(|port| NodeView {
            id: port.id.clone(),
            name: port.name.clone(),
            lat: port.lat,
            lon: port.lon,
            region: port.region.clone(),
        })
        .collect();

    let inner = graph.inner();
    let edges: Vec<GraphEdgeView> = inner
        .edge_references()
        .map(|e| {
            let conn = e.weight();
            GraphEdgeView {
                from: inner[e.source()].id.clone(),
                to: inner[e.target()].id.clone(),
                mode: conn.mode,
                distance_km: conn.distance_km,
                transit_hours: conn.transit_hours,
                cost_usd: conn.cost_usd,
                risk_factor: conn.risk_factor,
                capacity_tonnes: conn.capacity_tonnes,
                restricted: conn.restricted,
            }
        })
        .collect();

    GraphView {
        built_at: graph.built_at,
        nodes,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Connection, Port};
    use crate::optimizer::{CriteriaWeights, OptimizationCriteria, Optimizer};

    fn port(id: &str, lat: f64, lon: f64) -> Port {
        Port {
            id: id.to_string(),
            name: format!("Port {}", id),
            lat,
            lon,
            capacity_tonnes: 10_000.0,
            region: "LATAM".to_string(),
        }
    }

    fn conn(distance: f64, time: f64, cost: i64, risk: f64) -> Connection {
        Connection {
            mode: RouteMode::Maritime,
            distance_km: distance,
            transit_hours: time,
            cost_usd: Decimal::from(cost),
            risk_factor: risk,
            capacity_tonnes: None,
            restricted: false,
        }
    }

    fn chain() -> PortGraph {
        let mut g = PortGraph::new();
        g.add_port(port("A", -33.0, -71.6)).unwrap();
        g.add_port(port("B", 9.0, -79.5)).unwrap();
        g.add_port(port("C", 33.7, -118.2)).unwrap();
        g.add_connection("A", "B", conn(10.0, 2.0, 5, 0.1)).unwrap();
        g.add_connection("B", "C", conn(15.0, 3.0, 7, 0.2)).unwrap();
        g.add_connection("A", "C", conn(40.0, 4.0, 3, 0.5)).unwrap();
        g
    }

    fn distance_only() -> OptimizationCriteria {
        OptimizationCriteria {
            weights: CriteriaWeights {
                distance: 1.0,
                time: 0.0,
                cost: 0.0,
                risk: 0.0,
            },
            ..OptimizationCriteria::default()
        }
    }

    #[test]
    fn test_route_view_preserves_path_order() {
        let g = chain();
        let plan = Optimizer::default()
            .compute_route(&g, "A", "C", &distance_only())
            .unwrap();

        let view = route_view(&g, &plan);

        let node_ids: Vec<&str> = view.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(node_ids, vec!["A", "B", "C"]);

        assert_eq!(view.edges.len(), 2);
        assert_eq!(view.edges[0].from, "A");
        assert_eq!(view.edges[0].to, "B");
        assert_eq!(view.edges[1].from, "B");
        assert_eq!(view.edges[1].to, "C");
    }

    #[test]
    fn test_cumulative_totals_run_per_hop() {
        let g = chain();
        let plan = Optimizer::default()
            .compute_route(&g, "A", "C", &distance_only())
            .unwrap();

        let view = route_view(&g, &plan);

        let first = &view.edges[0].cumulative;
        assert!((first.distance_km - 10.0).abs() < 1e-9);
        assert!((first.transit_hours - 2.0).abs() < 1e-9);
        assert_eq!(first.cost_usd, Decimal::from(5));

        let last = &view.edges[1].cumulative;
        assert!((last.distance_km - 25.0).abs() < 1e-9);
        assert!((last.transit_hours - 5.0).abs() < 1e-9);
        assert_eq!(last.cost_usd, Decimal::from(12));
        assert!((last.risk - 0.3).abs() < 1e-9);

        // Final cumulative equals the plan totals
        assert!((last.distance_km - view.totals.distance_km).abs() < 1e-9);

        assert!(view.direct_distance_km.is_some());
    }

    #[test]
    fn test_route_view_serializes_to_json() {
        let g = chain();
        let plan = Optimizer::default()
            .compute_route(&g, "A", "C", &distance_only())
            .unwrap();

        let value = serde_json::to_value(route_view(&g, &plan)).unwrap();
        assert_eq!(value["origin"], "A");
        assert_eq!(value["destination"], "C");
        assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(value["edges"][0]["mode"], "MARITIME");
        assert!(value["edges"][0]["cumulative"]["distance_km"].is_number());
    }

    #[test]
    fn test_graph_view_covers_the_whole_snapshot() {
        let g = chain();
        let view = graph_view(&g);

        assert_eq!(view.nodes.len(), 3);
        assert_eq!(view.edges.len(), 3);

        let value = serde_json::to_value(&view).unwrap();
        assert!(value["built_at"].is_string());
        assert_eq!(value["edges"].as_array().unwrap().len(), 3);
    }
}
