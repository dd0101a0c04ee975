//! Optimization Request Orchestrator
//!
//! Entry point for Export Management. Holds the latest successfully built
//! graph snapshot behind an atomically swapped `Arc`: ingestion publishes
//! a fresh immutable snapshot while in-flight requests keep computing
//! against the one they started with.

use crate::export::{graph_view, route_view, GraphView, RouteView};
use crate::graph::{PortGraph, RouteMode};
use crate::ingest::{build_snapshot, BuildReport, ConnectionRecord, PortRecord};
use crate::optimizer::{OptimizationCriteria, OptimizeError, Optimizer, OptimizerConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Orchestrator-level failures
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no port graph snapshot has been published yet")]
    GraphUnavailable,

    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}

/// An export-planning request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub criteria: OptimizationCriteria,
}

/// Best route response
#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub route: RouteView,
    pub optimization_time_ms: u64,
}

/// Ranked alternatives response
#[derive(Debug, Serialize)]
pub struct AlternativesResponse {
    pub routes: Vec<RouteView>,
    pub optimization_time_ms: u64,
}

/// Snapshot health summary
#[derive(Debug, Serialize)]
pub struct GraphStatus {
    pub port_count: usize,
    pub connection_count: usize,
    pub built_at: DateTime<Utc>,
    pub build_time_ms: u64,
    pub mode_counts: HashMap<RouteMode, usize>,
}

/// The route planning service
pub struct RoutePlanner {
    snapshot: RwLock<Option<Arc<PortGraph>>>,
    optimizer: Optimizer,
}

impl RoutePlanner {
    pub fn new(config: OptimizerConfig) -> Self {
        RoutePlanner {
            snapshot: RwLock::new(None),
            optimizer: Optimizer::new(config),
        }
    }

    /// Publish a freshly built snapshot, replacing the current one. Requests
    /// already holding the old `Arc` are unaffected.
    pub async fn publish(&self, graph: PortGraph) -> Arc<PortGraph> {
        let graph = Arc::new(graph);
        *self.snapshot.write().await = Some(Arc::clone(&graph));
        info!(
            ports = graph.port_count(),
            connections = graph.connection_count(),
            "port graph snapshot published"
        );
        graph
    }

    /// Rebuild the graph wholesale from raw rows and publish it. The new
    /// snapshot only becomes visible once the build has completed.
    pub async fn ingest(
        &self,
        ports: Vec<PortRecord>,
        connections: Vec<ConnectionRecord>,
    ) -> BuildReport {
        let (graph, report) = build_snapshot(ports, connections);
        self.publish(graph).await;
        report
    }

    /// The snapshot requests currently resolve against, if any.
    pub async fn current_snapshot(&self) -> Option<Arc<PortGraph>> {
        self.snapshot.read().await.clone()
    }

    /// Compute the best route for a request against the latest snapshot.
    pub async fn plan_route(&self, request: &RouteRequest) -> Result<RouteResponse, PlanError> {
        let graph = self
            .current_snapshot()
            .await
            .ok_or(PlanError::GraphUnavailable)?;

        let started = Instant::now();
        let plan = self.optimizer.compute_route(
            &graph,
            &request.origin,
            &request.destination,
            &request.criteria,
        )?;

        Ok(RouteResponse {
            route: route_view(&graph, &plan),
            optimization_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Compute up to `k` ranked alternatives for a request.
    pub async fn plan_alternatives(
        &self,
        request: &RouteRequest,
        k: usize,
    ) -> Result<AlternativesResponse, PlanError> {
        let graph = self
            .current_snapshot()
            .await
            .ok_or(PlanError::GraphUnavailable)?;

        let started = Instant::now();
        let plans = self.optimizer.compute_alternatives(
            &graph,
            &request.origin,
            &request.destination,
            &request.criteria,
            k,
        )?;

        Ok(AlternativesResponse {
            routes: plans.iter().map(|p| route_view(&graph, p)).collect(),
            optimization_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Summary of the current snapshot for health/monitoring.
    pub async fn graph_status(&self) -> Option<GraphStatus> {
        let graph = self.current_snapshot().await?;
        Some(GraphStatus {
            port_count: graph.port_count(),
            connection_count: graph.connection_count(),
            built_at: graph.built_at,
            build_time_ms: graph.build_time_ms,
            mode_counts: graph.connection_count_by_mode(),
        })
    }

    /// Full-network projection for the visualization frontend.
    pub async fn graph_view(&self) -> Option<GraphView> {
        let graph = self.current_snapshot().await?;
        Some(graph_view(&graph))
    }
}

impl Default for RoutePlanner {
    fn default() -> Self {
        RoutePlanner::new(OptimizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::CriteriaWeights;

    fn port_record(id: &str) -> PortRecord {
        PortRecord {
            id: id.to_string(),
            name: format!("Port {}", id),
            lat: 0.0,
            lon: 0.0,
            capacity_tonnes: 10_000.0,
            region: "LATAM".to_string(),
        }
    }

    fn connection_record(from: &str, to: &str, distance_km: f64) -> ConnectionRecord {
        ConnectionRecord {
            from_id: from.to_string(),
            to_id: to.to_string(),
            mode: "MARITIME".to_string(),
            distance_km,
            transit_hours: 24.0,
            cost_usd: 1_000.0,
            risk_factor: 0.1,
            capacity_tonnes: None,
            restricted: false,
        }
    }

    fn request(origin: &str, destination: &str) -> RouteRequest {
        RouteRequest {
            origin: origin.to_string(),
            destination: destination.to_string(),
            criteria: OptimizationCriteria {
                weights: CriteriaWeights {
                    distance: 1.0,
                    time: 0.0,
                    cost: 0.0,
                    risk: 0.0,
                },
                ..OptimizationCriteria::default()
            },
        }
    }

    #[tokio::test]
    async fn test_no_snapshot_means_graph_unavailable() {
        let planner = RoutePlanner::default();
        let err = planner.plan_route(&request("A", "C")).await.unwrap_err();
        assert!(matches!(err, PlanError::GraphUnavailable));

        let err = planner
            .plan_alternatives(&request("A", "C"), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::GraphUnavailable));

        assert!(planner.graph_status().await.is_none());
    }

    #[tokio::test]
    async fn test_ingest_then_plan() {
        let planner = RoutePlanner::default();

        let report = planner
            .ingest(
                vec![port_record("A"), port_record("B"), port_record("C")],
                vec![
                    connection_record("A", "B", 10.0),
                    connection_record("B", "C", 10.0),
                    connection_record("A", "C", 30.0),
                ],
            )
            .await;
        assert_eq!(report.connections_accepted, 3);

        let response = planner.plan_route(&request("A", "C")).await.unwrap();
        assert_eq!(response.route.origin, "A");
        assert_eq!(response.route.destination, "C");
        assert_eq!(response.route.edges.len(), 2);

        let alternatives = planner
            .plan_alternatives(&request("A", "C"), 5)
            .await
            .unwrap();
        assert_eq!(alternatives.routes.len(), 2);

        let status = planner.graph_status().await.unwrap();
        assert_eq!(status.port_count, 3);
        assert_eq!(status.connection_count, 3);
        assert_eq!(status.mode_counts.get(&RouteMode::Maritime), Some(&3));
    }

    #[tokio::test]
    async fn test_optimizer_errors_surface_verbatim() {
        let planner = RoutePlanner::default();
        planner
            .ingest(vec![port_record("A")], vec![])
            .await;

        let err = planner
            .plan_route(&request("A", "GHOST"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::Optimize(OptimizeError::InvalidCriteria(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_swap_is_atomic_for_in_flight_requests() {
        let planner = RoutePlanner::default();

        planner
            .ingest(
                vec![port_record("A"), port_record("B"), port_record("C")],
                vec![
                    connection_record("A", "B", 10.0),
                    connection_record("B", "C", 10.0),
                ],
            )
            .await;

        // Simulate an in-flight request: it has already resolved the
        // current snapshot when a re-ingestion lands.
        let held = planner.current_snapshot().await.unwrap();

        planner
            .ingest(
                vec![port_record("A"), port_record("C")],
                vec![connection_record("A", "C", 5.0)],
            )
            .await;

        // The held snapshot still has the old topology.
        assert_eq!(held.port_count(), 3);
        assert!(held.has_port("B"));

        let optimizer = Optimizer::new(OptimizerConfig::default());
        let old_plan = optimizer
            .compute_route(&held, "A", "C", &request("A", "C").criteria)
            .unwrap();
        assert_eq!(old_plan.hop_count(), 2);

        // New requests see the new topology.
        let response = planner.plan_route(&request("A", "C")).await.unwrap();
        assert_eq!(response.route.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_and_ingestion() {
        let planner = Arc::new(RoutePlanner::default());
        planner
            .ingest(
                vec![port_record("A"), port_record("B"), port_record("C")],
                vec![
                    connection_record("A", "B", 10.0),
                    connection_record("B", "C", 10.0),
                ],
            )
            .await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let planner = Arc::clone(&planner);
            handles.push(tokio::spawn(async move {
                planner.plan_route(&request("A", "C")).await
            }));
        }

        let swapper = {
            let planner = Arc::clone(&planner);
            tokio::spawn(async move {
                planner
                    .ingest(
                        vec![port_record("A"), port_record("C")],
                        vec![connection_record("A", "C", 5.0)],
                    )
                    .await
            })
        };

        for handle in handles {
            // Every request resolves against a complete snapshot: either
            // the two-hop old graph or the one-hop new one, never a torn mix.
            let response = handle.await.unwrap().unwrap();
            let hops = response.route.edges.len();
            assert!(hops == 1 || hops == 2);
        }
        swapper.await.unwrap();
    }
}
