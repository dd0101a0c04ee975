//! BerrySend Route Optimization Core
//!
//! Computes optimized berry export routes between ports. Consumes port and
//! connection rows from Port Management, maintains an immutable port graph
//! snapshot, and serves multi-criteria route requests from Export
//! Management, with serialized projections for the visualization frontend.

pub mod export;
pub mod graph;
pub mod ingest;
pub mod optimizer;
pub mod service;

pub use export::{graph_view, route_view, GraphView, RouteView};
pub use graph::{Connection, GraphError, Port, PortGraph, RouteMode};
pub use ingest::{build_snapshot, BuildReport, ConnectionRecord, PortRecord, RowError};
pub use optimizer::{
    CriteriaError, CriteriaWeights, OptimizationCriteria, OptimizeError, Optimizer,
    OptimizerConfig, RoutePlan,
};
pub use service::{
    AlternativesResponse, GraphStatus, PlanError, RoutePlanner, RouteRequest, RouteResponse,
};
