//! Port Network Graph
//!
//! In-memory graph representation of the berry export network.
//! A snapshot is built once by the ingestor and never mutated afterwards;
//! the orchestrator shares it behind an `Arc`.

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Route mode of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMode {
    Maritime,
    Aerial,
}

impl std::fmt::Display for RouteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteMode::Maritime => write!(f, "MARITIME"),
            RouteMode::Aerial => write!(f, "AERIAL"),
        }
    }
}

impl RouteMode {
    pub fn parse(s: &str) -> Option<RouteMode> {
        match s.to_uppercase().as_str() {
            "MARITIME" => Some(RouteMode::Maritime),
            "AERIAL" => Some(RouteMode::Aerial),
            _ => None,
        }
    }
}

/// A port in the export network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub capacity_tonnes: f64,
    pub region: String,
}

/// A directed connection between two ports. Parallel connections between
/// the same pair are allowed (different carriers/modes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub mode: RouteMode,
    pub distance_km: f64,
    pub transit_hours: f64,
    pub cost_usd: Decimal,
    /// Spoilage/disruption risk for this leg, 0.0 - 1.0
    pub risk_factor: f64,
    pub capacity_tonnes: Option<f64>,
    pub restricted: bool,
}

/// Errors raised while assembling a graph within a single build pass
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("port {0} already exists in this snapshot")]
    DuplicatePort(String),

    #[error("connection {from} -> {to} references an unknown port")]
    DanglingConnection { from: String, to: String },
}

/// The port graph snapshot
pub struct PortGraph {
    /// The underlying directed multigraph
    graph: DiGraph<Port, Connection>,
    /// Map from port id to graph index
    port_index: HashMap<String, NodeIndex>,
    /// When the snapshot was built
    pub built_at: DateTime<Utc>,
    /// Build time in milliseconds
    pub build_time_ms: u64,
}

impl PortGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        PortGraph {
            graph: DiGraph::new(),
            port_index: HashMap::new(),
            built_at: Utc::now(),
            build_time_ms: 0,
        }
    }

    /// Add a port to the graph. Each id may only be added once per build pass.
    pub fn add_port(&mut self, port: Port) -> Result<NodeIndex, GraphError> {
        if self.port_index.contains_key(&port.id) {
            return Err(GraphError::DuplicatePort(port.id));
        }
        let id = port.id.clone();
        let idx = self.graph.add_node(port);
        self.port_index.insert(id, idx);
        Ok(idx)
    }

    /// Add a connection between two already-registered ports.
    pub fn add_connection(
        &mut self,
        from_id: &str,
        to_id: &str,
        connection: Connection,
    ) -> Result<EdgeIndex, GraphError> {
        match (self.port_index.get(from_id), self.port_index.get(to_id)) {
            (Some(&from_idx), Some(&to_idx)) => {
                Ok(self.graph.add_edge(from_idx, to_idx, connection))
            }
            _ => Err(GraphError::DanglingConnection {
                from: from_id.to_string(),
                to: to_id.to_string(),
            }),
        }
    }

    pub fn has_port(&self, id: &str) -> bool {
        self.port_index.contains_key(id)
    }

    /// Get port by id
    pub fn get_port(&self, id: &str) -> Option<&Port> {
        self.port_index.get(id).map(|&idx| &self.graph[idx])
    }

    /// Get graph index by port id
    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.port_index.get(id).copied()
    }

    /// Number of ports
    pub fn port_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of connections
    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Count connections by mode
    pub fn connection_count_by_mode(&self) -> HashMap<RouteMode, usize> {
        let mut counts = HashMap::new();
        for conn in self.graph.edge_weights() {
            *counts.entry(conn.mode).or_insert(0) += 1;
        }
        counts
    }

    /// All outgoing connections of a port, with the port they lead to.
    /// Unknown ids yield an empty iterator.
    pub fn neighbors<'a>(
        &'a self,
        id: &str,
    ) -> impl Iterator<Item = (&'a Connection, &'a Port)> + 'a {
        self.port_index.get(id).into_iter().flat_map(move |&idx| {
            self.graph
                .edges(idx)
                .map(move |e| (e.weight(), &self.graph[e.target()]))
        })
    }

    /// Get the underlying petgraph for search algorithms
    pub fn inner(&self) -> &DiGraph<Port, Connection> {
        &self.graph
    }

    /// Get all ports
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.graph.node_weights()
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.graph.edge_weights()
    }
}

impl Default for PortGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Great-circle distance between two ports in kilometers (haversine)
pub fn great_circle_km(a: &Port, b: &Port) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let delta_phi = (b.lat - a.lat).to_radians();
    let delta_lambda = (b.lon - a.lon).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}
