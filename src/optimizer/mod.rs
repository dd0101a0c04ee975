//! Multi-Criteria Route Optimizer
//!
//! Weighted shortest-path search over a port graph snapshot. Each
//! connection's traversal cost is the weighted sum of its per-criterion
//! values, min-max normalized across the snapshot so no unit dominates.
//! All normalized costs are non-negative, so a priority-queue best-first
//! search (Dijkstra) is exact. Alternatives use Yen's k-shortest loop-free
//! paths on top of the same search.

use crate::graph::{Connection, PortGraph, RouteMode};
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Objective weights, one per criterion. All must be non-negative and at
/// least one positive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CriteriaWeights {
    pub distance: f64,
    pub time: f64,
    pub cost: f64,
    pub risk: f64,
}

impl Default for CriteriaWeights {
    fn default() -> Self {
        CriteriaWeights {
            distance: 0.4,
            time: 0.3,
            cost: 0.2,
            risk: 0.1,
        }
    }
}

/// Optimization request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationCriteria {
    pub weights: CriteriaWeights,
    /// Hard bound on total transit time
    pub max_transit_hours: Option<f64>,
    /// Hard bound on total cost
    pub max_cost_usd: Option<Decimal>,
    /// Ports that must not appear on the route
    pub excluded_ports: HashSet<String>,
    /// Export weight; ports and connections without enough capacity are
    /// never traversed
    pub cargo_tonnes: Option<f64>,
}

impl Default for OptimizationCriteria {
    fn default() -> Self {
        OptimizationCriteria {
            weights: CriteriaWeights::default(),
            max_transit_hours: None,
            max_cost_usd: None,
            excluded_ports: HashSet::new(),
            cargo_tonnes: None,
        }
    }
}

impl OptimizationCriteria {
    fn validate(&self) -> Result<(), CriteriaError> {
        let weights = [
            (self.weights.distance, "distance"),
            (self.weights.time, "time"),
            (self.weights.cost, "cost"),
            (self.weights.risk, "risk"),
        ];

        for (value, criterion) in weights {
            if !value.is_finite() {
                return Err(CriteriaError::NonFiniteWeight { criterion });
            }
            if value < 0.0 {
                return Err(CriteriaError::NegativeWeight { criterion });
            }
        }

        if weights.iter().all(|(value, _)| *value == 0.0) {
            return Err(CriteriaError::AllWeightsZero);
        }

        Ok(())
    }
}

/// Reasons a request is rejected before any search runs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CriteriaError {
    #[error("all criterion weights are zero")]
    AllWeightsZero,

    #[error("weight for {criterion} is negative")]
    NegativeWeight { criterion: &'static str },

    #[error("weight for {criterion} is not finite")]
    NonFiniteWeight { criterion: &'static str },

    #[error("unknown origin port {0}")]
    UnknownOrigin(String),

    #[error("unknown destination port {0}")]
    UnknownDestination(String),
}

/// Route computation failures, fatal to the single request only
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("invalid criteria: {0}")]
    InvalidCriteria(#[from] CriteriaError),

    #[error("no route from {origin} to {destination} satisfies the request")]
    NoRouteFound { origin: String, destination: String },

    #[error("optimization exceeded the {budget_ms}ms wall-clock budget")]
    Timeout { budget_ms: u64 },
}

/// One traversed connection on a computed route
#[derive(Debug, Clone, Serialize)]
pub struct RouteHop {
    pub from_id: String,
    pub to_id: String,
    pub mode: RouteMode,
    pub distance_km: f64,
    pub transit_hours: f64,
    pub cost_usd: Decimal,
    pub risk_factor: f64,
    /// This hop's contribution to the weighted score
    pub weighted_cost: f64,
}

/// Aggregates per criterion over a route
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CriterionTotals {
    pub distance_km: f64,
    pub transit_hours: f64,
    pub cost_usd: Decimal,
    pub risk: f64,
}

impl CriterionTotals {
    fn accumulate(&mut self, connection: &Connection) {
        self.distance_km += connection.distance_km;
        self.transit_hours += connection.transit_hours;
        self.cost_usd += connection.cost_usd;
        self.risk += connection.risk_factor;
    }
}

/// A computed route, immutable once returned. Persistence is the caller's
/// concern.
#[derive(Debug, Clone, Serialize)]
pub struct RoutePlan {
    pub plan_id: String,
    pub origin: String,
    pub destination: String,
    pub hops: Vec<RouteHop>,
    pub totals: CriterionTotals,
    pub weighted_score: f64,
}

impl RoutePlan {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

/// Optimizer tuning
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Wall-clock budget for a single computation
    pub time_budget: Duration,
    /// Hard cap on hops per route
    pub max_hops: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            time_budget: Duration::from_secs(5),
            max_hops: 32,
        }
    }
}

/// Min-max value range of one criterion across a snapshot
#[derive(Debug, Clone, Copy)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn empty() -> Self {
        Range {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn observe(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn normalize(&self, value: f64) -> f64 {
        if self.max > self.min {
            (value - self.min) / (self.max - self.min)
        } else {
            0.0
        }
    }
}

/// Per-criterion normalizer computed once per snapshot and search
struct EdgeNormalizer {
    distance: Range,
    time: Range,
    cost: Range,
    risk: Range,
}

impl EdgeNormalizer {
    fn for_graph(graph: &PortGraph) -> Self {
        let mut distance = Range::empty();
        let mut time = Range::empty();
        let mut cost = Range::empty();
        let mut risk = Range::empty();

        for conn in graph.connections() {
            distance.observe(conn.distance_km);
            time.observe(conn.transit_hours);
            cost.observe(conn.cost_usd.to_f64().unwrap_or(0.0));
            risk.observe(conn.risk_factor);
        }

        EdgeNormalizer {
            distance,
            time,
            cost,
            risk,
        }
    }

    fn weighted_cost(&self, conn: &Connection, weights: &CriteriaWeights) -> f64 {
        weights.distance * self.distance.normalize(conn.distance_km)
            + weights.time * self.time.normalize(conn.transit_hours)
            + weights.cost * self.cost.normalize(conn.cost_usd.to_f64().unwrap_or(0.0))
            + weights.risk * self.risk.normalize(conn.risk_factor)
    }
}

/// Frontier state of the best-first search. Ordered by ascending weighted
/// score, then hop count, then lexicographic port-id path, so repeated
/// searches over the same snapshot are fully deterministic.
#[derive(Clone)]
struct SearchState {
    node: NodeIndex,
    score: f64,
    transit_hours: f64,
    cost_usd: Decimal,
    edges: Vec<EdgeIndex>,
    nodes: Vec<NodeIndex>,
    ids: Vec<String>,
}

impl Eq for SearchState {}

impl PartialEq for SearchState {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for SearchState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.edges.len().cmp(&self.edges.len()))
            .then_with(|| other.ids.cmp(&self.ids))
    }
}

impl PartialOrd for SearchState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A raw path found by the search, before conversion into a `RoutePlan`
#[derive(Debug, Clone)]
struct SearchPath {
    nodes: Vec<NodeIndex>,
    ids: Vec<String>,
    edges: Vec<EdgeIndex>,
    score: f64,
}

impl SearchPath {
    fn hop_count(&self) -> usize {
        self.edges.len()
    }
}

/// Route optimizer
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Optimizer { config }
    }

    /// Compute the best route under the given criteria.
    pub fn compute_route(
        &self,
        graph: &PortGraph,
        origin: &str,
        destination: &str,
        criteria: &OptimizationCriteria,
    ) -> Result<RoutePlan, OptimizeError> {
        let started = Instant::now();
        let deadline = started + self.config.time_budget;
        let (origin_idx, destination_idx) =
            resolve_endpoints(graph, origin, destination, criteria)?;

        let normalizer = EdgeNormalizer::for_graph(graph);
        let path = self
            .shortest_path(
                graph,
                &normalizer,
                criteria,
                origin_idx,
                destination_idx,
                &HashSet::new(),
                &HashSet::new(),
                self.config.max_hops,
                deadline,
            )?
            .ok_or_else(|| OptimizeError::NoRouteFound {
                origin: origin.to_string(),
                destination: destination.to_string(),
            })?;

        debug!(
            origin,
            destination,
            hops = path.hop_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "route computed"
        );

        Ok(path_to_plan(graph, &normalizer, criteria, &path))
    }

    /// Compute up to `k` loop-free alternative routes, ranked by ascending
    /// weighted score (Yen's algorithm).
    pub fn compute_alternatives(
        &self,
        graph: &PortGraph,
        origin: &str,
        destination: &str,
        criteria: &OptimizationCriteria,
        k: usize,
    ) -> Result<Vec<RoutePlan>, OptimizeError> {
        let started = Instant::now();
        let deadline = started + self.config.time_budget;
        let (origin_idx, destination_idx) =
            resolve_endpoints(graph, origin, destination, criteria)?;

        if k == 0 {
            return Ok(vec![]);
        }

        let normalizer = EdgeNormalizer::for_graph(graph);

        let first = self
            .shortest_path(
                graph,
                &normalizer,
                criteria,
                origin_idx,
                destination_idx,
                &HashSet::new(),
                &HashSet::new(),
                self.config.max_hops,
                deadline,
            )?
            .ok_or_else(|| OptimizeError::NoRouteFound {
                origin: origin.to_string(),
                destination: destination.to_string(),
            })?;

        let mut accepted: Vec<SearchPath> = vec![first];
        let mut candidates: Vec<SearchPath> = Vec::new();
        let mut seen: HashSet<Vec<EdgeIndex>> = HashSet::new();
        seen.insert(accepted[0].edges.clone());

        'outer: while accepted.len() < k {
            let previous = match accepted.last() {
                Some(path) => path.clone(),
                None => break 'outer,
            };

            for spur_idx in 0..previous.edges.len() {
                self.check_deadline(deadline)?;

                let spur_node = previous.nodes[spur_idx];
                let root_edges = &previous.edges[..spur_idx];

                // Edges already taken from this root by accepted paths must
                // not be reused for the spur.
                let mut banned_edges: HashSet<EdgeIndex> = HashSet::new();
                for path in &accepted {
                    if path.edges.len() > spur_idx && path.edges[..spur_idx] == *root_edges {
                        banned_edges.insert(path.edges[spur_idx]);
                    }
                }

                // Root ports (except the spur node) are off limits to keep
                // paths loop-free.
                let banned_nodes: HashSet<NodeIndex> =
                    previous.nodes[..spur_idx].iter().copied().collect();

                // Budgets shrink by what the root prefix already consumed.
                let (root_score, root_totals) =
                    prefix_aggregates(graph, &normalizer, criteria, root_edges);
                let mut spur_criteria = criteria.clone();
                if let Some(max) = criteria.max_transit_hours {
                    spur_criteria.max_transit_hours = Some(max - root_totals.transit_hours);
                }
                if let Some(max) = criteria.max_cost_usd {
                    spur_criteria.max_cost_usd = Some(max - root_totals.cost_usd);
                }

                let spur = self.shortest_path(
                    graph,
                    &normalizer,
                    &spur_criteria,
                    spur_node,
                    destination_idx,
                    &banned_nodes,
                    &banned_edges,
                    self.config.max_hops.saturating_sub(spur_idx),
                    deadline,
                )?;

                let Some(spur) = spur else {
                    continue;
                };

                let mut edges = previous.edges[..spur_idx].to_vec();
                edges.extend_from_slice(&spur.edges);
                if !seen.insert(edges.clone()) {
                    continue;
                }

                let mut nodes = previous.nodes[..spur_idx].to_vec();
                nodes.extend_from_slice(&spur.nodes);
                let mut ids = previous.ids[..spur_idx].to_vec();
                ids.extend(spur.ids.iter().cloned());

                candidates.push(SearchPath {
                    nodes,
                    ids,
                    edges,
                    score: root_score + spur.score,
                });
            }

            if candidates.is_empty() {
                break;
            }

            candidates.sort_by(compare_paths);
            accepted.push(candidates.remove(0));
        }

        debug!(
            origin,
            destination,
            requested = k,
            found = accepted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "alternatives computed"
        );

        let mut plans: Vec<RoutePlan> = accepted
            .into_par_iter()
            .map(|path| path_to_plan(graph, &normalizer, criteria, &path))
            .collect();
        plans.sort_by(|a, b| a.weighted_score.total_cmp(&b.weighted_score));
        Ok(plans)
    }

    fn check_deadline(&self, deadline: Instant) -> Result<(), OptimizeError> {
        if Instant::now() >= deadline {
            return Err(OptimizeError::Timeout {
                budget_ms: self.config.time_budget.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Best-first search from `origin` to `destination` honoring the hard
    /// constraints, banned sets, and hop cap. `Ok(None)` means unreachable.
    #[allow(clippy::too_many_arguments)]
    fn shortest_path(
        &self,
        graph: &PortGraph,
        normalizer: &EdgeNormalizer,
        criteria: &OptimizationCriteria,
        origin: NodeIndex,
        destination: NodeIndex,
        banned_nodes: &HashSet<NodeIndex>,
        banned_edges: &HashSet<EdgeIndex>,
        max_hops: usize,
        deadline: Instant,
    ) -> Result<Option<SearchPath>, OptimizeError> {
        let inner = graph.inner();
        let mut heap = BinaryHeap::new();
        let mut settled: HashSet<NodeIndex> = HashSet::new();
        // With an accumulative bound active, score alone does not settle a
        // node: a cheaper state can burn more budget than a pricier one, so
        // each node keeps the non-dominated (score, hours, cost) labels.
        let bounded = criteria.max_transit_hours.is_some() || criteria.max_cost_usd.is_some();
        let mut frontiers: HashMap<NodeIndex, Vec<(f64, f64, Decimal)>> = HashMap::new();

        heap.push(SearchState {
            node: origin,
            score: 0.0,
            transit_hours: 0.0,
            cost_usd: Decimal::ZERO,
            edges: Vec::new(),
            nodes: vec![origin],
            ids: vec![inner[origin].id.clone()],
        });

        while let Some(state) = heap.pop() {
            self.check_deadline(deadline)?;

            if state.node == destination {
                return Ok(Some(SearchPath {
                    nodes: state.nodes,
                    ids: state.ids,
                    edges: state.edges,
                    score: state.score,
                }));
            }

            if bounded {
                let labels = frontiers.entry(state.node).or_default();
                if labels.iter().any(|&(score, hours, cost)| {
                    score <= state.score
                        && hours <= state.transit_hours
                        && cost <= state.cost_usd
                }) {
                    continue;
                }
                labels.retain(|&(score, hours, cost)| {
                    !(state.score <= score
                        && state.transit_hours <= hours
                        && state.cost_usd <= cost)
                });
                labels.push((state.score, state.transit_hours, state.cost_usd));
            } else {
                // First pop per node is optimal under the lexicographic
                // (score, hops, path) order; later pops are stale.
                if !settled.insert(state.node) {
                    continue;
                }
            }

            if state.edges.len() >= max_hops {
                continue;
            }

            for edge_ref in inner.edges(state.node) {
                if banned_edges.contains(&edge_ref.id()) {
                    continue;
                }

                let target = edge_ref.target();
                if banned_nodes.contains(&target) {
                    continue;
                }

                let conn = edge_ref.weight();
                if conn.restricted {
                    continue;
                }

                let port = &inner[target];
                if criteria.excluded_ports.contains(&port.id) {
                    continue;
                }
                if state.ids.contains(&port.id) {
                    continue;
                }

                if let Some(cargo) = criteria.cargo_tonnes {
                    if port.capacity_tonnes < cargo {
                        continue;
                    }
                    if conn.capacity_tonnes.is_some_and(|c| c < cargo) {
                        continue;
                    }
                }

                // Hard bounds prune the frontier instead of failing the
                // whole request.
                let transit_hours = state.transit_hours + conn.transit_hours;
                if criteria
                    .max_transit_hours
                    .is_some_and(|max| transit_hours > max)
                {
                    continue;
                }

                let cost_usd = state.cost_usd + conn.cost_usd;
                if criteria.max_cost_usd.is_some_and(|max| cost_usd > max) {
                    continue;
                }

                let mut edges = state.edges.clone();
                edges.push(edge_ref.id());
                let mut nodes = state.nodes.clone();
                nodes.push(target);
                let mut ids = state.ids.clone();
                ids.push(port.id.clone());

                heap.push(SearchState {
                    node: target,
                    score: state.score + normalizer.weighted_cost(conn, &criteria.weights),
                    transit_hours,
                    cost_usd,
                    edges,
                    nodes,
                    ids,
                });
            }
        }

        Ok(None)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::new(OptimizerConfig::default())
    }
}

fn resolve_endpoints(
    graph: &PortGraph,
    origin: &str,
    destination: &str,
    criteria: &OptimizationCriteria,
) -> Result<(NodeIndex, NodeIndex), OptimizeError> {
    criteria.validate()?;

    let origin_idx = graph
        .node_index(origin)
        .ok_or_else(|| CriteriaError::UnknownOrigin(origin.to_string()))?;
    let destination_idx = graph
        .node_index(destination)
        .ok_or_else(|| CriteriaError::UnknownDestination(destination.to_string()))?;

    // An excluded or capacity-short endpoint makes every path infeasible.
    let endpoints_blocked = [origin, destination].iter().any(|id| {
        if criteria.excluded_ports.contains(*id) {
            return true;
        }
        match (criteria.cargo_tonnes, graph.get_port(id)) {
            (Some(cargo), Some(port)) => port.capacity_tonnes < cargo,
            _ => false,
        }
    });

    if endpoints_blocked {
        return Err(OptimizeError::NoRouteFound {
            origin: origin.to_string(),
            destination: destination.to_string(),
        });
    }

    Ok((origin_idx, destination_idx))
}

fn compare_paths(a: &SearchPath, b: &SearchPath) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| a.hop_count().cmp(&b.hop_count()))
        .then_with(|| a.ids.cmp(&b.ids))
}

fn prefix_aggregates(
    graph: &PortGraph,
    normalizer: &EdgeNormalizer,
    criteria: &OptimizationCriteria,
    edges: &[EdgeIndex],
) -> (f64, CriterionTotals) {
    let inner = graph.inner();
    let mut score = 0.0;
    let mut totals = CriterionTotals::default();

    for &edge in edges {
        let conn = &inner[edge];
        score += normalizer.weighted_cost(conn, &criteria.weights);
        totals.accumulate(conn);
    }

    (score, totals)
}

fn path_to_plan(
    graph: &PortGraph,
    normalizer: &EdgeNormalizer,
    criteria: &OptimizationCriteria,
    path: &SearchPath,
) -> RoutePlan {
    let inner = graph.inner();
    let mut hops = Vec::with_capacity(path.edges.len());
    let mut totals = CriterionTotals::default();
    let mut weighted_score = 0.0;

    for (i, &edge) in path.edges.iter().enumerate() {
        let conn = &inner[edge];
        let weighted_cost = normalizer.weighted_cost(conn, &criteria.weights);

        totals.accumulate(conn);
        weighted_score += weighted_cost;

        hops.push(RouteHop {
            from_id: path.ids[i].clone(),
            to_id: path.ids[i + 1].clone(),
            mode: conn.mode,
            distance_km: conn.distance_km,
            transit_hours: conn.transit_hours,
            cost_usd: conn.cost_usd,
            risk_factor: conn.risk_factor,
            weighted_cost,
        });
    }

    RoutePlan {
        plan_id: Uuid::new_v4().to_string(),
        origin: path.ids.first().cloned().unwrap_or_default(),
        destination: path.ids.last().cloned().unwrap_or_default(),
        hops,
        totals,
        weighted_score,
    }
}
