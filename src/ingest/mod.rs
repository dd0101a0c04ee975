//! Graph Builder / Ingestor
//!
//! Turns raw port and connection rows (delivered by the Port Management
//! collaborator, already decoded from CSV) into a validated `PortGraph`
//! snapshot. Malformed rows are collected into a `BuildReport` instead of
//! aborting the build: one bad row must not block the whole network.

use crate::graph::{Connection, GraphError, Port, PortGraph, RouteMode};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

/// Raw port row from Port Management
#[derive(Debug, Clone, Deserialize)]
pub struct PortRecord {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub capacity_tonnes: f64,
    pub region: String,
}

/// Raw connection row from Port Management
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionRecord {
    pub from_id: String,
    pub to_id: String,
    pub mode: String,
    pub distance_km: f64,
    pub transit_hours: f64,
    pub cost_usd: f64,
    pub risk_factor: f64,
    #[serde(default)]
    pub capacity_tonnes: Option<f64>,
    #[serde(default)]
    pub restricted: bool,
}

/// Row-level rejection reasons
#[derive(Debug, Error)]
pub enum RowError {
    #[error("port id is empty")]
    EmptyPortId,

    #[error("coordinates ({lat}, {lon}) are out of range")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("{field} is not a finite number")]
    NotFinite { field: &'static str },

    #[error("{field} is negative")]
    Negative { field: &'static str },

    #[error("risk factor {0} is outside [0, 1]")]
    RiskOutOfRange(f64),

    #[error("unknown route mode {0:?}")]
    UnknownMode(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Port,
    Connection,
}

/// A rejected input row with the reason it was skipped
#[derive(Debug)]
pub struct RejectedRow {
    pub kind: RowKind,
    /// Position in the input batch
    pub index: usize,
    pub reason: RowError,
}

/// Outcome of a snapshot build
#[derive(Debug, Default)]
pub struct BuildReport {
    pub ports_accepted: usize,
    /// Duplicate port ids overwritten last-write-wins within the batch
    pub ports_superseded: usize,
    pub connections_accepted: usize,
    pub rejected: Vec<RejectedRow>,
}

impl BuildReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// Build an immutable graph snapshot from raw rows.
///
/// Always succeeds: invalid rows are skipped and reported, and an empty
/// input yields an empty but valid graph.
pub fn build_snapshot(
    ports: Vec<PortRecord>,
    connections: Vec<ConnectionRecord>,
) -> (PortGraph, BuildReport) {
    let start = std::time::Instant::now();
    let mut report = BuildReport::default();

    // Validate and deduplicate ports. Last write wins within a batch, at
    // the position the id was first seen.
    let mut accepted: Vec<PortRecord> = Vec::new();
    let mut slot_by_id: HashMap<String, usize> = HashMap::new();

    for (index, record) in ports.into_iter().enumerate() {
        if let Err(reason) = validate_port(&record) {
            warn!(index, %reason, "skipping malformed port row");
            report.rejected.push(RejectedRow {
                kind: RowKind::Port,
                index,
                reason,
            });
            continue;
        }

        match slot_by_id.get(&record.id) {
            Some(&slot) => {
                accepted[slot] = record;
                report.ports_superseded += 1;
            }
            None => {
                slot_by_id.insert(record.id.clone(), accepted.len());
                accepted.push(record);
            }
        }
    }

    let mut graph = PortGraph::new();

    for record in accepted {
        // Cannot collide after deduplication, but a rejected row is still
        // preferable to a crash.
        if let Err(e) = graph.add_port(Port {
            id: record.id,
            name: record.name,
            lat: record.lat,
            lon: record.lon,
            capacity_tonnes: record.capacity_tonnes,
            region: record.region,
        }) {
            warn!(error = %e, "skipping port rejected by the graph");
            continue;
        }
        report.ports_accepted += 1;
    }

    for (index, record) in connections.into_iter().enumerate() {
        match validate_connection(&record) {
            Ok(mode) => {
                let connection = Connection {
                    mode,
                    distance_km: record.distance_km,
                    transit_hours: record.transit_hours,
                    cost_usd: Decimal::from_f64_retain(record.cost_usd)
                        .unwrap_or(Decimal::ZERO),
                    risk_factor: record.risk_factor,
                    capacity_tonnes: record.capacity_tonnes,
                    restricted: record.restricted,
                };

                match graph.add_connection(&record.from_id, &record.to_id, connection) {
                    Ok(_) => report.connections_accepted += 1,
                    Err(e) => {
                        warn!(index, error = %e, "skipping dangling connection row");
                        report.rejected.push(RejectedRow {
                            kind: RowKind::Connection,
                            index,
                            reason: e.into(),
                        });
                    }
                }
            }
            Err(reason) => {
                warn!(index, %reason, "skipping malformed connection row");
                report.rejected.push(RejectedRow {
                    kind: RowKind::Connection,
                    index,
                    reason,
                });
            }
        }
    }

    graph.built_at = Utc::now();
    graph.build_time_ms = start.elapsed().as_millis() as u64;

    info!(
        ports = report.ports_accepted,
        connections = report.connections_accepted,
        rejected = report.rejected.len(),
        build_time_ms = graph.build_time_ms,
        "port graph snapshot built"
    );

    (graph, report)
}

fn validate_port(record: &PortRecord) -> Result<(), RowError> {
    if record.id.trim().is_empty() {
        return Err(RowError::EmptyPortId);
    }
    require_finite(record.lat, "lat")?;
    require_finite(record.lon, "lon")?;
    if record.lat.abs() > 90.0 || record.lon.abs() > 180.0 {
        return Err(RowError::InvalidCoordinates {
            lat: record.lat,
            lon: record.lon,
        });
    }
    require_non_negative(record.capacity_tonnes, "capacity_tonnes")?;
    Ok(())
}

fn validate_connection(record: &ConnectionRecord) -> Result<RouteMode, RowError> {
    let mode = RouteMode::parse(&record.mode)
        .ok_or_else(|| RowError::UnknownMode(record.mode.clone()))?;

    require_non_negative(record.distance_km, "distance_km")?;
    require_non_negative(record.transit_hours, "transit_hours")?;
    require_non_negative(record.cost_usd, "cost_usd")?;
    require_finite(record.risk_factor, "risk_factor")?;
    if !(0.0..=1.0).contains(&record.risk_factor) {
        return Err(RowError::RiskOutOfRange(record.risk_factor));
    }
    if let Some(capacity) = record.capacity_tonnes {
        require_non_negative(capacity, "capacity_tonnes")?;
    }
    Ok(mode)
}

fn require_finite(value: f64, field: &'static str) -> Result<(), RowError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RowError::NotFinite { field })
    }
}

fn require_non_negative(value: f64, field: &'static str) -> Result<(), RowError> {
    require_finite(value, field)?;
    if value < 0.0 {
        return Err(RowError::Negative { field });
    }
    Ok(())
}
