// fleet_core: per-robot command & state-reconciliation engine for fleet adapters
// Copyright (C) 2024
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module containing all error types.
//!
//! Per §7 of the design, almost every failure mode encountered while reconciling telemetry is
//! recovered from locally (rebroadcast, replan, drop-and-log) and never surfaces as a
//! `Result::Err` — see the module docs on [`crate::command`]. [`AdapterError`] is reserved for
//! the failures that are fatal at setup time.

use thiserror::Error;

/// Errors that abort fleet-adapter startup. These are never produced while the control loop is
/// running; all runtime anomalies are handled locally and only logged (§7).
#[derive(Debug, Error, PartialEq)]
pub enum AdapterError {
    /// The fleet adapter configuration file could not be parsed (missing required key, wrong
    /// type, or malformed YAML).
    #[error("failed to parse fleet adapter configuration: {0}")]
    InvalidConfig(String),
    /// The navigation graph file could not be parsed.
    #[error("failed to parse navigation graph: {0}")]
    InvalidGraph(String),
    /// A lane references a waypoint index that does not exist.
    #[error("lane {lane} references unknown waypoint {waypoint}")]
    UnknownWaypoint {
        /// Offending lane index.
        lane: usize,
        /// Missing waypoint index.
        waypoint: usize,
    },
    /// Two waypoints in the navigation graph carry the same name.
    #[error("duplicate waypoint name '{0}'")]
    DuplicateWaypointName(String),
    /// A dock name configured for the fleet does not resolve to any lane in the graph (§9,
    /// "dock-lane discovery").
    #[error("dock '{0}' does not resolve to any lane in the navigation graph")]
    UnknownDock(String),
}
