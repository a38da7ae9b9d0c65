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

//! Wire message shapes at the system boundary (§6). Bit-compatibility with any particular
//! transport is not the core's concern — only field semantics are — so these are plain structs
//! with no serialization derive; `fleet_cli` is responsible for marshaling them onto whatever
//! publish/subscribe transport it is wired to.

use crate::graph::LaneIndex;
use crate::telemetry::{Location, RobotMode, TelemetrySnapshot};

/// A batch of telemetry for every robot in one fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetState {
    /// Name of the fleet this batch belongs to.
    pub fleet_name: String,
    /// One entry per robot that reported in this batch.
    pub robots: Vec<RobotState>,
}

/// Telemetry for a single robot, as received from the driver. This is the wire shape;
/// [`TelemetrySnapshot`] is the shape the core actually reconciles against.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    /// Name of the robot.
    pub name: String,
    /// Task id echoed back by the driver.
    pub task_id: String,
    /// Current operating mode.
    pub mode: RobotMode,
    /// Battery percentage, possibly outside `[0, 100]`.
    pub battery_percent: f64,
    /// Current location.
    pub location: Location,
    /// Remaining path, empty once the driver believes it has arrived.
    pub path: Vec<Location>,
}

impl From<RobotState> for TelemetrySnapshot {
    fn from(state: RobotState) -> Self {
        TelemetrySnapshot {
            name: state.name,
            task_id: state.task_id,
            mode: state.mode,
            battery_percent: state.battery_percent,
            location: state.location,
            path: state.path,
        }
    }
}

/// One waypoint of a [`PathRequest`], with an optional per-waypoint speed limit.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRequestWaypoint {
    /// Location to pass through.
    pub location: Location,
    /// Speed limit to obey while approaching this waypoint, if the approach lanes carry one
    /// (§4.2.1).
    pub approach_speed_limit: Option<f64>,
}

/// Command telling the driver to follow a path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRequest {
    /// Fleet this command belongs to.
    pub fleet_name: String,
    /// Robot this command is addressed to.
    pub robot_name: String,
    /// Task id of this command; the driver must echo it back in telemetry.
    pub task_id: String,
    /// Waypoints to follow, in order.
    pub path: Vec<PathRequestWaypoint>,
}

/// Command telling the driver to switch into a named mode (e.g. docking), with parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeRequest {
    /// Fleet this command belongs to.
    pub fleet_name: String,
    /// Robot this command is addressed to.
    pub robot_name: String,
    /// Task id of this command; the driver must echo it back in telemetry.
    pub task_id: String,
    /// Requested mode name (e.g. `"docking"`).
    pub mode: String,
    /// Free-form parameters (e.g. `[("dock_name", "D1")]`).
    pub parameters: Vec<(String, String)>,
}

/// Request to close or re-open a set of lanes.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneRequest {
    /// Fleet this request targets.
    pub fleet_name: String,
    /// Lanes to close.
    pub close_lanes: Vec<LaneIndex>,
    /// Lanes to re-open.
    pub open_lanes: Vec<LaneIndex>,
}

/// Status broadcast of the fleet's authoritative closed-lane set.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedLanes {
    /// Fleet this status is about.
    pub fleet_name: String,
    /// Every lane currently closed.
    pub closed_lanes: Vec<LaneIndex>,
}

/// Request to add or remove per-lane speed limits.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedLimitRequest {
    /// Fleet this request targets.
    pub fleet_name: String,
    /// Lanes to set a speed limit on, and the limit to set.
    pub speed_limits: Vec<(LaneIndex, f64)>,
    /// Lanes to remove any existing speed limit from.
    pub remove_limits: Vec<LaneIndex>,
}

/// Which half of the interrupt protocol a [`InterruptRequest`] represents (§4.2.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptType {
    /// Ask the robot to pause whatever it is doing.
    Interrupt,
    /// Resume a previously interrupted robot.
    Resume,
}

/// One half of the two-message interrupt protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptRequest {
    /// Fleet this request targets.
    pub fleet_name: String,
    /// Robot this request targets.
    pub robot_name: String,
    /// Opaque id correlating an `Interrupt` with its matching `Resume`.
    pub interrupt_id: String,
    /// Which half of the protocol this message represents.
    pub kind: InterruptType,
    /// Free-form labels carried with a `Resume`.
    pub labels: Vec<String>,
}
