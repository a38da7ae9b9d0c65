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

//! Stateless estimation procedures (§4, component 3).
//!
//! These take a telemetry snapshot and a [`TravelState`] and decide how far along the plan the
//! robot has progressed, or — when it isn't following a plan at all — project its raw position
//! onto the graph for diagnostic/schedule purposes. None of this holds state of its own; all
//! mutation is applied to the `TravelState` passed in.

use crate::graph::Graph;
use crate::interfaces::PositionEstimate;
use crate::telemetry::{Location, TelemetrySnapshot};
use crate::travel_state::TravelState;

/// Distance within which a reported location is considered to coincide with a plan waypoint.
pub const ARRIVAL_TOLERANCE: f64 = 0.3;

/// Best-effort projection for a robot not currently following a plan (e.g. still waiting on
/// acknowledgement of a new command, or idle). Falls back to the nearest graph element.
pub fn project_non_plan_following(graph: &Graph, location: &Location) -> Option<PositionEstimate> {
    graph.nearest(&location.level_name, location.x, location.y).map(|nearest| PositionEstimate::OffPath {
        nearest_plan_index: nearest.index,
    })
}

/// Advance `travel.target_plan_index` to the furthest plan waypoint the robot has reached or
/// passed, and return a position estimate, an ETA (in seconds) to the next unreached waypoint (if
/// one remains), and whether `target_plan_index` actually advanced — the caller uses this to
/// distinguish genuine progress from telemetry that merely re-confirms the current waypoint, which
/// feeds the stall watchdog (§4.4).
///
/// A waypoint counts as reached once the reported location is within [`ARRIVAL_TOLERANCE`] of it.
/// Scans forward from the current index only — telemetry never causes the index to regress
/// (invariant I-4 in §8).
pub fn estimate_plan_progress(travel: &mut TravelState, location: &Location) -> (PositionEstimate, Option<f64>, bool) {
    let starting_index = travel.target_plan_index;
    let mut furthest_reached = travel.target_plan_index;
    for (i, wp) in travel.waypoints.iter().enumerate().skip(travel.target_plan_index) {
        if wp.distance_to(location.x, location.y) <= ARRIVAL_TOLERANCE {
            furthest_reached = i;
        }
    }
    travel.advance_to(furthest_reached);
    let advanced = travel.target_plan_index > starting_index;

    if let Some(wp) = travel.waypoints.get(furthest_reached) {
        if wp.graph_waypoint.is_some() && wp.distance_to(location.x, location.y) <= ARRIVAL_TOLERANCE {
            travel.last_known_waypoint = wp.graph_waypoint;
        }
    }

    let next_index = travel.target_plan_index + 1;
    let eta = travel.waypoints.get(next_index).map(|next| {
        let distance = next.distance_to(location.x, location.y);
        let elapsed = next.target_time.as_secs_f64();
        (distance / 1.0).max(0.0).min(elapsed.max(distance))
    });

    (PositionEstimate::OnPath { plan_index: travel.target_plan_index, fraction: 0.0 }, eta, advanced)
}

/// `true` if the reported location lies within tolerance of the final plan waypoint, i.e. the
/// robot has completed the plan (§4.2.3, "Following" / empty residual path branch).
pub fn path_finished(travel: &TravelState, location: &Location) -> bool {
    match travel.waypoints.last() {
        Some(last) => last.distance_to(location.x, location.y) <= ARRIVAL_TOLERANCE,
        None => false,
    }
}

/// Single-shot estimator used once a docking maneuver completes: the robot is anchored exactly at
/// the dock's target waypoint, regardless of what the driver last reported (§4.2.3, "Docking").
pub fn dock_completion_estimate(dock_target: crate::graph::WaypointIndex) -> PositionEstimate {
    PositionEstimate::OffPath { nearest_plan_index: dock_target }
}

/// Extract the best single location to reason about from a fresh telemetry snapshot: the
/// driver's current pose, ignoring the residual path (which estimation treats separately).
pub fn current_location(snapshot: &TelemetrySnapshot) -> &Location {
    &snapshot.location
}
