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

//! The plan a [`crate::command::RobotCommandHandle`] is currently following, and what it knows
//! about progress along it (§3).

use crate::graph::WaypointIndex;
use crate::plan::PlanWaypoint;

/// Everything the handle tracks about an in-progress `Following` command.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelState {
    /// The plan being followed, as last sent to the driver.
    pub waypoints: Vec<PlanWaypoint>,
    /// Index into `waypoints` of the last one the robot is believed to have reached.
    pub target_plan_index: usize,
    /// The most recent graph waypoint the robot is known to have passed through, if any. Used to
    /// recompute approach lanes after a replan.
    pub last_known_waypoint: Option<WaypointIndex>,
}

impl TravelState {
    /// Begin tracking a freshly issued plan, starting at its first waypoint.
    pub fn new(waypoints: Vec<PlanWaypoint>) -> Self {
        Self { waypoints, target_plan_index: 0, last_known_waypoint: None }
    }

    /// `true` once every waypoint in the plan has been reached.
    pub fn is_finished(&self) -> bool {
        !self.waypoints.is_empty() && self.target_plan_index >= self.waypoints.len() - 1
    }

    /// The waypoint the robot is currently advancing toward, if the plan isn't finished.
    pub fn current_target(&self) -> Option<&PlanWaypoint> {
        self.waypoints.get(self.target_plan_index)
    }

    /// Advance the tracked index to `plan_index`, clamped to the plan's bounds. Never moves the
    /// index backward; telemetry that regresses is treated as stale (§4.2.1, invariant I-4).
    pub fn advance_to(&mut self, plan_index: usize) {
        let clamped = plan_index.min(self.waypoints.len().saturating_sub(1));
        if clamped > self.target_plan_index {
            self.target_plan_index = clamped;
        }
    }
}
