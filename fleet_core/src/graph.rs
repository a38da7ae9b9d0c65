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

//! # Navigation graph
//!
//! This module holds the immutable navigation graph: [`Waypoint`]s and directed [`Lane`]s
//! between them, plus the pure geometry helpers used to locate a robot on the graph
//! ([`nearest`]), to discover a dock ([`find_dock_lane`]), and to recover from a lane closure
//! ([`reverse_lane`]).
//!
//! Nothing in this module is mutable once a [`Graph`] is built: it is loaded once from
//! configuration (see [`crate::config`]) and shared by every robot handle and the fleet
//! coordinator.

use crate::error::AdapterError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// Lanes shorter than this are skipped during projection; they would make `u` ill-defined.
const MIN_LANE_LENGTH: f64 = 1e-8;

/// Index of a [`Waypoint`] in a [`Graph`].
pub type WaypointIndex = usize;
/// Index of a [`Lane`] in a [`Graph`].
pub type LaneIndex = usize;

/// A named 2D location on a single map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Waypoint {
    /// Optional unique name for this waypoint. Duplicate names are rejected by
    /// [`Graph::validate`].
    #[serde(default)]
    pub name: Option<String>,
    /// Name of the map (level) this waypoint belongs to.
    pub map_name: String,
    /// X coordinate, in the map's frame.
    pub x: f64,
    /// Y coordinate, in the map's frame.
    pub y: f64,
}

impl Waypoint {
    /// Euclidean distance between this waypoint and a point `(x, y)`.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

/// Entry events a lane may carry. These are the only dynamic behaviors a lane can trigger;
/// the set is closed, so it is represented as a tagged enum rather than open dispatch (see
/// `DESIGN.md`, "Dynamic event dispatch over lane events").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum LaneEvent {
    /// Dock at the named dock upon arrival.
    Dock(String),
    /// Open a door.
    DoorOpen,
    /// Close a door.
    DoorClose,
    /// Begin a lift session.
    LiftSessionBegin,
    /// Move the lift.
    LiftMove,
    /// Open the lift door.
    LiftDoorOpen,
    /// End a lift session.
    LiftSessionEnd,
    /// Wait in place.
    Wait,
}

/// A directed edge between two waypoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Lane {
    /// Index of the entry waypoint.
    pub entry: WaypointIndex,
    /// Index of the exit waypoint.
    pub exit: WaypointIndex,
    /// Event triggered when a robot arrives at the entry of this lane.
    #[serde(default)]
    pub entry_event: Option<LaneEvent>,
    /// Optional speed limit (in map units per second) enforced while traversing this lane.
    #[serde(default)]
    pub speed_limit: Option<f64>,
}

/// The kind of graph element a location was projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NearestKind {
    /// Projected onto a waypoint.
    Waypoint,
    /// Projected onto a lane.
    Lane,
}

/// Result of [`nearest`]: the closest graph element to a queried location, and its distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestElement {
    /// Whether the closest element is a waypoint or a lane.
    pub kind: NearestKind,
    /// Index of the waypoint or lane (depending on `kind`).
    pub index: usize,
    /// Perpendicular (or point) distance to the queried location.
    pub distance: f64,
}

/// The immutable navigation graph.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Graph {
    /// All waypoints, indexed by [`WaypointIndex`].
    pub waypoints: Vec<Waypoint>,
    /// All directed lanes, indexed by [`LaneIndex`].
    pub lanes: Vec<Lane>,
}

impl Graph {
    /// Create an empty graph. Waypoints and lanes are usually populated once from configuration.
    pub fn new() -> Self {
        Self { waypoints: Vec::new(), lanes: Vec::new() }
    }

    /// Parse a graph from a YAML document, as read from `nav_graph_file` (see `crate::config`),
    /// and validate it (§10.2).
    pub fn from_yaml(contents: &str) -> Result<Self, AdapterError> {
        let graph: Graph = serde_yaml::from_str(contents).map_err(|e| AdapterError::InvalidGraph(e.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Validate setup-time invariants: every lane references an in-bounds waypoint, and no two
    /// waypoints share a name (§10.2).
    pub fn validate(&self) -> Result<(), AdapterError> {
        let mut seen_names = HashSet::new();
        for waypoint in &self.waypoints {
            if let Some(name) = &waypoint.name {
                if !seen_names.insert(name) {
                    return Err(AdapterError::DuplicateWaypointName(name.clone()));
                }
            }
        }
        for (lane_index, lane) in self.lanes.iter().enumerate() {
            for &waypoint in &[lane.entry, lane.exit] {
                if self.waypoints.get(waypoint).is_none() {
                    return Err(AdapterError::UnknownWaypoint { lane: lane_index, waypoint });
                }
            }
        }
        Ok(())
    }

    /// Add a waypoint and return its index.
    pub fn add_waypoint(&mut self, waypoint: Waypoint) -> WaypointIndex {
        self.waypoints.push(waypoint);
        self.waypoints.len() - 1
    }

    /// Add a lane and return its index.
    pub fn add_lane(&mut self, lane: Lane) -> LaneIndex {
        self.lanes.push(lane);
        self.lanes.len() - 1
    }

    /// Length of a lane, in map units.
    pub fn lane_length(&self, lane_index: LaneIndex) -> f64 {
        let lane = &self.lanes[lane_index];
        let p0 = &self.waypoints[lane.entry];
        let p1 = &self.waypoints[lane.exit];
        p0.distance_to(p1.x, p1.y)
    }

    /// Parameterize `(x, y)` along `lane`: returns `u`, the signed distance from the lane's
    /// entry waypoint along the lane's direction, and the perpendicular distance from the
    /// lane to `(x, y)`. Returns `None` if the lane is degenerate (shorter than
    /// [`MIN_LANE_LENGTH`]).
    pub fn project_onto_lane(&self, lane_index: LaneIndex, x: f64, y: f64) -> Option<(f64, f64)> {
        let lane = &self.lanes[lane_index];
        let p0 = &self.waypoints[lane.entry];
        let p1 = &self.waypoints[lane.exit];
        let dx = p1.x - p0.x;
        let dy = p1.y - p0.y;
        let len = (dx * dx + dy * dy).sqrt();
        if len < MIN_LANE_LENGTH {
            return None;
        }
        let ux = dx / len;
        let uy = dy / len;
        let u = (x - p0.x) * ux + (y - p0.y) * uy;
        let perp_x = p0.x + u * ux - x;
        let perp_y = p0.y + u * uy - y;
        let distance = (perp_x * perp_x + perp_y * perp_y).sqrt();
        Some((u, distance))
    }

    /// Returns `true` if `u` (as returned by [`project_onto_lane`](Self::project_onto_lane))
    /// falls strictly between the lane's endpoints.
    pub fn is_within_lane(&self, lane_index: LaneIndex, u: f64) -> bool {
        let len = self.lane_length(lane_index);
        u >= 0.0 && u <= len
    }

    /// Find the closest graph element (waypoint or lane) to `(x, y)` on map `map_name`.
    ///
    /// Waypoints are checked before lanes, and within each kind in index order; the first
    /// minimum found wins ties. Used only for diagnostics when a robot cannot be registered.
    pub fn nearest(&self, map_name: &str, x: f64, y: f64) -> Option<NearestElement> {
        let mut best: Option<NearestElement> = None;

        for (index, waypoint) in self.waypoints.iter().enumerate() {
            if waypoint.map_name != map_name {
                continue;
            }
            let distance = waypoint.distance_to(x, y);
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(NearestElement { kind: NearestKind::Waypoint, index, distance });
            }
        }

        for (index, lane) in self.lanes.iter().enumerate() {
            let entry_on_map = self.waypoints[lane.entry].map_name == map_name;
            let exit_on_map = self.waypoints[lane.exit].map_name == map_name;
            if !entry_on_map && !exit_on_map {
                continue;
            }
            let len = self.lane_length(index);
            if len < MIN_LANE_LENGTH {
                continue;
            }
            let (u, distance) = match self.project_onto_lane(index, x, y) {
                Some(v) => v,
                None => continue,
            };
            if u < 0.0 || u > len {
                continue;
            }
            if best.as_ref().map_or(true, |b| distance < b.distance) {
                best = Some(NearestElement { kind: NearestKind::Lane, index, distance });
            }
        }

        best
    }

    /// Find the lane whose entry event is `Dock(dock_name)`. Returns the first match, in index
    /// order.
    pub fn find_dock_lane(&self, dock_name: &str) -> Option<LaneIndex> {
        self.lanes.iter().position(|lane| {
            matches!(&lane.entry_event, Some(LaneEvent::Dock(name)) if name == dock_name)
        })
    }

    /// Find the unique lane whose entry is `from` and exit is `to`. Used to reposition a robot
    /// that is trapped on a lane which has just been closed.
    pub fn reverse_lane(&self, from: WaypointIndex, to: WaypointIndex) -> Option<LaneIndex> {
        self.lanes.iter().position(|lane| lane.entry == from && lane.exit == to)
    }

    /// Minimum speed limit over a set of approach lanes. Returns `None` if none of the lanes
    /// carry a speed limit.
    pub fn min_speed_limit<'a>(&self, lanes: impl Iterator<Item = &'a LaneIndex>) -> Option<f64> {
        lanes
            .filter_map(|&lane_index| self.lanes[lane_index].speed_limit)
            .fold(None, |acc, limit| Some(acc.map_or(limit, |a: f64| a.min(limit))))
    }

    /// Build a lookup of dock name to target waypoint, used at startup to validate that every
    /// configured dock resolves to a lane (see `DESIGN.md`, dock-lane discovery).
    pub fn dock_targets(&self) -> HashMap<String, WaypointIndex> {
        let mut map = HashMap::new();
        for lane in &self.lanes {
            if let Some(LaneEvent::Dock(name)) = &lane.entry_event {
                map.insert(name.clone(), lane.exit);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_graph() -> Graph {
        let mut g = Graph::new();
        let w0 = g.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 0.0, y: 0.0 });
        let w1 = g.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 10.0, y: 0.0 });
        g.add_lane(Lane { entry: w0, exit: w1, entry_event: None, speed_limit: Some(1.5) });
        g.add_lane(Lane { entry: w1, exit: w0, entry_event: None, speed_limit: None });
        g
    }

    #[test]
    fn nearest_prefers_waypoint_on_tie() {
        let g = simple_graph();
        // (0, 0) is exactly on w0 and on lane 0 at u=0: waypoints are checked first.
        let found = g.nearest("L1", 0.0, 0.0).unwrap();
        assert_eq!(found.kind, NearestKind::Waypoint);
        assert_eq!(found.index, 0);
        assert_eq!(found.distance, 0.0);
    }

    #[test]
    fn nearest_projects_onto_lane() {
        let g = simple_graph();
        let found = g.nearest("L1", 5.0, 1.0).unwrap();
        assert_eq!(found.kind, NearestKind::Lane);
        assert!((found.distance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_ignores_other_maps() {
        let g = simple_graph();
        assert!(g.nearest("L2", 0.0, 0.0).is_none());
    }

    #[test]
    fn project_onto_lane_rejects_degenerate_lane() {
        let mut g = simple_graph();
        let w = g.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 1.0, y: 1.0 });
        let degenerate = g.add_lane(Lane { entry: w, exit: w, entry_event: None, speed_limit: None });
        assert!(g.project_onto_lane(degenerate, 1.0, 1.0).is_none());
    }

    #[test]
    fn find_dock_lane_first_match_wins() {
        let mut g = simple_graph();
        let w2 = g.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 20.0, y: 0.0 });
        g.add_lane(Lane {
            entry: 1,
            exit: w2,
            entry_event: Some(LaneEvent::Dock("D1".into())),
            speed_limit: None,
        });
        assert_eq!(g.find_dock_lane("D1"), Some(2));
        assert_eq!(g.find_dock_lane("D2"), None);
    }

    #[test]
    fn reverse_lane_lookup() {
        let g = simple_graph();
        assert_eq!(g.reverse_lane(0, 1), Some(0));
        assert_eq!(g.reverse_lane(1, 0), Some(1));
        assert_eq!(g.reverse_lane(0, 0), None);
    }

    #[test]
    fn min_speed_limit_over_approach_lanes() {
        let g = simple_graph();
        assert_eq!(g.min_speed_limit([0usize, 1usize].iter()), Some(1.5));
        assert_eq!(g.min_speed_limit([1usize].iter()), None);
    }
}
