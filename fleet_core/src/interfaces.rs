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

//! Collaborator traits at the edge of this crate (§6).
//!
//! `fleet_core` reconciles robot state and issues commands, but it does not itself talk to a
//! transport, a central traffic schedule, or a path planner. Those collaborators are injected as
//! trait objects so the control loop can be driven and tested without any of them being real.

use crate::graph::LaneIndex;
use crate::messages::{ModeRequest, PathRequest};
use crate::plan::{ArrivalCheckpoint, PlanWaypoint};

/// A best-effort position estimate relative to the planned path, produced by the estimation
/// functions in [`crate::estimate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionEstimate {
    /// The robot is on (or very near) the planned path, at the given plan-waypoint index and
    /// interpolation fraction toward the next one.
    OnPath {
        /// Index into the current plan of the last waypoint reached or passed.
        plan_index: usize,
        /// Fraction of the way toward `plan_index + 1`, in `[0, 1]`.
        fraction: f64,
    },
    /// The robot has drifted off the planned path; only a raw position is available.
    OffPath {
        /// Nearest plan-waypoint index, for progress reporting only.
        nearest_plan_index: usize,
    },
}

/// Sink for outgoing driver commands (§6). `fleet_cli` implements this over whatever transport
/// the deployment uses; `fleet_core` only ever calls it, never listens on it.
pub trait DriverCommandSink {
    /// Send a path-following command.
    fn publish_path_request(&mut self, request: PathRequest);
    /// Send a mode-change command (e.g. docking).
    fn publish_mode_request(&mut self, request: ModeRequest);
}

/// A handle the schedule participant hands back so the caller can resume a paused robot later,
/// carrying whatever labels the matching `RESUME` request supplied (§4.2.5).
pub type ResumeHandle = Box<dyn FnOnce(Vec<String>) + Send>;

/// Installed on the updater so the wider fleet system can ask this robot to run a queued action
/// (§6, "teleop"/custom actions); invoked from outside `fleet_core`, triggering the matching
/// `RobotCommandHandle::begin_teleop`/`complete_robot_action` pair at the call site that installs
/// it.
pub type ActionExecutorSetter = Box<dyn FnMut() + Send>;

/// Installed on the updater so the wider fleet system can ask whether a robot may enter a named
/// lift right now (§6, §4.3 "install a lift-entry watchdog"); returns a [`LiftDecision`], mapping
/// unrecognized or failed clearance checks to [`LiftDecision::Undefined`] with an `error!` log at
/// the installation site.
pub type LiftEntryWatchdog = Box<dyn FnMut(&str) -> LiftDecision + Send>;

/// Reports robot progress to the wider fleet system: position, battery, replan requests, and
/// interruption bookkeeping (§6).
pub trait RobotUpdater {
    /// Publish a fresh position/progress estimate for a robot.
    fn update_position(&mut self, robot_name: &str, estimate: PositionEstimate);
    /// Forward a validated battery state-of-charge reading, in `[0, 1]`.
    fn update_battery_soc(&mut self, robot_name: &str, soc: f64);
    /// Report that a robot has completed its currently assigned task.
    fn update_task_completed(&mut self, robot_name: &str, task_id: &str);
    /// Ask the planner to compute a new plan for this robot as soon as possible.
    fn request_replan(&mut self, robot_name: &str);
    /// Register a new interruption for `robot_name` and return a handle that resumes it once
    /// invoked with whatever labels the matching `RESUME` carries.
    fn register_interrupt(&mut self, robot_name: &str, labels: &[String]) -> ResumeHandle;
    /// Toggle whether this robot waits responsively (vs. hard-stopping) when blocked by another
    /// robot's schedule reservation (§6).
    fn enable_responsive_wait(&mut self, robot_name: &str, enabled: bool);
    /// Install the function the wider fleet system calls to run a queued action on this robot.
    fn set_action_executor(&mut self, robot_name: &str, action_executor: ActionExecutorSetter);
    /// Install a lift-entry watchdog for this robot, if a lift-clearance service is configured.
    fn set_lift_entry_watchdog(&mut self, robot_name: &str, watchdog: LiftEntryWatchdog);
}

/// A reservation of traffic-schedule time along a sequence of waypoints, as held by a
/// [`ScheduleParticipant`] registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Waypoints this route reserves, in order.
    pub waypoints: Vec<PlanWaypoint>,
}

/// Registers a robot's intended route with the shared traffic schedule and reports conflicts
/// back as lane closures or speed limits (§6).
pub trait ScheduleParticipant {
    /// Replace this robot's reservation with a new route.
    fn set_route(&mut self, robot_name: &str, route: Route);
    /// Remove this robot's reservation, e.g. once it goes idle.
    fn clear_route(&mut self, robot_name: &str);
    /// Mark the given schedule checkpoints as reached, e.g. once a followed path completes
    /// (§4.2.3).
    fn mark_checkpoints_reached(&mut self, robot_name: &str, checkpoints: &[ArrivalCheckpoint]);
}

/// Whether a lift may be entered right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiftDecision {
    /// The lift is available; the caller may proceed.
    Clear,
    /// The lift is occupied; the caller should wait and retry.
    Crowded,
    /// No lift-clearance service is configured, or the service's response could not be
    /// interpreted; treated the same as `Crowded` by callers, but logged separately (§6).
    Undefined,
}

/// Coordinates access to lifts shared between fleets (§6, out of scope to implement here).
pub trait LiftClearanceService {
    /// Ask whether `robot_name` may enter `lift_name` now.
    fn request_clearance(&mut self, robot_name: &str, lift_name: &str) -> LiftDecision;
}

/// Invoked once a robot has been fully registered with the wider fleet system (§6, `add_robot`).
pub type RobotAddedCallback = Box<dyn FnOnce() + Send>;

/// Fleet-wide status the coordinator reports upward, mirroring [`crate::messages::ClosedLanes`]
/// but addressed to whatever aggregates fleet state rather than a specific transport.
pub trait FleetUpdater {
    /// Register a newly discovered robot with the wider fleet system: the command channel it is
    /// reachable on, its name, its kinematic profile, the starting plan it has just been issued,
    /// and a callback to invoke once registration completes (§6).
    fn add_robot(
        &mut self,
        command: &str,
        robot_name: &str,
        profile: &str,
        start_set: &[PlanWaypoint],
        on_added_cb: RobotAddedCallback,
    );
    /// Open the given lanes, making them available for planning again (§6, §4.3).
    fn open_lanes(&mut self, lanes: &[LaneIndex]);
    /// Close the given lanes, making them unavailable for planning (§6, §4.3).
    fn close_lanes(&mut self, lanes: &[LaneIndex]);
    /// Report the fleet's current authoritative closed-lane set.
    fn update_closed_lanes(&mut self, closed_lanes: &[LaneIndex]);
    /// Apply a batch of per-lane speed limits.
    fn set_speed_limits(&mut self, limits: &[(LaneIndex, f64)]);
    /// Remove any speed limit from the given lanes.
    fn clear_speed_limits(&mut self, lanes: &[LaneIndex]);
}

/// A freshly computed starting plan for a robot that has just reported in for the first time.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStart {
    /// Plan waypoints making up the starting path.
    pub waypoints: Vec<PlanWaypoint>,
}

/// Computes an initial plan for a robot discovered via telemetry with no prior command handle
/// (§4.3, robot registration). This stands in for the path planner, which is out of scope here.
pub trait PlanStartComputer {
    /// Compute a starting plan bringing `robot_name` from `(x, y)` on `map_name` to a sensible
    /// starting position, or `None` if no plan could be found.
    fn compute_plan_start(&mut self, robot_name: &str, map_name: &str, x: f64, y: f64) -> Option<PlanStart>;
}
