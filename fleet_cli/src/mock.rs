// fleet_cli: thin binary wiring fleet_core to a transport
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

//! A scripted, in-process stand-in for the publish/subscribe transport a real fleet driver would
//! speak over. `fleet_core` never depends on any particular transport (§6); this module exists
//! only so `fleet_cli` can exercise a coordinator end-to-end from a scenario file instead of a
//! live message bus, which is out of scope for this crate.

use fleet_core::graph::LaneIndex;
use fleet_core::interfaces::{
    ActionExecutorSetter, DriverCommandSink, FleetUpdater, LiftClearanceService, LiftDecision, LiftEntryWatchdog, PlanStart,
    PlanStartComputer, PositionEstimate, ResumeHandle, RobotAddedCallback, RobotUpdater, Route, ScheduleParticipant,
};
use fleet_core::messages::{FleetState, ModeRequest, PathRequest, RobotState};
use fleet_core::plan::{ArrivalCheckpoint, PlanWaypoint};
use fleet_core::telemetry::{Location, RobotMode};
use log::{debug, info, warn};
use serde::Deserialize;
use std::time::Duration;

/// Computes a trivial "stay where you are" starting plan. Stands in for a real path planner,
/// which is out of scope for this crate (§6).
#[derive(Default)]
pub struct ScenarioPlanner;

impl PlanStartComputer for ScenarioPlanner {
    fn compute_plan_start(&mut self, robot_name: &str, map_name: &str, x: f64, y: f64) -> Option<PlanStart> {
        debug!("{}: computing trivial starting plan at ({:.2}, {:.2}) on {}", robot_name, x, y, map_name);
        Some(PlanStart {
            waypoints: vec![PlanWaypoint {
                x,
                y,
                yaw: 0.0,
                target_time: Duration::from_secs(0),
                graph_waypoint: None,
                entry_event: None,
                approach_lanes: Vec::new(),
                arrival_checkpoints: vec![ArrivalCheckpoint { route_id: 0, checkpoint_id: 0 }],
            }],
        })
    }
}

/// Reports robot progress by logging it. Stands in for the wider fleet system `fleet_core` is
/// embedded in (§6).
#[derive(Default)]
pub struct ScenarioRobotUpdater;

impl RobotUpdater for ScenarioRobotUpdater {
    fn update_position(&mut self, robot_name: &str, estimate: PositionEstimate) {
        debug!("{}: position update {:?}", robot_name, estimate);
    }

    fn update_battery_soc(&mut self, robot_name: &str, soc: f64) {
        debug!("{}: battery at {:.0}%", robot_name, soc * 100.0);
    }

    fn update_task_completed(&mut self, robot_name: &str, task_id: &str) {
        info!("{}: task {} completed", robot_name, task_id);
    }

    fn request_replan(&mut self, robot_name: &str) {
        info!("{}: replan requested", robot_name);
    }

    fn register_interrupt(&mut self, robot_name: &str, labels: &[String]) -> ResumeHandle {
        info!("{}: interrupt registered with labels {:?}", robot_name, labels);
        Box::new(|labels| info!("interrupt resumed with labels {:?}", labels))
    }

    fn enable_responsive_wait(&mut self, robot_name: &str, enabled: bool) {
        debug!("{}: responsive wait set to {}", robot_name, enabled);
    }

    fn set_action_executor(&mut self, robot_name: &str, _action_executor: ActionExecutorSetter) {
        debug!("{}: action executor installed", robot_name);
    }

    fn set_lift_entry_watchdog(&mut self, robot_name: &str, _watchdog: LiftEntryWatchdog) {
        debug!("{}: lift-entry watchdog installed", robot_name);
    }
}

/// Records route reservations by logging them. Stands in for the shared traffic schedule (§6).
#[derive(Default)]
pub struct ScenarioSchedule;

impl ScheduleParticipant for ScenarioSchedule {
    fn set_route(&mut self, robot_name: &str, route: Route) {
        debug!("{}: route reservation updated, {} waypoints", robot_name, route.waypoints.len());
    }

    fn clear_route(&mut self, robot_name: &str) {
        debug!("{}: route reservation cleared", robot_name);
    }

    fn mark_checkpoints_reached(&mut self, robot_name: &str, checkpoints: &[ArrivalCheckpoint]) {
        debug!("{}: {} schedule checkpoint(s) reached", robot_name, checkpoints.len());
    }
}

/// Publishes driver commands by logging them. Stands in for whatever transport a deployment uses
/// to talk to the driver (§6).
#[derive(Default)]
pub struct ScenarioSink;

impl DriverCommandSink for ScenarioSink {
    fn publish_path_request(&mut self, request: PathRequest) {
        info!("{}: publishing path request task {} ({} waypoints)", request.robot_name, request.task_id, request.path.len());
    }

    fn publish_mode_request(&mut self, request: ModeRequest) {
        info!("{}: publishing mode request task {} (mode {})", request.robot_name, request.task_id, request.mode);
    }
}

/// Registers robots and reports fleet-wide lane/speed-limit state by logging it. Stands in for
/// the wider fleet system `fleet_core` is embedded in (§6).
#[derive(Default)]
pub struct ScenarioFleetUpdater;

impl FleetUpdater for ScenarioFleetUpdater {
    fn add_robot(
        &mut self,
        command: &str,
        robot_name: &str,
        profile: &str,
        start_set: &[PlanWaypoint],
        on_added_cb: RobotAddedCallback,
    ) {
        info!("{}: added to fleet system on channel '{}' with profile '{}', {} starting waypoints", robot_name, command, profile, start_set.len());
        on_added_cb();
    }

    fn open_lanes(&mut self, lanes: &[LaneIndex]) {
        info!("fleet: opened lanes {:?}", lanes);
    }

    fn close_lanes(&mut self, lanes: &[LaneIndex]) {
        info!("fleet: closed lanes {:?}", lanes);
    }

    fn update_closed_lanes(&mut self, closed_lanes: &[LaneIndex]) {
        info!("fleet: closed lanes now {:?}", closed_lanes);
    }

    fn set_speed_limits(&mut self, limits: &[(LaneIndex, f64)]) {
        info!("fleet: speed limits applied to {:?}", limits);
    }

    fn clear_speed_limits(&mut self, lanes: &[LaneIndex]) {
        info!("fleet: speed limits cleared on {:?}", lanes);
    }
}

/// Grants lift clearance unconditionally, logging that no real lift-clearance service is wired
/// up. Only installed when `experimental_lift_watchdog_service` names one (§6).
#[derive(Default)]
pub struct ConfiguredLiftClearance;

impl LiftClearanceService for ConfiguredLiftClearance {
    fn request_clearance(&mut self, robot_name: &str, lift_name: &str) -> LiftDecision {
        warn!("{}: no real lift-clearance service wired up for '{}'; granting immediately", robot_name, lift_name);
        LiftDecision::Clear
    }
}

/// A scripted location, as read from a scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioLocation {
    #[serde(default)]
    t: f64,
    x: f64,
    y: f64,
    #[serde(default)]
    yaw: f64,
    level_name: String,
}

impl From<ScenarioLocation> for Location {
    fn from(loc: ScenarioLocation) -> Self {
        Location { t: loc.t, x: loc.x, y: loc.y, yaw: loc.yaw, level_name: loc.level_name }
    }
}

fn default_mode() -> String {
    "idle".to_string()
}

/// One robot's telemetry within a scripted batch.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioRobot {
    name: String,
    #[serde(default)]
    task_id: String,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default = "default_battery")]
    battery_percent: f64,
    location: ScenarioLocation,
    #[serde(default)]
    path: Vec<ScenarioLocation>,
}

fn default_battery() -> f64 {
    100.0
}

fn parse_mode(raw: &str) -> RobotMode {
    match raw {
        "idle" => RobotMode::Idle,
        "moving" => RobotMode::Moving,
        "paused" => RobotMode::Paused,
        "docking" => RobotMode::Docking,
        "adapter_error" => RobotMode::AdapterError,
        "charging" => RobotMode::Charging,
        other => {
            warn!("unrecognized scenario mode '{}', treating as idle", other);
            RobotMode::Idle
        }
    }
}

impl From<ScenarioRobot> for RobotState {
    fn from(robot: ScenarioRobot) -> Self {
        RobotState {
            name: robot.name,
            task_id: robot.task_id,
            mode: parse_mode(&robot.mode),
            battery_percent: robot.battery_percent,
            location: robot.location.into(),
            path: robot.path.into_iter().map(Location::from).collect(),
        }
    }
}

/// A single telemetry batch within a scripted scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioBatch {
    robots: Vec<ScenarioRobot>,
}

impl ScenarioBatch {
    /// Convert this batch into the wire shape the coordinator expects.
    pub fn into_fleet_state(self, fleet_name: &str) -> FleetState {
        FleetState { fleet_name: fleet_name.to_string(), robots: self.robots.into_iter().map(RobotState::from).collect() }
    }
}

/// A full scripted scenario: a sequence of telemetry batches to feed through the coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Telemetry batches, replayed in order.
    pub batches: Vec<ScenarioBatch>,
}

impl Scenario {
    /// Parse a scenario from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }
}
