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

//! The per-robot command handle: the state machine that turns planner intent (`follow_new_path`,
//! `dock`, `stop`) into driver commands, and driver telemetry (`update_state`) into progress
//! reports, replans, and completions.
//!
//! Every recoverable anomaly here (dropped command, driver divergence, stranded robot, invalid
//! battery reading, stall) is handled locally and only logged — nothing propagates out of
//! [`RobotCommandHandle::update_state`] as a `Result::Err` (§7). There is exactly one owner of a
//! handle (the [`crate::fleet::FleetCoordinator`]) and exactly one logical caller driving it, so
//! none of this needs a lock: a callback stored on the handle runs synchronously on the caller's
//! own stack, never re-entering through a separate primitive (§9).

use crate::estimate;
use crate::graph::{Graph, LaneIndex, WaypointIndex};
use crate::interfaces::{DriverCommandSink, PositionEstimate, ResumeHandle, RobotUpdater, Route, ScheduleParticipant};
use crate::messages::{InterruptRequest, InterruptType, ModeRequest, PathRequest, PathRequestWaypoint};
use crate::plan::{ArrivalCheckpoint, PlanWaypoint};
use crate::telemetry::{Location, RobotMode, TelemetrySnapshot};
use crate::travel_state::TravelState;
use crate::vehicle::VehicleTraits;
use crate::clock::Clock;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Minimum gap between rebroadcasts of an unacknowledged command (§4.4).
pub const COMMAND_RESEND_INTERVAL: Duration = Duration::from_millis(200);
/// Minimum gap between schedule-itinerary pushes while docking (§4.4).
pub const DOCK_SCHEDULE_PUSH_INTERVAL: Duration = Duration::from_secs(1);
/// Time without progress before a stall replan is requested (§4.4).
pub const STALL_WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);

/// Invoked with the plan-waypoint index the robot has newly reached, and an ETA (seconds) to the
/// next one.
pub type ArrivalEstimator = Box<dyn FnMut(usize, f64) + Send>;
/// Invoked once when a followed path completes.
pub type PathFinishedCallback = Box<dyn FnOnce() + Send>;
/// Invoked once when a dock maneuver completes.
pub type DockFinishedCallback = Box<dyn FnOnce() + Send>;
/// Invoked once a teleop/action slot finishes; called by [`RobotCommandHandle::complete_robot_action`].
pub type ActionExecutorCallback = Box<dyn FnOnce() + Send>;

enum CommandState {
    Idle,
    Following {
        travel: TravelState,
        arrival_estimator: ArrivalEstimator,
        finished_callback: Option<PathFinishedCallback>,
        last_request: PathRequest,
    },
    Docking {
        dock_target: WaypointIndex,
        finished_callback: Option<DockFinishedCallback>,
        last_request: ModeRequest,
        last_schedule_push: Option<Instant>,
    },
    Teleop {
        action_executor: Option<ActionExecutorCallback>,
    },
}

impl CommandState {
    fn label(&self) -> &'static str {
        match self {
            CommandState::Idle => "idle",
            CommandState::Following { .. } => "following",
            CommandState::Docking { .. } => "docking",
            CommandState::Teleop { .. } => "teleop",
        }
    }
}

/// The per-robot state machine described in §4.2.
pub struct RobotCommandHandle {
    name: String,
    fleet_name: String,
    state: CommandState,
    task_id: u64,
    last_publish: Option<Instant>,
    last_known_state: Option<TelemetrySnapshot>,
    interrupted: bool,
    interrupt_registry: HashMap<String, ResumeHandle>,
    last_progress: Option<Instant>,
}

impl RobotCommandHandle {
    /// Create a fresh handle in the `Idle` state. Called by the fleet coordinator once a robot's
    /// first telemetry has been successfully projected onto the graph (§4.3).
    pub fn new(fleet_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fleet_name: fleet_name.into(),
            state: CommandState::Idle,
            task_id: 0,
            last_publish: None,
            last_known_state: None,
            interrupted: false,
            interrupt_registry: HashMap::new(),
            last_progress: None,
        }
    }

    /// Name of the robot this handle tracks.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn next_task_id(&mut self) -> String {
        self.task_id += 1;
        self.task_id.to_string()
    }

    fn approach_speed_limit(graph: &Graph, waypoint: &PlanWaypoint) -> Option<f64> {
        graph.min_speed_limit(waypoint.approach_lanes.iter())
    }

    fn level_name_for(graph: &Graph, waypoint: &PlanWaypoint, fallback: &str) -> String {
        waypoint
            .graph_waypoint
            .and_then(|idx| graph.waypoints.get(idx))
            .map(|wp| wp.map_name.clone())
            .unwrap_or_else(|| fallback.to_string())
    }

    fn build_path_request(&mut self, graph: &Graph, waypoints: &[PlanWaypoint]) -> PathRequest {
        let fallback_level = self
            .last_known_state
            .as_ref()
            .map(|s| s.location.level_name.clone())
            .unwrap_or_default();
        let task_id = self.next_task_id();
        let path = waypoints
            .iter()
            .map(|wp| PathRequestWaypoint {
                location: Location {
                    t: wp.target_time.as_secs_f64(),
                    x: wp.x,
                    y: wp.y,
                    yaw: wp.yaw,
                    level_name: Self::level_name_for(graph, wp, &fallback_level),
                },
                approach_speed_limit: Self::approach_speed_limit(graph, wp),
            })
            .collect();
        PathRequest { fleet_name: self.fleet_name.clone(), robot_name: self.name.clone(), task_id, path }
    }

    /// §4.2.1: begin following a freshly planned path, superseding whatever command was active.
    pub fn follow_new_path(
        &mut self,
        waypoints: Vec<PlanWaypoint>,
        arrival_estimator: ArrivalEstimator,
        finished_callback: PathFinishedCallback,
        graph: &Graph,
        sink: &mut dyn DriverCommandSink,
        clock: &dyn Clock,
    ) {
        let request = self.build_path_request(graph, &waypoints);
        info!("{}: following new path with {} waypoints (task {})", self.name, waypoints.len(), request.task_id);
        sink.publish_path_request(request.clone());
        let now = clock.now();
        self.last_publish = Some(now);
        self.last_progress = Some(now);
        self.interrupted = false;
        self.state = CommandState::Following {
            travel: TravelState::new(waypoints),
            arrival_estimator,
            finished_callback: Some(finished_callback),
            last_request: request,
        };
    }

    /// §4.2: `stop` clears any pending callbacks and re-issues a trivial single-waypoint path at
    /// the robot's last known location, returning the handle to `Following` and then immediately
    /// to `Idle` once the driver confirms arrival. If no telemetry has ever been received there
    /// is nowhere to stop to; this logs a warning and returns without transitioning (§9, "`stop`
    /// transitions to Idle" design note).
    pub fn stop(&mut self, graph: &Graph, sink: &mut dyn DriverCommandSink, clock: &dyn Clock) {
        let Some(snapshot) = self.last_known_state.clone() else {
            warn!("{}: stop requested with no telemetry received yet; ignoring", self.name);
            return;
        };
        let waypoint = PlanWaypoint {
            x: snapshot.location.x,
            y: snapshot.location.y,
            yaw: snapshot.location.yaw,
            target_time: Duration::from_secs(0),
            graph_waypoint: None,
            entry_event: None,
            approach_lanes: Vec::new(),
            arrival_checkpoints: Vec::new(),
        };
        self.follow_new_path(vec![waypoint], Box::new(|_, _| {}), Box::new(|| {}), graph, sink, clock);
    }

    /// §4.2.2: begin a docking maneuver. Panics if `dock_name` does not resolve to a lane in
    /// `graph` — the caller (the fleet coordinator's config loader) must have already validated
    /// every configured dock name at startup (§9, "dock-lane discovery").
    pub fn dock(
        &mut self,
        dock_name: &str,
        finished_callback: DockFinishedCallback,
        graph: &Graph,
        sink: &mut dyn DriverCommandSink,
        clock: &dyn Clock,
    ) {
        let lane = graph
            .find_dock_lane(dock_name)
            .unwrap_or_else(|| panic!("dock '{dock_name}' does not resolve to a lane; must be validated at startup"));
        let dock_target = graph.lanes[lane].exit;
        let task_id = self.next_task_id();
        let request = ModeRequest {
            fleet_name: self.fleet_name.clone(),
            robot_name: self.name.clone(),
            task_id,
            mode: "docking".to_string(),
            parameters: vec![("dock_name".to_string(), dock_name.to_string())],
        };
        info!("{}: docking at '{}' (task {})", self.name, dock_name, request.task_id);
        sink.publish_mode_request(request.clone());
        let now = clock.now();
        self.last_publish = Some(now);
        self.last_progress = Some(now);
        self.state = CommandState::Docking {
            dock_target,
            finished_callback: Some(finished_callback),
            last_request: request,
            last_schedule_push: None,
        };
    }

    /// §4.2.3: reconcile a fresh telemetry snapshot against the handle's current command. The
    /// single entry point driving everything else in this module.
    pub fn update_state(
        &mut self,
        snapshot: TelemetrySnapshot,
        graph: &Graph,
        vehicle_traits: &VehicleTraits,
        updater: &mut dyn RobotUpdater,
        schedule: &mut dyn ScheduleParticipant,
        sink: &mut dyn DriverCommandSink,
        clock: &dyn Clock,
    ) {
        let now = clock.now();

        if snapshot.battery_is_valid() {
            updater.update_battery_soc(&self.name, snapshot.battery_soc());
        } else {
            error!("{}: dropped invalid battery reading {:.1}", self.name, snapshot.battery_percent);
        }

        self.last_known_state = Some(snapshot.clone());

        match std::mem::replace(&mut self.state, CommandState::Idle) {
            CommandState::Following { mut travel, mut arrival_estimator, finished_callback, last_request } => {
                if snapshot.task_id != last_request.task_id {
                    self.resend_path_if_due(&last_request, sink, now);
                    if let Some(estimate) = estimate::project_non_plan_following(graph, &snapshot.location) {
                        updater.update_position(&self.name, estimate);
                    }
                    self.state = CommandState::Following { travel, arrival_estimator, finished_callback, last_request };
                    return;
                }

                if snapshot.mode == RobotMode::AdapterError {
                    if !self.interrupted {
                        self.interrupted = true;
                        warn!("{}: driver reported AdapterError; requesting replan", self.name);
                        if let Some(estimate) = estimate::project_non_plan_following(graph, &snapshot.location) {
                            updater.update_position(&self.name, estimate);
                        }
                        updater.request_replan(&self.name);
                    }
                    self.state = CommandState::Following { travel, arrival_estimator, finished_callback, last_request };
                    return;
                }

                if snapshot.path.is_empty() {
                    if estimate::path_finished(&travel, &snapshot.location) {
                        info!("{}: path finished", self.name);
                        let checkpoints: Vec<ArrivalCheckpoint> =
                            travel.waypoints.iter().flat_map(|wp| wp.arrival_checkpoints.iter().copied()).collect();
                        schedule.mark_checkpoints_reached(&self.name, &checkpoints);
                        if let Some(cb) = finished_callback {
                            cb();
                        }
                        schedule.clear_route(&self.name);
                        self.state = CommandState::Idle;
                    } else {
                        debug!("{}: driver reports empty path before reaching final waypoint", self.name);
                        self.state = CommandState::Following { travel, arrival_estimator, finished_callback, last_request };
                    }
                    return;
                }

                let (position_estimate, eta, advanced) = estimate::estimate_plan_progress(&mut travel, &snapshot.location);
                if advanced {
                    self.last_progress = Some(now);
                }
                arrival_estimator(travel.target_plan_index, eta.unwrap_or(0.0));
                updater.update_position(&self.name, position_estimate);

                self.check_stall_watchdog(updater, now);
                self.state = CommandState::Following { travel, arrival_estimator, finished_callback, last_request };
            }

            CommandState::Docking { dock_target, finished_callback, last_request, last_schedule_push } => {
                if snapshot.task_id != last_request.task_id {
                    self.resend_mode_if_due(&last_request, sink, now);
                    self.state = CommandState::Docking { dock_target, finished_callback, last_request, last_schedule_push };
                    return;
                }

                if snapshot.mode != RobotMode::Docking {
                    info!("{}: docking complete", self.name);
                    updater.update_position(&self.name, estimate::dock_completion_estimate(dock_target));
                    self.last_progress = Some(now);
                    if let Some(cb) = finished_callback {
                        cb();
                    }
                    self.state = CommandState::Idle;
                    return;
                }

                let mut last_schedule_push = last_schedule_push;
                if !snapshot.path.is_empty() {
                    let due = last_schedule_push.map_or(true, |t| now.duration_since(t) >= DOCK_SCHEDULE_PUSH_INTERVAL);
                    if due {
                        let mut locations = vec![snapshot.location];
                        locations.extend(snapshot.path.iter().copied());
                        let mut route_waypoints = Vec::new();
                        for pair in locations.windows(2) {
                            for interpolated in vehicle_traits.interpolate(&pair[0], &pair[1]) {
                                route_waypoints.push(PlanWaypoint {
                                    x: interpolated.x,
                                    y: interpolated.y,
                                    yaw: interpolated.yaw,
                                    target_time: Duration::from_secs_f64(interpolated.t.max(0.0)),
                                    graph_waypoint: None,
                                    entry_event: None,
                                    approach_lanes: Vec::new(),
                                    arrival_checkpoints: Vec::new(),
                                });
                            }
                        }
                        schedule.set_route(&self.name, Route { waypoints: route_waypoints });
                        debug!("{}: pushed docking schedule update", self.name);
                        last_schedule_push = Some(now);
                    }
                }
                self.state = CommandState::Docking { dock_target, finished_callback, last_request, last_schedule_push };
            }

            CommandState::Teleop { action_executor } => {
                if let Some(estimate) = estimate::project_non_plan_following(graph, &snapshot.location) {
                    updater.update_position(&self.name, estimate);
                }
                self.state = CommandState::Teleop { action_executor };
            }

            CommandState::Idle => {
                if let Some(estimate) = estimate::project_non_plan_following(graph, &snapshot.location) {
                    updater.update_position(&self.name, estimate);
                }
                self.state = CommandState::Idle;
            }
        }
    }

    fn resend_path_if_due(&mut self, request: &PathRequest, sink: &mut dyn DriverCommandSink, now: Instant) {
        let due = self.last_publish.map_or(true, |t| now.duration_since(t) >= COMMAND_RESEND_INTERVAL);
        if !due {
            return;
        }
        sink.publish_path_request(request.clone());
        self.last_publish = Some(now);
        debug!("{}: rebroadcast unacknowledged path request", self.name);
    }

    fn resend_mode_if_due(&mut self, request: &ModeRequest, sink: &mut dyn DriverCommandSink, now: Instant) {
        let due = self.last_publish.map_or(true, |t| now.duration_since(t) >= COMMAND_RESEND_INTERVAL);
        if !due {
            return;
        }
        sink.publish_mode_request(request.clone());
        self.last_publish = Some(now);
        debug!("{}: rebroadcast unacknowledged mode request", self.name);
    }

    fn check_stall_watchdog(&mut self, updater: &mut dyn RobotUpdater, now: Instant) {
        if let Some(last_progress) = self.last_progress {
            if now.duration_since(last_progress) >= STALL_WATCHDOG_INTERVAL {
                warn!("{}: no progress for {:?}; requesting replan", self.name, STALL_WATCHDOG_INTERVAL);
                updater.request_replan(&self.name);
                self.last_progress = Some(now);
            }
        }
    }

    /// §4.2.4: react to a newly closed subset of lanes. Only has an effect while `Following`.
    pub fn newly_closed_lanes(&mut self, newly_closed: &HashSet<LaneIndex>, graph: &Graph, updater: &mut dyn RobotUpdater) {
        let CommandState::Following { travel, .. } = &self.state else {
            return;
        };
        if newly_closed.is_empty() {
            return;
        }

        let mut need_to_replan = false;
        let mut stranded_handled = false;

        if let Some(target) = travel.waypoints.get(travel.target_plan_index) {
            for &lane in target.approach_lanes.iter().filter(|l| newly_closed.contains(*l)) {
                let current = &self.last_known_state;
                let position = current.as_ref().map(|s| (s.location.x, s.location.y));
                if let Some((x, y)) = position {
                    if let Some((u, _)) = graph.project_onto_lane(lane, x, y) {
                        if u > 0.0 && u < graph.lane_length(lane) {
                            let entry = graph.lanes[lane].entry;
                            let exit = graph.lanes[lane].exit;
                            if let Some(reverse) = graph.reverse_lane(exit, entry) {
                                updater.update_position(&self.name, PositionEstimate::OffPath { nearest_plan_index: reverse });
                            } else {
                                updater.update_position(&self.name, PositionEstimate::OffPath { nearest_plan_index: entry });
                            }
                            warn!("{}: stranded on newly closed lane {}", self.name, lane);
                            need_to_replan = true;
                            stranded_handled = true;
                            break;
                        }
                    }
                }
            }
        }

        if !stranded_handled {
            for wp in &travel.waypoints[travel.target_plan_index..] {
                if wp.approach_lanes.iter().any(|l| newly_closed.contains(l)) {
                    need_to_replan = true;
                    break;
                }
            }
        }

        if need_to_replan {
            updater.request_replan(&self.name);
        }
    }

    /// §4.2.5: two-message interrupt protocol.
    pub fn handle_interrupt_request(&mut self, request: &InterruptRequest, updater: &mut dyn RobotUpdater) {
        match request.kind {
            InterruptType::Interrupt => {
                if !self.interrupt_registry.contains_key(&request.interrupt_id) {
                    let handle = updater.register_interrupt(&self.name, &request.labels);
                    self.interrupt_registry.insert(request.interrupt_id.clone(), handle);
                    info!("{}: registered interrupt '{}'", self.name, request.interrupt_id);
                }
            }
            InterruptType::Resume => {
                if let Some(handle) = self.interrupt_registry.remove(&request.interrupt_id) {
                    info!("{}: resuming interrupt '{}'", self.name, request.interrupt_id);
                    handle(request.labels.clone());
                }
            }
        }
    }

    /// §4.2.6: complete a queued teleop action, if one is pending.
    pub fn complete_robot_action(&mut self) {
        if let CommandState::Teleop { action_executor } = std::mem::replace(&mut self.state, CommandState::Idle) {
            if let Some(cb) = action_executor {
                cb();
            }
            info!("{}: teleop action completed", self.name);
        }
    }

    /// Enter `Teleop`, clearing any prior callbacks, as driven by an external action executor.
    pub fn begin_teleop(&mut self, action_executor: ActionExecutorCallback) {
        self.state = CommandState::Teleop { action_executor: Some(action_executor) };
    }

    /// Current high-level state label, for diagnostics and tests.
    pub fn state_label(&self) -> &'static str {
        self.state.label()
    }

    /// The task-id most recently transmitted to the driver.
    pub fn current_task_id(&self) -> u64 {
        self.task_id
    }
}
