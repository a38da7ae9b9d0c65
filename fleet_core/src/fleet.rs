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

//! The fleet-level coordinator (§4.3): owns every robot's [`RobotCommandHandle`], registers new
//! robots on first telemetry, and fans out lane-closure, speed-limit, interrupt, and
//! action-completion events.
//!
//! This is the single logical worker referred to throughout §5 and §9: nothing here is behind a
//! lock, because nothing but the coordinator itself ever touches a handle.

use crate::command::{ActionExecutorCallback, RobotCommandHandle};
use crate::clock::Clock;
use crate::graph::{Graph, LaneIndex};
use crate::interfaces::{
    DriverCommandSink, FleetUpdater, LiftClearanceService, LiftDecision, PlanStartComputer, RobotUpdater, ScheduleParticipant,
};
use crate::messages::{FleetState, InterruptRequest, LaneRequest, SpeedLimitRequest};
use crate::vehicle::VehicleTraits;
use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Owns every [`RobotCommandHandle`] for a single fleet, plus the fleet-wide closed-lane set.
pub struct FleetCoordinator {
    fleet_name: String,
    graph: Graph,
    vehicle_traits: VehicleTraits,
    handles: HashMap<String, RobotCommandHandle>,
    closed_lanes: HashSet<LaneIndex>,
    lift_clearance: Option<Arc<Mutex<dyn LiftClearanceService + Send>>>,
}

impl FleetCoordinator {
    /// Create a coordinator for `fleet_name`, sharing the given (immutable) navigation graph and
    /// kinematic traits.
    pub fn new(fleet_name: impl Into<String>, graph: Graph, vehicle_traits: VehicleTraits) -> Self {
        Self {
            fleet_name: fleet_name.into(),
            graph,
            vehicle_traits,
            handles: HashMap::new(),
            closed_lanes: HashSet::new(),
            lift_clearance: None,
        }
    }

    /// Install a lift-clearance service (§6, `experimental_lift_watchdog_service`). Every robot
    /// registered from this point on gets a lift-entry watchdog wired to it at registration time
    /// (§4.3); robots already registered are unaffected.
    pub fn set_lift_clearance_service(&mut self, service: Arc<Mutex<dyn LiftClearanceService + Send>>) {
        self.lift_clearance = Some(service);
    }

    /// Name of the fleet this coordinator serves.
    pub fn fleet_name(&self) -> &str {
        &self.fleet_name
    }

    /// The navigation graph this fleet operates on.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Number of robots currently registered.
    pub fn robot_count(&self) -> usize {
        self.handles.len()
    }

    /// Look up a registered handle by name, for tests and diagnostics.
    pub fn handle(&self, robot_name: &str) -> Option<&RobotCommandHandle> {
        self.handles.get(robot_name)
    }

    /// §4.3 "On telemetry batch": register any newly seen robots, then reconcile every robot's
    /// latest snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_telemetry_batch(
        &mut self,
        batch: FleetState,
        plan_starts: &mut dyn PlanStartComputer,
        updater: &mut dyn RobotUpdater,
        schedule: &mut dyn ScheduleParticipant,
        sink: &mut dyn DriverCommandSink,
        fleet_updater: &mut dyn FleetUpdater,
        clock: &dyn Clock,
        enable_responsive_wait: bool,
    ) {
        if batch.fleet_name != self.fleet_name {
            warn!("dropping telemetry batch for fleet '{}', this coordinator serves '{}'", batch.fleet_name, self.fleet_name);
            return;
        }

        for robot_state in batch.robots {
            let name = robot_state.name.clone();
            if !self.handles.contains_key(&name) {
                let location = robot_state.location;
                match plan_starts.compute_plan_start(&name, &location.level_name, location.x, location.y) {
                    Some(start) => {
                        info!("{}: registering new robot with a {}-waypoint starting plan", name, start.waypoints.len());
                        let mut handle = RobotCommandHandle::new(self.fleet_name.clone(), name.clone());
                        let start_set = start.waypoints.clone();
                        if !start.waypoints.is_empty() {
                            handle.follow_new_path(start.waypoints, Box::new(|_, _| {}), Box::new(|| {}), &self.graph, sink, clock);
                        }
                        self.handles.insert(name.clone(), handle);

                        updater.set_action_executor(&name, Box::new(|| {}));
                        if let Some(service) = self.lift_clearance.clone() {
                            let watchdog_name = name.clone();
                            updater.set_lift_entry_watchdog(
                                &name,
                                Box::new(move |lift_name| match service.lock() {
                                    Ok(mut guard) => guard.request_clearance(&watchdog_name, lift_name),
                                    Err(_) => {
                                        error!("{}: lift-clearance service lock poisoned", watchdog_name);
                                        LiftDecision::Undefined
                                    }
                                }),
                            );
                        }
                        fleet_updater.add_robot(&self.fleet_name, &name, "default", &start_set, Box::new(|| {}));
                    }
                    None => {
                        let hint = self
                            .graph
                            .nearest(&location.level_name, location.x, location.y)
                            .map(|n| format!("; nearest graph element is {:?} #{} at distance {:.3}", n.kind, n.index, n.distance))
                            .unwrap_or_default();
                        warn!("{}: could not compute a starting plan, robot not registered{}", name, hint);
                        continue;
                    }
                }
            }

            updater.enable_responsive_wait(&name, enable_responsive_wait);

            if let Some(handle) = self.handles.get_mut(&name) {
                handle.update_state(robot_state.into(), &self.graph, &self.vehicle_traits, updater, schedule, sink, clock);
            }
        }
    }

    /// §4.3 "On lane-closure request".
    pub fn handle_lane_request(&mut self, request: &LaneRequest, updater: &mut dyn RobotUpdater, fleet_updater: &mut dyn FleetUpdater) {
        if request.fleet_name != self.fleet_name {
            warn!("dropping lane request for fleet '{}', this coordinator serves '{}'", request.fleet_name, self.fleet_name);
            return;
        }

        let newly_closed: HashSet<LaneIndex> =
            request.close_lanes.iter().copied().filter(|lane| !self.closed_lanes.contains(lane)).collect();

        for lane in &request.close_lanes {
            self.closed_lanes.insert(*lane);
        }
        for lane in &request.open_lanes {
            self.closed_lanes.remove(lane);
        }

        for handle in self.handles.values_mut() {
            handle.newly_closed_lanes(&newly_closed, &self.graph, updater);
        }

        if !request.close_lanes.is_empty() {
            fleet_updater.close_lanes(&request.close_lanes);
        }
        if !request.open_lanes.is_empty() {
            fleet_updater.open_lanes(&request.open_lanes);
        }

        let mut closed: Vec<LaneIndex> = self.closed_lanes.iter().copied().collect();
        closed.sort_unstable();
        fleet_updater.update_closed_lanes(&closed);
    }

    /// §4.3 "On speed-limit request".
    pub fn handle_speed_limit_request(&mut self, request: &SpeedLimitRequest, fleet_updater: &mut dyn FleetUpdater) {
        if request.fleet_name != self.fleet_name {
            warn!("dropping speed limit request for fleet '{}', this coordinator serves '{}'", request.fleet_name, self.fleet_name);
            return;
        }
        fleet_updater.set_speed_limits(&request.speed_limits);
        fleet_updater.clear_speed_limits(&request.remove_limits);
    }

    /// §4.3 "On interrupt request".
    pub fn handle_interrupt_request(&mut self, request: &InterruptRequest, updater: &mut dyn RobotUpdater) {
        if request.fleet_name != self.fleet_name {
            warn!("dropping interrupt request for fleet '{}', this coordinator serves '{}'", request.fleet_name, self.fleet_name);
            return;
        }
        match self.handles.get_mut(&request.robot_name) {
            Some(handle) => handle.handle_interrupt_request(request, updater),
            None => warn!("interrupt request for unknown robot '{}'", request.robot_name),
        }
    }

    /// §4.3 "On action-idle notice".
    pub fn handle_action_idle(&mut self, robot_name: &str) {
        match self.handles.get_mut(robot_name) {
            Some(handle) => handle.complete_robot_action(),
            None => warn!("action-idle notice for unknown robot '{}'", robot_name),
        }
    }

    /// Begin a teleop action for `robot_name`, if it is registered.
    pub fn begin_teleop(&mut self, robot_name: &str, action_executor: ActionExecutorCallback) {
        match self.handles.get_mut(robot_name) {
            Some(handle) => handle.begin_teleop(action_executor),
            None => warn!("teleop requested for unknown robot '{}'", robot_name),
        }
    }

    /// Currently closed lanes, sorted for deterministic reporting.
    pub fn closed_lanes(&self) -> Vec<LaneIndex> {
        let mut lanes: Vec<LaneIndex> = self.closed_lanes.iter().copied().collect();
        lanes.sort_unstable();
        lanes
    }

    /// Issue `stop` to every currently registered robot. Not part of the per-fleet event surface
    /// in §4.3; exposed for adapter-level shutdown handling in `fleet_cli`.
    pub fn stop_all(&mut self, sink: &mut dyn DriverCommandSink, clock: &dyn Clock) {
        for handle in self.handles.values_mut() {
            debug!("{}: stopping on fleet shutdown", handle.name());
            handle.stop(&self.graph, sink, clock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::graph::{Lane, Waypoint};
    use crate::interfaces::{PlanStart, PositionEstimate, ResumeHandle, Route};
    use crate::messages::RobotState;
    use crate::telemetry::{Location, RobotMode};

    struct NoopUpdater;
    impl RobotUpdater for NoopUpdater {
        fn update_position(&mut self, _robot_name: &str, _estimate: PositionEstimate) {}
        fn update_battery_soc(&mut self, _robot_name: &str, _soc: f64) {}
        fn update_task_completed(&mut self, _robot_name: &str, _task_id: &str) {}
        fn request_replan(&mut self, _robot_name: &str) {}
        fn register_interrupt(&mut self, _robot_name: &str, _labels: &[String]) -> ResumeHandle {
            Box::new(|_| {})
        }
        fn enable_responsive_wait(&mut self, _robot_name: &str, _enabled: bool) {}
        fn set_action_executor(&mut self, _robot_name: &str, _action_executor: crate::interfaces::ActionExecutorSetter) {}
        fn set_lift_entry_watchdog(&mut self, _robot_name: &str, _watchdog: crate::interfaces::LiftEntryWatchdog) {}
    }

    #[derive(Default)]
    struct NoopSchedule;
    impl ScheduleParticipant for NoopSchedule {
        fn set_route(&mut self, _robot_name: &str, _route: Route) {}
        fn clear_route(&mut self, _robot_name: &str) {}
        fn mark_checkpoints_reached(&mut self, _robot_name: &str, _checkpoints: &[crate::plan::ArrivalCheckpoint]) {}
    }

    #[derive(Default)]
    struct NoopSink;
    impl DriverCommandSink for NoopSink {
        fn publish_path_request(&mut self, _request: crate::messages::PathRequest) {}
        fn publish_mode_request(&mut self, _request: crate::messages::ModeRequest) {}
    }

    #[derive(Default)]
    struct RecordingFleetUpdater {
        closed_lanes: Vec<Vec<LaneIndex>>,
        added_robots: Vec<String>,
        opened_lanes: Vec<Vec<LaneIndex>>,
        closed_lane_requests: Vec<Vec<LaneIndex>>,
    }
    impl FleetUpdater for RecordingFleetUpdater {
        fn add_robot(
            &mut self,
            _command: &str,
            robot_name: &str,
            _profile: &str,
            _start_set: &[crate::plan::PlanWaypoint],
            on_added_cb: crate::interfaces::RobotAddedCallback,
        ) {
            self.added_robots.push(robot_name.to_string());
            on_added_cb();
        }
        fn open_lanes(&mut self, lanes: &[LaneIndex]) {
            self.opened_lanes.push(lanes.to_vec());
        }
        fn close_lanes(&mut self, lanes: &[LaneIndex]) {
            self.closed_lane_requests.push(lanes.to_vec());
        }
        fn update_closed_lanes(&mut self, closed_lanes: &[LaneIndex]) {
            self.closed_lanes.push(closed_lanes.to_vec());
        }
        fn set_speed_limits(&mut self, _limits: &[(LaneIndex, f64)]) {}
        fn clear_speed_limits(&mut self, _lanes: &[LaneIndex]) {}
    }

    struct AlwaysPlan;
    impl PlanStartComputer for AlwaysPlan {
        fn compute_plan_start(&mut self, _robot_name: &str, _map_name: &str, _x: f64, _y: f64) -> Option<PlanStart> {
            Some(PlanStart { waypoints: Vec::new() })
        }
    }

    struct NeverPlan;
    impl PlanStartComputer for NeverPlan {
        fn compute_plan_start(&mut self, _robot_name: &str, _map_name: &str, _x: f64, _y: f64) -> Option<PlanStart> {
            None
        }
    }

    fn graph_with_lane() -> Graph {
        let mut g = Graph::new();
        let w0 = g.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 0.0, y: 0.0 });
        let w1 = g.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 10.0, y: 0.0 });
        g.add_lane(Lane { entry: w0, exit: w1, entry_event: None, speed_limit: None });
        g
    }

    fn robot_state(name: &str) -> RobotState {
        RobotState {
            name: name.to_string(),
            task_id: "0".into(),
            mode: RobotMode::Idle,
            battery_percent: 90.0,
            location: Location { t: 0.0, x: 0.0, y: 0.0, yaw: 0.0, level_name: "L1".into() },
            path: Vec::new(),
        }
    }

    #[test]
    fn unlocatable_robot_is_not_registered() {
        let mut coordinator = FleetCoordinator::new("fleet", graph_with_lane(), VehicleTraits::conservative());
        let mut plan_starts = NeverPlan;
        let mut updater = NoopUpdater;
        let mut schedule = NoopSchedule::default();
        let mut sink = NoopSink::default();
        let mut fleet_updater = RecordingFleetUpdater::default();
        let clock = ManualClock::new();

        let batch = FleetState { fleet_name: "fleet".into(), robots: vec![robot_state("ghost")] };
        coordinator.handle_telemetry_batch(batch, &mut plan_starts, &mut updater, &mut schedule, &mut sink, &mut fleet_updater, &clock, true);
        assert_eq!(coordinator.robot_count(), 0);
    }

    #[test]
    fn resending_same_telemetry_retries_registration() {
        let mut coordinator = FleetCoordinator::new("fleet", graph_with_lane(), VehicleTraits::conservative());
        let mut plan_starts = NeverPlan;
        let mut updater = NoopUpdater;
        let mut schedule = NoopSchedule::default();
        let mut sink = NoopSink::default();
        let mut fleet_updater = RecordingFleetUpdater::default();
        let clock = ManualClock::new();

        for _ in 0..2 {
            let batch = FleetState { fleet_name: "fleet".into(), robots: vec![robot_state("ghost")] };
            coordinator.handle_telemetry_batch(batch, &mut plan_starts, &mut updater, &mut schedule, &mut sink, &mut fleet_updater, &clock, true);
        }
        assert_eq!(coordinator.robot_count(), 0, "rejection must not be sticky");
    }

    #[test]
    fn registers_robot_once_plan_start_available() {
        let mut coordinator = FleetCoordinator::new("fleet", graph_with_lane(), VehicleTraits::conservative());
        let mut plan_starts = AlwaysPlan;
        let mut updater = NoopUpdater;
        let mut schedule = NoopSchedule::default();
        let mut sink = NoopSink::default();
        let mut fleet_updater = RecordingFleetUpdater::default();
        let clock = ManualClock::new();

        let batch = FleetState { fleet_name: "fleet".into(), robots: vec![robot_state("r1")] };
        coordinator.handle_telemetry_batch(batch, &mut plan_starts, &mut updater, &mut schedule, &mut sink, &mut fleet_updater, &clock, true);
        assert_eq!(coordinator.robot_count(), 1);
        assert!(coordinator.handle("r1").is_some());
        assert_eq!(fleet_updater.added_robots, vec!["r1".to_string()]);
    }

    #[test]
    fn lane_closure_updates_authoritative_set_and_broadcasts() {
        let mut coordinator = FleetCoordinator::new("fleet", graph_with_lane(), VehicleTraits::conservative());
        let mut updater = NoopUpdater;
        let mut fleet_updater = RecordingFleetUpdater::default();

        let close = LaneRequest { fleet_name: "fleet".into(), close_lanes: vec![0], open_lanes: Vec::new() };
        coordinator.handle_lane_request(&close, &mut updater, &mut fleet_updater);
        assert_eq!(coordinator.closed_lanes(), vec![0]);
        assert_eq!(fleet_updater.closed_lanes.last().unwrap(), &vec![0]);
        assert_eq!(fleet_updater.closed_lane_requests.last().unwrap(), &vec![0]);

        let open = LaneRequest { fleet_name: "fleet".into(), close_lanes: Vec::new(), open_lanes: vec![0] };
        coordinator.handle_lane_request(&open, &mut updater, &mut fleet_updater);
        assert!(coordinator.closed_lanes().is_empty());
        assert_eq!(fleet_updater.opened_lanes.last().unwrap(), &vec![0]);
    }

    #[test]
    fn mismatched_fleet_name_is_dropped() {
        let mut coordinator = FleetCoordinator::new("fleet", graph_with_lane(), VehicleTraits::conservative());
        let mut updater = NoopUpdater;
        let mut fleet_updater = RecordingFleetUpdater::default();

        let close = LaneRequest { fleet_name: "other".into(), close_lanes: vec![0], open_lanes: Vec::new() };
        coordinator.handle_lane_request(&close, &mut updater, &mut fleet_updater);
        assert!(coordinator.closed_lanes().is_empty());
    }
}
