//! Shared mock collaborators for the integration tests in this directory.

use fleet_core::graph::{Graph, Lane, LaneEvent, LaneIndex, Waypoint};
use fleet_core::interfaces::{
    ActionExecutorSetter, DriverCommandSink, FleetUpdater, LiftEntryWatchdog, PlanStart, PlanStartComputer, PositionEstimate,
    ResumeHandle, RobotAddedCallback, RobotUpdater, Route, ScheduleParticipant,
};
use fleet_core::messages::{ModeRequest, PathRequest};
use fleet_core::plan::{ArrivalCheckpoint, PlanWaypoint};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every call a [`RobotCommandHandle`](fleet_core::command::RobotCommandHandle) or
/// [`FleetCoordinator`](fleet_core::fleet::FleetCoordinator) made against the updater surface.
#[derive(Default)]
pub struct RecordingUpdater {
    pub positions: Vec<(String, PositionEstimate)>,
    pub battery: Vec<(String, f64)>,
    pub completed_tasks: Vec<(String, String)>,
    pub replans: Vec<String>,
    pub interrupts: Vec<(String, Vec<String>)>,
    pub resumed: Arc<Mutex<Vec<Vec<String>>>>,
    pub responsive_wait: Vec<(String, bool)>,
}

impl RobotUpdater for RecordingUpdater {
    fn update_position(&mut self, robot_name: &str, estimate: PositionEstimate) {
        self.positions.push((robot_name.to_string(), estimate));
    }
    fn update_battery_soc(&mut self, robot_name: &str, soc: f64) {
        self.battery.push((robot_name.to_string(), soc));
    }
    fn update_task_completed(&mut self, robot_name: &str, task_id: &str) {
        self.completed_tasks.push((robot_name.to_string(), task_id.to_string()));
    }
    fn request_replan(&mut self, robot_name: &str) {
        self.replans.push(robot_name.to_string());
    }
    fn register_interrupt(&mut self, robot_name: &str, labels: &[String]) -> ResumeHandle {
        self.interrupts.push((robot_name.to_string(), labels.to_vec()));
        let resumed = self.resumed.clone();
        Box::new(move |labels| resumed.lock().unwrap().push(labels))
    }
    fn enable_responsive_wait(&mut self, robot_name: &str, enabled: bool) {
        self.responsive_wait.push((robot_name.to_string(), enabled));
    }
    fn set_action_executor(&mut self, _robot_name: &str, _action_executor: ActionExecutorSetter) {}
    fn set_lift_entry_watchdog(&mut self, _robot_name: &str, _watchdog: LiftEntryWatchdog) {}
}

/// Records every route reservation made against the shared traffic schedule.
#[derive(Default)]
pub struct RecordingSchedule {
    pub routes: Vec<(String, Route)>,
    pub cleared: Vec<String>,
    pub checkpoints_reached: Vec<(String, Vec<ArrivalCheckpoint>)>,
}

impl ScheduleParticipant for RecordingSchedule {
    fn set_route(&mut self, robot_name: &str, route: Route) {
        self.routes.push((robot_name.to_string(), route));
    }
    fn clear_route(&mut self, robot_name: &str) {
        self.cleared.push(robot_name.to_string());
    }
    fn mark_checkpoints_reached(&mut self, robot_name: &str, checkpoints: &[ArrivalCheckpoint]) {
        self.checkpoints_reached.push((robot_name.to_string(), checkpoints.to_vec()));
    }
}

/// Records every command published to the driver.
#[derive(Default)]
pub struct RecordingSink {
    pub path_requests: Vec<PathRequest>,
    pub mode_requests: Vec<ModeRequest>,
}

impl DriverCommandSink for RecordingSink {
    fn publish_path_request(&mut self, request: PathRequest) {
        self.path_requests.push(request);
    }
    fn publish_mode_request(&mut self, request: ModeRequest) {
        self.mode_requests.push(request);
    }
}

/// Records every closed-lane broadcast and speed-limit change.
#[derive(Default)]
pub struct RecordingFleetUpdater {
    pub closed_lanes: Vec<Vec<LaneIndex>>,
    pub speed_limits_set: Vec<Vec<(LaneIndex, f64)>>,
    pub speed_limits_cleared: Vec<Vec<LaneIndex>>,
    pub added_robots: Vec<String>,
    pub opened_lanes: Vec<Vec<LaneIndex>>,
    pub closed_lane_requests: Vec<Vec<LaneIndex>>,
}

impl FleetUpdater for RecordingFleetUpdater {
    fn add_robot(
        &mut self,
        _command: &str,
        robot_name: &str,
        _profile: &str,
        _start_set: &[PlanWaypoint],
        on_added_cb: RobotAddedCallback,
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
    fn set_speed_limits(&mut self, limits: &[(LaneIndex, f64)]) {
        self.speed_limits_set.push(limits.to_vec());
    }
    fn clear_speed_limits(&mut self, lanes: &[LaneIndex]) {
        self.speed_limits_cleared.push(lanes.to_vec());
    }
}

/// A scripted planner: returns a fixed plan for known robot names, `None` for everything else.
#[derive(Default)]
pub struct ScriptedPlanner {
    pub plans: HashMap<String, Vec<PlanWaypoint>>,
}

impl ScriptedPlanner {
    pub fn with_plan(name: &str, waypoints: Vec<PlanWaypoint>) -> Self {
        let mut plans = HashMap::new();
        plans.insert(name.to_string(), waypoints);
        Self { plans }
    }
}

impl PlanStartComputer for ScriptedPlanner {
    fn compute_plan_start(&mut self, robot_name: &str, _map_name: &str, _x: f64, _y: f64) -> Option<PlanStart> {
        self.plans.get(robot_name).cloned().map(|waypoints| PlanStart { waypoints })
    }
}

/// A two-waypoint straight-lane graph: `w0 --lane 0--> w1`, `w1 --lane 1--> w0`, with `w1` also
/// reachable by docking at `"D1"`.
pub fn two_waypoint_graph_with_dock() -> Graph {
    let mut g = Graph::new();
    let w0 = g.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 0.0, y: 0.0 });
    let w1 = g.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 10.0, y: 0.0 });
    g.add_lane(Lane { entry: w0, exit: w1, entry_event: Some(LaneEvent::Dock("D1".into())), speed_limit: None });
    g.add_lane(Lane { entry: w1, exit: w0, entry_event: None, speed_limit: None });
    g
}

pub fn plan_waypoint(x: f64, y: f64, seconds: u64, approach_lanes: Vec<LaneIndex>) -> PlanWaypoint {
    PlanWaypoint {
        x,
        y,
        yaw: 0.0,
        target_time: Duration::from_secs(seconds),
        graph_waypoint: None,
        entry_event: None,
        approach_lanes,
        arrival_checkpoints: vec![ArrivalCheckpoint { route_id: 0, checkpoint_id: seconds }],
    }
}
