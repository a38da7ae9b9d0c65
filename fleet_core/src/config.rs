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

//! Fleet adapter configuration (§6, §10.3), read from YAML by `fleet_cli`.

use crate::error::AdapterError;
use crate::graph::Graph;
use log::warn;
use serde::Deserialize;

/// What a robot should do once it has finished its assigned work and has nothing queued (§6).
/// Parsed by hand from [`FleetAdapterConfig::finishing_request`] rather than derived, since an
/// unrecognized value must fall back with a warning rather than fail deserialization outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishingRequest {
    /// Return to a charger.
    Charge,
    /// Park at a designated waypoint.
    Park,
    /// Stay put.
    Nothing,
}

impl Default for FinishingRequest {
    fn default() -> Self {
        FinishingRequest::Nothing
    }
}

/// Battery and power-system parameters. The core only plumbs these through to the external
/// power-sink collaborator named in §1's out-of-scope list; it never models battery drain itself.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PowerSystemConfig {
    /// Nominal battery capacity, in watt-hours.
    pub nominal_capacity_wh: f64,
    /// Average continuous power draw while moving, in watts.
    pub mass_kg: f64,
    /// Friction coefficient used by the (external) power model.
    pub friction_coefficient: f64,
    /// Ambient power draw attributable to onboard computing, in watts.
    pub ambient_power_draw_w: f64,
}

impl Default for PowerSystemConfig {
    fn default() -> Self {
        Self { nominal_capacity_wh: 0.0, mass_kg: 0.0, friction_coefficient: 0.0, ambient_power_draw_w: 0.0 }
    }
}

/// Top-level fleet adapter configuration, covering every key in §6's CLI/configuration list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetAdapterConfig {
    /// Name of the fleet this adapter drives.
    pub fleet_name: String,
    /// Path to the navigation graph YAML file.
    pub nav_graph_file: String,
    /// Whether a robot should wait responsively (vs. hard-stop) when blocked by another robot's
    /// reservation. Hot-reloadable: `fleet_cli` re-applies this to every handle without a
    /// restart when the config file changes.
    #[serde(default = "default_true")]
    pub enable_responsive_wait: bool,
    /// URI of the fleet driver's server, if it needs one.
    #[serde(default)]
    pub server_uri: Option<String>,
    /// URI of an experimental lift-watchdog service.
    #[serde(default)]
    pub experimental_lift_watchdog_service: Option<String>,
    /// What idle robots should do once finished, as a raw string so an unrecognized value can be
    /// logged before falling back (§6, "Unknown `finishing_request` falls back to `nothing`").
    #[serde(default)]
    pub finishing_request: Option<String>,
    /// Whether this fleet loops continuously between tasks.
    #[serde(default)]
    pub perform_loop: bool,
    /// Whether this fleet performs delivery tasks.
    #[serde(default)]
    pub perform_deliveries: bool,
    /// Whether this fleet performs cleaning tasks.
    #[serde(default)]
    pub perform_cleaning: bool,
    /// Delay, in seconds, tolerated before a robot is considered behind schedule.
    #[serde(default)]
    pub delay_threshold: Option<f64>,
    /// If `true`, ignore `delay_threshold` entirely.
    #[serde(default)]
    pub disable_delay_threshold: bool,
    /// Battery and power-system parameters, plumbed through to the external power-sink model.
    #[serde(default)]
    pub power_system: PowerSystemConfig,
    /// Named docks this fleet recognizes, validated against the navigation graph at load time.
    #[serde(default)]
    pub docks: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl FleetAdapterConfig {
    /// Parse configuration from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, AdapterError> {
        serde_yaml::from_str(contents).map_err(|e| AdapterError::InvalidConfig(e.to_string()))
    }

    /// Resolve [`finishing_request`](Self::finishing_request) to a [`FinishingRequest`], falling
    /// back to `Nothing` with a warning on an unrecognized string (§6).
    pub fn finishing_request(&self) -> FinishingRequest {
        match self.finishing_request.as_deref() {
            None => FinishingRequest::Nothing,
            Some("charge") => FinishingRequest::Charge,
            Some("park") => FinishingRequest::Park,
            Some("nothing") => FinishingRequest::Nothing,
            Some(other) => {
                warn!("unrecognized finishing_request '{}', falling back to 'nothing'", other);
                FinishingRequest::Nothing
            }
        }
    }

    /// Validate that every configured dock name resolves to a lane in `graph` (§9, "dock-lane
    /// discovery"). Called once at startup; a failure here aborts before the control loop starts.
    pub fn validate_docks(&self, graph: &Graph) -> Result<(), AdapterError> {
        let targets = graph.dock_targets();
        for dock in &self.docks {
            if !targets.contains_key(dock) {
                return Err(AdapterError::UnknownDock(dock.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Lane, LaneEvent, Waypoint};

    fn minimal_yaml() -> &'static str {
        r#"
        fleet_name: tinyRobot
        nav_graph_file: "graphs/tiny.yaml"
        "#
    }

    #[test]
    fn defaults_apply_when_keys_are_absent() {
        let config = FleetAdapterConfig::from_yaml(minimal_yaml()).unwrap();
        assert!(config.enable_responsive_wait);
        assert_eq!(config.finishing_request(), FinishingRequest::Nothing);
        assert!(!config.disable_delay_threshold);
    }

    #[test]
    fn unrecognized_finishing_request_falls_back_to_nothing() {
        let mut config = FleetAdapterConfig::from_yaml(minimal_yaml()).unwrap();
        config.finishing_request = Some("levitate".to_string());
        assert_eq!(config.finishing_request(), FinishingRequest::Nothing);
    }

    #[test]
    fn unknown_dock_is_rejected_at_validation() {
        let config = {
            let mut c = FleetAdapterConfig::from_yaml(minimal_yaml()).unwrap();
            c.docks = vec!["D1".to_string()];
            c
        };
        let graph = Graph::new();
        assert_eq!(config.validate_docks(&graph), Err(AdapterError::UnknownDock("D1".to_string())));
    }

    #[test]
    fn known_dock_passes_validation() {
        let mut graph = Graph::new();
        let w0 = graph.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 0.0, y: 0.0 });
        let w1 = graph.add_waypoint(Waypoint { name: None, map_name: "L1".into(), x: 1.0, y: 0.0 });
        graph.add_lane(Lane { entry: w0, exit: w1, entry_event: Some(LaneEvent::Dock("D1".into())), speed_limit: None });

        let mut config = FleetAdapterConfig::from_yaml(minimal_yaml()).unwrap();
        config.docks = vec!["D1".to_string()];
        assert!(config.validate_docks(&graph).is_ok());
    }
}
