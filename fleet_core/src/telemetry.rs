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

//! Telemetry reported by the fleet driver.

/// Operating mode reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotMode {
    /// The robot is not moving and has no pending command.
    Idle,
    /// The robot is following a path.
    Moving,
    /// The robot has paused mid-path.
    Paused,
    /// The robot is executing a docking maneuver.
    Docking,
    /// The driver could not execute the current command and is requesting a replan.
    AdapterError,
    /// The robot is charging.
    Charging,
}

/// A single reported (or planned) location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Seconds since the driver's boot, or since the start of its path; not used for wall-clock
    /// comparisons, only for interpolation.
    pub t: f64,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Heading, in radians.
    pub yaw: f64,
    /// Map this location is on.
    pub level_name: String,
}

/// A fresh telemetry report for one robot.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    /// Name of the robot this telemetry is for.
    pub name: String,
    /// Task id echoed back by the driver; compared against the handle's pending command.
    pub task_id: String,
    /// Current operating mode.
    pub mode: RobotMode,
    /// Battery percentage in `[0, 100]`. Values outside that range are considered invalid.
    pub battery_percent: f64,
    /// Current reported location.
    pub location: Location,
    /// Locations not yet reached, as reported by the driver. Empty once the driver believes it
    /// has arrived.
    pub path: Vec<Location>,
}

impl TelemetrySnapshot {
    /// `true` if [`battery_percent`](Self::battery_percent) lies within the valid `[0, 100]`
    /// range.
    pub fn battery_is_valid(&self) -> bool {
        (0.0..=100.0).contains(&self.battery_percent)
    }

    /// Battery percentage normalized to `[0, 1]`, for [`battery_is_valid`](Self::battery_is_valid)
    /// readings only.
    pub fn battery_soc(&self) -> f64 {
        self.battery_percent / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_battery(battery_percent: f64) -> TelemetrySnapshot {
        TelemetrySnapshot {
            name: "r1".into(),
            task_id: "0".into(),
            mode: RobotMode::Idle,
            battery_percent,
            location: Location { t: 0.0, x: 0.0, y: 0.0, yaw: 0.0, level_name: "L1".into() },
            path: Vec::new(),
        }
    }

    #[test]
    fn battery_bounds_are_inclusive() {
        assert!(snapshot_with_battery(0.0).battery_is_valid());
        assert!(snapshot_with_battery(100.0).battery_is_valid());
        assert!(!snapshot_with_battery(-0.1).battery_is_valid());
        assert!(!snapshot_with_battery(100.1).battery_is_valid());
    }

    #[test]
    fn battery_soc_normalizes_to_unit_interval() {
        assert_eq!(snapshot_with_battery(50.0).battery_soc(), 0.5);
    }
}
