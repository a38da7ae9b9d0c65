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

#![deny(missing_docs)]

//! # fleet_core
//!
//! The per-robot command & state-reconciliation engine for a "full-control" fleet adapter: the
//! piece that sits between an upstream traffic-aware planner emitting timed waypoint paths and a
//! downstream fleet driver reporting periodic telemetry and executing navigation/docking
//! commands.
//!
//! ## Structure
//!
//! - **[`graph`]**: the immutable navigation graph and its geometry helpers (nearest-element
//!   projection, dock-lane discovery, reverse-lane lookup).
//! - **[`plan`]**: the shape of a planner-issued path ([`plan::PlanWaypoint`]).
//! - **[`telemetry`]**: the shape of driver-reported state ([`telemetry::TelemetrySnapshot`]).
//! - **[`travel_state`]**: per-robot mutable record of progress along the current plan.
//! - **[`estimate`]**: stateless procedures that advance [`travel_state::TravelState`] from a
//!   fresh [`telemetry::TelemetrySnapshot`].
//! - **[`command`]**: [`command::RobotCommandHandle`], the per-robot state machine — the heart of
//!   this crate.
//! - **[`fleet`]**: [`fleet::FleetCoordinator`], which owns every robot's handle and fans out
//!   fleet-wide events.
//! - **[`interfaces`]**: the collaborator traits this crate is driven through (planner, schedule,
//!   driver transport) — implemented by whatever binds this crate to a real deployment.
//! - **[`messages`]**: wire message shapes at the system boundary.
//! - **[`vehicle`]**: kinematic limits used to synthesize docking schedule pushes.
//! - **[`clock`]**: the injectable monotonic clock backing every timer in [`command`].
//! - **[`config`]**: [`config::FleetAdapterConfig`], deserialized from YAML by `fleet_cli`.
//! - **[`error`]**: [`error::AdapterError`], the only error type this crate's public API
//!   produces — reserved for setup failures; runtime anomalies are handled locally (see
//!   [`command`]'s module docs).
//!
//! ## Usage
//!
//! ```
//! use fleet_core::graph::Graph;
//! use fleet_core::fleet::FleetCoordinator;
//! use fleet_core::vehicle::VehicleTraits;
//!
//! let graph = Graph::new();
//! let coordinator = FleetCoordinator::new("my_fleet", graph, VehicleTraits::conservative());
//! assert_eq!(coordinator.robot_count(), 0);
//! ```

pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod estimate;
pub mod fleet;
pub mod graph;
pub mod interfaces;
pub mod messages;
pub mod plan;
pub mod telemetry;
pub mod travel_state;
pub mod vehicle;

pub use error::AdapterError;
pub use fleet::FleetCoordinator;
