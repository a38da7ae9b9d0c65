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

use fleet_core::clock::SystemClock;
use fleet_core::config::FleetAdapterConfig;
use fleet_core::fleet::FleetCoordinator;
use fleet_core::graph::Graph;
use fleet_core::vehicle::VehicleTraits;

use clap::Parser;
use log::{info, warn};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

mod mock;
use mock::{
    ConfiguredLiftClearance, Scenario, ScenarioFleetUpdater, ScenarioPlanner, ScenarioRobotUpdater, ScenarioSchedule, ScenarioSink,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = CommandLineArguments::parse();

    match args.cmd {
        MainCommand::Check { config } => {
            pretty_env_logger::init();
            let (config, graph) = load_config_and_graph(&config)?;
            info!(
                "configuration for fleet '{}' is valid: {} waypoints, {} lanes, {} docks",
                config.fleet_name,
                graph.waypoints.len(),
                graph.lanes.len(),
                config.docks.len()
            );
        }
        MainCommand::Run { config: config_path, scenario } => {
            pretty_env_logger::init();
            let (mut config, graph) = load_config_and_graph(&config_path)?;
            let scenario = Scenario::from_yaml(&fs::read_to_string(&scenario)?)?;

            info!("starting fleet adapter for '{}'", config.fleet_name);
            let mut coordinator = FleetCoordinator::new(config.fleet_name.clone(), graph, VehicleTraits::conservative());
            if config.experimental_lift_watchdog_service.is_some() {
                coordinator.set_lift_clearance_service(Arc::new(Mutex::new(ConfiguredLiftClearance::default())));
            }

            let mut planner = ScenarioPlanner::default();
            let mut updater = ScenarioRobotUpdater::default();
            let mut schedule = ScenarioSchedule::default();
            let mut sink = ScenarioSink::default();
            let mut fleet_updater = ScenarioFleetUpdater::default();
            let clock = SystemClock;

            for batch in scenario.batches {
                reload_responsive_wait(&config_path, &mut config);

                let fleet_state = batch.into_fleet_state(&config.fleet_name);
                coordinator.handle_telemetry_batch(
                    fleet_state,
                    &mut planner,
                    &mut updater,
                    &mut schedule,
                    &mut sink,
                    &mut fleet_updater,
                    &clock,
                    config.enable_responsive_wait,
                );
            }

            info!("scenario exhausted, stopping all {} registered robots", coordinator.robot_count());
            coordinator.stop_all(&mut sink, &clock);
        }
    }

    Ok(())
}

/// Re-read `config_path` and apply a changed `enable_responsive_wait` without restarting, per
/// §10.3's hot-reload promise for that key. A reload failure is logged and the previous value is
/// kept; this is a best-effort check on an already-validated running adapter, not a setup step.
fn reload_responsive_wait(config_path: &PathBuf, config: &mut FleetAdapterConfig) {
    let contents = match fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("could not re-read '{}' for hot reload: {}", config_path.display(), e);
            return;
        }
    };
    match FleetAdapterConfig::from_yaml(&contents) {
        Ok(reloaded) if reloaded.enable_responsive_wait != config.enable_responsive_wait => {
            info!("enable_responsive_wait changed to {} via config reload", reloaded.enable_responsive_wait);
            config.enable_responsive_wait = reloaded.enable_responsive_wait;
        }
        Ok(_) => {}
        Err(e) => warn!("failed to reload configuration '{}': {}", config_path.display(), e),
    }
}

/// Load and validate a [`FleetAdapterConfig`] and the [`Graph`] it names, aborting with a
/// descriptive error on any setup failure (§7, "fatal at setup time").
fn load_config_and_graph(config_path: &PathBuf) -> Result<(FleetAdapterConfig, Graph), Box<dyn Error>> {
    let config = FleetAdapterConfig::from_yaml(&fs::read_to_string(config_path)?)?;
    let graph = Graph::from_yaml(&fs::read_to_string(&config.nav_graph_file)?)?;
    config.validate_docks(&graph)?;
    Ok((config, graph))
}

/// Command-line entry point for the fleet adapter.
#[derive(Parser, Debug)]
#[clap(name = "fleet_cli", author = "fleet_core maintainers")]
struct CommandLineArguments {
    /// Action to perform.
    #[clap(subcommand)]
    cmd: MainCommand,
}

#[derive(Parser, Debug)]
enum MainCommand {
    /// Parse and validate a fleet adapter configuration and its navigation graph, then exit.
    #[clap(name = "check")]
    Check {
        /// Path to the fleet adapter configuration YAML file.
        config: PathBuf,
    },
    /// Run the adapter against a scripted scenario file, driven through a mock transport.
    #[clap(name = "run")]
    Run {
        /// Path to the fleet adapter configuration YAML file.
        config: PathBuf,
        /// Path to a scenario YAML file describing the telemetry batches to replay.
        scenario: PathBuf,
    },
}
