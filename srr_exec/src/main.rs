//! Main executive entry point.
//!
//! # Architecture
//!
//! The executive runs the closed loop between the simulation and the
//! autonomy chain:
//!
//!     - Initialise the session, logging, autonomy and simulation
//!     - Main loop, once per simulated tick:
//!         - Advance the simulation under the previous cycle's demands
//!         - Validate the telemetry and run perception on the camera frame
//!         - Run the decision state machine to produce the next demands
//!         - Archive the cycle
//!     - End of session: score the world map against the simulation truth
//!
//! The loop is synchronous and runs flat out, the simulated clock advances
//! one fixed tick per cycle regardless of wall time.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::env;
use structopt::StructOpt;

// Internal
use comms_if::dems::RoverDems;
use srr_lib::auto::decision::Mode;
use srr_lib::auto::AutoMgr;
use srr_lib::sim::{Sim, SimInitData};
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// A manifest sample counts as located if rock evidence was mapped within
/// this distance of it, metres.
const ROCK_MATCH_TOL_M: f64 = 3.0;

/// Cycles between progress lines, ten seconds of simulated time.
const PROGRESS_PERIOD_CYCLES: u64 = 100;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Command line options for the executive.
#[derive(Debug, StructOpt)]
#[structopt(name = "srr_exec", about = "Sample return rover executive")]
struct Cli {
    /// Number of cycles to run before stopping.
    #[structopt(long, default_value = "1200")]
    cycles: u64,

    /// World generation seed, overriding the parameter file.
    #[structopt(long)]
    seed: Option<u32>,

    /// Software root holding the params directory, also settable through
    /// SRR_SW_ROOT.
    #[structopt(long)]
    sw_root: Option<String>,

    /// Minimum log level (info, debug or trace).
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

/// One row of the tick archive.
#[derive(Serialize)]
struct TickRecord {
    time_s: f64,
    pos_x_m: f64,
    pos_y_m: f64,
    yaw_deg: f64,
    speed_mps: f64,
    mode: Mode,
    throttle_dem: f64,
    brake_dem: f64,
    steer_dem_deg: f64,
    pickup_dem: bool,
    nav_count: usize,
    rock_pixel_count: usize,
    map_updated: bool,
    stuck_latched: bool,
    loop_latched: bool,
    samples_collected: u32,
    dist_to_home_m: Option<f64>,
    collided: bool,
    samples_remaining: u32,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let cli = Cli::from_args();

    // The software root drives parameter and session path resolution
    if let Some(ref sw_root) = cli.sw_root {
        env::set_var(host::SW_ROOT_ENV_VAR, sw_root);
    }

    // ---- EARLY INITIALISATION ----

    let session = Session::new("srr_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(cli.log_level, &session).wrap_err("Failed to initialise logging")?;

    info!("Sample Return Rover Executive\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- INITIALISE MODULES ----

    let mut auto_mgr = AutoMgr::init("per_mgr.toml", "decision_mgr.toml")
        .wrap_err("Failed to initialise AutoMgr")?;
    info!("AutoMgr init complete");

    let mut sim = Sim::default();
    sim.init(
        SimInitData {
            params_file: "sim.toml".into(),
            seed_override: cli.seed,
        },
        &session,
    )
    .wrap_err("Failed to initialise Sim")?;
    info!("Sim init complete");

    let mut archiver =
        Archiver::from_path(&session, "tick.csv").wrap_err("Failed to create the tick archive")?;

    // ---- MAIN LOOP ----

    info!("Beginning main loop, {} cycles\n", cli.cycles);

    let mut dems = RoverDems::neutral();

    for cycle in 0..cli.cycles {
        let (output, sim_report) = sim.proc(&dems).wrap_err("Simulation step failed")?;

        dems = match auto_mgr.step(&output.tm, &output.frame) {
            Ok((next_dems, report)) => {
                let record = TickRecord {
                    time_s: output.tm.time_s,
                    pos_x_m: output.tm.pos_m[0],
                    pos_y_m: output.tm.pos_m[1],
                    yaw_deg: output.tm.yaw_deg,
                    speed_mps: output.tm.speed_mps,
                    mode: report.decision.mode,
                    throttle_dem: next_dems.throttle,
                    brake_dem: next_dems.brake,
                    steer_dem_deg: next_dems.steer_deg,
                    pickup_dem: next_dems.pickup,
                    nav_count: report.per.nav_count,
                    rock_pixel_count: report.per.rock_pixel_count,
                    map_updated: report.per.map_updated,
                    stuck_latched: report.decision.stuck_latched,
                    loop_latched: report.decision.loop_latched,
                    samples_collected: report.decision.samples_collected,
                    dist_to_home_m: report.decision.dist_to_home_m,
                    collided: sim_report.collided,
                    samples_remaining: sim_report.samples_remaining,
                };
                if let Err(e) = archiver.serialise(&record) {
                    warn!("Couldn't archive cycle {}: {}", cycle, e);
                }

                next_dems
            }
            Err(e) => {
                // A failed cycle must never leave a stale demand standing
                warn!("Autonomy step failed, sending neutral demands: {}", e);
                RoverDems::neutral()
            }
        };

        if (cycle + 1) % PROGRESS_PERIOD_CYCLES == 0 {
            let state = auto_mgr.state();
            info!(
                "Cycle {}: {} at [{:.1}, {:.1}] m, {} of {} samples collected",
                cycle + 1,
                state.mode,
                state.pos_m[0],
                state.pos_m[1],
                state.samples_collected,
                state.samples_to_find,
            );
        }

        if auto_mgr.state().mode == Mode::Homed {
            info!("Mission complete, the vehicle is parked at home");
            break;
        }
    }

    // ---- END OF SESSION ----

    summarise(&session, &auto_mgr, &sim);

    info!("End of execution");

    Ok(())
}

/// Print the end of session summary and save the data products.
fn summarise(session: &Session, auto_mgr: &AutoMgr, sim: &Sim) {
    let state = auto_mgr.state();

    let collected = format!(
        "{} of {}",
        state.samples_collected, state.samples_to_find
    );
    let collected = if state.samples_to_find > 0 && state.samples_collected >= state.samples_to_find
    {
        collected.green().to_string()
    } else {
        collected.yellow().to_string()
    };

    println!("\n{}", "---- SESSION SUMMARY ----".bold());
    println!("    Final mode:         {}", state.mode);
    println!("    Samples collected:  {}", collected);
    println!(
        "    Final position:     [{:.1}, {:.1}] m",
        state.pos_m[0], state.pos_m[1]
    );
    println!(
        "    Map updates:        {} ({} skipped by the attitude gate)",
        state.world_map.num_updates(),
        state.world_map.num_skipped()
    );

    if let Some(world) = sim.world() {
        match state.world_map.stats(
            &world.open_cells().view(),
            &state.sample_manifest_m,
            ROCK_MATCH_TOL_M,
        ) {
            Ok(stats) => {
                println!(
                    "    Terrain mapped:     {:.1}% at {:.1}% fidelity",
                    stats.pct_mapped, stats.pct_fidelity
                );
                println!(
                    "    Rocks located:      {} of {}",
                    stats.rocks_located,
                    state.sample_manifest_m.len()
                );
            }
            Err(e) => warn!("Couldn't score the world map: {}", e),
        }
    }
    println!();

    session.save("world_map.json", &state.world_map);
    info!("World map saved to the session directory");
}
