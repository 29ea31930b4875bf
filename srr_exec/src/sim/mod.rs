//! # Simulation Module
//!
//! Closed loop stand-in for the vehicle and its environment. Each cycle the
//! simulator consumes the demands the executive produced from the previous
//! frame, advances the vehicle through one tick of a simple driving model,
//! and returns the telemetry record and camera frame for the new pose.
//!
//! The physics are deliberately crude. The aim is not realism but coverage:
//! blocked paths the vehicle must stop for, collisions that read as stalls,
//! terrain that curls the steering into circles, and samples that must be
//! stalked and picked up. The renderer and the perception unwarp are the
//! two directions through the same ground plane homography, so whatever
//! perception concludes about the rendered world can be checked against the
//! world's own truth.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Terrain generation and camera rendering
pub mod world;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use image::RgbImage;
use log::{info, warn};
use nalgebra::{Matrix3, Vector2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use crate::auto::per::{warp, PerError, WarpParams};
use comms_if::dems::RoverDems;
use comms_if::tm::{RoverTm, SampleManifest};
use util::maths;
use util::module::State;
use util::params::LoadError;
use util::session::Session;
use world::{SimWorld, SimWorldParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Vehicle and environment simulator.
///
/// Does nothing until [`State::init`] is called.
#[derive(Default)]
pub struct Sim {
    state: Option<SimInner>,
}

/// Initialisation data for [`Sim`].
pub struct SimInitData {
    /// Name of the simulator parameter file.
    pub params_file: String,

    /// Seed overriding the one in the parameter file, if given.
    pub seed_override: Option<u32>,
}

/// Parameters for [`Sim`].
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// World generation seed.
    pub seed: u32,

    /// Simulated time step per cycle, seconds.
    pub tick_period_s: f64,

    pub world: SimWorldParams,

    pub cam: SimCamParams,

    pub kin: SimKinParams,
}

/// Simulated camera parameters.
///
/// The frame size, scale and calibration must match the perception
/// parameters, otherwise the executive unwarps a geometry the renderer
/// never produced.
#[derive(Debug, Clone, Deserialize)]
pub struct SimCamParams {
    pub image_width_px: u32,

    pub image_height_px: u32,

    /// Warped pixels per metre of ground.
    pub px_per_m: f64,

    /// Perspective calibration, shared with perception.
    pub warp: WarpParams,

    /// Ground beyond this range renders as sky, metres.
    pub view_dist_m: f64,
}

/// Vehicle response parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimKinParams {
    /// Acceleration per unit throttle, m/s^2.
    pub throttle_gain: f64,

    /// Velocity proportional drag, 1/s. Terminal speed at full throttle is
    /// `throttle_gain / drag` times the throttle.
    pub drag: f64,

    /// Deceleration per unit brake, m/s^2.
    pub brake_gain: f64,

    /// Yaw rate per degree of steer per m/s of speed, deg/s.
    pub yaw_gain: f64,

    /// Yaw rate per degree of steer when at rest, deg/s.
    pub point_turn_gain: f64,

    /// Speed below which steering acts as a point turn, m/s.
    pub point_turn_vel_mps: f64,

    /// Pitch excursion per m/s^2 of acceleration, degrees.
    pub pitch_gain: f64,

    /// Radius within which a sample can be picked up, metres.
    pub near_sample_radius_m: f64,

    /// Time the pickup mechanism runs for, seconds.
    pub pickup_time_s: f64,
}

/// Output of one simulation cycle.
pub struct SimOutput {
    /// Telemetry for the new pose.
    pub tm: RoverTm,

    /// Camera frame for the new pose.
    pub frame: RgbImage,
}

/// Report on one simulation cycle.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SimStatusReport {
    /// True if the vehicle ran into blocked terrain this cycle.
    pub collided: bool,

    /// Samples still on the ground.
    pub samples_remaining: u32,
}

/// The initialised simulator.
struct SimInner {
    params: SimParams,

    world: SimWorld,

    /// Forward ground plane homography, camera pixels to warped pixels.
    homography: Matrix3<f64>,

    time_s: f64,

    pos_m: Vector2<f64>,

    yaw_deg: f64,

    pitch_deg: f64,

    vel_mps: f64,

    throttle_echo: f64,

    steer_echo_deg: f64,

    /// Vehicle time at which the running pickup finishes.
    pickup_end_s: Option<f64>,

    /// Sample the running pickup will collect.
    pickup_target: Option<usize>,

    /// True once the manifest has gone out with the first record.
    manifest_sent: bool,

    collided: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can arise in the simulator.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Failed to load simulator parameters: {0}")]
    ParamLoadError(#[from] LoadError),

    #[error("Simulated camera calibration is unusable: {0}")]
    CalibrationError(#[from] PerError),

    #[error("Simulator used before initialisation")]
    NotInitialised,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Sim {
    /// Build the simulator from already loaded parameters.
    pub fn from_params(params: SimParams) -> Result<Self, SimError> {
        Ok(Self {
            state: Some(SimInner::new(params)?),
        })
    }

    /// The generated world, for end of session truth statistics. `None`
    /// before initialisation.
    pub fn world(&self) -> Option<&SimWorld> {
        self.state.as_ref().map(|inner| &inner.world)
    }
}

impl State for Sim {
    type InitData = SimInitData;
    type InitError = SimError;
    type InputData = RoverDems;
    type OutputData = SimOutput;
    type StatusReport = SimStatusReport;
    type ProcError = SimError;

    fn init(&mut self, init_data: SimInitData, _session: &Session) -> Result<(), SimError> {
        let mut params: SimParams = util::params::load(&init_data.params_file)?;

        if let Some(seed) = init_data.seed_override {
            params.seed = seed;
        }

        self.state = Some(SimInner::new(params)?);
        Ok(())
    }

    fn proc(&mut self, dems: &RoverDems) -> Result<(SimOutput, SimStatusReport), SimError> {
        let inner = self.state.as_mut().ok_or(SimError::NotInitialised)?;
        Ok(inner.step(dems))
    }
}

impl SimInner {
    fn new(params: SimParams) -> Result<Self, PerError> {
        let world = SimWorld::generate(&params.world, params.seed);
        let dst = warp::dst_box(
            params.cam.image_width_px,
            params.cam.image_height_px,
            &params.cam.warp,
        );
        let homography = warp::solve_homography(&params.cam.warp.src_points_px, &dst)?;

        info!(
            "World generated from seed {}: {:.0} m square, {} samples",
            params.seed,
            world.extent_m(),
            world.samples_m().len()
        );

        let pos_m = Vector2::new(params.world.start_pos_m[0], params.world.start_pos_m[1]);
        let yaw_deg = maths::wrap_deg_360(params.world.start_yaw_deg);

        Ok(Self {
            world,
            homography,
            time_s: 0.0,
            pos_m,
            yaw_deg,
            pitch_deg: 0.0,
            vel_mps: 0.0,
            throttle_echo: 0.0,
            steer_echo_deg: 0.0,
            pickup_end_s: None,
            pickup_target: None,
            manifest_sent: false,
            collided: false,
            params,
        })
    }

    /// Advance the simulation one tick under the given demands.
    fn step(&mut self, dems: &RoverDems) -> (SimOutput, SimStatusReport) {
        let dt = self.params.tick_period_s;
        let kin = self.params.kin;

        self.time_s += dt;
        self.collided = false;

        if let Some(end_s) = self.pickup_end_s {
            // The mechanism holds the vehicle until it finishes
            self.vel_mps = 0.0;
            self.throttle_echo = 0.0;
            self.steer_echo_deg = 0.0;

            if self.time_s >= end_s {
                if let Some(index) = self.pickup_target.take() {
                    self.world.collect(index);
                    info!("Pickup mechanism finished, sample {} collected", index);
                }
                self.pickup_end_s = None;
            }
        } else {
            self.drive(dems, dt);

            if dems.pickup {
                match self.world.nearest_uncollected(&self.pos_m) {
                    Some((index, dist_m)) if dist_m <= kin.near_sample_radius_m => {
                        self.pickup_end_s = Some(self.time_s + kin.pickup_time_s);
                        self.pickup_target = Some(index);
                        self.vel_mps = 0.0;
                        info!(
                            "Pickup mechanism running on sample {} at {:.2} m",
                            index, dist_m
                        );
                    }
                    _ => warn!("Pickup demanded with no sample in reach"),
                }
            }
        }

        let tm = self.telemetry();
        let frame = self
            .world
            .render(&self.pos_m, self.yaw_deg, &self.params.cam, &self.homography);

        let report = SimStatusReport {
            collided: self.collided,
            samples_remaining: self.world.uncollected_count(),
        };

        (SimOutput { tm, frame }, report)
    }

    /// One tick of the driving model.
    fn drive(&mut self, dems: &RoverDems, dt: f64) {
        let kin = self.params.kin;

        // Longitudinal: throttle against a velocity proportional drag,
        // brake pulls towards zero without crossing it
        let accel = dems.throttle * kin.throttle_gain - self.vel_mps * kin.drag;
        let mut vel = self.vel_mps + accel * dt;

        if dems.brake > 0.0 {
            let decel = dems.brake * kin.brake_gain * dt;
            if vel > 0.0 {
                vel = (vel - decel).max(0.0);
            } else {
                vel = (vel + decel).min(0.0);
            }
        }

        // Yaw: speed proportional when rolling, point turn near rest
        let yaw_rate = if vel.abs() > kin.point_turn_vel_mps {
            kin.yaw_gain * dems.steer_deg * vel
        } else {
            kin.point_turn_gain * dems.steer_deg
        };
        self.yaw_deg = maths::wrap_deg_360(self.yaw_deg + yaw_rate * dt);

        // Position: blocked terrain stops the vehicle dead, which the
        // executive sees as a stall
        let yaw_rad = self.yaw_deg.to_radians();
        let next = self.pos_m + Vector2::new(yaw_rad.cos(), yaw_rad.sin()) * vel * dt;
        if self.world.is_open_m(&next) {
            self.pos_m = next;
            self.vel_mps = vel;
        } else {
            self.collided = true;
            self.vel_mps = 0.0;
        }

        // The deck tips with acceleration, hard throttle pitches the
        // camera off the ground plane
        self.pitch_deg = maths::wrap_deg_360(-accel * kin.pitch_gain);

        self.throttle_echo = dems.throttle;
        self.steer_echo_deg = dems.steer_deg;
    }

    /// Build the telemetry record for the current state. The first record
    /// of the session carries the sample manifest.
    fn telemetry(&mut self) -> RoverTm {
        let sample_manifest = if self.manifest_sent {
            None
        } else {
            self.manifest_sent = true;
            let samples = self.world.samples_m();
            Some(SampleManifest {
                samples_x: samples.iter().map(|s| s[0]).collect(),
                samples_y: samples.iter().map(|s| s[1]).collect(),
                samples_to_find: samples.len() as u32,
            })
        };

        RoverTm {
            time_s: self.time_s,
            speed_mps: self.vel_mps,
            pos_m: [self.pos_m[0], self.pos_m[1]],
            yaw_deg: self.yaw_deg,
            pitch_deg: self.pitch_deg,
            roll_deg: 0.0,
            throttle_echo: self.throttle_echo,
            steer_echo_deg: self.steer_echo_deg,
            near_sample: self.near_sample(),
            picking_up: self.pickup_end_s.is_some(),
            samples_remaining: self.world.uncollected_count(),
            sample_manifest,
        }
    }

    /// True when an uncollected sample is within pickup reach.
    fn near_sample(&self) -> bool {
        self.world
            .nearest_uncollected(&self.pos_m)
            .map(|(_, dist_m)| dist_m <= self.params.kin.near_sample_radius_m)
            .unwrap_or(false)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
