//! # Rover State
//!
//! [`RoverState`] is the single aggregate threaded through the autonomy
//! chain each cycle. Perception fills the per-cycle terrain products,
//! mapping accumulates into the persistent world map, and the decision
//! module reads everything and owns the mode. Exclusive ownership of the
//! aggregate means there is exactly one writer at any point in the cycle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use image::RgbImage;
use log::{info, warn};
use nalgebra::Vector2;

// Internal
use crate::auto::decision::Mode;
use crate::auto::map::{WorldMap, WorldMapParams};
use util::{
    maths,
    quadtree::{Quad, QuadTree},
};
use comms_if::tm::RoverTm;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Aggregate state of the rover, updated in place once per cycle.
pub struct RoverState {
    // ---- Pose mirrors, copied from the last valid telemetry record ----
    /// Vehicle time of the last ingested record, seconds. Every timer in the
    /// executive is keyed to this, never to wall clock time.
    pub time_s: f64,

    /// World frame position in metres.
    pub pos_m: Vector2<f64>,

    /// Yaw in degrees, `[0, 360)`, anticlockwise positive.
    pub yaw_deg: f64,

    /// Pitch in degrees, `[0, 360)`.
    pub pitch_deg: f64,

    /// Roll in degrees, `[0, 360)`.
    pub roll_deg: f64,

    /// Signed speed over ground, metres per second.
    pub vel_mps: f64,

    /// Throttle currently applied by the vehicle.
    pub throttle_echo: f64,

    /// Steering angle currently applied by the vehicle, degrees.
    pub steer_echo_deg: f64,

    /// True when close enough to a sample for the pickup mechanism to work.
    pub near_sample: bool,

    /// True while the pickup mechanism is running.
    pub picking_up: bool,

    // ---- Per-cycle perception products, refilled every cycle ----
    /// Distances to navigable terrain in the near field, warped pixels.
    pub nav_dists_px: Vec<f64>,

    /// Bearings to navigable terrain in the near field, radians,
    /// anticlockwise positive.
    pub nav_angles_rad: Vec<f64>,

    /// Distances to obstacle pixels, warped pixels.
    pub obs_dists_px: Vec<f64>,

    /// Bearings to obstacle pixels, radians.
    pub obs_angles_rad: Vec<f64>,

    /// Distances to sample rock pixels, warped pixels.
    pub rock_dists_px: Vec<f64>,

    /// Bearings to sample rock pixels, radians.
    pub rock_angles_rad: Vec<f64>,

    /// Centroid of the visible rock pixels, if any are in view this cycle.
    pub rock_candidate: Option<RockCandidate>,

    /// False-colour segmentation image for archiving, obstacle in red, rock
    /// in green, navigable in blue.
    pub vision_image: RgbImage,

    // ---- Persistent products ----
    /// Probabilistic world map, accumulated over the whole session.
    pub world_map: WorldMap,

    /// Current decision mode.
    pub mode: Mode,

    /// Vehicle time at which the current mode was entered.
    pub mode_entry_time_s: f64,

    /// Position of the first telemetry record, the target for homing.
    pub home_pos_m: Option<Vector2<f64>>,

    /// Number of samples the session started with.
    pub samples_to_find: u32,

    /// Number of samples collected so far.
    pub samples_collected: u32,

    /// Ground truth sample positions from the manifest, used only for end of
    /// session statistics.
    pub sample_manifest_m: Vec<Vector2<f64>>,

    /// Spatial index of collection locations, used to avoid stalking a rock
    /// that has already been picked up.
    pub collected_index: Box<dyn SampleIndex>,

    /// Latched true once a pickup has been requested for the current
    /// approach, cleared when the approach ends.
    pub pickup_requested: bool,
}

/// Centroid of the rock pixels visible this cycle, produced by perception.
#[derive(Debug, Clone, Copy)]
pub struct RockCandidate {
    /// World frame position of the centroid, metres.
    pub pos_m: Vector2<f64>,

    /// Mean distance to the rock pixels, warped pixels.
    pub dist_px: f64,

    /// Bearing to the centroid, degrees, anticlockwise positive.
    pub bearing_deg: f64,
}

/// [`SampleIndex`] implementation backed by [`util::quadtree::QuadTree`].
pub struct QuadTreeIndex {
    tree: QuadTree,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Spatial index over collected sample locations.
///
/// The decision module only needs membership and nearest queries, so the
/// index is kept behind this trait rather than a concrete spatial structure.
pub trait SampleIndex {
    /// Record a collection at the given world frame position.
    fn insert(&mut self, pos_m: Vector2<f64>);

    /// True if any recorded collection lies within `radius_m` of `pos_m`.
    fn any_within(&self, pos_m: &Vector2<f64>, radius_m: f64) -> bool;

    /// The recorded collection closest to `pos_m`, provided it lies within
    /// `radius_m`.
    fn nearest_within(&self, pos_m: &Vector2<f64>, radius_m: f64) -> Option<Vector2<f64>>;

    /// Number of recorded collections.
    fn len(&self) -> usize;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RoverState {
    /// Create the state for a fresh session.
    pub fn new(map_params: &WorldMapParams) -> Self {
        let extent_m = map_params.num_cells as f64 * map_params.cell_size_m;

        Self {
            time_s: 0.0,
            pos_m: Vector2::zeros(),
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            vel_mps: 0.0,
            throttle_echo: 0.0,
            steer_echo_deg: 0.0,
            near_sample: false,
            picking_up: false,
            nav_dists_px: Vec::new(),
            nav_angles_rad: Vec::new(),
            obs_dists_px: Vec::new(),
            obs_angles_rad: Vec::new(),
            rock_dists_px: Vec::new(),
            rock_angles_rad: Vec::new(),
            rock_candidate: None,
            vision_image: RgbImage::new(0, 0),
            world_map: WorldMap::new(map_params),
            mode: Mode::default(),
            mode_entry_time_s: 0.0,
            home_pos_m: None,
            samples_to_find: 0,
            samples_collected: 0,
            sample_manifest_m: Vec::new(),
            collected_index: Box::new(QuadTreeIndex::new(extent_m)),
            pickup_requested: false,
        }
    }

    /// Ingest a validated telemetry record at the start of a cycle.
    ///
    /// Mirrors the pose fields, fixes the home position and sample manifest
    /// on the first record of the session, and clears the per-cycle
    /// perception products ready for this cycle's pass.
    pub fn tick_start(&mut self, tm: &RoverTm) {
        self.time_s = tm.time_s;
        self.pos_m = Vector2::new(tm.pos_m[0], tm.pos_m[1]);
        self.yaw_deg = tm.yaw_deg;
        self.pitch_deg = tm.pitch_deg;
        self.roll_deg = tm.roll_deg;
        self.vel_mps = tm.speed_mps;
        self.throttle_echo = tm.throttle_echo;
        self.steer_echo_deg = tm.steer_echo_deg;
        self.near_sample = tm.near_sample;
        self.picking_up = tm.picking_up;

        if self.home_pos_m.is_none() {
            self.home_pos_m = Some(self.pos_m);
            self.samples_to_find = match tm.sample_manifest {
                Some(ref manifest) => manifest.samples_to_find,
                None => tm.samples_remaining,
            };
            info!(
                "Home position fixed at [{:.1}, {:.1}] m, {} sample(s) to find",
                self.pos_m[0], self.pos_m[1], self.samples_to_find
            );
        }

        if let Some(ref manifest) = tm.sample_manifest {
            if self.sample_manifest_m.is_empty() {
                self.sample_manifest_m = manifest
                    .samples_x
                    .iter()
                    .zip(manifest.samples_y.iter())
                    .map(|(&x, &y)| Vector2::new(x, y))
                    .collect();
            }
        }

        self.nav_dists_px.clear();
        self.nav_angles_rad.clear();
        self.obs_dists_px.clear();
        self.obs_angles_rad.clear();
        self.rock_dists_px.clear();
        self.rock_angles_rad.clear();
        self.rock_candidate = None;
    }

    /// Change the decision mode, recording the entry time.
    ///
    /// The decision module applies at most one transition per cycle, so this
    /// is only ever called once between two telemetry records.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode != self.mode {
            info!("Mode transition: {} -> {}", self.mode, mode);
            self.mode = mode;
            self.mode_entry_time_s = self.time_s;
        }
    }

    /// Vehicle time spent in the current mode, seconds.
    pub fn elapsed_in_mode_s(&self) -> f64 {
        self.time_s - self.mode_entry_time_s
    }

    /// Number of navigable terrain samples in the near field this cycle.
    pub fn nav_count(&self) -> usize {
        self.nav_angles_rad.len()
    }

    /// Mean bearing to the visible navigable terrain in degrees, or `None`
    /// when nothing navigable is in view.
    pub fn mean_nav_bearing_deg(&self) -> Option<f64> {
        maths::mean(&self.nav_angles_rad).map(f64::to_degrees)
    }

    /// Distance from the rover to the home position, or `None` before the
    /// first telemetry record.
    pub fn dist_to_home_m(&self) -> Option<f64> {
        self.home_pos_m.map(|home| (self.pos_m - home).norm())
    }
}

impl QuadTreeIndex {
    /// Create an index covering a square world of the given extent, with the
    /// world origin at the lower left corner.
    pub fn new(extent_m: f64) -> Self {
        let half = extent_m / 2.0;
        Self {
            // Slack over the world extent so clamped edge positions insert
            tree: QuadTree::new(Quad::new(Vector2::new(half, half), half + 1.0)),
        }
    }
}

impl SampleIndex for QuadTreeIndex {
    fn insert(&mut self, pos_m: Vector2<f64>) {
        if let Err(e) = self.tree.insert(pos_m) {
            warn!("Collection location not recorded: {}", e);
        }
    }

    fn any_within(&self, pos_m: &Vector2<f64>, radius_m: f64) -> bool {
        !self.tree.query_in_radius(pos_m, radius_m).is_empty()
    }

    fn nearest_within(&self, pos_m: &Vector2<f64>, radius_m: f64) -> Option<Vector2<f64>> {
        self.tree
            .nearest(pos_m)
            .filter(|p| (p - pos_m).norm() <= radius_m)
    }

    fn len(&self) -> usize {
        self.tree.len()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tm::SampleManifest;

    fn map_params() -> WorldMapParams {
        WorldMapParams {
            num_cells: 200,
            cell_size_m: 1.0,
            attitude_tol_deg: 0.5,
        }
    }

    fn tm_at(time_s: f64, pos_m: [f64; 2]) -> RoverTm {
        RoverTm {
            time_s,
            speed_mps: 0.0,
            pos_m,
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
            throttle_echo: 0.0,
            steer_echo_deg: 0.0,
            near_sample: false,
            picking_up: false,
            samples_remaining: 6,
            sample_manifest: None,
        }
    }

    #[test]
    fn test_home_fixed_on_first_record_only() {
        let mut state = RoverState::new(&map_params());

        let mut tm = tm_at(0.1, [100.0, 85.0]);
        tm.sample_manifest = Some(SampleManifest {
            samples_x: vec![50.0, 120.0],
            samples_y: vec![40.0, 150.0],
            samples_to_find: 2,
        });
        state.tick_start(&tm);

        assert_eq!(state.home_pos_m, Some(Vector2::new(100.0, 85.0)));
        assert_eq!(state.samples_to_find, 2);
        assert_eq!(state.sample_manifest_m.len(), 2);

        // A later record must not move home
        state.tick_start(&tm_at(0.2, [101.0, 85.0]));
        assert_eq!(state.home_pos_m, Some(Vector2::new(100.0, 85.0)));
        assert!((state.dist_to_home_m().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tick_start_clears_perception_products() {
        let mut state = RoverState::new(&map_params());
        state.nav_dists_px.push(10.0);
        state.nav_angles_rad.push(0.1);
        state.rock_candidate = Some(RockCandidate {
            pos_m: Vector2::new(1.0, 1.0),
            dist_px: 30.0,
            bearing_deg: 5.0,
        });

        state.tick_start(&tm_at(1.0, [0.0, 0.0]));

        assert_eq!(state.nav_count(), 0);
        assert!(state.rock_candidate.is_none());
        assert!(state.mean_nav_bearing_deg().is_none());
    }

    #[test]
    fn test_mode_entry_time_recorded() {
        let mut state = RoverState::new(&map_params());
        state.tick_start(&tm_at(5.0, [0.0, 0.0]));

        state.set_mode(Mode::Stop);
        assert_eq!(state.mode, Mode::Stop);
        assert_eq!(state.mode_entry_time_s, 5.0);

        // Setting the same mode again must not reset the entry time
        state.tick_start(&tm_at(7.5, [0.0, 0.0]));
        state.set_mode(Mode::Stop);
        assert_eq!(state.mode_entry_time_s, 5.0);
        assert!((state.elapsed_in_mode_s() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_collected_index_queries() {
        let mut index = QuadTreeIndex::new(200.0);
        index.insert(Vector2::new(50.0, 50.0));
        index.insert(Vector2::new(150.0, 150.0));

        assert_eq!(index.len(), 2);
        assert!(index.any_within(&Vector2::new(51.0, 50.0), 3.0));
        assert!(!index.any_within(&Vector2::new(100.0, 100.0), 3.0));

        let nearest = index.nearest_within(&Vector2::new(148.0, 150.0), 5.0);
        assert_eq!(nearest, Some(Vector2::new(150.0, 150.0)));
        assert!(index
            .nearest_within(&Vector2::new(100.0, 100.0), 5.0)
            .is_none());
    }
}
