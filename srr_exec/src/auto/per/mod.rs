//! # Perception Module
//!
//! Turns a raw camera frame into the terrain products the rest of the
//! autonomy chain runs on. The chain each cycle is:
//!
//! 1. Unwarp the frame into a top down view with the ground plane
//!    homography ([`warp`]).
//! 2. Segment the warped image into navigable / obstacle / rock masks
//!    ([`seg`]), with obstacles restricted to the camera footprint.
//! 3. Express each detection in the rover frame and in polar form
//!    ([`frames`]), near field navigable pixels driving the steering
//!    statistics.
//! 4. Project every detection into the world and accumulate it into the
//!    world map, gated on the rover being level.
//!
//! The manager is stateless across cycles. Everything it produces lands in
//! [`RoverState`], everything persistent lives in the world map.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Frame transforms between image, rover and world coordinates
pub mod frames;

/// Colour segmentation of the warped image
pub mod seg;

/// Ground plane homography and perspective unwarp
pub mod warp;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use image::{Rgb, RgbImage};
use nalgebra::{Matrix3, Vector2};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
use crate::auto::map::WorldMapParams;
use crate::rover_state::{RockCandidate, RoverState};
use util::maths;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use seg::RockThreshold;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Perception manager.
pub struct PerMgr {
    params: PerMgrParams,

    /// Inverse of the ground plane homography, used to pull warped pixels
    /// from the camera frame.
    warp_inverse: Matrix3<f64>,
}

/// Parameters for [`PerMgr`].
#[derive(Debug, Clone, Deserialize)]
pub struct PerMgrParams {
    /// Expected camera frame width in pixels.
    pub image_width_px: u32,

    /// Expected camera frame height in pixels.
    pub image_height_px: u32,

    /// Warped pixels per metre of ground.
    pub px_per_m: f64,

    /// Perspective calibration.
    pub warp: WarpParams,

    /// Minimum channel value for navigable terrain.
    pub nav_threshold: u8,

    /// Colour policy for sample rocks.
    pub rock_threshold: RockThreshold,

    /// Near field window for the steering statistics.
    pub near_field: NearFieldParams,

    /// World map the detections accumulate into.
    pub world_map: WorldMapParams,
}

/// Perspective calibration parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct WarpParams {
    /// The four calibration points in the camera frame, `[x, y]` pixels,
    /// ordered bottom left, bottom right, top right, top left.
    pub src_points_px: [[f64; 2]; 4],

    /// Half width of the square the calibration points map onto, pixels.
    pub dst_box_half_width_px: f64,

    /// Gap between the bottom of that square and the bottom of the warped
    /// image, pixels. Covers the patch of ground hidden under the rover
    /// body.
    pub dst_bottom_offset_px: f64,
}

/// Near field window over the warped navigable mask.
///
/// Steering statistics come from this window rather than the whole mask,
/// since warp distortion grows with range and far pixels would swamp the
/// mean bearing.
#[derive(Debug, Clone, Deserialize)]
pub struct NearFieldParams {
    /// Depth of the window from the bottom of the warped image, pixels.
    pub depth_px: usize,

    /// Half width of the window about the image centre line, pixels.
    pub half_width_px: usize,
}

/// Report on one cycle of perception.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerStatusReport {
    /// Navigable terrain samples in the near field window.
    pub nav_count: usize,

    /// Obstacle pixels over the whole footprint.
    pub obs_pixel_count: usize,

    /// Rock pixels over the whole footprint.
    pub rock_pixel_count: usize,

    /// True if this cycle's detections were accumulated into the world map.
    pub map_updated: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can arise in perception.
#[derive(Debug, Error)]
pub enum PerError {
    #[error("Failed to load perception parameters: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Perspective calibration is degenerate, check the calibration points")]
    DegenerateCalibration,

    #[error(
        "Camera frame is {actual_width}x{actual_height} px, expected {expected_width}x{expected_height} px"
    )]
    UnexpectedFrameSize {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PerMgr {
    /// Initialise the manager from the given parameter file.
    pub fn init(params_file: &str) -> Result<Self, PerError> {
        Self::from_params(util::params::load(params_file)?)
    }

    /// Initialise the manager from already loaded parameters.
    pub fn from_params(params: PerMgrParams) -> Result<Self, PerError> {
        let dst = warp::dst_box(params.image_width_px, params.image_height_px, &params.warp);
        let homography = warp::solve_homography(&params.warp.src_points_px, &dst)?;
        let warp_inverse = homography
            .try_inverse()
            .ok_or(PerError::DegenerateCalibration)?;

        Ok(Self {
            params,
            warp_inverse,
        })
    }

    pub fn params(&self) -> &PerMgrParams {
        &self.params
    }

    /// Process one camera frame, filling the perception products of `state`
    /// and accumulating into its world map.
    pub fn step(
        &self,
        frame: &RgbImage,
        state: &mut RoverState,
    ) -> Result<PerStatusReport, PerError> {
        let (actual_width, actual_height) = frame.dimensions();
        if actual_width != self.params.image_width_px || actual_height != self.params.image_height_px
        {
            return Err(PerError::UnexpectedFrameSize {
                expected_width: self.params.image_width_px,
                expected_height: self.params.image_height_px,
                actual_width,
                actual_height,
            });
        }

        let (warped, footprint) = warp::warp_image(frame, &self.warp_inverse);
        let nav = seg::navigable(&warped, self.params.nav_threshold);
        let obs = seg::obstacle(&nav, &footprint);
        let rock = seg::rock(&warped, &self.params.rock_threshold);

        state.vision_image = vision_image(&nav, &obs, &rock);

        let width = self.params.image_width_px as usize;
        let height = self.params.image_height_px as usize;
        let yaw_deg = state.yaw_deg;
        let pos_m = state.pos_m;
        let px_per_m = self.params.px_per_m;

        let row_min = height.saturating_sub(self.params.near_field.depth_px);
        let row_max = height.saturating_sub(self.params.warp.dst_bottom_offset_px as usize);
        let col_min = (width / 2).saturating_sub(self.params.near_field.half_width_px);
        let col_max = (width / 2 + self.params.near_field.half_width_px).min(width);

        let mut nav_world = Vec::new();
        for ((row, col), &set) in nav.indexed_iter() {
            if !set {
                continue;
            }

            let point = frames::pixel_to_rover(row, col, height, width);
            nav_world.push(frames::rover_to_world_m(&point, yaw_deg, &pos_m, px_per_m));

            if row >= row_min && row < row_max && col >= col_min && col < col_max {
                let (dist, angle) = frames::to_polar(&point);
                state.nav_dists_px.push(dist);
                state.nav_angles_rad.push(angle);
            }
        }

        let mut obs_world = Vec::new();
        for ((row, col), &set) in obs.indexed_iter() {
            if !set {
                continue;
            }

            let point = frames::pixel_to_rover(row, col, height, width);
            let (dist, angle) = frames::to_polar(&point);
            state.obs_dists_px.push(dist);
            state.obs_angles_rad.push(angle);
            obs_world.push(frames::rover_to_world_m(&point, yaw_deg, &pos_m, px_per_m));
        }

        let mut rock_world = Vec::new();
        for ((row, col), &set) in rock.indexed_iter() {
            if !set {
                continue;
            }

            let point = frames::pixel_to_rover(row, col, height, width);
            let (dist, angle) = frames::to_polar(&point);
            state.rock_dists_px.push(dist);
            state.rock_angles_rad.push(angle);
            rock_world.push(frames::rover_to_world_m(&point, yaw_deg, &pos_m, px_per_m));
        }

        // Centroid of the visible rock pixels for the decision module. Both
        // means exist or neither does, the arrays fill together.
        state.rock_candidate =
            match (
                maths::mean(&state.rock_dists_px),
                maths::mean(&state.rock_angles_rad),
            ) {
                (Some(dist_px), Some(angle_rad)) => {
                    let point =
                        Vector2::new(dist_px * angle_rad.cos(), dist_px * angle_rad.sin());
                    Some(RockCandidate {
                        pos_m: frames::rover_to_world_m(&point, yaw_deg, &pos_m, px_per_m),
                        dist_px,
                        bearing_deg: angle_rad.to_degrees(),
                    })
                }
                _ => None,
            };

        let roll_deg = state.roll_deg;
        let pitch_deg = state.pitch_deg;
        let map_updated =
            state
                .world_map
                .update(roll_deg, pitch_deg, &nav_world, &obs_world, &rock_world);

        Ok(PerStatusReport {
            nav_count: state.nav_count(),
            obs_pixel_count: state.obs_dists_px.len(),
            rock_pixel_count: state.rock_dists_px.len(),
            map_updated,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// False colour image of the segmentation masks, obstacle in red, rock in
/// green, navigable in blue.
fn vision_image(nav: &Array2<bool>, obs: &Array2<bool>, rock: &Array2<bool>) -> RgbImage {
    let (rows, cols) = nav.dim();
    let mut image = RgbImage::new(cols as u32, rows as u32);

    for ((row, col), &is_nav) in nav.indexed_iter() {
        image.put_pixel(
            col as u32,
            row as u32,
            Rgb([
                if obs[[row, col]] { 255 } else { 0 },
                if rock[[row, col]] { 255 } else { 0 },
                if is_nav { 255 } else { 0 },
            ]),
        );
    }

    image
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tm::RoverTm;

    fn test_params() -> PerMgrParams {
        PerMgrParams {
            image_width_px: 320,
            image_height_px: 160,
            px_per_m: 10.0,
            warp: WarpParams {
                src_points_px: [[14.0, 140.0], [301.0, 140.0], [200.0, 96.0], [118.0, 96.0]],
                dst_box_half_width_px: 5.0,
                dst_bottom_offset_px: 6.0,
            },
            nav_threshold: 160,
            rock_threshold: RockThreshold::Rgb {
                low: [110, 110, 0],
                high: [255, 255, 60],
            },
            near_field: NearFieldParams {
                depth_px: 25,
                half_width_px: 20,
            },
            world_map: WorldMapParams {
                num_cells: 200,
                cell_size_m: 1.0,
                attitude_tol_deg: 0.5,
            },
        }
    }

    fn level_state(params: &PerMgrParams, roll_deg: f64) -> RoverState {
        let mut state = RoverState::new(&params.world_map);
        state.tick_start(&RoverTm {
            time_s: 1.0,
            speed_mps: 0.5,
            pos_m: [100.0, 85.0],
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            roll_deg,
            throttle_echo: 0.2,
            steer_echo_deg: 0.0,
            near_sample: false,
            picking_up: false,
            samples_remaining: 6,
            sample_manifest: None,
        });
        state
    }

    #[test]
    fn test_bright_frame_is_navigable() {
        let per = PerMgr::from_params(test_params()).unwrap();
        let mut state = level_state(per.params(), 0.0);

        let frame = RgbImage::from_pixel(320, 160, Rgb([200, 200, 200]));
        let report = per.step(&frame, &mut state).unwrap();

        assert!(report.nav_count > 0);
        assert_eq!(report.obs_pixel_count, 0);
        assert_eq!(report.rock_pixel_count, 0);
        assert!(report.map_updated);
        assert!(state.world_map.total_evidence() > 0.0);
        assert!(state.rock_candidate.is_none());

        // With ground on both sides of the centre line the mean bearing is
        // close to straight ahead
        let bearing = state.mean_nav_bearing_deg().unwrap();
        assert!(bearing.abs() < 5.0, "bearing {} deg", bearing);
    }

    #[test]
    fn test_dark_frame_is_obstacle() {
        let per = PerMgr::from_params(test_params()).unwrap();
        let mut state = level_state(per.params(), 0.0);

        let frame = RgbImage::from_pixel(320, 160, Rgb([40, 40, 40]));
        let report = per.step(&frame, &mut state).unwrap();

        assert_eq!(report.nav_count, 0);
        assert!(report.obs_pixel_count > 0);
        assert!(state.mean_nav_bearing_deg().is_none());
    }

    #[test]
    fn test_attitude_excursion_skips_map_only() {
        let per = PerMgr::from_params(test_params()).unwrap();
        let mut state = level_state(per.params(), 3.0);

        let frame = RgbImage::from_pixel(320, 160, Rgb([200, 200, 200]));
        let report = per.step(&frame, &mut state).unwrap();

        // Perception products still produced, map untouched
        assert!(report.nav_count > 0);
        assert!(!report.map_updated);
        assert_eq!(state.world_map.total_evidence(), 0.0);

        // A wrapped angle just below 360 is level and passes the gate
        let mut state = level_state(per.params(), 359.8);
        let report = per.step(&frame, &mut state).unwrap();
        assert!(report.map_updated);
    }

    #[test]
    fn test_gold_patch_yields_rock_candidate() {
        let per = PerMgr::from_params(test_params()).unwrap();
        let mut state = level_state(per.params(), 0.0);

        // Bright ground with a large gold region ahead of the rover
        let mut frame = RgbImage::from_pixel(320, 160, Rgb([200, 200, 200]));
        for row in 96..160 {
            for col in 60..260 {
                frame.put_pixel(col, row, Rgb([200, 170, 30]));
            }
        }

        let report = per.step(&frame, &mut state).unwrap();
        assert!(report.rock_pixel_count > 0);

        let candidate = state.rock_candidate.expect("no rock candidate");
        assert!(candidate.dist_px < 60.0, "dist {} px", candidate.dist_px);
        assert!(
            candidate.bearing_deg.abs() < 45.0,
            "bearing {} deg",
            candidate.bearing_deg
        );
    }

    #[test]
    fn test_unexpected_frame_size_rejected() {
        let per = PerMgr::from_params(test_params()).unwrap();
        let mut state = level_state(per.params(), 0.0);

        let frame = RgbImage::new(100, 100);
        assert!(matches!(
            per.step(&frame, &mut state),
            Err(PerError::UnexpectedFrameSize { .. })
        ));
    }
}
