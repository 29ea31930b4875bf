//! # Simulated World
//!
//! Terrain generation and camera rendering for the simulation. The world is
//! a square grid of open and blocked cells generated from thresholded
//! Perlin noise, walled at the border, with gold sample rocks scattered
//! over the open ground. The camera renders by projecting each pixel
//! through the forward ground plane homography and sampling the ground
//! colour at the hit point, so the perception chain sees exactly the
//! geometry its unwarp calibration assumes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use image::{Rgb, RgbImage};
use log::warn;
use nalgebra::{Matrix3, Vector2};
use ndarray::Array2;
use noise::{NoiseFn, Perlin, Seedable};
use ordered_float::OrderedFloat;
use serde::Deserialize;

// Internal
use super::SimCamParams;
use crate::auto::per::{frames, warp};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Open ground base colour. Every channel stays clear of the navigable
/// brightness threshold even at full jitter.
const SAND: [u8; 3] = [205, 190, 172];

/// Blocked terrain colour.
const ROCK_DARK: [u8; 3] = [62, 48, 38];

/// Sample rock colour, inside the gold detection band.
const GOLD: [u8; 3] = [198, 166, 40];

/// Sky colour, outside every detection band.
const SKY: [u8; 3] = [150, 180, 210];

/// Half range of the per cell colour jitter.
const JITTER: i16 = 8;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SimWorldParams {
    /// Number of cells along each side of the square world.
    pub num_cells: usize,

    /// Cell size, metres.
    pub cell_size_m: f64,

    /// Spatial scale of the terrain noise, per cell.
    pub noise_scale: f64,

    /// Noise value above which a cell is open ground. Lower values give a
    /// more open world.
    pub open_level: f64,

    /// Width of the blocked border wall, cells.
    pub border_cells: usize,

    /// Rover start position, world metres.
    pub start_pos_m: [f64; 2],

    /// Rover start heading, degrees anticlockwise from world x.
    pub start_yaw_deg: f64,

    /// Radius about the start position cleared of blocked cells, metres.
    pub start_clear_radius_m: f64,

    /// Number of sample rocks to scatter.
    pub num_samples: usize,

    /// Rendered radius of a sample rock, metres.
    pub sample_radius_m: f64,

    /// Minimum spacing between samples, and between a sample and the start
    /// position, metres.
    pub min_sample_spacing_m: f64,
}

/// The generated world: terrain truth, colour jitter and the samples.
pub struct SimWorld {
    num_cells: usize,

    cell_size_m: f64,

    /// True where the ground is open, indexed `[cell_x, cell_y]`.
    open: Array2<bool>,

    /// Per cell colour jitter applied to the sand.
    jitter: Array2<i16>,

    /// Sample rock positions, world metres. Fixed for the session, the
    /// manifest refers to this full list.
    samples_m: Vec<Vector2<f64>>,

    /// Collection state per sample, collected rocks are no longer rendered.
    collected: Vec<bool>,

    sample_radius_m: f64,
}

/// Small deterministic generator for sample placement and colour jitter, so
/// a seed fully fixes the world without pulling in a random number crate.
struct XorShift32 {
    state: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl XorShift32 {
    fn new(seed: u32) -> Self {
        Self {
            // The all zero state is a fixed point of the generator
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    fn next(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        f64::from(self.next()) / (f64::from(u32::MAX) + 1.0)
    }
}

impl SimWorld {
    /// Generate the world for the given seed.
    pub fn generate(params: &SimWorldParams, seed: u32) -> Self {
        let n = params.num_cells;
        let perlin = Perlin::new().set_seed(seed);

        let mut open = Array2::from_elem((n, n), false);
        for x in 0..n {
            for y in 0..n {
                let value = perlin.get([
                    x as f64 * params.noise_scale,
                    y as f64 * params.noise_scale,
                ]);
                open[[x, y]] = value > params.open_level;
            }
        }

        // Border wall so the rover cannot leave the world
        let border = params.border_cells.min(n / 2);
        for i in 0..n {
            for b in 0..border {
                open[[i, b]] = false;
                open[[i, n - 1 - b]] = false;
                open[[b, i]] = false;
                open[[n - 1 - b, i]] = false;
            }
        }

        // Clear ground about the start so a session never begins inside
        // terrain
        let start = Vector2::new(params.start_pos_m[0], params.start_pos_m[1]);
        let clear_cells = (params.start_clear_radius_m / params.cell_size_m).ceil() as i64;
        let start_cell = [
            (start[0] / params.cell_size_m).floor() as i64,
            (start[1] / params.cell_size_m).floor() as i64,
        ];
        for dx in -clear_cells..=clear_cells {
            for dy in -clear_cells..=clear_cells {
                if dx * dx + dy * dy > clear_cells * clear_cells {
                    continue;
                }
                let x = start_cell[0] + dx;
                let y = start_cell[1] + dy;
                let in_interior = x >= border as i64
                    && y >= border as i64
                    && x < (n - border) as i64
                    && y < (n - border) as i64;
                if in_interior {
                    open[[x as usize, y as usize]] = true;
                }
            }
        }

        // Scatter the samples over open ground
        let mut rng = XorShift32::new(seed ^ 0xA511_E9B3);
        let extent_m = n as f64 * params.cell_size_m;
        let mut samples_m: Vec<Vector2<f64>> = Vec::new();
        let mut attempts = 0;
        while samples_m.len() < params.num_samples && attempts < 10_000 {
            attempts += 1;

            let pos = Vector2::new(rng.next_f64() * extent_m, rng.next_f64() * extent_m);
            let cell = [
                (pos[0] / params.cell_size_m).floor() as usize,
                (pos[1] / params.cell_size_m).floor() as usize,
            ];

            let on_open = open.get(cell).copied().unwrap_or(false);
            let clear_of_start = (pos - start).norm() >= params.min_sample_spacing_m;
            let clear_of_rest = samples_m
                .iter()
                .all(|s| (s - pos).norm() >= params.min_sample_spacing_m);

            if on_open && clear_of_start && clear_of_rest {
                samples_m.push(pos);
            }
        }
        if samples_m.len() < params.num_samples {
            warn!(
                "Only placed {} of {} samples, the terrain is too closed",
                samples_m.len(),
                params.num_samples
            );
        }

        let jitter = Array2::from_shape_fn((n, n), |_| {
            (rng.next() % (2 * JITTER as u32 + 1)) as i16 - JITTER
        });

        let collected = vec![false; samples_m.len()];

        Self {
            num_cells: n,
            cell_size_m: params.cell_size_m,
            open,
            jitter,
            samples_m,
            collected,
            sample_radius_m: params.sample_radius_m,
        }
    }

    pub fn extent_m(&self) -> f64 {
        self.num_cells as f64 * self.cell_size_m
    }

    /// Terrain truth, indexed `[cell_x, cell_y]`, for end of session
    /// statistics.
    pub fn open_cells(&self) -> &Array2<bool> {
        &self.open
    }

    /// Full sample list, collected or not, for the manifest.
    pub fn samples_m(&self) -> &[Vector2<f64>] {
        &self.samples_m
    }

    /// True if the position is on open ground inside the world.
    pub fn is_open_m(&self, pos_m: &Vector2<f64>) -> bool {
        self.cell_of(pos_m)
            .map(|cell| self.open[cell])
            .unwrap_or(false)
    }

    /// Nearest uncollected sample, as `(index, distance)`.
    pub fn nearest_uncollected(&self, pos_m: &Vector2<f64>) -> Option<(usize, f64)> {
        self.samples_m
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.collected[*i])
            .map(|(i, s)| (i, (s - pos_m).norm()))
            .min_by_key(|(_, dist_m)| OrderedFloat(*dist_m))
    }

    /// Mark a sample collected, removing it from the rendered scene.
    pub fn collect(&mut self, index: usize) {
        if let Some(flag) = self.collected.get_mut(index) {
            *flag = true;
        }
    }

    pub fn uncollected_count(&self) -> u32 {
        self.collected.iter().filter(|c| !**c).count() as u32
    }

    /// Render the camera view for the given pose.
    ///
    /// `homography` is the forward ground plane homography, camera pixels
    /// to warped pixels, as solved by [`warp::solve_homography`].
    pub fn render(
        &self,
        pos_m: &Vector2<f64>,
        yaw_deg: f64,
        cam: &SimCamParams,
        homography: &Matrix3<f64>,
    ) -> RgbImage {
        let width = cam.image_width_px;
        let height = cam.image_height_px;
        let mut frame = RgbImage::new(width, height);

        for row in 0..height {
            for col in 0..width {
                let colour = self
                    .pixel_colour(row, col, pos_m, yaw_deg, cam, homography)
                    .unwrap_or(Rgb(SKY));
                frame.put_pixel(col, row, colour);
            }
        }

        frame
    }

    /// Ground colour seen by one camera pixel, `None` for sky.
    fn pixel_colour(
        &self,
        row: u32,
        col: u32,
        pos_m: &Vector2<f64>,
        yaw_deg: f64,
        cam: &SimCamParams,
        homography: &Matrix3<f64>,
    ) -> Option<Rgb<u8>> {
        let [dst_x, dst_y] = warp::apply(homography, [f64::from(col), f64::from(row)])?;

        // Rover frame in warped pixels, same convention as the perception
        // chain: x forward from the image bottom, y left from the centre
        let x_px = f64::from(cam.image_height_px) - dst_y;
        let y_px = f64::from(cam.image_width_px) / 2.0 - dst_x;

        // Pixels above the horizon project behind the ground plane
        if x_px < 0.0 {
            return None;
        }

        let dist_m = x_px.hypot(y_px) / cam.px_per_m;
        if dist_m > cam.view_dist_m {
            return None;
        }

        let world_m =
            frames::rover_to_world_m(&Vector2::new(x_px, y_px), yaw_deg, pos_m, cam.px_per_m);

        Some(self.ground_colour(&world_m))
    }

    /// Colour of the ground at a world position.
    fn ground_colour(&self, pos_m: &Vector2<f64>) -> Rgb<u8> {
        let cell = match self.cell_of(pos_m) {
            Some(cell) => cell,
            // Beyond the world reads as blocked terrain
            None => return Rgb(ROCK_DARK),
        };

        if !self.open[cell] {
            return Rgb(ROCK_DARK);
        }

        for (i, sample) in self.samples_m.iter().enumerate() {
            if !self.collected[i] && (sample - pos_m).norm() <= self.sample_radius_m {
                return Rgb(GOLD);
            }
        }

        let j = self.jitter[cell];
        Rgb([
            (SAND[0] as i16 + j).clamp(0, 255) as u8,
            (SAND[1] as i16 + j).clamp(0, 255) as u8,
            (SAND[2] as i16 + j).clamp(0, 255) as u8,
        ])
    }

    fn cell_of(&self, pos_m: &Vector2<f64>) -> Option<[usize; 2]> {
        let x = (pos_m[0] / self.cell_size_m).floor();
        let y = (pos_m[1] / self.cell_size_m).floor();

        if x < 0.0 || y < 0.0 || x >= self.num_cells as f64 || y >= self.num_cells as f64 {
            return None;
        }

        Some([x as usize, y as usize])
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
