//! # World Map Accumulator
//!
//! Persistent, probabilistic map of the world built up from perception
//! detections. Each cycle every projected detection adds one count of
//! evidence to its cell in the matching layer, so a cell's value is the
//! number of times the rover has seen that class of terrain there. Evidence
//! is only ever added, never cleared, which makes the map monotone over a
//! session by construction.
//!
//! The whole update is gated on the rover being close to level. Warped
//! geometry is only valid when the camera matches the calibration attitude,
//! so a tilted cycle contributes nothing rather than smearing bad cells
//! into the map.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::Vector2;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

// Internal
use super::grid_map::{GridMap, GridMapError};
use util::maths;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the world map.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldMapParams {
    /// Number of cells along each side of the (square) map.
    pub num_cells: usize,

    /// Side length of a cell in metres.
    pub cell_size_m: f64,

    /// Maximum roll or pitch excursion from level, in degrees, for a cycle's
    /// detections to be accumulated.
    pub attitude_tol_deg: f64,
}

/// The accumulated world map.
#[derive(Debug, Clone, Serialize)]
pub struct WorldMap {
    /// Evidence counts per layer.
    map: GridMap<f64, WorldMapLayer>,

    /// Attitude gate tolerance, degrees.
    attitude_tol_deg: f64,

    /// Number of cycles accumulated into the map.
    num_updates: u64,

    /// Number of cycles skipped by the attitude gate.
    num_skipped: u64,
}

/// End of session statistics comparing the map against ground truth.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WorldMapStats {
    /// Percentage of the truly navigable world seen at least once.
    pub pct_mapped: f64,

    /// Percentage of mapped navigable cells which really are navigable.
    pub pct_fidelity: f64,

    /// Number of manifest samples with rock evidence mapped nearby.
    pub rocks_located: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Layers of the world map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorldMapLayer {
    /// Evidence of impassable terrain.
    Obstacle,

    /// Evidence of a sample rock.
    Rock,

    /// Evidence of navigable terrain.
    Navigable,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WorldMap {
    pub fn new(params: &WorldMapParams) -> Self {
        Self {
            map: GridMap::new(
                params.cell_size_m,
                [params.num_cells, params.num_cells],
                &[
                    WorldMapLayer::Obstacle,
                    WorldMapLayer::Rock,
                    WorldMapLayer::Navigable,
                ],
                0.0,
            ),
            attitude_tol_deg: params.attitude_tol_deg,
            num_updates: 0,
            num_skipped: 0,
        }
    }

    /// Accumulate one cycle of detections, gated on attitude.
    ///
    /// Returns true if the cycle was accumulated, false if the gate skipped
    /// it. Attitude angles arrive wrapped to `[0, 360)`, so a roll of 359.8
    /// degrees is 0.2 degrees from level and passes a 0.5 degree gate.
    pub fn update(
        &mut self,
        roll_deg: f64,
        pitch_deg: f64,
        navigable_m: &[Vector2<f64>],
        obstacle_m: &[Vector2<f64>],
        rock_m: &[Vector2<f64>],
    ) -> bool {
        if !maths::near_level_deg(roll_deg, self.attitude_tol_deg)
            || !maths::near_level_deg(pitch_deg, self.attitude_tol_deg)
        {
            debug!(
                "Attitude outside map tolerance (roll {:.2} deg, pitch {:.2} deg), update skipped",
                roll_deg, pitch_deg
            );
            self.num_skipped += 1;
            return false;
        }

        self.add_detections(WorldMapLayer::Navigable, navigable_m);
        self.add_detections(WorldMapLayer::Obstacle, obstacle_m);
        self.add_detections(WorldMapLayer::Rock, rock_m);
        self.num_updates += 1;

        true
    }

    /// View of a layer's evidence counts, indexed `[cell_x, cell_y]`.
    pub fn layer_view(&self, layer: WorldMapLayer) -> Result<ArrayView2<f64>, GridMapError> {
        self.map.layer_view(layer)
    }

    /// Total evidence over all layers and cells.
    pub fn total_evidence(&self) -> f64 {
        let mut total = 0.0;
        for &layer in &[
            WorldMapLayer::Obstacle,
            WorldMapLayer::Rock,
            WorldMapLayer::Navigable,
        ] {
            if let Ok(view) = self.map.layer_view(layer) {
                total += view.sum();
            }
        }
        total
    }

    /// Number of cycles accumulated into the map.
    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    /// Number of cycles the attitude gate skipped.
    pub fn num_skipped(&self) -> u64 {
        self.num_skipped
    }

    /// Centre positions of every cell holding rock evidence.
    pub fn rock_cell_centres(&self) -> Result<Vec<Vector2<f64>>, GridMapError> {
        let view = self.map.layer_view(WorldMapLayer::Rock)?;
        let mut centres = Vec::new();

        for ((x, y), &count) in view.indexed_iter() {
            if count > 0.0 {
                centres.push(self.map.cell_centre([x, y]));
            }
        }

        Ok(centres)
    }

    /// Compare the map against the true navigable mask and sample manifest.
    ///
    /// `truth_navigable` is indexed `[cell_x, cell_y]` and must match the
    /// map dimensions. A manifest sample counts as located when any cell
    /// with rock evidence lies within `rock_tol_m` of it.
    pub fn stats(
        &self,
        truth_navigable: &ArrayView2<bool>,
        manifest_m: &[Vector2<f64>],
        rock_tol_m: f64,
    ) -> Result<WorldMapStats, GridMapError> {
        let nav = self.map.layer_view(WorldMapLayer::Navigable)?;

        let mut total_true_nav = 0usize;
        let mut good_nav = 0usize;
        let mut bad_nav = 0usize;

        for ((x, y), &count) in nav.indexed_iter() {
            let truly_navigable = truth_navigable.get([x, y]).copied().unwrap_or(false);

            if truly_navigable {
                total_true_nav += 1;
            }

            if count > 0.0 {
                if truly_navigable {
                    good_nav += 1;
                } else {
                    bad_nav += 1;
                }
            }
        }

        let pct_mapped = if total_true_nav > 0 {
            100.0 * good_nav as f64 / total_true_nav as f64
        } else {
            0.0
        };

        let pct_fidelity = if good_nav + bad_nav > 0 {
            100.0 * good_nav as f64 / (good_nav + bad_nav) as f64
        } else {
            0.0
        };

        let rock_centres = self.rock_cell_centres()?;
        let rocks_located = manifest_m
            .iter()
            .filter(|sample| {
                rock_centres
                    .iter()
                    .any(|centre| (*sample - centre).norm() <= rock_tol_m)
            })
            .count();

        Ok(WorldMapStats {
            pct_mapped,
            pct_fidelity,
            rocks_located,
        })
    }

    fn add_detections(&mut self, layer: WorldMapLayer, positions_m: &[Vector2<f64>]) {
        for pos in positions_m {
            let cell = self.map.position_to_cell_clipped(pos);
            if let Ok(count) = self.map.get_mut(layer, cell) {
                *count += 1.0;
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array2;

    fn small_map() -> WorldMap {
        WorldMap::new(&WorldMapParams {
            num_cells: 10,
            cell_size_m: 1.0,
            attitude_tol_deg: 0.5,
        })
    }

    #[test]
    fn test_attitude_gate_wraps_around_zero() {
        let mut map = small_map();
        let detections = vec![Vector2::new(5.0, 5.0)];

        // 359.8 degrees is 0.2 degrees from level, inside a 0.5 degree gate
        assert!(map.update(359.8, 0.2, &detections, &[], &[]));
        assert_eq!(map.num_updates(), 1);

        // 3 degrees of roll is an excursion, nothing must be added
        let before = map.total_evidence();
        assert!(!map.update(3.0, 0.0, &detections, &[], &[]));
        assert_eq!(map.total_evidence(), before);
        assert_eq!(map.num_skipped(), 1);

        // Same for pitch
        assert!(!map.update(0.0, 357.0, &detections, &[], &[]));
    }

    #[test]
    fn test_evidence_is_monotone() {
        let mut map = small_map();
        let detections = vec![Vector2::new(2.5, 7.5), Vector2::new(2.6, 7.4)];

        let mut last = 0.0;
        for _ in 0..5 {
            map.update(0.0, 0.0, &detections, &detections, &[]);
            let total = map.total_evidence();
            assert!(total > last);
            last = total;
        }

        // Both detections fall in cell [2, 7], five cycles of two each
        let nav = map.layer_view(WorldMapLayer::Navigable).unwrap();
        assert_eq!(nav[[2, 7]], 10.0);
    }

    #[test]
    fn test_out_of_map_detections_clip_to_border() {
        let mut map = small_map();

        map.update(0.0, 0.0, &[], &[Vector2::new(-3.0, 25.0)], &[]);

        let obs = map.layer_view(WorldMapLayer::Obstacle).unwrap();
        assert_eq!(obs[[0, 9]], 1.0);
    }

    #[test]
    fn test_stats_against_truth() {
        let mut map = small_map();

        // Truth: left half navigable
        let mut truth = Array2::from_elem((10, 10), false);
        for x in 0..5 {
            for y in 0..10 {
                truth[[x, y]] = true;
            }
        }

        // Map 10 cells as navigable, 8 correct and 2 in the obstacle half
        let mut nav = Vec::new();
        for y in 0..8 {
            nav.push(Vector2::new(2.5, y as f64 + 0.5));
        }
        nav.push(Vector2::new(7.5, 0.5));
        nav.push(Vector2::new(8.5, 1.5));

        // Rock evidence near one of two manifest samples
        let rocks = vec![Vector2::new(3.5, 3.5)];
        map.update(0.0, 0.0, &nav, &[], &rocks);

        let manifest = [Vector2::new(4.0, 4.0), Vector2::new(9.0, 9.0)];
        let stats = map.stats(&truth.view(), &manifest, 3.0).unwrap();

        // 8 of 50 truly navigable cells seen
        assert!((stats.pct_mapped - 16.0).abs() < 1e-9);
        // 8 of 10 mapped cells correct
        assert!((stats.pct_fidelity - 80.0).abs() < 1e-9);
        assert_eq!(stats.rocks_located, 1);
    }
}
