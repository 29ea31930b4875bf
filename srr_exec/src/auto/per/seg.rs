//! # Terrain Segmentation
//!
//! Classifies warped camera pixels into navigable terrain, obstacles and
//! sample rocks. Navigable terrain is bright in every channel, obstacles
//! are everything else *inside the camera footprint*, and rocks match a
//! configurable colour policy, either an RGB band or an HSV window.
//!
//! All classifiers are pure functions of the image, the same frame always
//! segments to the same masks.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::RgbImage;
use ndarray::Array2;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Colour policy used to detect sample rocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RockThreshold {
    /// Per channel band, a pixel matches when every channel lies inside its
    /// `[low, high]` range (inclusive).
    Rgb { low: [u8; 3], high: [u8; 3] },

    /// HSV window, a pixel matches when its hue lies in
    /// `[hue_min_deg, hue_max_deg]` and saturation and value meet their
    /// minima.
    Hsv {
        hue_min_deg: f64,
        hue_max_deg: f64,
        sat_min: f64,
        val_min: f64,
    },
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Mask of navigable terrain: every channel strictly above `threshold`.
pub fn navigable(image: &RgbImage, threshold: u8) -> Array2<bool> {
    let (width, height) = image.dimensions();
    let mut mask = Array2::from_elem((height as usize, width as usize), false);

    for (col, row, px) in image.enumerate_pixels() {
        mask[[row as usize, col as usize]] =
            px.0[0] > threshold && px.0[1] > threshold && px.0[2] > threshold;
    }

    mask
}

/// Mask of obstacles: the complement of navigable terrain, restricted to
/// the camera footprint.
///
/// Restricting to the footprint is what stops the black out-of-view region
/// of the warped image being reported as a wall of obstacles.
pub fn obstacle(navigable: &Array2<bool>, footprint: &Array2<bool>) -> Array2<bool> {
    let mut mask = Array2::from_elem(navigable.dim(), false);

    for ((row, col), &nav) in navigable.indexed_iter() {
        mask[[row, col]] = !nav && footprint[[row, col]];
    }

    mask
}

/// Mask of sample rock pixels under the given colour policy.
pub fn rock(image: &RgbImage, threshold: &RockThreshold) -> Array2<bool> {
    let (width, height) = image.dimensions();
    let mut mask = Array2::from_elem((height as usize, width as usize), false);

    for (col, row, px) in image.enumerate_pixels() {
        let matched = match *threshold {
            RockThreshold::Rgb { low, high } => {
                px.0[0] >= low[0]
                    && px.0[0] <= high[0]
                    && px.0[1] >= low[1]
                    && px.0[1] <= high[1]
                    && px.0[2] >= low[2]
                    && px.0[2] <= high[2]
            }
            RockThreshold::Hsv {
                hue_min_deg,
                hue_max_deg,
                sat_min,
                val_min,
            } => {
                let (hue, sat, val) = rgb_to_hsv(px.0);
                hue >= hue_min_deg && hue <= hue_max_deg && sat >= sat_min && val >= val_min
            }
        };

        mask[[row as usize, col as usize]] = matched;
    }

    mask
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert an RGB pixel to (hue degrees `[0, 360)`, saturation `[0, 1]`,
/// value `[0, 1]`).
fn rgb_to_hsv(rgb: [u8; 3]) -> (f64, f64, f64) {
    let r = rgb[0] as f64 / 255.0;
    let g = rgb[1] as f64 / 255.0;
    let b = rgb[2] as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        let mut h = 60.0 * (g - b) / delta;
        if h < 0.0 {
            h += 360.0;
        }
        h
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let sat = if max == 0.0 { 0.0 } else { delta / max };

    (hue, sat, max)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
