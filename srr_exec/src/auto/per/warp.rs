//! # Perspective Unwarp
//!
//! Solves the ground plane homography from four calibration point pairs and
//! applies it by inverse mapping, producing the top down image together with
//! a footprint mask of the pixels the camera actually covered. Pixels
//! outside the footprint are left black and must never be classified as
//! terrain, which is why the mask travels with the image.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use image::RgbImage;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use ndarray::Array2;

// Internal
use super::{PerError, WarpParams};

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Destination square the calibration points map onto, centred on the
/// bottom of the warped image with a gap for the rover body.
pub fn dst_box(image_width_px: u32, image_height_px: u32, warp: &WarpParams) -> [[f64; 2]; 4] {
    let half_width = warp.dst_box_half_width_px;
    let offset = warp.dst_bottom_offset_px;
    let width = f64::from(image_width_px);
    let height = f64::from(image_height_px);

    [
        [width / 2.0 - half_width, height - offset],
        [width / 2.0 + half_width, height - offset],
        [width / 2.0 + half_width, height - 2.0 * half_width - offset],
        [width / 2.0 - half_width, height - 2.0 * half_width - offset],
    ]
}

/// Solve the homography mapping each `src` point onto the matching `dst`
/// point.
///
/// Points are `[x, y]` image coordinates (column, row). The eight unknowns
/// of the normalised homography are found from the stacked linear system of
/// the four correspondences. Collinear or repeated calibration points make
/// the system singular, which surfaces as
/// [`PerError::DegenerateCalibration`].
pub fn solve_homography(
    src: &[[f64; 2]; 4],
    dst: &[[f64; 2]; 4],
) -> Result<Matrix3<f64>, PerError> {
    let mut a = DMatrix::<f64>::zeros(8, 8);
    let mut b = DVector::<f64>::zeros(8);

    for i in 0..4 {
        let [x, y] = src[i];
        let [u, v] = dst[i];
        let r = i * 2;

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b).ok_or(PerError::DegenerateCalibration)?;

    Ok(Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
    ))
}

/// Apply a homography to a point, or `None` if the point maps to infinity.
pub fn apply(h: &Matrix3<f64>, point: [f64; 2]) -> Option<[f64; 2]> {
    let mapped = h * Vector3::new(point[0], point[1], 1.0);

    if mapped[2].abs() < 1e-9 {
        return None;
    }

    Some([mapped[0] / mapped[2], mapped[1] / mapped[2]])
}

/// Warp `source` into the top down view by inverse mapping with nearest
/// neighbour sampling.
///
/// Returns the warped image and the footprint mask, which is true exactly
/// where the destination pixel's pre-image fell inside the source image.
/// The warped image has the same dimensions as the source.
pub fn warp_image(source: &RgbImage, inverse: &Matrix3<f64>) -> (RgbImage, Array2<bool>) {
    let (width, height) = source.dimensions();
    let mut warped = RgbImage::new(width, height);
    let mut footprint = Array2::from_elem((height as usize, width as usize), false);

    for row in 0..height {
        for col in 0..width {
            if let Some([src_x, src_y]) = apply(inverse, [col as f64, row as f64]) {
                let src_col = src_x.round();
                let src_row = src_y.round();

                if src_col >= 0.0
                    && src_col < width as f64
                    && src_row >= 0.0
                    && src_row < height as f64
                {
                    warped.put_pixel(col, row, *source.get_pixel(src_col as u32, src_row as u32));
                    footprint[[row as usize, col as usize]] = true;
                }
            }
        }
    }

    (warped, footprint)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
