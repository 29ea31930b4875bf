//! # Frame Transforms
//!
//! Pure coordinate transforms between the frames used by perception:
//!
//! - *Warped image frame*: pixel rows and columns of the top down image,
//!   row 0 at the top.
//! - *Rover frame*: origin at the bottom centre of the warped image, x
//!   forward (up the image), y to the left, units of warped pixels.
//! - *World frame*: metres, origin at the lower left corner of the world
//!   map, yaw measured anticlockwise from world x.
//!
//! Everything here is a total function over finite inputs, the geometry
//! cannot fail.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Vector2;

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a warped image pixel into the rover frame.
///
/// The rover sits at the bottom centre of the warped image, so a pixel on
/// the bottom row directly below the centre has (almost) zero range.
pub fn pixel_to_rover(row: usize, col: usize, image_height: usize, image_width: usize) -> Vector2<f64> {
    Vector2::new(
        image_height as f64 - row as f64,
        image_width as f64 / 2.0 - col as f64,
    )
}

/// Polar form of a rover frame point, as `(distance, angle)` with the angle
/// in radians, anticlockwise (left) positive.
pub fn to_polar(point: &Vector2<f64>) -> (f64, f64) {
    (point.norm(), point[1].atan2(point[0]))
}

/// Project a rover frame point (warped pixels) into the world frame
/// (metres), given the rover's pose.
pub fn rover_to_world_m(
    point_px: &Vector2<f64>,
    yaw_deg: f64,
    pos_m: &Vector2<f64>,
    px_per_m: f64,
) -> Vector2<f64> {
    let yaw_rad = yaw_deg.to_radians();
    let (sin_yaw, cos_yaw) = yaw_rad.sin_cos();

    Vector2::new(
        (point_px[0] * cos_yaw - point_px[1] * sin_yaw) / px_per_m + pos_m[0],
        (point_px[0] * sin_yaw + point_px[1] * cos_yaw) / px_per_m + pos_m[1],
    )
}

/// Inverse of [`rover_to_world_m`]: express a world frame point in the rover
/// frame (warped pixels) for the given pose.
pub fn world_to_rover_px(
    point_m: &Vector2<f64>,
    yaw_deg: f64,
    pos_m: &Vector2<f64>,
    px_per_m: f64,
) -> Vector2<f64> {
    let yaw_rad = yaw_deg.to_radians();
    let (sin_yaw, cos_yaw) = yaw_rad.sin_cos();
    let delta = (point_m - pos_m) * px_per_m;

    Vector2::new(
        delta[0] * cos_yaw + delta[1] * sin_yaw,
        -delta[0] * sin_yaw + delta[1] * cos_yaw,
    )
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const IMG_W: usize = 320;
    const IMG_H: usize = 160;

    #[test]
    fn test_pixel_to_rover_origin() {
        // Bottom centre pixel is one pixel ahead of the origin, dead centre
        let p = pixel_to_rover(IMG_H - 1, IMG_W / 2, IMG_H, IMG_W);
        assert_eq!(p, Vector2::new(1.0, 0.0));

        // A pixel left of centre has positive y
        let p = pixel_to_rover(IMG_H - 1, IMG_W / 2 - 10, IMG_H, IMG_W);
        assert_eq!(p, Vector2::new(1.0, 10.0));
    }

    #[test]
    fn test_to_polar_exact() {
        let (dist, angle) = to_polar(&Vector2::new(3.0, 4.0));
        assert!((dist - 5.0).abs() < 1e-12);
        assert!((angle - 4.0f64.atan2(3.0)).abs() < 1e-12);

        // Straight ahead is angle zero
        let (_, angle) = to_polar(&Vector2::new(10.0, 0.0));
        assert_eq!(angle, 0.0);

        // Right of centre is negative
        let (_, angle) = to_polar(&Vector2::new(10.0, -10.0));
        assert!(angle < 0.0);
    }

    #[test]
    fn test_rover_to_world_known_pose() {
        // Facing world +y (yaw 90), a point 10 px ahead lands 1 m up the y
        // axis at 10 px per metre
        let world = rover_to_world_m(
            &Vector2::new(10.0, 0.0),
            90.0,
            &Vector2::new(50.0, 50.0),
            10.0,
        );
        assert!((world[0] - 50.0).abs() < 1e-9);
        assert!((world[1] - 51.0).abs() < 1e-9);
    }

    #[test]
    fn test_world_round_trip() {
        let pos = Vector2::new(99.3, 85.7);
        let px_per_m = 10.0;

        for &yaw_deg in &[0.0, 37.5, 90.0, 180.0, 271.2, 359.9] {
            for &(x, y) in &[(5.0, 0.0), (120.0, -40.0), (60.0, 60.0), (1.0, 1.0)] {
                let p = Vector2::new(x, y);
                let world = rover_to_world_m(&p, yaw_deg, &pos, px_per_m);
                let back = world_to_rover_px(&world, yaw_deg, &pos, px_per_m);
                assert!(
                    (back - p).norm() < 1e-9,
                    "round trip failed for yaw {} point {:?}",
                    yaw_deg,
                    p
                );
            }
        }
    }
}
