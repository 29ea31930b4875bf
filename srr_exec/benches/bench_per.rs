//! # Perception Benchmark

use criterion::{criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};

use comms_if::tm::RoverTm;
use srr_lib::auto::map::WorldMapParams;
use srr_lib::auto::per::{warp, NearFieldParams, PerMgr, PerMgrParams, RockThreshold, WarpParams};
use srr_lib::rover_state::RoverState;

fn flight_params() -> PerMgrParams {
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

/// A frame roughly like a session frame: sky over sand, with a band of dark
/// terrain and a gold patch.
fn session_frame() -> RgbImage {
    let mut frame = RgbImage::from_pixel(320, 160, Rgb([200u8, 188u8, 170u8]));

    for row in 0..78 {
        for col in 0..320 {
            frame.put_pixel(col, row, Rgb([150u8, 180u8, 210u8]));
        }
    }
    for row in 96..112 {
        for col in 90..180 {
            frame.put_pixel(col, row, Rgb([62u8, 48u8, 38u8]));
        }
    }
    for row in 120..132 {
        for col in 210..240 {
            frame.put_pixel(col, row, Rgb([198u8, 166u8, 40u8]));
        }
    }

    frame
}

fn per_benchmark(c: &mut Criterion) {
    let params = flight_params();
    let per = PerMgr::from_params(params.clone()).unwrap();
    let frame = session_frame();

    let mut state = RoverState::new(&params.world_map);
    state.tick_start(&RoverTm {
        time_s: 1.0,
        pos_m: [100.0, 85.0],
        ..RoverTm::default()
    });

    // The inner unwarp on its own
    let dst = warp::dst_box(params.image_width_px, params.image_height_px, &params.warp);
    let homography = warp::solve_homography(&params.warp.src_points_px, &dst).unwrap();
    let inverse = homography.try_inverse().unwrap();

    c.bench_function("warp::warp_image", |b| {
        b.iter(|| warp::warp_image(&frame, &inverse))
    });

    // The full chain, unwarp through segmentation to the map update
    c.bench_function("PerMgr::step", |b| {
        b.iter(|| per.step(&frame, &mut state).unwrap())
    });
}

criterion_group!(benches, per_benchmark);
criterion_main!(benches);
