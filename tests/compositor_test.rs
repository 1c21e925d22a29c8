use image::{Rgba, RgbaImage};
use nalgebra as na;
use video_panorama::compositor::{Compositor, FrameMotion, chain_transforms};
use video_panorama::synthetic::{panning_frames, panning_world};
use video_panorama::{BlendMode, CancelToken, Frame, PlacementStatus, StitchConfig, StitchError};

fn solid(index: usize, color: [u8; 3], width: u32, height: u32) -> Frame {
    Frame::new(
        index,
        index as f64 / 30.0,
        RgbaImage::from_pixel(width, height, Rgba([color[0], color[1], color[2], 255])),
    )
}

fn shifted(dx: f64, status: PlacementStatus) -> FrameMotion {
    FrameMotion {
        relative: na::Similarity2::new(na::Vector2::new(dx, 0.0), 0.0, 1.0),
        status,
    }
}

fn compositor(blend_mode: BlendMode) -> Compositor {
    Compositor::from_config(&StitchConfig {
        blend_mode,
        ..StitchConfig::default()
    })
}

#[test]
fn test_chain_transforms_accumulates() {
    let motions = [
        FrameMotion::origin(),
        shifted(20.0, PlacementStatus::Aligned),
        shifted(15.0, PlacementStatus::Estimated),
    ];
    let chained = chain_transforms(&motions);
    let xs: Vec<f64> = chained
        .iter()
        .map(|t| t.isometry.translation.vector.x)
        .collect();
    assert_eq!(xs, vec![0.0, 20.0, 35.0]);
}

#[test]
fn test_single_frame_is_unchanged() {
    let world = panning_world(1, 0, 90, 70, 4);
    let frame = panning_frames(&world, 1, 0, 90, 70, 30.0).remove(0);
    let expected = frame.image.clone();
    for mode in [BlendMode::Feather, BlendMode::LastWins] {
        let panorama = compositor(mode)
            .compose(vec![frame.clone()], &[FrameMotion::origin()], 30.0, &CancelToken::new())
            .unwrap();
        assert_eq!(panorama.image, expected);
        assert_eq!(panorama.placements.len(), 1);
        let rect = panorama.placements.placements[0].rect;
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (0, 0, 90, 70));
    }
}

#[test]
fn test_canvas_is_union_of_placements() {
    let frames = vec![solid(0, [255, 0, 0], 100, 80), solid(1, [0, 0, 255], 100, 80)];
    let motions = [FrameMotion::origin(), shifted(50.0, PlacementStatus::Aligned)];
    let panorama = compositor(BlendMode::LastWins)
        .compose(frames, &motions, 30.0, &CancelToken::new())
        .unwrap();
    assert_eq!((panorama.width(), panorama.height()), (150, 80));
    assert_eq!(panorama.channels(), 4);
    assert_eq!(panorama.image.get_pixel(10, 40).0, [255, 0, 0, 255]);
    assert_eq!(panorama.image.get_pixel(60, 40).0, [0, 0, 255, 255]);
    assert_eq!(panorama.image.get_pixel(140, 40).0, [0, 0, 255, 255]);
    let xs: Vec<u32> = panorama.placements.iter().map(|p| p.rect.x).collect();
    assert_eq!(xs, vec![0, 50]);
}

#[test]
fn test_negative_motion_moves_origin() {
    let frames = vec![solid(0, [255, 0, 0], 100, 80), solid(1, [0, 0, 255], 100, 80)];
    let motions = [
        FrameMotion::origin(),
        FrameMotion {
            relative: na::Similarity2::new(na::Vector2::new(-30.0, 10.0), 0.0, 1.0),
            status: PlacementStatus::Aligned,
        },
    ];
    let panorama = compositor(BlendMode::Feather)
        .compose(frames, &motions, 30.0, &CancelToken::new())
        .unwrap();
    assert_eq!((panorama.width(), panorama.height()), (130, 90));
    let rects = panorama.placements.rects();
    assert_eq!((rects[0].x, rects[0].y), (30, 0));
    assert_eq!((rects[1].x, rects[1].y), (0, 10));
    // uncovered corner stays transparent
    assert_eq!(panorama.image.get_pixel(0, 0)[3], 0);
}

#[test]
fn test_feather_mixes_overlap_smoothly() {
    let frames = vec![solid(0, [200, 0, 0], 100, 60), solid(1, [0, 0, 200], 100, 60)];
    let motions = [FrameMotion::origin(), shifted(50.0, PlacementStatus::Aligned)];
    let panorama = compositor(BlendMode::Feather)
        .compose(frames, &motions, 30.0, &CancelToken::new())
        .unwrap();
    assert_eq!(panorama.image.get_pixel(20, 30).0, [200, 0, 0, 255]);
    assert_eq!(panorama.image.get_pixel(130, 30).0, [0, 0, 200, 255]);
    let mid = panorama.image.get_pixel(75, 30).0;
    assert!(mid[0] > 50 && mid[2] > 50, "{:?}", mid);
    // red fades out towards the right edge of frame 0
    let left = panorama.image.get_pixel(55, 30).0;
    let right = panorama.image.get_pixel(95, 30).0;
    assert!(left[0] > right[0]);
    assert!(left[2] < right[2]);
}

#[test]
fn test_skipped_frames_are_placed_but_not_blended() {
    let frames = vec![solid(0, [255, 0, 0], 100, 60), solid(1, [0, 255, 0], 100, 60)];
    let motions = [FrameMotion::origin(), shifted(100.0, PlacementStatus::Skipped)];
    let panorama = compositor(BlendMode::Feather)
        .compose(frames, &motions, 30.0, &CancelToken::new())
        .unwrap();
    assert_eq!(panorama.width(), 200);
    assert_eq!(panorama.placements.len(), 2);
    assert_eq!(panorama.placements.placements[1].status, PlacementStatus::Skipped);
    assert_eq!(panorama.image.get_pixel(150, 30)[3], 0);
    assert_eq!(panorama.image.get_pixel(50, 30).0, [255, 0, 0, 255]);
}

#[test]
fn test_canvas_downscaled_under_cap() {
    let frames: Vec<Frame> = (0..10).map(|i| solid(i, [10, 20, 30], 100, 100)).collect();
    let mut motions = vec![FrameMotion::origin()];
    motions.extend((1..10).map(|_| shifted(100.0, PlacementStatus::Aligned)));
    let compositor = Compositor {
        blend_mode: BlendMode::Feather,
        max_canvas_area: 25_000,
        min_canvas_scale: 0.1,
    };
    let panorama = compositor
        .compose(frames, &motions, 30.0, &CancelToken::new())
        .unwrap();
    assert!(panorama.area() <= 25_000);
    assert!(panorama.width() >= 450, "{}", panorama.width());
    for p in panorama.placements.iter() {
        assert!(p.rect.right() <= panorama.width());
        assert!(p.rect.bottom() <= panorama.height());
    }
    let centre = panorama.image.get_pixel(panorama.width() / 2, panorama.height() / 2).0;
    assert_eq!(centre, [10, 20, 30, 255]);
}

#[test]
fn test_canvas_too_large_below_min_scale() {
    let frames: Vec<Frame> = (0..4).map(|i| solid(i, [1, 2, 3], 100, 100)).collect();
    let mut motions = vec![FrameMotion::origin()];
    motions.extend((1..4).map(|_| shifted(100.0, PlacementStatus::Aligned)));
    let compositor = Compositor {
        blend_mode: BlendMode::Feather,
        max_canvas_area: 1_000,
        min_canvas_scale: 0.5,
    };
    match compositor.compose(frames, &motions, 30.0, &CancelToken::new()) {
        Err(StitchError::CanvasTooLarge {
            width,
            height,
            max_area,
        }) => {
            assert_eq!((width, height, max_area), (400, 100, 1_000));
        }
        other => panic!("unexpected {:?}", other.map(|p| p.area())),
    }
}

#[test]
fn test_cancelled_before_canvas() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = compositor(BlendMode::Feather).compose(
        vec![solid(0, [0, 0, 0], 10, 10)],
        &[FrameMotion::origin()],
        30.0,
        &cancel,
    );
    assert!(matches!(result, Err(StitchError::Cancelled)));
}

#[test]
fn test_mismatched_inputs_fail() {
    let result = compositor(BlendMode::Feather).compose(
        vec![solid(0, [0, 0, 0], 10, 10)],
        &[],
        30.0,
        &CancelToken::new(),
    );
    assert!(matches!(result, Err(StitchError::StitchFailed(_))));
    let empty = compositor(BlendMode::Feather).compose(Vec::new(), &[], 30.0, &CancelToken::new());
    assert!(matches!(empty, Err(StitchError::StitchFailed(_))));
}
