use image::Rgba;

use lumascope::core_modules::Frame;
use lumascope::core_modules::diff_tracker::{Centroid, MOVED_COLOR, STILL_COLOR};
use lumascope::core_modules::marker::MARKER_COLOR;
use lumascope::{VideoConfig, VideoPipeline, VideoSettings};

fn black() -> Frame {
    Frame::from_pixel(640, 480, Rgba([0, 0, 0, 255]))
}

#[test]
fn black_frames_never_report_motion() {
    let mut pipeline = VideoPipeline::new(&VideoSettings::default(), VideoConfig::default());

    for _ in 0..2 {
        let analysis = pipeline.process_frame(&black()).expect("fixed geometry");
        assert_eq!(analysis.result.moved_pixel_count, 0);
        assert!(analysis.result.centroid.is_none());
        assert!(analysis.overlay.pixels().all(|p| *p == STILL_COLOR));
        assert_eq!(analysis.annotated, black());
    }

    let mask = pipeline.last_mask().expect("two frames seen");
    assert_eq!(mask.len(), 640 * 480);
    assert!(mask.as_slice().iter().all(|&v| v == 0));
}

#[test]
fn appearing_square_is_located_at_its_center() {
    let mut pipeline = VideoPipeline::new(&VideoSettings::default(), VideoConfig::default());
    pipeline.process_frame(&black()).expect("first frame");

    let mut lit = black();
    for y in 100..120 {
        for x in 100..110 {
            lit.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }
    }
    let analysis = pipeline.process_frame(&lit).expect("second frame");

    assert_eq!(analysis.result.moved_pixel_count, 200);
    // Means are 104.5 and 109.5; both round up.
    assert_eq!(analysis.result.centroid, Some(Centroid { x: 105, y: 110 }));
    assert_eq!(
        analysis.result.to_string(),
        "tracking: motion detected (200 px) at (105, 110)"
    );
    assert_eq!(*analysis.overlay.get_pixel(100, 100), MOVED_COLOR);
    assert_eq!(*analysis.overlay.get_pixel(110, 100), STILL_COLOR);
    assert_eq!(*analysis.annotated.get_pixel(105, 110), MARKER_COLOR);

    // Nothing new on the third frame.
    let steady = pipeline.process_frame(&lit).expect("third frame");
    assert_eq!(steady.result.moved_pixel_count, 0);
}
