//! End-to-end scenarios on synthetic eye images.

use std::{fs, time::Duration};

use epog::{
    calibration::{GazeCalibration, GazeCalibrationConfig, MappingKind, Prompt, TargetLayout},
    config::Config,
    filter::{Epog, Filter, StabilizationConfig, StabilizationFilter},
    gaze::GazeRatio,
    image::Frame,
    landmark::{EyeSide, Landmark, Landmarks},
    pog::{Phase, PointOfGaze},
    resolution::Resolution,
    screen::{Screen, ScreenPoint},
};
use image::{GrayImage, Luma, Rgb};

const SCREEN: Resolution = Resolution::RES_1080P;

/// Eye centers in the synthetic frames.
const EYES: [(EyeSide, f32); 2] = [(EyeSide::Left, 80.0), (EyeSide::Right, 200.0)];
const EYE_Y: f32 = 50.0;
const EYE_WIDTH: f32 = 90.0;
const EYE_HEIGHT: f32 = 44.0;
const PUPIL_RADIUS: f32 = 6.0;

fn init() {
    env_logger::builder().is_test(true).try_init().ok();
}

fn screen() -> Screen {
    Screen::at_origin(SCREEN).unwrap()
}

/// The (synthetic) user's gaze ratio when looking at `p`.
fn ratio_for(p: ScreenPoint) -> GazeRatio {
    GazeRatio::new(
        0.7 - 0.4 * p.x as f32 / SCREEN.width() as f32,
        0.3 + 0.4 * p.y as f32 / SCREEN.height() as f32,
    )
    .unwrap()
}

fn landmarks() -> Landmarks {
    let (w, h) = (EYE_WIDTH, EYE_HEIGHT);
    let mut lms = Landmarks::new();
    for (side, cx) in EYES {
        let pts = [
            [cx - w / 2.0, EYE_Y],
            [cx - w / 6.0, EYE_Y - h / 2.0],
            [cx + w / 6.0, EYE_Y - h / 2.0],
            [cx + w / 2.0, EYE_Y],
            [cx + w / 6.0, EYE_Y + h / 2.0],
            [cx - w / 6.0, EYE_Y + h / 2.0],
        ];
        for (i, p) in side.landmark_indices().zip(pts) {
            lms.set(i, Landmark::new(p));
        }
    }
    lms
}

/// Draws a face whose pupils sit at `ratio` inside both eyes.
fn face(ratio: GazeRatio, frame: u64) -> Frame {
    let mut img = GrayImage::from_pixel(280, 100, Luma([210]));
    for (_, cx) in EYES {
        let left = cx - EYE_WIDTH / 2.0;
        let top = EYE_Y - EYE_HEIGHT / 2.0;
        let px = left + ratio.horizontal() * EYE_WIDTH;
        let py = top + ratio.vertical() * EYE_HEIGHT;
        for y in top as u32..=(top + EYE_HEIGHT) as u32 {
            for x in left as u32..=(left + EYE_WIDTH) as u32 {
                let d = (x as f32 - px).hypot(y as f32 - py);
                let value = if d <= PUPIL_RADIUS { 0 } else { 240 };
                img.put_pixel(x, y, Luma([value]));
            }
        }
    }
    Frame::new(img, Duration::from_millis(frame * 33))
}

fn quick_config() -> Config {
    let mut config = Config::default();
    config.iris.frames = 5;
    config.gaze_calibration = GazeCalibrationConfig {
        instruction_frames: 2,
        settle_frames: 2,
        record_frames: 5,
        min_samples: 3,
        test_frames: 3,
        ..Default::default()
    };
    config
}

/// Plays the user following the calibration prompts until tracking starts.
///
/// Returns the number of frames that took.
fn calibrate<D: epog::landmark::LandmarkDetector>(pog: &mut PointOfGaze<D>) -> u64 {
    let center = ScreenPoint::new(960, 540);
    let mut looking_at = center;
    let mut frame = 0;
    while pog.phase() != Phase::Tracking {
        assert!(frame < 1000, "calibration did not finish");
        let analysis = pog.process(&face(ratio_for(looking_at), frame));
        assert_eq!(analysis.point, None);
        looking_at = match analysis.prompt {
            Some(Prompt::Target { point, .. }) => point,
            _ => center,
        };
        frame += 1;
    }
    frame
}

#[test]
fn no_face() {
    init();
    let no_face = |_: &Frame| -> Option<Landmarks> { None };
    let mut pog = PointOfGaze::new(no_face, Config::default(), screen()).unwrap();
    for i in 0..10 {
        let analysis = pog.process(&face(GazeRatio::CENTER, i));
        assert_eq!(analysis.point, None);
        assert!(analysis.reading.is_none());
        assert_eq!(analysis.phase, Phase::IrisCalibration);
        assert_eq!(pog.point_of_gaze(&face(GazeRatio::CENTER, i)), None);
    }
    assert_eq!(pog.phase(), Phase::IrisCalibration);
    assert!(!pog.iris_calibration().is_complete());
}

#[test]
fn iris_calibration_completes_once() {
    init();
    let lms = landmarks();
    let detector = move |_: &Frame| Some(lms.clone());
    let mut pog = PointOfGaze::new(detector, Config::default(), screen()).unwrap();

    let mut transitions = 0;
    let mut frozen = None;
    for i in 0..30 {
        let before = pog.phase();
        let frame = face(GazeRatio::CENTER, i);
        let analysis = pog.process(&frame);
        let reading = analysis.reading.as_ref().unwrap();
        assert!(reading.pupils_located());
        assert!(!analysis.blinking);
        if i == 0 {
            let annotated = analysis.annotated_frame(&frame);
            let (x, y) = reading.pupil_left_coords().unwrap();
            assert_eq!(annotated.get_pixel(x as u32, y as u32), &Rgb([0, 255, 0]));
            assert_eq!(annotated.dimensions(), frame.image().dimensions());
        }
        if before == Phase::IrisCalibration && pog.phase() != Phase::IrisCalibration {
            transitions += 1;
            let iris = pog.iris_calibration();
            frozen = Some((iris.threshold(EyeSide::Left), iris.threshold(EyeSide::Right)));
        }
    }

    assert_eq!(transitions, 1);
    assert_eq!(pog.phase(), Phase::GazeCalibration);
    let iris = pog.iris_calibration();
    assert_eq!(
        frozen,
        Some((iris.threshold(EyeSide::Left), iris.threshold(EyeSide::Right)))
    );
}

#[test]
fn gaze_calibration_reproduces_targets() {
    init();
    let targets = vec![
        ScreenPoint::new(100, 100),
        ScreenPoint::new(1800, 100),
        ScreenPoint::new(960, 540),
        ScreenPoint::new(100, 980),
        ScreenPoint::new(1800, 980),
    ];
    let config = GazeCalibrationConfig {
        targets: TargetLayout::Points {
            points: targets.clone(),
        },
        instruction_frames: 0,
        settle_frames: 0,
        record_frames: 20,
        min_samples: 20,
        test_frames: 20,
        mapping: MappingKind::Affine,
    };
    let mut calib = GazeCalibration::new(config, SCREEN).unwrap();

    let mut rng = fastrand::Rng::with_seed(7);
    let mut noisy = |p: ScreenPoint| {
        let r = ratio_for(p);
        GazeRatio::new(
            r.horizontal() + (rng.f32() - 0.5) * 0.002,
            r.vertical() + (rng.f32() - 0.5) * 0.002,
        )
        .unwrap()
    };

    for &target in &targets {
        for _ in 0..20 {
            calib.collect(Some(noisy(target)));
        }
    }
    assert!(calib.is_fitted());

    for &target in &targets {
        for _ in 0..20 {
            let (x, y) = calib.model().unwrap().map(noisy(target));
            calib.test(Some(screen().clamp(x, y)));
        }
    }
    assert!(calib.is_done());
    assert_eq!(calib.records().len(), 5 * 20);
    for record in calib.records() {
        assert!(record.distance < 25.0, "{record:?}");
    }
}

#[test]
fn stabilization_keeps_fixations_apart() {
    init();
    let config = StabilizationConfig {
        enabled: true,
        ..Default::default()
    };
    let mut filter = StabilizationFilter::new(&config, &screen());
    let points = [(400.0, 500.0), (900.0, 500.0)];

    let mut t = 0;
    for round in 0..6 {
        let (x, y) = points[round % 2];
        for _ in 0..5 {
            if let Some(out) = filter.push(Epog::new(x, y, Duration::from_millis(t))) {
                assert_eq!((out.x, out.y), (x, y));
            }
            t += 33;
        }
    }

    let clusters = filter.clusters();
    assert_eq!(clusters.len(), 2);
    for cluster in clusters {
        assert_eq!(cluster.count(), 15);
    }
}

#[test]
fn calibrate_test_and_track() {
    init();
    let dir = std::env::temp_dir().join(format!("epog-scenarios-{}", std::process::id()));
    let mut config = quick_config();
    config.test_log.prefix = Some("synthetic".into());
    config.test_log.dir = dir.clone();

    let lms = landmarks();
    let origin = ScreenPoint::new(1920, 0);
    let screen = Screen::new(origin, SCREEN).unwrap();
    let mut pog = PointOfGaze::new(move |_: &Frame| Some(lms.clone()), config, screen).unwrap();

    let frames = calibrate(&mut pog);
    let calib = pog.gaze_calibration();
    assert_eq!(calib.records().len(), 9 * 3);
    let mean = calib.mean_error().unwrap();
    assert!(mean < 40.0, "mean test error {mean}");

    // one line per test record
    let log = fs::read_dir(&dir).unwrap().next().unwrap().unwrap().path();
    let name = log.file_name().unwrap().to_str().unwrap().to_string();
    assert!(name.starts_with("synthetic_raw_"), "{name}");
    let lines = fs::read_to_string(&log).unwrap();
    assert_eq!(lines.lines().count(), 9 * 3);
    for line in lines.lines() {
        let distance: f32 = line.parse().unwrap();
        assert!(distance >= 0.0);
    }
    fs::remove_dir_all(&dir).ok();

    for (i, p) in [ScreenPoint::new(600, 400), ScreenPoint::new(1500, 800)]
        .into_iter()
        .enumerate()
    {
        let analysis = pog.process(&face(ratio_for(p), frames + i as u64));
        assert_eq!(analysis.phase, Phase::Tracking);
        assert_eq!(analysis.prompt, None);
        let estimate = analysis.point.unwrap();
        let local = ScreenPoint::new(estimate.x - origin.x, estimate.y - origin.y);
        assert!(local.distance(p) < 60.0, "looked at {p}, estimated {local}");
    }

    // the user looking left moves the ratio towards 1.0
    let analysis = pog.process(&face(ratio_for(ScreenPoint::new(0, 540)), frames + 2));
    assert!(analysis.reading.unwrap().is_left());
}

#[test]
fn stabilized_tracking() {
    init();
    let mut config = quick_config();
    config.stabilization.enabled = true;

    let lms = landmarks();
    let mut pog = PointOfGaze::new(move |_: &Frame| Some(lms.clone()), config, screen()).unwrap();
    let mut frame = calibrate(&mut pog);

    let p = ScreenPoint::new(700, 300);
    // the first estimate of a new fixation is held back
    assert_eq!(pog.point_of_gaze(&face(ratio_for(p), frame)), None);
    for _ in 0..5 {
        frame += 1;
        let estimate = pog.point_of_gaze(&face(ratio_for(p), frame)).unwrap();
        assert!(estimate.distance(p) < 60.0, "looked at {p}, estimated {estimate}");
    }
}
