//! End-to-end behavior of the filter, tracker and blink detector through the public API

use approx::assert_relative_eq;
use pupil_signal::{
    BlinkConfig, BlinkInterval, BlinkStateMachine, FilterConfig, FilterKind, PixelCircle,
    PrecisionTracker, PupilCircle, PupilFilter, TrackerConfig,
};

fn circle(x: f64, y: f64) -> Option<PupilCircle> {
    Some(PupilCircle::new(x, y, 20.0))
}

#[test]
fn effective_window_is_odd_and_positive() {
    for requested in -5..=20 {
        let filter = PupilFilter::with_kind(requested, FilterKind::Polynomial);
        let window = filter.window_size();
        assert!(window >= 1, "window {window} for request {requested}");
        assert_eq!(window % 2, 1, "window {window} for request {requested}");
    }
}

#[test]
fn histories_stay_bounded() {
    let _ = env_logger::builder().is_test(true).try_init();

    for window in [1, 3, 4, 7, 12] {
        let mut filter = PupilFilter::with_kind(window, FilterKind::Median);
        for i in 0..100 {
            let detected = i % 7 != 0;
            filter.process(i as f64 * 0.01, (i % 13) as f64, detected);
            assert!(filter.history_len() <= 2 * filter.window_size());
            assert_eq!(filter.history_len(), filter.timestamp_history_len());
        }
    }

    let mut tracker = PrecisionTracker::new(TrackerConfig {
        history_size: 4,
        ..Default::default()
    });
    for i in 0..50 {
        let detection = if i % 9 == 0 {
            None
        } else {
            circle(100.0 + i as f64, 100.0)
        };
        tracker.update(detection, i as f64 * 0.01);
        assert!(tracker.recent_positions().len() <= 4);
        assert!(tracker.recent_velocities().len() <= 4);
    }
}

#[test]
fn long_gap_freezes_at_last_valid_value() {
    let config = FilterConfig {
        window_size: 1,
        filter_kind: FilterKind::MovingAverage,
        max_interpolation_gap: 3,
    };
    let mut filter = PupilFilter::new(&config);
    filter.process(0.0, 10.0, true);
    filter.process(1.0, 12.0, true);

    let outputs: Vec<f64> = (2..10)
        .map(|t| filter.process(t as f64, 0.0, false))
        .collect();

    for value in &outputs[3..] {
        assert_relative_eq!(*value, 12.0);
    }
    assert_relative_eq!(filter.last_valid_value(), 12.0);
}

#[test]
fn single_spike_leaves_tracker_untouched() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut tracker = PrecisionTracker::default();
    for (i, x) in [100.0, 102.0, 104.0, 106.0].iter().enumerate() {
        tracker.update(circle(*x, 100.0), i as f64 * 0.1);
    }

    let last = tracker.last_position();
    let positions = tracker.recent_positions();
    let velocities = tracker.recent_velocities();

    let out = tracker.update(circle(200.0, 100.0), 0.4);

    assert_eq!(
        out,
        Some(PixelCircle {
            x: 106,
            y: 100,
            radius: 20
        })
    );
    assert_eq!(tracker.last_position(), last);
    assert_eq!(tracker.recent_positions(), positions);
    assert_eq!(tracker.recent_velocities(), velocities);
}

#[test]
fn fixation_converges_and_breaks() {
    let mut tracker = PrecisionTracker::default();
    tracker.update(circle(50.0, 50.0), 0.0);
    for i in 1..=10 {
        tracker.update(circle(50.0 + (i % 3) as f64, 50.0), i as f64 * 0.02);
    }
    assert!(tracker.is_stable());

    tracker.update(circle(58.0, 50.0), 0.3);
    assert!(!tracker.is_stable());
}

#[test]
fn blink_sequence_produces_one_closed_interval() {
    let mut blink = BlinkStateMachine::new(BlinkConfig::default());
    let detected = [true, true, false, false, false, true];

    for (t, flag) in detected.iter().enumerate() {
        blink.process(*flag, t as f64);
    }

    assert_eq!(blink.closed_intervals(), &[BlinkInterval::new(2.0, 5.0)]);
    assert!(blink.in_progress(5.0).is_none());
    assert!(!blink.is_blinking());
}

#[test]
fn double_reset_matches_fresh_instances() {
    let mut filter = PupilFilter::default();
    let mut tracker = PrecisionTracker::default();
    let mut blink = BlinkStateMachine::default();
    for i in 0..20 {
        let t = i as f64 * 0.05;
        filter.process(t, 30.0 + i as f64, i % 4 != 0);
        tracker.update(circle(30.0 + i as f64, 40.0), t);
        blink.process(i % 4 != 0, t);
    }

    filter.reset();
    filter.reset();
    tracker.reset();
    tracker.reset();
    blink.reset();
    blink.reset();

    let mut fresh_filter = PupilFilter::default();
    let mut fresh_tracker = PrecisionTracker::default();
    let mut fresh_blink = BlinkStateMachine::default();

    assert_eq!(filter.status(), fresh_filter.status());
    for i in 0..10 {
        let t = 2.0 + i as f64 * 0.05;
        let detected = i % 3 != 0;
        assert_eq!(
            filter.process(t, 5.0 * i as f64, detected),
            fresh_filter.process(t, 5.0 * i as f64, detected)
        );
        let detection = if detected { circle(70.0, 70.0) } else { None };
        assert_eq!(
            tracker.update(detection, t),
            fresh_tracker.update(detection, t)
        );
        assert_eq!(blink.process(detected, t), fresh_blink.process(detected, t));
    }
    assert_eq!(blink.closed_intervals(), fresh_blink.closed_intervals());
}

#[test]
fn moving_average_smooths_detected_spike() {
    let mut filter = PupilFilter::with_kind(3, FilterKind::MovingAverage);
    let mut out = 0.0;
    for (t, value) in [10.0, 12.0, 14.0, 100.0, 16.0].iter().enumerate() {
        out = filter.process(t as f64, *value, true);
    }
    assert_relative_eq!(out, 130.0 / 3.0, epsilon = 1e-9);
}

#[test]
fn dropouts_during_fixation_reset_tracker() {
    let mut tracker = PrecisionTracker::default();
    let mut t = 0.0;
    for _ in 0..12 {
        tracker.update(circle(60.0, 60.0), t);
        t += 0.02;
    }
    assert!(tracker.is_stable());

    // Alternate short dropouts with stabilized detections
    let mut reset_seen = false;
    for step in 0..12 {
        let detection = if step % 4 == 3 { circle(60.0, 60.0) } else { None };
        if tracker.update(detection, t).is_none() {
            reset_seen = true;
            break;
        }
        t += 0.02;
    }

    assert!(reset_seen);
    assert!(tracker.last_position().is_none());
    assert!(tracker.recent_positions().is_empty());
}
