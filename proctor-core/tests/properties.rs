//! Property tests for debouncing and scoring

use std::collections::HashMap;

use chrono::{Duration, TimeZone, Utc};
use proctor_core::{
    DebounceTracker, EngineConfig, Reading, ScoringPipeline, SessionRegistry, SessionState,
    SignalSample, Transition, ViolationKind,
};
use proptest::prelude::*;

fn reading() -> impl Strategy<Value = Reading> {
    prop_oneof![
        (0u32..3).prop_map(Reading::PersonCount),
        any::<bool>().prop_map(Reading::PhonePresent),
        any::<bool>().prop_map(Reading::BookPresent),
        (0u32..4).prop_map(Reading::FaceCount),
        (-90.0f64..90.0).prop_map(Reading::HeadPoseAngle),
        any::<bool>().prop_map(Reading::TabSwitch),
    ]
}

/// Runs of the same reading, so thresholds are actually reached
fn runs() -> impl Strategy<Value = Vec<Reading>> {
    prop::collection::vec((reading(), 1usize..40), 1..20).prop_map(|runs| {
        runs.into_iter()
            .flat_map(|(reading, n)| std::iter::repeat_n(reading, n))
            .collect()
    })
}

proptest! {
    #[test]
    fn tracker_activates_exactly_at_threshold(
        threshold in 1u32..40,
        samples in prop::collection::vec(any::<bool>(), 0..200),
    ) {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut tracker = DebounceTracker::new(threshold, true);
        let mut run = 0u32;
        let mut active = false;

        for (i, anomalous) in samples.into_iter().enumerate() {
            let transition = tracker.observe(anomalous, base + Duration::milliseconds(i as i64));
            if anomalous {
                run += 1;
                let expected = if !active && run == threshold {
                    active = true;
                    Transition::Activated
                } else {
                    Transition::NoChange
                };
                prop_assert_eq!(transition, expected);
            } else {
                run = 0;
                let expected = if active { Transition::Deactivated } else { Transition::NoChange };
                active = false;
                prop_assert_eq!(transition, expected);
                prop_assert_eq!(tracker.consecutive_count(), 0);
            }
            prop_assert!(tracker.consecutive_count() <= threshold);
            prop_assert_eq!(tracker.is_active(), active);
        }
    }

    #[test]
    fn score_is_monotonic_and_bounded(readings in runs()) {
        let pipeline = ScoringPipeline::new(EngineConfig::default());
        let mut state = SessionState::new("p");
        state.activate();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut previous = 0.0;

        for (i, reading) in readings.into_iter().enumerate() {
            let at = base + Duration::milliseconds(33 * i as i64);
            let sample = SignalSample::new("p", reading).at(at);
            state.observe(&sample, &pipeline);

            let score = state.risk().score();
            prop_assert!(score >= previous, "score fell from {} to {}", previous, score);
            prop_assert!((0.0..=100.0).contains(&score));
            previous = score;
        }
    }

    #[test]
    fn at_most_one_open_violation_per_kind(readings in runs()) {
        let pipeline = ScoringPipeline::new(EngineConfig::default());
        let mut state = SessionState::new("p");
        state.activate();

        for reading in readings {
            state.observe(&SignalSample::new("p", reading), &pipeline);

            let mut open: HashMap<ViolationKind, usize> = HashMap::new();
            for violation in state.risk().log().entries().iter().filter(|v| v.is_open()) {
                *open.entry(violation.kind).or_default() += 1;
            }
            prop_assert!(open.values().all(|&n| n == 1));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn registry_score_never_decreases(readings in runs()) {
        tokio_test::block_on(async {
            let registry = SessionRegistry::in_memory(EngineConfig::default());
            registry.start_session("p").await.unwrap();
            let mut previous = 0.0;

            for chunk in readings.chunks(16) {
                for reading in chunk {
                    registry.ingest(SignalSample::new("p", *reading)).await.unwrap();
                }
                let score = registry.flush("p").await.unwrap().risk_score;
                assert!(score >= previous);
                previous = score;
            }
        });
    }
}
