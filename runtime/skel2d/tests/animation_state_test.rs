//! Animation state engine integration tests: track lifecycle, crossfades,
//! queuing, looping, and event delivery.

use std::sync::Arc;

use skel2d::animation::{
    Animation, AnimationState, AnimationStateData, Curve, DrawOrderFrame, Event, EventData,
    EventType, Frame1, Timeline,
};
use skel2d::skeleton::{BoneData, Skeleton, SkeletonData, SkeletonDataBuilder, SlotData};

const EPS: f32 = 0.01;

/// A rotate timeline holding a constant value over the duration
fn constant_rotation(name: &str, degrees: f32, duration: f32) -> Animation {
    Animation::new(
        name,
        vec![Timeline::Rotate {
            bone: 1,
            frames: vec![
                Frame1 {
                    time: 0.0,
                    value: degrees,
                    curve: Curve::Linear,
                },
                Frame1 {
                    time: duration,
                    value: degrees,
                    curve: Curve::Linear,
                },
            ],
        }],
        duration,
    )
}

fn ramp_rotation(name: &str, degrees: f32, duration: f32) -> Animation {
    Animation::new(
        name,
        vec![Timeline::Rotate {
            bone: 1,
            frames: vec![
                Frame1 {
                    time: 0.0,
                    value: 0.0,
                    curve: Curve::Linear,
                },
                Frame1 {
                    time: duration,
                    value: degrees,
                    curve: Curve::Linear,
                },
            ],
        }],
        duration,
    )
}

fn build(animations: Vec<Animation>) -> (AnimationState, Skeleton) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut builder = SkeletonDataBuilder::new("rig")
        .bone(BoneData::new(0, "root", None))
        .bone(BoneData::new(1, "bone", Some(0)))
        .slot(SlotData::new(0, "slot-a", 0))
        .slot(SlotData::new(1, "slot-b", 0));
    for animation in animations {
        builder = builder.animation(animation);
    }
    let data: Arc<SkeletonData> = builder.build().unwrap();
    let mut state_data = AnimationStateData::new(data.clone());
    state_data.default_mix = 0.2;
    (
        AnimationState::new(Arc::new(state_data)),
        Skeleton::new(data),
    )
}

#[test]
fn terminal_pose_of_non_looping_animation_is_idempotent() {
    let (mut state, mut skeleton) = build(vec![ramp_rotation("jump", 90.0, 1.0)]);
    state.set_animation(0, "jump", false).unwrap();
    state.update(1.0);
    state.apply(&mut skeleton);
    let first = skeleton.bones[1].rotation;

    // Re-applying at track time == duration yields the same pose, and
    // track time past the duration clamps to the last keyframe.
    state.update(0.0);
    state.apply(&mut skeleton);
    assert!((skeleton.bones[1].rotation - first).abs() < EPS);
    state.update(5.0);
    state.apply(&mut skeleton);
    assert!((skeleton.bones[1].rotation - 90.0).abs() < EPS);
}

#[test]
fn looping_track_time_congruent_modulo_duration() {
    let (mut state, mut skeleton) = build(vec![ramp_rotation("walk", 90.0, 1.0)]);
    let entry = state.set_animation(0, "walk", true).unwrap();

    let cycles = 7;
    for _ in 0..cycles {
        state.update(1.0);
        state.apply(&mut skeleton);
    }
    let entry = state.entry(entry).unwrap();
    assert!((entry.track_time - cycles as f32).abs() < EPS);
    let congruent = entry.animation_time() % 1.0;
    assert!(congruent < EPS || (1.0 - congruent) < EPS);
}

#[test]
fn crossfade_weights_are_linear() {
    // idle holds 40 degrees, jump holds 80. At the midpoint of a 0.2s mix
    // both contribute half: 60 degrees.
    let (mut state, mut skeleton) = build(vec![
        constant_rotation("idle", 40.0, 1.0),
        constant_rotation("jump", 80.0, 1.0),
    ]);
    state.set_animation(0, "idle", true).unwrap();
    state.update(0.5);
    state.apply(&mut skeleton);
    assert!((skeleton.bones[1].rotation - 40.0).abs() < EPS);

    let jump = state.set_animation(0, "jump", false).unwrap();
    state.update(0.1);
    state.apply(&mut skeleton);

    let entry = state.entry(jump).unwrap();
    assert!((entry.mix_time / entry.mix_duration - 0.5).abs() < EPS);
    assert!(entry.mixing_from().is_some());
    assert!((skeleton.bones[1].rotation - 60.0).abs() < 0.5);
}

#[test]
fn superseded_entry_removed_after_mix_duration() {
    let (mut state, mut skeleton) = build(vec![
        constant_rotation("idle", 40.0, 1.0),
        constant_rotation("jump", 80.0, 1.0),
    ]);
    state.set_animation(0, "idle", true).unwrap();
    state.update(0.1);
    state.apply(&mut skeleton);

    let jump = state.set_animation(0, "jump", true).unwrap();
    let idle_entry = state.entry(jump).unwrap().mixing_from().unwrap();

    for _ in 0..5 {
        state.update(0.1);
        state.apply(&mut skeleton);
    }
    assert!(state.entry(jump).unwrap().mixing_from().is_none());
    assert!(state.entry(idle_entry).is_none());
    assert!((skeleton.bones[1].rotation - 80.0).abs() < EPS);

    let events = state.drain_events();
    assert!(events.iter().any(|e| e.event_type == EventType::Interrupt));
    assert!(
        events.iter().any(|e| e.event_type == EventType::Dispose
            && e.animation.as_ref() == "idle")
    );
}

#[test]
fn interrupted_crossfade_blends_three_deep() {
    let (mut state, mut skeleton) = build(vec![
        constant_rotation("a", 0.0, 1.0),
        constant_rotation("b", 40.0, 1.0),
        constant_rotation("c", 80.0, 1.0),
    ]);
    state.set_animation(0, "a", true).unwrap();
    state.update(0.1);
    state.apply(&mut skeleton);

    state.set_animation(0, "b", true).unwrap();
    state.update(0.1);
    state.apply(&mut skeleton);

    // Interrupt the a->b mix midway; the chain is now c <- b <- a.
    let c = state.set_animation(0, "c", true).unwrap();
    state.update(0.05);
    state.apply(&mut skeleton);

    let c_entry = state.entry(c).unwrap();
    let b_handle = c_entry.mixing_from().unwrap();
    assert!(state.entry(b_handle).unwrap().mixing_from().is_some());

    // The pose sits between b's and c's values, well above a's.
    let rotation = skeleton.bones[1].rotation;
    assert!(rotation > 20.0 && rotation < 80.0);
}

#[test]
fn queued_animation_plays_after_delay() {
    let (mut state, mut skeleton) = build(vec![
        ramp_rotation("walk", 90.0, 1.0),
        constant_rotation("idle", 10.0, 1.0),
    ]);
    state.set_animation(0, "walk", false).unwrap();
    let queued = state.add_animation(0, "idle", true, 0.0).unwrap();
    // Default delay: predecessor duration minus the 0.2s default mix.
    assert!((state.entry(queued).unwrap().delay - 0.8).abs() < EPS);

    for _ in 0..12 {
        state.update(0.1);
        state.apply(&mut skeleton);
    }
    let current = state.get_current(0).unwrap();
    assert_eq!(
        state.entry(current).unwrap().animation().name.as_ref(),
        "idle"
    );
}

#[test]
fn custom_events_fire_in_time_order() {
    let mut event_frames = Vec::new();
    for &time in &[0.2_f32, 0.5, 0.8] {
        event_frames.push(Arc::new(Event::new(
            time,
            Arc::new(EventData::new(format!("e{time}"))),
        )));
    }
    let animation = Animation::new(
        "evented",
        vec![Timeline::Event {
            frames: event_frames,
        }],
        1.0,
    );
    let (mut state, mut skeleton) = build(vec![animation]);
    state.set_animation(0, "evented", false).unwrap();
    state.update(0.0);
    state.apply(&mut skeleton);
    state.drain_events();

    state.update(0.9);
    state.apply(&mut skeleton);
    let events: Vec<_> = state
        .drain_events()
        .into_iter()
        .filter(|e| e.event_type == EventType::Event)
        .collect();
    assert_eq!(events.len(), 3);
    let times: Vec<f32> = events
        .iter()
        .map(|e| e.event.as_ref().unwrap().time)
        .collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn events_do_not_refire_within_a_loop() {
    let animation = Animation::new(
        "step",
        vec![Timeline::Event {
            frames: vec![Arc::new(Event::new(
                0.5,
                Arc::new(EventData::new("footstep")),
            ))],
        }],
        1.0,
    );
    let (mut state, mut skeleton) = build(vec![animation]);
    state.set_animation(0, "step", true).unwrap();

    let mut fired = 0;
    for _ in 0..20 {
        state.update(0.1);
        state.apply(&mut skeleton);
        fired += state
            .drain_events()
            .iter()
            .filter(|e| e.event_type == EventType::Event)
            .count();
    }
    // Two loop iterations worth of footsteps over 2.0 seconds.
    assert_eq!(fired, 2);
}

#[test]
fn complete_fires_once_per_loop_iteration() {
    let (mut state, mut skeleton) = build(vec![ramp_rotation("walk", 90.0, 1.0)]);
    state.set_animation(0, "walk", true).unwrap();

    let mut completes = 0;
    for _ in 0..25 {
        state.update(0.1);
        state.apply(&mut skeleton);
        completes += state
            .drain_events()
            .iter()
            .filter(|e| e.event_type == EventType::Complete)
            .count();
    }
    assert_eq!(completes, 2);
}

#[test]
fn empty_animation_fades_all_tracks_to_setup() {
    let (mut state, mut skeleton) = build(vec![
        constant_rotation("idle", 40.0, 1.0),
        constant_rotation("wave", 20.0, 1.0),
    ]);
    state.set_animation(0, "idle", true).unwrap();
    state.set_animation(1, "wave", true).unwrap();
    state.update(0.3);
    state.apply(&mut skeleton);
    // Track 1 replaces track 0's pose for the shared bone.
    assert!((skeleton.bones[1].rotation - 20.0).abs() < EPS);

    state.set_empty_animations(0.2);
    for _ in 0..6 {
        state.update(0.1);
        state.apply(&mut skeleton);
    }
    assert!(skeleton.bones[1].rotation.abs() < EPS);
    assert!(state.get_current(0).is_none());
    assert!(state.get_current(1).is_none());
}

#[test]
fn draw_order_timeline_permutes_and_restores() {
    let animation = Animation::new(
        "reorder",
        vec![Timeline::DrawOrder {
            frames: vec![
                DrawOrderFrame {
                    time: 0.0,
                    order: Some(vec![1, 0]),
                },
                DrawOrderFrame {
                    time: 0.5,
                    order: None,
                },
            ],
        }],
        1.0,
    );
    let (mut state, mut skeleton) = build(vec![animation]);
    state.set_animation(0, "reorder", false).unwrap();
    state.update(0.1);
    state.apply(&mut skeleton);
    assert_eq!(skeleton.draw_order, vec![1, 0]);

    state.update(0.5);
    state.apply(&mut skeleton);
    assert_eq!(skeleton.draw_order, vec![0, 1]);
}

#[test]
fn track_time_scale_slows_playback() {
    let (mut state, mut skeleton) = build(vec![ramp_rotation("walk", 90.0, 1.0)]);
    let entry = state.set_animation(0, "walk", false).unwrap();
    state.entry_mut(entry).unwrap().time_scale = 0.5;
    state.update(1.0);
    state.apply(&mut skeleton);
    assert!((skeleton.bones[1].rotation - 45.0).abs() < EPS);
}

#[test]
fn state_time_scale_applies_to_all_tracks() {
    let (mut state, mut skeleton) = build(vec![ramp_rotation("walk", 90.0, 1.0)]);
    state.set_animation(0, "walk", false).unwrap();
    state.time_scale = 0.25;
    state.update(2.0);
    state.apply(&mut skeleton);
    assert!((skeleton.bones[1].rotation - 45.0).abs() < EPS);
}

#[test]
fn hold_previous_keeps_from_entry_at_full_weight() {
    let (mut state, mut skeleton) = build(vec![
        constant_rotation("idle", 40.0, 1.0),
        ramp_rotation("other", 0.0, 1.0),
    ]);
    state.set_animation(0, "idle", true).unwrap();
    state.update(0.1);
    state.apply(&mut skeleton);

    let other = state.set_animation(0, "other", true).unwrap();
    state.entry_mut(other).unwrap().hold_previous = true;
    state.update(0.1);
    state.apply(&mut skeleton);

    // Mid-mix, idle is held at full weight underneath; the incoming
    // animation (value 0) pulls the pose halfway down from 40.
    let rotation = skeleton.bones[1].rotation;
    assert!(rotation > 15.0 && rotation < 40.0 + EPS);
}
