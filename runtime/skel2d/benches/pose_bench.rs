use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use skel2d::animation::{
    Animation, AnimationState, AnimationStateData, Curve, Frame1, Frame2, Timeline,
};
use skel2d::constraint::IkConstraintData;
use skel2d::skeleton::{BoneData, Skeleton, SkeletonData, SkeletonDataBuilder};

const BONES: usize = 32;

fn build_rig() -> Arc<SkeletonData> {
    let mut builder = SkeletonDataBuilder::new("bench");
    for i in 0..BONES {
        let mut bone = BoneData::new(i, format!("bone{i}"), if i == 0 { None } else { Some(i - 1) });
        bone.x = if i == 0 { 0.0 } else { 1.0 };
        bone.length = 1.0;
        builder = builder.bone(bone);
    }

    // One rotate and one translate timeline per bone.
    let mut timelines = Vec::new();
    for i in 1..BONES {
        timelines.push(Timeline::Rotate {
            bone: i,
            frames: vec![
                Frame1 {
                    time: 0.0,
                    value: 0.0,
                    curve: Curve::Linear,
                },
                Frame1 {
                    time: 1.0,
                    value: 25.0,
                    curve: Curve::bezier(0.25, 0.0, 0.75, 1.0),
                },
                Frame1 {
                    time: 2.0,
                    value: 0.0,
                    curve: Curve::Linear,
                },
            ],
        });
        timelines.push(Timeline::Translate {
            bone: i,
            frames: vec![
                Frame2 {
                    time: 0.0,
                    value1: 0.0,
                    value2: 0.0,
                    curve: Curve::Linear,
                },
                Frame2 {
                    time: 2.0,
                    value1: 0.5,
                    value2: -0.25,
                    curve: Curve::Linear,
                },
            ],
        });
    }
    builder = builder.animation(Animation::new("sway", timelines, 2.0));

    let mut ik = IkConstraintData::new("reach", vec![BONES - 3, BONES - 2], BONES - 1);
    ik.order = 0;
    builder.ik_constraint(ik).build().unwrap()
}

fn bench_pose_pipeline(c: &mut Criterion) {
    let data = build_rig();

    c.bench_function("update_world_transform", |b| {
        let mut skeleton = Skeleton::new(data.clone());
        b.iter(|| {
            skeleton.update_world_transform();
            std::hint::black_box(skeleton.bones[BONES - 1].world_x);
        });
    });

    c.bench_function("full_frame", |b| {
        let mut skeleton = Skeleton::new(data.clone());
        let mut state = AnimationState::new(Arc::new(AnimationStateData::new(data.clone())));
        state.set_animation(0, "sway", true);
        b.iter(|| {
            state.update(1.0 / 60.0);
            state.apply(&mut skeleton);
            skeleton.update_world_transform();
            state.drain_events().clear();
            std::hint::black_box(skeleton.bones[BONES - 1].world_x);
        });
    });

    c.bench_function("crossfade_frame", |b| {
        let mut skeleton = Skeleton::new(data.clone());
        let mut state = AnimationState::new(Arc::new(AnimationStateData::new(data.clone())));
        state.set_animation(0, "sway", true);
        state.update(0.5);
        state.apply(&mut skeleton);
        let entry = state.set_animation(0, "sway", true).expect("animation exists");
        if let Some(e) = state.entry_mut(entry) {
            e.mix_duration = 10_000.0; // keep the mix alive for the run
        }
        b.iter(|| {
            state.update(1.0 / 60.0);
            state.apply(&mut skeleton);
            skeleton.update_world_transform();
            state.drain_events().clear();
            std::hint::black_box(skeleton.bones[BONES - 1].world_x);
        });
    });
}

criterion_group!(benches, bench_pose_pipeline);
criterion_main!(benches);
