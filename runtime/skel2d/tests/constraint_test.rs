//! Constraint solver integration tests: IK reach boundaries, constraint
//! ordering, and timeline-driven constraint values.

use std::sync::Arc;

use skel2d::animation::{
    Animation, AnimationState, AnimationStateData, Curve, Frame1, IkFrame, Timeline,
};
use skel2d::constraint::{
    IkConstraintData, PathConstraintData, PositionMode, RotateMode, SpacingMode,
    TransformConstraintData,
};
use skel2d::skeleton::{BoneData, Skeleton, SkeletonData, SkeletonDataBuilder, Skin, SlotData};

const EPS: f32 = 0.01;

/// root -> upper(1.0) -> lower(1.0) with a target bone at (tx, ty)
fn ik_rig(tx: f32, ty: f32, extra: impl FnOnce(&mut IkConstraintData)) -> Arc<SkeletonData> {
    let mut upper = BoneData::new(1, "upper", Some(0));
    upper.length = 1.0;
    let mut lower = BoneData::new(2, "lower", Some(1));
    lower.length = 1.0;
    lower.x = 1.0;
    let mut target = BoneData::new(3, "target", Some(0));
    target.x = tx;
    target.y = ty;
    let mut ik = IkConstraintData::new("reach", vec![1, 2], 3);
    extra(&mut ik);
    SkeletonDataBuilder::new("rig")
        .bone(BoneData::new(0, "root", None))
        .bone(upper)
        .bone(lower)
        .bone(target)
        .ik_constraint(ik)
        .build()
        .unwrap()
}

fn chain_tip(skeleton: &Skeleton) -> (f32, f32) {
    let lower = &skeleton.bones[2];
    (
        lower.world_x + lower.a * lower.data.length,
        lower.world_y + lower.c * lower.data.length,
    )
}

#[test]
fn ik_reaches_target_inside_range() {
    let mut skeleton = Skeleton::new(ik_rig(1.2, 0.8, |_| {}));
    skeleton.update_world_transform();
    let (tip_x, tip_y) = chain_tip(&skeleton);
    assert!((tip_x - 1.2).abs() < EPS);
    assert!((tip_y - 0.8).abs() < EPS);
}

#[test]
fn ik_at_exact_reach_fully_extends() {
    let mut skeleton = Skeleton::new(ik_rig(2.0, 0.0, |_| {}));
    skeleton.update_world_transform();
    // Elbow angle zero.
    assert!(skeleton.bones[2].arotation.abs() < 0.1);
    let (tip_x, tip_y) = chain_tip(&skeleton);
    assert!((tip_x - 2.0).abs() < EPS);
    assert!(tip_y.abs() < EPS);
}

#[test]
fn ik_unreachable_extends_without_overshoot_or_stretch() {
    let mut skeleton = Skeleton::new(ik_rig(10.0, 0.0, |_| {}));
    skeleton.update_world_transform();
    // Bone lengths (scales) unchanged, chain points at the target.
    assert!((skeleton.bones[1].ascale_x - 1.0).abs() < EPS);
    assert!((skeleton.bones[2].ascale_x - 1.0).abs() < EPS);
    let (tip_x, tip_y) = chain_tip(&skeleton);
    assert!((tip_x - 2.0).abs() < EPS);
    assert!(tip_y.abs() < EPS);
}

#[test]
fn ik_softness_engages_near_full_extension() {
    // A hard solve at 1.9 of 2.0 reach keeps the tip on the target; with
    // softness the chain eases short of it.
    let mut hard = Skeleton::new(ik_rig(1.9, 0.0, |_| {}));
    hard.update_world_transform();
    let (hard_tip, _) = chain_tip(&hard);
    assert!((hard_tip - 1.9).abs() < EPS);

    let mut soft = Skeleton::new(ik_rig(1.9, 0.0, |ik| ik.softness = 0.5));
    soft.update_world_transform();
    let (soft_tip, _) = chain_tip(&soft);
    assert!(soft_tip < hard_tip - 0.005);
}

#[test]
fn constraint_order_lets_transform_read_ik_output() {
    // IK aims "arm"; a transform constraint ordered after it copies the
    // arm's world rotation onto "mirror".
    let mut arm = BoneData::new(1, "arm", Some(0));
    arm.length = 1.0;
    let mut target = BoneData::new(2, "target", Some(0));
    target.x = 0.0;
    target.y = 2.0;
    let mirror = BoneData::new(3, "mirror", Some(0));
    let mut ik = IkConstraintData::new("aim", vec![1], 2);
    ik.order = 0;
    let mut copy = TransformConstraintData::new("copy", vec![3], 1);
    copy.order = 1;
    copy.mix_x = 0.0;
    copy.mix_y = 0.0;
    copy.mix_scale_x = 0.0;
    copy.mix_scale_y = 0.0;
    copy.mix_shear_y = 0.0;
    let data = SkeletonDataBuilder::new("rig")
        .bone(BoneData::new(0, "root", None))
        .bone(arm)
        .bone(target)
        .bone(mirror)
        .ik_constraint(ik)
        .transform_constraint(copy)
        .build()
        .unwrap();
    let mut skeleton = Skeleton::new(data);
    skeleton.update_world_transform();
    assert!((skeleton.bones[1].world_rotation_x() - 90.0).abs() < 0.1);
    assert!((skeleton.bones[3].world_rotation_x() - 90.0).abs() < 0.1);
}

#[test]
fn ik_timeline_drives_mix() {
    let mut arm = BoneData::new(1, "arm", Some(0));
    arm.length = 1.0;
    let mut target = BoneData::new(2, "target", Some(0));
    target.y = 2.0;
    let mut ik = IkConstraintData::new("aim", vec![1], 2);
    ik.mix = 1.0;
    let animation = Animation::new(
        "fade-ik",
        vec![Timeline::IkConstraint {
            constraint: 0,
            frames: vec![
                IkFrame {
                    time: 0.0,
                    mix: 1.0,
                    softness: 0.0,
                    bend_direction: 1,
                    compress: false,
                    stretch: false,
                    curve: Curve::Linear,
                },
                IkFrame {
                    time: 1.0,
                    mix: 0.0,
                    softness: 0.0,
                    bend_direction: 1,
                    compress: false,
                    stretch: false,
                    curve: Curve::Linear,
                },
            ],
        }],
        1.0,
    );
    let data = SkeletonDataBuilder::new("rig")
        .bone(BoneData::new(0, "root", None))
        .bone(arm)
        .bone(target)
        .ik_constraint(ik)
        .animation(animation)
        .build()
        .unwrap();
    let mut skeleton = Skeleton::new(data.clone());
    let mut state = AnimationState::new(Arc::new(AnimationStateData::new(data)));
    state.set_animation(0, "fade-ik", false).unwrap();

    // Halfway through, the IK mix is 0.5: the arm aims halfway to 90.
    state.update(0.5);
    state.apply(&mut skeleton);
    skeleton.update_world_transform();
    assert!((skeleton.ik_constraints[0].mix - 0.5).abs() < EPS);
    assert!((skeleton.bones[1].world_rotation_x() - 45.0).abs() < 0.1);
}

#[test]
fn path_position_timeline_moves_chain() {
    use skel2d::attachment::{Attachment, PathAttachment, VertexSource};

    let vertices = vec![
        -1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 3.0, 0.0, 4.0, 0.0,
    ];
    let path = Attachment::Path(Arc::new(PathAttachment {
        name: "rail".into(),
        vertices: VertexSource::unweighted(vertices),
        lengths: vec![3.0],
        closed: false,
        constant_speed: true,
    }));

    let mut rider = BoneData::new(1, "rider", Some(0));
    rider.length = 1.0;
    let mut slot = SlotData::new(0, "rail-slot", 0);
    slot.attachment_name = Some("rail".into());
    let mut skin = Skin::new("default");
    skin.set_attachment(0, "rail", path);
    let mut constraint = PathConstraintData::new("ride", vec![1], 0);
    constraint.position_mode = PositionMode::Fixed;
    constraint.spacing_mode = SpacingMode::Fixed;
    constraint.rotate_mode = RotateMode::Tangent;
    let animation = Animation::new(
        "slide",
        vec![Timeline::PathPosition {
            constraint: 0,
            frames: vec![
                Frame1 {
                    time: 0.0,
                    value: 0.0,
                    curve: Curve::Linear,
                },
                Frame1 {
                    time: 1.0,
                    value: 3.0,
                    curve: Curve::Linear,
                },
            ],
        }],
        1.0,
    );
    let data = SkeletonDataBuilder::new("rig")
        .bone(BoneData::new(0, "root", None))
        .bone(rider)
        .slot(slot)
        .skin(skin)
        .path_constraint(constraint)
        .animation(animation)
        .build()
        .unwrap();
    let mut skeleton = Skeleton::new(data.clone());
    let mut state = AnimationState::new(Arc::new(AnimationStateData::new(data)));
    state.set_animation(0, "slide", false).unwrap();

    state.update(0.5);
    state.apply(&mut skeleton);
    skeleton.update_world_transform();
    assert!((skeleton.bones[1].world_x - 1.5).abs() < 0.02);

    state.update(0.5);
    state.apply(&mut skeleton);
    skeleton.update_world_transform();
    assert!((skeleton.bones[1].world_x - 3.0).abs() < 0.02);
}

#[test]
fn transform_constraint_mix_timeline() {
    use skel2d::animation::TransformFrame;

    let driven = BoneData::new(1, "driven", Some(0));
    let mut target = BoneData::new(2, "target", Some(0));
    target.x = 4.0;
    let mut constraint = TransformConstraintData::new("follow", vec![1], 2);
    constraint.mix_rotate = 0.0;
    constraint.mix_scale_x = 0.0;
    constraint.mix_scale_y = 0.0;
    constraint.mix_shear_y = 0.0;
    let animation = Animation::new(
        "engage",
        vec![Timeline::TransformConstraint {
            constraint: 0,
            frames: vec![
                TransformFrame {
                    time: 0.0,
                    mix_rotate: 0.0,
                    mix_x: 0.0,
                    mix_y: 0.0,
                    mix_scale_x: 0.0,
                    mix_scale_y: 0.0,
                    mix_shear_y: 0.0,
                    curve: Curve::Linear,
                },
                TransformFrame {
                    time: 1.0,
                    mix_rotate: 0.0,
                    mix_x: 1.0,
                    mix_y: 1.0,
                    mix_scale_x: 0.0,
                    mix_scale_y: 0.0,
                    mix_shear_y: 0.0,
                    curve: Curve::Linear,
                },
            ],
        }],
        1.0,
    );
    let data = SkeletonDataBuilder::new("rig")
        .bone(BoneData::new(0, "root", None))
        .bone(driven)
        .bone(target)
        .transform_constraint(constraint)
        .animation(animation)
        .build()
        .unwrap();
    let mut skeleton = Skeleton::new(data.clone());
    let mut state = AnimationState::new(Arc::new(AnimationStateData::new(data)));
    state.set_animation(0, "engage", false).unwrap();

    state.update(0.5);
    state.apply(&mut skeleton);
    skeleton.update_world_transform();
    // Half translation mix: halfway to the target.
    assert!((skeleton.bones[1].world_x - 2.0).abs() < EPS);
}

#[test]
fn inactive_constraint_is_skipped() {
    let mut skeleton = Skeleton::new(ik_rig(0.0, 2.0, |ik| ik.skin_required = true));
    // No skin carries the constraint, so it is inactive and the chain
    // keeps its setup pose.
    skeleton.update_world_transform();
    assert!(!skeleton.ik_constraints[0].is_active());
    assert!(skeleton.bones[1].arotation.abs() < EPS);
}
