//! Transform constraint: copies rotation, translation, scale, and shear
//! from a target bone to a list of driven bones
//!
//! Each component has its own mix ratio, and the copy can be absolute or
//! relative, in world or local space, giving four composition paths. World
//! paths rewrite bone world transforms directly and re-derive the applied
//! pose; local paths recompose the world transform from modified local
//! values.

use std::sync::Arc;

use glam::Vec2;

use crate::math::wrap_rad;
use crate::skeleton::Skeleton;

/// Immutable configuration of a transform constraint
#[derive(Debug, Clone)]
pub struct TransformConstraintData {
    pub name: Arc<str>,
    /// Position in the skeleton's global constraint application order
    pub order: usize,
    pub skin_required: bool,
    /// Driven bone indices
    pub bones: Vec<usize>,
    /// Target bone index
    pub target: usize,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub offset_rotation: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub offset_scale_x: f32,
    pub offset_scale_y: f32,
    pub offset_shear_y: f32,
    /// Copy as an offset from the driven bone's pose instead of replacing it
    pub relative: bool,
    /// Copy local pose values instead of world transforms
    pub local: bool,
}

impl TransformConstraintData {
    pub fn new(name: impl Into<Arc<str>>, bones: Vec<usize>, target: usize) -> Self {
        Self {
            name: name.into(),
            order: 0,
            skin_required: false,
            bones,
            target,
            mix_rotate: 1.0,
            mix_x: 1.0,
            mix_y: 1.0,
            mix_scale_x: 1.0,
            mix_scale_y: 1.0,
            mix_shear_y: 1.0,
            offset_rotation: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
            offset_scale_x: 0.0,
            offset_scale_y: 0.0,
            offset_shear_y: 0.0,
            relative: false,
            local: false,
        }
    }
}

/// A live transform constraint with animatable mixes
#[derive(Debug, Clone)]
pub struct TransformConstraint {
    pub data: Arc<TransformConstraintData>,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub active: bool,
}

impl TransformConstraint {
    pub fn new(data: Arc<TransformConstraintData>) -> Self {
        Self {
            mix_rotate: data.mix_rotate,
            mix_x: data.mix_x,
            mix_y: data.mix_y,
            mix_scale_x: data.mix_scale_x,
            mix_scale_y: data.mix_scale_y,
            mix_shear_y: data.mix_shear_y,
            active: true,
            data,
        }
    }

    /// Reset animatable mixes to the configured setup values
    pub fn set_to_setup_pose(&mut self) {
        self.mix_rotate = self.data.mix_rotate;
        self.mix_x = self.data.mix_x;
        self.mix_y = self.data.mix_y;
        self.mix_scale_x = self.data.mix_scale_x;
        self.mix_scale_y = self.data.mix_scale_y;
        self.mix_shear_y = self.data.mix_shear_y;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Apply the constraint at `index` to the skeleton's current pose
pub(crate) fn apply(skeleton: &mut Skeleton, index: usize) {
    let constraint = &skeleton.transform_constraints[index];
    let mix_rotate = constraint.mix_rotate;
    let mix_x = constraint.mix_x;
    let mix_y = constraint.mix_y;
    let mix_scale_x = constraint.mix_scale_x;
    let mix_scale_y = constraint.mix_scale_y;
    let mix_shear_y = constraint.mix_shear_y;
    if mix_rotate == 0.0
        && mix_x == 0.0
        && mix_y == 0.0
        && mix_scale_x == 0.0
        && mix_scale_y == 0.0
        && mix_shear_y == 0.0
    {
        return;
    }
    let data = constraint.data.clone();

    match (data.local, data.relative) {
        (false, false) => apply_absolute_world(skeleton, &data, mix_rotate, mix_x, mix_y, mix_scale_x, mix_scale_y, mix_shear_y),
        (false, true) => apply_relative_world(skeleton, &data, mix_rotate, mix_x, mix_y, mix_scale_x, mix_scale_y, mix_shear_y),
        (true, false) => apply_absolute_local(skeleton, &data, mix_rotate, mix_x, mix_y, mix_scale_x, mix_scale_y, mix_shear_y),
        (true, true) => apply_relative_local(skeleton, &data, mix_rotate, mix_x, mix_y, mix_scale_x, mix_scale_y, mix_shear_y),
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_absolute_world(
    skeleton: &mut Skeleton,
    data: &TransformConstraintData,
    mix_rotate: f32,
    mix_x: f32,
    mix_y: f32,
    mix_scale_x: f32,
    mix_scale_y: f32,
    mix_shear_y: f32,
) {
    use std::f32::consts::PI;

    let target = &skeleton.bones[data.target];
    let (ta, tb, tc, td) = (target.a, target.b, target.c, target.d);
    let deg_rad_reflect = if ta * td - tb * tc > 0.0 {
        crate::math::DEG_RAD
    } else {
        -crate::math::DEG_RAD
    };
    let offset_rotation = data.offset_rotation * deg_rad_reflect;
    let offset_shear_y = data.offset_shear_y * deg_rad_reflect;
    let target_offset = target.local_to_world(Vec2::new(data.offset_x, data.offset_y));
    let translate = mix_x != 0.0 || mix_y != 0.0;

    for &bone_index in &data.bones {
        let bone = &mut skeleton.bones[bone_index];

        if mix_rotate != 0.0 {
            let (a, b, c, d) = (bone.a, bone.b, bone.c, bone.d);
            let mut r = tc.atan2(ta) - c.atan2(a) + offset_rotation;
            if r > PI {
                r -= PI * 2.0;
            } else if r < -PI {
                r += PI * 2.0;
            }
            r *= mix_rotate;
            let (cos, sin) = (r.cos(), r.sin());
            bone.a = cos * a - sin * c;
            bone.b = cos * b - sin * d;
            bone.c = sin * a + cos * c;
            bone.d = sin * b + cos * d;
        }

        if translate {
            bone.world_x += (target_offset.x - bone.world_x) * mix_x;
            bone.world_y += (target_offset.y - bone.world_y) * mix_y;
        }

        if mix_scale_x != 0.0 {
            let mut s = (bone.a * bone.a + bone.c * bone.c).sqrt();
            if s != 0.0 {
                s = (s + ((ta * ta + tc * tc).sqrt() - s + data.offset_scale_x) * mix_scale_x) / s;
            }
            bone.a *= s;
            bone.c *= s;
        }
        if mix_scale_y != 0.0 {
            let mut s = (bone.b * bone.b + bone.d * bone.d).sqrt();
            if s != 0.0 {
                s = (s + ((tb * tb + td * td).sqrt() - s + data.offset_scale_y) * mix_scale_y) / s;
            }
            bone.b *= s;
            bone.d *= s;
        }

        if mix_shear_y > 0.0 {
            let (b, d) = (bone.b, bone.d);
            let by = d.atan2(b);
            let mut r = td.atan2(tb) - tc.atan2(ta) - (by - bone.c.atan2(bone.a));
            if r > PI {
                r -= PI * 2.0;
            } else if r < -PI {
                r += PI * 2.0;
            }
            let r = by + (r + offset_shear_y) * mix_shear_y;
            let s = (b * b + d * d).sqrt();
            bone.b = r.cos() * s;
            bone.d = r.sin() * s;
        }

        skeleton.update_applied(bone_index);
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_relative_world(
    skeleton: &mut Skeleton,
    data: &TransformConstraintData,
    mix_rotate: f32,
    mix_x: f32,
    mix_y: f32,
    mix_scale_x: f32,
    mix_scale_y: f32,
    mix_shear_y: f32,
) {
    use std::f32::consts::PI;

    let target = &skeleton.bones[data.target];
    let (ta, tb, tc, td) = (target.a, target.b, target.c, target.d);
    let deg_rad_reflect = if ta * td - tb * tc > 0.0 {
        crate::math::DEG_RAD
    } else {
        -crate::math::DEG_RAD
    };
    let offset_rotation = data.offset_rotation * deg_rad_reflect;
    let offset_shear_y = data.offset_shear_y * deg_rad_reflect;
    let target_offset = target.local_to_world(Vec2::new(data.offset_x, data.offset_y));
    let translate = mix_x != 0.0 || mix_y != 0.0;

    for &bone_index in &data.bones {
        let bone = &mut skeleton.bones[bone_index];

        if mix_rotate != 0.0 {
            let (a, b, c, d) = (bone.a, bone.b, bone.c, bone.d);
            let r = wrap_rad(tc.atan2(ta) + offset_rotation) * mix_rotate;
            let (cos, sin) = (r.cos(), r.sin());
            bone.a = cos * a - sin * c;
            bone.b = cos * b - sin * d;
            bone.c = sin * a + cos * c;
            bone.d = sin * b + cos * d;
        }

        if translate {
            bone.world_x += target_offset.x * mix_x;
            bone.world_y += target_offset.y * mix_y;
        }

        if mix_scale_x != 0.0 {
            let s = ((ta * ta + tc * tc).sqrt() - 1.0 + data.offset_scale_x) * mix_scale_x + 1.0;
            bone.a *= s;
            bone.c *= s;
        }
        if mix_scale_y != 0.0 {
            let s = ((tb * tb + td * td).sqrt() - 1.0 + data.offset_scale_y) * mix_scale_y + 1.0;
            bone.b *= s;
            bone.d *= s;
        }

        if mix_shear_y > 0.0 {
            let r = wrap_rad(td.atan2(tb) - tc.atan2(ta));
            let (b, d) = (bone.b, bone.d);
            let r = d.atan2(b) + (r - PI / 2.0 + offset_shear_y) * mix_shear_y;
            let s = (b * b + d * d).sqrt();
            bone.b = r.cos() * s;
            bone.d = r.sin() * s;
        }

        skeleton.update_applied(bone_index);
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_absolute_local(
    skeleton: &mut Skeleton,
    data: &TransformConstraintData,
    mix_rotate: f32,
    mix_x: f32,
    mix_y: f32,
    mix_scale_x: f32,
    mix_scale_y: f32,
    mix_shear_y: f32,
) {
    let target = &skeleton.bones[data.target];
    let (t_rotation, t_x, t_y, t_scale_x, t_scale_y, t_shear_y) = (
        target.arotation,
        target.ax,
        target.ay,
        target.ascale_x,
        target.ascale_y,
        target.ashear_y,
    );
    let pose = crate::skeleton::SkeletonPose {
        x: skeleton.x,
        y: skeleton.y,
        scale_x: skeleton.scale_x,
        scale_y: skeleton.scale_y,
    };

    for &bone_index in &data.bones {
        let bone = &skeleton.bones[bone_index];
        let mut rotation = bone.arotation;
        if mix_rotate != 0.0 {
            rotation += (t_rotation - rotation + data.offset_rotation) * mix_rotate;
        }
        let mut x = bone.ax;
        let mut y = bone.ay;
        x += (t_x - x + data.offset_x) * mix_x;
        y += (t_y - y + data.offset_y) * mix_y;
        let mut scale_x = bone.ascale_x;
        let mut scale_y = bone.ascale_y;
        if mix_scale_x != 0.0 {
            scale_x += (t_scale_x - scale_x + data.offset_scale_x) * mix_scale_x;
        }
        if mix_scale_y != 0.0 {
            scale_y += (t_scale_y - scale_y + data.offset_scale_y) * mix_scale_y;
        }
        let mut shear_y = bone.ashear_y;
        if mix_shear_y != 0.0 {
            shear_y += (t_shear_y - shear_y + data.offset_shear_y) * mix_shear_y;
        }
        let shear_x = bone.ashear_x;

        let parent = skeleton.bones[bone_index].parent.map(|p| skeleton.bones[p].world());
        skeleton.bones[bone_index].update_world_transform_with(
            parent, &pose, x, y, rotation, scale_x, scale_y, shear_x, shear_y,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_relative_local(
    skeleton: &mut Skeleton,
    data: &TransformConstraintData,
    mix_rotate: f32,
    mix_x: f32,
    mix_y: f32,
    mix_scale_x: f32,
    mix_scale_y: f32,
    mix_shear_y: f32,
) {
    let target = &skeleton.bones[data.target];
    let (t_rotation, t_x, t_y, t_scale_x, t_scale_y, t_shear_y) = (
        target.arotation,
        target.ax,
        target.ay,
        target.ascale_x,
        target.ascale_y,
        target.ashear_y,
    );
    let pose = crate::skeleton::SkeletonPose {
        x: skeleton.x,
        y: skeleton.y,
        scale_x: skeleton.scale_x,
        scale_y: skeleton.scale_y,
    };

    for &bone_index in &data.bones {
        let bone = &skeleton.bones[bone_index];
        let rotation = bone.arotation + (t_rotation + data.offset_rotation) * mix_rotate;
        let x = bone.ax + (t_x + data.offset_x) * mix_x;
        let y = bone.ay + (t_y + data.offset_y) * mix_y;
        let scale_x = bone.ascale_x * (((t_scale_x - 1.0 + data.offset_scale_x) * mix_scale_x) + 1.0);
        let scale_y = bone.ascale_y * (((t_scale_y - 1.0 + data.offset_scale_y) * mix_scale_y) + 1.0);
        let shear_y = bone.ashear_y + (t_shear_y + data.offset_shear_y) * mix_shear_y;
        let shear_x = bone.ashear_x;

        let parent = skeleton.bones[bone_index].parent.map(|p| skeleton.bones[p].world());
        skeleton.bones[bone_index].update_world_transform_with(
            parent, &pose, x, y, rotation, scale_x, scale_y, shear_x, shear_y,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{BoneData, SkeletonDataBuilder};

    /// root with two children: a driven bone and a rotated/offset target
    fn rig(constraint: TransformConstraintData) -> Skeleton {
        let driven = BoneData::new(1, "driven", Some(0));
        let mut target = BoneData::new(2, "target", Some(0));
        target.x = 5.0;
        target.y = 2.0;
        target.rotation = 90.0;
        let data = SkeletonDataBuilder::new("rig")
            .bone(BoneData::new(0, "root", None))
            .bone(driven)
            .bone(target)
            .transform_constraint(constraint)
            .build()
            .unwrap();
        Skeleton::new(data)
    }

    #[test]
    fn test_absolute_world_full_mix_copies_pose() {
        let mut skeleton = rig(TransformConstraintData::new("tc", vec![1], 2));
        skeleton.update_world_transform();
        let driven = &skeleton.bones[1];
        assert!((driven.world_x - 5.0).abs() < 0.001);
        assert!((driven.world_y - 2.0).abs() < 0.001);
        assert!((driven.world_rotation_x() - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_mix_is_noop() {
        let mut data = TransformConstraintData::new("tc", vec![1], 2);
        data.mix_rotate = 0.0;
        data.mix_x = 0.0;
        data.mix_y = 0.0;
        data.mix_scale_x = 0.0;
        data.mix_scale_y = 0.0;
        data.mix_shear_y = 0.0;
        let mut skeleton = rig(data);
        skeleton.update_world_transform();
        let driven = &skeleton.bones[1];
        assert!(driven.world_x.abs() < 0.0001);
        assert!(driven.world_y.abs() < 0.0001);
        assert!(driven.world_rotation_x().abs() < 0.01);
    }

    #[test]
    fn test_half_translation_mix() {
        let mut data = TransformConstraintData::new("tc", vec![1], 2);
        data.mix_rotate = 0.0;
        data.mix_x = 0.5;
        data.mix_y = 0.5;
        data.mix_scale_x = 0.0;
        data.mix_scale_y = 0.0;
        data.mix_shear_y = 0.0;
        let mut skeleton = rig(data);
        skeleton.update_world_transform();
        let driven = &skeleton.bones[1];
        assert!((driven.world_x - 2.5).abs() < 0.001);
        assert!((driven.world_y - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_relative_local_offsets_pose() {
        let mut data = TransformConstraintData::new("tc", vec![1], 2);
        data.relative = true;
        data.local = true;
        data.mix_scale_x = 0.0;
        data.mix_scale_y = 0.0;
        data.mix_shear_y = 0.0;
        let mut skeleton = rig(data);
        skeleton.bones[1].rotation = 10.0;
        skeleton.update_world_transform();
        let driven = &skeleton.bones[1];
        // Driven local pose plus the target's local pose.
        assert!((driven.arotation - 100.0).abs() < 0.01);
        assert!((driven.ax - 5.0).abs() < 0.001);
        assert!((driven.ay - 2.0).abs() < 0.001);
    }
}
