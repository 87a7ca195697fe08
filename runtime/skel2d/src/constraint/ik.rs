//! Inverse kinematics constraint: 1-bone aim and 2-bone analytic solver
//!
//! The 2-bone solve uses the law of cosines, clamped to the reachable range
//! when the target lies beyond the chain's reach or inside its minimum
//! fold. `softness` eases the last stretch before full extension so the
//! elbow does not snap; `stretch` and `compress` scale the bones toward the
//! target instead of clamping. All mixes are clamped at use; the solver
//! never fails.

use std::sync::Arc;

use crate::math::{RAD_DEG, signum_nz};
use crate::skeleton::{Skeleton, TransformMode, WorldTransform};

/// Immutable configuration of an IK constraint
#[derive(Debug, Clone)]
pub struct IkConstraintData {
    pub name: Arc<str>,
    /// Position in the skeleton's global constraint application order
    pub order: usize,
    pub skin_required: bool,
    /// One or two constrained bone indices; for two, the second must be a
    /// descendant of the first
    pub bones: Vec<usize>,
    /// Target bone index
    pub target: usize,
    /// +1 or -1, selecting which analytic elbow solution to use
    pub bend_direction: i32,
    /// Scale down a 1-bone constraint when the target is closer than the
    /// bone's length
    pub compress: bool,
    /// Scale toward the target when it is past the chain's reach
    pub stretch: bool,
    /// Scale both axes when stretching or compressing
    pub uniform: bool,
    /// 0 leaves bones untouched, 1 applies the full solve
    pub mix: f32,
    /// Distance before full extension where easing begins
    pub softness: f32,
}

impl IkConstraintData {
    pub fn new(name: impl Into<Arc<str>>, bones: Vec<usize>, target: usize) -> Self {
        Self {
            name: name.into(),
            order: 0,
            skin_required: false,
            bones,
            target,
            bend_direction: 1,
            compress: false,
            stretch: false,
            uniform: false,
            mix: 1.0,
            softness: 0.0,
        }
    }
}

/// A live IK constraint with animatable values
#[derive(Debug, Clone)]
pub struct IkConstraint {
    pub data: Arc<IkConstraintData>,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub mix: f32,
    pub softness: f32,
    pub active: bool,
}

impl IkConstraint {
    pub fn new(data: Arc<IkConstraintData>) -> Self {
        Self {
            bend_direction: data.bend_direction,
            compress: data.compress,
            stretch: data.stretch,
            mix: data.mix,
            softness: data.softness,
            active: true,
            data,
        }
    }

    /// Reset animatable values to the configured setup values
    pub fn set_to_setup_pose(&mut self) {
        self.bend_direction = self.data.bend_direction;
        self.compress = self.data.compress;
        self.stretch = self.data.stretch;
        self.mix = self.data.mix;
        self.softness = self.data.softness;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// World transform of a bone's parent, or the skeleton transform for roots
fn parent_world(skeleton: &Skeleton, bone: usize) -> WorldTransform {
    match skeleton.bones[bone].parent {
        Some(p) => skeleton.bones[p].world(),
        None => WorldTransform {
            a: skeleton.scale_x,
            b: 0.0,
            c: 0.0,
            d: skeleton.scale_y,
            world_x: skeleton.x,
            world_y: skeleton.y,
        },
    }
}

/// Apply the constraint at `index` to the skeleton's current pose
pub(crate) fn apply(skeleton: &mut Skeleton, index: usize) {
    let constraint = &skeleton.ik_constraints[index];
    let mix = constraint.mix.clamp(0.0, 1.0);
    if mix == 0.0 {
        return;
    }
    let data = constraint.data.clone();
    let bend_direction = if constraint.bend_direction < 0 { -1 } else { 1 };
    let compress = constraint.compress;
    let stretch = constraint.stretch;
    let softness = constraint.softness.max(0.0);

    let target = &skeleton.bones[data.target];
    let (tx, ty) = (target.world_x, target.world_y);

    match data.bones.len() {
        1 => apply_one(skeleton, data.bones[0], tx, ty, compress, stretch, data.uniform, mix),
        2 => apply_two(
            skeleton,
            data.bones[0],
            data.bones[1],
            tx,
            ty,
            bend_direction,
            stretch,
            data.uniform,
            softness,
            mix,
        ),
        _ => {}
    }
}

/// Rotate (and optionally scale) a single bone so its X axis points at the
/// target position
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_one(
    skeleton: &mut Skeleton,
    bone_index: usize,
    target_x: f32,
    target_y: f32,
    compress: bool,
    stretch: bool,
    uniform: bool,
    alpha: f32,
) {
    let p = parent_world(skeleton, bone_index);
    let mut pa = p.a;
    let mut pb = p.b;
    let mut pc = p.c;
    let mut pd = p.d;

    let bone = &skeleton.bones[bone_index];
    let mut rotation_ik = -bone.ashear_x - bone.arotation;
    let mut tx = 0.0;
    let mut ty = 0.0;

    match bone.data.transform_mode {
        TransformMode::OnlyTranslation => {
            tx = (target_x - bone.world_x) * signum_nz(skeleton.scale_x);
            ty = (target_y - bone.world_y) * signum_nz(skeleton.scale_y);
        }
        mode => {
            if mode == TransformMode::NoRotationOrReflection {
                let s = (pa * pd - pb * pc).abs() / (pa * pa + pc * pc).max(0.0001);
                let sa = pa / skeleton.scale_x;
                let sc = pc / skeleton.scale_y;
                pb = -sc * s * skeleton.scale_x;
                pd = sa * s * skeleton.scale_y;
                rotation_ik += sc.atan2(sa) * RAD_DEG;
            }
            let x = target_x - p.world_x;
            let y = target_y - p.world_y;
            let d = pa * pd - pb * pc;
            if d.abs() > 0.0001 {
                tx = (x * pd - y * pb) / d - bone.ax;
                ty = (y * pa - x * pc) / d - bone.ay;
            }
        }
    }

    rotation_ik += ty.atan2(tx) * RAD_DEG;
    if bone.ascale_x < 0.0 {
        rotation_ik += 180.0;
    }
    if rotation_ik > 180.0 {
        rotation_ik -= 360.0;
    } else if rotation_ik < -180.0 {
        rotation_ik += 360.0;
    }

    let mut sx = bone.ascale_x;
    let mut sy = bone.ascale_y;
    if compress || stretch {
        match bone.data.transform_mode {
            TransformMode::NoScale | TransformMode::NoScaleOrReflection => {
                tx = target_x - bone.world_x;
                ty = target_y - bone.world_y;
            }
            _ => {}
        }
        let b = bone.data.length * sx;
        let dd = (tx * tx + ty * ty).sqrt();
        if ((compress && dd < b) || (stretch && dd > b)) && b > 0.0001 {
            let s = (dd / b - 1.0) * alpha + 1.0;
            sx *= s;
            if uniform {
                sy *= s;
            }
        }
    }

    let (ax, ay, arotation, ashear_x, ashear_y) = {
        let bone = &skeleton.bones[bone_index];
        (bone.ax, bone.ay, bone.arotation, bone.ashear_x, bone.ashear_y)
    };
    let pose = crate::skeleton::SkeletonPose {
        x: skeleton.x,
        y: skeleton.y,
        scale_x: skeleton.scale_x,
        scale_y: skeleton.scale_y,
    };
    let parent = skeleton.bones[bone_index].parent.map(|i| skeleton.bones[i].world());
    skeleton.bones[bone_index].update_world_transform_with(
        parent,
        &pose,
        ax,
        ay,
        arotation + rotation_ik * alpha,
        sx,
        sy,
        ashear_x,
        ashear_y,
    );
}

/// Solve a 2-bone chain analytically so the child bone's tip reaches the
/// target, bending toward `bend_dir`
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_two(
    skeleton: &mut Skeleton,
    parent_index: usize,
    child_index: usize,
    target_x: f32,
    target_y: f32,
    bend_dir: i32,
    stretch: bool,
    uniform: bool,
    mut softness: f32,
    alpha: f32,
) {
    let pose = crate::skeleton::SkeletonPose {
        x: skeleton.x,
        y: skeleton.y,
        scale_x: skeleton.scale_x,
        scale_y: skeleton.scale_y,
    };

    let (px, py, mut psx, mut psy, mut sx, mut sy, mut csx);
    let (cx, child_ay, child_ascale_x, child_ascale_y, child_ashear_x, child_ashear_y, child_length);
    {
        let parent = &skeleton.bones[parent_index];
        px = parent.ax;
        py = parent.ay;
        psx = parent.ascale_x;
        psy = parent.ascale_y;
        sx = psx;
        sy = psy;
        let child = &skeleton.bones[child_index];
        csx = child.ascale_x;
        cx = child.ax;
        child_ay = child.ay;
        child_ascale_x = child.ascale_x;
        child_ascale_y = child.ascale_y;
        child_ashear_x = child.ashear_x;
        child_ashear_y = child.ashear_y;
        child_length = child.data.length;
    }

    let os1;
    let mut s2;
    if psx < 0.0 {
        psx = -psx;
        os1 = 180.0_f32;
        s2 = -1.0_f32;
    } else {
        os1 = 0.0;
        s2 = 1.0;
    }
    if psy < 0.0 {
        psy = -psy;
        s2 = -s2;
    }
    let os2;
    if csx < 0.0 {
        csx = -csx;
        os2 = 180.0_f32;
    } else {
        os2 = 0.0;
    }

    let pw = skeleton.bones[parent_index].world();
    let (mut a, mut b, mut c, mut d) = (pw.a, pw.b, pw.c, pw.d);
    let u = (psx - psy).abs() <= 0.0001;
    let cy;
    let cwx;
    let cwy;
    if !u || stretch {
        cy = 0.0;
        cwx = a * cx + pw.world_x;
        cwy = c * cx + pw.world_y;
    } else {
        cy = child_ay;
        cwx = a * cx + b * cy + pw.world_x;
        cwy = c * cx + d * cy + pw.world_y;
    }

    let pp = parent_world(skeleton, parent_index);
    a = pp.a;
    b = pp.b;
    c = pp.c;
    d = pp.d;
    let id = {
        let det = a * d - b * c;
        if det.abs() > 0.0001 { 1.0 / det } else { 0.0 }
    };
    let mut x = cwx - pp.world_x;
    let mut y = cwy - pp.world_y;
    let dx = (x * d - y * b) * id - px;
    let dy = (y * a - x * c) * id - py;
    let l1 = (dx * dx + dy * dy).sqrt();
    let mut l2 = child_length * csx;
    if l1 < 0.0001 {
        // Degenerate chain: aim the parent alone and leave the child local.
        apply_one(skeleton, parent_index, target_x, target_y, false, stretch, false, alpha);
        let parent = skeleton.bones[parent_index].world();
        skeleton.bones[child_index].update_world_transform_with(
            Some(parent),
            &pose,
            cx,
            cy,
            0.0,
            child_ascale_x,
            child_ascale_y,
            child_ashear_x,
            child_ashear_y,
        );
        return;
    }

    x = target_x - pp.world_x;
    y = target_y - pp.world_y;
    let mut tx = (x * d - y * b) * id - px;
    let mut ty = (y * a - x * c) * id - py;
    let mut dd = tx * tx + ty * ty;

    if softness != 0.0 {
        softness *= psx * (csx + 1.0) * 0.5;
        let td = dd.sqrt();
        let sd = td - l1 - l2 * psx + softness;
        if sd > 0.0 {
            let mut p = (sd / (softness * 2.0)).min(1.0) - 1.0;
            p = (sd - softness * (1.0 - p * p)) / td;
            tx -= p * tx;
            ty -= p * ty;
            dd = tx * tx + ty * ty;
        }
    }

    let mut a1: f32;
    let mut a2: f32;
    'outer: {
        if u {
            l2 *= psx;
            let mut cos = (dd - l1 * l1 - l2 * l2) / (2.0 * l1 * l2);
            if cos < -1.0 {
                cos = -1.0;
                a2 = std::f32::consts::PI * bend_dir as f32;
            } else if cos > 1.0 {
                cos = 1.0;
                a2 = 0.0;
                if stretch {
                    let s = (dd.sqrt() / (l1 + l2) - 1.0) * alpha + 1.0;
                    sx *= s;
                    if uniform {
                        sy *= s;
                    }
                }
            } else {
                a2 = cos.acos() * bend_dir as f32;
            }
            let aa = l1 + l2 * cos;
            let bb = l2 * a2.sin();
            a1 = (ty * aa - tx * bb).atan2(tx * aa + ty * bb);
        } else {
            let aa = psx * l2;
            let bb = psy * l2;
            let aaa = aa * aa;
            let bbb = bb * bb;
            let ta = ty.atan2(tx);
            let cc = bbb * l1 * l1 + aaa * dd - aaa * bbb;
            let c1 = -2.0 * bbb * l1;
            let c2 = bbb - aaa;
            let det = c1 * c1 - 4.0 * c2 * cc;
            if det >= 0.0 {
                let mut q = det.sqrt();
                if c1 < 0.0 {
                    q = -q;
                }
                q = -(c1 + q) / 2.0;
                let r0 = q / c2;
                let r1 = cc / q;
                let r = if r0.abs() < r1.abs() { r0 } else { r1 };
                if r * r <= dd {
                    let yy = (dd - r * r).sqrt() * bend_dir as f32;
                    a1 = ta - yy.atan2(r);
                    a2 = (yy / psy).atan2((r - l1) / psx);
                    break 'outer;
                }
            }
            // No root inside the reachable band: clamp to the ellipse's
            // nearest or farthest point.
            let mut min_angle = std::f32::consts::PI;
            let mut min_x = l1 - aa;
            let mut min_dist = min_x * min_x;
            let mut min_y = 0.0;
            let mut max_angle = 0.0;
            let mut max_x = l1 + aa;
            let mut max_dist = max_x * max_x;
            let mut max_y = 0.0;
            let cc = (-aa * l1) / (aaa - bbb);
            if (-1.0..=1.0).contains(&cc) {
                let cc = cc.acos();
                let xx = aa * cc.cos() + l1;
                let yy = bb * cc.sin();
                let dd2 = xx * xx + yy * yy;
                if dd2 < min_dist {
                    min_angle = cc;
                    min_dist = dd2;
                    min_x = xx;
                    min_y = yy;
                }
                if dd2 > max_dist {
                    max_angle = cc;
                    max_dist = dd2;
                    max_x = xx;
                    max_y = yy;
                }
            }
            if dd <= (min_dist + max_dist) / 2.0 {
                a1 = ta - (min_y * bend_dir as f32).atan2(min_x);
                a2 = min_angle * bend_dir as f32;
            } else {
                a1 = ta - (max_y * bend_dir as f32).atan2(max_x);
                a2 = max_angle * bend_dir as f32;
            }
        }
    }

    let os = cy.atan2(cx) * s2;
    let parent_rotation = skeleton.bones[parent_index].arotation;
    a1 = (a1 - os) * RAD_DEG + os1 - parent_rotation;
    if a1 > 180.0 {
        a1 -= 360.0;
    } else if a1 < -180.0 {
        a1 += 360.0;
    }
    let grandparent = skeleton.bones[parent_index]
        .parent
        .map(|i| skeleton.bones[i].world());
    skeleton.bones[parent_index].update_world_transform_with(
        grandparent,
        &pose,
        px,
        py,
        parent_rotation + a1 * alpha,
        sx,
        sy,
        0.0,
        0.0,
    );

    let child_rotation = skeleton.bones[child_index].arotation;
    a2 = ((a2 + os) * RAD_DEG - child_ashear_x) * s2 + os2 - child_rotation;
    if a2 > 180.0 {
        a2 -= 360.0;
    } else if a2 < -180.0 {
        a2 += 360.0;
    }
    let parent = skeleton.bones[parent_index].world();
    skeleton.bones[child_index].update_world_transform_with(
        Some(parent),
        &pose,
        cx,
        cy,
        child_rotation + a2 * alpha,
        child_ascale_x,
        child_ascale_y,
        child_ashear_x,
        child_ashear_y,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{BoneData, SkeletonDataBuilder};
    use std::sync::Arc as StdArc;

    /// root -> upper(len 1) -> lower(len 1), plus a detached target bone
    fn two_bone_rig(target_x: f32, target_y: f32) -> Skeleton {
        let mut upper = BoneData::new(1, "upper", Some(0));
        upper.length = 1.0;
        let mut lower = BoneData::new(2, "lower", Some(1));
        lower.length = 1.0;
        lower.x = 1.0;
        let mut target = BoneData::new(3, "target", Some(0));
        target.x = target_x;
        target.y = target_y;
        let mut ik = IkConstraintData::new("ik", vec![1, 2], 3);
        ik.order = 0;
        let data = SkeletonDataBuilder::new("rig")
            .bone(BoneData::new(0, "root", None))
            .bone(upper)
            .bone(lower)
            .bone(target)
            .ik_constraint(ik)
            .build()
            .unwrap();
        Skeleton::new(data)
    }

    #[test]
    fn test_two_bone_exact_reach_extends() {
        let mut skeleton = two_bone_rig(2.0, 0.0);
        skeleton.update_world_transform();
        let lower = &skeleton.bones[2];
        // Chain fully extended: tip of the lower bone reaches the target.
        let tip_x = lower.world_x + lower.a * lower.data.length;
        let tip_y = lower.world_y + lower.c * lower.data.length;
        assert!((tip_x - 2.0).abs() < 0.001);
        assert!(tip_y.abs() < 0.001);
        // Elbow angle is zero.
        assert!((lower.arotation).abs() < 0.01);
    }

    #[test]
    fn test_two_bone_over_reach_clamps() {
        let mut skeleton = two_bone_rig(5.0, 0.0);
        skeleton.update_world_transform();
        let upper = &skeleton.bones[1];
        let lower = &skeleton.bones[2];
        // No overshoot and no stretching: scales stay 1.
        assert!((upper.ascale_x - 1.0).abs() < 0.0001);
        assert!((lower.ascale_x - 1.0).abs() < 0.0001);
        let tip_x = lower.world_x + lower.a * lower.data.length;
        assert!((tip_x - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_two_bone_stretch_scales_parent() {
        let mut skeleton = two_bone_rig(4.0, 0.0);
        {
            let constraint = &mut skeleton.ik_constraints[0];
            constraint.stretch = true;
        }
        skeleton.update_world_transform();
        let upper = &skeleton.bones[1];
        assert!(upper.ascale_x > 1.9 && upper.ascale_x < 2.1);
    }

    #[test]
    fn test_two_bone_bend_direction_mirrors() {
        let mut up = two_bone_rig(1.0, 1.0);
        up.update_world_transform();
        let elbow_up = up.bones[2].world_y;

        let mut down = two_bone_rig(1.0, 1.0);
        down.ik_constraints[0].bend_direction = -1;
        down.update_world_transform();
        let elbow_down = down.bones[2].world_y;

        // The elbow lands on opposite sides of the shoulder-target line.
        assert!((elbow_up - elbow_down).abs() > 0.1);
    }

    #[test]
    fn test_mix_zero_is_noop() {
        let mut skeleton = two_bone_rig(0.0, 2.0);
        skeleton.ik_constraints[0].mix = 0.0;
        skeleton.update_world_transform();
        assert!(skeleton.bones[1].arotation.abs() < 0.0001);
        assert!(skeleton.bones[2].arotation.abs() < 0.0001);
    }

    #[test]
    fn test_one_bone_aims_at_target() {
        let mut bone = BoneData::new(1, "aim", Some(0));
        bone.length = 1.0;
        let mut target = BoneData::new(2, "target", Some(0));
        target.x = 0.0;
        target.y = 3.0;
        let data = SkeletonDataBuilder::new("rig")
            .bone(BoneData::new(0, "root", None))
            .bone(bone)
            .bone(target)
            .ik_constraint(IkConstraintData::new("aim", vec![1], 2))
            .build()
            .unwrap();
        let mut skeleton = Skeleton::new(StdArc::clone(&data));
        skeleton.update_world_transform();
        assert!((skeleton.bones[1].arotation - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_one_bone_half_mix() {
        let mut bone = BoneData::new(1, "aim", Some(0));
        bone.length = 1.0;
        let mut target = BoneData::new(2, "target", Some(0));
        target.y = 2.0;
        let mut ik = IkConstraintData::new("aim", vec![1], 2);
        ik.mix = 0.5;
        let data = SkeletonDataBuilder::new("rig")
            .bone(BoneData::new(0, "root", None))
            .bone(bone)
            .bone(target)
            .ik_constraint(ik)
            .build()
            .unwrap();
        let mut skeleton = Skeleton::new(data);
        skeleton.update_world_transform();
        assert!((skeleton.bones[1].arotation - 45.0).abs() < 0.01);
    }
}
