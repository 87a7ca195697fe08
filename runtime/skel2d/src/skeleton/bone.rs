//! Bone hierarchy transform computation
//!
//! Bones are stored in one contiguous, pre-order-sorted arena on the
//! skeleton; parent and child links are indices into that arena, never
//! references. Each bone carries its animated local pose, the applied pose
//! (what the world transform was actually computed from, which constraints
//! rewrite), and the resulting world transform as a 2x3 affine
//! (a, b, c, d, world_x, world_y).

use std::sync::Arc;

use glam::Vec2;

use crate::math::{DEG_RAD, RAD_DEG, cos_deg, sin_deg};

/// Determines how a bone inherits its parent's world transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum TransformMode {
    /// Full inheritance of rotation, scale, and reflection
    #[default]
    Normal,
    /// Inherit only the parent's translation
    OnlyTranslation,
    /// Inherit translation and scale, but not rotation or reflection
    NoRotationOrReflection,
    /// Inherit translation, rotation, and reflection, but not scale
    NoScale,
    /// Inherit translation and rotation, but not scale or reflection
    NoScaleOrReflection,
}

/// Immutable setup-pose definition of a bone
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneData {
    /// Index into the skeleton's pre-order bone list
    pub index: usize,
    /// Bone name, unique within the skeleton
    pub name: Arc<str>,
    /// Parent bone index; `None` only for the root
    pub parent: Option<usize>,
    /// Bone length, used by IK and path constraints
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
    pub transform_mode: TransformMode,
    /// When true the bone is only active while the active skin contains it
    pub skin_required: bool,
}

impl BoneData {
    /// Create bone data with an identity local transform
    pub fn new(index: usize, name: impl Into<Arc<str>>, parent: Option<usize>) -> Self {
        Self {
            index,
            name: name.into(),
            parent,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            transform_mode: TransformMode::Normal,
            skin_required: false,
        }
    }
}

/// Snapshot of a bone's world transform, copied out of the arena so a child
/// can be updated without holding a borrow on its parent
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldTransform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

/// Skeleton-level root transform composed under the root bone
#[derive(Debug, Clone, Copy)]
pub struct SkeletonPose {
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

/// A live bone: animated local pose, applied pose, and world transform
#[derive(Debug, Clone)]
pub struct Bone {
    /// Shared immutable setup definition
    pub data: Arc<BoneData>,
    /// Parent index in the skeleton's bone arena
    pub parent: Option<usize>,
    /// Child indices in the skeleton's bone arena
    pub children: Vec<usize>,

    // Animated local pose, written by timelines and the host.
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    // Applied pose: the local values the world transform was computed from.
    // Constraints overwrite the world transform and re-derive these.
    pub ax: f32,
    pub ay: f32,
    pub arotation: f32,
    pub ascale_x: f32,
    pub ascale_y: f32,
    pub ashear_x: f32,
    pub ashear_y: f32,

    // World transform.
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,

    /// False when deactivated by skin requirements; the update cache skips
    /// inactive bones and they keep their last world transform
    pub active: bool,
    /// Update-cache ordering scratch
    pub(crate) sorted: bool,
}

impl Bone {
    /// Create a bone posed at its setup values
    pub fn new(data: Arc<BoneData>) -> Self {
        let mut bone = Self {
            parent: data.parent,
            children: Vec::new(),
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
            ax: 0.0,
            ay: 0.0,
            arotation: 0.0,
            ascale_x: 1.0,
            ascale_y: 1.0,
            ashear_x: 0.0,
            ashear_y: 0.0,
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            world_x: 0.0,
            world_y: 0.0,
            active: true,
            sorted: false,
            data,
        };
        bone.set_to_setup_pose();
        bone
    }

    /// Reset the local pose to the setup values
    pub fn set_to_setup_pose(&mut self) {
        let data = &self.data;
        self.x = data.x;
        self.y = data.y;
        self.rotation = data.rotation;
        self.scale_x = data.scale_x;
        self.scale_y = data.scale_y;
        self.shear_x = data.shear_x;
        self.shear_y = data.shear_y;
    }

    /// Copy of this bone's world transform
    pub fn world(&self) -> WorldTransform {
        WorldTransform {
            a: self.a,
            b: self.b,
            c: self.c,
            d: self.d,
            world_x: self.world_x,
            world_y: self.world_y,
        }
    }

    /// Compute the world transform from the animated local pose
    pub fn update(&mut self, parent: Option<WorldTransform>, skeleton: &SkeletonPose) {
        self.update_world_transform_with(
            parent,
            skeleton,
            self.ax,
            self.ay,
            self.arotation,
            self.ascale_x,
            self.ascale_y,
            self.ashear_x,
            self.ashear_y,
        );
    }

    /// Compute the world transform from the given local values, honoring the
    /// bone's transform mode. The local values are stored as the applied
    /// pose.
    #[allow(clippy::too_many_arguments)]
    pub fn update_world_transform_with(
        &mut self,
        parent: Option<WorldTransform>,
        skeleton: &SkeletonPose,
        x: f32,
        y: f32,
        rotation: f32,
        scale_x: f32,
        scale_y: f32,
        shear_x: f32,
        shear_y: f32,
    ) {
        self.ax = x;
        self.ay = y;
        self.arotation = rotation;
        self.ascale_x = scale_x;
        self.ascale_y = scale_y;
        self.ashear_x = shear_x;
        self.ashear_y = shear_y;

        let Some(p) = parent else {
            // Root bone composes with the skeleton's own transform.
            let sx = skeleton.scale_x;
            let sy = skeleton.scale_y;
            let rx = (rotation + shear_x) * DEG_RAD;
            let ry = (rotation + 90.0 + shear_y) * DEG_RAD;
            self.a = rx.cos() * scale_x * sx;
            self.b = ry.cos() * scale_y * sx;
            self.c = rx.sin() * scale_x * sy;
            self.d = ry.sin() * scale_y * sy;
            self.world_x = x * sx + skeleton.x;
            self.world_y = y * sy + skeleton.y;
            return;
        };

        let mut pa = p.a;
        let mut pb = p.b;
        let mut pc = p.c;
        let mut pd = p.d;
        self.world_x = pa * x + pb * y + p.world_x;
        self.world_y = pc * x + pd * y + p.world_y;

        match self.data.transform_mode {
            TransformMode::Normal => {
                let rx = (rotation + shear_x) * DEG_RAD;
                let ry = (rotation + 90.0 + shear_y) * DEG_RAD;
                let la = rx.cos() * scale_x;
                let lb = ry.cos() * scale_y;
                let lc = rx.sin() * scale_x;
                let ld = ry.sin() * scale_y;
                self.a = pa * la + pb * lc;
                self.b = pa * lb + pb * ld;
                self.c = pc * la + pd * lc;
                self.d = pc * lb + pd * ld;
                return;
            }
            TransformMode::OnlyTranslation => {
                let rx = (rotation + shear_x) * DEG_RAD;
                let ry = (rotation + 90.0 + shear_y) * DEG_RAD;
                self.a = rx.cos() * scale_x;
                self.b = ry.cos() * scale_y;
                self.c = rx.sin() * scale_x;
                self.d = ry.sin() * scale_y;
            }
            TransformMode::NoRotationOrReflection => {
                let mut s = pa * pa + pc * pc;
                let prx;
                if s > 0.0001 {
                    s = (pa * pd - pb * pc).abs() / s;
                    pa /= skeleton.scale_x;
                    pc /= skeleton.scale_y;
                    pb = pc * s;
                    pd = pa * s;
                    prx = pc.atan2(pa) * RAD_DEG;
                } else {
                    pa = 0.0;
                    pc = 0.0;
                    prx = 90.0 - pd.atan2(pb) * RAD_DEG;
                }
                let rx = rotation + shear_x - prx;
                let ry = rotation + shear_y - prx + 90.0;
                let la = cos_deg(rx) * scale_x;
                let lb = cos_deg(ry) * scale_y;
                let lc = sin_deg(rx) * scale_x;
                let ld = sin_deg(ry) * scale_y;
                self.a = pa * la - pb * lc;
                self.b = pa * lb - pb * ld;
                self.c = pc * la + pd * lc;
                self.d = pc * lb + pd * ld;
            }
            TransformMode::NoScale | TransformMode::NoScaleOrReflection => {
                let cos = cos_deg(rotation);
                let sin = sin_deg(rotation);
                let mut za = (pa * cos + pb * sin) / skeleton.scale_x;
                let mut zc = (pc * cos + pd * sin) / skeleton.scale_y;
                let mut s = (za * za + zc * zc).sqrt();
                if s > 0.00001 {
                    s = 1.0 / s;
                }
                za *= s;
                zc *= s;
                s = (za * za + zc * zc).sqrt();
                if self.data.transform_mode == TransformMode::NoScale
                    && ((pa * pd - pb * pc < 0.0)
                        != ((skeleton.scale_x < 0.0) != (skeleton.scale_y < 0.0)))
                {
                    s = -s;
                }
                let r = std::f32::consts::FRAC_PI_2 + zc.atan2(za);
                let zb = r.cos() * s;
                let zd = r.sin() * s;
                let la = cos_deg(shear_x) * scale_x;
                let lb = cos_deg(90.0 + shear_y) * scale_y;
                let lc = sin_deg(shear_x) * scale_x;
                let ld = sin_deg(90.0 + shear_y) * scale_y;
                self.a = za * la + zb * lc;
                self.b = za * lb + zb * ld;
                self.c = zc * la + zd * lc;
                self.d = zc * lb + zd * ld;
            }
        }

        self.a *= skeleton.scale_x;
        self.b *= skeleton.scale_x;
        self.c *= skeleton.scale_y;
        self.d *= skeleton.scale_y;
    }

    /// Re-derive the applied pose from the current world transform
    ///
    /// Called after a constraint writes the world transform directly, so
    /// later constraints and the next frame see consistent applied values.
    /// Some world transforms cannot be expressed as a local pose (world
    /// shear along both axes); the derived pose is the closest fit.
    pub fn update_applied_transform(
        &mut self,
        parent: Option<WorldTransform>,
        skeleton: &SkeletonPose,
    ) {
        let Some(p) = parent else {
            self.ax = self.world_x - skeleton.x;
            self.ay = self.world_y - skeleton.y;
            let (a, b, c, d) = (self.a, self.b, self.c, self.d);
            self.arotation = c.atan2(a) * RAD_DEG;
            self.ascale_x = (a * a + c * c).sqrt();
            self.ascale_y = (b * b + d * d).sqrt();
            self.ashear_x = 0.0;
            self.ashear_y = (a * b + c * d).atan2(a * d - b * c) * RAD_DEG;
            return;
        };

        let pid = 1.0 / (p.a * p.d - p.b * p.c);
        let (ia, ib, ic, id) = (p.d * pid, p.b * pid, p.c * pid, p.a * pid);
        let dx = self.world_x - p.world_x;
        let dy = self.world_y - p.world_y;
        self.ax = dx * ia - dy * ib;
        self.ay = dy * id - dx * ic;

        let ra = ia * self.a - ib * self.c;
        let rb = ia * self.b - ib * self.d;
        let rc = id * self.c - ic * self.a;
        let rd = id * self.d - ic * self.b;

        self.ashear_x = 0.0;
        self.ascale_x = (ra * ra + rc * rc).sqrt();
        if self.ascale_x > 0.0001 {
            let det = ra * rd - rb * rc;
            self.ascale_y = det / self.ascale_x;
            self.ashear_y = (ra * rb + rc * rd).atan2(det) * RAD_DEG;
            self.arotation = rc.atan2(ra) * RAD_DEG;
        } else {
            self.ascale_x = 0.0;
            self.ascale_y = (rb * rb + rd * rd).sqrt();
            self.ashear_y = 0.0;
            self.arotation = 90.0 - rd.atan2(rb) * RAD_DEG;
        }
    }

    /// Transform a point from this bone's coordinate space to world space
    pub fn local_to_world(&self, local: Vec2) -> Vec2 {
        Vec2::new(
            local.x * self.a + local.y * self.b + self.world_x,
            local.x * self.c + local.y * self.d + self.world_y,
        )
    }

    /// Transform a world-space point to this bone's coordinate space
    pub fn world_to_local(&self, world: Vec2) -> Vec2 {
        let det = self.a * self.d - self.b * self.c;
        let x = world.x - self.world_x;
        let y = world.y - self.world_y;
        Vec2::new(
            (x * self.d - y * self.b) / det,
            (y * self.a - x * self.c) / det,
        )
    }

    /// World rotation of the bone's X axis, in degrees
    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a) * RAD_DEG
    }

    /// World rotation of the bone's Y axis, in degrees
    pub fn world_rotation_y(&self) -> f32 {
        self.d.atan2(self.b) * RAD_DEG
    }

    /// World scale along the bone's X axis
    pub fn world_scale_x(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }

    /// World scale along the bone's Y axis
    pub fn world_scale_y(&self) -> f32 {
        (self.b * self.b + self.d * self.d).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSE: SkeletonPose = SkeletonPose {
        x: 0.0,
        y: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
    };

    fn root_bone() -> Bone {
        Bone::new(Arc::new(BoneData::new(0, "root", None)))
    }

    fn child_of(parent: usize, index: usize) -> Bone {
        Bone::new(Arc::new(BoneData::new(index, "child", Some(parent))))
    }

    #[test]
    fn test_root_identity() {
        let mut bone = root_bone();
        bone.update_world_transform_with(None, &POSE, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0);
        assert!((bone.a - 1.0).abs() < 0.0001);
        assert!(bone.b.abs() < 0.0001);
        assert!(bone.c.abs() < 0.0001);
        assert!((bone.d - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_root_skeleton_offset() {
        let pose = SkeletonPose {
            x: 10.0,
            y: -5.0,
            scale_x: 2.0,
            scale_y: 1.0,
        };
        let mut bone = root_bone();
        bone.update_world_transform_with(None, &pose, 3.0, 4.0, 0.0, 1.0, 1.0, 0.0, 0.0);
        assert!((bone.world_x - 16.0).abs() < 0.0001);
        assert!((bone.world_y - -1.0).abs() < 0.0001);
        assert!((bone.a - 2.0).abs() < 0.0001);
    }

    #[test]
    fn test_parent_chain_translation() {
        let mut root = root_bone();
        root.update_world_transform_with(None, &POSE, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0);
        let mut child = child_of(0, 1);
        child.update_world_transform_with(
            Some(root.world()),
            &POSE,
            0.0,
            1.0,
            0.0,
            1.0,
            1.0,
            0.0,
            0.0,
        );
        assert!((child.world_x - 1.0).abs() < 0.0001);
        assert!((child.world_y - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_rotation_composes() {
        let mut root = root_bone();
        root.update_world_transform_with(None, &POSE, 0.0, 0.0, 90.0, 1.0, 1.0, 0.0, 0.0);
        let mut child = child_of(0, 1);
        // Child one unit along the parent's X axis lands on the world Y axis.
        child.update_world_transform_with(
            Some(root.world()),
            &POSE,
            1.0,
            0.0,
            0.0,
            1.0,
            1.0,
            0.0,
            0.0,
        );
        assert!(child.world_x.abs() < 0.0001);
        assert!((child.world_y - 1.0).abs() < 0.0001);
        assert!((child.world_rotation_x() - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_only_translation_ignores_parent_rotation() {
        let mut root = root_bone();
        root.update_world_transform_with(None, &POSE, 0.0, 0.0, 90.0, 1.0, 1.0, 0.0, 0.0);
        let mut child = child_of(0, 1);
        {
            let data = Arc::make_mut(&mut child.data);
            data.transform_mode = TransformMode::OnlyTranslation;
        }
        child.update_world_transform_with(
            Some(root.world()),
            &POSE,
            1.0,
            0.0,
            0.0,
            1.0,
            1.0,
            0.0,
            0.0,
        );
        // Position is still rotated with the parent, orientation is not.
        assert!(child.world_x.abs() < 0.0001);
        assert!((child.world_y - 1.0).abs() < 0.0001);
        assert!(child.world_rotation_x().abs() < 0.01);
    }

    #[test]
    fn test_no_scale_strips_parent_scale() {
        let mut root = root_bone();
        root.update_world_transform_with(None, &POSE, 0.0, 0.0, 0.0, 3.0, 3.0, 0.0, 0.0);
        let mut child = child_of(0, 1);
        {
            let data = Arc::make_mut(&mut child.data);
            data.transform_mode = TransformMode::NoScale;
        }
        child.update_world_transform_with(
            Some(root.world()),
            &POSE,
            0.0,
            0.0,
            0.0,
            1.0,
            1.0,
            0.0,
            0.0,
        );
        assert!((child.world_scale_x() - 1.0).abs() < 0.001);
        assert!((child.world_scale_y() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_applied_transform_round_trip() {
        let mut root = root_bone();
        root.update_world_transform_with(None, &POSE, 2.0, 3.0, 30.0, 1.5, 0.75, 0.0, 0.0);
        let mut child = child_of(0, 1);
        child.update_world_transform_with(
            Some(root.world()),
            &POSE,
            4.0,
            -1.0,
            20.0,
            1.0,
            1.0,
            0.0,
            0.0,
        );
        let world_before = child.world();
        child.update_applied_transform(Some(root.world()), &POSE);
        // Recomputing the world transform from the derived applied pose
        // reproduces the same world transform.
        child.update(Some(root.world()), &POSE);
        let world_after = child.world();
        assert!((world_before.a - world_after.a).abs() < 0.001);
        assert!((world_before.b - world_after.b).abs() < 0.001);
        assert!((world_before.c - world_after.c).abs() < 0.001);
        assert!((world_before.d - world_after.d).abs() < 0.001);
        assert!((world_before.world_x - world_after.world_x).abs() < 0.001);
        assert!((world_before.world_y - world_after.world_y).abs() < 0.001);
    }

    #[test]
    fn test_world_local_round_trip() {
        let mut bone = root_bone();
        bone.update_world_transform_with(None, &POSE, 5.0, 2.0, 45.0, 2.0, 1.0, 0.0, 0.0);
        let p = Vec2::new(3.0, -2.0);
        let w = bone.local_to_world(p);
        let back = bone.world_to_local(w);
        assert!((back.x - p.x).abs() < 0.001);
        assert!((back.y - p.y).abs() < 0.001);
    }
}
