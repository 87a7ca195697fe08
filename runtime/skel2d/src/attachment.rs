//! Attachment variants and world-vertex computation
//!
//! Attachments are immutable geometry templates shared across skeleton
//! instances through `Arc`. Computing a deformed pose never mutates a
//! template; it only writes transient world-space vertex buffers. Dispatch
//! is a closed enum over the attachment kind.

use std::sync::Arc;

use glam::Vec2;

use crate::color::Color;
use crate::math::{RAD_DEG, cos_deg, sin_deg};
use crate::skeleton::{Bone, Slot};

/// Vertex template shared by mesh, bounding box, clipping, and path
/// attachments: either plain local vertices relative to the slot's bone, or
/// bone-weighted vertices blended across several bones.
#[derive(Debug, Clone, Default)]
pub struct VertexSource {
    /// Unweighted: x,y pairs. Weighted: (x, y, weight) triples, grouped by
    /// the runs described in `bones`.
    pub vertices: Vec<f32>,
    /// Weighted vertices only: flattened runs of `[bone_count, bone_index,
    /// bone_index, ...]`, one run per output vertex.
    pub bones: Option<Vec<usize>>,
    /// Number of world-space floats produced (vertex count * 2)
    pub world_vertices_length: usize,
}

impl VertexSource {
    /// Unweighted vertices, local to the slot's bone
    pub fn unweighted(vertices: Vec<f32>) -> Self {
        let world_vertices_length = vertices.len();
        Self {
            vertices,
            bones: None,
            world_vertices_length,
        }
    }

    /// Weighted vertices influenced by multiple bones
    pub fn weighted(vertices: Vec<f32>, bones: Vec<usize>, world_vertices_length: usize) -> Self {
        Self {
            vertices,
            bones: Some(bones),
            world_vertices_length,
        }
    }

    /// Transform a range of the template into world space.
    ///
    /// `start` is the first local float to transform (vertex index * 2) and
    /// `count` the number of local floats; results are written to `out`
    /// beginning at `offset`, advancing `stride` floats per vertex. The
    /// slot's deform buffer, when non-empty, replaces (unweighted) or
    /// offsets (weighted) the template positions.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_world_vertices(
        &self,
        bones_arena: &[Bone],
        slot: &Slot,
        start: usize,
        count: usize,
        out: &mut [f32],
        offset: usize,
        stride: usize,
    ) {
        let end = offset + (count >> 1) * stride;
        let Some(bone_runs) = &self.bones else {
            let vertices = if slot.deform.is_empty() {
                &self.vertices
            } else {
                &slot.deform
            };
            let bone = &bones_arena[slot.bone];
            let (x, y) = (bone.world_x, bone.world_y);
            let (a, b, c, d) = (bone.a, bone.b, bone.c, bone.d);
            let mut v = start;
            let mut w = offset;
            while w < end {
                let vx = vertices[v];
                let vy = vertices[v + 1];
                out[w] = vx * a + vy * b + x;
                out[w + 1] = vx * c + vy * d + y;
                v += 2;
                w += stride;
            }
            return;
        };

        // Skip runs for vertices before `start`.
        let mut v = 0;
        let mut skip = 0;
        let mut i = 0;
        while i < start {
            let n = bone_runs[v];
            v += n + 1;
            skip += n;
            i += 2;
        }

        let deform = &slot.deform;
        let mut w = offset;
        let mut b = skip * 3;
        let mut f = skip * 2;
        while w < end {
            let mut wx = 0.0;
            let mut wy = 0.0;
            let mut n = bone_runs[v];
            v += 1;
            n += v;
            while v < n {
                let bone = &bones_arena[bone_runs[v]];
                let (mut vx, mut vy) = (self.vertices[b], self.vertices[b + 1]);
                if !deform.is_empty() {
                    vx += deform[f];
                    vy += deform[f + 1];
                }
                let weight = self.vertices[b + 2];
                wx += (vx * bone.a + vy * bone.b + bone.world_x) * weight;
                wy += (vx * bone.c + vy * bone.d + bone.world_y) * weight;
                v += 1;
                b += 3;
                f += 2;
            }
            out[w] = wx;
            out[w + 1] = wy;
            w += stride;
        }
    }
}

/// A textured rectangle attached to a bone
#[derive(Debug, Clone)]
pub struct RegionAttachment {
    pub name: Arc<str>,
    /// Texture region name resolved by the excluded atlas layer
    pub path: Arc<str>,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Color,
    /// Precomputed local corner offsets: BL, BR, UR, UL as x,y pairs
    offset: [f32; 8],
}

impl RegionAttachment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<Arc<str>>,
        path: impl Into<Arc<str>>,
        x: f32,
        y: f32,
        rotation: f32,
        scale_x: f32,
        scale_y: f32,
        width: f32,
        height: f32,
    ) -> Self {
        let mut region = Self {
            name: name.into(),
            path: path.into(),
            x,
            y,
            rotation,
            scale_x,
            scale_y,
            width,
            height,
            color: Color::WHITE,
            offset: [0.0; 8],
        };
        region.update_offset();
        region
    }

    /// Recompute the corner offsets from position, rotation, scale, and size
    fn update_offset(&mut self) {
        let local_x = -self.width / 2.0 * self.scale_x;
        let local_y = -self.height / 2.0 * self.scale_y;
        let local_x2 = -local_x;
        let local_y2 = -local_y;
        let cos = cos_deg(self.rotation);
        let sin = sin_deg(self.rotation);

        let fx = |x: f32, y: f32| x * cos - y * sin + self.x;
        let fy = |x: f32, y: f32| x * sin + y * cos + self.y;

        self.offset = [
            fx(local_x, local_y),
            fy(local_x, local_y),
            fx(local_x2, local_y),
            fy(local_x2, local_y),
            fx(local_x2, local_y2),
            fy(local_x2, local_y2),
            fx(local_x, local_y2),
            fy(local_x, local_y2),
        ];
    }

    /// Write the four world-space corners (8 floats) to `out` at `offset`,
    /// advancing `stride` floats per corner
    pub fn compute_world_vertices(&self, bone: &Bone, out: &mut [f32], offset: usize, stride: usize) {
        let (x, y) = (bone.world_x, bone.world_y);
        let (a, b, c, d) = (bone.a, bone.b, bone.c, bone.d);
        let mut w = offset;
        for corner in 0..4 {
            let ox = self.offset[corner * 2];
            let oy = self.offset[corner * 2 + 1];
            out[w] = ox * a + oy * b + x;
            out[w + 1] = ox * c + oy * d + y;
            w += stride;
        }
    }
}

/// A deformable triangle mesh
#[derive(Debug, Clone)]
pub struct MeshAttachment {
    pub name: Arc<str>,
    /// Texture region name resolved by the excluded atlas layer
    pub path: Arc<str>,
    pub vertices: VertexSource,
    /// Texture coordinates, one u,v pair per vertex
    pub uvs: Vec<f32>,
    /// Triangle list indexing vertices
    pub triangles: Vec<u16>,
    pub color: Color,
    /// Number of vertex floats that make up the polygon hull
    pub hull_length: usize,
}

/// A polygon used for hit detection, not rendered
#[derive(Debug, Clone)]
pub struct BoundingBoxAttachment {
    pub name: Arc<str>,
    pub vertices: VertexSource,
}

/// A polygon that clips the rendering of following slots
#[derive(Debug, Clone)]
pub struct ClippingAttachment {
    pub name: Arc<str>,
    pub vertices: VertexSource,
    /// Slot index where clipping ends, or `None` to clip to the end of the
    /// draw order
    pub end_slot: Option<usize>,
}

/// A cubic Bezier spline that path constraints follow
#[derive(Debug, Clone)]
pub struct PathAttachment {
    pub name: Arc<str>,
    pub vertices: VertexSource,
    /// Authored length of the path up to and including each curve
    pub lengths: Vec<f32>,
    pub closed: bool,
    /// When true, path constraints use constant-speed (arc length)
    /// parameterization instead of the curves' natural parameterization
    pub constant_speed: bool,
}

/// A single oriented point, used by hosts for spawn locations and effects
#[derive(Debug, Clone)]
pub struct PointAttachment {
    pub name: Arc<str>,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

impl PointAttachment {
    /// World-space position of the point
    pub fn compute_world_position(&self, bone: &Bone) -> Vec2 {
        bone.local_to_world(Vec2::new(self.x, self.y))
    }

    /// World-space rotation of the point, in degrees
    pub fn compute_world_rotation(&self, bone: &Bone) -> f32 {
        let cos = cos_deg(self.rotation);
        let sin = sin_deg(self.rotation);
        let x = cos * bone.a + sin * bone.b;
        let y = cos * bone.c + sin * bone.d;
        y.atan2(x) * RAD_DEG
    }
}

/// A renderable or functional piece of geometry bound into a slot
#[derive(Debug, Clone)]
pub enum Attachment {
    Region(Arc<RegionAttachment>),
    Mesh(Arc<MeshAttachment>),
    BoundingBox(Arc<BoundingBoxAttachment>),
    Clipping(Arc<ClippingAttachment>),
    Path(Arc<PathAttachment>),
    Point(Arc<PointAttachment>),
}

impl Attachment {
    /// Attachment name
    pub fn name(&self) -> &Arc<str> {
        match self {
            Self::Region(a) => &a.name,
            Self::Mesh(a) => &a.name,
            Self::BoundingBox(a) => &a.name,
            Self::Clipping(a) => &a.name,
            Self::Path(a) => &a.name,
            Self::Point(a) => &a.name,
        }
    }

    /// Vertex template for variants that have one
    pub fn vertex_source(&self) -> Option<&VertexSource> {
        match self {
            Self::Mesh(a) => Some(&a.vertices),
            Self::BoundingBox(a) => Some(&a.vertices),
            Self::Clipping(a) => Some(&a.vertices),
            Self::Path(a) => Some(&a.vertices),
            Self::Region(_) | Self::Point(_) => None,
        }
    }

    /// True when both values share the same underlying template
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Region(a), Self::Region(b)) => Arc::ptr_eq(a, b),
            (Self::Mesh(a), Self::Mesh(b)) => Arc::ptr_eq(a, b),
            (Self::BoundingBox(a), Self::BoundingBox(b)) => Arc::ptr_eq(a, b),
            (Self::Clipping(a), Self::Clipping(b)) => Arc::ptr_eq(a, b),
            (Self::Path(a), Self::Path(b)) => Arc::ptr_eq(a, b),
            (Self::Point(a), Self::Point(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{BoneData, SkeletonPose, SlotData};

    fn posed_bone(x: f32, y: f32, rotation: f32) -> Bone {
        let mut bone = Bone::new(Arc::new(BoneData::new(0, "b", None)));
        let pose = SkeletonPose {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        };
        bone.update_world_transform_with(None, &pose, x, y, rotation, 1.0, 1.0, 0.0, 0.0);
        bone
    }

    fn slot() -> Slot {
        Slot::new(Arc::new(SlotData::new(0, "s", 0)))
    }

    #[test]
    fn test_unweighted_world_vertices_translate() {
        let source = VertexSource::unweighted(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let bones = vec![posed_bone(10.0, 20.0, 0.0)];
        let slot = slot();
        let mut out = [0.0; 6];
        source.compute_world_vertices(&bones, &slot, 0, 6, &mut out, 0, 2);
        assert!((out[0] - 10.0).abs() < 0.0001);
        assert!((out[1] - 20.0).abs() < 0.0001);
        assert!((out[2] - 11.0).abs() < 0.0001);
        assert!((out[5] - 21.0).abs() < 0.0001);
    }

    #[test]
    fn test_deform_replaces_unweighted_vertices() {
        let source = VertexSource::unweighted(vec![0.0, 0.0]);
        let bones = vec![posed_bone(0.0, 0.0, 0.0)];
        let mut slot = slot();
        slot.deform = vec![5.0, 7.0];
        let mut out = [0.0; 2];
        source.compute_world_vertices(&bones, &slot, 0, 2, &mut out, 0, 2);
        assert!((out[0] - 5.0).abs() < 0.0001);
        assert!((out[1] - 7.0).abs() < 0.0001);
    }

    #[test]
    fn test_weighted_world_vertices_blend() {
        // One vertex weighted half and half between two bones one unit apart.
        let vertices = vec![0.0, 0.0, 0.5, 0.0, 0.0, 0.5];
        let bone_runs = vec![2, 0, 1];
        let source = VertexSource::weighted(vertices, bone_runs, 2);
        let bones = vec![posed_bone(0.0, 0.0, 0.0), posed_bone(2.0, 0.0, 0.0)];
        let slot = slot();
        let mut out = [0.0; 2];
        source.compute_world_vertices(&bones, &slot, 0, 2, &mut out, 0, 2);
        assert!((out[0] - 1.0).abs() < 0.0001);
        assert!(out[1].abs() < 0.0001);
    }

    #[test]
    fn test_region_corners() {
        let region = RegionAttachment::new("r", "r", 0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 4.0);
        let bone = posed_bone(0.0, 0.0, 0.0);
        let mut out = [0.0; 8];
        region.compute_world_vertices(&bone, &mut out, 0, 2);
        // Corners span the attachment size around the bone origin.
        assert!((out[0] - -1.0).abs() < 0.0001);
        assert!((out[1] - -2.0).abs() < 0.0001);
        assert!((out[4] - 1.0).abs() < 0.0001);
        assert!((out[5] - 2.0).abs() < 0.0001);
    }

    #[test]
    fn test_point_world_rotation() {
        let point = PointAttachment {
            name: "p".into(),
            x: 0.0,
            y: 0.0,
            rotation: 30.0,
        };
        let bone = posed_bone(0.0, 0.0, 60.0);
        let rotation = point.compute_world_rotation(&bone);
        assert!((rotation - 90.0).abs() < 0.01);
    }
}
