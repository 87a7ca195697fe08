//! Path constraint: positions a chain of bones along a path attachment
//!
//! The target slot's path attachment is sampled in world space. Positions
//! along the spline come either from its natural parameterization or, when
//! the attachment requests constant speed, from an arc-length table built
//! by flattening each cubic segment; per-curve tables are cached while
//! consecutive spaces stay on the same curve.

use std::sync::Arc;

use crate::attachment::{Attachment, PathAttachment};
use crate::math::DEG_RAD;
use crate::skeleton::Skeleton;

const EPSILON: f32 = 0.00001;
const NONE: i32 = -1;
const BEFORE: i32 = -2;
const AFTER: i32 = -3;

/// How the constraint's `position` value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionMode {
    /// Position is a distance along the path
    Fixed,
    /// Position is a percentage of the path's length
    #[default]
    Percent,
}

/// How the space between constrained bones is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpacingMode {
    /// Spacing is added to each bone's length
    #[default]
    Length,
    /// Spacing is a fixed distance between bones
    Fixed,
    /// Spacing is a percentage of the path's length
    Percent,
    /// Bones share the path's length proportionally to their own lengths
    Proportional,
}

/// How the constrained bones are rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotateMode {
    /// Each bone points along the path tangent at its position
    #[default]
    Tangent,
    /// Each bone points at the next bone's position
    Chain,
    /// Like Chain, and bones are scaled to fill the space to the next bone
    ChainScale,
}

/// Immutable configuration of a path constraint
#[derive(Debug, Clone)]
pub struct PathConstraintData {
    pub name: Arc<str>,
    /// Position in the skeleton's global constraint application order
    pub order: usize,
    pub skin_required: bool,
    /// Constrained bone indices, ordered along the chain
    pub bones: Vec<usize>,
    /// Target slot index whose attachment must be a path
    pub target: usize,
    pub position_mode: PositionMode,
    pub spacing_mode: SpacingMode,
    pub rotate_mode: RotateMode,
    pub offset_rotation: f32,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
}

impl PathConstraintData {
    pub fn new(name: impl Into<Arc<str>>, bones: Vec<usize>, target: usize) -> Self {
        Self {
            name: name.into(),
            order: 0,
            skin_required: false,
            bones,
            target,
            position_mode: PositionMode::Percent,
            spacing_mode: SpacingMode::Length,
            rotate_mode: RotateMode::Tangent,
            offset_rotation: 0.0,
            position: 0.0,
            spacing: 0.0,
            mix_rotate: 1.0,
            mix_x: 1.0,
            mix_y: 1.0,
        }
    }
}

/// A live path constraint with animatable values and sampling scratch
#[derive(Debug, Clone)]
pub struct PathConstraint {
    pub data: Arc<PathConstraintData>,
    pub position: f32,
    pub spacing: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub active: bool,

    spaces: Vec<f32>,
    positions: Vec<f32>,
    world: Vec<f32>,
    curves: Vec<f32>,
    lengths: Vec<f32>,
    segments: [f32; 10],
}

impl PathConstraint {
    pub fn new(data: Arc<PathConstraintData>) -> Self {
        Self {
            position: data.position,
            spacing: data.spacing,
            mix_rotate: data.mix_rotate,
            mix_x: data.mix_x,
            mix_y: data.mix_y,
            active: true,
            spaces: Vec::new(),
            positions: Vec::new(),
            world: Vec::new(),
            curves: Vec::new(),
            lengths: Vec::new(),
            segments: [0.0; 10],
            data,
        }
    }

    /// Reset animatable values to the configured setup values
    pub fn set_to_setup_pose(&mut self) {
        self.position = self.data.position;
        self.spacing = self.data.spacing;
        self.mix_rotate = self.data.mix_rotate;
        self.mix_x = self.data.mix_x;
        self.mix_y = self.data.mix_y;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Apply the constraint at `index` to the skeleton's current pose
pub(crate) fn apply(skeleton: &mut Skeleton, index: usize) {
    let constraint = &skeleton.path_constraints[index];
    let mix_rotate = constraint.mix_rotate;
    let mix_x = constraint.mix_x;
    let mix_y = constraint.mix_y;
    if mix_rotate == 0.0 && mix_x == 0.0 && mix_y == 0.0 {
        return;
    }
    let data = constraint.data.clone();
    let position = constraint.position;
    let spacing = constraint.spacing;

    let Some(Attachment::Path(path)) = skeleton.slots[data.target].attachment.clone() else {
        return;
    };
    if !path.constant_speed && path.lengths.is_empty() {
        return;
    }

    let tangents = data.rotate_mode == RotateMode::Tangent;
    let scale = data.rotate_mode == RotateMode::ChainScale;
    let bone_count = data.bones.len();
    if bone_count == 0 {
        return;
    }
    let spaces_count = if tangents { bone_count } else { bone_count + 1 };

    // Scratch buffers move out of the constraint while bones are mutated.
    let mut spaces = std::mem::take(&mut skeleton.path_constraints[index].spaces);
    let mut positions = std::mem::take(&mut skeleton.path_constraints[index].positions);
    let mut world = std::mem::take(&mut skeleton.path_constraints[index].world);
    let mut curves = std::mem::take(&mut skeleton.path_constraints[index].curves);
    let mut lengths = std::mem::take(&mut skeleton.path_constraints[index].lengths);
    let mut segments = skeleton.path_constraints[index].segments;

    spaces.clear();
    spaces.resize(spaces_count, 0.0);
    lengths.clear();
    if scale {
        lengths.resize(bone_count, 0.0);
    }

    match data.spacing_mode {
        SpacingMode::Percent => {
            if scale {
                for i in 0..spaces_count - 1 {
                    let bone = &skeleton.bones[data.bones[i]];
                    let setup_length = bone.data.length;
                    let x = setup_length * bone.a;
                    let y = setup_length * bone.c;
                    lengths[i] = (x * x + y * y).sqrt();
                }
            }
            for space in spaces.iter_mut().skip(1) {
                *space = spacing;
            }
        }
        SpacingMode::Proportional => {
            let mut sum = 0.0;
            let mut i = 0;
            while i < spaces_count - 1 {
                let bone = &skeleton.bones[data.bones[i]];
                let setup_length = bone.data.length;
                if setup_length < EPSILON {
                    if scale {
                        lengths[i] = 0.0;
                    }
                    i += 1;
                    spaces[i] = spacing;
                } else {
                    let x = setup_length * bone.a;
                    let y = setup_length * bone.c;
                    let length = (x * x + y * y).sqrt();
                    if scale {
                        lengths[i] = length;
                    }
                    i += 1;
                    spaces[i] = length;
                    sum += length;
                }
            }
            if sum > 0.0 {
                let scale_factor = spaces_count as f32 / sum * spacing;
                for space in spaces.iter_mut().skip(1) {
                    *space *= scale_factor;
                }
            }
        }
        SpacingMode::Length | SpacingMode::Fixed => {
            let length_spacing = data.spacing_mode == SpacingMode::Length;
            let mut i = 0;
            while i < spaces_count - 1 {
                let bone = &skeleton.bones[data.bones[i]];
                let setup_length = bone.data.length;
                if setup_length < EPSILON {
                    if scale {
                        lengths[i] = 0.0;
                    }
                    i += 1;
                    spaces[i] = spacing;
                } else {
                    let x = setup_length * bone.a;
                    let y = setup_length * bone.c;
                    let length = (x * x + y * y).sqrt();
                    if scale {
                        lengths[i] = length;
                    }
                    i += 1;
                    spaces[i] = if length_spacing {
                        (setup_length + spacing) * length / setup_length
                    } else {
                        spacing * length / setup_length
                    };
                }
            }
        }
    }

    compute_world_positions(
        skeleton,
        data.target,
        &path,
        &spaces,
        tangents,
        data.position_mode,
        data.spacing_mode,
        position,
        &mut positions,
        &mut world,
        &mut curves,
        &mut segments,
    );

    // Position, scale, and rotate the chain along the sampled positions.
    let mut bone_x = positions[0];
    let mut bone_y = positions[1];
    let mut offset_rotation = data.offset_rotation;
    let tip;
    if offset_rotation == 0.0 {
        tip = data.rotate_mode == RotateMode::Chain;
    } else {
        tip = false;
        let p = &skeleton.bones[skeleton.slots[data.target].bone];
        offset_rotation *= if p.a * p.d - p.b * p.c > 0.0 {
            DEG_RAD
        } else {
            -DEG_RAD
        };
    }

    for i in 0..bone_count {
        let p = 3 + i * 3;
        let bone_index = data.bones[i];
        {
            let bone = &mut skeleton.bones[bone_index];
            bone.world_x += (bone_x - bone.world_x) * mix_x;
            bone.world_y += (bone_y - bone.world_y) * mix_y;
        }
        let x = positions[p];
        let y = positions[p + 1];
        let dx = x - bone_x;
        let dy = y - bone_y;
        if scale {
            let length = lengths[i];
            if length != 0.0 {
                let s = ((dx * dx + dy * dy).sqrt() / length - 1.0) * mix_rotate + 1.0;
                let bone = &mut skeleton.bones[bone_index];
                bone.a *= s;
                bone.c *= s;
            }
        }
        bone_x = x;
        bone_y = y;
        if mix_rotate > 0.0 {
            use std::f32::consts::PI;
            let bone = &mut skeleton.bones[bone_index];
            let (a, b, c, d) = (bone.a, bone.b, bone.c, bone.d);
            let mut r = if tangents {
                positions[p - 1]
            } else if spaces[i + 1] == 0.0 {
                positions[p + 2]
            } else {
                dy.atan2(dx)
            };
            r -= c.atan2(a);
            let (mut cos, mut sin);
            if tip {
                cos = r.cos();
                sin = r.sin();
                let length = bone.data.length;
                bone_x += (length * (cos * a - sin * c) - dx) * mix_rotate;
                bone_y += (length * (sin * a + cos * c) - dy) * mix_rotate;
            } else {
                r += offset_rotation;
            }
            if r > PI {
                r -= PI * 2.0;
            } else if r < -PI {
                r += PI * 2.0;
            }
            r *= mix_rotate;
            cos = r.cos();
            sin = r.sin();
            bone.a = cos * a - sin * c;
            bone.b = cos * b - sin * d;
            bone.c = sin * a + cos * c;
            bone.d = sin * b + cos * d;
        }
        skeleton.update_applied(bone_index);
    }

    let constraint = &mut skeleton.path_constraints[index];
    constraint.spaces = spaces;
    constraint.positions = positions;
    constraint.world = world;
    constraint.curves = curves;
    constraint.lengths = lengths;
    constraint.segments = segments;
}

/// Sample world-space positions (x, y, tangent-angle triples) along the
/// path for each space, writing `spaces.len() * 3 + 2` floats
#[allow(clippy::too_many_arguments)]
fn compute_world_positions(
    skeleton: &Skeleton,
    slot_index: usize,
    path: &PathAttachment,
    spaces: &[f32],
    tangents: bool,
    position_mode: PositionMode,
    spacing_mode: SpacingMode,
    mut position: f32,
    out: &mut Vec<f32>,
    world: &mut Vec<f32>,
    curves: &mut Vec<f32>,
    segments: &mut [f32; 10],
) {
    let slot = &skeleton.slots[slot_index];
    let spaces_count = spaces.len();
    out.clear();
    out.resize(spaces_count * 3 + 2, 0.0);
    let closed = path.closed;
    let mut vertices_length = path.vertices.world_vertices_length;
    let mut curve_count = vertices_length / 6;
    let mut prev_curve = NONE;

    if !path.constant_speed {
        let authored = &path.lengths;
        curve_count -= if closed { 1 } else { 2 };
        let path_length = authored[curve_count];
        if position_mode == PositionMode::Percent {
            position *= path_length;
        }
        let multiplier = match spacing_mode {
            SpacingMode::Percent => path_length,
            SpacingMode::Proportional => path_length / spaces_count as f32,
            _ => 1.0,
        };

        world.clear();
        world.resize(8, 0.0);
        let mut curve = 0;
        for (i, space) in spaces.iter().enumerate() {
            let o = i * 3;
            position += space * multiplier;
            let mut p = position;

            if closed {
                p %= path_length;
                if p < 0.0 {
                    p += path_length;
                }
                curve = 0;
            } else if p < 0.0 {
                if prev_curve != BEFORE {
                    prev_curve = BEFORE;
                    path.vertices
                        .compute_world_vertices(&skeleton.bones, slot, 2, 4, world, 0, 2);
                }
                add_before_position(p, world, 0, out, o);
                continue;
            } else if p > path_length {
                if prev_curve != AFTER {
                    prev_curve = AFTER;
                    path.vertices.compute_world_vertices(
                        &skeleton.bones,
                        slot,
                        vertices_length - 6,
                        4,
                        world,
                        0,
                        2,
                    );
                }
                add_after_position(p - path_length, world, 0, out, o);
                continue;
            }

            // Determine the curve containing the position.
            loop {
                let length = authored[curve];
                if p > length {
                    curve += 1;
                    continue;
                }
                if curve == 0 {
                    p /= length;
                } else {
                    let prev = authored[curve - 1];
                    p = (p - prev) / (length - prev);
                }
                break;
            }
            if curve as i32 != prev_curve {
                prev_curve = curve as i32;
                if closed && curve == curve_count {
                    path.vertices.compute_world_vertices(
                        &skeleton.bones,
                        slot,
                        vertices_length - 4,
                        4,
                        world,
                        0,
                        2,
                    );
                    path.vertices
                        .compute_world_vertices(&skeleton.bones, slot, 0, 4, world, 4, 2);
                } else {
                    path.vertices.compute_world_vertices(
                        &skeleton.bones,
                        slot,
                        curve * 6 + 2,
                        8,
                        world,
                        0,
                        2,
                    );
                }
            }
            add_curve_position(
                p,
                world[0],
                world[1],
                world[2],
                world[3],
                world[4],
                world[5],
                world[6],
                world[7],
                out,
                o,
                tangents || (i > 0 && *space == 0.0),
            );
        }
        return;
    }

    // Constant speed: flatten the spline and build arc-length tables.
    if closed {
        vertices_length += 2;
        world.clear();
        world.resize(vertices_length, 0.0);
        path.vertices.compute_world_vertices(
            &skeleton.bones,
            slot,
            2,
            vertices_length - 4,
            world,
            0,
            2,
        );
        path.vertices
            .compute_world_vertices(&skeleton.bones, slot, 0, 2, world, vertices_length - 4, 2);
        world[vertices_length - 2] = world[0];
        world[vertices_length - 1] = world[1];
    } else {
        curve_count -= 1;
        vertices_length -= 4;
        world.clear();
        world.resize(vertices_length, 0.0);
        path.vertices
            .compute_world_vertices(&skeleton.bones, slot, 2, vertices_length, world, 0, 2);
    }

    curves.clear();
    curves.resize(curve_count, 0.0);
    let mut path_length = 0.0;
    let mut x1 = world[0];
    let mut y1 = world[1];
    let (mut cx1, mut cy1, mut cx2, mut cy2, mut x2, mut y2);

    let mut w = 2;
    for curve in curves.iter_mut() {
        cx1 = world[w];
        cy1 = world[w + 1];
        cx2 = world[w + 2];
        cy2 = world[w + 3];
        x2 = world[w + 4];
        y2 = world[w + 5];
        let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.1875;
        let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.1875;
        let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.09375;
        let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.09375;
        let mut ddfx = tmpx * 2.0 + dddfx;
        let mut ddfy = tmpy * 2.0 + dddfy;
        let mut dfx = (cx1 - x1) * 0.75 + tmpx + dddfx * 0.16666667;
        let mut dfy = (cy1 - y1) * 0.75 + tmpy + dddfy * 0.16666667;
        path_length += (dfx * dfx + dfy * dfy).sqrt();
        dfx += ddfx;
        dfy += ddfy;
        ddfx += dddfx;
        ddfy += dddfy;
        path_length += (dfx * dfx + dfy * dfy).sqrt();
        dfx += ddfx;
        dfy += ddfy;
        path_length += (dfx * dfx + dfy * dfy).sqrt();
        dfx += ddfx + dddfx;
        dfy += ddfy + dddfy;
        path_length += (dfx * dfx + dfy * dfy).sqrt();
        *curve = path_length;
        x1 = x2;
        y1 = y2;
        w += 6;
    }

    if position_mode == PositionMode::Percent {
        position *= path_length;
    }
    let multiplier = match spacing_mode {
        SpacingMode::Percent => path_length,
        SpacingMode::Proportional => path_length / spaces_count as f32,
        _ => 1.0,
    };

    let mut curve_length = 0.0;
    let mut curve = 0;
    let mut segment = 0;
    x1 = 0.0;
    y1 = 0.0;
    cx1 = 0.0;
    cy1 = 0.0;
    cx2 = 0.0;
    cy2 = 0.0;
    x2 = 0.0;
    y2 = 0.0;
    for (i, space) in spaces.iter().enumerate() {
        let o = i * 3;
        position += space * multiplier;
        let mut p = position;

        if closed {
            p %= path_length;
            if p < 0.0 {
                p += path_length;
            }
            curve = 0;
        } else if p < 0.0 {
            add_before_position(p, world, 0, out, o);
            continue;
        } else if p > path_length {
            add_after_position(p - path_length, world, vertices_length - 4, out, o);
            continue;
        }

        // Determine the curve containing the position.
        loop {
            let length = curves[curve];
            if p > length {
                curve += 1;
                continue;
            }
            if curve == 0 {
                p /= length;
            } else {
                let prev = curves[curve - 1];
                p = (p - prev) / (length - prev);
            }
            break;
        }

        // Segment lengths within the curve, cached while the curve repeats.
        if curve as i32 != prev_curve {
            prev_curve = curve as i32;
            let mut ii = curve * 6;
            x1 = world[ii];
            y1 = world[ii + 1];
            cx1 = world[ii + 2];
            cy1 = world[ii + 3];
            cx2 = world[ii + 4];
            cy2 = world[ii + 5];
            x2 = world[ii + 6];
            y2 = world[ii + 7];
            let tmpx = (x1 - cx1 * 2.0 + cx2) * 0.03;
            let tmpy = (y1 - cy1 * 2.0 + cy2) * 0.03;
            let dddfx = ((cx1 - cx2) * 3.0 - x1 + x2) * 0.006;
            let dddfy = ((cy1 - cy2) * 3.0 - y1 + y2) * 0.006;
            let mut ddfx = tmpx * 2.0 + dddfx;
            let mut ddfy = tmpy * 2.0 + dddfy;
            let mut dfx = (cx1 - x1) * 0.3 + tmpx + dddfx * 0.16666667;
            let mut dfy = (cy1 - y1) * 0.3 + tmpy + dddfy * 0.16666667;
            curve_length = (dfx * dfx + dfy * dfy).sqrt();
            segments[0] = curve_length;
            ii = 1;
            while ii < 8 {
                dfx += ddfx;
                dfy += ddfy;
                ddfx += dddfx;
                ddfy += dddfy;
                curve_length += (dfx * dfx + dfy * dfy).sqrt();
                segments[ii] = curve_length;
                ii += 1;
            }
            dfx += ddfx;
            dfy += ddfy;
            curve_length += (dfx * dfx + dfy * dfy).sqrt();
            segments[8] = curve_length;
            dfx += ddfx + dddfx;
            dfy += ddfy + dddfy;
            curve_length += (dfx * dfx + dfy * dfy).sqrt();
            segments[9] = curve_length;
            segment = 0;
        }

        // Weight by segment length.
        p *= curve_length;
        loop {
            let length = segments[segment];
            if p > length {
                segment += 1;
                continue;
            }
            if segment == 0 {
                p /= length;
            } else {
                let prev = segments[segment - 1];
                p = segment as f32 + (p - prev) / (length - prev);
            }
            break;
        }
        add_curve_position(
            p * 0.1,
            x1,
            y1,
            cx1,
            cy1,
            cx2,
            cy2,
            x2,
            y2,
            out,
            o,
            tangents || (i > 0 && *space == 0.0),
        );
    }
}

fn add_before_position(p: f32, temp: &[f32], i: usize, out: &mut [f32], o: usize) {
    let x1 = temp[i];
    let y1 = temp[i + 1];
    let dx = temp[i + 2] - x1;
    let dy = temp[i + 3] - y1;
    let r = dy.atan2(dx);
    out[o] = x1 + p * r.cos();
    out[o + 1] = y1 + p * r.sin();
    out[o + 2] = r;
}

fn add_after_position(p: f32, temp: &[f32], i: usize, out: &mut [f32], o: usize) {
    let x1 = temp[i + 2];
    let y1 = temp[i + 3];
    let dx = x1 - temp[i];
    let dy = y1 - temp[i + 1];
    let r = dy.atan2(dx);
    out[o] = x1 + p * r.cos();
    out[o + 1] = y1 + p * r.sin();
    out[o + 2] = r;
}

#[allow(clippy::too_many_arguments)]
fn add_curve_position(
    p: f32,
    x1: f32,
    y1: f32,
    cx1: f32,
    cy1: f32,
    cx2: f32,
    cy2: f32,
    x2: f32,
    y2: f32,
    out: &mut [f32],
    o: usize,
    tangents: bool,
) {
    if p == 0.0 || p.is_nan() {
        out[o] = x1;
        out[o + 1] = y1;
        out[o + 2] = (cy1 - y1).atan2(cx1 - x1);
        return;
    }
    let tt = p * p;
    let ttt = tt * p;
    let u = 1.0 - p;
    let uu = u * u;
    let uuu = uu * u;
    let ut = u * p;
    let ut3 = ut * 3.0;
    let uut3 = u * ut3;
    let utt3 = ut3 * p;
    let x = x1 * uuu + cx1 * uut3 + cx2 * utt3 + x2 * ttt;
    let y = y1 * uuu + cy1 * uut3 + cy2 * utt3 + y2 * ttt;
    out[o] = x;
    out[o + 1] = y;
    if tangents {
        if p < 0.001 {
            out[o + 2] = (cy1 - y1).atan2(cx1 - x1);
        } else {
            out[o + 2] = (y - (y1 * uu + cy1 * ut * 2.0 + cy2 * tt))
                .atan2(x - (x1 * uu + cx1 * ut * 2.0 + cx2 * tt));
        }
    }
}
