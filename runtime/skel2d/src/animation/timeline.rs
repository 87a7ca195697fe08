//! Timelines: keyframe curves applied to skeleton properties
//!
//! A timeline is a closed enum over its target kind. Bone value timelines
//! store offsets from the setup pose (scale stores absolute values, since
//! scale composes multiplicatively); how a sampled value combines with the
//! pose so far is chosen by [`MixBlend`]. Bezier keyframe curves are
//! sampled into a fixed polyline when the timeline is built, so evaluation
//! in the frame loop is a table walk.

use std::sync::Arc;

use crate::attachment::Attachment;
use crate::color::Color;
use crate::error::{Result, SkelError};
use crate::math::wrap_deg;
use crate::skeleton::{Skeleton, TargetCounts};

use super::event::Event;

/// How a timeline value composes with the pose applied so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixBlend {
    /// Blend from the setup pose toward the timeline value
    Setup,
    /// Like Replace, but properties the animation does not key blend
    /// toward the setup pose instead of keeping earlier track output
    First,
    /// Blend from the current pose toward the timeline value
    #[default]
    Replace,
    /// Add the timeline value on top of the current pose
    Add,
}

/// Whether an entry is fading in or out; a few timelines restore setup
/// state differently when mixing out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixDirection {
    In,
    Out,
}

/// Identifies the skeleton property a timeline writes, used to detect
/// overlapping timelines across mixing entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    Rotate(usize),
    Translate(usize),
    Scale(usize),
    Shear(usize),
    Color(usize),
    TwoColor(usize),
    Attachment(usize),
    Deform(usize),
    Event,
    DrawOrder,
    IkConstraint(usize),
    TransformConstraint(usize),
    PathPosition(usize),
    PathSpacing(usize),
    PathMix(usize),
}

const BEZIER_SAMPLES: usize = 9;

/// Per-keyframe interpolation to the next keyframe
#[derive(Debug, Clone, Default)]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    /// Cubic Bezier sampled to a polyline at construction; stores
    /// (time fraction, value fraction) pairs for the interior samples
    Bezier(Box<[f32; BEZIER_SAMPLES * 2]>),
}

impl Curve {
    /// Build a Bezier curve from control points in the unit square
    pub fn bezier(cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> Self {
        let mut samples = Box::new([0.0; BEZIER_SAMPLES * 2]);
        for i in 0..BEZIER_SAMPLES {
            let t = (i + 1) as f32 / (BEZIER_SAMPLES + 1) as f32;
            let u = 1.0 - t;
            let b1 = 3.0 * u * u * t;
            let b2 = 3.0 * u * t * t;
            let b3 = t * t * t;
            samples[i * 2] = b1 * cx1 + b2 * cx2 + b3;
            samples[i * 2 + 1] = b1 * cy1 + b2 * cy2 + b3;
        }
        Self::Bezier(samples)
    }

    /// Map a time fraction in [0, 1] to a value fraction
    pub fn percent(&self, t: f32) -> f32 {
        match self {
            Self::Linear => t,
            Self::Stepped => 0.0,
            Self::Bezier(samples) => {
                let mut prev_x = 0.0;
                let mut prev_y = 0.0;
                for i in 0..BEZIER_SAMPLES {
                    let x = samples[i * 2];
                    let y = samples[i * 2 + 1];
                    if x >= t {
                        if x - prev_x < 1e-6 {
                            return y;
                        }
                        return prev_y + (y - prev_y) * (t - prev_x) / (x - prev_x);
                    }
                    prev_x = x;
                    prev_y = y;
                }
                if 1.0 - prev_x < 1e-6 {
                    return 1.0;
                }
                prev_y + (1.0 - prev_y) * (t - prev_x) / (1.0 - prev_x)
            }
        }
    }
}

/// Keyframe with one value
#[derive(Debug, Clone)]
pub struct Frame1 {
    pub time: f32,
    pub value: f32,
    pub curve: Curve,
}

/// Keyframe with two values
#[derive(Debug, Clone)]
pub struct Frame2 {
    pub time: f32,
    pub value1: f32,
    pub value2: f32,
    pub curve: Curve,
}

/// Keyframe with an RGBA color
#[derive(Debug, Clone)]
pub struct ColorFrame {
    pub time: f32,
    pub color: Color,
    pub curve: Curve,
}

/// Keyframe with a light color and a dark (tint-black) color
#[derive(Debug, Clone)]
pub struct TwoColorFrame {
    pub time: f32,
    pub light: Color,
    pub dark: Color,
    pub curve: Curve,
}

/// Stepped keyframe naming the attachment to show, or `None` to clear
#[derive(Debug, Clone)]
pub struct AttachmentFrame {
    pub time: f32,
    pub attachment: Option<Arc<str>>,
}

/// Keyframe with per-vertex offsets from the attachment template
#[derive(Debug, Clone)]
pub struct DeformFrame {
    pub time: f32,
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

/// Stepped keyframe permuting the draw order, or `None` for setup order
#[derive(Debug, Clone)]
pub struct DrawOrderFrame {
    pub time: f32,
    /// `order[i]` is the slot index drawn at position `i`
    pub order: Option<Vec<usize>>,
}

/// Keyframe for an IK constraint's animatable values
#[derive(Debug, Clone)]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub softness: f32,
    pub bend_direction: i32,
    pub compress: bool,
    pub stretch: bool,
    pub curve: Curve,
}

/// Keyframe for a transform constraint's six mixes
#[derive(Debug, Clone)]
pub struct TransformFrame {
    pub time: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub mix_scale_x: f32,
    pub mix_scale_y: f32,
    pub mix_shear_y: f32,
    pub curve: Curve,
}

/// Keyframe for a path constraint's three mixes
#[derive(Debug, Clone)]
pub struct PathMixFrame {
    pub time: f32,
    pub mix_rotate: f32,
    pub mix_x: f32,
    pub mix_y: f32,
    pub curve: Curve,
}

/// A keyframed curve targeting one skeleton property
#[derive(Debug, Clone)]
pub enum Timeline {
    /// Bone rotation offset from setup, degrees
    Rotate { bone: usize, frames: Vec<Frame1> },
    /// Bone translation offset from setup
    Translate { bone: usize, frames: Vec<Frame2> },
    /// Absolute bone scale
    Scale { bone: usize, frames: Vec<Frame2> },
    /// Bone shear offset from setup, degrees
    Shear { bone: usize, frames: Vec<Frame2> },
    /// Slot color
    Color { slot: usize, frames: Vec<ColorFrame> },
    /// Slot color plus dark color for two-color tinting
    TwoColor { slot: usize, frames: Vec<TwoColorFrame> },
    /// Slot attachment by name
    Attachment {
        slot: usize,
        frames: Vec<AttachmentFrame>,
    },
    /// Per-vertex deform offsets for one vertex attachment
    Deform {
        slot: usize,
        attachment: Attachment,
        frames: Vec<DeformFrame>,
    },
    /// Fires events as time passes their keyframes
    Event { frames: Vec<Arc<Event>> },
    /// Permutes the skeleton draw order
    DrawOrder { frames: Vec<DrawOrderFrame> },
    /// IK constraint values
    IkConstraint { constraint: usize, frames: Vec<IkFrame> },
    /// Transform constraint mixes
    TransformConstraint {
        constraint: usize,
        frames: Vec<TransformFrame>,
    },
    /// Path constraint position
    PathPosition { constraint: usize, frames: Vec<Frame1> },
    /// Path constraint spacing
    PathSpacing { constraint: usize, frames: Vec<Frame1> },
    /// Path constraint mixes
    PathMix {
        constraint: usize,
        frames: Vec<PathMixFrame>,
    },
}

/// Index of the last frame at or before `time`; requires
/// `time >= times(0)` and a non-empty frame list
pub(crate) fn search<T>(frames: &[T], time: f32, frame_time: impl Fn(&T) -> f32) -> usize {
    let mut low = 0;
    let mut high = frames.len() - 1;
    while low < high {
        let mid = (low + high + 1) / 2;
        if frame_time(&frames[mid]) <= time {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}

/// Sample a one-value frame list; clamps past the last keyframe
pub(crate) fn value1(frames: &[Frame1], time: f32) -> f32 {
    let i = search(frames, time, |f| f.time);
    if i >= frames.len() - 1 {
        return frames[frames.len() - 1].value;
    }
    let f0 = &frames[i];
    let f1 = &frames[i + 1];
    let t = (time - f0.time) / (f1.time - f0.time);
    let p = f0.curve.percent(t.clamp(0.0, 1.0));
    f0.value + (f1.value - f0.value) * p
}

/// Sample a two-value frame list
fn value2(frames: &[Frame2], time: f32) -> (f32, f32) {
    let i = search(frames, time, |f| f.time);
    if i >= frames.len() - 1 {
        let last = &frames[frames.len() - 1];
        return (last.value1, last.value2);
    }
    let f0 = &frames[i];
    let f1 = &frames[i + 1];
    let t = (time - f0.time) / (f1.time - f0.time);
    let p = f0.curve.percent(t.clamp(0.0, 1.0));
    (
        f0.value1 + (f1.value1 - f0.value1) * p,
        f0.value2 + (f1.value2 - f0.value2) * p,
    )
}

impl Timeline {
    /// The property this timeline writes
    pub fn property_id(&self) -> PropertyId {
        match self {
            Self::Rotate { bone, .. } => PropertyId::Rotate(*bone),
            Self::Translate { bone, .. } => PropertyId::Translate(*bone),
            Self::Scale { bone, .. } => PropertyId::Scale(*bone),
            Self::Shear { bone, .. } => PropertyId::Shear(*bone),
            Self::Color { slot, .. } => PropertyId::Color(*slot),
            Self::TwoColor { slot, .. } => PropertyId::TwoColor(*slot),
            Self::Attachment { slot, .. } => PropertyId::Attachment(*slot),
            Self::Deform { slot, .. } => PropertyId::Deform(*slot),
            Self::Event { .. } => PropertyId::Event,
            Self::DrawOrder { .. } => PropertyId::DrawOrder,
            Self::IkConstraint { constraint, .. } => PropertyId::IkConstraint(*constraint),
            Self::TransformConstraint { constraint, .. } => {
                PropertyId::TransformConstraint(*constraint)
            }
            Self::PathPosition { constraint, .. } => PropertyId::PathPosition(*constraint),
            Self::PathSpacing { constraint, .. } => PropertyId::PathSpacing(*constraint),
            Self::PathMix { constraint, .. } => PropertyId::PathMix(*constraint),
        }
    }

    /// Time of the last keyframe
    pub fn duration(&self) -> f32 {
        macro_rules! last_time {
            ($frames:expr) => {
                $frames.last().map(|f| f.time).unwrap_or(0.0)
            };
        }
        match self {
            Self::Rotate { frames, .. } => last_time!(frames),
            Self::Translate { frames, .. } => last_time!(frames),
            Self::Scale { frames, .. } => last_time!(frames),
            Self::Shear { frames, .. } => last_time!(frames),
            Self::Color { frames, .. } => last_time!(frames),
            Self::TwoColor { frames, .. } => last_time!(frames),
            Self::Attachment { frames, .. } => last_time!(frames),
            Self::Deform { frames, .. } => last_time!(frames),
            Self::Event { frames } => frames.last().map(|e| e.time).unwrap_or(0.0),
            Self::DrawOrder { frames } => last_time!(frames),
            Self::IkConstraint { frames, .. } => last_time!(frames),
            Self::TransformConstraint { frames, .. } => last_time!(frames),
            Self::PathPosition { frames, .. } => last_time!(frames),
            Self::PathSpacing { frames, .. } => last_time!(frames),
            Self::PathMix { frames, .. } => last_time!(frames),
        }
    }

    /// Check keyframe monotonicity and target indices. Called once when
    /// skeleton data is built; the frame loop assumes validity.
    pub(crate) fn validate(&self, counts: &TargetCounts) -> Result<()> {
        fn monotonic<T>(frames: &[T], time: impl Fn(&T) -> f32) -> Result<()> {
            if frames.is_empty() {
                return Err(SkelError::TimelineError("timeline has no keyframes".into()));
            }
            for pair in frames.windows(2) {
                if time(&pair[1]) <= time(&pair[0]) {
                    return Err(SkelError::TimelineError(format!(
                        "keyframe times not strictly increasing: {} then {}",
                        time(&pair[0]),
                        time(&pair[1])
                    )));
                }
            }
            Ok(())
        }
        fn target(index: usize, count: usize, kind: &str) -> Result<()> {
            if index >= count {
                return Err(SkelError::ReferenceError(format!(
                    "timeline references {kind} {index} of {count}"
                )));
            }
            Ok(())
        }

        match self {
            Self::Rotate { bone, frames } => {
                target(*bone, counts.bones, "bone")?;
                monotonic(frames, |f| f.time)
            }
            Self::Translate { bone, frames } | Self::Scale { bone, frames } | Self::Shear { bone, frames } => {
                target(*bone, counts.bones, "bone")?;
                monotonic(frames, |f| f.time)
            }
            Self::Color { slot, frames } => {
                target(*slot, counts.slots, "slot")?;
                monotonic(frames, |f| f.time)
            }
            Self::TwoColor { slot, frames } => {
                target(*slot, counts.slots, "slot")?;
                monotonic(frames, |f| f.time)
            }
            Self::Attachment { slot, frames } => {
                target(*slot, counts.slots, "slot")?;
                monotonic(frames, |f| f.time)
            }
            Self::Deform { slot, frames, .. } => {
                target(*slot, counts.slots, "slot")?;
                monotonic(frames, |f| f.time)
            }
            Self::Event { frames } => {
                if frames.is_empty() {
                    return Err(SkelError::TimelineError("timeline has no keyframes".into()));
                }
                // Events at identical times are allowed; order must not
                // decrease.
                for pair in frames.windows(2) {
                    if pair[1].time < pair[0].time {
                        return Err(SkelError::TimelineError(
                            "event keyframe times decrease".into(),
                        ));
                    }
                }
                Ok(())
            }
            Self::DrawOrder { frames } => {
                for frame in frames {
                    if let Some(order) = &frame.order {
                        if order.len() != counts.slots
                            || order.iter().any(|&slot| slot >= counts.slots)
                        {
                            return Err(SkelError::ValidationError(
                                "draw order frame is not a permutation of slots".into(),
                            ));
                        }
                    }
                }
                monotonic(frames, |f| f.time)
            }
            Self::IkConstraint { constraint, frames } => {
                target(*constraint, counts.ik_constraints, "IK constraint")?;
                monotonic(frames, |f| f.time)
            }
            Self::TransformConstraint { constraint, frames } => {
                target(*constraint, counts.transform_constraints, "transform constraint")?;
                monotonic(frames, |f| f.time)
            }
            Self::PathPosition { constraint, frames } | Self::PathSpacing { constraint, frames } => {
                target(*constraint, counts.path_constraints, "path constraint")?;
                monotonic(frames, |f| f.time)
            }
            Self::PathMix { constraint, frames } => {
                target(*constraint, counts.path_constraints, "path constraint")?;
                monotonic(frames, |f| f.time)
            }
        }
    }

    /// Apply this timeline at `time`.
    ///
    /// `last_time` is the previously applied time, used only by event
    /// timelines to fire each key once. `alpha` is the blend weight,
    /// `blend` the composition rule, `direction` whether the owning entry
    /// is mixing in or out.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        mut events: Option<&mut Vec<Arc<Event>>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        let alpha = alpha.clamp(0.0, 1.0);
        match self {
            Self::Rotate { bone, frames } => {
                let bone = &mut skeleton.bones[*bone];
                if !bone.active {
                    return;
                }
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => bone.rotation = bone.data.rotation,
                        MixBlend::First => {
                            bone.rotation += (bone.data.rotation - bone.rotation) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let mut r = value1(frames, time);
                match blend {
                    MixBlend::Setup => bone.rotation = bone.data.rotation + r * alpha,
                    MixBlend::First | MixBlend::Replace => {
                        r += bone.data.rotation - bone.rotation;
                        bone.rotation += wrap_deg(r) * alpha;
                    }
                    MixBlend::Add => bone.rotation += r * alpha,
                }
            }
            Self::Translate { bone, frames } => {
                let bone = &mut skeleton.bones[*bone];
                if !bone.active {
                    return;
                }
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => {
                            bone.x = bone.data.x;
                            bone.y = bone.data.y;
                        }
                        MixBlend::First => {
                            bone.x += (bone.data.x - bone.x) * alpha;
                            bone.y += (bone.data.y - bone.y) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let (x, y) = value2(frames, time);
                match blend {
                    MixBlend::Setup => {
                        bone.x = bone.data.x + x * alpha;
                        bone.y = bone.data.y + y * alpha;
                    }
                    MixBlend::First | MixBlend::Replace => {
                        bone.x += (bone.data.x + x - bone.x) * alpha;
                        bone.y += (bone.data.y + y - bone.y) * alpha;
                    }
                    MixBlend::Add => {
                        bone.x += x * alpha;
                        bone.y += y * alpha;
                    }
                }
            }
            Self::Scale { bone, frames } => {
                let bone = &mut skeleton.bones[*bone];
                if !bone.active {
                    return;
                }
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => {
                            bone.scale_x = bone.data.scale_x;
                            bone.scale_y = bone.data.scale_y;
                        }
                        MixBlend::First => {
                            bone.scale_x += (bone.data.scale_x - bone.scale_x) * alpha;
                            bone.scale_y += (bone.data.scale_y - bone.scale_y) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let (x, y) = value2(frames, time);
                if alpha == 1.0 {
                    if blend == MixBlend::Add {
                        bone.scale_x += x - bone.data.scale_x;
                        bone.scale_y += y - bone.data.scale_y;
                    } else {
                        bone.scale_x = x;
                        bone.scale_y = y;
                    }
                } else {
                    // Mixing out uses the sign of the setup or current pose,
                    // else the sign of the key, so flips do not wobble.
                    use crate::math::signum0;
                    let (bx, by);
                    if direction == MixDirection::Out {
                        match blend {
                            MixBlend::Setup => {
                                bx = bone.data.scale_x;
                                by = bone.data.scale_y;
                                bone.scale_x = bx + (x.abs() * signum0(bx) - bx) * alpha;
                                bone.scale_y = by + (y.abs() * signum0(by) - by) * alpha;
                            }
                            MixBlend::First | MixBlend::Replace => {
                                bx = bone.scale_x;
                                by = bone.scale_y;
                                bone.scale_x = bx + (x.abs() * signum0(bx) - bx) * alpha;
                                bone.scale_y = by + (y.abs() * signum0(by) - by) * alpha;
                            }
                            MixBlend::Add => {
                                bone.scale_x += (x - bone.data.scale_x) * alpha;
                                bone.scale_y += (y - bone.data.scale_y) * alpha;
                            }
                        }
                    } else {
                        match blend {
                            MixBlend::Setup => {
                                bx = bone.data.scale_x.abs() * signum0(x);
                                by = bone.data.scale_y.abs() * signum0(y);
                                bone.scale_x = bx + (x - bx) * alpha;
                                bone.scale_y = by + (y - by) * alpha;
                            }
                            MixBlend::First | MixBlend::Replace => {
                                bx = bone.scale_x.abs() * signum0(x);
                                by = bone.scale_y.abs() * signum0(y);
                                bone.scale_x = bx + (x - bx) * alpha;
                                bone.scale_y = by + (y - by) * alpha;
                            }
                            MixBlend::Add => {
                                bone.scale_x += (x - bone.data.scale_x) * alpha;
                                bone.scale_y += (y - bone.data.scale_y) * alpha;
                            }
                        }
                    }
                }
            }
            Self::Shear { bone, frames } => {
                let bone = &mut skeleton.bones[*bone];
                if !bone.active {
                    return;
                }
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => {
                            bone.shear_x = bone.data.shear_x;
                            bone.shear_y = bone.data.shear_y;
                        }
                        MixBlend::First => {
                            bone.shear_x += (bone.data.shear_x - bone.shear_x) * alpha;
                            bone.shear_y += (bone.data.shear_y - bone.shear_y) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let (x, y) = value2(frames, time);
                match blend {
                    MixBlend::Setup => {
                        bone.shear_x = bone.data.shear_x + x * alpha;
                        bone.shear_y = bone.data.shear_y + y * alpha;
                    }
                    MixBlend::First | MixBlend::Replace => {
                        bone.shear_x += (bone.data.shear_x + x - bone.shear_x) * alpha;
                        bone.shear_y += (bone.data.shear_y + y - bone.shear_y) * alpha;
                    }
                    MixBlend::Add => {
                        bone.shear_x += x * alpha;
                        bone.shear_y += y * alpha;
                    }
                }
            }
            Self::Color { slot, frames } => {
                let slot_bone = skeleton.slots[*slot].bone;
                if !skeleton.bones[slot_bone].active {
                    return;
                }
                let slot = &mut skeleton.slots[*slot];
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => slot.color = slot.data.color,
                        MixBlend::First => {
                            let setup = slot.data.color;
                            slot.color.add(
                                (setup.r - slot.color.r) * alpha,
                                (setup.g - slot.color.g) * alpha,
                                (setup.b - slot.color.b) * alpha,
                                (setup.a - slot.color.a) * alpha,
                            );
                        }
                        _ => {}
                    }
                    return;
                }
                let i = search(frames, time, |f| f.time);
                let color = if i >= frames.len() - 1 {
                    frames[frames.len() - 1].color
                } else {
                    let f0 = &frames[i];
                    let f1 = &frames[i + 1];
                    let t = (time - f0.time) / (f1.time - f0.time);
                    let p = f0.curve.percent(t.clamp(0.0, 1.0));
                    use crate::math::Lerp;
                    f0.color.lerp(&f1.color, p)
                };
                if alpha == 1.0 {
                    slot.color = color;
                } else {
                    if blend == MixBlend::Setup {
                        slot.color = slot.data.color;
                    }
                    slot.color.add(
                        (color.r - slot.color.r) * alpha,
                        (color.g - slot.color.g) * alpha,
                        (color.b - slot.color.b) * alpha,
                        (color.a - slot.color.a) * alpha,
                    );
                }
            }
            Self::TwoColor { slot, frames } => {
                let slot_bone = skeleton.slots[*slot].bone;
                if !skeleton.bones[slot_bone].active {
                    return;
                }
                let slot = &mut skeleton.slots[*slot];
                let setup_dark = slot.data.dark_color.unwrap_or(Color::WHITE);
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => {
                            slot.color = slot.data.color;
                            slot.dark_color = slot.data.dark_color;
                        }
                        MixBlend::First => {
                            let setup = slot.data.color;
                            slot.color.add(
                                (setup.r - slot.color.r) * alpha,
                                (setup.g - slot.color.g) * alpha,
                                (setup.b - slot.color.b) * alpha,
                                (setup.a - slot.color.a) * alpha,
                            );
                            if let Some(dark) = &mut slot.dark_color {
                                dark.add(
                                    (setup_dark.r - dark.r) * alpha,
                                    (setup_dark.g - dark.g) * alpha,
                                    (setup_dark.b - dark.b) * alpha,
                                    0.0,
                                );
                            }
                        }
                        _ => {}
                    }
                    return;
                }
                let i = search(frames, time, |f| f.time);
                let (light, dark) = if i >= frames.len() - 1 {
                    let last = &frames[frames.len() - 1];
                    (last.light, last.dark)
                } else {
                    let f0 = &frames[i];
                    let f1 = &frames[i + 1];
                    let t = (time - f0.time) / (f1.time - f0.time);
                    let p = f0.curve.percent(t.clamp(0.0, 1.0));
                    use crate::math::Lerp;
                    (f0.light.lerp(&f1.light, p), f0.dark.lerp(&f1.dark, p))
                };
                if alpha == 1.0 {
                    slot.color = light;
                    slot.dark_color = Some(dark);
                } else {
                    if blend == MixBlend::Setup {
                        slot.color = slot.data.color;
                        slot.dark_color = slot.data.dark_color;
                    }
                    slot.color.add(
                        (light.r - slot.color.r) * alpha,
                        (light.g - slot.color.g) * alpha,
                        (light.b - slot.color.b) * alpha,
                        (light.a - slot.color.a) * alpha,
                    );
                    let current = slot.dark_color.unwrap_or(setup_dark);
                    let mut mixed = current;
                    mixed.add(
                        (dark.r - current.r) * alpha,
                        (dark.g - current.g) * alpha,
                        (dark.b - current.b) * alpha,
                        0.0,
                    );
                    slot.dark_color = Some(mixed);
                }
            }
            Self::Attachment { slot, frames } => {
                let slot_index = *slot;
                if !skeleton.bones[skeleton.slots[slot_index].bone].active {
                    return;
                }
                if direction == MixDirection::Out {
                    if blend == MixBlend::Setup {
                        set_setup_attachment(skeleton, slot_index);
                    }
                    return;
                }
                if time < frames[0].time {
                    if blend == MixBlend::Setup || blend == MixBlend::First {
                        set_setup_attachment(skeleton, slot_index);
                    }
                    return;
                }
                let i = search(frames, time, |f| f.time);
                let name = frames[i].attachment.clone();
                let attachment =
                    name.and_then(|name| skeleton.get_attachment(slot_index, &name));
                skeleton.slots[slot_index].set_attachment(attachment);
            }
            Self::Deform {
                slot,
                attachment,
                frames,
            } => {
                apply_deform(skeleton, *slot, attachment, frames, time, alpha, blend);
            }
            Self::Event { frames } => {
                let Some(events) = events.as_deref_mut() else {
                    return;
                };
                let mut last_time = last_time;
                if last_time > time {
                    // Looped around: fire the tail of the animation first.
                    self.apply(
                        skeleton,
                        last_time,
                        f32::MAX,
                        Some(&mut *events),
                        alpha,
                        blend,
                        direction,
                    );
                    last_time = -1.0;
                } else if last_time >= frames[frames.len() - 1].time {
                    return;
                }
                if time < frames[0].time {
                    return;
                }
                let mut i = if last_time < frames[0].time {
                    0
                } else {
                    let mut i = search(frames, last_time, |e| e.time) + 1;
                    let frame_time = frames[i.min(frames.len() - 1)].time;
                    // Fire multiple events with the same frame time.
                    while i > 0 {
                        if frames[i - 1].time != frame_time {
                            break;
                        }
                        i -= 1;
                    }
                    i
                };
                while i < frames.len() && time >= frames[i].time {
                    events.push(frames[i].clone());
                    i += 1;
                }
            }
            Self::DrawOrder { frames } => {
                if direction == MixDirection::Out {
                    if blend == MixBlend::Setup {
                        reset_draw_order(skeleton);
                    }
                    return;
                }
                if time < frames[0].time {
                    if blend == MixBlend::Setup || blend == MixBlend::First {
                        reset_draw_order(skeleton);
                    }
                    return;
                }
                let i = search(frames, time, |f| f.time);
                match &frames[i].order {
                    None => reset_draw_order(skeleton),
                    Some(order) => {
                        skeleton.draw_order.clear();
                        skeleton.draw_order.extend_from_slice(order);
                    }
                }
            }
            Self::IkConstraint { constraint, frames } => {
                let constraint = &mut skeleton.ik_constraints[*constraint];
                if !constraint.active {
                    return;
                }
                let data = constraint.data.clone();
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => {
                            constraint.mix = data.mix;
                            constraint.softness = data.softness;
                            constraint.bend_direction = data.bend_direction;
                            constraint.compress = data.compress;
                            constraint.stretch = data.stretch;
                        }
                        MixBlend::First => {
                            constraint.mix += (data.mix - constraint.mix) * alpha;
                            constraint.softness += (data.softness - constraint.softness) * alpha;
                            constraint.bend_direction = data.bend_direction;
                            constraint.compress = data.compress;
                            constraint.stretch = data.stretch;
                        }
                        _ => {}
                    }
                    return;
                }
                let i = search(frames, time, |f| f.time);
                let (mix, softness) = if i >= frames.len() - 1 {
                    let last = &frames[frames.len() - 1];
                    (last.mix, last.softness)
                } else {
                    let f0 = &frames[i];
                    let f1 = &frames[i + 1];
                    let t = (time - f0.time) / (f1.time - f0.time);
                    let p = f0.curve.percent(t.clamp(0.0, 1.0));
                    (
                        f0.mix + (f1.mix - f0.mix) * p,
                        f0.softness + (f1.softness - f0.softness) * p,
                    )
                };
                let frame = &frames[i];
                if blend == MixBlend::Setup {
                    constraint.mix = data.mix + (mix - data.mix) * alpha;
                    constraint.softness = data.softness + (softness - data.softness) * alpha;
                    if direction == MixDirection::Out {
                        constraint.bend_direction = data.bend_direction;
                        constraint.compress = data.compress;
                        constraint.stretch = data.stretch;
                    } else {
                        constraint.bend_direction = frame.bend_direction;
                        constraint.compress = frame.compress;
                        constraint.stretch = frame.stretch;
                    }
                } else {
                    constraint.mix += (mix - constraint.mix) * alpha;
                    constraint.softness += (softness - constraint.softness) * alpha;
                    if direction == MixDirection::In {
                        constraint.bend_direction = frame.bend_direction;
                        constraint.compress = frame.compress;
                        constraint.stretch = frame.stretch;
                    }
                }
            }
            Self::TransformConstraint { constraint, frames } => {
                let constraint = &mut skeleton.transform_constraints[*constraint];
                if !constraint.active {
                    return;
                }
                let data = constraint.data.clone();
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => {
                            constraint.mix_rotate = data.mix_rotate;
                            constraint.mix_x = data.mix_x;
                            constraint.mix_y = data.mix_y;
                            constraint.mix_scale_x = data.mix_scale_x;
                            constraint.mix_scale_y = data.mix_scale_y;
                            constraint.mix_shear_y = data.mix_shear_y;
                        }
                        MixBlend::First => {
                            constraint.mix_rotate +=
                                (data.mix_rotate - constraint.mix_rotate) * alpha;
                            constraint.mix_x += (data.mix_x - constraint.mix_x) * alpha;
                            constraint.mix_y += (data.mix_y - constraint.mix_y) * alpha;
                            constraint.mix_scale_x +=
                                (data.mix_scale_x - constraint.mix_scale_x) * alpha;
                            constraint.mix_scale_y +=
                                (data.mix_scale_y - constraint.mix_scale_y) * alpha;
                            constraint.mix_shear_y +=
                                (data.mix_shear_y - constraint.mix_shear_y) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let i = search(frames, time, |f| f.time);
                let values = if i >= frames.len() - 1 {
                    let f = &frames[frames.len() - 1];
                    [
                        f.mix_rotate,
                        f.mix_x,
                        f.mix_y,
                        f.mix_scale_x,
                        f.mix_scale_y,
                        f.mix_shear_y,
                    ]
                } else {
                    let f0 = &frames[i];
                    let f1 = &frames[i + 1];
                    let t = (time - f0.time) / (f1.time - f0.time);
                    let p = f0.curve.percent(t.clamp(0.0, 1.0));
                    [
                        f0.mix_rotate + (f1.mix_rotate - f0.mix_rotate) * p,
                        f0.mix_x + (f1.mix_x - f0.mix_x) * p,
                        f0.mix_y + (f1.mix_y - f0.mix_y) * p,
                        f0.mix_scale_x + (f1.mix_scale_x - f0.mix_scale_x) * p,
                        f0.mix_scale_y + (f1.mix_scale_y - f0.mix_scale_y) * p,
                        f0.mix_shear_y + (f1.mix_shear_y - f0.mix_shear_y) * p,
                    ]
                };
                if blend == MixBlend::Setup {
                    constraint.mix_rotate = data.mix_rotate + (values[0] - data.mix_rotate) * alpha;
                    constraint.mix_x = data.mix_x + (values[1] - data.mix_x) * alpha;
                    constraint.mix_y = data.mix_y + (values[2] - data.mix_y) * alpha;
                    constraint.mix_scale_x =
                        data.mix_scale_x + (values[3] - data.mix_scale_x) * alpha;
                    constraint.mix_scale_y =
                        data.mix_scale_y + (values[4] - data.mix_scale_y) * alpha;
                    constraint.mix_shear_y =
                        data.mix_shear_y + (values[5] - data.mix_shear_y) * alpha;
                } else {
                    constraint.mix_rotate += (values[0] - constraint.mix_rotate) * alpha;
                    constraint.mix_x += (values[1] - constraint.mix_x) * alpha;
                    constraint.mix_y += (values[2] - constraint.mix_y) * alpha;
                    constraint.mix_scale_x += (values[3] - constraint.mix_scale_x) * alpha;
                    constraint.mix_scale_y += (values[4] - constraint.mix_scale_y) * alpha;
                    constraint.mix_shear_y += (values[5] - constraint.mix_shear_y) * alpha;
                }
            }
            Self::PathPosition { constraint, frames } => {
                let constraint = &mut skeleton.path_constraints[*constraint];
                if !constraint.active {
                    return;
                }
                let data = constraint.data.clone();
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => constraint.position = data.position,
                        MixBlend::First => {
                            constraint.position += (data.position - constraint.position) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let position = value1(frames, time);
                if blend == MixBlend::Setup {
                    constraint.position = data.position + (position - data.position) * alpha;
                } else {
                    constraint.position += (position - constraint.position) * alpha;
                }
            }
            Self::PathSpacing { constraint, frames } => {
                let constraint = &mut skeleton.path_constraints[*constraint];
                if !constraint.active {
                    return;
                }
                let data = constraint.data.clone();
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => constraint.spacing = data.spacing,
                        MixBlend::First => {
                            constraint.spacing += (data.spacing - constraint.spacing) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let spacing = value1(frames, time);
                if blend == MixBlend::Setup {
                    constraint.spacing = data.spacing + (spacing - data.spacing) * alpha;
                } else {
                    constraint.spacing += (spacing - constraint.spacing) * alpha;
                }
            }
            Self::PathMix { constraint, frames } => {
                let constraint = &mut skeleton.path_constraints[*constraint];
                if !constraint.active {
                    return;
                }
                let data = constraint.data.clone();
                if time < frames[0].time {
                    match blend {
                        MixBlend::Setup => {
                            constraint.mix_rotate = data.mix_rotate;
                            constraint.mix_x = data.mix_x;
                            constraint.mix_y = data.mix_y;
                        }
                        MixBlend::First => {
                            constraint.mix_rotate +=
                                (data.mix_rotate - constraint.mix_rotate) * alpha;
                            constraint.mix_x += (data.mix_x - constraint.mix_x) * alpha;
                            constraint.mix_y += (data.mix_y - constraint.mix_y) * alpha;
                        }
                        _ => {}
                    }
                    return;
                }
                let i = search(frames, time, |f| f.time);
                let (rotate, x, y) = if i >= frames.len() - 1 {
                    let f = &frames[frames.len() - 1];
                    (f.mix_rotate, f.mix_x, f.mix_y)
                } else {
                    let f0 = &frames[i];
                    let f1 = &frames[i + 1];
                    let t = (time - f0.time) / (f1.time - f0.time);
                    let p = f0.curve.percent(t.clamp(0.0, 1.0));
                    (
                        f0.mix_rotate + (f1.mix_rotate - f0.mix_rotate) * p,
                        f0.mix_x + (f1.mix_x - f0.mix_x) * p,
                        f0.mix_y + (f1.mix_y - f0.mix_y) * p,
                    )
                };
                if blend == MixBlend::Setup {
                    constraint.mix_rotate = data.mix_rotate + (rotate - data.mix_rotate) * alpha;
                    constraint.mix_x = data.mix_x + (x - data.mix_x) * alpha;
                    constraint.mix_y = data.mix_y + (y - data.mix_y) * alpha;
                } else {
                    constraint.mix_rotate += (rotate - constraint.mix_rotate) * alpha;
                    constraint.mix_x += (x - constraint.mix_x) * alpha;
                    constraint.mix_y += (y - constraint.mix_y) * alpha;
                }
            }
        }
    }
}

pub(crate) fn set_setup_attachment(skeleton: &mut Skeleton, slot_index: usize) {
    let attachment = skeleton.slots[slot_index]
        .data
        .attachment_name
        .clone()
        .and_then(|name| skeleton.get_attachment(slot_index, &name));
    skeleton.slots[slot_index].set_attachment(attachment);
}

fn reset_draw_order(skeleton: &mut Skeleton) {
    skeleton.draw_order.clear();
    let slots = skeleton.slots.len();
    skeleton.draw_order.extend(0..slots);
}

/// Deform timeline application; vertex offsets blend against the
/// attachment template (unweighted) or zero (weighted)
fn apply_deform(
    skeleton: &mut Skeleton,
    slot_index: usize,
    attachment: &Attachment,
    frames: &[DeformFrame],
    time: f32,
    alpha: f32,
    blend: MixBlend,
) {
    if !skeleton.bones[skeleton.slots[slot_index].bone].active {
        return;
    }
    let slot = &mut skeleton.slots[slot_index];
    let matches = slot
        .attachment
        .as_ref()
        .is_some_and(|current| current.ptr_eq(attachment));
    if !matches {
        return;
    }
    let Some(source) = attachment.vertex_source() else {
        return;
    };
    let weighted = source.bones.is_some();
    let vertex_count = frames[0].vertices.len();

    let mut blend = blend;
    if slot.deform.is_empty() {
        blend = MixBlend::Setup;
    }

    if time < frames[0].time {
        match blend {
            MixBlend::Setup => slot.deform.clear(),
            MixBlend::First => {
                if alpha == 1.0 {
                    slot.deform.clear();
                    return;
                }
                slot.deform.resize(vertex_count, 0.0);
                if weighted {
                    // Weighted deform offsets blend toward zero.
                    let keep = 1.0 - alpha;
                    for value in &mut slot.deform {
                        *value *= keep;
                    }
                } else {
                    for (value, setup) in slot.deform.iter_mut().zip(&source.vertices) {
                        *value += (setup - *value) * alpha;
                    }
                }
            }
            _ => {}
        }
        return;
    }

    slot.deform.resize(vertex_count, 0.0);
    let deform = &mut slot.deform;

    let i = search(frames, time, |f| f.time);
    let interpolated: Vec<f32>;
    let target: &[f32] = if i >= frames.len() - 1 {
        &frames[frames.len() - 1].vertices
    } else {
        let f0 = &frames[i];
        let f1 = &frames[i + 1];
        let t = (time - f0.time) / (f1.time - f0.time);
        let p = f0.curve.percent(t.clamp(0.0, 1.0));
        interpolated = f0
            .vertices
            .iter()
            .zip(&f1.vertices)
            .map(|(a, b)| a + (b - a) * p)
            .collect();
        &interpolated
    };

    if alpha == 1.0 {
        if blend == MixBlend::Add {
            if weighted {
                for (value, target) in deform.iter_mut().zip(target) {
                    *value += target;
                }
            } else {
                for ((value, target), setup) in
                    deform.iter_mut().zip(target).zip(&source.vertices)
                {
                    *value += target - setup;
                }
            }
        } else {
            deform.copy_from_slice(target);
        }
        return;
    }

    match blend {
        MixBlend::Setup => {
            if weighted {
                for (value, target) in deform.iter_mut().zip(target) {
                    *value = target * alpha;
                }
            } else {
                for ((value, target), setup) in deform.iter_mut().zip(target).zip(&source.vertices)
                {
                    *value = setup + (target - setup) * alpha;
                }
            }
        }
        MixBlend::First | MixBlend::Replace => {
            for (value, target) in deform.iter_mut().zip(target) {
                *value += (target - *value) * alpha;
            }
        }
        MixBlend::Add => {
            if weighted {
                for (value, target) in deform.iter_mut().zip(target) {
                    *value += target * alpha;
                }
            } else {
                for ((value, target), setup) in deform.iter_mut().zip(target).zip(&source.vertices)
                {
                    *value += (target - setup) * alpha;
                }
            }
        }
    }
}
