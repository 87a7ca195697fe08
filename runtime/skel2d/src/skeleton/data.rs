//! Immutable skeleton definition and its validating builder
//!
//! `SkeletonData` is produced once by a deserializer (outside this crate),
//! validated here, then shared read-only across every skeleton instance.
//! All structural rules are enforced by [`SkeletonDataBuilder::build`] so
//! the per-frame pose pipeline can assume a valid, acyclic graph and skip
//! checks entirely.

use std::collections::HashMap;
use std::sync::Arc;

use crate::animation::{Animation, EventData};
use crate::constraint::{IkConstraintData, PathConstraintData, TransformConstraintData};
use crate::error::{Result, SkelError};

use super::bone::BoneData;
use super::skin::Skin;
use super::slot::SlotData;

/// Identifies one constraint across the three constraint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintHandle {
    Ik(usize),
    Transform(usize),
    Path(usize),
}

/// Immutable, validated skeleton definition shared across instances
#[derive(Debug)]
pub struct SkeletonData {
    pub name: Arc<str>,
    pub bones: Vec<Arc<BoneData>>,
    pub slots: Vec<Arc<SlotData>>,
    pub skins: Vec<Arc<Skin>>,
    /// Index into `skins` of the default skin, if any
    pub default_skin: Option<usize>,
    pub events: Vec<Arc<EventData>>,
    pub animations: Vec<Arc<Animation>>,
    pub ik_constraints: Vec<Arc<IkConstraintData>>,
    pub transform_constraints: Vec<Arc<TransformConstraintData>>,
    pub path_constraints: Vec<Arc<PathConstraintData>>,
    /// Setup-pose AABB hint authored with the skeleton
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    bone_names: HashMap<Arc<str>, usize>,
    slot_names: HashMap<Arc<str>, usize>,
    skin_names: HashMap<Arc<str>, usize>,
    event_names: HashMap<Arc<str>, usize>,
    animation_names: HashMap<Arc<str>, usize>,
}

impl SkeletonData {
    /// Find a bone index by name
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bone_names.get(name).copied()
    }

    /// Find a slot index by name
    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slot_names.get(name).copied()
    }

    /// Find a skin index by name
    pub fn find_skin(&self, name: &str) -> Option<usize> {
        self.skin_names.get(name).copied()
    }

    /// Find event data by name
    pub fn find_event(&self, name: &str) -> Option<&Arc<EventData>> {
        self.event_names.get(name).map(|&i| &self.events[i])
    }

    /// Find an animation by name
    pub fn find_animation(&self, name: &str) -> Option<&Arc<Animation>> {
        self.animation_names.get(name).map(|&i| &self.animations[i])
    }

    /// Find an IK constraint index by name
    pub fn find_ik_constraint(&self, name: &str) -> Option<usize> {
        self.ik_constraints
            .iter()
            .position(|c| c.name.as_ref() == name)
    }

    /// Find a transform constraint index by name
    pub fn find_transform_constraint(&self, name: &str) -> Option<usize> {
        self.transform_constraints
            .iter()
            .position(|c| c.name.as_ref() == name)
    }

    /// Find a path constraint index by name
    pub fn find_path_constraint(&self, name: &str) -> Option<usize> {
        self.path_constraints
            .iter()
            .position(|c| c.name.as_ref() == name)
    }
}

/// Builder for [`SkeletonData`]; `build` performs all structural validation
#[derive(Debug, Default)]
pub struct SkeletonDataBuilder {
    name: Option<Arc<str>>,
    bones: Vec<BoneData>,
    slots: Vec<SlotData>,
    skins: Vec<Skin>,
    default_skin: Option<usize>,
    events: Vec<EventData>,
    animations: Vec<Animation>,
    ik_constraints: Vec<IkConstraintData>,
    transform_constraints: Vec<TransformConstraintData>,
    path_constraints: Vec<PathConstraintData>,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl SkeletonDataBuilder {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn bone(mut self, bone: BoneData) -> Self {
        self.bones.push(bone);
        self
    }

    pub fn slot(mut self, slot: SlotData) -> Self {
        self.slots.push(slot);
        self
    }

    /// Add a skin; the first added skin becomes the default
    pub fn skin(mut self, skin: Skin) -> Self {
        if self.default_skin.is_none() {
            self.default_skin = Some(self.skins.len());
        }
        self.skins.push(skin);
        self
    }

    pub fn event(mut self, event: EventData) -> Self {
        self.events.push(event);
        self
    }

    pub fn animation(mut self, animation: Animation) -> Self {
        self.animations.push(animation);
        self
    }

    pub fn ik_constraint(mut self, constraint: IkConstraintData) -> Self {
        self.ik_constraints.push(constraint);
        self
    }

    pub fn transform_constraint(mut self, constraint: TransformConstraintData) -> Self {
        self.transform_constraints.push(constraint);
        self
    }

    pub fn path_constraint(mut self, constraint: PathConstraintData) -> Self {
        self.path_constraints.push(constraint);
        self
    }

    pub fn bounds(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        self
    }

    /// Validate the assembled data and freeze it for sharing.
    ///
    /// Rejects: empty or multi-root bone lists, parents appearing after
    /// children (which also rules out cycles), dangling bone/slot/target
    /// indices, duplicate names, and non-monotonic timeline keyframes.
    pub fn build(self) -> Result<Arc<SkeletonData>> {
        let name = self.name.unwrap_or_else(|| Arc::from(""));

        if self.bones.is_empty() {
            return Err(SkelError::ValidationError("skeleton has no bones".into()));
        }

        // Pre-order bone list: a bone never appears before its parent, and
        // only the first bone is a root.
        let mut bone_names = HashMap::new();
        for (i, bone) in self.bones.iter().enumerate() {
            if bone.index != i {
                return Err(SkelError::ValidationError(format!(
                    "bone '{}' has index {} but is at position {}",
                    bone.name, bone.index, i
                )));
            }
            match bone.parent {
                None if i != 0 => {
                    return Err(SkelError::ValidationError(format!(
                        "bone '{}' has no parent but is not the root",
                        bone.name
                    )));
                }
                Some(parent) if parent >= i => {
                    return Err(SkelError::ValidationError(format!(
                        "bone '{}' appears before its parent (index {})",
                        bone.name, parent
                    )));
                }
                Some(_) if i == 0 => {
                    return Err(SkelError::ValidationError(
                        "root bone must not have a parent".into(),
                    ));
                }
                _ => {}
            }
            if bone_names.insert(bone.name.clone(), i).is_some() {
                return Err(SkelError::DuplicateName(bone.name.to_string()));
            }
        }

        let n_bones = self.bones.len();
        let n_slots = self.slots.len();

        let mut slot_names = HashMap::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.index != i {
                return Err(SkelError::ValidationError(format!(
                    "slot '{}' has index {} but is at position {}",
                    slot.name, slot.index, i
                )));
            }
            if slot.bone >= n_bones {
                return Err(SkelError::ReferenceError(format!(
                    "slot '{}' references bone {} of {}",
                    slot.name, slot.bone, n_bones
                )));
            }
            if slot_names.insert(slot.name.clone(), i).is_some() {
                return Err(SkelError::DuplicateName(slot.name.to_string()));
            }
        }

        let check_bone = |name: &Arc<str>, bone: usize| -> Result<()> {
            if bone >= n_bones {
                return Err(SkelError::ReferenceError(format!(
                    "constraint '{name}' references bone {bone} of {n_bones}"
                )));
            }
            Ok(())
        };
        for constraint in &self.ik_constraints {
            if constraint.bones.is_empty() || constraint.bones.len() > 2 {
                return Err(SkelError::ValidationError(format!(
                    "IK constraint '{}' must drive 1 or 2 bones",
                    constraint.name
                )));
            }
            for &bone in &constraint.bones {
                check_bone(&constraint.name, bone)?;
            }
            check_bone(&constraint.name, constraint.target)?;
        }
        for constraint in &self.transform_constraints {
            for &bone in &constraint.bones {
                check_bone(&constraint.name, bone)?;
            }
            check_bone(&constraint.name, constraint.target)?;
        }
        for constraint in &self.path_constraints {
            for &bone in &constraint.bones {
                check_bone(&constraint.name, bone)?;
            }
            if constraint.target >= n_slots {
                return Err(SkelError::ReferenceError(format!(
                    "path constraint '{}' references slot {} of {}",
                    constraint.name, constraint.target, n_slots
                )));
            }
        }

        let mut skin_names = HashMap::new();
        for (i, skin) in self.skins.iter().enumerate() {
            for (slot_index, attachment_name, _) in skin.entries() {
                if slot_index >= n_slots {
                    return Err(SkelError::ReferenceError(format!(
                        "skin '{}' attaches '{}' to slot {} of {}",
                        skin.name, attachment_name, slot_index, n_slots
                    )));
                }
            }
            for &bone in &skin.bones {
                if bone >= n_bones {
                    return Err(SkelError::ReferenceError(format!(
                        "skin '{}' requires bone {} of {}",
                        skin.name, bone, n_bones
                    )));
                }
            }
            if skin_names.insert(skin.name.clone(), i).is_some() {
                return Err(SkelError::DuplicateName(skin.name.to_string()));
            }
        }

        let mut event_names = HashMap::new();
        for (i, event) in self.events.iter().enumerate() {
            if event_names.insert(event.name.clone(), i).is_some() {
                return Err(SkelError::DuplicateName(event.name.to_string()));
            }
        }

        let counts = TargetCounts {
            bones: n_bones,
            slots: n_slots,
            ik_constraints: self.ik_constraints.len(),
            transform_constraints: self.transform_constraints.len(),
            path_constraints: self.path_constraints.len(),
        };
        let constraint_count =
            counts.ik_constraints + counts.transform_constraints + counts.path_constraints;
        let orders = self
            .ik_constraints
            .iter()
            .map(|c| c.order)
            .chain(self.transform_constraints.iter().map(|c| c.order))
            .chain(self.path_constraints.iter().map(|c| c.order));
        for order in orders {
            if order >= constraint_count {
                log::warn!(
                    "constraint order {order} is outside 0..{constraint_count}; it will never be applied"
                );
            }
        }
        let mut animation_names = HashMap::new();
        for (i, animation) in self.animations.iter().enumerate() {
            animation.validate(&counts)?;
            if animation_names.insert(animation.name.clone(), i).is_some() {
                return Err(SkelError::DuplicateName(animation.name.to_string()));
            }
        }

        log::debug!(
            "built skeleton data '{}': {} bones, {} slots, {} constraints, {} animations",
            name,
            n_bones,
            n_slots,
            counts.ik_constraints + counts.transform_constraints + counts.path_constraints,
            self.animations.len()
        );

        Ok(Arc::new(SkeletonData {
            name,
            bones: self.bones.into_iter().map(Arc::new).collect(),
            slots: self.slots.into_iter().map(Arc::new).collect(),
            skins: self.skins.into_iter().map(Arc::new).collect(),
            default_skin: self.default_skin,
            events: self.events.into_iter().map(Arc::new).collect(),
            animations: self.animations.into_iter().map(Arc::new).collect(),
            ik_constraints: self.ik_constraints.into_iter().map(Arc::new).collect(),
            transform_constraints: self
                .transform_constraints
                .into_iter()
                .map(Arc::new)
                .collect(),
            path_constraints: self.path_constraints.into_iter().map(Arc::new).collect(),
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            bone_names,
            slot_names,
            skin_names,
            event_names,
            animation_names,
        }))
    }
}

/// Target counts used to bounds-check timeline indices at build time
#[derive(Debug, Clone, Copy)]
pub struct TargetCounts {
    pub bones: usize,
    pub slots: usize,
    pub ik_constraints: usize,
    pub transform_constraints: usize,
    pub path_constraints: usize,
}
