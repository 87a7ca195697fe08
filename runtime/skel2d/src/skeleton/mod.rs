//! Skeleton instance: bone/slot arenas, update cache, and the per-frame
//! world transform pass
//!
//! The skeleton owns all bones in one contiguous, pre-order-sorted arena.
//! `update_cache` sorts bones and constraints into a single flat list so
//! that `update_world_transform` is a branch-light walk: each constraint
//! lands after everything it reads and forces re-sorting of the subtrees it
//! writes.

pub mod bone;
pub mod data;
pub mod skin;
pub mod slot;

pub use bone::{Bone, BoneData, SkeletonPose, TransformMode, WorldTransform};
pub use data::{ConstraintHandle, SkeletonData, SkeletonDataBuilder, TargetCounts};
pub use skin::Skin;
pub use slot::{BlendMode, Slot, SlotData};

use std::sync::Arc;

use crate::attachment::Attachment;
use crate::color::Color;
use crate::constraint::{
    self, IkConstraint, PathConstraint, TransformConstraint,
};

/// One step of the precomputed update order
#[derive(Debug, Clone, Copy)]
enum UpdateCacheItem {
    Bone(usize),
    Ik(usize),
    Transform(usize),
    Path(usize),
}

/// Axis-aligned bounds of the skeleton's visible attachments
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A live skeleton instance
///
/// Multiple instances may share one [`SkeletonData`]; each instance owns its
/// mutable bones, slots, constraints, and draw order.
#[derive(Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    pub slots: Vec<Slot>,
    /// Slot indices in draw order; animations may permute this
    pub draw_order: Vec<usize>,
    pub ik_constraints: Vec<IkConstraint>,
    pub transform_constraints: Vec<TransformConstraint>,
    pub path_constraints: Vec<PathConstraint>,
    /// Active skin index into `data.skins`
    skin: Option<usize>,
    /// Tint applied by renderers to every attachment
    pub color: Color,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,

    update_cache: Vec<UpdateCacheItem>,
}

impl Skeleton {
    /// Create an instance posed at the setup pose
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let mut bones: Vec<Bone> = data.bones.iter().map(|d| Bone::new(d.clone())).collect();
        for i in 0..bones.len() {
            if let Some(parent) = bones[i].parent {
                bones[parent].children.push(i);
            }
        }

        let slots: Vec<Slot> = data.slots.iter().map(|d| Slot::new(d.clone())).collect();
        let draw_order = (0..slots.len()).collect();

        let ik_constraints = data
            .ik_constraints
            .iter()
            .map(|d| IkConstraint::new(d.clone()))
            .collect();
        let transform_constraints = data
            .transform_constraints
            .iter()
            .map(|d| TransformConstraint::new(d.clone()))
            .collect();
        let path_constraints = data
            .path_constraints
            .iter()
            .map(|d| PathConstraint::new(d.clone()))
            .collect();

        let mut skeleton = Self {
            data,
            bones,
            slots,
            draw_order,
            ik_constraints,
            transform_constraints,
            path_constraints,
            skin: None,
            color: Color::WHITE,
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            update_cache: Vec::new(),
        };
        skeleton.set_slots_to_setup_pose();
        skeleton.update_cache();
        skeleton
    }

    fn pose(&self) -> SkeletonPose {
        SkeletonPose {
            x: self.x,
            y: self.y,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
        }
    }

    /// Rebuild the update order. Called automatically when the skin
    /// changes; hosts that toggle constraint data must call it themselves.
    pub fn update_cache(&mut self) {
        self.update_cache.clear();

        for bone in &mut self.bones {
            bone.sorted = bone.data.skin_required;
            bone.active = !bone.sorted;
        }

        if let Some(skin_index) = self.skin {
            let skin = self.data.skins[skin_index].clone();
            for &skin_bone in &skin.bones {
                let mut bone = Some(skin_bone);
                while let Some(i) = bone {
                    self.bones[i].sorted = false;
                    self.bones[i].active = true;
                    bone = self.bones[i].parent;
                }
            }
        }

        // Constraints in their global order, each kind checked in turn.
        let ik_count = self.ik_constraints.len();
        let transform_count = self.transform_constraints.len();
        let path_count = self.path_constraints.len();
        let constraint_count = ik_count + transform_count + path_count;

        'outer: for order in 0..constraint_count {
            for i in 0..ik_count {
                if self.ik_constraints[i].data.order == order {
                    self.sort_ik_constraint(i);
                    continue 'outer;
                }
            }
            for i in 0..transform_count {
                if self.transform_constraints[i].data.order == order {
                    self.sort_transform_constraint(i);
                    continue 'outer;
                }
            }
            for i in 0..path_count {
                if self.path_constraints[i].data.order == order {
                    self.sort_path_constraint(i);
                    continue 'outer;
                }
            }
        }

        for i in 0..self.bones.len() {
            self.sort_bone(i);
        }

        log::debug!(
            "update cache for '{}': {} entries",
            self.data.name,
            self.update_cache.len()
        );
    }

    fn constraint_in_skin(&self, handle: ConstraintHandle) -> bool {
        self.skin
            .map(|i| self.data.skins[i].constraints.contains(&handle))
            .unwrap_or(false)
    }

    fn sort_ik_constraint(&mut self, index: usize) {
        let data = self.ik_constraints[index].data.clone();
        let active = !data.skin_required || self.constraint_in_skin(ConstraintHandle::Ik(index));
        self.ik_constraints[index].active = active;
        if !active {
            return;
        }

        self.sort_bone(data.target);

        let parent = data.bones[0];
        self.sort_bone(parent);

        if data.bones.len() == 1 {
            self.update_cache.push(UpdateCacheItem::Ik(index));
            let children = self.bones[parent].children.clone();
            self.sort_reset(&children);
        } else {
            let child = *data.bones.last().unwrap_or(&parent);
            self.sort_bone(child);

            self.update_cache.push(UpdateCacheItem::Ik(index));

            let children = self.bones[parent].children.clone();
            self.sort_reset(&children);
            self.bones[child].sorted = true;
        }
    }

    fn sort_transform_constraint(&mut self, index: usize) {
        let data = self.transform_constraints[index].data.clone();
        let active =
            !data.skin_required || self.constraint_in_skin(ConstraintHandle::Transform(index));
        self.transform_constraints[index].active = active;
        if !active {
            return;
        }

        self.sort_bone(data.target);

        for &bone in &data.bones {
            self.sort_bone(bone);
        }

        self.update_cache.push(UpdateCacheItem::Transform(index));

        for &bone in &data.bones {
            let children = self.bones[bone].children.clone();
            self.sort_reset(&children);
        }
        for &bone in &data.bones {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_path_constraint(&mut self, index: usize) {
        let data = self.path_constraints[index].data.clone();
        let active = !data.skin_required || self.constraint_in_skin(ConstraintHandle::Path(index));
        self.path_constraints[index].active = active;
        if !active {
            return;
        }

        let slot_bone = self.slots[data.target].bone;
        if let Some(skin_index) = self.skin {
            self.sort_path_attachments_in_skin(skin_index, data.target, slot_bone);
        }
        if let Some(default_skin) = self.data.default_skin {
            if Some(default_skin) != self.skin {
                self.sort_path_attachments_in_skin(default_skin, data.target, slot_bone);
            }
        }
        let attachment = self.slots[data.target].attachment.clone();
        if let Some(Attachment::Path(path)) = attachment {
            self.sort_path_attachment_bones(&path.vertices, slot_bone);
        }

        for &bone in &data.bones {
            self.sort_bone(bone);
        }

        self.update_cache.push(UpdateCacheItem::Path(index));

        for &bone in &data.bones {
            let children = self.bones[bone].children.clone();
            self.sort_reset(&children);
        }
        for &bone in &data.bones {
            self.bones[bone].sorted = true;
        }
    }

    fn sort_path_attachments_in_skin(&mut self, skin_index: usize, slot_index: usize, slot_bone: usize) {
        let skin = self.data.skins[skin_index].clone();
        for (slot, _, attachment) in skin.entries() {
            if slot != slot_index {
                continue;
            }
            if let Attachment::Path(path) = attachment {
                let vertices = path.vertices.clone();
                self.sort_path_attachment_bones(&vertices, slot_bone);
            }
        }
    }

    fn sort_path_attachment_bones(
        &mut self,
        vertices: &crate::attachment::VertexSource,
        slot_bone: usize,
    ) {
        match &vertices.bones {
            None => self.sort_bone(slot_bone),
            Some(runs) => {
                let mut i = 0;
                while i < runs.len() {
                    let n = runs[i];
                    i += 1;
                    for &bone in &runs[i..i + n] {
                        self.sort_bone(bone);
                    }
                    i += n;
                }
            }
        }
    }

    fn sort_bone(&mut self, index: usize) {
        if self.bones[index].sorted {
            return;
        }
        if let Some(parent) = self.bones[index].parent {
            self.sort_bone(parent);
        }
        self.bones[index].sorted = true;
        self.update_cache.push(UpdateCacheItem::Bone(index));
    }

    fn sort_reset(&mut self, children: &[usize]) {
        for &i in children {
            if !self.bones[i].active {
                continue;
            }
            if self.bones[i].sorted {
                let grandchildren = self.bones[i].children.clone();
                self.sort_reset(&grandchildren);
            }
            self.bones[i].sorted = false;
        }
    }

    /// Compute world transforms for every active bone, running constraints
    /// in their precomputed order
    pub fn update_world_transform(&mut self) {
        for bone in &mut self.bones {
            bone.ax = bone.x;
            bone.ay = bone.y;
            bone.arotation = bone.rotation;
            bone.ascale_x = bone.scale_x;
            bone.ascale_y = bone.scale_y;
            bone.ashear_x = bone.shear_x;
            bone.ashear_y = bone.shear_y;
        }

        let pose = self.pose();
        for i in 0..self.update_cache.len() {
            let item = self.update_cache[i];
            match item {
                UpdateCacheItem::Bone(index) => {
                    let parent = self.bones[index].parent.map(|p| self.bones[p].world());
                    self.bones[index].update(parent, &pose);
                }
                UpdateCacheItem::Ik(index) => constraint::ik::apply(self, index),
                UpdateCacheItem::Transform(index) => constraint::transform::apply(self, index),
                UpdateCacheItem::Path(index) => constraint::path::apply(self, index),
            }
        }
    }

    /// Recompute one bone's world transform and re-derive its applied pose.
    /// Used by constraint solvers after writing world values directly.
    pub(crate) fn update_applied(&mut self, index: usize) {
        let pose = self.pose();
        let parent = self.bones[index].parent.map(|p| self.bones[p].world());
        self.bones[index].update_applied_transform(parent, &pose);
    }

    /// Reset bones, constraints, slots, and draw order to the setup pose
    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    /// Reset bone local transforms and constraint mixes to setup values
    pub fn set_bones_to_setup_pose(&mut self) {
        for bone in &mut self.bones {
            bone.set_to_setup_pose();
        }
        for constraint in &mut self.ik_constraints {
            constraint.set_to_setup_pose();
        }
        for constraint in &mut self.transform_constraints {
            constraint.set_to_setup_pose();
        }
        for constraint in &mut self.path_constraints {
            constraint.set_to_setup_pose();
        }
    }

    /// Reset slot colors, attachments, and the draw order to setup values
    pub fn set_slots_to_setup_pose(&mut self) {
        self.draw_order.clear();
        self.draw_order.extend(0..self.slots.len());
        for i in 0..self.slots.len() {
            self.slots[i].set_to_setup_pose();
            let attachment = self.slots[i]
                .data
                .attachment_name
                .clone()
                .and_then(|name| self.get_attachment(i, &name));
            self.slots[i].set_attachment(attachment);
        }
    }

    /// Find a bone index by name
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        let index = self.data.find_bone(name);
        if index.is_none() {
            log::debug!("bone '{}' not found in '{}'", name, self.data.name);
        }
        index
    }

    /// Find a slot index by name
    pub fn find_slot(&self, name: &str) -> Option<usize> {
        let index = self.data.find_slot(name);
        if index.is_none() {
            log::debug!("slot '{}' not found in '{}'", name, self.data.name);
        }
        index
    }

    /// Active skin index
    pub fn skin(&self) -> Option<usize> {
        self.skin
    }

    /// Set the active skin by name; unknown names clear nothing and return
    /// false
    pub fn set_skin_by_name(&mut self, name: &str) -> bool {
        match self.data.find_skin(name) {
            Some(index) => {
                self.set_skin(Some(index));
                true
            }
            None => {
                log::debug!("skin '{}' not found in '{}'", name, self.data.name);
                false
            }
        }
    }

    /// Set the active skin and rebuild the update cache.
    ///
    /// Attachments from the new skin are attached where the old skin's
    /// attachment of the same name was visible; with no previous skin, slot
    /// setup attachment names are resolved through the new skin.
    pub fn set_skin(&mut self, new_skin: Option<usize>) {
        if new_skin == self.skin {
            return;
        }
        if let Some(index) = new_skin {
            let skin = self.data.skins[index].clone();
            if let Some(old_index) = self.skin {
                let old_skin = self.data.skins[old_index].clone();
                for (slot_index, name, attachment) in old_skin.entries() {
                    let visible = self.slots[slot_index]
                        .attachment
                        .as_ref()
                        .is_some_and(|current| current.ptr_eq(attachment));
                    if visible {
                        if let Some(replacement) = skin.get_attachment(slot_index, name) {
                            self.slots[slot_index].set_attachment(Some(replacement.clone()));
                        }
                    }
                }
            } else {
                for i in 0..self.slots.len() {
                    let Some(name) = self.slots[i].data.attachment_name.clone() else {
                        continue;
                    };
                    if let Some(attachment) = skin.get_attachment(i, &name) {
                        self.slots[i].set_attachment(Some(attachment.clone()));
                    }
                }
            }
        }
        self.skin = new_skin;
        self.update_cache();
    }

    /// Resolve an attachment through the active skin, falling back to the
    /// default skin. `None` when neither carries it.
    pub fn get_attachment(&self, slot_index: usize, name: &str) -> Option<Attachment> {
        if let Some(skin_index) = self.skin {
            if let Some(attachment) = self.data.skins[skin_index].get_attachment(slot_index, name) {
                return Some(attachment.clone());
            }
        }
        self.data
            .default_skin
            .and_then(|i| self.data.skins[i].get_attachment(slot_index, name))
            .cloned()
    }

    /// Set or clear a slot's attachment by name. Returns false when the
    /// slot or attachment cannot be found; nothing changes in that case.
    pub fn set_attachment(&mut self, slot_name: &str, attachment_name: Option<&str>) -> bool {
        let Some(slot_index) = self.find_slot(slot_name) else {
            return false;
        };
        match attachment_name {
            None => {
                self.slots[slot_index].set_attachment(None);
                true
            }
            Some(name) => match self.get_attachment(slot_index, name) {
                Some(attachment) => {
                    self.slots[slot_index].set_attachment(Some(attachment));
                    true
                }
                None => {
                    log::debug!(
                        "attachment '{}' not found for slot '{}'",
                        name,
                        slot_name
                    );
                    false
                }
            },
        }
    }

    /// Axis-aligned bounding box over the world vertices of all visible
    /// region and mesh attachments. Used by hosts for camera framing, not
    /// by the frame loop.
    pub fn get_bounds(&self) -> Bounds {
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        let mut vertices: Vec<f32> = Vec::new();
        let mut any = false;

        for &slot_index in &self.draw_order {
            let slot = &self.slots[slot_index];
            if !self.bones[slot.bone].active {
                continue;
            }
            let count = match &slot.attachment {
                Some(Attachment::Region(region)) => {
                    vertices.resize(8, 0.0);
                    region.compute_world_vertices(&self.bones[slot.bone], &mut vertices, 0, 2);
                    8
                }
                Some(Attachment::Mesh(mesh)) => {
                    let count = mesh.vertices.world_vertices_length;
                    vertices.resize(count, 0.0);
                    mesh.vertices
                        .compute_world_vertices(&self.bones, slot, 0, count, &mut vertices, 0, 2);
                    count
                }
                _ => continue,
            };
            any = true;
            for pair in vertices[..count].chunks_exact(2) {
                min_x = min_x.min(pair[0]);
                min_y = min_y.min(pair[1]);
                max_x = max_x.max(pair[0]);
                max_y = max_y.max(pair[1]);
            }
        }

        if !any {
            return Bounds::default();
        }
        Bounds {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}
