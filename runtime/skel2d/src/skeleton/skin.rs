//! Skins: named attachment sets resolved per slot

use std::collections::HashMap;
use std::sync::Arc;

use crate::attachment::Attachment;

use super::data::ConstraintHandle;

/// A named set of attachments keyed by slot index and attachment name,
/// plus the bones and constraints that are only active while this skin is
#[derive(Debug, Clone, Default)]
pub struct Skin {
    pub name: Arc<str>,
    attachments: HashMap<(usize, Arc<str>), Attachment>,
    /// Bones required by this skin's attachments
    pub bones: Vec<usize>,
    /// Constraints required by this skin
    pub constraints: Vec<ConstraintHandle>,
}

impl Skin {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            attachments: HashMap::new(),
            bones: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add or replace an attachment
    pub fn set_attachment(
        &mut self,
        slot_index: usize,
        name: impl Into<Arc<str>>,
        attachment: Attachment,
    ) {
        self.attachments.insert((slot_index, name.into()), attachment);
    }

    /// Look up an attachment; `None` when this skin does not carry it
    pub fn get_attachment(&self, slot_index: usize, name: &str) -> Option<&Attachment> {
        self.attachments.get(&(slot_index, Arc::from(name)))
    }

    /// Remove an attachment, if present
    pub fn remove_attachment(&mut self, slot_index: usize, name: &str) {
        self.attachments.remove(&(slot_index, Arc::from(name)));
    }

    /// Iterate all attachments as (slot index, name, attachment)
    pub fn entries(&self) -> impl Iterator<Item = (usize, &Arc<str>, &Attachment)> {
        self.attachments
            .iter()
            .map(|((slot, name), attachment)| (*slot, name, attachment))
    }

    /// Number of attachments in the skin
    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    /// True when the skin carries no attachments
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }

    /// Add all entries of another skin, keeping existing entries on
    /// conflict, and merge its bone/constraint requirements
    pub fn add_skin(&mut self, other: &Self) {
        for bone in &other.bones {
            if !self.bones.contains(bone) {
                self.bones.push(*bone);
            }
        }
        for constraint in &other.constraints {
            if !self.constraints.contains(constraint) {
                self.constraints.push(*constraint);
            }
        }
        for (key, attachment) in &other.attachments {
            self.attachments
                .entry(key.clone())
                .or_insert_with(|| attachment.clone());
        }
    }

    /// Add all entries of another skin, overwriting on conflict
    pub fn copy_skin(&mut self, other: &Self) {
        for bone in &other.bones {
            if !self.bones.contains(bone) {
                self.bones.push(*bone);
            }
        }
        for constraint in &other.constraints {
            if !self.constraints.contains(constraint) {
                self.constraints.push(*constraint);
            }
        }
        for (key, attachment) in &other.attachments {
            self.attachments.insert(key.clone(), attachment.clone());
        }
    }
}
