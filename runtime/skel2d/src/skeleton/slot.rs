//! Slots: rendering attachment points bound to bones

use std::sync::Arc;

use crate::attachment::Attachment;
use crate::color::Color;

/// Blend mode a renderer should use when compositing a slot's attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendMode {
    #[default]
    Normal,
    Additive,
    Multiply,
    Screen,
}

/// Immutable setup-pose definition of a slot
#[derive(Debug, Clone)]
pub struct SlotData {
    /// Index into the skeleton's slot list (the setup draw order)
    pub index: usize,
    /// Slot name, unique within the skeleton
    pub name: Arc<str>,
    /// Index of the bone this slot is bound to
    pub bone: usize,
    /// Setup color
    pub color: Color,
    /// Setup dark color, present only when two-color tinting is used
    pub dark_color: Option<Color>,
    /// Name of the setup attachment, if any
    pub attachment_name: Option<Arc<str>>,
    pub blend_mode: BlendMode,
}

impl SlotData {
    pub fn new(index: usize, name: impl Into<Arc<str>>, bone: usize) -> Self {
        Self {
            index,
            name: name.into(),
            bone,
            color: Color::WHITE,
            dark_color: None,
            attachment_name: None,
            blend_mode: BlendMode::Normal,
        }
    }
}

/// A live slot: current color, attachment, and deform state
#[derive(Debug, Clone)]
pub struct Slot {
    /// Shared immutable setup definition
    pub data: Arc<SlotData>,
    /// Index of the bone this slot is bound to
    pub bone: usize,
    pub color: Color,
    pub dark_color: Option<Color>,
    /// Currently attached attachment, replaced by animations and the host
    pub attachment: Option<Attachment>,
    /// Frame index for animated region sequences; -1 uses the setup frame
    pub sequence_index: i32,
    /// Deform offsets for the current vertex attachment, written by deform
    /// timelines; empty when no deform is active
    pub deform: Vec<f32>,
    /// Scratch used by the animation state to restore unkeyed attachments
    pub(crate) attachment_state: u32,
}

impl Slot {
    /// Create a slot posed at its setup values, without attachment
    /// resolution (the skeleton resolves attachments through the skin)
    pub fn new(data: Arc<SlotData>) -> Self {
        Self {
            bone: data.bone,
            color: data.color,
            dark_color: data.dark_color,
            attachment: None,
            sequence_index: -1,
            deform: Vec::new(),
            attachment_state: 0,
            data,
        }
    }

    /// Set the current attachment, resetting deform and sequence state when
    /// the attachment actually changes
    pub fn set_attachment(&mut self, attachment: Option<Attachment>) {
        let changed = match (&self.attachment, &attachment) {
            (Some(a), Some(b)) => !a.ptr_eq(b),
            (None, None) => false,
            _ => true,
        };
        if changed {
            self.deform.clear();
            self.sequence_index = -1;
        }
        self.attachment = attachment;
    }

    /// Reset color, dark color, and sequence state to the setup pose.
    /// Attachment resolution is done by the skeleton, which owns the skin.
    pub fn set_to_setup_pose(&mut self) {
        self.color = self.data.color;
        self.dark_color = self.data.dark_color;
        self.sequence_index = -1;
        self.deform.clear();
    }
}
