//! Animation data model and the multi-track animation state engine
//!
//! [`Animation`] is immutable, shared timeline data; [`AnimationState`]
//! holds the per-instance playback state that applies animations to a
//! skeleton each frame.

pub mod event;
pub mod state;
pub mod state_data;
pub mod timeline;

pub use event::{Event, EventData};
pub use state::{
    AnimationEvent, AnimationState, EventType, TrackEntry, TrackEntryHandle,
};
pub use state_data::AnimationStateData;
pub use timeline::{
    AttachmentFrame, ColorFrame, Curve, DeformFrame, DrawOrderFrame, Frame1, Frame2, IkFrame,
    MixBlend, MixDirection, PathMixFrame, PropertyId, Timeline, TransformFrame, TwoColorFrame,
};

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::skeleton::{Skeleton, TargetCounts};

/// An immutable, named set of timelines with a fixed duration
#[derive(Debug)]
pub struct Animation {
    pub name: Arc<str>,
    pub duration: f32,
    pub timelines: Vec<Timeline>,
    properties: HashSet<PropertyId>,
}

impl Animation {
    /// Create an animation; the property set for mix planning is derived
    /// from the timelines
    pub fn new(name: impl Into<Arc<str>>, timelines: Vec<Timeline>, duration: f32) -> Self {
        let properties = timelines.iter().map(Timeline::property_id).collect();
        Self {
            name: name.into(),
            duration,
            timelines,
            properties,
        }
    }

    /// True when any timeline writes the given property
    pub fn has_property(&self, id: PropertyId) -> bool {
        self.properties.contains(&id)
    }

    /// Apply all timelines at `time`.
    ///
    /// This poses the skeleton directly, without track mixing; the
    /// animation state engine drives timelines itself with per-timeline
    /// blending. `last_time` and `events` serve event timelines; pass
    /// `last_time < time` windows to fire each key once.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        looping: bool,
        mut events: Option<&mut Vec<Arc<Event>>>,
        alpha: f32,
        blend: MixBlend,
        direction: MixDirection,
    ) {
        let (mut time, mut last_time) = (time, last_time);
        if looping && self.duration != 0.0 {
            time %= self.duration;
            if last_time > 0.0 {
                last_time %= self.duration;
            }
        }
        for timeline in &self.timelines {
            timeline.apply(
                skeleton,
                last_time,
                time,
                events.as_deref_mut(),
                alpha,
                blend,
                direction,
            );
        }
    }

    pub(crate) fn validate(&self, counts: &TargetCounts) -> Result<()> {
        for timeline in &self.timelines {
            timeline.validate(counts)?;
        }
        Ok(())
    }
}
