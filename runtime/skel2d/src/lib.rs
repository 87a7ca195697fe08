//! Runtime pose pipeline for hierarchical 2D skeletal animation
//!
//! Per frame: advance the animation state clocks, apply tracks to the
//! skeleton, run constraints in order, finalize world transforms, then
//! hand the pose to a renderer.
//!
//! ```
//! # use std::sync::Arc;
//! # use skel2d::skeleton::{BoneData, Skeleton, SkeletonDataBuilder};
//! # use skel2d::animation::{AnimationState, AnimationStateData};
//! # let data = SkeletonDataBuilder::new("demo")
//! #     .bone(BoneData::new(0, "root", None))
//! #     .build()
//! #     .unwrap();
//! let mut skeleton = Skeleton::new(data.clone());
//! let mut state = AnimationState::new(Arc::new(AnimationStateData::new(data)));
//! state.set_animation(0, "walk", true);
//! // Each frame:
//! state.update(1.0 / 60.0);
//! state.apply(&mut skeleton);
//! skeleton.update_world_transform();
//! for event in state.drain_events() {
//!     // react to Start/Complete/custom events
//! }
//! ```

pub mod animation;
pub mod attachment;
pub mod color;
pub mod constraint;
pub mod error;
pub mod math;
pub mod skeleton;

// Re-export common types
pub use animation::{
    Animation, AnimationEvent, AnimationState, AnimationStateData, Event, EventData, EventType,
    MixBlend, MixDirection, Timeline, TrackEntry, TrackEntryHandle,
};
pub use attachment::Attachment;
pub use color::Color;
pub use constraint::{IkConstraint, PathConstraint, TransformConstraint};
pub use error::{Result, SkelError};
pub use skeleton::{Bone, Skeleton, SkeletonData, SkeletonDataBuilder, Slot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
