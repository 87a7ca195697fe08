//! Crossfade durations between animation pairs

use std::collections::HashMap;
use std::sync::Arc;

use crate::skeleton::SkeletonData;

use super::Animation;

/// Mix durations for animation transitions, shared read-only by animation
/// states. When a (from, to) pair is not registered, `default_mix` is used.
#[derive(Debug)]
pub struct AnimationStateData {
    pub skeleton_data: Arc<SkeletonData>,
    pub default_mix: f32,
    mix_durations: HashMap<(Arc<str>, Arc<str>), f32>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        Self {
            skeleton_data,
            default_mix: 0.0,
            mix_durations: HashMap::new(),
        }
    }

    /// Register a custom mix duration for a transition. Unknown animation
    /// names are ignored.
    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) {
        let (Some(from), Some(to)) = (
            self.skeleton_data.find_animation(from),
            self.skeleton_data.find_animation(to),
        ) else {
            log::debug!("set_mix ignored; unknown animation '{from}' or '{to}'");
            return;
        };
        self.mix_durations
            .insert((from.name.clone(), to.name.clone()), duration);
    }

    /// Mix duration for a transition
    pub fn get_mix(&self, from: &Animation, to: &Animation) -> f32 {
        self.mix_durations
            .get(&(from.name.clone(), to.name.clone()))
            .copied()
            .unwrap_or(self.default_mix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Frame1, Timeline};
    use crate::skeleton::{BoneData, SkeletonDataBuilder};

    fn animation(name: &str) -> Animation {
        Animation::new(
            name,
            vec![Timeline::Rotate {
                bone: 0,
                frames: vec![Frame1 {
                    time: 0.0,
                    value: 0.0,
                    curve: crate::animation::Curve::Linear,
                }],
            }],
            1.0,
        )
    }

    fn data() -> Arc<SkeletonData> {
        SkeletonDataBuilder::new("test")
            .bone(BoneData::new(0, "root", None))
            .animation(animation("idle"))
            .animation(animation("walk"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_mix() {
        let skeleton_data = data();
        let mut state_data = AnimationStateData::new(skeleton_data.clone());
        state_data.default_mix = 0.2;
        let idle = skeleton_data.find_animation("idle").unwrap();
        let walk = skeleton_data.find_animation("walk").unwrap();
        assert!((state_data.get_mix(idle, walk) - 0.2).abs() < 0.0001);
    }

    #[test]
    fn test_registered_pair_overrides_default() {
        let skeleton_data = data();
        let mut state_data = AnimationStateData::new(skeleton_data.clone());
        state_data.default_mix = 0.2;
        state_data.set_mix("idle", "walk", 0.5);
        let idle = skeleton_data.find_animation("idle").unwrap();
        let walk = skeleton_data.find_animation("walk").unwrap();
        assert!((state_data.get_mix(idle, walk) - 0.5).abs() < 0.0001);
        // Reverse direction still uses the default.
        assert!((state_data.get_mix(walk, idle) - 0.2).abs() < 0.0001);
    }
}
