//! User-defined events fired by event timelines

use std::sync::Arc;

/// Immutable event definition with default payload values
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct EventData {
    pub name: Arc<str>,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: Option<Arc<str>>,
    /// Audio file hint for hosts that play event sounds
    pub audio_path: Option<Arc<str>>,
    pub volume: f32,
    pub balance: f32,
}

impl EventData {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            int_value: 0,
            float_value: 0.0,
            string_value: None,
            audio_path: None,
            volume: 1.0,
            balance: 0.0,
        }
    }
}

/// A keyed occurrence of an event within an animation, with payload values
/// that may override the defaults in its [`EventData`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Keyframe time within the animation
    pub time: f32,
    pub data: Arc<EventData>,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: Option<Arc<str>>,
    pub volume: f32,
    pub balance: f32,
}

impl Event {
    /// Create an event at `time` with payload values copied from the data
    pub fn new(time: f32, data: Arc<EventData>) -> Self {
        Self {
            time,
            int_value: data.int_value,
            float_value: data.float_value,
            string_value: data.string_value.clone(),
            volume: data.volume,
            balance: data.balance,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_inherits_data_payload() {
        let mut data = EventData::new("footstep");
        data.int_value = 7;
        data.float_value = 1.5;
        let event = Event::new(0.25, Arc::new(data));
        assert_eq!(event.int_value, 7);
        assert!((event.float_value - 1.5).abs() < 0.0001);
        assert!((event.time - 0.25).abs() < 0.0001);
    }
}
