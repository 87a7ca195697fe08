//! Multi-track animation playback with crossfade mixing
//!
//! Track entries live in an arena owned by the state; handles are
//! (index, generation) pairs validated before use, so `next` and
//! `mixing_from` links never own entry lifetime. Events are queued during
//! `update`/`apply` and delivered to the host through `drain_events` after
//! the frame's apply has completed, dispose notifications last.

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use crate::math::wrap_deg;
use crate::skeleton::Skeleton;

use super::timeline::{self, Frame1, MixBlend, MixDirection, PropertyId, Timeline};
use super::{Animation, AnimationStateData, Event};

// Per-timeline mix planning modes.
const SUBSEQUENT: u8 = 0;
const FIRST: u8 = 1;
const HOLD_SUBSEQUENT: u8 = 2;
const HOLD_FIRST: u8 = 3;
const HOLD_MIX: u8 = 4;

// Attachment bookkeeping relative to the per-apply unkeyed counter.
const SETUP: u32 = 1;
const CURRENT: u32 = 2;

/// Generation-checked reference to a track entry in the state's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEntryHandle {
    index: u32,
    generation: u32,
}

/// Kind of a queued animation event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// An entry became current on its track
    Start,
    /// An entry was superseded and began mixing out
    Interrupt,
    /// An entry will no longer be applied
    End,
    /// An entry played to its duration, or finished a loop iteration
    Complete,
    /// An entry was released; its handle is now dead
    Dispose,
    /// A user event keyed in the animation was passed
    Event,
}

/// A delivered animation event. The handle may already be dead for
/// `End`/`Dispose`; the track index and animation name are snapshots.
#[derive(Debug, Clone)]
pub struct AnimationEvent {
    pub event_type: EventType,
    pub track_index: usize,
    pub animation: Arc<str>,
    pub entry: TrackEntryHandle,
    /// Payload for `EventType::Event`
    pub event: Option<Arc<Event>>,
}

/// One scheduled playback of an animation on a track
#[derive(Debug)]
pub struct TrackEntry {
    pub(crate) track_index: usize,
    pub(crate) animation: Arc<Animation>,
    /// Wrap track time past the animation duration
    pub looping: bool,
    /// Keep this entry applied at full weight while the interrupting entry
    /// mixes in, instead of fading toward the setup pose
    pub hold_previous: bool,
    /// Evaluate the animation backwards
    pub reverse: bool,
    /// Blend rotations along the path under 180 degrees while mixing
    pub shortest_rotation: bool,
    /// While mixing out, keep firing events until the mix passes this
    /// fraction (0 stops events as soon as mixing starts)
    pub event_threshold: f32,
    /// While mixing out, keep applying attachment keys until the mix
    /// passes this fraction
    pub attachment_threshold: f32,
    /// While mixing out, keep applying draw order keys until the mix
    /// passes this fraction
    pub draw_order_threshold: f32,
    /// Seconds of the animation to start playback at
    pub animation_start: f32,
    /// Seconds of the animation to stop playback at
    pub animation_end: f32,
    pub(crate) animation_last: f32,
    pub(crate) next_animation_last: f32,
    /// Seconds to wait before this entry becomes current
    pub delay: f32,
    pub track_time: f32,
    pub(crate) track_last: f32,
    pub(crate) next_track_last: f32,
    /// Track time at which this entry stops being applied
    pub track_end: f32,
    pub time_scale: f32,
    /// Blend weight of this entry's timelines
    pub alpha: f32,
    pub mix_time: f32,
    pub mix_duration: f32,
    pub(crate) interrupt_alpha: f32,
    pub(crate) total_alpha: f32,
    pub mix_blend: MixBlend,
    pub(crate) next: Option<TrackEntryHandle>,
    pub(crate) previous: Option<TrackEntryHandle>,
    pub(crate) mixing_from: Option<TrackEntryHandle>,
    pub(crate) mixing_to: Option<TrackEntryHandle>,
    pub(crate) timeline_mode: Vec<u8>,
    pub(crate) timeline_hold_mix: Vec<Option<TrackEntryHandle>>,
    pub(crate) timelines_rotation: Vec<f32>,
}

impl TrackEntry {
    /// The animation this entry plays
    pub fn animation(&self) -> &Arc<Animation> {
        &self.animation
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    /// Queued successor entry
    pub fn next(&self) -> Option<TrackEntryHandle> {
        self.next
    }

    /// Entry this entry is mixing from (fading out underneath it)
    pub fn mixing_from(&self) -> Option<TrackEntryHandle> {
        self.mixing_from
    }

    /// Entry mixing this entry out
    pub fn mixing_to(&self) -> Option<TrackEntryHandle> {
        self.mixing_to
    }

    /// Current time within the animation, wrapped or clamped per the loop
    /// flag
    pub fn animation_time(&self) -> f32 {
        if self.looping {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            (self.track_time % duration) + self.animation_start
        } else {
            (self.track_time + self.animation_start).min(self.animation_end)
        }
    }

    /// Track time of the next loop completion (or the animation end for a
    /// non-looping entry)
    pub fn track_complete(&self) -> f32 {
        let duration = self.animation_end - self.animation_start;
        if duration != 0.0 {
            if self.looping {
                return duration * (1.0 + (self.track_time / duration).floor());
            }
            if self.track_time < duration {
                return duration;
            }
        }
        self.track_time
    }

    /// True once a non-looping entry has played through its duration
    pub fn is_complete(&self) -> bool {
        self.track_time >= self.animation_end - self.animation_start
    }
}

#[derive(Debug)]
struct EntrySlot {
    generation: u32,
    alive: bool,
    entry: TrackEntry,
}

#[derive(Debug)]
enum QueueItem {
    Start(TrackEntryHandle),
    Interrupt(TrackEntryHandle),
    End(TrackEntryHandle),
    Dispose(TrackEntryHandle),
    Complete(TrackEntryHandle),
    Event(TrackEntryHandle, Arc<Event>),
}

/// Applies animations over time to a skeleton, mixing between entries on
/// independent tracks
#[derive(Debug)]
pub struct AnimationState {
    pub data: Arc<AnimationStateData>,
    /// Scales the delta passed to `update` for every track
    pub time_scale: f32,

    tracks: Vec<Option<TrackEntryHandle>>,
    entries: Vec<EntrySlot>,
    free: Vec<u32>,
    queue: Vec<QueueItem>,
    outbox: Vec<AnimationEvent>,
    events_scratch: Vec<Arc<Event>>,
    property_ids: HashSet<PropertyId>,
    animations_changed: bool,
    unkeyed_state: u32,
    empty_animation: Arc<Animation>,
}

impl AnimationState {
    pub fn new(data: Arc<AnimationStateData>) -> Self {
        Self {
            data,
            time_scale: 1.0,
            tracks: Vec::new(),
            entries: Vec::new(),
            free: Vec::new(),
            queue: Vec::new(),
            outbox: Vec::new(),
            events_scratch: Vec::new(),
            property_ids: HashSet::new(),
            animations_changed: false,
            unkeyed_state: 0,
            empty_animation: Arc::new(Animation::new("<empty>", Vec::new(), 0.0)),
        }
    }

    // ---- arena ----

    /// Resolve a handle; `None` when the entry has been disposed
    pub fn entry(&self, handle: TrackEntryHandle) -> Option<&TrackEntry> {
        let slot = self.entries.get(handle.index as usize)?;
        (slot.alive && slot.generation == handle.generation).then_some(&slot.entry)
    }

    /// Mutable handle resolution for tuning entry parameters
    pub fn entry_mut(&mut self, handle: TrackEntryHandle) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(handle.index as usize)?;
        (slot.alive && slot.generation == handle.generation).then_some(&mut slot.entry)
    }

    /// Internal access; handles held by the state are valid by invariant
    fn e(&self, handle: TrackEntryHandle) -> &TrackEntry {
        &self.entries[handle.index as usize].entry
    }

    fn em(&mut self, handle: TrackEntryHandle) -> &mut TrackEntry {
        &mut self.entries[handle.index as usize].entry
    }

    fn alloc_entry(&mut self, entry: TrackEntry) -> TrackEntryHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.entries[index as usize];
            slot.entry = entry;
            slot.alive = true;
            TrackEntryHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(EntrySlot {
                generation: 0,
                alive: true,
                entry,
            });
            TrackEntryHandle {
                index,
                generation: 0,
            }
        }
    }

    fn free_entry(&mut self, handle: TrackEntryHandle) {
        let Some(slot) = self.entries.get_mut(handle.index as usize) else {
            return;
        };
        if !slot.alive || slot.generation != handle.generation {
            return;
        }
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
    }

    fn is_alive(&self, handle: TrackEntryHandle) -> bool {
        self.entries
            .get(handle.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == handle.generation)
    }

    // ---- event queue ----

    fn queue_start(&mut self, handle: TrackEntryHandle) {
        self.queue.push(QueueItem::Start(handle));
        self.animations_changed = true;
    }

    fn queue_interrupt(&mut self, handle: TrackEntryHandle) {
        self.queue.push(QueueItem::Interrupt(handle));
    }

    fn queue_end(&mut self, handle: TrackEntryHandle) {
        self.queue.push(QueueItem::End(handle));
        self.animations_changed = true;
    }

    fn queue_dispose(&mut self, handle: TrackEntryHandle) {
        self.queue.push(QueueItem::Dispose(handle));
    }

    fn queue_complete(&mut self, handle: TrackEntryHandle) {
        self.queue.push(QueueItem::Complete(handle));
    }

    /// Move queued items to the outbox. Dispose notifications are
    /// delivered last and release their entries.
    fn drain_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let items = mem::take(&mut self.queue);
        let mut disposals: Vec<TrackEntryHandle> = Vec::new();
        for item in items {
            match item {
                QueueItem::Start(h) => self.push_outbox(EventType::Start, h, None),
                QueueItem::Interrupt(h) => self.push_outbox(EventType::Interrupt, h, None),
                QueueItem::End(h) => {
                    self.push_outbox(EventType::End, h, None);
                    disposals.push(h);
                }
                QueueItem::Dispose(h) => disposals.push(h),
                QueueItem::Complete(h) => self.push_outbox(EventType::Complete, h, None),
                QueueItem::Event(h, event) => self.push_outbox(EventType::Event, h, Some(event)),
            }
        }
        for handle in disposals {
            if self.is_alive(handle) {
                self.push_outbox(EventType::Dispose, handle, None);
                log::debug!(
                    "disposed track entry '{}' on track {}",
                    self.e(handle).animation.name,
                    self.e(handle).track_index
                );
                self.free_entry(handle);
            }
        }
    }

    fn push_outbox(&mut self, event_type: EventType, handle: TrackEntryHandle, event: Option<Arc<Event>>) {
        if !self.is_alive(handle) {
            return;
        }
        let entry = self.e(handle);
        self.outbox.push(AnimationEvent {
            event_type,
            track_index: entry.track_index,
            animation: entry.animation.name.clone(),
            entry: handle,
            event,
        });
    }

    /// Take all events queued since the last call. Delivery order follows
    /// queueing order per frame, with dispose notifications last.
    pub fn drain_events(&mut self) -> Vec<AnimationEvent> {
        mem::take(&mut self.outbox)
    }

    // ---- clocks ----

    /// Advance track and mix clocks. Promotes queued entries whose delay
    /// has elapsed and retires finished mixes.
    pub fn update(&mut self, delta: f32) {
        let delta = delta * self.time_scale;
        for i in 0..self.tracks.len() {
            let Some(current) = self.tracks[i] else {
                continue;
            };
            {
                let e = self.em(current);
                e.animation_last = e.next_animation_last;
                e.track_last = e.next_track_last;
            }
            let mut current_delta = delta * self.e(current).time_scale;

            if self.e(current).delay > 0.0 {
                let e = self.em(current);
                e.delay -= current_delta;
                if e.delay > 0.0 {
                    continue;
                }
                current_delta = -e.delay;
                e.delay = 0.0;
            }

            if let Some(next) = self.e(current).next {
                // Change to the queued entry once its delay is passed,
                // preserving leftover time.
                let next_time = self.e(current).track_last - self.e(next).delay;
                if next_time >= 0.0 {
                    let current_time_scale = self.e(current).time_scale;
                    {
                        let n = self.em(next);
                        n.delay = 0.0;
                        n.track_time += if current_time_scale == 0.0 {
                            0.0
                        } else {
                            (next_time / current_time_scale + delta) * n.time_scale
                        };
                    }
                    self.em(current).track_time += current_delta;
                    self.set_current(i, next, true);
                    let mut walk = next;
                    while let Some(from) = self.e(walk).mixing_from {
                        self.em(walk).mix_time += delta;
                        walk = from;
                    }
                    continue;
                }
            } else if self.e(current).track_last >= self.e(current).track_end
                && self.e(current).mixing_from.is_none()
            {
                // Track end reached with nothing queued and nothing fading.
                self.tracks[i] = None;
                self.queue_end(current);
                self.clear_next(current);
                continue;
            }
            if self.e(current).mixing_from.is_some() && self.update_mixing_from(current, delta) {
                // All mixing-from entries have finished; unlink the chain.
                let mut from = self.e(current).mixing_from;
                self.em(current).mixing_from = None;
                if let Some(f) = from {
                    self.em(f).mixing_to = None;
                }
                while let Some(f) = from {
                    self.queue_end(f);
                    from = self.e(f).mixing_from;
                }
            }

            self.em(current).track_time += current_delta;
        }
        self.drain_queue();
    }

    fn update_mixing_from(&mut self, to: TrackEntryHandle, delta: f32) -> bool {
        let Some(from) = self.e(to).mixing_from else {
            return true;
        };
        let finished = self.update_mixing_from(from, delta);

        {
            let f = self.em(from);
            f.animation_last = f.next_animation_last;
            f.track_last = f.next_track_last;
        }

        // Require mix_time > 0 so the mixing-from entry was applied at
        // least once.
        let (mix_time, mix_duration) = {
            let t = self.e(to);
            (t.mix_time, t.mix_duration)
        };
        if mix_time > 0.0 && mix_time >= mix_duration {
            // Require total_alpha == 0 so mixing is complete, unless the
            // transition is a single frame.
            if self.e(from).total_alpha == 0.0 || mix_duration == 0.0 {
                let from_mixing_from = self.e(from).mixing_from;
                self.em(to).mixing_from = from_mixing_from;
                if let Some(ff) = from_mixing_from {
                    self.em(ff).mixing_to = Some(to);
                }
                let interrupt_alpha = self.e(from).interrupt_alpha;
                self.em(to).interrupt_alpha = interrupt_alpha;
                self.queue_end(from);
            }
            return finished;
        }

        {
            let f = self.em(from);
            f.track_time += delta * f.time_scale;
        }
        self.em(to).mix_time += delta;
        false
    }

    // ---- pose application ----

    /// Apply each track's entries to the skeleton. Returns true when any
    /// entry was applied.
    pub fn apply(&mut self, skeleton: &mut Skeleton) -> bool {
        if self.animations_changed {
            self.rebuild_hold_modes();
        }
        let mut applied = false;

        for i in 0..self.tracks.len() {
            let Some(current) = self.tracks[i] else {
                continue;
            };
            if self.e(current).delay > 0.0 {
                continue;
            }
            applied = true;

            // Track 0 animations are not for layering: unkeyed properties
            // return to setup rather than keeping earlier output.
            let blend = if i == 0 {
                MixBlend::First
            } else {
                self.e(current).mix_blend
            };

            let mut alpha = self.e(current).alpha;
            if self.e(current).mixing_from.is_some() {
                alpha *= self.apply_mixing_from(current, skeleton, blend);
            } else if self.e(current).track_time >= self.e(current).track_end
                && self.e(current).next.is_none()
            {
                // Last application before the track clears: setup pose.
                alpha = 0.0;
            }
            let alpha = alpha.clamp(0.0, 1.0);

            let animation = self.e(current).animation.clone();
            let animation_last = self.e(current).animation_last;
            let animation_time = self.e(current).animation_time();
            let reverse = self.e(current).reverse;
            let apply_time = if reverse {
                animation.duration - animation_time
            } else {
                animation_time
            };

            let mut fired = mem::take(&mut self.events_scratch);
            let timeline_count = animation.timelines.len();

            if alpha == 1.0 || blend == MixBlend::Add {
                for timeline in &animation.timelines {
                    match timeline {
                        Timeline::Attachment { slot, frames } => {
                            self.apply_attachment_timeline(
                                skeleton, *slot, frames, apply_time, blend, true,
                            );
                        }
                        _ => timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            if reverse { None } else { Some(&mut fired) },
                            alpha,
                            blend,
                            MixDirection::In,
                        ),
                    }
                }
            } else {
                let shortest_rotation = self.e(current).shortest_rotation;
                let mut timelines_rotation =
                    mem::take(&mut self.em(current).timelines_rotation);
                let first_frame =
                    !shortest_rotation && timelines_rotation.len() != timeline_count * 2;
                if first_frame {
                    timelines_rotation.clear();
                    timelines_rotation.resize(timeline_count * 2, 0.0);
                }
                let timeline_mode = mem::take(&mut self.em(current).timeline_mode);

                for (ii, timeline) in animation.timelines.iter().enumerate() {
                    let mode = timeline_mode.get(ii).copied().unwrap_or(SUBSEQUENT);
                    let timeline_blend = if mode == SUBSEQUENT {
                        blend
                    } else {
                        MixBlend::Setup
                    };
                    match timeline {
                        Timeline::Rotate { bone, frames } if !shortest_rotation => {
                            apply_rotate_timeline(
                                skeleton,
                                *bone,
                                frames,
                                apply_time,
                                alpha,
                                timeline_blend,
                                &mut timelines_rotation,
                                ii * 2,
                                first_frame,
                            );
                        }
                        Timeline::Attachment { slot, frames } => {
                            self.apply_attachment_timeline(
                                skeleton, *slot, frames, apply_time, blend, true,
                            );
                        }
                        _ => timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            if reverse { None } else { Some(&mut fired) },
                            alpha,
                            timeline_blend,
                            MixDirection::In,
                        ),
                    }
                }

                let e = self.em(current);
                e.timeline_mode = timeline_mode;
                e.timelines_rotation = timelines_rotation;
            }

            self.queue_events(current, animation_time, &fired);
            fired.clear();
            self.events_scratch = fired;
            {
                let e = self.em(current);
                e.next_animation_last = animation_time;
                e.next_track_last = e.track_time;
            }
        }

        // Restore setup attachments for slots an attachment timeline
        // touched without keying this frame (mixing out, or time before
        // the first key).
        let setup_state = self.unkeyed_state + SETUP;
        for slot_index in 0..skeleton.slots.len() {
            if skeleton.slots[slot_index].attachment_state == setup_state {
                timeline::set_setup_attachment(skeleton, slot_index);
            }
        }
        self.unkeyed_state += 2;

        self.drain_queue();
        applied
    }

    fn apply_mixing_from(
        &mut self,
        to: TrackEntryHandle,
        skeleton: &mut Skeleton,
        blend: MixBlend,
    ) -> f32 {
        let Some(from) = self.e(to).mixing_from else {
            return 1.0;
        };
        if self.e(from).mixing_from.is_some() {
            self.apply_mixing_from(from, skeleton, blend);
        }

        let mut blend = blend;
        let mix;
        if self.e(to).mix_duration == 0.0 {
            // Single frame mix to undo mixing-from changes.
            mix = 1.0;
            if blend == MixBlend::First {
                blend = MixBlend::Setup;
            }
        } else {
            mix = (self.e(to).mix_time / self.e(to).mix_duration).min(1.0);
            if blend != MixBlend::First {
                blend = self.e(from).mix_blend;
            }
        }

        let from_entry = self.e(from);
        let attachments = mix < from_entry.attachment_threshold;
        let draw_order = mix < from_entry.draw_order_threshold;
        let capture_events = mix < from_entry.event_threshold && !from_entry.reverse;
        let animation = from_entry.animation.clone();
        let animation_last = from_entry.animation_last;
        let animation_time = from_entry.animation_time();
        let reverse = from_entry.reverse;
        let apply_time = if reverse {
            animation.duration - animation_time
        } else {
            animation_time
        };
        let alpha_hold = from_entry.alpha * self.e(to).interrupt_alpha;
        let alpha_mix = alpha_hold * (1.0 - mix);
        let to_mix_duration = self.e(to).mix_duration;
        let timeline_count = animation.timelines.len();

        let mut fired = mem::take(&mut self.events_scratch);

        if blend == MixBlend::Add {
            for timeline in &animation.timelines {
                timeline.apply(
                    skeleton,
                    animation_last,
                    apply_time,
                    if capture_events { Some(&mut fired) } else { None },
                    alpha_mix,
                    blend,
                    MixDirection::Out,
                );
            }
        } else {
            let shortest_rotation = self.e(from).shortest_rotation;
            let mut timelines_rotation = mem::take(&mut self.em(from).timelines_rotation);
            let first_frame = !shortest_rotation && timelines_rotation.len() != timeline_count * 2;
            if first_frame {
                timelines_rotation.clear();
                timelines_rotation.resize(timeline_count * 2, 0.0);
            }
            let timeline_mode = mem::take(&mut self.em(from).timeline_mode);
            let timeline_hold_mix = mem::take(&mut self.em(from).timeline_hold_mix);

            self.em(from).total_alpha = 0.0;
            for (i, timeline) in animation.timelines.iter().enumerate() {
                let mut direction = MixDirection::Out;
                let timeline_blend;
                let alpha;
                match timeline_mode.get(i).copied().unwrap_or(SUBSEQUENT) {
                    SUBSEQUENT => {
                        if !draw_order && matches!(timeline, Timeline::DrawOrder { .. }) {
                            continue;
                        }
                        timeline_blend = blend;
                        alpha = alpha_mix;
                    }
                    FIRST => {
                        timeline_blend = MixBlend::Setup;
                        alpha = alpha_mix;
                    }
                    HOLD_SUBSEQUENT => {
                        timeline_blend = blend;
                        alpha = alpha_hold;
                    }
                    HOLD_FIRST => {
                        timeline_blend = MixBlend::Setup;
                        alpha = alpha_hold;
                    }
                    _ => {
                        // HOLD_MIX: fade by how far the holding entry's own
                        // mix has progressed.
                        timeline_blend = MixBlend::Setup;
                        let hold = timeline_hold_mix.get(i).copied().flatten();
                        alpha = match hold {
                            Some(hold) if self.is_alive(hold) => {
                                let h = self.e(hold);
                                alpha_hold
                                    * (1.0 - h.mix_time / h.mix_duration.max(f32::EPSILON)).max(0.0)
                            }
                            _ => alpha_hold,
                        };
                    }
                }
                self.em(from).total_alpha += alpha;

                match timeline {
                    Timeline::Rotate { bone, frames } if !shortest_rotation => {
                        apply_rotate_timeline(
                            skeleton,
                            *bone,
                            frames,
                            apply_time,
                            alpha,
                            timeline_blend,
                            &mut timelines_rotation,
                            i * 2,
                            first_frame,
                        );
                    }
                    Timeline::Attachment { slot, frames } => {
                        self.apply_attachment_timeline(
                            skeleton,
                            *slot,
                            frames,
                            apply_time,
                            timeline_blend,
                            attachments,
                        );
                    }
                    _ => {
                        if draw_order
                            && matches!(timeline, Timeline::DrawOrder { .. })
                            && timeline_blend == MixBlend::Setup
                        {
                            direction = MixDirection::In;
                        }
                        timeline.apply(
                            skeleton,
                            animation_last,
                            apply_time,
                            if capture_events { Some(&mut fired) } else { None },
                            alpha,
                            timeline_blend,
                            direction,
                        );
                    }
                }
            }

            let e = self.em(from);
            e.timeline_mode = timeline_mode;
            e.timeline_hold_mix = timeline_hold_mix;
            e.timelines_rotation = timelines_rotation;
        }

        if to_mix_duration > 0.0 {
            self.queue_events(from, animation_time, &fired);
        }
        fired.clear();
        self.events_scratch = fired;
        {
            let e = self.em(from);
            e.next_animation_last = animation_time;
            e.next_track_last = e.track_time;
        }

        mix
    }

    fn apply_attachment_timeline(
        &mut self,
        skeleton: &mut Skeleton,
        slot_index: usize,
        frames: &[super::timeline::AttachmentFrame],
        time: f32,
        blend: MixBlend,
        attachments: bool,
    ) {
        if !skeleton.bones[skeleton.slots[slot_index].bone].active {
            return;
        }
        if time < frames[0].time {
            if blend == MixBlend::Setup || blend == MixBlend::First {
                let name = skeleton.slots[slot_index].data.attachment_name.clone();
                self.set_attachment_tracked(skeleton, slot_index, name, attachments);
            }
        } else {
            let i = timeline::search(frames, time, |f| f.time);
            let name = frames[i].attachment.clone();
            self.set_attachment_tracked(skeleton, slot_index, name, attachments);
        }

        // If no entry claims the attachment this frame, it reverts to the
        // setup attachment after apply.
        let slot = &mut skeleton.slots[slot_index];
        if slot.attachment_state <= self.unkeyed_state {
            slot.attachment_state = self.unkeyed_state + SETUP;
        }
    }

    fn set_attachment_tracked(
        &mut self,
        skeleton: &mut Skeleton,
        slot_index: usize,
        name: Option<Arc<str>>,
        attachments: bool,
    ) {
        let attachment = name.and_then(|name| skeleton.get_attachment(slot_index, &name));
        skeleton.slots[slot_index].set_attachment(attachment);
        if attachments {
            skeleton.slots[slot_index].attachment_state = self.unkeyed_state + CURRENT;
        }
    }

    /// Queue user events fired during this entry's apply, a Complete event
    /// when a loop iteration or the animation finished, in time order
    fn queue_events(&mut self, entry: TrackEntryHandle, animation_time: f32, fired: &[Arc<Event>]) {
        let (animation_start, animation_end, track_last, track_time, looping, animation_last) = {
            let e = self.e(entry);
            (
                e.animation_start,
                e.animation_end,
                e.track_last,
                e.track_time,
                e.looping,
                e.animation_last,
            )
        };
        let duration = animation_end - animation_start;
        let track_last_wrapped = if duration == 0.0 {
            0.0
        } else {
            track_last % duration
        };

        // Events before the complete boundary.
        let mut i = 0;
        while i < fired.len() {
            let event = &fired[i];
            if event.time < track_last_wrapped {
                break;
            }
            if event.time > animation_end {
                i += 1;
                continue;
            }
            self.queue.push(QueueItem::Event(entry, event.clone()));
            i += 1;
        }

        let complete = if looping {
            if duration == 0.0 {
                true
            } else {
                let cycles = (track_time / duration).floor();
                cycles > 0.0 && cycles > (track_last / duration).floor()
            }
        } else {
            animation_time >= animation_end && animation_last < animation_end
        };
        if complete {
            self.queue_complete(entry);
        }

        // Events after the complete boundary.
        while i < fired.len() {
            if fired[i].time < animation_start {
                i += 1;
                continue;
            }
            self.queue.push(QueueItem::Event(entry, fired[i].clone()));
            i += 1;
        }
    }

    // ---- mix planning ----

    /// Recompute per-timeline hold modes for every mixing chain. Runs once
    /// per apply after any track change.
    fn rebuild_hold_modes(&mut self) {
        self.animations_changed = false;
        self.property_ids.clear();
        for i in 0..self.tracks.len() {
            let Some(mut entry) = self.tracks[i] else {
                continue;
            };
            while let Some(from) = self.e(entry).mixing_from {
                entry = from;
            }
            loop {
                let mixing_to = self.e(entry).mixing_to;
                if mixing_to.is_none() || self.e(entry).mix_blend != MixBlend::Add {
                    self.compute_hold(entry);
                }
                match mixing_to {
                    Some(next) => entry = next,
                    None => break,
                }
            }
        }
    }

    fn compute_hold(&mut self, entry: TrackEntryHandle) {
        let to = self.e(entry).mixing_to;
        let animation = self.e(entry).animation.clone();
        let n = animation.timelines.len();
        let mut timeline_mode = mem::take(&mut self.em(entry).timeline_mode);
        timeline_mode.clear();
        timeline_mode.resize(n, SUBSEQUENT);
        let mut timeline_hold_mix = mem::take(&mut self.em(entry).timeline_hold_mix);
        timeline_hold_mix.clear();
        timeline_hold_mix.resize(n, None);

        if let Some(to_handle) = to {
            if self.e(to_handle).hold_previous {
                for (i, timeline) in animation.timelines.iter().enumerate() {
                    timeline_mode[i] = if self.property_ids.insert(timeline.property_id()) {
                        HOLD_FIRST
                    } else {
                        HOLD_SUBSEQUENT
                    };
                }
                let e = self.em(entry);
                e.timeline_mode = timeline_mode;
                e.timeline_hold_mix = timeline_hold_mix;
                return;
            }
        }

        'outer: for (i, timeline) in animation.timelines.iter().enumerate() {
            let id = timeline.property_id();
            if !self.property_ids.insert(id) {
                timeline_mode[i] = SUBSEQUENT;
                continue;
            }
            let holds_until_replaced = match to {
                None => true,
                Some(to_handle) => {
                    matches!(
                        timeline,
                        Timeline::Attachment { .. }
                            | Timeline::DrawOrder { .. }
                            | Timeline::Event { .. }
                    ) || !self.e(to_handle).animation.has_property(id)
                }
            };
            if holds_until_replaced {
                timeline_mode[i] = FIRST;
                continue;
            }
            // The interrupting animation keys this property. If a deeper
            // entry in the mixing-to chain does not, hold this timeline so
            // the pose does not dip toward setup mid-fade.
            if let Some(to_handle) = to {
                let mut next = self.e(to_handle).mixing_to;
                while let Some(next_handle) = next {
                    if self.e(next_handle).animation.has_property(id) {
                        next = self.e(next_handle).mixing_to;
                        continue;
                    }
                    if self.e(entry).mix_duration > 0.0 {
                        timeline_mode[i] = HOLD_MIX;
                        timeline_hold_mix[i] = Some(next_handle);
                        continue 'outer;
                    }
                    break;
                }
            }
            timeline_mode[i] = HOLD_FIRST;
        }

        let e = self.em(entry);
        e.timeline_mode = timeline_mode;
        e.timeline_hold_mix = timeline_hold_mix;
    }

    // ---- track API ----

    /// Current entry on a track
    pub fn get_current(&self, track_index: usize) -> Option<TrackEntryHandle> {
        self.tracks.get(track_index).copied().flatten()
    }

    /// Number of track slots in use
    pub fn tracks_len(&self) -> usize {
        self.tracks.len()
    }

    fn expand_to_index(&mut self, index: usize) -> Option<TrackEntryHandle> {
        if index >= self.tracks.len() {
            self.tracks.resize(index + 1, None);
        }
        self.tracks[index]
    }

    fn new_track_entry(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looping: bool,
        last: Option<TrackEntryHandle>,
    ) -> TrackEntryHandle {
        let mix_duration = match last {
            None => 0.0,
            Some(last) => self.data.get_mix(&self.e(last).animation, &animation),
        };
        let entry = TrackEntry {
            track_index,
            looping,
            hold_previous: false,
            reverse: false,
            shortest_rotation: false,
            event_threshold: 0.0,
            attachment_threshold: 0.0,
            draw_order_threshold: 0.0,
            animation_start: 0.0,
            animation_end: animation.duration,
            animation_last: -1.0,
            next_animation_last: -1.0,
            delay: 0.0,
            track_time: 0.0,
            track_last: -1.0,
            next_track_last: -1.0,
            track_end: f32::MAX,
            time_scale: 1.0,
            alpha: 1.0,
            mix_time: 0.0,
            mix_duration,
            interrupt_alpha: 1.0,
            total_alpha: 0.0,
            mix_blend: MixBlend::Replace,
            next: None,
            previous: None,
            mixing_from: None,
            mixing_to: None,
            timeline_mode: Vec::new(),
            timeline_hold_mix: Vec::new(),
            timelines_rotation: Vec::new(),
            animation,
        };
        self.alloc_entry(entry)
    }

    fn set_current(&mut self, index: usize, current: TrackEntryHandle, interrupt: bool) {
        let from = self.expand_to_index(index);
        self.tracks[index] = Some(current);
        self.em(current).previous = None;

        if let Some(from) = from {
            if interrupt {
                self.queue_interrupt(from);
            }
            self.em(current).mixing_from = Some(from);
            self.em(from).mixing_to = Some(current);
            self.em(current).mix_time = 0.0;

            // Store the interrupted mix percentage.
            if self.e(from).mixing_from.is_some() && self.e(from).mix_duration > 0.0 {
                let factor = (self.e(from).mix_time / self.e(from).mix_duration).min(1.0);
                self.em(current).interrupt_alpha *= factor;
            }

            // Reset rotation scratch for mixing out.
            self.em(from).timelines_rotation.clear();
        }

        self.queue_start(current);
    }

    /// Play an animation on a track, replacing the current entry. Any
    /// queued entries are disposed. Returns `None` when the animation name
    /// is unknown.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looping: bool,
    ) -> Option<TrackEntryHandle> {
        let Some(animation) = self.data.skeleton_data.find_animation(animation_name) else {
            log::debug!("animation '{animation_name}' not found");
            return None;
        };
        let animation = animation.clone();
        Some(self.set_animation_with(track_index, animation, looping))
    }

    /// Play an animation on a track, replacing the current entry
    pub fn set_animation_with(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looping: bool,
    ) -> TrackEntryHandle {
        let mut interrupt = true;
        let mut current = self.expand_to_index(track_index);
        if let Some(cur) = current {
            if self.e(cur).next_track_last == -1.0 {
                // Don't mix from an entry that was never applied.
                let mixing_from = self.e(cur).mixing_from;
                self.tracks[track_index] = mixing_from;
                self.queue_interrupt(cur);
                self.queue_end(cur);
                self.clear_next(cur);
                current = mixing_from;
                interrupt = false;
            } else {
                self.clear_next(cur);
            }
        }
        log::debug!(
            "set animation '{}' on track {}",
            animation.name,
            track_index
        );
        let entry = self.new_track_entry(track_index, animation, looping, current);
        self.set_current(track_index, entry, interrupt);
        self.drain_queue();
        entry
    }

    /// Queue an animation after the current or last queued entry on a
    /// track. A delay <= 0 is computed from the predecessor's remaining
    /// time minus this entry's mix duration. Returns `None` when the
    /// animation name is unknown.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looping: bool,
        delay: f32,
    ) -> Option<TrackEntryHandle> {
        let Some(animation) = self.data.skeleton_data.find_animation(animation_name) else {
            log::debug!("animation '{animation_name}' not found");
            return None;
        };
        let animation = animation.clone();
        Some(self.add_animation_with(track_index, animation, looping, delay))
    }

    /// Queue an animation after the current or last queued entry
    pub fn add_animation_with(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looping: bool,
        mut delay: f32,
    ) -> TrackEntryHandle {
        let mut last = self.expand_to_index(track_index);
        if let Some(mut walk) = last {
            while let Some(next) = self.e(walk).next {
                walk = next;
            }
            last = Some(walk);
        }

        let entry = self.new_track_entry(track_index, animation, looping, last);

        match last {
            None => {
                self.set_current(track_index, entry, true);
                self.drain_queue();
            }
            Some(last) => {
                self.em(last).next = Some(entry);
                self.em(entry).previous = Some(last);
                if delay <= 0.0 {
                    delay += self.e(last).track_complete() - self.e(entry).mix_duration;
                }
            }
        }

        self.em(entry).delay = delay;
        entry
    }

    /// Fade the track to the setup pose over `mix_duration`, then clear it
    pub fn set_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
    ) -> TrackEntryHandle {
        let empty = self.empty_animation.clone();
        let entry = self.set_animation_with(track_index, empty, false);
        let e = self.em(entry);
        e.mix_duration = mix_duration;
        e.track_end = mix_duration;
        entry
    }

    /// Queue a fade to the setup pose after the track's queued entries
    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        delay: f32,
    ) -> TrackEntryHandle {
        let empty = self.empty_animation.clone();
        let entry = self.add_animation_with(track_index, empty, false, delay);
        if delay <= 0.0 {
            let computed_mix = self.e(entry).mix_duration;
            self.em(entry).delay += computed_mix - mix_duration;
        }
        let e = self.em(entry);
        e.mix_duration = mix_duration;
        e.track_end = mix_duration;
        entry
    }

    /// Fade every active track to the setup pose
    pub fn set_empty_animations(&mut self, mix_duration: f32) {
        for i in 0..self.tracks.len() {
            if self.tracks[i].is_some() {
                self.set_empty_animation(i, mix_duration);
            }
        }
    }

    /// Remove all entries from a track without mixing out
    pub fn clear_track(&mut self, track_index: usize) {
        if track_index >= self.tracks.len() {
            return;
        }
        let Some(current) = self.tracks[track_index] else {
            return;
        };
        self.queue_end(current);
        self.clear_next(current);

        let mut entry = current;
        loop {
            let Some(from) = self.e(entry).mixing_from else {
                break;
            };
            self.queue_end(from);
            self.em(entry).mixing_from = None;
            self.em(entry).mixing_to = None;
            entry = from;
        }

        self.tracks[track_index] = None;
        self.drain_queue();
    }

    /// Remove all entries from all tracks
    pub fn clear_tracks(&mut self) {
        for i in 0..self.tracks.len() {
            self.clear_track(i);
        }
    }

    fn clear_next(&mut self, entry: TrackEntryHandle) {
        let mut next = self.e(entry).next;
        while let Some(n) = next {
            self.queue_dispose(n);
            next = self.e(n).next;
        }
        self.em(entry).next = None;
    }

    /// Explicitly release an entry. A no-op while the entry is reachable
    /// from any track's current, queued, or mixing chain.
    pub fn dispose_entry(&mut self, handle: TrackEntryHandle) {
        if !self.is_alive(handle) {
            return;
        }
        for i in 0..self.tracks.len() {
            let mut current = self.tracks[i];
            while let Some(entry) = current {
                let mut walk = Some(entry);
                while let Some(h) = walk {
                    if h == handle {
                        log::debug!("dispose_entry ignored; entry is still referenced");
                        return;
                    }
                    walk = self.e(h).mixing_from;
                }
                current = self.e(entry).next;
            }
        }
        self.queue_dispose(handle);
        self.drain_queue();
    }
}

/// Mix a rotate timeline using the shortest route chosen on the first
/// mixed frame, detecting direction crosses so a fading rotation does not
/// wind the long way on later frames
#[allow(clippy::too_many_arguments)]
fn apply_rotate_timeline(
    skeleton: &mut Skeleton,
    bone_index: usize,
    frames: &[Frame1],
    time: f32,
    alpha: f32,
    blend: MixBlend,
    timelines_rotation: &mut [f32],
    i: usize,
    first_frame: bool,
) {
    use crate::math::signum0;

    if first_frame {
        timelines_rotation[i] = 0.0;
        timelines_rotation[i + 1] = 0.0;
    }

    let bone = &mut skeleton.bones[bone_index];
    if !bone.active {
        return;
    }

    if alpha == 1.0 {
        if time < frames[0].time {
            if blend == MixBlend::Setup || blend == MixBlend::First {
                bone.rotation = bone.data.rotation;
            }
            return;
        }
        let r = timeline::value1(frames, time);
        match blend {
            MixBlend::Setup => bone.rotation = bone.data.rotation + r,
            MixBlend::First | MixBlend::Replace => {
                bone.rotation += wrap_deg(bone.data.rotation + r - bone.rotation);
            }
            MixBlend::Add => bone.rotation += r,
        }
        return;
    }
    let r1;
    let r2;
    if time < frames[0].time {
        match blend {
            MixBlend::Setup => {
                bone.rotation = bone.data.rotation;
                return;
            }
            MixBlend::First => {
                r1 = bone.rotation;
                r2 = bone.data.rotation;
            }
            _ => return,
        }
    } else {
        r1 = if blend == MixBlend::Setup {
            bone.data.rotation
        } else {
            bone.rotation
        };
        r2 = bone.data.rotation + timeline::value1(frames, time);
    }

    // Mix between rotations using the direction of the shortest route on
    // the first frame, detecting crosses.
    let total;
    let diff = wrap_deg(r2 - r1);
    if diff == 0.0 {
        total = timelines_rotation[i];
    } else {
        let (mut last_total, last_diff) = if first_frame {
            (0.0, diff)
        } else {
            (timelines_rotation[i], timelines_rotation[i + 1])
        };
        let current = diff > 0.0;
        let mut dir = last_total >= 0.0;
        // Detect cross at 0 (not 180).
        if signum0(last_diff) != signum0(diff) && last_diff.abs() <= 90.0 {
            if last_total.abs() > 180.0 {
                last_total += 360.0 * signum0(last_total);
            }
            dir = current;
        }
        let mut t = diff + last_total - last_total % 360.0;
        if dir != current {
            t += 360.0 * signum0(last_total);
        }
        timelines_rotation[i] = t;
        total = t;
    }
    timelines_rotation[i + 1] = diff;
    bone.rotation = r1 + total * alpha;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Curve, Frame1};
    use crate::skeleton::{BoneData, SkeletonData, SkeletonDataBuilder};

    fn rotate_animation(name: &str, degrees: f32, duration: f32) -> Animation {
        Animation::new(
            name,
            vec![Timeline::Rotate {
                bone: 1,
                frames: vec![
                    Frame1 {
                        time: 0.0,
                        value: 0.0,
                        curve: Curve::Linear,
                    },
                    Frame1 {
                        time: duration,
                        value: degrees,
                        curve: Curve::Linear,
                    },
                ],
            }],
            duration,
        )
    }

    fn skeleton_data() -> Arc<SkeletonData> {
        SkeletonDataBuilder::new("test")
            .bone(BoneData::new(0, "root", None))
            .bone(BoneData::new(1, "bone", Some(0)))
            .animation(rotate_animation("idle", 10.0, 1.0))
            .animation(rotate_animation("walk", 90.0, 1.0))
            .build()
            .unwrap()
    }

    fn state() -> (AnimationState, Skeleton) {
        let data = skeleton_data();
        let state_data = AnimationStateData::new(data.clone());
        (
            AnimationState::new(Arc::new(state_data)),
            Skeleton::new(data),
        )
    }

    #[test]
    fn test_set_animation_applies() {
        let (mut state, mut skeleton) = state();
        state.set_animation(0, "walk", false).unwrap();
        state.update(0.5);
        state.apply(&mut skeleton);
        assert!((skeleton.bones[1].rotation - 45.0).abs() < 0.01);
    }

    #[test]
    fn test_unknown_animation_returns_none() {
        let (mut state, _) = state();
        assert!(state.set_animation(0, "run", false).is_none());
    }

    #[test]
    fn test_non_looping_clamps_at_end() {
        let (mut state, mut skeleton) = state();
        state.set_animation(0, "walk", false).unwrap();
        state.update(2.0);
        state.apply(&mut skeleton);
        let first = skeleton.bones[1].rotation;
        state.update(1.0);
        state.apply(&mut skeleton);
        assert!((skeleton.bones[1].rotation - first).abs() < 0.0001);
        assert!((first - 90.0).abs() < 0.01);
    }

    #[test]
    fn test_looping_wraps_track_time() {
        let (mut state, mut skeleton) = state();
        let entry = state.set_animation(0, "walk", true).unwrap();
        for _ in 0..10 {
            state.update(1.0);
            state.apply(&mut skeleton);
        }
        let track_time = state.entry(entry).unwrap().track_time;
        assert!((track_time - 10.0).abs() < 0.0001);
        // Animation time is congruent to 0 modulo the duration.
        let animation_time = state.entry(entry).unwrap().animation_time();
        assert!(animation_time < 1.0);
    }

    #[test]
    fn test_crossfade_alpha_midpoint() {
        let (mut state, mut skeleton) = state();
        state.set_animation(0, "idle", true).unwrap();
        state.update(0.5);
        state.apply(&mut skeleton);

        let jump = state.set_animation(0, "walk", false).unwrap();
        state.entry_mut(jump).unwrap().mix_duration = 0.2;
        state.update(0.1);
        state.apply(&mut skeleton);
        let entry = state.entry(jump).unwrap();
        assert!((entry.mix_time / entry.mix_duration - 0.5).abs() < 0.001);
        // The superseded entry is still being mixed from.
        assert!(entry.mixing_from.is_some());
    }

    #[test]
    fn test_mix_completion_disposes_from_entry() {
        let (mut state, mut skeleton) = state();
        state.set_animation(0, "idle", true).unwrap();
        state.update(0.1);
        state.apply(&mut skeleton);

        let walk = state.set_animation(0, "walk", true).unwrap();
        state.entry_mut(walk).unwrap().mix_duration = 0.2;
        let from = state.entry(walk).unwrap().mixing_from.unwrap();

        // Advance well past the mix duration.
        for _ in 0..4 {
            state.update(0.1);
            state.apply(&mut skeleton);
        }
        assert!(state.entry(walk).unwrap().mixing_from.is_none());
        assert!(state.entry(from).is_none());
    }

    #[test]
    fn test_start_and_complete_events() {
        let (mut state, mut skeleton) = state();
        state.set_animation(0, "walk", false).unwrap();
        state.update(0.0);
        state.apply(&mut skeleton);
        state.update(1.5);
        state.apply(&mut skeleton);
        let events = state.drain_events();
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert!(types.contains(&EventType::Start));
        assert!(types.contains(&EventType::Complete));
    }

    #[test]
    fn test_add_animation_queues_after_current() {
        let (mut state, mut skeleton) = state();
        state.set_animation(0, "walk", false).unwrap();
        let queued = state.add_animation(0, "idle", false, 0.0).unwrap();
        // Delay computed from the predecessor's duration.
        assert!((state.entry(queued).unwrap().delay - 1.0).abs() < 0.0001);

        state.update(0.5);
        state.apply(&mut skeleton);
        assert_eq!(
            state
                .entry(state.get_current(0).unwrap())
                .unwrap()
                .animation()
                .name
                .as_ref(),
            "walk"
        );
        // The queued entry promotes once the track time passes its delay.
        state.update(0.75);
        state.apply(&mut skeleton);
        state.update(0.1);
        state.apply(&mut skeleton);
        assert_eq!(
            state
                .entry(state.get_current(0).unwrap())
                .unwrap()
                .animation()
                .name
                .as_ref(),
            "idle"
        );
    }

    #[test]
    fn test_clear_track_ends_entry() {
        let (mut state, mut skeleton) = state();
        let entry = state.set_animation(0, "walk", true).unwrap();
        state.update(0.1);
        state.apply(&mut skeleton);
        state.clear_track(0);
        assert!(state.get_current(0).is_none());
        assert!(state.entry(entry).is_none());
        let events = state.drain_events();
        assert!(events.iter().any(|e| e.event_type == EventType::End));
        // Dispose notifications are delivered last.
        assert_eq!(events.last().unwrap().event_type, EventType::Dispose);
    }

    #[test]
    fn test_empty_animation_fades_to_setup() {
        let (mut state, mut skeleton) = state();
        state.set_animation(0, "walk", true).unwrap();
        state.update(0.5);
        state.apply(&mut skeleton);
        assert!(skeleton.bones[1].rotation > 40.0);

        state.set_empty_animation(0, 0.2);
        state.update(0.1);
        state.apply(&mut skeleton);
        let mid = skeleton.bones[1].rotation;
        assert!(mid > 1.0 && mid < 45.0);

        state.update(0.5);
        state.apply(&mut skeleton);
        state.update(0.5);
        state.apply(&mut skeleton);
        assert!(skeleton.bones[1].rotation.abs() < 0.01);
    }

    #[test]
    fn test_stale_handle_reads_none() {
        let (mut state, mut skeleton) = state();
        let entry = state.set_animation(0, "walk", false).unwrap();
        state.update(0.1);
        state.apply(&mut skeleton);
        state.clear_tracks();
        assert!(state.entry(entry).is_none());
        // A new entry may reuse the slot; the old handle stays dead.
        let replacement = state.set_animation(0, "idle", false).unwrap();
        assert!(state.entry(replacement).is_some());
        assert!(state.entry(entry).is_none());
    }

    #[test]
    fn test_track_entry_tunables_via_handle() {
        let (mut state, _) = state();
        let entry = state.set_animation(0, "walk", true).unwrap();
        {
            let e = state.entry_mut(entry).unwrap();
            e.time_scale = 2.0;
            e.alpha = 0.5;
        }
        let e = state.entry(entry).unwrap();
        assert!((e.time_scale - 2.0).abs() < 0.0001);
        assert!((e.alpha - 0.5).abs() < 0.0001);
    }
}
