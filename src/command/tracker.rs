//! Per-subresource usage tracking.
//!
//! Every resource keeps its committed usage behind a mutex. A stream copies
//! that state into a local overlay the first time it touches the resource and
//! writes the overlay back when it is finalized, so a stream that gets dropped
//! leaves the committed state as it was.
//!
//! Each slot also remembers the synchronization point (one per barrier flush)
//! that last touched it. Two requests for the same subresource at the same
//! point must agree on the usage.
use std::{collections::HashMap, fmt::Debug, ops::BitOr, ops::Range, sync::Arc};

use ash::vk;
use smallvec::SmallVec;

use super::sync::{
    AccelerationStructureUsageBit, BufferUsageBit, TextureUsageBit, UsageTransition,
};
use crate::{
    accel_struct::AccelerationStructure,
    resources::{Buffer, ResourceId, Texture, TextureSubresource},
};

pub(crate) trait TrackedUsage: Copy + Eq + Debug + BitOr<Output = Self> {
    fn is_unused(self) -> bool;
    fn writes(self) -> bool;
}

impl TrackedUsage for TextureUsageBit {
    fn is_unused(self) -> bool {
        self.is_empty()
    }
    fn writes(self) -> bool {
        self.has_writes()
    }
}

impl TrackedUsage for BufferUsageBit {
    fn is_unused(self) -> bool {
        self.is_empty()
    }
    fn writes(self) -> bool {
        self.has_writes()
    }
}

impl TrackedUsage for AccelerationStructureUsageBit {
    fn is_unused(self) -> bool {
        self.is_empty()
    }
    fn writes(self) -> bool {
        self.has_writes()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) struct Slot<U> {
    /// Everything the subresource may be accessed as since the last barrier.
    usage: U,
    /// Usage asked for at `sync_point`.
    requested: U,
    sync_point: u64,
}

impl<U: TrackedUsage> Slot<U> {
    fn committed(usage: U) -> Self {
        Self {
            usage,
            requested: usage,
            sync_point: 0,
        }
    }
}

pub(crate) type AccelerationStructureState = Slot<AccelerationStructureUsageBit>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision<U> {
    Keep,
    Merge(U),
    Barrier { prev: U },
}

fn decide<U: TrackedUsage>(
    slot: &Slot<U>,
    next: U,
    sync_point: u64,
    first_use_barrier: bool,
    compatible: impl Fn(U, U) -> bool,
) -> Decision<U> {
    if slot.sync_point == sync_point {
        assert!(
            slot.requested == next,
            "conflicting usages {:?} and {:?} requested for one subresource at the same synchronization point",
            slot.requested,
            next
        );
        return Decision::Keep;
    }
    let prev = slot.usage;
    if prev.is_unused() {
        return if first_use_barrier {
            Decision::Barrier { prev }
        } else {
            Decision::Merge(next)
        };
    }
    if prev.writes() || next.writes() || !compatible(prev, next) {
        Decision::Barrier { prev }
    } else if prev == next {
        Decision::Keep
    } else {
        Decision::Merge(prev | next)
    }
}

fn apply<U: TrackedUsage>(slot: &mut Slot<U>, decision: Decision<U>, next: U, sync_point: u64) {
    match decision {
        Decision::Keep => {}
        Decision::Merge(usage) => slot.usage = usage,
        Decision::Barrier { .. } => slot.usage = next,
    }
    slot.requested = next;
    slot.sync_point = sync_point;
}

#[derive(Clone, Debug)]
pub(crate) struct TextureState {
    slots: Vec<Slot<TextureUsageBit>>,
}

impl TextureState {
    pub(crate) fn new(slot_count: usize, initial: TextureUsageBit) -> Self {
        Self {
            slots: vec![Slot::committed(initial); slot_count],
        }
    }

    fn committed(mut self) -> Self {
        for slot in self.slots.iter_mut() {
            *slot = Slot::committed(slot.usage);
        }
        self
    }
}

/// Sorted, non-overlapping ranges covering the whole buffer.
#[derive(Clone, Debug)]
pub(crate) struct BufferState {
    ranges: Vec<(Range<vk::DeviceSize>, Slot<BufferUsageBit>)>,
}

impl BufferState {
    pub(crate) fn new(size: vk::DeviceSize) -> Self {
        Self {
            ranges: vec![(0..size, Slot::committed(BufferUsageBit::empty()))],
        }
    }

    fn split_at(&mut self, at: vk::DeviceSize) {
        if let Some(i) = self
            .ranges
            .iter()
            .position(|(range, _)| range.start < at && at < range.end)
        {
            let (range, slot) = self.ranges[i].clone();
            self.ranges[i].0 = range.start..at;
            self.ranges.insert(i + 1, (at..range.end, slot));
        }
    }

    fn coalesce(&mut self) {
        self.ranges.dedup_by(|(next, next_slot), (prev, prev_slot)| {
            if next_slot == prev_slot && prev.end == next.start {
                prev.end = next.end;
                true
            } else {
                false
            }
        });
    }

    fn committed(mut self) -> Self {
        for (_, slot) in self.ranges.iter_mut() {
            *slot = Slot::committed(slot.usage);
        }
        self.coalesce();
        self
    }

    fn usage_at(&self, offset: vk::DeviceSize) -> BufferUsageBit {
        self.ranges
            .iter()
            .find(|(range, _)| range.contains(&offset))
            .map_or(BufferUsageBit::empty(), |(_, slot)| slot.usage)
    }
}

/// A texture barrier owed for one range of subresources.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TextureTransition {
    pub prev: TextureUsageBit,
    pub transition: UsageTransition,
    pub range: vk::ImageSubresourceRange,
}

impl TextureTransition {
    fn same_barrier(&self, other: &Self) -> bool {
        self.prev == other.prev
            && self.transition == other.transition
            && self.range.aspect_mask == other.range.aspect_mask
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BufferTransition {
    pub prev: BufferUsageBit,
    pub range: (vk::DeviceSize, vk::DeviceSize),
}

struct TrackedTexture {
    texture: Arc<Texture>,
    state: TextureState,
}

struct TrackedBuffer {
    buffer: Arc<Buffer>,
    state: BufferState,
}

struct TrackedAccelerationStructure {
    acceleration_structure: Arc<AccelerationStructure>,
    state: AccelerationStructureState,
}

pub(crate) struct SubresourceTracker {
    sync_point: u64,
    textures: HashMap<ResourceId, TrackedTexture>,
    buffers: HashMap<ResourceId, TrackedBuffer>,
    acceleration_structures: HashMap<ResourceId, TrackedAccelerationStructure>,
}

impl Default for SubresourceTracker {
    fn default() -> Self {
        Self {
            sync_point: 1,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            acceleration_structures: HashMap::new(),
        }
    }
}

impl SubresourceTracker {
    /// Starts a new synchronization point. Called whenever barriers are flushed.
    pub(crate) fn advance(&mut self) {
        self.sync_point += 1;
    }

    fn texture_state(&mut self, texture: &Arc<Texture>) -> &mut TextureState {
        &mut self
            .textures
            .entry(texture.id())
            .or_insert_with(|| TrackedTexture {
                texture: texture.clone(),
                state: texture.tracked.lock().clone(),
            })
            .state
    }

    fn buffer_state(&mut self, buffer: &Arc<Buffer>) -> &mut BufferState {
        &mut self
            .buffers
            .entry(buffer.id())
            .or_insert_with(|| TrackedBuffer {
                buffer: buffer.clone(),
                state: buffer.tracked.lock().clone(),
            })
            .state
    }

    /// Moves `subresource` to `next` and returns the barriers that are owed.
    /// Mips of a layer with identical transitions come back as one range, as do
    /// layers with identical mip ranges and the two aspects of a depth-stencil surface.
    pub(crate) fn transition_texture(
        &mut self,
        texture: &Arc<Texture>,
        subresource: &TextureSubresource,
        next: TextureUsageBit,
    ) -> SmallVec<[TextureTransition; 4]> {
        assert!(
            texture.subresource_valid(subresource),
            "invalid subresource {:?}",
            subresource
        );
        let sync_point = self.sync_point;
        let traits = texture.surface_traits();
        let aspect_slots = texture.aspect_slots(subresource.aspect);
        let state = self.texture_state(texture);
        let mut owed: SmallVec<[TextureTransition; 4]> = SmallVec::new();

        for layer in subresource.first_layer..subresource.first_layer + subresource.layer_count {
            for face in subresource.first_face..subresource.first_face + subresource.face_count {
                let vk_layer = texture.vk_array_layer(layer, face);
                let mut runs: SmallVec<[TextureTransition; 4]> = SmallVec::new();
                for mip in subresource.first_mip..subresource.first_mip + subresource.mip_count {
                    let compatible = |prev: TextureUsageBit, next: TextureUsageBit| {
                        let layout = next.layout(traits, mip);
                        prev.layout(traits, mip) == layout && (prev | next).layout(traits, mip) == layout
                    };
                    let mut pending: SmallVec<[(TextureUsageBit, vk::ImageAspectFlags); 2]> =
                        SmallVec::new();
                    for &(aspect_slot, aspect_mask) in aspect_slots.iter() {
                        let slot = &mut state.slots[texture.slot_index(mip, vk_layer, aspect_slot)];
                        let decision = decide(slot, next, sync_point, true, compatible);
                        if let Decision::Barrier { prev } = decision {
                            pending.push((prev, aspect_mask));
                        }
                        apply(slot, decision, next, sync_point);
                    }
                    if pending.len() == 2 && pending[0].0 == pending[1].0 {
                        let aspect_mask = pending[0].1 | pending[1].1;
                        pending[0].1 = aspect_mask;
                        pending.truncate(1);
                    }
                    for (prev, aspect_mask) in pending {
                        let candidate = TextureTransition {
                            prev,
                            transition: texture.derive_transition(prev, next, mip),
                            range: vk::ImageSubresourceRange {
                                aspect_mask,
                                base_mip_level: mip,
                                level_count: 1,
                                base_array_layer: vk_layer,
                                layer_count: 1,
                            },
                        };
                        match runs.iter_mut().rev().find(|run| run.same_barrier(&candidate)) {
                            Some(run) if run.range.base_mip_level + run.range.level_count == mip => {
                                run.range.level_count += 1;
                            }
                            _ => runs.push(candidate),
                        }
                    }
                }
                for run in runs {
                    let adjacent = owed.iter_mut().find(|t| {
                        t.same_barrier(&run)
                            && t.range.base_mip_level == run.range.base_mip_level
                            && t.range.level_count == run.range.level_count
                            && t.range.base_array_layer + t.range.layer_count
                                == run.range.base_array_layer
                    });
                    match adjacent {
                        Some(t) => t.range.layer_count += 1,
                        None => owed.push(run),
                    }
                }
            }
        }
        owed
    }

    /// Moves `range` of the buffer to `next`. Adjacent ranges owing the same
    /// barrier come back merged.
    pub(crate) fn transition_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        range: Range<vk::DeviceSize>,
        next: BufferUsageBit,
    ) -> SmallVec<[BufferTransition; 2]> {
        assert!(
            buffer.usage_valid(next),
            "buffer usage {:?} outside of the capabilities {:?}",
            next,
            buffer.usage()
        );
        let sync_point = self.sync_point;
        let state = self.buffer_state(buffer);
        state.split_at(range.start);
        state.split_at(range.end);

        let mut owed: SmallVec<[BufferTransition; 2]> = SmallVec::new();
        for (slot_range, slot) in state
            .ranges
            .iter_mut()
            .filter(|(r, _)| r.start >= range.start && r.end <= range.end)
        {
            let decision = decide(slot, next, sync_point, false, |_, _| true);
            if let Decision::Barrier { prev } = decision {
                match owed.last_mut() {
                    Some(last) if last.prev == prev && last.range.0 + last.range.1 == slot_range.start => {
                        last.range.1 += slot_range.end - slot_range.start;
                    }
                    _ => owed.push(BufferTransition {
                        prev,
                        range: (slot_range.start, slot_range.end - slot_range.start),
                    }),
                }
            }
            apply(slot, decision, next, sync_point);
        }
        state.coalesce();
        owed
    }

    /// Returns the previous usage when a barrier is owed.
    pub(crate) fn transition_acceleration_structure(
        &mut self,
        acceleration_structure: &Arc<AccelerationStructure>,
        next: AccelerationStructureUsageBit,
    ) -> Option<AccelerationStructureUsageBit> {
        assert!(
            acceleration_structure.usage_valid(next),
            "acceleration structure usage {:?} outside of the capabilities {:?}",
            next,
            acceleration_structure.usage()
        );
        let sync_point = self.sync_point;
        let slot = &mut self
            .acceleration_structures
            .entry(acceleration_structure.id())
            .or_insert_with(|| TrackedAccelerationStructure {
                acceleration_structure: acceleration_structure.clone(),
                state: *acceleration_structure.tracked.lock(),
            })
            .state;
        let decision = decide(slot, next, sync_point, false, |_, _| true);
        apply(slot, decision, next, sync_point);
        match decision {
            Decision::Barrier { prev } => Some(prev),
            _ => None,
        }
    }

    /// Overwrites the tracked usage without owing a barrier, for commands that
    /// perform their own transitions.
    pub(crate) fn set_texture_usage(
        &mut self,
        texture: &Arc<Texture>,
        subresource: &TextureSubresource,
        usage: TextureUsageBit,
    ) {
        let aspect_slots = texture.aspect_slots(subresource.aspect);
        let state = self.texture_state(texture);
        for_each_surface(texture, subresource, |mip, vk_layer| {
            for &(aspect_slot, _) in aspect_slots.iter() {
                state.slots[texture.slot_index(mip, vk_layer, aspect_slot)] = Slot::committed(usage);
            }
        });
    }

    /// Union of the usages tracked over `subresource`.
    pub(crate) fn texture_usage(
        &mut self,
        texture: &Arc<Texture>,
        subresource: &TextureSubresource,
    ) -> TextureUsageBit {
        let aspect_slots = texture.aspect_slots(subresource.aspect);
        let state = self.texture_state(texture);
        let mut usage = TextureUsageBit::empty();
        for_each_surface(texture, subresource, |mip, vk_layer| {
            for &(aspect_slot, _) in aspect_slots.iter() {
                usage |= state.slots[texture.slot_index(mip, vk_layer, aspect_slot)].usage;
            }
        });
        usage
    }

    pub(crate) fn buffer_usage(
        &mut self,
        buffer: &Arc<Buffer>,
        offset: vk::DeviceSize,
    ) -> BufferUsageBit {
        self.buffer_state(buffer).usage_at(offset)
    }

    /// Writes the overlay back into the resources.
    pub(crate) fn commit(&mut self) {
        for (_, tracked) in self.textures.drain() {
            *tracked.texture.tracked.lock() = tracked.state.committed();
        }
        for (_, tracked) in self.buffers.drain() {
            *tracked.buffer.tracked.lock() = tracked.state.committed();
        }
        for (_, tracked) in self.acceleration_structures.drain() {
            *tracked.acceleration_structure.tracked.lock() = Slot::committed(tracked.state.usage);
        }
    }
}

fn for_each_surface(
    texture: &Texture,
    subresource: &TextureSubresource,
    mut f: impl FnMut(u32, u32),
) {
    for layer in subresource.first_layer..subresource.first_layer + subresource.layer_count {
        for face in subresource.first_face..subresource.first_face + subresource.face_count {
            let vk_layer = texture.vk_array_layer(layer, face);
            for mip in subresource.first_mip..subresource.first_mip + subresource.mip_count {
                f(mip, vk_layer);
            }
        }
    }
}
