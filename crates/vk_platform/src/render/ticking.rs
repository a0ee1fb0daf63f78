//! Per-frame advancement of multi-buffered resources
//!
//! A ticking resource owns one backing slot per swapchain stage. The host
//! writes a logical value once; [`StageCursor`] then spreads that value over
//! the slots, one slot per frame, always writing the slot after the one the GPU
//! currently reads. Every registered resource ticks exactly once per frame, so
//! all of them move their read slot in lockstep with the swapchain.
//!
//! The [`TickingRegistry`] only holds weak references. A resource dropped by
//! its last owner is discovered on the next visit and its registry slot is
//! queued for reuse.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use crate::render::device::GpuDevice;
use crate::render::resources::{
    CommandBuffer, DynamicVertexBuffer, TextureBinding, UniformBinding, UniformBuffer,
};
use crate::render::RenderResult;

/// A resource that advances its read/write slot once per frame
pub trait Ticking: Send + Sync {
    /// Advance the read slot and materialize pending writes into the next slot
    fn tick(&self) -> RenderResult<()>;
}

/// Read slot and pending-write bookkeeping for a multi-buffered resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCursor {
    stages: usize,
    read_index: usize,
    leftover_writes: usize,
}

impl StageCursor {
    /// Cursor over `stages` slots with nothing pending
    pub fn new(stages: usize) -> Self {
        Self {
            stages: stages.max(1),
            read_index: 0,
            leftover_writes: 0,
        }
    }

    /// Number of backing slots
    pub const fn stages(&self) -> usize {
        self.stages
    }

    /// Slot the GPU reads this frame
    pub const fn read_index(&self) -> usize {
        self.read_index
    }

    /// Slot the next tick writes to
    pub const fn write_index(&self) -> usize {
        (self.read_index + 1) % self.stages
    }

    /// Slots that still need the latest write
    pub const fn leftover_writes(&self) -> usize {
        self.leftover_writes
    }

    /// True once the latest write has reached every slot
    pub const fn is_settled(&self) -> bool {
        self.leftover_writes == 0
    }

    /// Record a new logical write; every slot must be rewritten
    pub fn mark_written(&mut self) {
        self.leftover_writes = self.stages;
    }

    /// Advance one frame
    ///
    /// With writes pending, `write` materializes the pending value into the
    /// write slot before the read slot moves onto it. Returns whether a slot
    /// was written. On error the cursor is left untouched.
    pub fn tick_with<F>(&mut self, write: F) -> RenderResult<bool>
    where
        F: FnOnce(usize) -> RenderResult<()>,
    {
        let write_index = self.write_index();
        let wrote = if self.leftover_writes > 0 {
            write(write_index)?;
            self.leftover_writes -= 1;
            true
        } else {
            false
        };
        self.read_index = write_index;
        Ok(wrote)
    }
}

/// Weak list of ticking resources with slot reuse
pub struct TickingRegistry<T: ?Sized> {
    entries: Vec<Option<Weak<T>>>,
    free: VecDeque<usize>,
}

impl<T: ?Sized + Ticking> TickingRegistry<T> {
    /// Empty registry
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: VecDeque::new(),
        }
    }

    /// Track a resource without extending its lifetime; returns its slot
    pub fn register(&mut self, resource: &Arc<T>) -> usize {
        let weak = Some(Arc::downgrade(resource));
        if let Some(index) = self.free.pop_front() {
            log::trace!("Reusing ticking registry slot {index}");
            self.entries[index] = weak;
            index
        } else {
            self.entries.push(weak);
            self.entries.len() - 1
        }
    }

    /// Tick every live resource in registration order, reclaiming expired slots
    pub fn visit(&mut self) -> RenderResult<()> {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            let Some(weak) = entry else { continue };
            if let Some(resource) = weak.upgrade() {
                resource.tick()?;
            } else {
                *entry = None;
                self.free.push_back(index);
            }
        }
        Ok(())
    }

    /// Size of the backing storage, live or not
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of resources still alive
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .flatten()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Slots waiting for reuse
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }
}

impl<T: ?Sized + Ticking> Default for TickingRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every ticking resource created through one render context
///
/// Producers tick before their consumers: buffers first, then the bindings
/// that point descriptors at them, then the command buffers that draw them.
pub struct TickingSet<D: GpuDevice> {
    vertex_buffers: TickingRegistry<DynamicVertexBuffer<D>>,
    uniform_buffers: TickingRegistry<UniformBuffer<D>>,
    uniform_bindings: TickingRegistry<UniformBinding<D>>,
    texture_bindings: TickingRegistry<TextureBinding<D>>,
    command_buffers: TickingRegistry<CommandBuffer<D>>,
}

impl<D: GpuDevice> TickingSet<D> {
    /// Empty set
    pub const fn new() -> Self {
        Self {
            vertex_buffers: TickingRegistry::new(),
            uniform_buffers: TickingRegistry::new(),
            uniform_bindings: TickingRegistry::new(),
            texture_bindings: TickingRegistry::new(),
            command_buffers: TickingRegistry::new(),
        }
    }

    /// Track a dynamic vertex buffer
    pub fn add_vertex_buffer(&mut self, buffer: &Arc<DynamicVertexBuffer<D>>) {
        self.vertex_buffers.register(buffer);
    }

    /// Track a uniform buffer
    pub fn add_uniform_buffer(&mut self, buffer: &Arc<UniformBuffer<D>>) {
        self.uniform_buffers.register(buffer);
    }

    /// Track a uniform binding
    pub fn add_uniform_binding(&mut self, binding: &Arc<UniformBinding<D>>) {
        self.uniform_bindings.register(binding);
    }

    /// Track a texture binding
    pub fn add_texture_binding(&mut self, binding: &Arc<TextureBinding<D>>) {
        self.texture_bindings.register(binding);
    }

    /// Track a command buffer
    pub fn add_command_buffer(&mut self, buffer: &Arc<CommandBuffer<D>>) {
        self.command_buffers.register(buffer);
    }

    /// Tick everything once
    pub fn visit(&mut self) -> RenderResult<()> {
        self.vertex_buffers.visit()?;
        self.uniform_buffers.visit()?;
        self.uniform_bindings.visit()?;
        self.texture_bindings.visit()?;
        self.command_buffers.visit()
    }

    /// Number of live resources across all registries
    pub fn live_count(&self) -> usize {
        self.vertex_buffers.live_count()
            + self.uniform_buffers.live_count()
            + self.uniform_bindings.live_count()
            + self.texture_bindings.live_count()
            + self.command_buffers.live_count()
    }
}

impl<D: GpuDevice> Default for TickingSet<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Minimal ticking resource: slots of integers behind a cursor
    struct Counter {
        state: Mutex<(StageCursor, Vec<i32>, i32)>,
        ticks: AtomicUsize,
        writes: AtomicUsize,
    }

    impl Counter {
        fn new(stages: usize) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new((StageCursor::new(stages), vec![0; stages], 0)),
                ticks: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
            })
        }

        fn write(&self, value: i32) {
            let mut state = self.state.lock().unwrap();
            state.2 = value;
            state.0.mark_written();
        }

        fn slots(&self) -> Vec<i32> {
            self.state.lock().unwrap().1.clone()
        }
    }

    impl Ticking for Counter {
        fn tick(&self) -> RenderResult<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            let mut guard = self.state.lock().unwrap();
            let (cursor, slots, pending) = &mut *guard;
            let wrote = cursor.tick_with(|slot| {
                slots[slot] = *pending;
                Ok(())
            })?;
            if wrote {
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[test]
    fn test_cursor_write_index_wraps() {
        let mut cursor = StageCursor::new(3);
        assert_eq!(cursor.read_index(), 0);
        assert_eq!(cursor.write_index(), 1);
        for expected in [1, 2, 0, 1] {
            cursor.tick_with(|_| Ok(())).unwrap();
            assert_eq!(cursor.read_index(), expected);
        }
    }

    #[test]
    fn test_cursor_zero_stages_clamped() {
        let mut cursor = StageCursor::new(0);
        assert_eq!(cursor.stages(), 1);
        cursor.mark_written();
        assert!(cursor.tick_with(|slot| {
            assert_eq!(slot, 0);
            Ok(())
        })
        .unwrap());
        assert!(cursor.is_settled());
    }

    #[test]
    fn test_write_propagates_within_stage_count_ticks() {
        for stages in 1..=4 {
            let counter = Counter::new(stages);
            counter.write(1);
            counter.write(2);
            counter.write(7);
            for _ in 0..stages {
                counter.tick().unwrap();
            }
            assert_eq!(counter.slots(), vec![7; stages]);
            assert!(counter.state.lock().unwrap().0.is_settled());
        }
    }

    #[test]
    fn test_partial_propagation_leaves_read_slot_current() {
        let counter = Counter::new(3);
        counter.write(5);
        counter.tick().unwrap();

        let state = counter.state.lock().unwrap();
        let (cursor, slots, _) = &*state;
        assert_eq!(slots[cursor.read_index()], 5);
        assert_eq!(slots.iter().filter(|v| **v == 5).count(), 1);
        assert_eq!(cursor.leftover_writes(), 2);
    }

    #[test]
    fn test_settled_tick_only_advances_read_index() {
        let mut cursor = StageCursor::new(3);
        let wrote = cursor
            .tick_with(|_| Err(RenderError::InvalidOperation("must not write".into())))
            .unwrap();
        assert!(!wrote);
        assert_eq!(cursor.read_index(), 1);
    }

    #[test]
    fn test_failed_write_leaves_cursor_untouched() {
        let mut cursor = StageCursor::new(2);
        cursor.mark_written();
        let result = cursor.tick_with(|_| Err(RenderError::NoSuitableMemoryType));
        assert!(result.is_err());
        assert_eq!(cursor.read_index(), 0);
        assert_eq!(cursor.leftover_writes(), 2);
    }

    #[test]
    fn test_registry_visits_live_resources() {
        let mut registry = TickingRegistry::<Counter>::new();
        let a = Counter::new(2);
        let b = Counter::new(2);
        registry.register(&a);
        registry.register(&b);

        registry.visit().unwrap();
        registry.visit().unwrap();

        assert_eq!(a.ticks.load(Ordering::SeqCst), 2);
        assert_eq!(b.ticks.load(Ordering::SeqCst), 2);
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_registry_reuses_expired_slot() {
        let mut registry = TickingRegistry::<Counter>::new();
        let a = Counter::new(2);
        let b = Counter::new(2);
        registry.register(&a);
        let b_slot = registry.register(&b);
        let capacity = registry.capacity();

        drop(b);
        registry.visit().unwrap();

        let c = Counter::new(2);
        let c_slot = registry.register(&c);
        assert_eq!(c_slot, b_slot);
        assert_eq!(registry.capacity(), capacity);

        registry.visit().unwrap();
        assert_eq!(c.ticks.load(Ordering::SeqCst), 1);
        assert_eq!(a.ticks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expired_slot_queued_once() {
        let mut registry = TickingRegistry::<Counter>::new();
        let a = Counter::new(2);
        registry.register(&a);
        drop(a);

        registry.visit().unwrap();
        registry.visit().unwrap();
        registry.visit().unwrap();

        assert_eq!(registry.free_slots(), 1);
        let b = Counter::new(2);
        let c = Counter::new(2);
        assert_eq!(registry.register(&b), 0);
        assert_eq!(registry.register(&c), 1);
        assert_eq!(registry.capacity(), 2);
    }

    #[test]
    fn test_registry_does_not_extend_lifetime() {
        let mut registry = TickingRegistry::<Counter>::new();
        let a = Counter::new(2);
        registry.register(&a);
        assert_eq!(Arc::strong_count(&a), 1);
    }

    #[test]
    fn test_settled_resource_never_writes() {
        let counter = Counter::new(3);
        counter.write(4);
        for _ in 0..3 {
            counter.tick().unwrap();
        }
        let writes = counter.writes.load(Ordering::SeqCst);
        for _ in 0..5 {
            counter.tick().unwrap();
        }
        assert_eq!(counter.writes.load(Ordering::SeqCst), writes);
        assert_eq!(counter.slots(), vec![4, 4, 4]);
    }
}
