// Copyright 2026 the Scanout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The buffer ring.
//!
//! A fixed set of slots, each in one of three states:
//!
//! ```text
//!            acquire_back_buffer            mark_in_flight
//!   Free ─────────────────────────► Rendering ─────────────► InFlight
//!    ▲                                  │                        │
//!    │          cancel_rendering        │                        │
//!    ├──────────────────────────────────┘                        │
//!    │              reclaim (release observed)                   │
//!    └───────────────────────────────────────────────────────────┘
//! ```
//!
//! In-flight buffers are split in two groups. The **front** buffer is the one
//! most recently submitted; the display may be scanning it out and nothing can
//! release it until another buffer replaces it. Every older in-flight buffer is
//! **retiring**: it has been superseded and waits for its release fence. The
//! retiring queue is FIFO, which matches the order the display lets go of
//! buffers.
//!
//! Storage is allocated lazily, the first time a slot is acquired, and
//! destroyed only by [`BufferRing::destroy_buffers`].

use std::collections::VecDeque;

use crate::backend::BufferAllocator;
use crate::buffer::{BufferDesc, BufferId, FrameBuffer};
use crate::fence::{FenceWaiter, NativeFence};
use crate::{PresentError, PresentResult};

/// Largest supported ring.
pub const MAX_BUFFERS: usize = 8;

/// Lifecycle state of one ring slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferState {
    /// Available for rendering.
    Free,
    /// Acquired by the render stage; not yet accepted by the compositor.
    Rendering,
    /// Accepted by the compositor; waiting for the display to release it.
    InFlight,
}

/// Per-state slot counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Occupancy {
    /// Slots in [`BufferState::Free`].
    pub free: u8,
    /// Slots in [`BufferState::Rendering`].
    pub rendering: u8,
    /// Slots in [`BufferState::InFlight`], front included.
    pub in_flight: u8,
    /// In-flight slots that have been superseded and await release.
    pub retiring: u8,
}

struct Slot<H> {
    buffer: Option<FrameBuffer<H>>,
    state: BufferState,
    release: Option<NativeFence>,
    uses: u64,
}

/// Fixed-size ring of presentable buffers.
pub struct BufferRing<H> {
    desc: BufferDesc,
    slots: Vec<Slot<H>>,
    depth: usize,
    front: Option<BufferId>,
    retiring: VecDeque<BufferId>,
    rendering: Option<BufferId>,
    cursor: usize,
}

impl<H> BufferRing<H> {
    /// Creates a ring of `count` unallocated slots.
    ///
    /// `depth` is the maximum number of retiring buffers; it must leave at
    /// least the front buffer and one renderable slot, so `1..count`.
    pub fn new(count: usize, depth: usize, desc: BufferDesc) -> PresentResult<Self> {
        if !(2..=MAX_BUFFERS).contains(&count) {
            return Err(PresentError::invalid_config(format!(
                "buffer count {count} outside 2..={MAX_BUFFERS}"
            )));
        }
        if depth == 0 || depth >= count {
            return Err(PresentError::invalid_config(format!(
                "pipeline depth {depth} outside 1..{count}"
            )));
        }
        let slots = (0..count)
            .map(|_| Slot {
                buffer: None,
                state: BufferState::Free,
                release: None,
                uses: 0,
            })
            .collect();
        Ok(Self {
            desc,
            slots,
            depth,
            front: None,
            retiring: VecDeque::with_capacity(count),
            rendering: None,
            cursor: 0,
        })
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Returns a buffer in [`BufferState::Rendering`].
    ///
    /// Slots are tried round-robin starting after the last one acquired. If
    /// none is free, the oldest retiring buffer's release fence is waited on
    /// through `waiter` and that buffer is reused. If nothing is free or
    /// retiring, fails with [`PresentError::BufferExhausted`].
    pub fn acquire_back_buffer<A>(
        &mut self,
        allocator: &mut A,
        waiter: &FenceWaiter,
    ) -> PresentResult<BufferId>
    where
        A: BufferAllocator<Handle = H>,
    {
        if let Some(id) = self.rendering {
            return Err(PresentError::InvalidTransition {
                buffer: id,
                from: BufferState::Rendering,
                to: BufferState::Rendering,
            });
        }
        let id = loop {
            if let Some(id) = self.next_free() {
                break id;
            }
            if self.retiring.is_empty() {
                return Err(PresentError::BufferExhausted {
                    slots: self.slots.len(),
                });
            }
            self.wait_oldest(waiter)?;
        };

        let desc = self.desc;
        let slot = &mut self.slots[id.index()];
        if slot.buffer.is_none() {
            let handle = allocator.allocate(id, &desc)?;
            slot.buffer = Some(FrameBuffer::new(id, desc, handle));
            tracing::debug!(buffer = ?id, ?desc, "buffer allocated");
        }
        slot.state = BufferState::Rendering;
        slot.uses += 1;
        self.rendering = Some(id);
        self.cursor = (id.index() + 1) % self.slots.len();
        Ok(id)
    }

    /// Moves the rendering buffer to [`BufferState::InFlight`] and makes it
    /// the front buffer. The previous front becomes retiring.
    ///
    /// `release` is the fence the compositor returned for `id`, if any.
    pub fn mark_in_flight(
        &mut self,
        id: BufferId,
        release: Option<NativeFence>,
    ) -> PresentResult<()> {
        let slot = self.slot_mut(id)?;
        if slot.state != BufferState::Rendering {
            return Err(PresentError::InvalidTransition {
                buffer: id,
                from: slot.state,
                to: BufferState::InFlight,
            });
        }
        slot.state = BufferState::InFlight;
        slot.release = release;
        self.rendering = None;
        if let Some(previous) = self.front.replace(id) {
            self.retiring.push_back(previous);
        }
        debug_assert!(
            self.retiring.len() <= self.depth,
            "retiring queue exceeds pipeline depth"
        );
        Ok(())
    }

    /// Returns a retiring buffer to [`BufferState::Free`] and disposes its
    /// release fence.
    ///
    /// Fails with [`PresentError::ReleaseNotObserved`] if `id` is the front
    /// buffer or its release fence has not been observed as signaled. A
    /// buffer without a release fence is released as soon as it is
    /// superseded.
    pub fn reclaim(&mut self, id: BufferId) -> PresentResult<()> {
        let state = self.slot_mut(id)?.state;
        if state != BufferState::InFlight {
            return Err(PresentError::InvalidTransition {
                buffer: id,
                from: state,
                to: BufferState::Free,
            });
        }
        let Some(position) = self.retiring.iter().position(|b| *b == id) else {
            return Err(PresentError::ReleaseNotObserved { buffer: id });
        };
        let slot = &mut self.slots[id.index()];
        if slot.release.as_ref().is_some_and(|f| !f.is_signaled()) {
            return Err(PresentError::ReleaseNotObserved { buffer: id });
        }
        if let Some(fence) = slot.release.take() {
            fence.dispose();
        }
        slot.state = BufferState::Free;
        self.retiring.remove(position);
        tracing::trace!(buffer = ?id, "buffer reclaimed");
        Ok(())
    }

    /// Returns a rendering buffer to [`BufferState::Free`] without presenting
    /// it.
    pub fn cancel_rendering(&mut self, id: BufferId) -> PresentResult<()> {
        let slot = self.slot_mut(id)?;
        if slot.state != BufferState::Rendering {
            return Err(PresentError::InvalidTransition {
                buffer: id,
                from: slot.state,
                to: BufferState::Free,
            });
        }
        slot.state = BufferState::Free;
        self.rendering = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Release observation
    // ------------------------------------------------------------------

    /// Blocks on the oldest retiring buffer's release fence and reclaims it.
    pub fn wait_oldest(&mut self, waiter: &FenceWaiter) -> PresentResult<BufferId> {
        let Some(&id) = self.retiring.front() else {
            return Err(PresentError::BufferExhausted {
                slots: self.slots.len(),
            });
        };
        if let Some(fence) = self.slots[id.index()].release.as_mut() {
            waiter.wait(fence)?;
        }
        self.reclaim(id)?;
        Ok(id)
    }

    /// Blocks until no buffer is retiring. Returns the reclaimed ids in
    /// release order.
    pub fn wait_retiring(&mut self, waiter: &FenceWaiter) -> PresentResult<Vec<BufferId>> {
        let mut reclaimed = Vec::with_capacity(self.retiring.len());
        while !self.retiring.is_empty() {
            reclaimed.push(self.wait_oldest(waiter)?);
        }
        Ok(reclaimed)
    }

    /// Makes room for the front buffer to retire without exceeding the
    /// pipeline depth, waiting on the oldest retiring buffers as needed.
    pub fn reserve_retirement(&mut self, waiter: &FenceWaiter) -> PresentResult<Vec<BufferId>> {
        let mut reclaimed = Vec::new();
        while self.front.is_some() && self.retiring.len() >= self.depth {
            reclaimed.push(self.wait_oldest(waiter)?);
        }
        Ok(reclaimed)
    }

    /// Polls every retiring buffer's release fence without blocking and
    /// reclaims those that have signaled.
    pub fn collect_released(&mut self) -> PresentResult<Vec<BufferId>> {
        let mut reclaimed = Vec::new();
        let candidates: Vec<BufferId> = self.retiring.iter().copied().collect();
        for id in candidates {
            let ready = match self.slots[id.index()].release.as_mut() {
                Some(fence) => fence.poll()?,
                None => true,
            };
            if ready {
                self.reclaim(id)?;
                reclaimed.push(id);
            }
        }
        Ok(reclaimed)
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Disposes every outstanding release fence and returns all slots to
    /// [`BufferState::Free`]. Returns the number of fences disposed.
    ///
    /// Used on cancellation and shutdown, when the display will not be asked
    /// for the buffers again.
    pub fn abandon_in_flight(&mut self) -> usize {
        let mut disposed = 0;
        for slot in &mut self.slots {
            if let Some(fence) = slot.release.take() {
                fence.dispose();
                disposed += 1;
            }
            slot.state = BufferState::Free;
        }
        self.front = None;
        self.retiring.clear();
        self.rendering = None;
        disposed
    }

    /// Hands every allocated buffer back to `allocator`. Returns how many
    /// were destroyed.
    pub fn destroy_buffers<A>(&mut self, allocator: &mut A) -> usize
    where
        A: BufferAllocator<Handle = H>,
    {
        let mut destroyed = 0;
        for slot in &mut self.slots {
            if let Some(buffer) = slot.buffer.take() {
                tracing::debug!(buffer = ?buffer.id(), uses = slot.uses, "buffer destroyed");
                allocator.destroy(buffer.into_handle());
                destroyed += 1;
            }
        }
        destroyed
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`; a ring has at least two slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of retiring buffers.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Allocation description shared by all slots.
    #[must_use]
    pub const fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// State of slot `id`, or `None` if out of range.
    #[must_use]
    pub fn state(&self, id: BufferId) -> Option<BufferState> {
        self.slots.get(id.index()).map(|s| s.state)
    }

    /// The allocated buffer in slot `id`.
    #[must_use]
    pub fn buffer(&self, id: BufferId) -> Option<&FrameBuffer<H>> {
        self.slots.get(id.index()).and_then(|s| s.buffer.as_ref())
    }

    /// The release fence held for slot `id`.
    #[must_use]
    pub fn release_fence(&self, id: BufferId) -> Option<&NativeFence> {
        self.slots.get(id.index()).and_then(|s| s.release.as_ref())
    }

    /// How many times slot `id` has been acquired.
    #[must_use]
    pub fn uses(&self, id: BufferId) -> u64 {
        self.slots.get(id.index()).map_or(0, |s| s.uses)
    }

    /// Most recently submitted buffer.
    #[must_use]
    pub const fn front(&self) -> Option<BufferId> {
        self.front
    }

    /// Buffer currently being rendered.
    #[must_use]
    pub const fn rendering(&self) -> Option<BufferId> {
        self.rendering
    }

    /// Retiring buffers, oldest first.
    pub fn retiring(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.retiring.iter().copied()
    }

    /// Number of allocated slots.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.slots.iter().filter(|s| s.buffer.is_some()).count()
    }

    /// Per-state counts.
    #[must_use]
    pub fn occupancy(&self) -> Occupancy {
        let mut occ = Occupancy::default();
        for slot in &self.slots {
            match slot.state {
                BufferState::Free => occ.free += 1,
                BufferState::Rendering => occ.rendering += 1,
                BufferState::InFlight => occ.in_flight += 1,
            }
        }
        occ.retiring = u8::try_from(self.retiring.len()).unwrap_or(u8::MAX);
        occ
    }

    /// `(id, state)` for every slot in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(BufferId, BufferState)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (slot_id(i), s.state))
            .collect()
    }

    /// Verifies the ring's structural invariants: at most one rendering
    /// buffer, the front and retiring buffers are exactly the in-flight ones,
    /// and the retiring queue fits the pipeline depth.
    pub fn check_invariants(&self) -> PresentResult<()> {
        let occ = self.occupancy();
        let fail = |what: &str| {
            Err(PresentError::invalid_config(format!(
                "ring invariant violated: {what} ({occ:?})"
            )))
        };
        if occ.rendering > 1 {
            return fail("more than one rendering buffer");
        }
        if usize::from(occ.in_flight) != self.retiring.len() + usize::from(self.front.is_some()) {
            return fail("in-flight set does not match front and retiring");
        }
        if self.retiring.len() > self.depth {
            return fail("retiring queue exceeds pipeline depth");
        }
        if self
            .front
            .is_some_and(|id| self.state(id) != Some(BufferState::InFlight))
        {
            return fail("front buffer is not in flight");
        }
        Ok(())
    }

    fn next_free(&self) -> Option<BufferId> {
        let len = self.slots.len();
        (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&i| self.slots[i].state == BufferState::Free)
            .map(slot_id)
    }

    fn slot_mut(&mut self, id: BufferId) -> PresentResult<&mut Slot<H>> {
        let slots = self.slots.len();
        self.slots.get_mut(id.index()).ok_or_else(|| {
            PresentError::invalid_config(format!("{id:?} outside ring of {slots}"))
        })
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "slot indices are bounded by MAX_BUFFERS"
)]
fn slot_id(index: usize) -> BufferId {
    BufferId(index as u32)
}

impl<H> core::fmt::Debug for BufferRing<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferRing")
            .field("desc", &self.desc)
            .field("depth", &self.depth)
            .field("front", &self.front)
            .field("retiring", &self.retiring)
            .field("rendering", &self.rendering)
            .field("states", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::fence::{FenceLedger, FenceOwner};
    use crate::testing::{FakeAllocator, FenceTrigger, ManualFence};
    use std::time::Duration;

    fn waiter() -> FenceWaiter {
        FenceWaiter::new(
            Some(Duration::from_millis(20)),
            Duration::from_millis(2),
            CancelToken::new(),
        )
    }

    fn release(ledger: &FenceLedger) -> (NativeFence, FenceTrigger) {
        let (sync, trigger) = ManualFence::pending();
        (
            NativeFence::new(Box::new(sync), FenceOwner::Display, ledger),
            trigger,
        )
    }

    #[test]
    fn rejects_degenerate_sizes() {
        let desc = BufferDesc::default();
        assert!(BufferRing::<u32>::new(1, 1, desc).is_err(), "one slot");
        assert!(BufferRing::<u32>::new(2, 2, desc).is_err(), "depth == count");
        assert!(BufferRing::<u32>::new(3, 0, desc).is_err(), "zero depth");
        assert!(BufferRing::<u32>::new(MAX_BUFFERS + 1, 1, desc).is_err());
        assert!(BufferRing::<u32>::new(3, 2, desc).is_ok());
    }

    #[test]
    fn allocation_is_lazy_and_round_robin() {
        let mut alloc = FakeAllocator::new();
        let mut ring = BufferRing::new(3, 2, BufferDesc::default()).expect("ring");
        assert_eq!(ring.allocated(), 0, "nothing allocated up front");

        let a = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("a");
        ring.mark_in_flight(a, None).expect("a in flight");
        let b = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("b");
        assert_eq!((a, b), (BufferId(0), BufferId(1)));
        assert_eq!(ring.allocated(), 2, "allocated on first acquire");
        assert_eq!(alloc.allocations(), 2);
    }

    #[test]
    fn second_acquire_without_submit_is_rejected() {
        let mut alloc = FakeAllocator::new();
        let mut ring = BufferRing::new(2, 1, BufferDesc::default()).expect("ring");
        let a = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("a");
        let err = ring.acquire_back_buffer(&mut alloc, &waiter()).unwrap_err();
        assert!(
            matches!(err, PresentError::InvalidTransition { buffer, .. } if buffer == a),
            "got {err:?}"
        );
    }

    #[test]
    fn reclaim_requires_observed_release() {
        let ledger = FenceLedger::new();
        let mut alloc = FakeAllocator::new();
        let mut ring = BufferRing::new(2, 1, BufferDesc::default()).expect("ring");

        let a = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("a");
        let (fence_a, trigger_a) = release(&ledger);
        ring.mark_in_flight(a, Some(fence_a)).expect("a in flight");

        let err = ring.reclaim(a).unwrap_err();
        assert!(
            matches!(err, PresentError::ReleaseNotObserved { .. }),
            "front buffer cannot be reclaimed: {err:?}"
        );

        let b = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("b");
        let (fence_b, _trigger_b) = release(&ledger);
        ring.mark_in_flight(b, Some(fence_b)).expect("b in flight");
        assert_eq!(ring.retiring().collect::<Vec<_>>(), vec![a]);

        trigger_a.signal();
        let err = ring.reclaim(a).unwrap_err();
        assert!(
            matches!(err, PresentError::ReleaseNotObserved { .. }),
            "signal must be observed through the fence, not assumed: {err:?}"
        );

        assert_eq!(ring.collect_released().expect("collect"), vec![a]);
        assert_eq!(ring.state(a), Some(BufferState::Free));
        assert_eq!(ledger.outstanding(), 1, "a's release fence disposed");
    }

    #[test]
    fn exhausted_when_nothing_is_free_or_retiring() {
        let mut alloc = FakeAllocator::new();
        let mut ring = BufferRing::new(2, 1, BufferDesc::default()).expect("ring");
        let a = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("a");
        ring.mark_in_flight(a, None).expect("a");
        let b = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("b");
        ring.cancel_rendering(b).expect("cancel b");
        // Force b into flight without retiring a to starve the ring.
        let b = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("b again");
        ring.slots[b.index()].state = BufferState::InFlight;
        ring.rendering = None;

        let err = ring.acquire_back_buffer(&mut alloc, &waiter()).unwrap_err();
        assert!(
            matches!(err, PresentError::BufferExhausted { slots: 2 }),
            "got {err:?}"
        );
    }

    #[test]
    fn acquire_waits_for_oldest_release() {
        let ledger = FenceLedger::new();
        let mut alloc = FakeAllocator::new();
        let mut ring = BufferRing::new(2, 1, BufferDesc::default()).expect("ring");

        let a = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("a");
        let (fence_a, trigger_a) = release(&ledger);
        ring.mark_in_flight(a, Some(fence_a)).expect("a");
        let b = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("b");
        let (fence_b, _trigger_b) = release(&ledger);
        ring.mark_in_flight(b, Some(fence_b)).expect("b");

        // No free slot: acquiring must wait for a's release.
        let err = ring.acquire_back_buffer(&mut alloc, &waiter()).unwrap_err();
        assert!(
            matches!(err, PresentError::FenceTimeout { .. }),
            "unsignaled release times out: {err:?}"
        );
        assert_eq!(ring.state(a), Some(BufferState::InFlight), "a untouched");

        trigger_a.signal();
        let again = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("a reused");
        assert_eq!(again, a, "oldest retiring buffer is reused");
        assert_eq!(ring.uses(a), 2);
        assert_eq!(alloc.allocations(), 2, "reuse does not reallocate");
    }

    #[test]
    fn reserve_keeps_retiring_within_depth() {
        let ledger = FenceLedger::new();
        let mut alloc = FakeAllocator::new();
        let mut ring = BufferRing::new(3, 1, BufferDesc::default()).expect("ring");

        let mut triggers = Vec::new();
        for _ in 0..2 {
            let id = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("acquire");
            ring.reserve_retirement(&waiter()).expect("reserve");
            let (fence, trigger) = release(&ledger);
            ring.mark_in_flight(id, Some(fence)).expect("in flight");
            triggers.push(trigger);
        }
        assert_eq!(ring.retiring().count(), 1, "one retiring at depth 1");

        let c = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("c");
        triggers[0].signal();
        let reclaimed = ring.reserve_retirement(&waiter()).expect("reserve");
        assert_eq!(reclaimed, vec![BufferId(0)]);
        let (fence_c, _t) = release(&ledger);
        ring.mark_in_flight(c, Some(fence_c)).expect("c");
        ring.check_invariants().expect("invariants");
        assert_eq!(ring.retiring().collect::<Vec<_>>(), vec![BufferId(1)]);
    }

    #[test]
    fn missing_release_fence_frees_on_supersede() {
        let mut alloc = FakeAllocator::new();
        let mut ring = BufferRing::new(2, 1, BufferDesc::default()).expect("ring");
        let a = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("a");
        ring.mark_in_flight(a, None).expect("a");
        let b = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("b");
        ring.mark_in_flight(b, None).expect("b");

        assert_eq!(ring.wait_retiring(&waiter()).expect("wait"), vec![a]);
        assert_eq!(ring.front(), Some(b), "front stays in flight");
        assert_eq!(ring.state(b), Some(BufferState::InFlight));
    }

    #[test]
    fn abandon_disposes_all_fences() {
        let ledger = FenceLedger::new();
        let mut alloc = FakeAllocator::new();
        let mut ring = BufferRing::new(3, 2, BufferDesc::default()).expect("ring");
        for _ in 0..3 {
            let id = ring.acquire_back_buffer(&mut alloc, &waiter()).expect("acquire");
            let (fence, _trigger) = release(&ledger);
            ring.mark_in_flight(id, Some(fence)).expect("in flight");
        }
        assert_eq!(ledger.outstanding(), 3);

        assert_eq!(ring.abandon_in_flight(), 3);
        assert_eq!(ledger.outstanding(), 0, "every release fence disposed");
        assert_eq!(ring.occupancy().free, 3);
        ring.check_invariants().expect("clean ring");

        assert_eq!(ring.destroy_buffers(&mut alloc), 3);
        assert_eq!(alloc.destroyed(), 3);
        assert_eq!(ring.destroy_buffers(&mut alloc), 0, "idempotent");
    }
}
