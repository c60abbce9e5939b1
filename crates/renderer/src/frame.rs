//! Frame-in-flight rotation and per-slot synchronization.
//!
//! Slot `k` of a sequence of frames is reused exactly `frames_in_flight`
//! frames later, so the fence of a slot always guards the submission made
//! the last time that slot was current.

use std::sync::Arc;

use tracing::debug;

use triangle_rhi::RhiResult;
use triangle_rhi::device::Device;
use triangle_rhi::sync::{FrameSync, wait_for_fences};
use triangle_rhi::vk;

/// Round-robin index over the frame slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    current: usize,
    count: usize,
}

impl FrameCursor {
    /// Cursor over `count` slots, starting at slot 0. A count of zero is treated as one.
    pub fn new(count: usize) -> Self {
        Self {
            current: 0,
            count: count.max(1),
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Moves to the next slot and returns it.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.count;
        self.current
    }
}

/// Owns the semaphores and fence of every frame slot.
pub struct FrameSynchronizer {
    device: Arc<Device>,
    slots: Vec<FrameSync>,
    cursor: FrameCursor,
}

impl FrameSynchronizer {
    /// Creates `frames_in_flight` slots, each with a signaled fence.
    pub fn new(device: Arc<Device>, frames_in_flight: usize) -> RhiResult<Self> {
        let cursor = FrameCursor::new(frames_in_flight);
        let slots = (0..cursor.count())
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        debug!("Created {} frame slots", slots.len());

        Ok(Self {
            device,
            slots,
            cursor,
        })
    }

    /// Synchronization objects of the current slot.
    #[inline]
    pub fn current(&self) -> &FrameSync {
        &self.slots[self.cursor.current()]
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.cursor.current()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn advance(&mut self) {
        self.cursor.advance();
    }

    /// Waits, bounded by `timeout_ns`, until every slot's fence is signaled.
    pub fn wait_all(&self, timeout_ns: u64) -> RhiResult<()> {
        let fences: Vec<vk::Fence> = self
            .slots
            .iter()
            .map(FrameSync::in_flight_fence_handle)
            .collect();
        wait_for_fences(&self.device, &fences, timeout_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triangle_core::MAX_FRAMES_IN_FLIGHT;

    #[test]
    fn test_cursor_starts_at_zero() {
        let cursor = FrameCursor::new(MAX_FRAMES_IN_FLIGHT);
        assert_eq!(cursor.current(), 0);
        assert_eq!(cursor.count(), MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_slot_reused_after_frames_in_flight_calls() {
        let mut cursor = FrameCursor::new(MAX_FRAMES_IN_FLIGHT);
        let mut used = Vec::new();
        for _ in 0..10 {
            used.push(cursor.current());
            cursor.advance();
        }

        for k in 0..used.len() - MAX_FRAMES_IN_FLIGHT {
            assert_eq!(used[k], used[k + MAX_FRAMES_IN_FLIGHT]);
            for gap in 1..MAX_FRAMES_IN_FLIGHT {
                assert_ne!(used[k], used[k + gap]);
            }
        }
    }

    #[test]
    fn test_cursor_with_three_slots() {
        let mut cursor = FrameCursor::new(3);
        assert_eq!(cursor.advance(), 1);
        assert_eq!(cursor.advance(), 2);
        assert_eq!(cursor.advance(), 0);
    }

    #[test]
    fn test_zero_slots_treated_as_one() {
        let mut cursor = FrameCursor::new(0);
        assert_eq!(cursor.count(), 1);
        assert_eq!(cursor.advance(), 0);
    }
}
