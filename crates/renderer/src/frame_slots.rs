//! Frame-in-flight bookkeeping.
//!
//! The renderer keeps [`MAX_FRAMES_IN_FLIGHT`] synchronization slots and one
//! entry per swapchain image recording which slot last rendered into it. This
//! module holds that state without touching the GPU so the rules can be
//! checked in isolation:
//!
//! 1. Before a slot is reused its fence is waited on; the slot becomes `Idle`.
//! 2. An acquired image that is still owned by a slot has to wait on that
//!    slot's fence too, then switches owner.
//! 3. Submission moves the slot to `Submitted`, presentation to `Presented`.
//! 4. The current slot advances modulo [`MAX_FRAMES_IN_FLIGHT`].

use vkcraft_rhi::sync::MAX_FRAMES_IN_FLIGHT;

/// Lifecycle of one frame slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    /// The slot's fence is known to be signaled.
    #[default]
    Idle,
    /// Work was submitted and is not yet handed to presentation.
    Submitted,
    /// Work was submitted and presented; the fence may still be pending.
    Presented,
}

impl SlotState {
    /// Whether GPU work recorded for this slot may still be running.
    pub fn is_pending(self) -> bool {
        !matches!(self, SlotState::Idle)
    }
}

#[derive(Clone, Debug)]
pub struct FrameSlots {
    states: [SlotState; MAX_FRAMES_IN_FLIGHT],
    current: usize,
    images_in_flight: Vec<Option<usize>>,
}

impl FrameSlots {
    pub fn new(image_count: usize) -> Self {
        Self {
            states: [SlotState::Idle; MAX_FRAMES_IN_FLIGHT],
            current: 0,
            images_in_flight: vec![None; image_count],
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn state(&self, slot: usize) -> SlotState {
        self.states[slot]
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    /// Slot that last rendered into `image`, if any.
    pub fn image_owner(&self, image: usize) -> Option<usize> {
        self.images_in_flight.get(image).copied().flatten()
    }

    /// Number of slots whose work may still be on the GPU.
    pub fn in_flight_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_pending()).count()
    }

    /// Records that `slot`'s fence was waited on.
    pub fn mark_waited(&mut self, slot: usize) {
        self.states[slot] = SlotState::Idle;
    }

    /// Hands `image` to the current slot and returns the slot whose fence
    /// must be waited on first, if the image is still owned by another frame.
    pub fn claim_image(&mut self, image: usize) -> Option<usize> {
        if image >= self.images_in_flight.len() {
            self.images_in_flight.resize(image + 1, None);
        }
        let previous = self.images_in_flight[image].replace(self.current);
        previous.filter(|&slot| slot != self.current && self.states[slot].is_pending())
    }

    pub fn mark_submitted(&mut self) {
        self.states[self.current] = SlotState::Submitted;
    }

    pub fn mark_presented(&mut self) {
        if self.states[self.current] == SlotState::Submitted {
            self.states[self.current] = SlotState::Presented;
        }
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    /// Forgets image ownership after the swapchain was rebuilt. Call only
    /// once the device is idle; every slot is `Idle` afterwards.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
        self.states = [SlotState::Idle; MAX_FRAMES_IN_FLIGHT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs one frame the way the renderer does and returns the slot whose
    /// fence had to be waited on for the image.
    fn run_frame(slots: &mut FrameSlots, image: usize) -> Option<usize> {
        let slot = slots.current();
        slots.mark_waited(slot);
        let wait = slots.claim_image(image);
        if let Some(other) = wait {
            slots.mark_waited(other);
        }
        slots.mark_submitted();
        slots.mark_presented();
        slots.advance();
        wait
    }

    #[test]
    fn test_new_slots_are_idle() {
        let slots = FrameSlots::new(3);
        assert_eq!(slots.current(), 0);
        assert_eq!(slots.in_flight_count(), 0);
        assert_eq!(slots.image_count(), 3);
        assert_eq!(slots.image_owner(0), None);
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut slots = FrameSlots::new(3);
        slots.mark_waited(0);
        assert_eq!(slots.claim_image(1), None);
        slots.mark_submitted();
        assert_eq!(slots.state(0), SlotState::Submitted);
        slots.mark_presented();
        assert_eq!(slots.state(0), SlotState::Presented);
        assert_eq!(slots.image_owner(1), Some(0));

        slots.advance();
        assert_eq!(slots.current(), 1);
        slots.advance();
        assert_eq!(slots.current(), 0);
    }

    #[test]
    fn test_present_without_submit_stays_idle() {
        let mut slots = FrameSlots::new(2);
        slots.mark_presented();
        assert_eq!(slots.state(0), SlotState::Idle);
    }

    #[test]
    fn test_reacquired_image_waits_on_owner() {
        let mut slots = FrameSlots::new(3);
        // Frame 0 on slot 0 renders image 2.
        assert_eq!(run_frame(&mut slots, 2), None);
        // Slot 1 gets image 2 again while slot 0 may still be running.
        assert_eq!(run_frame(&mut slots, 2), Some(0));
        assert_eq!(slots.image_owner(2), Some(1));
    }

    #[test]
    fn test_own_image_needs_no_extra_wait() {
        let mut slots = FrameSlots::new(2);
        assert_eq!(run_frame(&mut slots, 0), None);
        assert_eq!(run_frame(&mut slots, 1), None);
        // Slot 0 comes back to image 0, which it owned itself.
        assert_eq!(run_frame(&mut slots, 0), None);
    }

    #[test]
    fn test_in_flight_never_exceeds_slot_count() {
        let mut slots = FrameSlots::new(3);
        for frame in 0..50 {
            run_frame(&mut slots, (frame * 7) % 3);
            assert!(slots.in_flight_count() <= MAX_FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn test_reset_images_after_recreate() {
        let mut slots = FrameSlots::new(2);
        run_frame(&mut slots, 0);
        run_frame(&mut slots, 1);

        slots.reset_images(4);
        assert_eq!(slots.image_count(), 4);
        assert_eq!(slots.in_flight_count(), 0);
        assert!((0..4).all(|i| slots.image_owner(i).is_none()));
    }

    #[test]
    fn test_claim_beyond_known_images_grows() {
        let mut slots = FrameSlots::new(1);
        assert_eq!(slots.claim_image(3), None);
        assert_eq!(slots.image_count(), 4);
        assert_eq!(slots.image_owner(3), Some(0));
    }
}
