//! Swapchain recreation gate.
//!
//! Recreation is requested by an out-of-date or suboptimal swapchain, or by a
//! window resize. It may only run once the framebuffer has a drawable size;
//! while the window is minimized (0x0) the request stays pending and the frame
//! loop idles until the next event.

use tracing::debug;
use vkcraft_rhi::swapchain::{AcquiredImage, SwapchainStatus};

/// What the frame loop should do about recreation this iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    /// Nothing requested.
    Idle,
    /// Requested, but the framebuffer is empty. Try again after the next
    /// window event.
    Blocked,
    /// Requested and the framebuffer is drawable at this size.
    Proceed { width: u32, height: u32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecreateGate {
    pending: bool,
}

impl RecreateGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate with a request already waiting, for the first swapchain build.
    pub fn pending() -> Self {
        Self { pending: true }
    }

    pub fn request(&mut self) {
        self.pending = true;
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Checks a pending request against the current framebuffer size.
    ///
    /// Returning [`GateState::Proceed`] clears the request; the caller must
    /// recreate before drawing again.
    pub fn poll(&mut self, framebuffer_size: (u32, u32)) -> GateState {
        if !self.pending {
            return GateState::Idle;
        }

        let (width, height) = framebuffer_size;
        if width == 0 || height == 0 {
            debug!("Framebuffer is empty, recreation waits for the window");
            return GateState::Blocked;
        }

        self.pending = false;
        GateState::Proceed { width, height }
    }
}

/// What one frame does with the result of an acquire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePlan {
    /// Nothing was acquired. Recreate without submitting.
    Skip,
    /// Submit and present `index`, then recreate if `recreate_after`.
    Submit { index: u32, recreate_after: bool },
}

impl FramePlan {
    /// Decides the frame from the acquire result and a pending window resize.
    ///
    /// A suboptimal image is still drawn; recreation follows the present.
    pub fn after_acquire(acquired: AcquiredImage, resized: bool) -> Self {
        match acquired {
            AcquiredImage::OutOfDate => FramePlan::Skip,
            AcquiredImage::Ready { index, status } => FramePlan::Submit {
                index,
                recreate_after: status.needs_recreate() || resized,
            },
        }
    }

    /// Whether the swapchain must be rebuilt once `present` has returned.
    pub fn recreate_after_present(self, present: SwapchainStatus) -> bool {
        match self {
            FramePlan::Skip => true,
            FramePlan::Submit { recreate_after, .. } => recreate_after || present.needs_recreate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_without_request() {
        let mut gate = RecreateGate::new();
        assert_eq!(gate.poll((800, 600)), GateState::Idle);
        assert_eq!(gate.poll((0, 0)), GateState::Idle);
    }

    #[test]
    fn test_request_proceeds_once() {
        let mut gate = RecreateGate::new();
        gate.request();
        assert!(gate.is_pending());
        assert_eq!(
            gate.poll((1024, 768)),
            GateState::Proceed {
                width: 1024,
                height: 768
            }
        );
        assert!(!gate.is_pending());
        assert_eq!(gate.poll((1024, 768)), GateState::Idle);
    }

    #[test]
    fn test_minimized_window_blocks_until_drawable() {
        let mut gate = RecreateGate::new();
        gate.request();

        let sizes = [(0, 0), (0, 0), (640, 0), (0, 480), (640, 480)];
        let states: Vec<GateState> = sizes.iter().map(|&size| gate.poll(size)).collect();

        assert!(states[..4].iter().all(|s| *s == GateState::Blocked));
        assert_eq!(
            states[4],
            GateState::Proceed {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn test_repeated_requests_collapse() {
        let mut gate = RecreateGate::new();
        gate.request();
        gate.request();
        assert!(matches!(gate.poll((10, 10)), GateState::Proceed { .. }));
        assert_eq!(gate.poll((10, 10)), GateState::Idle);
    }

    #[test]
    fn test_window_empty_at_startup_defers_first_build() {
        let mut gate = RecreateGate::pending();
        assert!(gate.is_pending());
        assert_eq!(gate.poll((0, 0)), GateState::Blocked);
        assert_eq!(gate.poll((0, 0)), GateState::Blocked);
        assert_eq!(
            gate.poll((800, 600)),
            GateState::Proceed {
                width: 800,
                height: 600
            }
        );
        assert_eq!(gate.poll((800, 600)), GateState::Idle);
    }

    #[test]
    fn test_out_of_date_acquire_skips_submit() {
        for resized in [false, true] {
            let plan = FramePlan::after_acquire(AcquiredImage::OutOfDate, resized);
            assert_eq!(plan, FramePlan::Skip);
            assert!(plan.recreate_after_present(SwapchainStatus::Optimal));
        }
    }

    #[test]
    fn test_suboptimal_acquire_submits_then_recreates() {
        let acquired = AcquiredImage::Ready {
            index: 2,
            status: SwapchainStatus::Suboptimal,
        };
        let plan = FramePlan::after_acquire(acquired, false);
        assert_eq!(
            plan,
            FramePlan::Submit {
                index: 2,
                recreate_after: true
            }
        );
        assert!(plan.recreate_after_present(SwapchainStatus::Optimal));
    }

    #[test]
    fn test_optimal_acquire_submits_only() {
        let acquired = AcquiredImage::Ready {
            index: 0,
            status: SwapchainStatus::Optimal,
        };
        let plan = FramePlan::after_acquire(acquired, false);
        assert_eq!(
            plan,
            FramePlan::Submit {
                index: 0,
                recreate_after: false
            }
        );
        assert!(!plan.recreate_after_present(SwapchainStatus::Optimal));
    }

    #[test]
    fn test_resize_or_stale_present_recreates_after_optimal_acquire() {
        let acquired = AcquiredImage::Ready {
            index: 1,
            status: SwapchainStatus::Optimal,
        };
        let resized = FramePlan::after_acquire(acquired, true);
        assert!(resized.recreate_after_present(SwapchainStatus::Optimal));

        let plain = FramePlan::after_acquire(acquired, false);
        assert!(plain.recreate_after_present(SwapchainStatus::Suboptimal));
        assert!(plain.recreate_after_present(SwapchainStatus::OutOfDate));
    }
}
