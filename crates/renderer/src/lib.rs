//! Frame loop for the textured model viewer.
//!
//! - [`Renderer`] owns every Vulkan object and draws one frame per call
//! - [`FrameSlots`] tracks which frame slot renders into which swapchain image
//! - [`RecreateGate`] holds swapchain recreation back while the window is empty
//! - [`FramePlan`] decides from an acquire whether to submit and whether to recreate
//! - [`RenderTargets`] are the multisampled color and depth attachments

mod error;

pub mod config;
pub mod frame_slots;
pub mod recreate;
pub mod renderer;
pub mod targets;

pub use config::RendererConfig;
pub use error::{RendererError, RendererResult};
pub use frame_slots::{FrameSlots, SlotState};
pub use recreate::{FramePlan, GateState, RecreateGate};
pub use renderer::{FrameOutcome, Renderer};
pub use targets::RenderTargets;
