//! Window, presentation surface and input plumbing.
//!
//! - [`Window`] wraps the winit window and creates the Vulkan [`Surface`]
//! - [`InputState`] answers "is this key held" style polling queries
//! - [`EventBus`] delivers typed [`InputEvent`]s to subscribers that hold a
//!   [`Subscription`] token

mod events;
mod input;
mod window;

pub use events::{ButtonState, EventBus, InputEvent, Subscription};
pub use input::{InputState, KeyCode, MouseButton};
pub use window::{FramebufferSource, Surface, Window, required_surface_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
