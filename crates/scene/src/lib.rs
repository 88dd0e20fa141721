//! Camera and camera controls.
//!
//! - [`Camera`] produces the view and projection matrices
//! - [`CameraController`] moves it from polled input and bus commands

pub mod camera;
pub mod controller;

pub use camera::{Camera, Projection, WORLD_UP};
pub use controller::CameraController;
