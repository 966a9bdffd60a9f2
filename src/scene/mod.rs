//! Scene helpers: camera, orbit control, lighting

mod camera;
mod camera_controller;
mod light;

pub use camera::*;
pub use camera_controller::*;
pub use light::*;
