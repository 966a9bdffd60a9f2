//! GPU resource lifecycle
//!
//! Buffers, images, shaders, and materials. Each type owns its backend
//! handles, releases them explicitly through the backend that created them,
//! and tolerates repeated release.

mod buffer;
mod image;
mod material;
mod mesh;
mod shader;

pub use buffer::*;
pub use image::*;
pub use material::*;
pub use mesh::*;
pub use shader::*;
