//! Backend abstraction layer
//!
//! Provides common traits and types that both the wgpu and headless backends
//! implement.

pub mod headless;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use traits::*;
pub use types::*;
