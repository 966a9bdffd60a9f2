//! Render Kit - GPU resource lifecycle and shader-reflection-driven binding
//!
//! A thin layer over wgpu that makes resource ownership explicit and derives
//! pipeline inputs from the shaders themselves:
//! - Shader reflection: vertex input layouts and uniform buffer tables come
//!   from the compiled WGSL, not hand-written descriptors
//! - Shadow-buffered uniforms: write uniform data CPU-side at any time,
//!   upload every slot once per frame, bind per stage in one call
//! - Explicit release: every resource is destroyed through the backend that
//!   created it, in dependency order, and tolerates repeated release
//! - A headless backend with byte-accurate buffers and an operation log, so
//!   lifecycle and ordering rules are testable without a GPU

pub mod backend;
pub mod engine;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod window;

pub use backend::headless::HeadlessBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use backend::{GpuError, GpuResult, GraphicsBackend};
pub use engine::{FrameTargets, Renderer};
pub use window::Window;

/// Configuration for window and renderer startup
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Color the main pass clears to
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "Render Kit".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            clear_color: [0.1, 0.1, 0.15, 1.0],
        }
    }
}
