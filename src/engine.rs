//! Frame orchestration
//!
//! [`Renderer`] drives the synchronous frame loop over any
//! [`GraphicsBackend`]: acquire, clear, draw, present. [`FrameTargets`] owns
//! the swapchain-sized attachments and enforces the resize protocol: every
//! view of a swapchain-sized target is destroyed before the swapchain
//! resizes, and recreated from the post-resize (possibly clamped) size, so
//! no stale view can survive a resize.

use crate::backend::{
    ColorAttachment, DepthStencilAttachment, FrameContext, GpuError, GpuResult, GraphicsBackend,
    LoadOp, RenderPassDescriptor, StoreOp, TextureFormat, TextureViewHandle,
};
use crate::resources::{GpuImage, ImageKind};

/// Swapchain-sized render targets, today just the depth buffer.
pub struct FrameTargets {
    depth_image: GpuImage,
    depth_view: Option<TextureViewHandle>,
}

impl FrameTargets {
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> GpuResult<Self> {
        let depth_image = GpuImage::create(backend, ImageKind::DepthStencil, width, height)?;
        let depth_view = match depth_image.create_view(backend) {
            Ok(view) => view,
            Err(e) => {
                let mut image = depth_image;
                image.release(backend);
                return Err(e);
            }
        };
        Ok(Self {
            depth_image,
            depth_view: Some(depth_view),
        })
    }

    /// Tear down, resize the swapchain, then rebuild at the size the backend
    /// actually accepted.
    pub fn resize<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> GpuResult<()> {
        self.release(backend);
        backend.resize(width, height);
        let (actual_width, actual_height) = backend.surface_size();
        *self = Self::create(backend, actual_width, actual_height)?;
        Ok(())
    }

    /// Destroy the view first, then the image behind it. A repeat release is
    /// a logged no-op.
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if let Some(view) = self.depth_view.take() {
            backend.destroy_texture_view(view);
        }
        self.depth_image.release(backend);
    }

    pub fn depth_view(&self) -> Option<TextureViewHandle> {
        self.depth_view
    }

    pub fn depth_format(&self) -> TextureFormat {
        self.depth_image.format()
    }
}

/// Synchronous single-threaded frame loop over a backend.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    targets: FrameTargets,
    clear_color: [f32; 4],
    width: u32,
    height: u32,
}

impl<B: GraphicsBackend> Renderer<B> {
    pub fn new(mut backend: B, clear_color: [f32; 4]) -> GpuResult<Self> {
        let (width, height) = backend.surface_size();
        let targets = FrameTargets::create(&mut backend, width, height)?;
        Ok(Self {
            backend,
            targets,
            clear_color,
            width,
            height,
        })
    }

    /// Handle a window resize. Zero dimensions (minimized window) are
    /// ignored; the backend may clamp large sizes to its limits.
    pub fn resize(&mut self, width: u32, height: u32) -> GpuResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.targets.resize(&mut self.backend, width, height)?;
        let (actual_width, actual_height) = self.backend.surface_size();
        if (actual_width, actual_height) != (width, height) {
            log::info!(
                "surface clamped from {}x{} to {}x{}",
                width,
                height,
                actual_width,
                actual_height
            );
        }
        self.width = actual_width;
        self.height = actual_height;
        Ok(())
    }

    /// Reconfigure the surface at its current size, for example after the
    /// backend reports the surface lost.
    pub fn recover_surface(&mut self) -> GpuResult<()> {
        let (width, height) = self.backend.surface_size();
        self.targets.resize(&mut self.backend, width, height)
    }

    /// Acquire the next swapchain image. The returned context, its view
    /// included, is only valid until [`Renderer::end_frame`].
    pub fn begin_frame(&mut self) -> GpuResult<FrameContext> {
        self.backend.begin_frame()
    }

    /// Begin the pass that clears color and depth and covers the full
    /// surface. Uniform uploads belong before this call.
    pub fn begin_main_pass(&mut self, frame: &FrameContext) -> GpuResult<()> {
        let depth_view = self
            .targets
            .depth_view()
            .ok_or(GpuError::Released("frame targets"))?;
        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Main Pass".into()),
            color_attachments: vec![ColorAttachment {
                view: frame.swapchain_view,
                resolve_target: None,
                load_op: LoadOp::Clear(self.clear_color),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: depth_view,
                depth_load_op: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
                depth_store_op: StoreOp::Store,
                depth_clear_value: 1.0,
            }),
        });
        self.backend.set_viewport(
            0.0,
            0.0,
            frame.width as f32,
            frame.height as f32,
            0.0,
            1.0,
        );
        Ok(())
    }

    pub fn end_main_pass(&mut self) {
        self.backend.end_render_pass();
    }

    /// Submit and present the frame.
    pub fn end_frame(&mut self) -> GpuResult<()> {
        self.backend.end_frame()
    }

    /// Release the targets this renderer owns. The backend itself stays
    /// usable afterwards.
    pub fn release(&mut self) {
        self.targets.release(&mut self.backend);
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn swapchain_format(&self) -> TextureFormat {
        self.backend.swapchain_format()
    }

    pub fn depth_format(&self) -> TextureFormat {
        self.targets.depth_format()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
