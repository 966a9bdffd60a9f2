//! Texture lifecycle

use crate::backend::{
    GpuError, GpuResult, GraphicsBackend, TextureDescriptor, TextureFormat, TextureHandle,
    TextureUsage, TextureViewHandle,
};

/// Role of a [`GpuImage`], which decides its format and usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Sampled in shaders, uploaded from the CPU.
    ShaderResource,
    /// Drawn into, then optionally sampled.
    RenderTarget,
    /// Depth/stencil attachment.
    DepthStencil,
}

impl ImageKind {
    pub fn format(&self) -> TextureFormat {
        match self {
            ImageKind::ShaderResource | ImageKind::RenderTarget => TextureFormat::Rgba8Unorm,
            ImageKind::DepthStencil => TextureFormat::Depth24PlusStencil8,
        }
    }

    fn usage(&self) -> TextureUsage {
        match self {
            ImageKind::ShaderResource => TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ImageKind::RenderTarget | ImageKind::DepthStencil => {
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ImageKind::ShaderResource => "Shader Resource Image",
            ImageKind::RenderTarget => "Render Target Image",
            ImageKind::DepthStencil => "Depth Stencil Image",
        }
    }
}

/// A 2D texture whose format and usage follow from its [`ImageKind`].
///
/// Views are never cached: every [`GpuImage::create_view`] call returns a new
/// view the caller owns and must destroy. This keeps view lifetime visible at
/// the call site, which matters during resize teardown.
#[derive(Debug)]
pub struct GpuImage {
    handle: Option<TextureHandle>,
    kind: ImageKind,
    width: u32,
    height: u32,
}

impl GpuImage {
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        kind: ImageKind,
        width: u32,
        height: u32,
    ) -> GpuResult<Self> {
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(kind.label().to_string()),
            width,
            height,
            mip_levels: 1,
            format: kind.format(),
            usage: kind.usage(),
        })?;
        Ok(Self {
            handle: Some(handle),
            kind,
            width,
            height,
        })
    }

    /// Create a shader-resource image and upload its pixels in one step.
    /// `pixels` is tightly packed RGBA8, row-major.
    pub fn create_with_pixels<B: GraphicsBackend>(
        backend: &mut B,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> GpuResult<Self> {
        let mut image = Self::create(backend, ImageKind::ShaderResource, width, height)?;
        if let Some(handle) = image.handle {
            if let Err(e) = backend.write_texture(handle, pixels, width, height) {
                image.release(backend);
                return Err(e);
            }
        }
        Ok(image)
    }

    /// Create a fresh view of this image. The caller owns the returned view
    /// and must destroy it before the image is released.
    pub fn create_view<B: GraphicsBackend>(&self, backend: &mut B) -> GpuResult<TextureViewHandle> {
        let handle = self.handle.ok_or(GpuError::Released("image"))?;
        backend.create_texture_view(handle)
    }

    /// Destroy the underlying texture and zero the dimensions. Outstanding
    /// views go stale and must not be bound again. A repeat release is a
    /// logged no-op.
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        match self.handle.take() {
            Some(handle) => {
                backend.destroy_texture(handle);
                self.width = 0;
                self.height = 0;
            }
            None => log::warn!("{} released twice", self.kind.label()),
        }
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn format(&self) -> TextureFormat {
        self.kind.format()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        if self.handle.is_some() {
            log::warn!("{} dropped without release", self.kind.label());
        }
    }
}
