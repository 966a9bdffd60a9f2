//! Headless backend for tests and offscreen use
//!
//! Implements [`GraphicsBackend`] without a window or GPU device. Buffer
//! contents are stored byte-for-byte, so tests can read back exactly what was
//! written, and every operation is recorded in an event log so tests can
//! assert on ordering (resize before recreate, destroy before resize, and so
//! on). Write failures can be injected per buffer to exercise the map-for-write
//! error path.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::{HashMap, HashSet};

/// One recorded backend operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Resize {
        width: u32,
        height: u32,
    },
    BeginFrame {
        swapchain_view: TextureViewHandle,
    },
    EndFrame,
    CreateBuffer(BufferHandle),
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
    DestroyBuffer(BufferHandle),
    CreateTexture(TextureHandle),
    WriteTexture(TextureHandle),
    DestroyTexture(TextureHandle),
    CreateTextureView {
        view: TextureViewHandle,
        texture: TextureHandle,
    },
    DestroyTextureView(TextureViewHandle),
    CreateSampler(SamplerHandle),
    DestroySampler(SamplerHandle),
    CreateShaderModule(ShaderModuleHandle),
    DestroyShaderModule(ShaderModuleHandle),
    CreateBindGroupLayout(BindGroupLayoutHandle),
    DestroyBindGroupLayout(BindGroupLayoutHandle),
    CreateBindGroup(BindGroupHandle),
    DestroyBindGroup(BindGroupHandle),
    CreateRenderPipeline(RenderPipelineHandle),
    DestroyRenderPipeline(RenderPipelineHandle),
    BeginRenderPass,
    EndRenderPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    SetIndexBuffer(BufferHandle),
    Draw {
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
    },
    DrawIndexed {
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    },
}

struct HeadlessBuffer {
    data: Vec<u8>,
    #[allow(dead_code)]
    usage: BufferUsage,
}

struct HeadlessTexture {
    #[allow(dead_code)]
    width: u32,
    #[allow(dead_code)]
    height: u32,
    format: TextureFormat,
}

/// Backend that runs entirely on the CPU.
pub struct HeadlessBackend {
    width: u32,
    height: u32,

    buffers: HashMap<u64, HeadlessBuffer>,
    textures: HashMap<u64, HeadlessTexture>,
    // view id -> texture id
    texture_views: HashMap<u64, u64>,
    samplers: HashMap<u64, SamplerDescriptor>,
    shader_modules: HashMap<u64, String>,
    bind_group_layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    render_pipelines: HashMap<u64, RenderPipelineDescriptor>,

    next_buffer_id: u64,
    next_texture_id: u64,
    next_view_id: u64,
    next_sampler_id: u64,
    next_shader_module_id: u64,
    next_layout_id: u64,
    next_bind_group_id: u64,
    next_render_pipeline_id: u64,

    pass_active: bool,
    failing_writes: HashSet<u64>,
    events: Vec<BackendEvent>,
}

impl HeadlessBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            shader_modules: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            next_buffer_id: 1,
            next_texture_id: 1,
            next_view_id: 1,
            next_sampler_id: 1,
            next_shader_module_id: 1,
            next_layout_id: 1,
            next_bind_group_id: 1,
            next_render_pipeline_id: 1,
            pass_active: false,
            failing_writes: HashSet::new(),
            events: Vec::new(),
        }
    }

    /// Recorded operations, oldest first.
    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Make the next `write_buffer` against this buffer fail with
    /// [`GpuError::MapFailed`]. One-shot: the write after the failed one
    /// succeeds again.
    pub fn inject_write_failure(&mut self, buffer: BufferHandle) {
        self.failing_writes.insert(buffer.0);
    }

    pub fn buffer_exists(&self, buffer: BufferHandle) -> bool {
        self.buffers.contains_key(&buffer.0)
    }

    pub fn texture_exists(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture.0)
    }

    pub fn view_exists(&self, view: TextureViewHandle) -> bool {
        self.texture_views.contains_key(&view.0)
    }

    pub fn shader_module_exists(&self, module: ShaderModuleHandle) -> bool {
        self.shader_modules.contains_key(&module.0)
    }

    pub fn bind_group_exists(&self, bind_group: BindGroupHandle) -> bool {
        self.bind_groups.contains_key(&bind_group.0)
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_view_count(&self) -> usize {
        self.texture_views.len()
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
            self.events.push(BackendEvent::Resize { width, height });
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn begin_frame(&mut self) -> GpuResult<FrameContext> {
        // Same scheme as the windowed backend: the swapchain view gets a
        // fresh ID every frame and is never stored.
        let view_id = self.next_view_id;
        self.next_view_id += 1;

        let ctx = FrameContext {
            swapchain_view: TextureViewHandle(view_id),
            width: self.width,
            height: self.height,
        };
        self.events.push(BackendEvent::BeginFrame {
            swapchain_view: ctx.swapchain_view,
        });
        Ok(ctx)
    }

    fn end_frame(&mut self) -> GpuResult<()> {
        self.events.push(BackendEvent::EndFrame);
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> GpuResult<BufferHandle> {
        if desc.size == 0 {
            return Err(GpuError::BufferCreation("zero-sized buffer".into()));
        }
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            HeadlessBuffer {
                data: vec![0u8; desc.size as usize],
                usage: desc.usage,
            },
        );
        self.events.push(BackendEvent::CreateBuffer(BufferHandle(id)));
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> GpuResult<BufferHandle> {
        if data.is_empty() {
            return Err(GpuError::BufferCreation("empty initial data".into()));
        }
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            HeadlessBuffer {
                data: data.to_vec(),
                usage: desc.usage,
            },
        );
        self.events.push(BackendEvent::CreateBuffer(BufferHandle(id)));
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> GpuResult<()> {
        if self.failing_writes.remove(&buffer.0) {
            return Err(GpuError::MapFailed {
                what: format!("buffer {}", buffer.0),
            });
        }
        let buf = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(GpuError::Released("buffer"))?;
        let start = offset as usize;
        let end = match start.checked_add(data.len()) {
            Some(end) if end <= buf.data.len() => end,
            _ => {
                return Err(GpuError::Unsupported(format!(
                    "write of {} bytes at offset {} exceeds buffer size {}",
                    data.len(),
                    offset,
                    buf.data.len()
                )))
            }
        };
        buf.data[start..end].copy_from_slice(data);
        self.events.push(BackendEvent::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> GpuResult<Vec<u8>> {
        let buf = self
            .buffers
            .get(&buffer.0)
            .ok_or(GpuError::Released("buffer"))?;
        Ok(buf.data.clone())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> GpuResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::TextureCreation("zero-sized texture".into()));
        }
        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            HeadlessTexture {
                width: desc.width,
                height: desc.height,
                format: desc.format,
            },
        );
        self.events
            .push(BackendEvent::CreateTexture(TextureHandle(id)));
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> GpuResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(GpuError::ViewCreation("texture not found".into()));
        }
        let id = self.next_view_id;
        self.next_view_id += 1;
        self.texture_views.insert(id, texture.0);
        self.events.push(BackendEvent::CreateTextureView {
            view: TextureViewHandle(id),
            texture,
        });
        Ok(TextureViewHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        data: &[u8],
        width: u32,
        height: u32,
    ) -> GpuResult<()> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or(GpuError::Released("texture"))?;
        let expected = (width * height * tex.format.bytes_per_pixel()) as usize;
        if data.len() != expected {
            return Err(GpuError::Unsupported(format!(
                "texture write of {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        self.events.push(BackendEvent::WriteTexture(texture));
        Ok(())
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> GpuResult<SamplerHandle> {
        let id = self.next_sampler_id;
        self.next_sampler_id += 1;
        self.samplers.insert(id, desc.clone());
        self.events
            .push(BackendEvent::CreateSampler(SamplerHandle(id)));
        Ok(SamplerHandle(id))
    }

    fn create_shader_module(
        &mut self,
        _label: Option<&str>,
        source: &str,
    ) -> GpuResult<ShaderModuleHandle> {
        let id = self.next_shader_module_id;
        self.next_shader_module_id += 1;
        self.shader_modules.insert(id, source.to_string());
        self.events
            .push(BackendEvent::CreateShaderModule(ShaderModuleHandle(id)));
        Ok(ShaderModuleHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> GpuResult<BindGroupLayoutHandle> {
        let id = self.next_layout_id;
        self.next_layout_id += 1;
        self.bind_group_layouts.insert(id, entries.to_vec());
        self.events
            .push(BackendEvent::CreateBindGroupLayout(BindGroupLayoutHandle(
                id,
            )));
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> GpuResult<BindGroupHandle> {
        if !self.bind_group_layouts.contains_key(&layout.0) {
            return Err(GpuError::PipelineCreation(
                "bind group layout not found".into(),
            ));
        }
        for (_, entry) in entries {
            let alive = match entry {
                BindGroupEntry::Buffer { buffer, .. } => self.buffers.contains_key(&buffer.0),
                BindGroupEntry::Texture(view) => self.texture_views.contains_key(&view.0),
                BindGroupEntry::Sampler(sampler) => self.samplers.contains_key(&sampler.0),
            };
            if !alive {
                return Err(GpuError::PipelineCreation(
                    "bind group references a destroyed resource".into(),
                ));
            }
        }
        let id = self.next_bind_group_id;
        self.next_bind_group_id += 1;
        self.bind_groups.insert(id, entries.to_vec());
        self.events
            .push(BackendEvent::CreateBindGroup(BindGroupHandle(id)));
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> GpuResult<RenderPipelineHandle> {
        if !self.shader_modules.contains_key(&desc.vertex_shader.0) {
            return Err(GpuError::PipelineCreation(
                "vertex shader module not found".into(),
            ));
        }
        if let Some(fs) = &desc.fragment_shader {
            if !self.shader_modules.contains_key(&fs.0) {
                return Err(GpuError::PipelineCreation(
                    "fragment shader module not found".into(),
                ));
            }
        }
        for layout in &desc.bind_group_layouts {
            if !self.bind_group_layouts.contains_key(&layout.0) {
                return Err(GpuError::PipelineCreation(
                    "bind group layout not found".into(),
                ));
            }
        }
        let id = self.next_render_pipeline_id;
        self.next_render_pipeline_id += 1;
        self.render_pipelines.insert(id, desc.clone());
        self.events
            .push(BackendEvent::CreateRenderPipeline(RenderPipelineHandle(id)));
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, _desc: &RenderPassDescriptor) {
        self.pass_active = true;
        self.events.push(BackendEvent::BeginRenderPass);
    }

    fn end_render_pass(&mut self) {
        if self.pass_active {
            self.pass_active = false;
            self.events.push(BackendEvent::EndRenderPass);
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if self.pass_active {
            self.events.push(BackendEvent::SetPipeline(pipeline));
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if self.pass_active {
            self.events
                .push(BackendEvent::SetBindGroup { index, bind_group });
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        if self.pass_active {
            self.events.push(BackendEvent::SetVertexBuffer { slot, buffer });
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, _format: IndexFormat) {
        if self.pass_active {
            self.events.push(BackendEvent::SetIndexBuffer(buffer));
        }
    }

    fn set_viewport(
        &mut self,
        _x: f32,
        _y: f32,
        _width: f32,
        _height: f32,
        _min_depth: f32,
        _max_depth: f32,
    ) {
    }

    fn set_scissor_rect(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) {}

    fn draw(&mut self, vertices: std::ops::Range<u32>, instances: std::ops::Range<u32>) {
        if self.pass_active {
            self.events.push(BackendEvent::Draw {
                vertices,
                instances,
            });
        }
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        if self.pass_active {
            self.events.push(BackendEvent::DrawIndexed {
                indices,
                base_vertex,
                instances,
            });
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_some() {
            self.events.push(BackendEvent::DestroyBuffer(buffer));
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_some() {
            self.events.push(BackendEvent::DestroyTexture(texture));
        }
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        if self.texture_views.remove(&view.0).is_some() {
            self.events.push(BackendEvent::DestroyTextureView(view));
        }
    }

    fn destroy_sampler(&mut self, sampler: SamplerHandle) {
        if self.samplers.remove(&sampler.0).is_some() {
            self.events.push(BackendEvent::DestroySampler(sampler));
        }
    }

    fn destroy_shader_module(&mut self, module: ShaderModuleHandle) {
        if self.shader_modules.remove(&module.0).is_some() {
            self.events.push(BackendEvent::DestroyShaderModule(module));
        }
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        if self.bind_groups.remove(&bind_group.0).is_some() {
            self.events.push(BackendEvent::DestroyBindGroup(bind_group));
        }
    }

    fn destroy_bind_group_layout(&mut self, layout: BindGroupLayoutHandle) {
        if self.bind_group_layouts.remove(&layout.0).is_some() {
            self.events
                .push(BackendEvent::DestroyBindGroupLayout(layout));
        }
    }

    fn destroy_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        if self.render_pipelines.remove(&pipeline.0).is_some() {
            self.events
                .push(BackendEvent::DestroyRenderPipeline(pipeline));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffers_read_back_zeroed() {
        let mut backend = HeadlessBackend::new(64, 64);
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })
            .unwrap();
        assert_eq!(backend.read_buffer(buffer).unwrap(), vec![0u8; 16]);
    }

    #[test]
    fn injected_write_failure_is_one_shot() {
        let mut backend = HeadlessBackend::new(64, 64);
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 4,
                usage: BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })
            .unwrap();

        backend.inject_write_failure(buffer);
        let err = backend.write_buffer(buffer, 0, &[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, GpuError::MapFailed { .. }));
        // Failed write leaves the contents untouched.
        assert_eq!(backend.read_buffer(buffer).unwrap(), vec![0u8; 4]);

        backend.write_buffer(buffer, 0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.read_buffer(buffer).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn out_of_range_writes_are_rejected() {
        let mut backend = HeadlessBackend::new(64, 64);
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 4,
                usage: BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })
            .unwrap();

        let err = backend.write_buffer(buffer, 2, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, GpuError::Unsupported(_)));

        // An offset large enough to wrap gets the same error, not a panic
        let err = backend.write_buffer(buffer, u64::MAX, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, GpuError::Unsupported(_)));

        assert_eq!(backend.read_buffer(buffer).unwrap(), vec![0u8; 4]);
    }

    #[test]
    fn swapchain_view_id_changes_every_frame() {
        let mut backend = HeadlessBackend::new(64, 64);
        let a = backend.begin_frame().unwrap().swapchain_view;
        backend.end_frame().unwrap();
        let b = backend.begin_frame().unwrap().swapchain_view;
        backend.end_frame().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn double_destroy_records_one_event() {
        let mut backend = HeadlessBackend::new(64, 64);
        let buffer = backend
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 4,
                usage: BufferUsage::VERTEX,
                mapped_at_creation: false,
            })
            .unwrap();
        backend.destroy_buffer(buffer);
        backend.destroy_buffer(buffer);
        let destroys = backend
            .events()
            .iter()
            .filter(|e| **e == BackendEvent::DestroyBuffer(buffer))
            .count();
        assert_eq!(destroys, 1);
    }

    #[test]
    fn zero_resize_is_ignored() {
        let mut backend = HeadlessBackend::new(64, 64);
        backend.resize(0, 0);
        assert_eq!(backend.surface_size(), (64, 64));
        assert!(backend.events().is_empty());
    }
}
