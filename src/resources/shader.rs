//! Shader lifecycle: compile, reflect, and feed uniform data
//!
//! A [`GpuShader`] owns everything reflection says the stage needs: the
//! backend module, one uniform buffer per declared cbuffer slot with a
//! CPU-side shadow copy of the same size, and the bind group that presents
//! all slots to the stage in one call. Shadow and GPU buffers start zeroed,
//! so the first frame is deterministic even if the application never writes.

use crate::backend::{
    BindGroupEntry, BindGroupHandle, BindGroupLayoutEntry, BindGroupLayoutHandle, BindingType,
    BufferDescriptor, BufferHandle, BufferUsage, GpuError, GpuResult, GraphicsBackend, ShaderStage,
    ShaderModuleHandle,
};
use crate::shader::{self, VertexLayout};
use std::path::Path;

/// One reflected cbuffer slot with its GPU buffer and shadow copy.
#[derive(Debug)]
pub struct CbufferSlot {
    slot: u32,
    byte_size: u32,
    gpu: BufferHandle,
    shadow: Vec<u8>,
}

impl CbufferSlot {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }
}

/// A compiled shader stage and its reflected resources.
#[derive(Debug)]
pub struct GpuShader {
    stage: ShaderStage,
    module: Option<ShaderModuleHandle>,
    vertex_layout: Option<VertexLayout>,
    cbuffers: Vec<CbufferSlot>,
    bind_group_layout: Option<BindGroupLayoutHandle>,
    bind_group: Option<BindGroupHandle>,
}

impl GpuShader {
    /// Compile WGSL source for one stage, reflect its interface, and create
    /// the reflected resources.
    ///
    /// Compilation diagnostics surface as [`GpuError::Compilation`]; an
    /// entry point or binding layout the reflector cannot accept surfaces as
    /// [`GpuError::Reflection`]. Nothing is left allocated on error.
    pub fn compile<B: GraphicsBackend>(
        backend: &mut B,
        source: &str,
        stage: ShaderStage,
        label: Option<&str>,
    ) -> GpuResult<Self> {
        let info = shader::compile(source, stage)?;

        let module = backend.create_shader_module(label, source)?;
        let mut this = Self {
            stage,
            module: Some(module),
            vertex_layout: info.vertex_layout,
            cbuffers: Vec::with_capacity(info.cbuffers.len()),
            bind_group_layout: None,
            bind_group: None,
        };

        for cb in &info.cbuffers {
            let desc = BufferDescriptor {
                label: Some(format!("Cbuffer b{}", cb.slot)),
                size: cb.byte_size as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST | BufferUsage::COPY_SRC,
                mapped_at_creation: false,
            };
            let gpu = match backend.create_buffer(&desc) {
                Ok(handle) => handle,
                Err(e) => {
                    this.release(backend);
                    return Err(e);
                }
            };
            this.cbuffers.push(CbufferSlot {
                slot: cb.slot,
                byte_size: cb.byte_size,
                gpu,
                shadow: vec![0u8; cb.byte_size as usize],
            });
        }

        if !this.cbuffers.is_empty() {
            let entries: Vec<BindGroupLayoutEntry> = this
                .cbuffers
                .iter()
                .map(|cb| BindGroupLayoutEntry {
                    binding: cb.slot,
                    visibility: stage.into(),
                    ty: BindingType::UniformBuffer,
                })
                .collect();
            let layout = match backend.create_bind_group_layout(&entries) {
                Ok(handle) => handle,
                Err(e) => {
                    this.release(backend);
                    return Err(e);
                }
            };
            this.bind_group_layout = Some(layout);

            let group_entries: Vec<(u32, BindGroupEntry)> = this
                .cbuffers
                .iter()
                .map(|cb| {
                    (
                        cb.slot,
                        BindGroupEntry::Buffer {
                            buffer: cb.gpu,
                            offset: 0,
                            size: None,
                        },
                    )
                })
                .collect();
            let group = match backend.create_bind_group(layout, &group_entries) {
                Ok(handle) => handle,
                Err(e) => {
                    this.release(backend);
                    return Err(e);
                }
            };
            this.bind_group = Some(group);
        }

        Ok(this)
    }

    /// Compile a shader from a WGSL file on disk.
    pub fn compile_file<B: GraphicsBackend>(
        backend: &mut B,
        path: impl AsRef<Path>,
        stage: ShaderStage,
    ) -> GpuResult<Self> {
        let path = path.as_ref();
        let source = shader::read_source(path)?;
        let label = path.file_name().and_then(|n| n.to_str());
        Self::compile(backend, &source, stage, label)
    }

    /// Copy `value` into the shadow copy of cbuffer `slot` at `offset` bytes.
    /// Nothing reaches the GPU until [`GpuShader::upload_cbuffers`].
    pub fn write_uniform<T: bytemuck::Pod>(
        &mut self,
        slot: u32,
        offset: usize,
        value: &T,
    ) -> GpuResult<()> {
        self.write_shadow(slot, offset, bytemuck::bytes_of(value))
    }

    /// Copy raw bytes into the shadow copy of cbuffer `slot` at `offset`.
    pub fn write_shadow(&mut self, slot: u32, offset: usize, bytes: &[u8]) -> GpuResult<()> {
        let cb = self
            .cbuffers
            .iter_mut()
            .find(|cb| cb.slot == slot)
            .ok_or_else(|| GpuError::Unsupported(format!("shader has no cbuffer slot {slot}")))?;
        let end = match offset.checked_add(bytes.len()) {
            Some(end) if end <= cb.shadow.len() => end,
            _ => {
                return Err(GpuError::Unsupported(format!(
                    "write of {} bytes at offset {} past end of cbuffer b{} ({} bytes)",
                    bytes.len(),
                    offset,
                    slot,
                    cb.shadow.len()
                )))
            }
        };
        cb.shadow[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Shadow copy of cbuffer `slot`, if reflected.
    pub fn shadow_bytes(&self, slot: u32) -> Option<&[u8]> {
        self.cbuffers
            .iter()
            .find(|cb| cb.slot == slot)
            .map(|cb| cb.shadow.as_slice())
    }

    pub fn shadow_bytes_mut(&mut self, slot: u32) -> Option<&mut [u8]> {
        self.cbuffers
            .iter_mut()
            .find(|cb| cb.slot == slot)
            .map(|cb| cb.shadow.as_mut_slice())
    }

    /// Push every shadow copy to its GPU buffer. All slots upload every call;
    /// there is no dirty tracking.
    ///
    /// A transient [`GpuError::MapFailed`] skips that slot for this frame
    /// with a warning so the frame still renders with the slot's previous
    /// contents. Any other error aborts.
    pub fn upload_cbuffers<B: GraphicsBackend>(&self, backend: &mut B) -> GpuResult<()> {
        if self.module.is_none() {
            return Err(GpuError::Released("shader"));
        }
        for cb in &self.cbuffers {
            match backend.write_buffer(cb.gpu, 0, &cb.shadow) {
                Ok(()) => {}
                Err(GpuError::MapFailed { what }) => {
                    log::warn!(
                        "skipping upload of cbuffer b{} ({what}); previous contents kept",
                        cb.slot
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Bind every cbuffer slot to this stage's bind group index in one call.
    /// Shaders with no cbuffers bind nothing.
    pub fn bind<B: GraphicsBackend>(&self, backend: &mut B) -> GpuResult<()> {
        if self.module.is_none() {
            return Err(GpuError::Released("shader"));
        }
        if let Some(group) = self.bind_group {
            backend.set_bind_group(self.stage.bind_group_index(), group);
        }
        Ok(())
    }

    /// Destroy everything this shader owns: bind group, layout, uniform
    /// buffers, then the module. A repeat release is a logged no-op.
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        if self.module.is_none() {
            log::warn!("{:?} shader released twice", self.stage);
            return;
        }
        if let Some(group) = self.bind_group.take() {
            backend.destroy_bind_group(group);
        }
        if let Some(layout) = self.bind_group_layout.take() {
            backend.destroy_bind_group_layout(layout);
        }
        for cb in self.cbuffers.drain(..) {
            backend.destroy_buffer(cb.gpu);
        }
        if let Some(module) = self.module.take() {
            backend.destroy_shader_module(module);
        }
        self.vertex_layout = None;
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Vertex input layout reflected from the entry point. `None` for
    /// fragment stages; empty for vertex stages that declare no inputs.
    pub fn vertex_layout(&self) -> Option<&VertexLayout> {
        self.vertex_layout.as_ref()
    }

    pub fn cbuffers(&self) -> &[CbufferSlot] {
        &self.cbuffers
    }

    pub fn cbuffer_size(&self, slot: u32) -> Option<u32> {
        self.cbuffers
            .iter()
            .find(|cb| cb.slot == slot)
            .map(|cb| cb.byte_size)
    }

    /// GPU buffer behind cbuffer `slot`, for diagnostics and tests.
    pub fn cbuffer_buffer(&self, slot: u32) -> Option<BufferHandle> {
        self.cbuffers
            .iter()
            .find(|cb| cb.slot == slot)
            .map(|cb| cb.gpu)
    }

    pub fn module(&self) -> Option<ShaderModuleHandle> {
        self.module
    }

    pub fn bind_group_layout(&self) -> Option<BindGroupLayoutHandle> {
        self.bind_group_layout
    }

    pub fn is_released(&self) -> bool {
        self.module.is_none()
    }
}

impl Drop for GpuShader {
    fn drop(&mut self) {
        if self.module.is_some() {
            log::warn!("{:?} shader dropped without release", self.stage);
        }
    }
}
