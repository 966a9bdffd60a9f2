//! Material: a shader pair plus the pipeline state derived from reflection
//!
//! A material owns a vertex/fragment [`GpuShader`] pair, the render pipeline
//! built from the vertex shader's reflected input layout, and an optional
//! texture binding. It does not own the [`GpuImage`] behind that binding,
//! only the view it created from it, so release order is: pipeline and
//! binding (including the view) first, then the caller's image.

use crate::backend::{
    BindGroupEntry, BindGroupHandle, BindGroupLayoutEntry, BindGroupLayoutHandle, BindingType,
    ColorTargetState, ColorWrites, CompareFunction, CullMode, DepthStencilState, FrontFace,
    GpuError, GpuResult, GraphicsBackend, PrimitiveTopology, RenderPipelineDescriptor,
    RenderPipelineHandle, SamplerDescriptor, SamplerHandle, ShaderStage, ShaderStageFlags,
    TextureFormat, TextureSampleType, TextureViewHandle,
};
use crate::resources::image::GpuImage;
use crate::resources::shader::GpuShader;

/// Everything needed to create a [`Material`].
pub struct MaterialDescriptor<'a> {
    pub label: Option<&'a str>,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    /// Sampled in the fragment stage at group 2 if present.
    pub texture: Option<&'a GpuImage>,
    pub color_format: TextureFormat,
    pub depth_format: Option<TextureFormat>,
    pub cull_mode: CullMode,
}

#[derive(Debug)]
struct TextureBinding {
    view: TextureViewHandle,
    sampler: SamplerHandle,
    layout: BindGroupLayoutHandle,
    group: BindGroupHandle,
}

/// One renderable unit: shaders, reflected uniforms, pipeline, and bindings.
#[derive(Debug)]
pub struct Material {
    vertex_shader: GpuShader,
    fragment_shader: GpuShader,
    pipeline: Option<RenderPipelineHandle>,
    // Empty groups created where a stage declares no cbuffers but a later
    // group index is in use.
    filler_groups: Vec<(u32, BindGroupLayoutHandle, BindGroupHandle)>,
    texture_binding: Option<TextureBinding>,
}

impl Material {
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        desc: &MaterialDescriptor,
    ) -> GpuResult<Self> {
        let vs_label = desc.label.map(|l| format!("{l} VS"));
        let mut vertex_shader = GpuShader::compile(
            backend,
            desc.vertex_source,
            ShaderStage::Vertex,
            vs_label.as_deref(),
        )?;

        let fs_label = desc.label.map(|l| format!("{l} FS"));
        let fragment_shader = match GpuShader::compile(
            backend,
            desc.fragment_source,
            ShaderStage::Fragment,
            fs_label.as_deref(),
        ) {
            Ok(shader) => shader,
            Err(e) => {
                vertex_shader.release(backend);
                return Err(e);
            }
        };

        let mut this = Self {
            vertex_shader,
            fragment_shader,
            pipeline: None,
            filler_groups: Vec::new(),
            texture_binding: None,
        };

        match this.build_pipeline(backend, desc) {
            Ok(()) => Ok(this),
            Err(e) => {
                this.release(backend);
                Err(e)
            }
        }
    }

    fn build_pipeline<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        desc: &MaterialDescriptor,
    ) -> GpuResult<()> {
        // Group 0 holds vertex-stage cbuffers, group 1 fragment-stage
        // cbuffers, group 2 the material texture. Group indices are
        // positional, so any group below the highest one in use must exist
        // even when its stage declares nothing.
        let group_count = if desc.texture.is_some() {
            3
        } else if self.fragment_shader.bind_group_layout().is_some() {
            2
        } else if self.vertex_shader.bind_group_layout().is_some() {
            1
        } else {
            0
        };

        let mut layouts = Vec::with_capacity(group_count);
        for group in 0..group_count.min(2) as u32 {
            let existing = if group == 0 {
                self.vertex_shader.bind_group_layout()
            } else {
                self.fragment_shader.bind_group_layout()
            };
            if let Some(layout) = existing {
                layouts.push(layout);
                continue;
            }
            let layout = backend.create_bind_group_layout(&[])?;
            let bind_group = match backend.create_bind_group(layout, &[]) {
                Ok(g) => g,
                Err(e) => {
                    backend.destroy_bind_group_layout(layout);
                    return Err(e);
                }
            };
            self.filler_groups.push((group, layout, bind_group));
            layouts.push(layout);
        }

        if let Some(image) = desc.texture {
            let binding = Self::create_texture_binding(backend, image)?;
            layouts.push(binding.layout);
            self.texture_binding = Some(binding);
        }

        // A vertex stage with no location-bound inputs gets no buffer slot at
        // all, so pipelines for fullscreen passes need no vertex buffer bound.
        let vertex_layouts = self
            .vertex_shader
            .vertex_layout()
            .filter(|layout| !layout.inputs.is_empty())
            .map(|layout| vec![layout.buffer_layout()])
            .unwrap_or_default();

        let vertex_module = self
            .vertex_shader
            .module()
            .ok_or(GpuError::Released("shader"))?;
        let fragment_module = self
            .fragment_shader
            .module()
            .ok_or(GpuError::Released("shader"))?;

        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: desc.label.map(|l| l.to_string()),
            vertex_shader: vertex_module,
            fragment_shader: Some(fragment_module),
            vertex_layouts,
            bind_group_layouts: layouts,
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: desc.cull_mode,
            depth_stencil: desc.depth_format.map(|format| DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: vec![ColorTargetState {
                format: desc.color_format,
                blend: None,
                write_mask: ColorWrites::ALL,
            }],
        })?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn create_texture_binding<B: GraphicsBackend>(
        backend: &mut B,
        image: &GpuImage,
    ) -> GpuResult<TextureBinding> {
        let view = image.create_view(backend)?;
        let sampler = match backend.create_sampler(&SamplerDescriptor::default()) {
            Ok(s) => s,
            Err(e) => {
                backend.destroy_texture_view(view);
                return Err(e);
            }
        };

        let entries = [
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                },
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::Sampler { comparison: false },
            },
        ];
        let layout = match backend.create_bind_group_layout(&entries) {
            Ok(l) => l,
            Err(e) => {
                backend.destroy_sampler(sampler);
                backend.destroy_texture_view(view);
                return Err(e);
            }
        };

        let group_entries = [
            (0, BindGroupEntry::Texture(view)),
            (1, BindGroupEntry::Sampler(sampler)),
        ];
        let group = match backend.create_bind_group(layout, &group_entries) {
            Ok(g) => g,
            Err(e) => {
                backend.destroy_bind_group_layout(layout);
                backend.destroy_sampler(sampler);
                backend.destroy_texture_view(view);
                return Err(e);
            }
        };

        Ok(TextureBinding {
            view,
            sampler,
            layout,
            group,
        })
    }

    /// Push both stages' shadow copies to the GPU. Called once per frame
    /// before [`Material::bind`].
    pub fn upload<B: GraphicsBackend>(&self, backend: &mut B) -> GpuResult<()> {
        self.vertex_shader.upload_cbuffers(backend)?;
        self.fragment_shader.upload_cbuffers(backend)
    }

    /// Bind the pipeline and every group the pipeline layout names.
    pub fn bind<B: GraphicsBackend>(&self, backend: &mut B) -> GpuResult<()> {
        let pipeline = self.pipeline.ok_or(GpuError::Released("material"))?;
        backend.set_render_pipeline(pipeline);
        self.vertex_shader.bind(backend)?;
        self.fragment_shader.bind(backend)?;
        for (index, _, group) in &self.filler_groups {
            backend.set_bind_group(*index, *group);
        }
        if let Some(binding) = &self.texture_binding {
            backend.set_bind_group(2, binding.group);
        }
        Ok(())
    }

    /// Release in dependency order: pipeline, texture binding (its view
    /// included), placeholder groups, then shaders. The image a texture
    /// binding samples stays alive for the caller to release afterwards.
    /// A repeat release is a logged no-op.
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        // The pipeline alone cannot stand in for liveness here: a failed
        // create rolls back through this path before any pipeline exists.
        let nothing_live = self.pipeline.is_none()
            && self.texture_binding.is_none()
            && self.filler_groups.is_empty()
            && self.vertex_shader.is_released()
            && self.fragment_shader.is_released();
        if nothing_live {
            log::warn!("material released twice");
            return;
        }
        if let Some(pipeline) = self.pipeline.take() {
            backend.destroy_render_pipeline(pipeline);
        }
        if let Some(binding) = self.texture_binding.take() {
            backend.destroy_bind_group(binding.group);
            backend.destroy_texture_view(binding.view);
            backend.destroy_sampler(binding.sampler);
            backend.destroy_bind_group_layout(binding.layout);
        }
        for (_, layout, group) in self.filler_groups.drain(..) {
            backend.destroy_bind_group(group);
            backend.destroy_bind_group_layout(layout);
        }
        self.fragment_shader.release(backend);
        self.vertex_shader.release(backend);
    }

    pub fn vertex_shader(&self) -> &GpuShader {
        &self.vertex_shader
    }

    pub fn vertex_shader_mut(&mut self) -> &mut GpuShader {
        &mut self.vertex_shader
    }

    pub fn fragment_shader(&self) -> &GpuShader {
        &self.fragment_shader
    }

    pub fn fragment_shader_mut(&mut self) -> &mut GpuShader {
        &mut self.fragment_shader
    }

    pub fn pipeline(&self) -> Option<RenderPipelineHandle> {
        self.pipeline
    }

    /// View this material created over its texture, if any.
    pub fn texture_view(&self) -> Option<TextureViewHandle> {
        self.texture_binding.as_ref().map(|b| b.view)
    }

    pub fn is_released(&self) -> bool {
        self.pipeline.is_none()
    }
}
