//! Frame loop tests over the headless backend: resize ordering, per-frame
//! uniform uploads, and the command sequence of a full frame.

use render_kit::backend::headless::BackendEvent;
use render_kit::backend::{
    ColorAttachment, CullMode, GpuError, LoadOp, RenderPassDescriptor, ShaderStage, StoreOp,
    TextureFormat,
};
use render_kit::resources::{GpuShader, Material, MaterialDescriptor, Mesh};
use render_kit::{FrameTargets, GraphicsBackend, HeadlessBackend, Renderer};

const MESH_VS: &str = r#"
@group(0) @binding(0) var<uniform> transform: mat4x4<f32>;

struct VsOut {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) shade: f32,
    @location(1) uv: vec2<f32>,
}

@vertex
fn main(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
) -> VsOut {
    var out: VsOut;
    out.clip_position = transform * vec4<f32>(position, 1.0);
    out.shade = max(normal.y, 0.2);
    out.uv = uv;
    return out;
}
"#;

const LIGHT_FS: &str = r#"
struct Light {
    direction: vec4<f32>,
    color: vec4<f32>,
}

@group(1) @binding(0) var<uniform> light: Light;

@fragment
fn main() -> @location(0) vec4<f32> {
    return light.color;
}
"#;

const TWO_CBUFFER_VS: &str = r#"
@group(0) @binding(0) var<uniform> transform: mat4x4<f32>;
@group(0) @binding(1) var<uniform> tint: vec4<f32>;

@vertex
fn main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return transform * vec4<f32>(position, tint.w);
}
"#;

fn index_of(events: &[BackendEvent], pred: fn(&BackendEvent) -> bool) -> usize {
    events.iter().position(pred).expect("event not recorded")
}

fn test_material(backend: &mut HeadlessBackend) -> Material {
    let color_format = backend.swapchain_format();
    Material::create(
        backend,
        &MaterialDescriptor {
            label: Some("Frame Test"),
            vertex_source: MESH_VS,
            fragment_source: LIGHT_FS,
            texture: None,
            color_format,
            depth_format: Some(TextureFormat::Depth24PlusStencil8),
            cull_mode: CullMode::Back,
        },
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Resize and surface recovery
// ---------------------------------------------------------------------------

#[test]
fn resize_destroys_targets_before_the_surface_and_recreates_after() {
    let mut backend = HeadlessBackend::new(640, 480);
    let mut targets = FrameTargets::create(&mut backend, 640, 480).unwrap();
    let old_view = targets.depth_view().unwrap();

    backend.clear_events();
    targets.resize(&mut backend, 1024, 768).unwrap();

    // Dependent view and texture go first, then the surface, then fresh
    // targets at the accepted size
    let events = backend.events();
    assert_eq!(events.len(), 5);
    assert_eq!(events[0], BackendEvent::DestroyTextureView(old_view));
    assert!(matches!(events[1], BackendEvent::DestroyTexture(_)));
    assert_eq!(
        events[2],
        BackendEvent::Resize {
            width: 1024,
            height: 768
        }
    );
    assert!(matches!(events[3], BackendEvent::CreateTexture(_)));
    assert!(matches!(events[4], BackendEvent::CreateTextureView { .. }));

    // No stale view survives the resize
    let new_view = targets.depth_view().unwrap();
    assert_ne!(new_view, old_view);
    assert!(!backend.view_exists(old_view));
    assert!(backend.view_exists(new_view));

    targets.release(&mut backend);
}

#[test]
fn minimized_resize_is_ignored() {
    let backend = HeadlessBackend::new(640, 480);
    let mut renderer = Renderer::new(backend, [0.0; 4]).unwrap();

    renderer.backend_mut().clear_events();
    renderer.resize(0, 0).unwrap();

    assert!(renderer.backend_mut().events().is_empty());
    assert_eq!(renderer.dimensions(), (640, 480));

    renderer.release();
}

#[test]
fn surface_recovery_rebuilds_targets_at_the_current_size() {
    let backend = HeadlessBackend::new(320, 240);
    let mut renderer = Renderer::new(backend, [0.0; 4]).unwrap();

    renderer.backend_mut().clear_events();
    renderer.recover_surface().unwrap();

    let events = renderer.backend_mut().events();
    assert!(matches!(events[0], BackendEvent::DestroyTextureView(_)));
    assert!(matches!(events[1], BackendEvent::DestroyTexture(_)));
    assert_eq!(
        events[2],
        BackendEvent::Resize {
            width: 320,
            height: 240
        }
    );
    assert!(matches!(events[3], BackendEvent::CreateTexture(_)));
    assert!(matches!(events[4], BackendEvent::CreateTextureView { .. }));

    renderer.release();
}

#[test]
fn released_targets_fail_the_main_pass() {
    let backend = HeadlessBackend::new(320, 240);
    let mut renderer = Renderer::new(backend, [0.0; 4]).unwrap();

    let frame = renderer.begin_frame().unwrap();
    renderer.release();

    let err = renderer.begin_main_pass(&frame).unwrap_err();
    assert!(matches!(err, GpuError::Released(_)));
}

// ---------------------------------------------------------------------------
// Per-frame uniform uploads
// ---------------------------------------------------------------------------

#[test]
fn upload_rewrites_every_slot_every_frame() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut shader =
        GpuShader::compile(&mut backend, TWO_CBUFFER_VS, ShaderStage::Vertex, None).unwrap();

    // Only slot 0 is written, but both slots upload; there is no dirty
    // tracking to skip the untouched one
    shader.write_uniform(0, 0, &[1.0f32; 16]).unwrap();
    backend.clear_events();
    shader.upload_cbuffers(&mut backend).unwrap();

    let lens: Vec<usize> = backend
        .events()
        .iter()
        .filter_map(|e| match e {
            BackendEvent::WriteBuffer { len, .. } => Some(*len),
            _ => None,
        })
        .collect();
    assert_eq!(lens, vec![64, 16]);

    // The next frame uploads the same slots again unchanged
    backend.clear_events();
    shader.upload_cbuffers(&mut backend).unwrap();
    let writes = backend
        .events()
        .iter()
        .filter(|e| matches!(e, BackendEvent::WriteBuffer { .. }))
        .count();
    assert_eq!(writes, 2);

    shader.release(&mut backend);
}

#[test]
fn map_failure_skips_the_slot_and_recovers_next_frame() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut shader =
        GpuShader::compile(&mut backend, TWO_CBUFFER_VS, ShaderStage::Vertex, None).unwrap();

    shader.write_shadow(0, 0, &[0x11; 64]).unwrap();
    shader.write_shadow(1, 0, &[0x22; 16]).unwrap();
    let slot0 = shader.cbuffer_buffer(0).unwrap();
    let slot1 = shader.cbuffer_buffer(1).unwrap();

    backend.inject_write_failure(slot0);
    shader.upload_cbuffers(&mut backend).unwrap();

    // The failing slot keeps its previous contents, the other slot lands
    assert_eq!(backend.read_buffer(slot0).unwrap(), vec![0u8; 64]);
    assert_eq!(backend.read_buffer(slot1).unwrap(), vec![0x22; 16]);

    // The shadow copy was untouched, so the next upload completes the write
    shader.upload_cbuffers(&mut backend).unwrap();
    assert_eq!(backend.read_buffer(slot0).unwrap(), vec![0x11; 64]);

    shader.release(&mut backend);
}

#[test]
fn material_upload_survives_one_failing_stage() {
    let mut backend = HeadlessBackend::new(64, 64);
    let mut material = test_material(&mut backend);

    material
        .vertex_shader_mut()
        .write_uniform(0, 0, &[2.0f32; 16])
        .unwrap();
    material
        .fragment_shader_mut()
        .write_shadow(0, 0, &[0x44; 32])
        .unwrap();

    let vs_buffer = material.vertex_shader().cbuffer_buffer(0).unwrap();
    let fs_buffer = material.fragment_shader().cbuffer_buffer(0).unwrap();

    backend.inject_write_failure(fs_buffer);
    material.upload(&mut backend).unwrap();

    assert_ne!(backend.read_buffer(vs_buffer).unwrap(), vec![0u8; 64]);
    assert_eq!(backend.read_buffer(fs_buffer).unwrap(), vec![0u8; 32]);

    material.release(&mut backend);
}

// ---------------------------------------------------------------------------
// Full frame command sequence
// ---------------------------------------------------------------------------

#[test]
fn frame_commands_follow_upload_bind_draw_order() {
    let backend = HeadlessBackend::new(320, 240);
    let mut renderer = Renderer::new(backend, [0.1, 0.1, 0.15, 1.0]).unwrap();
    let mut material = test_material(renderer.backend_mut());
    let mut gpu_mesh = Mesh::cube().to_gpu(renderer.backend_mut()).unwrap();

    renderer.backend_mut().clear_events();

    material
        .vertex_shader_mut()
        .write_uniform(0, 0, &[1.0f32; 16])
        .unwrap();
    material
        .fragment_shader_mut()
        .write_shadow(0, 0, &[0x10; 32])
        .unwrap();
    material.upload(renderer.backend_mut()).unwrap();

    let frame = renderer.begin_frame().unwrap();
    renderer.begin_main_pass(&frame).unwrap();
    material.bind(renderer.backend_mut()).unwrap();
    gpu_mesh.bind(renderer.backend_mut()).unwrap();
    renderer
        .backend_mut()
        .draw_indexed(0..gpu_mesh.index_count(), 0, 0..1);
    renderer.end_main_pass();
    renderer.end_frame().unwrap();

    let events = renderer.backend_mut().events().to_vec();

    let begin_frame = index_of(&events, |e| matches!(e, BackendEvent::BeginFrame { .. }));
    let begin_pass = index_of(&events, |e| matches!(e, BackendEvent::BeginRenderPass));
    let set_pipeline = index_of(&events, |e| matches!(e, BackendEvent::SetPipeline(_)));
    let vs_group = index_of(&events, |e| {
        matches!(e, BackendEvent::SetBindGroup { index: 0, .. })
    });
    let fs_group = index_of(&events, |e| {
        matches!(e, BackendEvent::SetBindGroup { index: 1, .. })
    });
    let set_vertex = index_of(&events, |e| {
        matches!(e, BackendEvent::SetVertexBuffer { .. })
    });
    let set_index = index_of(&events, |e| matches!(e, BackendEvent::SetIndexBuffer(_)));
    let draw = index_of(&events, |e| matches!(e, BackendEvent::DrawIndexed { .. }));
    let end_pass = index_of(&events, |e| matches!(e, BackendEvent::EndRenderPass));
    let end_frame = index_of(&events, |e| matches!(e, BackendEvent::EndFrame));

    // Both stages upload before the pass starts
    let writes: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, BackendEvent::WriteBuffer { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|&w| w < begin_pass));

    assert!(begin_frame < begin_pass);
    assert!(begin_pass < set_pipeline);
    assert!(set_pipeline < vs_group && set_pipeline < fs_group);
    assert!(vs_group < draw && fs_group < draw);
    assert!(set_pipeline < set_vertex && set_vertex < set_index);
    assert!(set_index < draw);
    assert!(draw < end_pass && end_pass < end_frame);

    // The bound geometry is the cube that was uploaded
    let vb = gpu_mesh.vertex_buffer.handle().unwrap();
    let ib = gpu_mesh.index_buffer.handle().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, BackendEvent::SetVertexBuffer { slot: 0, buffer } if *buffer == vb)));
    assert_eq!(events[set_index], BackendEvent::SetIndexBuffer(ib));
    assert_eq!(
        events[draw],
        BackendEvent::DrawIndexed {
            indices: 0..36,
            base_vertex: 0,
            instances: 0..1
        }
    );

    gpu_mesh.release(renderer.backend_mut());
    material.release(renderer.backend_mut());
    renderer.release();
}

#[test]
fn filler_group_binds_alongside_the_real_one() {
    let mut backend = HeadlessBackend::new(320, 240);
    let color_format = backend.swapchain_format();

    // Vertex stage with no cbuffers, fragment stage in group 1: binding must
    // still cover group 0
    let mut material = Material::create(
        &mut backend,
        &MaterialDescriptor {
            label: None,
            vertex_source: "@vertex fn main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> { return vec4<f32>(position, 1.0); }",
            fragment_source: LIGHT_FS,
            texture: None,
            color_format,
            depth_format: None,
            cull_mode: CullMode::Back,
        },
    )
    .unwrap();

    let frame = backend.begin_frame().unwrap();
    backend.begin_render_pass(&RenderPassDescriptor {
        label: None,
        color_attachments: vec![ColorAttachment {
            view: frame.swapchain_view,
            resolve_target: None,
            load_op: LoadOp::Clear([0.0; 4]),
            store_op: StoreOp::Store,
        }],
        depth_stencil_attachment: None,
    });
    material.bind(&mut backend).unwrap();
    backend.end_render_pass();
    backend.end_frame().unwrap();

    let groups: Vec<u32> = backend
        .events()
        .iter()
        .filter_map(|e| match e {
            BackendEvent::SetBindGroup { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(groups.len(), 2);
    assert!(groups.contains(&0));
    assert!(groups.contains(&1));

    material.release(&mut backend);
}

#[test]
fn each_frame_acquires_a_fresh_swapchain_view() {
    let backend = HeadlessBackend::new(320, 240);
    let mut renderer = Renderer::new(backend, [0.0; 4]).unwrap();

    let first = renderer.begin_frame().unwrap();
    renderer.begin_main_pass(&first).unwrap();
    renderer.end_main_pass();
    renderer.end_frame().unwrap();

    let second = renderer.begin_frame().unwrap();
    assert_ne!(first.swapchain_view, second.swapchain_view);
    renderer.begin_main_pass(&second).unwrap();
    renderer.end_main_pass();
    renderer.end_frame().unwrap();

    renderer.release();
}
