//! Demo application: three spinning cubes under an orbit camera
//!
//! Every frame the demo writes all 32 model slots plus the view and
//! projection matrices into the vertex stage's reflected uniform block,
//! and the directional light into the fragment stage's, then uploads
//! both and issues a single instanced indexed draw.
//!
//! Run with:
//!   cargo run --example orbit_cube
//!   cargo run --example orbit_cube -- --width 1920 --height 1080 --no-vsync
//!
//! Controls:
//!   LMB + Mouse - Orbit around the cubes
//!   Scroll      - Zoom
//!   Escape      - Exit

use bytemuck::{Pod, Zeroable};
use clap::Parser;
use glam::{Mat4, Vec3};
use render_kit::{
    backend::{CullMode, GraphicsBackend},
    resources::{GpuMesh, Material, MaterialDescriptor, Mesh},
    scene::{Camera, DirectionalLight, OrbitController},
    GpuError, Renderer, RendererConfig, WgpuBackend, Window,
};
use std::time::Instant;
use winit::{
    event::{DeviceEvent, ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
};

/// Must match the `models` array length in the vertex shader.
const MAX_MODELS: usize = 32;

const CUBE_OFFSETS: [Vec3; 3] = [
    Vec3::new(-1.6, 0.0, 0.0),
    Vec3::new(0.0, 0.0, 0.0),
    Vec3::new(1.6, 0.0, 0.0),
];

const CLEAR_COLOR: [f32; 4] = [1.0, 182.0 / 255.0, 193.0 / 255.0, 1.0];

const CUBE_VS: &str = r#"
struct SceneUniforms {
    models: array<mat4x4<f32>, 32>,
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> scene: SceneUniforms;

struct VsOut {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

@vertex
fn main(
    @builtin(instance_index) instance: u32,
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
) -> VsOut {
    let model = scene.models[instance];
    var out: VsOut;
    out.clip_position = scene.proj * scene.view * model * vec4<f32>(position, 1.0);
    out.world_normal = (model * vec4<f32>(normal, 0.0)).xyz;
    out.uv = uv;
    return out;
}
"#;

const CUBE_FS: &str = r#"
struct LightUniforms {
    direction: vec4<f32>,
    color: vec4<f32>,
}

@group(1) @binding(0) var<uniform> light: LightUniforms;

@fragment
fn main(
    @location(0) world_normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
) -> @location(0) vec4<f32> {
    let n = normalize(world_normal);
    let diffuse = max(dot(n, -normalize(light.direction.xyz)), 0.0);
    let base = vec3<f32>(0.35 + 0.3 * uv.x, 0.45, 0.85 - 0.3 * uv.y);
    let ambient = vec3<f32>(0.12, 0.12, 0.14);
    let lit = base * (ambient + diffuse * light.color.a * light.color.rgb);
    return vec4<f32>(lit, 1.0);
}
"#;

/// Vertex-stage uniform block. Layout mirrors `SceneUniforms` in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SceneUniforms {
    models: [Mat4; MAX_MODELS],
    view: Mat4,
    proj: Mat4,
}

/// Command line options
#[derive(Parser)]
#[command(about = "Three spinning cubes under an orbit camera")]
struct Args {
    /// Initial window width in pixels
    #[arg(long, default_value_t = 1280)]
    width: u32,
    /// Initial window height in pixels
    #[arg(long, default_value_t = 720)]
    height: u32,
    /// Run without vsync
    #[arg(long)]
    no_vsync: bool,
}

/// Application state for input handling
struct AppState {
    camera: Camera,
    orbit: OrbitController,
    light: DirectionalLight,
    orbit_active: bool,
    start: Instant,
}

impl AppState {
    fn new() -> Self {
        Self {
            camera: Camera::default(),
            orbit: OrbitController::default(),
            light: DirectionalLight::default(),
            orbit_active: false,
            start: Instant::now(),
        }
    }
}

fn main() {
    env_logger::init();

    let args = Args::parse();
    let config = RendererConfig {
        title: "Orbit Cube".to_string(),
        width: args.width,
        height: args.height,
        vsync: !args.no_vsync,
        clear_color: CLEAR_COLOR,
    };

    println!("Orbit cube demo");
    println!();
    println!("Controls:");
    println!("  LMB + Mouse - Orbit around the cubes");
    println!("  Scroll      - Zoom");
    println!("  Escape      - Exit");
    println!();

    let event_loop = EventLoop::new().expect("Failed to create event loop");

    let mut window = match Window::new(&event_loop, &config.title, config.width, config.height) {
        Ok(window) => window,
        Err(e) => {
            eprintln!("Failed to create window: {:?}", e);
            return;
        }
    };

    let backend = match WgpuBackend::new(window.window_arc(), config.vsync) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Failed to create backend: {:?}", e);
            return;
        }
    };

    let mut renderer = match Renderer::new(backend, config.clear_color) {
        Ok(renderer) => renderer,
        Err(e) => {
            eprintln!("Failed to create renderer: {:?}", e);
            return;
        }
    };

    let color_format = renderer.swapchain_format();
    let depth_format = renderer.depth_format();
    let mut material = match Material::create(
        renderer.backend_mut(),
        &MaterialDescriptor {
            label: Some("Cube"),
            vertex_source: CUBE_VS,
            fragment_source: CUBE_FS,
            texture: None,
            color_format,
            depth_format: Some(depth_format),
            cull_mode: CullMode::Back,
        },
    ) {
        Ok(material) => material,
        Err(e) => {
            eprintln!("Failed to create material: {:?}", e);
            renderer.release();
            return;
        }
    };

    let mut mesh = match Mesh::cube().to_gpu(renderer.backend_mut()) {
        Ok(mesh) => mesh,
        Err(e) => {
            eprintln!("Failed to upload mesh: {:?}", e);
            material.release(renderer.backend_mut());
            renderer.release();
            return;
        }
    };

    let mut state = AppState::new();

    event_loop
        .run(move |event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => {
                    window.handle_event(&event);
                    handle_window_event(
                        &event,
                        &mut state,
                        &mut renderer,
                        &mut material,
                        &mesh,
                        elwt,
                    );
                }
                Event::DeviceEvent { event, .. } => {
                    handle_device_event(&event, &mut state);
                }
                Event::AboutToWait => {
                    if window.should_close() {
                        elwt.exit();
                        return;
                    }
                    if window.was_resized() {
                        let (width, height) = window.dimensions();
                        if let Err(e) = renderer.resize(width, height) {
                            eprintln!("Resize error: {:?}", e);
                        }
                        window.clear_resize_flag();
                    }
                    window.request_redraw();
                }
                Event::LoopExiting => {
                    material.release(renderer.backend_mut());
                    mesh.release(renderer.backend_mut());
                    renderer.release();
                }
                _ => {}
            }
        })
        .expect("Event loop failed");
}

fn handle_window_event(
    event: &WindowEvent,
    state: &mut AppState,
    renderer: &mut Renderer<WgpuBackend>,
    material: &mut Material,
    mesh: &GpuMesh,
    elwt: &EventLoopWindowTarget<()>,
) {
    match event {
        WindowEvent::RedrawRequested => {
            render_frame(renderer, material, mesh, state);
        }
        WindowEvent::KeyboardInput { event, .. } => {
            if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                if event.state == ElementState::Pressed {
                    elwt.exit();
                }
            }
        }
        WindowEvent::MouseInput { state: btn_state, button, .. } => {
            if *button == MouseButton::Left {
                state.orbit_active = *btn_state == ElementState::Pressed;
            }
        }
        WindowEvent::MouseWheel { delta, .. } => {
            let scroll = match delta {
                MouseScrollDelta::LineDelta(_, y) => *y,
                MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
            };
            state.orbit.zoom(scroll);
        }
        WindowEvent::Focused(false) => {
            state.orbit_active = false;
        }
        _ => {}
    }
}

fn handle_device_event(event: &DeviceEvent, state: &mut AppState) {
    if let DeviceEvent::MouseMotion { delta } = event {
        if state.orbit_active {
            state.orbit.orbit(delta.0 as f32, -(delta.1 as f32));
        }
    }
}

fn render_frame(
    renderer: &mut Renderer<WgpuBackend>,
    material: &mut Material,
    mesh: &GpuMesh,
    state: &mut AppState,
) {
    let (width, height) = renderer.dimensions();
    state.orbit.apply(&mut state.camera);
    state.camera.set_aspect(width as f32, height as f32);

    let t = state.start.elapsed().as_secs_f32();
    let mut scene = SceneUniforms::zeroed();
    for (i, offset) in CUBE_OFFSETS.iter().enumerate() {
        let spin = Mat4::from_rotation_y(t * (0.6 + 0.25 * i as f32));
        scene.models[i] = Mat4::from_translation(*offset) * spin;
    }
    scene.view = state.camera.view_matrix();
    scene.proj = state.camera.projection_matrix();

    if let Err(e) = material.vertex_shader_mut().write_uniform(0, 0, &scene) {
        eprintln!("Uniform write error: {:?}", e);
        return;
    }
    let light = state.light.to_uniform();
    if let Err(e) = material.fragment_shader_mut().write_uniform(0, 0, &light) {
        eprintln!("Uniform write error: {:?}", e);
        return;
    }
    if let Err(e) = material.upload(renderer.backend_mut()) {
        eprintln!("Uniform upload error: {:?}", e);
        return;
    }

    let frame = match renderer.begin_frame() {
        Ok(frame) => frame,
        Err(GpuError::SurfaceLost) => {
            if let Err(e) = renderer.recover_surface() {
                eprintln!("Surface recovery failed: {:?}", e);
            }
            return;
        }
        Err(e) => {
            eprintln!("Frame error: {:?}", e);
            return;
        }
    };

    if let Err(e) = renderer.begin_main_pass(&frame) {
        eprintln!("Render error: {:?}", e);
        return;
    }
    if let Err(e) = material.bind(renderer.backend_mut()) {
        eprintln!("Bind error: {:?}", e);
    } else if let Err(e) = mesh.bind(renderer.backend_mut()) {
        eprintln!("Bind error: {:?}", e);
    } else {
        renderer.backend_mut().draw_indexed(
            0..mesh.index_count(),
            0,
            0..CUBE_OFFSETS.len() as u32,
        );
    }
    renderer.end_main_pass();

    if let Err(e) = renderer.end_frame() {
        eprintln!("Present error: {:?}", e);
    }
}
