//! Mesh data and GPU upload

use crate::backend::{GpuResult, GraphicsBackend, Vertex};
use crate::resources::buffer::{BufferKind, GpuBuffer};
use glam::{Vec2, Vec3};

/// CPU-side mesh with vertex and index data.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Unit cube centered at the origin: 24 vertices, 36 indices.
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        let faces = [
            // Front face
            (Vec3::new(-0.5, -0.5, 0.5), Vec3::Z, Vec2::new(0.0, 1.0)),
            (Vec3::new(0.5, -0.5, 0.5), Vec3::Z, Vec2::new(1.0, 1.0)),
            (Vec3::new(0.5, 0.5, 0.5), Vec3::Z, Vec2::new(1.0, 0.0)),
            (Vec3::new(-0.5, 0.5, 0.5), Vec3::Z, Vec2::new(0.0, 0.0)),
            // Back face
            (Vec3::new(0.5, -0.5, -0.5), -Vec3::Z, Vec2::new(0.0, 1.0)),
            (Vec3::new(-0.5, -0.5, -0.5), -Vec3::Z, Vec2::new(1.0, 1.0)),
            (Vec3::new(-0.5, 0.5, -0.5), -Vec3::Z, Vec2::new(1.0, 0.0)),
            (Vec3::new(0.5, 0.5, -0.5), -Vec3::Z, Vec2::new(0.0, 0.0)),
            // Right face
            (Vec3::new(0.5, -0.5, 0.5), Vec3::X, Vec2::new(0.0, 1.0)),
            (Vec3::new(0.5, -0.5, -0.5), Vec3::X, Vec2::new(1.0, 1.0)),
            (Vec3::new(0.5, 0.5, -0.5), Vec3::X, Vec2::new(1.0, 0.0)),
            (Vec3::new(0.5, 0.5, 0.5), Vec3::X, Vec2::new(0.0, 0.0)),
            // Left face
            (Vec3::new(-0.5, -0.5, -0.5), -Vec3::X, Vec2::new(0.0, 1.0)),
            (Vec3::new(-0.5, -0.5, 0.5), -Vec3::X, Vec2::new(1.0, 1.0)),
            (Vec3::new(-0.5, 0.5, 0.5), -Vec3::X, Vec2::new(1.0, 0.0)),
            (Vec3::new(-0.5, 0.5, -0.5), -Vec3::X, Vec2::new(0.0, 0.0)),
            // Top face
            (Vec3::new(-0.5, 0.5, 0.5), Vec3::Y, Vec2::new(0.0, 1.0)),
            (Vec3::new(0.5, 0.5, 0.5), Vec3::Y, Vec2::new(1.0, 1.0)),
            (Vec3::new(0.5, 0.5, -0.5), Vec3::Y, Vec2::new(1.0, 0.0)),
            (Vec3::new(-0.5, 0.5, -0.5), Vec3::Y, Vec2::new(0.0, 0.0)),
            // Bottom face
            (Vec3::new(-0.5, -0.5, -0.5), -Vec3::Y, Vec2::new(0.0, 1.0)),
            (Vec3::new(0.5, -0.5, -0.5), -Vec3::Y, Vec2::new(1.0, 1.0)),
            (Vec3::new(0.5, -0.5, 0.5), -Vec3::Y, Vec2::new(1.0, 0.0)),
            (Vec3::new(-0.5, -0.5, 0.5), -Vec3::Y, Vec2::new(0.0, 0.0)),
        ];

        for (position, normal, uv) in faces {
            mesh.vertices.push(Vertex {
                position,
                normal,
                uv,
            });
        }

        for face in 0..6u32 {
            let base = face * 4;
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Upload to vertex and index buffers.
    pub fn to_gpu<B: GraphicsBackend>(&self, backend: &mut B) -> GpuResult<GpuMesh> {
        let mut vertex_buffer = GpuBuffer::create(
            backend,
            BufferKind::Vertex,
            self.vertex_bytes(),
            self.vertices.len() as u32,
            std::mem::size_of::<Vertex>() as u32,
        )?;
        let index_buffer = match GpuBuffer::create(
            backend,
            BufferKind::Index,
            self.index_bytes(),
            self.indices.len() as u32,
            std::mem::size_of::<u32>() as u32,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                vertex_buffer.release(backend);
                return Err(e);
            }
        };
        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
        })
    }
}

/// A mesh's buffers on the GPU.
pub struct GpuMesh {
    pub vertex_buffer: GpuBuffer,
    pub index_buffer: GpuBuffer,
}

impl GpuMesh {
    /// Bind both buffers for an indexed draw.
    pub fn bind<B: GraphicsBackend>(&self, backend: &mut B) -> GpuResult<()> {
        self.vertex_buffer.bind(backend)?;
        self.index_buffer.bind(backend)
    }

    pub fn index_count(&self) -> u32 {
        self.index_buffer.element_count()
    }

    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        self.index_buffer.release(backend);
        self.vertex_buffer.release(backend);
    }
}
