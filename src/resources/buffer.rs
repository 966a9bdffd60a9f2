//! Geometry buffer lifecycle

use crate::backend::{
    BufferDescriptor, BufferHandle, BufferUsage, GpuError, GpuResult, GraphicsBackend, IndexFormat,
};

/// What a [`GpuBuffer`] holds, which decides its usage flags and how it binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Vertex,
    Index,
}

impl BufferKind {
    fn usage(&self) -> BufferUsage {
        let base = BufferUsage::COPY_DST | BufferUsage::COPY_SRC;
        match self {
            BufferKind::Vertex => base | BufferUsage::VERTEX,
            BufferKind::Index => base | BufferUsage::INDEX,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BufferKind::Vertex => "Vertex Buffer",
            BufferKind::Index => "Index Buffer",
        }
    }
}

/// A vertex or index buffer with element bookkeeping.
///
/// The handle is `None` after release; releasing twice is a no-op and any
/// other use after release reports [`GpuError::Released`].
#[derive(Debug)]
pub struct GpuBuffer {
    handle: Option<BufferHandle>,
    kind: BufferKind,
    element_count: u32,
    element_stride: u32,
    // Kept explicit because the bind call takes it; always zero today.
    byte_offset: u64,
}

impl GpuBuffer {
    /// Create a buffer of `element_count * element_stride` bytes filled with
    /// `data`. The data must cover the buffer; anything past the capacity is
    /// clamped off with a warning.
    pub fn create<B: GraphicsBackend>(
        backend: &mut B,
        kind: BufferKind,
        data: &[u8],
        element_count: u32,
        element_stride: u32,
    ) -> GpuResult<Self> {
        let capacity = element_count as u64 * element_stride as u64;
        if (data.len() as u64) < capacity {
            return Err(GpuError::BufferCreation(format!(
                "initial data is {} bytes, buffer needs {} ({} elements of {} bytes)",
                data.len(),
                capacity,
                element_count,
                element_stride
            )));
        }
        if data.len() as u64 > capacity {
            log::warn!(
                "{} initial data of {} bytes clamped to capacity {}",
                kind.label(),
                data.len(),
                capacity
            );
        }

        let handle = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(kind.label().to_string()),
                size: capacity,
                usage: kind.usage(),
                mapped_at_creation: false,
            },
            &data[..capacity as usize],
        )?;

        Ok(Self {
            handle: Some(handle),
            kind,
            element_count,
            element_stride,
            byte_offset: 0,
        })
    }

    /// Create a buffer with undefined contents. Populate it with
    /// [`GpuBuffer::update`] before the first draw that reads it.
    pub fn create_uninit<B: GraphicsBackend>(
        backend: &mut B,
        kind: BufferKind,
        element_count: u32,
        element_stride: u32,
    ) -> GpuResult<Self> {
        let handle = backend.create_buffer(&BufferDescriptor {
            label: Some(kind.label().to_string()),
            size: element_count as u64 * element_stride as u64,
            usage: kind.usage(),
            mapped_at_creation: false,
        })?;
        Ok(Self {
            handle: Some(handle),
            kind,
            element_count,
            element_stride,
            byte_offset: 0,
        })
    }

    /// Replace the buffer contents. Data larger than the buffer is clamped to
    /// its capacity with a warning; the element count never changes.
    ///
    /// A [`GpuError::MapFailed`] from the backend is transient: the buffer
    /// keeps its previous contents and the caller may retry next frame.
    pub fn update<B: GraphicsBackend>(&mut self, backend: &mut B, data: &[u8]) -> GpuResult<()> {
        let handle = self.handle.ok_or(GpuError::Released("buffer"))?;
        let capacity = self.capacity() as usize;
        let len = if data.len() > capacity {
            log::warn!(
                "{} update of {} bytes clamped to capacity {}",
                self.kind.label(),
                data.len(),
                capacity
            );
            capacity
        } else {
            data.len()
        };
        backend.write_buffer(handle, 0, &data[..len])
    }

    /// Bind for drawing: vertex buffers go to slot 0, index buffers bind as
    /// 32-bit indices.
    pub fn bind<B: GraphicsBackend>(&self, backend: &mut B) -> GpuResult<()> {
        let handle = self.handle.ok_or(GpuError::Released("buffer"))?;
        match self.kind {
            BufferKind::Vertex => backend.set_vertex_buffer(0, handle, self.byte_offset),
            BufferKind::Index => {
                backend.set_index_buffer(handle, self.byte_offset, IndexFormat::Uint32)
            }
        }
        Ok(())
    }

    /// Destroy the underlying buffer and zero the element bookkeeping. A
    /// repeat release is a logged no-op.
    pub fn release<B: GraphicsBackend>(&mut self, backend: &mut B) {
        match self.handle.take() {
            Some(handle) => {
                backend.destroy_buffer(handle);
                self.element_count = 0;
                self.element_stride = 0;
            }
            None => log::warn!("{} released twice", self.kind.label()),
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    pub fn element_stride(&self) -> u32 {
        self.element_stride
    }

    pub fn byte_offset(&self) -> u64 {
        self.byte_offset
    }

    pub fn capacity(&self) -> u64 {
        self.element_count as u64 * self.element_stride as u64
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Backend handle, for diagnostics and tests.
    pub fn handle(&self) -> Option<BufferHandle> {
        self.handle
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if self.handle.is_some() {
            log::warn!("{} dropped without release", self.kind.label());
        }
    }
}
