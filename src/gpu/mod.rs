//! GPU-facing resources the render chain writes into.
//!
//! The chain never talks to a graphics API. It fills vertex/index ranges
//! handed out by a [`MeshService`] and reserves transform, clip-rect,
//! opacity and text-settings slots from a [`SlotAllocator`]. In-memory
//! implementations ([`MeshPool`], [`SlotTable`]) back tests and headless use.

pub mod mesh_pool;
pub mod slots;

pub use mesh_pool::MeshPool;
pub use slots::SlotTable;

use bitflags::bitflags;

use crate::element::TextSettings;
use crate::transform::Transform;

bitflags! {
    /// How the shader treats a vertex.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct VertexFlags: u32 {
        const SOLID        = 0b0001;
        const TEXT         = 0b0010;
        const STENCIL_MASK = 0b0100;
        const CUSTOM       = 0b1000;
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in the element's vertex space.
    pub position: [f32; 3],
    pub tint: [f32; 4],
    pub uv: [f32; 2],
    pub transform_slot: u32,
    pub clip_rect_slot: u32,
    pub opacity_slot: u32,
    pub text_settings_slot: u32,
    pub flags: u32,
}

impl Vertex {
    pub fn new(x: f32, y: f32, tint: [f32; 4], flags: VertexFlags) -> Self {
        Self {
            position: [x, y, 0.0],
            tint,
            uv: [0.0, 0.0],
            transform_slot: 0,
            clip_rect_slot: 0,
            opacity_slot: 0,
            text_settings_slot: 0,
            flags: flags.bits(),
        }
    }

    pub fn with_uv(mut self, u: f32, v: f32) -> Self {
        self.uv = [u, v];
        self
    }

    pub fn vertex_flags(&self) -> VertexFlags {
        VertexFlags::from_bits_truncate(self.flags)
    }
}

/// Handle to a vertex/index allocation owned by a mesh service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle {
    index: u32,
    generation: u32,
}

impl MeshHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

/// Writable view over one allocation.
pub struct MeshSlices<'a> {
    pub vertices: &'a mut [Vertex],
    pub indices: &'a mut [u32],
    /// Added to local vertex numbers when writing indices.
    pub index_offset: u32,
}

/// Vertex/index storage.
pub trait MeshService {
    /// Reserve room for `vertices` and `indices`; `None` when out of space.
    fn allocate(&mut self, vertices: u32, indices: u32) -> Option<MeshHandle>;

    /// Resize the used part of an allocation within its capacity and return
    /// it for writing.
    fn update(&mut self, handle: MeshHandle, vertices: u32, indices: u32)
        -> Option<MeshSlices<'_>>;

    /// Current contents for in-place edits.
    fn slices_mut(&mut self, handle: MeshHandle) -> Option<MeshSlices<'_>>;

    fn free(&mut self, handle: MeshHandle);

    /// `(vertex, index)` capacity of an allocation.
    fn capacity(&self, handle: MeshHandle) -> Option<(u32, u32)>;

    fn vertices(&self, handle: MeshHandle) -> &[Vertex];

    fn indices(&self, handle: MeshHandle) -> &[u32];
}

/// GPU slot tables. Slot 0 of every table is the shared default
/// (identity transform, unbounded clip rect, full opacity, plain text).
pub trait SlotAllocator {
    fn alloc_transform(&mut self) -> Option<u32>;
    fn alloc_clip_rect(&mut self) -> Option<u32>;
    fn alloc_opacity(&mut self) -> Option<u32>;
    fn alloc_text_settings(&mut self) -> Option<u32>;

    fn free_transform(&mut self, slot: u32);
    fn free_clip_rect(&mut self, slot: u32);
    fn free_opacity(&mut self, slot: u32);
    fn free_text_settings(&mut self, slot: u32);

    fn set_transform_value(&mut self, slot: u32, value: Transform);
    /// `[min_x, min_y, max_x, max_y]` in the element's frame.
    fn set_clip_rect_value(&mut self, slot: u32, value: [f32; 4]);
    fn set_opacity_value(&mut self, slot: u32, value: f32);
    fn set_text_settings_value(&mut self, slot: u32, value: TextSettings);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 56);
        let v = Vertex::new(1.0, 2.0, [1.0; 4], VertexFlags::SOLID);
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 56);
        assert_eq!(v.vertex_flags(), VertexFlags::SOLID);
    }
}
