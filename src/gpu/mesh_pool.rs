//! In-memory mesh service: one shared vertex buffer and one shared index
//! buffer, carved into ranges with first-fit free lists.

use std::ops::Range;

use super::{MeshHandle, MeshService, MeshSlices, Vertex};

/// First-fit allocator over `0..capacity` with coalescing on free.
struct RangeAllocator {
    capacity: u32,
    /// Sorted, non-overlapping, non-adjacent free ranges.
    free: Vec<Range<u32>>,
}

impl RangeAllocator {
    fn new(capacity: u32) -> Self {
        let free = if capacity > 0 {
            vec![0..capacity]
        } else {
            Vec::new()
        };
        Self { capacity, free }
    }

    fn allocate(&mut self, size: u32) -> Option<u32> {
        if size == 0 {
            return Some(0);
        }
        let slot = self.free.iter().position(|r| r.end - r.start >= size)?;
        let start = self.free[slot].start;
        self.free[slot].start += size;
        if self.free[slot].is_empty() {
            self.free.remove(slot);
        }
        Some(start)
    }

    fn free(&mut self, start: u32, size: u32) {
        if size == 0 {
            return;
        }
        let end = start + size;
        let pos = self.free.partition_point(|r| r.start < start);
        self.free.insert(pos, start..end);

        if pos + 1 < self.free.len() && self.free[pos].end == self.free[pos + 1].start {
            self.free[pos].end = self.free[pos + 1].end;
            self.free.remove(pos + 1);
        }
        if pos > 0 && self.free[pos - 1].end == self.free[pos].start {
            self.free[pos - 1].end = self.free[pos].end;
            self.free.remove(pos);
        }
    }

    fn available(&self) -> u32 {
        self.free.iter().map(|r| r.end - r.start).sum()
    }
}

struct Allocation {
    generation: u32,
    live: bool,
    vertex_start: u32,
    vertex_capacity: u32,
    vertex_used: u32,
    index_start: u32,
    index_capacity: u32,
    index_used: u32,
}

pub struct MeshPool {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    vertex_ranges: RangeAllocator,
    index_ranges: RangeAllocator,
    allocations: Vec<Allocation>,
    free_handles: Vec<u32>,
    live: usize,
}

impl MeshPool {
    pub fn with_capacity(vertices: u32, indices: u32) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            vertex_ranges: RangeAllocator::new(vertices),
            index_ranges: RangeAllocator::new(indices),
            allocations: Vec::new(),
            free_handles: Vec::new(),
            live: 0,
        }
    }

    fn allocation(&self, handle: MeshHandle) -> Option<&Allocation> {
        self.allocations
            .get(handle.index())
            .filter(|a| a.live && a.generation == handle.generation())
    }

    fn slices(&mut self, handle: MeshHandle) -> Option<MeshSlices<'_>> {
        let alloc = self.allocation(handle)?;
        let v = alloc.vertex_start as usize..(alloc.vertex_start + alloc.vertex_used) as usize;
        let i = alloc.index_start as usize..(alloc.index_start + alloc.index_used) as usize;
        let index_offset = alloc.vertex_start;
        Some(MeshSlices {
            vertices: &mut self.vertices[v],
            indices: &mut self.indices[i],
            index_offset,
        })
    }

    /// Absolute position of the allocation's first index in the shared index buffer.
    pub fn first_index(&self, handle: MeshHandle) -> Option<u32> {
        self.allocation(handle).map(|a| a.index_start)
    }

    pub fn live_allocations(&self) -> usize {
        self.live
    }

    pub fn available_vertices(&self) -> u32 {
        self.vertex_ranges.available()
    }

    pub fn vertex_capacity(&self) -> u32 {
        self.vertex_ranges.capacity
    }

    /// Raw vertex buffer contents, ready for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

impl Default for MeshPool {
    fn default() -> Self {
        Self::with_capacity(1 << 20, 1 << 21)
    }
}

impl MeshService for MeshPool {
    fn allocate(&mut self, vertices: u32, indices: u32) -> Option<MeshHandle> {
        let vertex_start = self.vertex_ranges.allocate(vertices)?;
        let Some(index_start) = self.index_ranges.allocate(indices) else {
            self.vertex_ranges.free(vertex_start, vertices);
            return None;
        };

        let vertex_end = (vertex_start + vertices) as usize;
        if self.vertices.len() < vertex_end {
            self.vertices.resize(vertex_end, bytemuck::Zeroable::zeroed());
        }
        let index_end = (index_start + indices) as usize;
        if self.indices.len() < index_end {
            self.indices.resize(index_end, 0);
        }

        let (slot, generation) = match self.free_handles.pop() {
            Some(slot) => {
                let generation = self.allocations[slot as usize].generation.wrapping_add(1);
                (slot, generation)
            }
            None => {
                self.allocations.push(Allocation {
                    generation: 0,
                    live: false,
                    vertex_start: 0,
                    vertex_capacity: 0,
                    vertex_used: 0,
                    index_start: 0,
                    index_capacity: 0,
                    index_used: 0,
                });
                ((self.allocations.len() - 1) as u32, 0)
            }
        };

        self.allocations[slot as usize] = Allocation {
            generation,
            live: true,
            vertex_start,
            vertex_capacity: vertices,
            vertex_used: vertices,
            index_start,
            index_capacity: indices,
            index_used: indices,
        };
        self.live += 1;
        Some(MeshHandle::new(slot, generation))
    }

    fn update(
        &mut self,
        handle: MeshHandle,
        vertices: u32,
        indices: u32,
    ) -> Option<MeshSlices<'_>> {
        let alloc = self.allocation(handle)?;
        if vertices > alloc.vertex_capacity || indices > alloc.index_capacity {
            return None;
        }
        let alloc = &mut self.allocations[handle.index()];
        alloc.vertex_used = vertices;
        alloc.index_used = indices;
        self.slices(handle)
    }

    fn slices_mut(&mut self, handle: MeshHandle) -> Option<MeshSlices<'_>> {
        self.slices(handle)
    }

    fn free(&mut self, handle: MeshHandle) {
        let Some(alloc) = self.allocation(handle) else {
            return;
        };
        let (vs, vc, is, ic) = (
            alloc.vertex_start,
            alloc.vertex_capacity,
            alloc.index_start,
            alloc.index_capacity,
        );
        self.vertex_ranges.free(vs, vc);
        self.index_ranges.free(is, ic);
        self.allocations[handle.index()].live = false;
        self.free_handles.push(handle.index() as u32);
        self.live -= 1;
    }

    fn capacity(&self, handle: MeshHandle) -> Option<(u32, u32)> {
        self.allocation(handle)
            .map(|a| (a.vertex_capacity, a.index_capacity))
    }

    fn vertices(&self, handle: MeshHandle) -> &[Vertex] {
        match self.allocation(handle) {
            Some(a) => {
                &self.vertices[a.vertex_start as usize..(a.vertex_start + a.vertex_used) as usize]
            }
            None => &[],
        }
    }

    fn indices(&self, handle: MeshHandle) -> &[u32] {
        match self.allocation(handle) {
            Some(a) => {
                &self.indices[a.index_start as usize..(a.index_start + a.index_used) as usize]
            }
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::VertexFlags;

    #[test]
    fn test_allocate_and_write() {
        let mut pool = MeshPool::with_capacity(16, 32);
        let handle = pool.allocate(4, 6).unwrap();
        {
            let slices = pool.update(handle, 4, 6).unwrap();
            slices.vertices[0] = Vertex::new(1.0, 2.0, [1.0; 4], VertexFlags::SOLID);
            slices.indices[0] = slices.index_offset;
        }
        assert_eq!(pool.vertices(handle)[0].position, [1.0, 2.0, 0.0]);
        assert_eq!(pool.indices(handle).len(), 6);
        assert_eq!(pool.live_allocations(), 1);
    }

    #[test]
    fn test_update_beyond_capacity_fails() {
        let mut pool = MeshPool::with_capacity(16, 32);
        let handle = pool.allocate(4, 6).unwrap();
        assert!(pool.update(handle, 5, 6).is_none());
        // Shrinking stays within the same allocation.
        assert_eq!(pool.update(handle, 3, 3).unwrap().vertices.len(), 3);
        assert_eq!(pool.capacity(handle), Some((4, 6)));
    }

    #[test]
    fn test_exhaustion_and_reuse() {
        let mut pool = MeshPool::with_capacity(8, 12);
        let a = pool.allocate(4, 6).unwrap();
        let b = pool.allocate(4, 6).unwrap();
        assert!(pool.allocate(1, 1).is_none());

        pool.free(a);
        let c = pool.allocate(4, 6).unwrap();
        assert_ne!(a, c);
        assert!(pool.vertices(a).is_empty());
        assert_eq!(pool.live_allocations(), 2);

        pool.free(b);
        pool.free(c);
        assert_eq!(pool.available_vertices(), 8);
    }

    #[test]
    fn test_free_coalesces_neighbours() {
        let mut pool = MeshPool::with_capacity(12, 12);
        let a = pool.allocate(4, 4).unwrap();
        let b = pool.allocate(4, 4).unwrap();
        let c = pool.allocate(4, 4).unwrap();
        pool.free(a);
        pool.free(c);
        pool.free(b);
        // A single 12-vertex block is available again.
        assert!(pool.allocate(12, 12).is_some());
    }

    #[test]
    fn test_bytes_view() {
        let mut pool = MeshPool::with_capacity(4, 6);
        pool.allocate(4, 6).unwrap();
        assert_eq!(pool.vertex_bytes().len(), 4 * std::mem::size_of::<Vertex>());
        assert_eq!(pool.index_bytes().len(), 6 * 4);
    }
}
