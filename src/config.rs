//! Tunables for a render chain and its in-memory GPU services.

/// Per-chain configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainConfig {
    /// Text elements regenerated per frame after `request_text_regen`.
    pub text_regen_budget: usize,
    /// Largest summed 3x4 error accepted when nudging vertices.
    pub nudge_tolerance: f32,
    /// World-space camera rendering cannot use stencil clipping.
    pub draw_in_cameras: bool,
    /// Painter output above this many vertices is dropped.
    pub max_vertices_per_mesh: usize,
    pub slots: SlotTableConfig,
    pub mesh_vertex_capacity: u32,
    pub mesh_index_capacity: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            text_regen_budget: 50,
            nudge_tolerance: 1e-4,
            draw_in_cameras: false,
            max_vertices_per_mesh: 65535,
            slots: SlotTableConfig::default(),
            mesh_vertex_capacity: 1 << 20,
            mesh_index_capacity: 1 << 21,
        }
    }
}

impl ChainConfig {
    pub fn text_regen_budget(mut self, budget: usize) -> Self {
        self.text_regen_budget = budget;
        self
    }

    pub fn nudge_tolerance(mut self, tolerance: f32) -> Self {
        self.nudge_tolerance = tolerance;
        self
    }

    pub fn draw_in_cameras(mut self, enabled: bool) -> Self {
        self.draw_in_cameras = enabled;
        self
    }

    pub fn max_vertices_per_mesh(mut self, max: usize) -> Self {
        self.max_vertices_per_mesh = max;
        self
    }

    pub fn slots(mut self, slots: SlotTableConfig) -> Self {
        self.slots = slots;
        self
    }

    pub fn mesh_capacity(mut self, vertices: u32, indices: u32) -> Self {
        self.mesh_vertex_capacity = vertices;
        self.mesh_index_capacity = indices;
        self
    }
}

/// Number of slots in each GPU table, including the shared default slot 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotTableConfig {
    pub transforms: u32,
    pub clip_rects: u32,
    pub opacities: u32,
    pub text_settings: u32,
}

impl Default for SlotTableConfig {
    fn default() -> Self {
        Self {
            transforms: 1024,
            clip_rects: 1024,
            opacities: 1024,
            text_settings: 1024,
        }
    }
}

impl SlotTableConfig {
    pub fn uniform(capacity: u32) -> Self {
        Self {
            transforms: capacity,
            clip_rects: capacity,
            opacities: capacity,
            text_settings: capacity,
        }
    }

    pub fn clip_rects(mut self, capacity: u32) -> Self {
        self.clip_rects = capacity;
        self
    }

    pub fn opacities(mut self, capacity: u32) -> Self {
        self.opacities = capacity;
        self
    }

    pub fn transforms(mut self, capacity: u32) -> Self {
        self.transforms = capacity;
        self
    }

    pub fn text_settings(mut self, capacity: u32) -> Self {
        self.text_settings = capacity;
        self
    }
}
