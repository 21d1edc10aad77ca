//! Text mesh generation.
//!
//! The chain only needs glyph quads in element-local space; shaping and
//! rasterization live behind [`TextGenerator`]. [`MonospaceText`] is a
//! deterministic generator with a tiny glyph atlas, enough to exercise atlas
//! resets and in-place regeneration.

use crate::element::TextContent;
use crate::geometry::Rect;
use crate::gpu::{Vertex, VertexFlags};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Generating this mesh forced the atlas to be rebuilt; glyph UVs handed
    /// out earlier are stale.
    pub atlas_reset: bool,
}

pub trait TextGenerator {
    fn generate(&mut self, text: &TextContent, rect: Rect) -> TextMesh;

    /// The atlas was rebuilt externally.
    fn on_atlas_reset(&mut self) {}
}

/// Fixed-advance glyph layout over a square atlas of `atlas_cells` cells.
pub struct MonospaceText {
    advance_ratio: f32,
    atlas_cells: usize,
    packed: Vec<char>,
}

const ATLAS_COLUMNS: usize = 16;

impl MonospaceText {
    pub fn new() -> Self {
        Self::with_atlas_cells(256)
    }

    pub fn with_atlas_cells(atlas_cells: usize) -> Self {
        Self {
            advance_ratio: 0.6,
            atlas_cells: atlas_cells.max(1),
            packed: Vec::new(),
        }
    }

    /// Atlas cell for `c`, packing it if needed. Returns whether the atlas
    /// had to be cleared to make room.
    fn cell(&mut self, c: char) -> (usize, bool) {
        if let Some(pos) = self.packed.iter().position(|&p| p == c) {
            return (pos, false);
        }
        let mut reset = false;
        if self.packed.len() >= self.atlas_cells {
            log::debug!("glyph atlas full, rebuilding");
            self.packed.clear();
            reset = true;
        }
        self.packed.push(c);
        (self.packed.len() - 1, reset)
    }

    fn uv(cell: usize) -> (f32, f32) {
        let step = 1.0 / ATLAS_COLUMNS as f32;
        (
            (cell % ATLAS_COLUMNS) as f32 * step,
            (cell / ATLAS_COLUMNS) as f32 * step,
        )
    }

    pub fn packed_glyphs(&self) -> usize {
        self.packed.len()
    }
}

impl Default for MonospaceText {
    fn default() -> Self {
        Self::new()
    }
}

impl TextGenerator for MonospaceText {
    fn generate(&mut self, text: &TextContent, rect: Rect) -> TextMesh {
        let mut mesh = TextMesh::default();
        let advance = text.font_size * self.advance_ratio;
        let tint = text.color.to_array();
        let step = 1.0 / ATLAS_COLUMNS as f32;
        let flags = VertexFlags::TEXT;

        for (i, c) in text.text.chars().enumerate() {
            if c.is_whitespace() {
                continue;
            }
            let (cell, reset) = self.cell(c);
            mesh.atlas_reset |= reset;
            let (u, v) = Self::uv(cell);

            let x = rect.x + i as f32 * advance;
            let y = rect.y;
            let base = mesh.vertices.len() as u32;
            mesh.vertices.extend_from_slice(&[
                Vertex::new(x, y, tint, flags).with_uv(u, v),
                Vertex::new(x + advance, y, tint, flags).with_uv(u + step, v),
                Vertex::new(x + advance, y + text.font_size, tint, flags).with_uv(u + step, v + step),
                Vertex::new(x, y + text.font_size, tint, flags).with_uv(u, v + step),
            ]);
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    fn on_atlas_reset(&mut self) {
        self.packed.clear();
    }
}
