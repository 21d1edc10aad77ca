//! Time-sliced text regeneration.
//!
//! Every element that currently draws glyphs sits in a doubly linked text
//! list threaded through its record. Regeneration requests walk that list
//! from a rotating cursor, a bounded number of elements per frame; a glyph
//! atlas reset instead regenerates the whole list at once, at most twice
//! per frame.

use crate::gpu::{MeshService, SlotAllocator};
use crate::tree::{ElementId, ElementTree};

use super::dirty::DirtyFlags;
use super::painter::flip_winding;
use super::visuals::{write_indices, write_vertices};
use super::RenderChain;

const MAX_FULL_PASSES: usize = 2;

#[derive(Debug, Default)]
pub(crate) struct TextSlicer {
    pub first: Option<ElementId>,
    pub last: Option<ElementId>,
    pub count: usize,
    pub cursor: Option<ElementId>,
    /// Elements still to regenerate for the current request.
    pub remaining: usize,
    pub font_was_reset: bool,
}

impl<M: MeshService, S: SlotAllocator> RenderChain<M, S> {
    pub(super) fn link_text(&mut self, id: ElementId) {
        let last = self.text.last;
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        if record.is_in_text_list {
            return;
        }
        record.is_in_text_list = true;
        record.prev_text = last;
        record.next_text = None;

        match last.and_then(|l| self.records.get_mut(l)) {
            Some(tail) => tail.next_text = Some(id),
            None => self.text.first = Some(id),
        }
        self.text.last = Some(id);
        self.text.count += 1;
    }

    pub(super) fn unlink_text(&mut self, id: ElementId) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        if !record.is_in_text_list {
            return;
        }
        let (prev, next) = (record.prev_text, record.next_text);
        record.is_in_text_list = false;
        record.prev_text = None;
        record.next_text = None;

        match prev.and_then(|p| self.records.get_mut(p)) {
            Some(p) => p.next_text = next,
            None => self.text.first = next,
        }
        match next.and_then(|n| self.records.get_mut(n)) {
            Some(n) => n.prev_text = prev,
            None => self.text.last = prev,
        }
        if self.text.cursor == Some(id) {
            self.text.cursor = next.or(self.text.first);
        }
        self.text.count -= 1;
        self.text.remaining = self.text.remaining.min(self.text.count);
    }

    pub(super) fn process_text(&mut self, tree: &ElementTree) {
        if std::mem::take(&mut self.painter.atlas_reset) {
            self.text.font_was_reset = true;
        }

        let mut passes = 0;
        while self.text.font_was_reset && passes < MAX_FULL_PASSES {
            self.text.font_was_reset = false;
            passes += 1;
            log::debug!("glyph atlas reset, regenerating {} text elements", self.text.count);

            let mut current = self.text.first;
            while let Some(id) = current {
                current = self.records.get(id).and_then(|r| r.next_text);
                self.regen_text(tree, id);
            }
            // The pass may have overflowed the atlas again.
            if std::mem::take(&mut self.painter.atlas_reset) {
                self.text.font_was_reset = true;
            }
            self.text.remaining = 0;
        }

        let budget = self.config.text_regen_budget.min(self.text.remaining);
        let mut cursor = self.text.cursor.or(self.text.first);
        for _ in 0..budget {
            let Some(id) = cursor else {
                break;
            };
            cursor = self
                .records
                .get(id)
                .and_then(|r| r.next_text)
                .or(self.text.first);
            self.regen_text(tree, id);
            self.text.remaining = self.text.remaining.saturating_sub(1);
        }
        self.text.cursor = cursor;
    }

    /// Regenerate glyphs in place, or queue a repaint when the glyph count changed.
    fn regen_text(&mut self, tree: &ElementTree, id: ElementId) {
        let Some(element) = tree.get(id) else {
            return;
        };
        let Some(text) = element.text.as_ref() else {
            return;
        };
        let Some(record) = self.records.get(id) else {
            return;
        };
        if record.is_hierarchy_hidden {
            return;
        }
        let (Some(handle), Some(range)) = (record.data, record.text_range) else {
            return;
        };
        if self
            .tracker
            .flags(id)
            .intersects(DirtyFlags::VISUALS | DirtyFlags::VISUALS_HIERARCHY)
        {
            return;
        }
        let space = record.vertices_space;
        let flip = record.is_stencil_clipped;
        let Some(stamp) = self.slot_stamp(id) else {
            return;
        };

        let mesh = self.painter.generate_text(text, element.rect.local());
        if mesh.vertices.len() != range.vertex_count as usize
            || mesh.indices.len() != range.index_count as usize
        {
            self.mark_visuals(id, false);
            return;
        }

        let Some(slices) = self.mesh.slices_mut(handle) else {
            return;
        };
        let vertices = range.vertex_start as usize..(range.vertex_start + range.vertex_count) as usize;
        let indices = range.index_start as usize..(range.index_start + range.index_count) as usize;
        let base = slices.index_offset + range.vertex_start;
        let (Some(vertex_target), Some(index_target)) =
            (slices.vertices.get_mut(vertices), slices.indices.get_mut(indices))
        else {
            return;
        };
        write_vertices(vertex_target, &mesh.vertices, &space, stamp, stamp.text_settings);
        write_indices(index_target, &mesh.indices, base);
        if flip {
            flip_winding(index_target);
        }
        self.stats.text_updates += 1;
    }
}
