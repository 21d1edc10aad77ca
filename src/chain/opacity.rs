//! Composite opacity and opacity slot propagation.

use crate::gpu::{MeshService, SlotAllocator};
use crate::tree::{ElementId, ElementTree};

use super::dirty::{DirtyClass, DirtyFlags};
use super::record::SlotRef;
use super::{RenderChain, OPACITY_EPSILON, VISIBILITY_THRESHOLD};

impl<M: MeshService, S: SlotAllocator> RenderChain<M, S> {
    pub(super) fn process_opacity(&mut self, tree: &ElementTree) {
        self.sweep(tree, DirtyClass::Opacity, |chain, tree, id, pass| {
            let hierarchical = chain
                .tracker
                .flags(id)
                .contains(DirtyFlags::OPACITY_HIERARCHY);
            chain.stats.recursive_opacity_updates += 1;
            chain.update_opacity(tree, id, pass, hierarchical, false);
        });
    }

    /// `full_regen` is set once an ancestor queued a hierarchical repaint.
    fn update_opacity(
        &mut self,
        tree: &ElementTree,
        id: ElementId,
        pass: u32,
        hierarchical: bool,
        full_regen: bool,
    ) {
        let Some(element) = tree.get(id) else {
            return;
        };
        let Some(record) = self.records.get(id) else {
            return;
        };
        if record.dirty_id == pass {
            return;
        }

        let (parent_composite, parent_id) = tree
            .parent(id)
            .and_then(|p| self.records.get(p))
            .filter(|r| r.is_in_chain)
            .map(|r| (r.composite_opacity, r.opacity_id))
            .unwrap_or((1.0, SlotRef::DEFAULT));

        let old = record.composite_opacity;
        let old_id = record.opacity_id;
        let has_mesh = record.data.is_some();
        let new = element.style.opacity.clamp(0.0, 1.0) * parent_composite;

        let crossed = (old < VISIBILITY_THRESHOLD) != (new < VISIBILITY_THRESHOLD);
        let changed = (old - new).abs() > OPACITY_EPSILON || crossed;
        let became_visible = old < VISIBILITY_THRESHOLD && new >= VISIBILITY_THRESHOLD;

        let mut new_id = old_id;
        if changed {
            if new < parent_composite - OPACITY_EPSILON {
                if !old_id.is_owned() {
                    match self.slots.alloc_opacity() {
                        Some(slot) => new_id = SlotRef::owned(slot),
                        None => {
                            log::debug!("opacity slots exhausted, {:?} follows its parent", id);
                            new_id = parent_id.inherited();
                        }
                    }
                }
                if new_id.is_owned() {
                    self.slots.set_opacity_value(new_id.index, new);
                }
            } else if old_id.is_owned() {
                self.slots.set_opacity_value(old_id.index, new);
            } else {
                new_id = parent_id.inherited();
            }
        } else if !old_id.is_owned() && old_id.index != parent_id.index {
            new_id = parent_id.inherited();
        }
        let slot_changed = new_id.index != old_id.index;

        if let Some(record) = self.records.get_mut(id) {
            record.composite_opacity = new;
            record.opacity_id = new_id;
            record.dirty_id = pass;
        }

        let mut full_regen = full_regen;
        let repaint_pending = self
            .tracker
            .flags(id)
            .intersects(DirtyFlags::VISUALS | DirtyFlags::VISUALS_HIERARCHY);
        if slot_changed && !full_regen && !repaint_pending && has_mesh {
            self.mark_opacity_id(id);
        }
        if became_visible && !full_regen {
            // Hidden subtrees were never painted.
            self.mark_visuals(id, true);
            full_regen = true;
        }

        if changed || slot_changed || hierarchical {
            for &child in tree.children(id) {
                self.stats.recursive_opacity_updates_expanded += 1;
                self.update_opacity(tree, child, pass, hierarchical, full_regen);
            }
        }
    }
}
