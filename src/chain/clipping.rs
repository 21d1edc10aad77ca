//! Clip method selection and clip-rect slot propagation.

use crate::element::{Element, RenderHints};
use crate::gpu::{MeshService, SlotAllocator};
use crate::tree::{ElementId, ElementTree};

use super::dirty::{DirtyClass, DirtyFlags};
use super::record::{ClipMethod, SlotRef};
use super::RenderChain;

#[derive(Clone, Copy, Debug, Default)]
struct ClipUpdate {
    hierarchical: bool,
    is_root_of_change: bool,
    /// An ancestor already queued a hierarchical repaint covering us.
    pending_hierarchical_repaint: bool,
    inherited_clip_rect_changed: bool,
    inherited_masking_changed: bool,
}

impl<M: MeshService, S: SlotAllocator> RenderChain<M, S> {
    pub(super) fn process_clipping(&mut self, tree: &ElementTree) {
        self.sweep(tree, DirtyClass::Clipping, |chain, tree, id, pass| {
            let hierarchical = chain
                .tracker
                .flags(id)
                .contains(DirtyFlags::CLIPPING_HIERARCHY);
            chain.stats.recursive_clip_updates += 1;
            chain.update_clipping(
                tree,
                id,
                pass,
                ClipUpdate {
                    hierarchical,
                    is_root_of_change: true,
                    ..ClipUpdate::default()
                },
            );
        });
    }

    fn update_clipping(&mut self, tree: &ElementTree, id: ElementId, pass: u32, update: ClipUpdate) {
        let Some(element) = tree.get(id) else {
            return;
        };
        let Some(record) = self.records.get(id) else {
            return;
        };
        if record.dirty_id == pass
            && !update.inherited_clip_rect_changed
            && !update.inherited_masking_changed
        {
            return;
        }

        let parent = tree
            .parent(id)
            .and_then(|p| self.records.get(p))
            .filter(|r| r.is_in_chain);
        let has_parent = parent.is_some();
        let (parent_clip_id, parent_stencil) = parent
            .map(|r| (r.clip_rect_id, r.is_stencil_clipped))
            .unwrap_or((SlotRef::DEFAULT, false));

        let old_method = record.clip_method;
        let old_clip_id = record.clip_rect_id;
        let old_stencil = record.is_stencil_clipped;

        // A parent's recursion can reach an element before its own entry does.
        let own = self.tracker.flags(id);
        let hierarchical = update.hierarchical || own.contains(DirtyFlags::CLIPPING_HIERARCHY);
        let is_root_of_change = update.is_root_of_change || own.contains(DirtyFlags::CLIPPING);

        let mut method = old_method;
        if hierarchical
            || is_root_of_change
            || update.inherited_masking_changed
            || old_method == ClipMethod::Undetermined
        {
            method = self.determine_clip_method(element, parent_stencil);
        }

        let mut clip_id = old_clip_id;
        if method == ClipMethod::ShaderDiscard && !clip_id.is_owned() {
            match self.slots.alloc_clip_rect() {
                Some(slot) => clip_id = SlotRef::owned(slot),
                None => {
                    log::debug!("clip rect slots exhausted, {:?} falls back to scissor", id);
                    method = ClipMethod::Scissor;
                }
            }
        }
        if method != ClipMethod::ShaderDiscard {
            if clip_id.is_owned() {
                self.slots.free_clip_rect(clip_id.index);
            }
            // Groups start a new frame; nothing above them applies.
            clip_id = if !element.is_group_transform() && has_parent {
                parent_clip_id.inherited()
            } else {
                SlotRef::DEFAULT
            };
        }

        let mut repaint_hierarchy = false;
        let mut repaint_self = false;
        if method != old_method {
            if old_method == ClipMethod::Stencil || method == ClipMethod::Stencil {
                repaint_hierarchy = true;
            } else if old_method == ClipMethod::Scissor || method == ClipMethod::Scissor {
                repaint_self = true;
            }
            // Owned rects below are intersected with ours; refresh them too.
            let refresh_below =
                old_method != ClipMethod::Undetermined && (old_method.clips() || method.clips());
            if method == ClipMethod::ShaderDiscard || refresh_below {
                self.mark_transform_size(id, false, true);
            }
        }

        let clip_id_changed = clip_id.index != old_clip_id.index;
        if clip_id_changed {
            repaint_self = true;
        }

        let is_stencil = method == ClipMethod::Stencil || parent_stencil;
        let masking_changed = is_stencil != old_stencil;
        if masking_changed {
            // Winding of every draw flips.
            repaint_self = true;
        }

        if let Some(record) = self.records.get_mut(id) {
            record.clip_method = method;
            record.clip_rect_id = clip_id;
            record.is_stencil_clipped = is_stencil;
            record.dirty_id = pass;
        }

        let already_hierarchical = update.pending_hierarchical_repaint
            || self
                .tracker
                .flags(id)
                .contains(DirtyFlags::VISUALS_HIERARCHY);
        if !already_hierarchical {
            if repaint_hierarchy {
                self.mark_visuals(id, true);
            } else if repaint_self {
                self.mark_visuals(id, false);
            }
        }

        if hierarchical || clip_id_changed || masking_changed {
            let child_update = ClipUpdate {
                hierarchical,
                is_root_of_change: false,
                pending_hierarchical_repaint: already_hierarchical || repaint_hierarchy,
                inherited_clip_rect_changed: clip_id_changed,
                inherited_masking_changed: masking_changed,
            };
            for &child in tree.children(id) {
                self.stats.recursive_clip_updates_expanded += 1;
                self.update_clipping(tree, child, pass, child_update);
            }
        }
    }

    fn determine_clip_method(&self, element: &Element, parent_stencil: bool) -> ClipMethod {
        if !element.should_clip() {
            return ClipMethod::NotClipped;
        }
        if element
            .hints
            .intersects(RenderHints::GROUP_TRANSFORM | RenderHints::CLIP_WITH_SCISSORS)
        {
            return ClipMethod::Scissor;
        }
        // Nested stencils and camera drawing only support rectangles.
        if !element.has_rounded_clip() || parent_stencil || self.config.draw_in_cameras {
            return ClipMethod::ShaderDiscard;
        }
        ClipMethod::Stencil
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::{ClipMethod, RenderChain};
    use crate::config::{ChainConfig, SlotTableConfig};
    use crate::element::{CornerRadii, Element, RenderHints};
    use crate::tree::{ElementId, ElementTree};

    fn setup(elements: Vec<Element>) -> (ElementTree, Vec<ElementId>) {
        let mut tree = ElementTree::new();
        let ids: Vec<_> = elements.into_iter().map(|e| tree.create(e)).collect();
        for pair in ids.windows(2) {
            tree.insert_child(pair[0], pair[1], None).unwrap();
        }
        (tree, ids)
    }

    #[test]
    fn test_method_per_clip_request() {
        let (tree, ids) = setup(vec![
            Element::new().with_rect(0.0, 0.0, 100.0, 100.0),
            Element::new().with_rect(0.0, 0.0, 50.0, 50.0).with_overflow_hidden(),
            Element::new()
                .with_rect(0.0, 0.0, 40.0, 40.0)
                .with_overflow_hidden()
                .with_hints(RenderHints::CLIP_WITH_SCISSORS),
            Element::new()
                .with_rect(0.0, 0.0, 30.0, 30.0)
                .with_overflow_hidden()
                .with_radii(CornerRadii::uniform(4.0)),
        ]);
        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, ids[0], 0).unwrap();
        chain.process_changes(&tree).unwrap();

        let methods: Vec<_> = ids
            .iter()
            .map(|&id| chain.record(id).unwrap().clip_method())
            .collect();
        assert_eq!(
            methods,
            vec![
                ClipMethod::NotClipped,
                ClipMethod::ShaderDiscard,
                ClipMethod::Scissor,
                ClipMethod::Stencil,
            ]
        );

        let discard = chain.record(ids[1]).unwrap().clip_rect_id();
        assert!(discard.is_owned());
        // Scissor and stencil elements stay inside the discard rect above.
        assert_eq!(chain.record(ids[2]).unwrap().clip_rect_id(), discard.inherited());
        assert_eq!(chain.record(ids[3]).unwrap().clip_rect_id(), discard.inherited());
        assert!(chain.record(ids[3]).unwrap().is_stencil_clipped());
    }

    #[test]
    fn test_nested_rounded_clip_uses_rectangles() {
        let rounded = || {
            Element::new()
                .with_rect(0.0, 0.0, 30.0, 30.0)
                .with_overflow_hidden()
                .with_radii(CornerRadii::uniform(4.0))
        };
        let (tree, ids) = setup(vec![Element::new(), rounded(), rounded()]);
        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, ids[0], 0).unwrap();
        chain.process_changes(&tree).unwrap();

        assert_eq!(chain.record(ids[1]).unwrap().clip_method(), ClipMethod::Stencil);
        assert_eq!(
            chain.record(ids[2]).unwrap().clip_method(),
            ClipMethod::ShaderDiscard
        );
        assert!(chain.record(ids[2]).unwrap().is_stencil_clipped());
    }

    #[test]
    fn test_camera_drawing_disables_stencil() {
        let (tree, ids) = setup(vec![Element::new()
            .with_rect(0.0, 0.0, 30.0, 30.0)
            .with_overflow_hidden()
            .with_radii(CornerRadii::uniform(4.0))]);
        let mut chain: RenderChain = RenderChain::new(ChainConfig::default().draw_in_cameras(true));
        chain.on_child_added(&tree, None, ids[0], 0).unwrap();
        chain.process_changes(&tree).unwrap();
        assert_eq!(
            chain.record(ids[0]).unwrap().clip_method(),
            ClipMethod::ShaderDiscard
        );
    }

    #[test]
    fn test_clip_slot_exhaustion_falls_back_to_scissor() {
        let clipped = || Element::new().with_rect(0.0, 0.0, 10.0, 10.0).with_overflow_hidden();
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let a = tree.create(clipped());
        let b = tree.create(clipped());
        tree.insert_child(root, a, None).unwrap();
        tree.insert_child(root, b, None).unwrap();

        // Slot 0 plus one allocatable slot.
        let config = ChainConfig::default().slots(SlotTableConfig::default().clip_rects(2));
        let mut chain: RenderChain = RenderChain::new(config);
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        assert_eq!(chain.record(a).unwrap().clip_method(), ClipMethod::ShaderDiscard);
        assert_eq!(chain.record(b).unwrap().clip_method(), ClipMethod::Scissor);
        assert_eq!(chain.record(b).unwrap().clip_rect_id().index, 0);
    }

    #[test]
    fn test_losing_clip_frees_slot_and_children_follow() {
        let (mut tree, ids) = setup(vec![
            Element::new(),
            Element::new().with_rect(0.0, 0.0, 50.0, 50.0).with_overflow_hidden(),
            Element::new().with_rect(0.0, 0.0, 10.0, 10.0),
        ]);
        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, ids[0], 0).unwrap();
        chain.process_changes(&tree).unwrap();

        let owned = chain.record(ids[1]).unwrap().clip_rect_id();
        assert_eq!(chain.record(ids[2]).unwrap().clip_rect_id(), owned.inherited());

        tree.get_mut(ids[1]).unwrap().style.overflow = crate::element::Overflow::Visible;
        chain.on_clipping_changed(ids[1], false).unwrap();
        chain.process_changes(&tree).unwrap();

        assert_eq!(chain.record(ids[1]).unwrap().clip_method(), ClipMethod::NotClipped);
        assert_eq!(chain.record(ids[2]).unwrap().clip_rect_id().index, 0);
        assert_eq!(chain.slot_allocator().clip_rects_in_use(), 0);
    }

    #[test]
    fn test_own_clip_change_survives_parent_recursion() {
        let (mut tree, ids) = setup(vec![
            Element::new(),
            Element::new()
                .with_rect(0.0, 0.0, 100.0, 100.0)
                .with_overflow_hidden()
                .with_radii(CornerRadii::uniform(8.0)),
            Element::new().with_rect(0.0, 0.0, 50.0, 50.0).with_overflow_hidden(),
        ]);
        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, ids[0], 0).unwrap();
        chain.process_changes(&tree).unwrap();
        assert_eq!(chain.record(ids[1]).unwrap().clip_method(), ClipMethod::Stencil);
        assert_eq!(chain.record(ids[2]).unwrap().clip_method(), ClipMethod::ShaderDiscard);

        // The rounded clip moves from the parent to the child in one frame.
        tree.get_mut(ids[1]).unwrap().style.radii = CornerRadii::default();
        tree.get_mut(ids[2]).unwrap().style.radii = CornerRadii::uniform(4.0);
        chain.on_clipping_changed(ids[1], false).unwrap();
        chain.on_clipping_changed(ids[2], false).unwrap();
        chain.process_changes(&tree).unwrap();

        assert_eq!(chain.record(ids[1]).unwrap().clip_method(), ClipMethod::ShaderDiscard);
        assert_eq!(chain.record(ids[2]).unwrap().clip_method(), ClipMethod::Stencil);
        assert!(chain.record(ids[2]).unwrap().is_stencil_clipped());
    }

    #[test]
    fn test_parent_losing_stencil_lets_child_round() {
        let rounded = |size: f32| {
            Element::new()
                .with_rect(0.0, 0.0, size, size)
                .with_overflow_hidden()
                .with_radii(CornerRadii::uniform(4.0))
        };
        let (mut tree, ids) = setup(vec![Element::new(), rounded(60.0), rounded(30.0)]);
        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, ids[0], 0).unwrap();
        chain.process_changes(&tree).unwrap();
        assert_eq!(chain.record(ids[2]).unwrap().clip_method(), ClipMethod::ShaderDiscard);

        tree.get_mut(ids[1]).unwrap().style.overflow = crate::element::Overflow::Visible;
        chain.on_clipping_changed(ids[1], false).unwrap();
        chain.process_changes(&tree).unwrap();

        assert_eq!(chain.record(ids[1]).unwrap().clip_method(), ClipMethod::NotClipped);
        assert_eq!(chain.record(ids[2]).unwrap().clip_method(), ClipMethod::Stencil);
    }

    #[test]
    fn test_owned_rects_below_widen_when_parent_stops_clipping() {
        let (mut tree, ids) = setup(vec![
            Element::new(),
            Element::new().with_rect(0.0, 0.0, 50.0, 50.0).with_overflow_hidden(),
            Element::new().with_rect(0.0, 0.0, 200.0, 200.0).with_overflow_hidden(),
        ]);
        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, ids[0], 0).unwrap();
        chain.process_changes(&tree).unwrap();

        let slot = chain.record(ids[2]).unwrap().clip_rect_id();
        assert!(slot.is_owned());
        assert_eq!(
            chain.slot_allocator().clip_rect(slot.index),
            Some([0.0, 0.0, 50.0, 50.0])
        );

        tree.get_mut(ids[1]).unwrap().style.overflow = crate::element::Overflow::Visible;
        chain.on_clipping_changed(ids[1], false).unwrap();
        chain.process_changes(&tree).unwrap();

        assert_eq!(chain.record(ids[2]).unwrap().clip_rect_id(), slot);
        assert_eq!(
            chain.slot_allocator().clip_rect(slot.index),
            Some([0.0, 0.0, 200.0, 200.0])
        );
    }
}
