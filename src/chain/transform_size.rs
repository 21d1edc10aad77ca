//! Transform and size propagation: slot uploads, vertex nudging and
//! repaint scheduling.

use crate::gpu::{MeshService, SlotAllocator};
use crate::transform::Transform;
use crate::tree::{ElementId, ElementTree};

use super::dirty::{DirtyClass, DirtyFlags};
use super::RenderChain;

impl<M: MeshService, S: SlotAllocator> RenderChain<M, S> {
    pub(super) fn process_transform_size(&mut self, tree: &ElementTree) {
        self.sweep(tree, DirtyClass::TransformSize, |chain, tree, id, pass| {
            chain.stats.recursive_transform_updates += 1;
            chain.update_transform_size(tree, id, pass, false, false, false);
        });
    }

    /// `ancestor_skinned` is set below a bone whose slot already carries the
    /// change.
    fn update_transform_size(
        &mut self,
        tree: &ElementTree,
        id: ElementId,
        pass: u32,
        ancestor_skinned: bool,
        transform_changed: bool,
        clip_rect_size_changed: bool,
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

        let own = self.tracker.flags(id);
        let transform_changed = transform_changed || own.contains(DirtyFlags::TRANSFORM);
        let clip_rect_size_changed =
            clip_rect_size_changed || own.contains(DirtyFlags::CLIP_RECT_SIZE);
        let repaint_pending = own.intersects(DirtyFlags::VISUALS | DirtyFlags::VISUALS_HIERARCHY);

        let clip_rect_id = record.clip_rect_id;
        let transform_id = record.transform_id;
        let group = record.group_transform_ancestor;
        let has_mesh = record.data.is_some();
        let disable_nudging = record.disable_nudging;

        if clip_rect_id.is_owned() && (transform_changed || clip_rect_size_changed) {
            let clip = tree.clip_rect_in_frame(id, group);
            self.slots.set_clip_rect_value(
                clip_rect_id.index,
                [clip.x, clip.y, clip.max_x(), clip.max_y()],
            );
        }

        let mut resolved = true;
        let mut ancestor_skinned = ancestor_skinned;
        if transform_id.is_owned() {
            if transform_changed {
                self.slots
                    .set_transform_value(transform_id.index, tree.transform_in_frame(id, group));
                self.stats.bone_transformed += 1;
                ancestor_skinned = true;
            }
        } else if !transform_changed {
            // Size only: nothing to move.
        } else if element.is_group_transform() {
            if !self.changed_groups.contains(&id) {
                self.changed_groups.push(id);
            }
            self.stats.group_transform_elements_changed += 1;
        } else if ancestor_skinned {
            // Left unstamped so a later change of its own still runs.
            resolved = false;
            self.stats.skip_transformed += 1;
        } else if !repaint_pending && has_mesh {
            if !disable_nudging && self.nudge_vertices(tree, id) {
                self.stats.nudge_transformed += 1;
            } else {
                self.mark_visuals(id, false);
                self.stats.visual_update_transformed += 1;
            }
        }

        if resolved {
            if let Some(record) = self.records.get_mut(id) {
                record.dirty_id = pass;
            }
        }

        if (transform_changed || clip_rect_size_changed) && !element.is_group_transform() {
            for &child in tree.children(id) {
                self.stats.recursive_transform_updates_expanded += 1;
                self.update_transform_size(
                    tree,
                    child,
                    pass,
                    ancestor_skinned,
                    transform_changed,
                    clip_rect_size_changed,
                );
            }
        }
    }

    /// Move existing vertices into the element's new vertex space. Returns
    /// `false` when the move cannot be done accurately.
    fn nudge_vertices(&mut self, tree: &ElementTree, id: ElementId) -> bool {
        let Some(record) = self.records.get(id) else {
            return false;
        };
        let old = record.vertices_space;
        let new = self.vertices_space_for(tree, id);
        let Some(old_inverse) = old.inverse() else {
            log::debug!("nudge refused for {:?}: singular vertex space", id);
            return false;
        };
        let nudge = new.then(&old_inverse);
        let error = nudge.then(&old).affine_deviation(&new);
        if error > self.config.nudge_tolerance {
            log::debug!("nudge refused for {:?}: error {}", id, error);
            return false;
        }

        for handle in [record.data, record.closing_data].into_iter().flatten() {
            if let Some(slices) = self.mesh.slices_mut(handle) {
                for vertex in slices.vertices.iter_mut() {
                    vertex.position = nudge.transform_point3(vertex.position);
                }
            }
        }
        if let Some(record) = self.records.get_mut(id) {
            record.vertices_space = new;
        }
        true
    }

    /// The space vertices of `id` are baked in: identity for elements
    /// transformed by a slot or a view, the bone or group frame below one,
    /// world space otherwise.
    pub(super) fn vertices_space_for(&self, tree: &ElementTree, id: ElementId) -> Transform {
        let Some(record) = self.records.get(id) else {
            return Transform::IDENTITY;
        };
        let is_group = tree.get(id).is_some_and(|e| e.is_group_transform());
        let space = if record.transform_id.is_owned() || is_group {
            Transform::IDENTITY
        } else if let Some(bone) = record.bone_transform_ancestor {
            tree.transform_in_frame(id, Some(bone))
        } else if let Some(group) = record.group_transform_ancestor {
            tree.transform_in_frame(id, Some(group))
        } else {
            tree.world_transform(id)
        };
        space.with_unit_z()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::chain::{DirtyFlags, MeshGenerationContext, RenderChain};
    use crate::config::ChainConfig;
    use crate::element::{Element, RenderHints, VisualContent};
    use crate::geometry::Color;
    use crate::gpu::{MeshService, Vertex, VertexFlags};
    use crate::transform::Transform;
    use crate::tree::ElementTree;

    fn painted() -> Element {
        Element::new()
            .with_rect(10.0, 10.0, 20.0, 20.0)
            .with_background(Color::WHITE)
    }

    #[test]
    fn test_translation_nudges_vertices_in_place() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let el = tree.create(painted());
        tree.insert_child(root, el, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();
        let handle = chain.record(el).unwrap().mesh().unwrap();
        assert_eq!(chain.mesh_service().vertices(handle)[0].position[0], 10.0);

        tree.get_mut(el).unwrap().rect.x = 15.0;
        chain.on_transform_or_size_changed(el, true, false).unwrap();
        let report = chain.process_changes(&tree).unwrap();

        assert_eq!(report.stats.nudge_transformed, 1);
        assert_eq!(report.stats.visual_update_transformed, 0);
        assert_eq!(chain.record(el).unwrap().mesh(), Some(handle));
        let x = chain.mesh_service().vertices(handle)[0].position[0];
        assert!((x - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_scale_to_zero_repaints() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let el = tree.create(painted());
        tree.insert_child(root, el, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        tree.get_mut(el).unwrap().transform = Transform::scale(0.0);
        chain.on_transform_or_size_changed(el, true, false).unwrap();
        let report = chain.process_changes(&tree).unwrap();
        assert_eq!(report.stats.nudge_transformed, 0);
        assert_eq!(report.stats.visual_update_transformed, 1);
    }

    struct Hairline;

    impl VisualContent for Hairline {
        fn generate(&self, ctx: &mut MeshGenerationContext<'_>) {
            let (vertices, indices) = {
                let r = ctx.rect();
                let tint = Color::BLACK.to_array();
                (
                    vec![
                        Vertex::new(r.x, r.y, tint, VertexFlags::SOLID),
                        Vertex::new(r.max_x(), r.y, tint, VertexFlags::SOLID),
                        Vertex::new(r.max_x(), r.y + 1.0, tint, VertexFlags::SOLID),
                    ],
                    vec![0, 1, 2],
                )
            };
            ctx.add_scale_dependent_mesh(vertices, indices);
        }
    }

    #[test]
    fn test_scale_dependent_content_is_never_nudged() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let el = tree.create(painted().with_content(Rc::new(Hairline)));
        tree.insert_child(root, el, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();
        assert!(chain.record(el).unwrap().disable_nudging());

        tree.get_mut(el).unwrap().rect.x = 12.0;
        chain.on_transform_or_size_changed(el, true, false).unwrap();
        chain.process_transform_size(&tree);
        assert!(chain.dirty_flags(el).contains(DirtyFlags::VISUALS));
        assert_eq!(chain.stats.visual_update_transformed, 1);
    }

    #[test]
    fn test_bone_uploads_slot_and_skips_descendants() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let bone = tree.create(painted().with_hints(RenderHints::BONE_TRANSFORM));
        let leaf = tree.create(painted());
        tree.insert_child(root, bone, None).unwrap();
        tree.insert_child(bone, leaf, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        tree.get_mut(bone).unwrap().rect.x = 40.0;
        chain.on_transform_or_size_changed(bone, true, false).unwrap();
        let report = chain.process_changes(&tree).unwrap();

        assert_eq!(report.stats.bone_transformed, 1);
        assert_eq!(report.stats.skip_transformed, 1);
        assert_eq!(report.stats.nudge_transformed, 0);
        let slot = chain.record(bone).unwrap().transform_id().index;
        let value = chain.slot_allocator().transform(slot).unwrap();
        assert_eq!(value.translation(), (40.0, 10.0));
    }

    #[test]
    fn test_group_transform_is_reported_not_recursed() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let group = tree.create(Element::new().with_hints(RenderHints::GROUP_TRANSFORM));
        let leaf = tree.create(painted());
        tree.insert_child(root, group, None).unwrap();
        tree.insert_child(group, leaf, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        tree.get_mut(group).unwrap().rect.y = 5.0;
        chain.on_transform_or_size_changed(group, true, false).unwrap();
        let report = chain.process_changes(&tree).unwrap();

        assert_eq!(report.changed_groups, vec![group]);
        assert_eq!(report.stats.group_transform_elements_changed, 1);
        assert_eq!(report.stats.recursive_transform_updates_expanded, 0);
    }

    #[test]
    fn test_inaccurate_nudge_falls_back_to_repaint() {
        let far = || {
            let mut element = painted();
            element.rect.x = 100_000.0;
            element.transform = Transform::rotate(0.3);
            element
        };
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let el = tree.create(far());
        tree.insert_child(root, el, None).unwrap();

        let mut chain: RenderChain = RenderChain::new(ChainConfig::default().nudge_tolerance(0.0));
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        tree.get_mut(el).unwrap().transform = Transform::rotate(0.7);
        chain.on_transform_or_size_changed(el, true, false).unwrap();
        let report = chain.process_changes(&tree).unwrap();

        assert_eq!(report.stats.nudge_transformed, 0);
        assert_eq!(report.stats.visual_update_transformed, 1);
        assert!(chain.is_clean());

        let mut fresh: RenderChain = RenderChain::default();
        fresh.on_child_added(&tree, None, root, 0).unwrap();
        fresh.process_changes(&tree).unwrap();

        let repainted = chain.mesh_service().vertices(chain.record(el).unwrap().mesh().unwrap());
        let expected = fresh.mesh_service().vertices(fresh.record(el).unwrap().mesh().unwrap());
        assert_eq!(repainted.len(), expected.len());
        for (a, b) in repainted.iter().zip(expected) {
            assert_eq!(a.position, b.position);
        }
    }
}

