//! Repainting elements and splicing their commands into the list.

use crate::element::{Element, Visibility};
use crate::gpu::{MeshHandle, MeshService, SlotAllocator, Vertex};
use crate::transform::Transform;
use crate::tree::{ElementId, ElementTree};

use super::commands::{CommandId, CommandKind, DrawRange, StencilOp};
use super::dirty::{DirtyClass, DirtyFlags};
use super::painter::{flip_winding, ClosingInfo, EntryKind};
use super::record::{ClipMethod, SlotRef, TextRange};
use super::{RenderChain, VISIBILITY_THRESHOLD};

/// Slot indices written into every vertex of an element.
#[derive(Clone, Copy, Debug)]
pub(super) struct SlotStamp {
    pub transform: u32,
    pub clip_rect: u32,
    pub opacity: u32,
    pub text_settings: u32,
}

/// Where an element's commands sat before it was repainted.
#[derive(Clone, Copy, Debug, Default)]
struct Neighbours {
    prev: Option<CommandId>,
    next: Option<CommandId>,
    closing_prev: Option<CommandId>,
    closing_next: Option<CommandId>,
    /// No descendant command sat between the opening and closing runs.
    consecutive: bool,
    had_opening: bool,
    had_closing: bool,
}

impl<M: MeshService, S: SlotAllocator> RenderChain<M, S> {
    pub(super) fn process_visuals(&mut self, tree: &ElementTree) {
        self.sweep(tree, DirtyClass::Visuals, |chain, tree, id, pass| {
            let hierarchical = chain
                .tracker
                .flags(id)
                .contains(DirtyFlags::VISUALS_HIERARCHY);
            let parent_hidden = tree
                .parent(id)
                .and_then(|p| chain.records.get(p))
                .is_some_and(|r| r.is_hierarchy_hidden);
            if hierarchical {
                chain.stats.recursive_visual_updates += 1;
            } else {
                chain.stats.non_recursive_visual_updates += 1;
            }
            chain.update_visuals(tree, id, pass, hierarchical, parent_hidden);
        });
    }

    fn update_visuals(
        &mut self,
        tree: &ElementTree,
        id: ElementId,
        pass: u32,
        hierarchical: bool,
        parent_hidden: bool,
    ) {
        let Some(element) = tree.get(id) else {
            return;
        };
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        if record.dirty_id == pass {
            return;
        }
        record.dirty_id = pass;

        let hidden = parent_hidden || element.is_display_none();
        let mut hierarchical = hierarchical;
        if hidden != record.is_hierarchy_hidden {
            record.is_hierarchy_hidden = hidden;
            hierarchical = true;
        }

        let flags = self.tracker.flags(id);
        let opacity_id_only = flags.contains(DirtyFlags::VISUALS_OPACITY_ID)
            && !flags.intersects(DirtyFlags::VISUALS | DirtyFlags::VISUALS_HIERARCHY);
        if !hierarchical && opacity_id_only {
            self.restamp_opacity(id);
            self.stats.opacity_id_updates += 1;
            return;
        }

        let closing = self.paint_element(tree, id, element);
        if hierarchical {
            for &child in tree.children(id) {
                self.stats.recursive_visual_updates_expanded += 1;
                self.update_visuals(tree, child, pass, true, hidden);
            }
        }
        self.close_paint_element(id, closing);
    }

    fn paint_element(&mut self, tree: &ElementTree, id: ElementId, element: &Element) -> ClosingInfo {
        let Some(record) = self.records.get(id) else {
            return ClosingInfo::default();
        };
        let clip_method = record.clip_method;
        let self_hidden = element.style.visibility == Visibility::Hidden
            || record.composite_opacity < VISIBILITY_THRESHOLD;
        let has_obligations = matches!(clip_method, ClipMethod::Stencil | ClipMethod::Scissor)
            || element.is_group_transform()
            || element.style.render_target;
        if record.is_hierarchy_hidden || (self_hidden && !has_obligations) {
            self.release_visuals(id);
            return ClosingInfo::default();
        }

        let neighbours = self.save_neighbours(id);
        self.reset_commands(id);

        self.painter.paint(element, clip_method, !self_hidden);
        let painted_text = self
            .painter
            .entries
            .iter()
            .any(|e| e.kind == EntryKind::Text);
        if painted_text {
            self.update_text_settings(id, element);
            self.link_text(id);
        } else {
            self.release_text_settings(id);
            self.unlink_text(id);
        }

        if self.painter.vertex_count() > self.config.max_vertices_per_mesh {
            log::warn!(
                "{:?} produced {} vertices, more than the {} allowed per mesh; drawing nothing",
                id,
                self.painter.vertex_count(),
                self.config.max_vertices_per_mesh
            );
            self.painter.reset();
        }
        let disable_nudging = self.painter.disable_nudging;
        let entries = std::mem::take(&mut self.painter.entries);
        let mut closing = std::mem::take(&mut self.painter.closing);

        let space = self.vertices_space_for(tree, id);
        let Some(stamp) = self.slot_stamp(id) else {
            return ClosingInfo::default();
        };
        let vertex_count: usize = entries.iter().map(|e| e.vertices.len()).sum();
        let index_count: usize = entries.iter().map(|e| e.indices.len()).sum();
        let old_data = self.records.get(id).and_then(|r| r.data);
        let data = self.update_or_allocate(old_data, vertex_count as u32, index_count as u32);

        let mut text_range = None;
        let mut draws: Vec<CommandKind> = Vec::new();
        if let Some(handle) = data {
            let flip = self.records.get(id).is_some_and(|r| r.is_stencil_clipped);
            if let Some(slices) = self.mesh.slices_mut(handle) {
                let mut v_off = 0usize;
                let mut i_off = 0usize;
                let mut pending: Option<(u32, u32)> = None;
                for entry in &entries {
                    if let EntryKind::Command(kind) = entry.kind {
                        flush_draw(&mut draws, &mut pending, handle);
                        draws.push(kind);
                        continue;
                    }
                    let v_len = entry.vertices.len();
                    let i_len = entry.indices.len();
                    let text_slot = if entry.kind == EntryKind::Text {
                        stamp.text_settings
                    } else {
                        0
                    };
                    write_vertices(
                        &mut slices.vertices[v_off..v_off + v_len],
                        &entry.vertices,
                        &space,
                        stamp,
                        text_slot,
                    );
                    let target = &mut slices.indices[i_off..i_off + i_len];
                    write_indices(target, &entry.indices, slices.index_offset + v_off as u32);
                    if flip && entry.kind != EntryKind::ClipRegister {
                        flip_winding(target);
                    }

                    match entry.kind {
                        EntryKind::ClipRegister => {
                            flush_draw(&mut draws, &mut pending, handle);
                            draws.push(CommandKind::Draw(DrawRange {
                                mesh: Some(handle),
                                first_index: i_off as u32,
                                index_count: i_len as u32,
                                stencil: StencilOp::Register,
                            }));
                        }
                        _ => {
                            if entry.kind == EntryKind::Text {
                                text_range = Some(TextRange {
                                    vertex_start: v_off as u32,
                                    vertex_count: v_len as u32,
                                    index_start: i_off as u32,
                                    index_count: i_len as u32,
                                });
                            }
                            pending = match pending {
                                Some((first, count)) => Some((first, count + i_len as u32)),
                                None => Some((i_off as u32, i_len as u32)),
                            };
                        }
                    }
                    v_off += v_len;
                    i_off += i_len;
                }
                flush_draw(&mut draws, &mut pending, handle);
            }
        } else {
            // Geometry-free entries still produce their commands.
            draws.extend(entries.iter().filter_map(|e| match e.kind {
                EntryKind::Command(kind) => Some(kind),
                _ => None,
            }));
        }

        if let Some(record) = self.records.get_mut(id) {
            record.data = data;
            record.text_range = text_range;
            record.vertices_space = space;
            record.disable_nudging = disable_nudging;
        }

        // Opening run.
        let (mut prev, next) = if neighbours.had_opening {
            let next = if neighbours.consecutive {
                neighbours.closing_next
            } else {
                neighbours.next
            };
            (neighbours.prev, next)
        } else {
            self.find_command_insertion_point(tree, id)
        };
        for kind in draws {
            self.inject_command(id, kind, false, &mut prev, next);
        }

        if closing.clip_unregister.is_none() {
            self.free_closing_data(id);
        }
        if !closing.needs_closing || !self.records.get(id).is_some_and(|r| r.has_commands()) {
            return ClosingInfo::default();
        }

        // Closing run, after every descendant command.
        let (mut prev, next) = if neighbours.had_closing && !neighbours.consecutive {
            (neighbours.closing_prev, neighbours.closing_next)
        } else {
            self.find_closing_insertion_point(tree, id)
        };
        if closing.pop_clip {
            self.inject_command(id, CommandKind::PopClip, true, &mut prev, next);
        }
        if closing.clip_unregister.is_some() {
            let placeholder = CommandKind::Draw(DrawRange {
                mesh: None,
                first_index: 0,
                index_count: 0,
                stencil: StencilOp::Unregister,
            });
            closing.unregister_command =
                Some(self.inject_command(id, placeholder, true, &mut prev, next));
        }
        if closing.pop_view {
            self.inject_command(id, CommandKind::PopView, true, &mut prev, next);
        }
        if closing.pop_render_target {
            self.inject_command(id, CommandKind::BlitToPreviousTarget, true, &mut prev, next);
            self.inject_command(id, CommandKind::PopRenderTarget, true, &mut prev, next);
        }
        closing
    }

    /// Fill the stencil unregister mesh once the subtree is drawn.
    fn close_paint_element(&mut self, id: ElementId, closing: ClosingInfo) {
        let (Some((vertices, mut indices)), Some(command)) =
            (closing.clip_unregister, closing.unregister_command)
        else {
            return;
        };
        let Some(stamp) = self.slot_stamp(id) else {
            return;
        };
        let Some(record) = self.records.get(id) else {
            return;
        };
        let space = record.vertices_space;
        let old = record.closing_data;
        flip_winding(&mut indices);

        let Some(handle) = self.update_or_allocate(old, vertices.len() as u32, indices.len() as u32)
        else {
            return;
        };
        if let Some(slices) = self.mesh.slices_mut(handle) {
            write_vertices(slices.vertices, &vertices, &space, stamp, 0);
            write_indices(slices.indices, &indices, slices.index_offset);
        }
        if let Some(record) = self.records.get_mut(id) {
            record.closing_data = Some(handle);
        }
        if let Some(cmd) = self.commands.get_mut(command) {
            cmd.kind = CommandKind::Draw(DrawRange {
                mesh: Some(handle),
                first_index: 0,
                index_count: indices.len() as u32,
                stencil: StencilOp::Unregister,
            });
        }
    }

    pub(super) fn slot_stamp(&self, id: ElementId) -> Option<SlotStamp> {
        let record = self.records.get(id)?;
        Some(SlotStamp {
            transform: record.transform_id.index,
            clip_rect: record.clip_rect_id.index,
            opacity: record.opacity_id.index,
            text_settings: record.text_settings_id.index,
        })
    }

    /// Reuse `handle` when it is large enough, else reallocate.
    pub(super) fn update_or_allocate(
        &mut self,
        handle: Option<MeshHandle>,
        vertices: u32,
        indices: u32,
    ) -> Option<MeshHandle> {
        if vertices == 0 || indices == 0 {
            if let Some(handle) = handle {
                self.mesh.free(handle);
            }
            return None;
        }
        if let Some(handle) = handle {
            let fits = self
                .mesh
                .capacity(handle)
                .is_some_and(|(v, i)| v >= vertices && i >= indices);
            if fits && self.mesh.update(handle, vertices, indices).is_some() {
                self.stats.updated_mesh_allocations += 1;
                return Some(handle);
            }
            self.mesh.free(handle);
        }
        let handle = self.mesh.allocate(vertices, indices);
        match handle {
            Some(handle) => {
                self.mesh.update(handle, vertices, indices);
                self.stats.new_mesh_allocations += 1;
            }
            None => log::warn!(
                "mesh storage exhausted allocating {} vertices, {} indices",
                vertices,
                indices
            ),
        }
        handle
    }

    fn release_visuals(&mut self, id: ElementId) {
        self.reset_commands(id);
        self.release_text_settings(id);
        self.unlink_text(id);
        self.free_closing_data(id);
        if let Some(record) = self.records.get_mut(id) {
            record.text_range = None;
            if let Some(handle) = record.data.take() {
                self.mesh.free(handle);
            }
        }
    }

    fn free_closing_data(&mut self, id: ElementId) {
        if let Some(record) = self.records.get_mut(id) {
            if let Some(handle) = record.closing_data.take() {
                self.mesh.free(handle);
            }
        }
    }

    fn save_neighbours(&self, id: ElementId) -> Neighbours {
        let Some(record) = self.records.get(id) else {
            return Neighbours::default();
        };
        let mut n = Neighbours::default();
        if let (Some(first), Some(last)) = (record.first_command, record.last_command) {
            n.had_opening = true;
            n.prev = self.commands.prev(first);
            n.next = self.commands.next(last);
        }
        if let (Some(first), Some(last)) = (record.first_closing_command, record.last_closing_command) {
            n.had_closing = true;
            n.closing_prev = self.commands.prev(first);
            n.closing_next = self.commands.next(last);
            n.consecutive = n.had_opening && n.next == Some(first);
        }
        n
    }

    /// Unlink and free both command runs of `id`.
    pub(super) fn reset_commands(&mut self, id: ElementId) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        let opening = record.first_command.zip(record.last_command);
        let closing = record.first_closing_command.zip(record.last_closing_command);
        record.first_command = None;
        record.last_command = None;
        record.first_closing_command = None;
        record.last_closing_command = None;
        if let Some((first, last)) = opening {
            self.commands.remove_run(first, last);
        }
        if let Some((first, last)) = closing {
            self.commands.remove_run(first, last);
        }
    }

    /// Link a new command after `prev` and extend the owner's run.
    fn inject_command(
        &mut self,
        owner: ElementId,
        kind: CommandKind,
        closing: bool,
        prev: &mut Option<CommandId>,
        next: Option<CommandId>,
    ) -> CommandId {
        let id = self.commands.alloc(owner, kind, closing);
        self.commands.link(id, *prev, next);
        *prev = Some(id);
        if let Some(record) = self.records.get_mut(owner) {
            if closing {
                record.first_closing_command.get_or_insert(id);
                record.last_closing_command = Some(id);
            } else {
                record.first_command.get_or_insert(id);
                record.last_command = Some(id);
            }
        }
        id
    }

    /// Where a fresh opening run goes: after the closest element earlier in
    /// the chain that has commands. That is directly after an ancestor's
    /// opening run, or after a whole earlier subtree including the closing
    /// runs of its roots.
    fn find_command_insertion_point(
        &self,
        tree: &ElementTree,
        id: ElementId,
    ) -> (Option<CommandId>, Option<CommandId>) {
        let mut current = self.records.get(id).and_then(|r| r.prev);
        while let Some(candidate) = current {
            let Some(record) = self.records.get(candidate) else {
                break;
            };
            if record.has_commands() {
                let prev = if tree.is_ancestor_of(candidate, id) {
                    record.last_command
                } else {
                    self.subtree_tail(tree, candidate, id)
                };
                return (prev, prev.and_then(|p| self.commands.next(p)));
            }
            current = record.prev;
        }
        (None, self.commands.head())
    }

    /// Last command of the closed subtree containing `from`, climbing until
    /// the next ancestor is also an ancestor of `id`.
    fn subtree_tail(&self, tree: &ElementTree, from: ElementId, id: ElementId) -> Option<CommandId> {
        let mut tail = self
            .records
            .get(from)
            .and_then(|r| r.last_closing_or_last_command());
        let mut current = from;
        while let Some(parent) = tree.parent(current) {
            if tree.is_ancestor_of(parent, id) {
                break;
            }
            current = parent;
            if let Some(closing) = self
                .records
                .get(current)
                .and_then(|r| r.last_closing_command)
            {
                tail = Some(closing);
            }
        }
        tail
    }

    /// Closing commands follow the element's opening run and every
    /// descendant command after it.
    fn find_closing_insertion_point(
        &self,
        tree: &ElementTree,
        id: ElementId,
    ) -> (Option<CommandId>, Option<CommandId>) {
        let mut prev = self.records.get(id).and_then(|r| r.last_command);
        while let Some(next) = prev.and_then(|p| self.commands.next(p)) {
            let owned_by_descendant = self
                .commands
                .get(next)
                .is_some_and(|c| tree.is_ancestor_of(id, c.owner));
            if !owned_by_descendant {
                break;
            }
            prev = Some(next);
        }
        (prev, prev.and_then(|p| self.commands.next(p)))
    }

    /// Rewrite the opacity slot of existing vertices.
    fn restamp_opacity(&mut self, id: ElementId) {
        let Some(record) = self.records.get(id) else {
            return;
        };
        let opacity = record.opacity_id.index;
        for handle in [record.data, record.closing_data].into_iter().flatten() {
            if let Some(slices) = self.mesh.slices_mut(handle) {
                for vertex in slices.vertices.iter_mut() {
                    vertex.opacity_slot = opacity;
                }
            }
        }
    }

    fn update_text_settings(&mut self, id: ElementId, element: &Element) {
        let Some(settings) = element.text.as_ref().map(|t| t.settings) else {
            self.release_text_settings(id);
            return;
        };
        if !settings.needs_slot() {
            self.release_text_settings(id);
            return;
        }
        let Some(current) = self.records.get(id).map(|r| r.text_settings_id) else {
            return;
        };
        let slot = if current.is_owned() {
            current
        } else {
            match self.slots.alloc_text_settings() {
                Some(slot) => SlotRef::owned(slot),
                None => {
                    log::debug!("text settings slots exhausted, {:?} uses plain text", id);
                    SlotRef::DEFAULT
                }
            }
        };
        if slot.is_owned() {
            self.slots.set_text_settings_value(slot.index, settings);
        }
        if let Some(record) = self.records.get_mut(id) {
            record.text_settings_id = slot;
        }
    }

    fn release_text_settings(&mut self, id: ElementId) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        if record.text_settings_id.is_owned() {
            self.slots.free_text_settings(record.text_settings_id.index);
        }
        record.text_settings_id = SlotRef::DEFAULT;
    }
}

fn flush_draw(draws: &mut Vec<CommandKind>, pending: &mut Option<(u32, u32)>, handle: MeshHandle) {
    if let Some((first_index, index_count)) = pending.take() {
        draws.push(CommandKind::Draw(DrawRange {
            mesh: Some(handle),
            first_index,
            index_count,
            stencil: StencilOp::None,
        }));
    }
}

/// Copy `source` into `target`, moving positions into `space` and stamping
/// slot indices.
pub(super) fn write_vertices(
    target: &mut [Vertex],
    source: &[Vertex],
    space: &Transform,
    stamp: SlotStamp,
    text_settings: u32,
) {
    for (out, vertex) in target.iter_mut().zip(source) {
        *out = Vertex {
            position: space.transform_point3(vertex.position),
            transform_slot: stamp.transform,
            clip_rect_slot: stamp.clip_rect,
            opacity_slot: stamp.opacity,
            text_settings_slot: text_settings,
            ..*vertex
        };
    }
}

pub(super) fn write_indices(target: &mut [u32], source: &[u32], base: u32) {
    for (out, index) in target.iter_mut().zip(source) {
        *out = index + base;
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::{CommandKind, RenderChain, StencilOp};
    use crate::element::{CornerRadii, Display, Element, RenderHints};
    use crate::geometry::Color;
    use crate::gpu::MeshService;
    use crate::tree::{ElementId, ElementTree};

    fn kinds(chain: &RenderChain) -> Vec<(ElementId, CommandKind)> {
        chain
            .commands()
            .iter()
            .map(|(_, c)| (c.owner, c.kind))
            .collect()
    }

    fn is_draw(kind: &CommandKind) -> bool {
        matches!(kind, CommandKind::Draw(_))
    }

    fn box_at(x: f32) -> Element {
        Element::new()
            .with_rect(x, 0.0, 10.0, 10.0)
            .with_background(Color::WHITE)
    }

    #[test]
    fn test_commands_follow_tree_order() {
        let mut tree = ElementTree::new();
        let root = tree.create(box_at(0.0));
        let a = tree.create(box_at(1.0));
        let b = tree.create(box_at(2.0));
        tree.insert_child(root, a, None).unwrap();
        tree.insert_child(root, b, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        let owners: Vec<_> = kinds(&chain).into_iter().map(|(o, _)| o).collect();
        assert_eq!(owners, vec![root, a, b]);

        // A single repaint keeps the position.
        chain.on_visuals_changed(a, false).unwrap();
        chain.process_changes(&tree).unwrap();
        let owners: Vec<_> = kinds(&chain).into_iter().map(|(o, _)| o).collect();
        assert_eq!(owners, vec![root, a, b]);
    }

    #[test]
    fn test_new_sibling_lands_after_closed_subtree() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let clip = tree.create(box_at(0.0).with_hints(RenderHints::CLIP_WITH_SCISSORS).with_overflow_hidden());
        let inner = tree.create(box_at(1.0));
        tree.insert_child(root, clip, None).unwrap();
        tree.insert_child(clip, inner, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        let late = tree.create(box_at(2.0));
        tree.insert_child(root, late, None).unwrap();
        chain.on_child_added(&tree, Some(root), late, 1).unwrap();
        chain.process_changes(&tree).unwrap();

        let list = kinds(&chain);
        assert_eq!(list.len(), 5);
        assert_eq!(list[0].0, clip);
        assert!(is_draw(&list[0].1));
        assert_eq!(list[1], (clip, CommandKind::PushClip));
        assert_eq!(list[2].0, inner);
        assert_eq!(list[3], (clip, CommandKind::PopClip));
        assert_eq!(list[4].0, late);
    }

    #[test]
    fn test_stencil_brackets_descendants() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let mask = tree.create(
            box_at(0.0)
                .with_overflow_hidden()
                .with_radii(CornerRadii::uniform(3.0)),
        );
        let inner = tree.create(box_at(1.0));
        tree.insert_child(root, mask, None).unwrap();
        tree.insert_child(mask, inner, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        let list = kinds(&chain);
        let stencils: Vec<_> = list
            .iter()
            .filter_map(|(owner, kind)| match kind {
                CommandKind::Draw(range) if range.stencil != StencilOp::None => {
                    Some((*owner, range.stencil, range.mesh.is_some()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            stencils,
            vec![(mask, StencilOp::Register, true), (mask, StencilOp::Unregister, true)]
        );
        let inner_pos = list.iter().position(|(o, _)| *o == inner).unwrap();
        assert!(inner_pos > 1 && inner_pos < list.len() - 1);

        // The unregister mesh is a copy of the register mesh, which has the
        // same shape as the rounded background.
        let mask_rec = chain.record(mask).unwrap();
        let closing = chain.mesh_service().indices(mask_rec.closing_mesh().unwrap());
        let opening = chain.mesh_service().indices(mask_rec.mesh().unwrap());
        assert_eq!(closing.len() * 2, opening.len());
    }

    #[test]
    fn test_display_none_frees_subtree_and_comes_back() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let panel = tree.create(box_at(0.0));
        let leaf = tree.create(box_at(1.0));
        tree.insert_child(root, panel, None).unwrap();
        tree.insert_child(panel, leaf, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();
        assert_eq!(chain.commands().len(), 2);

        tree.get_mut(panel).unwrap().style.display = Display::None;
        chain.on_visuals_changed(panel, true).unwrap();
        chain.process_changes(&tree).unwrap();
        assert!(chain.commands().is_empty());
        assert!(chain.record(leaf).unwrap().mesh().is_none());
        assert!(chain.record(leaf).unwrap().is_hierarchy_hidden());

        tree.get_mut(panel).unwrap().style.display = Display::Flex;
        chain.on_visuals_changed(panel, true).unwrap();
        chain.process_changes(&tree).unwrap();
        let owners: Vec<_> = kinds(&chain).into_iter().map(|(o, _)| o).collect();
        assert_eq!(owners, vec![panel, leaf]);
    }

    #[test]
    fn test_vertices_are_stamped_with_slots() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let faded = tree.create(box_at(0.0).with_opacity(0.5));
        tree.insert_child(root, faded, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();

        let rec = chain.record(faded).unwrap();
        let vertices = chain.mesh_service().vertices(rec.mesh().unwrap());
        assert!(vertices
            .iter()
            .all(|v| v.opacity_slot == rec.opacity_id().index && v.opacity_slot != 0));
    }

    #[test]
    fn test_oversized_paint_draws_nothing() {
        let mut tree = ElementTree::new();
        let root = tree.create(box_at(0.0));
        let mut chain: RenderChain =
            RenderChain::new(crate::config::ChainConfig::default().max_vertices_per_mesh(3));
        chain.on_child_added(&tree, None, root, 0).unwrap();
        chain.process_changes(&tree).unwrap();
        assert!(chain.commands().is_empty());
        assert!(chain.record(root).unwrap().mesh().is_none());
    }
}
