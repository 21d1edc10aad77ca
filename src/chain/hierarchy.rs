//! Attaching and detaching subtrees: record lifecycle and the flattened
//! pre-order chain.

use crate::gpu::{MeshService, SlotAllocator};
use crate::tree::{ElementId, ElementTree};

use super::dirty::DirtyFlags;
use super::record::{RenderRecord, SlotRef};
use super::RenderChain;

impl<M: MeshService, S: SlotAllocator> RenderChain<M, S> {
    /// Create records for `id` and its descendants and splice them into the
    /// flattened chain. Returns the number of records created.
    pub(super) fn attach_subtree(
        &mut self,
        tree: &ElementTree,
        parent: Option<ElementId>,
        id: ElementId,
        index: usize,
    ) -> u32 {
        if self.records.is_in_chain(id) {
            return 0;
        }
        let Some(element) = tree.get(id) else {
            return 0;
        };

        let mut record = RenderRecord::new(id);
        record.is_in_chain = true;

        let parent_record = parent.and_then(|p| self.records.get(p));
        if let (Some(parent), Some(parent_record)) = (parent, parent_record) {
            let parent_is_group = tree.get(parent).is_some_and(|e| e.is_group_transform());
            record.hierarchy_depth = parent_record.hierarchy_depth + 1;
            record.group_transform_ancestor = if parent_is_group {
                Some(parent)
            } else {
                parent_record.group_transform_ancestor
            };
            // A group restarts the transform frame for its subtree.
            record.bone_transform_ancestor = if parent_record.transform_id.is_owned() {
                Some(parent)
            } else if parent_is_group {
                None
            } else {
                parent_record.bone_transform_ancestor
            };
            if !element.is_group_transform() && !parent_is_group {
                record.transform_id = parent_record.transform_id.inherited();
            }
        }

        if element.wants_bone_slot() {
            match self.slots.alloc_transform() {
                Some(slot) => record.transform_id = SlotRef::owned(slot),
                None => log::debug!("transform slots exhausted, {:?} follows its parent", id),
            }
        }

        let prev = self.chain_predecessor(tree, parent, id, index);
        let next = prev.and_then(|p| self.records.get(p)).and_then(|r| r.next);
        record.prev = prev;
        record.next = next;
        if let Some(p) = prev.and_then(|p| self.records.get_mut(p)) {
            p.next = Some(id);
        }
        if let Some(n) = next.and_then(|n| self.records.get_mut(n)) {
            n.prev = Some(id);
        }

        let owned_transform = record.transform_id;
        let frame = record.group_transform_ancestor;
        self.records.insert(record);
        if owned_transform.is_owned() {
            self.slots
                .set_transform_value(owned_transform.index, tree.transform_in_frame(id, frame));
        }

        let mut count = 1;
        for (child_index, &child) in tree.children(id).iter().enumerate() {
            count += self.attach_subtree(tree, Some(id), child, child_index);
        }
        count
    }

    /// Release `id` and its descendants, children first. Returns the number
    /// of records dropped.
    pub(super) fn detach_subtree(&mut self, tree: &ElementTree, id: ElementId) -> u32 {
        if !self.records.is_in_chain(id) {
            return 0;
        }
        let mut count = 0;
        for &child in tree.children(id).iter().rev() {
            count += self.detach_subtree(tree, child);
        }

        self.tracker.clear_dirty(id, DirtyFlags::empty());
        self.reset_commands(id);
        self.unlink_text(id);

        let Some(mut record) = self.records.remove(id) else {
            return count;
        };
        if let Some(p) = record.prev.and_then(|p| self.records.get_mut(p)) {
            p.next = record.next;
        }
        if let Some(n) = record.next.and_then(|n| self.records.get_mut(n)) {
            n.prev = record.prev;
        }

        if record.transform_id.is_owned() {
            self.slots.free_transform(record.transform_id.index);
        }
        if record.clip_rect_id.is_owned() {
            self.slots.free_clip_rect(record.clip_rect_id.index);
        }
        if record.opacity_id.is_owned() {
            self.slots.free_opacity(record.opacity_id.index);
        }
        if record.text_settings_id.is_owned() {
            self.slots.free_text_settings(record.text_settings_id.index);
        }
        if let Some(handle) = record.data.take() {
            self.mesh.free(handle);
        }
        if let Some(handle) = record.closing_data.take() {
            self.mesh.free(handle);
        }
        count + 1
    }

    /// The element `id` follows in the flattened chain: the last deepest
    /// rendered descendant of the closest earlier rendered sibling, or the
    /// parent itself.
    fn chain_predecessor(
        &self,
        tree: &ElementTree,
        parent: Option<ElementId>,
        id: ElementId,
        index: usize,
    ) -> Option<ElementId> {
        let parent = parent?;
        let siblings = tree.children(parent);
        let index = tree.index_in_parent(id).unwrap_or(index).min(siblings.len());
        siblings[..index]
            .iter()
            .rev()
            .find(|&&s| s != id && self.records.is_in_chain(s))
            .map(|&s| self.last_deepest_in_chain(tree, s))
            .or(Some(parent))
    }

    fn last_deepest_in_chain(&self, tree: &ElementTree, id: ElementId) -> ElementId {
        let mut current = id;
        while let Some(&child) = tree
            .children(current)
            .iter()
            .rev()
            .find(|&&c| self.records.is_in_chain(c))
        {
            current = child;
        }
        current
    }
}
