//! Arena-based element storage.
//!
//! The tree uses a sparse-set layout with generational indices:
//!
//! - **Generational Indices**: `ElementId` carries index + generation so a stale
//!   id never resolves to an element that reused its slot.
//! - **Dense Storage**: nodes are stored contiguously; removal is a swap-remove.
//! - **Sparse Map**: O(1) lookup from `ElementId` to the dense position.
//!
//! Besides parent/child bookkeeping the tree answers the geometric queries the
//! render chain needs: world transforms, transforms relative to an ancestor
//! frame, and clip rectangles.

use crate::element::Element;
use crate::error::{ChainError, Result};
use crate::geometry::Rect;
use crate::transform::Transform;

/// Unique identifier for an element in the tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ElementId {
    index: u32,
    generation: u32,
}

impl ElementId {
    fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Position in the sparse array. Stable while the element lives, and
    /// used by side tables keyed by element.
    pub fn slot(self) -> usize {
        self.index as usize
    }

    /// Combines generation (high bits) with index (low bits).
    pub fn as_u64(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }
}

struct SparseEntry {
    dense_index: usize,
    generation: u32,
}

struct Node {
    element: Element,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    /// Back-pointer to sparse array index (for swap-remove fixup)
    sparse_index: u32,
}

/// Central storage for all elements of a panel.
pub struct ElementTree {
    dense: Vec<Node>,
    sparse: Vec<Option<SparseEntry>>,
    /// Last generation handed out per sparse slot.
    generations: Vec<u32>,
    free_indices: Vec<u32>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self {
            dense: Vec::new(),
            sparse: Vec::new(),
            generations: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    /// Store an element and return its id. The element starts detached.
    pub fn create(&mut self, element: Element) -> ElementId {
        let (sparse_index, generation) = match self.free_indices.pop() {
            Some(idx) => {
                let generation = self.generations[idx as usize].wrapping_add(1);
                self.generations[idx as usize] = generation;
                (idx, generation)
            }
            None => {
                let idx = self.sparse.len() as u32;
                self.sparse.push(None);
                self.generations.push(0);
                (idx, 0)
            }
        };

        let dense_index = self.dense.len();
        self.dense.push(Node {
            element,
            parent: None,
            children: Vec::new(),
            sparse_index,
        });
        self.sparse[sparse_index as usize] = Some(SparseEntry {
            dense_index,
            generation,
        });

        ElementId::new(sparse_index, generation)
    }

    /// Remove an element and its whole subtree.
    pub fn destroy(&mut self, id: ElementId) -> Result<()> {
        if !self.contains(id) {
            return Err(ChainError::UnknownElement(id));
        }
        self.detach(id)?;

        let doomed = self.subtree(id);
        for victim in doomed.into_iter().rev() {
            self.remove_node(victim);
        }
        Ok(())
    }

    fn remove_node(&mut self, id: ElementId) {
        let Some(dense_index) = self.dense_index(id) else {
            return;
        };
        let last_dense_index = self.dense.len() - 1;
        self.dense.swap_remove(dense_index);

        if dense_index != last_dense_index {
            let moved_sparse_idx = self.dense[dense_index].sparse_index;
            if let Some(entry) = self.sparse[moved_sparse_idx as usize].as_mut() {
                entry.dense_index = dense_index;
            }
        }

        self.sparse[id.index as usize] = None;
        self.free_indices.push(id.index);
    }

    fn dense_index(&self, id: ElementId) -> Option<usize> {
        self.sparse
            .get(id.index as usize)
            .and_then(|e| e.as_ref())
            .filter(|e| e.generation == id.generation)
            .map(|e| e.dense_index)
    }

    fn node(&self, id: ElementId) -> Option<&Node> {
        self.dense_index(id).map(|idx| &self.dense[idx])
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.dense_index(id).is_some()
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.node(id).map(|n| &n.element)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.dense_index(id).map(|idx| &mut self.dense[idx].element)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn index_in_parent(&self, id: ElementId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Insert `child` under `parent` at `index` (or last when `None`).
    /// The child is detached from its previous parent first.
    pub fn insert_child(
        &mut self,
        parent: ElementId,
        child: ElementId,
        index: Option<usize>,
    ) -> Result<usize> {
        if !self.contains(parent) {
            return Err(ChainError::UnknownElement(parent));
        }
        if !self.contains(child) {
            return Err(ChainError::UnknownElement(child));
        }
        if parent == child || self.is_ancestor_of(child, parent) {
            return Err(ChainError::InvalidChildIndex {
                parent,
                index: index.unwrap_or(usize::MAX),
            });
        }
        let mut len = self.children(parent).len();
        if self.parent(child) == Some(parent) {
            len -= 1;
        }
        let index = index.unwrap_or(len);
        if index > len {
            return Err(ChainError::InvalidChildIndex { parent, index });
        }
        self.detach(child)?;

        let parent_dense = self
            .dense_index(parent)
            .ok_or(ChainError::UnknownElement(parent))?;
        self.dense[parent_dense].children.insert(index, child);

        if let Some(child_dense) = self.dense_index(child) {
            self.dense[child_dense].parent = Some(parent);
        }
        Ok(index)
    }

    /// Detach an element from its parent. Detached elements keep their subtree.
    pub fn detach(&mut self, id: ElementId) -> Result<()> {
        let child_dense = self.dense_index(id).ok_or(ChainError::UnknownElement(id))?;
        if let Some(parent) = self.dense[child_dense].parent.take() {
            if let Some(parent_dense) = self.dense_index(parent) {
                self.dense[parent_dense].children.retain(|&c| c != id);
            }
        }
        Ok(())
    }

    /// Replace the child order of `parent`; `order` must be a permutation of
    /// the current children.
    pub fn reorder_children(&mut self, parent: ElementId, order: &[ElementId]) -> Result<()> {
        let parent_dense = self
            .dense_index(parent)
            .ok_or(ChainError::UnknownElement(parent))?;
        let children = &self.dense[parent_dense].children;
        if order.len() != children.len() {
            return Err(ChainError::InvalidChildIndex {
                parent,
                index: order.len(),
            });
        }
        if let Some(&stray) = order.iter().find(|c| !children.contains(c)) {
            return Err(ChainError::UnknownElement(stray));
        }
        self.dense[parent_dense].children = order.to_vec();
        Ok(())
    }

    /// Whether `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor_of(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    pub fn depth(&self, id: ElementId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(p) = current {
            depth += 1;
            current = self.parent(p);
        }
        depth
    }

    /// Pre-order list of `id` and all of its descendants.
    pub fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Position offset followed by the element's own transform.
    pub fn local_transform(&self, id: ElementId) -> Transform {
        match self.get(id) {
            Some(element) => {
                Transform::translate(element.rect.x, element.rect.y).then(&element.transform)
            }
            None => Transform::IDENTITY,
        }
    }

    pub fn world_transform(&self, id: ElementId) -> Transform {
        self.transform_in_frame(id, None)
    }

    /// Transform from `id`'s local space into the local space of `frame`
    /// (an ancestor), or into world space when `frame` is `None`.
    pub fn transform_in_frame(&self, id: ElementId, frame: Option<ElementId>) -> Transform {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            if Some(c) == frame {
                break;
            }
            chain.push(c);
            current = self.parent(c);
        }
        chain
            .iter()
            .rev()
            .fold(Transform::IDENTITY, |acc, &c| acc.then(&self.local_transform(c)))
    }

    /// Bounds of the element in `frame` space.
    pub fn bounds_in_frame(&self, id: ElementId, frame: Option<ElementId>) -> Rect {
        let size = self.get(id).map(|e| e.rect.local()).unwrap_or_default();
        self.transform_in_frame(id, frame).transform_rect_bounds(&size)
    }

    /// Intersection of every clipping element's bounds from `id` up to, but
    /// excluding, `frame`.
    pub fn clip_rect_in_frame(&self, id: ElementId, frame: Option<ElementId>) -> Rect {
        let mut clip = Rect::UNBOUNDED;
        let mut current = Some(id);
        while let Some(c) = current {
            if Some(c) == frame {
                break;
            }
            if self.get(c).is_some_and(|e| e.should_clip()) {
                clip = clip.intersect(&self.bounds_in_frame(c, frame));
            }
            current = self.parent(c);
        }
        clip
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}
