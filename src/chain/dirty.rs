//! Depth-ordered dirty tracking.
//!
//! Every change class keeps one intrusive doubly linked list per hierarchy
//! depth, plus the `[min, max]` depth range that currently holds entries.
//! Phases drain a class by sweeping depths in increasing order, so parents
//! are always processed before their children.

use bitflags::bitflags;

use crate::tree::ElementId;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u16 {
        const TRANSFORM          = 1 << 0;
        const CLIP_RECT_SIZE     = 1 << 1;
        const CLIPPING           = 1 << 2;
        const CLIPPING_HIERARCHY = 1 << 3;
        const VISUALS            = 1 << 4;
        const VISUALS_HIERARCHY  = 1 << 5;
        const VISUALS_OPACITY_ID = 1 << 6;
        const OPACITY            = 1 << 7;
        const OPACITY_HIERARCHY  = 1 << 8;
    }
}

impl DirtyFlags {
    pub const ALL_CLIPPING: Self = Self::CLIPPING.union(Self::CLIPPING_HIERARCHY);
    pub const ALL_OPACITY: Self = Self::OPACITY.union(Self::OPACITY_HIERARCHY);
    pub const ALL_TRANSFORM_SIZE: Self = Self::TRANSFORM.union(Self::CLIP_RECT_SIZE);
    pub const ALL_VISUALS: Self = Self::VISUALS
        .union(Self::VISUALS_HIERARCHY)
        .union(Self::VISUALS_OPACITY_ID);
}

/// The four change classes, in processing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirtyClass {
    Clipping,
    Opacity,
    TransformSize,
    Visuals,
}

const CLASS_COUNT: usize = 4;

impl DirtyClass {
    pub const ALL: [DirtyClass; CLASS_COUNT] = [
        DirtyClass::Clipping,
        DirtyClass::Opacity,
        DirtyClass::TransformSize,
        DirtyClass::Visuals,
    ];

    pub fn mask(self) -> DirtyFlags {
        match self {
            DirtyClass::Clipping => DirtyFlags::ALL_CLIPPING,
            DirtyClass::Opacity => DirtyFlags::ALL_OPACITY,
            DirtyClass::TransformSize => DirtyFlags::ALL_TRANSFORM_SIZE,
            DirtyClass::Visuals => DirtyFlags::ALL_VISUALS,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Default)]
struct Link {
    linked: bool,
    prev: Option<ElementId>,
    next: Option<ElementId>,
}

struct Entry {
    id: ElementId,
    depth: usize,
    flags: DirtyFlags,
    links: [Link; CLASS_COUNT],
}

#[derive(Default)]
struct ClassLists {
    heads: Vec<Option<ElementId>>,
    tails: Vec<Option<ElementId>>,
    min_depth: usize,
    max_depth: usize,
}

impl ClassLists {
    fn new() -> Self {
        Self {
            heads: Vec::new(),
            tails: Vec::new(),
            min_depth: usize::MAX,
            max_depth: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.min_depth > self.max_depth
    }

    fn reset_bounds(&mut self) {
        self.min_depth = usize::MAX;
        self.max_depth = 0;
    }
}

pub struct DirtyTracker {
    entries: Vec<Option<Entry>>,
    classes: [ClassLists; CLASS_COUNT],
    dirty_id: u32,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            classes: [
                ClassLists::new(),
                ClassLists::new(),
                ClassLists::new(),
                ClassLists::new(),
            ],
            dirty_id: 0,
        }
    }

    fn entry(&self, id: ElementId) -> Option<&Entry> {
        self.entries
            .get(id.slot())
            .and_then(|e| e.as_ref())
            .filter(|e| e.id == id)
    }

    fn entry_mut(&mut self, id: ElementId) -> Option<&mut Entry> {
        self.entries
            .get_mut(id.slot())
            .and_then(|e| e.as_mut())
            .filter(|e| e.id == id)
    }

    /// Add `flags` to the element and make sure it sits in `class`'s list
    /// at `depth`. Registering twice only ORs the flags.
    pub fn register_dirty(
        &mut self,
        id: ElementId,
        depth: usize,
        flags: DirtyFlags,
        class: DirtyClass,
    ) {
        debug_assert!(!flags.is_empty());
        let ci = class.index();

        if self.entries.len() <= id.slot() {
            self.entries.resize_with(id.slot() + 1, || None);
        }
        let stale = self.entries[id.slot()]
            .as_ref()
            .is_some_and(|e| e.id != id);
        if stale {
            self.remove_entry_at(id.slot());
        }
        let entry = self.entries[id.slot()].get_or_insert_with(|| Entry {
            id,
            depth,
            flags: DirtyFlags::empty(),
            links: [Link::default(); CLASS_COUNT],
        });
        entry.flags |= flags;
        let depth = entry.depth;
        if entry.links[ci].linked {
            return;
        }

        let lists = &mut self.classes[ci];
        if lists.heads.len() <= depth {
            lists.heads.resize(depth + 1, None);
            lists.tails.resize(depth + 1, None);
        }
        lists.min_depth = lists.min_depth.min(depth);
        lists.max_depth = lists.max_depth.max(depth);

        let tail = lists.tails[depth];
        lists.tails[depth] = Some(id);
        if tail.is_none() {
            lists.heads[depth] = Some(id);
        }
        if let Some(tail) = tail {
            if let Some(t) = self.entry_mut(tail) {
                t.links[ci].next = Some(id);
            }
        }
        if let Some(entry) = self.entry_mut(id) {
            entry.links[ci] = Link {
                linked: true,
                prev: tail,
                next: None,
            };
        }
    }

    /// Keep only `keep` of the element's flags and drop it from every class
    /// list that has no remaining flags.
    pub fn clear_dirty(&mut self, id: ElementId, keep: DirtyFlags) {
        let Some(entry) = self.entry_mut(id) else {
            return;
        };
        entry.flags &= keep;
        let flags = entry.flags;
        for class in DirtyClass::ALL {
            if !flags.intersects(class.mask()) {
                self.unlink(id, class);
            }
        }
        if flags.is_empty() {
            self.entries[id.slot()] = None;
        }
    }

    fn remove_entry_at(&mut self, slot: usize) {
        let Some(id) = self.entries[slot].as_ref().map(|e| e.id) else {
            return;
        };
        self.clear_dirty(id, DirtyFlags::empty());
    }

    fn unlink(&mut self, id: ElementId, class: DirtyClass) {
        let ci = class.index();
        let Some(entry) = self.entry_mut(id) else {
            return;
        };
        let link = entry.links[ci];
        if !link.linked {
            return;
        }
        let depth = entry.depth;
        entry.links[ci] = Link::default();

        match link.prev {
            Some(prev) => {
                if let Some(p) = self.entry_mut(prev) {
                    p.links[ci].next = link.next;
                }
            }
            None => self.classes[ci].heads[depth] = link.next,
        }
        match link.next {
            Some(next) => {
                if let Some(n) = self.entry_mut(next) {
                    n.links[ci].prev = link.prev;
                }
            }
            None => self.classes[ci].tails[depth] = link.prev,
        }
    }

    pub fn flags(&self, id: ElementId) -> DirtyFlags {
        self.entry(id).map(|e| e.flags).unwrap_or_default()
    }

    pub fn first(&self, class: DirtyClass, depth: usize) -> Option<ElementId> {
        self.classes[class.index()]
            .heads
            .get(depth)
            .copied()
            .flatten()
    }

    pub fn next(&self, class: DirtyClass, id: ElementId) -> Option<ElementId> {
        self.entry(id).and_then(|e| e.links[class.index()].next)
    }

    pub fn is_in_list(&self, class: DirtyClass, id: ElementId) -> bool {
        self.entry(id)
            .is_some_and(|e| e.links[class.index()].linked)
    }

    pub fn min_depth(&self, class: DirtyClass) -> Option<usize> {
        let lists = &self.classes[class.index()];
        (!lists.is_empty()).then_some(lists.min_depth)
    }

    pub fn max_depth(&self, class: DirtyClass) -> Option<usize> {
        let lists = &self.classes[class.index()];
        (!lists.is_empty()).then_some(lists.max_depth)
    }

    /// Whether every class has an empty depth range.
    pub fn is_clean(&self) -> bool {
        self.classes.iter().all(|c| c.is_empty())
    }

    /// Empty all depth ranges. Entries still linked at this point were
    /// registered behind a sweep and are dropped.
    pub fn reset(&mut self) {
        let leftover = self.entries.iter().filter(|e| e.is_some()).count();
        if leftover > 0 {
            log::debug!("dropping {} dirty entries left after the frame", leftover);
            self.entries.clear();
        }
        for lists in &mut self.classes {
            lists.heads.fill(None);
            lists.tails.fill(None);
            lists.reset_bounds();
        }
    }

    /// Advance the pass stamp; never returns 0, the "never visited" value.
    pub fn begin_pass(&mut self) -> u32 {
        self.dirty_id = self.dirty_id.wrapping_add(1);
        if self.dirty_id == 0 {
            self.dirty_id = 1;
        }
        self.dirty_id
    }

    pub fn dirty_id(&self) -> u32 {
        self.dirty_id
    }
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::tree::ElementTree;

    fn ids(count: usize) -> Vec<ElementId> {
        let mut tree = ElementTree::new();
        (0..count).map(|_| tree.create(Element::new())).collect()
    }

    fn list(tracker: &DirtyTracker, class: DirtyClass, depth: usize) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut cur = tracker.first(class, depth);
        while let Some(id) = cur {
            out.push(id);
            cur = tracker.next(class, id);
        }
        out
    }

    #[test]
    fn test_register_is_idempotent() {
        let ids = ids(2);
        let mut tracker = DirtyTracker::new();
        tracker.register_dirty(ids[0], 1, DirtyFlags::VISUALS, DirtyClass::Visuals);
        tracker.register_dirty(ids[1], 1, DirtyFlags::VISUALS, DirtyClass::Visuals);
        tracker.register_dirty(
            ids[0],
            1,
            DirtyFlags::VISUALS_HIERARCHY,
            DirtyClass::Visuals,
        );

        assert_eq!(list(&tracker, DirtyClass::Visuals, 1), vec![ids[0], ids[1]]);
        assert_eq!(
            tracker.flags(ids[0]),
            DirtyFlags::VISUALS | DirtyFlags::VISUALS_HIERARCHY
        );
    }

    #[test]
    fn test_bounds_widen_per_class() {
        let ids = ids(3);
        let mut tracker = DirtyTracker::new();
        tracker.register_dirty(ids[0], 3, DirtyFlags::OPACITY, DirtyClass::Opacity);
        tracker.register_dirty(ids[1], 1, DirtyFlags::OPACITY, DirtyClass::Opacity);
        tracker.register_dirty(ids[2], 7, DirtyFlags::CLIPPING, DirtyClass::Clipping);

        assert_eq!(tracker.min_depth(DirtyClass::Opacity), Some(1));
        assert_eq!(tracker.max_depth(DirtyClass::Opacity), Some(3));
        assert_eq!(tracker.min_depth(DirtyClass::Clipping), Some(7));
        assert_eq!(tracker.max_depth(DirtyClass::Visuals), None);
    }

    #[test]
    fn test_one_element_in_several_classes() {
        let ids = ids(1);
        let mut tracker = DirtyTracker::new();
        tracker.register_dirty(ids[0], 2, DirtyFlags::CLIPPING, DirtyClass::Clipping);
        tracker.register_dirty(ids[0], 2, DirtyFlags::VISUALS, DirtyClass::Visuals);

        // Processing the clipping class keeps the visual membership.
        tracker.clear_dirty(ids[0], !DirtyClass::Clipping.mask());
        assert!(!tracker.is_in_list(DirtyClass::Clipping, ids[0]));
        assert!(tracker.is_in_list(DirtyClass::Visuals, ids[0]));
        assert_eq!(list(&tracker, DirtyClass::Visuals, 2), vec![ids[0]]);
        assert!(list(&tracker, DirtyClass::Clipping, 2).is_empty());
    }

    #[test]
    fn test_clear_mends_neighbours() {
        let ids = ids(3);
        let mut tracker = DirtyTracker::new();
        for &id in &ids {
            tracker.register_dirty(id, 0, DirtyFlags::TRANSFORM, DirtyClass::TransformSize);
        }
        tracker.clear_dirty(ids[1], DirtyFlags::empty());
        assert_eq!(
            list(&tracker, DirtyClass::TransformSize, 0),
            vec![ids[0], ids[2]]
        );
        tracker.clear_dirty(ids[0], DirtyFlags::empty());
        tracker.clear_dirty(ids[2], DirtyFlags::empty());
        assert!(list(&tracker, DirtyClass::TransformSize, 0).is_empty());

        // Re-registration after draining appends to a fresh list.
        tracker.register_dirty(ids[2], 0, DirtyFlags::TRANSFORM, DirtyClass::TransformSize);
        assert_eq!(list(&tracker, DirtyClass::TransformSize, 0), vec![ids[2]]);
    }

    #[test]
    fn test_reset_empties_bounds() {
        let ids = ids(1);
        let mut tracker = DirtyTracker::new();
        tracker.register_dirty(ids[0], 4, DirtyFlags::VISUALS, DirtyClass::Visuals);
        tracker.clear_dirty(ids[0], DirtyFlags::empty());
        assert!(!tracker.is_clean());
        tracker.reset();
        assert!(tracker.is_clean());
    }

    #[test]
    fn test_reset_drops_leftovers() {
        let ids = ids(1);
        let mut tracker = DirtyTracker::new();
        tracker.register_dirty(ids[0], 2, DirtyFlags::OPACITY, DirtyClass::Opacity);
        tracker.reset();
        assert!(tracker.flags(ids[0]).is_empty());

        // A later registration is tracked again.
        tracker.register_dirty(ids[0], 2, DirtyFlags::OPACITY, DirtyClass::Opacity);
        assert_eq!(tracker.min_depth(DirtyClass::Opacity), Some(2));
        assert_eq!(list(&tracker, DirtyClass::Opacity, 2), vec![ids[0]]);
    }

    #[test]
    fn test_pass_stamp_skips_zero() {
        let mut tracker = DirtyTracker::new();
        tracker.dirty_id = u32::MAX;
        assert_eq!(tracker.begin_pass(), 1);
    }
}
