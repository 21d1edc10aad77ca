//! The incremental render chain.
//!
//! A [`RenderChain`] keeps one [`RenderRecord`] per attached element and a
//! single linked [`CommandList`] in tree order. Tree mutations only mark
//! elements dirty; [`RenderChain::process_changes`] then drains the dirty
//! tracker in four phases:
//!
//! 1. **Clipping**: pick a clip method, own or inherit a clip-rect slot.
//! 2. **Opacity**: composite opacity, own or inherit an opacity slot.
//! 3. **Transform/size**: upload slot values, nudge vertices in place or
//!    schedule a repaint.
//! 4. **Visuals**: repaint elements and splice their commands.
//!
//! Each phase sweeps depths in increasing order and may only enqueue work
//! for later phases, so one call always converges.

mod clipping;
pub mod commands;
pub mod dirty;
mod hierarchy;
mod opacity;
pub(crate) mod painter;
pub mod record;
mod text;
mod transform_size;
mod visuals;

pub use commands::{Command, CommandId, CommandIter, CommandKind, CommandList, DrawRange, StencilOp};
pub use dirty::{DirtyClass, DirtyFlags, DirtyTracker};
pub use painter::MeshGenerationContext;
pub use record::{ClipMethod, Ownership, RenderRecord, SlotRef};

use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::glyphs::{MonospaceText, TextGenerator};
use crate::gpu::{MeshPool, MeshService, SlotAllocator, SlotTable};
use crate::render_stats::{ChainStats, FrameReport};
use crate::tree::{ElementId, ElementTree};

use painter::Painter;
use record::RecordTable;
use text::TextSlicer;

/// Composite opacity below this is treated as invisible.
pub const VISIBILITY_THRESHOLD: f32 = f32::EPSILON;

/// Smallest opacity difference considered a change.
pub(crate) const OPACITY_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainMode {
    Idle,
    /// The visuals phase is running; mutations are refused.
    Painting,
}

pub struct RenderChain<M: MeshService = MeshPool, S: SlotAllocator = SlotTable> {
    config: ChainConfig,
    mode: ChainMode,
    records: RecordTable,
    tracker: DirtyTracker,
    commands: CommandList,
    mesh: M,
    slots: S,
    painter: Painter,
    text: TextSlicer,
    stats: ChainStats,
    changed_groups: Vec<ElementId>,
}

impl RenderChain<MeshPool, SlotTable> {
    pub fn new(config: ChainConfig) -> Self {
        let mesh = MeshPool::with_capacity(config.mesh_vertex_capacity, config.mesh_index_capacity);
        let slots = SlotTable::new(config.slots);
        Self::with_services(config, mesh, slots, Box::new(MonospaceText::new()))
    }
}

impl Default for RenderChain<MeshPool, SlotTable> {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl<M: MeshService, S: SlotAllocator> RenderChain<M, S> {
    pub fn with_services(
        config: ChainConfig,
        mesh: M,
        slots: S,
        text: Box<dyn TextGenerator>,
    ) -> Self {
        Self {
            config,
            mode: ChainMode::Idle,
            records: RecordTable::default(),
            tracker: DirtyTracker::new(),
            commands: CommandList::new(),
            mesh,
            slots,
            painter: Painter::new(text),
            text: TextSlicer::default(),
            stats: ChainStats::default(),
            changed_groups: Vec::new(),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn mode(&self) -> ChainMode {
        self.mode
    }

    pub fn record(&self, id: ElementId) -> Option<&RenderRecord> {
        self.records.get(id)
    }

    pub fn is_in_chain(&self, id: ElementId) -> bool {
        self.records.is_in_chain(id)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Head of the command list, for the backend.
    pub fn first_command(&self) -> Option<CommandId> {
        self.commands.head()
    }

    pub fn commands(&self) -> &CommandList {
        &self.commands
    }

    pub fn mesh_service(&self) -> &M {
        &self.mesh
    }

    pub fn slot_allocator(&self) -> &S {
        &self.slots
    }

    pub fn dirty_flags(&self, id: ElementId) -> DirtyFlags {
        self.tracker.flags(id)
    }

    /// Whether no element is waiting to be processed.
    pub fn is_clean(&self) -> bool {
        DirtyClass::ALL
            .iter()
            .all(|&class| self.tracker.min_depth(class).is_none())
    }

    fn ensure_idle(&self, operation: &'static str) -> Result<()> {
        match self.mode {
            ChainMode::Idle => Ok(()),
            ChainMode::Painting => Err(ChainError::BlockedDuringPaint { operation }),
        }
    }

    /// `element` was inserted under `parent` at `index`. Elements whose
    /// parent is not rendered are ignored until the parent is added.
    pub fn on_child_added(
        &mut self,
        tree: &ElementTree,
        parent: Option<ElementId>,
        id: ElementId,
        index: usize,
    ) -> Result<()> {
        self.ensure_idle("on_child_added")?;
        self.attach(tree, parent, id, index);
        Ok(())
    }

    pub(crate) fn attach(
        &mut self,
        tree: &ElementTree,
        parent: Option<ElementId>,
        id: ElementId,
        index: usize,
    ) {
        if let Some(parent) = parent {
            if !self.records.is_in_chain(parent) {
                return;
            }
        }
        let added = self.attach_subtree(tree, parent, id, index);
        self.stats.elements_added += added;

        self.mark_clipping(id, true);
        self.mark_opacity(id, false);
        self.mark_visuals(id, true);
    }

    /// `element` is about to leave the tree; its whole subtree is released.
    pub fn on_child_removing(&mut self, tree: &ElementTree, id: ElementId) -> Result<()> {
        self.ensure_idle("on_child_removing")?;
        if !self.records.is_in_chain(id) {
            return Ok(());
        }
        let removed = self.detach_subtree(tree, id);
        self.stats.elements_removed += removed;
        Ok(())
    }

    /// The children of `parent` changed order in `tree`.
    pub fn on_children_reordered(&mut self, tree: &ElementTree, parent: ElementId) -> Result<()> {
        self.ensure_idle("on_children_reordered")?;
        if !self.records.is_in_chain(parent) {
            return Ok(());
        }
        for &child in tree.children(parent) {
            let removed = self.detach_subtree(tree, child);
            self.stats.elements_removed += removed;
        }
        for (index, &child) in tree.children(parent).iter().enumerate() {
            let added = self.attach_subtree(tree, Some(parent), child, index);
            self.stats.elements_added += added;
        }

        self.mark_clipping(parent, true);
        self.mark_opacity(parent, true);
        self.mark_visuals(parent, true);
        Ok(())
    }

    pub fn on_clipping_changed(&mut self, id: ElementId, hierarchical: bool) -> Result<()> {
        self.ensure_idle("on_clipping_changed")?;
        self.mark_clipping(id, hierarchical);
        Ok(())
    }

    pub fn on_opacity_changed(&mut self, id: ElementId, hierarchical: bool) -> Result<()> {
        self.ensure_idle("on_opacity_changed")?;
        self.mark_opacity(id, hierarchical);
        Ok(())
    }

    pub fn on_transform_or_size_changed(
        &mut self,
        id: ElementId,
        transform_changed: bool,
        size_changed: bool,
    ) -> Result<()> {
        self.ensure_idle("on_transform_or_size_changed")?;
        self.mark_transform_size(id, transform_changed, size_changed);
        Ok(())
    }

    pub fn on_visuals_changed(&mut self, id: ElementId, hierarchical: bool) -> Result<()> {
        self.ensure_idle("on_visuals_changed")?;
        self.mark_visuals(id, hierarchical);
        Ok(())
    }

    /// Regenerate every text element over the next frames, a bounded number per frame.
    pub fn request_text_regen(&mut self) -> Result<()> {
        self.ensure_idle("request_text_regen")?;
        self.text.remaining = self.text.count;
        if self.text.cursor.is_none() {
            self.text.cursor = self.text.first;
        }
        Ok(())
    }

    /// The glyph atlas was rebuilt; every glyph UV is stale.
    pub fn on_font_atlas_reset(&mut self) {
        self.painter.on_atlas_reset();
        self.text.font_was_reset = true;
    }

    fn mark(&mut self, id: ElementId, flags: DirtyFlags, class: DirtyClass) {
        let Some(record) = self.records.get(id) else {
            return;
        };
        if !record.is_in_chain || flags.is_empty() {
            return;
        }
        self.tracker
            .register_dirty(id, record.hierarchy_depth, flags, class);
    }

    pub(crate) fn mark_clipping(&mut self, id: ElementId, hierarchical: bool) {
        let mut flags = DirtyFlags::CLIPPING;
        if hierarchical {
            flags |= DirtyFlags::CLIPPING_HIERARCHY;
        }
        self.mark(id, flags, DirtyClass::Clipping);
    }

    pub(crate) fn mark_opacity(&mut self, id: ElementId, hierarchical: bool) {
        let mut flags = DirtyFlags::OPACITY;
        if hierarchical {
            flags |= DirtyFlags::OPACITY_HIERARCHY;
        }
        self.mark(id, flags, DirtyClass::Opacity);
    }

    pub(crate) fn mark_transform_size(&mut self, id: ElementId, transform: bool, size: bool) {
        let mut flags = DirtyFlags::empty();
        if transform {
            flags |= DirtyFlags::TRANSFORM;
        }
        if size {
            flags |= DirtyFlags::CLIP_RECT_SIZE;
        }
        self.mark(id, flags, DirtyClass::TransformSize);
    }

    pub(crate) fn mark_visuals(&mut self, id: ElementId, hierarchical: bool) {
        let mut flags = DirtyFlags::VISUALS;
        if hierarchical {
            flags |= DirtyFlags::VISUALS_HIERARCHY;
        }
        self.mark(id, flags, DirtyClass::Visuals);
    }

    pub(crate) fn mark_opacity_id(&mut self, id: ElementId) {
        self.mark(id, DirtyFlags::VISUALS_OPACITY_ID, DirtyClass::Visuals);
    }

    /// Run all pending work and report what happened.
    pub fn process_changes(&mut self, tree: &ElementTree) -> Result<FrameReport> {
        self.ensure_idle("process_changes")?;

        self.process_clipping(tree);
        self.process_opacity(tree);
        self.process_transform_size(tree);
        // Text runs ahead of painting so size changes repaint this frame.
        self.process_text(tree);

        self.mode = ChainMode::Painting;
        self.process_visuals(tree);
        self.mode = ChainMode::Idle;

        self.tracker.reset();
        if std::mem::take(&mut self.painter.atlas_reset) {
            self.text.font_was_reset = true;
        }

        let stats = std::mem::take(&mut self.stats);
        log::trace!("render chain frame: {}", stats.summary());
        Ok(FrameReport {
            stats,
            needs_another_frame: self.text.remaining > 0 || self.text.font_was_reset,
            changed_groups: std::mem::take(&mut self.changed_groups),
        })
    }

    /// Drain one dirty class, calling `visit` once per pending element.
    fn sweep<F>(&mut self, tree: &ElementTree, class: DirtyClass, mut visit: F)
    where
        F: FnMut(&mut Self, &ElementTree, ElementId, u32),
    {
        let pass = self.tracker.begin_pass();
        let Some(mut depth) = self.tracker.min_depth(class) else {
            return;
        };
        log::trace!(
            "{:?} phase: depths {}..={:?}",
            class,
            depth,
            self.tracker.max_depth(class)
        );

        // The upper bound is re-read: nothing stops a visit from dirtying deeper elements.
        while self.tracker.max_depth(class).is_some_and(|max| depth <= max) {
            let mut current = self.tracker.first(class, depth);
            while let Some(id) = current {
                let next = self.tracker.next(class, id);
                let pending = self
                    .records
                    .get(id)
                    .is_some_and(|r| r.is_in_chain && r.dirty_id != pass);
                if pending {
                    visit(self, tree, id, pass);
                }
                self.tracker.clear_dirty(id, !class.mask());
                current = next;
            }
            depth += 1;
        }
    }

    #[cfg(test)]
    pub(crate) fn set_mode(&mut self, mode: ChainMode) {
        self.mode = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn test_entry_points_refuse_while_painting() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();

        chain.set_mode(ChainMode::Painting);
        assert_eq!(
            chain.on_visuals_changed(root, false),
            Err(ChainError::BlockedDuringPaint {
                operation: "on_visuals_changed"
            })
        );
        assert!(chain.on_child_removing(&tree, root).is_err());
        assert!(chain.process_changes(&tree).is_err());
        assert!(chain.request_text_regen().is_err());

        chain.set_mode(ChainMode::Idle);
        assert!(chain.process_changes(&tree).is_ok());
        assert!(chain.is_clean());
    }

    #[test]
    fn test_notifications_for_detached_elements_are_ignored() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let orphan = tree.create(Element::new());
        let child = tree.create(Element::new());
        tree.insert_child(orphan, child, None).unwrap();

        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();
        // Parent not rendered: nothing happens.
        chain.on_child_added(&tree, Some(orphan), child, 0).unwrap();
        assert!(!chain.is_in_chain(child));

        chain.on_visuals_changed(orphan, true).unwrap();
        assert!(chain.dirty_flags(orphan).is_empty());
    }

    #[test]
    fn test_attach_marks_clipping_opacity_and_visuals() {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        let mut chain: RenderChain = RenderChain::default();
        chain.on_child_added(&tree, None, root, 0).unwrap();

        let flags = chain.dirty_flags(root);
        assert!(flags.contains(DirtyFlags::CLIPPING | DirtyFlags::CLIPPING_HIERARCHY));
        assert!(flags.contains(DirtyFlags::OPACITY));
        assert!(!flags.contains(DirtyFlags::OPACITY_HIERARCHY));
        assert!(flags.contains(DirtyFlags::VISUALS | DirtyFlags::VISUALS_HIERARCHY));

        let report = chain.process_changes(&tree).unwrap();
        assert_eq!(report.stats.elements_added, 1);
        assert!(chain.dirty_flags(root).is_empty());
    }
}
