//! A retained element tree paired with its render chain.
//!
//! [`Panel`] is the mutation layer: every structural or style change goes
//! through it, updates the [`ElementTree`] and forwards the matching
//! notification to the [`RenderChain`]. Nothing is recomputed until
//! [`Panel::update`] runs a frame.

use std::rc::Rc;

use crate::chain::RenderChain;
use crate::config::ChainConfig;
use crate::element::{
    Border, CornerRadii, Display, Element, Overflow, TextContent, TextSettings, Visibility,
    VisualContent,
};
use crate::error::{ChainError, Result};
use crate::geometry::Color;
use crate::glyphs::TextGenerator;
use crate::gpu::{MeshPool, MeshService, SlotAllocator, SlotTable};
use crate::render_stats::FrameReport;
use crate::transform::Transform;
use crate::tree::{ElementId, ElementTree};

pub struct Panel<M: MeshService = MeshPool, S: SlotAllocator = SlotTable> {
    tree: ElementTree,
    chain: RenderChain<M, S>,
    root: ElementId,
}

impl Panel<MeshPool, SlotTable> {
    pub fn new(config: ChainConfig) -> Self {
        Self::with_chain(RenderChain::new(config))
    }
}

impl Default for Panel<MeshPool, SlotTable> {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl<M: MeshService, S: SlotAllocator> Panel<M, S> {
    pub fn with_services(
        config: ChainConfig,
        mesh: M,
        slots: S,
        text: Box<dyn TextGenerator>,
    ) -> Self {
        Self::with_chain(RenderChain::with_services(config, mesh, slots, text))
    }

    fn with_chain(mut chain: RenderChain<M, S>) -> Self {
        let mut tree = ElementTree::new();
        let root = tree.create(Element::new());
        chain.attach(&tree, None, root, 0);
        Self { tree, chain, root }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    pub fn chain(&self) -> &RenderChain<M, S> {
        &self.chain
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.tree.get(id)
    }

    /// Append `element` to `parent`'s children.
    pub fn add_child(&mut self, parent: ElementId, element: Element) -> Result<ElementId> {
        self.insert_child(parent, element, None)
    }

    /// Insert `element` under `parent` at `index`, or last when `None`.
    pub fn insert_child(
        &mut self,
        parent: ElementId,
        element: Element,
        index: Option<usize>,
    ) -> Result<ElementId> {
        if !self.tree.contains(parent) {
            return Err(ChainError::UnknownElement(parent));
        }
        let id = self.tree.create(element);
        let index = match self.tree.insert_child(parent, id, index) {
            Ok(index) => index,
            Err(err) => {
                self.tree.destroy(id)?;
                return Err(err);
            }
        };
        self.chain
            .on_child_added(&self.tree, Some(parent), id, index)?;
        Ok(id)
    }

    /// Remove `id` and its subtree.
    pub fn remove(&mut self, id: ElementId) -> Result<()> {
        if id == self.root {
            return Err(ChainError::RootRemoval);
        }
        if !self.tree.contains(id) {
            return Err(ChainError::UnknownElement(id));
        }
        self.chain.on_child_removing(&self.tree, id)?;
        self.tree.destroy(id)
    }

    /// Move `id` under `new_parent`, keeping its subtree.
    pub fn move_child(
        &mut self,
        id: ElementId,
        new_parent: ElementId,
        index: Option<usize>,
    ) -> Result<()> {
        if id == self.root {
            return Err(ChainError::RootRemoval);
        }
        let old_parent = self.tree.parent(id);
        let old_index = self.tree.index_in_parent(id).unwrap_or(0);
        self.chain.on_child_removing(&self.tree, id)?;
        match self.tree.insert_child(new_parent, id, index) {
            Ok(index) => self
                .chain
                .on_child_added(&self.tree, Some(new_parent), id, index),
            Err(err) => {
                // The tree is untouched on failure; put the records back.
                self.chain.on_child_added(&self.tree, old_parent, id, old_index)?;
                Err(err)
            }
        }
    }

    /// Reorder `parent`'s children; `order` must be a permutation of them.
    pub fn reorder_children(&mut self, parent: ElementId, order: &[ElementId]) -> Result<()> {
        self.tree.reorder_children(parent, order)?;
        self.chain.on_children_reordered(&self.tree, parent)
    }

    fn element_mut(&mut self, id: ElementId) -> Result<&mut Element> {
        self.tree.get_mut(id).ok_or(ChainError::UnknownElement(id))
    }

    pub fn set_opacity(&mut self, id: ElementId, opacity: f32) -> Result<()> {
        self.element_mut(id)?.style.opacity = opacity;
        self.chain.on_opacity_changed(id, false)
    }

    pub fn set_display(&mut self, id: ElementId, display: Display) -> Result<()> {
        self.element_mut(id)?.style.display = display;
        self.chain.on_visuals_changed(id, true)
    }

    pub fn set_visibility(&mut self, id: ElementId, visibility: Visibility) -> Result<()> {
        self.element_mut(id)?.style.visibility = visibility;
        self.chain.on_visuals_changed(id, false)
    }

    pub fn set_overflow(&mut self, id: ElementId, overflow: Overflow) -> Result<()> {
        self.element_mut(id)?.style.overflow = overflow;
        self.chain.on_clipping_changed(id, true)
    }

    /// Radii change both the drawn shape and the clip method.
    pub fn set_corner_radii(&mut self, id: ElementId, radii: CornerRadii) -> Result<()> {
        self.element_mut(id)?.style.radii = radii;
        self.chain.on_clipping_changed(id, false)?;
        self.chain.on_visuals_changed(id, false)
    }

    pub fn set_background(&mut self, id: ElementId, color: Option<Color>) -> Result<()> {
        self.element_mut(id)?.style.background = color;
        self.chain.on_visuals_changed(id, false)
    }

    pub fn set_border(&mut self, id: ElementId, border: Option<Border>) -> Result<()> {
        self.element_mut(id)?.style.border = border;
        self.chain.on_visuals_changed(id, false)
    }

    pub fn set_render_target(&mut self, id: ElementId, enabled: bool) -> Result<()> {
        self.element_mut(id)?.style.render_target = enabled;
        self.chain.on_visuals_changed(id, false)
    }

    pub fn set_text(&mut self, id: ElementId, text: Option<TextContent>) -> Result<()> {
        self.element_mut(id)?.text = text;
        self.chain.on_visuals_changed(id, false)
    }

    /// Outline and underlay of an element's text. Ignored without text.
    pub fn set_text_settings(&mut self, id: ElementId, settings: TextSettings) -> Result<()> {
        if let Some(text) = self.element_mut(id)?.text.as_mut() {
            text.settings = settings;
        }
        self.chain.on_visuals_changed(id, false)
    }

    pub fn set_content(&mut self, id: ElementId, content: Option<Rc<dyn VisualContent>>) -> Result<()> {
        self.element_mut(id)?.content = content;
        self.chain.on_visuals_changed(id, false)
    }

    /// Custom content changed without a new value to store.
    pub fn repaint(&mut self, id: ElementId) -> Result<()> {
        if !self.tree.contains(id) {
            return Err(ChainError::UnknownElement(id));
        }
        self.chain.on_visuals_changed(id, false)
    }

    pub fn set_position(&mut self, id: ElementId, x: f32, y: f32) -> Result<()> {
        let element = self.element_mut(id)?;
        element.rect.x = x;
        element.rect.y = y;
        self.chain.on_transform_or_size_changed(id, true, false)
    }

    pub fn set_transform(&mut self, id: ElementId, transform: Transform) -> Result<()> {
        self.element_mut(id)?.transform = transform;
        self.chain.on_transform_or_size_changed(id, true, false)
    }

    pub fn set_size(&mut self, id: ElementId, width: f32, height: f32) -> Result<()> {
        let element = self.element_mut(id)?;
        element.rect.width = width;
        element.rect.height = height;
        self.chain.on_transform_or_size_changed(id, false, true)?;
        self.chain.on_visuals_changed(id, false)
    }

    pub fn request_text_regen(&mut self) -> Result<()> {
        self.chain.request_text_regen()
    }

    pub fn on_font_atlas_reset(&mut self) {
        self.chain.on_font_atlas_reset();
    }

    /// Process every pending change.
    pub fn update(&mut self) -> Result<FrameReport> {
        self.chain.process_changes(&self.tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::CommandKind;

    fn owners(panel: &Panel) -> Vec<ElementId> {
        panel
            .chain()
            .commands()
            .iter()
            .map(|(_, c)| c.owner)
            .collect()
    }

    fn square(color: Color) -> Element {
        Element::new()
            .with_rect(0.0, 0.0, 10.0, 10.0)
            .with_background(color)
    }

    #[test]
    fn test_root_is_rendered() {
        let mut panel: Panel = Panel::default();
        assert!(panel.chain().is_in_chain(panel.root()));
        let report = panel.update().unwrap();
        assert_eq!(report.stats.elements_added, 1);
        assert!(panel.chain().commands().is_empty());
    }

    #[test]
    fn test_add_remove() {
        let mut panel: Panel = Panel::default();
        let root = panel.root();
        let a = panel.add_child(root, square(Color::WHITE)).unwrap();
        let b = panel.add_child(root, square(Color::BLACK)).unwrap();
        panel.update().unwrap();
        assert_eq!(owners(&panel), vec![a, b]);

        panel.remove(a).unwrap();
        panel.update().unwrap();
        assert_eq!(owners(&panel), vec![b]);
        assert!(panel.element(a).is_none());
        assert_eq!(panel.remove(a), Err(ChainError::UnknownElement(a)));
        assert_eq!(panel.remove(root), Err(ChainError::RootRemoval));
    }

    #[test]
    fn test_bad_index_leaves_tree_unchanged() {
        let mut panel: Panel = Panel::default();
        let root = panel.root();
        let err = panel
            .insert_child(root, Element::new(), Some(3))
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidChildIndex {
                parent: root,
                index: 3
            }
        );
        assert_eq!(panel.tree().len(), 1);
    }

    #[test]
    fn test_move_and_reorder() {
        let mut panel: Panel = Panel::default();
        let root = panel.root();
        let a = panel.add_child(root, square(Color::WHITE)).unwrap();
        let b = panel.add_child(root, square(Color::BLACK)).unwrap();
        let c = panel.add_child(a, square(Color::WHITE)).unwrap();
        panel.update().unwrap();
        assert_eq!(owners(&panel), vec![a, c, b]);

        panel.move_child(c, b, None).unwrap();
        panel.update().unwrap();
        assert_eq!(owners(&panel), vec![a, b, c]);

        panel.reorder_children(root, &[b, a]).unwrap();
        panel.update().unwrap();
        assert_eq!(owners(&panel), vec![b, c, a]);
    }

    #[test]
    fn test_failed_move_keeps_chain() {
        let mut panel: Panel = Panel::default();
        let root = panel.root();
        let a = panel.add_child(root, square(Color::WHITE)).unwrap();
        let b = panel.add_child(a, square(Color::BLACK)).unwrap();
        let c = panel.add_child(root, square(Color::WHITE)).unwrap();
        panel.update().unwrap();

        assert!(panel.move_child(a, b, None).is_err());
        assert!(panel.move_child(c, a, Some(5)).is_err());
        panel.update().unwrap();
        assert_eq!(owners(&panel), vec![a, b, c]);
        assert_eq!(panel.tree().parent(c), Some(root));
    }

    #[test]
    fn test_render_target_brackets_subtree() {
        let mut panel: Panel = Panel::default();
        let root = panel.root();
        let layer = panel.add_child(root, square(Color::WHITE)).unwrap();
        let inner = panel.add_child(layer, square(Color::BLACK)).unwrap();
        panel.update().unwrap();

        panel.set_render_target(layer, true).unwrap();
        panel.update().unwrap();

        let list: Vec<_> = panel
            .chain()
            .commands()
            .iter()
            .map(|(_, c)| (c.owner, c.kind, c.closing))
            .collect();
        assert_eq!(list.len(), 5);
        assert_eq!(list[0], (layer, CommandKind::PushRenderTarget, false));
        assert_eq!(list[2].0, inner);
        assert_eq!(list[3], (layer, CommandKind::BlitToPreviousTarget, true));
        assert_eq!(list[4], (layer, CommandKind::PopRenderTarget, true));
    }

    #[test]
    fn test_setters_reject_unknown_elements() {
        let mut panel: Panel = Panel::default();
        let root = panel.root();
        let gone = panel.add_child(root, Element::new()).unwrap();
        panel.remove(gone).unwrap();
        assert!(panel.set_opacity(gone, 0.5).is_err());
        assert!(panel.set_size(gone, 1.0, 1.0).is_err());
        assert!(panel.repaint(gone).is_err());
    }
}
