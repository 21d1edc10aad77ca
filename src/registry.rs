//! Panel lifecycle management.
//!
//! A [`Renderer`] owns every [`Panel`] in a [`ChainRegistry`] and hands out
//! generational [`PanelHandle`]s, so a handle to a destroyed panel is
//! rejected instead of silently addressing its replacement.

use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::panel::Panel;
use crate::render_stats::FrameReport;

/// Stable reference to a registered panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PanelHandle {
    index: u32,
    generation: u32,
}

#[derive(Default)]
pub struct ChainRegistry {
    panels: Vec<Option<Panel>>,
    generations: Vec<u32>,
    free: Vec<u32>,
    len: usize,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, panel: Panel) -> PanelHandle {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = index as usize;
                self.generations[slot] = self.generations[slot].wrapping_add(1);
                self.panels[slot] = Some(panel);
                PanelHandle {
                    index,
                    generation: self.generations[slot],
                }
            }
            None => {
                let index = self.panels.len() as u32;
                self.panels.push(Some(panel));
                self.generations.push(0);
                PanelHandle {
                    index,
                    generation: 0,
                }
            }
        }
    }

    pub fn remove(&mut self, handle: PanelHandle) -> Result<Panel> {
        if !self.contains(handle) {
            return Err(ChainError::UnknownPanel(handle));
        }
        let panel = self.panels[handle.index as usize]
            .take()
            .ok_or(ChainError::UnknownPanel(handle))?;
        self.free.push(handle.index);
        self.len -= 1;
        Ok(panel)
    }

    pub fn contains(&self, handle: PanelHandle) -> bool {
        let slot = handle.index as usize;
        self.generations.get(slot) == Some(&handle.generation)
            && self.panels.get(slot).is_some_and(Option::is_some)
    }

    pub fn get(&self, handle: PanelHandle) -> Result<&Panel> {
        if !self.contains(handle) {
            return Err(ChainError::UnknownPanel(handle));
        }
        self.panels[handle.index as usize]
            .as_ref()
            .ok_or(ChainError::UnknownPanel(handle))
    }

    pub fn get_mut(&mut self, handle: PanelHandle) -> Result<&mut Panel> {
        if !self.contains(handle) {
            return Err(ChainError::UnknownPanel(handle));
        }
        self.panels[handle.index as usize]
            .as_mut()
            .ok_or(ChainError::UnknownPanel(handle))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PanelHandle, &mut Panel)> {
        let generations = &self.generations;
        self.panels
            .iter_mut()
            .enumerate()
            .filter_map(move |(index, panel)| {
                let handle = PanelHandle {
                    index: index as u32,
                    generation: generations[index],
                };
                panel.as_mut().map(|panel| (handle, panel))
            })
    }
}

/// Owns every panel and the configuration new panels start from.
pub struct Renderer {
    config: ChainConfig,
    registry: ChainRegistry,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl Renderer {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            registry: ChainRegistry::new(),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn create_panel(&mut self) -> PanelHandle {
        let handle = self.registry.insert(Panel::new(self.config.clone()));
        log::debug!("created panel {:?}", handle);
        handle
    }

    pub fn destroy_panel(&mut self, handle: PanelHandle) -> Result<()> {
        self.registry.remove(handle)?;
        log::debug!("destroyed panel {:?}", handle);
        Ok(())
    }

    pub fn panel(&self, handle: PanelHandle) -> Result<&Panel> {
        self.registry.get(handle)
    }

    pub fn panel_mut(&mut self, handle: PanelHandle) -> Result<&mut Panel> {
        self.registry.get_mut(handle)
    }

    pub fn panel_count(&self) -> usize {
        self.registry.len()
    }

    /// Run one frame on every panel.
    pub fn update_all(&mut self) -> Vec<(PanelHandle, Result<FrameReport>)> {
        self.registry
            .iter_mut()
            .map(|(handle, panel)| (handle, panel.update()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::geometry::Color;

    #[test]
    fn test_stale_handle_is_rejected() {
        let mut renderer = Renderer::default();
        let first = renderer.create_panel();
        renderer.destroy_panel(first).unwrap();

        let second = renderer.create_panel();
        assert_ne!(first, second);
        assert_eq!(renderer.panel_count(), 1);
        assert!(matches!(
            renderer.panel(first),
            Err(ChainError::UnknownPanel(h)) if h == first
        ));
        assert!(renderer.destroy_panel(first).is_err());
        assert!(renderer.panel(second).is_ok());
    }

    #[test]
    fn test_update_all_reports_per_panel() {
        let mut renderer = Renderer::default();
        let a = renderer.create_panel();
        let b = renderer.create_panel();
        {
            let panel = renderer.panel_mut(b).unwrap();
            let root = panel.root();
            panel
                .add_child(
                    root,
                    Element::new()
                        .with_rect(0.0, 0.0, 4.0, 4.0)
                        .with_background(Color::WHITE),
                )
                .unwrap();
        }

        let reports = renderer.update_all();
        assert_eq!(reports.len(), 2);
        for (handle, report) in reports {
            let report = report.unwrap();
            let expected = if handle == a { 1 } else { 2 };
            assert_eq!(report.stats.elements_added, expected);
        }

        let idle = renderer.update_all();
        assert!(idle.iter().all(|(_, r)| r.as_ref().unwrap().stats.is_idle()));
    }

    #[test]
    fn test_registry_len_tracks_removals() {
        let mut registry = ChainRegistry::new();
        assert!(registry.is_empty());
        let handle = registry.insert(Panel::default());
        assert_eq!(registry.len(), 1);
        registry.remove(handle).unwrap();
        assert!(registry.is_empty());
        assert!(registry.get(handle).is_err());
    }
}
