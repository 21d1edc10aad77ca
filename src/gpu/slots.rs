//! In-memory GPU slot tables.

use crate::config::SlotTableConfig;
use crate::element::TextSettings;
use crate::transform::Transform;

use super::SlotAllocator;

/// Fixed-capacity table; slot 0 is reserved for the default value.
struct SlotArena<T: Copy> {
    values: Vec<T>,
    live: Vec<bool>,
    free: Vec<u32>,
    capacity: u32,
    default: T,
}

impl<T: Copy> SlotArena<T> {
    fn new(capacity: u32, default: T) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: vec![default],
            live: vec![true],
            free: Vec::new(),
            capacity,
            default,
        }
    }

    fn alloc(&mut self) -> Option<u32> {
        if let Some(slot) = self.free.pop() {
            self.live[slot as usize] = true;
            self.values[slot as usize] = self.default;
            return Some(slot);
        }
        let slot = self.values.len() as u32;
        if slot >= self.capacity {
            return None;
        }
        self.values.push(self.default);
        self.live.push(true);
        Some(slot)
    }

    fn free(&mut self, slot: u32) {
        if slot == 0 || !self.is_live(slot) {
            return;
        }
        self.live[slot as usize] = false;
        self.free.push(slot);
    }

    fn set(&mut self, slot: u32, value: T) {
        if slot != 0 && self.is_live(slot) {
            self.values[slot as usize] = value;
        }
    }

    fn get(&self, slot: u32) -> Option<T> {
        self.is_live(slot).then(|| self.values[slot as usize])
    }

    fn is_live(&self, slot: u32) -> bool {
        self.live.get(slot as usize).copied().unwrap_or(false)
    }

    /// Live slots excluding the default.
    fn in_use(&self) -> usize {
        self.live.iter().skip(1).filter(|l| **l).count()
    }
}

pub struct SlotTable {
    transforms: SlotArena<Transform>,
    clip_rects: SlotArena<[f32; 4]>,
    opacities: SlotArena<f32>,
    text_settings: SlotArena<TextSettings>,
}

const UNBOUNDED_CLIP: [f32; 4] = [-1.0e30, -1.0e30, 1.0e30, 1.0e30];

impl SlotTable {
    pub fn new(config: SlotTableConfig) -> Self {
        Self {
            transforms: SlotArena::new(config.transforms, Transform::IDENTITY),
            clip_rects: SlotArena::new(config.clip_rects, UNBOUNDED_CLIP),
            opacities: SlotArena::new(config.opacities, 1.0),
            text_settings: SlotArena::new(config.text_settings, TextSettings::default()),
        }
    }

    pub fn transform(&self, slot: u32) -> Option<Transform> {
        self.transforms.get(slot)
    }

    pub fn clip_rect(&self, slot: u32) -> Option<[f32; 4]> {
        self.clip_rects.get(slot)
    }

    pub fn opacity(&self, slot: u32) -> Option<f32> {
        self.opacities.get(slot)
    }

    pub fn text_settings(&self, slot: u32) -> Option<TextSettings> {
        self.text_settings.get(slot)
    }

    pub fn transforms_in_use(&self) -> usize {
        self.transforms.in_use()
    }

    pub fn clip_rects_in_use(&self) -> usize {
        self.clip_rects.in_use()
    }

    pub fn opacities_in_use(&self) -> usize {
        self.opacities.in_use()
    }

    pub fn text_settings_in_use(&self) -> usize {
        self.text_settings.in_use()
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new(SlotTableConfig::default())
    }
}

impl SlotAllocator for SlotTable {
    fn alloc_transform(&mut self) -> Option<u32> {
        self.transforms.alloc()
    }

    fn alloc_clip_rect(&mut self) -> Option<u32> {
        self.clip_rects.alloc()
    }

    fn alloc_opacity(&mut self) -> Option<u32> {
        self.opacities.alloc()
    }

    fn alloc_text_settings(&mut self) -> Option<u32> {
        self.text_settings.alloc()
    }

    fn free_transform(&mut self, slot: u32) {
        self.transforms.free(slot);
    }

    fn free_clip_rect(&mut self, slot: u32) {
        self.clip_rects.free(slot);
    }

    fn free_opacity(&mut self, slot: u32) {
        self.opacities.free(slot);
    }

    fn free_text_settings(&mut self, slot: u32) {
        self.text_settings.free(slot);
    }

    fn set_transform_value(&mut self, slot: u32, value: Transform) {
        self.transforms.set(slot, value);
    }

    fn set_clip_rect_value(&mut self, slot: u32, value: [f32; 4]) {
        self.clip_rects.set(slot, value);
    }

    fn set_opacity_value(&mut self, slot: u32, value: f32) {
        self.opacities.set(slot, value);
    }

    fn set_text_settings_value(&mut self, slot: u32, value: TextSettings) {
        self.text_settings.set(slot, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slot_is_reserved() {
        let mut table = SlotTable::new(SlotTableConfig::uniform(4));
        assert_eq!(table.opacity(0), Some(1.0));
        assert_eq!(table.alloc_opacity(), Some(1));

        // Writes and frees against the default slot are ignored.
        table.set_opacity_value(0, 0.5);
        table.free_opacity(0);
        assert_eq!(table.opacity(0), Some(1.0));
    }

    #[test]
    fn test_capacity_includes_default() {
        let mut table = SlotTable::new(SlotTableConfig::default().clip_rects(2));
        assert_eq!(table.alloc_clip_rect(), Some(1));
        assert_eq!(table.alloc_clip_rect(), None);
        assert_eq!(table.clip_rects_in_use(), 1);
    }

    #[test]
    fn test_freed_slot_is_reused_with_default_value() {
        let mut table = SlotTable::default();
        let slot = table.alloc_transform().unwrap();
        table.set_transform_value(slot, Transform::translate(3.0, 4.0));
        table.free_transform(slot);
        assert_eq!(table.transform(slot), None);

        let again = table.alloc_transform().unwrap();
        assert_eq!(again, slot);
        assert_eq!(table.transform(again), Some(Transform::IDENTITY));
    }

    #[test]
    fn test_double_free_is_harmless() {
        let mut table = SlotTable::default();
        let slot = table.alloc_text_settings().unwrap();
        table.free_text_settings(slot);
        table.free_text_settings(slot);
        assert_eq!(table.alloc_text_settings(), Some(slot));
        assert_eq!(table.alloc_text_settings(), Some(slot + 1));
    }
}
