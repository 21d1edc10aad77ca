//! Per-frame render chain statistics.
//!
//! Every [`RenderChain::process_changes`](crate::chain::RenderChain::process_changes)
//! call returns the counters collected during that frame inside a
//! [`FrameReport`]. The same counters are logged at `trace` level:
//! ```bash
//! RUST_LOG=guido_chain=trace cargo run --example frame_loop
//! ```
//!
//! "Expanded" counters count elements reached by recursion from a dirty
//! root, the plain ones count the dirty roots themselves.

use std::ops::AddAssign;

use crate::tree::ElementId;

/// Snapshot of what one frame did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChainStats {
    pub elements_added: u32,
    pub elements_removed: u32,

    pub recursive_clip_updates: u32,
    pub recursive_clip_updates_expanded: u32,
    pub recursive_opacity_updates: u32,
    pub recursive_opacity_updates_expanded: u32,
    pub recursive_transform_updates: u32,
    pub recursive_transform_updates_expanded: u32,
    pub recursive_visual_updates: u32,
    pub recursive_visual_updates_expanded: u32,
    pub non_recursive_visual_updates: u32,

    // Transform outcomes
    /// Slot re-uploaded for an element owning a transform slot.
    pub bone_transformed: u32,
    /// Skipped below such an element.
    pub skip_transformed: u32,
    /// Vertices moved in place.
    pub nudge_transformed: u32,
    /// Repainted because nudging was not possible.
    pub visual_update_transformed: u32,
    pub group_transform_elements_changed: u32,

    pub opacity_id_updates: u32,
    pub text_updates: u32,
    pub new_mesh_allocations: u32,
    pub updated_mesh_allocations: u32,
}

impl ChainStats {
    /// Elements whose transform change was handled, by any outcome.
    pub fn transformed(&self) -> u32 {
        self.bone_transformed
            + self.skip_transformed
            + self.nudge_transformed
            + self.visual_update_transformed
    }

    /// Share of transform changes handled without a repaint, in percent.
    pub fn nudge_rate(&self) -> f64 {
        let total = self.transformed();
        if total == 0 {
            return 0.0;
        }
        (total - self.visual_update_transformed) as f64 / total as f64 * 100.0
    }

    /// Whether the frame did no work at all.
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    pub fn summary(&self) -> String {
        format!(
            "added={} removed={} clip={}/{} opacity={}/{} transform={}/{} \
             visuals={}/{}+{} nudged={} repainted={} bones={} skipped={} groups={} \
             (no-repaint {:.1}%) opacity_ids={} text={} meshes new={} updated={}",
            self.elements_added,
            self.elements_removed,
            self.recursive_clip_updates,
            self.recursive_clip_updates_expanded,
            self.recursive_opacity_updates,
            self.recursive_opacity_updates_expanded,
            self.recursive_transform_updates,
            self.recursive_transform_updates_expanded,
            self.recursive_visual_updates,
            self.recursive_visual_updates_expanded,
            self.non_recursive_visual_updates,
            self.nudge_transformed,
            self.visual_update_transformed,
            self.bone_transformed,
            self.skip_transformed,
            self.group_transform_elements_changed,
            self.nudge_rate(),
            self.opacity_id_updates,
            self.text_updates,
            self.new_mesh_allocations,
            self.updated_mesh_allocations,
        )
    }
}

impl AddAssign<&ChainStats> for ChainStats {
    fn add_assign(&mut self, other: &ChainStats) {
        self.elements_added += other.elements_added;
        self.elements_removed += other.elements_removed;
        self.recursive_clip_updates += other.recursive_clip_updates;
        self.recursive_clip_updates_expanded += other.recursive_clip_updates_expanded;
        self.recursive_opacity_updates += other.recursive_opacity_updates;
        self.recursive_opacity_updates_expanded += other.recursive_opacity_updates_expanded;
        self.recursive_transform_updates += other.recursive_transform_updates;
        self.recursive_transform_updates_expanded += other.recursive_transform_updates_expanded;
        self.recursive_visual_updates += other.recursive_visual_updates;
        self.recursive_visual_updates_expanded += other.recursive_visual_updates_expanded;
        self.non_recursive_visual_updates += other.non_recursive_visual_updates;
        self.bone_transformed += other.bone_transformed;
        self.skip_transformed += other.skip_transformed;
        self.nudge_transformed += other.nudge_transformed;
        self.visual_update_transformed += other.visual_update_transformed;
        self.group_transform_elements_changed += other.group_transform_elements_changed;
        self.opacity_id_updates += other.opacity_id_updates;
        self.text_updates += other.text_updates;
        self.new_mesh_allocations += other.new_mesh_allocations;
        self.updated_mesh_allocations += other.updated_mesh_allocations;
    }
}

/// Result of one frame.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameReport {
    pub stats: ChainStats,
    /// Text regeneration is still pending; schedule another frame.
    pub needs_another_frame: bool,
    /// Group-transform elements that moved. Their view matrix has to be
    /// refreshed by the backend.
    pub changed_groups: Vec<ElementId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert!(ChainStats::default().is_idle());
        let stats = ChainStats {
            text_updates: 1,
            ..Default::default()
        };
        assert!(!stats.is_idle());
    }

    #[test]
    fn test_nudge_rate() {
        let stats = ChainStats {
            nudge_transformed: 3,
            visual_update_transformed: 1,
            ..Default::default()
        };
        assert_eq!(stats.transformed(), 4);
        assert!((stats.nudge_rate() - 75.0).abs() < 1e-9);
        assert_eq!(ChainStats::default().nudge_rate(), 0.0);
    }

    #[test]
    fn test_accumulate() {
        let frame = ChainStats {
            elements_added: 2,
            new_mesh_allocations: 5,
            ..Default::default()
        };
        let mut total = ChainStats::default();
        total += &frame;
        total += &frame;
        assert_eq!(total.elements_added, 4);
        assert_eq!(total.new_mesh_allocations, 10);
    }

    #[test]
    fn test_summary_mentions_counters() {
        let stats = ChainStats {
            nudge_transformed: 7,
            ..Default::default()
        };
        let summary = stats.summary();
        assert!(summary.contains("nudged=7"));
        assert!(summary.contains("(no-repaint 100.0%)"));
    }
}
