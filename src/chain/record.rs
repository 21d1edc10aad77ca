//! Per-element render state kept by the chain.

use crate::gpu::MeshHandle;
use crate::transform::Transform;
use crate::tree::ElementId;

use super::commands::CommandId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Inherited,
}

/// A GPU slot index and whether the element owns it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRef {
    pub index: u32,
    pub ownership: Ownership,
}

impl SlotRef {
    /// The shared default slot of every table.
    pub const DEFAULT: SlotRef = SlotRef {
        index: 0,
        ownership: Ownership::Inherited,
    };

    pub fn owned(index: u32) -> Self {
        Self {
            index,
            ownership: Ownership::Owned,
        }
    }

    /// The same slot, as seen by a descendant that follows it.
    pub fn inherited(self) -> Self {
        Self {
            index: self.index,
            ownership: Ownership::Inherited,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipMethod {
    Undetermined,
    NotClipped,
    Scissor,
    ShaderDiscard,
    Stencil,
}

impl ClipMethod {
    /// Whether content is cut to the element's bounds.
    pub fn clips(self) -> bool {
        matches!(
            self,
            ClipMethod::Scissor | ClipMethod::ShaderDiscard | ClipMethod::Stencil
        )
    }
}

/// Location of the glyph quads inside an element's mesh, relative to the
/// start of the allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TextRange {
    pub vertex_start: u32,
    pub vertex_count: u32,
    pub index_start: u32,
    pub index_count: u32,
}

#[derive(Clone, Debug)]
pub struct RenderRecord {
    pub(crate) id: ElementId,
    pub(crate) is_in_chain: bool,
    pub(crate) prev: Option<ElementId>,
    pub(crate) next: Option<ElementId>,
    pub(crate) prev_text: Option<ElementId>,
    pub(crate) next_text: Option<ElementId>,
    pub(crate) is_in_text_list: bool,
    pub(crate) dirty_id: u32,
    pub(crate) hierarchy_depth: usize,

    pub(crate) transform_id: SlotRef,
    pub(crate) clip_rect_id: SlotRef,
    pub(crate) opacity_id: SlotRef,
    pub(crate) text_settings_id: SlotRef,
    pub(crate) clip_method: ClipMethod,

    pub(crate) group_transform_ancestor: Option<ElementId>,
    pub(crate) bone_transform_ancestor: Option<ElementId>,

    pub(crate) data: Option<MeshHandle>,
    pub(crate) closing_data: Option<MeshHandle>,
    pub(crate) text_range: Option<TextRange>,

    pub(crate) first_command: Option<CommandId>,
    pub(crate) last_command: Option<CommandId>,
    pub(crate) first_closing_command: Option<CommandId>,
    pub(crate) last_closing_command: Option<CommandId>,

    pub(crate) composite_opacity: f32,
    pub(crate) is_stencil_clipped: bool,
    pub(crate) is_hierarchy_hidden: bool,
    pub(crate) disable_nudging: bool,
    pub(crate) vertices_space: Transform,
}

impl RenderRecord {
    pub(crate) fn new(id: ElementId) -> Self {
        Self {
            id,
            is_in_chain: false,
            prev: None,
            next: None,
            prev_text: None,
            next_text: None,
            is_in_text_list: false,
            dirty_id: 0,
            hierarchy_depth: 0,
            transform_id: SlotRef::DEFAULT,
            clip_rect_id: SlotRef::DEFAULT,
            opacity_id: SlotRef::DEFAULT,
            text_settings_id: SlotRef::DEFAULT,
            clip_method: ClipMethod::Undetermined,
            group_transform_ancestor: None,
            bone_transform_ancestor: None,
            data: None,
            closing_data: None,
            text_range: None,
            first_command: None,
            last_command: None,
            first_closing_command: None,
            last_closing_command: None,
            // Guarantees the first opacity pass sees a change.
            composite_opacity: f32::MAX,
            is_stencil_clipped: false,
            is_hierarchy_hidden: false,
            disable_nudging: false,
            vertices_space: Transform::IDENTITY,
        }
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn is_in_chain(&self) -> bool {
        self.is_in_chain
    }

    /// Previous element in the flattened pre-order chain.
    pub fn prev(&self) -> Option<ElementId> {
        self.prev
    }

    pub fn next(&self) -> Option<ElementId> {
        self.next
    }

    pub fn hierarchy_depth(&self) -> usize {
        self.hierarchy_depth
    }

    pub fn transform_id(&self) -> SlotRef {
        self.transform_id
    }

    pub fn clip_rect_id(&self) -> SlotRef {
        self.clip_rect_id
    }

    pub fn opacity_id(&self) -> SlotRef {
        self.opacity_id
    }

    pub fn text_settings_id(&self) -> SlotRef {
        self.text_settings_id
    }

    pub fn clip_method(&self) -> ClipMethod {
        self.clip_method
    }

    pub fn group_transform_ancestor(&self) -> Option<ElementId> {
        self.group_transform_ancestor
    }

    pub fn bone_transform_ancestor(&self) -> Option<ElementId> {
        self.bone_transform_ancestor
    }

    pub fn mesh(&self) -> Option<MeshHandle> {
        self.data
    }

    pub fn closing_mesh(&self) -> Option<MeshHandle> {
        self.closing_data
    }

    pub fn first_command(&self) -> Option<CommandId> {
        self.first_command
    }

    pub fn last_command(&self) -> Option<CommandId> {
        self.last_command
    }

    pub fn first_closing_command(&self) -> Option<CommandId> {
        self.first_closing_command
    }

    pub fn last_closing_command(&self) -> Option<CommandId> {
        self.last_closing_command
    }

    pub fn last_closing_or_last_command(&self) -> Option<CommandId> {
        self.last_closing_command.or(self.last_command)
    }

    pub fn composite_opacity(&self) -> f32 {
        self.composite_opacity
    }

    pub fn is_stencil_clipped(&self) -> bool {
        self.is_stencil_clipped
    }

    pub fn is_hierarchy_hidden(&self) -> bool {
        self.is_hierarchy_hidden
    }

    pub fn disable_nudging(&self) -> bool {
        self.disable_nudging
    }

    pub fn vertices_space(&self) -> Transform {
        self.vertices_space
    }

    pub fn has_commands(&self) -> bool {
        self.first_command.is_some()
    }
}

/// Records keyed by element slot, validated against the full id.
#[derive(Default)]
pub(crate) struct RecordTable {
    records: Vec<Option<RenderRecord>>,
}

impl RecordTable {
    pub fn get(&self, id: ElementId) -> Option<&RenderRecord> {
        self.records
            .get(id.slot())
            .and_then(|r| r.as_ref())
            .filter(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut RenderRecord> {
        self.records
            .get_mut(id.slot())
            .and_then(|r| r.as_mut())
            .filter(|r| r.id == id)
    }

    pub fn insert(&mut self, record: RenderRecord) {
        let slot = record.id.slot();
        if self.records.len() <= slot {
            self.records.resize_with(slot + 1, || None);
        }
        self.records[slot] = Some(record);
    }

    pub fn remove(&mut self, id: ElementId) -> Option<RenderRecord> {
        if self.get(id).is_none() {
            return None;
        }
        self.records[id.slot()].take()
    }

    pub fn is_in_chain(&self, id: ElementId) -> bool {
        self.get(id).is_some_and(|r| r.is_in_chain)
    }

    pub fn len(&self) -> usize {
        self.records.iter().filter(|r| r.is_some()).count()
    }
}
