//! Turns one element into mesh entries and command requests.
//!
//! The painter knows nothing about the command list or the mesh service. It
//! produces an ordered list of [`MeshEntry`] values in element-local space
//! plus a [`ClosingInfo`] describing what has to be undone after the
//! element's descendants are drawn. The chain copies, transforms and stamps
//! the entries and splices the matching commands.

use crate::element::{CornerRadii, Element, TextContent};
use crate::geometry::{Color, Rect};
use crate::glyphs::{TextGenerator, TextMesh};
use crate::gpu::{Vertex, VertexFlags};

use super::commands::{CommandId, CommandKind};
use super::record::ClipMethod;

const CORNER_SEGMENTS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum EntryKind {
    Mesh,
    Text,
    /// Stencil register geometry; keeps its winding.
    ClipRegister,
    /// No geometry, only a command.
    Command(CommandKind),
}

#[derive(Clone, Debug)]
pub(crate) struct MeshEntry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub kind: EntryKind,
}

impl MeshEntry {
    fn command(kind: CommandKind) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            kind: EntryKind::Command(kind),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ClosingInfo {
    pub needs_closing: bool,
    pub pop_clip: bool,
    pub pop_view: bool,
    pub pop_render_target: bool,
    /// Copy of the stencil register mesh, drawn again with flipped winding.
    pub clip_unregister: Option<(Vec<Vertex>, Vec<u32>)>,
    pub unregister_command: Option<CommandId>,
}

/// Handed to [`VisualContent`](crate::element::VisualContent) to emit geometry
/// in element-local coordinates.
pub struct MeshGenerationContext<'a> {
    rect: Rect,
    entries: &'a mut Vec<MeshEntry>,
    disable_nudging: &'a mut bool,
}

impl<'a> MeshGenerationContext<'a> {
    /// The element's own rectangle, at the origin.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn draw_rect(&mut self, rect: Rect, color: Color) {
        let (vertices, indices) = rect_mesh(rect, color, VertexFlags::SOLID);
        self.add_mesh(vertices, indices);
    }

    pub fn draw_rounded_rect(&mut self, rect: Rect, radii: CornerRadii, color: Color) {
        let (vertices, indices) = rounded_rect_mesh(rect, radii, color, VertexFlags::SOLID);
        self.add_mesh(vertices, indices);
    }

    /// Raw geometry; `indices` refer to `vertices`.
    pub fn add_mesh(&mut self, vertices: Vec<Vertex>, indices: Vec<u32>) {
        if vertices.is_empty() || indices.is_empty() {
            return;
        }
        self.entries.push(MeshEntry {
            vertices,
            indices,
            kind: EntryKind::Mesh,
        });
    }

    /// Geometry that must be regenerated when the element is scaled, such
    /// as anti-aliased strokes. Transform changes will always repaint.
    pub fn add_scale_dependent_mesh(&mut self, vertices: Vec<Vertex>, indices: Vec<u32>) {
        *self.disable_nudging = true;
        self.add_mesh(vertices, indices);
    }
}

pub(crate) struct Painter {
    pub entries: Vec<MeshEntry>,
    pub closing: ClosingInfo,
    pub disable_nudging: bool,
    pub atlas_reset: bool,
    text: Box<dyn TextGenerator>,
}

impl Painter {
    pub fn new(text: Box<dyn TextGenerator>) -> Self {
        Self {
            entries: Vec::new(),
            closing: ClosingInfo::default(),
            disable_nudging: false,
            atlas_reset: false,
            text,
        }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.closing = ClosingInfo::default();
        self.disable_nudging = false;
    }

    pub fn generate_text(&mut self, text: &TextContent, rect: Rect) -> TextMesh {
        let mesh = self.text.generate(text, rect);
        self.atlas_reset |= mesh.atlas_reset;
        mesh
    }

    pub fn on_atlas_reset(&mut self) {
        self.text.on_atlas_reset();
    }

    pub fn vertex_count(&self) -> usize {
        self.entries.iter().map(|e| e.vertices.len()).sum()
    }

    /// Paint `element`. Invisible elements only emit what they owe their
    /// descendants: views, render targets and clipping.
    pub fn paint(&mut self, element: &Element, clip_method: ClipMethod, visible: bool) {
        self.reset();
        let local = element.rect.local();

        if element.style.render_target {
            self.entries
                .push(MeshEntry::command(CommandKind::PushRenderTarget));
            self.closing.pop_render_target = true;
            self.closing.needs_closing = true;
        }
        if element.is_group_transform() {
            self.entries.push(MeshEntry::command(CommandKind::PushView));
            self.closing.pop_view = true;
            self.closing.needs_closing = true;
        }

        if visible {
            self.draw_background(element, local);
            self.draw_border(element, local);
        }
        self.apply_clipping(element, local, clip_method);

        if visible {
            if let Some(text) = element.text.as_ref() {
                let mesh = self.generate_text(text, local);
                if !mesh.vertices.is_empty() {
                    self.entries.push(MeshEntry {
                        vertices: mesh.vertices,
                        indices: mesh.indices,
                        kind: EntryKind::Text,
                    });
                }
            }
            if let Some(content) = element.content.clone() {
                let mut ctx = MeshGenerationContext {
                    rect: local,
                    entries: &mut self.entries,
                    disable_nudging: &mut self.disable_nudging,
                };
                content.generate(&mut ctx);
            }
        }
    }

    fn draw_background(&mut self, element: &Element, local: Rect) {
        let Some(color) = element.style.background else {
            return;
        };
        if color.is_transparent() || local.is_empty() {
            return;
        }
        let (vertices, indices) = if element.style.radii.is_zero() {
            rect_mesh(local, color, VertexFlags::SOLID)
        } else {
            rounded_rect_mesh(local, element.style.radii, color, VertexFlags::SOLID)
        };
        self.entries.push(MeshEntry {
            vertices,
            indices,
            kind: EntryKind::Mesh,
        });
    }

    fn draw_border(&mut self, element: &Element, local: Rect) {
        let Some(border) = element.style.border else {
            return;
        };
        if border.width <= 0.0 || border.color.is_transparent() || local.is_empty() {
            return;
        }
        let w = border.width.min(local.width / 2.0).min(local.height / 2.0);
        let inner_height = (local.height - 2.0 * w).max(0.0);
        let sides = [
            Rect::new(local.x, local.y, local.width, w),
            Rect::new(local.x, local.max_y() - w, local.width, w),
            Rect::new(local.x, local.y + w, w, inner_height),
            Rect::new(local.max_x() - w, local.y + w, w, inner_height),
        ];
        let mut vertices = Vec::with_capacity(16);
        let mut indices = Vec::with_capacity(24);
        for side in sides.iter().filter(|s| !s.is_empty()) {
            let (v, i) = rect_mesh(*side, border.color, VertexFlags::SOLID);
            let base = vertices.len() as u32;
            vertices.extend(v);
            indices.extend(i.into_iter().map(|i| i + base));
        }
        self.entries.push(MeshEntry {
            vertices,
            indices,
            kind: EntryKind::Mesh,
        });
    }

    fn apply_clipping(&mut self, element: &Element, local: Rect, clip_method: ClipMethod) {
        match clip_method {
            ClipMethod::Scissor => {
                self.entries.push(MeshEntry::command(CommandKind::PushClip));
                self.closing.pop_clip = true;
                self.closing.needs_closing = true;
            }
            ClipMethod::Stencil => {
                let (vertices, indices) = rounded_rect_mesh(
                    local,
                    element.style.radii,
                    Color::WHITE,
                    VertexFlags::STENCIL_MASK,
                );
                self.closing.clip_unregister = Some((vertices.clone(), indices.clone()));
                self.closing.needs_closing = true;
                self.entries.push(MeshEntry {
                    vertices,
                    indices,
                    kind: EntryKind::ClipRegister,
                });
            }
            ClipMethod::Undetermined | ClipMethod::NotClipped | ClipMethod::ShaderDiscard => {}
        }
    }
}

/// Reverse the orientation of every triangle.
pub(crate) fn flip_winding(indices: &mut [u32]) {
    for tri in indices.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
}

pub(crate) fn rect_mesh(rect: Rect, color: Color, flags: VertexFlags) -> (Vec<Vertex>, Vec<u32>) {
    let tint = color.to_array();
    let vertices = rect
        .corners()
        .iter()
        .map(|&(x, y)| Vertex::new(x, y, tint, flags))
        .collect();
    (vertices, vec![0, 1, 2, 0, 2, 3])
}

/// Triangle fan around the center, corners clockwise from the top-left.
pub(crate) fn rounded_rect_mesh(
    rect: Rect,
    radii: CornerRadii,
    color: Color,
    flags: VertexFlags,
) -> (Vec<Vertex>, Vec<u32>) {
    if radii.is_zero() {
        return rect_mesh(rect, color, flags);
    }
    let tint = color.to_array();
    let max_radius = rect.width.min(rect.height) / 2.0;
    let clamp = |r: f32| r.clamp(0.0, max_radius);
    let corners = [
        (rect.x, rect.y, clamp(radii.top_left), 180.0f32),
        (rect.max_x(), rect.y, clamp(radii.top_right), 270.0),
        (rect.max_x(), rect.max_y(), clamp(radii.bottom_right), 0.0),
        (rect.x, rect.max_y(), clamp(radii.bottom_left), 90.0),
    ];

    let center = (rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
    let mut vertices = vec![Vertex::new(center.0, center.1, tint, flags)];
    for (cx, cy, r, start) in corners {
        if r <= 0.0 {
            vertices.push(Vertex::new(cx, cy, tint, flags));
            continue;
        }
        // Arc center sits `r` inside the corner on both axes.
        let ox = if cx > center.0 { cx - r } else { cx + r };
        let oy = if cy > center.1 { cy - r } else { cy + r };
        for step in 0..=CORNER_SEGMENTS {
            let angle = (start + 90.0 * step as f32 / CORNER_SEGMENTS as f32).to_radians();
            vertices.push(Vertex::new(ox + r * angle.cos(), oy + r * angle.sin(), tint, flags));
        }
    }

    let rim = (vertices.len() - 1) as u32;
    let mut indices = Vec::with_capacity(rim as usize * 3);
    for i in 0..rim {
        indices.extend_from_slice(&[0, 1 + i, 1 + (i + 1) % rim]);
    }
    (vertices, indices)
}
