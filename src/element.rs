//! Elements as the render chain sees them: resolved style, layout rectangle,
//! local transform, rendering hints and content.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::chain::MeshGenerationContext;
use crate::geometry::{Color, Rect};
use crate::transform::Transform;

bitflags! {
    /// Rendering hints, fixed for the lifetime of an element.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RenderHints: u8 {
        /// Descendants are drawn relative to this element and a view matrix is pushed.
        const GROUP_TRANSFORM    = 0b001;
        /// The element owns a GPU transform slot its subtree follows.
        const BONE_TRANSFORM     = 0b010;
        /// Prefer scissor rectangles over shader clipping.
        const CLIP_WITH_SCISSORS = 0b100;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Display {
    #[default]
    Flex,
    None,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CornerRadii {
    pub top_left: f32,
    pub top_right: f32,
    pub bottom_right: f32,
    pub bottom_left: f32,
}

impl CornerRadii {
    pub fn uniform(radius: f32) -> Self {
        Self {
            top_left: radius,
            top_right: radius,
            bottom_right: radius,
            bottom_left: radius,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.top_left <= 0.0
            && self.top_right <= 0.0
            && self.bottom_right <= 0.0
            && self.bottom_left <= 0.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Border {
    pub width: f32,
    pub color: Color,
}

/// Resolved style values consumed by the chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementStyle {
    pub opacity: f32,
    pub display: Display,
    pub visibility: Visibility,
    pub overflow: Overflow,
    pub radii: CornerRadii,
    pub background: Option<Color>,
    pub border: Option<Border>,
    /// Render the subtree into an offscreen target and blit it back.
    pub render_target: bool,
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            display: Display::Flex,
            visibility: Visibility::Visible,
            overflow: Overflow::Visible,
            radii: CornerRadii::default(),
            background: None,
            border: None,
            render_target: false,
        }
    }
}

/// Outline and underlay parameters uploaded to a text-settings slot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextSettings {
    pub outline_width: f32,
    pub outline_color: Color,
    pub underlay_offset: (f32, f32),
    pub underlay_softness: f32,
    pub underlay_color: Color,
}

impl TextSettings {
    /// Whether the settings need a dedicated slot.
    pub fn needs_slot(&self) -> bool {
        self.outline_width != 0.0
            || self.underlay_offset != (0.0, 0.0)
            || self.underlay_softness != 0.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextContent {
    pub text: String,
    pub font_size: f32,
    pub color: Color,
    pub settings: TextSettings,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: 14.0,
            color: Color::BLACK,
            settings: TextSettings::default(),
        }
    }
}

/// Custom geometry produced while an element is painted.
pub trait VisualContent {
    fn generate(&self, ctx: &mut MeshGenerationContext<'_>);
}

/// An element of the retained tree.
#[derive(Clone)]
pub struct Element {
    pub style: ElementStyle,
    pub hints: RenderHints,
    /// Position relative to the parent and size.
    pub rect: Rect,
    /// Applied after the position offset.
    pub transform: Transform,
    pub text: Option<TextContent>,
    pub content: Option<Rc<dyn VisualContent>>,
}

impl Element {
    pub fn new() -> Self {
        Self {
            style: ElementStyle::default(),
            hints: RenderHints::empty(),
            rect: Rect::default(),
            transform: Transform::IDENTITY,
            text: None,
            content: None,
        }
    }

    pub fn with_rect(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.rect = Rect::new(x, y, width, height);
        self
    }

    pub fn with_hints(mut self, hints: RenderHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_style(mut self, style: ElementStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_background(mut self, color: Color) -> Self {
        self.style.background = Some(color);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.style.opacity = opacity;
        self
    }

    pub fn with_overflow_hidden(mut self) -> Self {
        self.style.overflow = Overflow::Hidden;
        self
    }

    pub fn with_radii(mut self, radii: CornerRadii) -> Self {
        self.style.radii = radii;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_text(mut self, text: TextContent) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_content(mut self, content: Rc<dyn VisualContent>) -> Self {
        self.content = Some(content);
        self
    }

    /// Whether the element asks for its content to be clipped.
    pub fn should_clip(&self) -> bool {
        self.style.overflow == Overflow::Hidden
    }

    /// A clip is rectangular unless any corner is rounded.
    pub fn has_rounded_clip(&self) -> bool {
        !self.style.radii.is_zero()
    }

    pub fn is_display_none(&self) -> bool {
        self.style.display == Display::None
    }

    pub fn is_group_transform(&self) -> bool {
        self.hints.contains(RenderHints::GROUP_TRANSFORM)
    }

    /// Bone slots are only owned by non-group elements.
    pub fn wants_bone_slot(&self) -> bool {
        self.hints.contains(RenderHints::BONE_TRANSFORM) && !self.is_group_transform()
    }
}

impl Default for Element {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("style", &self.style)
            .field("hints", &self.hints)
            .field("rect", &self.rect)
            .field("text", &self.text)
            .field("has_content", &self.content.is_some())
            .finish()
    }
}
