//! Incremental render chain for retained UI trees.
//!
//! An [`ElementTree`](tree::ElementTree) describes what to draw. The
//! [`RenderChain`](chain::RenderChain) turns it into one linked list of GPU
//! commands and keeps that list up to date from change notifications,
//! touching only what changed. [`Panel`](panel::Panel) pairs the two and is
//! the usual entry point:
//!
//! ```
//! use guido_chain::prelude::*;
//!
//! let mut panel: Panel = Panel::default();
//! let root = panel.root();
//! let card = panel
//!     .add_child(
//!         root,
//!         Element::new()
//!             .with_rect(10.0, 10.0, 120.0, 40.0)
//!             .with_background(Color::rgb(0.2, 0.2, 0.3)),
//!     )
//!     .unwrap();
//! panel.update().unwrap();
//!
//! panel.set_position(card, 20.0, 10.0).unwrap();
//! let report = panel.update().unwrap();
//! assert_eq!(report.stats.nudge_transformed, 1);
//! ```

pub mod chain;
pub mod config;
pub mod element;
pub mod error;
pub mod geometry;
pub mod glyphs;
pub mod gpu;
pub mod panel;
pub mod registry;
pub mod render_stats;
pub mod transform;
pub mod tree;

pub mod prelude {
    pub use crate::chain::{
        ChainMode, ClipMethod, Command, CommandId, CommandKind, DrawRange, RenderChain, StencilOp,
    };
    pub use crate::config::{ChainConfig, SlotTableConfig};
    pub use crate::element::{
        Border, CornerRadii, Display, Element, ElementStyle, Overflow, RenderHints, TextContent,
        TextSettings, Visibility, VisualContent,
    };
    pub use crate::error::{ChainError, Result};
    pub use crate::geometry::{Color, Rect};
    pub use crate::glyphs::{MonospaceText, TextGenerator};
    pub use crate::gpu::{MeshPool, MeshService, SlotAllocator, SlotTable, Vertex};
    pub use crate::panel::Panel;
    pub use crate::registry::{PanelHandle, Renderer};
    pub use crate::render_stats::{ChainStats, FrameReport};
    pub use crate::transform::Transform;
    pub use crate::tree::{ElementId, ElementTree};
}
