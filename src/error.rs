use thiserror::Error;

use crate::registry::PanelHandle;
use crate::tree::ElementId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("{operation} is not allowed while the chain is painting")]
    BlockedDuringPaint { operation: &'static str },
    #[error("Unknown or stale element: {0:?}")]
    UnknownElement(ElementId),
    #[error("Unknown or stale panel: {0:?}")]
    UnknownPanel(PanelHandle),
    #[error("Invalid child index {index} for parent {parent:?}")]
    InvalidChildIndex { parent: ElementId, index: usize },
    #[error("The root of a panel cannot be removed")]
    RootRemoval,
}

pub type Result<T> = std::result::Result<T, ChainError>;
