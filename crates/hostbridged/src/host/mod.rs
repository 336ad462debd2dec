//! Demonstration host: an in-memory building model and its commands.
//!
//! [`HostDocument`] stands in for the host application's document. It is only
//! touched from the privileged thread and supports snapshot transactions, so
//! the mutating commands (`create_wall`, `delete_element`) either apply fully
//! or leave the document unchanged.

mod commands;
mod document;


pub use self::commands::{
    CreateWall, CreateWallParams, DeleteElement, ElementIdParams, GetAllLevels, GetElementInfo,
    GetProjectInfo, NoParams, QueryElements, QueryElementsParams, demo_registry,
};
pub use self::document::{
    Category, DocumentError, Element, ElementId, ElementParameter, HostDocument, Level,
    ProjectInfo, StorageType, WallPlacement,
};

/// Maximum number of elements returned by `query_elements`.
pub const MAX_QUERY_RESULTS: usize = 100;

const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");
