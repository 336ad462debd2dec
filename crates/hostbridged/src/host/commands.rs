//! Demo host command handlers.

use serde::Deserialize;
use serde_json::{Value, json};

use super::document::{Category, DocumentError, ElementId, HostDocument, WallPlacement};
use super::{HOST_TARGET, MAX_QUERY_RESULTS};
use crate::dispatch::{Command, CommandRegistry, HandlerError};

const DEFAULT_WALL_HEIGHT_MM: f64 = 3000.0;

impl From<DocumentError> for HandlerError {
    fn from(error: DocumentError) -> Self {
        match error {
            DocumentError::ElementNotFound(id) => Self::ElementNotFound { id },
            DocumentError::NoLevel => Self::NoLevel,
            other => Self::rejected(other.to_string()),
        }
    }
}

/// Registry with every demo command.
#[must_use]
pub fn demo_registry() -> CommandRegistry<HostDocument> {
    CommandRegistry::new()
        .with(CreateWall)
        .with(GetProjectInfo)
        .with(QueryElements)
        .with(GetAllLevels)
        .with(GetElementInfo)
        .with(DeleteElement)
}

/// Parameters of commands that take no arguments; extra keys are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct NoParams {}

/// Wall endpoints in millimetres; height defaults to 3000 mm.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWallParams {
    start_x: f64,
    start_y: f64,
    end_x: f64,
    end_y: f64,
    #[serde(default = "default_wall_height")]
    height: f64,
}

const fn default_wall_height() -> f64 {
    DEFAULT_WALL_HEIGHT_MM
}

/// `create_wall`: places a straight wall between two points in millimetres.
#[derive(Debug, Clone, Copy)]
pub struct CreateWall;

impl Command<HostDocument> for CreateWall {
    type Params = CreateWallParams;
    const NAME: &'static str = "create_wall";
    const MUTATES: bool = true;

    fn run(&self, host: &mut HostDocument, params: CreateWallParams) -> Result<Value, HandlerError> {
        let id = host.create_wall(WallPlacement {
            start: (params.start_x, params.start_y),
            end: (params.end_x, params.end_y),
            height_mm: params.height,
        })?;
        Ok(json!({
            "ElementId": id,
            "Message": format!("created wall {id}"),
        }))
    }
}

/// `get_project_info`: returns the project information block.
#[derive(Debug, Clone, Copy)]
pub struct GetProjectInfo;

impl Command<HostDocument> for GetProjectInfo {
    type Params = NoParams;
    const NAME: &'static str = "get_project_info";

    fn run(&self, host: &mut HostDocument, _params: NoParams) -> Result<Value, HandlerError> {
        serde_json::to_value(host.project())
            .map_err(|error| HandlerError::rejected(error.to_string()))
    }
}

/// Optional category filter.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryElementsParams {
    #[serde(default)]
    category: Option<String>,
}

/// `query_elements`: lists elements, optionally filtered by category.
///
/// An unrecognised category applies no filter. At most
/// [`MAX_QUERY_RESULTS`] elements are returned.
#[derive(Debug, Clone, Copy)]
pub struct QueryElements;

impl Command<HostDocument> for QueryElements {
    type Params = QueryElementsParams;
    const NAME: &'static str = "query_elements";

    fn run(
        &self,
        host: &mut HostDocument,
        params: QueryElementsParams,
    ) -> Result<Value, HandlerError> {
        let requested = params.category.filter(|name| !name.trim().is_empty());
        let category = requested.as_deref().and_then(Category::parse);
        if let (Some(name), None) = (&requested, category) {
            tracing::debug!(target: HOST_TARGET, category = %name, "unknown category ignored");
        }

        let elements: Vec<Value> = host
            .elements(category)
            .take(MAX_QUERY_RESULTS)
            .map(|element| {
                json!({
                    "ElementId": element.id,
                    "Name": element.name,
                    "Category": element.category.as_str(),
                    "LevelName": element
                        .level
                        .and_then(|level| host.level(level))
                        .map(|level| level.name.as_str()),
                })
            })
            .collect();
        Ok(json!({ "Count": elements.len(), "Elements": elements }))
    }
}

/// `get_all_levels`: lists levels by ascending elevation, in millimetres.
#[derive(Debug, Clone, Copy)]
pub struct GetAllLevels;

impl Command<HostDocument> for GetAllLevels {
    type Params = NoParams;
    const NAME: &'static str = "get_all_levels";

    fn run(&self, host: &mut HostDocument, _params: NoParams) -> Result<Value, HandlerError> {
        let levels: Vec<Value> = host
            .levels_by_elevation()
            .into_iter()
            .map(|level| {
                json!({
                    "ElementId": level.id,
                    "Name": level.name,
                    "Elevation": round_to_hundredths(level.elevation_mm),
                })
            })
            .collect();
        Ok(json!({ "Count": levels.len(), "Levels": levels }))
    }
}

/// Target element of a single-element command.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementIdParams {
    element_id: ElementId,
}

/// `get_element_info`: describes one element and its parameters.
#[derive(Debug, Clone, Copy)]
pub struct GetElementInfo;

impl Command<HostDocument> for GetElementInfo {
    type Params = ElementIdParams;
    const NAME: &'static str = "get_element_info";

    fn run(&self, host: &mut HostDocument, params: ElementIdParams) -> Result<Value, HandlerError> {
        let element = host
            .element(params.element_id)
            .ok_or(HandlerError::ElementNotFound {
                id: params.element_id,
            })?;
        let level = element
            .level
            .and_then(|level| host.level(level))
            .map(|level| level.name.as_str());
        Ok(json!({
            "ElementId": element.id,
            "Name": element.name,
            "Category": element.category.as_str(),
            "Type": element.type_name,
            "Level": level,
            "Parameters": element.parameters,
        }))
    }
}

/// `delete_element`: removes one element.
#[derive(Debug, Clone, Copy)]
pub struct DeleteElement;

impl Command<HostDocument> for DeleteElement {
    type Params = ElementIdParams;
    const NAME: &'static str = "delete_element";
    const MUTATES: bool = true;

    fn run(&self, host: &mut HostDocument, params: ElementIdParams) -> Result<Value, HandlerError> {
        host.delete_element(params.element_id)?;
        Ok(json!({ "Message": format!("deleted element {}", params.element_id) }))
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
