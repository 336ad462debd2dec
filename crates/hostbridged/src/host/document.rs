//! In-memory building model used as the demonstration host.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::HOST_TARGET;
use crate::dispatch::{TransactionError, Transactional};

/// Host element identifier.
pub type ElementId = i64;

const FIRST_ALLOCATED_ID: ElementId = 400_000;

/// Element categories known to the demo host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Walls.
    Walls,
    /// Doors.
    Doors,
    /// Windows.
    Windows,
    /// Floors.
    Floors,
    /// Structural and architectural columns.
    Columns,
    /// Rooms.
    Rooms,
}

impl Category {
    const ALL: [Self; 6] = [
        Self::Walls,
        Self::Doors,
        Self::Windows,
        Self::Floors,
        Self::Columns,
        Self::Rooms,
    ];

    /// Display name, as reported in element summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Walls => "Walls",
            Self::Doors => "Doors",
            Self::Windows => "Windows",
            Self::Floors => "Floors",
            Self::Columns => "Columns",
            Self::Rooms => "Rooms",
        }
    }

    /// Parses a category name ignoring ASCII case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Storage class of an element parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageType {
    /// Floating-point measurement.
    Double,
    /// Whole number.
    Integer,
    /// Free text.
    String,
    /// Reference to another element.
    ElementId,
}

/// A named, formatted element parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ElementParameter {
    /// Parameter name.
    pub name: String,
    /// Display value.
    pub value: String,
    /// Storage class.
    #[serde(rename = "Type")]
    pub storage: StorageType,
}

impl ElementParameter {
    /// Builds a parameter.
    pub fn new(name: impl Into<String>, value: impl Into<String>, storage: StorageType) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            storage,
        }
    }

    fn length(name: &str, millimetres: f64) -> Self {
        Self::new(name, format_millimetres(millimetres), StorageType::Double)
    }
}

/// A building level.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Identifier.
    pub id: ElementId,
    /// Level name.
    pub name: String,
    /// Elevation above project zero, in millimetres.
    pub elevation_mm: f64,
}

/// A placed model element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Identifier.
    pub id: ElementId,
    /// Instance name.
    pub name: String,
    /// Category.
    pub category: Category,
    /// Type name.
    pub type_name: String,
    /// Hosting level, when the element has one.
    pub level: Option<ElementId>,
    /// Instance parameters.
    pub parameters: Vec<ElementParameter>,
}

/// Project information block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectInfo {
    /// Document title.
    pub project_name: String,
    /// Building name.
    pub building_name: String,
    /// Owning organisation.
    pub organization_name: String,
    /// Author.
    pub author: String,
    /// Site address.
    pub address: String,
    /// Client.
    pub client_name: String,
    /// Project number.
    pub project_number: String,
    /// Project status.
    pub project_status: String,
}

/// Straight wall placement request, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallPlacement {
    /// Start point.
    pub start: (f64, f64),
    /// End point.
    pub end: (f64, f64),
    /// Unconnected height.
    pub height_mm: f64,
}

impl WallPlacement {
    /// Horizontal length of the wall.
    #[must_use]
    pub fn length_mm(&self) -> f64 {
        (self.end.0 - self.start.0).hypot(self.end.1 - self.start.1)
    }
}

/// Document state that a transaction can restore.
#[derive(Debug, Clone)]
struct Snapshot {
    elements: BTreeMap<ElementId, Element>,
    next_id: ElementId,
}

#[derive(Debug)]
struct OpenTransaction {
    label: String,
    snapshot: Snapshot,
}

/// In-memory document mutated only from the privileged thread.
///
/// Mutations outside a transaction are refused, so every change is made
/// through [`Transactional::begin`] and becomes visible in
/// [`HostDocument::history`] once committed.
#[derive(Debug)]
pub struct HostDocument {
    project: ProjectInfo,
    levels: BTreeMap<ElementId, Level>,
    elements: BTreeMap<ElementId, Element>,
    next_id: ElementId,
    open: Option<OpenTransaction>,
    history: Vec<String>,
    read_only: bool,
}

impl HostDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new(project: ProjectInfo) -> Self {
        Self {
            project,
            levels: BTreeMap::new(),
            elements: BTreeMap::new(),
            next_id: FIRST_ALLOCATED_ID,
            open: None,
            history: Vec::new(),
            read_only: false,
        }
    }

    /// Small office building with four levels and a handful of elements.
    #[must_use]
    pub fn sample() -> Self {
        let mut document = Self::new(ProjectInfo {
            project_name: "Riverside Office".to_owned(),
            building_name: "Block A".to_owned(),
            organization_name: "Northbank Architects".to_owned(),
            author: "J. Okafor".to_owned(),
            address: "12 Quay Street".to_owned(),
            client_name: "Riverside Holdings".to_owned(),
            project_number: "2024-017".to_owned(),
            project_status: "Design Development".to_owned(),
        });
        document.add_level(311, "Level 1", 0.0);
        document.add_level(9946, "Level 2", 4000.0);
        document.add_level(12001, "Roof", 8000.0);
        document.add_level(13050, "Basement", -3000.0);

        document.insert_element(Element {
            id: 320_101,
            name: "Basic Wall".to_owned(),
            category: Category::Walls,
            type_name: "Generic - 200mm".to_owned(),
            level: Some(311),
            parameters: wall_parameters("Level 1", 6000.0, 4000.0),
        });
        document.insert_element(Element {
            id: 320_102,
            name: "Basic Wall".to_owned(),
            category: Category::Walls,
            type_name: "Exterior - Brick on CMU".to_owned(),
            level: Some(311),
            parameters: wall_parameters("Level 1", 9000.0, 4000.0),
        });
        document.insert_element(Element {
            id: 320_240,
            name: "Single-Flush".to_owned(),
            category: Category::Doors,
            type_name: "0915 x 2134mm".to_owned(),
            level: Some(311),
            parameters: vec![
                ElementParameter::new("Mark", "D01", StorageType::String),
                ElementParameter::new("Host Id", "320101", StorageType::ElementId),
            ],
        });
        document.insert_element(Element {
            id: 320_310,
            name: "Fixed".to_owned(),
            category: Category::Windows,
            type_name: "1200 x 1500mm".to_owned(),
            level: Some(9946),
            parameters: vec![ElementParameter::length("Sill Height", 900.0)],
        });
        document.insert_element(Element {
            id: 320_400,
            name: "Lobby".to_owned(),
            category: Category::Rooms,
            type_name: "Room".to_owned(),
            level: Some(311),
            parameters: vec![ElementParameter::new("Number", "101", StorageType::String)],
        });
        document
    }

    /// Adds a level outside any transaction; used while seeding documents.
    pub fn add_level(&mut self, id: ElementId, name: impl Into<String>, elevation_mm: f64) {
        self.levels.insert(
            id,
            Level {
                id,
                name: name.into(),
                elevation_mm,
            },
        );
        self.bump_next_id(id);
    }

    /// Adds an element outside any transaction; used while seeding documents.
    pub fn insert_element(&mut self, element: Element) {
        self.bump_next_id(element.id);
        self.elements.insert(element.id, element);
    }

    /// Project information block.
    #[must_use]
    pub const fn project(&self) -> &ProjectInfo {
        &self.project
    }

    /// Levels ordered by ascending elevation.
    #[must_use]
    pub fn levels_by_elevation(&self) -> Vec<&Level> {
        let mut levels: Vec<&Level> = self.levels.values().collect();
        levels.sort_by(|left, right| left.elevation_mm.total_cmp(&right.elevation_mm));
        levels
    }

    /// Looks up a level.
    #[must_use]
    pub fn level(&self, id: ElementId) -> Option<&Level> {
        self.levels.get(&id)
    }

    /// Looks up an element.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Elements in identifier order, optionally restricted to a category.
    pub fn elements(&self, category: Option<Category>) -> impl Iterator<Item = &Element> {
        self.elements
            .values()
            .filter(move |element| category.is_none_or(|wanted| element.category == wanted))
    }

    /// Labels of committed transactions, oldest first.
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Returns `true` while a transaction is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.open.is_some()
    }

    /// Makes every subsequent commit fail, as a locked document would.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Places a wall on the lowest level.
    ///
    /// # Errors
    ///
    /// Fails outside a transaction, when the document has no levels, or when
    /// the placement is degenerate.
    pub fn create_wall(&mut self, placement: WallPlacement) -> Result<ElementId, DocumentError> {
        self.require_transaction()?;
        if !(placement.height_mm.is_finite() && placement.height_mm > 0.0) {
            return Err(DocumentError::InvalidGeometry(
                "wall height must be positive",
            ));
        }
        let length = placement.length_mm();
        if !length.is_finite() || length < 1.0 {
            return Err(DocumentError::InvalidGeometry(
                "wall start and end points coincide",
            ));
        }
        let (level_id, level_name) = self
            .levels_by_elevation()
            .first()
            .map(|level| (level.id, level.name.clone()))
            .ok_or(DocumentError::NoLevel)?;

        let id = self.next_id;
        self.next_id += 1;
        self.elements.insert(
            id,
            Element {
                id,
                name: "Basic Wall".to_owned(),
                category: Category::Walls,
                type_name: "Generic - 200mm".to_owned(),
                level: Some(level_id),
                parameters: wall_parameters(&level_name, length, placement.height_mm),
            },
        );
        debug!(target: HOST_TARGET, element_id = id, "wall created");
        Ok(id)
    }

    /// Removes an element.
    ///
    /// # Errors
    ///
    /// Fails outside a transaction or when the element does not exist.
    pub fn delete_element(&mut self, id: ElementId) -> Result<Element, DocumentError> {
        self.require_transaction()?;
        let removed = self
            .elements
            .remove(&id)
            .ok_or(DocumentError::ElementNotFound(id))?;
        debug!(target: HOST_TARGET, element_id = id, "element deleted");
        Ok(removed)
    }

    fn require_transaction(&self) -> Result<(), DocumentError> {
        if self.open.is_some() {
            Ok(())
        } else {
            Err(DocumentError::NoTransaction)
        }
    }

    fn bump_next_id(&mut self, id: ElementId) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }
}

impl Transactional for HostDocument {
    fn begin(&mut self, label: &str) -> Result<(), TransactionError> {
        if let Some(open) = &self.open {
            return Err(TransactionError::AlreadyOpen {
                open: open.label.clone(),
            });
        }
        self.open = Some(OpenTransaction {
            label: label.to_owned(),
            snapshot: Snapshot {
                elements: self.elements.clone(),
                next_id: self.next_id,
            },
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), TransactionError> {
        let Some(open) = &self.open else {
            return Err(TransactionError::NotOpen);
        };
        if self.read_only {
            return Err(TransactionError::CommitRejected {
                label: open.label.clone(),
                reason: "document is read-only".to_owned(),
            });
        }
        if let Some(open) = self.open.take() {
            debug!(target: HOST_TARGET, transaction = %open.label, "transaction committed");
            self.history.push(open.label);
        }
        Ok(())
    }

    fn rollback(&mut self) {
        if let Some(open) = self.open.take() {
            self.elements = open.snapshot.elements;
            self.next_id = open.snapshot.next_id;
            debug!(target: HOST_TARGET, transaction = %open.label, "transaction rolled back");
        }
    }
}

/// Failures raised by document mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    /// The element does not exist.
    #[error("element {0} not found")]
    ElementNotFound(ElementId),
    /// No level exists to host new elements.
    #[error("no level available")]
    NoLevel,
    /// A mutation was attempted outside a transaction.
    #[error("document modification requires an open transaction")]
    NoTransaction,
    /// The requested geometry cannot be built.
    #[error("{0}")]
    InvalidGeometry(&'static str),
}

fn wall_parameters(level_name: &str, length_mm: f64, height_mm: f64) -> Vec<ElementParameter> {
    vec![
        ElementParameter::new("Base Constraint", level_name, StorageType::ElementId),
        ElementParameter::length("Length", length_mm),
        ElementParameter::length("Unconnected Height", height_mm),
    ]
}

fn format_millimetres(value: f64) -> String {
    format!("{value:.0} mm")
}
