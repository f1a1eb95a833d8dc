//! Canvas domain model: ordered document slots for one project.
//!
//! # Responsibility
//! - Define `CanvasItem`, `Rotation` and the persisted `CanvasSnapshot`.
//! - Provide `CanvasModel`, the pure mutation surface used by the controller.
//!
//! # Invariants
//! - Instance ids are unique; every mutation drops later duplicates.
//! - An item is either a placeholder (`missing_label` set) or a reference to
//!   a real material, never both.
//! - Rotation is always one of 0/90/180/270.

use crate::model::material::{Material, MaterialId, MaterialStore};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identifier of one canvas slot, distinct from the referenced material id.
pub type CanvasItemId = String;

/// Prefix of synthetic material ids carried by placeholders.
pub const PLACEHOLDER_PREFIX: &str = "missing-";

/// Quarter-turn page rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Snaps arbitrary degrees to the nearest quarter turn in `[0, 360)`.
    pub fn from_degrees(degrees: i64) -> Self {
        match ((degrees.rem_euclid(360) + 45) / 90) % 4 {
            0 => Self::Deg0,
            1 => Self::Deg90,
            2 => Self::Deg180,
            _ => Self::Deg270,
        }
    }

    pub fn degrees(self) -> i64 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Turns by `delta_degrees`. Any `i64` delta is accepted.
    pub fn rotated_by(self, delta_degrees: i64) -> Self {
        Self::from_degrees(self.degrees() + delta_degrees.rem_euclid(360))
    }
}

impl TryFrom<i64> for Rotation {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value % 90 != 0 {
            return Err(format!("rotation must be a multiple of 90, got {value}"));
        }
        Ok(Self::from_degrees(value))
    }
}

impl From<Rotation> for i64 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// One slot in a project's ordered document sequence.
///
/// Serialized with camelCase keys to stay compatible with stored blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasItem {
    pub id: CanvasItemId,
    pub material_id: MaterialId,
    /// Set iff this item is an unresolved placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_label: Option<String>,
    #[serde(default)]
    pub rotation: Rotation,
}

/// Validation failures for a single canvas item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasItemValidationError {
    EmptyId,
    EmptyMaterialId(CanvasItemId),
    EmptyMissingLabel(CanvasItemId),
}

impl Display for CanvasItemValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "canvas item id cannot be empty"),
            Self::EmptyMaterialId(id) => write!(f, "canvas item `{id}` has no material id"),
            Self::EmptyMissingLabel(id) => {
                write!(f, "placeholder `{id}` has an empty missing label")
            }
        }
    }
}

impl Error for CanvasItemValidationError {}

impl CanvasItem {
    /// Creates a resolved item with a freshly minted instance id.
    pub fn resolved(material_id: impl Into<MaterialId>) -> Self {
        let material_id = material_id.into();
        Self {
            id: mint_instance_id(&material_id),
            material_id,
            missing_label: None,
            rotation: Rotation::Deg0,
        }
    }

    /// Creates a placeholder for an unresolved requirement.
    ///
    /// The synthetic material id doubles as the instance id, so it can never
    /// collide with a real material.
    pub fn placeholder(label: impl Into<String>) -> Self {
        let label = label.into();
        let slug = label.split_whitespace().collect::<Vec<_>>().join("_");
        let id = format!("{PLACEHOLDER_PREFIX}{slug}-{}", Uuid::new_v4().simple());
        Self {
            id: id.clone(),
            material_id: id,
            missing_label: Some(label),
            rotation: Rotation::Deg0,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.missing_label.is_some()
    }

    /// Returns whether this item points at a material present in `store`.
    pub fn resolves_in(&self, store: &MaterialStore) -> bool {
        !self.is_placeholder() && store.contains(&self.material_id)
    }

    pub fn validate(&self) -> Result<(), CanvasItemValidationError> {
        if self.id.trim().is_empty() {
            return Err(CanvasItemValidationError::EmptyId);
        }
        if self.material_id.trim().is_empty() {
            return Err(CanvasItemValidationError::EmptyMaterialId(self.id.clone()));
        }
        if let Some(label) = &self.missing_label {
            if label.trim().is_empty() {
                return Err(CanvasItemValidationError::EmptyMissingLabel(self.id.clone()));
            }
        }
        Ok(())
    }
}

fn mint_instance_id(material_id: &str) -> CanvasItemId {
    format!("{material_id}-{}", Uuid::new_v4().simple())
}

/// Full ordered state of one project's canvas; the unit of persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanvasSnapshot {
    pub items: Vec<CanvasItem>,
}

impl CanvasSnapshot {
    pub fn new(items: Vec<CanvasItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decodes a stored blob. `null` is read as an empty canvas.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let items: Option<Vec<CanvasItem>> = serde_json::from_str(raw)?;
        Ok(Self::new(items.unwrap_or_default()))
    }
}

/// One entry handed to the document composition collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionEntry<'a> {
    pub item_id: &'a str,
    pub material: &'a Material,
    pub rotation: Rotation,
}

/// Ordered, deduplicated canvas for the active project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanvasModel {
    items: Vec<CanvasItem>,
}

impl CanvasModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a model from persisted data.
    ///
    /// Items failing [`CanvasItem::validate`] are dropped, then duplicates.
    pub fn from_snapshot(snapshot: CanvasSnapshot) -> Self {
        let mut items = snapshot.items;
        items.retain(|item| match item.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!("event=canvas_load module=canvas status=item_dropped error={err}");
                false
            }
        });
        let mut model = Self { items };
        model.dedupe();
        model
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot::new(self.items.clone())
    }

    pub fn items(&self) -> &[CanvasItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&CanvasItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends to the end. Returns `false` when the instance id exists.
    pub fn append(&mut self, item: CanvasItem) -> bool {
        if self.get(&item.id).is_some() {
            return false;
        }
        self.items.push(item);
        self.dedupe();
        true
    }

    /// Inserts at `index` (clamped to `[0, len]`).
    pub fn insert_at(&mut self, index: usize, item: CanvasItem) -> bool {
        if self.get(&item.id).is_some() {
            return false;
        }
        let index = index.min(self.items.len());
        self.items.insert(index, item);
        self.dedupe();
        true
    }

    /// Moves the item at `from` to `to` (clamped to `[0, len-1]`).
    ///
    /// Returns the effective target index, or `None` when nothing moved.
    pub fn move_item(&mut self, from: usize, to: usize) -> Option<usize> {
        if from >= self.items.len() {
            return None;
        }
        let to = to.min(self.items.len() - 1);
        if from == to {
            return None;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        self.dedupe();
        Some(to)
    }

    pub fn remove_by_id(&mut self, id: &str) -> Option<CanvasItem> {
        let index = self.position(id)?;
        let removed = self.items.remove(index);
        self.dedupe();
        Some(removed)
    }

    /// Swaps the slot `id` for `new_item`, retiring the old instance id.
    ///
    /// `new_item` always receives a freshly minted instance id so stale drag
    /// handles cannot address the resolved content. Returns the new id.
    pub fn replace(&mut self, id: &str, mut new_item: CanvasItem) -> Option<CanvasItemId> {
        let index = self.position(id)?;
        new_item.id = mint_instance_id(&new_item.material_id);
        let new_id = new_item.id.clone();
        self.items[index] = new_item;
        self.dedupe();
        Some(new_id)
    }

    /// Rotates one item by `delta_degrees`. Returns the resulting rotation.
    pub fn rotate(&mut self, id: &str, delta_degrees: i64) -> Option<Rotation> {
        let item = self.items.iter_mut().find(|item| item.id == id)?;
        item.rotation = item.rotation.rotated_by(delta_degrees);
        let rotation = item.rotation;
        self.dedupe();
        Some(rotation)
    }

    /// Removes every item referencing `material_id`. Returns the count removed.
    pub fn purge_references_to(&mut self, material_id: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.material_id != material_id);
        self.dedupe();
        before - self.items.len()
    }

    /// Drops resolved items whose material is no longer in `store`.
    pub fn retain_resolvable(&mut self, store: &MaterialStore) -> usize {
        let before = self.items.len();
        self.items
            .retain(|item| item.is_placeholder() || store.contains(&item.material_id));
        self.dedupe();
        before - self.items.len()
    }

    /// Ordered `(material, rotation)` list for document composition.
    ///
    /// Placeholders and dangling references are skipped.
    pub fn composition_plan<'a>(&'a self, store: &'a MaterialStore) -> Vec<CompositionEntry<'a>> {
        self.items
            .iter()
            .filter(|item| !item.is_placeholder())
            .filter_map(|item| {
                store.get(&item.material_id).map(|material| CompositionEntry {
                    item_id: item.id.as_str(),
                    material,
                    rotation: item.rotation,
                })
            })
            .collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_placeholder()).count()
    }

    fn dedupe(&mut self) {
        let mut seen = HashSet::with_capacity(self.items.len());
        self.items.retain(|item| seen.insert(item.id.clone()));
    }
}
