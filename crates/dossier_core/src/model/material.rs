//! Material domain model and the per-user material store.
//!
//! # Responsibility
//! - Define the uploaded-file record referenced by canvas items.
//! - Hold the active user's material list with lookup and category helpers.
//!
//! # Invariants
//! - Material ids are unique inside one `MaterialStore`.
//! - Insertion order is preserved (remote fetch order, newest first).

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned by the upload collaborator.
pub type MaterialId = String;

/// Category used when a material has no category set.
pub const DEFAULT_CATEGORY: &str = "other";

/// One uploaded file as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub filename: String,
    /// Free-text or enumerated category token (`transcript`, `english`, ...).
    #[serde(default)]
    pub category: Option<String>,
    /// MIME-like file type, e.g. `application/pdf` or `image/png`.
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Material {
    pub fn new(
        id: impl Into<MaterialId>,
        filename: impl Into<String>,
        category: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            category: category.map(str::to_string),
            file_type: String::new(),
            tags: Vec::new(),
        }
    }

    /// Builder-style helper for tests and import paths.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Category with the library default applied.
    pub fn category_or_default(&self) -> &str {
        self.category
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }
}

/// In-memory list of the active user's materials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialStore {
    materials: Vec<Material>,
}

impl MaterialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a fetched list, dropping later duplicate ids.
    pub fn from_materials(materials: Vec<Material>) -> Self {
        let mut store = Self::new();
        store.replace_all(materials);
        store
    }

    /// Replaces the whole list, e.g. after a remote fetch or user switch.
    pub fn replace_all(&mut self, materials: Vec<Material>) {
        self.materials.clear();
        for material in materials {
            if !self.contains(&material.id) {
                self.materials.push(material);
            }
        }
    }

    /// Inserts a newly uploaded material, replacing a record with the same id.
    pub fn insert(&mut self, material: Material) {
        match self.materials.iter_mut().find(|m| m.id == material.id) {
            Some(existing) => *existing = material,
            None => self.materials.push(material),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Material> {
        let index = self.materials.iter().position(|m| m.id == id)?;
        Some(self.materials.remove(index))
    }

    /// Renames one material. Returns `false` when the id is unknown.
    pub fn rename(&mut self, id: &str, filename: impl Into<String>) -> bool {
        match self.materials.iter_mut().find(|m| m.id == id) {
            Some(material) => {
                material.filename = filename.into();
                true
            }
            None => false,
        }
    }

    /// Moves every material of category `from` into `to`.
    ///
    /// Returns the number of materials touched.
    pub fn rename_category(&mut self, from: &str, to: &str) -> usize {
        let mut changed = 0;
        for material in &mut self.materials {
            if material.category_or_default() == from {
                material.category = Some(to.to_string());
                changed += 1;
            }
        }
        changed
    }

    /// Removes every material in `category` and returns the removed ids.
    pub fn remove_category(&mut self, category: &str) -> Vec<MaterialId> {
        let mut removed = Vec::new();
        self.materials.retain(|material| {
            if material.category_or_default() == category {
                removed.push(material.id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn get(&self, id: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    pub fn as_slice(&self) -> &[Material] {
        &self.materials
    }

    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Material> {
        self.materials
            .iter()
            .filter(move |m| m.category_or_default() == category)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
