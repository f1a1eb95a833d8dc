//! Canvas interaction use-case service.
//!
//! # Responsibility
//! - Translate shell gestures (drop, drag-reorder, rotate, remove, resolve
//!   placeholder) into canvas mutations.
//! - Submit every structural change to the save dispatcher.
//! - Orchestrate text-driven arrangement: parse, match, append.
//! - Guard project switches with a bounded flush.
//!
//! # Invariants
//! - Mutations apply synchronously; persistence is fire-and-forget.
//! - Invalid references (unknown material/item) leave the canvas untouched.
//! - A vetoed switch leaves the canvas and the active project unchanged.
//! - Placeholders only ever transition to resolved items.

use crate::agent::{MatchResponse, MatchService};
use crate::config::CoreConfig;
use crate::matching::{MatchOptions, MatchingEngine, Placement};
use crate::model::canvas::{CanvasItem, CanvasItemId, CanvasModel, CompositionEntry, Rotation};
use crate::model::material::{Material, MaterialId, MaterialStore};
use crate::model::requirement::{Candidate, RequirementItem};
use crate::requirement::parser::{ParseError, ParseSource, RequirementParser};
use crate::service::dispatch::{FlushError, SaveDispatcher, SaveStatus};
use crate::service::persistence::SaveOutcome;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const ROTATION_STEP_DEGREES: i64 = 90;
const DEFAULT_SWITCH_SAVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Rejected gesture. The canvas is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// No canvas item with this instance id.
    UnknownItem(CanvasItemId),
    /// The item exists but is already resolved.
    NotAPlaceholder(CanvasItemId),
    /// No material with this id in the store.
    UnknownMaterial(MaterialId),
}

impl Display for ControllerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownItem(id) => write!(f, "canvas item not found: {id}"),
            Self::NotAPlaceholder(id) => write!(f, "canvas item is not a placeholder: {id}"),
            Self::UnknownMaterial(id) => write!(f, "material not found: {id}"),
        }
    }
}

impl Error for ControllerError {}

/// A project switch that was vetoed because the outgoing canvas did not save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    SaveTimedOut {
        project_id: String,
        timeout: Duration,
    },
    SaveFailed {
        project_id: String,
        message: String,
    },
}

impl SwitchError {
    fn from_flush(project_id: &str, err: FlushError) -> Self {
        let project_id = project_id.to_string();
        match err {
            FlushError::Timeout(timeout) => Self::SaveTimedOut {
                project_id,
                timeout,
            },
            other => Self::SaveFailed {
                project_id,
                message: other.to_string(),
            },
        }
    }
}

impl Display for SwitchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SaveTimedOut {
                project_id,
                timeout,
            } => write!(
                f,
                "canvas of project {project_id} was not saved within {} ms",
                timeout.as_millis()
            ),
            Self::SaveFailed {
                project_id,
                message,
            } => write!(f, "canvas of project {project_id} could not be saved: {message}"),
        }
    }
}

impl Error for SwitchError {}

/// Summary of one `arrange_from_text` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrangeReport {
    pub source: ParseSource,
    pub placed: usize,
    pub placeholders: usize,
    /// Instance ids appended, in requirement order.
    pub item_ids: Vec<CanvasItemId>,
}

/// Stateful controller for the active project's canvas.
pub struct CanvasInteractionController {
    materials: MaterialStore,
    materials_loaded: bool,
    canvas: CanvasModel,
    active_project: Option<String>,
    dispatcher: SaveDispatcher,
    parser: RequirementParser,
    matcher: MatchingEngine,
    match_service: Option<Box<dyn MatchService + Send>>,
    candidates: HashMap<CanvasItemId, Vec<Candidate>>,
    dragged_index: Option<usize>,
    switch_save_timeout: Duration,
}

impl CanvasInteractionController {
    pub fn new(
        dispatcher: SaveDispatcher,
        parser: RequirementParser,
        matcher: MatchingEngine,
    ) -> Self {
        Self {
            materials: MaterialStore::new(),
            materials_loaded: false,
            canvas: CanvasModel::new(),
            active_project: None,
            dispatcher,
            parser,
            matcher,
            match_service: None,
            candidates: HashMap::new(),
            dragged_index: None,
            switch_save_timeout: DEFAULT_SWITCH_SAVE_TIMEOUT,
        }
    }

    /// Builds a controller whose matching knobs and switch timeout come from
    /// `config`.
    pub fn from_config(
        config: &CoreConfig,
        dispatcher: SaveDispatcher,
        parser: RequirementParser,
    ) -> Self {
        Self::new(
            dispatcher,
            parser,
            MatchingEngine::new(MatchOptions::from(config)),
        )
        .with_switch_save_timeout(config.switch_save_timeout())
    }

    pub fn with_match_service(mut self, service: Box<dyn MatchService + Send>) -> Self {
        self.match_service = Some(service);
        self
    }

    pub fn with_switch_save_timeout(mut self, timeout: Duration) -> Self {
        self.switch_save_timeout = timeout;
        self
    }

    pub fn switch_save_timeout(&self) -> Duration {
        self.switch_save_timeout
    }

    pub fn match_options(&self) -> MatchOptions {
        self.matcher.options()
    }

    pub fn materials(&self) -> &MaterialStore {
        &self.materials
    }

    pub fn canvas(&self) -> &CanvasModel {
        &self.canvas
    }

    pub fn active_project(&self) -> Option<&str> {
        self.active_project.as_deref()
    }

    /// Review candidates attached to a placeholder.
    pub fn candidates_for(&self, item_id: &str) -> &[Candidate] {
        self.candidates
            .get(item_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.dispatcher.status()
    }

    pub fn acknowledge_save_status(&self) {
        self.dispatcher.acknowledge_status();
    }

    /// Replaces the material list after a fetch and drops canvas items whose
    /// material disappeared.
    pub fn set_materials(&mut self, materials: Vec<Material>) {
        self.materials.replace_all(materials);
        self.materials_loaded = true;
        self.prune_candidates();
        if self.canvas.retain_resolvable(&self.materials) > 0 {
            self.commit();
        }
    }

    /// Adds a freshly uploaded material to the library.
    ///
    /// Re-uploading an existing id replaces the record; canvas items keep
    /// pointing at it.
    pub fn add_material(&mut self, material: Material) {
        self.materials.insert(material);
    }

    /// Renames a library material. Canvas items reference ids, so nothing on
    /// the canvas changes.
    pub fn rename_material(&mut self, material_id: &str, filename: impl Into<String>) -> bool {
        self.materials.rename(material_id, filename)
    }

    /// Deletes a material and every canvas item referencing it.
    pub fn delete_material(&mut self, material_id: &str) -> Option<Material> {
        let removed = self.materials.remove(material_id)?;
        let purged = self.canvas.purge_references_to(material_id);
        self.prune_candidates();
        info!(
            "event=material_delete module=controller status=ok material_id={material_id} purged={purged}"
        );
        if purged > 0 {
            self.commit();
        }
        Some(removed)
    }

    /// Deletes every material of `category`, cascading to the canvas.
    pub fn delete_category(&mut self, category: &str) -> Vec<MaterialId> {
        let removed = self.materials.remove_category(category);
        let purged = removed
            .iter()
            .map(|material_id| self.canvas.purge_references_to(material_id))
            .sum::<usize>();
        self.prune_candidates();
        if purged > 0 {
            self.commit();
        }
        removed
    }

    /// Drop from the library: appends a resolved item for `material_id`.
    ///
    /// Unknown materials are skipped and `None` is returned.
    pub fn drop_material_on_canvas(&mut self, material_id: &str) -> Option<CanvasItemId> {
        if !self.materials.contains(material_id) {
            debug!("event=canvas_drop module=controller status=skipped material_id={material_id}");
            return None;
        }
        let item = CanvasItem::resolved(material_id);
        let item_id = item.id.clone();
        if !self.canvas.append(item) {
            return None;
        }
        self.commit();
        Some(item_id)
    }

    /// Starts a drag-reorder from `index`.
    pub fn begin_reorder(&mut self, index: usize) -> bool {
        if index >= self.canvas.len() {
            return false;
        }
        self.dragged_index = Some(index);
        true
    }

    /// Live-swap as the dragged item enters `index`.
    ///
    /// Returns whether the canvas changed.
    pub fn drag_over(&mut self, index: usize) -> bool {
        let Some(from) = self.dragged_index else {
            return false;
        };
        match self.canvas.move_item(from, index) {
            Some(to) => {
                self.dragged_index = Some(to);
                self.commit();
                true
            }
            None => false,
        }
    }

    /// Ends a drag-reorder. Performs no mutation.
    pub fn end_reorder(&mut self) {
        self.dragged_index = None;
    }

    pub fn dragged_index(&self) -> Option<usize> {
        self.dragged_index
    }

    /// Resolves a placeholder with a library material dropped onto it.
    pub fn drop_material_on_placeholder(
        &mut self,
        placeholder_id: &str,
        material_id: &str,
    ) -> Result<CanvasItemId, ControllerError> {
        self.resolve_placeholder(placeholder_id, material_id)
    }

    /// Resolves a placeholder with one of its review candidates.
    pub fn accept_candidate(
        &mut self,
        placeholder_id: &str,
        material_id: &str,
    ) -> Result<CanvasItemId, ControllerError> {
        self.resolve_placeholder(placeholder_id, material_id)
    }

    /// Adds a material uploaded for a placeholder and resolves it.
    ///
    /// The material stays in the library even when the placeholder is gone.
    pub fn bind_uploaded_material(
        &mut self,
        placeholder_id: &str,
        material: Material,
    ) -> Result<CanvasItemId, ControllerError> {
        let material_id = material.id.clone();
        self.materials.insert(material);
        self.resolve_placeholder(placeholder_id, &material_id)
    }

    /// Swaps the document in slot `item_id` for another library material.
    ///
    /// Works on resolved items and placeholders alike. The slot keeps its
    /// position and rotation but gets a new instance id.
    pub fn replace_item_material(
        &mut self,
        item_id: &str,
        material_id: &str,
    ) -> Result<CanvasItemId, ControllerError> {
        let current = self
            .canvas
            .get(item_id)
            .ok_or_else(|| ControllerError::UnknownItem(item_id.to_string()))?;
        if !self.materials.contains(material_id) {
            return Err(ControllerError::UnknownMaterial(material_id.to_string()));
        }

        let mut replacement = CanvasItem::resolved(material_id);
        replacement.rotation = current.rotation;
        let new_id = self
            .canvas
            .replace(item_id, replacement)
            .ok_or_else(|| ControllerError::UnknownItem(item_id.to_string()))?;
        self.candidates.remove(item_id);
        self.dragged_index = None;
        debug!(
            "event=canvas_replace module=controller status=ok item_id={item_id} material_id={material_id}"
        );
        self.commit();
        Ok(new_id)
    }

    /// Rotates an item clockwise by 90 degrees.
    pub fn rotate(&mut self, item_id: &str) -> Option<Rotation> {
        self.rotate_by(item_id, ROTATION_STEP_DEGREES)
    }

    pub fn rotate_by(&mut self, item_id: &str, delta_degrees: i64) -> Option<Rotation> {
        let rotation = self.canvas.rotate(item_id, delta_degrees)?;
        self.commit();
        Some(rotation)
    }

    pub fn remove_item(&mut self, item_id: &str) -> Option<CanvasItem> {
        let removed = self.canvas.remove_by_id(item_id)?;
        self.candidates.remove(item_id);
        self.dragged_index = None;
        self.commit();
        Some(removed)
    }

    /// Parses `text`, matches each requirement and appends the results.
    pub fn arrange_from_text(&mut self, text: &str) -> Result<ArrangeReport, ParseError> {
        let parsed = self.parser.parse(text)?;
        let external = self.fetch_external_matches(&parsed.items);
        let placements = self
            .matcher
            .plan(&parsed.items, &self.materials, external.as_ref());

        let mut report = ArrangeReport {
            source: parsed.source,
            placed: 0,
            placeholders: 0,
            item_ids: Vec::with_capacity(placements.len()),
        };
        for placement in placements {
            match placement {
                Placement::Place { material_id, .. } => {
                    let item = CanvasItem::resolved(material_id);
                    report.item_ids.push(item.id.clone());
                    self.canvas.append(item);
                    report.placed += 1;
                }
                Placement::Placeholder { label, candidates } => {
                    let item = CanvasItem::placeholder(label);
                    report.item_ids.push(item.id.clone());
                    if !candidates.is_empty() {
                        self.candidates.insert(item.id.clone(), candidates);
                    }
                    self.canvas.append(item);
                    report.placeholders += 1;
                }
            }
        }

        info!(
            "event=canvas_arrange module=controller status=ok source={:?} placed={} placeholders={}",
            report.source, report.placed, report.placeholders
        );
        if !report.item_ids.is_empty() {
            self.commit();
        }
        Ok(report)
    }

    /// Flushes the active canvas within the switch timeout.
    ///
    /// Returns `Ok(None)` when no project is active.
    pub fn request_save_current(&self) -> Result<Option<SaveOutcome>, FlushError> {
        let Some(project_id) = self.active_project.as_deref() else {
            return Ok(None);
        };
        self.dispatcher
            .flush(project_id, &self.canvas.snapshot(), self.switch_save_timeout)
            .map(Some)
    }

    /// Saves the outgoing canvas, then loads `target`.
    ///
    /// When the outgoing save fails or times out the switch is vetoed.
    pub fn switch_project(&mut self, target: Option<&str>) -> Result<(), SwitchError> {
        if self.active_project.as_deref() == target {
            return Ok(());
        }

        if let Some(current) = self.active_project.as_deref() {
            if let Err(err) =
                self.dispatcher
                    .flush(current, &self.canvas.snapshot(), self.switch_save_timeout)
            {
                warn!(
                    "event=project_switch module=controller status=vetoed project_id={current} error={err}"
                );
                return Err(SwitchError::from_flush(current, err));
            }
        }

        let mut dropped = 0;
        self.canvas = match target {
            Some(project_id) => {
                let mut canvas =
                    CanvasModel::from_snapshot(self.dispatcher.gateway().load(project_id));
                if self.materials_loaded {
                    dropped = canvas.retain_resolvable(&self.materials);
                }
                canvas
            }
            None => CanvasModel::new(),
        };
        self.candidates.clear();
        self.dragged_index = None;
        self.active_project = target.map(str::to_string);
        if dropped > 0 {
            self.commit();
        }
        info!(
            "event=project_switch module=controller status=ok project_id={} items={}",
            target.unwrap_or("-"),
            self.canvas.len()
        );
        Ok(())
    }

    /// Ordered materials and rotations for document composition.
    pub fn composition_plan(&self) -> Vec<CompositionEntry<'_>> {
        self.canvas.composition_plan(&self.materials)
    }

    fn resolve_placeholder(
        &mut self,
        placeholder_id: &str,
        material_id: &str,
    ) -> Result<CanvasItemId, ControllerError> {
        let placeholder = self
            .canvas
            .get(placeholder_id)
            .ok_or_else(|| ControllerError::UnknownItem(placeholder_id.to_string()))?;
        if !placeholder.is_placeholder() {
            return Err(ControllerError::NotAPlaceholder(placeholder_id.to_string()));
        }
        if !self.materials.contains(material_id) {
            return Err(ControllerError::UnknownMaterial(material_id.to_string()));
        }

        let new_id = self
            .canvas
            .replace(placeholder_id, CanvasItem::resolved(material_id))
            .ok_or_else(|| ControllerError::UnknownItem(placeholder_id.to_string()))?;
        self.candidates.remove(placeholder_id);
        self.commit();
        Ok(new_id)
    }

    fn fetch_external_matches(&self, items: &[RequirementItem]) -> Option<MatchResponse> {
        let service = self.match_service.as_ref()?;
        match service.match_items(items, self.materials.as_slice()) {
            Ok(response) => Some(response),
            Err(err) => {
                warn!("event=canvas_arrange module=controller status=fallback error={err}");
                None
            }
        }
    }

    fn prune_candidates(&mut self) {
        let materials = &self.materials;
        for candidates in self.candidates.values_mut() {
            candidates.retain(|candidate| materials.contains(&candidate.material_id));
        }
        self.candidates.retain(|_, candidates| !candidates.is_empty());
    }

    fn commit(&self) {
        match self.active_project.as_deref() {
            Some(project_id) => self.dispatcher.submit(project_id, &self.canvas.snapshot()),
            None => debug!("event=canvas_save module=controller status=skipped reason=no_project"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CanvasInteractionController, ControllerError};
    use crate::db::open_db_in_memory;
    use crate::matching::MatchingEngine;
    use crate::model::canvas::Rotation;
    use crate::model::material::Material;
    use crate::repo::local_store::SqliteLocalStore;
    use crate::requirement::parser::RequirementParser;
    use crate::service::dispatch::SaveDispatcher;
    use crate::service::persistence::PersistenceGateway;
    use std::sync::Arc;

    fn controller() -> CanvasInteractionController {
        controller_with_gateway().0
    }

    fn controller_with_gateway() -> (CanvasInteractionController, Arc<PersistenceGateway>) {
        let local = Arc::new(SqliteLocalStore::new(open_db_in_memory().unwrap()));
        let gateway = Arc::new(PersistenceGateway::new(None, local));
        let mut controller = CanvasInteractionController::new(
            SaveDispatcher::inline(Arc::clone(&gateway)),
            RequirementParser::rules_only(),
            MatchingEngine::default(),
        );
        controller.set_materials(vec![
            Material::new("m1", "本科成绩单.pdf", Some("transcript")),
            Material::new("m2", "cet6.pdf", Some("english")),
            Material::new("m3", "photo.jpg", Some("photo")),
        ]);
        controller.switch_project(Some("p1")).unwrap();
        (controller, gateway)
    }

    fn material_ids(controller: &CanvasInteractionController) -> Vec<String> {
        controller
            .canvas()
            .items()
            .iter()
            .map(|item| item.material_id.clone())
            .collect()
    }

    #[test]
    fn drop_unknown_material_is_skipped() {
        let mut controller = controller();
        assert!(controller.drop_material_on_canvas("nope").is_none());
        assert!(controller.canvas().is_empty());
    }

    #[test]
    fn drag_over_live_swaps_and_end_does_not_mutate() {
        let mut controller = controller();
        for id in ["m1", "m2", "m3"] {
            controller.drop_material_on_canvas(id).unwrap();
        }
        assert!(controller.begin_reorder(0));
        assert!(controller.drag_over(1));
        assert!(controller.drag_over(2));
        assert_eq!(controller.dragged_index(), Some(2));
        assert!(!controller.drag_over(2));
        let before = material_ids(&controller);
        controller.end_reorder();
        assert_eq!(material_ids(&controller), before);
        assert_eq!(before, vec!["m2", "m3", "m1"]);
    }

    #[test]
    fn placeholder_resolution_rejects_bad_references() {
        let mut controller = controller();
        let report = controller.arrange_from_text("1. 推荐信").unwrap();
        let placeholder_id = report.item_ids[0].clone();
        let resolved_id = controller.drop_material_on_canvas("m1").unwrap();

        assert_eq!(
            controller.accept_candidate(&placeholder_id, "ghost"),
            Err(ControllerError::UnknownMaterial("ghost".to_string()))
        );
        assert_eq!(
            controller.accept_candidate(&resolved_id, "m2"),
            Err(ControllerError::NotAPlaceholder(resolved_id.clone()))
        );
        assert_eq!(controller.canvas().placeholder_count(), 1);

        let new_id = controller
            .bind_uploaded_material(
                &placeholder_id,
                Material::new("m4", "推荐信_张老师.pdf", Some("recommendation")),
            )
            .unwrap();
        assert_ne!(new_id, placeholder_id);
        assert_eq!(controller.canvas().placeholder_count(), 0);
        assert_eq!(controller.canvas().position(&new_id), Some(0));
    }

    #[test]
    fn rotate_wraps_after_four_steps() {
        let mut controller = controller();
        let id = controller.drop_material_on_canvas("m3").unwrap();
        for _ in 0..3 {
            controller.rotate(&id);
        }
        assert_eq!(controller.rotate(&id), Some(Rotation::Deg0));
    }

    #[test]
    fn delete_material_cascades_to_canvas() {
        let mut controller = controller();
        controller.drop_material_on_canvas("m1").unwrap();
        controller.drop_material_on_canvas("m2").unwrap();
        controller.drop_material_on_canvas("m1").unwrap();

        assert!(controller.delete_material("m1").is_some());
        assert_eq!(material_ids(&controller), vec!["m2"]);
        assert_eq!(controller.composition_plan().len(), 1);
    }

    #[test]
    fn replace_item_material_keeps_slot_and_retires_old_id() {
        let mut controller = controller();
        controller.drop_material_on_canvas("m1").unwrap();
        let middle = controller.drop_material_on_canvas("m2").unwrap();
        controller.drop_material_on_canvas("m3").unwrap();
        controller.rotate(&middle);

        let new_id = controller.replace_item_material(&middle, "m1").unwrap();
        assert_ne!(new_id, middle);
        assert!(controller.canvas().get(&middle).is_none());
        assert_eq!(controller.canvas().position(&new_id), Some(1));
        assert_eq!(
            controller.canvas().get(&new_id).unwrap().rotation,
            Rotation::Deg90
        );
        assert_eq!(material_ids(&controller), vec!["m1", "m1", "m3"]);

        assert_eq!(
            controller.replace_item_material(&new_id, "ghost"),
            Err(ControllerError::UnknownMaterial("ghost".to_string()))
        );
        assert_eq!(
            controller.replace_item_material(&middle, "m2"),
            Err(ControllerError::UnknownItem(middle.clone()))
        );
    }

    #[test]
    fn replace_item_material_also_resolves_placeholders() {
        let mut controller = controller();
        let report = controller.arrange_from_text("1. 推荐信").unwrap();
        let placeholder_id = report.item_ids[0].clone();

        let new_id = controller
            .replace_item_material(&placeholder_id, "m2")
            .unwrap();
        assert_eq!(controller.canvas().placeholder_count(), 0);
        assert!(controller.candidates_for(&placeholder_id).is_empty());
        assert_eq!(controller.canvas().get(&new_id).unwrap().material_id, "m2");
    }

    #[test]
    fn added_and_renamed_materials_stay_droppable() {
        let mut controller = controller();
        controller.add_material(Material::new("m9", "passport.pdf", Some("identity")));
        let id = controller.drop_material_on_canvas("m9").unwrap();

        assert!(controller.rename_material("m9", "护照首页.pdf"));
        assert!(!controller.rename_material("ghost", "x.pdf"));
        assert_eq!(controller.materials().get("m9").unwrap().filename, "护照首页.pdf");
        assert_eq!(controller.canvas().get(&id).unwrap().material_id, "m9");
        assert_eq!(controller.composition_plan()[0].material.filename, "护照首页.pdf");
    }

    #[test]
    fn switching_back_persists_pruned_canvas() {
        let (mut controller, gateway) = controller_with_gateway();
        controller.drop_material_on_canvas("m1").unwrap();
        controller.drop_material_on_canvas("m2").unwrap();
        controller.switch_project(Some("p2")).unwrap();

        controller.delete_material("m2");
        assert_eq!(gateway.load("p1").len(), 2);

        controller.switch_project(Some("p1")).unwrap();
        assert_eq!(material_ids(&controller), vec!["m1"]);
        let stored = gateway.load("p1");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.items[0].material_id, "m1");
    }
}
