use dossier_core::db::open_db_in_memory;
use dossier_core::{
    AgentError, AgentResult, CanvasInteractionController, Candidate, CoreConfig, MatchEntry,
    MatchResponse,
    MatchService, Material, MatchingEngine, ParseError, ParseSource, PersistenceGateway,
    RequirementItem, RequirementParser, SaveDispatcher, SqliteLocalStore,
};
use std::sync::Arc;
use std::time::Duration;

struct FixedMatches(AgentResult<MatchResponse>);

impl MatchService for FixedMatches {
    fn match_items(
        &self,
        _items: &[RequirementItem],
        _materials: &[Material],
    ) -> AgentResult<MatchResponse> {
        self.0.clone()
    }
}

fn library() -> Vec<Material> {
    vec![
        Material::new("m-transcript", "本科成绩单_盖章.pdf", Some("transcript")),
        Material::new("m-cet", "cet6_report.pdf", Some("english")).with_tags(["六级"]),
        Material::new("m-award", "国奖证书.jpg", Some("certificate")),
    ]
}

fn controller() -> CanvasInteractionController {
    let local = Arc::new(SqliteLocalStore::new(open_db_in_memory().unwrap()));
    let gateway = Arc::new(PersistenceGateway::new(None, local));
    let mut controller = CanvasInteractionController::new(
        SaveDispatcher::inline(gateway),
        RequirementParser::rules_only(),
        MatchingEngine::default(),
    );
    controller.set_materials(library());
    controller.switch_project(Some("p1")).unwrap();
    controller
}

fn placed_materials(controller: &CanvasInteractionController) -> Vec<String> {
    controller
        .canvas()
        .items()
        .iter()
        .map(|item| item.material_id.clone())
        .collect()
}

#[test]
fn numbered_requirements_place_transcript_then_english() {
    let mut controller = controller();
    let report = controller
        .arrange_from_text("1. 本科成绩单（需盖章）\n2. 英语六级成绩单")
        .unwrap();

    assert_eq!(report.source, ParseSource::Rules);
    assert_eq!(report.placed, 2);
    assert_eq!(report.placeholders, 0);
    assert_eq!(placed_materials(&controller), vec!["m-transcript", "m-cet"]);
}

#[test]
fn unmatched_requirement_becomes_placeholder_with_label() {
    let mut controller = controller();
    let report = controller.arrange_from_text("(1) 推荐信\n(2) 获奖证书").unwrap();

    assert_eq!(report.placeholders, 1);
    let placeholder = controller.canvas().get(&report.item_ids[0]).unwrap();
    assert_eq!(placeholder.missing_label.as_deref(), Some("推荐信"));
    assert!(controller.candidates_for(&placeholder.id).is_empty());
    assert_eq!(controller.canvas().items()[1].material_id, "m-award");
}

#[test]
fn external_suggestion_overrides_local_best() {
    let response = MatchResponse {
        matches: vec![MatchEntry {
            item_label: None,
            candidates: vec![Candidate::new("m-award", 0.7)],
        }],
    };
    let mut controller =
        controller().with_match_service(Box::new(FixedMatches(Ok(response))));
    controller.arrange_from_text("1. 本科成绩单").unwrap();
    assert_eq!(placed_materials(&controller), vec!["m-award"]);
}

#[test]
fn failing_match_service_is_treated_as_no_suggestions() {
    let mut controller = controller()
        .with_match_service(Box::new(FixedMatches(Err(AgentError::Status(500)))));
    let report = controller.arrange_from_text("1. 本科成绩单").unwrap();
    assert_eq!(report.placed, 1);
    assert_eq!(placed_materials(&controller), vec!["m-transcript"]);
}

#[test]
fn external_candidates_attach_to_placeholder_and_can_be_accepted() {
    let response = MatchResponse {
        matches: vec![MatchEntry {
            item_label: Some("推荐信".to_string()),
            candidates: vec![
                Candidate::new("gone", 0.9),
                Candidate::new("m-award", 0.2),
            ],
        }],
    };
    let mut controller = controller().with_match_service(Box::new(FixedMatches(Ok(response))));
    let report = controller.arrange_from_text("1. 推荐信").unwrap();
    let placeholder_id = report.item_ids[0].clone();

    assert_eq!(
        controller.candidates_for(&placeholder_id),
        &[Candidate::new("m-award", 0.2)]
    );

    let resolved = controller
        .accept_candidate(&placeholder_id, "m-award")
        .unwrap();
    assert!(controller.candidates_for(&placeholder_id).is_empty());
    assert!(!controller.canvas().get(&resolved).unwrap().is_placeholder());
    assert!(controller.canvas().get(&placeholder_id).is_none());
}

#[test]
fn empty_and_unrecognized_text_leave_canvas_untouched() {
    let mut controller = controller();
    assert_eq!(
        controller.arrange_from_text("   ").unwrap_err(),
        ParseError::EmptyInput
    );
    assert_eq!(
        controller.arrange_from_text("good luck").unwrap_err(),
        ParseError::NothingRecognized
    );
    assert!(controller.canvas().is_empty());
}

#[test]
fn canvas_stays_exclusive_after_cascading_deletes() {
    let mut controller = controller();
    controller
        .arrange_from_text("1. 本科成绩单\n2. 推荐信\n3. 英语六级")
        .unwrap();
    controller.drop_material_on_canvas("m-transcript").unwrap();

    controller.delete_material("m-transcript");
    controller.delete_category("english");

    let store = controller.materials();
    for item in controller.canvas().items() {
        assert!(item.is_placeholder() != item.resolves_in(store));
    }
    assert_eq!(controller.canvas().len(), 1);
    assert!(controller.composition_plan().is_empty());
}

#[test]
fn configured_thresholds_and_timeout_reach_the_controller() {
    let config = CoreConfig::from_json_str(
        r#"{"candidate_limit": 1, "min_auto_place_score": 100, "switch_save_timeout_ms": 750}"#,
    )
    .unwrap();
    let local = Arc::new(SqliteLocalStore::new(open_db_in_memory().unwrap()));
    let gateway = Arc::new(PersistenceGateway::new(None, local));
    let mut controller = CanvasInteractionController::from_config(
        &config,
        SaveDispatcher::inline(gateway),
        RequirementParser::rules_only(),
    );
    assert_eq!(controller.switch_save_timeout(), Duration::from_millis(750));
    assert_eq!(controller.match_options().candidate_limit, 1);

    let mut materials = library();
    materials.push(Material::new("m-transcript-2", "成绩单_英文.pdf", Some("transcript")));
    controller.set_materials(materials);
    controller.switch_project(Some("p1")).unwrap();

    let report = controller.arrange_from_text("1. 本科成绩单").unwrap();
    assert_eq!(report.placed, 0);
    assert_eq!(report.placeholders, 1);
    let candidates = controller.candidates_for(&report.item_ids[0]);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].material_id, "m-transcript");
}
