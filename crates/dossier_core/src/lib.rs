//! Core domain logic for the application-dossier canvas.
//! This crate owns canvas ordering, persistence and requirement matching.

pub mod agent;
pub mod config;
pub mod db;
pub mod logging;
pub mod matching;
pub mod model;
pub mod repo;
pub mod requirement;
pub mod service;

pub use agent::http::HttpAgentClient;
pub use agent::{AgentError, AgentResult, MatchEntry, MatchResponse, MatchService, ParseService};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use matching::{MatchOptions, MatchingEngine, Placement, PlacementSource};
pub use model::canvas::{
    CanvasItem, CanvasItemId, CanvasItemValidationError, CanvasModel, CanvasSnapshot,
    CompositionEntry, Rotation,
};
pub use model::material::{Material, MaterialId, MaterialStore};
pub use model::requirement::{Candidate, RequirementItem};
pub use repo::canvas_repo::{
    CanvasRepository, CanvasRow, RepoError, RepoResult, SqliteCanvasRepository,
};
pub use repo::local_store::{LocalStore, SqliteLocalStore};
pub use requirement::parser::{ParseError, ParseSource, ParsedRequirements, RequirementParser};
pub use service::canvas_controller::{
    ArrangeReport, CanvasInteractionController, ControllerError, SwitchError,
};
pub use service::dispatch::{FlushError, SaveDispatcher, SaveStatus};
pub use service::persistence::{LoadSource, PersistenceGateway, SaveOutcome};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
