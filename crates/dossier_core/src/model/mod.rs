//! Domain model for materials, canvases and requirement matching.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep canvas mutations pure so persistence stays a separate concern.
//!
//! # Invariants
//! - Canvas items reference materials by id and never own them.
//! - Requirement items and candidates are never persisted.

pub mod canvas;
pub mod material;
pub mod requirement;
