//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define storage contracts for the remote canvas store and the local
//!   durable fallback.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`Conflict`, `NotFound`) in
//!   addition to transport errors.
//! - Blobs are decoded at the repository boundary.

pub mod canvas_repo;
pub mod local_store;
