//! Requirement extraction from free-form admissions text.
//!
//! # Responsibility
//! - Produce structured requirement items from pasted text.
//! - Prefer the external parse service, fall back to local keyword rules.
//!
//! # Invariants
//! - Output labels never carry a leading ordinal marker.
//! - Rule-based parsing is deterministic for the same input.

pub mod parser;
pub mod rules;
