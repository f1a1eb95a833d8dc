//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate canvas persistence, background saves and user gestures
//!   into use-case level APIs.
//! - Keep the shell decoupled from storage and service details.

pub mod canvas_controller;
pub mod dispatch;
pub mod persistence;
