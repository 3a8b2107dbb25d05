//! Family use-case services.
//!
//! # Responsibility
//! - Orchestrate directory ingestion and store calls into family use-cases.
//! - Keep callers decoupled from storage details.

pub mod directory;
pub mod family_service;
