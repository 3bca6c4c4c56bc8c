//! Core types and shared functionality for the catalogue server.
//!
//! This crate provides:
//! - The on-disk catalogue copy and its in-memory snapshot
//! - The update cycle that keeps the copy in sync with upstream
//! - Conditional GET decisions for serving the copy
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod serving;
pub mod source;
pub mod updater;

pub use cache::{CatalogueCache, CatalogueMetadata, CatalogueSnapshot, CatalogueStore};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use serving::{RequestValidators, ServingDecision, ServingPolicy};
pub use source::{CatalogueSource, Clock, FetchError, FetchOutcome, SystemClock};
pub use updater::{CycleOutcome, UpdateCoordinator};
