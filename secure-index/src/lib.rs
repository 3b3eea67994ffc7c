//! Verified downloads from package indexes backed by trust metadata.
//!
//! This crate is the orchestration layer between an installer and a trust
//! engine. It decides when trust metadata must be refreshed, maps project
//! names and distribution links to verifiable target names, keeps the
//! per-index mirror configuration, and refuses to let a known-secure index
//! fall back to unverified downloads.
//!
//! The trust protocol itself is consumed through the [`trust::TrustEngine`]
//! trait and the network through [`fetcher::Fetcher`], so both can be
//! replaced by deterministic fakes in tests.
//!
//! # Modules
//!
//! - [`bootstrap`] - Seeding the data directory with shipped root metadata
//! - [`config`] - Manager configuration and TOML loading
//! - [`distribution`] - Content-hash path parsing for distribution links
//! - [`error`] - Semantic error types and their classification
//! - [`fetcher`] - Streaming HTTP fetcher consumed by the trust engine
//! - [`index_url`] - Canonical index URLs and project URL splitting
//! - [`manager`] - Index URL to repository mapping
//! - [`mirror`] - Mirror configuration and the append-only mirror registry
//! - [`progress`] - Progress reporting for artefact bodies
//! - [`repository`] - One index's refresh and download orchestration
//! - [`trust`] - Trust engine capability and target naming

pub mod bootstrap;
pub mod config;
pub mod distribution;
pub mod error;
pub mod fetcher;
pub mod index_url;
pub mod manager;
pub mod mirror;
pub mod progress;
pub mod repository;
pub mod trust;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use error::{ErrorKind, RepositoryError, Result};
pub use manager::RepositoryManager;
pub use repository::{IndexLookup, Repository};
