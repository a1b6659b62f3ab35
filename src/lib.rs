//! # fabula
//!
//! A git-versioned story knowledge base. Upstream ingestion tooling derives a
//! tree of YAML documents from a screenplay (characters, scenes, events,
//! world state, decisions, timelines); fabula keeps a queryable SQLite
//! projection of that tree consistent across edits and branch switches.
//!
//! ## Overview
//!
//! The document store is the source of truth. The projection is fully
//! derived and disposable: it can always be rebuilt from the YAML tree
//! alone. Three mechanisms keep it honest:
//!
//! - **Fingerprinting** ([`hash`]): a Sha256 digest over every YAML file's
//!   path and bytes, canonically ordered, detects any store change.
//! - **Staleness gating** ([`index`]): a persisted version marker records
//!   which fingerprint the live index reflects; `ensure_fresh` rebuilds only
//!   on mismatch, and the rebuild commits in a single transaction.
//! - **Per-timeline caching** ([`timeline`]): each git branch ("timeline")
//!   gets a cached index snapshot plus its own marker, so switching back to
//!   a previously visited timeline swaps files instead of re-indexing.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use fabula::{config::ProjectLayout, index};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let layout = ProjectLayout::discover(None)?;
//!     // Rebuilds only if the document store changed since the last build.
//!     let rebuilt = index::ensure_fresh(&layout).await?;
//!     println!("rebuilt: {rebuilt}");
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency model
//!
//! Operations are blocking I/O sequences intended for a single active caller
//! per project. An advisory file lock ([`lock`]) serializes the
//! check-then-act sequences (staleness check + rebuild, cache check + copy)
//! across processes on one machine.

pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod index;
pub mod lock;
pub mod store;
pub mod timeline;

pub use error::*;
