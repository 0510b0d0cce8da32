//! # History Replay - Incremental Commit Reconstruction
//!
//! Rebuilds the history of a legacy versioned file repository as an ordered
//! list of synthetic commits that a serializer can replay into git, one branch
//! at a time and incrementally across runs.
//!
//! ## Overview
//!
//! Each run walks the current tree of a branch, compares every file with the
//! registration recorded by the previous run, and synthesizes one commit per
//! unseen revision. Paths that vanished since the previous run are classified
//! as deletions (found in the recycle bin), moves (found elsewhere under the
//! root), or left unresolved for the caller.
//!
//! ## Key Features
//!
//! - **Incremental**: per-(branch, path) registrations make an unchanged re-run empty
//! - **Monotonic dates**: commit dates never fall behind the previous run's last commit
//! - **Identity aware**: re-issued ids, replacements and reversions are told apart
//! - **Comment normalization**: bug and requirement ids rewritten, review links expanded
//! - **Bounded retries**: transient server conflicts back off exponentially, then fail
//!
//! ## Architecture
//!
//! ```text
//!   SourceRepository ──► PopulationEngine ──► CommitList
//!    (walk, history,      │  walker            (CommitInformation,
//!     recycle bin)        │  reconcile          FileItem) in order
//!                         │  synthesize ◄── CommentNormalizer ◄── ReviewTracker
//!                         │  resolve
//!                         ▼
//!                 RegistrationStore (Registry, JSON)
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: tree walk, file reconciliation, commit synthesis, deletion/move resolution
//! - [`commit`]: commit records and their ordered list
//! - [`comment`]: commit message normalization and review tracker client
//! - [`source`]: source repository contract and the in-memory snapshot repository
//! - [`registry`]: persisted per-branch registrations
//! - [`config`]: configuration management with environment variable support
//! - [`lock`]: per-branch filesystem lock
//! - [`error`]: error types and result aliases
//! - [`paths`]: platform data and config locations
//!
//! ## Usage Example
//!
//! ```no_run
//! use history_replay::engine::PopulationEngine;
//! use history_replay::registry::Registry;
//! use history_replay::source::MemoryRepository;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let source = MemoryRepository::from_file(Path::new("snapshot.json"))?;
//!     let root = source.root().expect("snapshot has a root folder");
//!
//!     let mut engine = PopulationEngine::new(source, Registry::default());
//!     engine.file_population("main", &root)?;
//!
//!     for (commit, _) in engine.commits().iter() {
//!         println!("{}", commit);
//!     }
//!     Ok(())
//! }
//! ```

/// Commit records, ordering and equivalence
pub mod commit;

/// Commit message normalization
pub mod comment;

/// Configuration management with environment variable overrides
pub mod config;

/// Incremental population engine
pub mod engine;

/// Error types and utilities
pub mod error;

/// Per-branch filesystem lock
pub mod lock;

/// Platform-specific data and config locations
pub mod paths;

/// Persisted per-(branch, path) registrations
pub mod registry;

/// Source repository contract and in-memory implementation
pub mod source;
