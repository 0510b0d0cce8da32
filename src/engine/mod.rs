//! Incremental commit reconstruction for one branch
//!
//! A run walks the current tree under a root folder, compares every file with
//! what the registration store recorded last time, and turns each unseen
//! revision into a [`CommitInformation`]. Paths that were known before but
//! did not show up in the walk are then classified as deletions or moves.
//!
//! The engine is synchronous and owns its source and registration store for
//! the duration of a run; callers must not run two engines on the same branch
//! at once (see [`crate::lock::BranchLock`]).

mod reconcile;
mod resolve;
mod retry;
mod synthesize;
mod walker;

pub use resolve::UNEXPECTED_MOVE;
pub use retry::RetryPolicy;

use crate::comment::CommentNormalizer;
use crate::commit::{CommitInformation, CommitList};
use crate::config::{Config, ExclusionConfig};
use crate::error::Result;
use crate::registry::RegistrationStore;
use crate::source::{FILE_PREFETCH, FileItem, Folder, SourceRepository};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Instant;

/// Reconstructs the commits of one branch from a versioned source tree
pub struct PopulationEngine<S, R> {
    source: S,
    registry: R,
    normalizer: CommentNormalizer,
    retry: RetryPolicy,
    exclusions: ExclusionConfig,
    verbose: bool,

    commits: CommitList,
    /// Paths seen in the last walk, seeded by the caller before the first run
    known_paths: BTreeSet<String>,
    /// Known paths not confirmed by the current walk
    missing_paths: BTreeSet<String>,
    /// Floor for synthesized commit dates
    time_anchor: DateTime<Utc>,
}

impl<S, R> PopulationEngine<S, R>
where
    S: SourceRepository,
    R: RegistrationStore,
{
    pub fn new(source: S, registry: R) -> Self {
        Self {
            source,
            registry,
            normalizer: CommentNormalizer::default(),
            retry: RetryPolicy::default(),
            exclusions: ExclusionConfig::default(),
            verbose: false,
            commits: CommitList::new(),
            known_paths: BTreeSet::new(),
            missing_paths: BTreeSet::new(),
            time_anchor: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Engine configured from the full configuration: exclusions, retry
    /// policy, normalizer and verbosity
    pub fn from_config(source: S, registry: R, config: &Config) -> Result<Self> {
        let engine = Self::new(source, registry)
            .with_exclusions(config.exclusions.clone())
            .with_retry(RetryPolicy::from(&config.retry))
            .with_normalizer(CommentNormalizer::from_config(config)?);
        Ok(Self {
            verbose: config.engine.verbose,
            ..engine
        })
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionConfig) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_normalizer(mut self, normalizer: CommentNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Replace the exclusion lists; they apply from the next run on
    pub fn set_exclusions(&mut self, exclusions: ExclusionConfig) {
        self.exclusions = exclusions;
    }

    /// Reconstruct the commits made under `root` since the previous run.
    ///
    /// The previous run's commits are discarded first. Afterwards the time
    /// anchor moves to the latest synthesized commit date.
    pub fn file_population(&mut self, head: &str, root: &Folder) -> Result<()> {
        let start = Instant::now();
        self.commits.clear();
        self.missing_paths = self.known_paths.clone();

        if let Err(e) = self.source.populate(root, FILE_PREFETCH) {
            tracing::warn!("Property pre-fetch under '{}' failed: {}", root.name, e);
        }

        self.walk(head, root)?;

        for path in &self.missing_paths {
            self.known_paths.remove(path);
        }

        self.resolve_missing(head, root)?;

        if let Some(last) = self.commits.last() {
            self.set_last_commit_time(last.commit_date);
        }

        tracing::info!(
            "Population of '{}' on {} found {} commits, {} paths unresolved in {:?}",
            root.name,
            head,
            self.commits.len(),
            self.missing_paths.len(),
            start.elapsed()
        );
        Ok(())
    }

    /// Commits of the last run in chronological order
    pub fn commits(&self) -> &CommitList {
        &self.commits
    }

    /// Commits of the last run, each paired with the item it came from
    pub fn list_of_commit(&self) -> Vec<(CommitInformation, FileItem)> {
        self.commits.iter().cloned().collect()
    }

    /// Known paths that were neither re-confirmed nor resolved by the last run
    pub fn paths_still_missing(&self) -> &BTreeSet<String> {
        &self.missing_paths
    }

    /// Seed the paths present at the end of the previous run
    pub fn set_initial_path_list<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.known_paths.extend(paths);
    }

    pub fn set_last_commit_time(&mut self, time: DateTime<Utc>) {
        self.time_anchor = time;
        if self.verbose {
            tracing::debug!("Set earliest commit time to {}", time);
        }
    }

    pub fn last_commit_time(&self) -> DateTime<Utc> {
        self.time_anchor
    }

    /// Paths present after the last run
    pub fn last_files(&self) -> Vec<String> {
        self.known_paths.iter().cloned().collect()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn into_registry(self) -> R {
        self.registry
    }
}
