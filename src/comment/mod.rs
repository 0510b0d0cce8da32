//! Commit message normalization
//!
//! Legacy check-in comments embed tracker references in free-form text
//! ("To fix TD bug21581 by yukai : ..."). [`CommentNormalizer`] rewrites them
//! into forms the target forge links automatically, pulls the real author out
//! of the "by <user>" clause, and expands review links with the review's own
//! description.

pub mod review;

pub use review::{ReviewBoardClient, ReviewTracker};

use crate::config::{CommentConfig, Config, ReviewConfig};
use crate::error::{ConfigError, ReplayError};
use anyhow::Context;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

static BUG_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(bug|td)\s*\d+((\s+|_|(\s*(&|、|和|,|，)\s*))\d+)*")
        .expect("Invalid bug tag regex")
});

static REQUIREMENT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]{2}-\d{8}-\d{3}").expect("Invalid requirement regex"));

static FIX_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)To\s+fix\s+.+by\s+\w+").expect("Invalid fix phrase regex"));

static TD_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)TD\s+").expect("Invalid TD marker regex"));

static BY_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+by\s+\w+").expect("Invalid by clause regex"));

static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Invalid digits regex"));

/// Output of [`CommentNormalizer::normalize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedComment {
    pub message: String,
    /// User named by a "To fix ... by <user>" phrase
    pub author_override: Option<String>,
}

/// Requirement code to sequence number lookup
///
/// A code may map to several sequence numbers.
#[derive(Debug, Clone, Default)]
pub struct RequirementTable {
    sequences: HashMap<String, Vec<u32>>,
}

impl RequirementTable {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for (code, seq) in pairs {
            table.sequences.entry(code.into()).or_default().push(seq);
        }
        table
    }

    /// Load a `name,sequence` CSV file whose first line is a header
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read requirement table {}", path.display()))?;
        let table = Self::parse(&content);
        tracing::info!(
            "Loaded {} requirement codes from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn parse(content: &str) -> Self {
        let mut table = Self::default();
        for (lineno, line) in content.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split(',').map(str::trim);
            let code = fields.next().unwrap_or_default();
            match fields.next().map(str::parse::<u32>) {
                Some(Ok(seq)) if !code.is_empty() => {
                    table.sequences.entry(code.to_string()).or_default().push(seq);
                }
                _ => tracing::warn!("Skipping malformed requirement line {}: {}", lineno + 1, line),
            }
        }
        table
    }

    pub fn lookup(&self, code: &str) -> &[u32] {
        self.sequences.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

/// Order-sensitive rewriting pipeline for commit comments
pub struct CommentNormalizer {
    requirements: RequirementTable,
    requirement_base: u32,
    max_rewrites: usize,
    /// `None` when no review hosts are configured
    review_link: Option<Regex>,
    review_hosts: Option<Regex>,
    canonical_domain: String,
    tracker: Option<Box<dyn ReviewTracker>>,
}

impl Default for CommentNormalizer {
    fn default() -> Self {
        Self::new(&CommentConfig::default(), &ReviewConfig::default())
            .expect("Invalid default review host pattern")
    }
}

impl CommentNormalizer {
    /// Build a normalizer without a requirement table or review tracker
    pub fn new(comments: &CommentConfig, review: &ReviewConfig) -> Result<Self, ReplayError> {
        let (review_link, review_hosts) = if review.hosts.is_empty() {
            (None, None)
        } else {
            let hosts = review
                .hosts
                .iter()
                .map(|h| regex::escape(h))
                .collect::<Vec<_>>()
                .join("|");
            let invalid = |e: regex::Error| ConfigError::InvalidValue {
                key: "review.hosts".to_string(),
                reason: e.to_string(),
            };
            let link = Regex::new(&format!(
                r"(?i)(Review\s+)*(Link\s+:\s+)*http://({})/r/\d+/*",
                hosts
            ))
            .map_err(invalid)?;
            let bare = Regex::new(&format!("({})", hosts)).map_err(invalid)?;
            (Some(link), Some(bare))
        };

        Ok(Self {
            requirements: RequirementTable::default(),
            requirement_base: comments.requirement_base,
            max_rewrites: comments.max_rewrites,
            review_link,
            review_hosts,
            canonical_domain: review.canonical_domain.clone(),
            tracker: None,
        })
    }

    /// Build from the full configuration, loading the requirement table and
    /// connecting the review tracker when enabled
    pub fn from_config(config: &Config) -> Result<Self, ReplayError> {
        let mut normalizer = Self::new(&config.comments, &config.review)?;
        if let Some(path) = &config.comments.requirement_table {
            normalizer.requirements = RequirementTable::load(path)?;
        }
        if config.review.enabled {
            normalizer.tracker = Some(Box::new(ReviewBoardClient::from_config(&config.review)));
        }
        Ok(normalizer)
    }

    pub fn with_requirements(mut self, table: RequirementTable) -> Self {
        self.requirements = table;
        self
    }

    pub fn with_tracker(mut self, tracker: Box<dyn ReviewTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_max_rewrites(mut self, max_rewrites: usize) -> Self {
        self.max_rewrites = max_rewrites;
        self
    }

    /// Run the full pipeline over a seed comment
    pub fn normalize(&self, seed: &str) -> NormalizedComment {
        let author_override = real_author(seed);

        let text = self.rewrite_each(seed, &BUG_TAG, format_bug_ids);
        let text = self.rewrite_each(&text, &REQUIREMENT_TAG, |code| self.format_requirement(code));
        let text = strip_fix_phrase(&text);
        let message = self.expand_review_link(text);

        NormalizedComment {
            message,
            author_override,
        }
    }

    /// Replace successive matches of `pattern`, never rescanning replaced
    /// text and stopping after `max_rewrites` replacements
    fn rewrite_each(&self, input: &str, pattern: &Regex, format: impl Fn(&str) -> String) -> String {
        let mut text = input.to_string();
        let mut cursor = 0;
        for _ in 0..self.max_rewrites {
            let Some(found) = pattern.find_at(&text, cursor) else {
                break;
            };
            let range = found.range();
            let replacement = format(found.as_str());
            cursor = range.start + replacement.len();
            text.replace_range(range, &replacement);
        }
        text
    }

    fn format_requirement(&self, code: &str) -> String {
        let seqs = self.requirements.lookup(code);
        if seqs.is_empty() {
            return code.replace('-', "--");
        }
        seqs.iter()
            .map(|seq| format!("req#{}", self.requirement_base + seq))
            .collect::<Vec<_>>()
            .join("|")
    }

    fn expand_review_link(&self, text: String) -> String {
        let (Some(link_pattern), Some(hosts)) = (&self.review_link, &self.review_hosts) else {
            return text;
        };
        let Some(link) = link_pattern.find_iter(&text).last() else {
            return text;
        };

        let mut expanded = text[..link.start()].to_string();
        let review_id = DIGITS
            .find_iter(link.as_str())
            .last()
            .and_then(|m| m.as_str().parse::<u64>().ok());

        if let (Some(tracker), Some(id)) = (&self.tracker, review_id) {
            match tracker.fetch_description(id) {
                Ok(description) => {
                    expanded.push_str("\n\n");
                    expanded.push_str(&description);
                }
                Err(e) => tracing::warn!("Review lookup for #{} failed: {}", id, e),
            }
        }
        expanded.push_str("\n\n");
        expanded.push_str(link.as_str());

        hosts
            .replace_all(&expanded, self.canonical_domain.as_str())
            .into_owned()
    }
}

/// `bug#N ` for every number in the tag
fn format_bug_ids(tag: &str) -> String {
    DIGITS
        .find_iter(tag)
        .map(|m| format!("bug#{} ", m.as_str()))
        .collect()
}

fn strip_fix_phrase(text: &str) -> String {
    let Some(found) = FIX_PHRASE.find(text) else {
        return text.to_string();
    };
    let phrase = TD_MARKER.replace(found.as_str(), "");
    let phrase = BY_CLAUSE.replace(&phrase, "");
    let phrase = phrase.replace('_', " ");

    let mut out = text.to_string();
    out.replace_range(found.range(), &phrase);
    out
}

fn real_author(seed: &str) -> Option<String> {
    FIX_PHRASE
        .find(seed)
        .and_then(|m| m.as_str().split_whitespace().last())
        .map(String::from)
}

#[cfg(test)]
mod tests;
