use super::PopulationEngine;
use crate::commit::CommitInformation;
use crate::registry::RegistrationStore;
use crate::source::{FileItem, SourceRepository};
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use std::sync::LazyLock;

static MERGE_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\AMerge from .*?, Revision .*\z").expect("Invalid merge comment regex")
});

const UNKNOWN_MERGE: &str = "Merge from unknown branch";

/// Comment a revision starts from before normalization
pub(crate) fn seed_comment(revision: &FileItem) -> String {
    let comment = revision.comment.trim();
    if comment.is_empty() {
        if revision.content_version == 1 {
            return revision.description.trim().to_string();
        }
        return String::new();
    }
    if MERGE_COMMENT.is_match(comment) {
        return UNKNOWN_MERGE.to_string();
    }
    comment.to_string()
}

/// Keep commits at or after the anchor, one second apart per revision
pub(crate) fn commit_date(
    author_date: DateTime<Utc>,
    anchor: DateTime<Utc>,
    counter: u32,
) -> DateTime<Utc> {
    author_date.max(anchor + TimeDelta::seconds(i64::from(counter)))
}

impl<S, R> PopulationEngine<S, R>
where
    S: SourceRepository,
    R: RegistrationStore,
{
    pub(super) fn synthesize(&mut self, path: &str, revision: &FileItem, counter: u32) {
        let normalized = self.normalizer.normalize(&seed_comment(revision));
        let author_date = revision.modified_time;

        let info = CommitInformation::new(
            commit_date(author_date, self.time_anchor, counter),
            revision.modified_by,
            &normalized.message,
            path,
        )
        .with_author_date(author_date)
        .with_uname(normalized.author_override);

        if self.verbose {
            tracing::debug!("Discovered commit <{}>", info);
        }
        self.commits.insert(info, revision.clone());
    }
}
