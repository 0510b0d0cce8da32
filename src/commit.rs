//! Synthetic commit records and their ordered list

use crate::source::{FileItem, UserId};
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

/// Comment noise ignored by [`CommitInformation::equivalent`]
static COMMENT_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\s+|/|\p{P}|\p{Z}|Review Link :)+").expect("Invalid comment noise regex")
});

static UPDATE_LIST_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"UpdateList.*\.xls$").expect("Invalid update list regex"));

static TD_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\sTD\s+(\S+)\s").expect("Invalid TD token regex"));

/// Two records closer than this may describe the same change
const EQUIVALENCE_WINDOW_SECS: i64 = 3600;

/// One synthesized commit candidate
///
/// Ordering and equality deliberately disagree. [`chronological_cmp`] orders
/// by commit date, then author date, while `PartialEq` compares commit date,
/// uid and the case-folded comment only. Two records can therefore be equal
/// yet ordered apart, or ordered together yet unequal. De-duplication
/// relies on the weaker equality, so the two must not be unified.
///
/// [`chronological_cmp`]: CommitInformation::chronological_cmp
#[derive(Debug, Clone, Serialize)]
pub struct CommitInformation {
    /// Adjusted time used for ordering and for the final commit
    pub commit_date: DateTime<Utc>,
    /// Original modification time
    pub author_date: DateTime<Utc>,
    pub uid: UserId,
    /// Author resolved from the comment, when it names one
    pub uname: Option<String>,
    pub comment: String,
    /// Target repository relative path
    pub path: String,
    pub file_delete: bool,
}

impl CommitInformation {
    pub fn new(date: DateTime<Utc>, uid: UserId, comment: &str, path: &str) -> Self {
        Self {
            commit_date: date,
            author_date: date,
            uid,
            uname: None,
            comment: comment.trim().to_string(),
            path: path.to_string(),
            file_delete: false,
        }
    }

    /// A deletion record for `path`
    pub fn deletion(date: DateTime<Utc>, uid: UserId, path: &str) -> Self {
        Self {
            file_delete: true,
            ..Self::new(date, uid, "", path)
        }
    }

    pub fn with_author_date(mut self, author_date: DateTime<Utc>) -> Self {
        self.author_date = author_date;
        self
    }

    pub fn with_uname(mut self, uname: Option<String>) -> Self {
        self.uname = uname;
        self
    }

    /// Commit date first, earlier author date breaking ties
    pub fn chronological_cmp(&self, other: &Self) -> Ordering {
        self.commit_date
            .cmp(&other.commit_date)
            .then_with(|| self.author_date.cmp(&other.author_date))
    }

    /// Fuzzy match used to fold the same change seen on several branches:
    /// same author within an hour, and comments that agree once punctuation
    /// and whitespace are ignored.
    pub fn equivalent(&self, other: &Self) -> bool {
        if self.uid != other.uid {
            return false;
        }
        let gap = (other.commit_date - self.commit_date).abs();
        if gap > TimeDelta::seconds(EQUIVALENCE_WINDOW_SECS) {
            return false;
        }
        if self.comment.is_empty() || other.comment.is_empty() {
            return true;
        }
        let ours = COMMENT_NOISE.replace_all(&self.comment, "");
        let theirs = COMMENT_NOISE.replace_all(&other.comment, "");
        if ours.to_lowercase() == theirs.to_lowercase() {
            return true;
        }
        // Spreadsheets listing updates are touched by every fix; only the
        // TD number tells them apart.
        if UPDATE_LIST_PATH.is_match(&other.path) && other.commit_date >= self.commit_date {
            return match (td_token(&other.comment), td_token(&self.comment)) {
                (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
                (None, _) | (_, None) => !(other.comment.contains(" TD ")
                    && self.comment.contains(" TD ")),
            };
        }
        false
    }
}

/// The last ` TD <id> ` token of a comment. Tokens may share their
/// separating whitespace, so the search restarts one character after each hit.
fn td_token(comment: &str) -> Option<&str> {
    let mut last = None;
    let mut start = 0;
    while let Some(caps) = TD_TOKEN.captures_at(comment, start) {
        let Some(whole) = caps.get(0) else { break };
        last = caps.get(1).map(|m| m.as_str());
        let step = comment[whole.start()..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);
        start = whole.start() + step;
    }
    last
}

impl PartialEq for CommitInformation {
    fn eq(&self, other: &Self) -> bool {
        self.commit_date == other.commit_date
            && self.uid == other.uid
            && self.comment.to_lowercase() == other.comment.to_lowercase()
    }
}

impl Eq for CommitInformation {}

impl fmt::Display for CommitInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitInfo: {}", self.commit_date.timestamp_millis())?;
        if self.author_date != self.commit_date {
            write!(f, "/{}", self.author_date.timestamp_millis())?;
        }
        write!(f, " - {} - {} - {}", self.uid, self.comment, self.path)
    }
}

/// Commits of one run kept in chronological order, each paired with the
/// source item it was built from
#[derive(Debug, Clone, Default)]
pub struct CommitList {
    entries: Vec<(CommitInformation, FileItem)>,
}

impl CommitList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every entry that does not sort later, so full ties keep
    /// insertion order
    pub fn insert(&mut self, info: CommitInformation, item: FileItem) {
        let pos = self
            .entries
            .partition_point(|(existing, _)| existing.chronological_cmp(&info) != Ordering::Greater);
        self.entries.insert(pos, (info, item));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &(CommitInformation, FileItem)> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&CommitInformation> {
        self.entries.last().map(|(info, _)| info)
    }

    /// Remove and return every entry matching `predicate`, oldest first
    pub fn extract(
        &mut self,
        mut predicate: impl FnMut(&CommitInformation, &FileItem) -> bool,
    ) -> Vec<(CommitInformation, FileItem)> {
        let (taken, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|(info, item)| predicate(info, item));
        self.entries = kept;
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn item(id: i32) -> FileItem {
        FileItem {
            id,
            name: format!("f{}", id),
            parent: 1,
            view_version: 1,
            content_version: 1,
            content_hash: String::new(),
            modified_time: at(0),
            modified_by: 1,
            comment: String::new(),
            description: String::new(),
            deleted: false,
            deleted_time: None,
            deleted_by: None,
        }
    }

    #[test]
    fn test_new_trims_comment() {
        let info = CommitInformation::new(at(10), 3, "  fix crash \n", "a.c");
        assert_eq!(info.comment, "fix crash");
        assert_eq!(info.author_date, info.commit_date);
        assert!(!info.file_delete);
    }

    #[test]
    fn test_deletion_record() {
        let info = CommitInformation::deletion(at(10), 3, "a.c");
        assert!(info.file_delete);
        assert!(info.comment.is_empty());
    }

    #[test]
    fn test_chronological_cmp_breaks_ties_by_author_date() {
        let early = CommitInformation::new(at(100), 1, "x", "a").with_author_date(at(10));
        let late = CommitInformation::new(at(100), 1, "x", "b").with_author_date(at(20));
        assert_eq!(early.chronological_cmp(&late), Ordering::Less);
        assert_eq!(late.chronological_cmp(&early), Ordering::Greater);
    }

    #[test]
    fn test_equality_is_weaker_than_ordering() {
        let a = CommitInformation::new(at(100), 1, "Fix Crash", "a.c").with_author_date(at(10));
        let b = CommitInformation::new(at(100), 1, "fix crash", "b.c").with_author_date(at(90));
        assert_eq!(a, b);
        assert_ne!(a.chronological_cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_equality_needs_same_uid() {
        let a = CommitInformation::new(at(100), 1, "fix", "a.c");
        let b = CommitInformation::new(at(100), 2, "fix", "a.c");
        assert_ne!(a, b);
    }

    #[test]
    fn test_equivalent_ignores_punctuation() {
        let a = CommitInformation::new(at(100), 1, "Fix: the crash.", "a.c");
        let b = CommitInformation::new(at(1_000), 1, "fix the crash", "b.c");
        assert!(a.equivalent(&b));
    }

    #[test]
    fn test_equivalent_window_and_uid() {
        let a = CommitInformation::new(at(0), 1, "fix", "a.c");
        let far = CommitInformation::new(at(3_601), 1, "fix", "a.c");
        let other_user = CommitInformation::new(at(0), 2, "fix", "a.c");
        assert!(!a.equivalent(&far));
        assert!(!a.equivalent(&other_user));
        assert!(a.equivalent(&CommitInformation::new(at(60), 1, "", "b.c")));
    }

    #[test]
    fn test_equivalent_update_list_td_numbers() {
        let a = CommitInformation::new(at(0), 1, "To fix TD 123 crash", "src/a.c");
        let same_td = CommitInformation::new(at(10), 1, "Listed TD 123 here", "UpdateList_7.xls");
        let other_td = CommitInformation::new(at(10), 1, "Listed TD 456 here", "UpdateList_7.xls");
        assert!(a.equivalent(&same_td));
        assert!(!a.equivalent(&other_td));
    }

    #[test]
    fn test_equivalent_update_list_uses_last_td_number() {
        let fix = CommitInformation::new(at(0), 1, "Fix TD 111 and TD 222 done", "src/a.c");
        let list =
            CommitInformation::new(at(10), 1, "Listed TD 222 here", "doc/UpdateList_7.xls");
        assert!(fix.equivalent(&list));

        let first_only =
            CommitInformation::new(at(10), 1, "Listed TD 111 here", "UpdateList_7.xls");
        assert!(!fix.equivalent(&first_only));
    }

    #[test]
    fn test_td_token_with_shared_whitespace() {
        assert_eq!(td_token("a TD 1 TD 2 b"), Some("2"));
        assert_eq!(td_token("x TD 7 "), Some("7"));
        assert_eq!(td_token("TD 7 at start"), None);
        assert_eq!(td_token("\u{3000}TD 9\u{3000}done"), Some("9"));
    }

    #[test]
    fn test_equivalent_window_counts_milliseconds() {
        let a = CommitInformation::new(at(0), 1, "same", "a.c");
        let just_out = CommitInformation::new(
            Utc.timestamp_millis_opt(3_600_500).unwrap(),
            1,
            "same",
            "a.c",
        );
        let at_edge = CommitInformation::new(at(3_600), 1, "same", "a.c");
        assert!(!a.equivalent(&just_out));
        assert!(!just_out.equivalent(&a));
        assert!(a.equivalent(&at_edge));
    }

    #[test]
    fn test_display() {
        let info = CommitInformation::new(at(2), 7, "msg", "p").with_author_date(at(1));
        assert_eq!(info.to_string(), "CommitInfo: 2000/1000 - 7 - msg - p");
    }

    #[test]
    fn test_list_keeps_chronological_order() {
        let mut list = CommitList::new();
        list.insert(CommitInformation::new(at(30), 1, "c", "c"), item(3));
        list.insert(CommitInformation::new(at(10), 1, "a", "a"), item(1));
        list.insert(CommitInformation::new(at(20), 1, "b", "b"), item(2));

        let paths: Vec<_> = list.iter().map(|(info, _)| info.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
        assert_eq!(list.last().unwrap().path, "c");
    }

    #[test]
    fn test_list_full_ties_keep_insertion_order() {
        let mut list = CommitList::new();
        list.insert(CommitInformation::new(at(10), 1, "first", "x"), item(1));
        list.insert(CommitInformation::new(at(10), 1, "second", "y"), item(2));
        let paths: Vec<_> = list.iter().map(|(info, _)| info.path.as_str()).collect();
        assert_eq!(paths, vec!["x", "y"]);
    }

    #[test]
    fn test_list_extract() {
        let mut list = CommitList::new();
        list.insert(CommitInformation::new(at(10), 1, "a", "keep"), item(1));
        list.insert(CommitInformation::new(at(20), 1, "b", "take"), item(2));
        list.insert(CommitInformation::new(at(30), 1, "c", "take"), item(2));

        let taken = list.extract(|info, _| info.path == "take");
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].0.comment, "b");
        assert_eq!(list.len(), 1);
    }
}
