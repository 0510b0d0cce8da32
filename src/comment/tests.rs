use super::*;
use crate::error::ReviewError;
use std::cell::RefCell;
use std::rc::Rc;

/// Tracker double that records requested ids
struct FakeTracker {
    description: Result<String, String>,
    requested: Rc<RefCell<Vec<u64>>>,
}

impl ReviewTracker for FakeTracker {
    fn fetch_description(&self, review_id: u64) -> Result<String, ReviewError> {
        self.requested.borrow_mut().push(review_id);
        self.description
            .clone()
            .map_err(|reason| ReviewError::RequestFailed {
                url: format!("fake/{}", review_id),
                reason,
            })
    }
}

fn with_tracker(description: Result<&str, &str>) -> (CommentNormalizer, Rc<RefCell<Vec<u64>>>) {
    let requested = Rc::new(RefCell::new(Vec::new()));
    let tracker = FakeTracker {
        description: description.map(String::from).map_err(String::from),
        requested: Rc::clone(&requested),
    };
    (
        CommentNormalizer::default().with_tracker(Box::new(tracker)),
        requested,
    )
}

#[test]
fn test_fix_phrase_example() {
    let out = CommentNormalizer::default().normalize("To fix TD bug21581 by yukai : desc");
    assert_eq!(out.message, "To fix bug#21581 : desc");
    assert_eq!(out.author_override.as_deref(), Some("yukai"));
}

#[test]
fn test_plain_comment_untouched() {
    let out = CommentNormalizer::default().normalize("Refactor the loader");
    assert_eq!(out.message, "Refactor the loader");
    assert!(out.author_override.is_none());
}

#[test]
fn test_multiple_bug_numbers() {
    let out = CommentNormalizer::default().normalize("fix bug 123_456, 789 crash");
    assert_eq!(out.message, "fix bug#123 bug#456 bug#789  crash");
}

#[test]
fn test_bug_tags_case_insensitive_and_repeated() {
    let out = CommentNormalizer::default().normalize("TD 55 and td66");
    assert_eq!(out.message, "bug#55  and bug#66 ");
}

#[test]
fn test_rewrite_cap() {
    let out = CommentNormalizer::default()
        .with_max_rewrites(1)
        .normalize("bug1 then bug2");
    assert_eq!(out.message, "bug#1  then bug2");
}

#[test]
fn test_requirement_lookup() {
    let table = RequirementTable::from_pairs([("YF-20180909-001", 768), ("YF-20180909-001", 769)]);
    let out = CommentNormalizer::default()
        .with_requirements(table)
        .normalize("implement YF-20180909-001 export");
    assert_eq!(out.message, "implement req#30768|req#30769 export");
}

#[test]
fn test_unknown_requirement_is_escaped() {
    let out = CommentNormalizer::default().normalize("see AB-12345678-001 and AB-12345678-002");
    assert_eq!(out.message, "see AB--12345678--001 and AB--12345678--002");
}

#[test]
fn test_fix_phrase_underscores() {
    let out = CommentNormalizer::default().normalize("To fix TD bug1 crash_in_loader by lee: typo");
    assert_eq!(out.message, "To fix bug#1  crash in loader: typo");
    assert_eq!(out.author_override.as_deref(), Some("lee"));
}

#[test]
fn test_review_link_without_tracker() {
    let out = CommentNormalizer::default()
        .normalize("fix crash\nReview Link : http://192.168.101.27/r/8199/");
    assert_eq!(
        out.message,
        "fix crash\n\n\nReview Link : http://reviewboard.db.org/r/8199/"
    );
}

#[test]
fn test_review_link_appends_description() {
    let (normalizer, requested) = with_tracker(Ok("Long text"));
    let out = normalizer.normalize("To fix bug1 by kim : crash\nReview Link : http://10.0.5.169/r/42/");

    assert_eq!(
        out.message,
        "To fix bug#1 : crash\n\n\nLong text\n\nReview Link : http://reviewboard.db.org/r/42/"
    );
    assert_eq!(out.author_override.as_deref(), Some("kim"));
    assert_eq!(*requested.borrow(), vec![42]);
}

#[test]
fn test_review_lookup_failure_keeps_link() {
    let (normalizer, requested) = with_tracker(Err("timeout"));
    let out = normalizer.normalize("crash http://192.168.101.27/r/7");
    assert_eq!(out.message, "crash \n\nhttp://reviewboard.db.org/r/7");
    assert_eq!(requested.borrow().len(), 1);
}

#[test]
fn test_last_review_link_wins() {
    let (normalizer, requested) = with_tracker(Ok("d"));
    normalizer.normalize("http://192.168.101.27/r/1/ then http://192.168.101.27/r/2/");
    assert_eq!(*requested.borrow(), vec![2]);
}

#[test]
fn test_unknown_host_is_not_a_review_link() {
    let (normalizer, requested) = with_tracker(Ok("d"));
    let out = normalizer.normalize("see http://example.org/r/5/");
    assert_eq!(out.message, "see http://example.org/r/5/");
    assert!(requested.borrow().is_empty());
}

#[test]
fn test_no_hosts_disables_review_expansion() {
    let review = ReviewConfig {
        hosts: Vec::new(),
        ..ReviewConfig::default()
    };
    let normalizer = CommentNormalizer::new(&CommentConfig::default(), &review).unwrap();
    let out = normalizer.normalize("http://192.168.101.27/r/1/");
    assert_eq!(out.message, "http://192.168.101.27/r/1/");
}

#[test]
fn test_requirement_table_parse() {
    let table = RequirementTable::parse("name,seq\nYF-20180909-001,768\nbroken\nYF-20180909-001, 769\n\n");
    assert_eq!(table.len(), 1);
    assert_eq!(table.lookup("YF-20180909-001"), &[768, 769]);
    assert!(table.lookup("XX-00000000-000").is_empty());
}

#[test]
fn test_requirement_table_load() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "name,seq\nAB-11112222-003,5\n").unwrap();
    let table = RequirementTable::load(file.path()).unwrap();
    assert_eq!(table.lookup("AB-11112222-003"), &[5]);
    assert!(RequirementTable::load(Path::new("/nonexistent/td-req.csv")).is_err());
}

#[test]
fn test_from_config_loads_table() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "name,seq\nAB-11112222-003,5\n").unwrap();
    let mut config = Config::default();
    config.comments.requirement_table = Some(file.path().to_path_buf());

    let normalizer = CommentNormalizer::from_config(&config).unwrap();
    assert_eq!(normalizer.normalize("AB-11112222-003").message, "req#30005");
}
