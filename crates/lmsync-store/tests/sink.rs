//! Sink behavior against real DuckDB databases

use chrono::{DateTime, NaiveDate};
use lmsync_store::{
    ActivityRow, ConflictPolicy, CourseRow, CourseWrite, LookupTable, RelatedRow, Store,
    TitledRef, WriteSet, is_write_conflict,
};
use tempfile::TempDir;

fn titled(title: &str) -> TitledRef {
    TitledRef {
        title: title.to_string(),
        url: Some(format!("/courses/{}/", title.to_lowercase())),
    }
}

fn course_write(id: i64, title: &str) -> WriteSet {
    WriteSet::Course(Box::new(CourseWrite {
        course: CourseRow {
            id,
            title: Some(title.to_string()),
            num_lectures: Some(12),
            has_closed_caption: Some(true),
            last_update_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            locale: Some("en_US".to_string()),
            ..Default::default()
        },
        category: titled("Development"),
        subcategory: titled("Web Development"),
        related: vec![
            RelatedRow::Topic {
                topic_id: 9,
                title: Some("Rust".to_string()),
                url: None,
            },
            RelatedRow::Instructor("Ada Lovelace".to_string()),
            RelatedRow::Instructor("Grace Hopper".to_string()),
            RelatedRow::LearningOutcome("Ownership".to_string()),
            RelatedRow::Image {
                size: "size_240x135".to_string(),
                url: Some("https://img.test/240.jpg".to_string()),
            },
            RelatedRow::CaptionLanguage("English".to_string()),
            RelatedRow::CaptionLocale {
                locale: "en_US".to_string(),
                title: Some("English (US)".to_string()),
                english_title: Some("English (US)".to_string()),
            },
        ],
    }))
}

fn activity(user_id: i64, course_id: i64, ratio: f64, accessed: &str) -> WriteSet {
    WriteSet::Activity(Box::new(ActivityRow {
        user_id,
        course_id,
        user_email: Some(format!("u{user_id}@example.test")),
        completion_ratio: Some(ratio),
        course_last_accessed_date: Some(DateTime::parse_from_rfc3339(accessed).unwrap()),
        ..Default::default()
    }))
}

fn count(store: &Store, table: &str) -> i64 {
    store
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

fn apply_page(store: &mut Store, writes: &[WriteSet], policy: ConflictPolicy) {
    let mut tx = store.begin_page().unwrap();
    for w in writes {
        tx.apply(w, policy).unwrap();
    }
    tx.commit().unwrap();
}

/// Every table's row count, for before/after comparisons
fn snapshot(store: &Store) -> Vec<(&'static str, u64)> {
    store.table_counts().unwrap()
}

#[test]
fn course_replay_is_idempotent() {
    let mut store = Store::open_in_memory().unwrap();
    let page = vec![course_write(1, "Rust 101"), course_write(2, "Rust 201")];

    apply_page(&mut store, &page, ConflictPolicy::Ignore);
    let once = snapshot(&store);
    apply_page(&mut store, &page, ConflictPolicy::Ignore);
    let twice = snapshot(&store);

    assert_eq!(once, twice);
    assert_eq!(count(&store, "courses"), 2);
    assert_eq!(count(&store, "categories"), 1);
    assert_eq!(count(&store, "course_categories"), 2);
    assert_eq!(count(&store, "instructors"), 4);
}

#[test]
fn course_ignore_keeps_first_write() {
    let mut store = Store::open_in_memory().unwrap();
    apply_page(&mut store, &[course_write(1, "Original")], ConflictPolicy::Ignore);
    apply_page(&mut store, &[course_write(1, "Renamed")], ConflictPolicy::Ignore);

    let title: String = store
        .connection()
        .query_row("SELECT title FROM courses WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(title, "Original");
}

#[test]
fn course_update_policy_overwrites() {
    let mut store = Store::open_in_memory().unwrap();
    apply_page(&mut store, &[course_write(1, "Original")], ConflictPolicy::Update);
    apply_page(&mut store, &[course_write(1, "Renamed")], ConflictPolicy::Update);

    let title: String = store
        .connection()
        .query_row("SELECT title FROM courses WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(title, "Renamed");
    assert_eq!(count(&store, "courses"), 1);
}

#[test]
fn activity_upsert_takes_latest_values() {
    let mut store = Store::open_in_memory().unwrap();
    apply_page(
        &mut store,
        &[activity(10, 1, 0.25, "2024-01-01T08:00:00Z")],
        ConflictPolicy::Update,
    );
    apply_page(
        &mut store,
        &[activity(10, 1, 0.75, "2024-02-01T10:30:00+02:00")],
        ConflictPolicy::Update,
    );

    assert_eq!(count(&store, "user_course_activity"), 1);
    let (ratio, accessed): (f64, String) = store
        .connection()
        .query_row(
            "SELECT completion_ratio, CAST(course_last_accessed_date AS VARCHAR) \
             FROM user_course_activity WHERE user_id = 10 AND course_id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(ratio, 0.75);
    // stored as UTC
    assert!(accessed.starts_with("2024-02-01 08:30:00"), "{accessed}");
}

#[test]
fn activity_rows_keyed_by_user_and_course() {
    let mut store = Store::open_in_memory().unwrap();
    apply_page(
        &mut store,
        &[
            activity(10, 1, 0.1, "2024-01-01T00:00:00Z"),
            activity(10, 2, 0.2, "2024-01-01T00:00:00Z"),
            activity(11, 1, 0.3, "2024-01-01T00:00:00Z"),
        ],
        ConflictPolicy::Update,
    );
    assert_eq!(count(&store, "user_course_activity"), 3);
}

#[test]
fn uncommitted_page_leaves_nothing() {
    let mut store = Store::open_in_memory().unwrap();
    {
        let mut tx = store.begin_page().unwrap();
        tx.apply(&course_write(1, "Rust 101"), ConflictPolicy::Ignore)
            .unwrap();
        // dropped without commit
    }
    assert!(snapshot(&store).iter().all(|(_, n)| *n == 0));
}

#[test]
fn get_or_create_from_two_connections_agrees() {
    let mut first = Store::open_in_memory().unwrap();
    let mut second = Store::from_connection(first.connection().try_clone().unwrap()).unwrap();

    let a = {
        let tx = first.begin_page().unwrap();
        let id = tx
            .get_or_create(LookupTable::Category, &titled("Business"))
            .unwrap();
        tx.commit().unwrap();
        id
    };
    let b = {
        let tx = second.begin_page().unwrap();
        let id = tx
            .get_or_create(LookupTable::Category, &titled("Business"))
            .unwrap();
        tx.commit().unwrap();
        id
    };

    assert_eq!(a, b);
    let distinct: i64 = first
        .connection()
        .query_row(
            "SELECT COUNT(DISTINCT id) FROM categories WHERE title = 'Business'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(distinct, 1);
}

#[test]
fn overlapping_get_or_create_loses_at_commit_then_reruns() {
    let mut first = Store::open_in_memory().unwrap();
    let mut second = Store::from_connection(first.connection().try_clone().unwrap()).unwrap();

    let tx1 = first.begin_page().unwrap();
    let tx2 = second.begin_page().unwrap();
    let a = tx1
        .get_or_create(LookupTable::Category, &titled("Business"))
        .unwrap();
    tx2.get_or_create(LookupTable::Category, &titled("Business"))
        .unwrap();

    tx1.commit().unwrap();
    let err = tx2.commit().unwrap_err();
    assert!(is_write_conflict(&err), "{err:#}");

    // a fresh transaction sees the committed winner
    let tx = second.begin_page().unwrap();
    let b = tx
        .get_or_create(LookupTable::Category, &titled("Business"))
        .unwrap();
    tx.commit().unwrap();
    assert_eq!(a, b);
    assert_eq!(count(&first, "categories"), 1);
}

#[test]
fn unrelated_errors_are_not_write_conflicts() {
    let store = Store::open_in_memory().unwrap();
    let err = anyhow::Error::from(
        store
            .connection()
            .execute_batch("SELECT * FROM no_such_table")
            .unwrap_err(),
    );
    assert!(!is_write_conflict(&err));
    assert!(!is_write_conflict(&anyhow::anyhow!("duplicate key, but not from DuckDB")));
}

#[test]
fn file_database_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("sync.duckdb");

    {
        let mut store = Store::open(&path).unwrap();
        apply_page(&mut store, &[course_write(5, "Persisted")], ConflictPolicy::Ignore);
    }
    let store = Store::open(&path).unwrap();
    assert_eq!(count(&store, "courses"), 1);
    assert_eq!(count(&store, "topics"), 1);
}
