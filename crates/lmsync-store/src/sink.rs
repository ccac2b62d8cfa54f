//! Page-scoped upsert sink.
//!
//! A [`PageTx`] wraps one DuckDB transaction. Dropping it without
//! [`PageTx::commit`] rolls back every write made for the page.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate};
use duckdb::{Connection, ToSql, Transaction, params};

use crate::rows::{ActivityRow, CourseRow, CourseWrite, LookupTable, RelatedRow, TitledRef, WriteSet};
use crate::schema;

/// What to do when a primary row with the same natural key exists
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// First write wins; later duplicates are no-ops
    Ignore,
    /// Overwrite every mutable column with the newest values
    Update,
}

impl ConflictPolicy {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "ignore" => Some(Self::Ignore),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ignore => "ignore",
            Self::Update => "update",
        })
    }
}

/// Result of a single conflict-guarded insert
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Skipped,
}

impl WriteOutcome {
    fn from_changed(n: usize) -> Self {
        if n > 0 { Self::Applied } else { Self::Skipped }
    }
}

/// Row counters for a page (or a whole run)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub entities_applied: usize,
    pub entities_skipped: usize,
    pub related_applied: usize,
    pub related_skipped: usize,
}

impl WriteStats {
    fn entity(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Applied => self.entities_applied += 1,
            WriteOutcome::Skipped => self.entities_skipped += 1,
        }
    }

    fn related(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Applied => self.related_applied += 1,
            WriteOutcome::Skipped => self.related_skipped += 1,
        }
    }

    pub fn merge(&mut self, other: WriteStats) {
        self.entities_applied += other.entities_applied;
        self.entities_skipped += other.entities_skipped;
        self.related_applied += other.related_applied;
        self.related_skipped += other.related_skipped;
    }
}

// (column, placeholder) pairs; the first `key` columns form the conflict target
const COURSE_COLUMNS: &[(&str, &str)] = &[
    ("id", "?"),
    ("title", "?"),
    ("description", "?"),
    ("url", "?"),
    ("estimated_content_length", "?"),
    ("num_lectures", "?"),
    ("num_videos", "?"),
    ("mobile_native_deeplink", "?"),
    ("is_practice_test_course", "?"),
    ("num_quizzes", "?"),
    ("num_practice_tests", "?"),
    ("has_closed_caption", "?"),
    ("last_update_date", "CAST(? AS DATE)"),
    ("xapi_activity_id", "?"),
    ("is_custom", "?"),
    ("is_imported", "?"),
    ("headline", "?"),
    ("level", "?"),
    ("locale", "?"),
];

const ACTIVITY_COLUMNS: &[(&str, &str)] = &[
    ("user_id", "?"),
    ("course_id", "?"),
    ("user_name", "?"),
    ("user_surname", "?"),
    ("user_email", "?"),
    ("user_role", "?"),
    ("user_external_id", "?"),
    ("course_title", "?"),
    ("course_category", "?"),
    ("course_duration", "?"),
    ("completion_ratio", "?"),
    ("num_video_consumed_minutes", "?"),
    ("course_enroll_date", "CAST(? AS TIMESTAMP)"),
    ("course_start_date", "CAST(? AS TIMESTAMP)"),
    ("course_completion_date", "CAST(? AS TIMESTAMP)"),
    ("course_first_completion_date", "CAST(? AS TIMESTAMP)"),
    ("course_last_accessed_date", "CAST(? AS TIMESTAMP)"),
    ("last_activity_date", "CAST(? AS TIMESTAMP)"),
    ("is_assigned", "?"),
    ("assigned_by", "?"),
    ("user_is_deactivated", "?"),
    ("lms_user_id", "?"),
];

/// Build `INSERT ... ON CONFLICT` for a primary entity table
fn upsert_sql(
    table: &str,
    columns: &[(&str, &str)],
    key: usize,
    policy: ConflictPolicy,
) -> String {
    let names: Vec<&str> = columns.iter().map(|(c, _)| *c).collect();
    let values: Vec<&str> = columns.iter().map(|(_, p)| *p).collect();
    let target = names[..key].join(", ");
    let action = match policy {
        ConflictPolicy::Ignore => "DO NOTHING".to_string(),
        ConflictPolicy::Update => {
            let sets: Vec<String> = names[key..]
                .iter()
                .map(|c| format!("{c} = EXCLUDED.{c}"))
                .collect();
            format!("DO UPDATE SET {}", sets.join(", "))
        }
    };
    format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT ({target}) {action}",
        names.join(", "),
        values.join(", ")
    )
}

/// Offset-aware timestamp as a UTC literal DuckDB casts to TIMESTAMP
fn ts(value: &Option<DateTime<FixedOffset>>) -> Option<String> {
    value.map(|t| t.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string())
}

fn date(value: &Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

fn is_conflict(err: &duckdb::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("duplicate key") || msg.contains("write-write conflict") || msg.contains("conflict on")
}

/// Whether a page failed because a concurrent writer committed the same
/// natural key first. Re-running the page in a fresh transaction then
/// finds the winning row.
pub fn is_write_conflict(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<duckdb::Error>())
        .any(is_conflict)
}

/// Owner of the single database connection for a run
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a database file and bootstrap the schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// In-memory database with the schema bootstrapped
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open DuckDB in-memory connection")?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        schema::init(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start the transaction for one page
    pub fn begin_page(&mut self) -> Result<PageTx<'_>> {
        let tx = self
            .conn
            .transaction()
            .context("Failed to begin page transaction")?;
        Ok(PageTx {
            tx,
            stats: WriteStats::default(),
        })
    }

    /// Row count per table, in schema order
    pub fn table_counts(&self) -> Result<Vec<(&'static str, u64)>> {
        schema::TABLES
            .iter()
            .map(|&table| {
                let n: i64 = self
                    .conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                    .with_context(|| format!("Failed to count {table}"))?;
                Ok((table, n as u64))
            })
            .collect()
    }
}

/// Writes for one page; commit or drop (rollback) as a unit
pub struct PageTx<'a> {
    tx: Transaction<'a>,
    stats: WriteStats,
}

impl PageTx<'_> {
    /// Resolve a lookup title to its id, inserting it if absent.
    ///
    /// Insert-or-ignore followed by a select. DuckDB detects a race with
    /// another open transaction only at commit; see [`is_write_conflict`].
    pub fn get_or_create(&self, table: LookupTable, item: &TitledRef) -> Result<i64> {
        let name = table.table();
        let insert = format!("INSERT INTO {name} (title, url) VALUES (?, ?) ON CONFLICT DO NOTHING");
        let n = self
            .tx
            .execute(&insert, params![item.title, item.url])
            .with_context(|| format!("Failed to insert {name} '{}'", item.title))?;
        if n > 0 {
            log::debug!("{name}: created '{}'", item.title);
        }
        self.tx
            .query_row(
                &format!("SELECT id FROM {name} WHERE title = ?"),
                params![item.title],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to look up {name} '{}'", item.title))
    }

    /// Insert a course row under the given conflict policy
    pub fn upsert_course(&self, row: &CourseRow, policy: ConflictPolicy) -> Result<WriteOutcome> {
        let sql = upsert_sql("courses", COURSE_COLUMNS, 1, policy);
        let n = self
            .tx
            .execute(
                &sql,
                params![
                    row.id,
                    row.title,
                    row.description,
                    row.url,
                    row.estimated_content_length,
                    row.num_lectures,
                    row.num_videos,
                    row.mobile_native_deeplink,
                    row.is_practice_test_course,
                    row.num_quizzes,
                    row.num_practice_tests,
                    row.has_closed_caption,
                    date(&row.last_update_date),
                    row.xapi_activity_id,
                    row.is_custom,
                    row.is_imported,
                    row.headline,
                    row.level,
                    row.locale,
                ],
            )
            .with_context(|| format!("Failed to upsert course {}", row.id))?;
        Ok(WriteOutcome::from_changed(n))
    }

    /// Insert an activity row under the given conflict policy
    pub fn upsert_activity(
        &self,
        row: &ActivityRow,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome> {
        let sql = upsert_sql("user_course_activity", ACTIVITY_COLUMNS, 2, policy);
        let n = self
            .tx
            .execute(
                &sql,
                params![
                    row.user_id,
                    row.course_id,
                    row.user_name,
                    row.user_surname,
                    row.user_email,
                    row.user_role,
                    row.user_external_id,
                    row.course_title,
                    row.course_category,
                    row.course_duration,
                    row.completion_ratio,
                    row.num_video_consumed_minutes,
                    ts(&row.course_enroll_date),
                    ts(&row.course_start_date),
                    ts(&row.course_completion_date),
                    ts(&row.course_first_completion_date),
                    ts(&row.course_last_accessed_date),
                    ts(&row.last_activity_date),
                    row.is_assigned,
                    row.assigned_by,
                    row.user_is_deactivated,
                    row.lms_user_id,
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to upsert activity for user {} / course {}",
                    row.user_id, row.course_id
                )
            })?;
        Ok(WriteOutcome::from_changed(n))
    }

    /// Insert-or-ignore a related row owned by `course_id`
    pub fn upsert_related(&self, course_id: i64, row: &RelatedRow) -> Result<WriteOutcome> {
        let mut values: Vec<&dyn ToSql> = vec![&course_id];
        let columns = match row {
            RelatedRow::Topic {
                topic_id,
                title,
                url,
            } => {
                values.extend([topic_id as &dyn ToSql, title, url]);
                "course_id, topic_id, title, url"
            }
            RelatedRow::PromoVideo { file, kind, label } => {
                values.extend([file as &dyn ToSql, kind, label]);
                "course_id, file, type, label"
            }
            RelatedRow::Instructor(name) => {
                values.push(name);
                "course_id, instructor_name"
            }
            RelatedRow::Requirement(text) => {
                values.push(text);
                "course_id, requirement"
            }
            RelatedRow::LearningOutcome(text) => {
                values.push(text);
                "course_id, item"
            }
            RelatedRow::Image { size, url } => {
                values.extend([size as &dyn ToSql, url]);
                "course_id, size, url"
            }
            RelatedRow::CaptionLanguage(lang) => {
                values.push(lang);
                "course_id, language"
            }
            RelatedRow::CaptionLocale {
                locale,
                title,
                english_title,
            } => {
                values.extend([locale as &dyn ToSql, title, english_title]);
                "course_id, locale, title, english_title"
            }
        };
        let placeholders = vec!["?"; values.len()].join(", ");
        let table = row.table();
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders}) ON CONFLICT DO NOTHING"
        );
        let n = self
            .tx
            .execute(&sql, values.as_slice())
            .with_context(|| format!("Failed to insert {table} row for course {course_id}"))?;
        Ok(WriteOutcome::from_changed(n))
    }

    fn link(&self, table: LookupTable, course_id: i64, lookup_id: i64) -> Result<WriteOutcome> {
        let (link_table, column) = table.link();
        let sql = format!(
            "INSERT INTO {link_table} (course_id, {column}) VALUES (?, ?) ON CONFLICT DO NOTHING"
        );
        let n = self
            .tx
            .execute(&sql, params![course_id, lookup_id])
            .with_context(|| format!("Failed to link course {course_id} in {link_table}"))?;
        Ok(WriteOutcome::from_changed(n))
    }

    fn apply_course(&mut self, write: &CourseWrite, policy: ConflictPolicy) -> Result<()> {
        let course_id = write.course.id;
        let outcome = self.upsert_course(&write.course, policy)?;
        self.stats.entity(outcome);

        for (table, item) in [
            (LookupTable::Category, &write.category),
            (LookupTable::Subcategory, &write.subcategory),
        ] {
            let id = self.get_or_create(table, item)?;
            let outcome = self.link(table, course_id, id)?;
            self.stats.related(outcome);
        }

        for row in &write.related {
            let outcome = self.upsert_related(course_id, row)?;
            self.stats.related(outcome);
        }
        Ok(())
    }

    /// Apply one record's full write-set
    pub fn apply(&mut self, write: &WriteSet, policy: ConflictPolicy) -> Result<()> {
        match write {
            WriteSet::Course(w) => self.apply_course(w, policy),
            WriteSet::Activity(row) => {
                let outcome = self.upsert_activity(row, policy)?;
                self.stats.entity(outcome);
                Ok(())
            }
        }
    }

    /// Counters for writes made so far in this page
    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Commit every write of the page
    pub fn commit(self) -> Result<WriteStats> {
        let stats = self.stats;
        self.tx.commit().context("Failed to commit page")?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(store: &Store, sql: &str) -> i64 {
        store.connection().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    fn category(title: &str) -> TitledRef {
        TitledRef {
            title: title.to_string(),
            url: Some(format!("/courses/{}/", title.to_lowercase())),
        }
    }

    #[test]
    fn upsert_sql_ignore() {
        let sql = upsert_sql("t", &[("a", "?"), ("b", "?")], 1, ConflictPolicy::Ignore);
        assert_eq!(
            sql,
            "INSERT INTO t (a, b) VALUES (?, ?) ON CONFLICT (a) DO NOTHING"
        );
    }

    #[test]
    fn upsert_sql_update_skips_key_columns() {
        let sql = upsert_sql(
            "t",
            &[("a", "?"), ("b", "?"), ("c", "CAST(? AS DATE)")],
            2,
            ConflictPolicy::Update,
        );
        assert_eq!(
            sql,
            "INSERT INTO t (a, b, c) VALUES (?, ?, CAST(? AS DATE)) \
             ON CONFLICT (a, b) DO UPDATE SET c = EXCLUDED.c"
        );
    }

    #[test]
    fn conflict_policy_names() {
        assert_eq!(ConflictPolicy::from_name("ignore"), Some(ConflictPolicy::Ignore));
        assert_eq!(ConflictPolicy::from_name("update"), Some(ConflictPolicy::Update));
        assert_eq!(ConflictPolicy::from_name("merge"), None);
        assert_eq!(ConflictPolicy::Update.to_string(), "update");
    }

    #[test]
    fn get_or_create_reuses_id() {
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.begin_page().unwrap();
        let a = tx.get_or_create(LookupTable::Category, &category("Development")).unwrap();
        let b = tx.get_or_create(LookupTable::Category, &category("Development")).unwrap();
        let c = tx.get_or_create(LookupTable::Category, &category("Design")).unwrap();
        tx.commit().unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM categories"), 2);
    }

    #[test]
    fn lookup_tables_are_independent() {
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.begin_page().unwrap();
        tx.get_or_create(LookupTable::Category, &category("Development")).unwrap();
        tx.get_or_create(LookupTable::Subcategory, &category("Development")).unwrap();
        tx.commit().unwrap();

        assert_eq!(count(&store, "SELECT COUNT(*) FROM categories"), 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM subcategories"), 1);
    }

    #[test]
    fn dropped_page_rolls_back() {
        let mut store = Store::open_in_memory().unwrap();
        {
            let tx = store.begin_page().unwrap();
            tx.upsert_course(
                &CourseRow {
                    id: 7,
                    ..Default::default()
                },
                ConflictPolicy::Ignore,
            )
            .unwrap();
            tx.upsert_related(7, &RelatedRow::Instructor("Ada".into())).unwrap();
        }
        assert_eq!(count(&store, "SELECT COUNT(*) FROM courses"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM instructors"), 0);
    }

    #[test]
    fn first_insert_is_applied() {
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.begin_page().unwrap();
        let outcome = tx
            .upsert_course(
                &CourseRow {
                    id: 1,
                    ..Default::default()
                },
                ConflictPolicy::Ignore,
            )
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
    }

    #[test]
    fn table_counts_cover_schema() {
        let store = Store::open_in_memory().unwrap();
        let counts = store.table_counts().unwrap();
        assert_eq!(counts.len(), schema::TABLES.len());
        assert!(counts.iter().all(|(_, n)| *n == 0));
    }
}
