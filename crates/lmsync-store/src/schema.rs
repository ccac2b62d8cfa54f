//! Table definitions.
//!
//! Every statement is idempotent so bootstrap can run before each sync.

use anyhow::{Context, Result};
use duckdb::Connection;

/// Tables in bootstrap order, for status reporting
pub const TABLES: &[&str] = &[
    "categories",
    "subcategories",
    "courses",
    "course_categories",
    "course_subcategories",
    "topics",
    "promo_videos",
    "instructors",
    "requirements",
    "what_you_will_learn",
    "images",
    "caption_languages",
    "caption_locales",
    "user_course_activity",
];

// Lookup tables are keyed by title; `id` comes from a sequence so that an
// insert-or-ignore on title never needs a second unique index.
const DDL: &str = "
CREATE SEQUENCE IF NOT EXISTS categories_id_seq START 1;
CREATE SEQUENCE IF NOT EXISTS subcategories_id_seq START 1;

CREATE TABLE IF NOT EXISTS categories (
    title VARCHAR PRIMARY KEY,
    id BIGINT NOT NULL DEFAULT nextval('categories_id_seq'),
    url VARCHAR
);

CREATE TABLE IF NOT EXISTS subcategories (
    title VARCHAR PRIMARY KEY,
    id BIGINT NOT NULL DEFAULT nextval('subcategories_id_seq'),
    url VARCHAR
);

CREATE TABLE IF NOT EXISTS courses (
    id BIGINT PRIMARY KEY,
    title VARCHAR,
    description VARCHAR,
    url VARCHAR,
    estimated_content_length BIGINT,
    num_lectures BIGINT,
    num_videos BIGINT,
    mobile_native_deeplink VARCHAR,
    is_practice_test_course BOOLEAN,
    num_quizzes BIGINT,
    num_practice_tests BIGINT,
    has_closed_caption BOOLEAN,
    last_update_date DATE,
    xapi_activity_id VARCHAR,
    is_custom BOOLEAN,
    is_imported BOOLEAN,
    headline VARCHAR,
    level VARCHAR,
    locale VARCHAR
);

CREATE TABLE IF NOT EXISTS course_categories (
    course_id BIGINT NOT NULL,
    category_id BIGINT NOT NULL,
    PRIMARY KEY (course_id, category_id)
);

CREATE TABLE IF NOT EXISTS course_subcategories (
    course_id BIGINT NOT NULL,
    subcategory_id BIGINT NOT NULL,
    PRIMARY KEY (course_id, subcategory_id)
);

CREATE TABLE IF NOT EXISTS topics (
    course_id BIGINT NOT NULL,
    topic_id BIGINT NOT NULL,
    title VARCHAR,
    url VARCHAR,
    PRIMARY KEY (course_id, topic_id)
);

CREATE TABLE IF NOT EXISTS promo_videos (
    course_id BIGINT NOT NULL,
    file VARCHAR NOT NULL,
    type VARCHAR,
    label VARCHAR,
    PRIMARY KEY (course_id, file)
);

CREATE TABLE IF NOT EXISTS instructors (
    course_id BIGINT NOT NULL,
    instructor_name VARCHAR NOT NULL,
    PRIMARY KEY (course_id, instructor_name)
);

CREATE TABLE IF NOT EXISTS requirements (
    course_id BIGINT NOT NULL,
    requirement VARCHAR NOT NULL,
    PRIMARY KEY (course_id, requirement)
);

CREATE TABLE IF NOT EXISTS what_you_will_learn (
    course_id BIGINT NOT NULL,
    item VARCHAR NOT NULL,
    PRIMARY KEY (course_id, item)
);

CREATE TABLE IF NOT EXISTS images (
    course_id BIGINT NOT NULL,
    size VARCHAR NOT NULL,
    url VARCHAR,
    PRIMARY KEY (course_id, size)
);

CREATE TABLE IF NOT EXISTS caption_languages (
    course_id BIGINT NOT NULL,
    language VARCHAR NOT NULL,
    PRIMARY KEY (course_id, language)
);

CREATE TABLE IF NOT EXISTS caption_locales (
    course_id BIGINT NOT NULL,
    locale VARCHAR NOT NULL,
    title VARCHAR,
    english_title VARCHAR,
    PRIMARY KEY (course_id, locale)
);

CREATE TABLE IF NOT EXISTS user_course_activity (
    user_id BIGINT NOT NULL,
    course_id BIGINT NOT NULL,
    user_name VARCHAR,
    user_surname VARCHAR,
    user_email VARCHAR,
    user_role VARCHAR,
    user_external_id VARCHAR,
    course_title VARCHAR,
    course_category VARCHAR,
    course_duration VARCHAR,
    completion_ratio DOUBLE,
    num_video_consumed_minutes DOUBLE,
    course_enroll_date TIMESTAMP,
    course_start_date TIMESTAMP,
    course_completion_date TIMESTAMP,
    course_first_completion_date TIMESTAMP,
    course_last_accessed_date TIMESTAMP,
    last_activity_date TIMESTAMP,
    is_assigned BOOLEAN,
    assigned_by VARCHAR,
    user_is_deactivated BOOLEAN,
    lms_user_id VARCHAR,
    PRIMARY KEY (user_id, course_id)
);
";

/// Create every sequence and table that does not exist yet
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(DDL).context("Failed to create schema")?;
    log::debug!("Schema ready ({} tables)", TABLES.len());
    Ok(())
}
