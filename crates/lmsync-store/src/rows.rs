//! Normalized write-set shapes produced by the mappers

use chrono::{DateTime, FixedOffset, NaiveDate};

/// Lookup table resolved through get-or-create
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupTable {
    Category,
    Subcategory,
}

impl LookupTable {
    pub fn table(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Subcategory => "subcategories",
        }
    }

    /// Link table between courses and this lookup
    pub(crate) fn link(self) -> (&'static str, &'static str) {
        match self {
            Self::Category => ("course_categories", "category_id"),
            Self::Subcategory => ("course_subcategories", "subcategory_id"),
        }
    }
}

/// Lookup reference by natural key (title)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TitledRef {
    pub title: String,
    pub url: Option<String>,
}

/// `courses` row
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CourseRow {
    pub id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub estimated_content_length: Option<i64>,
    pub num_lectures: Option<i64>,
    pub num_videos: Option<i64>,
    pub mobile_native_deeplink: Option<String>,
    pub is_practice_test_course: Option<bool>,
    pub num_quizzes: Option<i64>,
    pub num_practice_tests: Option<i64>,
    pub has_closed_caption: Option<bool>,
    pub last_update_date: Option<NaiveDate>,
    pub xapi_activity_id: Option<String>,
    pub is_custom: Option<bool>,
    pub is_imported: Option<bool>,
    pub headline: Option<String>,
    pub level: Option<String>,
    pub locale: Option<String>,
}

/// `user_course_activity` row, keyed by `(user_id, course_id)`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivityRow {
    pub user_id: i64,
    pub course_id: i64,
    pub user_name: Option<String>,
    pub user_surname: Option<String>,
    pub user_email: Option<String>,
    pub user_role: Option<String>,
    pub user_external_id: Option<String>,
    pub course_title: Option<String>,
    pub course_category: Option<String>,
    pub course_duration: Option<String>,
    pub completion_ratio: Option<f64>,
    pub num_video_consumed_minutes: Option<f64>,
    pub course_enroll_date: Option<DateTime<FixedOffset>>,
    pub course_start_date: Option<DateTime<FixedOffset>>,
    pub course_completion_date: Option<DateTime<FixedOffset>>,
    pub course_first_completion_date: Option<DateTime<FixedOffset>>,
    pub course_last_accessed_date: Option<DateTime<FixedOffset>>,
    pub last_activity_date: Option<DateTime<FixedOffset>>,
    pub is_assigned: Option<bool>,
    pub assigned_by: Option<String>,
    pub user_is_deactivated: Option<bool>,
    pub lms_user_id: Option<String>,
}

/// Secondary row owned by a course, keyed by `(course_id, natural sub-key)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelatedRow {
    Topic {
        topic_id: i64,
        title: Option<String>,
        url: Option<String>,
    },
    PromoVideo {
        file: String,
        kind: Option<String>,
        label: Option<String>,
    },
    Instructor(String),
    Requirement(String),
    LearningOutcome(String),
    Image {
        size: String,
        url: Option<String>,
    },
    CaptionLanguage(String),
    CaptionLocale {
        locale: String,
        title: Option<String>,
        english_title: Option<String>,
    },
}

impl RelatedRow {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Topic { .. } => "topics",
            Self::PromoVideo { .. } => "promo_videos",
            Self::Instructor(_) => "instructors",
            Self::Requirement(_) => "requirements",
            Self::LearningOutcome(_) => "what_you_will_learn",
            Self::Image { .. } => "images",
            Self::CaptionLanguage(_) => "caption_languages",
            Self::CaptionLocale { .. } => "caption_locales",
        }
    }
}

/// Everything one course record writes
#[derive(Clone, Debug, PartialEq)]
pub struct CourseWrite {
    pub course: CourseRow,
    pub category: TitledRef,
    pub subcategory: TitledRef,
    /// Related rows grouped by category, in source order within each group
    pub related: Vec<RelatedRow>,
}

/// Full write-set of one raw record
#[derive(Clone, Debug, PartialEq)]
pub enum WriteSet {
    Course(Box<CourseWrite>),
    Activity(Box<ActivityRow>),
}

impl WriteSet {
    /// Natural key for log lines
    pub fn key(&self) -> String {
        match self {
            Self::Course(w) => format!("course {}", w.course.id),
            Self::Activity(a) => format!("user {} / course {}", a.user_id, a.course_id),
        }
    }
}
