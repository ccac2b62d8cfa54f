//! Feed identities and their API endpoints

use lmsync_store::{ConflictPolicy, WriteSet};
use serde_json::Value;

use crate::mapper::{self, MapError};

/// Resolved API location shared by both feeds
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// API root, e.g. `https://acme.udemy.com/api-2.0`
    pub base_url: String,
    pub account_id: String,
    pub page_size: u32,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, account_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            page_size,
        }
    }
}

/// One of the synchronized feeds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feed {
    /// Course catalog: one course per record plus its related rows
    Courses,
    /// Per-user, per-course progress
    Activity,
}

impl Feed {
    pub const ALL: [Feed; 2] = [Feed::Courses, Feed::Activity];

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "courses" | "course" | "catalog" => Some(Self::Courses),
            "activity" | "user-course-activity" => Some(Self::Activity),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Courses => "courses",
            Self::Activity => "activity",
        }
    }

    /// Default behavior when an entity row already exists
    pub fn default_conflict_policy(self) -> ConflictPolicy {
        match self {
            Self::Courses => ConflictPolicy::Ignore,
            Self::Activity => ConflictPolicy::Update,
        }
    }

    /// First page of the feed
    pub fn start_url(self, endpoint: &Endpoint) -> String {
        let Endpoint {
            base_url,
            account_id,
            page_size,
        } = endpoint;
        match self {
            Self::Courses => format!(
                "{base_url}/organizations/{account_id}/courses/list/?page_size={page_size}&page=1"
            ),
            Self::Activity => format!(
                "{base_url}/organizations/{account_id}/analytics/user-course-activity/?page_size={page_size}"
            ),
        }
    }

    /// Map one raw record into its write-set
    pub fn map(self, record: &Value) -> Result<WriteSet, MapError> {
        match self {
            Self::Courses => mapper::course::map_course(record).map(|w| WriteSet::Course(Box::new(w))),
            Self::Activity => {
                mapper::activity::map_activity(record).map(|a| WriteSet::Activity(Box::new(a)))
            }
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
