//! User-course-activity record mapping

use lmsync_store::ActivityRow;
use serde_json::Value;

use super::{MapError, Need, RawRecord};

/// Map one activity record. Only `user_id` and `course_id` are required.
pub fn map_activity(value: &Value) -> Result<ActivityRow, MapError> {
    let rec = RawRecord::new(value, "activity record")?;
    let opt = Need::Optional;

    Ok(ActivityRow {
        user_id: rec.id("user_id")?,
        course_id: rec.id("course_id")?,
        user_name: rec.text("user_name", opt)?,
        user_surname: rec.text("user_surname", opt)?,
        user_email: rec.text("user_email", opt)?,
        user_role: rec.text("user_role", opt)?,
        user_external_id: rec.loose_text("user_external_id", opt)?,
        course_title: rec.text("course_title", opt)?,
        course_category: rec.text("course_category", opt)?,
        course_duration: rec.loose_text("course_duration", opt)?,
        completion_ratio: rec.float("completion_ratio", opt)?,
        num_video_consumed_minutes: rec.float("num_video_consumed_minutes", opt)?,
        course_enroll_date: rec.timestamp("course_enroll_date", opt)?,
        course_start_date: rec.timestamp("course_start_date", opt)?,
        course_completion_date: rec.timestamp("course_completion_date", opt)?,
        course_first_completion_date: rec.timestamp("course_first_completion_date", opt)?,
        course_last_accessed_date: rec.timestamp("course_last_accessed_date", opt)?,
        last_activity_date: rec.timestamp("last_activity_date", opt)?,
        is_assigned: rec.flag("is_assigned", opt)?,
        assigned_by: rec.text("assigned_by", opt)?,
        user_is_deactivated: rec.flag("user_is_deactivated", opt)?,
        lms_user_id: rec.loose_text("lms_user_id", opt)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_activity(user_id: i64, course_id: i64) -> Value {
        json!({
            "user_id": user_id,
            "course_id": course_id,
            "user_name": "Grace",
            "user_surname": "Hopper",
            "user_email": format!("user{user_id}@example.test"),
            "user_role": "Student",
            "user_external_id": 9001,
            "course_title": "Rust 101",
            "course_category": "Development",
            "course_duration": "5h 30m",
            "completion_ratio": 42.5,
            "num_video_consumed_minutes": 120,
            "course_enroll_date": "2024-01-02T03:04:05Z",
            "course_start_date": "2024-01-03T00:00:00+01:00",
            "course_completion_date": null,
            "course_first_completion_date": "",
            "course_last_accessed_date": "2024-02-01T10:30:00.250Z",
            "last_activity_date": "2024-02-01T10:30:00Z",
            "is_assigned": true,
            "assigned_by": "admin@example.test",
            "user_is_deactivated": false,
            "lms_user_id": "lms-77"
        })
    }

    #[test]
    fn full_record() {
        let row = map_activity(&sample_activity(3, 4)).unwrap();
        assert_eq!((row.user_id, row.course_id), (3, 4));
        assert_eq!(row.user_external_id.as_deref(), Some("9001"));
        assert_eq!(row.num_video_consumed_minutes, Some(120.0));
        assert_eq!(row.completion_ratio, Some(42.5));
        assert_eq!(row.course_completion_date, None);
        assert_eq!(row.course_first_completion_date, None);

        let enrolled = row.course_enroll_date.unwrap();
        assert_eq!(enrolled.offset().local_minus_utc(), 0);
        assert_eq!(enrolled.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        let started = row.course_start_date.unwrap();
        assert_eq!(started.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn only_keys_are_required() {
        let row = map_activity(&json!({"user_id": 1, "course_id": 2})).unwrap();
        assert_eq!(
            row,
            ActivityRow {
                user_id: 1,
                course_id: 2,
                ..Default::default()
            }
        );
    }

    #[test]
    fn missing_key_fails() {
        assert_eq!(
            map_activity(&json!({"user_id": 1})),
            Err(MapError::MissingField("course_id".to_string()))
        );
        assert_eq!(
            map_activity(&json!({"user_id": null, "course_id": 1})),
            Err(MapError::MissingField("user_id".to_string()))
        );
    }

    #[test]
    fn malformed_timestamp_fails() {
        let mut v = sample_activity(1, 2);
        v["course_enroll_date"] = json!("last tuesday");
        assert_eq!(
            map_activity(&v),
            Err(MapError::InvalidTimestamp {
                field: "course_enroll_date".to_string(),
                value: "last tuesday".to_string(),
            })
        );
    }

    #[test]
    fn non_object_record_fails() {
        assert!(matches!(
            map_activity(&json!("oops")),
            Err(MapError::NotAnObject(_))
        ));
    }
}
