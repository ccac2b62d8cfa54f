//! Course catalog record mapping

use lmsync_store::{CourseRow, CourseWrite, RelatedRow, TitledRef};
use serde_json::Value;

use super::{MapError, Need, RawRecord};

/// Map one course record into its row, lookups and related rows.
pub fn map_course(value: &Value) -> Result<CourseWrite, MapError> {
    let rec = RawRecord::new(value, "course record")?;
    let req = Need::Required;
    let opt = Need::Optional;

    let locale = match rec.object("locale", req)? {
        Some(l) => l.text("locale", req)?,
        None => None,
    };

    let course = CourseRow {
        id: rec.id("id")?,
        title: rec.text("title", req)?,
        description: rec.text("description", req)?,
        url: rec.text("url", req)?,
        estimated_content_length: rec.int("estimated_content_length", req)?,
        num_lectures: rec.int("num_lectures", req)?,
        num_videos: rec.int("num_videos", req)?,
        mobile_native_deeplink: rec.text("mobile_native_deeplink", opt)?,
        is_practice_test_course: rec.flag("is_practice_test_course", req)?,
        num_quizzes: rec.int("num_quizzes", req)?,
        num_practice_tests: rec.int("num_practice_tests", req)?,
        has_closed_caption: rec.flag("has_closed_caption", req)?,
        last_update_date: rec.date("last_update_date", opt)?,
        xapi_activity_id: rec.text("xapi_activity_id", req)?,
        is_custom: rec.flag("is_custom", req)?,
        is_imported: rec.flag("is_imported", req)?,
        headline: rec.text("headline", req)?,
        level: rec.text("level", req)?,
        locale,
    };

    let category = titled(&rec, "primary_category")?;
    let subcategory = titled(&rec, "primary_subcategory")?;
    let related = related_rows(&rec)?;

    Ok(CourseWrite {
        course,
        category,
        subcategory,
        related,
    })
}

/// `{title, url}` lookup reference; title is the natural key
fn titled(rec: &RawRecord<'_>, key: &str) -> Result<TitledRef, MapError> {
    let obj = rec.required_object(key)?;
    Ok(TitledRef {
        title: obj.key_text("title")?,
        url: obj.text("url", Need::Required)?,
    })
}

/// Related rows grouped by kind, source order within each group
fn related_rows(rec: &RawRecord<'_>) -> Result<Vec<RelatedRow>, MapError> {
    let opt = Need::Optional;
    let mut rows = Vec::new();

    for t in rec.object_list("topics")? {
        rows.push(RelatedRow::Topic {
            topic_id: t.id("id")?,
            title: t.text("title", opt)?,
            url: t.text("url", opt)?,
        });
    }

    for v in rec.object_list("promo_video_url")? {
        rows.push(RelatedRow::PromoVideo {
            file: v.key_text("file")?,
            kind: v.text("type", opt)?,
            label: v.text("label", opt)?,
        });
    }

    rows.extend(rec.string_list("instructors")?.into_iter().map(RelatedRow::Instructor));

    // a non-list `requirements.list` means no requirements
    if let Some(reqs) = rec.object("requirements", opt)?.filter(|r| r.has_list("list")) {
        rows.extend(reqs.string_list("list")?.into_iter().map(RelatedRow::Requirement));
    }

    if let Some(learn) = rec.object("what_you_will_learn", opt)? {
        rows.extend(learn.string_list("list")?.into_iter().map(RelatedRow::LearningOutcome));
    }

    if let Some(images) = rec.object("images", opt)? {
        for (size, url) in images.entries() {
            let url = match url {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                _ => {
                    return Err(MapError::WrongType {
                        field: format!("images.{size}"),
                        expected: "string",
                    });
                }
            };
            rows.push(RelatedRow::Image {
                size: size.clone(),
                url,
            });
        }
    }

    rows.extend(
        rec.string_list("caption_languages")?
            .into_iter()
            .map(RelatedRow::CaptionLanguage),
    );

    for c in rec.object_list("caption_locales")? {
        rows.push(RelatedRow::CaptionLocale {
            locale: c.key_text("locale")?,
            title: c.text("title", opt)?,
            english_title: c.text("english_title", opt)?,
        });
    }

    Ok(rows)
}
