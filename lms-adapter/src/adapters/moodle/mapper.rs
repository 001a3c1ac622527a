use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use super::api::MoodleCourse;
use super::{COURSE_START_URL_PREFIX, SITE_COURSE_ID};
use crate::adapters::{from_unix_seconds, scalar_attributes};
use crate::types::{ExamineeAccountDetails, QuizData};

/// Maps one course item. Returns `Ok(None)` for the site front page, which
/// Moodle lists as a course.
pub fn quiz_from_course(base_url: &str, item: &Value) -> Result<Option<QuizData>> {
    let course: MoodleCourse =
        serde_json::from_value(item.clone()).context("Course item is not an object")?;

    let id = course.id.ok_or_else(|| anyhow!("Course item has no id"))?;
    if id == SITE_COURSE_ID || course.format.as_deref() == Some("site") {
        return Ok(None);
    }

    let start_url = format!("{}{}{}", base_url, COURSE_START_URL_PREFIX, id);
    let name = course
        .fullname
        .or(course.shortname)
        .unwrap_or_else(|| id.clone());

    Ok(Some(QuizData::new(
        id,
        name,
        course.summary,
        from_unix_seconds(course.startdate),
        from_unix_seconds(course.enddate),
        start_url,
    )))
}

/// Maps one user of `core_user_get_users_by_field`.
pub fn account_from_user(value: &Value) -> Result<ExamineeAccountDetails> {
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("User item is not an object"))?;
    let text = |key: &str| match object.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let id = text("id").ok_or_else(|| anyhow!("User item has no id"))?;
    let username = text("username").unwrap_or_else(|| id.clone());
    let name = text("fullname")
        .or_else(|| {
            let parts: Vec<String> = ["firstname", "lastname"].into_iter().filter_map(text).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        })
        .unwrap_or_else(|| username.clone());

    Ok(ExamineeAccountDetails {
        id,
        name,
        username,
        email: text("email"),
        attributes: scalar_attributes(object, &["id", "username", "fullname", "email"]),
    })
}
