use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use super::api::CourseData;
use super::COURSE_START_URL_PREFIX;
use crate::adapters::{parse_rfc3339, scalar_attributes};
use crate::types::{ExamineeAccountDetails, QuizData};

/// Maps one raw course item to a quiz.
///
/// The item needs an id (`id`, falling back to `course_id`); every other
/// field is optional.
pub fn quiz_from_course(base_url: &str, item: &Value) -> Result<QuizData> {
    let course: CourseData =
        serde_json::from_value(item.clone()).context("Course item is not an object")?;

    let id = course
        .id
        .or(course.course_id)
        .ok_or_else(|| anyhow!("Course item has no id"))?;
    let start_url = format!("{}{}{}", base_url, COURSE_START_URL_PREFIX, id);

    Ok(QuizData::new(
        id.clone(),
        course.name.unwrap_or(id),
        course.short_description,
        parse_rfc3339(course.start.as_deref()),
        parse_rfc3339(course.end.as_deref()),
        start_url,
    ))
}

/// Maps an `/api/user/v1/accounts/{username}` response.
pub fn account_from_value(user_id: &str, value: &Value) -> Result<ExamineeAccountDetails> {
    let object = value
        .as_object()
        .ok_or_else(|| anyhow!("Account response is not an object"))?;
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let username = text("username").unwrap_or_else(|| user_id.to_string());
    let id = match object.get("id") {
        Some(Value::Number(n)) => n.to_string(),
        _ => text("id").unwrap_or_else(|| username.clone()),
    };

    Ok(ExamineeAccountDetails {
        id,
        name: text("name").unwrap_or_else(|| username.clone()),
        email: text("email"),
        attributes: scalar_attributes(object, &["id", "username", "name", "email"]),
        username,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_quiz_from_full_course() {
        let item = json!({
            "id": "course-v1:edX+DemoX+Demo_Course",
            "name": "edX Demonstration Course",
            "short_description": "Intro",
            "start": "2013-02-05T05:00:00Z",
            "end": "2030-01-01T00:00:00Z"
        });

        let quiz = quiz_from_course("https://edx.example.org", &item).unwrap();
        assert_eq!(quiz.id(), "course-v1:edX+DemoX+Demo_Course");
        assert_eq!(quiz.name(), "edX Demonstration Course");
        assert_eq!(quiz.description(), Some("Intro"));
        assert_eq!(quiz.start_time(), Utc.with_ymd_and_hms(2013, 2, 5, 5, 0, 0).single());
        assert!(quiz.end_time().is_some());
        assert_eq!(
            quiz.start_url(),
            "https://edx.example.org/courses/course-v1:edX+DemoX+Demo_Course"
        );
    }

    #[test]
    fn test_quiz_optional_fields_absent_or_malformed() {
        let item = json!({"id": "c1", "name": "Course", "start": "Feb. 5, 2013", "end": 17});
        let quiz = quiz_from_course("https://edx.example.org", &item).unwrap();
        assert!(quiz.description().is_none());
        assert!(quiz.start_time().is_none());
        assert!(quiz.end_time().is_none());
    }

    #[test]
    fn test_quiz_id_fallback_and_missing() {
        let quiz = quiz_from_course("https://e", &json!({"course_id": "c2"})).unwrap();
        assert_eq!(quiz.id(), "c2");
        assert_eq!(quiz.name(), "c2");

        assert!(quiz_from_course("https://e", &json!({"name": "no id"})).is_err());
        assert!(quiz_from_course("https://e", &json!("not an object")).is_err());
    }

    #[test]
    fn test_account_from_value() {
        let value = json!({
            "username": "jdoe",
            "name": "Jane Doe",
            "email": "jdoe@example.org",
            "country": "CH",
            "year_of_birth": 1990,
            "profile_image": {"has_image": false}
        });

        let account = account_from_value("jdoe", &value).unwrap();
        assert_eq!(account.id, "jdoe");
        assert_eq!(account.username, "jdoe");
        assert_eq!(account.name, "Jane Doe");
        assert_eq!(account.email.as_deref(), Some("jdoe@example.org"));
        assert_eq!(account.attributes.get("country").map(String::as_str), Some("CH"));
        assert_eq!(account.attributes.get("year_of_birth").map(String::as_str), Some("1990"));
        assert!(!account.attributes.contains_key("profile_image"));
    }
}
