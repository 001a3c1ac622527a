use serde::Deserialize;
use serde_json::Value;

use crate::adapters::{lenient_i64, lenient_string};
use crate::fetcher::UpstreamFault;

/// A course as returned by `core_course_get_courses`.
#[derive(Debug, Deserialize)]
pub struct MoodleCourse {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub fullname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub shortname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub format: Option<String>,
    /// Unix seconds
    #[serde(default, deserialize_with = "lenient_i64")]
    pub startdate: Option<i64>,
    /// Unix seconds, 0 when the course has no end
    #[serde(default, deserialize_with = "lenient_i64")]
    pub enddate: Option<i64>,
}

/// Error envelope Moodle returns with status 200.
#[derive(Debug, Deserialize)]
pub struct MoodleException {
    pub exception: String,
    #[serde(default)]
    pub errorcode: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

const RESTRICTION_CODES: &[&str] = &[
    "accessexception",
    "nopermissions",
    "required_capability_exception",
    "servicenotavailable",
];

/// Classifies a Moodle error envelope; other bodies pass.
pub fn inspect_response(body: &Value) -> Option<UpstreamFault> {
    if body.get("exception").is_none() {
        return None;
    }
    let exception: MoodleException = serde_json::from_value(body.clone()).ok()?;
    let code = exception.errorcode.as_deref().unwrap_or_default();
    let message = format!(
        "{} ({})",
        exception.message.as_deref().unwrap_or(exception.exception.as_str()),
        if code.is_empty() { exception.exception.as_str() } else { code }
    );

    Some(match code {
        "invalidtoken" => UpstreamFault::TokenRejected,
        c if RESTRICTION_CODES.contains(&c) => UpstreamFault::Restricted(message),
        _ => UpstreamFault::Failed(message),
    })
}
