use serde::Deserialize;
use serde_json::Value;

use crate::adapters::{lenient_string, lenient_u32, lenient_u64};

/// Paginated envelope of the course list API.
#[derive(Debug, Default, Deserialize)]
pub struct EdxPage {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub count: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub num_pages: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub next: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub previous: Option<String>,
    /// Raw course items, mapped one by one
    #[serde(default)]
    pub results: Vec<Value>,
}

/// A course as returned by `/api/courses/v1/courses/`.
#[derive(Debug, Deserialize)]
pub struct CourseData {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub course_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub short_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub blocks_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edx_page() {
        let page: EdxPage = serde_json::from_str(
            r#"{
                "count": 2,
                "previous": null,
                "num_pages": 1,
                "next": null,
                "results": [
                    {
                        "blocks_url": "http://edx.local/api/courses/v1/blocks/?course_id=course-v1%3AedX%2BDemoX%2BDemo_Course",
                        "effort": null,
                        "end": null,
                        "id": "course-v1:edX+DemoX+Demo_Course",
                        "name": "edX Demonstration Course",
                        "short_description": null,
                        "start": "2013-02-05T05:00:00Z",
                        "start_display": "Feb. 5, 2013",
                        "course_id": "course-v1:edX+DemoX+Demo_Course"
                    },
                    {"id": "course-v1:ETH+Q1+2024", "name": "Quiz"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(page.count, Some(2));
        assert_eq!(page.num_pages, Some(1));
        assert!(page.next.is_none());
        assert_eq!(page.results.len(), 2);

        let course: CourseData = serde_json::from_value(page.results[0].clone()).unwrap();
        assert_eq!(course.id.as_deref(), Some("course-v1:edX+DemoX+Demo_Course"));
        assert_eq!(course.start.as_deref(), Some("2013-02-05T05:00:00Z"));
        assert!(course.short_description.is_none());
        assert!(course.end.is_none());
    }

    #[test]
    fn test_parse_envelope_with_numeric_strings() {
        let page: EdxPage = serde_json::from_str(
            r#"{"num_pages": "1", "count": "1", "results": [{"id": "c1", "name": "C"}]}"#,
        )
        .unwrap();
        assert_eq!(page.num_pages, Some(1));
        assert_eq!(page.count, Some(1));
        assert_eq!(page.results.len(), 1);

        let page: EdxPage =
            serde_json::from_str(r#"{"num_pages": {"x": 1}, "count": null, "results": []}"#).unwrap();
        assert!(page.num_pages.is_none());
        assert!(page.count.is_none());
    }

    #[test]
    fn test_parse_empty_envelope() {
        let page: EdxPage = serde_json::from_str("{}").unwrap();
        assert!(page.num_pages.is_none());
        assert!(page.results.is_empty());
    }
}
