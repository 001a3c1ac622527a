//! Canonical, backend-agnostic representations of LMS data.

use crate::error::LmsError;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Normalized course/quiz metadata.
///
/// Only produced by the backend mappers; callers read it through accessors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuizData {
    id: String,
    name: String,
    description: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    start_url: String,
}

impl QuizData {
    pub(crate) fn new(
        id: String,
        name: String,
        description: Option<String>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        start_url: String,
    ) -> Self {
        Self {
            id,
            name,
            description,
            start_time,
            end_time,
            start_url,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Deep link for starting the quiz in the LMS.
    pub fn start_url(&self) -> &str {
        &self.start_url
    }
}

/// One page of results.
///
/// The page size is always the number of items in the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    number_of_pages: u32,
    page_number: u32,
    sort: Option<String>,
    content: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(number_of_pages: u32, page_number: u32, sort: Option<String>, content: Vec<T>) -> Self {
        Self {
            number_of_pages,
            page_number,
            sort,
            content,
        }
    }

    /// Cuts page `page_number` (0-based) of `page_size` items out of a full
    /// result list.
    pub fn paginate(
        all: Vec<T>,
        page_number: u32,
        page_size: u32,
        sort: Option<String>,
    ) -> Self {
        let page_size = page_size.max(1) as usize;
        let number_of_pages = all.len().div_ceil(page_size).max(1);
        let content = all
            .into_iter()
            .skip((page_number as usize).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Self::new(
            u32::try_from(number_of_pages).unwrap_or(u32::MAX),
            page_number,
            sort,
            content,
        )
    }

    pub fn number_of_pages(&self) -> u32 {
        self.number_of_pages
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> usize {
        self.content.len()
    }

    pub fn sort(&self) -> Option<&str> {
        self.sort.as_deref()
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }
}

impl<T: Serialize> Serialize for Page<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut page = serializer.serialize_struct("Page", 5)?;
        page.serialize_field("number_of_pages", &self.number_of_pages)?;
        page.serialize_field("page_number", &self.page_number)?;
        page.serialize_field("page_size", &self.page_size())?;
        page.serialize_field("sort", &self.sort)?;
        page.serialize_field("content", &self.content)?;
        page.end()
    }
}

/// Parameters of a quiz listing call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuizQuery {
    /// Case-insensitive name filter
    pub name: Option<String>,
    /// Only quizzes starting at or after this instant (quizzes without a
    /// start time always match)
    pub from: Option<DateTime<Utc>>,
    /// Sort key: `name`, `start_time`, `end_time`, `-` prefix for descending
    pub sort: Option<String>,
    /// 0-based page number
    pub page_number: u32,
    pub page_size: u32,
}

impl QuizQuery {
    pub fn page(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), LmsError> {
        if self.page_size == 0 {
            return Err(LmsError::InvalidRequest(
                "page size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a quiz passes the name and start-time filters.
    pub fn matches(&self, quiz: &QuizData) -> bool {
        let name_matches = match self.name.as_deref().map(str::trim) {
            Some(filter) if !filter.is_empty() => quiz
                .name()
                .to_lowercase()
                .contains(&filter.to_lowercase()),
            _ => true,
        };
        let from_matches = match (self.from, quiz.start_time()) {
            (Some(from), Some(start)) => start >= from,
            _ => true,
        };
        name_matches && from_matches
    }

    /// Sorts quizzes in place by the query's sort key. Unknown keys keep the
    /// upstream order.
    pub(crate) fn sort_quizzes(&self, quizzes: &mut [QuizData]) {
        let Some(sort) = self.sort.as_deref().map(str::trim) else {
            return;
        };
        let (descending, key) = match sort.strip_prefix('-') {
            Some(key) => (true, key),
            None => (false, sort),
        };
        let compare: fn(&QuizData, &QuizData) -> Ordering = match key {
            "name" => |a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            "start_time" => |a, b| a.start_time.cmp(&b.start_time),
            "end_time" => |a, b| a.end_time.cmp(&b.end_time),
            _ => return,
        };
        quizzes.sort_by(|a, b| {
            let ordering = compare(a, b);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
}

/// Account details of an examinee as known by the LMS.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExamineeAccountDetails {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: Option<String>,
    /// Remaining scalar account fields, stringified
    pub attributes: BTreeMap<String, String>,
}
