use serde::{Deserialize, Serialize};

/// Row identifier of a URL in the history database.
pub type UrlId = i64;

/// How the user arrived at a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageTransition {
    Link,
    Typed,
    AutoBookmark,
    Generated,
    Reload,
    Redirect,
}

impl PageTransition {
    /// Numeric code used in the wire format and the `visits` table.
    pub fn code(self) -> u32 {
        match self {
            PageTransition::Link => 0,
            PageTransition::Typed => 1,
            PageTransition::AutoBookmark => 2,
            PageTransition::Generated => 5,
            PageTransition::Reload => 8,
            PageTransition::Redirect => 10,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(PageTransition::Link),
            1 => Some(PageTransition::Typed),
            2 => Some(PageTransition::AutoBookmark),
            5 => Some(PageTransition::Generated),
            8 => Some(PageTransition::Reload),
            10 => Some(PageTransition::Redirect),
            _ => None,
        }
    }
}

/// Where a visit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitSource {
    Browsed,
    Synced,
    Extension,
    Imported,
}

impl VisitSource {
    pub fn code(self) -> i32 {
        match self {
            VisitSource::Synced => 0,
            VisitSource::Browsed => 1,
            VisitSource::Extension => 2,
            VisitSource::Imported => 3,
        }
    }

    /// Unknown codes are treated as browsed visits.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => VisitSource::Synced,
            2 => VisitSource::Extension,
            3 => VisitSource::Imported,
            _ => VisitSource::Browsed,
        }
    }
}

/// A URL as stored in the local history database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRow {
    /// `0` for rows that have not been written yet.
    pub id: UrlId,
    pub url: String,
    pub title: String,
    pub last_visit: i64,
    pub visit_count: i32,
    pub typed_count: i32,
    pub hidden: bool,
}

impl UrlRow {
    /// Creates an unsaved row for `url` with no visits.
    pub fn new(url: &str) -> Self {
        Self {
            id: 0,
            url: url.to_string(),
            title: String::new(),
            last_visit: 0,
            visit_count: 0,
            typed_count: 0,
            hidden: false,
        }
    }
}

/// One stored visit of a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRow {
    pub id: i64,
    pub url_id: UrlId,
    pub visit_time: i64,
    pub transition: PageTransition,
    pub source: VisitSource,
}

impl VisitRow {
    pub fn new(url_id: UrlId, visit_time: i64, transition: PageTransition) -> Self {
        Self {
            id: 0,
            url_id,
            visit_time,
            transition,
            source: VisitSource::Browsed,
        }
    }
}

/// A visit that has not been written to the history database yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitInfo {
    pub visit_time: i64,
    pub transition: PageTransition,
}

impl VisitInfo {
    pub fn new(visit_time: i64, transition: PageTransition) -> Self {
        Self {
            visit_time,
            transition,
        }
    }
}
