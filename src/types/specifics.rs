use serde::{Deserialize, Serialize};

/// Tag of the permanent node every typed URL node lives under.
pub const TYPED_URL_TAG: &str = "google_chrome_typed_urls";

/// Wire representation of one typed URL in the sync store.
///
/// `visits` and `visit_transitions` are parallel arrays ordered by ascending
/// visit time. A well-formed record has a non-empty `url` and arrays of equal
/// length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedUrlSpecifics {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub typed_count: i32,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub visits: Vec<i64>,
    #[serde(default)]
    pub visit_transitions: Vec<u32>,
}

/// One item stored in the sync database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNode {
    pub id: String,
    pub parent_tag: String,
    /// Client tag; for typed URL nodes this is the URL itself.
    pub client_tag: String,
    /// Serialized `TypedUrlSpecifics`.
    pub specifics: String,
}
