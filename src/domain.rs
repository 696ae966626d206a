use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::Serialize;

use crate::error::SmokeError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Doi(String);

impl Doi {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The DOI is only a CMR lookup key; CMR decides whether it exists.
impl FromStr for Doi {
    type Err = SmokeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SmokeError::InvalidDoi(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// CMR concept id of a collection, e.g. `C2484079608-LPCLOUD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CollectionConceptId(String);

impl CollectionConceptId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GranuleId(String);

impl GranuleId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GranuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Value of the CMR `sort_key` parameter.
    pub fn sort_key(self) -> &'static str {
        match self {
            SortOrder::Ascending => "start_date",
            SortOrder::Descending => "-start_date",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => write!(f, "earliest"),
            SortOrder::Descending => write!(f, "latest"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Granule {
    pub title: String,
    pub id: GranuleId,
    pub download_url: String,
    pub collection_id: CollectionConceptId,
}

impl Granule {
    /// Basename of the download URL path; this is the name the file gets in the data directory.
    pub fn filename(&self) -> Option<String> {
        url_basename(&self.download_url)
    }
}

pub fn url_basename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_string())
}
